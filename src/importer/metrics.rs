//! Bottom-up metric aggregation over the node hierarchy.

use crate::graph::{Attributable, Graph};

/// Sums each named attribute up the forest: a node's aggregated value is its
/// own value plus the aggregated values of its children.
///
/// With `with_suffix` the result lands in `<name>_SUM`, keeping the
/// self-value readable next to the aggregate; otherwise the attribute is
/// overwritten in place. `as_int` selects the int store over the float store.
pub fn aggregate(graph: &mut Graph, names: &[&str], with_suffix: bool, as_int: bool) {
    let roots: Vec<String> = graph
        .nodes()
        .filter(|n| n.parent().is_none())
        .map(|n| n.id().to_string())
        .collect();

    for name in names {
        let target = if with_suffix {
            format!("{name}_SUM")
        } else {
            (*name).to_string()
        };
        for root in &roots {
            aggregate_node(graph, root, name, &target, as_int);
        }
    }
}

fn aggregate_node(graph: &mut Graph, id: &str, name: &str, target: &str, as_int: bool) -> f64 {
    let (self_value, children) = match graph.node(id) {
        Some(node) => (
            node.attrs().numeric(name).unwrap_or(0.0),
            node.children().to_vec(),
        ),
        None => return 0.0,
    };

    let mut total = self_value;
    for child in children {
        total += aggregate_node(graph, &child, name, target, as_int);
    }

    if let Some(node) = graph.node_mut(id) {
        if as_int {
            node.attrs_mut().set_int(target, total as i64);
        } else {
            node.attrs_mut().set_float(target, total);
        }
    }
    total
}
