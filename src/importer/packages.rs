//! Package-node synthesis for the Java server family.
//!
//! jdtls reports classes per file but nothing above them; the conventional
//! hierarchy there is the package, not the directory. This pass derives
//! dotted package names from each class's project-relative directory,
//! inserts one `Package` node per distinct name, moves the classes under it
//! and records `Num_Methods` per class.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::graph::{attr, Attributable, Graph, Node};

const CLASS_LIKE: &[&str] = &["Class", "Interface", "Enum"];

/// Runs the correction pass. Safe on non-Java graphs (no class nodes, no
/// changes).
pub fn synthesize_packages(graph: &mut Graph) -> Result<(), GraphError> {
    let class_ids: Vec<String> = graph
        .nodes()
        .filter(|n| CLASS_LIKE.contains(&n.type_name()))
        .map(|n| n.id().to_string())
        .collect();

    // package name -> (class ids, directory node id)
    let mut packages: BTreeMap<String, (Vec<String>, Option<String>)> = BTreeMap::new();

    for class_id in &class_ids {
        record_num_methods(graph, class_id);

        let Some(class) = graph.node(class_id) else {
            continue;
        };
        // Only top-of-file classes move; nested classes stay where they are.
        let nested_parent = class
            .parent()
            .and_then(|p| graph.node(p))
            .is_some_and(|p| CLASS_LIKE.contains(&p.type_name()));
        if nested_parent {
            continue;
        }

        let Some(dir) = class.attrs().string(attr::SOURCE_PATH) else {
            continue;
        };
        let package_name = dotted_package_name(dir);
        if package_name.is_empty() {
            continue;
        }
        let dir_node = graph.contains_node(dir).then(|| dir.to_string());
        let entry = packages.entry(package_name).or_insert_with(|| (Vec::new(), dir_node));
        entry.0.push(class_id.clone());
    }

    for (package_name, (classes, dir_node)) in packages {
        if !graph.contains_node(&package_name) {
            let mut package = Node::new("Package");
            package.set_id(package_name.clone());
            package.set_source_name(package_name.clone());
            graph.add_node(package)?;
            graph.reparent(&package_name, dir_node.as_deref())?;
        }
        for class_id in classes {
            graph.reparent(&class_id, Some(&package_name))?;
        }
    }

    Ok(())
}

/// `"src/com/example/"` -> `"src.com.example"`.
fn dotted_package_name(directory: &str) -> String {
    directory
        .split('/')
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn record_num_methods(graph: &mut Graph, class_id: &str) {
    let count = graph
        .node(class_id)
        .map(|class| {
            class
                .children()
                .iter()
                .filter(|c| {
                    graph
                        .node(c)
                        .is_some_and(|n| matches!(n.type_name(), "Method" | "Constructor"))
                })
                .count()
        })
        .unwrap_or(0);
    if let Some(class) = graph.node_mut(class_id) {
        class.attrs_mut().set_int(attr::NUM_METHODS, count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, ty: &str, dir: Option<&str>) -> Node {
        let mut n = Node::new(ty);
        n.set_id(id);
        n.set_source_name(id.rsplit('.').next().unwrap_or(id));
        if let Some(dir) = dir {
            n.attrs_mut().set_string(attr::SOURCE_PATH, dir);
        }
        n
    }

    fn java_graph() -> Graph {
        let mut g = Graph::new("j");
        g.add_node(node("com/example/", "Directory", None)).unwrap();
        g.add_node(node("com/example/Foo.java", "File", Some("com/example/")))
            .unwrap();
        g.add_node(node("Foo", "Class", Some("com/example/"))).unwrap();
        g.add_node(node("Foo.run", "Method", Some("com/example/"))).unwrap();
        g.add_node(node("Foo.size", "Field", Some("com/example/"))).unwrap();
        g.reparent("com/example/Foo.java", Some("com/example/")).unwrap();
        g.reparent("Foo", Some("com/example/Foo.java")).unwrap();
        g.reparent("Foo.run", Some("Foo")).unwrap();
        g.reparent("Foo.size", Some("Foo")).unwrap();
        g
    }

    #[test]
    fn classes_move_under_synthesised_packages() {
        let mut g = java_graph();
        synthesize_packages(&mut g).unwrap();

        let package = g.node("com.example").expect("package node");
        assert_eq!(package.type_name(), "Package");
        assert_eq!(package.parent(), Some("com/example/"));
        assert_eq!(g.node("Foo").unwrap().parent(), Some("com.example"));
    }

    #[test]
    fn num_methods_counts_methods_not_fields() {
        let mut g = java_graph();
        synthesize_packages(&mut g).unwrap();
        assert_eq!(g.node("Foo").unwrap().attrs().int(attr::NUM_METHODS), Some(1));
    }

    #[test]
    fn nested_classes_stay_in_their_enclosing_class() {
        let mut g = java_graph();
        g.add_node(node("Foo.Inner", "Class", Some("com/example/"))).unwrap();
        g.reparent("Foo.Inner", Some("Foo")).unwrap();
        synthesize_packages(&mut g).unwrap();
        assert_eq!(g.node("Foo.Inner").unwrap().parent(), Some("Foo"));
    }

    #[test]
    fn shared_package_is_created_once() {
        let mut g = java_graph();
        g.add_node(node("Bar", "Class", Some("com/example/"))).unwrap();
        synthesize_packages(&mut g).unwrap();
        assert_eq!(g.node("Bar").unwrap().parent(), Some("com.example"));
        assert_eq!(
            g.nodes().filter(|n| n.type_name() == "Package").count(),
            1
        );
    }

    #[test]
    fn graph_without_classes_is_untouched() {
        let mut g = Graph::new("plain");
        g.add_node(node("src/", "Directory", None)).unwrap();
        synthesize_packages(&mut g).unwrap();
        assert_eq!(g.node_count(), 1);
    }
}
