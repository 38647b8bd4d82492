//! GXL serialization.
//!
//! Writes the graph as GXL 1.0: typed nodes and edges with their attribute
//! stores (toggle -> `enum`, string, int, float) plus one out-of-band
//! `Belongs_To` edge per parent link so consumers can rebuild the hierarchy.

use std::io::Cursor;
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::OutputError;
use crate::graph::{Attributable, Graph};

/// Edge type connecting a child node to its parent in the output.
const HIERARCHY_EDGE_TYPE: &str = "Belongs_To";

/// Serializes the graph to a GXL string.
pub fn to_gxl(graph: &Graph) -> Result<String, OutputError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(serialize_err)?;

    let mut gxl = BytesStart::new("gxl");
    gxl.push_attribute(("xmlns:xlink", "http://www.w3.org/1999/xlink"));
    writer.write_event(Event::Start(gxl)).map_err(serialize_err)?;

    let mut graph_el = BytesStart::new("graph");
    graph_el.push_attribute(("id", graph.name()));
    graph_el.push_attribute(("edgeids", "true"));
    graph_el.push_attribute(("edgemode", "directed"));
    writer
        .write_event(Event::Start(graph_el))
        .map_err(serialize_err)?;

    // Deterministic output: nodes and edges in id order.
    let mut node_ids: Vec<&str> = graph.nodes().map(|n| n.id()).collect();
    node_ids.sort_unstable();
    for id in &node_ids {
        let Some(node) = graph.node(id) else { continue };
        let mut el = BytesStart::new("node");
        el.push_attribute(("id", *id));
        writer.write_event(Event::Start(el)).map_err(serialize_err)?;
        write_type(&mut writer, node.type_name())?;
        write_attributes(&mut writer, node)?;
        writer
            .write_event(Event::End(BytesEnd::new("node")))
            .map_err(serialize_err)?;
    }

    let mut edge_ids: Vec<String> = graph.edges().map(|e| e.id()).collect();
    edge_ids.sort_unstable();
    for id in &edge_ids {
        let Some(edge) = graph.edge(id) else { continue };
        let mut el = BytesStart::new("edge");
        el.push_attribute(("id", id.as_str()));
        el.push_attribute(("from", edge.source()));
        el.push_attribute(("to", edge.target()));
        writer.write_event(Event::Start(el)).map_err(serialize_err)?;
        write_type(&mut writer, edge.type_name())?;
        write_attributes(&mut writer, edge)?;
        writer
            .write_event(Event::End(BytesEnd::new("edge")))
            .map_err(serialize_err)?;
    }

    // Hierarchy edges, child -> parent.
    for id in &node_ids {
        let Some(node) = graph.node(id) else { continue };
        let Some(parent) = node.parent() else { continue };
        let mut el = BytesStart::new("edge");
        let edge_id = format!("{HIERARCHY_EDGE_TYPE}#{id}#{parent}");
        el.push_attribute(("id", edge_id.as_str()));
        el.push_attribute(("from", *id));
        el.push_attribute(("to", parent));
        writer.write_event(Event::Start(el)).map_err(serialize_err)?;
        write_type(&mut writer, HIERARCHY_EDGE_TYPE)?;
        writer
            .write_event(Event::End(BytesEnd::new("edge")))
            .map_err(serialize_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("graph")))
        .map_err(serialize_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("gxl")))
        .map_err(serialize_err)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| OutputError::Serialize(e.to_string()))
}

/// Writes the graph to `path`. Refuses to clobber an existing file unless
/// `overwrite` is set; callers check this before importing as well so the
/// failure surfaces early.
pub fn write_gxl_file(graph: &Graph, path: &Path, overwrite: bool) -> Result<(), OutputError> {
    ensure_writable(path, overwrite)?;
    let gxl = to_gxl(graph)?;
    std::fs::write(path, gxl).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// The pre-import output check: exists and no overwrite is a setup failure.
pub fn ensure_writable(path: &Path, overwrite: bool) -> Result<(), OutputError> {
    if path.exists() && !overwrite {
        return Err(OutputError::AlreadyExists(path.to_path_buf()));
    }
    Ok(())
}

fn write_type<W: std::io::Write>(
    writer: &mut Writer<W>,
    type_name: &str,
) -> Result<(), OutputError> {
    let mut el = BytesStart::new("type");
    el.push_attribute(("xlink:href", type_name));
    writer.write_event(Event::Empty(el)).map_err(serialize_err)
}

fn write_attributes<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &impl Attributable,
) -> Result<(), OutputError> {
    let attrs = element.attrs();
    for name in attrs.toggles() {
        write_attr(writer, name, "enum", "true")?;
    }
    for (name, value) in attrs.strings() {
        write_attr(writer, name, "string", value)?;
    }
    for (name, value) in attrs.ints() {
        write_attr(writer, name, "int", &value.to_string())?;
    }
    for (name, value) in attrs.floats() {
        write_attr(writer, name, "float", &value.to_string())?;
    }
    Ok(())
}

fn write_attr<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    kind: &str,
    value: &str,
) -> Result<(), OutputError> {
    let mut attr = BytesStart::new("attr");
    attr.push_attribute(("name", name));
    writer.write_event(Event::Start(attr)).map_err(serialize_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(kind)))
        .map_err(serialize_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(serialize_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(kind)))
        .map_err(serialize_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("attr")))
        .map_err(serialize_err)
}

fn serialize_err(e: impl std::fmt::Display) -> OutputError {
    OutputError::Serialize(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn sample() -> Graph {
        let mut g = Graph::new("demo");
        let mut dir = Node::new("Directory");
        dir.set_id("src/");
        dir.set_source_name("src");
        g.add_node(dir).unwrap();

        let mut func = Node::new("Function");
        func.set_id("lib.foo");
        func.set_source_name("foo");
        func.attrs_mut().set_int("Metric.Lines.LOC", 3);
        func.attrs_mut().set_float("Score", 0.5);
        func.attrs_mut().set_toggle("Deprecated");
        g.add_node(func).unwrap();

        g.reparent("lib.foo", Some("src/")).unwrap();
        g.add_edge(Edge::new("Call", "lib.foo", "src/")).unwrap();
        g.finalize();
        g
    }

    #[test]
    fn gxl_contains_typed_nodes_and_attributes() {
        let gxl = to_gxl(&sample()).unwrap();
        assert!(gxl.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(gxl.contains("<graph id=\"demo\" edgeids=\"true\""));
        assert!(gxl.contains("<node id=\"lib.foo\">"));
        assert!(gxl.contains("<type xlink:href=\"Function\"/>"));
        assert!(gxl.contains("<attr name=\"Metric.Lines.LOC\">"));
        assert!(gxl.contains("<int>3</int>"));
        assert!(gxl.contains("<float>0.5</float>"));
        assert!(gxl.contains("<attr name=\"Deprecated\">"));
        assert!(gxl.contains("<enum>true</enum>"));
    }

    #[test]
    fn gxl_contains_semantic_and_hierarchy_edges() {
        let gxl = to_gxl(&sample()).unwrap();
        assert!(gxl.contains("<edge id=\"Call#lib.foo#src/\" from=\"lib.foo\" to=\"src/\">"));
        assert!(gxl.contains("xlink:href=\"Belongs_To\""));
        assert!(gxl.contains("<edge id=\"Belongs_To#lib.foo#src/\""));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut g = Graph::new("esc");
        let mut node = Node::new("Function");
        node.set_id("a");
        node.attrs_mut().set_string("Source.Name", "operator<&>");
        g.add_node(node).unwrap();

        let gxl = to_gxl(&g).unwrap();
        assert!(gxl.contains("operator&lt;&amp;&gt;"));
        assert!(!gxl.contains("operator<&>"));
    }

    #[test]
    fn existing_output_without_overwrite_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gxl");
        std::fs::write(&path, "old").unwrap();

        let err = write_gxl_file(&sample(), &path, false).unwrap_err();
        assert!(matches!(err, OutputError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");

        write_gxl_file(&sample(), &path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("<gxl"));
    }
}
