//! Integration tests for macros and undo
//!
//! These tests validate the macro lifecycle through a `Workspace`:
//! - Defining a macro from a copied selection
//! - Instances following prototype edits
//! - Nested macros, renaming and removal
//! - Documents carrying macros, and undo/redo across macro edits

mod common;

use common::{assert_float_eq, image_at, number_at};
use specgraph::graph::{
    ConnType, Graph, GraphError, GraphResult, NodeKind, NodeState, SavedGraph, TypeRegistry,
    Workspace,
};

/// `macroin -> crop -> macroout`, with the crop size as given
fn crop_proto(size: u64) -> impl FnOnce(&mut Graph, &TypeRegistry) -> GraphResult<()> {
    move |g: &mut Graph, reg: &TypeRegistry| {
        let input = g.create(reg, "macroin")?;
        let crop = g.create(reg, "crop")?;
        let output = g.create(reg, "macroout")?;
        g.set_display_name(input, "image")?;
        g.set_display_name(output, "cropped")?;
        g.set_param(crop, "w", size)?;
        g.set_param(crop, "h", size)?;
        g.connect(crop, 0, input, 0);
        g.connect(output, 0, crop, 0);
        Ok(())
    }
}

#[test]
fn test_macro_from_selection() {
    let mut ws = Workspace::new();
    let input = ws.create("macroin").unwrap();
    let mean = ws.create("mean").unwrap();
    let output = ws.create("macroout").unwrap();
    ws.graph_mut()
        .set_param(output, "conn_type", "number")
        .unwrap();
    ws.graph_mut().connect(mean, 0, input, 0);
    ws.graph_mut().connect(output, 0, mean, 0);
    let selection = ws.copy(&[input, mean, output]);
    for id in [output, mean, input] {
        ws.graph_mut().remove(id).unwrap();
    }

    ws.define_macro("average", &selection).unwrap();
    let t = ws.registry().resolve("average").unwrap();
    assert_eq!(t.kind, NodeKind::Macro);
    assert_eq!(t.inputs[0].conn_type, ConnType::Img);
    assert_eq!(t.outputs[0].conn_type, ConnType::Number);

    let gen = ws.create("gen").unwrap();
    let inst = ws.create("average").unwrap();
    assert!(ws.graph_mut().connect(inst, 0, gen, 0).is_connected());
    assert_float_eq(number_at(ws.graph(), inst, 0), 0.5, 1e-6);
}

#[test]
fn test_instances_follow_edits() {
    let mut ws = Workspace::new();
    ws.define_macro("thumb", &SavedGraph::default()).unwrap();
    ws.edit_macro("thumb", crop_proto(8)).unwrap();

    let gen = ws.create("gen").unwrap();
    let a = ws.create("thumb").unwrap();
    let b = ws.create("thumb").unwrap();
    ws.graph_mut().connect(a, 0, gen, 0);
    ws.graph_mut().connect(b, 0, gen, 0);
    assert_eq!(image_at(ws.graph(), a, 0).width(), 8);
    assert_eq!(ws.instance_count("thumb"), 2);

    ws.edit_macro("thumb", |g, _| {
        let crop = g.find("crop0").ok_or(GraphError::NoSuchName("crop0".into()))?;
        g.set_param(crop, "w", 4)
    })
    .unwrap();

    for inst in [a, b] {
        let node = ws.graph().get(inst).unwrap();
        assert_eq!(node.state(), NodeState::Clean);
        assert_eq!(node.input(0).map(|l| l.node), Some(gen));
        assert_eq!(image_at(ws.graph(), inst, 0).width(), 4);
        assert_eq!(image_at(ws.graph(), inst, 0).height(), 8);
    }
}

#[test]
fn test_inner_failure_surfaces_on_instance() {
    let mut ws = Workspace::new();
    ws.define_macro("thumb", &SavedGraph::default()).unwrap();
    ws.edit_macro("thumb", |g, reg| {
        crop_proto(8)(g, reg)?;
        let crop = g.find("crop0").ok_or(GraphError::NoSuchName("crop0".into()))?;
        g.set_param(crop, "x", 1000)
    })
    .unwrap();

    let gen = ws.create("gen").unwrap();
    let inst = ws.create("thumb").unwrap();
    ws.graph_mut().connect(inst, 0, gen, 0);
    let node = ws.graph().get(inst).unwrap();
    assert_eq!(node.state(), NodeState::Error);
    let err = node.error().unwrap();
    assert_eq!(err.code, "MACRO");
    assert!(err.message.contains("crop0"));
    assert_eq!(ws.graph().get(gen).unwrap().state(), NodeState::Clean);
}

#[test]
fn test_recursive_edit_is_rolled_back() {
    let mut ws = Workspace::new();
    ws.define_macro("outer", &SavedGraph::default()).unwrap();
    ws.define_macro("inner", &SavedGraph::default()).unwrap();
    ws.edit_macro("inner", |g, reg| g.create(reg, "outer").map(|_| ()))
        .unwrap();

    let err = ws
        .edit_macro("outer", |g, reg| g.create(reg, "inner").map(|_| ()))
        .unwrap_err();
    assert!(matches!(err, GraphError::Macro(_)));
    assert!(ws.library().get("outer").unwrap().graph().is_empty());
    assert_eq!(ws.instance_count("outer"), 1);
    assert_eq!(ws.instance_count("inner"), 0);
}

#[test]
fn test_rename_updates_nested_references() {
    let mut ws = Workspace::new();
    ws.define_macro("thumb", &SavedGraph::default()).unwrap();
    ws.edit_macro("thumb", crop_proto(8)).unwrap();
    ws.define_macro("wrapper", &SavedGraph::default()).unwrap();
    ws.edit_macro("wrapper", |g, reg| g.create(reg, "thumb").map(|_| ()))
        .unwrap();
    let top = ws.create("thumb").unwrap();

    ws.rename_macro("thumb", "small").unwrap();
    assert_eq!(ws.graph().get(top).unwrap().type_name(), "small");
    let wrapper = ws.library().get("wrapper").unwrap().graph();
    assert!(wrapper.nodes().all(|n| n.type_name() == "small"));
    assert_eq!(ws.instance_count("small"), 2);
    assert!(ws.create("thumb").is_err());

    assert!(ws.remove_macro("small").is_err());
}

#[test]
fn test_document_with_macros_round_trips() {
    let mut ws = Workspace::new();
    ws.define_macro("thumb", &SavedGraph::default()).unwrap();
    ws.edit_macro("thumb", crop_proto(6)).unwrap();
    let gen = ws.create("gen").unwrap();
    let inst = ws.create("thumb").unwrap();
    let mean = ws.create("mean").unwrap();
    ws.graph_mut().connect(inst, 0, gen, 0);
    ws.graph_mut().connect(mean, 0, inst, 0);

    let doc = ws.save_document();
    assert!(doc.macros.contains_key("thumb"));
    let json = doc.to_json_string().unwrap();

    let mut other = Workspace::new();
    let report = other
        .load_document(&specgraph::graph::SavedDocument::from_json_str(&json).unwrap())
        .unwrap();
    assert!(report.is_clean());
    let inst = other.graph().find("thumb0").unwrap();
    assert_eq!(image_at(other.graph(), inst, 0).width(), 6);
    let mean = other.graph().find("mean0").unwrap();
    assert_float_eq(number_at(other.graph(), mean, 0), 0.5, 1e-6);
    assert_eq!(other.save_document(), doc);
}

#[test]
fn test_undo_across_macro_edit() {
    let mut ws = Workspace::new();
    ws.define_macro("thumb", &SavedGraph::default()).unwrap();
    ws.edit_macro("thumb", crop_proto(8)).unwrap();
    let gen = ws.create("gen").unwrap();
    let inst = ws.create("thumb").unwrap();
    ws.graph_mut().connect(inst, 0, gen, 0);

    ws.checkpoint();
    ws.edit_macro("thumb", |g, _| {
        let crop = g.find("crop0").ok_or(GraphError::NoSuchName("crop0".into()))?;
        g.set_param(crop, "w", 2)
    })
    .unwrap();
    let inst_now = ws.graph().find("thumb0").unwrap();
    assert_eq!(image_at(ws.graph(), inst_now, 0).width(), 2);

    ws.undo().unwrap();
    let inst_now = ws.graph().find("thumb0").unwrap();
    assert_eq!(image_at(ws.graph(), inst_now, 0).width(), 8);
    assert!(ws.can_redo());

    ws.redo().unwrap();
    let inst_now = ws.graph().find("thumb0").unwrap();
    assert_eq!(image_at(ws.graph(), inst_now, 0).width(), 2);
}
