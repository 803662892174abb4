//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use specgraph::graph::{Graph, ImageCube, NodeId};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// The image on `id`'s output `index`, panicking if there is none
pub fn image_at(graph: &Graph, id: NodeId, index: usize) -> &ImageCube {
    graph
        .get(id)
        .ok()
        .and_then(|n| n.output(index))
        .and_then(|d| d.as_image())
        .unwrap_or_else(|| panic!("{:?}:{} holds no image", id, index))
}

/// The number on `id`'s output `index`, panicking if there is none
pub fn number_at(graph: &Graph, id: NodeId, index: usize) -> f64 {
    graph
        .get(id)
        .ok()
        .and_then(|n| n.output(index))
        .and_then(|d| d.as_number())
        .unwrap_or_else(|| panic!("{:?}:{} holds no number", id, index))
}

/// Every node's outputs, keyed by name, rendered for comparison
pub fn output_snapshot(graph: &Graph) -> Vec<(String, Vec<String>)> {
    let mut rows: Vec<(String, Vec<String>)> = graph
        .nodes()
        .map(|n| {
            let outs = n
                .outputs()
                .iter()
                .map(|o| o.as_ref().map(|d| d.to_string()).unwrap_or_default())
                .collect();
            (n.name().to_string(), outs)
        })
        .collect();
    rows.sort();
    rows
}
