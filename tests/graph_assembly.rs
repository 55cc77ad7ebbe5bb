//! Assembly and shape resolution of non-sequential graphs.

use rustylayers::analysis::{ShapeError, ShapeResolver};
use rustylayers::graph::{GraphAssembler, GraphBuilder, GraphError, LayerNode};
use rustylayers::model::{Model, ModelError};
use rustylayers::nn::{
    BatchNormConfig, ConcatenateConfig, Conv2dConfig, DenseConfig, LayerKind, Padding,
    SeparableConv2dConfig,
};

fn residual_block() -> Vec<LayerNode> {
    let mut b = GraphBuilder::new();
    let x = b.input("image", &[8, 8, 3]);
    let main = b.layer(
        "main",
        LayerKind::Conv2d(Conv2dConfig::new(4, (3, 3)).with_padding(Padding::Same)),
        &[x],
    );
    let bn = b.layer("bn", LayerKind::BatchNorm(BatchNormConfig::new()), &[main]);
    let skip = b.layer("skip", LayerKind::Conv2d(Conv2dConfig::new(4, (1, 1))), &[x]);
    let sum = b.layer("", LayerKind::Add, &[bn, skip]);
    let gap = b.layer("", LayerKind::GlobalAvgPool2d, &[sum]);
    b.layer("head", LayerKind::Dense(DenseConfig::new(2)), &[gap]);
    b.into_nodes()
}

#[test]
fn residual_block_resolves_shapes_and_params() {
    let model = Model::compile("residual", residual_block()).unwrap();
    let shape = |name: &str| model.layer(name).unwrap().output_shape.clone().unwrap().dims;

    assert_eq!(shape("main"), vec![8, 8, 4]);
    assert_eq!(shape("bn"), vec![8, 8, 4]);
    assert_eq!(shape("skip"), vec![8, 8, 4]);
    assert_eq!(shape("head"), vec![2]);

    // bn: gamma, beta, moving mean, moving variance
    assert_eq!(model.layer("bn").unwrap().params.len(), 4);
    assert_eq!(model.registry().len(), 2 + 4 + 2 + 2);
    let (trainable, frozen) = model.registry().param_counts();
    assert_eq!(frozen, 8);
    assert_eq!(trainable, (3 * 3 * 3 * 4 + 4) + 8 + (3 * 4 + 4) + (4 * 2 + 2));

    let names = model.graph().layer_names();
    assert!(names.contains(&"add_4".to_string()));
    assert!(names.contains(&"globalavgpool2d_5".to_string()));
}

#[test]
fn definition_from_output_drops_unused_branches() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[6]);
    let used = b.layer("used", LayerKind::Dense(DenseConfig::new(3)), &[x]);
    b.layer("unused", LayerKind::Dense(DenseConfig::new(5)), &[x]);
    let out = b.layer("out", LayerKind::Dense(DenseConfig::new(1)), &[used]);

    let model = Model::compile_from_output("pruned", b.into_nodes(), out).unwrap();
    assert_eq!(model.graph().layer_names(), vec!["x", "used", "out"]);
    assert!(model.layer("unused").is_none());
}

#[test]
fn dangling_layer_is_reported_unreachable() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[6]);
    b.layer("fc", LayerKind::Dense(DenseConfig::new(3)), &[x]);
    b.layer("orphan", LayerKind::Flatten, &[]);

    match GraphAssembler::assemble(b.into_nodes()) {
        Err(GraphError::UnreachableLayer(layers)) => {
            assert_eq!(layers, vec![("orphan".to_string(), "Flatten".to_string())]);
        }
        other => panic!("expected an unreachable layer, got {:?}", other),
    }
}

#[test]
fn cycle_is_rejected() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[6]);
    let a = b.layer("a", LayerKind::Dense(DenseConfig::new(6)), &[x]);
    let c = b.layer("c", LayerKind::Add, &[a]);
    b.node_mut(a).unwrap().inbound.push(c);

    assert!(matches!(
        GraphAssembler::assemble(b.into_nodes()),
        Err(GraphError::CyclicGraph(_))
    ));
}

#[test]
fn two_inputs_are_rejected() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[2]);
    let y = b.input("y", &[2]);
    b.layer("sum", LayerKind::Add, &[x, y]);
    assert!(matches!(
        GraphAssembler::assemble(b.into_nodes()),
        Err(GraphError::MultipleOrMissingInput { count: 2, .. })
    ));
}

#[test]
fn merge_mismatch_fails_compilation_and_diagnose_collects_it() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[4]);
    let a = b.layer("a", LayerKind::Dense(DenseConfig::new(4)), &[x]);
    let c = b.layer("c", LayerKind::Dense(DenseConfig::new(5)), &[x]);
    let sum = b.layer("sum", LayerKind::Add, &[a, c]);
    b.layer("head", LayerKind::Dense(DenseConfig::new(1)), &[sum]);
    let nodes = b.into_nodes();

    let err = Model::compile("broken", nodes.clone()).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Shape(ShapeError::IncompatibleMergeShapes { ref layer, .. }) if layer == "sum"
    ));

    let graph = GraphAssembler::assemble(nodes).unwrap();
    let errors = ShapeResolver::diagnose(&graph);
    assert_eq!(errors.len(), 1);
    assert!(!graph.is_resolved());
}

#[test]
fn concatenate_and_separable_conv() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", &[16, 16, 3]);
    let left = b.layer(
        "left",
        LayerKind::SeparableConv2d(SeparableConv2dConfig::new(8, (3, 3)).with_padding(Padding::Same)),
        &[x],
    );
    let right = b.layer(
        "right",
        LayerKind::Conv2d(Conv2dConfig::new(4, (3, 3)).with_padding(Padding::Same)),
        &[x],
    );
    b.layer("cat", LayerKind::Concatenate(ConcatenateConfig::new(-1)), &[left, right]);

    let model = Model::compile("branches", b.into_nodes()).unwrap();
    assert_eq!(model.layer("cat").unwrap().output_shape.as_ref().unwrap().dims, vec![16, 16, 12]);
    let left_slots: Vec<&str> = model
        .registry()
        .slots_for(model.layer("left").unwrap().id)
        .into_iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        left_slots,
        vec![
            "left_separable_conv2d_depthwise_kernel",
            "left_separable_conv2d_pointwise_kernel",
            "left_separable_conv2d_bias"
        ]
    );
}
