//! Module for shape inference (Shape Inference).
//!
//! Traverses the ordered layer graph and determines the output shape of each
//! node from its inbound shapes and its kind. The same pass declares the
//! node's parameters, whose shapes depend on the resolved inbound shape.

use crate::graph::{LayerNode, OrderedGraph, ParamDecl, TensorShape};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Incompatible shapes for {kind} layer '{layer}': {first} and {other}. \
             All inputs of a merge layer must share their non-batch dimensions.")]
    IncompatibleMergeShapes {
        layer: String,
        kind: String,
        first: TensorShape,
        other: TensorShape,
    },

    #[error("Invalid tensor rank for {kind} layer '{layer}': expected {expected}D, got {actual}D. \
             Check the output of its inbound layer.")]
    InvalidRank {
        layer: String,
        kind: String,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} layer '{layer}' expects {expected} inbound layer(s), got {actual}.")]
    ArityMismatch {
        layer: String,
        kind: String,
        expected: String,
        actual: usize,
    },

    #[error("Output shape {shape} of {kind} layer '{layer}' has a non-positive dimension. \
             The kernel or pool window is probably larger than its input.")]
    NonPositiveDimension {
        layer: String,
        kind: String,
        shape: TensorShape,
    },

    #[error("Axis {axis} of layer '{layer}' is out of range for rank {rank} (the batch axis 0 is not allowed).")]
    InvalidAxis { layer: String, axis: i64, rank: usize },

    #[error("Invalid configuration of {kind} layer '{layer}': {reason}.")]
    InvalidConfig {
        layer: String,
        kind: String,
        reason: String,
    },

    #[error("Shape information missing for inbound layer '{inbound}' of '{layer}'. \
             Layers must be resolved in topological order.")]
    MissingInboundShape { layer: String, inbound: String },

    #[error("Input layer '{0}' declares an empty shape. Declare at least one non-batch dimension.")]
    EmptyInputShape(String),

    #[error("Shape inference not implemented for layer kind: {0}.")]
    UnsupportedKind(String),
}

type Result<T> = std::result::Result<T, ShapeError>;

/// Structure that performs shape resolution for an [`OrderedGraph`].
pub struct ShapeResolver;

impl ShapeResolver {
    /// Runs shape resolution over the graph.
    ///
    /// Fills `output_shape` and `params` for every node. Nothing is written
    /// unless every node resolves, and re-running on a resolved graph
    /// reproduces the same annotations.
    pub fn resolve(graph: &mut OrderedGraph) -> Result<()> {
        let mut resolved: Vec<Option<(TensorShape, Vec<ParamDecl>)>> = vec![None; graph.len()];

        for &id in graph.order() {
            let node = &graph.nodes()[id];
            let inputs = Self::inbound_shapes(graph, node, &resolved)?;
            let shape = Self::infer_node_shape(node, &inputs)?;
            let params = match inputs.first() {
                Some(input) => node.kind.param_decls(input),
                None => Vec::new(),
            };
            debug!(
                "{} ({}): output {}, {} parameter(s)",
                node.name,
                node.kind,
                shape,
                params.len()
            );
            resolved[id] = Some((shape, params));
        }

        for (id, entry) in resolved.into_iter().enumerate() {
            if let (Some(node), Some((shape, params))) = (graph.node_mut(id), entry) {
                node.output_shape = Some(shape);
                node.params = params;
            }
        }
        Ok(())
    }

    /// Collects every shape error in the graph instead of stopping at the first.
    ///
    /// Nodes downstream of a failed node are skipped, since their inputs are
    /// unknown. The graph is not modified.
    pub fn diagnose(graph: &OrderedGraph) -> Vec<ShapeError> {
        let mut shapes: Vec<Option<TensorShape>> = vec![None; graph.len()];
        let mut errors = Vec::new();

        for &id in graph.order() {
            let node = &graph.nodes()[id];
            let inputs: Option<Vec<TensorShape>> =
                node.inbound.iter().map(|&i| shapes[i].clone()).collect();
            let Some(inputs) = inputs else {
                continue;
            };
            match Self::infer_node_shape(node, &inputs) {
                Ok(shape) => shapes[id] = Some(shape),
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    fn inbound_shapes(
        graph: &OrderedGraph,
        node: &LayerNode,
        resolved: &[Option<(TensorShape, Vec<ParamDecl>)>],
    ) -> Result<Vec<TensorShape>> {
        node.inbound
            .iter()
            .map(|&i| {
                resolved[i]
                    .as_ref()
                    .map(|(shape, _)| shape.clone())
                    .ok_or_else(|| ShapeError::MissingInboundShape {
                        layer: node.name.clone(),
                        inbound: graph.nodes()[i].name.clone(),
                    })
            })
            .collect()
    }

    /// Infers the output shape of a single node and checks it is usable.
    fn infer_node_shape(node: &LayerNode, inputs: &[TensorShape]) -> Result<TensorShape> {
        let shape = node.kind.output_shape(&node.name, inputs)?;
        if shape.dims.iter().any(|&d| d == 0) {
            return Err(ShapeError::NonPositiveDimension {
                layer: node.name.clone(),
                kind: node.kind.type_name().to_string(),
                shape,
            });
        }
        Ok(shape)
    }
}
