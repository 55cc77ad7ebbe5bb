//! Tabular summary of a compiled model.

use crate::graph::OrderedGraph;
use crate::variables::VariableRegistry;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: String,
    pub output_shape: String,
    pub param_count: usize,
    pub inbound: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model_name: String,
    pub layers: Vec<LayerSummary>,
    pub trainable_params: usize,
    pub frozen_params: usize,
}

impl ModelSummary {
    pub fn new(model_name: &str, graph: &OrderedGraph, registry: &VariableRegistry) -> Self {
        let layers = graph
            .iter()
            .map(|node| LayerSummary {
                name: node.name.clone(),
                kind: node.kind.type_name().to_string(),
                output_shape: node
                    .output_shape
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                param_count: node.param_count(),
                inbound: node.inbound.iter().map(|&i| graph.nodes()[i].name.clone()).collect(),
            })
            .collect();
        let (trainable_params, frozen_params) = registry.param_counts();
        Self {
            model_name: model_name.to_string(),
            layers,
            trainable_params,
            frozen_params,
        }
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params + self.frozen_params
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(86);
        writeln!(f, "Model: \"{}\"", self.model_name)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "{:<32} {:<22} {:>10}   {}", "Layer (type)", "Output Shape", "Param #", "Connected to")?;
        writeln!(f, "{}", rule)?;
        for layer in &self.layers {
            writeln!(
                f,
                "{:<32} {:<22} {:>10}   {}",
                format!("{} ({})", layer.name, layer.kind),
                layer.output_shape,
                layer.param_count,
                layer.inbound.join(", ")
            )?;
        }
        writeln!(f, "{}", rule)?;
        writeln!(f, "Total params: {}", self.total_params())?;
        writeln!(f, "Trainable params: {}", self.trainable_params)?;
        write!(f, "Non-trainable params: {}", self.frozen_params)
    }
}
