//! # Model Configuration
//!
//! JSON description of a model, turned into the unconnected [`LayerNode`]
//! set the assembler consumes.
//!
//! ```json
//! {
//!   "name": "lenet",
//!   "layout": "sequential",
//!   "layers": [
//!     {"name": "input", "class_name": "Input", "dims": [28, 28, 1]},
//!     {"name": "conv", "class_name": "Conv2D", "filters": 32, "kernel_size": [5, 5]},
//!     {"class_name": "MaxPool2D", "pool_size": [2, 2]},
//!     {"class_name": "Flatten"},
//!     {"name": "logits", "class_name": "Dense", "units": 10, "activation": "softmax"}
//!   ]
//! }
//! ```
//!
//! In the *functional* layout every layer lists its `inbound` layers by name.
//! In the *sequential* layout layers are chained in declaration order; the
//! Input entry feeds the first other layer, wherever it is declared.

use crate::graph::{LayerNode, NodeId, OrderedGraph};
use crate::nn::LayerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Layer '{layer}' lists inbound layer '{inbound}', which is not declared. \
             Inbound layers must be referenced by their exact name.")]
    UnknownInbound { layer: String, inbound: String },

    #[error("Layer name '{0}' is declared more than once in the configuration.")]
    DuplicateLayerName(String),

    #[error("Layer '{0}' declares inbound layers, but the sequential layout chains layers by order. \
             Use the functional layout for explicit connections.")]
    InboundInSequential(String),

    #[error("The configuration declares no layers.")]
    EmptyModel,
}

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Functional,
    Sequential,
}

fn default_trainable() -> bool {
    true
}

/// One declared layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    /// Empty means "generate a name during assembly".
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub layer: LayerKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound: Vec<String>,
    #[serde(default = "default_trainable")]
    pub trainable: bool,
}

impl LayerEntry {
    pub fn new(name: &str, layer: LayerKind) -> Self {
        Self {
            name: name.to_string(),
            layer,
            inbound: Vec::new(),
            trainable: true,
        }
    }

    pub fn with_inbound(mut self, inbound: &[&str]) -> Self {
        self.inbound = inbound.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layout: Layout,
    pub layers: Vec<LayerEntry>,
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Describes an assembled graph in the functional layout.
    pub fn from_graph(name: &str, graph: &OrderedGraph) -> Self {
        let layers = graph
            .iter()
            .map(|node| LayerEntry {
                name: node.name.clone(),
                layer: node.kind.clone(),
                inbound: node.inbound.iter().map(|&i| graph.nodes()[i].name.clone()).collect(),
                trainable: node.trainable,
            })
            .collect();
        Self {
            name: name.to_string(),
            layout: Layout::Functional,
            layers,
        }
    }

    /// Builds the unconnected node set, in declaration order.
    pub fn to_layer_nodes(&self) -> Result<Vec<LayerNode>> {
        if self.layers.is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        let mut ids: HashMap<&str, NodeId> = HashMap::new();
        for (id, entry) in self.layers.iter().enumerate() {
            if entry.name.is_empty() {
                continue;
            }
            if ids.insert(entry.name.as_str(), id).is_some() {
                return Err(ConfigError::DuplicateLayerName(entry.name.clone()));
            }
        }

        let inbound = match self.layout {
            Layout::Functional => self.functional_edges(&ids)?,
            Layout::Sequential => self.sequential_edges()?,
        };

        Ok(self
            .layers
            .iter()
            .zip(inbound)
            .enumerate()
            .map(|(id, (entry, inbound))| {
                let mut node = LayerNode::new(&entry.name, entry.layer.clone())
                    .with_inbound(&inbound)
                    .with_trainable(entry.trainable);
                node.id = id;
                node
            })
            .collect())
    }

    fn functional_edges(&self, ids: &HashMap<&str, NodeId>) -> Result<Vec<Vec<NodeId>>> {
        self.layers
            .iter()
            .map(|entry| {
                entry
                    .inbound
                    .iter()
                    .map(|name| {
                        ids.get(name.as_str()).copied().ok_or_else(|| ConfigError::UnknownInbound {
                            layer: entry.name.clone(),
                            inbound: name.clone(),
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Chains layers in order. Only the Input-kind entry is left out of the
    /// chain, at whatever position it is declared.
    fn sequential_edges(&self) -> Result<Vec<Vec<NodeId>>> {
        if let Some(entry) = self.layers.iter().find(|e| !e.inbound.is_empty()) {
            return Err(ConfigError::InboundInSequential(entry.name.clone()));
        }

        let mut edges = vec![Vec::new(); self.layers.len()];
        let input = self
            .layers
            .iter()
            .position(|e| matches!(e.layer, LayerKind::Input(_)));
        let mut previous = input;
        for (id, entry) in self.layers.iter().enumerate() {
            if matches!(entry.layer, LayerKind::Input(_)) {
                continue;
            }
            if let Some(prev) = previous {
                edges[id].push(prev);
            }
            previous = Some(id);
        }
        Ok(edges)
    }
}
