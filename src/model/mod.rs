//! # Model
//!
//! Facade over the whole pipeline:
//!
//! ```text
//! LayerNodes -> GraphAssembler -> ShapeResolver -> VariableRegistry -> WeightBindingEngine
//! ```
//!
//! A [`Model`] is always compiled: construction assembles the graph, resolves
//! every shape and registers every parameter slot. Slots are then filled
//! once, either by [`Model::init`] or by one of the weight loading methods.

pub mod summary;

pub use summary::{LayerSummary, ModelSummary};

use crate::analysis::{ShapeError, ShapeResolver};
use crate::binding::{
    BindError, BindingReport, BindingResult, BindingScope, NamingConvention, NamingStrategy,
    WeightBindingEngine,
};
use crate::config::{ConfigError, ModelConfig};
use crate::graph::{GraphAssembler, GraphError, LayerNode, NodeId, OrderedGraph};
use crate::store::{save_safetensors, StoreError, WeightStore};
use crate::variables::{RegistryError, VariableRegistry};
use log::{debug, info};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Binding error: {0}")]
    Bind(#[from] BindError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    graph: OrderedGraph,
    registry: VariableRegistry,
}

impl Model {
    /// Compiles a model from an explicit, complete list of layers.
    pub fn compile(name: &str, nodes: Vec<LayerNode>) -> Result<Self> {
        Self::from_graph(name, GraphAssembler::assemble(nodes)?)
    }

    /// Compiles the part of `nodes` that feeds the `terminal` layer.
    pub fn compile_from_output(name: &str, nodes: Vec<LayerNode>, terminal: NodeId) -> Result<Self> {
        Self::from_graph(name, GraphAssembler::assemble_from_output(nodes, terminal)?)
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::compile(&config.name, config.to_layer_nodes()?)
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(&ModelConfig::from_file(path)?)
    }

    fn from_graph(name: &str, mut graph: OrderedGraph) -> Result<Self> {
        ShapeResolver::resolve(&mut graph)?;
        let registry = VariableRegistry::from_graph(&graph)?;
        debug!(
            "Compiled model '{}': {} layers, {} parameter slots",
            name,
            graph.len(),
            registry.len()
        );
        Ok(Self {
            name: name.to_string(),
            graph,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &OrderedGraph {
        &self.graph
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn layer(&self, name: &str) -> Option<&LayerNode> {
        self.graph.find(name)
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_initialized()
    }

    /// Fills every slot with its declared initializer.
    pub fn init(&mut self, seed: u64) -> Result<BindingReport> {
        let engine = WeightBindingEngine::default().with_seed(seed);
        Ok(engine.initialize(&self.graph, &mut self.registry)?)
    }

    /// Binds weights from `store` with the options carried by `engine`.
    pub fn load_weights(
        &mut self,
        store: &dyn WeightStore,
        engine: &WeightBindingEngine,
    ) -> Result<BindingReport> {
        Ok(engine.bind(&self.graph, &mut self.registry, store)?)
    }

    /// Reads only the frozen layers from the store; trainable layers are
    /// initialized by default.
    pub fn load_weights_for_frozen_layers(
        &mut self,
        store: &dyn WeightStore,
        strategy: NamingStrategy,
    ) -> Result<BindingReport> {
        let engine = WeightBindingEngine::new(strategy).with_scope(BindingScope::Frozen);
        self.load_weights(store, &engine)
    }

    /// Dry run of [`load_weights`](Self::load_weights).
    pub fn plan_weights(
        &self,
        store: &dyn WeightStore,
        engine: &WeightBindingEngine,
    ) -> Result<Vec<BindingResult>> {
        Ok(engine.plan(&self.graph, &self.registry, store)?)
    }

    pub fn summary(&self) -> ModelSummary {
        let summary = ModelSummary::new(&self.name, &self.graph, &self.registry);
        info!("\n{}", summary);
        summary
    }

    /// Filled parameters keyed by their path under `convention`.
    pub fn export_weights(&self, convention: &NamingConvention) -> BTreeMap<String, ArrayD<f32>> {
        self.registry
            .all()
            .filter_map(|slot| {
                let data = slot.data()?;
                Some((convention.path(&slot.layer_name, slot.role), data.clone()))
            })
            .collect()
    }

    /// Writes the filled parameters to a SafeTensors file under the default
    /// convention, so the file can be bound back with the default strategy.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let weights = self.export_weights(&NamingConvention::keras());
        save_safetensors(path.as_ref(), &weights)?;
        info!("Saved {} tensors to {}", weights.len(), path.as_ref().display());
        Ok(())
    }

    pub fn regularization_penalty(&self) -> f32 {
        self.registry.regularization_penalty()
    }
}
