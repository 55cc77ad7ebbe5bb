//! # RustyLayers: layer graphs and weight binding in Rust
//!
//! **RustyLayers** turns a declarative description of a layered model into a
//! compiled, shape-checked graph and fills its parameters from externally
//! trained weights.
//!
//! ## Usage Example
//!
//! ```no_run
//! use rustylayers::binding::{BindingScope, WeightBindingEngine};
//! use rustylayers::graph::GraphBuilder;
//! use rustylayers::model::Model;
//! use rustylayers::nn::{Conv2dConfig, DenseConfig, LayerKind, Pool2dConfig};
//! use rustylayers::store::SafeTensorsStore;
//!
//! // 1. Declare layers
//! let mut b = GraphBuilder::new();
//! let x = b.input("input", &[28, 28, 1]);
//! let c = b.layer("conv", LayerKind::Conv2d(Conv2dConfig::new(32, (5, 5))), &[x]);
//! let p = b.layer("", LayerKind::MaxPool2d(Pool2dConfig::new((2, 2))), &[c]);
//! let f = b.layer("", LayerKind::Flatten, &[p]);
//! b.layer("logits", LayerKind::Dense(DenseConfig::new(10)), &[f]);
//!
//! // 2. Assemble, resolve shapes and register parameters
//! let mut model = Model::compile("lenet", b.into_nodes())?;
//!
//! // 3. Bind the conv layer from a weight file, initialize everything else
//! let store = SafeTensorsStore::open("lenet.safetensors")?;
//! let engine = WeightBindingEngine::default()
//!     .with_scope(BindingScope::Layers(vec!["conv".into()]));
//! let report = model.load_weights(&store, &engine)?;
//! println!("{}", report);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod binding;
pub mod config;
pub mod graph;
pub mod initializers;
pub mod model;
pub mod nn;
pub mod store;
pub mod variables;

pub use binding::{BindingReport, BindingScope, MissingWeightPolicy, NamingStrategy, WeightBindingEngine};
pub use graph::{GraphAssembler, GraphBuilder, LayerNode, OrderedGraph};
pub use model::{Model, ModelError};
pub use nn::LayerKind;
