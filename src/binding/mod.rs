//! # Weight Binding
//!
//! Binds the parameter slots of a resolved graph to entries of an external
//! [`WeightStore`](crate::store::WeightStore).
//!
//! ```text
//! VariableRegistry + WeightStore --(NamingStrategy, policy, scope)--> BindingReport
//! ```
//!
//! Every slot ends a binding pass with exactly one [`BindingOutcome`]:
//! in-scope slots are read from the store, out-of-scope slots are filled by
//! their declared initializer. A pass that hits a fatal outcome (shape
//! mismatch, or a missing entry under [`MissingWeightPolicy::Fail`]) fills
//! nothing at all.

pub mod engine;
pub mod naming;

pub use engine::WeightBindingEngine;
pub use naming::{LayerPaths, NamingConvention, NamingError, NamingStrategy};

use crate::graph::Shape;
use crate::nn::ParamRole;
use crate::store::StoreError;
use crate::variables::RegistryError;
use std::fmt;
use thiserror::Error;

/// What to do when an in-scope slot has no entry in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingWeightPolicy {
    /// Fall back to the slot's declared initializer and log a warning.
    #[default]
    Initialize,
    /// Every in-scope slot must be found; a miss aborts the pass.
    Fail,
}

/// Which layers a binding pass reads from the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindingScope {
    #[default]
    All,
    /// Only layers with `trainable = false`.
    Frozen,
    /// Only the named layers.
    Layers(Vec<String>),
}

/// Per-slot result of a binding pass.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingOutcome {
    Bound,
    DefaultInitialized,
    /// In scope, but the naming strategy yields no path for this slot.
    Skipped,
    ShapeMismatch { expected: Shape, actual: Vec<usize> },
    NotFound,
}

impl BindingOutcome {
    pub fn is_fatal(&self, policy: MissingWeightPolicy) -> bool {
        match self {
            BindingOutcome::ShapeMismatch { .. } => true,
            BindingOutcome::NotFound | BindingOutcome::Skipped => policy == MissingWeightPolicy::Fail,
            BindingOutcome::Bound | BindingOutcome::DefaultInitialized => false,
        }
    }
}

impl fmt::Display for BindingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingOutcome::Bound => write!(f, "Bound"),
            BindingOutcome::DefaultInitialized => write!(f, "DefaultInitialized"),
            BindingOutcome::Skipped => write!(f, "Skipped"),
            BindingOutcome::ShapeMismatch { expected, actual } => {
                write!(f, "ShapeMismatch (expected {:?}, found {:?})", expected, actual)
            }
            BindingOutcome::NotFound => write!(f, "NotFound"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingResult {
    pub slot_name: String,
    pub layer_name: String,
    pub role: ParamRole,
    /// Store path the strategy resolved, if any.
    pub path: Option<String>,
    pub outcome: BindingOutcome,
}

/// Outcomes of one pass, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingReport {
    pub results: Vec<BindingResult>,
}

impl BindingReport {
    pub fn outcome_of(&self, slot_name: &str) -> Option<&BindingOutcome> {
        self.results
            .iter()
            .find(|r| r.slot_name == slot_name)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&BindingOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn bound(&self) -> usize {
        self.count(|o| *o == BindingOutcome::Bound)
    }

    pub fn default_initialized(&self) -> usize {
        self.count(|o| *o == BindingOutcome::DefaultInitialized)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == BindingOutcome::Skipped)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl fmt::Display for BindingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            writeln!(
                f,
                "{:<40} {:<24} {}",
                r.slot_name,
                r.path.as_deref().unwrap_or("-"),
                r.outcome
            )?;
        }
        write!(
            f,
            "{} bound, {} initialized by default, {} skipped",
            self.bound(),
            self.default_initialized(),
            self.skipped()
        )
    }
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("The model is already initialized. Binding fills every slot once; \
             build a fresh registry to load weights again.")]
    AlreadyInitialized,

    #[error("The graph is not compiled: layer '{0}' has no resolved shape. Run shape resolution and create variables before binding.")]
    GraphNotCompiled(String),

    #[error("Shape mismatch for parameter '{slot}' of layer '{layer}': the model expects {expected:?}, \
             but store entry '{path}' has shape {actual:?}.")]
    ShapeMismatch {
        slot: String,
        layer: String,
        path: String,
        expected: Shape,
        actual: Vec<usize>,
    },

    #[error("Weight entry '{path}' for parameter '{slot}' of layer '{layer}' was not found. \
             Available layer names in the store: {available:?}. Layers in the model: {model_layers:?}. \
             Check the naming strategy or use MissingWeightPolicy::Initialize.")]
    WeightNotFound {
        slot: String,
        layer: String,
        path: String,
        available: Vec<String>,
        model_layers: Vec<String>,
    },

    #[error("The {strategy} naming strategy gives no store path for parameter '{slot}' of layer '{layer}'.")]
    NoPathForSlot {
        slot: String,
        layer: String,
        strategy: String,
    },

    #[error("Layer '{name}' in the binding scope does not exist. Layers in the model: {available:?}.")]
    UnknownLayer { name: String, available: Vec<String> },

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
