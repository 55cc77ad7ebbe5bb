//! # Variables
//!
//! Named, shaped learnable values ([`ParameterSlot`]) and the table that owns
//! them ([`VariableRegistry`]).
//!
//! A slot moves through `Unbound -> Bound | DefaultInitialized` exactly once;
//! there is no way back to `Unbound`, re-binding needs a fresh registry.

pub mod registry;

pub use registry::VariableRegistry;

use crate::graph::{NodeId, Shape};
use crate::initializers::{Initializer, InitializerError, Regularizer};
use crate::nn::ParamRole;
use ndarray::ArrayD;
use rand::rngs::StdRng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Parameter name '{name}' of layer '{layer}' is already registered. \
             Parameter names are derived from layer names, so two layers probably share a name.")]
    DuplicateParameter { name: String, layer: String },

    #[error("Parameter '{0}' not found in the variable registry.")]
    NotFound(String),

    #[error("Parameter '{0}' has already been filled. Slots are filled exactly once; use a fresh registry to re-bind.")]
    AlreadyFilled(String),

    #[error("Buffer for parameter '{name}' has shape {actual:?}, expected {expected:?}.")]
    ShapeMismatch {
        name: String,
        expected: Shape,
        actual: Vec<usize>,
    },

    #[error("Layer '{0}' has no resolved output shape. Run shape resolution before creating variables.")]
    GraphNotResolved(String),

    #[error("Initializer error: {0}")]
    Initializer(#[from] InitializerError),
}

type Result<T> = std::result::Result<T, RegistryError>;

/// Lifecycle state of a [`ParameterSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unbound,
    /// Filled from a weight store.
    Bound,
    /// Filled by its declared initializer.
    DefaultInitialized,
}

/// A learnable value owned by exactly one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    /// Canonical name, unique across the registry.
    pub name: String,
    pub shape: Shape,
    pub owner: NodeId,
    pub layer_name: String,
    pub role: ParamRole,
    pub trainable: bool,
    pub initializer: Initializer,
    pub regularizer: Option<Regularizer>,
    data: Option<ArrayD<f32>>,
    state: SlotState,
}

impl ParameterSlot {
    pub fn new(name: String, shape: Shape, owner: NodeId, layer_name: &str, role: ParamRole) -> Self {
        Self {
            name,
            shape,
            owner,
            layer_name: layer_name.to_string(),
            role,
            trainable: role.is_trainable(),
            initializer: Initializer::Zeros,
            regularizer: None,
            data: None,
            state: SlotState::Unbound,
        }
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.regularizer = regularizer;
        self
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_filled(&self) -> bool {
        self.state != SlotState::Unbound
    }

    pub fn data(&self) -> Option<&ArrayD<f32>> {
        self.data.as_ref()
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Fills the slot with data read from a weight store.
    pub fn bind(&mut self, data: ArrayD<f32>) -> Result<()> {
        self.fill(data, SlotState::Bound)
    }

    /// Fills the slot from its declared initializer.
    pub fn initialize(&mut self, rng: &mut StdRng) -> Result<()> {
        if self.is_filled() {
            return Err(RegistryError::AlreadyFilled(self.name.clone()));
        }
        let data = self.default_buffer(rng)?;
        self.fill(data, SlotState::DefaultInitialized)
    }

    /// Draws a buffer from the declared initializer, leaving the slot untouched.
    pub fn default_buffer(&self, rng: &mut StdRng) -> Result<ArrayD<f32>> {
        Ok(self.initializer.initialize(&self.shape, rng)?)
    }

    /// Single guarded assignment: either the whole buffer lands or nothing changes.
    fn fill(&mut self, data: ArrayD<f32>, state: SlotState) -> Result<()> {
        self.check_fill(&data)?;
        self.assign(data, state);
        Ok(())
    }

    /// Checks that `data` may fill this slot, without changing it.
    fn check_fill(&self, data: &ArrayD<f32>) -> Result<()> {
        if self.is_filled() {
            return Err(RegistryError::AlreadyFilled(self.name.clone()));
        }
        if data.shape() != self.shape.as_slice() {
            return Err(RegistryError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.shape.clone(),
                actual: data.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn assign(&mut self, data: ArrayD<f32>, state: SlotState) {
        self.data = Some(data);
        self.state = state;
    }

    /// Penalty of the attached regularizer, zero when unfilled or unregularized.
    pub fn penalty(&self) -> f32 {
        match (&self.regularizer, &self.data) {
            (Some(reg), Some(data)) => reg.penalty(data),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;
    use rand::SeedableRng;

    fn slot() -> ParameterSlot {
        ParameterSlot::new("fc_dense_kernel".into(), vec![3, 2], 1, "fc", ParamRole::Kernel)
    }

    #[test]
    fn test_bind_then_second_fill_rejected() {
        let mut s = slot();
        s.bind(ArrayD::ones(vec![3, 2])).unwrap();
        assert_eq!(s.state(), SlotState::Bound);

        let err = s.initialize(&mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyFilled("fc_dense_kernel".into()));
        assert!(s.data().unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_wrong_shape_leaves_slot_unbound() {
        let mut s = slot();
        let err = s.bind(ArrayD::zeros(vec![2, 3])).unwrap_err();
        assert!(matches!(err, RegistryError::ShapeMismatch { .. }));
        assert_eq!(s.state(), SlotState::Unbound);
        assert!(s.data().is_none());
    }

    #[test]
    fn test_initialize_uses_declared_initializer() {
        let mut s = slot().with_initializer(Initializer::Ones);
        s.initialize(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(s.state(), SlotState::DefaultInitialized);
        assert_eq!(s.data().unwrap().sum(), 6.0);
    }

    #[test]
    fn test_moving_statistics_are_not_trainable() {
        let s = ParameterSlot::new("bn_batch_norm_moving_mean".into(), vec![4], 0, "bn", ParamRole::MovingMean);
        assert!(!s.trainable);
    }
}
