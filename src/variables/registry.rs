//! Registry of parameter slots, keyed by canonical name.

use super::{ParameterSlot, RegistryError, SlotState};
use crate::graph::{NodeId, OrderedGraph};
use log::debug;
use ndarray::ArrayD;
use std::collections::{HashMap, HashSet};

type Result<T> = std::result::Result<T, RegistryError>;

/// Table mapping canonical parameter names to slots.
///
/// Lookup by name is O(1); iteration follows registration order, which is
/// the topological order of the graph when built with [`VariableRegistry::from_graph`].
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    slots: Vec<ParameterSlot>,
    index: HashMap<String, usize>,
    /// Set by a completed binding or initialization pass, even one that
    /// filled no slot.
    initialized: bool,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one slot per declared parameter of a resolved graph.
    ///
    /// Slots of frozen layers are non-trainable, as are moving statistics.
    pub fn from_graph(graph: &OrderedGraph) -> Result<Self> {
        let mut registry = Self::new();
        for node in graph.iter() {
            if node.output_shape.is_none() {
                return Err(RegistryError::GraphNotResolved(node.name.clone()));
            }
            for decl in &node.params {
                let slot = ParameterSlot::new(
                    node.kind.canonical_name(&node.name, decl.role),
                    decl.shape.clone(),
                    node.id,
                    &node.name,
                    decl.role,
                )
                .with_trainable(node.trainable && decl.role.is_trainable())
                .with_initializer(node.kind.initializer_for(decl.role))
                .with_regularizer(node.kind.regularizer_for(decl.role));
                registry.register(slot)?;
            }
        }
        debug!("Registered {} parameter slots", registry.len());
        Ok(registry)
    }

    /// Adds a slot; a name collision is fatal.
    pub fn register(&mut self, slot: ParameterSlot) -> Result<()> {
        if self.index.contains_key(&slot.name) {
            return Err(RegistryError::DuplicateParameter {
                name: slot.name,
                layer: slot.layer_name,
            });
        }
        self.index.insert(slot.name.clone(), self.slots.len());
        self.slots.push(slot);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ParameterSlot> {
        self.index
            .get(name)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ParameterSlot> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.slots[i]),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All slots in registration order.
    pub fn all(&self) -> impl Iterator<Item = &ParameterSlot> {
        self.slots.iter()
    }

    /// Fills many slots as one step and marks the registry initialized.
    ///
    /// Every buffer is checked first; if any check fails no slot changes.
    pub(crate) fn fill_all(&mut self, fills: Vec<(String, ArrayD<f32>, SlotState)>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(fills.len());
        for (name, data, state) in fills {
            let i = *self
                .index
                .get(&name)
                .ok_or_else(|| RegistryError::NotFound(name.clone()))?;
            if !seen.insert(i) {
                return Err(RegistryError::AlreadyFilled(name));
            }
            self.slots[i].check_fill(&data)?;
            targets.push((i, data, state));
        }
        for (i, data, state) in targets {
            self.slots[i].assign(data, state);
        }
        self.initialized = true;
        Ok(())
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&ParameterSlot>
    where
        P: Fn(&ParameterSlot) -> bool,
    {
        self.slots.iter().filter(|s| predicate(s)).collect()
    }

    /// Slots owned by one layer, in role order.
    pub fn slots_for(&self, owner: NodeId) -> Vec<&ParameterSlot> {
        self.filter(|s| s.owner == owner)
    }

    /// True after a completed binding pass, or once any slot has been filled.
    pub fn is_initialized(&self) -> bool {
        self.initialized || self.slots.iter().any(ParameterSlot::is_filled)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total scalar count of trainable and of frozen parameters.
    pub fn param_counts(&self) -> (usize, usize) {
        self.slots.iter().fold((0, 0), |(t, f), s| {
            if s.trainable {
                (t + s.element_count(), f)
            } else {
                (t, f + s.element_count())
            }
        })
    }

    /// Sum of the regularization penalties of all filled slots.
    pub fn regularization_penalty(&self) -> f32 {
        self.slots.iter().map(ParameterSlot::penalty).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ShapeResolver;
    use crate::graph::{GraphAssembler, GraphBuilder, LayerNode};
    use crate::initializers::{Initializer, Regularizer};
    use crate::nn::{BatchNormConfig, DenseConfig, LayerKind, ParamRole};
    use ndarray::ArrayD;

    fn resolved() -> OrderedGraph {
        let mut b = GraphBuilder::new();
        let x = b.input("x", &[8]);
        let h = b.layer(
            "hidden",
            LayerKind::Dense(DenseConfig::new(4).with_kernel_regularizer(Regularizer::L2 { l2: 0.5 })),
            &[x],
        );
        let bn = b.add(LayerNode::new("bn", LayerKind::BatchNorm(BatchNormConfig::new())).with_inbound(&[h]));
        b.add(
            LayerNode::new("out", LayerKind::Dense(DenseConfig::new(2)))
                .with_inbound(&[bn])
                .with_trainable(false),
        );
        let mut graph = GraphAssembler::assemble(b.into_nodes()).unwrap();
        ShapeResolver::resolve(&mut graph).unwrap();
        graph
    }

    #[test]
    fn test_from_graph_names_and_order() {
        let registry = VariableRegistry::from_graph(&resolved()).unwrap();
        let names: Vec<&str> = registry.all().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "hidden_dense_kernel",
                "hidden_dense_bias",
                "bn_batch_norm_gamma",
                "bn_batch_norm_beta",
                "bn_batch_norm_moving_mean",
                "bn_batch_norm_moving_variance",
                "out_dense_kernel",
                "out_dense_bias",
            ]
        );
        assert_eq!(registry.get("hidden_dense_kernel").unwrap().shape, vec![8, 4]);
        assert!(matches!(registry.get("nope"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_frozen_layer_and_moving_stats_are_not_trainable() {
        let registry = VariableRegistry::from_graph(&resolved()).unwrap();
        assert!(!registry.get("out_dense_kernel").unwrap().trainable);
        assert!(!registry.get("bn_batch_norm_moving_mean").unwrap().trainable);
        assert!(registry.get("bn_batch_norm_gamma").unwrap().trainable);
        assert_eq!(registry.get("bn_batch_norm_moving_variance").unwrap().initializer, Initializer::Ones);

        let (trainable, frozen) = registry.param_counts();
        assert_eq!(trainable, 8 * 4 + 4 + 4 + 4);
        assert_eq!(frozen, 4 + 4 + 4 * 2 + 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = VariableRegistry::new();
        let slot = ParameterSlot::new("a_dense_kernel".into(), vec![1], 1, "a", ParamRole::Kernel);
        registry.register(slot.clone()).unwrap();
        let err = registry.register(slot).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateParameter { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unresolved_graph_rejected() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", &[8]);
        b.layer("fc", LayerKind::Dense(DenseConfig::new(4)), &[x]);
        let graph = GraphAssembler::assemble(b.into_nodes()).unwrap();
        assert!(matches!(
            VariableRegistry::from_graph(&graph),
            Err(RegistryError::GraphNotResolved(_))
        ));
    }

    #[test]
    fn test_regularization_penalty_counts_filled_slots() {
        let mut registry = VariableRegistry::from_graph(&resolved()).unwrap();
        assert_eq!(registry.regularization_penalty(), 0.0);
        registry
            .get_mut("hidden_dense_kernel")
            .unwrap()
            .bind(ArrayD::ones(vec![8, 4]))
            .unwrap();
        assert_eq!(registry.regularization_penalty(), 0.5 * 32.0);
        assert!(registry.is_initialized());
    }

    #[test]
    fn test_fill_all_checks_every_buffer_before_filling() {
        let mut registry = VariableRegistry::from_graph(&resolved()).unwrap();
        let fills = vec![
            ("hidden_dense_kernel".to_string(), ArrayD::ones(vec![8, 4]), SlotState::Bound),
            ("hidden_dense_bias".to_string(), ArrayD::ones(vec![5]), SlotState::Bound),
        ];
        let err = registry.fill_all(fills).unwrap_err();
        assert!(matches!(err, RegistryError::ShapeMismatch { ref name, .. } if name == "hidden_dense_bias"));
        assert!(registry.all().all(|s| s.state() == SlotState::Unbound));
        assert!(!registry.is_initialized());

        let twice = vec![
            ("hidden_dense_bias".to_string(), ArrayD::ones(vec![4]), SlotState::Bound),
            ("hidden_dense_bias".to_string(), ArrayD::zeros(vec![4]), SlotState::Bound),
        ];
        assert!(matches!(registry.fill_all(twice), Err(RegistryError::AlreadyFilled(_))));
        assert!(!registry.is_initialized());
    }

    #[test]
    fn test_empty_fill_still_marks_initialized() {
        let mut registry = VariableRegistry::new();
        registry.fill_all(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.is_initialized());
    }
}
