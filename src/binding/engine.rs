//! The weight binding engine.

use super::{
    BindError, BindingOutcome, BindingReport, BindingResult, BindingScope, MissingWeightPolicy,
    NamingStrategy,
};
use crate::graph::{LayerNode, OrderedGraph};
use crate::store::{StoredTensor, WeightStore};
use crate::variables::{ParameterSlot, SlotState, VariableRegistry};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

type Result<T> = std::result::Result<T, BindError>;

/// Seed of the default initializers unless set with [`WeightBindingEngine::with_seed`].
pub const DEFAULT_SEED: u64 = 12;

/// Planned outcome of one slot, together with the data to fill it with.
struct PlannedSlot {
    result: BindingResult,
    data: Option<StoredTensor>,
}

/// Binds registry slots to store entries.
///
/// The engine holds only per-call options; the registry and the store are
/// borrowed for the duration of a single [`bind`](Self::bind) call.
///
/// ```rust,ignore
/// let engine = WeightBindingEngine::new(NamingStrategy::default())
///     .with_policy(MissingWeightPolicy::Initialize)
///     .with_scope(BindingScope::Layers(vec!["conv2d_1".into()]));
/// let report = engine.bind(&graph, &mut registry, &store)?;
/// ```
#[derive(Debug, Clone)]
pub struct WeightBindingEngine {
    strategy: NamingStrategy,
    policy: MissingWeightPolicy,
    scope: BindingScope,
    seed: u64,
}

impl Default for WeightBindingEngine {
    fn default() -> Self {
        Self::new(NamingStrategy::default())
    }
}

impl WeightBindingEngine {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self {
            strategy,
            policy: MissingWeightPolicy::Initialize,
            scope: BindingScope::All,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_policy(mut self, policy: MissingWeightPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scope(mut self, scope: BindingScope) -> Self {
        self.scope = scope;
        self
    }

    /// Seed of the default initializers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn strategy(&self) -> &NamingStrategy {
        &self.strategy
    }

    /// Dry run: the outcome every slot would get, without filling anything.
    ///
    /// Unlike [`bind`](Self::bind), missing entries are reported as
    /// `NotFound` whatever the policy, so the plan shows every gap.
    pub fn plan(
        &self,
        graph: &OrderedGraph,
        registry: &VariableRegistry,
        store: &dyn WeightStore,
    ) -> Result<Vec<BindingResult>> {
        Ok(self
            .plan_slots(graph, registry, store)?
            .into_iter()
            .map(|p| p.result)
            .collect())
    }

    /// Fills every slot of the registry, from the store or by default.
    ///
    /// Nothing is filled if any slot has a fatal outcome.
    pub fn bind(
        &self,
        graph: &OrderedGraph,
        registry: &mut VariableRegistry,
        store: &dyn WeightStore,
    ) -> Result<BindingReport> {
        Self::check_preconditions(graph, registry)?;
        info!("Starting weights loading..");

        let planned = self.plan_slots(graph, registry, store)?;
        if let Some(fatal) = planned.iter().find(|p| p.result.outcome.is_fatal(self.policy)) {
            return Err(self.fatal_error(&fatal.result, graph, store));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut loaded_per_layer: BTreeMap<String, usize> = BTreeMap::new();
        let mut results = Vec::with_capacity(planned.len());
        let mut fills = Vec::with_capacity(planned.len());

        // Every buffer is built before any slot changes.
        for PlannedSlot { mut result, data } in planned {
            let slot = registry.get(&result.slot_name)?;
            let fill = match (result.outcome.clone(), data) {
                (BindingOutcome::Bound, Some(tensor)) => {
                    *loaded_per_layer.entry(result.layer_name.clone()).or_default() += 1;
                    (tensor.into_array()?, SlotState::Bound)
                }
                (BindingOutcome::NotFound, _) => {
                    warn!(
                        "Weights for '{}' are not found at '{}'. It will be initialized by its default initializer.",
                        result.slot_name,
                        result.path.as_deref().unwrap_or_default()
                    );
                    result.outcome = BindingOutcome::DefaultInitialized;
                    (slot.default_buffer(&mut rng)?, SlotState::DefaultInitialized)
                }
                (BindingOutcome::Skipped, _) => {
                    warn!(
                        "No {} path for '{}'. It will be initialized by its default initializer.",
                        self.strategy.describe(),
                        result.slot_name
                    );
                    (slot.default_buffer(&mut rng)?, SlotState::DefaultInitialized)
                }
                _ => (slot.default_buffer(&mut rng)?, SlotState::DefaultInitialized),
            };
            fills.push((result.slot_name.clone(), fill.0, fill.1));
            results.push(result);
        }
        registry.fill_all(fills)?;

        for (layer, count) in &loaded_per_layer {
            debug!("{} parameters loaded for the layer {}", count, layer);
        }
        info!("Weights are loaded.");
        Ok(BindingReport { results })
    }

    /// Fills every slot with its declared initializer, without any store.
    ///
    /// Like [`bind`](Self::bind), either every slot is filled or none is.
    pub fn initialize(&self, graph: &OrderedGraph, registry: &mut VariableRegistry) -> Result<BindingReport> {
        Self::check_preconditions(graph, registry)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut results = Vec::with_capacity(registry.len());
        let mut fills = Vec::with_capacity(registry.len());
        for slot in registry.all() {
            fills.push((slot.name.clone(), slot.default_buffer(&mut rng)?, SlotState::DefaultInitialized));
            results.push(BindingResult {
                slot_name: slot.name.clone(),
                layer_name: slot.layer_name.clone(),
                role: slot.role,
                path: None,
                outcome: BindingOutcome::DefaultInitialized,
            });
        }
        registry.fill_all(fills)?;
        debug!("Initialized {} parameter slots by default", results.len());
        Ok(BindingReport { results })
    }

    fn check_preconditions(graph: &OrderedGraph, registry: &VariableRegistry) -> Result<()> {
        if let Some(node) = graph.iter().find(|n| n.output_shape.is_none()) {
            return Err(BindError::GraphNotCompiled(node.name.clone()));
        }
        if registry.is_initialized() {
            return Err(BindError::AlreadyInitialized);
        }
        Ok(())
    }

    fn in_scope(&self, node: &LayerNode) -> bool {
        match &self.scope {
            BindingScope::All => true,
            BindingScope::Frozen => !node.trainable,
            BindingScope::Layers(names) => names.iter().any(|n| *n == node.name),
        }
    }

    fn validate_scope(&self, graph: &OrderedGraph) -> Result<()> {
        if let BindingScope::Layers(names) = &self.scope {
            if let Some(name) = names.iter().find(|n| graph.find(n).is_none()) {
                return Err(BindError::UnknownLayer {
                    name: name.clone(),
                    available: graph.layer_names(),
                });
            }
        }
        Ok(())
    }

    /// Resolves, fetches and shape-checks every slot, in registry order.
    fn plan_slots(
        &self,
        graph: &OrderedGraph,
        registry: &VariableRegistry,
        store: &dyn WeightStore,
    ) -> Result<Vec<PlannedSlot>> {
        self.validate_scope(graph)?;
        self.strategy.validate(graph)?;

        let mut planned = Vec::with_capacity(registry.len());
        for slot in registry.all() {
            let node = graph
                .node(slot.owner)
                .filter(|n| n.name == slot.layer_name)
                .ok_or_else(|| BindError::GraphNotCompiled(slot.layer_name.clone()))?;

            let mut result = BindingResult {
                slot_name: slot.name.clone(),
                layer_name: node.name.clone(),
                role: slot.role,
                path: None,
                outcome: BindingOutcome::DefaultInitialized,
            };

            if !self.in_scope(node) {
                planned.push(PlannedSlot { result, data: None });
                continue;
            }

            let Some(path) = self.strategy.path_for(node, slot.role) else {
                result.outcome = BindingOutcome::Skipped;
                planned.push(PlannedSlot { result, data: None });
                continue;
            };

            let (outcome, data) = Self::fetch(slot, &path, store)?;
            result.path = Some(path);
            result.outcome = outcome;
            planned.push(PlannedSlot { result, data });
        }
        Ok(planned)
    }

    /// Looks up one entry and compares its shape dimension for dimension.
    fn fetch(
        slot: &ParameterSlot,
        path: &str,
        store: &dyn WeightStore,
    ) -> Result<(BindingOutcome, Option<StoredTensor>)> {
        if !store.has(path) {
            return Ok((BindingOutcome::NotFound, None));
        }
        let tensor = store.get(path)?;
        if tensor.shape != slot.shape {
            return Ok((
                BindingOutcome::ShapeMismatch {
                    expected: slot.shape.clone(),
                    actual: tensor.shape,
                },
                None,
            ));
        }
        Ok((BindingOutcome::Bound, Some(tensor)))
    }

    fn fatal_error(&self, result: &BindingResult, graph: &OrderedGraph, store: &dyn WeightStore) -> BindError {
        let path = result.path.clone().unwrap_or_default();
        match &result.outcome {
            BindingOutcome::ShapeMismatch { expected, actual } => BindError::ShapeMismatch {
                slot: result.slot_name.clone(),
                layer: result.layer_name.clone(),
                path,
                expected: expected.clone(),
                actual: actual.clone(),
            },
            BindingOutcome::NotFound => BindError::WeightNotFound {
                slot: result.slot_name.clone(),
                layer: result.layer_name.clone(),
                path,
                available: store.children("/"),
                model_layers: graph.layer_names(),
            },
            _ => BindError::NoPathForSlot {
                slot: result.slot_name.clone(),
                layer: result.layer_name.clone(),
                strategy: self.strategy.describe().to_string(),
            },
        }
    }
}
