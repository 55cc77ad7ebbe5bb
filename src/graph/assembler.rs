//! Graph assembly: validation, outbound derivation, topological ordering and
//! automatic layer naming.

use super::{GraphError, LayerNode, NodeId};
use crate::nn::{InputConfig, LayerKind};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};

type Result<T> = std::result::Result<T, GraphError>;

/// Collects unconnected layer declarations before assembly.
///
/// ```rust,ignore
/// let mut builder = GraphBuilder::new();
/// let x = builder.input("input", &[28, 28, 1]);
/// let h = builder.layer("", LayerKind::Flatten, &[x]);
/// builder.layer("logits", LayerKind::Dense(DenseConfig::new(10)), &[h]);
/// let graph = GraphAssembler::assemble(builder.into_nodes())?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    nodes: Vec<LayerNode>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its arena index.
    pub fn add(&mut self, mut node: LayerNode) -> NodeId {
        let id = self.nodes.len();
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Adds an `Input` layer with the given per-sample dimensions.
    pub fn input(&mut self, name: &str, dims: &[usize]) -> NodeId {
        self.add(LayerNode::new(name, LayerKind::Input(InputConfig::new(dims))))
    }

    /// Adds a layer fed by `inbound`.
    pub fn layer(&mut self, name: &str, kind: LayerKind, inbound: &[NodeId]) -> NodeId {
        self.add(LayerNode::new(name, kind).with_inbound(inbound))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut LayerNode> {
        self.nodes.get_mut(id)
    }

    pub fn into_nodes(self) -> Vec<LayerNode> {
        self.nodes
    }
}

/// A validated graph whose nodes are known in topological order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedGraph {
    nodes: Vec<LayerNode>,
    order: Vec<NodeId>,
    input: NodeId,
}

impl OrderedGraph {
    /// Nodes in arena order.
    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&LayerNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut LayerNode> {
        self.nodes.get_mut(id)
    }

    /// Node ids in topological order, starting with the input.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn input(&self) -> &LayerNode {
        &self.nodes[self.input]
    }

    /// Iterates nodes in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &LayerNode> {
        self.order.iter().map(move |&id| &self.nodes[id])
    }

    /// Layer names in topological order.
    pub fn layer_names(&self) -> Vec<String> {
        self.iter().map(|n| n.name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&LayerNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Nodes nothing consumes.
    pub fn outputs(&self) -> Vec<&LayerNode> {
        self.iter().filter(|n| n.outbound.is_empty()).collect()
    }

    /// True once every node carries an output shape.
    pub fn is_resolved(&self) -> bool {
        self.nodes.iter().all(|n| n.output_shape.is_some())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gives the nodes back, e.g. to assemble them again.
    pub fn into_nodes(self) -> Vec<LayerNode> {
        self.nodes
    }
}

/// Turns a node set into an [`OrderedGraph`].
pub struct GraphAssembler;

impl GraphAssembler {
    /// Assembles a graph from an explicit, complete list of nodes.
    pub fn assemble(mut nodes: Vec<LayerNode>) -> Result<OrderedGraph> {
        Self::check_references(&mut nodes)?;
        let input = Self::find_input(&nodes)?;
        Self::fill_outbound(&mut nodes);
        let order = Self::topological_sort(&nodes, input)?;
        Self::assign_names(&mut nodes, &order)?;

        debug!("Assembled graph with {} layers", nodes.len());
        Ok(OrderedGraph { nodes, order, input })
    }

    /// Assembles the sub-graph that feeds `terminal`, walking inbound edges backward.
    ///
    /// Nodes keep their relative arena order, so a graph defined from its
    /// output sorts and names exactly like the same graph listed in full.
    pub fn assemble_from_output(mut nodes: Vec<LayerNode>, terminal: NodeId) -> Result<OrderedGraph> {
        if terminal >= nodes.len() {
            return Err(GraphError::UnknownTerminal(terminal));
        }
        Self::check_references(&mut nodes)?;

        let mut reachable = HashSet::new();
        let mut stack = vec![terminal];
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(nodes[id].inbound.iter().copied());
            }
        }

        let mut remap = HashMap::new();
        let mut subset = Vec::with_capacity(reachable.len());
        for node in nodes.into_iter().filter(|n| reachable.contains(&n.id)) {
            remap.insert(node.id, subset.len());
            subset.push(node);
        }
        for node in subset.iter_mut() {
            node.id = remap[&node.id];
            node.inbound = node.inbound.iter().map(|old| remap[old]).collect();
        }

        Self::assemble(subset)
    }

    /// Re-indexes nodes by position and checks that inbound ids exist.
    fn check_references(nodes: &mut [LayerNode]) -> Result<()> {
        let size = nodes.len();
        for (idx, node) in nodes.iter_mut().enumerate() {
            node.id = idx;
            if let Some(&bad) = node.inbound.iter().find(|&&i| i >= size) {
                return Err(GraphError::UnknownInbound {
                    layer: node.display_name(),
                    inbound: bad,
                    size,
                });
            }
        }
        Ok(())
    }

    fn find_input(nodes: &[LayerNode]) -> Result<NodeId> {
        let inputs: Vec<&LayerNode> = nodes.iter().filter(|n| n.is_input()).collect();
        if inputs.len() != 1 {
            return Err(GraphError::MultipleOrMissingInput {
                count: inputs.len(),
                layers: inputs.iter().map(|n| n.display_name()).collect(),
            });
        }
        let input = inputs[0];
        if !input.inbound.is_empty() {
            return Err(GraphError::InputWithInbound(input.display_name()));
        }
        Ok(input.id)
    }

    /// Rebuilds every outbound list as the inverse of the inbound lists.
    fn fill_outbound(nodes: &mut [LayerNode]) {
        for node in nodes.iter_mut() {
            node.outbound.clear();
        }
        for consumer in 0..nodes.len() {
            let inbound = nodes[consumer].inbound.clone();
            for producer in inbound {
                if !nodes[producer].outbound.contains(&consumer) {
                    nodes[producer].outbound.push(consumer);
                }
            }
        }
    }

    /// Kahn's algorithm over outbound edges, starting from the input.
    fn topological_sort(nodes: &[LayerNode], input: NodeId) -> Result<Vec<NodeId>> {
        let mut pending: Vec<usize> = nodes.iter().map(|n| n.inbound.len()).collect();
        let mut queue = VecDeque::from([input]);
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &next in &nodes[id].outbound {
                let edges = nodes[next].inbound.iter().filter(|&&i| i == id).count();
                pending[next] -= edges;
                if pending[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() == nodes.len() {
            return Ok(order);
        }

        let mut reachable = HashSet::new();
        let mut stack = vec![input];
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(nodes[id].outbound.iter().copied());
            }
        }

        let sorted: HashSet<NodeId> = order.into_iter().collect();
        let describe = |n: &LayerNode| (n.display_name(), n.kind.type_name().to_string());
        let unreachable: Vec<_> = nodes
            .iter()
            .filter(|n| !reachable.contains(&n.id))
            .map(describe)
            .collect();
        if !unreachable.is_empty() {
            return Err(GraphError::UnreachableLayer(unreachable));
        }
        Err(GraphError::CyclicGraph(
            nodes.iter().filter(|n| !sorted.contains(&n.id)).map(describe).collect(),
        ))
    }

    /// Names unnamed nodes `<kind>_<position>` and enforces name uniqueness.
    fn assign_names(nodes: &mut [LayerNode], order: &[NodeId]) -> Result<()> {
        let mut seen = HashSet::new();
        for node in nodes.iter().filter(|n| !n.name.is_empty()) {
            if !seen.insert(node.name.clone()) {
                return Err(GraphError::RepeatableLayerName(node.name.clone()));
            }
        }

        for (position, &id) in order.iter().enumerate() {
            let node = &mut nodes[id];
            if node.name.is_empty() {
                let generated = format!("{}_{}", node.kind.type_name().to_lowercase(), position);
                if !seen.insert(generated.clone()) {
                    return Err(GraphError::RepeatableLayerName(generated));
                }
                node.name = generated;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Conv2dConfig, DenseConfig, Pool2dConfig};

    fn lenet() -> GraphBuilder {
        let mut b = GraphBuilder::new();
        let x = b.input("", &[28, 28, 1]);
        let c = b.layer("", LayerKind::Conv2d(Conv2dConfig::new(32, (5, 5))), &[x]);
        let p = b.layer("", LayerKind::MaxPool2d(Pool2dConfig::new((2, 2))), &[c]);
        let f = b.layer("", LayerKind::Flatten, &[p]);
        b.layer("", LayerKind::Dense(DenseConfig::new(10)), &[f]);
        b
    }

    #[test]
    fn test_sequential_order_and_generated_names() {
        let graph = GraphAssembler::assemble(lenet().into_nodes()).unwrap();
        assert_eq!(graph.order(), &[0, 1, 2, 3, 4]);
        assert_eq!(
            graph.layer_names(),
            vec!["input_0", "conv2d_1", "maxpool2d_2", "flatten_3", "dense_4"]
        );
        assert_eq!(graph.input().name, "input_0");
        assert_eq!(graph.outputs().len(), 1);
    }

    #[test]
    fn test_outbound_is_inverse_of_inbound() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", &[4]);
        let a = b.layer("a", LayerKind::Dense(DenseConfig::new(4)), &[x]);
        let c = b.layer("c", LayerKind::Dense(DenseConfig::new(4)), &[x]);
        b.layer("sum", LayerKind::Add, &[a, c]);
        let graph = GraphAssembler::assemble(b.into_nodes()).unwrap();

        assert_eq!(graph.node(x).unwrap().outbound, vec![a, c]);
        for node in graph.nodes() {
            for &out in &node.outbound {
                assert!(graph.node(out).unwrap().inbound.contains(&node.id));
            }
        }
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let first = GraphAssembler::assemble(lenet().into_nodes()).unwrap();
        let second = GraphAssembler::assemble(first.clone().into_nodes()).unwrap();
        assert_eq!(first, second);
        assert!(second.nodes().iter().all(|n| n.outbound.len() <= 1));
    }

    #[test]
    fn test_missing_input_rejected() {
        let nodes = vec![LayerNode::new("d", LayerKind::Dense(DenseConfig::new(1)))];
        let err = GraphAssembler::assemble(nodes).unwrap_err();
        assert!(matches!(err, GraphError::MultipleOrMissingInput { count: 0, .. }));
    }

    #[test]
    fn test_two_inputs_rejected() {
        let mut b = GraphBuilder::new();
        b.input("a", &[1]);
        b.input("b", &[1]);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert!(matches!(err, GraphError::MultipleOrMissingInput { count: 2, .. }));
    }

    #[test]
    fn test_dangling_layer_is_named() {
        let mut b = lenet();
        b.layer("orphan", LayerKind::Dense(DenseConfig::new(3)), &[]);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnreachableLayer(vec![("orphan".to_string(), "Dense".to_string())])
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", &[4]);
        let a = b.layer("a", LayerKind::Add, &[x]);
        let c = b.layer("c", LayerKind::Dense(DenseConfig::new(4)), &[a]);
        b.node_mut(a).unwrap().inbound.push(c);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert!(matches!(err, GraphError::CyclicGraph(ref layers) if layers.len() == 2));
    }

    #[test]
    fn test_repeated_user_name_rejected() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", &[4]);
        let a = b.layer("fc", LayerKind::Dense(DenseConfig::new(4)), &[x]);
        b.layer("fc", LayerKind::Dense(DenseConfig::new(4)), &[a]);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert_eq!(err, GraphError::RepeatableLayerName("fc".to_string()));
    }

    #[test]
    fn test_generated_name_clashing_with_user_name() {
        let mut b = GraphBuilder::new();
        let x = b.input("dense_2", &[4]);
        let a = b.layer("hidden", LayerKind::Dense(DenseConfig::new(4)), &[x]);
        b.layer("", LayerKind::Dense(DenseConfig::new(4)), &[a]);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert_eq!(err, GraphError::RepeatableLayerName("dense_2".to_string()));
    }

    #[test]
    fn test_unknown_inbound_rejected() {
        let mut b = GraphBuilder::new();
        b.input("x", &[4]);
        b.layer("fc", LayerKind::Dense(DenseConfig::new(4)), &[7]);
        let err = GraphAssembler::assemble(b.into_nodes()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownInbound { inbound: 7, .. }));
    }

    #[test]
    fn test_from_output_matches_forward_order() {
        let forward = GraphAssembler::assemble(lenet().into_nodes()).unwrap();
        let backward = GraphAssembler::assemble_from_output(lenet().into_nodes(), 4).unwrap();
        assert_eq!(forward.order(), backward.order());
        assert_eq!(forward.layer_names(), backward.layer_names());
    }

    #[test]
    fn test_from_output_drops_unrelated_branch() {
        let mut b = lenet();
        let side = b.layer("side", LayerKind::Dense(DenseConfig::new(2)), &[0]);
        let graph = GraphAssembler::assemble_from_output(b.into_nodes(), 4).unwrap();
        assert_eq!(graph.len(), 5);
        assert!(graph.find("side").is_none());
        assert!(side > 4);
    }
}
