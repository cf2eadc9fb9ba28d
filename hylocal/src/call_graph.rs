//! Direct call graph and bottom-up function ordering.
use std::collections::BTreeMap;

use hymir::{
    FuncId, InstrId, Value,
    instructions::{InstrKind, layout},
    module::Module,
};
use log::debug;
use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

/// Graph of the direct calls of a module.
///
/// Nodes are the functions of the module, declarations included, in module
/// order. There is one edge from caller to callee per call site (full or
/// partial application whose callee is a function reference), weighted by
/// the call-site instruction. Calls through any other callee value are not
/// represented.
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<FuncId, InstrId>,
    nodes: BTreeMap<FuncId, NodeIndex>,
}

impl CallGraph {
    pub fn build(module: &Module) -> Self {
        let mut graph = DiGraph::with_capacity(module.function_count(), 0);
        let mut nodes = BTreeMap::new();
        for (function, _) in module.functions() {
            nodes.insert(function, graph.add_node(function));
        }

        for (caller, function) in module.functions() {
            for &block in function.blocks() {
                for &instr in module.block(block).instructions() {
                    if let Some(callee) = direct_callee(module, instr) {
                        graph.add_edge(nodes[&caller], nodes[&callee], instr);
                    }
                }
            }
        }

        debug!(
            "built call graph with {} function(s) and {} call edge(s)",
            graph.node_count(),
            graph.edge_count()
        );
        Self { graph, nodes }
    }

    fn node(&self, function: FuncId) -> NodeIndex {
        match self.nodes.get(&function) {
            Some(&node) => node,
            None => panic!("function `{function:?}` is not part of the call graph"),
        }
    }

    pub fn function_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of call sites with a known callee.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Call sites in `function` with their callee. A callee called from
    /// several sites is reported once per site.
    pub fn call_sites(&self, function: FuncId) -> impl Iterator<Item = (InstrId, FuncId)> + '_ {
        self.graph
            .edges_directed(self.node(function), Direction::Outgoing)
            .map(|edge| (*edge.weight(), self.graph[edge.target()]))
    }

    /// Functions called by `function`, once per call site.
    pub fn callees(&self, function: FuncId) -> impl Iterator<Item = FuncId> + '_ {
        self.call_sites(function).map(|(_, callee)| callee)
    }

    /// Functions calling `function`, once per call site.
    pub fn callers(&self, function: FuncId) -> impl Iterator<Item = FuncId> + '_ {
        self.graph
            .edges_directed(self.node(function), Direction::Incoming)
            .map(|edge| self.graph[edge.source()])
    }

    /// Order functions so that callees come before their callers.
    ///
    /// Mutually recursive functions cannot be ordered among themselves and
    /// are reported as one group, listed in module order.
    pub fn bottom_up_order(&self) -> BottomUpOrder {
        // Tarjan emits components in post-order: every component comes after
        // the components it calls into.
        let groups: Vec<Vec<FuncId>> = tarjan_scc(&self.graph)
            .into_iter()
            .map(|mut component| {
                component.sort_unstable();
                component.into_iter().map(|node| self.graph[node]).collect()
            })
            .collect();

        let mut group_index = BTreeMap::new();
        for (index, group) in groups.iter().enumerate() {
            for &function in group {
                group_index.insert(function, index);
            }
        }

        BottomUpOrder {
            groups,
            group_index,
        }
    }
}

/// The function referenced by the callee operand of `instr`, if `instr` is
/// a call site with a statically known target.
fn direct_callee(module: &Module, instr: InstrId) -> Option<FuncId> {
    let node = module.instruction(instr);
    if !node.kind().is_call_site() {
        return None;
    }
    match node.operand(layout::CALLEE) {
        Some(Value::Instr(callee)) => match module.instruction(callee).kind() {
            InstrKind::FunctionRef { function } => Some(*function),
            _ => None,
        },
        _ => None,
    }
}

/// Functions grouped by strongly connected component, callees first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottomUpOrder {
    groups: Vec<Vec<FuncId>>,
    group_index: BTreeMap<FuncId, usize>,
}

impl BottomUpOrder {
    /// Groups of mutually recursive functions. A group with a single
    /// function may still be self-recursive.
    pub fn groups(&self) -> &[Vec<FuncId>] {
        &self.groups
    }

    /// Every function, flattened in bottom-up order.
    pub fn functions(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.groups.iter().flatten().copied()
    }

    /// Position of the group containing `function`.
    pub fn group_of(&self, function: FuncId) -> Option<usize> {
        self.group_index.get(&function).copied()
    }

    pub fn len(&self) -> usize {
        self.group_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_index.is_empty()
    }
}

/// Bottom-up order of the functions of `module`.
pub fn bottom_up_call_graph_order(module: &Module) -> BottomUpOrder {
    CallGraph::build(module).bottom_up_order()
}
