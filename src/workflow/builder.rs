//! Workflow builder for wiring phases into a validated graph.
//!
//! Nodes are phases; every node declares exactly one outgoing transition:
//! a fixed edge, a conditional edge resolved by a router at run time, or
//! the terminal edge. `build` validates the whole graph once so a run can
//! never start on broken wiring.

use super::router::route_after_benchmark;
use crate::errors::WorkflowError;
use crate::ledger::Ledger;
use crate::phase::PhaseId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Chooses the next phase from the ledger at a conditional edge.
pub type Router = Arc<dyn Fn(&Ledger) -> PhaseId + Send + Sync>;

/// Outgoing edge declaration of a node.
#[derive(Clone)]
pub enum Transition {
    /// Always continue with the given phase.
    Direct(PhaseId),
    /// Ask the router; it must pick one of `targets`.
    Conditional { router: Router, targets: Vec<PhaseId> },
    /// The run ends after this phase.
    End,
}

impl Transition {
    /// Every phase this transition may lead to.
    pub fn targets(&self) -> Vec<PhaseId> {
        match self {
            Transition::Direct(to) => vec![*to],
            Transition::Conditional { targets, .. } => targets.clone(),
            Transition::End => Vec::new(),
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Transition::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
            Transition::End => f.write_str("End"),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Direct(to) => write!(f, "-> {}", to),
            Transition::Conditional { targets, .. } => {
                let names: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
                write!(f, "-> {} (routed)", names.join(" | "))
            }
            Transition::End => f.write_str("-> end"),
        }
    }
}

/// A validated workflow graph.
#[derive(Debug, Clone)]
pub struct Workflow {
    entry: PhaseId,
    transitions: BTreeMap<PhaseId, Transition>,
}

impl Workflow {
    pub fn entry(&self) -> PhaseId {
        self.entry
    }

    /// The outgoing transition of `phase`, if it is a node.
    pub fn transition(&self, phase: PhaseId) -> Option<&Transition> {
        self.transitions.get(&phase)
    }

    /// All nodes in phase order.
    pub fn nodes(&self) -> impl Iterator<Item = PhaseId> + '_ {
        self.transitions.keys().copied()
    }

    /// Nodes with their transitions, in phase order.
    pub fn edges(&self) -> impl Iterator<Item = (PhaseId, &Transition)> {
        self.transitions.iter().map(|(phase, t)| (*phase, t))
    }
}

/// Builder for constructing workflows.
#[derive(Debug, Clone, Default)]
pub struct WorkflowBuilder {
    nodes: Vec<PhaseId>,
    entry: Option<PhaseId>,
    edges: Vec<(PhaseId, Transition)>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard audit wiring: 1→2→3→4→5, a routed edge from 5 to 6 or 7,
    /// 6→7 and 7 as the terminal phase.
    pub fn audit_playbook() -> Self {
        let mut builder = Self::new();
        for phase in PhaseId::ALL {
            builder = builder.add_node(phase);
        }
        builder
            .set_entry_point(PhaseId::OVERVIEW)
            .add_edge(PhaseId::OVERVIEW, PhaseId::HISTORY)
            .add_edge(PhaseId::HISTORY, PhaseId::CONTENT)
            .add_edge(PhaseId::CONTENT, PhaseId::GAPS)
            .add_edge(PhaseId::GAPS, PhaseId::BENCHMARK)
            .add_conditional_edges(
                PhaseId::BENCHMARK,
                route_after_benchmark,
                [PhaseId::INVESTIGATION, PhaseId::REPORT],
            )
            .add_edge(PhaseId::INVESTIGATION, PhaseId::REPORT)
            .add_terminal_edge(PhaseId::REPORT)
    }

    pub fn add_node(mut self, phase: PhaseId) -> Self {
        self.nodes.push(phase);
        self
    }

    pub fn set_entry_point(mut self, phase: PhaseId) -> Self {
        self.entry = Some(phase);
        self
    }

    pub fn add_edge(mut self, from: PhaseId, to: PhaseId) -> Self {
        self.edges.push((from, Transition::Direct(to)));
        self
    }

    pub fn add_conditional_edges<F>(
        mut self,
        from: PhaseId,
        router: F,
        targets: impl IntoIterator<Item = PhaseId>,
    ) -> Self
    where
        F: Fn(&Ledger) -> PhaseId + Send + Sync + 'static,
    {
        self.edges.push((
            from,
            Transition::Conditional {
                router: Arc::new(router),
                targets: targets.into_iter().collect(),
            },
        ));
        self
    }

    pub fn add_terminal_edge(mut self, from: PhaseId) -> Self {
        self.edges.push((from, Transition::End));
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Checks, in order:
    /// - no phase is registered twice
    /// - the entry point is set, is phase 1 and is registered
    /// - every edge names registered phases and no node declares two edges
    /// - conditional edges offer at least two distinct targets
    /// - every node has an outgoing edge and exactly one is terminal
    /// - the graph is acyclic and every node is reachable from the entry
    /// - each edge follows the audit order: a fixed edge leads to the next
    ///   phase, phase 5 routes to 6 or 7, and only phase 7 is terminal
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let mut registered = BTreeSet::new();
        for phase in &self.nodes {
            if !registered.insert(*phase) {
                return Err(WorkflowError::DuplicateNode(*phase));
            }
        }

        let entry = self.entry.ok_or(WorkflowError::MissingEntryPoint)?;
        if entry != PhaseId::OVERVIEW {
            return Err(WorkflowError::InvalidEntryPoint(entry));
        }
        if !registered.contains(&entry) {
            return Err(WorkflowError::UnknownNode(entry));
        }

        let mut transitions = BTreeMap::new();
        for (from, transition) in self.edges {
            if !registered.contains(&from) {
                return Err(WorkflowError::UnknownNode(from));
            }
            if let Some(unknown) = transition.targets().into_iter().find(|t| !registered.contains(t)) {
                return Err(WorkflowError::UnknownNode(unknown));
            }
            if let Transition::Conditional { targets, .. } = &transition {
                let distinct: BTreeSet<_> = targets.iter().collect();
                if distinct.len() < 2 {
                    return Err(WorkflowError::InvalidConditionalEdge { from });
                }
            }
            if transitions.insert(from, transition).is_some() {
                return Err(WorkflowError::DuplicateEdge(from));
            }
        }

        if let Some(missing) = registered.iter().find(|p| !transitions.contains_key(*p)) {
            return Err(WorkflowError::MissingOutgoingEdge(*missing));
        }

        let terminals = transitions
            .values()
            .filter(|t| matches!(t, Transition::End))
            .count();
        if terminals != 1 {
            return Err(WorkflowError::TerminalCount(terminals));
        }

        let workflow = Workflow { entry, transitions };
        Self::validate_no_cycles(&workflow)?;
        Self::validate_reachable(&workflow)?;
        Self::validate_audit_order(&workflow)?;
        Ok(workflow)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    fn validate_no_cycles(workflow: &Workflow) -> Result<(), WorkflowError> {
        let mut in_degree: BTreeMap<PhaseId, usize> = workflow.nodes().map(|p| (p, 0)).collect();
        for (_, transition) in workflow.edges() {
            for target in transition.targets() {
                *in_degree.entry(target).or_default() += 1;
            }
        }

        let mut queue: Vec<PhaseId> = in_degree
            .iter()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(p, _)| *p)
            .collect();
        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;
            let targets = workflow
                .transition(node)
                .map(Transition::targets)
                .unwrap_or_default();
            for target in targets {
                if let Some(deg) = in_degree.get_mut(&target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(target);
                    }
                }
            }
        }

        if processed != in_degree.len() {
            // Phases still holding in-degree are on or behind a cycle
            let cycle_phases: Vec<PhaseId> = in_degree
                .into_iter()
                .filter(|&(_, deg)| deg > 0)
                .map(|(p, _)| p)
                .collect();
            return Err(WorkflowError::Cycle(cycle_phases));
        }
        Ok(())
    }

    fn validate_reachable(workflow: &Workflow) -> Result<(), WorkflowError> {
        let mut seen = BTreeSet::from([workflow.entry]);
        let mut queue = VecDeque::from([workflow.entry]);
        while let Some(node) = queue.pop_front() {
            let targets = workflow
                .transition(node)
                .map(Transition::targets)
                .unwrap_or_default();
            for target in targets {
                if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        match workflow.nodes().find(|p| !seen.contains(p)) {
            Some(orphan) => Err(WorkflowError::Unreachable(orphan)),
            None => Ok(()),
        }
    }

    /// The executor advances the ledger one phase at a time, so any edge that
    /// skips ahead (other than the routed skip from 5 to 7) would fail mid-run.
    fn validate_audit_order(workflow: &Workflow) -> Result<(), WorkflowError> {
        let routed = BTreeSet::from([PhaseId::INVESTIGATION, PhaseId::REPORT]);
        for (from, transition) in workflow.edges() {
            let allowed = match transition {
                Transition::Direct(to) => from != PhaseId::BENCHMARK && from.next() == Some(*to),
                Transition::Conditional { targets, .. } => {
                    from == PhaseId::BENCHMARK
                        && targets.iter().copied().collect::<BTreeSet<_>>() == routed
                }
                Transition::End => from.next().is_none(),
            };
            if !allowed {
                return Err(WorkflowError::UnexpectedEdge {
                    from,
                    edge: transition.to_string(),
                });
            }
        }
        Ok(())
    }
}
