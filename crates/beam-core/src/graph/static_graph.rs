use serde::{Deserialize, Serialize};

use super::{SearchGraph, StateId, StateKind, Transition};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph parse error: {0}")]
    Parse(String),
    #[error("graph has no states")]
    Empty,
    #[error("initial state {0:?} does not exist")]
    UnknownInitial(StateId),
    #[error("arc from {from:?} targets unknown state {target:?}")]
    UnknownTarget { from: StateId, target: StateId },
    #[error("arc added from unknown state {0:?}")]
    UnknownSource(StateId),
    #[error("arc from {from:?} to {target:?} has positive log probability {probability}")]
    PositiveProbability {
        from: StateId,
        target: StateId,
        probability: f32,
    },
}

/// Serialized form of a graph, as read from TOML or JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDescription {
    pub initial: StateId,
    pub states: Vec<StateDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDescription {
    pub kind: StateKind,
    /// Overrides `StateKind::default_order`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default)]
    pub arcs: Vec<Transition>,
}

/// An in-memory graph with every state and arc materialized up front.
#[derive(Debug, Clone)]
pub struct StaticGraph {
    initial: StateId,
    kinds: Vec<StateKind>,
    orders: Vec<u32>,
    arcs: Vec<Vec<Transition>>,
    phone_count: usize,
}

impl StaticGraph {
    /// Start an empty graph. The first added state is the initial state
    /// unless `set_initial` says otherwise.
    pub fn builder() -> StaticGraphBuilder {
        StaticGraphBuilder::default()
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, GraphError> {
        let desc: GraphDescription =
            toml::from_str(toml_str).map_err(|e| GraphError::Parse(e.to_string()))?;
        Self::from_description(desc)
    }

    pub fn from_description(desc: GraphDescription) -> Result<Self, GraphError> {
        let mut builder = StaticGraphBuilder::default();
        for state in &desc.states {
            let id = builder.add_state(state.kind);
            if let Some(order) = state.order {
                builder.set_order(id, order);
            }
        }
        for (index, state) in desc.states.into_iter().enumerate() {
            for arc in state.arcs {
                builder.add_arc(StateId(index as u32), arc);
            }
        }
        builder.set_initial(desc.initial);
        builder.build()
    }

    pub fn state_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.iter().map(Vec::len).sum()
    }

    pub fn to_description(&self) -> GraphDescription {
        let states = (0..self.kinds.len())
            .map(|i| {
                let kind = self.kinds[i];
                StateDescription {
                    kind,
                    order: (self.orders[i] != kind.default_order()).then_some(self.orders[i]),
                    arcs: self.arcs[i].clone(),
                }
            })
            .collect();
        GraphDescription {
            initial: self.initial,
            states,
        }
    }
}

impl SearchGraph for StaticGraph {
    fn initial_state(&self) -> StateId {
        self.initial
    }

    fn kind(&self, state: StateId) -> StateKind {
        self.kinds[state.index()]
    }

    fn successors(&self, state: StateId) -> &[Transition] {
        &self.arcs[state.index()]
    }

    fn phone_count(&self) -> usize {
        self.phone_count
    }

    fn order(&self, state: StateId) -> u32 {
        self.orders[state.index()]
    }
}

#[derive(Debug, Default)]
pub struct StaticGraphBuilder {
    initial: Option<StateId>,
    kinds: Vec<StateKind>,
    orders: Vec<u32>,
    arcs: Vec<Vec<Transition>>,
    dangling: Option<StateId>,
}

impl StaticGraphBuilder {
    pub fn add_state(&mut self, kind: StateKind) -> StateId {
        let id = StateId(self.kinds.len() as u32);
        self.kinds.push(kind);
        self.orders.push(kind.default_order());
        self.arcs.push(Vec::new());
        id
    }

    /// Arcs from unknown states are reported by `build`.
    pub fn add_arc(&mut self, from: StateId, arc: Transition) -> &mut Self {
        match self.arcs.get_mut(from.index()) {
            Some(arcs) => arcs.push(arc),
            None => {
                self.dangling.get_or_insert(from);
            }
        }
        self
    }

    pub fn set_initial(&mut self, state: StateId) -> &mut Self {
        self.initial = Some(state);
        self
    }

    pub fn set_order(&mut self, state: StateId, order: u32) -> &mut Self {
        if let Some(slot) = self.orders.get_mut(state.index()) {
            *slot = order;
        }
        self
    }

    pub fn build(self) -> Result<StaticGraph, GraphError> {
        if self.kinds.is_empty() {
            return Err(GraphError::Empty);
        }
        let state_count = self.kinds.len();
        let initial = self.initial.unwrap_or(StateId(0));
        if initial.index() >= state_count {
            return Err(GraphError::UnknownInitial(initial));
        }
        if let Some(from) = self.dangling {
            return Err(GraphError::UnknownSource(from));
        }
        for (index, arcs) in self.arcs.iter().enumerate() {
            let from = StateId(index as u32);
            if let Some(arc) = arcs.iter().find(|a| a.target.index() >= state_count) {
                return Err(GraphError::UnknownTarget {
                    from,
                    target: arc.target,
                });
            }
            if let Some(arc) = arcs.iter().find(|a| a.probability() > 0.0) {
                return Err(GraphError::PositiveProbability {
                    from,
                    target: arc.target,
                    probability: arc.probability(),
                });
            }
        }
        let phone_count = self
            .kinds
            .iter()
            .filter_map(|k| k.base_phone())
            .map(|p| p as usize + 1)
            .max()
            .unwrap_or(0);
        Ok(StaticGraph {
            initial,
            kinds: self.kinds,
            orders: self.orders,
            arcs: self.arcs,
            phone_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NonEmittingKind;

    const LOOP_TOML: &str = r#"
initial = 0

[[states]]
kind = { non_emitting = "branch" }
arcs = [{ target = 1 }, { target = 2, acoustic = -0.5 }]

[[states]]
kind = { emitting = { phone = 0 } }
arcs = [{ target = 1 }, { target = 0 }]

[[states]]
kind = { emitting = { phone = 3 } }
order = 2
arcs = [{ target = 0, language = -1.0 }]
"#;

    #[test]
    fn parse_phone_loop() {
        let graph = StaticGraph::from_toml(LOOP_TOML).unwrap();
        assert_eq!(graph.state_count(), 3);
        assert_eq!(graph.arc_count(), 5);
        assert_eq!(graph.initial_state(), StateId(0));
        assert_eq!(graph.phone_count(), 4);
        assert_eq!(graph.kind(StateId(2)), StateKind::Emitting { phone: 3 });
        assert_eq!(graph.order(StateId(2)), 2);
        assert_eq!(graph.order(StateId(1)), StateKind::Emitting { phone: 0 }.default_order());
        let arc = graph.successors(StateId(2))[0];
        assert!((arc.probability() + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn description_round_trip_keeps_overrides() {
        let graph = StaticGraph::from_toml(LOOP_TOML).unwrap();
        let desc = graph.to_description();
        assert_eq!(desc.states[2].order, Some(2));
        assert_eq!(desc.states[1].order, None);
        let rebuilt = StaticGraph::from_description(desc).unwrap();
        assert_eq!(rebuilt.arc_count(), graph.arc_count());
    }

    #[test]
    fn unknown_target_is_rejected() {
        let mut b = StaticGraph::builder();
        let s = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
        b.add_arc(s, Transition::new(StateId(9), 0.0));
        let err = b.build().unwrap_err();
        assert!(matches!(err, GraphError::UnknownTarget { target: StateId(9), .. }));
    }

    #[test]
    fn positive_arc_probability_is_rejected() {
        let mut b = StaticGraph::builder();
        let s = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
        let t = b.add_state(StateKind::NonEmitting(NonEmittingKind::Word(1)));
        b.add_arc(s, Transition::new(t, -1.0).with_insertion(-0.5));
        b.add_arc(s, Transition::new(t, -1.0).with_language(2.0));
        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            GraphError::PositiveProbability { from, target, probability }
                if from == s && target == t && probability == 1.0
        ));

        // A zero-cost arc is fine.
        let mut b = StaticGraph::builder();
        let s = b.add_state(StateKind::NonEmitting(NonEmittingKind::Branch));
        b.add_arc(s, Transition::new(s, 0.0));
        assert!(b.build().is_ok());
    }

    #[test]
    fn arc_from_unknown_state_is_rejected() {
        let mut b = StaticGraph::builder();
        b.add_state(StateKind::Final);
        b.add_arc(StateId(4), Transition::new(StateId(0), 0.0));
        assert!(matches!(
            b.build().unwrap_err(),
            GraphError::UnknownSource(StateId(4))
        ));
    }

    #[test]
    fn empty_and_bad_initial() {
        assert!(matches!(
            StaticGraph::builder().build().unwrap_err(),
            GraphError::Empty
        ));
        let mut b = StaticGraph::builder();
        b.add_state(StateKind::Final);
        b.set_initial(StateId(1));
        assert!(matches!(b.build().unwrap_err(), GraphError::UnknownInitial(_)));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            StaticGraph::from_toml("initial = [").unwrap_err(),
            GraphError::Parse(_)
        ));
    }
}
