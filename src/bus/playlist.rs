/// Play-lists: the order buses are written and read within a block
///
/// Built from the bus bindings of every configured instrument:
///
/// - `aux_to_aux`: AUX buses fed by instruments that read AUX, in
///   topological order of the aux→aux edges
/// - `to_aux`: every AUX bus something writes
/// - `to_out`: every OUT bus something writes
///
/// Each AUX bus also gets a depth (longest aux→aux path reaching it), which
/// places instruments into stages: an instrument reading AUX buses runs one
/// stage after the deepest bus it reads, so all producers of a bus have
/// finished before any consumer starts.
///
/// # Example
/// ```text
/// A: out of aux 0          stage 0
/// B: aux 0 in, aux 1 out   stage 1
/// C: aux 1 in, out 0-1     stage 2
/// ```

use super::config::BusSlot;
use super::MAX_BUS;
use crate::error::{EngineError, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayLists {
    pub aux_to_aux: Vec<usize>,
    pub to_aux: Vec<usize>,
    pub to_out: Vec<usize>,
    /// Longest aux→aux chain ending at each AUX bus
    depth: Vec<usize>,
}

impl PlayLists {
    /// Analyse a set of bus bindings.
    ///
    /// # Errors
    /// A routing loop among AUX buses (`aux 0 in` → `aux 0 out`, or any
    /// longer cycle) is a fatal configuration error.
    pub fn build<'a, I>(slots: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a BusSlot>,
    {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut node_map: HashMap<usize, NodeIndex> = HashMap::new();
        let mut to_aux = BTreeSet::new();
        let mut to_out = BTreeSet::new();
        let mut fed_from_aux = BTreeSet::new();

        let mut node = |graph: &mut DiGraph<usize, ()>, bus: usize| {
            *node_map.entry(bus).or_insert_with(|| graph.add_node(bus))
        };

        for slot in slots {
            to_aux.extend(slot.aux_out.iter().copied());
            to_out.extend(slot.out.iter().copied());
            for &src in slot.aux_inputs() {
                let src_idx = node(&mut graph, src);
                for &dst in &slot.aux_out {
                    let dst_idx = node(&mut graph, dst);
                    // data flows src -> dst
                    graph.update_edge(src_idx, dst_idx, ());
                    fed_from_aux.insert(dst);
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let start = graph[cycle.node_id()];
            EngineError::BusCycle(cycle_through(&graph, cycle.node_id()).unwrap_or_else(|| vec![start]))
        })?;

        let mut depth = vec![0usize; MAX_BUS];
        for &idx in &order {
            let bus = graph[idx];
            depth[bus] = graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|pred| depth[graph[pred]] + 1)
                .max()
                .unwrap_or(0);
        }

        let aux_to_aux = order
            .iter()
            .map(|&idx| graph[idx])
            .filter(|bus| fed_from_aux.contains(bus))
            .collect();

        Ok(Self {
            aux_to_aux,
            to_aux: to_aux.into_iter().collect(),
            to_out: to_out.into_iter().collect(),
            depth,
        })
    }

    pub fn depth(&self, aux_bus: usize) -> usize {
        self.depth.get(aux_bus).copied().unwrap_or(0)
    }

    /// Stage an instrument bound to `slot` runs in
    pub fn stage_for(&self, slot: &BusSlot) -> usize {
        slot.aux_inputs()
            .iter()
            .map(|&bus| self.depth(bus) + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Buses on a cycle through `start`, for the error message
fn cycle_through(graph: &DiGraph<usize, ()>, start: NodeIndex) -> Option<Vec<usize>> {
    fn walk(
        graph: &DiGraph<usize, ()>,
        at: NodeIndex,
        start: NodeIndex,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        for next in graph.neighbors_directed(at, Direction::Outgoing) {
            if next == start {
                return true;
            }
            if path.contains(&next) {
                continue;
            }
            path.push(next);
            if walk(graph, next, start, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut path = vec![start];
    if walk(graph, start, start, &mut path) {
        Some(path.into_iter().map(|idx| graph[idx]).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(specs: &[&str]) -> BusSlot {
        BusSlot::from_specs(specs).unwrap()
    }

    #[test]
    fn test_chain_orders_stages() {
        let a = slot(&["aux 0 out"]);
        let b = slot(&["aux 0 in", "aux 1 out"]);
        let c = slot(&["aux 1 in", "out 0-1"]);

        let lists = PlayLists::build([&c, &b, &a]).unwrap();
        assert_eq!(lists.aux_to_aux, vec![1]);
        assert_eq!(lists.to_aux, vec![0, 1]);
        assert_eq!(lists.to_out, vec![0, 1]);

        assert_eq!(lists.stage_for(&a), 0);
        assert_eq!(lists.stage_for(&b), 1);
        assert_eq!(lists.stage_for(&c), 2);
    }

    #[test]
    fn test_every_producer_runs_before_consumer() {
        // two routes into aux 2, one of them two hops long
        let slots = vec![
            slot(&["aux 0 out"]),
            slot(&["aux 0 in", "aux 1 out"]),
            slot(&["aux 1 in", "aux 2 out"]),
            slot(&["aux 0 in", "aux 2 out"]),
            slot(&["aux 2 in", "out 0"]),
        ];
        let lists = PlayLists::build(&slots).unwrap();

        for consumer in &slots {
            for &bus in consumer.aux_inputs() {
                for producer in slots.iter().filter(|s| s.aux_out.contains(&bus)) {
                    assert!(lists.stage_for(producer) < lists.stage_for(consumer));
                }
            }
        }
    }

    #[test]
    fn test_cycle_is_fatal() {
        let slots = vec![
            slot(&["aux 0 in", "aux 1 out"]),
            slot(&["aux 1 in", "aux 0 out"]),
        ];
        match PlayLists::build(&slots) {
            Err(EngineError::BusCycle(buses)) => {
                assert_eq!(buses.len(), 2);
                assert!(buses.contains(&0) && buses.contains(&1));
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_is_fatal() {
        let slots = vec![slot(&["aux 3 in", "aux 3 out"])];
        assert!(matches!(PlayLists::build(&slots), Err(EngineError::BusCycle(_))));
    }

    #[test]
    fn test_plain_outputs_need_no_ordering() {
        let slots = vec![slot(&["out 0-1"]), slot(&["in 0", "out 1"])];
        let lists = PlayLists::build(&slots).unwrap();
        assert!(lists.aux_to_aux.is_empty());
        assert_eq!(lists.to_out, vec![0, 1]);
        assert!(slots.iter().all(|s| lists.stage_for(s) == 0));
    }
}
