//! Bus-graph connectivity on top of the element tables.
//!
//! The tables stay the source of truth; a petgraph view is built on demand
//! for the traversals the zoning and reduction stages need. Branches out
//! of service do not contribute edges.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};

use crate::network::Network;

/// Undirected bus graph derived from the line and trafo tables.
pub struct BusGraph {
    graph: UnGraph<usize, ()>,
    node_of: HashMap<usize, NodeIndex>,
}

impl BusGraph {
    pub fn from_network(net: &Network) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut node_of = HashMap::new();
        for (idx, _) in net.bus.iter() {
            node_of.insert(idx, graph.add_node(idx));
        }
        for (_, line) in net.line.iter().filter(|(_, l)| l.in_service) {
            if let (Some(&a), Some(&b)) = (node_of.get(&line.from_bus), node_of.get(&line.to_bus)) {
                graph.add_edge(a, b, ());
            }
        }
        for (_, trafo) in net.trafo.iter().filter(|(_, t)| t.in_service) {
            if let (Some(&a), Some(&b)) = (node_of.get(&trafo.hv_bus), node_of.get(&trafo.lv_bus)) {
                graph.add_edge(a, b, ());
            }
        }
        Self { graph, node_of }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Buses reachable from `start` without traversing through any bus in
    /// `no_traverse`. Non-traversable buses reached from the outside are
    /// part of the result but their neighbors are not expanded.
    pub fn connected_component(
        &self,
        start: usize,
        no_traverse: &BTreeSet<usize>,
    ) -> BTreeSet<usize> {
        let mut component = BTreeSet::new();
        let Some(&start_node) = self.node_of.get(&start) else {
            return component;
        };
        let mut queue = VecDeque::new();
        queue.push_back(start_node);
        while let Some(node) = queue.pop_front() {
            let bus = self.graph[node];
            if !component.insert(bus) {
                continue;
            }
            if no_traverse.contains(&bus) && bus != start {
                continue;
            }
            for neighbor in self.graph.neighbors(node) {
                if !component.contains(&self.graph[neighbor]) {
                    queue.push_back(neighbor);
                }
            }
        }
        component
    }

    /// All connected components, largest first.
    pub fn components(&self) -> Vec<BTreeSet<usize>> {
        let mut seen = BTreeSet::new();
        let mut components = Vec::new();
        let empty = BTreeSet::new();
        for node in self.graph.node_indices() {
            let bus = self.graph[node];
            if seen.contains(&bus) {
                continue;
            }
            let component = self.connected_component(bus, &empty);
            seen.extend(component.iter().copied());
            components.push(component);
        }
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Bus, Line, Trafo};

    /// Chain 0-1-2-3 with a trafo 3-4.
    fn chain_net() -> Network {
        let mut net = Network::new("chain");
        for i in 0..5 {
            net.bus.push(Bus {
                name: format!("Bus {i}"),
                vn_kv: if i == 4 { 110.0 } else { 220.0 },
                ..Bus::default()
            });
        }
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            net.line.push(Line {
                from_bus: a,
                to_bus: b,
                ..Line::default()
            });
        }
        net.trafo.push(Trafo {
            hv_bus: 3,
            lv_bus: 4,
            vn_hv_kv: 220.0,
            vn_lv_kv: 110.0,
            ..Trafo::default()
        });
        net
    }

    #[test]
    fn test_full_component() {
        let net = chain_net();
        let graph = BusGraph::from_network(&net);
        let component = graph.connected_component(0, &BTreeSet::new());
        assert_eq!(component, (0..5).collect());
    }

    #[test]
    fn test_no_traverse_bus_is_included_but_not_expanded() {
        let net = chain_net();
        let graph = BusGraph::from_network(&net);
        let stop: BTreeSet<usize> = [2].into_iter().collect();
        let component = graph.connected_component(0, &stop);
        // bus 2 is reached, buses 3 and 4 behind it are not
        assert_eq!(component, [0, 1, 2].into_iter().collect());
    }

    #[test]
    fn test_out_of_service_line_breaks_connectivity() {
        let mut net = chain_net();
        net.line.get_mut(1).unwrap().in_service = false;
        let graph = BusGraph::from_network(&net);
        let component = graph.connected_component(0, &BTreeSet::new());
        assert_eq!(component, [0, 1].into_iter().collect());
        assert_eq!(graph.components().len(), 2);
    }
}
