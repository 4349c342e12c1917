//! Confirmed connections between part instances.

use crate::connector::{Connector, ConnectorType};
use crate::dof::DegreesOfFreedom;
use crate::pair_check::PairMatch;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

/// A joint between two connectors of two different parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub connector_a: Connector,
    pub connector_b: Connector,
    pub degrees_of_freedom: DegreesOfFreedom,
    /// Whether `connector_a` / `connector_b` is engaged over its whole extent.
    pub completely_used: [bool; 2],
}

impl Connection {
    pub fn new(connector_a: Connector, connector_b: Connector, matched: PairMatch) -> Self {
        Self {
            connector_a,
            connector_b,
            degrees_of_freedom: matched.degrees_of_freedom,
            completely_used: matched.completely_used,
        }
    }

    /// The same joint seen from the other part.
    pub fn reversed(&self) -> Self {
        Self {
            connector_a: self.connector_b.clone(),
            connector_b: self.connector_a.clone(),
            degrees_of_freedom: self.degrees_of_freedom.clone(),
            completely_used: [self.completely_used[1], self.completely_used[0]],
        }
    }

    /// Graphviz edge colour for the connector kinds involved.
    fn dot_color(&self) -> &'static str {
        let kinds = [
            self.connector_a.connector_type(),
            self.connector_b.connector_type(),
        ];
        if kinds.contains(&ConnectorType::Clip) {
            "red"
        } else if kinds.contains(&ConnectorType::Finger) {
            "green"
        } else if kinds.contains(&ConnectorType::Generic) {
            "orange"
        } else {
            "blue"
        }
    }
}

/// Symmetric multigraph of connections keyed by part instance.
///
/// Every connection is stored twice, once per direction. The copy stored
/// under `(a, b)` has `connector_a` on part `a`.
#[derive(Clone, Debug)]
pub struct ConnectionGraph<N> {
    adjacency: HashMap<N, HashMap<N, Vec<Connection>>>,
}

impl<N> Default for ConnectionGraph<N> {
    fn default() -> Self {
        Self {
            adjacency: HashMap::new(),
        }
    }
}

impl<N: Clone + Eq + Hash> ConnectionGraph<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection`, whose `connector_a` belongs to `a`, in both directions.
    pub fn add_connection(&mut self, a: N, b: N, connection: Connection) {
        let mirrored = connection.reversed();
        self.edges_mut(a.clone(), b.clone()).push(connection);
        self.edges_mut(b, a).push(mirrored);
    }

    /// Removes one stored copy of `connection` between `a` and `b`. Returns
    /// whether it was present.
    pub fn remove_connection(&mut self, a: &N, b: &N, connection: &Connection) -> bool {
        let removed = self.remove_edge(a, b, connection);
        if removed {
            self.remove_edge(b, a, &connection.reversed());
        }
        removed
    }

    /// Drops every connection between `a` and `b`.
    pub fn remove_all_connections(&mut self, a: &N, b: &N) {
        self.detach(a, b);
        self.detach(b, a);
    }

    /// Drops every connection touching `node`.
    pub fn remove_all_connections_of(&mut self, node: &N) {
        if let Some(neighbours) = self.adjacency.remove(node) {
            for other in neighbours.keys() {
                self.detach(other, node);
            }
        }
    }

    /// Drops every connection touching any node of `nodes`.
    pub fn remove_all_connections_of_set<'n>(&mut self, nodes: impl IntoIterator<Item = &'n N>)
    where
        N: 'n,
    {
        for node in nodes {
            self.remove_all_connections_of(node);
        }
    }

    /// Connections between `a` and `b`, seen from `a`. Empty if there are none.
    pub fn get_connections(&self, a: &N, b: &N) -> &[Connection] {
        self.adjacency
            .get(a)
            .and_then(|neighbours| neighbours.get(b))
            .map_or(&[], Vec::as_slice)
    }

    /// All neighbours of `node` with their connections. Empty if there are none.
    pub fn connections_of(&self, node: &N) -> HashMap<N, &[Connection]> {
        self.adjacency
            .get(node)
            .map(|neighbours| {
                neighbours
                    .iter()
                    .map(|(other, edges)| (other.clone(), edges.as_slice()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct connections; each is stored once per direction.
    pub fn count_total_connections(&self) -> u64 {
        let stored: u64 = self
            .adjacency
            .values()
            .flat_map(HashMap::values)
            .map(|edges| edges.len() as u64)
            .sum();
        stored / 2
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Nodes with at least one connection.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.adjacency.keys()
    }

    /// Motions still permitted between `a` and `b` once all their joints act
    /// together. `None` if they are not connected.
    pub fn combined_degrees_of_freedom(&self, a: &N, b: &N) -> Option<DegreesOfFreedom> {
        let edges = self.get_connections(a, b);
        if edges.is_empty() {
            return None;
        }
        let dofs: Vec<DegreesOfFreedom> = edges
            .iter()
            .map(|c| c.degrees_of_freedom.clone())
            .collect();
        Some(DegreesOfFreedom::reduce(&dofs))
    }

    /// Maximal sets of transitively connected nodes.
    pub fn connected_components(&self) -> Vec<HashSet<N>> {
        let mut seen: HashSet<N> = HashSet::new();
        let mut components = Vec::new();
        for start in self.adjacency.keys() {
            if seen.contains(start) {
                continue;
            }
            let mut component = HashSet::new();
            let mut stack = vec![start.clone()];
            while let Some(node) = stack.pop() {
                if !seen.insert(node.clone()) {
                    continue;
                }
                if let Some(neighbours) = self.adjacency.get(&node) {
                    stack.extend(
                        neighbours
                            .keys()
                            .filter(|n| !seen.contains(*n))
                            .cloned(),
                    );
                }
                component.insert(node);
            }
            components.push(component);
        }
        components
    }

    /// Graphviz rendering, one edge per connection.
    ///
    /// Edges are coloured by connector kind: cylinder pairs blue, fingers
    /// green, clips red, generic orange.
    pub fn to_dot(&self) -> String
    where
        N: Display,
    {
        let mut out = String::from("graph connections {\n");
        let mut done: HashSet<(&N, &N)> = HashSet::new();
        for (a, neighbours) in &self.adjacency {
            for (b, edges) in neighbours {
                if done.contains(&(b, a)) {
                    continue;
                }
                done.insert((a, b));
                for edge in edges {
                    out.push_str(&format!(
                        "  \"{a}\" -- \"{b}\" [color={}];\n",
                        edge.dot_color()
                    ));
                }
            }
        }
        out.push('}');
        out.push('\n');
        out
    }

    fn edges_mut(&mut self, a: N, b: N) -> &mut Vec<Connection> {
        self.adjacency.entry(a).or_default().entry(b).or_default()
    }

    fn remove_edge(&mut self, a: &N, b: &N, connection: &Connection) -> bool {
        let Some(edges) = self.adjacency.get_mut(a).and_then(|n| n.get_mut(b)) else {
            return false;
        };
        let Some(position) = edges.iter().position(|c| c == connection) else {
            return false;
        };
        edges.remove(position);
        if edges.is_empty() {
            self.detach(a, b);
        }
        true
    }

    /// Removes `b` from `a`'s neighbours, and `a` itself once isolated.
    fn detach(&mut self, a: &N, b: &N) {
        if let Some(neighbours) = self.adjacency.get_mut(a) {
            neighbours.remove(b);
            if neighbours.is_empty() {
                self.adjacency.remove(a);
            }
        }
    }
}
