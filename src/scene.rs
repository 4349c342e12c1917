//! Scene-level connection search.
//!
//! The [`ConnectionFinder`] walks a [`PartHierarchy`], prunes part pairs whose
//! world bounding boxes do not intersect, and feeds the connectors of every
//! remaining pair through the bucketed pairwise tester. Connectors come from
//! a [`ConnectorCache`] that memoizes an injected [`ConnectorSource`] by part
//! name.
//!
//! [`SceneTree`] is a small owned hierarchy for driving the finder without an
//! external scene graph.

use crate::bucketing::{PairHit, find_pairs_between, find_pairs_within};
use crate::config::MatchConfig;
use crate::connector::Connector;
use crate::error::{ConnectionError, ConnectionResult};
use crate::geometry::transform_aabb;
use crate::graph::{Connection, ConnectionGraph};
use crate::pair_check::PlacedConnector;
use bevy_math::bounding::{Aabb3d, BoundingVolume, IntersectsVolume};
use glam::Mat4;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Read access to a tree of placed part instances.
///
/// Group nodes have no part name; only part nodes carry connectors. Every
/// query returns `None` for nodes the hierarchy does not know.
pub trait PartHierarchy: Sync {
    type Node: Clone + Eq + Hash + Debug + Send + Sync;

    fn contains(&self, node: &Self::Node) -> bool;
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Name of the part definition instanced at `node`, `None` for groups.
    fn part_name(&self, node: &Self::Node) -> Option<&str>;
    fn absolute_transform(&self, node: &Self::Node) -> Option<Mat4>;
    fn absolute_aabb(&self, node: &Self::Node) -> Option<Aabb3d>;
}

/// Produces the connectors of a part definition, in the part's local frame.
pub trait ConnectorSource: Sync {
    fn connectors_of(&self, part_name: &str) -> ConnectionResult<Vec<Connector>>;
}

impl<F> ConnectorSource for F
where
    F: Fn(&str) -> ConnectionResult<Vec<Connector>> + Sync,
{
    fn connectors_of(&self, part_name: &str) -> ConnectionResult<Vec<Connector>> {
        self(part_name)
    }
}

/// Memoizes a [`ConnectorSource`] by part name.
///
/// Entries are never invalidated. Failed extractions are not cached, so a
/// later lookup retries.
pub struct ConnectorCache<S> {
    source: S,
    entries: Mutex<HashMap<String, Arc<Vec<Connector>>>>,
}

impl<S: ConnectorSource> ConnectorCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Connectors of `part_name`, extracting them on first use.
    pub fn get(&self, part_name: &str) -> ConnectionResult<Arc<Vec<Connector>>> {
        if let Some(hit) = self.lock().get(part_name) {
            return Ok(Arc::clone(hit));
        }
        let connectors = Arc::new(self.source.connectors_of(part_name)?);
        debug!(part = part_name, count = connectors.len(), "extracted connectors");
        Ok(Arc::clone(
            self.lock()
                .entry(part_name.to_owned())
                .or_insert(connectors),
        ))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<Connector>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connections among the connectors of a single part, each unordered pair once.
pub fn find_internal_connections(
    connectors: &[Connector],
    config: &MatchConfig,
) -> Vec<Connection> {
    let placed: Vec<PlacedConnector<'_>> =
        connectors.iter().map(PlacedConnector::local).collect();
    find_pairs_within(&placed, config)
        .into_iter()
        .map(|hit| {
            Connection::new(
                connectors[hit.index_a].clone(),
                connectors[hit.index_b].clone(),
                hit.matched,
            )
        })
        .collect()
}

/// A part instance resolved for one search pass.
struct PartEntry<N> {
    node: N,
    transform: Mat4,
    aabb: Aabb3d,
    connectors: Arc<Vec<Connector>>,
}

/// Finds connections between placed part instances.
pub struct ConnectionFinder<'a, H, S> {
    hierarchy: &'a H,
    cache: &'a ConnectorCache<S>,
    config: MatchConfig,
}

impl<'a, H: PartHierarchy, S: ConnectorSource> ConnectionFinder<'a, H, S> {
    pub fn new(hierarchy: &'a H, cache: &'a ConnectorCache<S>) -> Self {
        Self {
            hierarchy,
            cache,
            config: MatchConfig::default(),
        }
    }

    /// Uses `config` for all subsequent searches (builder pattern).
    pub fn with_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Connections between two part nodes, without bounding-box pruning.
    ///
    /// Each connection's `connector_a` belongs to `a`. Extraction failures
    /// are returned to the caller.
    pub fn find_connections_between(
        &self,
        a: &H::Node,
        b: &H::Node,
    ) -> ConnectionResult<Vec<Connection>> {
        let (Some(ea), Some(eb)) = (self.resolve(a)?, self.resolve(b)?) else {
            return Ok(Vec::new());
        };
        let pa = place(&ea);
        let pb = place(&eb);
        Ok(find_pairs_between(&pa, &pb, &self.config)
            .into_iter()
            .map(|hit| to_connection(&ea, &eb, hit))
            .collect())
    }

    /// All connections among the parts below `root`.
    pub fn find_connections(&self, root: &H::Node) -> ConnectionResult<ConnectionGraph<H::Node>> {
        let parts = self.collect_parts(root)?;
        let mut candidates = Vec::new();
        for i in 0..parts.len() {
            for j in i + 1..parts.len() {
                if parts[i].aabb.intersects(&parts[j].aabb) {
                    candidates.push((i, j));
                }
            }
        }
        Ok(self.connect(&parts, &candidates))
    }

    /// Connections between the parts below `active` and the other parts below
    /// `passive_root`, e.g. for a part being dragged through a model.
    pub fn find_connections_for(
        &self,
        active: &H::Node,
        passive_root: &H::Node,
    ) -> ConnectionResult<ConnectionGraph<H::Node>> {
        let active_parts = self.collect_parts(active)?;
        let active_nodes: HashSet<&H::Node> = active_parts.iter().map(|p| &p.node).collect();
        let passive_parts = self.collect_parts(passive_root)?;

        // One list: active parts first, then passive parts not in the active subtree.
        let split = active_parts.len();
        let mut parts: Vec<PartEntry<H::Node>> = Vec::with_capacity(split + passive_parts.len());
        let passive: Vec<PartEntry<H::Node>> = passive_parts
            .into_iter()
            .filter(|p| !active_nodes.contains(&p.node))
            .collect();
        parts.extend(active_parts);
        parts.extend(passive);

        let mut candidates = Vec::new();
        for i in 0..split {
            for j in split..parts.len() {
                if parts[i].aabb.intersects(&parts[j].aabb) {
                    candidates.push((i, j));
                }
            }
        }
        Ok(self.connect(&parts, &candidates))
    }

    /// Tests every candidate pair and merges the hits into a graph.
    fn connect(
        &self,
        parts: &[PartEntry<H::Node>],
        candidates: &[(usize, usize)],
    ) -> ConnectionGraph<H::Node> {
        let placed: Vec<Vec<PlacedConnector<'_>>> = parts.iter().map(place).collect();
        let test = |&(i, j): &(usize, usize)| {
            (i, j, find_pairs_between(&placed[i], &placed[j], &self.config))
        };
        let results: Vec<_> = if self.config.parallel {
            candidates.par_iter().map(test).collect()
        } else {
            candidates.iter().map(test).collect()
        };

        let mut graph = ConnectionGraph::new();
        for (i, j, hits) in results {
            for hit in hits {
                graph.add_connection(
                    parts[i].node.clone(),
                    parts[j].node.clone(),
                    to_connection(&parts[i], &parts[j], hit),
                );
            }
        }
        info!(
            parts = parts.len(),
            candidate_pairs = candidates.len(),
            connections = graph.count_total_connections(),
            parallel = self.config.parallel,
            "connection search finished"
        );
        graph
    }

    /// Part nodes below `root` (including `root` itself), resolved.
    ///
    /// Parts whose connectors cannot be extracted are skipped with a warning.
    fn collect_parts(&self, root: &H::Node) -> ConnectionResult<Vec<PartEntry<H::Node>>> {
        if !self.hierarchy.contains(root) {
            return Err(ConnectionError::UnknownNode(format!("{root:?}")));
        }
        let mut parts = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            match self.resolve(&node) {
                Ok(Some(entry)) => parts.push(entry),
                Ok(None) => {}
                Err(ConnectionError::Extraction { part, message }) => {
                    warn!(part = %part, message = %message, "skipping part without connectors");
                }
                Err(err) => return Err(err),
            }
            stack.extend(self.hierarchy.children(&node).into_iter().rev());
        }
        Ok(parts)
    }

    /// `None` for group nodes.
    fn resolve(&self, node: &H::Node) -> ConnectionResult<Option<PartEntry<H::Node>>> {
        let unknown = || ConnectionError::UnknownNode(format!("{node:?}"));
        if !self.hierarchy.contains(node) {
            return Err(unknown());
        }
        let Some(name) = self.hierarchy.part_name(node) else {
            return Ok(None);
        };
        let transform = self.hierarchy.absolute_transform(node).ok_or_else(unknown)?;
        let aabb = self.hierarchy.absolute_aabb(node).ok_or_else(unknown)?;
        let connectors = self.cache.get(name)?;
        Ok(Some(PartEntry {
            node: node.clone(),
            transform,
            aabb,
            connectors,
        }))
    }
}

fn place<N>(entry: &PartEntry<N>) -> Vec<PlacedConnector<'_>> {
    entry
        .connectors
        .iter()
        .map(|c| PlacedConnector::new(c, &entry.transform))
        .collect()
}

fn to_connection<N>(
    a: &PartEntry<N>,
    b: &PartEntry<N>,
    hit: PairHit,
) -> Connection {
    Connection::new(
        a.connectors[hit.index_a].clone(),
        b.connectors[hit.index_b].clone(),
        hit.matched,
    )
}

/// Handle of a node in a [`SceneTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct SceneNode {
    name: String,
    part: Option<String>,
    local_transform: Mat4,
    /// Part-local bounds; groups have none of their own.
    local_aabb: Option<Aabb3d>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned hierarchy of groups and part instances with local transforms.
#[derive(Clone, Debug)]
pub struct SceneTree {
    nodes: Vec<SceneNode>,
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneTree {
    /// An empty scene with a root group at the origin.
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode {
                name: "root".into(),
                part: None,
                local_transform: Mat4::IDENTITY,
                local_aabb: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_group(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        local_transform: Mat4,
    ) -> ConnectionResult<NodeId> {
        self.push(parent, name.into(), None, local_transform, None)
    }

    /// Adds an instance of part definition `part_name` whose own bounds are `local_aabb`.
    pub fn add_part(
        &mut self,
        parent: NodeId,
        part_name: impl Into<String>,
        local_transform: Mat4,
        local_aabb: Aabb3d,
    ) -> ConnectionResult<NodeId> {
        let part_name = part_name.into();
        self.push(
            parent,
            part_name.clone(),
            Some(part_name),
            local_transform,
            Some(local_aabb),
        )
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(
        &mut self,
        parent: NodeId,
        name: String,
        part: Option<String>,
        local_transform: Mat4,
        local_aabb: Option<Aabb3d>,
    ) -> ConnectionResult<NodeId> {
        let id = NodeId(self.nodes.len());
        let parent_node = self
            .nodes
            .get_mut(parent.0)
            .ok_or_else(|| ConnectionError::UnknownNode(parent.to_string()))?;
        parent_node.children.push(id);
        self.nodes.push(SceneNode {
            name,
            part,
            local_transform,
            local_aabb,
            parent: Some(parent),
            children: Vec::new(),
        });
        Ok(id)
    }
}

impl PartHierarchy for SceneTree {
    type Node = NodeId;

    fn contains(&self, node: &NodeId) -> bool {
        node.0 < self.nodes.len()
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn part_name(&self, node: &NodeId) -> Option<&str> {
        self.nodes.get(node.0).and_then(|n| n.part.as_deref())
    }

    fn absolute_transform(&self, node: &NodeId) -> Option<Mat4> {
        let mut current = self.nodes.get(node.0)?;
        let mut transform = current.local_transform;
        while let Some(parent) = current.parent {
            current = self.nodes.get(parent.0)?;
            transform = current.local_transform * transform;
        }
        Some(transform)
    }

    /// World bounds of a part, or the merged bounds of a group's parts.
    fn absolute_aabb(&self, node: &NodeId) -> Option<Aabb3d> {
        let scene_node = self.nodes.get(node.0)?;
        if let Some(local) = &scene_node.local_aabb {
            return Some(transform_aabb(local, &self.absolute_transform(node)?));
        }
        scene_node
            .children
            .iter()
            .filter_map(|child| self.absolute_aabb(child))
            .reduce(|acc, b| acc.merge(&b))
    }
}
