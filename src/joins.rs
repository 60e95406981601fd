//! Join graph.
//!
//! The [`JoinManager`] owns every join node of one criteria in an arena.
//! Nodes are addressed by [`NodeId`]; resolved expressions only keep the
//! node alias, so there is exactly one copy of each node.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::ast::JoinKind;
use crate::error::{CriteriaError, CriteriaResult};

/// Stable handle of a node in the join arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// The root node always lives at index 0.
const ROOT: NodeId = NodeId(0);

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub alias: String,
    pub parent: Option<NodeId>,
    /// Relationship name on the parent, `None` for the root.
    pub relation: Option<String>,
    pub kind: JoinKind,
    pub fetch: bool,
    /// Registered by a `join` call rather than inserted by resolution.
    pub explicit: bool,
    children: Vec<(String, NodeId)>,
}

impl JoinNode {
    /// Materialized relationship traversals, in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.children.iter().map(|(rel, id)| (rel.as_str(), *id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinManager {
    entity: String,
    nodes: Vec<JoinNode>,
    aliases: BTreeMap<String, NodeId>,
}

impl JoinManager {
    pub fn new(entity: impl Into<String>, root_alias: impl Into<String>) -> Self {
        let root_alias = root_alias.into();
        let mut aliases = BTreeMap::new();
        aliases.insert(root_alias.clone(), ROOT);
        Self {
            entity: entity.into(),
            nodes: vec![JoinNode {
                alias: root_alias,
                parent: None,
                relation: None,
                kind: JoinKind::Inner,
                fetch: false,
                explicit: true,
                children: Vec::new(),
            }],
            aliases,
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn root_alias(&self) -> &str {
        &self.nodes[ROOT.0].alias
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn node(&self, id: NodeId) -> &JoinNode {
        &self.nodes[id.0]
    }

    pub fn lookup(&self, alias: &str) -> Option<NodeId> {
        self.aliases.get(alias).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Child reached from `parent` through `relation`, if already materialized.
    pub fn child(&self, parent: NodeId, relation: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .find(|(rel, _)| rel == relation)
            .map(|(_, id)| *id)
    }

    /// Register an explicit join of `path` under `alias`.
    ///
    /// A path whose first segment is a known alias starts at that node, any
    /// other path starts at the root; a bare alias names no relationship.
    /// Intermediate relationships are joined implicitly. Joining the same
    /// relationship again under the same alias upgrades the existing node
    /// instead of adding a second one.
    pub fn join(
        &mut self,
        path: &[String],
        alias: &str,
        kind: JoinKind,
        fetch: bool,
    ) -> CriteriaResult<NodeId> {
        if alias.trim().is_empty() {
            return Err(CriteriaError::illegal_argument("join alias must not be empty"));
        }

        let (mut current, relations) = match path.split_first() {
            None => return Err(CriteriaError::illegal_argument("join path must not be empty")),
            Some((first, rest)) => match self.lookup(first) {
                Some(start) => (start, rest),
                None => (ROOT, path),
            },
        };

        let Some((last, intermediate)) = relations.split_last() else {
            return Err(CriteriaError::illegal_argument(format!(
                "join path '{}' names no relationship",
                path.join(".")
            )));
        };
        for relation in intermediate {
            current = self.implicit_join(current, relation);
        }

        if let Some(bound) = self.lookup(alias) {
            let node = &self.nodes[bound.0];
            if node.parent == Some(current) && node.relation.as_deref() == Some(last.as_str()) {
                let node = &mut self.nodes[bound.0];
                node.kind = kind;
                node.fetch |= fetch;
                node.explicit = true;
                return Ok(bound);
            }
            return Err(CriteriaError::illegal_argument(format!(
                "alias '{}' is already bound to '{}'",
                alias,
                self.path_of(bound)
            )));
        }

        if let Some(existing) = self.child(current, last) {
            let node = &self.nodes[existing.0];
            if node.explicit {
                return Err(CriteriaError::illegal_argument(format!(
                    "relationship '{}' is already joined as '{}'",
                    self.path_of(existing),
                    node.alias
                )));
            }
            let previous = node.alias.clone();
            self.aliases.remove(&previous);
            self.aliases.insert(alias.to_string(), existing);
            let node = &mut self.nodes[existing.0];
            node.alias = alias.to_string();
            node.kind = kind;
            node.fetch = fetch;
            node.explicit = true;
            debug!(from = %previous, to = %alias, "implicit join adopted by explicit join");
            return Ok(existing);
        }

        Ok(self.push(current, last, alias.to_string(), kind, fetch, true))
    }

    /// Traverse `relation` from `parent`, creating a LEFT join when missing.
    pub fn implicit_join(&mut self, parent: NodeId, relation: &str) -> NodeId {
        if let Some(existing) = self.child(parent, relation) {
            return existing;
        }
        let alias = self.unique_alias(relation);
        let id = self.push(parent, relation, alias, JoinKind::Left, false, false);
        debug!(
            path = %self.path_of(id),
            alias = %self.nodes[id.0].alias,
            "implicit join created"
        );
        id
    }

    fn push(
        &mut self,
        parent: NodeId,
        relation: &str,
        alias: String,
        kind: JoinKind,
        fetch: bool,
        explicit: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.aliases.insert(alias.clone(), id);
        self.nodes.push(JoinNode {
            alias,
            parent: Some(parent),
            relation: Some(relation.to_string()),
            kind,
            fetch,
            explicit,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push((relation.to_string(), id));
        id
    }

    fn unique_alias(&self, base: &str) -> String {
        if !self.aliases.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.aliases.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// `parent_alias.relation` for joined nodes, the alias for the root.
    pub fn path_of(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        match (node.parent, &node.relation) {
            (Some(parent), Some(relation)) => {
                format!("{}.{}", self.nodes[parent.0].alias, relation)
            }
            _ => node.alias.clone(),
        }
    }

    /// Nodes to keep when only `referenced` aliases are read.
    ///
    /// LEFT joins nobody reads are dropped; other kinds change the row set
    /// and always stay. Ancestors of kept nodes are kept as well.
    pub fn retained_for(&self, referenced: &BTreeSet<String>) -> BTreeSet<NodeId> {
        let mut keep = BTreeSet::new();
        for (index, node) in self.nodes.iter().enumerate().skip(1) {
            if node.kind != JoinKind::Left || referenced.contains(&node.alias) {
                let mut current = Some(NodeId(index));
                while let Some(id) = current {
                    if !keep.insert(id) {
                        break;
                    }
                    current = self.nodes[id.0].parent;
                }
            }
        }
        keep
    }

    /// Render the join fragment, depth first, children in insertion order.
    ///
    /// With `retain` only the given nodes are emitted; `allow_fetch = false`
    /// drops the FETCH keyword.
    pub fn render(&self, retain: Option<&BTreeSet<NodeId>>, allow_fetch: bool) -> String {
        let mut parts = Vec::new();
        self.render_children(ROOT, retain, allow_fetch, &mut parts);
        parts.join(" ")
    }

    fn render_children(
        &self,
        parent: NodeId,
        retain: Option<&BTreeSet<NodeId>>,
        allow_fetch: bool,
        parts: &mut Vec<String>,
    ) {
        let parent_alias = &self.nodes[parent.0].alias;
        for (relation, id) in &self.nodes[parent.0].children {
            if retain.is_some_and(|keep| !keep.contains(id)) {
                continue;
            }
            let node = &self.nodes[id.0];
            let fetch = if node.fetch && allow_fetch { "FETCH " } else { "" };
            parts.push(format!(
                "{} JOIN {}{}.{} {}",
                node.kind, fetch, parent_alias, relation, node.alias
            ));
            self.render_children(*id, retain, allow_fetch, parts);
        }
    }
}
