//! Command tree registry.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Each node is owned by exactly
//! one `Owns` edge (from its parent, or from the root list) and may be
//! reachable through any number of `Alias` edges. Removing an alias edge never
//! touches the node it points to.

use crate::checks::Check;
use crate::error::{RegistryError, ResolveError};
use crate::params::{usage, valid_signature, Param};
use crate::tokenizer::StringView;
use crate::types::CommandHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Owns,
    Alias,
}

/// A labelled link from a parent (or the root) to a node.
#[derive(Debug, Clone)]
pub struct Edge {
    pub label: String,
    keys: Vec<String>,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    fn matches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    fn collides<'a>(&self, keys: &'a [String]) -> Option<&'a str> {
        keys.iter()
            .find(|k| self.matches(k))
            .map(|k| k.as_str())
    }
}

#[derive(Clone)]
pub enum CommandKind {
    Leaf(Arc<dyn CommandHandler>),
    Group {
        /// Runs when no subcommand matched.
        default: Option<Arc<dyn CommandHandler>>,
    },
}

#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub params: Vec<Param>,
    pub checks: Vec<Check>,
    pub kind: CommandKind,
    /// Owning parent, for navigation only.
    pub parent: Option<NodeId>,
    children: Vec<Edge>,
}

impl Node {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, CommandKind::Group { .. })
    }

    pub fn children(&self) -> &[Edge] {
        &self.children
    }

    fn keys(&self) -> Vec<String> {
        lower_keys(&self.name, &self.aliases)
    }
}

fn lower_keys(name: &str, aliases: &[String]) -> Vec<String> {
    std::iter::once(name)
        .chain(aliases.iter().map(String::as_str))
        .map(str::to_lowercase)
        .collect()
}

/// Declarative description of a command (and, for groups, its subtree).
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    aliases: Vec<String>,
    description: String,
    params: Vec<Param>,
    checks: Vec<Check>,
    kind: CommandKind,
    children: Vec<CommandSpec>,
}

impl CommandSpec {
    fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            params: Vec::new(),
            checks: Vec::new(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn leaf(name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Self::new(name, CommandKind::Leaf(Arc::new(handler)))
    }

    /// Leaf sharing a handler with another registration.
    pub fn shared(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self::new(name, CommandKind::Leaf(handler))
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, CommandKind::Group { default: None })
    }

    /// Give a group a behavior for when no subcommand matches.
    pub fn with_default(mut self, handler: impl CommandHandler + 'static) -> Self {
        if let CommandKind::Group { default } = &mut self.kind {
            *default = Some(Arc::new(handler));
        }
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn child(mut self, child: CommandSpec) -> Self {
        self.children.push(child);
        self
    }

    fn keys(&self) -> Vec<String> {
        lower_keys(&self.name, &self.aliases)
    }
}

/// The result of walking the tree for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<'t> {
    pub node: NodeId,
    /// Every node traversed, root first.
    pub path: Vec<NodeId>,
    /// Labels as typed by the user.
    pub labels: Vec<String>,
    /// Unconsumed text, leading whitespace removed.
    pub rest: &'t str,
}

/// Command tree: root edges plus the node arena.
#[derive(Clone, Default)]
pub struct CommandTree {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<Edge>,
    next_id: usize,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn roots(&self) -> &[Edge] {
        &self.roots
    }

    /// Labels of the root-level commands, in registration order.
    pub fn root_names(&self) -> Vec<String> {
        self.roots.iter().map(|e| e.label.clone()).collect()
    }

    fn edges(&self, parent: Option<NodeId>) -> &[Edge] {
        match parent {
            None => &self.roots,
            Some(id) => self.nodes.get(&id).map_or(&[], |n| &n.children),
        }
    }

    fn edges_mut(&mut self, parent: Option<NodeId>) -> Option<&mut Vec<Edge>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => self.nodes.get_mut(&id).map(|n| &mut n.children),
        }
    }

    fn child(&self, parent: Option<NodeId>, key: &str) -> Option<&Edge> {
        let key = key.to_lowercase();
        self.edges(parent).iter().find(|e| e.matches(&key))
    }

    /// Space-separated path of owned names from the root.
    pub fn qualified_name(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.nodes.get(&id)) {
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join(" ")
    }

    fn describe_parent(&self, parent: Option<NodeId>) -> String {
        parent.map_or_else(|| "root".into(), |id| self.qualified_name(id))
    }

    /// Look up a node by labels, following both edge kinds.
    pub fn find(&self, path: &[&str]) -> Result<NodeId, RegistryError> {
        let mut current = None;
        for label in path {
            let edge = self
                .child(current, label)
                .ok_or_else(|| RegistryError::UnknownPath(path.join(" ")))?;
            current = Some(edge.target);
        }
        current.ok_or_else(|| RegistryError::UnknownPath(String::new()))
    }

    /// Like [`find`](Self::find), but the empty path means the root and the
    /// target must be able to hold children.
    fn find_parent(&self, path: &[&str]) -> Result<Option<NodeId>, RegistryError> {
        if path.is_empty() {
            return Ok(None);
        }
        let id = self.find(path)?;
        match self.nodes.get(&id) {
            Some(node) if node.is_group() => Ok(Some(id)),
            _ => Err(RegistryError::NotAGroup(path.join(" "))),
        }
    }

    fn check_free(
        &self,
        parent: Option<NodeId>,
        keys: &[String],
    ) -> Result<(), RegistryError> {
        for edge in self.edges(parent) {
            if let Some(name) = edge.collides(keys) {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                    parent: self.describe_parent(parent),
                });
            }
        }
        Ok(())
    }

    fn validate(spec: &CommandSpec, parent_name: &str) -> Result<(), RegistryError> {
        if !valid_signature(&spec.params) {
            return Err(RegistryError::InvalidSignature(spec.name.clone()));
        }
        if !spec.children.is_empty() && !matches!(spec.kind, CommandKind::Group { .. }) {
            return Err(RegistryError::NotAGroup(spec.name.clone()));
        }

        let mut seen: Vec<String> = Vec::new();
        for child in &spec.children {
            let keys = child.keys();
            if let Some(name) = keys.iter().find(|k| seen.contains(k)) {
                return Err(RegistryError::DuplicateName {
                    name: name.clone(),
                    parent: format!("{} {}", parent_name, spec.name).trim().to_string(),
                });
            }
            seen.extend(keys);
            Self::validate(child, &spec.name)?;
        }
        Ok(())
    }

    /// Register a command (with its subtree) under `parent` (empty = root).
    ///
    /// Fails without modifying the tree if any name or alias collides.
    pub fn register(
        &mut self,
        spec: CommandSpec,
        parent: &[&str],
    ) -> Result<NodeId, RegistryError> {
        let parent = self.find_parent(parent)?;
        self.check_free(parent, &spec.keys())?;
        Self::validate(&spec, &self.describe_parent(parent))?;

        let id = self.insert(spec, parent);
        debug!("Registered command {}", self.qualified_name(id));
        Ok(id)
    }

    fn insert(&mut self, spec: CommandSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let edge = Edge {
            label: spec.name.clone(),
            keys: spec.keys(),
            target: id,
            kind: EdgeKind::Owns,
        };

        self.nodes.insert(
            id,
            Node {
                name: spec.name,
                aliases: spec.aliases,
                description: spec.description,
                params: spec.params,
                checks: spec.checks,
                kind: spec.kind,
                parent,
                children: Vec::new(),
            },
        );
        if let Some(edges) = self.edges_mut(parent) {
            edges.push(edge);
        }

        for child in spec.children {
            self.insert(child, Some(id));
        }
        id
    }

    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        self.nodes.get(&from).map_or(false, |node| {
            node.children.iter().any(|e| self.reaches(e.target, to))
        })
    }

    /// Make an existing command reachable under another parent as well.
    ///
    /// `labels` are the first label and any extra keys of the new edge.
    pub fn register_alias(
        &mut self,
        target: &[&str],
        parent: &[&str],
        labels: &[&str],
    ) -> Result<(), RegistryError> {
        let target_id = self.find(target)?;
        let parent_id = self.find_parent(parent)?;

        if parent_id.map_or(false, |p| self.reaches(target_id, p)) {
            return Err(RegistryError::Cycle(target.join(" ")));
        }

        let keys: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
        let Some(label) = labels.first() else {
            return Err(RegistryError::UnknownPath(target.join(" ")));
        };
        self.check_free(parent_id, &keys)?;

        if let Some(edges) = self.edges_mut(parent_id) {
            edges.push(Edge {
                label: label.to_string(),
                keys,
                target: target_id,
                kind: EdgeKind::Alias,
            });
        }
        debug!("Attached {} under {:?} as {}", target.join(" "), parent, label);
        Ok(())
    }

    /// Alias a command under `parent` using its own name and aliases.
    pub fn attach(&mut self, target: &[&str], parent: &[&str]) -> Result<(), RegistryError> {
        let node = self
            .find(target)
            .ok()
            .and_then(|id| self.nodes.get(&id))
            .ok_or_else(|| RegistryError::UnknownPath(target.join(" ")))?;

        let labels: Vec<String> = std::iter::once(node.name.clone())
            .chain(node.aliases.iter().cloned())
            .collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        self.register_alias(target, parent, &labels)
    }

    /// Remove an alias edge; the aliased command is unaffected.
    pub fn unregister_alias(&mut self, parent: &[&str], label: &str) -> Result<(), RegistryError> {
        let parent_id = self.find_parent(parent)?;
        let key = label.to_lowercase();
        let full_path = || {
            let mut path = parent.to_vec();
            path.push(label);
            path.join(" ")
        };

        let edges = self
            .edges_mut(parent_id)
            .ok_or_else(|| RegistryError::UnknownPath(full_path()))?;
        let index = edges
            .iter()
            .position(|e| e.matches(&key))
            .ok_or_else(|| RegistryError::UnknownPath(full_path()))?;

        if edges[index].kind != EdgeKind::Alias {
            return Err(RegistryError::NotAnAlias(full_path()));
        }
        edges.remove(index);
        Ok(())
    }

    /// Remove a command and its owned subtree, along with every alias edge
    /// that pointed into it. Removing through an alias label only drops
    /// that alias.
    pub fn unregister(&mut self, path: &[&str]) -> Result<(), RegistryError> {
        let Some((label, parent)) = path.split_last() else {
            return Err(RegistryError::UnknownPath(String::new()));
        };
        let edge = self
            .find_parent(parent)
            .ok()
            .and_then(|p| self.child(p, label))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPath(path.join(" ")))?;

        if edge.kind == EdgeKind::Alias {
            return self.unregister_alias(parent, label);
        }

        let mut removed = Vec::new();
        self.collect_owned(edge.target, &mut removed);
        for id in &removed {
            self.nodes.remove(id);
        }

        let dangling = |e: &Edge| removed.contains(&e.target);
        self.roots.retain(|e| !dangling(e));
        for node in self.nodes.values_mut() {
            node.children.retain(|e| !dangling(e));
        }

        debug!("Unregistered {} ({} nodes)", path.join(" "), removed.len());
        Ok(())
    }

    fn collect_owned(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.nodes.get(&id) {
            for edge in node.children.iter().filter(|e| e.kind == EdgeKind::Owns) {
                self.collect_owned(edge.target, out);
            }
        }
    }

    /// Walk the tree greedily, case-insensitively, from prefix-stripped text.
    pub fn resolve<'t>(&self, text: &'t str) -> Result<Resolution<'t>, ResolveError> {
        let mut view = StringView::new(text);

        let first = match view.next_word() {
            Ok(Some(word)) => word,
            Ok(None) => return Err(ResolveError::Empty),
            Err(_) => return Err(ResolveError::CommandNotFound(text.trim().to_string())),
        };
        let edge = self
            .child(None, &first)
            .ok_or_else(|| ResolveError::CommandNotFound(first.clone()))?;

        let mut node = edge.target;
        let mut path = vec![node];
        let mut labels = vec![first];

        loop {
            let is_group = self.nodes.get(&node).map_or(false, Node::is_group);
            if !is_group {
                break;
            }

            let checkpoint = view.index();
            match view.next_word() {
                Ok(Some(word)) => match self.child(Some(node), &word) {
                    Some(edge) => {
                        node = edge.target;
                        path.push(node);
                        labels.push(word);
                    }
                    None => {
                        view.seek(checkpoint);
                        break;
                    }
                },
                _ => {
                    view.seek(checkpoint);
                    break;
                }
            }
        }

        Ok(Resolution {
            node,
            path,
            labels,
            rest: view.rest(),
        })
    }

    /// Help text for the root listing.
    pub fn root_help(&self, prefix: &str) -> String {
        let mut lines = vec!["**Commands**".to_string()];
        lines.extend(self.listing(&self.roots, prefix));
        lines.push(format!(
            "Use `{}help <command>` for more about a command.",
            prefix
        ));
        lines.join("\n")
    }

    /// Help text for one command, named as it was invoked.
    pub fn help(&self, id: NodeId, invoked: &str, prefix: &str) -> String {
        let Some(node) = self.nodes.get(&id) else {
            return String::new();
        };

        let signature = usage(&node.params);
        let mut lines = vec![if signature.is_empty() {
            format!("`{}{}`", prefix, invoked)
        } else {
            format!("`{}{} {}`", prefix, invoked, signature)
        }];
        if !node.description.is_empty() {
            lines.push(node.description.clone());
        }
        if !node.aliases.is_empty() {
            lines.push(format!("Aliases: {}", node.aliases.join(", ")));
        }
        if !node.children.is_empty() {
            lines.push("**Subcommands**".into());
            lines.extend(self.listing(&node.children, &format!("{}{} ", prefix, invoked)));
        }
        lines.join("\n")
    }

    fn listing(&self, edges: &[Edge], prefix: &str) -> Vec<String> {
        edges
            .iter()
            .map(|edge| {
                let description = self
                    .nodes
                    .get(&edge.target)
                    .map(|n| n.description.as_str())
                    .unwrap_or_default();
                if description.is_empty() {
                    format!("`{}{}`", prefix, edge.label)
                } else {
                    format!("`{}{}` {}", prefix, edge.label, description)
                }
            })
            .collect()
    }

    /// Every reachable path, depth first, alias edges marked with `@`.
    pub fn outline(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.outline_edges(&self.roots, "", &mut out);
        out
    }

    fn outline_edges(&self, edges: &[Edge], prefix: &str, out: &mut Vec<String>) {
        for edge in edges {
            let marker = match edge.kind {
                EdgeKind::Owns => "",
                EdgeKind::Alias => "@",
            };
            let path = format!("{}{}{}", prefix, marker, edge.label);
            out.push(path.clone());
            if let Some(node) = self.nodes.get(&edge.target) {
                self.outline_edges(&node.children, &format!("{} ", path), out);
            }
        }
    }
}

/// A named bundle of commands that can be loaded and unloaded at runtime.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, tree: &mut CommandTree) -> Result<(), RegistryError>;

    /// Remove this module's aliases and owned commands.
    fn unload(&self, tree: &mut CommandTree) -> Result<(), RegistryError>;
}

/// Shared handle to the command tree.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    tree: Arc<RwLock<CommandTree>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CommandTree> {
        self.tree.read().await
    }

    pub async fn register(&self, spec: CommandSpec, parent: &[&str]) -> Result<NodeId, RegistryError> {
        self.tree.write().await.register(spec, parent)
    }

    /// Load a module; a failed load leaves the tree untouched.
    pub async fn load_module(&self, module: &dyn Module) -> Result<(), RegistryError> {
        let mut tree = self.tree.write().await;
        let mut staged = tree.clone();
        module.load(&mut staged)?;
        *tree = staged;
        info!(module = module.name(), "Loaded command module");
        Ok(())
    }

    pub async fn unload_module(&self, module: &dyn Module) -> Result<(), RegistryError> {
        let mut tree = self.tree.write().await;
        let mut staged = tree.clone();
        module.unload(&mut staged)?;
        *tree = staged;
        info!(module = module.name(), "Unloaded command module");
        Ok(())
    }
}
