//! Namespace Manager
//!
//! The namespace is a tree of named nodes stored in a generational arena.
//! Nodes are addressed by [`NodeId`]; an id whose node has been deleted is
//! stale and fails every accessor instead of aliasing a newer node.
//!
//! Children are kept in creation order so walks visit a table's objects in
//! the order they were declared.

mod lookup;
mod walk;

pub use lookup::{Lookup, LookupFlags, LookupMode};
pub use walk::WalkAction;

use crate::name::{NamePath, NameSeg, PathPrefix};
use crate::object::{ObjectHandle, ObjectType};
use crate::{AmlError, AmlResult};
use rustc_hash::FxHashMap;
use std::fmt;

/// Longest alias chain followed before giving up
const MAX_ALIAS_DEPTH: usize = 16;

// ============================================================================
// Identifiers
// ============================================================================

/// Generation-checked handle to a namespace node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Build an id from its raw parts
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation the id was issued for
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Identifier of the table load or method invocation that created a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u32);

impl OwnerId {
    /// Owner of the predefined objects
    pub const ROOT: OwnerId = OwnerId(0);

    /// Wrap a raw owner id
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw owner id
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner {}", self.0)
    }
}

/// Node flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// No flags
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Created by the interpreter itself
    pub const PREDEFINED: NodeFlags = NodeFlags(1 << 0);
    /// Created while a method was executing
    pub const TEMPORARY: NodeFlags = NodeFlags(1 << 1);
    /// `_INI` has run for this device
    pub const INITIALIZED: NodeFlags = NodeFlags(1 << 2);

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub const fn contains(&self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`
    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A named entry in the namespace
#[derive(Debug)]
pub struct Node {
    name: NameSeg,
    ty: ObjectType,
    owner: OwnerId,
    flags: NodeFlags,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    child_index: FxHashMap<NameSeg, NodeId>,
    object: Option<ObjectHandle>,
    alias_target: Option<NodeId>,
}

impl Node {
    fn new(
        name: NameSeg,
        ty: ObjectType,
        owner: OwnerId,
        flags: NodeFlags,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            name,
            ty,
            owner,
            flags,
            parent,
            children: Vec::new(),
            child_index: FxHashMap::default(),
            object: None,
            alias_target: None,
        }
    }

    /// Four-character name
    pub fn name(&self) -> NameSeg {
        self.name
    }

    /// Type tag
    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    /// Creating table or invocation
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Flags
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Parent node (None for the root)
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in creation order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attached object
    pub fn object(&self) -> Option<&ObjectHandle> {
        self.object.as_ref()
    }

    /// Target of an alias node
    pub fn alias_target(&self) -> Option<NodeId> {
        self.alias_target
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

// ============================================================================
// Namespace
// ============================================================================

/// Hierarchical symbol table
pub struct Namespace {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    owners: FxHashMap<OwnerId, Vec<NodeId>>,
    live: usize,
}

impl Namespace {
    /// Namespace holding only the root scope
    pub fn new() -> Self {
        let root_node = Node::new(
            NameSeg::ROOT,
            ObjectType::LocalScope,
            OwnerId::ROOT,
            NodeFlags::PREDEFINED,
            None,
        );
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            root: NodeId::from_raw(0, 0),
            owners: FxHashMap::default(),
            live: 1,
        }
    }

    /// The root scope
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether only the root exists
    pub fn is_empty(&self) -> bool {
        self.live == 1
    }

    /// Whether `id` names a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Node for `id`, if it is still live
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Mutable node for `id`, if it is still live
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Node for `id`, or `NotFound` when stale
    pub fn node(&self, id: NodeId) -> AmlResult<&Node> {
        self.get(id)
            .ok_or_else(|| AmlError::NotFound(format!("stale node {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> AmlResult<&mut Node> {
        self.get_mut(id)
            .ok_or_else(|| AmlError::NotFound(format!("stale node {}", id)))
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Direct child of `parent` named `name`
    pub fn child(&self, parent: NodeId, name: NameSeg) -> Option<NodeId> {
        self.get(parent)?.child_index.get(&name).copied()
    }

    /// Children of a node in creation order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id).map(|node| node.children.clone()).unwrap_or_default()
    }

    /// Type tag of a node
    pub fn object_type(&self, id: NodeId) -> AmlResult<ObjectType> {
        Ok(self.node(id)?.ty)
    }

    /// Attached object of a node
    pub fn object(&self, id: NodeId) -> Option<ObjectHandle> {
        self.get(id)?.object.clone()
    }

    /// Number of levels between a node and the root
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Create a child node
    ///
    /// Fails with `AlreadyExists` when `parent` already has a child named
    /// `name`.
    pub fn create(
        &mut self,
        parent: NodeId,
        name: NameSeg,
        ty: ObjectType,
        owner: OwnerId,
        flags: NodeFlags,
    ) -> AmlResult<NodeId> {
        if self.node(parent)?.child_index.contains_key(&name) {
            return Err(AmlError::AlreadyExists(self.child_path(parent, name)));
        }

        let node = Node::new(name, ty, owner, flags, Some(parent));
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId::from_raw(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| AmlError::NoMemory)?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId::from_raw(index, 0)
            }
        };

        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(id);
        parent_node.child_index.insert(name, id);
        self.owners.entry(owner).or_default().push(id);
        self.live += 1;

        log::trace!("created {} ({}, {})", self.display_path(id), ty, owner);
        Ok(id)
    }

    /// Delete a node and its whole subtree
    ///
    /// Attached objects are released; references that still name the
    /// deleted nodes become stale. Returns the number of nodes deleted.
    pub fn delete(&mut self, id: NodeId) -> AmlResult<usize> {
        if id == self.root {
            return Err(AmlError::BadParameter("cannot delete the root".to_string()));
        }
        let node = self.node(id)?;
        let name = node.name;
        let parent = node.parent;

        log::trace!("deleting {}", self.display_path(id));

        if let Some(parent_node) = parent.and_then(|p| self.get_mut(p)) {
            parent_node.children.retain(|child| *child != id);
            parent_node.child_index.remove(&name);
        }

        let mut deleted = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.index as usize];
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                pending.extend(node.children);
                deleted += 1;
            }
        }
        self.live -= deleted;
        Ok(deleted)
    }

    /// Delete every node created by `owner`, children before parents
    pub fn delete_by_owner(&mut self, owner: OwnerId) -> usize {
        let Some(nodes) = self.owners.remove(&owner) else {
            return 0;
        };
        let mut deleted = 0;
        for id in nodes.into_iter().rev() {
            if self.contains(id) {
                deleted += self.delete(id).unwrap_or(0);
            }
        }
        if deleted > 0 {
            log::trace!("deleted {} nodes of {}", deleted, owner);
        }
        deleted
    }

    /// Attach an object, replacing and returning any previous one
    ///
    /// The node takes the type `ty`.
    pub fn attach(
        &mut self,
        id: NodeId,
        object: ObjectHandle,
        ty: ObjectType,
    ) -> AmlResult<Option<ObjectHandle>> {
        let node = self.node_mut(id)?;
        node.ty = ty;
        Ok(node.object.replace(object))
    }

    /// Remove and return the attached object; the node becomes untyped
    pub fn detach(&mut self, id: NodeId) -> AmlResult<Option<ObjectHandle>> {
        let node = self.node_mut(id)?;
        if node.object.is_some() {
            node.ty = ObjectType::Any;
        }
        Ok(node.object.take())
    }

    /// Change the type tag of a node without touching its object
    pub fn set_type(&mut self, id: NodeId, ty: ObjectType) -> AmlResult<()> {
        self.node_mut(id)?.ty = ty;
        Ok(())
    }

    /// Set flags on a node
    pub fn insert_flags(&mut self, id: NodeId, flags: NodeFlags) -> AmlResult<()> {
        self.node_mut(id)?.flags.insert(flags);
        Ok(())
    }

    /// Turn a node into an alias of `target`
    pub fn set_alias(&mut self, id: NodeId, target: NodeId) -> AmlResult<()> {
        self.node(target)?;
        let node = self.node_mut(id)?;
        node.ty = ObjectType::Alias;
        node.alias_target = Some(target);
        Ok(())
    }

    /// Follow alias links to the node they designate
    pub fn resolve_alias(&self, id: NodeId) -> AmlResult<NodeId> {
        let mut current = id;
        for _ in 0..MAX_ALIAS_DEPTH {
            let node = self.node(current)?;
            match (node.ty, node.alias_target) {
                (ObjectType::Alias, Some(target)) => current = target,
                (ObjectType::Alias, None) => {
                    return Err(AmlError::NotFound(format!(
                        "unresolved alias {}",
                        self.display_path(current)
                    )))
                }
                _ => return Ok(current),
            }
        }
        Err(AmlError::InternalInconsistency(format!(
            "alias chain at {} too long",
            self.display_path(id)
        )))
    }

    /// Absolute path of a node
    pub fn path_of(&self, id: NodeId) -> AmlResult<NamePath> {
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let node = self.node(current)?;
            match node.parent {
                Some(parent) => {
                    segments.push(node.name);
                    current = parent;
                }
                None => break,
            }
        }
        segments.reverse();
        Ok(NamePath::new(PathPrefix::Root, segments))
    }

    /// Absolute path for log and error messages
    pub fn display_path(&self, id: NodeId) -> String {
        match self.path_of(id) {
            Ok(path) => path.to_string(),
            Err(_) => id.to_string(),
        }
    }

    fn child_path(&self, parent: NodeId, name: NameSeg) -> String {
        let mut path = self.display_path(parent);
        if !path.ends_with('\\') {
            path.push('.');
        }
        path.push_str(name.as_str());
        path
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("nodes", &self.live)
            .field("owners", &self.owners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(name: &str) -> NameSeg {
        NameSeg::new(name).unwrap()
    }

    fn build(ns: &mut Namespace, parent: NodeId, name: &str, ty: ObjectType) -> NodeId {
        ns.create(parent, seg(name), ty, OwnerId::new(1), NodeFlags::NONE)
            .unwrap()
    }

    #[test]
    fn test_create_and_path() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let sb = build(&mut ns, root, "_SB", ObjectType::Device);
        let pci = build(&mut ns, sb, "PCI0", ObjectType::Device);

        assert_eq!(ns.child(sb, seg("PCI0")), Some(pci));
        assert_eq!(ns.path_of(pci).unwrap().to_string(), "\\_SB_.PCI0");
        assert_eq!(ns.path_of(root).unwrap().to_string(), "\\");
        assert_eq!(ns.depth(pci), 2);
        assert_eq!(ns.len(), 3);
    }

    #[test]
    fn test_duplicate_create() {
        let mut ns = Namespace::new();
        let root = ns.root();
        build(&mut ns, root, "FOO", ObjectType::Integer);
        let err = ns
            .create(root, seg("FOO"), ObjectType::Integer, OwnerId::ROOT, NodeFlags::NONE)
            .unwrap_err();
        assert_eq!(err, AmlError::AlreadyExists("\\FOO_".to_string()));
    }

    #[test]
    fn test_children_keep_creation_order() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let names = ["ZZZZ", "AAAA", "MMMM"];
        let ids: Vec<_> = names
            .iter()
            .map(|name| build(&mut ns, root, name, ObjectType::Integer))
            .collect();
        assert_eq!(ns.children(root), ids);
    }

    #[test]
    fn test_delete_subtree_makes_ids_stale() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let dev = build(&mut ns, root, "DEV0", ObjectType::Device);
        let inner = build(&mut ns, dev, "INNR", ObjectType::Integer);

        assert_eq!(ns.delete(dev).unwrap(), 2);
        assert!(!ns.contains(dev));
        assert!(!ns.contains(inner));
        assert_eq!(ns.child(root, seg("DEV0")), None);

        // Reused slot gets a new generation
        let again = build(&mut ns, root, "DEV0", ObjectType::Device);
        assert!(ns.contains(again));
        assert!(!ns.contains(dev));
    }

    #[test]
    fn test_delete_root_rejected() {
        let mut ns = Namespace::new();
        let root = ns.root();
        assert!(matches!(ns.delete(root), Err(AmlError::BadParameter(_))));
    }

    #[test]
    fn test_delete_by_owner() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let keep = ns
            .create(root, seg("KEEP"), ObjectType::Integer, OwnerId::ROOT, NodeFlags::PREDEFINED)
            .unwrap();
        let table = OwnerId::new(7);
        let dev = ns
            .create(root, seg("DEV0"), ObjectType::Device, table, NodeFlags::NONE)
            .unwrap();
        ns.create(dev, seg("_STA"), ObjectType::Integer, table, NodeFlags::NONE)
            .unwrap();

        assert_eq!(ns.delete_by_owner(table), 2);
        assert!(ns.contains(keep));
        assert!(!ns.contains(dev));
        assert_eq!(ns.delete_by_owner(table), 0);
    }

    #[test]
    fn test_attach_replaces_and_detach_untypes() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let node = build(&mut ns, root, "VAL0", ObjectType::Any);

        let first = ObjectHandle::integer(1);
        assert!(ns.attach(node, first.clone(), ObjectType::Integer).unwrap().is_none());
        assert_eq!(first.ref_count(), 2);

        let previous = ns
            .attach(node, ObjectHandle::string("x"), ObjectType::String)
            .unwrap()
            .unwrap();
        assert!(previous.ptr_eq(&first));
        drop(previous);
        assert_eq!(first.ref_count(), 1);
        assert_eq!(ns.object_type(node).unwrap(), ObjectType::String);

        assert!(ns.detach(node).unwrap().is_some());
        assert_eq!(ns.object_type(node).unwrap(), ObjectType::Any);
        assert!(ns.object(node).is_none());
    }

    #[test]
    fn test_alias_resolution() {
        let mut ns = Namespace::new();
        let root = ns.root();
        let target = build(&mut ns, root, "TGT0", ObjectType::Integer);
        let alias = build(&mut ns, root, "ALS0", ObjectType::Any);
        let alias2 = build(&mut ns, root, "ALS1", ObjectType::Any);
        ns.set_alias(alias, target).unwrap();
        ns.set_alias(alias2, alias).unwrap();

        assert_eq!(ns.resolve_alias(alias2).unwrap(), target);
        assert_eq!(ns.resolve_alias(target).unwrap(), target);
    }
}
