//! Name resolution
//!
//! A lookup starts at a scope node, applies the path prefix, then resolves
//! each segment in turn. Only the final segment is checked against the
//! expected type; intermediate segments resolve as `Any`.

use super::{Namespace, NodeFlags, NodeId, OwnerId};
use crate::name::{NamePath, NameSeg, PathPrefix};
use crate::object::ObjectType;
use crate::walk::ScopeStack;
use crate::{AmlError, AmlResult};

/// Phase the lookup is performed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupMode {
    /// First load pass: missing names are created, types are not checked
    LoadPass1,
    /// Second load pass: names must exist
    LoadPass2,
    /// Method execution: names must exist unless `DEFINE` is set
    Execute,
}

/// Lookup behavior flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LookupFlags(u8);

impl LookupFlags {
    /// No flags
    pub const NONE: LookupFlags = LookupFlags(0);
    /// Push the resolved node onto the scope stack if it opens a scope
    pub const OPEN_SCOPE: LookupFlags = LookupFlags(1 << 0);
    /// Fail with `AlreadyExists` if the final segment is found
    pub const NO_DUPLICATES: LookupFlags = LookupFlags(1 << 1);
    /// Search ancestor scopes for single relative segments
    pub const SEARCH_PARENT: LookupFlags = LookupFlags(1 << 2);
    /// Create missing names outside of load pass 1
    pub const DEFINE: LookupFlags = LookupFlags(1 << 3);
    /// Mark created nodes as method temporaries
    pub const TEMPORARY: LookupFlags = LookupFlags(1 << 4);

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub const fn contains(&self, other: LookupFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for LookupFlags {
    type Output = LookupFlags;

    fn bitor(self, rhs: LookupFlags) -> LookupFlags {
        LookupFlags(self.0 | rhs.0)
    }
}

/// A lookup request
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    /// Scope relative names resolve against
    pub scope: NodeId,
    /// Path to resolve
    pub path: &'a NamePath,
    /// Type required of the final segment
    pub expected: ObjectType,
    /// Load or execution phase
    pub mode: LookupMode,
    /// Behavior flags
    pub flags: LookupFlags,
    /// Owner given to created nodes
    pub owner: OwnerId,
}

impl<'a> Lookup<'a> {
    /// Execution-time lookup of any type with upward search
    pub fn new(scope: NodeId, path: &'a NamePath) -> Self {
        Self {
            scope,
            path,
            expected: ObjectType::Any,
            mode: LookupMode::Execute,
            flags: LookupFlags::SEARCH_PARENT,
            owner: OwnerId::ROOT,
        }
    }

    /// Require a type for the final segment
    pub fn expecting(mut self, expected: ObjectType) -> Self {
        self.expected = expected;
        self
    }

    /// Set the phase
    pub fn mode(mut self, mode: LookupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the flags
    pub fn flags(mut self, flags: LookupFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Owner for created nodes
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    fn creates(&self) -> bool {
        self.mode == LookupMode::LoadPass1 || self.flags.contains(LookupFlags::DEFINE)
    }
}

impl Namespace {
    /// Resolve a path, creating nodes when the request allows it
    ///
    /// With `OPEN_SCOPE`, a resolved scope-opening node is pushed onto
    /// `scopes`.
    pub fn lookup(
        &mut self,
        request: &Lookup<'_>,
        scopes: Option<&mut ScopeStack>,
    ) -> AmlResult<NodeId> {
        let path = request.path;
        let mut current = self.start_node(request.scope, path)?;
        let segments = path.segments();
        let search_parent =
            request.flags.contains(LookupFlags::SEARCH_PARENT) && path.is_single_relative();

        for (i, &seg) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let ty = if last { request.expected } else { ObjectType::Any };

            let found = match self.child(current, seg) {
                Some(node) => Some(node),
                None if search_parent && last => self.search_ancestors(current, seg),
                None => None,
            };

            current = match found {
                Some(node) => {
                    if last && request.flags.contains(LookupFlags::NO_DUPLICATES) {
                        return Err(AmlError::AlreadyExists(self.display_path(node)));
                    }
                    self.settle(node, ty, request)?
                }
                None if request.creates() => self.enter(current, seg, ty, request)?,
                None => return Err(AmlError::NotFound(self.describe(request.scope, path))),
            };
        }

        if request.flags.contains(LookupFlags::OPEN_SCOPE) {
            if let Some(scopes) = scopes {
                let ty = self.object_type(current)?;
                if ty.opens_scope() || ty == ObjectType::Any {
                    scopes.push(current, ty);
                }
            }
        }
        Ok(current)
    }

    /// Resolve an existing name without creating anything
    pub fn find(&self, scope: NodeId, path: &NamePath) -> AmlResult<NodeId> {
        let mut current = self.start_node(scope, path)?;
        let segments = path.segments();
        let search_parent = path.is_single_relative();

        for (i, &seg) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let found = match self.child(current, seg) {
                Some(node) => Some(node),
                None if search_parent && last => self.search_ancestors(current, seg),
                None => None,
            };
            let node =
                found.ok_or_else(|| AmlError::NotFound(self.describe(scope, path)))?;
            current = self.resolve_alias(node)?;
        }
        Ok(current)
    }

    /// Apply the path prefix
    fn start_node(&self, scope: NodeId, path: &NamePath) -> AmlResult<NodeId> {
        match path.prefix() {
            PathPrefix::Root => Ok(self.root()),
            PathPrefix::Relative => {
                self.node(scope)?;
                Ok(scope)
            }
            PathPrefix::Parent(count) => {
                let mut current = scope;
                for _ in 0..count {
                    current = self.parent(current).ok_or_else(|| {
                        AmlError::InvalidPath(format!(
                            "{} ascends past the root from {}",
                            path,
                            self.display_path(scope)
                        ))
                    })?;
                }
                Ok(current)
            }
        }
    }

    fn search_ancestors(&self, from: NodeId, seg: NameSeg) -> Option<NodeId> {
        let mut scope = self.parent(from);
        while let Some(candidate) = scope {
            if let Some(node) = self.child(candidate, seg) {
                return Some(node);
            }
            scope = self.parent(candidate);
        }
        None
    }

    /// Follow aliases and check or settle the type of a found node
    fn settle(&mut self, node: NodeId, ty: ObjectType, request: &Lookup<'_>) -> AmlResult<NodeId> {
        let node = if ty == ObjectType::Alias {
            node
        } else {
            self.resolve_alias(node)?
        };
        let actual = self.object_type(node)?;

        if request.mode == LookupMode::LoadPass1 {
            if actual == ObjectType::Any && ty != ObjectType::Any {
                self.set_type(node, ty)?;
            }
            return Ok(node);
        }

        if !ty.accepts(actual) {
            return Err(AmlError::type_mismatch(ty, actual));
        }
        Ok(node)
    }

    fn enter(
        &mut self,
        parent: NodeId,
        seg: NameSeg,
        ty: ObjectType,
        request: &Lookup<'_>,
    ) -> AmlResult<NodeId> {
        let flags = if request.flags.contains(LookupFlags::TEMPORARY) {
            NodeFlags::TEMPORARY
        } else {
            NodeFlags::NONE
        };
        self.create(parent, seg, ty, request.owner, flags)
    }

    fn describe(&self, scope: NodeId, path: &NamePath) -> String {
        if path.is_absolute() {
            path.to_string()
        } else {
            format!("{} in {}", path, self.display_path(scope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> NamePath {
        NamePath::parse(text).unwrap()
    }

    /// `\_SB_.PCI0.SLOT` plus `\_SB_.FOO_`
    fn sample() -> (Namespace, NodeId, NodeId) {
        let mut ns = Namespace::new();
        let root = ns.root();
        let slot = ns
            .lookup(
                &Lookup::new(root, &path("\\_SB.PCI0.SLOT"))
                    .mode(LookupMode::LoadPass1)
                    .expecting(ObjectType::Device),
                None,
            )
            .unwrap();
        let foo = ns
            .lookup(
                &Lookup::new(root, &path("\\_SB.FOO"))
                    .mode(LookupMode::LoadPass1)
                    .expecting(ObjectType::Integer),
                None,
            )
            .unwrap();
        (ns, slot, foo)
    }

    #[test]
    fn test_parent_prefix_resolution() {
        let (mut ns, slot, foo) = sample();
        let found = ns
            .lookup(&Lookup::new(slot, &path("^^FOO")), None)
            .unwrap();
        assert_eq!(found, foo);
        assert_eq!(ns.find(slot, &path("^^FOO")).unwrap(), foo);
    }

    #[test]
    fn test_too_many_parent_prefixes() {
        let (mut ns, _, foo) = sample();
        // FOO sits two levels below the root
        let err = ns
            .lookup(&Lookup::new(foo, &path("^^^^^FOO")), None)
            .unwrap_err();
        assert!(matches!(err, AmlError::InvalidPath(_)));
    }

    #[test]
    fn test_pass1_creates_intermediates_as_any() {
        let (ns, slot, _) = sample();
        let pci = ns.parent(slot).unwrap();
        assert_eq!(ns.object_type(pci).unwrap(), ObjectType::Any);
        assert_eq!(ns.object_type(slot).unwrap(), ObjectType::Device);
    }

    #[test]
    fn test_pass1_retypes_untyped_node() {
        let (mut ns, slot, _) = sample();
        let root = ns.root();
        let pci = ns
            .lookup(
                &Lookup::new(root, &path("\\_SB.PCI0"))
                    .mode(LookupMode::LoadPass1)
                    .expecting(ObjectType::Device),
                None,
            )
            .unwrap();
        assert_eq!(ns.parent(slot), Some(pci));
        assert_eq!(ns.object_type(pci).unwrap(), ObjectType::Device);
    }

    #[test]
    fn test_execute_does_not_create() {
        let (mut ns, slot, _) = sample();
        let err = ns
            .lookup(&Lookup::new(slot, &path("NONE")), None)
            .unwrap_err();
        assert!(matches!(err, AmlError::NotFound(_)));
    }

    #[test]
    fn test_search_parent_only_for_single_relative_segment() {
        let (mut ns, slot, foo) = sample();
        let found = ns.lookup(&Lookup::new(slot, &path("FOO")), None).unwrap();
        assert_eq!(found, foo);

        let foo_path = path("FOO");
        let no_search = Lookup::new(slot, &foo_path).flags(LookupFlags::NONE);
        assert!(ns.lookup(&no_search, None).is_err());
    }

    #[test]
    fn test_no_duplicates() {
        let (mut ns, _, _) = sample();
        let root = ns.root();
        let foo_path = path("\\_SB.FOO");
        let request = Lookup::new(root, &foo_path)
            .mode(LookupMode::LoadPass1)
            .flags(LookupFlags::NO_DUPLICATES);
        assert!(matches!(
            ns.lookup(&request, None),
            Err(AmlError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_type_mismatch_outside_pass1() {
        let (mut ns, _, _) = sample();
        let root = ns.root();
        let foo_path = path("\\_SB.FOO");
        let request =
            Lookup::new(root, &foo_path).expecting(ObjectType::Method);
        assert_eq!(
            ns.lookup(&request, None),
            Err(AmlError::type_mismatch(ObjectType::Method, ObjectType::Integer))
        );
    }

    #[test]
    fn test_open_scope_pushes_scope() {
        let (mut ns, slot, _) = sample();
        let root = ns.root();
        let mut scopes = ScopeStack::new();
        let slot_path = path("\\_SB.PCI0.SLOT");
        let request = Lookup::new(root, &slot_path)
            .flags(LookupFlags::OPEN_SCOPE);
        let found = ns.lookup(&request, Some(&mut scopes)).unwrap();
        assert_eq!(found, slot);
        assert_eq!(scopes.current().map(|s| s.node), Some(slot));
    }

    #[test]
    fn test_empty_path_is_scope() {
        let (mut ns, slot, _) = sample();
        let parent = ns
            .lookup(&Lookup::new(slot, &NamePath::new(PathPrefix::Parent(1), vec![])), None)
            .unwrap();
        assert_eq!(Some(parent), ns.parent(slot));
    }

    #[test]
    fn test_aliases_are_followed() {
        let (mut ns, _, foo) = sample();
        let root = ns.root();
        let alias = ns
            .lookup(
                &Lookup::new(root, &path("\\BAR"))
                    .mode(LookupMode::LoadPass1)
                    .expecting(ObjectType::Alias),
                None,
            )
            .unwrap();
        ns.set_alias(alias, foo).unwrap();
        let found = ns
            .lookup(&Lookup::new(root, &path("\\BAR")).expecting(ObjectType::Integer), None)
            .unwrap();
        assert_eq!(found, foo);
    }
}
