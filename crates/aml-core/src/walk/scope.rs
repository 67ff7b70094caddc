//! Scope stack

use crate::namespace::NodeId;
use crate::object::ObjectType;
use crate::{AmlError, AmlResult};

/// One open scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Scope node
    pub node: NodeId,
    /// Type the scope was opened as
    pub ty: ObjectType,
}

/// Open scopes of a walk; the top is used for relative name resolution
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    entries: Vec<ScopeEntry>,
}

impl ScopeStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope
    pub fn push(&mut self, node: NodeId, ty: ObjectType) {
        self.entries.push(ScopeEntry { node, ty });
    }

    /// Close the innermost scope
    pub fn pop(&mut self) -> AmlResult<ScopeEntry> {
        self.entries.pop().ok_or(AmlError::ScopeUnderflow)
    }

    /// Close scopes up to and including the innermost one of type `ty`
    ///
    /// Returns the number of scopes closed.
    pub fn pop_to_type(&mut self, ty: ObjectType) -> AmlResult<usize> {
        let mut popped = 0;
        loop {
            let entry = self.pop()?;
            popped += 1;
            if entry.ty == ty {
                return Ok(popped);
            }
        }
    }

    /// Innermost scope
    pub fn current(&self) -> Option<&ScopeEntry> {
        self.entries.last()
    }

    /// Innermost scope node, or `fallback` when no scope is open
    pub fn current_node_or(&self, fallback: NodeId) -> NodeId {
        self.current().map_or(fallback, |entry| entry.node)
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Whether no scope is open
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every scope
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: u32) -> NodeId {
        NodeId::from_raw(index, 0)
    }

    #[test]
    fn test_push_pop() {
        let mut scopes = ScopeStack::new();
        scopes.push(node(1), ObjectType::Device);
        scopes.push(node(2), ObjectType::Method);
        assert_eq!(scopes.current_node_or(node(0)), node(2));
        assert_eq!(scopes.pop().unwrap().node, node(2));
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn test_pop_empty_underflows() {
        let mut scopes = ScopeStack::new();
        assert_eq!(scopes.pop(), Err(AmlError::ScopeUnderflow));
        assert_eq!(scopes.current_node_or(node(9)), node(9));
    }

    #[test]
    fn test_pop_to_type() {
        let mut scopes = ScopeStack::new();
        scopes.push(node(1), ObjectType::Device);
        scopes.push(node(2), ObjectType::LocalScope);
        scopes.push(node(3), ObjectType::Method);
        assert_eq!(scopes.pop_to_type(ObjectType::LocalScope).unwrap(), 2);
        assert_eq!(scopes.current().map(|s| s.node), Some(node(1)));

        assert_eq!(
            scopes.pop_to_type(ObjectType::Processor),
            Err(AmlError::ScopeUnderflow)
        );
        assert!(scopes.is_empty());
    }
}
