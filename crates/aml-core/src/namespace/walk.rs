//! Depth-first namespace traversal

use super::{Namespace, Node, NodeId};
use crate::object::ObjectType;

/// What a walk callback wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Visit this node's children, then its peers
    Continue,
    /// Skip this node's children
    SkipChildren,
    /// End the walk
    Stop,
}

impl Namespace {
    /// Visit the subtree below `start` depth-first in creation order
    ///
    /// `start` itself is not visited; its children are at depth 1 and nodes
    /// deeper than `max_depth` are not visited. With a `type_filter`, only
    /// nodes of that type reach the callback but the walk still descends
    /// through the others. Returns `true` if the callback stopped the walk.
    pub fn walk_namespace<F>(
        &self,
        start: NodeId,
        max_depth: usize,
        type_filter: Option<ObjectType>,
        mut callback: F,
    ) -> bool
    where
        F: FnMut(NodeId, &Node, usize) -> WalkAction,
    {
        let mut pending: Vec<(NodeId, usize)> = self
            .children(start)
            .into_iter()
            .rev()
            .map(|child| (child, 1))
            .collect();

        while let Some((id, depth)) = pending.pop() {
            if depth > max_depth {
                continue;
            }
            let Some(node) = self.get(id) else {
                continue;
            };

            let action = match type_filter {
                Some(ty) if node.object_type() != ty => WalkAction::Continue,
                _ => callback(id, node, depth),
            };

            match action {
                WalkAction::Stop => return true,
                WalkAction::SkipChildren => {}
                WalkAction::Continue => {
                    pending.extend(node.children().iter().rev().map(|child| (*child, depth + 1)));
                }
            }
        }
        false
    }

    /// Nodes below `start` in walk order, optionally of one type
    pub fn descendants(
        &self,
        start: NodeId,
        max_depth: usize,
        type_filter: Option<ObjectType>,
    ) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        self.walk_namespace(start, max_depth, type_filter, |id, _, _| {
            nodes.push(id);
            WalkAction::Continue
        });
        nodes
    }
}
