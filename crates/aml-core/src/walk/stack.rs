//! Operand and result stacks
//!
//! Both stacks have a fixed capacity and report overflow and underflow as
//! typed errors.

use crate::object::ObjectHandle;
use crate::{AmlError, AmlResult};

/// Operand stack depth of a walk state
pub const OPERAND_STACK_DEPTH: usize = 8;

/// Operands held by one result frame
pub const RESULT_FRAME_SIZE: usize = 3;

/// Result frames a walk state may stack
pub const MAX_RESULT_FRAMES: usize = 16;

/// Fixed-capacity LIFO stack
#[derive(Debug, Clone)]
pub struct BoundedStack<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BoundedStack<T> {
    /// Create an empty stack holding at most `capacity` items
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item
    ///
    /// # Errors
    ///
    /// Returns `AmlError::StackOverflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, item: T) -> AmlResult<()> {
        if self.items.len() >= self.capacity {
            return Err(AmlError::StackOverflow);
        }
        self.items.push(item);
        Ok(())
    }

    /// Pop the top item
    ///
    /// # Errors
    ///
    /// Returns `AmlError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> AmlResult<T> {
        self.items.pop().ok_or(AmlError::StackUnderflow)
    }

    /// Top item without popping
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// Number of items
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every item
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// One fixed-size frame of intermediate results
#[derive(Debug, Default)]
struct ResultFrame {
    slots: [Option<ObjectHandle>; RESULT_FRAME_SIZE],
    count: usize,
}

impl ResultFrame {
    fn is_full(&self) -> bool {
        self.count == RESULT_FRAME_SIZE
    }
}

/// Stack of result frames
///
/// Results fill the top frame; a full frame gets a new frame stacked on it.
/// The base frame always exists.
#[derive(Debug)]
pub struct ResultStack {
    frames: Vec<ResultFrame>,
}

impl ResultStack {
    /// Stack with its base frame pushed
    pub fn new() -> Self {
        Self {
            frames: vec![ResultFrame::default()],
        }
    }

    /// Push a result, opening a new frame when the top one is full
    ///
    /// # Errors
    ///
    /// Returns `AmlError::ResultFrameOverflow` when every frame is in use.
    pub fn push(&mut self, result: ObjectHandle) -> AmlResult<()> {
        if self.frames.last().map_or(true, ResultFrame::is_full) {
            if self.frames.len() >= MAX_RESULT_FRAMES {
                return Err(AmlError::ResultFrameOverflow);
            }
            self.frames.push(ResultFrame::default());
        }
        let frame = self
            .frames
            .last_mut()
            .ok_or(AmlError::ResultFrameOverflow)?;
        frame.slots[frame.count] = Some(result);
        frame.count += 1;
        Ok(())
    }

    /// Pop the most recent result, closing its frame once empty
    ///
    /// # Errors
    ///
    /// Returns `AmlError::StackUnderflow` if no result is held.
    pub fn pop(&mut self) -> AmlResult<ObjectHandle> {
        loop {
            let frame = self.frames.last_mut().ok_or(AmlError::StackUnderflow)?;
            if frame.count > 0 {
                frame.count -= 1;
                let result = frame.slots[frame.count].take();
                if frame.count == 0 && self.frames.len() > 1 {
                    self.frames.pop();
                }
                return result.ok_or_else(|| {
                    AmlError::InternalInconsistency("empty result slot".to_string())
                });
            }
            if self.frames.len() == 1 {
                return Err(AmlError::StackUnderflow);
            }
            self.frames.pop();
        }
    }

    /// Number of results held
    pub fn len(&self) -> usize {
        self.frames.iter().map(|frame| frame.count).sum()
    }

    /// Whether no result is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames, the base frame included
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Drop results until at most `len` remain
    pub fn truncate(&mut self, len: usize) {
        while self.len() > len {
            if self.pop().is_err() {
                break;
            }
        }
    }

    /// Drop every result and every frame but the base
    pub fn clear(&mut self) {
        self.frames.clear();
        self.frames.push(ResultFrame::default());
    }
}

impl Default for ResultStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_stack_limits() {
        let mut stack = BoundedStack::with_capacity(2);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.push(3), Err(AmlError::StackOverflow));
        assert_eq!(stack.peek(), Some(&2));
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
        assert_eq!(stack.pop(), Err(AmlError::StackUnderflow));
    }

    #[test]
    fn test_result_stack_grows_frames() {
        let mut results = ResultStack::new();
        for i in 0..(RESULT_FRAME_SIZE as u64 + 1) {
            results.push(ObjectHandle::integer(i)).unwrap();
        }
        assert_eq!(results.frame_count(), 2);
        assert_eq!(results.len(), RESULT_FRAME_SIZE + 1);

        assert_eq!(results.pop().unwrap().as_integer(), Some(RESULT_FRAME_SIZE as u64));
        assert_eq!(results.frame_count(), 1);
        assert_eq!(results.pop().unwrap().as_integer(), Some(2));
    }

    #[test]
    fn test_result_stack_overflow() {
        let mut results = ResultStack::new();
        for i in 0..(RESULT_FRAME_SIZE * MAX_RESULT_FRAMES) as u64 {
            results.push(ObjectHandle::integer(i)).unwrap();
        }
        assert!(matches!(
            results.push(ObjectHandle::integer(0)),
            Err(AmlError::ResultFrameOverflow)
        ));
    }

    #[test]
    fn test_result_stack_underflow_and_truncate() {
        let mut results = ResultStack::new();
        assert!(matches!(results.pop(), Err(AmlError::StackUnderflow)));

        for i in 0..5 {
            results.push(ObjectHandle::integer(i)).unwrap();
        }
        results.truncate(1);
        assert_eq!(results.len(), 1);
        assert_eq!(results.frame_count(), 1);
        results.clear();
        assert!(results.is_empty());
    }
}
