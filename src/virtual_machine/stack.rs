//! LIFO stack addressable by depth from the top.
//!
//! Backs the evaluation stack, the alt stack and the invocation stack. Depth 0
//! is the top item; every depth-indexed operation fails with
//! [`VMError::StackOutOfRange`] instead of panicking.

use crate::virtual_machine::errors::VMError;

#[derive(Debug, Clone)]
pub struct RandomAccessStack<T> {
    items: Vec<T>,
}

impl<T> RandomAccessStack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes and returns the top item.
    pub fn pop(&mut self) -> Result<T, VMError> {
        self.remove(0)
    }

    /// Returns the item at `depth` without removing it.
    pub fn peek(&self, depth: usize) -> Result<&T, VMError> {
        let index = self.index_of(depth)?;
        Ok(&self.items[index])
    }

    /// Mutable access to the item at `depth`.
    pub fn peek_mut(&mut self, depth: usize) -> Result<&mut T, VMError> {
        let index = self.index_of(depth)?;
        Ok(&mut self.items[index])
    }

    /// Removes and returns the item at `depth`; items above it move down by one.
    pub fn remove(&mut self, depth: usize) -> Result<T, VMError> {
        let index = self.index_of(depth)?;
        Ok(self.items.remove(index))
    }

    /// Inserts `item` so that it ends up at `depth`.
    ///
    /// `depth == len()` places it at the bottom; `depth == 0` is a push.
    pub fn insert(&mut self, depth: usize, item: T) -> Result<(), VMError> {
        let len = self.items.len();
        if depth > len {
            return Err(VMError::StackOutOfRange { depth, len });
        }
        self.items.insert(len - depth, item);
        Ok(())
    }

    /// Overwrites the item at `depth`.
    pub fn set(&mut self, depth: usize, item: T) -> Result<(), VMError> {
        *self.peek_mut(depth)? = item;
        Ok(())
    }

    /// Iterates from the bottom of the stack to the top.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    fn index_of(&self, depth: usize) -> Result<usize, VMError> {
        let len = self.items.len();
        if depth >= len {
            return Err(VMError::StackOutOfRange { depth, len });
        }
        Ok(len - 1 - depth)
    }
}

impl<T> Default for RandomAccessStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a RandomAccessStack<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(items: &[i32]) -> RandomAccessStack<i32> {
        let mut stack = RandomAccessStack::new();
        for item in items {
            stack.push(*item);
        }
        stack
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = stack_of(&[1, 2, 3]);
        assert_eq!(stack.pop().unwrap(), 3);
        assert_eq!(stack.pop().unwrap(), 2);
        assert_eq!(stack.pop().unwrap(), 1);
        assert!(matches!(
            stack.pop(),
            Err(VMError::StackOutOfRange { depth: 0, len: 0 })
        ));
    }

    #[test]
    fn peek_by_depth() {
        let stack = stack_of(&[1, 2, 3]);
        assert_eq!(*stack.peek(0).unwrap(), 3);
        assert_eq!(*stack.peek(2).unwrap(), 1);
        assert!(stack.peek(3).is_err());
    }

    #[test]
    fn remove_shifts_items_above() {
        let mut stack = stack_of(&[1, 2, 3, 4]);
        assert_eq!(stack.remove(2).unwrap(), 2);
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
        assert!(stack.remove(3).is_err());
    }

    #[test]
    fn insert_places_item_at_depth() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.insert(1, 9).unwrap();
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![1, 2, 9, 3]);
        stack.insert(4, 0).unwrap();
        assert_eq!(*stack.peek(4).unwrap(), 0);
        stack.insert(0, 7).unwrap();
        assert_eq!(*stack.peek(0).unwrap(), 7);
        assert!(matches!(
            stack.insert(7, 1),
            Err(VMError::StackOutOfRange { depth: 7, len: 6 })
        ));
    }

    #[test]
    fn set_overwrites() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.set(1, 20).unwrap();
        assert_eq!(*stack.peek(1).unwrap(), 20);
        assert!(stack.set(3, 0).is_err());
    }

    #[test]
    fn clear_empties() {
        let mut stack = stack_of(&[1, 2]);
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
    }
}
