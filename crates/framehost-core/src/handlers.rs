//! Append-only callback lists.

use std::sync::Mutex;

use crate::sync::lock;

/// Ordered list of callbacks registered for the lifetime of a host context.
///
/// Dispatch copies the list under the lock and calls the copies after
/// releasing it, so a handler may register further handlers while running.
pub struct HandlerList<T> {
    handlers: Mutex<Vec<T>>,
}

impl<T: Clone> HandlerList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Append a handler.
    pub fn register(&self, handler: T) {
        lock(&self.handlers).push(handler);
    }

    /// Copy the current handlers in registration order.
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.handlers).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.handlers).is_empty()
    }
}

impl<T: Clone> Default for HandlerList<T> {
    fn default() -> Self {
        Self::new()
    }
}
