//! Bounded cache of compiled expressions, keyed by the literal source
//! string. Safe to read and populate from multiple in-flight renders:
//! entries are immutable once inserted and eviction drops the oldest
//! insertions first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use super::ast::Expression;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct ExpressionCache {
    entries: DashMap<String, Arc<Expression>>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, source: &str) -> Option<Arc<Expression>> {
        self.entries.get(source).map(|entry| Arc::clone(&entry))
    }

    /// Inserts a compiled expression, evicting the oldest entries once the
    /// capacity is reached. Returns the cached value, which may be a
    /// previously inserted one if another render got there first.
    ///
    /// The whole get-or-insert runs under the order lock so concurrent
    /// inserts of the same source neither duplicate the eviction queue
    /// entry nor replace an `Arc` already handed out. Reads stay
    /// lock-free through [`Self::get`].
    pub fn insert(&self, source: &str, expression: Expression) -> Arc<Expression> {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.entries.get(source) {
            return Arc::clone(&existing);
        }
        let compiled = Arc::new(expression);
        while order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                debug!(source = %oldest, "evicting compiled expression");
                self.entries.remove(&oldest);
            }
        }
        order.push_back(source.to_string());
        self.entries.insert(source.to_string(), Arc::clone(&compiled));
        compiled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
