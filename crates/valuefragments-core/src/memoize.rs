//! Cache the results of a pure function by argument.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

/// Wraps `f` so each distinct argument is computed once.
pub struct Memoize<A, R, F> {
    func: F,
    cache: HashMap<A, R>,
}

impl<A, R, F> Memoize<A, R, F>
where
    A: Eq + Hash + Clone,
    R: Clone,
    F: Fn(A) -> R,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            cache: HashMap::new(),
        }
    }

    pub fn call(&mut self, arg: A) -> R {
        if let Some(hit) = self.cache.get(&arg) {
            return hit.clone();
        }
        debug!(cached = self.cache.len(), "memoize miss");
        let value = (self.func)(arg.clone());
        self.cache.insert(arg, value.clone());
        value
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

pub fn memoize<A, R, F>(func: F) -> Memoize<A, R, F>
where
    A: Eq + Hash + Clone,
    R: Clone,
    F: Fn(A) -> R,
{
    Memoize::new(func)
}
