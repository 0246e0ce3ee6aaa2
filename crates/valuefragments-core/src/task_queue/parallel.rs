//! Parallel map on rayon's global pool

use rayon::prelude::*;

/// Map `f` over `items` on the global rayon pool; output order matches input order.
pub fn parallel_map<I, O, F>(items: Vec<I>, f: F) -> Vec<O>
where
    I: Send,
    O: Send,
    F: Fn(I) -> O + Send + Sync,
{
    items.into_par_iter().map(f).collect()
}
