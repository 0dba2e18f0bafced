use std::collections::HashMap;

use pretty_assertions::assert_eq;
use tile_registry::{Pool, PoolStats, Poolable};

#[test]
fn get_hands_out_empty_values_and_counts_reuse() {
    let mut pool: Pool<Vec<u32>> = Pool::new(8, 4);

    let mut first = pool.get();
    assert!(first.is_empty());
    assert!(first.capacity() >= 8);
    first.extend([1, 2, 3]);
    pool.release(first);

    let reused = pool.get();
    assert!(reused.is_empty());
    assert_eq!(pool.stats(), PoolStats { hits: 1, misses: 1, free: 0 });
}

#[test]
fn retain_limit_bounds_the_free_list() {
    let mut pool: Pool<HashMap<u32, u32>> = Pool::new(0, 2);
    pool.release_all((0..5).map(|i| HashMap::from([(i, i)])));
    assert_eq!(pool.free_len(), 2);

    pool.resize(16, 1);
    assert_eq!(pool.free_len(), 0);
    pool.release_all([HashMap::new(), HashMap::new()]);
    assert_eq!(pool.free_len(), 1);
}

#[test]
fn reset_clears_contents() {
    let mut deque = std::collections::VecDeque::from([1, 2]);
    deque.reset();
    assert!(deque.is_empty());
}
