//! Round-robin shard partitioning for the training driver.
//!
//! Grounded on `decipherment-learn.cc`'s observation loading: items are
//! dealt out to `num_threads` shards round-robin (item `i` goes to
//! shard `i % num_threads`), not split into contiguous blocks, so a
//! corpus sorted by length or difficulty doesn't leave one shard doing
//! all the hard utterances.

/// Splits `items` into `num_shards` round-robin partitions.
pub fn round_robin_shards<T: Clone>(items: &[T], num_shards: usize) -> Vec<Vec<T>> {
    let num_shards = num_shards.max(1);
    let mut shards: Vec<Vec<T>> = vec![Vec::new(); num_shards];
    for (i, item) in items.iter().enumerate() {
        shards[i % num_shards].push(item.clone());
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distributes_round_robin() {
        let items: Vec<u32> = (0..7).collect();
        let shards = round_robin_shards(&items, 3);
        assert_eq!(shards[0], vec![0, 3, 6]);
        assert_eq!(shards[1], vec![1, 4]);
        assert_eq!(shards[2], vec![2, 5]);
    }

    #[test]
    fn zero_shards_is_treated_as_one() {
        let items = vec![1, 2, 3];
        let shards = round_robin_shards(&items, 0);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0], items);
    }
}
