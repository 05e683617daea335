//! Retrieval over ordered object keys.
//!
//! Every object kind supports the same four retrieval commands. `select`
//! runs a query over the live keys (in any order) and returns the total
//! number of objects alongside the selected keys.

/// A retrieval command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query<K> {
    /// Count objects only.
    Count,
    /// Return the given key if it is live.
    Get(K),
    /// Return up to `n` keys from the start.
    GetFirst(usize),
    /// Return up to `n` keys strictly after the given key.
    ///
    /// The reference key need not be live.
    GetNext(K, usize),
}

/// Result of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult<K> {
    /// Number of live objects, regardless of how many are returned.
    pub total: usize,
    pub items: Vec<K>,
}

impl<K: Ord + Copy> Query<K> {
    /// Runs the query. Returns `None` only for a `Get` of a key that is not live.
    pub fn select<I>(&self, keys: I) -> Option<QueryResult<K>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_unstable();
        let total = keys.len();

        let items = match *self {
            Query::Count => Vec::new(),
            Query::Get(key) => {
                keys.binary_search(&key).ok()?;
                vec![key]
            }
            Query::GetFirst(n) => keys.into_iter().take(n).collect(),
            Query::GetNext(after, n) => {
                let start = keys.partition_point(|k| *k <= after);
                keys.into_iter().skip(start).take(n).collect()
            }
        };
        Some(QueryResult { total, items })
    }
}
