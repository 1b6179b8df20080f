//! Abstract KV-Store interface.
//!
//! Every persistent structure in basalt (trie nodes, contract code, the
//! block-tree summary) lives behind these traits. Keys are content hashes in
//! practice, so stores are write-once per key and never rewritten.

use auto_impl::auto_impl;
use std::borrow::{Borrow, Cow};
use std::hash::Hash;

mod imps;
mod shared;

pub use shared::Shared;

/// [`hashbrown::HashMap`] with the fx hasher, the default in-memory store.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;

/// Value trait
pub trait Value: ToOwned<Owned = Self> {}

impl<T: ToOwned<Owned = T>> Value for T {}

/// Key-Value store insert trait
#[auto_impl(&mut, Box)]
pub trait KeyValueStoreInsert<K: Ord + Hash + Eq, V: Value> {
    /// Insert key-value pair
    fn insert(&mut self, k: K, v: V);
}

/// Key-Value store get trait
#[auto_impl(&, &mut, Box, Rc, Arc)]
pub trait KeyValueStoreGet<K: Ord + Hash + Eq, V: Value> {
    /// Get value by key
    fn get<Q: ?Sized>(&self, k: &Q) -> Option<Cow<'_, V>>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq;
}

/// Key-Value store delete trait
#[auto_impl(&mut, Box)]
pub trait KeyValueStoreDelete<K: Ord + Hash + Eq, V: Value> {
    /// Delete key-value pair
    fn delete<Q: ?Sized>(&mut self, k: &Q)
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq;
}

/// Key-Value store trait
pub trait KeyValueStore<K: Ord + Hash + Eq, V: Value>:
    KeyValueStoreInsert<K, V> + KeyValueStoreGet<K, V> + KeyValueStoreDelete<K, V>
{
}

impl<K: Ord + Hash + Eq, V: Value, S> KeyValueStore<K, V> for S where
    S: KeyValueStoreInsert<K, V> + KeyValueStoreGet<K, V> + KeyValueStoreDelete<K, V>
{
}
