use crate::{KeyValueStoreDelete, KeyValueStoreGet, KeyValueStoreInsert, Value};
use core::hash::{BuildHasher, Hash};
use std::borrow::{Borrow, Cow};
use std::collections::BTreeMap;

impl<K: Ord + Hash + Eq, V: Value, S: BuildHasher> KeyValueStoreInsert<K, V>
    for hashbrown::HashMap<K, V, S>
{
    fn insert(&mut self, k: K, v: V) {
        hashbrown::HashMap::insert(self, k, v);
    }
}

impl<K: Ord + Hash + Eq, V: Value, S: BuildHasher> KeyValueStoreGet<K, V>
    for hashbrown::HashMap<K, V, S>
{
    fn get<Q: ?Sized>(&self, k: &Q) -> Option<Cow<'_, V>>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        hashbrown::HashMap::get(self, k).map(Cow::Borrowed)
    }
}

impl<K: Ord + Hash + Eq, V: Value, S: BuildHasher> KeyValueStoreDelete<K, V>
    for hashbrown::HashMap<K, V, S>
{
    fn delete<Q: ?Sized>(&mut self, k: &Q)
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        hashbrown::HashMap::remove(self, k);
    }
}

impl<K: Ord + Hash + Eq, V: Value> KeyValueStoreInsert<K, V> for BTreeMap<K, V> {
    fn insert(&mut self, k: K, v: V) {
        BTreeMap::insert(self, k, v);
    }
}

impl<K: Ord + Hash + Eq, V: Value> KeyValueStoreGet<K, V> for BTreeMap<K, V> {
    fn get<Q: ?Sized>(&self, k: &Q) -> Option<Cow<'_, V>>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        BTreeMap::get(self, k).map(Cow::Borrowed)
    }
}

impl<K: Ord + Hash + Eq, V: Value> KeyValueStoreDelete<K, V> for BTreeMap<K, V> {
    fn delete<Q: ?Sized>(&mut self, k: &Q)
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        BTreeMap::remove(self, k);
    }
}
