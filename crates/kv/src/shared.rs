use crate::{KeyValueStoreDelete, KeyValueStoreGet, KeyValueStoreInsert, Value};
use std::borrow::{Borrow, Cow};
use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

/// A cheaply clonable handle to a single underlying store.
///
/// The world-state trie, every open storage trie and the code store all write
/// into one content-addressed store; each holds its own `Shared` handle.
/// Single-threaded on purpose: an account repository is owned by exactly one
/// call stack at a time.
#[derive(Debug, Default)]
pub struct Shared<S>(Rc<RefCell<S>>);

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<S> Shared<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Shared(Rc::new(RefCell::new(store)))
    }

    /// Run a closure with a shared borrow of the underlying store.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&RefCell::borrow(&self.0))
    }

    /// Run a closure with an exclusive borrow of the underlying store.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut RefCell::borrow_mut(&self.0))
    }
}

impl<K: Ord + Hash + Eq, V: Value, S: KeyValueStoreInsert<K, V>> KeyValueStoreInsert<K, V>
    for Shared<S>
{
    fn insert(&mut self, k: K, v: V) {
        RefCell::borrow_mut(&self.0).insert(k, v)
    }
}

impl<K: Ord + Hash + Eq, V: Value, S: KeyValueStoreGet<K, V>> KeyValueStoreGet<K, V>
    for Shared<S>
{
    fn get<Q: ?Sized>(&self, k: &Q) -> Option<Cow<'_, V>>
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        RefCell::borrow(&self.0)
            .get(k)
            .map(|v| Cow::Owned(v.into_owned()))
    }
}

impl<K: Ord + Hash + Eq, V: Value, S: KeyValueStoreDelete<K, V>> KeyValueStoreDelete<K, V>
    for Shared<S>
{
    fn delete<Q: ?Sized>(&mut self, k: &Q)
    where
        K: Borrow<Q>,
        Q: Ord + Hash + Eq,
    {
        RefCell::borrow_mut(&self.0).delete(k)
    }
}
