//! Merkle Patricia Trie.
//!
//! A persistent, content-addressed, ordered key/value store whose root hash
//! commits to its contents. Nodes whose RLP encoding reaches 32 bytes are
//! stored in the KV store under `keccak(rlp(node))` and referenced by hash;
//! shorter nodes are embedded in their parent. Unloaded subtrees are held as
//! digests and resolved from the store on demand, so a trie opened at a root
//! hash reads lazily and copies on write.

mod node;
pub mod path;

pub use node::{Node, NodeData, NodeReference};
pub use path::PathError;

use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{keccak256, Bytes, B256, EMPTY_ROOT_HASH};
use basalt_rlp::Encodable;
use std::{iter, mem};

/// Trie error type.
///
/// A missing node is a corruption signal: the structure references a hash the
/// store no longer has. It is never produced by lookups of absent keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrieError {
    /// A hash reference could not be resolved against the KV store.
    #[error("missing trie node {0}")]
    NodeNotFound(B256),
    /// A stored node failed to decode.
    #[error(transparent)]
    Rlp(#[from] basalt_rlp::Error),
}

/// A Merkle Patricia Trie over a KV store.
#[derive(Debug)]
pub struct Trie<Db> {
    db: Db,
    root: Node,
}

impl<Db> Trie<Db> {
    /// An empty trie over `db`.
    pub fn new(db: Db) -> Self {
        Self {
            db,
            root: Node::default(),
        }
    }

    /// Opens a view of the trie committed at `root_hash`.
    ///
    /// Nothing is read until a key is looked up; an invalid root surfaces as
    /// [`TrieError::NodeNotFound`] on first access.
    pub fn open(db: Db, root_hash: B256) -> Self {
        let root = if root_hash == EMPTY_ROOT_HASH {
            Node::default()
        } else {
            NodeData::Digest(root_hash).into()
        };
        Self { db, root }
    }

    /// The root hash of the current contents.
    pub fn root_hash(&self) -> B256 {
        self.root.hash()
    }

    /// The underlying store.
    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl<Db: KeyValueStoreGet<B256, Bytes>> Trie<Db> {
    /// Looks up a key, returning `None` if it is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        lookup(&self.db, &self.root, &path::to_nibbles(key))
    }

    /// Inserts or overwrites a key. The value must be non-empty; an empty
    /// value means deletion and is routed through [`update`](Self::update).
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        debug_assert!(!value.is_empty(), "empty values are deletions");
        insert_at(&mut self.root, &self.db, &path::to_nibbles(key), value)
    }

    /// Removes a key, reporting whether it was present. The trie re-collapses
    /// to canonical form, so the root hash equals that of a trie built from
    /// the remaining keys in any order.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, TrieError> {
        remove_at(&mut self.root, &self.db, &path::to_nibbles(key))
    }

    /// Stores `value` under `key`, deleting the key when `value` is empty.
    pub fn update(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        if value.is_empty() {
            self.remove(key)?;
            Ok(())
        } else {
            self.insert(key, value)
        }
    }

    /// Walks the whole trie, resolving digests, and returns its entries with
    /// packed key bytes, in key order.
    pub fn iter_entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut entries = Vec::new();
        collect_entries(&self.db, &self.root, &mut Vec::new(), &mut entries)?;
        Ok(entries)
    }
}

impl<Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes>> Trie<Db> {
    /// Persists every loaded node that is referenced by hash, plus the root
    /// itself, and returns the root hash. The store is content-addressed and
    /// append-only, so earlier roots stay readable.
    pub fn commit(&mut self) -> B256 {
        let root_hash = self.root.hash();
        if !self.root.is_null() {
            store_subtree(&self.root, &mut self.db);
            let encoded = basalt_rlp::encode(&self.root);
            // a root shorter than 32 bytes is never referenced from a parent,
            // store it under its hash so `open` can find it
            if encoded.len() < 32 {
                self.db.insert(root_hash, encoded.into());
            }
        }
        root_hash
    }
}

/// Builds the trie keyed by `rlp(index)` over a sequence of encodable items
/// and returns its root hash. This is the shape of the transactions and
/// receipts tries.
pub fn ordered_trie_root<T: Encodable>(items: &[T]) -> B256 {
    let mut trie = Trie::new(basalt_kv::HashMap::<B256, Bytes>::default());
    for (index, item) in items.iter().enumerate() {
        trie.insert(&basalt_rlp::encode(&index), basalt_rlp::encode(item))
            .expect("in-memory trie has no unresolved nodes");
    }
    trie.root_hash()
}

fn load_node<S: KeyValueStoreGet<B256, Bytes>>(store: &S, digest: B256) -> Result<Node, TrieError> {
    let bytes = store.get(&digest).ok_or(TrieError::NodeNotFound(digest))?;
    Ok(Node::decode_exact(&bytes)?)
}

fn resolve<S: KeyValueStoreGet<B256, Bytes>>(node: &mut Node, store: &S) -> Result<(), TrieError> {
    if let NodeData::Digest(digest) = node.data {
        *node = load_node(store, digest)?;
    }
    Ok(())
}

fn lookup<S: KeyValueStoreGet<B256, Bytes>>(
    store: &S,
    node: &Node,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    match &node.data {
        NodeData::Null => Ok(None),
        NodeData::Leaf {
            path: node_path,
            value,
        } => Ok((node_path.as_slice() == path).then(|| value.clone())),
        NodeData::Extension {
            path: node_path,
            child,
        } => match path.strip_prefix(node_path.as_slice()) {
            Some(rest) => lookup(store, child, rest),
            None => Ok(None),
        },
        NodeData::Branch { children, value } => match path.split_first() {
            None => Ok(value.clone()),
            Some((&index, rest)) => match &children[index as usize] {
                Some(child) => lookup(store, child, rest),
                None => Ok(None),
            },
        },
        NodeData::Digest(digest) => {
            let loaded = load_node(store, *digest)?;
            lookup(store, &loaded, path)
        }
    }
}

fn insert_at<S: KeyValueStoreGet<B256, Bytes>>(
    node: &mut Node,
    store: &S,
    path: &[u8],
    value: Vec<u8>,
) -> Result<(), TrieError> {
    resolve(node, store)?;
    match &mut node.data {
        NodeData::Null => {
            node.data = NodeData::Leaf {
                path: path.to_vec(),
                value,
            };
        }
        NodeData::Leaf {
            path: node_path,
            value: node_value,
        } => {
            let common = common_prefix(node_path, path);
            if common == node_path.len() && common == path.len() {
                *node_value = value;
            } else {
                let node_path = mem::take(node_path);
                let node_value = mem::take(node_value);
                let branch = branch_of_two(
                    (&node_path[common..], node_value),
                    (&path[common..], value),
                );
                node.data = wrap_extension(&path[..common], branch);
            }
        }
        NodeData::Extension {
            path: node_path,
            child,
        } => {
            let common = common_prefix(node_path, path);
            if common == node_path.len() {
                insert_at(child, store, &path[common..], value)?;
            } else {
                // split: the common run stays an extension over a new branch
                // holding the old child and the new entry
                let index = node_path[common];
                let node_path_rest = node_path[common + 1..].to_vec();
                let old_child = mem::take(child);

                let mut children: [Option<Box<Node>>; 16] = Default::default();
                children[index as usize] = if node_path_rest.is_empty() {
                    Some(old_child)
                } else {
                    Some(Box::new(Node::extension(node_path_rest, old_child)))
                };
                let mut branch_value = None;
                match path[common..].split_first() {
                    None => branch_value = Some(value),
                    Some((&nibble, rest)) => {
                        children[nibble as usize] =
                            Some(Box::new(Node::leaf(rest.to_vec(), value)));
                    }
                }
                let branch = NodeData::Branch {
                    children: Box::new(children),
                    value: branch_value,
                };
                node.data = wrap_extension(&path[..common], branch);
            }
        }
        NodeData::Branch {
            children,
            value: node_value,
        } => match path.split_first() {
            None => *node_value = Some(value),
            Some((&index, rest)) => {
                let slot = &mut children[index as usize];
                match slot {
                    Some(child) => insert_at(child, store, rest, value)?,
                    None => *slot = Some(Box::new(Node::leaf(rest.to_vec(), value))),
                }
            }
        },
        NodeData::Digest(_) => unreachable!("digest resolved above"),
    }
    node.invalidate_reference();
    Ok(())
}

fn remove_at<S: KeyValueStoreGet<B256, Bytes>>(
    node: &mut Node,
    store: &S,
    path: &[u8],
) -> Result<bool, TrieError> {
    resolve(node, store)?;
    match &mut node.data {
        NodeData::Null => return Ok(false),
        NodeData::Leaf {
            path: node_path, ..
        } => {
            if node_path.as_slice() != path {
                return Ok(false);
            }
            node.data = NodeData::Null;
        }
        NodeData::Extension {
            path: node_path,
            child,
        } => {
            let Some(rest) = path.strip_prefix(node_path.as_slice()) else {
                return Ok(false);
            };
            if !remove_at(child, store, rest)? {
                return Ok(false);
            }
            // the child may have collapsed into a leaf, an extension or
            // nothing; restore the extension invariant by merging
            let prefix = mem::take(node_path);
            node.data = match mem::take(&mut child.data) {
                NodeData::Null => NodeData::Null,
                NodeData::Leaf { path, value } => NodeData::Leaf {
                    path: join(prefix, path),
                    value,
                },
                NodeData::Extension { path, child } => NodeData::Extension {
                    path: join(prefix, path),
                    child,
                },
                data @ NodeData::Branch { .. } => NodeData::Extension {
                    path: prefix,
                    child: Box::new(data.into()),
                },
                NodeData::Digest(_) => unreachable!("child resolved during removal"),
            };
        }
        NodeData::Branch { children, value } => {
            match path.split_first() {
                None => {
                    if value.take().is_none() {
                        return Ok(false);
                    }
                }
                Some((&index, rest)) => {
                    let slot = &mut children[index as usize];
                    match slot {
                        Some(child) => {
                            if !remove_at(child, store, rest)? {
                                return Ok(false);
                            }
                            if child.is_null() {
                                *slot = None;
                            }
                        }
                        None => return Ok(false),
                    }
                }
            }
        }
        NodeData::Digest(_) => unreachable!("digest resolved above"),
    }
    if matches!(node.data, NodeData::Branch { .. }) {
        collapse_branch(node, store)?;
    }
    node.invalidate_reference();
    Ok(true)
}

/// Re-canonicalizes a branch that may have dropped to a single entry: a value
/// with no children becomes a leaf, a lone child absorbs its slot nibble.
fn collapse_branch<S: KeyValueStoreGet<B256, Bytes>>(
    node: &mut Node,
    store: &S,
) -> Result<(), TrieError> {
    let NodeData::Branch { children, value } = &mut node.data else {
        return Ok(());
    };
    let occupied = children.iter().filter(|slot| slot.is_some()).count();
    match (occupied, value.is_some()) {
        (0, true) => {
            let value = value.take().expect("branch value checked");
            node.data = NodeData::Leaf {
                path: Vec::new(),
                value,
            };
        }
        (1, false) => {
            let (index, slot) = children
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| slot.is_some())
                .expect("occupied slot checked");
            let index = index as u8;
            let mut orphan = slot.take().expect("occupied slot checked");
            resolve(&mut orphan, store)?;
            node.data = match orphan.data {
                NodeData::Leaf { path, value } => NodeData::Leaf {
                    path: prepend(index, path),
                    value,
                },
                NodeData::Extension { path, child } => NodeData::Extension {
                    path: prepend(index, path),
                    child,
                },
                data @ NodeData::Branch { .. } => NodeData::Extension {
                    path: vec![index],
                    child: Box::new(data.into()),
                },
                NodeData::Null | NodeData::Digest(_) => unreachable!("orphan resolved"),
            };
        }
        _ => {}
    }
    Ok(())
}

fn collect_entries<S: KeyValueStoreGet<B256, Bytes>>(
    store: &S,
    node: &Node,
    prefix: &mut Vec<u8>,
    entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(), TrieError> {
    match &node.data {
        NodeData::Null => {}
        NodeData::Leaf { path, value } => {
            prefix.extend_from_slice(path);
            entries.push((path::pack_nibbles(prefix), value.clone()));
            prefix.truncate(prefix.len() - path.len());
        }
        NodeData::Extension { path, child } => {
            prefix.extend_from_slice(path);
            collect_entries(store, child, prefix, entries)?;
            prefix.truncate(prefix.len() - path.len());
        }
        NodeData::Branch { children, value } => {
            if let Some(value) = value {
                entries.push((path::pack_nibbles(prefix), value.clone()));
            }
            for (index, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    prefix.push(index as u8);
                    collect_entries(store, child, prefix, entries)?;
                    prefix.pop();
                }
            }
        }
        NodeData::Digest(digest) => {
            let loaded = load_node(store, *digest)?;
            collect_entries(store, &loaded, prefix, entries)?;
        }
    }
    Ok(())
}

fn store_subtree<Db: KeyValueStoreInsert<B256, Bytes>>(node: &Node, db: &mut Db) {
    match &node.data {
        NodeData::Null | NodeData::Digest(_) => return,
        NodeData::Leaf { .. } => {}
        NodeData::Extension { child, .. } => store_subtree(child, db),
        NodeData::Branch { children, .. } => {
            for child in children.iter().flatten() {
                store_subtree(child, db);
            }
        }
    }
    let encoded = basalt_rlp::encode(node);
    if encoded.len() >= 32 {
        db.insert(keccak256(&encoded), encoded.into());
    }
}

fn branch_of_two(a: (&[u8], Vec<u8>), b: (&[u8], Vec<u8>)) -> NodeData {
    let mut children: [Option<Box<Node>>; 16] = Default::default();
    let mut value = None;
    for (path, entry_value) in [a, b] {
        match path.split_first() {
            None => value = Some(entry_value),
            Some((&nibble, rest)) => {
                children[nibble as usize] = Some(Box::new(Node::leaf(rest.to_vec(), entry_value)));
            }
        }
    }
    NodeData::Branch {
        children: Box::new(children),
        value,
    }
}

fn wrap_extension(prefix: &[u8], data: NodeData) -> NodeData {
    if prefix.is_empty() {
        data
    } else {
        NodeData::Extension {
            path: prefix.to_vec(),
            child: Box::new(data.into()),
        }
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    iter::zip(a, b).take_while(|(x, y)| x == y).count()
}

fn prepend(index: u8, mut path: Vec<u8>) -> Vec<u8> {
    path.insert(0, index);
    path
}

fn join(mut prefix: Vec<u8>, suffix: Vec<u8>) -> Vec<u8> {
    prefix.extend(suffix);
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::{HashMap, Shared};
    use hex_literal::hex;

    type MemTrie = Trie<HashMap<B256, Bytes>>;

    fn mem_trie() -> MemTrie {
        Trie::new(HashMap::default())
    }

    #[test]
    fn empty_root() {
        assert_eq!(mem_trie().root_hash(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn single_leaf_root() {
        let mut trie = mem_trie();
        trie.insert(&[0x01, 0x02], b"hello".to_vec()).unwrap();
        assert_eq!(
            trie.root_hash().0,
            hex!("b4856d035005674c6d72c8af0db7d6b310255a0107fa8c90d7e62806981b0a80")
        );
        assert_eq!(trie.get(&[0x01, 0x02]).unwrap().unwrap(), b"hello");
        assert_eq!(trie.get(&[0x01, 0x03]).unwrap(), None);
    }

    #[test]
    fn tiny_trie_known_hash() {
        // an extension over a branch with two empty-path leaves
        let mut trie = mem_trie();
        trie.insert(b"a", vec![0x80]).unwrap();
        trie.insert(b"b", vec![0x01]).unwrap();
        assert_eq!(
            trie.root_hash().0,
            hex!("6fbf23d6ec055dd143ff50d558559770005ff44ae1d41276f1bd83affab6dd3b")
        );
    }

    #[test]
    fn branch_values_are_supported() {
        let mut trie = mem_trie();
        trie.insert(b"do", b"verb".to_vec()).unwrap();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        assert_eq!(trie.get(b"do").unwrap().unwrap(), b"verb");
        assert_eq!(trie.get(b"dog").unwrap().unwrap(), b"puppy");
        assert_eq!(trie.get(b"doge").unwrap().unwrap(), b"coin");

        assert!(trie.remove(b"dog").unwrap());
        assert_eq!(trie.get(b"dog").unwrap(), None);
        assert_eq!(trie.get(b"do").unwrap().unwrap(), b"verb");
        assert_eq!(trie.get(b"doge").unwrap().unwrap(), b"coin");

        // deleting back to one key leaves a canonical single-leaf trie
        assert!(trie.remove(b"do").unwrap());
        let mut reference = mem_trie();
        reference.insert(b"doge", b"coin".to_vec()).unwrap();
        assert_eq!(trie.root_hash(), reference.root_hash());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        const N: usize = 64;

        let mut trie = mem_trie();
        for i in 0..N {
            trie.insert(
                keccak256((i as u64).to_be_bytes()).as_slice(),
                basalt_rlp::encode(&(i as u64)),
            )
            .unwrap();

            let mut reference = mem_trie();
            for j in (0..=i).rev() {
                reference
                    .insert(
                        keccak256((j as u64).to_be_bytes()).as_slice(),
                        basalt_rlp::encode(&(j as u64)),
                    )
                    .unwrap();
            }
            assert_eq!(trie.root_hash(), reference.root_hash());
        }

        for i in 0..N {
            assert_eq!(
                trie.get(keccak256((i as u64).to_be_bytes()).as_slice())
                    .unwrap(),
                Some(basalt_rlp::encode(&(i as u64)))
            );
        }

        // deleting keys keeps the trie canonical at every step
        for i in 0..N {
            assert!(trie
                .remove(keccak256((i as u64).to_be_bytes()).as_slice())
                .unwrap());

            let mut reference = mem_trie();
            for j in ((i + 1)..N).rev() {
                reference
                    .insert(
                        keccak256((j as u64).to_be_bytes()).as_slice(),
                        basalt_rlp::encode(&(j as u64)),
                    )
                    .unwrap();
            }
            assert_eq!(trie.root_hash(), reference.root_hash());
        }
        assert_eq!(trie.root_hash(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn update_with_empty_value_deletes() {
        let mut trie = mem_trie();
        trie.update(b"key", b"value".to_vec()).unwrap();
        trie.update(b"key", Vec::new()).unwrap();
        assert_eq!(trie.root_hash(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn removing_absent_keys_is_a_noop() {
        let mut trie = mem_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        let root = trie.root_hash();
        assert!(!trie.remove(b"cat").unwrap());
        assert!(!trie.remove(b"do").unwrap());
        assert!(!trie.remove(b"dogs").unwrap());
        assert_eq!(trie.root_hash(), root);
    }

    #[test]
    fn commit_and_reopen() {
        let db = Shared::new(HashMap::<B256, Bytes>::default());
        let mut trie = Trie::new(db.clone());
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0u64..32)
            .map(|i| {
                (
                    keccak256(i.to_be_bytes()).to_vec(),
                    basalt_rlp::encode(&(i + 1)),
                )
            })
            .collect();
        for (key, value) in &entries {
            trie.insert(key, value.clone()).unwrap();
        }
        let root = trie.commit();

        let reopened = Trie::open(db, root);
        for (key, value) in &entries {
            assert_eq!(reopened.get(key).unwrap().as_ref(), Some(value));
        }
        assert_eq!(reopened.get(&[0xFF; 32]).unwrap(), None);

        let mut listed = reopened.iter_entries().unwrap();
        listed.sort();
        let mut expected = entries.clone();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn copy_on_write_keeps_old_roots() {
        let db = Shared::new(HashMap::<B256, Bytes>::default());
        let mut trie = Trie::new(db.clone());
        for i in 0u64..16 {
            trie.insert(keccak256(i.to_be_bytes()).as_slice(), basalt_rlp::encode(&i))
                .unwrap();
        }
        let old_root = trie.commit();

        let mut updated = Trie::open(db.clone(), old_root);
        updated
            .insert(keccak256(99u64.to_be_bytes()).as_slice(), vec![0x2A])
            .unwrap();
        let new_root = updated.commit();
        assert_ne!(old_root, new_root);

        // the old view still reads every original entry
        let old = Trie::open(db, old_root);
        for i in 0u64..16 {
            assert_eq!(
                old.get(keccak256(i.to_be_bytes()).as_slice()).unwrap(),
                Some(basalt_rlp::encode(&i))
            );
        }
        assert_eq!(old.get(keccak256(99u64.to_be_bytes()).as_slice()).unwrap(), None);
    }

    #[test]
    fn dangling_reference_is_fatal() {
        let trie: Trie<HashMap<B256, Bytes>> =
            Trie::open(HashMap::default(), B256::repeat_byte(0x13));
        assert_eq!(
            trie.get(b"anything").unwrap_err(),
            TrieError::NodeNotFound(B256::repeat_byte(0x13))
        );
    }

    #[test]
    fn ordered_root_of_empty_sequence() {
        assert_eq!(ordered_trie_root::<Vec<u8>>(&[]), EMPTY_ROOT_HASH);
        assert_ne!(
            ordered_trie_root(&[b"first".to_vec(), b"second".to_vec()]),
            EMPTY_ROOT_HASH
        );
    }
}
