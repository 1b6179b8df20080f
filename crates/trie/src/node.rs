//! Merkle Patricia Trie nodes and their RLP encoding.

use crate::path::{decode_path, encode_path};
use basalt_primitives::{keccak256, B256, EMPTY_ROOT_HASH};
use basalt_rlp::{
    Encodable, Error, Header, PayloadView, Result, EMPTY_STRING_CODE,
};
use std::cell::OnceCell;

/// The payload of a trie node.
///
/// `Digest` is the in-memory form of an unresolved hash reference: a subtree
/// that lives in the KV store and has not been loaded. Paths are raw nibble
/// sequences; the hex-prefix form exists only in the RLP encoding.
#[derive(Debug, Clone, Default)]
pub enum NodeData {
    /// The empty trie.
    #[default]
    Null,
    /// A terminal node holding the remaining key nibbles and a value.
    Leaf {
        /// Key suffix below this node.
        path: Vec<u8>,
        /// Stored value.
        value: Vec<u8>,
    },
    /// Shared-prefix compression: a nibble run and a single child.
    Extension {
        /// The shared nibble run.
        path: Vec<u8>,
        /// The node below it.
        child: Box<Node>,
    },
    /// A sixteen-way fork, plus a value for the key ending exactly here.
    Branch {
        /// One slot per next nibble.
        children: Box<[Option<Box<Node>>; 16]>,
        /// Value of the key that terminates at this node.
        value: Option<Vec<u8>>,
    },
    /// An unresolved reference to a node stored under its hash.
    Digest(B256),
}

/// How a node is referenced from its parent: inline RLP when shorter than 32
/// bytes, by Keccak-256 hash otherwise. This rule is the sole source of trie
/// content-addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeReference {
    /// The node's full RLP, embedded in the parent.
    Bytes(Vec<u8>),
    /// Keccak-256 of the node's RLP.
    Digest(B256),
}

/// A trie node with a cached reference.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// The type and data of the node.
    pub(crate) data: NodeData,
    /// Previously computed reference, dropped on mutation.
    cached_reference: OnceCell<NodeReference>,
}

impl From<NodeData> for Node {
    fn from(data: NodeData) -> Self {
        Node {
            data,
            cached_reference: OnceCell::new(),
        }
    }
}

impl Node {
    pub(crate) fn leaf(path: Vec<u8>, value: Vec<u8>) -> Self {
        NodeData::Leaf { path, value }.into()
    }

    pub(crate) fn extension(path: Vec<u8>, child: Box<Node>) -> Self {
        NodeData::Extension { path, child }.into()
    }

    /// True for the empty node.
    pub fn is_null(&self) -> bool {
        matches!(self.data, NodeData::Null)
    }

    /// The reference this node gets inside its parent.
    pub fn reference(&self) -> NodeReference {
        self.cached_reference
            .get_or_init(|| match &self.data {
                NodeData::Null => NodeReference::Bytes(vec![EMPTY_STRING_CODE]),
                NodeData::Digest(digest) => NodeReference::Digest(*digest),
                _ => {
                    let encoded = basalt_rlp::encode(self);
                    if encoded.len() < 32 {
                        NodeReference::Bytes(encoded)
                    } else {
                        NodeReference::Digest(keccak256(encoded))
                    }
                }
            })
            .clone()
    }

    /// The 256-bit hash of the node; the empty node hashes to the canonical
    /// empty root.
    pub fn hash(&self) -> B256 {
        match self.data {
            NodeData::Null => EMPTY_ROOT_HASH,
            _ => match self.reference() {
                NodeReference::Digest(digest) => digest,
                NodeReference::Bytes(bytes) => keccak256(bytes),
            },
        }
    }

    pub(crate) fn invalidate_reference(&mut self) {
        self.cached_reference.take();
    }

    fn reference_encode(&self, out: &mut Vec<u8>) {
        match self.reference() {
            NodeReference::Bytes(bytes) => out.extend_from_slice(&bytes),
            NodeReference::Digest(digest) => {
                out.push(EMPTY_STRING_CODE + 32);
                out.extend_from_slice(digest.as_slice());
            }
        }
    }

    fn reference_length(&self) -> usize {
        match self.reference() {
            NodeReference::Bytes(bytes) => bytes.len(),
            NodeReference::Digest(_) => 1 + 32,
        }
    }

    fn payload_length(&self) -> usize {
        match &self.data {
            NodeData::Null => 0,
            NodeData::Leaf { path, value } => {
                encode_path(path, true).length() + value.length()
            }
            NodeData::Extension { path, child } => {
                encode_path(path, false).length() + child.reference_length()
            }
            NodeData::Branch { children, value } => {
                children
                    .iter()
                    .map(|child| child.as_ref().map_or(1, |node| node.reference_length()))
                    .sum::<usize>()
                    + value.as_ref().map_or(1, |value| value.length())
            }
            NodeData::Digest(_) => 32,
        }
    }

    /// Decodes a node, requiring the buffer to be fully consumed.
    pub fn decode_exact(mut buf: &[u8]) -> Result<Self> {
        let node = Self::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(Error::TrailingBytes);
        }
        Ok(node)
    }

    /// Decodes a node from the front of `buf`.
    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        let items = match Header::decode_raw(buf)? {
            PayloadView::List(items) => items,
            PayloadView::String(bytes) => {
                return if bytes.is_empty() {
                    Ok(NodeData::Null.into())
                } else if bytes.len() == 32 {
                    Ok(NodeData::Digest(B256::from_slice(bytes)).into())
                } else {
                    Err(Error::Custom("invalid node reference"))
                };
            }
        };

        // 17 items make a branch, 2 make a leaf or extension
        match items.len() {
            17 => {
                let mut children: [Option<Box<Node>>; 16] = Default::default();
                for (slot, item) in children.iter_mut().zip(items.iter()) {
                    if *item != [EMPTY_STRING_CODE] {
                        let mut buf = *item;
                        let child = Node::decode(&mut buf)?;
                        if !buf.is_empty() {
                            return Err(Error::TrailingBytes);
                        }
                        *slot = Some(Box::new(child));
                    }
                }
                let value = if items[16] == [EMPTY_STRING_CODE] {
                    None
                } else {
                    Some(Header::decode_bytes(&mut &*items[16], false)?.to_vec())
                };
                Ok(NodeData::Branch {
                    children: Box::new(children),
                    value,
                }
                .into())
            }
            2 => {
                let encoded_path = Header::decode_bytes(&mut &*items[0], false)?;
                let (path, is_leaf) = decode_path(encoded_path)
                    .map_err(|_| Error::Custom("malformed hex-prefix path"))?;
                if is_leaf {
                    let value = Header::decode_bytes(&mut &*items[1], false)?.to_vec();
                    Ok(NodeData::Leaf { path, value }.into())
                } else {
                    let mut child_buf = items[1];
                    let child = Node::decode(&mut child_buf)?;
                    if !child_buf.is_empty() {
                        return Err(Error::TrailingBytes);
                    }
                    Ok(NodeData::Extension {
                        path,
                        child: Box::new(child),
                    }
                    .into())
                }
            }
            _ => Err(Error::Custom("invalid number of items in node")),
        }
    }
}

impl Encodable for Node {
    fn encode(&self, out: &mut Vec<u8>) {
        match &self.data {
            NodeData::Null => out.push(EMPTY_STRING_CODE),
            NodeData::Leaf { path, value } => {
                Header {
                    list: true,
                    payload_length: self.payload_length(),
                }
                .encode(out);
                encode_path(path, true).encode(out);
                value.encode(out);
            }
            NodeData::Extension { path, child } => {
                Header {
                    list: true,
                    payload_length: self.payload_length(),
                }
                .encode(out);
                encode_path(path, false).encode(out);
                child.reference_encode(out);
            }
            NodeData::Branch { children, value } => {
                Header {
                    list: true,
                    payload_length: self.payload_length(),
                }
                .encode(out);
                for child in children.iter() {
                    match child {
                        Some(node) => node.reference_encode(out),
                        None => out.push(EMPTY_STRING_CODE),
                    }
                }
                match value {
                    Some(value) => value.encode(out),
                    None => out.push(EMPTY_STRING_CODE),
                }
            }
            NodeData::Digest(digest) => digest.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self.data {
            NodeData::Null => 1,
            _ => {
                let payload_length = self.payload_length();
                payload_length + basalt_rlp::length_of_length(payload_length)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn empty_node() {
        let node = Node::default();
        assert!(node.is_null());
        assert_eq!(node.reference(), NodeReference::Bytes(vec![0x80]));
        assert_eq!(
            node.hash().0,
            hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
        assert_eq!(basalt_rlp::encode(&node), vec![0x80]);
    }

    #[test]
    fn short_leaves_are_inlined() {
        for (key, value) in [("do", "verb"), ("dog", "puppy"), ("horse", "stallion")] {
            let node = Node::leaf(
                crate::path::to_nibbles(key.as_bytes()),
                value.as_bytes().to_vec(),
            );
            let encoded = basalt_rlp::encode(&node);
            assert!(encoded.len() < 32);
            assert_eq!(node.reference(), NodeReference::Bytes(encoded));
        }
    }

    #[test]
    fn decode_roundtrip() {
        let mut children: [Option<Box<Node>>; 16] = Default::default();
        children[1] = Some(Box::new(Node::leaf(vec![], vec![0x80])));
        children[2] = Some(Box::new(Node::leaf(vec![], vec![0x01])));
        let branch: Node = NodeData::Branch {
            children: Box::new(children),
            value: None,
        }
        .into();
        let root = Node::extension(vec![6], Box::new(branch));

        let encoded = basalt_rlp::encode(&root);
        assert_eq!(root.length(), encoded.len());
        let decoded = Node::decode_exact(&encoded).unwrap();
        assert_eq!(decoded.hash(), root.hash());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Node::decode_exact(&hex!("83616263")).is_err());
        assert!(Node::decode_exact(&hex!("c3808080")).is_err());
    }
}
