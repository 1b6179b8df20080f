//! The block tree: every imported block keyed by hash, with the best chain
//! selected by total difficulty.

use crate::block::apply_block;
use crate::error::BlockError;
use crate::validation::validate_header;
use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{keccak256, Block, Bytes, ChainSpec, B256, U256};
use basalt_rlp::{Decodable, Encodable, Error as RlpError, Header};
use basalt_state::State;
use std::collections::{BTreeMap, HashMap};

/// One imported block with its accumulated difficulty and children.
#[derive(Debug, Clone)]
struct TreeEntry {
    block: Block,
    total_difficulty: U256,
    children: Vec<B256>,
}

/// An in-memory tree of validated blocks over a shared node store. The best
/// block is the terminal of the highest-total-difficulty chain; competing
/// forks coexist because the store is content-addressed and never rewritten.
#[derive(Debug)]
pub struct BlockTree<Db> {
    db: Db,
    chain: ChainSpec,
    blocks: HashMap<B256, TreeEntry>,
    best: B256,
}

impl<Db> BlockTree<Db>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    /// Roots a tree at an already-committed genesis block: its state root
    /// must be resolvable in `db`.
    pub fn new(db: Db, chain: ChainSpec, genesis: Block) -> Self {
        let hash = genesis.hash();
        let total_difficulty = genesis.header.difficulty;
        let mut blocks = HashMap::new();
        blocks.insert(
            hash,
            TreeEntry {
                block: genesis,
                total_difficulty,
                children: Vec::new(),
            },
        );
        Self {
            db,
            chain,
            blocks,
            best: hash,
        }
    }

    /// The current best block.
    pub fn best_block(&self) -> &Block {
        &self.blocks[&self.best].block
    }

    /// Hash of the current best block.
    pub fn best_hash(&self) -> B256 {
        self.best
    }

    /// The total difficulty of a known block.
    pub fn total_difficulty(&self, hash: &B256) -> Option<U256> {
        self.blocks.get(hash).map(|entry| entry.total_difficulty)
    }

    /// A known block by hash.
    pub fn block(&self, hash: &B256) -> Option<&Block> {
        self.blocks.get(hash).map(|entry| &entry.block)
    }

    /// Validates and executes a block against its parent's post-state; on
    /// success it joins the tree and may become the new best block. On any
    /// mismatch the block is rejected and committed state is untouched.
    pub fn add_block(&mut self, block: Block) -> Result<B256, BlockError> {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Ok(hash);
        }

        let parent_hash = block.header.parent_hash;
        let parent = self
            .blocks
            .get(&parent_hash)
            .ok_or(BlockError::UnknownParent(parent_hash))?;
        let parent_total_difficulty = parent.total_difficulty;
        let parent_header = parent.block.header.clone();

        validate_header(
            &self.chain,
            &parent_header,
            &block.header,
            !block.ommers.is_empty(),
        )?;

        let mut state = State::open(self.db.clone(), parent_header.state_root);
        apply_block(
            &mut state,
            &self.chain,
            &block,
            self.ancestor_hashes(parent_hash),
        )?;

        dev_info!(
            "imported block {} ({hash}) with {} txs",
            block.header.number,
            block.transactions.len()
        );

        let total_difficulty = parent_total_difficulty + block.header.difficulty;
        self.blocks.insert(
            hash,
            TreeEntry {
                block,
                total_difficulty,
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.blocks.get_mut(&parent_hash) {
            parent.children.push(hash);
        }
        if total_difficulty > self.blocks[&self.best].total_difficulty {
            self.best = hash;
        }
        Ok(hash)
    }

    /// The last 256 ancestor hashes starting from `head`, keyed by number,
    /// for the `BLOCKHASH` opcode.
    fn ancestor_hashes(&self, head: B256) -> BTreeMap<u64, B256> {
        let mut hashes = BTreeMap::new();
        let mut cursor = head;
        for _ in 0..256 {
            let Some(entry) = self.blocks.get(&cursor) else {
                break;
            };
            hashes.insert(entry.block.header.number, cursor);
            if entry.block.header.number == 0 {
                break;
            }
            cursor = entry.block.header.parent_hash;
        }
        hashes
    }

    /// Persists a summary of the tree under the reserved key.
    pub fn save(&mut self) {
        let mut entries: Vec<SavedEntry> = self
            .blocks
            .values()
            .map(|entry| SavedEntry {
                block: entry.block.clone(),
                total_difficulty: entry.total_difficulty,
            })
            .collect();
        entries.sort_by_key(|entry| entry.block.header.number);
        let mut out = Vec::new();
        basalt_rlp::encode_list(&entries, &mut out);
        self.db.insert(reserved_key(), out.into());
    }

    /// Restores a tree previously written by [`save`](Self::save). Returns
    /// `None` if nothing is stored under the reserved key.
    pub fn load(db: Db, chain: ChainSpec) -> Result<Option<Self>, RlpError> {
        let Some(bytes) = db.get(&reserved_key()) else {
            return Ok(None);
        };
        let mut buf: &[u8] = &bytes;
        let entries: Vec<SavedEntry> = basalt_rlp::decode_list(&mut buf)?;
        let mut blocks: HashMap<B256, TreeEntry> = HashMap::new();
        let mut best: Option<B256> = None;
        for entry in entries {
            let hash = entry.block.hash();
            let replaces_best = match best {
                None => true,
                Some(current) => entry.total_difficulty > blocks[&current].total_difficulty,
            };
            if replaces_best {
                best = Some(hash);
            }
            let parent_hash = entry.block.header.parent_hash;
            blocks.insert(
                hash,
                TreeEntry {
                    block: entry.block,
                    total_difficulty: entry.total_difficulty,
                    children: Vec::new(),
                },
            );
            if let Some(parent) = blocks.get_mut(&parent_hash) {
                parent.children.push(hash);
            }
        }
        let Some(best) = best else { return Ok(None) };
        Ok(Some(Self {
            db,
            chain,
            blocks,
            best,
        }))
    }
}

/// The single reserved non-content-addressed entry, stored under the hash of
/// its name since every key in the store is 32 bytes.
fn reserved_key() -> B256 {
    keccak256(b"current_block_tree")
}

#[derive(Debug, Clone)]
struct SavedEntry {
    block: Block,
    total_difficulty: U256,
}

impl Encodable for SavedEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        let payload_length = self.block.length() + self.total_difficulty.length();
        Header {
            list: true,
            payload_length,
        }
        .encode(out);
        self.block.encode(out);
        self.total_difficulty.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.block.length() + self.total_difficulty.length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for SavedEntry {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let entry = SavedEntry {
            block: Block::decode(&mut payload)?,
            total_difficulty: U256::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(RlpError::ListLengthMismatch);
        }
        Ok(entry)
    }
}
