//! State and block snapshot chunks for warp-style sync handoff.
//!
//! A chunk is identified by the Keccak-256 of its RLP encoding. Block chunks
//! carry contiguous blocks; state chunks carry account entries (hashed
//! address, account fields, code and storage pairs) harvested from the state
//! trie. Restoring state chunks into a fresh store reproduces the state root
//! bit-exactly.

use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    keccak256, Account, Block, Bytes, B256, EMPTY_ROOT_HASH, KECCAK_EMPTY, U256,
};
use basalt_rlp::{
    encode_list, list_length, Decodable, Encodable, Error as RlpError, Header,
};
use basalt_trie::{Trie, TrieError};
use tiny_keccak::{Hasher, Keccak};

/// A run of contiguous blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockChunk {
    /// The blocks, by ascending number.
    pub blocks: Vec<Block>,
}

impl BlockChunk {
    /// The chunk's content identity.
    pub fn id(&self) -> B256 {
        keccak256(basalt_rlp::encode(self))
    }
}

impl Encodable for BlockChunk {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_list(&self.blocks, out);
    }

    fn length(&self) -> usize {
        list_length(&self.blocks)
    }
}

impl Decodable for BlockChunk {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        Ok(BlockChunk {
            blocks: basalt_rlp::decode_list(buf)?,
        })
    }
}

/// One account inside a state chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    /// `keccak(address)`; preimages are unknown to the snapshot.
    pub address_hash: B256,
    /// Account nonce.
    pub nonce: u64,
    /// Account balance.
    pub balance: U256,
    /// Contract code, empty for plain accounts.
    pub code: Bytes,
    /// Storage pairs as `(keccak(slot), value)`, in trie order.
    pub storage: Vec<StorageSlot>,
}

/// One storage pair inside an [`AccountEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    /// `keccak(slot)`.
    pub key: B256,
    /// The slot value.
    pub value: U256,
}

impl AccountEntry {
    fn payload_length(&self) -> usize {
        self.address_hash.length()
            + self.nonce.length()
            + self.balance.length()
            + self.code.length()
            + list_length(&self.storage)
    }
}

impl Encodable for StorageSlot {
    fn encode(&self, out: &mut Vec<u8>) {
        let payload_length = self.key.length() + self.value.length();
        Header {
            list: true,
            payload_length,
        }
        .encode(out);
        self.key.encode(out);
        self.value.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.key.length() + self.value.length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for StorageSlot {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let slot = StorageSlot {
            key: B256::decode(&mut payload)?,
            value: U256::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(RlpError::ListLengthMismatch);
        }
        Ok(slot)
    }
}

impl Encodable for AccountEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.address_hash.encode(out);
        self.nonce.encode(out);
        self.balance.encode(out);
        self.code.encode(out);
        encode_list(&self.storage, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for AccountEntry {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let entry = AccountEntry {
            address_hash: B256::decode(&mut payload)?,
            nonce: u64::decode(&mut payload)?,
            balance: U256::decode(&mut payload)?,
            code: Bytes::decode(&mut payload)?,
            storage: basalt_rlp::decode_list(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(RlpError::ListLengthMismatch);
        }
        Ok(entry)
    }
}

/// A bounded batch of account entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChunk {
    /// The accounts, in state-trie key order.
    pub accounts: Vec<AccountEntry>,
}

impl StateChunk {
    /// The chunk's content identity.
    pub fn id(&self) -> B256 {
        keccak256(basalt_rlp::encode(self))
    }
}

impl Encodable for StateChunk {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_list(&self.accounts, out);
    }

    fn length(&self) -> usize {
        list_length(&self.accounts)
    }
}

impl Decodable for StateChunk {
    fn decode(buf: &mut &[u8]) -> Result<Self, RlpError> {
        Ok(StateChunk {
            accounts: basalt_rlp::decode_list(buf)?,
        })
    }
}

/// Walks the state trie at `state_root` and packs every account into chunks
/// of roughly `target_size` encoded bytes.
pub fn build_state_chunks<Db>(
    db: &Db,
    state_root: B256,
    target_size: usize,
) -> Result<Vec<StateChunk>, TrieError>
where
    Db: KeyValueStoreGet<B256, Bytes> + Clone,
{
    let state_trie = Trie::open(db.clone(), state_root);
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;

    for (key, value) in state_trie.iter_entries()? {
        let account: Account =
            basalt_rlp::decode_exact(&value).map_err(TrieError::Rlp)?;

        let code = if account.code_hash == KECCAK_EMPTY {
            Bytes::new()
        } else {
            db.get(&account.code_hash)
                .map(|code| code.into_owned())
                .ok_or(TrieError::NodeNotFound(account.code_hash))?
        };

        let mut storage = Vec::new();
        if account.storage_root != EMPTY_ROOT_HASH {
            let storage_trie = Trie::open(db.clone(), account.storage_root);
            for (slot_key, slot_value) in storage_trie.iter_entries()? {
                let value: U256 =
                    basalt_rlp::decode_exact(&slot_value).map_err(TrieError::Rlp)?;
                storage.push(StorageSlot {
                    key: B256::from_slice(&slot_key),
                    value,
                });
            }
        }

        let entry = AccountEntry {
            address_hash: B256::from_slice(&key),
            nonce: account.nonce,
            balance: account.balance,
            code,
            storage,
        };
        current_size += entry.length();
        current.push(entry);
        if current_size >= target_size {
            chunks.push(StateChunk {
                accounts: std::mem::take(&mut current),
            });
            current_size = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(StateChunk { accounts: current });
    }
    Ok(chunks)
}

/// Replays state chunks into `db`, rebuilding the account and storage tries,
/// and returns the resulting state root for the caller to verify.
pub fn restore_state_chunks<Db>(db: Db, chunks: &[StateChunk]) -> Result<B256, TrieError>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    let mut db = db;
    let mut state_trie = Trie::new(db.clone());
    for chunk in chunks {
        for entry in &chunk.accounts {
            let mut storage_trie = Trie::new(db.clone());
            for slot in &entry.storage {
                storage_trie.insert(slot.key.as_slice(), basalt_rlp::encode(&slot.value))?;
            }
            let storage_root = storage_trie.commit();

            let code_hash = if entry.code.is_empty() {
                KECCAK_EMPTY
            } else {
                let code_hash = keccak256(&entry.code);
                db.insert(code_hash, entry.code.clone());
                code_hash
            };

            let account = Account {
                nonce: entry.nonce,
                balance: entry.balance,
                storage_root,
                code_hash,
            };
            state_trie.insert(entry.address_hash.as_slice(), basalt_rlp::encode(&account))?;
        }
    }
    Ok(state_trie.commit())
}

/// The manifest identifying a complete snapshot: the state root and the
/// chunk ids, hashed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkManifest {
    /// State root the snapshot reproduces.
    pub state_root: B256,
    /// Block chunk ids, in order.
    pub block_chunks: Vec<B256>,
    /// State chunk ids, in order.
    pub state_chunks: Vec<B256>,
}

impl ChunkManifest {
    /// A digest over the whole manifest.
    pub fn manifest_hash(&self) -> B256 {
        let mut hasher = Keccak::v256();
        hasher.update(self.state_root.as_slice());
        for id in &self.block_chunks {
            hasher.update(id.as_slice());
        }
        for id in &self.state_chunks {
            hasher.update(id.as_slice());
        }
        let mut out = B256::ZERO;
        hasher.finalize(&mut out.0);
        out
    }
}
