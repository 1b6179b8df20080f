//! The account repository: a layered mutable view over the state trie.
//!
//! All account and storage mutations buffer in caches and flush into the trie
//! on demand. Snapshots capture the flushed state root (cheap, since the node
//! store is content-addressed and append-only) plus the pending touch and
//! destruction sets; reverting reopens the trie at the recorded root. Nested
//! failing calls revert their savepoint without disturbing committed state.

use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    keccak256, Account, Address, Bytes, B256, KECCAK_EMPTY, U256,
};
use basalt_trie::{Trie, TrieError};
use std::collections::{HashMap, HashSet};

/// State repository error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Underlying trie failure; a missing node means the store is corrupt.
    #[error(transparent)]
    Trie(#[from] TrieError),
    /// An account's code hash has no code in the store.
    #[error("missing code for hash {0}")]
    MissingCode(B256),
    /// A balance subtraction went below zero.
    #[error("balance underflow for {0}")]
    BalanceUnderflow(Address),
    /// A balance addition overflowed 256 bits.
    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),
    /// An unknown or already-discarded snapshot handle.
    #[error("invalid snapshot handle {0}")]
    InvalidSnapshot(usize),
}

/// A savepoint: the state root plus the pending per-transaction sets at the
/// time it was taken.
#[derive(Debug, Clone)]
struct Snapshot {
    root: B256,
    touched: HashSet<Address>,
    destructed: HashSet<Address>,
}

/// The world state at some root, with buffered mutations.
#[derive(Debug)]
pub struct State<Db> {
    db: Db,
    trie: Trie<Db>,
    accounts: HashMap<Address, Option<Account>>,
    dirty: HashSet<Address>,
    storage: HashMap<Address, Trie<Db>>,
    touched: HashSet<Address>,
    destructed: HashSet<Address>,
    snapshots: Vec<Snapshot>,
}

impl<Db> State<Db>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    /// An empty world state over `db`.
    pub fn new(db: Db) -> Self {
        Self {
            trie: Trie::new(db.clone()),
            db,
            accounts: HashMap::new(),
            dirty: HashSet::new(),
            storage: HashMap::new(),
            touched: HashSet::new(),
            destructed: HashSet::new(),
            snapshots: Vec::new(),
        }
    }

    /// Opens the world state committed at `root`.
    pub fn open(db: Db, root: B256) -> Self {
        Self {
            trie: Trie::open(db.clone(), root),
            db,
            accounts: HashMap::new(),
            dirty: HashSet::new(),
            storage: HashMap::new(),
            touched: HashSet::new(),
            destructed: HashSet::new(),
            snapshots: Vec::new(),
        }
    }

    /// The account at `address`, if it exists.
    pub fn account(&mut self, address: Address) -> Result<Option<Account>, StateError> {
        if let Some(cached) = self.accounts.get(&address) {
            return Ok(cached.clone());
        }
        let loaded = match self.trie.get(keccak256(address).as_slice())? {
            Some(bytes) => Some(
                basalt_rlp::decode_exact::<Account>(&bytes).map_err(TrieError::Rlp)?,
            ),
            None => None,
        };
        self.accounts.insert(address, loaded.clone());
        Ok(loaded)
    }

    /// True if an account record exists at `address`.
    pub fn exists(&mut self, address: Address) -> Result<bool, StateError> {
        Ok(self.account(address)?.is_some())
    }

    /// True if the account is dead in the EIP-161 sense: absent or empty.
    pub fn is_dead(&mut self, address: Address) -> Result<bool, StateError> {
        Ok(self
            .account(address)?
            .map_or(true, |account| account.is_empty()))
    }

    /// Writes an account record.
    pub fn put_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, Some(account));
        self.dirty.insert(address);
    }

    /// Creates an empty account record if none exists. Pre-EIP-161 calls
    /// instantiate their destination unconditionally.
    pub fn create_if_absent(&mut self, address: Address) -> Result<(), StateError> {
        if self.account(address)?.is_none() {
            self.put_account(address, Account::default());
        }
        Ok(())
    }

    /// Credits `amount` wei to the account, creating it if needed. Zero-value
    /// credits to absent accounts do not create a record.
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let existing = self.account(address)?;
        if amount.is_zero() && existing.is_none() {
            return Ok(());
        }
        let mut account = existing.unwrap_or_default();
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(StateError::BalanceOverflow(address))?;
        self.put_account(address, account);
        Ok(())
    }

    /// Debits `amount` wei from the account. A zero debit of an absent
    /// account is a no-op rather than an underflow.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let existing = self.account(address)?;
        if amount.is_zero() && existing.is_none() {
            return Ok(());
        }
        let mut account = existing.ok_or(StateError::BalanceUnderflow(address))?;
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or(StateError::BalanceUnderflow(address))?;
        self.put_account(address, account);
        Ok(())
    }

    /// Moves `amount` wei between accounts and touches both.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), StateError> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount)?;
        self.mark_touched(from);
        self.mark_touched(to);
        Ok(())
    }

    /// The balance at `address`, zero for absent accounts.
    pub fn balance(&mut self, address: Address) -> Result<U256, StateError> {
        Ok(self
            .account(address)?
            .map_or(U256::ZERO, |account| account.balance))
    }

    /// The nonce at `address`, zero for absent accounts.
    pub fn nonce(&mut self, address: Address) -> Result<u64, StateError> {
        Ok(self.account(address)?.map_or(0, |account| account.nonce))
    }

    /// Bumps the account nonce, creating the record if needed.
    pub fn increment_nonce(&mut self, address: Address) -> Result<(), StateError> {
        let mut account = self.account(address)?.unwrap_or_default();
        account.nonce += 1;
        self.put_account(address, account);
        Ok(())
    }

    /// Stores `code` under its hash and points the account at it.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = keccak256(&code);
        self.db.insert(code_hash, code);
        let mut account = self.account(address)?.unwrap_or_default();
        account.code_hash = code_hash;
        self.put_account(address, account);
        Ok(())
    }

    /// The code at `address`, empty for absent or code-less accounts.
    pub fn code(&mut self, address: Address) -> Result<Bytes, StateError> {
        let Some(account) = self.account(address)? else {
            return Ok(Bytes::new());
        };
        self.code_by_hash(account.code_hash)
    }

    /// The code stored under `code_hash`.
    pub fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, StateError> {
        if code_hash == KECCAK_EMPTY {
            return Ok(Bytes::new());
        }
        self.db
            .get(&code_hash)
            .map(|code| code.into_owned())
            .ok_or(StateError::MissingCode(code_hash))
    }

    /// Reads a storage slot; absent slots are zero.
    pub fn storage_get(&mut self, address: Address, key: U256) -> Result<U256, StateError> {
        let trie = self.storage_trie(address)?;
        match trie.get(keccak256(key.to_be_bytes::<32>()).as_slice())? {
            Some(bytes) => Ok(basalt_rlp::decode_exact::<U256>(&bytes)
                .map_err(TrieError::Rlp)?),
            None => Ok(U256::ZERO),
        }
    }

    /// Writes a storage slot; zero values delete the key.
    pub fn storage_put(
        &mut self,
        address: Address,
        key: U256,
        value: U256,
    ) -> Result<(), StateError> {
        let trie = self.storage_trie(address)?;
        let hashed_key = keccak256(key.to_be_bytes::<32>());
        if value.is_zero() {
            trie.remove(hashed_key.as_slice())?;
        } else {
            trie.insert(hashed_key.as_slice(), basalt_rlp::encode(&value))?;
        }
        // the account record itself changes when the storage root does
        let account = self.account(address)?.unwrap_or_default();
        self.put_account(address, account);
        Ok(())
    }

    fn storage_trie(&mut self, address: Address) -> Result<&mut Trie<Db>, StateError> {
        if !self.storage.contains_key(&address) {
            let root = self
                .account(address)?
                .map(|account| account.storage_root)
                .unwrap_or(basalt_primitives::EMPTY_ROOT_HASH);
            self.storage
                .insert(address, Trie::open(self.db.clone(), root));
        }
        Ok(self.storage.get_mut(&address).expect("inserted above"))
    }

    /// Records a touch for EIP-161 cleanup.
    pub fn mark_touched(&mut self, address: Address) {
        self.touched.insert(address);
    }

    /// Adds the account to the destruction list. Returns true if it was not
    /// already marked (the `SELFDESTRUCT` refund is paid once).
    pub fn mark_for_destruction(&mut self, address: Address) -> bool {
        self.destructed.insert(address)
    }

    /// True if the account is on the destruction list.
    pub fn destruction_marked(&self, address: Address) -> bool {
        self.destructed.contains(&address)
    }

    /// Takes a savepoint and returns its handle.
    pub fn snapshot(&mut self) -> Result<usize, StateError> {
        let root = self.flush()?;
        self.snapshots.push(Snapshot {
            root,
            touched: self.touched.clone(),
            destructed: self.destructed.clone(),
        });
        Ok(self.snapshots.len() - 1)
    }

    /// Discards every change made since the snapshot.
    pub fn revert(&mut self, handle: usize) -> Result<(), StateError> {
        if handle >= self.snapshots.len() {
            return Err(StateError::InvalidSnapshot(handle));
        }
        let snapshot = self.snapshots.swap_remove(handle);
        self.snapshots.truncate(handle);
        self.trie = Trie::open(self.db.clone(), snapshot.root);
        self.accounts.clear();
        self.dirty.clear();
        self.storage.clear();
        self.touched = snapshot.touched;
        self.destructed = snapshot.destructed;
        Ok(())
    }

    /// Merges everything since the snapshot down one level: the buffered
    /// changes stay, the savepoint record is dropped.
    pub fn commit(&mut self, handle: usize) -> Result<(), StateError> {
        if handle >= self.snapshots.len() {
            return Err(StateError::InvalidSnapshot(handle));
        }
        self.snapshots.truncate(handle);
        Ok(())
    }

    /// Deletes every account on the destruction list and clears it.
    pub fn destroy_marked(&mut self) -> Result<(), StateError> {
        for address in std::mem::take(&mut self.destructed) {
            self.accounts.insert(address, None);
            self.dirty.insert(address);
            self.storage.remove(&address);
        }
        Ok(())
    }

    /// Deletes touched accounts that ended the transaction empty (EIP-161)
    /// and clears the touch set.
    pub fn clear_touched_empty(&mut self) -> Result<(), StateError> {
        for address in std::mem::take(&mut self.touched) {
            if self.account(address)?.is_some_and(|account| account.is_empty()) {
                self.accounts.insert(address, None);
                self.dirty.insert(address);
                self.storage.remove(&address);
            }
        }
        Ok(())
    }

    /// Drains the touch set without cleanup, for forks before EIP-161.
    pub fn drop_touched(&mut self) {
        self.touched.clear();
    }

    /// Flushes buffered account and storage writes into the trie and returns
    /// the resulting state root. Nodes are persisted to the store.
    pub fn flush(&mut self) -> Result<B256, StateError> {
        for address in std::mem::take(&mut self.dirty) {
            let key = keccak256(address);
            match self.accounts.get(&address).cloned() {
                Some(Some(mut account)) => {
                    if let Some(storage) = self.storage.get_mut(&address) {
                        account.storage_root = storage.commit();
                    }
                    self.trie
                        .insert(key.as_slice(), basalt_rlp::encode(&account))?;
                    self.accounts.insert(address, Some(account));
                }
                Some(None) => {
                    self.trie.remove(key.as_slice())?;
                }
                None => {}
            }
        }
        Ok(self.trie.commit())
    }

    /// Flushes and returns the state root; the canonical way to close out a
    /// transaction or block.
    pub fn root(&mut self) -> Result<B256, StateError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::{HashMap as KvMap, Shared};
    use basalt_primitives::EMPTY_ROOT_HASH;

    type MemState = State<Shared<KvMap<B256, Bytes>>>;

    fn mem_state() -> MemState {
        State::new(Shared::new(KvMap::default()))
    }

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn empty_state_root() {
        let mut state = mem_state();
        assert_eq!(state.root().unwrap(), EMPTY_ROOT_HASH);
    }

    #[test]
    fn balance_bookkeeping() {
        let mut state = mem_state();
        state.add_balance(addr(1), U256::from(100)).unwrap();
        state.transfer(addr(1), addr(2), U256::from(40)).unwrap();
        assert_eq!(state.balance(addr(1)).unwrap(), U256::from(60));
        assert_eq!(state.balance(addr(2)).unwrap(), U256::from(40));
        assert_eq!(
            state.sub_balance(addr(2), U256::from(41)).unwrap_err(),
            StateError::BalanceUnderflow(addr(2))
        );
    }

    #[test]
    fn zero_credit_does_not_create() {
        let mut state = mem_state();
        state.add_balance(addr(1), U256::ZERO).unwrap();
        assert!(!state.exists(addr(1)).unwrap());
        state.create_if_absent(addr(1)).unwrap();
        assert!(state.exists(addr(1)).unwrap());
        assert!(state.is_dead(addr(1)).unwrap());
    }

    #[test]
    fn storage_roundtrip_and_zero_deletion() {
        let mut state = mem_state();
        let slot = U256::from(1);
        state.add_balance(addr(7), U256::from(1)).unwrap();
        state.storage_put(addr(7), slot, U256::from(2)).unwrap();
        assert_eq!(state.storage_get(addr(7), slot).unwrap(), U256::from(2));
        let root_with_storage = state.root().unwrap();

        state.storage_put(addr(7), slot, U256::ZERO).unwrap();
        assert_eq!(state.storage_get(addr(7), slot).unwrap(), U256::ZERO);
        let root_without_storage = state.root().unwrap();
        assert_ne!(root_with_storage, root_without_storage);

        // zeroing the only slot restores the empty storage root
        let account = state.account(addr(7)).unwrap().unwrap();
        assert_eq!(account.storage_root, EMPTY_ROOT_HASH);
    }

    #[test]
    fn code_storage() {
        let mut state = mem_state();
        let code = Bytes::from_static(&[0x60, 0x00]);
        state.set_code(addr(3), code.clone()).unwrap();
        assert_eq!(state.code(addr(3)).unwrap(), code);
        assert_eq!(
            state.account(addr(3)).unwrap().unwrap().code_hash,
            keccak256(&code)
        );
        // absent accounts read as empty code
        assert_eq!(state.code(addr(4)).unwrap(), Bytes::new());
    }

    #[test]
    fn snapshot_revert_restores_root_and_sets() {
        let mut state = mem_state();
        state.add_balance(addr(1), U256::from(10)).unwrap();
        let before = state.snapshot().unwrap();
        let root_before = state.root().unwrap();

        state.add_balance(addr(2), U256::from(5)).unwrap();
        state.storage_put(addr(1), U256::from(0), U256::from(9)).unwrap();
        state.mark_touched(addr(2));
        state.mark_for_destruction(addr(1));

        state.revert(before).unwrap();
        assert_eq!(state.root().unwrap(), root_before);
        assert!(!state.exists(addr(2)).unwrap());
        assert_eq!(state.storage_get(addr(1), U256::ZERO).unwrap(), U256::ZERO);
        assert!(!state.destruction_marked(addr(1)));
    }

    #[test]
    fn snapshot_commit_keeps_changes() {
        let mut state = mem_state();
        let handle = state.snapshot().unwrap();
        state.add_balance(addr(1), U256::from(10)).unwrap();
        state.commit(handle).unwrap();
        assert_eq!(state.balance(addr(1)).unwrap(), U256::from(10));
        assert_eq!(
            state.revert(handle).unwrap_err(),
            StateError::InvalidSnapshot(handle)
        );
    }

    #[test]
    fn nested_snapshots() {
        let mut state = mem_state();
        state.add_balance(addr(1), U256::from(1)).unwrap();
        let outer = state.snapshot().unwrap();
        state.add_balance(addr(1), U256::from(1)).unwrap();
        let inner = state.snapshot().unwrap();
        state.add_balance(addr(1), U256::from(1)).unwrap();

        state.revert(inner).unwrap();
        assert_eq!(state.balance(addr(1)).unwrap(), U256::from(2));
        state.revert(outer).unwrap();
        assert_eq!(state.balance(addr(1)).unwrap(), U256::from(1));
    }

    #[test]
    fn destruction_and_eip161_cleanup() {
        let mut state = mem_state();
        state.add_balance(addr(1), U256::from(5)).unwrap();
        state.mark_for_destruction(addr(1));
        assert!(!state.mark_for_destruction(addr(1)));
        state.destroy_marked().unwrap();
        assert!(!state.exists(addr(1)).unwrap());

        state.create_if_absent(addr(2)).unwrap();
        state.mark_touched(addr(2));
        state.clear_touched_empty().unwrap();
        assert!(!state.exists(addr(2)).unwrap());

        // non-empty touched accounts survive
        state.add_balance(addr(3), U256::from(1)).unwrap();
        state.mark_touched(addr(3));
        state.clear_touched_empty().unwrap();
        assert!(state.exists(addr(3)).unwrap());
    }

    #[test]
    fn reopen_at_committed_root() {
        let db = Shared::new(KvMap::default());
        let root = {
            let mut state = State::new(db.clone());
            state.add_balance(addr(9), U256::from(1234)).unwrap();
            state
                .storage_put(addr(9), U256::from(1), U256::from(2))
                .unwrap();
            state.root().unwrap()
        };

        let mut reopened = State::open(db, root);
        assert_eq!(reopened.balance(addr(9)).unwrap(), U256::from(1234));
        assert_eq!(
            reopened.storage_get(addr(9), U256::from(1)).unwrap(),
            U256::from(2)
        );
    }
}
