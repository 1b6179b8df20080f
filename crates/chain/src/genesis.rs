//! Genesis configuration and the genesis block.
//!
//! The configuration is the geth-style JSON shape: a `config` object with
//! the chain id and fork heights, the genesis header fields, and an `alloc`
//! map of pre-funded accounts.

use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    Address, Block, BlockHeader, Bytes, ChainSpec, SpecId, B256, B64, U256,
};
use basalt_state::{State, StateError};
use basalt_trie::ordered_trie_root;
use serde::Deserialize;
use std::collections::HashMap;

/// A geth-style genesis file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConfig {
    /// Chain id and fork schedule.
    pub config: GenesisChainConfig,
    /// Proof-of-work nonce of the genesis header.
    #[serde(default)]
    pub nonce: B64,
    /// Genesis timestamp.
    #[serde(default)]
    pub timestamp: U256,
    /// Genesis extra data.
    #[serde(default)]
    pub extra_data: Bytes,
    /// Genesis gas limit.
    pub gas_limit: U256,
    /// Genesis difficulty.
    pub difficulty: U256,
    /// Genesis mix hash.
    #[serde(default)]
    pub mix_hash: B256,
    /// Genesis beneficiary.
    #[serde(default)]
    pub coinbase: Address,
    /// Pre-funded accounts.
    #[serde(default)]
    pub alloc: HashMap<Address, AllocAccount>,
}

/// The `config` object: chain id plus fork activation heights.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisChainConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Homestead activation height.
    #[serde(default)]
    pub homestead_block: Option<u64>,
    /// EIP-150 activation height.
    #[serde(default)]
    pub eip150_block: Option<u64>,
    /// EIP-155 activation height (paired with EIP-158/160 as Spurious
    /// Dragon).
    #[serde(default)]
    pub eip155_block: Option<u64>,
    /// EIP-158 activation height.
    #[serde(default)]
    pub eip158_block: Option<u64>,
    /// Byzantium activation height.
    #[serde(default)]
    pub byzantium_block: Option<u64>,
}

/// One pre-funded account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocAccount {
    /// Initial balance in wei.
    #[serde(default)]
    pub balance: U256,
    /// Initial nonce.
    #[serde(default)]
    pub nonce: U256,
    /// Contract code.
    #[serde(default)]
    pub code: Bytes,
    /// Contract storage.
    #[serde(default)]
    pub storage: HashMap<U256, U256>,
}

impl GenesisConfig {
    /// Parses a genesis JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// A single-account development chain with every fork active from
    /// genesis.
    pub fn dev(chain_id: u64, rich: Address) -> Self {
        let mut alloc = HashMap::new();
        alloc.insert(
            rich,
            AllocAccount {
                balance: U256::from(10u64).pow(U256::from(24u64)),
                ..Default::default()
            },
        );
        Self {
            config: GenesisChainConfig {
                chain_id,
                homestead_block: Some(0),
                eip150_block: Some(0),
                eip155_block: Some(0),
                eip158_block: Some(0),
                byzantium_block: Some(0),
            },
            nonce: B64::ZERO,
            timestamp: U256::ZERO,
            extra_data: Bytes::new(),
            gas_limit: U256::from(8_000_000u64),
            difficulty: U256::from(131_072u64),
            mix_hash: B256::ZERO,
            coinbase: Address::ZERO,
            alloc,
        }
    }

    /// The chain spec this genesis declares.
    pub fn chain_spec(&self) -> ChainSpec {
        let mut spec = ChainSpec::frontier(self.config.chain_id);
        for (fork, height) in [
            (SpecId::Homestead, self.config.homestead_block),
            (SpecId::TangerineWhistle, self.config.eip150_block),
            (SpecId::SpuriousDragon, self.config.eip158_block.or(self.config.eip155_block)),
            (SpecId::Byzantium, self.config.byzantium_block),
        ] {
            if let Some(height) = height {
                spec.set_height(fork, height);
            }
        }
        spec
    }

    /// Writes the allocation into `state` and returns the genesis block with
    /// the computed state root.
    pub fn commit<Db>(&self, state: &mut State<Db>) -> Result<Block, StateError>
    where
        Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
    {
        for (address, account) in &self.alloc {
            state.add_balance(*address, account.balance)?;
            for _ in 0..account.nonce.to::<u64>() {
                state.increment_nonce(*address)?;
            }
            if !account.code.is_empty() {
                state.set_code(*address, account.code.clone())?;
            }
            for (slot, value) in &account.storage {
                state.storage_put(*address, *slot, *value)?;
            }
        }
        let state_root = state.root()?;

        let header = BlockHeader {
            state_root,
            transactions_root: ordered_trie_root::<Bytes>(&[]),
            receipts_root: ordered_trie_root::<Bytes>(&[]),
            difficulty: self.difficulty,
            number: 0,
            gas_limit: self.gas_limit.to::<u64>(),
            timestamp: self.timestamp.to::<u64>(),
            extra_data: self.extra_data.clone(),
            mix_hash: self.mix_hash,
            nonce: self.nonce,
            beneficiary: self.coinbase,
            ..Default::default()
        };
        Ok(Block {
            header,
            transactions: Vec::new(),
            ommers: Vec::new(),
        })
    }
}
