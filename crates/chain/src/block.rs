//! The block processor: per-transaction execution, rewards and ommers, and
//! the root checks against the header.

use crate::error::{BlockError, ExecutionError, TransactionError};
use crate::executor::execute_transaction;
use basalt_evm::BlockEnv;
use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    logs_bloom, Block, BlockHeader, Bloom, Bytes, ChainSpec, Receipt, B256, U256,
};
use basalt_state::State;
use basalt_trie::ordered_trie_root;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Ommers may reach at most this many generations above the including block.
pub const MAX_OMMER_DEPTH: u64 = 6;

/// Per-block cap on included ommers.
pub const MAX_OMMER_COUNT: usize = 2;

/// The output of processing a block's body.
#[derive(Debug, Clone)]
pub struct ProcessedBlock {
    /// One receipt per transaction, in order.
    pub receipts: Vec<Receipt>,
    /// Total gas consumed.
    pub gas_used: u64,
    /// The post-state root.
    pub state_root: B256,
}

/// Executes every transaction in order against the parent's post-state, then
/// credits block and ommer rewards. Header agreement is checked separately by
/// [`apply_block`].
pub fn process_block<Db>(
    state: &mut State<Db>,
    chain: &ChainSpec,
    block: &Block,
    block_hashes: BTreeMap<u64, B256>,
) -> Result<ProcessedBlock, BlockError>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    let header = &block.header;
    let env = BlockEnv {
        beneficiary: header.beneficiary,
        number: header.number,
        timestamp: header.timestamp,
        difficulty: header.difficulty,
        gas_limit: header.gas_limit,
        block_hashes,
    };

    let mut receipts = Vec::with_capacity(block.transactions.len());
    let mut cumulative_gas = 0u64;
    for (index, tx) in block.transactions.iter().enumerate() {
        let available = header.gas_limit - cumulative_gas;
        if tx.gas_limit > available {
            return Err(BlockError::Transaction {
                index,
                source: TransactionError::BlockGasExceeded {
                    gas_limit: tx.gas_limit,
                    available,
                },
            });
        }
        let executed = execute_transaction(state, chain, &env, tx, cumulative_gas)
            .map_err(|error| match error {
                ExecutionError::Invalid(source) => BlockError::Transaction { index, source },
                ExecutionError::State(state) => BlockError::State(state),
            })?;
        cumulative_gas += executed.gas_used;
        receipts.push(executed.receipt);
    }

    apply_rewards(state, chain, header, &block.ommers)?;

    let state_root = state.root().map_err(BlockError::State)?;
    Ok(ProcessedBlock {
        receipts,
        gas_used: cumulative_gas,
        state_root,
    })
}

/// Credits the block reward plus per-ommer bonuses to the beneficiary, and
/// the depth-scaled reward to each ommer's beneficiary.
pub fn apply_rewards<Db>(
    state: &mut State<Db>,
    chain: &ChainSpec,
    header: &BlockHeader,
    ommers: &[BlockHeader],
) -> Result<(), BlockError>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    let base = chain.block_reward(header.number);
    let beneficiary_reward =
        base + (base >> 5) * U256::from(ommers.len() as u64);
    state.add_balance(header.beneficiary, beneficiary_reward)?;

    for ommer in ommers {
        let depth = header.number - ommer.number;
        let ommer_reward = base * U256::from(8 - depth) / U256::from(8u64);
        state.add_balance(ommer.beneficiary, ommer_reward)?;
    }
    Ok(())
}

fn validate_ommers(block: &Block) -> Result<(), BlockError> {
    if block.ommers.len() > MAX_OMMER_COUNT {
        return Err(BlockError::InvalidOmmer("too many ommers"));
    }
    for ommer in &block.ommers {
        if ommer.number >= block.header.number {
            return Err(BlockError::InvalidOmmer("ommer not an ancestor sibling"));
        }
        let depth = block.header.number - ommer.number;
        if depth > MAX_OMMER_DEPTH {
            return Err(BlockError::InvalidOmmer("ommer too deep"));
        }
    }
    if block.ommers_hash() != block.header.ommers_hash {
        return Err(BlockError::OmmersHashMismatch);
    }
    Ok(())
}

/// Processes a block and verifies every header commitment: ommers hash,
/// transactions root, receipts root, gas used, logs bloom and the post-state
/// root. A mismatch rejects the block without poisoning committed state.
pub fn apply_block<Db>(
    state: &mut State<Db>,
    chain: &ChainSpec,
    block: &Block,
    block_hashes: BTreeMap<u64, B256>,
) -> Result<ProcessedBlock, BlockError>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    validate_ommers(block)?;

    let transactions_root = ordered_trie_root(&block.transactions);
    if transactions_root != block.header.transactions_root {
        return Err(BlockError::TransactionsRootMismatch {
            expected: block.header.transactions_root,
            actual: transactions_root,
        });
    }

    let processed = process_block(state, chain, block, block_hashes)?;

    if processed.gas_used != block.header.gas_used {
        return Err(BlockError::GasUsedMismatch {
            expected: block.header.gas_used,
            actual: processed.gas_used,
        });
    }

    let receipts_root = ordered_trie_root(&processed.receipts);
    if receipts_root != block.header.receipts_root {
        return Err(BlockError::ReceiptsRootMismatch {
            expected: block.header.receipts_root,
            actual: receipts_root,
        });
    }

    let mut bloom = Bloom::ZERO;
    for (receipt, _) in processed.receipts.iter().zip_eq(&block.transactions) {
        bloom |= logs_bloom(&receipt.logs);
    }
    if bloom != block.header.logs_bloom {
        return Err(BlockError::LogsBloomMismatch);
    }

    if processed.state_root != block.header.state_root {
        return Err(BlockError::StateRootMismatch {
            expected: block.header.state_root,
            actual: processed.state_root,
        });
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::{HashMap as KvMap, Shared};
    use basalt_primitives::Address;

    type Db = Shared<KvMap<B256, Bytes>>;

    fn new_state() -> State<Db> {
        State::new(Shared::new(KvMap::default()))
    }

    #[test]
    fn rewards_pre_and_post_byzantium() {
        let ether = U256::from(1_000_000_000_000_000_000u64);
        let beneficiary = Address::repeat_byte(0x01);

        let mut state = new_state();
        let header = BlockHeader {
            number: 100,
            beneficiary,
            ..Default::default()
        };
        apply_rewards(&mut state, &ChainSpec::frontier(1), &header, &[]).unwrap();
        assert_eq!(state.balance(beneficiary).unwrap(), U256::from(5) * ether);

        let mut state = new_state();
        apply_rewards(&mut state, &ChainSpec::dev(1), &header, &[]).unwrap();
        assert_eq!(state.balance(beneficiary).unwrap(), U256::from(3) * ether);
    }

    #[test]
    fn ommer_rewards_scale_with_depth() {
        let ether = U256::from(1_000_000_000_000_000_000u64);
        let beneficiary = Address::repeat_byte(0x01);
        let ommer_miner = Address::repeat_byte(0x02);

        let mut state = new_state();
        let header = BlockHeader {
            number: 10,
            beneficiary,
            ..Default::default()
        };
        let ommer = BlockHeader {
            number: 8,
            beneficiary: ommer_miner,
            ..Default::default()
        };
        apply_rewards(&mut state, &ChainSpec::frontier(1), &header, &[ommer]).unwrap();

        let base = U256::from(5) * ether;
        // one ommer: base + base/32 to the beneficiary
        assert_eq!(
            state.balance(beneficiary).unwrap(),
            base + base / U256::from(32u64)
        );
        // depth 2: (8 - 2)/8 of the base to the ommer miner
        assert_eq!(
            state.balance(ommer_miner).unwrap(),
            base * U256::from(6u64) / U256::from(8u64)
        );
    }

    #[test]
    fn ommer_validity_limits() {
        let mut block = Block {
            header: BlockHeader {
                number: 10,
                ..Default::default()
            },
            transactions: vec![],
            ommers: vec![BlockHeader {
                number: 3,
                ..Default::default()
            }],
        };
        block.header.ommers_hash = block.ommers_hash();
        assert_eq!(
            validate_ommers(&block),
            Err(BlockError::InvalidOmmer("ommer too deep"))
        );

        block.ommers[0].number = 9;
        block.header.ommers_hash = block.ommers_hash();
        assert_eq!(validate_ommers(&block), Ok(()));

        block.header.ommers_hash = B256::ZERO;
        assert_eq!(validate_ommers(&block), Err(BlockError::OmmersHashMismatch));
    }
}
