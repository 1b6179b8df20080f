//! The transaction executor: signature recovery, validation, the top-level
//! call, gas settlement and the receipt.

use crate::error::{ExecutionError, TransactionError};
use basalt_evm::{
    create_address, gas, BlockEnv, CallParams, CallScheme, Evm, Substate,
};
use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    logs_bloom, Address, Bytes, ChainSpec, LogEntry, Receipt, ReceiptOutcome, SpecId, Transaction,
    B256, U256,
};
use basalt_state::State;

/// The result of executing one transaction.
#[derive(Debug, Clone)]
pub struct ExecutedTransaction {
    /// The receipt, with `cumulative_gas_used` already folded in.
    pub receipt: Receipt,
    /// Gas consumed by this transaction after the refund.
    pub gas_used: u64,
    /// The recovered sender.
    pub sender: Address,
    /// The deployed contract address for creations.
    pub contract_address: Option<Address>,
    /// Whether the top-level call succeeded.
    pub success: bool,
    /// Logs emitted by the transaction.
    pub logs: Vec<LogEntry>,
}

/// Validates and applies a transaction against the state.
///
/// `cumulative_gas` is the gas the block has consumed so far; it seeds the
/// receipt's running total. Typed rejections leave the state untouched.
pub fn execute_transaction<Db>(
    state: &mut State<Db>,
    chain: &ChainSpec,
    block: &BlockEnv,
    tx: &Transaction,
    cumulative_gas: u64,
) -> Result<ExecutedTransaction, ExecutionError>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    let spec = chain.spec_at(block.number);

    let sender = tx
        .recover_sender(
            chain.replay_protection(block.number),
            spec >= SpecId::Homestead,
        )
        .map_err(TransactionError::InvalidSignature)?;

    let sender_nonce = state.nonce(sender)?;
    if sender_nonce != tx.nonce {
        return Err(TransactionError::NonceMismatch {
            expected: sender_nonce,
            got: tx.nonce,
        }
        .into());
    }

    let balance = state.balance(sender)?;
    let upfront = U256::from(tx.gas_limit)
        .checked_mul(tx.gas_price)
        .and_then(|gas_cost| gas_cost.checked_add(tx.value));
    let Some(upfront) = upfront else {
        return Err(TransactionError::InsufficientBalance {
            need: U256::MAX,
            have: balance,
        }
        .into());
    };
    if balance < upfront {
        return Err(TransactionError::InsufficientBalance {
            need: upfront,
            have: balance,
        }
        .into());
    }
    let gas_cost = U256::from(tx.gas_limit) * tx.gas_price;

    let intrinsic = gas::intrinsic_gas(&tx.data, tx.is_create(), spec);
    if intrinsic > tx.gas_limit {
        return Err(TransactionError::IntrinsicGas {
            intrinsic,
            gas_limit: tx.gas_limit,
        }
        .into());
    }

    state.sub_balance(sender, gas_cost)?;
    state.increment_nonce(sender)?;
    state.mark_touched(sender);

    let available_gas = tx.gas_limit - intrinsic;
    let mut substate = Substate::default();
    let (outcome, contract_address) = {
        let mut evm = Evm::new(state, chain, block, sender, tx.gas_price);
        match tx.to {
            Some(to) => {
                let outcome = evm.call(
                    CallParams {
                        scheme: CallScheme::Call,
                        caller: sender,
                        address: to,
                        code_address: to,
                        gas: available_gas,
                        value: tx.value,
                        apparent_value: tx.value,
                        input: tx.data.clone(),
                        is_static: false,
                    },
                    &mut substate,
                )?;
                (outcome, None)
            }
            None => {
                // the sender nonce was bumped above; the address derives from
                // the pre-transaction nonce
                let address = create_address(&sender, tx.nonce);
                let outcome = evm.create(
                    sender,
                    address,
                    tx.value,
                    tx.data.clone(),
                    available_gas,
                    &mut substate,
                )?;
                (outcome, Some(address))
            }
        }
    };

    // refund at most half of what was consumed, then settle balances
    let consumed = tx.gas_limit - outcome.gas_left;
    let refund = (consumed / 2).min(substate.refund);
    let gas_used = consumed - refund;
    state.add_balance(sender, U256::from(outcome.gas_left + refund) * tx.gas_price)?;
    state.add_balance(block.beneficiary, U256::from(gas_used) * tx.gas_price)?;
    state.mark_touched(block.beneficiary);

    state.destroy_marked()?;
    if spec >= SpecId::SpuriousDragon {
        state.clear_touched_empty()?;
    } else {
        state.drop_touched();
    }

    let success = outcome.is_success();
    let receipt_outcome = if spec >= SpecId::Byzantium {
        ReceiptOutcome::Status(success)
    } else {
        ReceiptOutcome::StateRoot(state.root()?)
    };
    let receipt = Receipt {
        outcome: receipt_outcome,
        cumulative_gas_used: cumulative_gas + gas_used,
        logs_bloom: logs_bloom(&substate.logs),
        logs: substate.logs.clone(),
    };

    Ok(ExecutedTransaction {
        receipt,
        gas_used,
        sender,
        contract_address,
        success,
        logs: substate.logs,
    })
}
