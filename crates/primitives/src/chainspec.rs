//! Per-chain fork schedule and protocol constants.

use crate::{ChainId, U256};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Hard forks in activation order. Variants past Byzantium are extension
/// points: they can be scheduled but carry no behavior changes yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecId {
    /// The launch protocol.
    Frontier,
    /// EIP-2 (intrinsic creation cost, low-s, creation out-of-gas semantics)
    /// and EIP-7 (`DELEGATECALL`).
    Homestead,
    /// EIP-150 gas repricing and the 63/64 forwarding rule.
    TangerineWhistle,
    /// EIP-155 replay protection, EIP-160 `EXP` repricing, EIP-161 state
    /// clearing, EIP-170 code size limit.
    SpuriousDragon,
    /// EIP-211/214/658 opcodes, new precompiles, status receipts, reward and
    /// difficulty changes.
    Byzantium,
    /// Scheduled-only extension point.
    Constantinople,
    /// Scheduled-only extension point.
    Istanbul,
}

impl SpecId {
    /// Every spec, newest first, for descending activation scans.
    pub const ALL: [SpecId; 7] = [
        SpecId::Istanbul,
        SpecId::Constantinople,
        SpecId::Byzantium,
        SpecId::SpuriousDragon,
        SpecId::TangerineWhistle,
        SpecId::Homestead,
        SpecId::Frontier,
    ];
}

/// Wei per ether.
pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

static MAINNET_HEIGHTS: LazyLock<HashMap<SpecId, u64>> = LazyLock::new(|| {
    HashMap::from([
        (SpecId::Frontier, 0),
        (SpecId::Homestead, 1_150_000),
        (SpecId::TangerineWhistle, 2_463_000),
        (SpecId::SpuriousDragon, 2_675_000),
        (SpecId::Byzantium, 4_370_000),
    ])
});

/// Chain configuration: fork heights plus the block-level protocol constants.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    /// EIP-155 chain id.
    pub chain_id: ChainId,
    /// Smallest allowed difficulty.
    pub min_difficulty: U256,
    /// Divisor of the parent difficulty in each adjustment step.
    pub difficulty_bound_divisor: U256,
    /// Divisor bounding per-block gas limit drift.
    pub gas_limit_bound_divisor: u64,
    /// Smallest allowed gas limit.
    pub min_gas_limit: u64,
    heights: HashMap<SpecId, u64>,
}

impl ChainSpec {
    /// The Ethereum mainnet schedule, Frontier through Byzantium.
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            min_difficulty: U256::from(131_072u64),
            difficulty_bound_divisor: U256::from(2048u64),
            gas_limit_bound_divisor: 1024,
            min_gas_limit: 5000,
            heights: MAINNET_HEIGHTS.clone(),
        }
    }

    /// A development chain with every implemented fork active from genesis.
    pub fn dev(chain_id: ChainId) -> Self {
        let mut spec = Self::frontier(chain_id);
        for fork in [
            SpecId::Homestead,
            SpecId::TangerineWhistle,
            SpecId::SpuriousDragon,
            SpecId::Byzantium,
        ] {
            spec.set_height(fork, 0);
        }
        spec
    }

    /// A chain that stays on the launch protocol until forks are scheduled
    /// with [`set_height`](Self::set_height).
    pub fn frontier(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            min_difficulty: U256::from(131_072u64),
            difficulty_bound_divisor: U256::from(2048u64),
            gas_limit_bound_divisor: 1024,
            min_gas_limit: 5000,
            heights: HashMap::from([(SpecId::Frontier, 0)]),
        }
    }

    /// Schedule (or reschedule) a fork at the given height.
    pub fn set_height(&mut self, spec_id: SpecId, block: u64) -> &mut Self {
        self.heights.insert(spec_id, block);
        self
    }

    /// The activation height of a fork, if scheduled.
    pub fn get_height(&self, spec_id: SpecId) -> Option<u64> {
        self.heights.get(&spec_id).copied()
    }

    /// The newest fork active at a block number.
    pub fn spec_at(&self, block_number: u64) -> SpecId {
        for spec_id in SpecId::ALL {
            if let Some(height) = self.get_height(spec_id) {
                if block_number >= height {
                    return spec_id;
                }
            }
        }
        SpecId::Frontier
    }

    /// True if `spec_id` (or a later fork) is active at the block number.
    pub fn is_enabled(&self, spec_id: SpecId, block_number: u64) -> bool {
        self.spec_at(block_number) >= spec_id
    }

    /// The base block reward at a height: 5 ether before Byzantium, 3 after.
    pub fn block_reward(&self, block_number: u64) -> U256 {
        if self.is_enabled(SpecId::Byzantium, block_number) {
            U256::from(3) * U256::from(WEI_PER_ETHER)
        } else {
            U256::from(5) * U256::from(WEI_PER_ETHER)
        }
    }

    /// The chain id signatures must commit to at this height, once EIP-155
    /// replay protection is active.
    pub fn replay_protection(&self, block_number: u64) -> Option<ChainId> {
        self.is_enabled(SpecId::SpuriousDragon, block_number)
            .then_some(self.chain_id)
    }
}
