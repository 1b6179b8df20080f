//! Header validation against the parent, including the difficulty formula.

use crate::error::HeaderError;
use basalt_primitives::{BlockHeader, ChainSpec, SpecId, U256};

/// Blocks the difficulty bomb is delayed by under EIP-649.
const BYZANTIUM_BOMB_DELAY: u64 = 3_000_000;

/// Accepts a header iff the §4.8 rules hold against its parent.
pub fn validate_header(
    chain: &ChainSpec,
    parent: &BlockHeader,
    header: &BlockHeader,
    has_ommers: bool,
) -> Result<(), HeaderError> {
    if header.extra_data.len() > 32 {
        return Err(HeaderError::ExtraDataTooLong);
    }
    if header.number != parent.number + 1 {
        return Err(HeaderError::NonSequentialNumber {
            expected: parent.number + 1,
            got: header.number,
        });
    }
    if header.timestamp <= parent.timestamp {
        return Err(HeaderError::TimestampNotAfterParent);
    }

    let bound = parent.gas_limit / chain.gas_limit_bound_divisor;
    if header.gas_limit < chain.min_gas_limit
        || header.gas_limit >= parent.gas_limit + bound
        || header.gas_limit + bound <= parent.gas_limit
    {
        return Err(HeaderError::GasLimitOutOfBounds(header.gas_limit));
    }

    if header.gas_used > header.gas_limit {
        return Err(HeaderError::GasUsedExceedsLimit {
            used: header.gas_used,
            limit: header.gas_limit,
        });
    }

    let expected = calc_difficulty(chain, parent, header.timestamp, header.number, has_ommers);
    if header.difficulty != expected {
        return Err(HeaderError::DifficultyMismatch {
            expected,
            got: header.difficulty,
        });
    }

    Ok(())
}

/// The canonical difficulty of a block with the given parent.
///
/// Frontier steps by ±1 adjustment depending on whether the block arrived
/// within 13 seconds; Homestead scales by `max(1 − ⌊Δt/10⌋, −99)`; Byzantium
/// scales by `max((2 if ommers else 1) − ⌊Δt/9⌋, −99)` and delays the
/// exponential bomb by three million blocks. The result is floored at the
/// chain's minimum difficulty.
pub fn calc_difficulty(
    chain: &ChainSpec,
    parent: &BlockHeader,
    timestamp: u64,
    number: u64,
    has_ommers: bool,
) -> U256 {
    let spec = chain.spec_at(number);
    let adjustment = parent.difficulty / chain.difficulty_bound_divisor;
    let elapsed = timestamp.saturating_sub(parent.timestamp);

    let mut difficulty = if spec >= SpecId::Homestead {
        let numerator = if spec >= SpecId::Byzantium {
            let base: i64 = if has_ommers { 2 } else { 1 };
            (base - (elapsed / 9) as i64).max(-99)
        } else {
            (1 - (elapsed / 10) as i64).max(-99)
        };
        if numerator >= 0 {
            parent.difficulty + adjustment * U256::from(numerator as u64)
        } else {
            parent
                .difficulty
                .checked_sub(adjustment * U256::from(numerator.unsigned_abs()))
                .unwrap_or_default()
        }
    } else if elapsed < 13 {
        parent.difficulty + adjustment
    } else {
        parent.difficulty.checked_sub(adjustment).unwrap_or_default()
    };

    let bomb_number = if spec >= SpecId::Byzantium {
        number.saturating_sub(BYZANTIUM_BOMB_DELAY)
    } else {
        number
    };
    let period = bomb_number / 100_000;
    if period >= 2 {
        difficulty += U256::from(2).overflowing_pow(U256::from(period - 2)).0;
    }

    difficulty.max(chain.min_difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::Bytes;

    fn frontier_chain() -> ChainSpec {
        ChainSpec::frontier(1)
    }

    fn parent() -> BlockHeader {
        BlockHeader {
            difficulty: U256::from(300_000u64),
            number: 32,
            gas_limit: 3_141_592,
            timestamp: 55,
            ..Default::default()
        }
    }

    #[test]
    fn frontier_difficulty_steps() {
        let chain = frontier_chain();
        // 11 seconds elapsed: one step up
        assert_eq!(
            calc_difficulty(&chain, &parent(), 66, 33, false),
            U256::from(300_146u64)
        );
        // 33 seconds elapsed: one step down
        assert_eq!(
            calc_difficulty(&chain, &parent(), 88, 33, false),
            U256::from(299_854u64)
        );
    }

    #[test]
    fn homestead_difficulty_scales() {
        let mut chain = frontier_chain();
        chain.set_height(SpecId::Homestead, 0);
        let adjustment = 300_000u64 / 2048;
        // Δt = 11 -> numerator 0
        assert_eq!(
            calc_difficulty(&chain, &parent(), 66, 33, false),
            U256::from(300_000u64)
        );
        // Δt = 5 -> numerator 1
        assert_eq!(
            calc_difficulty(&chain, &parent(), 60, 33, false),
            U256::from(300_000 + adjustment)
        );
        // Δt = 25 -> numerator -1
        assert_eq!(
            calc_difficulty(&chain, &parent(), 80, 33, false),
            U256::from(300_000 - adjustment)
        );
        // enormous delay clamps at -99
        assert_eq!(
            calc_difficulty(&chain, &parent(), 55 + 10_000, 33, false),
            U256::from(300_000 - 99 * adjustment)
        );
    }

    #[test]
    fn byzantium_counts_ommers_and_delays_bomb() {
        let mut chain = frontier_chain();
        chain.set_height(SpecId::Homestead, 0);
        chain.set_height(SpecId::Byzantium, 0);
        let adjustment = 300_000u64 / 2048;
        // Δt = 5, no ommers -> +1; with ommers -> +2
        assert_eq!(
            calc_difficulty(&chain, &parent(), 60, 33, false),
            U256::from(300_000 + adjustment)
        );
        assert_eq!(
            calc_difficulty(&chain, &parent(), 60, 33, true),
            U256::from(300_000 + 2 * adjustment)
        );

        // at block 400k the Frontier bomb is live, Byzantium's is delayed
        let mut old_parent = parent();
        old_parent.number = 399_999;
        old_parent.difficulty = U256::from(10_000_000u64);
        let frontier = calc_difficulty(&frontier_chain(), &old_parent, 60, 400_000, false);
        let byzantium = calc_difficulty(&chain, &old_parent, 60, 400_000, false);
        assert!(frontier > byzantium);
    }

    #[test]
    fn difficulty_floors_at_minimum() {
        let chain = frontier_chain();
        let mut weak_parent = parent();
        weak_parent.difficulty = U256::from(131_072u64);
        assert_eq!(
            calc_difficulty(&chain, &weak_parent, 88, 33, false),
            U256::from(131_072u64)
        );
    }

    #[test]
    fn header_rules() {
        let chain = frontier_chain();
        let parent = parent();
        let mut header = BlockHeader {
            difficulty: calc_difficulty(&chain, &parent, 66, 33, false),
            number: 33,
            gas_limit: parent.gas_limit,
            gas_used: 0,
            timestamp: 66,
            ..Default::default()
        };
        assert_eq!(validate_header(&chain, &parent, &header, false), Ok(()));

        let mut bad = header.clone();
        bad.extra_data = Bytes::from(vec![0u8; 33]);
        assert_eq!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::ExtraDataTooLong)
        );

        let mut bad = header.clone();
        bad.timestamp = parent.timestamp;
        assert_eq!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::TimestampNotAfterParent)
        );

        let mut bad = header.clone();
        bad.number = 34;
        assert!(matches!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::NonSequentialNumber { .. })
        ));

        let mut bad = header.clone();
        bad.gas_limit = parent.gas_limit + parent.gas_limit / 1024;
        assert!(matches!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::GasLimitOutOfBounds(_))
        ));

        let mut bad = header.clone();
        bad.gas_used = bad.gas_limit + 1;
        assert!(matches!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::GasUsedExceedsLimit { .. })
        ));

        let mut bad = header.clone();
        bad.difficulty = U256::from(1u64);
        assert!(matches!(
            validate_header(&chain, &parent, &bad, false),
            Err(HeaderError::DifficultyMismatch { .. })
        ));

        // a gas limit drifting within the band is fine
        header.gas_limit = parent.gas_limit + parent.gas_limit / 1024 - 1;
        assert_eq!(validate_header(&chain, &parent, &header, false), Ok(()));
    }
}
