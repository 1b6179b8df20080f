//! Umbrella crate for the basalt chain core.

pub use basalt_chain as chain;
pub use basalt_evm as evm;
pub use basalt_helpers as helpers;
pub use basalt_kv as kv;
pub use basalt_precompile as precompile;
pub use basalt_primitives as primitives;
pub use basalt_rlp as rlp;
pub use basalt_state as state;
pub use basalt_trie as trie;

pub use basalt_helpers::{dev_debug, dev_error, dev_info, dev_trace, dev_warn};
