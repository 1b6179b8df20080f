//! Basalt helpers library.

#[cfg(feature = "dev")]
pub use tracing;

#[macro_use]
mod macros;
