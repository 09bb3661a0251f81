pub mod fallback_chain;

pub use fallback_chain::{ChainSuccess, FallbackChain};
