// core.rs splits ledger responsibilities into submodules: block and ledger
// management, the pending record pool, and whole-chain validation.
pub mod chain;
pub mod mempool;
pub mod validation;

pub use chain::*;
pub use mempool::*;
pub use validation::*;
