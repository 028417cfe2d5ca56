// Thin re-export module: implementation is in `blockchain/core.rs` so block
// hashing, the pending pool and chain validation can live in their own files.

pub mod core;
pub use core::*;
