//! CareChain - a hash-linked medical record ledger shared between peer nodes
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`record`] - Medical record type and submission validation
//! - [`blockchain`] - Blocks, hashing, the pending pool and chain validation
//! - [`miner`] - Packaging pending records into blocks, on demand or on a timer
//!
//! ## Consensus
//! - [`consensus`] - Longest-valid-chain resolution against peer nodes
//!
//! ## Networking
//! - [`api`] - HTTP endpoints (axum)
//! - [`node`] - Node start-up and lifecycle
//!
//! ## Utilities
//! - [`crypto`] - Key generation and record signing for clients
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod miner;
pub mod record;

// ============================================================================
// Consensus
// ============================================================================
pub mod consensus;

// ============================================================================
// Networking
// ============================================================================
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod crypto;
pub mod error;
