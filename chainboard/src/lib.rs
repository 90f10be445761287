//! Chain-family-agnostic domain model for multi-chain block collection.
//!
//! Every supported blockchain family (EVM, Solana, Sui, Aptos) exposes a
//! wildly different block shape; this crate defines the common record shape
//! they are all normalized into, the immutable per-chain descriptor used to
//! drive collection, and exact decimal arithmetic for native coin amounts.

pub mod chain;
pub mod record;
pub mod units;
