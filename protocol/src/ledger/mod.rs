//! # Nonce Ledger
//!
//! The single source of truth for replay prevention. The ledger remembers
//! the highest nonce it has ever accepted and refuses anything at or below
//! it. Gaps are fine; going backwards never is.
//!
//! ```text
//!   None ──commit(n)──▶ Some(n) ──commit(m > n)──▶ Some(m) ──▶ …
//!                          │
//!                          └──commit(k ≤ n)──▶ NonceTooLow (state unchanged)
//! ```

pub mod nonce;

pub use nonce::{LedgerError, NonceLedger};
