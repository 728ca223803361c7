//! # Storage Module
//!
//! Persistent state for the signing authority. Exactly two pieces of mutable
//! state live on disk: the nonce ledger's counter and the sealed signing key.
//! Both sit in one sled database so that a single `flush` makes a commit
//! durable.

pub mod db;

pub use db::{DbError, DbResult, WardenDb};
