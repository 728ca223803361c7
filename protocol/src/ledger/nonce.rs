//! Persistent, atomic nonce ledger.
//!
//! [`NonceLedger::check_and_commit`] is the only replay-critical operation in
//! the system. It serializes callers through a process-wide mutex, then
//! performs the read-modify-write as a sled compare-and-swap so that two
//! ledger handles opened over clones of the same [`WardenDb`] cannot both
//! accept against a stale value. A commit is flushed to disk before the
//! caller sees `Ok`.

use parking_lot::Mutex;
use sled::Tree;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::MAX_NONCE;
use crate::storage::{DbError, WardenDb};

/// Key under which the last accepted nonce lives in the ledger tree.
const LAST_ACCEPTED_KEY: &[u8] = b"last_accepted_nonce";

/// Errors produced by the nonce ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The candidate is not strictly greater than the last accepted nonce.
    /// An exact repeat (`rejected == last_accepted`) is a replay attempt.
    #[error("nonce too low: rejected {rejected}, last accepted {last_accepted}")]
    NonceTooLow {
        /// The nonce the caller tried to commit.
        rejected: u64,
        /// The highest nonce committed so far.
        last_accepted: u64,
    },

    /// The candidate is above [`MAX_NONCE`]. The ledger is left untouched.
    #[error("nonce {rejected} out of range: maximum is {max}")]
    NonceOutOfRange { rejected: u64, max: u64 },

    #[error("ledger storage error: {0}")]
    Storage(#[from] DbError),
}

/// Monotonic nonce ledger backed by sled.
///
/// Construct one per store and share it behind an `Arc`. Tests should build
/// an isolated instance per case from [`WardenDb::open_temporary`].
#[derive(Debug)]
pub struct NonceLedger {
    db: WardenDb,
    commit_lock: Mutex<()>,
}

impl NonceLedger {
    /// Creates a ledger over the given database.
    pub fn new(db: WardenDb) -> Self {
        Self {
            db,
            commit_lock: Mutex::new(()),
        }
    }

    fn tree(&self) -> &Tree {
        self.db.ledger_tree()
    }

    /// The highest nonce ever committed, or `None` on a fresh ledger.
    pub fn last_accepted(&self) -> Result<Option<u64>, LedgerError> {
        let raw = self.tree().get(LAST_ACCEPTED_KEY).map_err(DbError::from)?;
        decode(raw.as_deref())
    }

    /// The smallest nonce that [`check_and_commit`](Self::check_and_commit)
    /// would currently accept. Read-only.
    pub fn peek_next(&self) -> Result<u64, LedgerError> {
        match self.last_accepted()? {
            None => Ok(0),
            Some(last) if last <= MAX_NONCE => Ok(last + 1),
            Some(last) => Err(DbError::Serialization(format!(
                "stored nonce {last} exceeds maximum {MAX_NONCE}"
            ))
            .into()),
        }
    }

    /// Atomically accept `candidate` if it is strictly greater than the last
    /// accepted nonce, persisting it durably before returning.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NonceTooLow`] when `candidate <= last_accepted` and
    /// [`LedgerError::NonceOutOfRange`] when `candidate > MAX_NONCE`; the
    /// ledger is left untouched. [`LedgerError::Storage`] if sled fails.
    pub fn check_and_commit(&self, candidate: u64) -> Result<(), LedgerError> {
        if candidate > MAX_NONCE {
            return Err(LedgerError::NonceOutOfRange {
                rejected: candidate,
                max: MAX_NONCE,
            });
        }
        let _guard = self.commit_lock.lock();

        loop {
            let current_raw = self.tree().get(LAST_ACCEPTED_KEY).map_err(DbError::from)?;
            let current = decode(current_raw.as_deref())?;

            if let Some(last_accepted) = current {
                if candidate <= last_accepted {
                    debug!(rejected = candidate, last_accepted, "nonce rejected");
                    return Err(LedgerError::NonceTooLow {
                        rejected: candidate,
                        last_accepted,
                    });
                }
            }

            let new_bytes = candidate.to_be_bytes();
            let swapped = self
                .tree()
                .compare_and_swap(LAST_ACCEPTED_KEY, current_raw, Some(&new_bytes[..]))
                .map_err(DbError::from)?;

            match swapped {
                Ok(()) => {
                    self.db.flush()?;
                    debug!(nonce = candidate, previous = ?current, "nonce committed");
                    return Ok(());
                }
                Err(_) => {
                    // Another handle on the same store committed first.
                    trace!(candidate, "ledger compare-and-swap lost, re-reading");
                }
            }
        }
    }

    /// Forget every committed nonce.
    ///
    /// Administrative only: after a reset, previously accepted nonces become
    /// acceptable again, so this must only run alongside a key regeneration
    /// that makes old signatures worthless.
    pub fn reset(&self) -> Result<(), LedgerError> {
        let _guard = self.commit_lock.lock();
        let previous = self.last_accepted()?;
        self.tree().remove(LAST_ACCEPTED_KEY).map_err(DbError::from)?;
        self.db.flush()?;
        warn!(previous = ?previous, "nonce ledger reset");
        Ok(())
    }
}

fn decode(raw: Option<&[u8]>) -> Result<Option<u64>, LedgerError> {
    match raw {
        None => Ok(None),
        Some(bytes) => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                DbError::Serialization(format!("ledger value has {} bytes, expected 8", bytes.len()))
            })?;
            Ok(Some(u64::from_be_bytes(arr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn fresh() -> NonceLedger {
        NonceLedger::new(WardenDb::open_temporary().expect("temp db"))
    }

    #[test]
    fn fresh_ledger_is_empty() {
        let ledger = fresh();
        assert_eq!(ledger.last_accepted().unwrap(), None);
        assert_eq!(ledger.peek_next().unwrap(), 0);
    }

    #[test]
    fn commit_advances_and_peek_follows() {
        let ledger = fresh();
        ledger.check_and_commit(0).unwrap();
        assert_eq!(ledger.last_accepted().unwrap(), Some(0));
        assert_eq!(ledger.peek_next().unwrap(), 1);
    }

    #[test]
    fn repeat_is_rejected_with_both_values() {
        let ledger = fresh();
        ledger.check_and_commit(0).unwrap();
        match ledger.check_and_commit(0) {
            Err(LedgerError::NonceTooLow {
                rejected,
                last_accepted,
            }) => {
                assert_eq!(rejected, 0);
                assert_eq!(last_accepted, 0);
            }
            other => panic!("expected NonceTooLow, got {other:?}"),
        }
    }

    #[test]
    fn gaps_allowed_but_never_backwards() {
        let ledger = fresh();
        ledger.check_and_commit(5).unwrap();
        assert!(matches!(
            ledger.check_and_commit(3),
            Err(LedgerError::NonceTooLow {
                rejected: 3,
                last_accepted: 5
            })
        ));
        assert_eq!(ledger.last_accepted().unwrap(), Some(5));
        ledger.check_and_commit(6).unwrap();
    }

    #[test]
    fn peek_has_no_side_effect() {
        let ledger = fresh();
        for _ in 0..3 {
            assert_eq!(ledger.peek_next().unwrap(), 0);
        }
        ledger.check_and_commit(0).unwrap();
    }

    #[test]
    fn accepted_set_is_running_strict_maximum() {
        let ledger = fresh();
        let sequence = [3u64, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 10];
        let mut expected = Vec::new();
        let mut running: Option<u64> = None;
        for &n in &sequence {
            if running.map_or(true, |r| n > r) {
                expected.push(n);
                running = Some(n);
            }
        }

        let accepted: Vec<u64> = sequence
            .iter()
            .copied()
            .filter(|&n| ledger.check_and_commit(n).is_ok())
            .collect();

        assert_eq!(accepted, expected);
        assert_eq!(ledger.last_accepted().unwrap(), Some(10));
    }

    #[test]
    fn nonce_above_ceiling_is_refused() {
        let ledger = fresh();
        assert!(matches!(
            ledger.check_and_commit(u64::MAX),
            Err(LedgerError::NonceOutOfRange {
                rejected: u64::MAX,
                max: MAX_NONCE
            })
        ));
        assert_eq!(ledger.last_accepted().unwrap(), None);

        ledger.check_and_commit(MAX_NONCE).unwrap();
        assert_eq!(ledger.peek_next().unwrap(), MAX_NONCE + 1);
        assert!(matches!(
            ledger.check_and_commit(MAX_NONCE + 1),
            Err(LedgerError::NonceOutOfRange { .. })
        ));
    }

    #[test]
    fn out_of_range_stored_value_is_a_storage_error() {
        let db = WardenDb::open_temporary().unwrap();
        db.ledger_tree()
            .insert(LAST_ACCEPTED_KEY, &u64::MAX.to_be_bytes()[..])
            .unwrap();
        let ledger = NonceLedger::new(db);
        assert!(matches!(
            ledger.peek_next(),
            Err(LedgerError::Storage(DbError::Serialization(_)))
        ));
    }

    #[test]
    fn concurrent_callers_never_double_accept() {
        let ledger = Arc::new(fresh());
        let threads = 8;
        let per_thread = 50u64;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    (0..per_thread)
                        .filter(|&n| ledger.check_and_commit(n).is_ok())
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().expect("thread should not panic"));
        }

        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len(), "a nonce was accepted twice");
        assert_eq!(ledger.last_accepted().unwrap(), all.iter().copied().max());
    }

    #[test]
    fn handles_sharing_a_store_see_each_other() {
        let db = WardenDb::open_temporary().unwrap();
        let a = NonceLedger::new(db.clone());
        let b = NonceLedger::new(db);

        a.check_and_commit(7).unwrap();
        assert!(matches!(
            b.check_and_commit(7),
            Err(LedgerError::NonceTooLow { .. })
        ));
        b.check_and_commit(8).unwrap();
        assert_eq!(a.peek_next().unwrap(), 9);
    }

    #[test]
    fn committed_nonce_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let ledger = NonceLedger::new(WardenDb::open(dir.path()).unwrap());
            ledger.check_and_commit(41).unwrap();
        }
        let ledger = NonceLedger::new(WardenDb::open(dir.path()).unwrap());
        assert_eq!(ledger.last_accepted().unwrap(), Some(41));
        assert!(ledger.check_and_commit(41).is_err());
    }

    #[test]
    fn reset_clears_counter() {
        let ledger = fresh();
        ledger.check_and_commit(12).unwrap();
        ledger.reset().unwrap();
        assert_eq!(ledger.last_accepted().unwrap(), None);
        assert_eq!(ledger.peek_next().unwrap(), 0);
    }

    #[test]
    fn corrupt_value_surfaces_as_storage_error() {
        let db = WardenDb::open_temporary().unwrap();
        db.ledger_tree()
            .insert(LAST_ACCEPTED_KEY, &[1u8, 2, 3][..])
            .unwrap();
        let ledger = NonceLedger::new(db);
        assert!(matches!(
            ledger.last_accepted(),
            Err(LedgerError::Storage(DbError::Serialization(_)))
        ));
    }
}
