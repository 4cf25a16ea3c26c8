//! Append-only ledger of balance-affecting events.
//!
//! Events are typed (`LedgerEvent`) and persisted in sled under
//! big-endian sequence keys, so iteration order is append order and
//! the last key recovers the sequence counter after a restart.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

use crate::models::LedgerEvent;

pub struct Ledger {
    db: sled::Db,
    next_seq: AtomicU64,
}

impl Ledger {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path).with_context(|| format!("open ledger at {}", path))?;
        let next_seq = match db.last()? {
            Some((key, _)) => {
                let bytes: [u8; 8] = key.as_ref().try_into().unwrap_or([0; 8]);
                u64::from_be_bytes(bytes) + 1
            }
            None => 0,
        };
        Ok(Self { db, next_seq: AtomicU64::new(next_seq) })
    }

    /// Ephemeral ledger for tests and tools.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, next_seq: AtomicU64::new(0) })
    }

    /// Append an event, returning its sequence number.
    pub fn append(&self, event: &LedgerEvent) -> Result<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let value = serde_json::to_vec(event)?;
        self.db.insert(seq.to_be_bytes(), value)?;
        self.db.flush()?;
        Ok(seq)
    }

    pub fn len(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Result<Vec<(u64, LedgerEvent)>> {
        let mut out = Vec::new();
        for entry in self.db.iter() {
            let (key, value) = entry?;
            let bytes: [u8; 8] = key.as_ref().try_into().unwrap_or([0; 8]);
            let event: LedgerEvent = serde_json::from_slice(&value)?;
            out.push((u64::from_be_bytes(bytes), event));
        }
        Ok(out)
    }

    pub fn events_for_user(&self, user_id: u64) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| e.user_id() == user_id)
            .collect())
    }

    pub fn events_for_listing(&self, listing_id: u64) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| e.listing_id() == Some(listing_id))
            .collect())
    }
}
