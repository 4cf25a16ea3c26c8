//! Expiry sweeper.
//!
//! Finds ACTIVE listings past their end time and forces them to ENDED.
//! System-initiated, so no per-listing authorization. Safe to invoke
//! repeatedly and concurrently: a second run finds nothing left to do.
//! Does not select winners or touch payments. The timer that calls
//! this lives outside the core.

use std::sync::Arc;

use serde_json::json;

use crate::audit::AuditSink;
use crate::models::{ListingEvent, MarketError};
use crate::store::MarketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub ended: u64,
}

pub struct ExpirySweeper {
    store: Arc<MarketStore>,
    audit: Arc<dyn AuditSink>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<MarketStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn sweep(&self, now_ms: i64) -> Result<SweepReport, MarketError> {
        let ended_ids = self.store.with(|inner| {
            let expired: Vec<u64> = inner
                .listings
                .values()
                .filter(|l| l.is_expired(now_ms))
                .map(|l| l.id)
                .collect();

            for id in &expired {
                let listing = inner.listing_mut(*id)?;
                listing.transition(ListingEvent::End).map_err(MarketError::Unknown)?;
            }
            Ok(expired)
        })?;

        for id in &ended_ids {
            self.audit.record("LISTING_EXPIRED", 0, json!({ "listing_id": id, "at": now_ms }));
        }
        if !ended_ids.is_empty() {
            log::info!("Sweep ended {} expired listings", ended_ids.len());
        }

        Ok(SweepReport { ended: ended_ids.len() as u64 })
    }
}
