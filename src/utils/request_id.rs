use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use ulid::Ulid;

/// 64-bit ID generator.
/// Structure:
/// - 48 bits: Timestamp (milliseconds)
/// - 16 bits: Randomness / Counter
///
/// If the candidate is not strictly greater than the last issued id
/// (same millisecond, or clock moved back), the last id is incremented
/// instead, keeping ids unique and monotonic across threads.
static LAST_ID: AtomicU64 = AtomicU64::new(0);

pub fn generate_id() -> u64 {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
        & 0x0000_FFFF_FFFF_FFFF;

    let random: u16 = rand::thread_rng().gen();
    let candidate = (timestamp_ms << 16) | random as u64;

    loop {
        let prev = LAST_ID.load(Ordering::SeqCst);
        let next = if candidate > prev { candidate } else { prev + 1 };
        if LAST_ID
            .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return next;
        }
    }
}

/// Globally-unique payment reference for gateway correlation.
pub fn payment_reference() -> String {
    format!("VMK-{}", Ulid::new())
}
