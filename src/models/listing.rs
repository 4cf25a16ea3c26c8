use serde::{Deserialize, Serialize};
use std::fmt;

pub type ListingId = u64;
pub type UserId = u64;

/// States of the listing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Active,
    Ended,
    Paid,
    #[serde(rename = "in_progress")]
    InProgress,
    Completed,
    Disputed,
    Cancelled,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Paid => "paid",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events driving the lifecycle logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingEvent {
    End,
    Settle,
    Deliver,
    Complete,
    Dispute,
    Cancel,
}

/// The listing state machine. Winner selection is not a status change:
/// it is the `winner_user_id` field being set while the listing is Ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingStateMachine {
    pub state: ListingStatus,
}

impl ListingStateMachine {
    pub fn new() -> Self {
        Self { state: ListingStatus::Active }
    }

    pub fn at(state: ListingStatus) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ListingStatus {
        self.state
    }

    /// Consumes an event and transitions the state.
    /// Returns Ok previous_state on success, Err if invalid transition.
    pub fn consume(&mut self, event: ListingEvent) -> Result<ListingStatus, String> {
        let prev_state = self.state;
        let new_state = match (prev_state, event) {
            (ListingStatus::Active, ListingEvent::End) => ListingStatus::Ended,
            (ListingStatus::Active, ListingEvent::Cancel) => ListingStatus::Cancelled,

            (ListingStatus::Ended, ListingEvent::Settle) => ListingStatus::Paid,

            (ListingStatus::Paid, ListingEvent::Deliver) => ListingStatus::InProgress,
            (ListingStatus::Paid, ListingEvent::Complete) => ListingStatus::Completed,
            (ListingStatus::Paid, ListingEvent::Dispute) => ListingStatus::Disputed,

            // Delivery re-entry is the only idempotent self-transition
            (ListingStatus::InProgress, ListingEvent::Deliver) => ListingStatus::InProgress,
            (ListingStatus::InProgress, ListingEvent::Complete) => ListingStatus::Completed,
            (ListingStatus::InProgress, ListingEvent::Dispute) => ListingStatus::Disputed,

            (ListingStatus::Completed, _) | (ListingStatus::Cancelled, _) => {
                return Err(format!(
                    "Cannot transition from terminal state {} with event {:?}",
                    prev_state, event
                ));
            }

            _ => {
                return Err(format!(
                    "Invalid transition from {} with event {:?}",
                    prev_state, event
                ));
            }
        };

        self.state = new_state;
        Ok(prev_state)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ListingStatus::Completed | ListingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        self.state.as_str()
    }
}

impl Default for ListingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListingStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)
    }
}

/// An auctioned service offer (the "vibe").
///
/// Invariants maintained by the store:
/// - `current_bid >= starting_bid` always
/// - `current_bid` strictly increases with each accepted bid
/// - `winner_user_id`, once set, is immutable and matches a recorded bid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    /// Cosmetic 1-10 score
    pub weirdness: u8,
    pub starting_bid: u64,
    pub min_increment: u64,
    pub current_bid: u64,
    /// Authoritative highest-bidder pointer, updated in the same
    /// conditional write that bumps `current_bid`.
    pub highest_bidder_id: Option<UserId>,
    pub end_at: i64,
    pub status: ListingStatus,
    pub winner_user_id: Option<UserId>,
    pub selected_at: Option<i64>,
    pub payment_due_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub escrow_released_at: Option<i64>,
    pub created_at: i64,
}

impl Listing {
    /// Apply a lifecycle event through the state machine, mutating status.
    pub fn transition(&mut self, event: ListingEvent) -> Result<ListingStatus, String> {
        let mut fsm = ListingStateMachine::at(self.status);
        let prev = fsm.consume(event)?;
        self.status = fsm.state();
        Ok(prev)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.status == ListingStatus::Active && self.end_at < now_ms
    }
}

/// Input for listing creation, before ids and defaults are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub weirdness: u8,
    pub starting_bid: u64,
    pub min_increment: u64,
    pub end_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut fsm = ListingStateMachine::new();
        assert_eq!(fsm.consume(ListingEvent::End).unwrap(), ListingStatus::Active);
        assert_eq!(fsm.consume(ListingEvent::Settle).unwrap(), ListingStatus::Ended);
        assert_eq!(fsm.consume(ListingEvent::Deliver).unwrap(), ListingStatus::Paid);
        assert_eq!(fsm.consume(ListingEvent::Complete).unwrap(), ListingStatus::InProgress);
        assert!(fsm.is_terminal());
    }

    #[test]
    fn test_delivery_reentry_is_idempotent() {
        let mut fsm = ListingStateMachine::at(ListingStatus::Paid);
        fsm.consume(ListingEvent::Deliver).unwrap();
        assert_eq!(fsm.state(), ListingStatus::InProgress);
        fsm.consume(ListingEvent::Deliver).unwrap();
        assert_eq!(fsm.state(), ListingStatus::InProgress);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [ListingStatus::Completed, ListingStatus::Cancelled] {
            let mut fsm = ListingStateMachine::at(terminal);
            for event in [
                ListingEvent::End,
                ListingEvent::Settle,
                ListingEvent::Deliver,
                ListingEvent::Complete,
                ListingEvent::Dispute,
                ListingEvent::Cancel,
            ] {
                assert!(fsm.consume(event).is_err());
            }
        }
    }

    #[test]
    fn test_cannot_settle_active_listing() {
        let mut fsm = ListingStateMachine::new();
        assert!(fsm.consume(ListingEvent::Settle).is_err());
        assert_eq!(fsm.state(), ListingStatus::Active);
    }

    #[test]
    fn test_dispute_from_paid_and_in_progress() {
        let mut fsm = ListingStateMachine::at(ListingStatus::Paid);
        fsm.consume(ListingEvent::Dispute).unwrap();
        assert_eq!(fsm.state(), ListingStatus::Disputed);

        let mut fsm = ListingStateMachine::at(ListingStatus::InProgress);
        fsm.consume(ListingEvent::Dispute).unwrap();
        assert_eq!(fsm.state(), ListingStatus::Disputed);
    }
}
