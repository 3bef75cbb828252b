use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment state of a booking in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Held,
    ClaimedPaid,
    Paid,
}

impl PaymentState {
    /// Transition table. Re-entering the current state is allowed
    /// (idempotent), Paid is terminal.
    pub fn allows(self, next: PaymentState) -> bool {
        use PaymentState::*;
        self == next
            || matches!(
                (self, next),
                (Held, ClaimedPaid) | (Held, Paid) | (ClaimedPaid, Paid)
            )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Held => "HELD",
            PaymentState::ClaimedPaid => "CLAIMED_PAID",
            PaymentState::Paid => "PAID",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Illegal payment transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: PaymentState,
    pub to: PaymentState,
}

/// Club member as known to the remote store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: Uuid,
    pub external_id: i64,
    pub handle: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile captured on first contact, before the store assigns an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub external_id: i64,
    pub handle: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub link: Option<String>,
}

/// A scheduled group meeting with its fixed ticket pool. The pool size is
/// set at creation; only the booking linkage of each ticket changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub venue: Venue,
    pub bookable: bool,
    pub tickets: Vec<Ticket>,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    /// Tickets with no booking, in store order
    pub fn free_tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.iter().filter(|t| t.is_free())
    }

    /// The ticket whose booking belongs to the member, if any
    pub fn ticket_for_member(&self, member_id: Uuid) -> Option<&Ticket> {
        self.tickets
            .iter()
            .find(|t| t.booking.as_ref().is_some_and(|b| b.member_id == member_id))
    }

    pub fn booking_for_member(&self, member_id: Uuid) -> Option<&Booking> {
        self.ticket_for_member(member_id).and_then(|t| t.booking.as_ref())
    }

    /// Local-date comparison; the caller supplies the current local date
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.starts_at.with_timezone(&Local).date_naive() == date
    }
}

/// One bookable slot of a meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub booking: Option<Booking>,
}

impl Ticket {
    pub fn is_free(&self) -> bool {
        self.booking.is_none()
    }
}

/// Linkage of a member to a ticket, carrying the payment state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub member_id: Uuid,
    pub state: PaymentState,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(ticket_id: Uuid, member_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            member_id,
            state: PaymentState::Held,
            created_at: Utc::now(),
        }
    }

    /// Apply a transition from the table. Returns false when the booking
    /// is already in the target state.
    pub fn advance(&mut self, next: PaymentState) -> Result<bool, InvalidTransition> {
        if !self.state.allows(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state == next {
            return Ok(false);
        }
        self.state = next;
        Ok(true)
    }

    pub fn is_paid(&self) -> bool {
        self.state == PaymentState::Paid
    }
}
