use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Booking, Meeting, Member, NewMember};

/// Store-level failure taxonomy. Callers must be able to tell a missing
/// row from a lost write race from an unreachable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Store unreachable: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// The remote authority for members, meetings, tickets and bookings.
/// Ticket ownership is arbitrated here: `create_booking` must reject a
/// second booking for the same ticket with `Conflict`.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError>;

    async fn list_future_meetings(&self) -> Result<Vec<Meeting>, StoreError>;

    async fn get_member_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Member>, StoreError>;

    /// Fails with `Conflict` when the external id is already registered.
    async fn create_member(&self, profile: NewMember) -> Result<Member, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Atomically claim a ticket for a member. The returned booking is
    /// `Held`; a ticket that already carries a booking yields `Conflict`.
    async fn create_booking(
        &self,
        ticket_id: Uuid,
        member_id: Uuid,
    ) -> Result<Booking, StoreError>;

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Returns false when the booking was already gone (idempotent).
    async fn delete_booking(&self, id: Uuid) -> Result<bool, StoreError>;
}
