use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notify::ReplyHandle;
use crate::repository::StoreError;

/// Key namespace for side-channel records. `Confirm` and `Delete` records
/// for the same booking never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Confirm,
    Delete,
}

impl PendingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingKind::Confirm => "confirm",
            PendingKind::Delete => "delete",
        }
    }
}

/// Context handed to the operator when a member claims payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmContext {
    pub meeting_id: Uuid,
    pub member_external_id: i64,
    pub notify_channel_id: i64,
    pub notify_message_id: i64,
}

/// Context handed to the operator when a member requests a refund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteContext {
    pub meeting_id: Uuid,
    pub member_external_id: i64,
    pub notify_channel_id: i64,
    pub notify_message_id: i64,
}

/// Side-channel payload, tagged by kind so a record read from the wrong
/// namespace is detectable instead of silently misread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingRecord {
    Confirm(ConfirmContext),
    Delete(DeleteContext),
}

impl PendingRecord {
    pub fn kind(&self) -> PendingKind {
        match self {
            PendingRecord::Confirm(_) => PendingKind::Confirm,
            PendingRecord::Delete(_) => PendingKind::Delete,
        }
    }

    pub fn meeting_id(&self) -> Uuid {
        match self {
            PendingRecord::Confirm(ctx) => ctx.meeting_id,
            PendingRecord::Delete(ctx) => ctx.meeting_id,
        }
    }

    pub fn member_external_id(&self) -> i64 {
        match self {
            PendingRecord::Confirm(ctx) => ctx.member_external_id,
            PendingRecord::Delete(ctx) => ctx.member_external_id,
        }
    }

    /// Where to reach the member who started the flow
    pub fn reply(&self) -> ReplyHandle {
        let (channel_id, message_id) = match self {
            PendingRecord::Confirm(ctx) => (ctx.notify_channel_id, ctx.notify_message_id),
            PendingRecord::Delete(ctx) => (ctx.notify_channel_id, ctx.notify_message_id),
        };
        ReplyHandle {
            channel_id,
            message_id,
        }
    }
}

/// Short-lived coordination records keyed by `(kind, booking_id)`.
///
/// Records are disposable hints, never a system of record: a lost record
/// causes a re-prompt or a manual-repair notification, nothing worse. An
/// expired record is identical to an absent one.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Lease acquisition: create the record unless an un-expired one
    /// already exists. Returns whether the lease was acquired.
    async fn put_if_absent(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
        record: &PendingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn get(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
    ) -> Result<Option<PendingRecord>, StoreError>;

    async fn delete(&self, kind: PendingKind, booking_id: Uuid) -> Result<(), StoreError>;
}
