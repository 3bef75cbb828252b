use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat location of a member's pending prompt, used to replace it once
/// the operator has acted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyHandle {
    pub channel_id: i64,
    pub message_id: i64,
}

/// Outcome of the cancellation policy for a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundDecision {
    /// Payment was confirmed and the meeting is not today
    Refund,
    /// Payment was confirmed but the meeting occurs today
    NoRefundSameDay,
    /// Payment was claimed but never confirmed collected
    NoPaymentTaken,
}

/// State changes pushed to the member who started the flow. Rendering is
/// the transport layer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberEvent {
    PaymentConfirmed {
        meeting_id: Uuid,
    },
    BookingCancelled {
        meeting_id: Uuid,
        refund: RefundDecision,
    },
}

/// State changes pushed to the operator channel, carrying enough identity
/// to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorEvent {
    PaymentClaimed {
        booking_id: Uuid,
        meeting_id: Uuid,
        member_external_id: i64,
        member_handle: String,
    },
    RefundRequested {
        booking_id: Uuid,
        meeting_id: Uuid,
        member_external_id: i64,
        member_handle: String,
        payment_confirmed: bool,
    },
    PaymentRecorded {
        booking_id: Uuid,
    },
    BookingCancelled {
        booking_id: Uuid,
        refund: RefundDecision,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel closed: {0}")]
    ChannelClosed(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Cross-party fan-out. Member-initiated intents answer the member via
/// the operation's return value; this trait carries only operator prompts
/// and member notices triggered by operator actions.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_member(
        &self,
        reply: ReplyHandle,
        event: MemberEvent,
    ) -> Result<(), NotifyError>;

    async fn notify_operator(&self, event: OperatorEvent) -> Result<(), NotifyError>;
}
