use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use meetpoint_core::{
    Booking, ConfirmContext, DeleteContext, InvalidTransition, Meeting, MeetingStore, Member,
    MemberEvent, NewMember, Notifier, OperatorEvent, PaymentState, PendingKind, PendingRecord,
    PendingStore, ReplyHandle, StoreError,
};

use crate::policy::refund_decision;

pub use meetpoint_core::RefundDecision;

/// Tunables for the engine. The TTL bounds how long an operator prompt
/// deduplicates follow-up requests before a re-prompt is allowed.
#[derive(Debug, Clone)]
pub struct BookingRules {
    pub pending_ttl: Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Meeting not found: {0}")]
    MeetingNotFound(Uuid),

    #[error("Member not registered: {0}")]
    UnknownMember(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),
}

/// Outcome of a member's ticket request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RequestOutcome {
    Held { booking: Booking },
    AlreadyBooked { booking: Booking },
    NoCapacity,
    NotBookable,
    /// Every free ticket in the snapshot was claimed concurrently; a
    /// retry against a fresh snapshot may still succeed
    RaceLost,
}

/// Outcome of a member claiming their payment was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ClaimOutcome {
    AwaitingConfirmation { booking_id: Uuid },
    AlreadyAwaiting,
    AlreadyPaid,
    NotBooked,
}

/// Outcome of the operator confirming a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfirmPaymentOutcome {
    Confirmed { booking_id: Uuid },
    /// No confirm record: already handled or expired
    NothingPending,
    /// The record pointed at a booking that no longer exists
    BookingMissing { booking_id: Uuid },
}

/// Outcome of a member cancelling their booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CancelOutcome {
    Cancelled,
    RefundPending,
    RefundAlreadyPending,
    NotBooked,
}

/// Outcome of the operator confirming a cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfirmCancelOutcome {
    Done { refund: RefundDecision },
    AlreadyCancelled,
    /// No delete record: surfaced for manual repair, never dropped
    MissingContext,
}

/// Snapshot of a meeting for the transport layer to render
#[derive(Debug, Clone, Serialize)]
pub struct MeetingStatus {
    pub meeting: Meeting,
    pub free_tickets: usize,
    pub own_state: Option<PaymentState>,
}

/// The booking lifecycle state machine. Stateless between calls: all
/// durable state lives in the remote store, all coordination hints in the
/// side-channel store.
pub struct BookingEngine {
    store: Arc<dyn MeetingStore>,
    pending: Arc<dyn PendingStore>,
    notifier: Arc<dyn Notifier>,
    rules: BookingRules,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        pending: Arc<dyn PendingStore>,
        notifier: Arc<dyn Notifier>,
        rules: BookingRules,
    ) -> Self {
        Self {
            store,
            pending,
            notifier,
            rules,
        }
    }

    /// Look up a member by external id, registering them on first contact.
    /// Safe against concurrent first contacts: a lost registration race
    /// falls back to the row the winner created.
    pub async fn ensure_member(&self, profile: NewMember) -> Result<Member, EngineError> {
        if let Some(member) = self
            .store
            .get_member_by_external_id(profile.external_id)
            .await?
        {
            return Ok(member);
        }

        let external_id = profile.external_id;
        match self.store.create_member(profile).await {
            Ok(member) => {
                info!("Registered member {} ({})", member.handle, external_id);
                Ok(member)
            }
            Err(StoreError::Conflict(_)) => self
                .store
                .get_member_by_external_id(external_id)
                .await?
                .ok_or(EngineError::UnknownMember(external_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Future meetings, soonest first
    pub async fn upcoming_meetings(&self) -> Result<Vec<Meeting>, EngineError> {
        let mut meetings = self.store.list_future_meetings().await?;
        meetings.sort_by_key(|m| m.starts_at);
        Ok(meetings)
    }

    /// Meeting snapshot with capacity and the caller's own booking state
    pub async fn meeting_status(
        &self,
        meeting_id: Uuid,
        member_external_id: i64,
    ) -> Result<MeetingStatus, EngineError> {
        let meeting = self.load_meeting(meeting_id).await?;
        let own_state = match self
            .store
            .get_member_by_external_id(member_external_id)
            .await?
        {
            Some(member) => meeting.booking_for_member(member.id).map(|b| b.state),
            None => None,
        };

        Ok(MeetingStatus {
            free_tickets: meeting.free_tickets().count(),
            own_state,
            meeting,
        })
    }

    /// Claim the first free ticket of a meeting for a member.
    ///
    /// Concurrent claims are arbitrated by the store: a `Conflict` on one
    /// ticket moves on to the next free one, so two members never end up
    /// on the same ticket.
    pub async fn request_ticket(
        &self,
        meeting_id: Uuid,
        member_external_id: i64,
    ) -> Result<RequestOutcome, EngineError> {
        let member = self.load_member(member_external_id).await?;
        let meeting = self.load_meeting(meeting_id).await?;

        if let Some(booking) = meeting.booking_for_member(member.id) {
            return Ok(RequestOutcome::AlreadyBooked {
                booking: booking.clone(),
            });
        }
        if !meeting.bookable {
            return Ok(RequestOutcome::NotBookable);
        }

        let mut lost_race = false;
        for ticket in meeting.free_tickets() {
            match self.store.create_booking(ticket.id, member.id).await {
                Ok(booking) => {
                    info!(
                        "Ticket {} held for member {} on meeting {}",
                        ticket.id, member.handle, meeting_id
                    );
                    return Ok(RequestOutcome::Held { booking });
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!("Lost claim race on ticket {}: {}", ticket.id, reason);
                    lost_race = true;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(if lost_race {
            RequestOutcome::RaceLost
        } else {
            RequestOutcome::NoCapacity
        })
    }

    /// Member declares the payment sent; hands the confirmation off to the
    /// operator. The confirm lease deduplicates the prompt: while it is
    /// alive, repeat claims answer "already awaiting" without re-notifying.
    pub async fn claim_paid(
        &self,
        meeting_id: Uuid,
        member_external_id: i64,
        reply: ReplyHandle,
    ) -> Result<ClaimOutcome, EngineError> {
        let member = self.load_member(member_external_id).await?;
        let meeting = self.load_meeting(meeting_id).await?;

        let Some(booking) = meeting.booking_for_member(member.id) else {
            return Ok(ClaimOutcome::NotBooked);
        };
        if booking.is_paid() {
            return Ok(ClaimOutcome::AlreadyPaid);
        }

        let mut booking = booking.clone();
        if booking.advance(PaymentState::ClaimedPaid)? {
            self.store.update_booking(&booking).await?;
            info!("Booking {} claimed paid by {}", booking.id, member.handle);
        }

        let record = PendingRecord::Confirm(ConfirmContext {
            meeting_id,
            member_external_id,
            notify_channel_id: reply.channel_id,
            notify_message_id: reply.message_id,
        });
        let acquired = self
            .pending
            .put_if_absent(
                PendingKind::Confirm,
                booking.id,
                &record,
                self.rules.pending_ttl,
            )
            .await?;
        if !acquired {
            return Ok(ClaimOutcome::AlreadyAwaiting);
        }

        self.tell_operator(OperatorEvent::PaymentClaimed {
            booking_id: booking.id,
            meeting_id,
            member_external_id,
            member_handle: member.handle,
        })
        .await;

        Ok(ClaimOutcome::AwaitingConfirmation {
            booking_id: booking.id,
        })
    }

    /// Operator confirms the payment arrived. Idempotent: once the record
    /// is gone a retry reports `NothingPending`, and a booking that is
    /// already `Paid` is not rewritten.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
    ) -> Result<ConfirmPaymentOutcome, EngineError> {
        let Some(record) = self.pending.get(PendingKind::Confirm, booking_id).await? else {
            return Ok(ConfirmPaymentOutcome::NothingPending);
        };

        let Some(mut booking) = self.store.get_booking(booking_id).await? else {
            warn!(
                "Confirm record for booking {} points at nothing, dropping it",
                booking_id
            );
            self.pending.delete(PendingKind::Confirm, booking_id).await?;
            return Ok(ConfirmPaymentOutcome::BookingMissing { booking_id });
        };

        if booking.advance(PaymentState::Paid)? {
            self.store.update_booking(&booking).await?;
        }
        self.pending.delete(PendingKind::Confirm, booking_id).await?;
        info!("Payment recorded for booking {}", booking_id);

        self.tell_member(
            record.reply(),
            MemberEvent::PaymentConfirmed {
                meeting_id: record.meeting_id(),
            },
        )
        .await;
        self.tell_operator(OperatorEvent::PaymentRecorded { booking_id })
            .await;

        Ok(ConfirmPaymentOutcome::Confirmed { booking_id })
    }

    /// Member cancels their booking. A plain hold is released on the spot;
    /// anything with money attached waits for the operator behind a delete
    /// lease.
    pub async fn cancel(
        &self,
        meeting_id: Uuid,
        member_external_id: i64,
        reply: ReplyHandle,
    ) -> Result<CancelOutcome, EngineError> {
        let member = self.load_member(member_external_id).await?;
        let meeting = self.load_meeting(meeting_id).await?;

        let Some(booking) = meeting.booking_for_member(member.id) else {
            return Ok(CancelOutcome::NotBooked);
        };

        match booking.state {
            PaymentState::Held => {
                self.store.delete_booking(booking.id).await?;
                info!(
                    "Booking {} cancelled by {}, ticket freed",
                    booking.id, member.handle
                );
                Ok(CancelOutcome::Cancelled)
            }
            PaymentState::ClaimedPaid | PaymentState::Paid => {
                let record = PendingRecord::Delete(DeleteContext {
                    meeting_id,
                    member_external_id,
                    notify_channel_id: reply.channel_id,
                    notify_message_id: reply.message_id,
                });
                let acquired = self
                    .pending
                    .put_if_absent(
                        PendingKind::Delete,
                        booking.id,
                        &record,
                        self.rules.pending_ttl,
                    )
                    .await?;
                if !acquired {
                    return Ok(CancelOutcome::RefundAlreadyPending);
                }

                self.tell_operator(OperatorEvent::RefundRequested {
                    booking_id: booking.id,
                    meeting_id,
                    member_external_id,
                    member_handle: member.handle,
                    payment_confirmed: booking.is_paid(),
                })
                .await;

                Ok(CancelOutcome::RefundPending)
            }
        }
    }

    /// Operator confirms the cancellation. Applies the refund policy and
    /// releases the ticket; idempotent once the booking row is gone.
    pub async fn confirm_cancel(
        &self,
        booking_id: Uuid,
    ) -> Result<ConfirmCancelOutcome, EngineError> {
        let Some(record) = self.pending.get(PendingKind::Delete, booking_id).await? else {
            warn!(
                "Cancel confirmation for booking {} has no context, needs manual repair",
                booking_id
            );
            return Ok(ConfirmCancelOutcome::MissingContext);
        };

        let Some(booking) = self.store.get_booking(booking_id).await? else {
            self.pending.delete(PendingKind::Delete, booking_id).await?;
            return Ok(ConfirmCancelOutcome::AlreadyCancelled);
        };

        let meeting_id = record.meeting_id();
        let meeting = self
            .store
            .get_meeting(meeting_id)
            .await?
            .ok_or(EngineError::MeetingNotFound(meeting_id))?;

        let today = Local::now().date_naive();
        let refund = refund_decision(booking.state, meeting.occurs_on(today));

        self.store.delete_booking(booking_id).await?;
        self.pending.delete(PendingKind::Delete, booking_id).await?;
        info!(
            "Booking {} cancelled by operator, refund decision {:?}",
            booking_id, refund
        );

        self.tell_member(
            record.reply(),
            MemberEvent::BookingCancelled { meeting_id, refund },
        )
        .await;
        self.tell_operator(OperatorEvent::BookingCancelled { booking_id, refund })
            .await;

        Ok(ConfirmCancelOutcome::Done { refund })
    }

    async fn load_member(&self, external_id: i64) -> Result<Member, EngineError> {
        self.store
            .get_member_by_external_id(external_id)
            .await?
            .ok_or(EngineError::UnknownMember(external_id))
    }

    async fn load_meeting(&self, id: Uuid) -> Result<Meeting, EngineError> {
        self.store
            .get_meeting(id)
            .await?
            .ok_or(EngineError::MeetingNotFound(id))
    }

    // Dispatch happens after the state change is durable; a failed
    // delivery is logged, never propagated back into the transition.
    async fn tell_member(&self, reply: ReplyHandle, event: MemberEvent) {
        if let Err(e) = self.notifier.notify_member(reply, event).await {
            warn!("Member notification dropped: {}", e);
        }
    }

    async fn tell_operator(&self, event: OperatorEvent) {
        if let Err(e) = self.notifier.notify_operator(event).await {
            warn!("Operator notification dropped: {}", e);
        }
    }
}
