use meetpoint_core::{PaymentState, RefundDecision};

/// The one domain policy rule: a confirmed payment is refunded unless the
/// meeting occurs on the cancellation's own local date. A claim the
/// operator never confirmed carries no money to return.
pub fn refund_decision(state: PaymentState, meeting_is_today: bool) -> RefundDecision {
    match state {
        PaymentState::Paid if meeting_is_today => RefundDecision::NoRefundSameDay,
        PaymentState::Paid => RefundDecision::Refund,
        PaymentState::Held | PaymentState::ClaimedPaid => RefundDecision::NoPaymentTaken,
    }
}
