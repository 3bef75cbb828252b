pub mod lifecycle;
pub mod policy;

pub use lifecycle::{
    BookingEngine, BookingRules, CancelOutcome, ClaimOutcome, ConfirmCancelOutcome,
    ConfirmPaymentOutcome, EngineError, MeetingStatus, RequestOutcome,
};
pub use policy::refund_decision;
