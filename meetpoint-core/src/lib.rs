pub mod models;
pub mod notify;
pub mod pending;
pub mod repository;

pub use models::{
    Booking, InvalidTransition, Meeting, Member, NewMember, PaymentState, Ticket, Venue,
};
pub use notify::{MemberEvent, Notifier, NotifyError, OperatorEvent, RefundDecision, ReplyHandle};
pub use pending::{ConfirmContext, DeleteContext, PendingKind, PendingRecord, PendingStore};
pub use repository::{MeetingStore, StoreError};
