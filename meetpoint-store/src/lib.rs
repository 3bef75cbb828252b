pub mod app_config;
pub mod database;
pub mod events;
pub mod meeting_repo;
pub mod pending_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use events::{BusMessage, NotificationBus};
pub use meeting_repo::PgMeetingStore;
pub use pending_repo::RedisPendingStore;
