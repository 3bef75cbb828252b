use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use meetpoint_core::{
    Booking, Meeting, MeetingStore, Member, NewMember, PaymentState, StoreError, Ticket, Venue,
};

/// Postgres-backed remote store. The unique index on `bookings.ticket_id`
/// is the arbiter for concurrent ticket claims.
pub struct PgMeetingStore {
    pool: PgPool,
}

impl PgMeetingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: MeetingRow) -> Result<Meeting, StoreError> {
        let tickets: Vec<TicketRow> = sqlx::query_as::<Postgres, TicketRow>(
            "SELECT id, meeting_id FROM tickets WHERE meeting_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let bookings: Vec<BookingRow> = sqlx::query_as::<Postgres, BookingRow>(
            "SELECT b.id, b.ticket_id, b.member_id, b.state, b.created_at \
             FROM bookings b JOIN tickets t ON t.id = b.ticket_id \
             WHERE t.meeting_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut by_ticket: HashMap<Uuid, Booking> = HashMap::new();
        for booking in bookings {
            by_ticket.insert(booking.ticket_id, booking.try_into()?);
        }

        let tickets = tickets
            .into_iter()
            .map(|t| Ticket {
                booking: by_ticket.remove(&t.id),
                id: t.id,
                meeting_id: t.meeting_id,
            })
            .collect();

        // A meeting that already started is closed regardless of the flag
        let bookable = row.bookable && row.starts_at > Utc::now();

        Ok(Meeting {
            id: row.id,
            starts_at: row.starts_at,
            venue: Venue {
                name: row.venue_name,
                link: row.venue_link,
            },
            bookable,
            tickets,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MeetingRow {
    id: Uuid,
    starts_at: DateTime<Utc>,
    venue_name: String,
    venue_link: Option<String>,
    bookable: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    meeting_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ticket_id: Uuid,
    member_id: Uuid,
    state: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        Ok(Booking {
            id: row.id,
            ticket_id: row.ticket_id,
            member_id: row.member_id,
            state: parse_state(&row.state)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    external_id: i64,
    handle: String,
    first_name: String,
    last_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            external_id: row.external_id,
            handle: row.handle,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
        }
    }
}

fn parse_state(raw: &str) -> Result<PaymentState, StoreError> {
    match raw {
        "HELD" => Ok(PaymentState::Held),
        "CLAIMED_PAID" => Ok(PaymentState::ClaimedPaid),
        "PAID" => Ok(PaymentState::Paid),
        other => Err(StoreError::Transport(format!(
            "Unexpected payment state '{other}' in store"
        ))),
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Transport(e.to_string())
}

#[async_trait]
impl MeetingStore for PgMeetingStore {
    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError> {
        let row: Option<MeetingRow> = sqlx::query_as::<Postgres, MeetingRow>(
            "SELECT id, starts_at, venue_name, venue_link, bookable, created_at \
             FROM meetings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_future_meetings(&self) -> Result<Vec<Meeting>, StoreError> {
        let rows: Vec<MeetingRow> = sqlx::query_as::<Postgres, MeetingRow>(
            "SELECT id, starts_at, venue_name, venue_link, bookable, created_at \
             FROM meetings WHERE starts_at > NOW() ORDER BY starts_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut meetings = Vec::with_capacity(rows.len());
        for row in rows {
            meetings.push(self.hydrate(row).await?);
        }
        Ok(meetings)
    }

    async fn get_member_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Member>, StoreError> {
        let row: Option<MemberRow> = sqlx::query_as::<Postgres, MemberRow>(
            "SELECT id, external_id, handle, first_name, last_name, created_at \
             FROM members WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(Member::from))
    }

    async fn create_member(&self, profile: NewMember) -> Result<Member, StoreError> {
        let member = Member {
            id: Uuid::new_v4(),
            external_id: profile.external_id,
            handle: profile.handle,
            first_name: profile.first_name,
            last_name: profile.last_name,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO members (id, external_id, handle, first_name, last_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(member.id)
        .bind(member.external_id)
        .bind(&member.handle)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(member.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(member)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as::<Postgres, BookingRow>(
            "SELECT id, ticket_id, member_id, state, created_at FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(Booking::try_from).transpose()
    }

    async fn create_booking(
        &self,
        ticket_id: Uuid,
        member_id: Uuid,
    ) -> Result<Booking, StoreError> {
        let booking = Booking::new(ticket_id, member_id);

        let result = sqlx::query(
            "INSERT INTO bookings (id, ticket_id, member_id, state, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(booking.id)
        .bind(booking.ticket_id)
        .bind(booking.member_id)
        .bind(booking.state.as_str())
        .bind(booking.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(booking),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::not_found("ticket", ticket_id))
            }
            Err(e) => Err(map_sqlx(e)),
        }
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE bookings SET state = $1 WHERE id = $2")
            .bind(booking.state.as_str())
            .bind(booking.id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("booking", booking.id));
        }
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
