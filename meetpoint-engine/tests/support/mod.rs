#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Duration as Days, Utc};
use uuid::Uuid;

use meetpoint_core::{
    Booking, Meeting, MeetingStore, Member, MemberEvent, NewMember, Notifier, NotifyError,
    OperatorEvent, PendingKind, PendingRecord, PendingStore, ReplyHandle, StoreError, Ticket,
    Venue,
};
use meetpoint_engine::{BookingEngine, BookingRules};

/// In-memory stand-in for the remote store. The mutex makes every write
/// atomic, which is exactly the guarantee the engine relies on.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    members: Vec<Member>,
    meetings: Vec<Meeting>,
}

impl MemoryStore {
    pub fn insert_member(&self, member: Member) {
        self.inner.lock().unwrap().members.push(member);
    }

    pub fn insert_meeting(&self, meeting: Meeting) {
        self.inner.lock().unwrap().meetings.push(meeting);
    }

    /// Snapshot of a booking for assertions
    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        let state = self.inner.lock().unwrap();
        state
            .meetings
            .iter()
            .flat_map(|m| m.tickets.iter())
            .find_map(|t| t.booking.clone().filter(|b| b.id == id))
    }
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state.meetings.iter().find(|m| m.id == id).cloned())
    }

    async fn list_future_meetings(&self) -> Result<Vec<Meeting>, StoreError> {
        let state = self.inner.lock().unwrap();
        let now = Utc::now();
        Ok(state
            .meetings
            .iter()
            .filter(|m| m.starts_at > now)
            .cloned()
            .collect())
    }

    async fn get_member_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Member>, StoreError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .members
            .iter()
            .find(|m| m.external_id == external_id)
            .cloned())
    }

    async fn create_member(&self, profile: NewMember) -> Result<Member, StoreError> {
        let mut state = self.inner.lock().unwrap();
        if state
            .members
            .iter()
            .any(|m| m.external_id == profile.external_id)
        {
            return Err(StoreError::Conflict(format!(
                "external id {} already registered",
                profile.external_id
            )));
        }
        let member = Member {
            id: Uuid::new_v4(),
            external_id: profile.external_id,
            handle: profile.handle,
            first_name: profile.first_name,
            last_name: profile.last_name,
            created_at: Utc::now(),
        };
        state.members.push(member.clone());
        Ok(member)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.booking(id))
    }

    async fn create_booking(
        &self,
        ticket_id: Uuid,
        member_id: Uuid,
    ) -> Result<Booking, StoreError> {
        let mut state = self.inner.lock().unwrap();
        let ticket = state
            .meetings
            .iter_mut()
            .flat_map(|m| m.tickets.iter_mut())
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| StoreError::not_found("ticket", ticket_id))?;

        if ticket.booking.is_some() {
            return Err(StoreError::Conflict(format!(
                "ticket {ticket_id} already booked"
            )));
        }
        let booking = Booking::new(ticket_id, member_id);
        ticket.booking = Some(booking.clone());
        Ok(booking)
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        let slot = state
            .meetings
            .iter_mut()
            .flat_map(|m| m.tickets.iter_mut())
            .filter_map(|t| t.booking.as_mut())
            .find(|b| b.id == booking.id)
            .ok_or_else(|| StoreError::not_found("booking", booking.id))?;
        *slot = booking.clone();
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().unwrap();
        for ticket in state.meetings.iter_mut().flat_map(|m| m.tickets.iter_mut()) {
            if ticket.booking.as_ref().is_some_and(|b| b.id == id) {
                ticket.booking = None;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// In-memory side-channel store with real TTL semantics
#[derive(Default)]
pub struct MemoryPending {
    inner: Mutex<HashMap<(PendingKind, Uuid), (PendingRecord, Instant)>>,
}

impl MemoryPending {
    pub fn contains(&self, kind: PendingKind, booking_id: Uuid) -> bool {
        let map = self.inner.lock().unwrap();
        map.get(&(kind, booking_id))
            .is_some_and(|(_, expiry)| *expiry > Instant::now())
    }
}

#[async_trait]
impl PendingStore for MemoryPending {
    async fn put_if_absent(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
        record: &PendingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut map = self.inner.lock().unwrap();
        let key = (kind, booking_id);
        if map
            .get(&key)
            .is_some_and(|(_, expiry)| *expiry > Instant::now())
        {
            return Ok(false);
        }
        map.insert(key, (record.clone(), Instant::now() + ttl));
        Ok(true)
    }

    async fn get(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
    ) -> Result<Option<PendingRecord>, StoreError> {
        let mut map = self.inner.lock().unwrap();
        let key = (kind, booking_id);
        match map.get(&key) {
            Some((record, expiry)) if *expiry > Instant::now() => Ok(Some(record.clone())),
            Some(_) => {
                map.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, kind: PendingKind, booking_id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().unwrap().remove(&(kind, booking_id));
        Ok(())
    }
}

/// Records every dispatched event for assertions
#[derive(Default)]
pub struct RecordingNotifier {
    member: Mutex<Vec<(ReplyHandle, MemberEvent)>>,
    operator: Mutex<Vec<OperatorEvent>>,
}

impl RecordingNotifier {
    pub fn member_events(&self) -> Vec<(ReplyHandle, MemberEvent)> {
        self.member.lock().unwrap().clone()
    }

    pub fn operator_events(&self) -> Vec<OperatorEvent> {
        self.operator.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_member(
        &self,
        reply: ReplyHandle,
        event: MemberEvent,
    ) -> Result<(), NotifyError> {
        self.member.lock().unwrap().push((reply, event));
        Ok(())
    }

    async fn notify_operator(&self, event: OperatorEvent) -> Result<(), NotifyError> {
        self.operator.lock().unwrap().push(event);
        Ok(())
    }
}

/// Wraps a [`MemoryStore`] so the first meeting snapshot it hands out is
/// immediately made stale: a rival claims the first free ticket before
/// the snapshot is returned. Models a claim race the engine must lose.
pub struct RacingStore {
    inner: Arc<MemoryStore>,
    rival: Uuid,
    raced: std::sync::atomic::AtomicBool,
}

impl RacingStore {
    pub fn wrap(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            rival: Uuid::new_v4(),
            raced: std::sync::atomic::AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MeetingStore for RacingStore {
    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError> {
        let snapshot = self.inner.get_meeting(id).await?;
        if let Some(meeting) = &snapshot {
            let already = self
                .raced
                .swap(true, std::sync::atomic::Ordering::SeqCst);
            if !already {
                if let Some(ticket) = meeting.free_tickets().next() {
                    let _ = self.inner.create_booking(ticket.id, self.rival).await;
                }
            }
        }
        Ok(snapshot)
    }

    async fn list_future_meetings(&self) -> Result<Vec<Meeting>, StoreError> {
        self.inner.list_future_meetings().await
    }

    async fn get_member_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Member>, StoreError> {
        self.inner.get_member_by_external_id(external_id).await
    }

    async fn create_member(&self, profile: NewMember) -> Result<Member, StoreError> {
        self.inner.create_member(profile).await
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking(id).await
    }

    async fn create_booking(
        &self,
        ticket_id: Uuid,
        member_id: Uuid,
    ) -> Result<Booking, StoreError> {
        self.inner.create_booking(ticket_id, member_id).await
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.update_booking(booking).await
    }

    async fn delete_booking(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_booking(id).await
    }
}

pub struct World {
    pub store: Arc<MemoryStore>,
    pub pending: Arc<MemoryPending>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: BookingEngine,
}

pub fn world() -> World {
    world_with_rules(BookingRules::default())
}

pub fn world_with_rules(rules: BookingRules) -> World {
    let store = Arc::new(MemoryStore::default());
    let pending = Arc::new(MemoryPending::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = BookingEngine::new(
        store.clone(),
        pending.clone(),
        notifier.clone(),
        rules,
    );
    World {
        store,
        pending,
        notifier,
        engine,
    }
}

pub fn member(external_id: i64, handle: &str) -> Member {
    Member {
        id: Uuid::new_v4(),
        external_id,
        handle: handle.to_string(),
        first_name: handle.to_string(),
        last_name: None,
        created_at: Utc::now(),
    }
}

/// A bookable meeting with `ticket_count` free tickets, starting
/// `starts_in_days` from now (0 = today)
pub fn meeting(ticket_count: usize, starts_in_days: i64) -> Meeting {
    let id = Uuid::new_v4();
    let tickets = (0..ticket_count)
        .map(|_| Ticket {
            id: Uuid::new_v4(),
            meeting_id: id,
            booking: None,
        })
        .collect();
    Meeting {
        id,
        starts_at: Utc::now() + Days::days(starts_in_days),
        venue: Venue {
            name: "Loft 12".to_string(),
            link: Some("https://maps.example/loft-12".to_string()),
        },
        bookable: true,
        tickets,
        created_at: Utc::now(),
    }
}

pub fn reply(channel_id: i64, message_id: i64) -> ReplyHandle {
    ReplyHandle {
        channel_id,
        message_id,
    }
}
