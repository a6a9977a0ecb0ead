//! Room registry: pairs connections that share a session token and
//! forwards opaque frames between them.
//!
//! The registry never inspects frame contents. Lock order is always
//! table shard → room, and neither lock is held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pulse_core::config::{ExpiryMode, RelayConfig};
use pulse_core::short_token;

/// Identifies one relay connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Default participants per room.
pub const ROOM_CAPACITY: usize = 2;

/// Default ceiling on room lifetime.
pub const ROOM_TTL: Duration = Duration::from_secs(10 * 60);

/// Default expiry sweep period.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ── Expiry policy ─────────────────────────────────────────────────────────────

/// When a room is considered abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Closed `ttl` after creation, even if frames are still flowing.
    SinceCreated(Duration),
    /// Closed after `ttl` without a forwarded frame.
    SinceLastActivity(Duration),
}

impl ExpiryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        match config.expiry {
            ExpiryMode::SinceCreated => ExpiryPolicy::SinceCreated(config.room_ttl()),
            ExpiryMode::SinceLastActivity => ExpiryPolicy::SinceLastActivity(config.room_ttl()),
        }
    }

    fn is_expired(&self, room: &Room, now: Instant) -> bool {
        match *self {
            ExpiryPolicy::SinceCreated(ttl) => now.duration_since(room.created_at) >= ttl,
            ExpiryPolicy::SinceLastActivity(ttl) => {
                now.duration_since(room.state().last_activity) >= ttl
            }
        }
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        ExpiryPolicy::SinceCreated(ROOM_TTL)
    }
}

// ── Participant ───────────────────────────────────────────────────────────────

/// One connection's handle as seen by its room.
///
/// `outbound` feeds the connection's writer task. `shutdown` asks both the
/// reader and writer to stop and close the socket.
#[derive(Debug)]
pub struct Participant {
    pub id: ConnectionId,
    outbound: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl Participant {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Bytes>, shutdown: CancellationToken) -> Self {
        Self {
            id,
            outbound,
            shutdown,
        }
    }
}

// ── Room ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RoomState {
    participants: Vec<Participant>,
    last_activity: Instant,
}

/// Relay-side session: up to `capacity` connections under one token.
#[derive(Debug)]
pub struct Room {
    token: String,
    created_at: Instant,
    state: Mutex<RoomState>,
}

impl Room {
    fn new(token: String) -> Self {
        let now = Instant::now();
        Self {
            token,
            created_at: now,
            state: Mutex::new(RoomState {
                participants: Vec::with_capacity(ROOM_CAPACITY),
                last_activity: now,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        // A panic while holding the lock leaves only a Vec behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.state().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `frame` verbatim to every participant except `from`.
    ///
    /// Fire-and-forget: a peer whose writer has gone away is skipped. Returns
    /// how many peers accepted the frame.
    pub async fn forward(&self, from: ConnectionId, frame: Bytes) -> usize {
        let peers: Vec<mpsc::Sender<Bytes>> = {
            let mut state = self.state();
            state.last_activity = Instant::now();
            state
                .participants
                .iter()
                .filter(|p| p.id != from)
                .map(|p| p.outbound.clone())
                .collect()
        };

        let mut delivered = 0;
        for peer in peers {
            if peer.send(frame.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn remove(&self, id: ConnectionId) -> bool {
        let mut state = self.state();
        let before = state.participants.len();
        state.participants.retain(|p| p.id != id);
        state.participants.len() != before
    }

    fn close_all(&self) {
        let mut state = self.state();
        for p in state.participants.drain(..) {
            p.shutdown.cancel();
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room full")]
    RoomFull,
}

/// The room table, shared by every connection handler and the sweeper.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    capacity: usize,
    policy: ExpiryPolicy,
    next_id: AtomicU64,
}

impl RoomRegistry {
    pub fn new(capacity: usize, policy: ExpiryPolicy) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
            policy,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.room_capacity, ExpiryPolicy::from_config(config))
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a connection to the room for `token`, creating the room on first
    /// join. A join beyond capacity is rejected and leaves the room untouched.
    pub fn join(&self, token: &str, participant: Participant) -> Result<Arc<Room>, JoinError> {
        let entry = self
            .rooms
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Room::new(token.to_string())));
        let room = entry.value().clone();

        let mut state = room.state();
        if state.participants.len() >= self.capacity {
            tracing::warn!(token = short_token(token), "room full, rejecting connection");
            return Err(JoinError::RoomFull);
        }
        state.participants.push(participant);
        let occupants = state.participants.len();
        drop(state);
        drop(entry);

        tracing::info!(token = short_token(token), occupants, "client joined room");
        Ok(room)
    }

    /// Remove a connection from `room`. If the room is now empty and still
    /// registered, it is destroyed and its token becomes reusable.
    ///
    /// Returns true if the room was destroyed.
    pub fn leave(&self, room: &Arc<Room>, id: ConnectionId) -> bool {
        if room.remove(id) {
            tracing::info!(token = short_token(room.token()), "client left room");
        }

        let destroyed = self
            .rooms
            .remove_if(room.token(), |_, current| {
                Arc::ptr_eq(current, room) && current.is_empty()
            })
            .is_some();

        if destroyed {
            tracing::debug!(token = short_token(room.token()), "room destroyed (empty)");
        }
        destroyed
    }

    /// Close and destroy every room the expiry policy considers expired,
    /// occupied or not. Returns how many rooms were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.rooms.len();
        self.rooms.retain(|token, room| {
            if self.policy.is_expired(room, now) {
                tracing::info!(
                    token = short_token(token),
                    occupants = room.len(),
                    age_secs = now.duration_since(room.created_at).as_secs(),
                    "room expired, closing"
                );
                room.close_all();
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.rooms.len())
    }

    /// Run the expiry sweep every `interval` until `shutdown` fires.
    pub async fn expiry_loop(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("expiry sweep stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.rooms.len(), "expired rooms swept");
                    }
                }
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn participant_count(&self) -> usize {
        self.rooms.iter().map(|r| r.value().len()).sum()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.rooms.contains_key(token)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(ROOM_CAPACITY, ExpiryPolicy::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
