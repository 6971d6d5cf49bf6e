//! A single connected WebSocket client's server-side handle.
//! Grounded directly on `infra/websocket/connection.rs`'s `Connection`
//! struct: an id, an optional owner, an outbound `mpsc::Sender`, and a
//! last-pong timestamp guarded by interior mutability so the hub can
//! update it from the ping ticker while handler tasks hold their own
//! clone.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use foliofox_model::event::{Event, EventKind};
use foliofox_model::ids::{ClientId, UserId};

pub struct Client {
    id: ClientId,
    user_id: Option<UserId>,
    sender: mpsc::Sender<Event>,
    last_pong: RwLock<DateTime<Utc>>,
}

impl Client {
    pub(super) fn new(id: ClientId, user_id: Option<UserId>, sender: mpsc::Sender<Event>) -> Self {
        Self {
            id,
            user_id,
            sender,
            last_pong: RwLock::new(Utc::now()),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn try_send(&self, event: Event) -> Result<(), mpsc::error::TrySendError<Event>> {
        self.sender.try_send(event)
    }

    pub fn send_ping(&self) -> Result<(), mpsc::error::TrySendError<Event>> {
        self.try_send(Event::broadcast(EventKind::Heartbeat))
    }

    pub fn touch_pong(&self) {
        *self.last_pong.write().expect("last_pong lock poisoned") = Utc::now();
    }

    pub fn pong_overdue(&self, wait: Duration) -> bool {
        let last_pong = *self.last_pong.read().expect("last_pong lock poisoned");
        Utc::now().signed_duration_since(last_pong)
            > chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::MAX)
    }
}
