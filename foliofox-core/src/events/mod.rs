//! Event Bus: a hub of connected clients, fan-out by user or broadcast,
//! heartbeat and idle sweep.
//!
//! A `DashMap<id, Arc<Connection>>`-shaped registry with a bounded
//! `mpsc` sender per connection, fanning out per-user rather than by
//! named room since clients subscribe by `userId`.

pub mod client;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use foliofox_model::event::Event;
use foliofox_model::ids::{ClientId, UserId};

pub use client::Client;

/// Per-client bounded buffer.
const CLIENT_BUFFER_SIZE: usize = 256;

/// The hub. Cheap to clone (`Arc`-backed `DashMap`).
#[derive(Clone)]
pub struct EventBus {
    clients: Arc<DashMap<ClientId, Client>>,
    ping_period: Duration,
    pong_wait: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("connected_clients", &self.clients.len())
            .finish()
    }
}

impl EventBus {
    pub fn new(ping_period: Duration, pong_wait: Duration, idle_timeout: Duration) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            ping_period,
            pong_wait,
            idle_timeout,
        }
    }

    /// Registers a new client and returns its receive half. The
    /// returned `ClientId` is what the caller later passes to
    /// `unregister`.
    pub fn register(&self, user_id: Option<UserId>) -> (ClientId, tokio::sync::mpsc::Receiver<Event>) {
        let id = ClientId::new();
        let (tx, rx) = tokio::sync::mpsc::channel(CLIENT_BUFFER_SIZE);
        self.clients.insert(id, Client::new(id, user_id, tx));
        debug!(%id, "client registered");
        (id, rx)
    }

    pub fn unregister(&self, client_id: ClientId) {
        self.clients.remove(&client_id);
        debug!(client_id = %client_id, "client unregistered");
    }

    pub fn touch_pong(&self, client_id: ClientId) {
        if let Some(client) = self.clients.get(&client_id) {
            client.touch_pong();
        }
    }

    /// Enqueues `event` to every client belonging to `user_id`.
    /// Slow-consumer clients (buffer full) are disconnected.
    pub fn publish_to_user(&self, user_id: UserId, event: Event) {
        let targets: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.value().user_id() == Some(user_id))
            .map(|entry| *entry.key())
            .collect();
        self.deliver(&targets, event);
    }

    /// Enqueues `event` to every connected client.
    pub fn publish_broadcast(&self, event: Event) {
        let targets: Vec<ClientId> = self.clients.iter().map(|entry| *entry.key()).collect();
        self.deliver(&targets, event);
    }

    fn deliver(&self, targets: &[ClientId], event: Event) {
        for client_id in targets {
            let Some(client) = self.clients.get(client_id) else {
                continue;
            };
            if client.try_send(event.clone()).is_err() {
                warn!(client_id = %client_id, "client buffer full, disconnecting");
                drop(client);
                self.clients.remove(client_id);
            }
        }
    }

    /// Runs the heartbeat/idle-sweep ticker until `shutdown` fires.
    /// Spec.md §4.5: ping every `pingPeriod`, drop on no pong within
    /// `pongWait`; separately sweep every 30s for `lastPong` older than
    /// `idleTimeout` (5 minutes by default).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ping_ticker = tokio::time::interval(self.ping_period);
        let mut sweep_ticker = tokio::time::interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                _ = ping_ticker.tick() => {
                    self.ping_all();
                }
                _ = sweep_ticker.tick() => {
                    self.sweep_idle();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn ping_all(&self) {
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.value().pong_overdue(self.pong_wait))
            .map(|entry| *entry.key())
            .collect();
        for client_id in stale {
            warn!(client_id = %client_id, "no pong within pongWait, disconnecting");
            self.clients.remove(&client_id);
        }
        for entry in self.clients.iter() {
            let _ = entry.value().send_ping();
        }
    }

    fn sweep_idle(&self) {
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.value().pong_overdue(self.idle_timeout))
            .map(|entry| *entry.key())
            .collect();
        for client_id in stale {
            debug!(client_id = %client_id, "idle sweep dropping client");
            self.clients.remove(&client_id);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_model::event::EventKind;

    #[tokio::test]
    async fn publish_to_user_reaches_only_that_users_clients() {
        let bus = EventBus::new(Duration::from_secs(54), Duration::from_secs(60), Duration::from_secs(300));
        let user_a = UserId::new();
        let user_b = UserId::new();
        let (_id_a, mut rx_a) = bus.register(Some(user_a));
        let (_id_b, mut rx_b) = bus.register(Some(user_b));

        bus.publish_to_user(user_a, Event::for_user(user_a, EventKind::Heartbeat));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_reaches_all_clients() {
        let bus = EventBus::new(Duration::from_secs(54), Duration::from_secs(60), Duration::from_secs(300));
        let (_id_a, mut rx_a) = bus.register(None);
        let (_id_b, mut rx_b) = bus.register(None);

        bus.publish_broadcast(Event::broadcast(EventKind::Heartbeat));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_buffer_disconnects_slow_consumer() {
        let bus = EventBus::new(Duration::from_secs(54), Duration::from_secs(60), Duration::from_secs(300));
        let (id, _rx) = bus.register(None);
        for _ in 0..(CLIENT_BUFFER_SIZE + 1) {
            bus.publish_broadcast(Event::broadcast(EventKind::Heartbeat));
        }
        assert_eq!(bus.connected_count(), 0, "slow consumer should be dropped");
        let _ = id;
    }

    /// S5: a slow consumer gets disconnected on a full buffer, but a
    /// second client of the same user keeps receiving every event, in
    /// order, none lost.
    #[tokio::test]
    async fn other_clients_of_same_user_unaffected_by_slow_consumer() {
        let bus = EventBus::new(Duration::from_secs(54), Duration::from_secs(60), Duration::from_secs(300));
        let user = UserId::new();
        let (slow_id, _slow_rx) = bus.register(Some(user));
        let (_fast_id, mut fast_rx) = bus.register(Some(user));

        let total = CLIENT_BUFFER_SIZE + 1;
        for i in 0..total {
            bus.publish_to_user(
                user,
                Event::for_user(user, EventKind::LibraryUpdate { book_id: i.to_string() }),
            );
        }

        assert_eq!(bus.connected_count(), 1, "only the slow client was dropped");

        for i in 0..total {
            let event = fast_rx.try_recv().expect("fast client missed an event");
            match event.kind {
                EventKind::LibraryUpdate { book_id } => assert_eq!(book_id, i.to_string(), "events must arrive in order"),
                other => panic!("unexpected event kind: {other:?}"),
            }
        }
        assert!(fast_rx.try_recv().is_err(), "no extra events delivered");

        let _ = slow_id;
    }

    #[tokio::test]
    async fn unregister_removes_client() {
        let bus = EventBus::new(Duration::from_secs(54), Duration::from_secs(60), Duration::from_secs(300));
        let (id, _rx) = bus.register(None);
        assert_eq!(bus.connected_count(), 1);
        bus.unregister(id);
        assert_eq!(bus.connected_count(), 0);
    }
}
