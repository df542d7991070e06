//! Event bus and WebSocket fan-out
//!
//! The gateway publishes standardized events onto a single-producer
//! queue; one dispatcher loop drains it and broadcasts to every live
//! dashboard connection. The connection list is lock-guarded and
//! snapshotted before each broadcast, so concurrent broadcasts and
//! disconnects are safe and disconnect is idempotent.
//!
//! Heartbeat: a `{"type":"ping"}` frame every 30 seconds per connection;
//! clients answer `{"type":"pong"}`. A connection silent for more than
//! 90 seconds is closed.

use semantic_firewall_core::FirewallEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Queue handle used by the gateway to publish events
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<FirewallEvent>,
}

impl EventBus {
    /// Create the bus plus the receiving end for the dispatcher loop
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FirewallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an event; dropped silently once the dispatcher is gone
    pub fn publish(&self, event: FirewallEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event dispatcher stopped, dropping event");
        }
    }
}

/// Dispatcher loop: drain the queue and fan out to all subscribers
pub async fn dispatch_events(
    mut rx: mpsc::UnboundedReceiver<FirewallEvent>,
    manager: Arc<WsConnectionManager>,
) {
    while let Some(event) = rx.recv().await {
        manager.broadcast_event(&event);
    }
    tracing::info!("Event dispatcher stopped");
}

struct WsClient {
    id: u64,
    sender: mpsc::UnboundedSender<String>,
    last_pong: Arc<Mutex<Instant>>,
}

/// Tracks live dashboard connections
pub struct WsConnectionManager {
    connections: Mutex<Vec<WsClient>>,
    next_id: AtomicU64,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self::with_timing(Duration::from_secs(30), Duration::from_secs(90))
    }

    pub fn with_timing(heartbeat_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            heartbeat_interval,
            idle_timeout,
        }
    }

    /// Register a new connection; the returned receiver feeds the socket
    /// writer task
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut connections = self.connections.lock().unwrap();
        connections.push(WsClient {
            id,
            sender,
            last_pong: Arc::new(Mutex::new(Instant::now())),
        });
        tracing::info!(id, total = connections.len(), "WebSocket connected");

        (id, receiver)
    }

    /// Remove a connection; safe to call more than once
    pub fn disconnect(&self, id: u64) {
        let mut connections = self.connections.lock().unwrap();
        let before = connections.len();
        connections.retain(|client| client.id != id);
        if connections.len() != before {
            tracing::info!(id, total = connections.len(), "WebSocket disconnected");
        }
    }

    /// Record a pong from a client
    pub fn touch(&self, id: u64) {
        let connections = self.connections.lock().unwrap();
        if let Some(client) = connections.iter().find(|client| client.id == id) {
            *client.last_pong.lock().unwrap() = Instant::now();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Serialize and broadcast an event to every subscriber
    pub fn broadcast_event(&self, event: &FirewallEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => self.broadcast(payload),
            Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
        }
    }

    /// Broadcast a frame; connections whose writer is gone are removed
    pub fn broadcast(&self, payload: String) {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<String>)> = {
            let connections = self.connections.lock().unwrap();
            connections
                .iter()
                .map(|client| (client.id, client.sender.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            if sender.send(payload.clone()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.disconnect(id);
        }
    }

    /// Periodic heartbeat: ping live connections, close silent ones
    pub async fn heartbeat_loop(self: Arc<Self>) {
        let ping = serde_json::json!({"type": "ping"}).to_string();
        loop {
            tokio::time::sleep(self.heartbeat_interval).await;

            let snapshot: Vec<(u64, mpsc::UnboundedSender<String>, Arc<Mutex<Instant>>)> = {
                let connections = self.connections.lock().unwrap();
                connections
                    .iter()
                    .map(|client| {
                        (
                            client.id,
                            client.sender.clone(),
                            Arc::clone(&client.last_pong),
                        )
                    })
                    .collect()
            };

            for (id, sender, last_pong) in snapshot {
                let idle = last_pong.lock().unwrap().elapsed();
                if idle > self.idle_timeout {
                    tracing::warn!(id, idle_secs = idle.as_secs(), "Closing idle WebSocket");
                    self.disconnect(id);
                    continue;
                }
                if sender.send(ping.clone()).is_err() {
                    self.disconnect(id);
                }
            }
        }
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the frame is a client pong
pub fn is_pong(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("type").and_then(|t| t.as_str()).map(String::from))
        .is_some_and(|kind| kind == "pong")
}
