//! Connection registry and event broadcaster.
//!
//! DESIGN
//! ======
//! One `RealtimeHub` per process, constructed at the composition root and
//! injected through `AppState` — never a module-level singleton, so tests
//! build isolated hubs and a future multi-instance fan-out can swap the
//! internals without touching call sites.
//!
//! Each live socket registers an `mpsc::Sender<String>` feeding its writer
//! half. Broadcast serializes the envelope once, then fans the text out with
//! `try_send` per recipient: a full or closed channel is that recipient's
//! problem alone — it is logged, the connection is evicted, and delivery to
//! everyone else continues.
//!
//! ORDERING
//! ========
//! Delivery order across recipients is unspecified (HashMap iteration).
//! There are no sequence numbers; consumers treat every event as
//! refetch-hint rather than state transfer, so reordering is harmless.

use std::collections::HashMap;
use std::sync::Arc;

use events::{Envelope, EventBody, LeadCreated, LeadMoved, LeadRef, StageRef};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

/// Outbound channel capacity per connection. A client that cannot drain
/// this many pending events is considered dead and gets evicted.
pub const CONNECTION_BUFFER: usize = 256;

/// Registry of live websocket connections plus the broadcast fan-out.
#[derive(Clone)]
pub struct RealtimeHub {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        Self { connections: Arc::new(RwLock::new(HashMap::new())) }
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    /// Register a connection. Re-adding an id replaces its sender without
    /// changing the count.
    pub async fn add(&self, id: Uuid, tx: mpsc::Sender<String>) {
        let mut connections = self.connections.write().await;
        connections.insert(id, tx);
        info!(connection_id = %id, total = connections.len(), "ws: connection registered");
    }

    /// Deregister a connection. No-op if the id is unknown.
    pub async fn remove(&self, id: Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(&id).is_some() {
            info!(connection_id = %id, total = connections.len(), "ws: connection removed");
        }
    }

    /// Number of live connections, for the status endpoint.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    // =========================================================================
    // BROADCAST
    // =========================================================================

    /// Deliver an event to every registered connection.
    pub async fn broadcast_all(&self, envelope: &Envelope) {
        self.fan_out(envelope, None).await;
    }

    /// Deliver an event to every connection except the one that produced it.
    /// Used for cursor relay — a client must never receive its own echo.
    pub async fn broadcast_except(&self, sender: Uuid, envelope: &Envelope) {
        self.fan_out(envelope, Some(sender)).await;
    }

    async fn fan_out(&self, envelope: &Envelope, exclude: Option<Uuid>) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, event = envelope.body.type_name(), "ws: failed to serialize event");
                return;
            }
        };

        // Snapshot under the read lock; eviction below takes the write lock,
        // so a recipient failing mid-broadcast never invalidates iteration.
        let recipients: Vec<(Uuid, mpsc::Sender<String>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(id, _)| exclude != Some(**id))
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivered = 0usize;
        let mut dead: Vec<Uuid> = Vec::new();
        for (id, tx) in &recipients {
            match tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(connection_id = %id, error = %err, "ws: send failed, evicting connection");
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in dead {
                connections.remove(&id);
            }
        }

        info!(event = envelope.body.type_name(), recipients = delivered, "ws: broadcast");
    }

    // =========================================================================
    // EMIT SHORTCUTS
    // =========================================================================
    // Called by REST routes after a successful mutation. Best-effort: the
    // mutation is already persisted, so a failed delivery only delays the
    // other clients' refresh.

    pub async fn emit_lead_moved(&self, payload: LeadMoved) {
        self.broadcast_all(&Envelope::now(EventBody::LeadMoved(payload))).await;
    }

    pub async fn emit_lead_created(&self, lead_id: Uuid, stage_id: Option<Uuid>) {
        self.broadcast_all(&Envelope::now(EventBody::LeadCreated(LeadCreated { lead_id, stage_id })))
            .await;
    }

    pub async fn emit_lead_updated(&self, lead_id: Uuid) {
        self.broadcast_all(&Envelope::now(EventBody::LeadUpdated(LeadRef { lead_id }))).await;
    }

    pub async fn emit_lead_deleted(&self, lead_id: Uuid) {
        self.broadcast_all(&Envelope::now(EventBody::LeadDeleted(LeadRef { lead_id }))).await;
    }

    pub async fn emit_stage_created(&self, stage_id: Uuid, funnel_id: Uuid) {
        self.broadcast_all(&Envelope::now(EventBody::StageCreated(StageRef { stage_id, funnel_id })))
            .await;
    }

    pub async fn emit_stage_updated(&self, stage_id: Uuid, funnel_id: Uuid) {
        self.broadcast_all(&Envelope::now(EventBody::StageUpdated(StageRef { stage_id, funnel_id })))
            .await;
    }

    pub async fn emit_stage_deleted(&self, stage_id: Uuid, funnel_id: Uuid) {
        self.broadcast_all(&Envelope::now(EventBody::StageDeleted(StageRef { stage_id, funnel_id })))
            .await;
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
