//! Cache invalidation bridge.
//!
//! Inbound events never carry entity state; they are hints that some cached
//! query is now stale. This module owns the event-to-key mapping and pushes
//! the resulting invalidations into whatever query cache the UI uses.

use std::sync::Arc;

use events::{Envelope, EventBody};
use tracing::{debug, info};
use uuid::Uuid;

/// A group of cached queries, identified the way the cache keys them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKey {
    Leads,
    Stages,
    /// The stage list of one specific funnel.
    FunnelStages(Uuid),
}

impl QueryKey {
    /// Key segments as the cache sees them.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        match self {
            Self::Leads => vec!["leads".to_owned()],
            Self::Stages => vec!["stages".to_owned()],
            Self::FunnelStages(funnel_id) => {
                vec!["stages".to_owned(), "funnel".to_owned(), funnel_id.to_string()]
            }
        }
    }
}

/// The full event-to-invalidation table.
///
/// Every lead event touches both boards and lists, since a lead shows up in
/// its stage column and in the flat lead list. Stage events invalidate only
/// the funnel they belong to. Greetings and cursor traffic touch no data.
#[must_use]
pub fn invalidation_keys(body: &EventBody) -> Vec<QueryKey> {
    match body {
        EventBody::LeadMoved(_)
        | EventBody::LeadCreated(_)
        | EventBody::LeadUpdated(_)
        | EventBody::LeadDeleted(_) => vec![QueryKey::Stages, QueryKey::Leads],
        EventBody::StageCreated(payload)
        | EventBody::StageUpdated(payload)
        | EventBody::StageDeleted(payload) => {
            vec![QueryKey::FunnelStages(payload.funnel_id)]
        }
        EventBody::Connected(_)
        | EventBody::CursorMove(_)
        | EventBody::CursorEnter(_)
        | EventBody::CursorLeave(_) => Vec::new(),
    }
}

/// External collaborator: the UI's query cache.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, key: &QueryKey);
}

type ConnectedHook = Box<dyn Fn(&str) + Send>;

/// Applies [`invalidation_keys`] to an injected cache, once per inbound
/// event. Wire it up as a socket event handler.
pub struct CacheBridge {
    cache: Arc<dyn QueryCache>,
    on_connected: Option<ConnectedHook>,
    greeted: bool,
}

impl CacheBridge {
    #[must_use]
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache, on_connected: None, greeted: false }
    }

    /// Attach a hook for the server greeting. Fires at most once per bridge,
    /// even across reconnects.
    #[must_use]
    pub fn with_connected_hook(mut self, hook: impl Fn(&str) + Send + 'static) -> Self {
        self.on_connected = Some(Box::new(hook));
        self
    }

    pub fn handle(&mut self, envelope: &Envelope) {
        if let EventBody::Connected(greeting) = &envelope.body {
            if !self.greeted {
                self.greeted = true;
                if let Some(hook) = &self.on_connected {
                    hook(&greeting.message);
                }
            }
            return;
        }

        let keys = invalidation_keys(&envelope.body);
        if keys.is_empty() {
            debug!(event = envelope.body.type_name(), "no cache impact");
            return;
        }

        info!(event = envelope.body.type_name(), keys = keys.len(), "invalidating queries");
        for key in &keys {
            self.cache.invalidate(key);
        }
    }
}

#[cfg(test)]
#[path = "invalidation_test.rs"]
mod tests;
