use std::sync::{Arc, Mutex};

use events::{
    Connected, CursorHint, Envelope, EventBody, LeadCreated, LeadMoved, LeadRef, StageRef,
};
use uuid::Uuid;

use super::{CacheBridge, QueryCache, QueryKey, invalidation_keys};

#[derive(Default)]
struct RecordingCache {
    invalidated: Mutex<Vec<QueryKey>>,
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, key: &QueryKey) {
        self.invalidated.lock().unwrap().push(key.clone());
    }
}

impl RecordingCache {
    fn keys(&self) -> Vec<QueryKey> {
        self.invalidated.lock().unwrap().clone()
    }
}

#[test]
fn segments_match_the_cache_key_layout() {
    let funnel_id = Uuid::new_v4();
    assert_eq!(QueryKey::Leads.segments(), ["leads"]);
    assert_eq!(QueryKey::Stages.segments(), ["stages"]);
    assert_eq!(
        QueryKey::FunnelStages(funnel_id).segments(),
        ["stages".to_owned(), "funnel".to_owned(), funnel_id.to_string()]
    );
}

#[test]
fn every_lead_event_invalidates_stages_and_leads() {
    let lead_id = Uuid::new_v4();
    let bodies = [
        EventBody::LeadMoved(LeadMoved {
            lead_id,
            from_stage_id: None,
            to_stage_id: Some(Uuid::new_v4()),
            funnel_id: None,
        }),
        EventBody::LeadCreated(LeadCreated { lead_id, stage_id: None }),
        EventBody::LeadUpdated(LeadRef { lead_id }),
        EventBody::LeadDeleted(LeadRef { lead_id }),
    ];

    for body in bodies {
        assert_eq!(
            invalidation_keys(&body),
            vec![QueryKey::Stages, QueryKey::Leads],
            "mapping for {}",
            body.type_name()
        );
    }
}

#[test]
fn stage_events_invalidate_only_their_funnel() {
    let stage_id = Uuid::new_v4();
    let funnel_id = Uuid::new_v4();
    let payload = StageRef { stage_id, funnel_id };

    for body in [
        EventBody::StageCreated(payload.clone()),
        EventBody::StageUpdated(payload.clone()),
        EventBody::StageDeleted(payload),
    ] {
        assert_eq!(invalidation_keys(&body), vec![QueryKey::FunnelStages(funnel_id)]);
    }
}

#[test]
fn greeting_and_cursor_events_touch_nothing() {
    let hint = CursorHint {
        oder_id: "user_1_abc".to_owned(),
        name: "User 1".to_owned(),
        color: "#EF4444".to_owned(),
        funnel_id: Uuid::new_v4(),
    };

    assert!(invalidation_keys(&EventBody::Connected(Connected {
        message: "hi".to_owned()
    }))
    .is_empty());
    assert!(invalidation_keys(&EventBody::CursorEnter(hint.clone())).is_empty());
    assert!(invalidation_keys(&EventBody::CursorLeave(hint)).is_empty());
}

#[test]
fn bridge_pushes_mapped_keys_into_the_cache() {
    let cache = Arc::new(RecordingCache::default());
    let mut bridge = CacheBridge::new(Arc::clone(&cache) as Arc<dyn QueryCache>);

    let funnel_id = Uuid::new_v4();
    bridge.handle(&Envelope::now(EventBody::StageUpdated(StageRef {
        stage_id: Uuid::new_v4(),
        funnel_id,
    })));
    bridge.handle(&Envelope::now(EventBody::LeadUpdated(LeadRef { lead_id: Uuid::new_v4() })));

    assert_eq!(
        cache.keys(),
        vec![QueryKey::FunnelStages(funnel_id), QueryKey::Stages, QueryKey::Leads]
    );
}

#[test]
fn connected_hook_fires_once_and_skips_the_cache() {
    let cache = Arc::new(RecordingCache::default());
    let fired = Arc::new(Mutex::new(Vec::<String>::new()));
    let fired_clone = Arc::clone(&fired);

    let mut bridge = CacheBridge::new(Arc::clone(&cache) as Arc<dyn QueryCache>)
        .with_connected_hook(move |message| {
            fired_clone.lock().unwrap().push(message.to_owned());
        });

    let greeting = Envelope::now(EventBody::Connected(Connected {
        message: "Connected to realtime updates".to_owned(),
    }));
    bridge.handle(&greeting);
    bridge.handle(&greeting);

    assert_eq!(fired.lock().unwrap().as_slice(), ["Connected to realtime updates"]);
    assert!(cache.keys().is_empty());
}
