use std::time::{Duration, Instant};

use events::{CursorHint, CursorMove, Envelope, EventBody};
use uuid::Uuid;

use super::{
    CURSOR_PALETTE, CURSOR_STALE_AFTER, CursorSession, CursorTracker, Participant, Throttle,
    to_viewport_percent,
};

fn move_event(oder_id: &str, funnel_id: Uuid, x: f64, y: f64) -> Envelope {
    Envelope::now(EventBody::CursorMove(CursorMove {
        oder_id: oder_id.to_owned(),
        x,
        y,
        name: "Remote".to_owned(),
        color: "#EF4444".to_owned(),
        funnel_id,
    }))
}

fn leave_event(oder_id: &str, funnel_id: Uuid) -> Envelope {
    Envelope::now(EventBody::CursorLeave(CursorHint {
        oder_id: oder_id.to_owned(),
        name: "Remote".to_owned(),
        color: "#EF4444".to_owned(),
        funnel_id,
    }))
}

fn enter_event(oder_id: &str, funnel_id: Uuid) -> Envelope {
    Envelope::now(EventBody::CursorEnter(CursorHint {
        oder_id: oder_id.to_owned(),
        name: "Remote".to_owned(),
        color: "#EF4444".to_owned(),
        funnel_id,
    }))
}

// =============================================================================
// PARTICIPANT
// =============================================================================

#[test]
fn generated_identity_has_the_expected_shape() {
    let p = Participant::generate();

    let mut parts = p.id.splitn(3, '_');
    assert_eq!(parts.next(), Some("user"));
    let millis = parts.next().expect("millis segment");
    assert!(millis.chars().all(|c| c.is_ascii_digit()));
    let suffix = parts.next().expect("random segment");
    assert_eq!(suffix.len(), 7);
    assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

    assert!(p.name.starts_with("User "));
    let n: u32 = p.name["User ".len()..].parse().expect("numeric display name");
    assert!(n < 1000);

    assert!(CURSOR_PALETTE.contains(&p.color.as_str()));
}

// =============================================================================
// TRACKER
// =============================================================================

#[test]
fn move_upserts_and_leave_removes() {
    let funnel = Uuid::new_v4();
    let mut tracker = CursorTracker::new(funnel, "me");
    let now = Instant::now();

    tracker.apply(&move_event("peer", funnel, 10.0, 20.0), now);
    tracker.apply(&move_event("peer", funnel, 30.0, 40.0), now);

    let cursors = tracker.cursors();
    assert_eq!(cursors.len(), 1);
    assert_eq!((cursors[0].x, cursors[0].y), (30.0, 40.0));

    tracker.apply(&leave_event("peer", funnel), now);
    assert!(tracker.cursors().is_empty());
}

#[test]
fn own_events_and_foreign_funnels_are_ignored() {
    let funnel = Uuid::new_v4();
    let mut tracker = CursorTracker::new(funnel, "me");
    let now = Instant::now();

    tracker.apply(&move_event("me", funnel, 1.0, 1.0), now);
    tracker.apply(&move_event("peer", Uuid::new_v4(), 1.0, 1.0), now);

    assert!(tracker.cursors().is_empty());
}

#[test]
fn enter_alone_never_creates_a_position() {
    let funnel = Uuid::new_v4();
    let mut tracker = CursorTracker::new(funnel, "me");
    let now = Instant::now();

    tracker.apply(&enter_event("peer", funnel), now);
    assert!(tracker.cursors().is_empty());

    tracker.apply(&move_event("peer", funnel, 5.0, 5.0), now);
    assert_eq!(tracker.cursors().len(), 1);
}

#[test]
fn sweep_drops_only_stale_cursors() {
    let funnel = Uuid::new_v4();
    let mut tracker = CursorTracker::new(funnel, "me");
    let start = Instant::now();

    tracker.apply(&move_event("old", funnel, 1.0, 1.0), start);
    let later = start + CURSOR_STALE_AFTER;
    tracker.apply(&move_event("fresh", funnel, 2.0, 2.0), later);

    // "old" is exactly at the boundary: still kept.
    tracker.sweep(later);
    assert_eq!(tracker.cursors().len(), 2);

    tracker.sweep(later + Duration::from_millis(1));
    let cursors = tracker.cursors();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].oder_id, "fresh");
}

#[test]
fn leave_for_another_funnel_does_not_remove() {
    let funnel = Uuid::new_v4();
    let mut tracker = CursorTracker::new(funnel, "me");
    let now = Instant::now();

    tracker.apply(&move_event("peer", funnel, 1.0, 1.0), now);
    tracker.apply(&leave_event("peer", Uuid::new_v4()), now);

    assert_eq!(tracker.cursors().len(), 1);
}

// =============================================================================
// THROTTLE + EMISSION
// =============================================================================

#[test]
fn throttle_drops_calls_inside_the_gap() {
    let mut throttle = Throttle::new(Duration::from_millis(50));
    let start = Instant::now();

    assert!(throttle.allow(start));
    assert!(!throttle.allow(start + Duration::from_millis(49)));
    assert!(throttle.allow(start + Duration::from_millis(50)));
    // The dropped call did not reset the window.
    assert!(!throttle.allow(start + Duration::from_millis(99)));
}

#[test]
fn viewport_percent_clamps_and_handles_degenerate_spans() {
    assert!((to_viewport_percent(250.0, 1000.0) - 25.0).abs() < f64::EPSILON);
    assert!((to_viewport_percent(1500.0, 1000.0) - 100.0).abs() < f64::EPSILON);
    assert!((to_viewport_percent(-10.0, 1000.0)).abs() < f64::EPSILON);
    assert!((to_viewport_percent(100.0, 0.0)).abs() < f64::EPSILON);
}

#[test]
fn enter_is_emitted_exactly_once() {
    let funnel = Uuid::new_v4();
    let mut session = CursorSession::new(Participant::generate(), funnel);

    let first = session.enter_once().expect("first enter");
    match first.body {
        EventBody::CursorEnter(hint) => {
            assert_eq!(hint.funnel_id, funnel);
            assert_eq!(hint.oder_id, session.participant().id);
        }
        other => panic!("expected cursor:enter, got {other:?}"),
    }

    assert!(session.enter_once().is_none());
}

#[test]
fn motion_is_throttled_and_carries_the_identity() {
    let funnel = Uuid::new_v4();
    let mut session = CursorSession::new(Participant::generate(), funnel);
    let start = Instant::now();

    let first = session.motion(12.5, 80.0, start).expect("first move allowed");
    match first.body {
        EventBody::CursorMove(m) => {
            assert_eq!(m.oder_id, session.participant().id);
            assert_eq!((m.x, m.y), (12.5, 80.0));
            assert_eq!(m.funnel_id, funnel);
        }
        other => panic!("expected cursor:move, got {other:?}"),
    }

    assert!(session.motion(13.0, 80.0, start + Duration::from_millis(10)).is_none());
    assert!(session.motion(14.0, 80.0, start + Duration::from_millis(60)).is_some());
}

#[test]
fn leave_is_never_throttled() {
    let funnel = Uuid::new_v4();
    let session = CursorSession::new(Participant::generate(), funnel);

    let leave = session.leave();
    assert!(matches!(leave.body, EventBody::CursorLeave(_)));
}
