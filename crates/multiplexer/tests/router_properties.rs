//! Lifecycle and routing properties of the session router.
//!
//! These tests drive a `SessionRouter` directly with a recording backend and
//! spy views:
//! - id uniqueness across churn
//! - active-session validity and neighbor selection on destroy
//! - no output delivery after teardown
//! - idempotent switching and lazy resize of background sessions

mod support;

use std::collections::HashSet;

use multiplexer::{Dimensions, RouterConfig, RouterError, SessionId, SessionState};
use support::{Call, Harness, ViewEvent};

fn assert_active_valid(h: &Harness) {
    let ids = h.router.all_ids();
    match h.router.active_id() {
        Some(active) => assert!(ids.contains(&active), "active id {active} not live"),
        None => assert!(ids.is_empty(), "no active id while sessions exist"),
    }
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_ids_unique_across_destroy_and_recreate() {
    let mut h = Harness::new();
    let mut seen = HashSet::new();

    for _ in 0..20 {
        let a = h.create().await;
        let b = h.create().await;
        assert!(seen.insert(a.clone()));
        assert!(seen.insert(b.clone()));

        h.backend.emit_destroyed(&a);
        h.backend.emit_destroyed(&b);
        h.pump();
        assert!(h.router.all_ids().is_empty());
    }

    assert_eq!(seen.len(), 40);
}

// =============================================================================
// Active session and neighbor selection
// =============================================================================

#[tokio::test]
async fn test_active_always_valid() {
    let mut h = Harness::new();
    assert_active_valid(&h);

    let a = h.create().await;
    assert_active_valid(&h);
    let b = h.create().await;
    let c = h.create().await;
    assert_active_valid(&h);

    h.router.switch_to(&a).unwrap();
    assert_active_valid(&h);

    for id in [&b, &a, &c] {
        h.backend.emit_destroyed(id);
        h.pump();
        assert_active_valid(&h);
    }
    assert_eq!(h.router.active_id(), None);
}

#[tokio::test]
async fn test_destroying_middle_tab_activates_right_neighbor() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;
    let c = h.create().await;
    let d = h.create().await;
    assert_eq!(h.router.all_ids(), vec![a.clone(), b.clone(), c.clone(), d.clone()]);

    h.router.switch_to(&c).unwrap();
    h.backend.emit_destroyed(&c);
    h.pump();

    assert_eq!(h.router.active_id(), Some(d.clone()));
    assert_eq!(h.router.all_ids(), vec![a.clone(), b.clone(), d.clone()]);

    h.backend.emit_destroyed(&d);
    h.pump();

    // Last tab wraps to the first, not the left neighbor.
    assert_eq!(h.router.active_id(), Some(a.clone()));
    assert_eq!(h.router.all_ids(), vec![a, b]);
}

#[tokio::test]
async fn test_destroying_first_tab_does_not_stay_on_first() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;
    let _c = h.create().await;

    h.router.switch_to(&a).unwrap();
    h.backend.emit_destroyed(&a);
    h.pump();

    assert_eq!(h.router.active_id(), Some(b));
}

#[tokio::test]
async fn test_destroying_background_session_keeps_focus() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;

    h.backend.emit_destroyed(&a);
    h.pump();

    assert_eq!(h.router.active_id(), Some(b.clone()));
    // The survivor was not re-focused.
    assert_eq!(h.views.count(&b, &ViewEvent::Focused), 1);
}

#[tokio::test]
async fn test_single_survivor_destroy_leaves_no_active() {
    let mut h = Harness::new();
    let a = h.create().await;
    let mut focus = h.router.subscribe_focus();

    h.backend.emit_destroyed(&a);
    h.pump();

    assert_eq!(h.router.active_id(), None);
    assert!(h.router.all_ids().is_empty());

    let change = focus.try_recv().unwrap();
    assert_eq!(change.previous, Some(a));
    assert_eq!(change.current, None);

    // Nothing is respawned behind the caller's back.
    assert_eq!(
        h.backend
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Spawn(_)))
            .count(),
        1
    );
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_no_ghost_delivery_after_destroy() {
    let mut h = Harness::new();
    let x = h.create().await;
    let _y = h.create().await;

    h.backend.emit_destroyed(&x);
    h.backend.emit_output(&x, b"late output");
    h.pump();

    let events = h.views.events(&x);
    assert_eq!(events.last(), Some(&ViewEvent::Disposed));
    assert_eq!(h.views.count(&x, &ViewEvent::Disposed), 1);
    assert!(!events.contains(&ViewEvent::Rendered(b"late output".to_vec())));
}

#[tokio::test]
async fn test_trailing_output_delivered_before_destroy() {
    let mut h = Harness::new();
    let x = h.create().await;

    h.backend.emit_output(&x, b"one");
    h.backend.emit_output(&x, b"two");
    h.backend.emit_destroyed(&x);
    h.pump();

    let rendered: Vec<ViewEvent> = h
        .views
        .events(&x)
        .into_iter()
        .filter(|event| matches!(event, ViewEvent::Rendered(_)))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ViewEvent::Rendered(b"one".to_vec()),
            ViewEvent::Rendered(b"two".to_vec())
        ]
    );
}

#[tokio::test]
async fn test_close_is_a_write_and_teardown_waits_for_backend() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;

    h.router.close_session(&b);

    // The request went through the normal write path.
    assert_eq!(h.backend.writes_for(&b), vec![b"exit\n".to_vec()]);
    // Nothing is removed until the backend says so.
    assert_eq!(h.router.all_ids(), vec![a.clone(), b.clone()]);
    assert_eq!(h.router.sessions()[1].state, SessionState::Destroying);

    h.pump();

    assert_eq!(h.router.all_ids(), vec![a.clone()]);
    assert_eq!(h.router.active_id(), Some(a));
    assert!(h
        .views
        .events(&b)
        .contains(&ViewEvent::Rendered(b"logout\r\n".to_vec())));
}

#[tokio::test]
async fn test_terminate_tears_down_through_destroy_event() {
    let mut h = Harness::new();
    let a = h.create().await;

    h.router.terminate(&a);
    assert_eq!(h.router.all_ids(), vec![a.clone()]);

    h.pump();
    assert!(h.router.all_ids().is_empty());
    assert!(h.backend.calls().contains(&Call::Terminate(a)));
}

#[tokio::test]
async fn test_duplicate_destroy_is_ignored() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;

    h.backend.emit_destroyed(&a);
    h.backend.emit_destroyed(&a);
    h.pump();

    assert_eq!(h.router.all_ids(), vec![b]);
    assert_eq!(h.views.count(&a, &ViewEvent::Disposed), 1);
}

// =============================================================================
// Switching and resizing
// =============================================================================

#[tokio::test]
async fn test_switch_to_active_is_noop() {
    let mut h = Harness::new();
    let a = h.create().await;
    let events_before = h.views.events(&a);
    let calls_before = h.backend.calls();
    let mut focus = h.router.subscribe_focus();

    h.views.set_viewport(Dimensions::new(50, 200));
    h.router.switch_to(&a).unwrap();

    assert_eq!(h.views.events(&a), events_before);
    assert_eq!(h.backend.calls(), calls_before);
    assert!(focus.try_recv().is_err());
}

#[tokio::test]
async fn test_switch_to_unknown_is_not_found() {
    let mut h = Harness::new();
    let a = h.create().await;
    let stale = SessionId::new();

    let result = h.router.switch_to(&stale);

    assert!(matches!(result, Err(RouterError::NotFound(id)) if id == stale));
    assert_eq!(h.router.active_id(), Some(a));
}

#[tokio::test]
async fn test_background_session_resized_lazily_on_switch() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;

    // Window grows while b is in front: only b follows.
    h.views.set_viewport(Dimensions::new(40, 132));
    h.router.resize(&b, Dimensions::new(40, 132));
    assert_eq!(h.backend.resizes_for(&a), vec![Dimensions::new(24, 80)]);

    h.router.switch_to(&a).unwrap();

    assert_eq!(
        h.backend.resizes_for(&a),
        vec![Dimensions::new(24, 80), Dimensions::new(40, 132)]
    );
    assert_eq!(
        h.backend.resizes_for(&b),
        vec![Dimensions::new(24, 80), Dimensions::new(40, 132)]
    );
}

#[tokio::test]
async fn test_switch_blurs_old_then_focuses_new() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;

    h.router.switch_to(&a).unwrap();

    assert_eq!(h.views.last_event(&b), Some(ViewEvent::Blurred));
    assert_eq!(h.views.last_event(&a), Some(ViewEvent::Focused));
}

// =============================================================================
// Races with teardown
// =============================================================================

#[tokio::test]
async fn test_write_after_close_is_harmless() {
    let mut h = Harness::new();
    let a = h.create().await;
    let b = h.create().await;
    h.backend.emit_destroyed(&b);
    h.pump();
    let calls_before = h.backend.calls();

    h.router.write(&b, b"ls\n");
    h.router.resize(&b, Dimensions::new(10, 10));
    h.router.close_session(&b);
    h.router.terminate(&b);

    assert_eq!(h.backend.calls(), calls_before);
    assert_eq!(h.router.all_ids(), vec![a]);
}

#[tokio::test]
async fn test_local_input_reaches_backend() {
    let mut h = Harness::new();
    let a = h.create().await;

    h.router.write(&a, b"echo hi\n");

    assert_eq!(h.backend.writes_for(&a), vec![b"echo hi\n".to_vec()]);
}

// =============================================================================
// Creation failures
// =============================================================================

#[tokio::test]
async fn test_spawn_failure_leaves_no_partial_session() {
    let mut h = Harness::new();
    let a = h.create().await;
    h.backend.fail_spawns(true);

    let result = h.router.create_session().await;

    assert!(matches!(result, Err(RouterError::BackendSpawnFailed(_))));
    assert_eq!(h.router.all_ids(), vec![a.clone()]);
    assert_eq!(h.router.active_id(), Some(a.clone()));
    // The existing session was never blurred.
    assert_eq!(h.views.last_event(&a), Some(ViewEvent::Focused));
    assert_eq!(h.views.view_count(), 2);
}

#[tokio::test]
async fn test_session_limit_counts_live_sessions() {
    let mut h = Harness::with_config(RouterConfig {
        max_sessions: Some(2),
        ..Default::default()
    });
    let a = h.create().await;
    let _b = h.create().await;

    assert!(matches!(
        h.router.create_session().await,
        Err(RouterError::SessionLimit(2))
    ));

    h.backend.emit_destroyed(&a);
    h.pump();
    assert!(h.router.create_session().await.is_ok());
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[tokio::test]
async fn test_two_session_scenario() {
    let mut h = Harness::new();

    let s1 = h.create().await;
    assert_eq!(h.router.all_ids(), vec![s1.clone()]);
    assert_eq!(h.router.active_id(), Some(s1.clone()));

    let s2 = h.create().await;
    assert_eq!(h.router.all_ids(), vec![s1.clone(), s2.clone()]);
    assert_eq!(h.router.active_id(), Some(s2.clone()));

    h.views.set_viewport(Dimensions::new(30, 100));
    h.router.switch_to(&s1).unwrap();
    assert_eq!(h.router.active_id(), Some(s1.clone()));
    assert_eq!(h.views.last_event(&s2), Some(ViewEvent::Blurred));
    assert_eq!(h.views.last_event(&s1), Some(ViewEvent::Focused));
    assert_eq!(
        h.backend.resizes_for(&s1).last(),
        Some(&Dimensions::new(30, 100))
    );

    h.backend.emit_destroyed(&s1);
    h.pump();
    assert_eq!(h.router.active_id(), Some(s2.clone()));
    assert_eq!(h.router.all_ids(), vec![s2.clone()]);
    assert_eq!(h.views.last_event(&s2), Some(ViewEvent::Focused));
}
