//! Behavioral tests of the chat core through its public API.

mod common;

use common::{connect_at, plain_lines, test_channels, test_core, STAFF_NODE};
use parley::chat::{format_channel_message, Focus, StoredChatState};
use parley::{ChannelDefinition, ChannelRegistry, ChatError, Outbox, Position, UserId};

fn assert_consistent(core: &parley::ChatCore) {
    for user in core.users() {
        assert!(
            user.state().is_consistent(),
            "focus without membership for {}",
            user.id
        );
        for always_on in core.registry().always_on() {
            assert!(user.state().is_joined(&always_on.name));
        }
    }
}

#[test]
fn test_focus_implies_membership_across_transitions() {
    let (mut core, permissions) = test_core(1);
    let alice = connect_at(&mut core, "alice", 0.0);
    let bob = connect_at(&mut core, "bob", 5.0);
    permissions.grant(&alice, STAFF_NODE);
    permissions.grant(&bob, STAFF_NODE);
    let mut out = Outbox::new();

    core.join(&alice, "trade", &mut out).unwrap();
    assert_consistent(&core);
    core.focus_channel(&alice, "staff", &mut out).unwrap();
    assert_consistent(&core);
    core.focus_channel(&bob, "staff", &mut out).unwrap();
    core.leave(&alice, "staff", &mut out).unwrap();
    assert_consistent(&core);

    permissions.revoke(&bob, STAFF_NODE);
    core.auto_leave(&bob, "staff", &mut out);
    assert_consistent(&core);
    assert_eq!(core.focused_channel(&bob), Some("global"));

    let mut defs = test_channels();
    defs.retain(|d| d.name != "trade");
    core.reload(defs, "global", &mut out);
    assert_consistent(&core);
    assert!(!core.user(&alice).unwrap().state().is_joined("trade"));
}

#[test]
fn test_always_on_cannot_be_left() {
    let (mut core, _) = test_core(2);
    let alice = connect_at(&mut core, "alice", 0.0);
    let mut out = Outbox::new();
    assert_eq!(
        core.leave(&alice, "global", &mut out),
        Err(ChatError::AlwaysOnChannel("global".to_string()))
    );
    assert!(core.user(&alice).unwrap().state().is_joined("global"));
}

#[test]
fn test_reload_joins_new_always_on_channel() {
    let (mut core, _) = test_core(3);
    let alice = connect_at(&mut core, "alice", 0.0);
    let mut defs = test_channels();
    defs.push(ChannelDefinition::new("news", "n", "[N]").always_on());

    let mut out = Outbox::new();
    assert_eq!(core.reload(defs, "global", &mut out), 5);
    assert!(core.user(&alice).unwrap().state().is_joined("news"));
    assert!(plain_lines(&out, &alice)
        .iter()
        .any(|l| l == "Joined channel: [N] news"));
}

#[test]
fn test_persist_round_trip() {
    let (mut core, _) = test_core(4);
    let alice = connect_at(&mut core, "alice", 0.0);
    let mut out = Outbox::new();
    core.join(&alice, "trade", &mut out).unwrap();
    core.focus_channel(&alice, "local", &mut out).unwrap();

    let stored = core.disconnect(&alice, &mut out).unwrap();
    assert_eq!(stored, StoredChatState::new(["global", "local", "trade"], Some("local")));

    core.connect(alice.clone(), "alice", Position::default(), stored, &mut out)
        .unwrap();
    assert_eq!(
        core.snapshot(&alice),
        Some(StoredChatState::new(["global", "local", "trade"], Some("local")))
    );
}

#[test]
fn test_restore_drops_removed_channels_and_bad_focus() {
    let (mut core, _) = test_core(5);
    let alice = UserId::new("alice");
    let stored = StoredChatState::new(["global", "gone", "staff"], Some("gone"));

    let mut out = Outbox::new();
    core.connect(alice.clone(), "Alice", Position::default(), stored, &mut out)
        .unwrap();

    let snapshot = core.snapshot(&alice).unwrap();
    assert_eq!(snapshot.joined.iter().collect::<Vec<_>>(), vec!["global"]);
    assert_eq!(snapshot.focus.as_deref(), Some("global"));
}

#[test]
fn test_self_delivery_is_never_obscured() {
    let (mut core, _) = test_core(6);
    let alice = connect_at(&mut core, "alice", 0.0);
    let mut out = Outbox::new();
    core.focus_channel(&alice, "local", &mut out).unwrap();

    let mut out = Outbox::new();
    core.send_to_channel(&alice, "local", "quiet words$", &mut out)
        .unwrap();
    let lines = out.lines_for(&alice);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("quiet words"));
    assert!(!lines[0].contains("&8."));
}

fn obscured_count(core: &mut parley::ChatCore, distance: f64, message: &str) -> Option<usize> {
    let sender = UserId::new("sender");
    let listener = UserId::new("listener");
    let mut out = Outbox::new();
    core.move_user(&listener, Position::new(distance, 0.0, 0.0))
        .unwrap();
    core.send_to_channel(&sender, "local", message, &mut out)
        .unwrap();
    out.lines_for(&listener)
        .first()
        .map(|line| line.matches("&8.").count())
}

#[test]
fn test_obscuring_is_monotonic_in_distance() {
    let (mut core, _) = test_core(7);
    let sender = connect_at(&mut core, "sender", 0.0);
    let listener = connect_at(&mut core, "listener", 0.0);
    let mut out = Outbox::new();
    core.join(&sender, "local", &mut out).unwrap();
    core.join(&listener, "local", &mut out).unwrap();

    let message = "a".repeat(400);
    assert_eq!(obscured_count(&mut core, 50.0, &message), Some(0));
    let near = obscured_count(&mut core, 60.0, &message).unwrap();
    let mid = obscured_count(&mut core, 75.0, &message).unwrap();
    let far = obscured_count(&mut core, 90.0, &message).unwrap();
    assert!(0 < near && near < mid && mid < far, "{near} {mid} {far}");
    assert_eq!(obscured_count(&mut core, 100.0, &message), Some(400));
    assert_eq!(obscured_count(&mut core, 100.5, &message), None);
}

#[test]
fn test_plain_range_channel_is_never_obscured() {
    let (mut core, _) = test_core(8);
    let sender = connect_at(&mut core, "sender", 0.0);
    let listener = connect_at(&mut core, "listener", 29.0);
    let mut out = Outbox::new();
    core.join(&sender, "trade", &mut out).unwrap();
    core.join(&listener, "trade", &mut out).unwrap();

    let mut out = Outbox::new();
    core.send_to_channel(&sender, "trade", "selling", &mut out)
        .unwrap();
    assert_eq!(plain_lines(&out, &listener), vec!["[T] sender: selling"]);
}

#[test]
fn test_local_exclaim_scenario() {
    let (mut core, _) = test_core(9);
    let alice = connect_at(&mut core, "alice", 0.0);
    let mut out = Outbox::new();

    core.handle_chat(&alice, "l:hello!", &mut out).unwrap();

    let state = core.user(&alice).unwrap().state();
    assert!(state.is_focused_on("local"));
    assert!(state.is_joined("local"));

    let local = core.registry().by_name("local").unwrap().clone();
    let details = format_channel_message(&local, "alice", "hello!");
    assert_eq!(details.plain_content, "hello");
    assert_eq!(details.effective_range, 75);
    assert!(details.header.contains("exclaims:"));

    let own = plain_lines(&out, &alice);
    assert_eq!(own.last().map(String::as_str), Some("[L] alice exclaims: hello"));
}

#[test]
fn test_permission_loss_during_fan_out() {
    let (mut core, permissions) = test_core(10);
    let alice = connect_at(&mut core, "alice", 0.0);
    let bob = connect_at(&mut core, "bob", 0.0);
    permissions.grant(&alice, STAFF_NODE);
    permissions.grant(&bob, STAFF_NODE);
    let mut out = Outbox::new();
    core.join(&alice, "staff", &mut out).unwrap();
    core.focus_channel(&bob, "staff", &mut out).unwrap();

    permissions.revoke(&bob, STAFF_NODE);
    let mut out = Outbox::new();
    assert_eq!(core.send_to_channel(&alice, "staff", "meeting", &mut out), Ok(1));

    let bob_state = core.user(&bob).unwrap().state();
    assert!(!bob_state.is_joined("staff"));
    assert_eq!(bob_state.focus(), Some(&Focus::Channel("global".to_string())));
    let bob_lines = plain_lines(&out, &bob);
    assert_eq!(bob_lines.len(), 1);
    assert!(bob_lines[0].contains("automatically removed from channel 'staff'"));
    assert!(bob_lines[0].contains("it was your focus"));
}

#[test]
fn test_dm_prefix_without_history_changes_nothing() {
    let (mut core, _) = test_core(11);
    let alice = connect_at(&mut core, "alice", 0.0);
    let bob = connect_at(&mut core, "bob", 0.0);
    let mut out = Outbox::new();

    assert_eq!(
        core.handle_chat(&alice, "d:hey", &mut out),
        Err(ChatError::NoRecentDm)
    );
    assert!(out.deliveries().is_empty());
    assert_eq!(core.focused_channel(&alice), Some("global"));
    assert!(core.user(&bob).unwrap().state().last_incoming_dm_sender().is_none());
}

#[test]
fn test_dm_focus_repaired_when_target_leaves() {
    let (mut core, _) = test_core(12);
    let alice = connect_at(&mut core, "alice", 0.0);
    let bob = connect_at(&mut core, "bob", 0.0);
    let mut out = Outbox::new();
    core.focus_dm(&alice, &bob, &mut out).unwrap();

    let mut out = Outbox::new();
    core.disconnect(&bob, &mut out);
    assert_eq!(core.focused_channel(&alice), Some("global"));
    assert_eq!(
        plain_lines(&out, &alice),
        vec!["bob is no longer online. Focused channel: [G] global"]
    );
}

#[test]
fn test_duplicate_channel_names() {
    let registry = ChannelRegistry::from_definitions(
        vec![
            ChannelDefinition::new("trade", "t", "[T]"),
            ChannelDefinition::new("trade", "x", "[X]"),
        ],
        "trade",
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.by_name("trade").unwrap().display_prefix, "[T]");
    assert!(registry.by_shortcut("x").is_none());
}
