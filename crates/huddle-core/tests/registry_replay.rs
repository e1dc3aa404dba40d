mod common;

use std::collections::BTreeSet;

use common::MemoryTransport;
use huddle_core::participants::Participant;
use huddle_core::{ParticipantRegistry, SignalingClient};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const PEERS: &[&str] = &["u2", "u3", "u4", "u5", "u6"];

fn peer_frame(event: &str, id: &str) -> String {
    json!({"event": event, "data": {"userId": id, "username": format!("peer {id}")}}).to_string()
}

fn joined(id: &str) -> String {
    peer_frame("user-joined", id)
}

fn left(id: &str) -> String {
    peer_frame("user-left", id)
}

fn registry_ids(registry: &ParticipantRegistry) -> BTreeSet<String> {
    registry.snapshot().into_iter().map(|p| p.id).collect()
}

#[test]
fn random_join_leave_sequences_track_the_room() {
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut client = SignalingClient::new(MemoryTransport::new());
        let mut registry = ParticipantRegistry::new();
        registry.set_local_id("u1".to_string());
        let mut expected = BTreeSet::new();

        for _ in 0..200 {
            let id = PEERS[rng.gen_range(0..PEERS.len())];
            match rng.gen_range(0..5) {
                0 | 1 => {
                    client.dispatch(&joined(id), &mut registry);
                    expected.insert(id.to_string());
                }
                2 | 3 => {
                    client.dispatch(&left(id), &mut registry);
                    expected.remove(id);
                }
                _ => {
                    // Our own identity echoed back must never be tracked.
                    client.dispatch(&joined("u1"), &mut registry);
                }
            }
            assert_eq!(registry_ids(&registry), expected, "seed {seed}");
        }
    }
}

#[test]
fn duplicate_joins_do_not_duplicate_entries() {
    let mut client = SignalingClient::new(MemoryTransport::new());
    let mut registry = ParticipantRegistry::new();

    client.dispatch(&joined("u2"), &mut registry);
    client.dispatch(&joined("u2"), &mut registry);
    assert_eq!(registry.participant_count(), 1);
}

#[test]
fn unknown_identities_are_no_ops() {
    let mut client = SignalingClient::new(MemoryTransport::new());
    let mut registry = ParticipantRegistry::new();
    registry.upsert(Participant::new("u2", "Bob"));

    let mute = json!({"event": "user-mute-toggle", "data": {"userId": "ghost", "isMuted": true}});
    client.dispatch(&mute.to_string(), &mut registry);
    assert!(registry.apply_video_state("ghost", true).is_none());
    assert!(!registry.remove("ghost"));

    assert!(registry.remove("u2"));
    assert!(!registry.remove("u2"));
    assert_eq!(registry.participant_count(), 0);
}
