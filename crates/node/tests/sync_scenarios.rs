//! End-to-end reconciliation scenarios over the in-memory room.
//!
//! Two or more nodes exchange the full wire protocol until quiescence; the
//! room transcript backs the message-count assertions.

mod common;

use peerset_primitives::{Hash, PeerId};
use peerset_sync::SyncPhase;

use common::{node_in, pump, record, records, uuid_set, Room, TestModerator};

// ============================================================
// S1: empty vs empty
// ============================================================

#[tokio::test(start_paused = true)]
async fn empty_nodes_exchange_only_roots() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    let empty_root = Hash::digest(b"");
    assert_eq!(a.root_hash(), empty_root);
    assert_eq!(b.root_hash(), empty_root);
    assert_eq!(a.record_count(), 0);
    assert_eq!(b.record_count(), 0);

    // Exactly two root announcements, nothing else.
    let transcript = room.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(room.count_kind("rootHash"), 2);
}

// ============================================================
// S2: one-way transfer of three records
// ============================================================

#[tokio::test(start_paused = true)]
async fn one_way_transfer_of_three_records() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    let admitted = a
        .add_records(records(&["u1", "u2", "u3"]))
        .await
        .expect("seed");
    assert_eq!(admitted, 3);

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    // B converged onto A's set; A is unchanged.
    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(uuid_set(&a.records().unwrap()), ["u1", "u2", "u3"]);
    assert_eq!(uuid_set(&b.records().unwrap()), ["u1", "u2", "u3"]);

    let transcript = room.transcript();

    // One batched record request carrying all three uuids, one reply.
    let requests: Vec<usize> = transcript
        .iter()
        .filter(|message| message.kind == "requestRecords")
        .map(|message| message.uuids)
        .collect();
    assert_eq!(requests, [3]);

    let replies: Vec<usize> = transcript
        .iter()
        .filter(|message| message.kind == "records")
        .map(|message| message.records)
        .collect();
    assert_eq!(replies, [3]);

    // Join exchange plus B's reverse announcement once its root caught up.
    assert_eq!(room.count_kind("rootHash"), 3);

    // Everyone idle afterwards.
    assert_eq!(a.phase(&PeerId::from("b")).await, Some(SyncPhase::Idle));
    assert_eq!(b.phase(&PeerId::from("a")).await, Some(SyncPhase::Idle));
}

// ============================================================
// S3: symmetric difference
// ============================================================

#[tokio::test(start_paused = true)]
async fn symmetric_difference_flows_both_ways() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    let _ = a.add_records(records(&["u1", "u2"])).await.expect("seed a");
    let _ = b.add_records(records(&["u2", "u3"])).await.expect("seed b");

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(uuid_set(&a.records().unwrap()), ["u1", "u2", "u3"]);
    assert_eq!(uuid_set(&b.records().unwrap()), ["u1", "u2", "u3"]);

    // Exactly u1 flowed a→b and exactly u3 flowed b→a.
    let transcript = room.transcript();
    let records_from = |from: &str| -> usize {
        transcript
            .iter()
            .filter(|message| message.kind == "records" && message.from == PeerId::from(from))
            .map(|message| message.records)
            .sum()
    };
    assert_eq!(records_from("a"), 1);
    assert_eq!(records_from("b"), 1);

    // Counters agree with the transcript.
    let a_stats = a.stats().await;
    let b_stats = b.stats().await;
    assert_eq!(a_stats[&PeerId::from("b")].records_sent, 1);
    assert_eq!(b_stats[&PeerId::from("a")].records_sent, 1);
}

// ============================================================
// S4: batching at scale
// ============================================================

#[tokio::test(start_paused = true)]
async fn large_transfer_batches_record_requests() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    let uuids: Vec<String> = (0..120).map(|n| format!("u{n:03}")).collect();
    let seed: Vec<&str> = uuids.iter().map(String::as_str).collect();
    let _ = a.add_records(records(&seed)).await.expect("seed");

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(b.record_count(), 120);

    // ⌈120/50⌉ requests; every one respects the size bound.
    let sizes: Vec<usize> = room
        .transcript()
        .iter()
        .filter(|message| message.kind == "requestRecords")
        .map(|message| message.uuids)
        .collect();

    assert_eq!(sizes.iter().sum::<usize>(), 120);
    assert_eq!(sizes.len(), 3);
    assert!(sizes.iter().all(|size| (1..=50).contains(size)));
}

// ============================================================
// S5: moderation rejection is a stable divergence
// ============================================================

#[tokio::test(start_paused = true)]
async fn rejected_record_diverges_stably() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::rejecting(&["u3"]));

    let _ = a
        .add_records(records(&["u1", "u2", "u3", "u4"]))
        .await
        .expect("seed");

    room.announce("a");
    room.announce("b");

    // Pump terminates: the divergence is stable, not a retry loop.
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(uuid_set(&a.records().unwrap()), ["u1", "u2", "u3", "u4"]);
    assert_eq!(uuid_set(&b.records().unwrap()), ["u1", "u2", "u4"]);
    assert_eq!(b.record_count(), 3);

    // The roots legitimately differ on the rejected uuid.
    assert_ne!(a.root_hash(), b.root_hash());

    // B asked exactly once; the rejected uuid is never re-requested.
    let record_requests = room
        .transcript()
        .iter()
        .filter(|message| message.kind == "requestRecords")
        .count();
    assert_eq!(record_requests, 1);
}

// ============================================================
// Convergence at scale (bandwidth bound)
// ============================================================

#[tokio::test(start_paused = true)]
async fn overlapping_sets_transfer_only_the_difference() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    // 10 shared, 15 only at A, 12 only at B.
    let shared: Vec<String> = (0..10).map(|n| format!("s{n:02}")).collect();
    let only_a: Vec<String> = (0..15).map(|n| format!("a{n:02}")).collect();
    let only_b: Vec<String> = (0..12).map(|n| format!("b{n:02}")).collect();

    let mut seed_a: Vec<&str> = shared.iter().map(String::as_str).collect();
    seed_a.extend(only_a.iter().map(String::as_str));
    let mut seed_b: Vec<&str> = shared.iter().map(String::as_str).collect();
    seed_b.extend(only_b.iter().map(String::as_str));

    let _ = a.add_records(records(&seed_a)).await.expect("seed a");
    let _ = b.add_records(records(&seed_b)).await.expect("seed b");

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(a.record_count(), 37);
    assert_eq!(b.record_count(), 37);

    // Records on the wire never exceed the symmetric difference.
    let transferred: usize = room
        .transcript()
        .iter()
        .filter(|message| message.kind == "records")
        .map(|message| message.records)
        .sum();
    assert_eq!(transferred, 15 + 12);
}

// ============================================================
// Seeded random sets
// ============================================================

/// Deterministic LCG so the scenario is reproducible.
fn lcg(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
    *seed >> 33
}

#[tokio::test(start_paused = true)]
async fn random_overlapping_sets_converge() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    let mut seed = 0x5eed_cafe;
    let mut seed_a = Vec::new();
    let mut seed_b = Vec::new();

    for n in 0..60 {
        let uuid = format!("r{n:02}");
        match lcg(&mut seed) % 3 {
            0 => seed_a.push(uuid),
            1 => seed_b.push(uuid),
            _ => {
                seed_a.push(uuid.clone());
                seed_b.push(uuid);
            }
        }
    }

    let refs_a: Vec<&str> = seed_a.iter().map(String::as_str).collect();
    let refs_b: Vec<&str> = seed_b.iter().map(String::as_str).collect();
    let _ = a.add_records(records(&refs_a)).await.expect("seed a");
    let _ = b.add_records(records(&refs_b)).await.expect("seed b");

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(a.record_count(), 60);
    assert_eq!(b.record_count(), 60);
    assert_eq!(a.records().unwrap(), b.records().unwrap());
}

// ============================================================
// Three peers
// ============================================================

#[tokio::test(start_paused = true)]
async fn three_peers_converge() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());
    let c = node_in(&room, "c", TestModerator::default());

    let _ = a.add_records(records(&["u1"])).await.expect("seed a");
    let _ = b.add_records(records(&["u2"])).await.expect("seed b");

    room.announce("a");
    room.announce("b");
    room.announce("c");
    pump(&room, &[("a", &a), ("b", &b), ("c", &c)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(b.root_hash(), c.root_hash());
    assert_eq!(uuid_set(&c.records().unwrap()), ["u1", "u2"]);
}

// ============================================================
// Boundary: leaving mid-sync
// ============================================================

#[tokio::test(start_paused = true)]
async fn peer_leaving_mid_sync_cleans_up() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    let _ = a.add_records(records(&["u1", "u2", "u3"])).await.expect("seed");

    room.announce("a");
    room.announce("b");

    // Deliver only the membership and root exchange, then rip B out while
    // the descent is in flight.
    for _ in 0..4 {
        if let Some(event) = room.poll(&PeerId::from("a")) {
            a.handle_event(event).await;
        }
        if let Some(event) = room.poll(&PeerId::from("b")) {
            b.handle_event(event).await;
        }
    }

    room.leave("b");
    pump(&room, &[("a", &a)]).await;

    assert_eq!(a.phase(&PeerId::from("b")).await, None);
    assert!(a.is_quiescent().await);
    assert_eq!(uuid_set(&a.records().unwrap()), ["u1", "u2", "u3"]);
}

// ============================================================
// Local publish after convergence (reverse propagation)
// ============================================================

#[tokio::test(start_paused = true)]
async fn later_local_publish_propagates() {
    let room = Room::new();
    let a = node_in(&room, "a", TestModerator::default());
    let b = node_in(&room, "b", TestModerator::default());

    room.announce("a");
    room.announce("b");
    pump(&room, &[("a", &a), ("b", &b)]).await;
    room.clear_transcript();

    let _ = a.add_records(vec![record("late-1")]).await.expect("publish");
    pump(&room, &[("a", &a), ("b", &b)]).await;

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(uuid_set(&b.records().unwrap()), ["late-1"]);
}
