//! Scenario-style integration tests driving [`ReplicaState`] end to end
//! through a handful of replicas, standing in for scenarios that would
//! otherwise need a live Spines/Prime cluster. Each test plays the role of
//! Prime (feeding ordinals), the local state machine (replying to
//! `on_sm_reply`), and the internal overlay (delivering broadcast shares
//! between replicas) by hand.

use std::sync::Arc;

use spire_cluster::ClusterState;
use spire_config::{KeyMaterial, Paths};
use spire_types::{Ordinal, ReplicaId, SeqPair};
use spire_wire::{tc_digest, BenchmarkPayload, ConfigMessage, Envelope, MessagePayload, ReplicaSlot, ReplicaType, ScadaPayload};

use crate::normal::SmReply;
use crate::output::ReplicationOutput;
use crate::state::ReplicaState;

fn slot(id: u32) -> ReplicaSlot {
    ReplicaSlot {
        tpm_based_id: id,
        replica_type: ReplicaType::ControlCenter,
        external_addr: format!("127.0.0.1:{}", 10000 + id),
        internal_addr: format!("127.0.0.1:{}", 11000 + id),
    }
}

fn config(n: u32, f: u32, k: u32) -> ConfigMessage {
    ConfigMessage {
        n,
        f,
        k,
        num_cc_replicas: n,
        num_cc_sites: 1,
        num_dc_sites: 0,
        slots: (0..n).map(slot).collect(),
        global_configuration_number: 1,
    }
}

/// Builds `n` replicas sharing one key directory and cluster configuration,
/// ready to exchange internal-overlay traffic with each other.
fn build_replicas(n: u32, f: u32, k: u32) -> (Vec<Option<ReplicaState>>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::new(dir.path());
    for id in 0..n {
        KeyMaterial::generate_for_test(&paths, ReplicaId::new(id), true, [id as u8; 32]).unwrap();
    }
    let cfg = config(n, f, k);
    let replicas = (0..n)
        .map(|id| {
            let cluster = ClusterState::new(cfg.clone());
            let keys = KeyMaterial::load_replica(&paths, ReplicaId::new(id), &cluster).unwrap();
            Some(ReplicaState::new(ReplicaId::new(id), 0, 1, cluster, Arc::new(keys)))
        })
        .collect();
    (replicas, dir)
}

fn benchmark(ord_num: u64, event_idx: u32) -> ScadaPayload {
    ScadaPayload::Benchmark(BenchmarkPayload {
        seq: SeqPair::new(ord_num, event_idx),
        ping_sec: 0,
        ping_usec: 0,
        pong_sec: 0,
        pong_usec: 0,
    })
}

/// Plays one Prime-ordered round for `scada` at ordinal `o` across every
/// replica: `on_prime_ordered` delivers it to each replica's local state
/// machine, `on_sm_reply` answers for every replica *not* listed in
/// `abstain` (standing in for a Byzantine replica that refuses to sign),
/// and each produced share is broadcast to every other replica's
/// `on_internal_message`. Returns the merged output for each replica.
fn run_round(replicas: &mut [Option<ReplicaState>], o: Ordinal, scada: ScadaPayload, abstain: &[usize]) -> Vec<ReplicationOutput> {
    let n = replicas.len();
    let mut merged: Vec<ReplicationOutput> = (0..n).map(|_| ReplicationOutput::empty()).collect();

    for i in 0..n {
        let state = replicas[i].take().unwrap();
        let (state, output) = state.on_prime_ordered(o, MessagePayload::Scada(scada.clone()));
        merged[i].merge(output);
        replicas[i] = Some(state);
    }

    let mut broadcasts: Vec<(usize, Envelope)> = Vec::new();
    for i in 0..n {
        if abstain.contains(&i) {
            continue;
        }
        let state = replicas[i].take().unwrap();
        let (state, output) = state.on_sm_reply(SmReply::Scada(scada.clone()));
        for (_target, envelope) in &output.to_internal {
            broadcasts.push((i, envelope.clone()));
        }
        merged[i].merge(output);
        replicas[i] = Some(state);
    }

    for (sender, envelope) in broadcasts {
        for j in 0..n {
            if j == sender {
                continue;
            }
            let state = replicas[j].take().unwrap();
            let (state, output) = state.on_internal_message(envelope.clone());
            merged[j].merge(output);
            replicas[j] = Some(state);
        }
    }

    merged
}

/// Scenario 1: single client round trip. Six replicas, f=1, k=1
/// (`n = 3f + 2k + 1`); a client's BENCHMARK update is ordered once and
/// every correct replica independently assembles the threshold-signed
/// reply once its own share plus `f+1` peer shares are present.
#[test]
fn single_client_round_trip() {
    let (mut replicas, _dir) = build_replicas(6, 1, 1);
    let o = Ordinal::new(1, 1, 1);
    let scada = benchmark(1000, 1);

    let outputs = run_round(&mut replicas, o, scada.clone(), &[]);

    let reply = &outputs[0];
    assert_eq!(reply.to_client.len(), 1);
    let MessagePayload::TcFinal { ordinal, payload, .. } = &reply.to_client[0].payload else {
        panic!("expected a TC_FINAL envelope");
    };
    assert!(*ordinal >= o);
    assert_eq!(**payload, scada);
    assert_eq!(replicas[0].as_ref().unwrap().applied_ord(), o);
}

/// Scenario 2: duplicate suppression. The same `seq_pair` arrives at two
/// consecutive ordinals (the client's retransmit, re-ordered by Prime as a
/// second event); the second delivery must never reach the state machine.
#[test]
fn duplicate_seq_pair_is_suppressed_after_the_first_delivery() {
    let (mut replicas, _dir) = build_replicas(4, 1, 0);
    let state = replicas[0].take().unwrap();
    let scada = benchmark(1000, 1);

    let first = Ordinal::new(1, 1, 2);
    let (state, output) = state.on_prime_ordered(first, MessagePayload::Scada(scada.clone()));
    assert_eq!(output.to_state_machine.len(), 1);

    let second = Ordinal::new(1, 2, 2);
    let (state, output) = state.on_prime_ordered(second, MessagePayload::Scada(scada));
    assert!(output.to_state_machine.is_empty());
    assert!(state.tc_queue.contains_key(&second));
    assert!(state.tc_queue[&second].skip);

    replicas[0] = Some(state);
}

/// Scenario 3: TC liveness with one Byzantine replica. Four control-center
/// replicas, f=1; one refuses to sign. The remaining three correct shares
/// satisfy `f+1 = 2`, so the reply still reaches the client.
#[test]
fn tc_liveness_survives_one_byzantine_replica() {
    let (mut replicas, _dir) = build_replicas(4, 1, 0);
    let o = Ordinal::new(1, 1, 1);
    let scada = benchmark(42, 1);

    let byzantine = 3;
    let outputs = run_round(&mut replicas, o, scada, &[byzantine]);

    for (i, output) in outputs.iter().enumerate() {
        if i == byzantine {
            continue;
        }
        assert_eq!(output.to_client.len(), 1, "replica {i} should have assembled the reply");
    }
    assert!(outputs[byzantine].to_client.is_empty(), "a replica that never shares never assembles on its own");
}

/// Scenario 6: out-of-order share arrival. Shares for the later ordinal
/// complete their quorum first; delivery to the client must still wait for
/// the earlier ordinal, then deliver both in ordinal order. Drives
/// `insert_tc_share` directly (rather than through `on_prime_ordered`) since
/// this scenario is about TC-queue drain ordering, not about how a replica
/// reacts to a gap in the ordered stream it has never seen before.
#[test]
fn out_of_order_shares_still_deliver_in_ordinal_order() {
    let (mut replicas, _dir) = build_replicas(4, 1, 0);
    let replica = replicas[0].take().unwrap();
    let o_early = Ordinal::new(1, 1, 1);
    let o_late = Ordinal::new(2, 1, 1);
    let scada_early = benchmark(5, 1);
    let scada_late = benchmark(5, 2);

    let digest_late = tc_digest(o_late, &scada_late);
    let share0_late = replica.keys.threshold_share().unwrap().sign_share(&digest_late);
    let (replica, output) = replica.insert_tc_share(o_late, ReplicaId::new(0), share0_late, Some(scada_late.clone()));
    assert!(output.to_client.is_empty());
    let share1_late = replica.keys.threshold_share().unwrap().sign_share(&digest_late);
    let (replica, output) = replica.insert_tc_share(o_late, ReplicaId::new(1), share1_late, None);
    assert!(output.to_client.is_empty(), "node 5 alone must not unblock delivery");
    assert!(replica.tc_queue[&o_late].done);

    let digest_early = tc_digest(o_early, &scada_early);
    let share0_early = replica.keys.threshold_share().unwrap().sign_share(&digest_early);
    let (replica, _) = replica.insert_tc_share(o_early, ReplicaId::new(0), share0_early, Some(scada_early.clone()));
    let share1_early = replica.keys.threshold_share().unwrap().sign_share(&digest_early);
    let (replica, output) = replica.insert_tc_share(o_early, ReplicaId::new(1), share1_early, None);

    assert_eq!(output.to_client.len(), 2, "both nodes should drain together once the earlier one completes");
    let (MessagePayload::TcFinal { ordinal: first_ord, payload: first_payload, .. }, MessagePayload::TcFinal { ordinal: second_ord, payload: second_payload, .. }) =
        (&output.to_client[0].payload, &output.to_client[1].payload)
    else {
        panic!("expected two TC_FINAL envelopes");
    };
    assert_eq!(*first_ord, o_early);
    assert_eq!(**first_payload, scada_early);
    assert_eq!(*second_ord, o_late);
    assert_eq!(**second_payload, scada_late);
    assert_eq!(replica.applied_ord(), o_late);

    replicas[0] = Some(replica);
}
