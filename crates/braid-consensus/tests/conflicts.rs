//! End-to-end conflict scenarios through `ConsensusEngine::process`.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use braid_consensus::VoidedTransition;
use braid_core::error::ConsensusError;
use braid_dag::store::{DagRead, MemoryStore};
use braid_dag::twin::{make_twin, TwinOptions};

use common::Harness;

fn harness() -> Harness<MemoryStore> {
    Harness::new(Arc::new(MemoryStore::new()))
}

#[test]
fn re_resolution_flips_the_winner() {
    let h = harness();
    let fan = h.fan_out(4);

    let a = h.tx([h.g1, h.g2], &[(fan, 0)], &[1], 10.0);
    let b = h.tx([h.g1, h.g2], &[(fan, 0)], &[1, 0], 12.0);
    let (a_id, b_id) = (a.id(), b.id());

    h.engine.process(a).unwrap();
    assert!(h.voided_by(&a_id).is_empty());

    let changes = h.engine.process(b).unwrap();
    assert_eq!(h.voided_by(&a_id), vec![b_id]);
    assert!(h.voided_by(&b_id).is_empty());
    assert_eq!(changes.newly_voided(), vec![a_id]);
    assert_eq!(changes.get(&a_id).unwrap().new_conflicts, vec![b_id]);

    // A block confirming A lifts it to log2(2^10 + 2^w) = 15.
    let w = (2f64.powi(15) - 2f64.powi(10)).log2();
    let block = h.block([h.g, a_id, fan], w);
    let changes = h.engine.process(block).unwrap();

    assert!((h.accumulated(&a_id) - 15.0).abs() < 1e-9);
    assert!((h.accumulated(&b_id) - 12.0).abs() < 1e-9);
    assert!(h.voided_by(&a_id).is_empty());
    assert_eq!(h.voided_by(&b_id), vec![a_id]);
    assert_eq!(changes.newly_valid(), vec![a_id]);
    assert_eq!(changes.newly_voided(), vec![b_id]);
}

#[test]
fn descendants_follow_their_ancestor() {
    let h = harness();
    let fan = h.fan_out(4);

    let a = h.tx([h.g1, h.g2], &[(fan, 0)], &[1], 10.0);
    let a_id = a.id();
    h.engine.process(a).unwrap();
    let c = h.tx([a_id, h.g1], &[(a_id, 0)], &[1], 1.0);
    let c_id = c.id();
    h.engine.process(c).unwrap();

    let b = h.tx([h.g1, h.g2], &[(fan, 0)], &[1, 0], 12.0);
    let b_id = b.id();
    let changes = h.engine.process(b).unwrap();
    assert_eq!(h.voided_by(&c_id), vec![a_id]);
    assert_eq!(changes.get(&c_id).unwrap().transition, VoidedTransition::BecameVoided);

    // C and A together weigh log2(2^10 + 2^1) < 12. Confirm A harder.
    let block = h.block([h.g, c_id, fan], 14.0);
    h.engine.process(block).unwrap();
    assert!(h.voided_by(&a_id).is_empty());
    assert!(h.voided_by(&c_id).is_empty());
    assert_eq!(h.voided_by(&b_id), vec![a_id]);
}

#[test]
fn parent_swap_produces_a_twin() {
    let h = harness();
    let fan = h.fan_out(4);

    let t = h.tx([h.g1, h.g2], &[(fan, 1)], &[2], 3.0);
    let twin = make_twin(&t, &TwinOptions::default()).unwrap();
    assert_ne!(t.id(), twin.id());
    let (t_id, twin_id) = (t.id(), twin.id());

    h.engine.process(t).unwrap();
    h.engine.process(twin).unwrap();

    let mt = h.engine.get_metadata(&t_id).unwrap().unwrap();
    let mw = h.engine.get_metadata(&twin_id).unwrap().unwrap();
    assert_eq!(mt.twins, BTreeSet::from([twin_id]));
    assert_eq!(mw.twins, BTreeSet::from([t_id]));
    assert!(mt.twins.is_subset(&mt.conflict_with));
    assert!(mw.twins.is_subset(&mw.conflict_with));

    // Equal weight: the smaller id wins.
    let (winner, loser) = if t_id < twin_id { (t_id, twin_id) } else { (twin_id, t_id) };
    assert!(h.voided_by(&winner).is_empty());
    assert_eq!(h.voided_by(&loser), vec![winner]);

    // A third spender of the same input with different outputs conflicts
    // with both but is nobody's twin.
    let other = h.tx([h.g1, h.g2], &[(fan, 1)], &[1, 1], 2.0);
    let other_id = other.id();
    h.engine.process(other).unwrap();

    let mt = h.engine.get_metadata(&t_id).unwrap().unwrap();
    let mw = h.engine.get_metadata(&twin_id).unwrap().unwrap();
    let mo = h.engine.get_metadata(&other_id).unwrap().unwrap();
    assert_eq!(mt.twins, BTreeSet::from([twin_id]));
    assert_eq!(mw.twins, BTreeSet::from([t_id]));
    assert!(mo.twins.is_empty());
    assert_eq!(mt.conflict_with, BTreeSet::from([twin_id, other_id]));
    assert_eq!(mo.conflict_with, BTreeSet::from([t_id, twin_id]));
    assert_eq!(mo.voided_by, BTreeSet::from([winner]));
    assert!(h.voided_by(&winner).is_empty());
}

#[test]
fn overlapping_spends_conflict_without_being_twins() {
    let h = harness();
    let fan = h.fan_out(4);
    let x = h.tx([h.g1, h.g2], &[(fan, 2)], &[3], 2.0);
    let y = h.tx([h.g1, h.g2], &[(fan, 2), (fan, 3)], &[7], 2.0);
    let (x_id, y_id) = (x.id(), y.id());
    h.engine.process(x).unwrap();
    h.engine.process(y).unwrap();

    let mx = h.engine.get_metadata(&x_id).unwrap().unwrap();
    assert_eq!(mx.conflict_with, BTreeSet::from([y_id]));
    assert!(mx.twins.is_empty());
}

#[test]
fn spending_a_parents_output_is_not_a_conflict() {
    let h = harness();
    let fan = h.fan_out(4);

    let u = h.tx([h.g1, h.g2], &[(fan, 2)], &[1, 2], 2.0);
    let u_id = u.id();
    h.engine.process(u).unwrap();
    let v = h.tx([u_id, h.g1], &[(u_id, 0)], &[1], 2.0);
    let v_id = v.id();
    h.engine.process(v).unwrap();

    for id in [u_id, v_id] {
        let meta = h.engine.get_metadata(&id).unwrap().unwrap();
        assert!(meta.conflict_with.is_empty());
        assert!(!meta.is_voided());
    }

    // A second spender of U's output conflicts with V only.
    let v2 = h.tx([u_id, h.g2], &[(u_id, 0)], &[1], 1.0);
    let v2_id = v2.id();
    h.engine.process(v2).unwrap();
    assert!(h.engine.get_metadata(&u_id).unwrap().unwrap().conflict_with.is_empty());
    assert_eq!(h.voided_by(&v2_id), vec![v_id]);
}

#[test]
fn double_spend_in_own_past_leaves_no_trace() {
    let h = harness();
    let fan = h.fan_out(4);
    let u = h.tx([h.g1, h.g2], &[(fan, 3)], &[1], 2.0);
    let u_id = u.id();
    h.engine.process(u).unwrap();

    let store = Arc::clone(h.engine.store());
    let count = store.len();
    let fan_meta = store.require_metadata(&fan).unwrap();
    let u_meta = store.require_metadata(&u_id).unwrap();

    let w = h.tx([u_id, h.g1], &[(fan, 3)], &[1], 2.0);
    let w_id = w.id();
    let err = h.engine.process(w).unwrap_err();
    assert_eq!(err, ConsensusError::DoubleSpendInPast { tx_id: fan, index: 3, spent_by: u_id });
    assert!(!err.is_retryable() && !err.is_fatal());

    assert_eq!(store.len(), count);
    assert!(!store.exists(&w_id).unwrap());
    assert_eq!(store.require_metadata(&fan).unwrap(), fan_meta);
    assert_eq!(store.require_metadata(&u_id).unwrap(), u_meta);
    assert!(!store.children_of(&u_id).unwrap().contains(&w_id));
}

#[test]
fn missing_parent_is_deferred_not_rejected() {
    let h = harness();
    let fan = h.fan_out(2);
    let orphan_parent = h.tx([h.g1, h.g2], &[(fan, 0)], &[1], 1.0);
    let child = h.tx([orphan_parent.id(), h.g1], &[(fan, 1)], &[1], 1.0);

    let err = h.engine.process(child.clone()).unwrap_err();
    assert_eq!(err, ConsensusError::MissingParent(orphan_parent.id()));
    assert!(err.is_retryable());

    h.engine.process(orphan_parent).unwrap();
    h.engine.process(child).unwrap();
}

#[test]
fn duplicate_vertex_rejected() {
    let h = harness();
    let fan = h.fan_out(2);
    let t = h.tx([h.g1, h.g2], &[(fan, 0)], &[1], 1.0);
    h.engine.process(t.clone()).unwrap();
    assert_eq!(h.engine.process(t.clone()), Err(ConsensusError::DuplicateVertex(t.id())));
}

#[test]
fn block_below_required_difficulty_rejected() {
    let h = harness();
    let b1 = h.block([h.g, h.g1, h.g2], 8.0);
    let b1_id = b1.id();
    h.engine.process(b1).unwrap();
    let b2 = h.block([b1_id, h.g1, h.g2], 8.0);
    let b2_id = b2.id();
    h.engine.process(b2).unwrap();

    // One interval of one second against a 30s target: clamped to +max_dw.
    let required = h.engine.required_difficulty(&b2_id).unwrap();
    assert!((required - 8.25).abs() < 1e-9, "{required}");

    let b3 = h.block([b2_id, h.g1, h.g2], 8.0);
    assert!(matches!(
        h.engine.process(b3),
        Err(ConsensusError::WeightTooLow { min, .. }) if (min - 8.25).abs() < 1e-9
    ));
    let b3 = h.block([b2_id, h.g1, h.g2], 8.25);
    let b3_id = b3.id();
    h.engine.process(b3).unwrap();

    let best = h.engine.best_block().unwrap();
    assert_eq!(best.id, b3_id);
    assert_eq!(best.height, 3);
}

#[test]
fn subscribers_see_every_mutated_vertex() {
    let h = harness();
    let fan = h.fan_out(2);
    let mut rx = h.engine.subscribe();

    let a = h.tx([h.g1, h.g2], &[(fan, 0)], &[1], 2.0);
    let a_id = a.id();
    let changes = h.engine.process(a).unwrap();

    let mut seen = Vec::new();
    while let Ok(change) = rx.try_recv() {
        seen.push(change.id);
    }
    assert_eq!(seen.len(), changes.len());
    assert!(seen.contains(&a_id));
    assert!(seen.contains(&fan));
    assert!(changes.get(&a_id).unwrap().is_new);
}
