//! End-to-end commit/reveal scenarios over the in-process collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cognosis_commit::{
    commit, verify, CommitmentId, CustodyConfig, Error, KeyCustodian, MemoryContentStore,
    MemoryLedger, MemorySessionStore, Nonce, ProgressiveOptions, ProtocolConfig, RandomSource,
    RevealOrchestrator, RevealStatus,
};
use serde_json::json;

struct World {
    store: Arc<MemoryContentStore>,
    ledger: Arc<MemoryLedger>,
    session: MemorySessionStore,
    orchestrator: RevealOrchestrator,
}

fn world() -> World {
    world_over(MemorySessionStore::new())
}

fn world_over(session: MemorySessionStore) -> World {
    let store = Arc::new(MemoryContentStore::new());
    let ledger = Arc::new(MemoryLedger::new(store.clone()));
    let custodian = Arc::new(KeyCustodian::restore(
        Arc::new(session.clone()),
        CustodyConfig::default(),
    ));
    let orchestrator = RevealOrchestrator::new(
        ledger.clone(),
        store.clone(),
        custodian,
        ProtocolConfig::default(),
    );
    World {
        store,
        ledger,
        session,
        orchestrator,
    }
}

// ============================================================================
// Single-shot
// ============================================================================

#[test]
fn scenario_a_red_commitment() {
    let nonce = Nonce::new("abc123");
    let hash = commit("red", &nonce);

    assert!(verify(&hash, "red", &nonce));
    assert!(!verify(&hash, "black", &nonce));
}

#[tokio::test]
async fn scenario_c_reload_recovers_secrets() {
    let session = MemorySessionStore::new();
    let first = world_over(session.clone());

    let receipt = first
        .orchestrator
        .create_commitment("red", json!({ "game": "colors" }))
        .await
        .unwrap();
    let before = first
        .orchestrator
        .custodian()
        .retrieve(&receipt.commitment_id)
        .unwrap();

    // Page reload: only the session mirror survives
    let restored = KeyCustodian::restore(Arc::new(session), CustodyConfig::default());
    let after = restored.retrieve(&receipt.commitment_id).unwrap();

    assert_eq!(after.key.as_bytes(), before.key.as_bytes());
    assert_eq!(after.nonce, before.nonce);
    assert_eq!(after.nonce, receipt.nonce);
}

#[tokio::test]
async fn scenario_c_reveal_after_reload() {
    let session = MemorySessionStore::new();
    let store = Arc::new(MemoryContentStore::new());
    let ledger = Arc::new(MemoryLedger::new(store.clone()));

    let receipt = {
        let custodian = Arc::new(KeyCustodian::restore(
            Arc::new(session.clone()),
            CustodyConfig::default(),
        ));
        let orchestrator = RevealOrchestrator::new(
            ledger.clone(),
            store.clone(),
            custodian,
            ProtocolConfig::default(),
        );
        orchestrator.create_commitment(&42u32, json!({})).await.unwrap()
    };

    let custodian = Arc::new(KeyCustodian::restore(
        Arc::new(session.clone()),
        CustodyConfig::default(),
    ));
    let orchestrator =
        RevealOrchestrator::new(ledger, store, custodian, ProtocolConfig::default());

    let reveal = orchestrator
        .reveal_commitment::<u32>(&receipt.commitment_id)
        .await
        .unwrap();
    assert_eq!(reveal.payload, 42);
    assert!(session.is_empty());
}

#[tokio::test]
async fn scenario_d_unknown_commitment() {
    let w = world();

    let result = w
        .orchestrator
        .reveal_commitment::<String>(&CommitmentId::new("never-stored"))
        .await;

    assert!(matches!(result, Err(Error::NonceNotFound(_))));
    assert_eq!(w.store.get_count(), 0);
    assert_eq!(w.store.put_count(), 0);
    assert_eq!(w.ledger.call_count(), 0);
}

#[tokio::test]
async fn expired_secret_makes_commitment_unrevealable() {
    let w = world();
    let receipt = w
        .orchestrator
        .create_commitment("late", json!({}))
        .await
        .unwrap();

    let custodian = w.orchestrator.custodian();
    let secrets = custodian.retrieve(&receipt.commitment_id).unwrap();
    custodian
        .store_with_expiry(
            &receipt.commitment_id,
            &secrets.key,
            &secrets.nonce,
            cognosis_commit::time::now_timestamp_millis() - 1,
        )
        .unwrap();

    let result = w
        .orchestrator
        .reveal_commitment::<String>(&receipt.commitment_id)
        .await;
    assert!(matches!(result, Err(Error::NonceNotFound(_))));
    assert!(w.session.is_empty());
}

#[tokio::test]
async fn storage_outage_during_reveal_degrades_to_unverified() {
    let w = world();
    let receipt = w
        .orchestrator
        .create_commitment("stored", json!({}))
        .await
        .unwrap();

    w.store.set_available(false);
    let status = w
        .orchestrator
        .reveal_or_fallback(&receipt.commitment_id, "local".to_string())
        .await
        .unwrap();

    match status {
        RevealStatus::Unverified { payload, cause } => {
            assert_eq!(payload, "local");
            assert!(matches!(cause, Error::StorageUnavailable(_)));
        }
        RevealStatus::Verified(_) => panic!("store outage cannot verify"),
    }
    assert_eq!(w.orchestrator.custodian().pending_count(), 1);
}

#[tokio::test]
async fn blob_from_another_commitment_is_rejected() {
    let w = world();
    let a = w
        .orchestrator
        .create_commitment("alpha", json!({}))
        .await
        .unwrap();
    let b = w
        .orchestrator
        .create_commitment("beta", json!({}))
        .await
        .unwrap();

    let other = {
        use cognosis_commit::ContentStore;
        w.store.get(&b.content_ref).await.unwrap()
    };
    w.store.replace(&a.content_ref, other);

    let result = w
        .orchestrator
        .reveal_commitment::<String>(&a.commitment_id)
        .await;
    assert!(matches!(result, Err(Error::DecryptionFailed(_))));
}

/// Counter-based source; deterministic but never repeats within a test
struct CountingRandom(AtomicU64);

impl RandomSource for CountingRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> cognosis_commit::Result<()> {
        for chunk in dest.chunks_mut(8) {
            let value = self.0.fetch_add(1, Ordering::SeqCst).to_le_bytes();
            chunk.copy_from_slice(&value[..chunk.len()]);
        }
        Ok(())
    }
}

#[tokio::test]
async fn injected_randomness_is_used() {
    let store = Arc::new(MemoryContentStore::new());
    let ledger = Arc::new(MemoryLedger::new(store.clone()));
    let custodian = Arc::new(KeyCustodian::in_memory(CustodyConfig::default()));
    let orchestrator =
        RevealOrchestrator::new(ledger, store.clone(), custodian, ProtocolConfig::default())
            .with_random(Arc::new(CountingRandom(AtomicU64::new(0))));

    let first = orchestrator.create_commitment("same", json!({})).await.unwrap();
    let second = orchestrator.create_commitment("same", json!({})).await.unwrap();

    // First nonce is counters 0..4 little-endian
    assert!(first.nonce.as_str().starts_with("0000000000000000"));
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.commitment_hash, second.commitment_hash);

    // Nonce takes counters 0..4, the key 4..8, so the envelope IV opens with 8
    let blob = {
        use cognosis_commit::ContentStore;
        store.get(&first.content_ref).await.unwrap()
    };
    assert_eq!(blob[..8], 8u64.to_le_bytes());
}

// ============================================================================
// Progressive
// ============================================================================

fn dice_rounds(n: usize) -> Vec<u8> {
    (0..n).map(|i| ((i * 5 + 3) % 6) as u8 + 1).collect()
}

#[tokio::test]
async fn scenario_b_dice_partial_reveal() {
    let w = world();
    let outcomes = dice_rounds(20);
    let options = ProgressiveOptions {
        outcome_space: Some(6),
        min_reveals: 1,
        metadata: json!({ "game": "dice" }),
    };

    let mut session = w
        .orchestrator
        .create_progressive(outcomes.clone(), options)
        .await
        .unwrap();

    for index in 0..10 {
        let choice = if index % 3 == 0 { outcomes[index] } else { 1 };
        w.orchestrator
            .reveal_outcome_at(&mut session, index, choice)
            .await
            .unwrap();
    }

    let summary = w.orchestrator.finalize_progressive(&session).await.unwrap();
    assert_eq!(summary.total_influenced, 10);
    assert!((summary.expected_matches.unwrap() - 10.0 / 6.0).abs() < 1e-9);

    let local_matches = session.outcomes().match_count();
    assert_eq!(summary.matches, local_matches);
    assert!(session.outcomes().slots()[10..]
        .iter()
        .all(|slot| !slot.revealed && slot.outcome.is_none()));
}

#[tokio::test]
async fn partial_aggregate_equals_full_truncated() {
    const N: usize = 12;
    const K: usize = 5;

    let outcomes = dice_rounds(N);
    let choices: Vec<u8> = (0..N).map(|i| (i % 6) as u8 + 1).collect();

    // Stop after K
    let partial = world();
    let mut early = partial
        .orchestrator
        .create_progressive(outcomes.clone(), ProgressiveOptions::default())
        .await
        .unwrap();
    for (index, choice) in choices.iter().take(K).enumerate() {
        partial
            .orchestrator
            .reveal_outcome_at(&mut early, index, *choice)
            .await
            .unwrap();
    }
    let early_summary = partial
        .orchestrator
        .finalize_progressive(&early)
        .await
        .unwrap();

    // Reveal all N
    let full = world();
    let mut complete = full
        .orchestrator
        .create_progressive(outcomes.clone(), ProgressiveOptions::default())
        .await
        .unwrap();
    for (index, choice) in choices.iter().enumerate() {
        full.orchestrator
            .reveal_outcome_at(&mut complete, index, *choice)
            .await
            .unwrap();
    }
    assert_eq!(complete.next_index(), None);

    let truncated_matches = complete.outcomes().slots()[..K]
        .iter()
        .filter(|slot| slot.matched == Some(true))
        .count();

    assert_eq!(early_summary.total_influenced, K);
    assert_eq!(early_summary.matches, truncated_matches);
    assert_eq!(
        early.outcomes().slots()[..K],
        complete.outcomes().slots()[..K]
    );
}

#[tokio::test]
async fn ledger_outage_mid_session_is_retryable() {
    let w = world();
    let mut session = w
        .orchestrator
        .create_progressive(
            vec!["heads".to_string(), "tails".to_string()],
            ProgressiveOptions::default(),
        )
        .await
        .unwrap();

    w.ledger.set_available(false);
    let result = w
        .orchestrator
        .reveal_outcome_at(&mut session, 0, "heads".to_string())
        .await;
    assert!(matches!(result, Err(Error::LedgerUnavailable(_))));
    assert_eq!(session.next_index(), Some(0));

    w.ledger.set_available(true);
    let slot = w
        .orchestrator
        .reveal_outcome_at(&mut session, 0, "heads".to_string())
        .await
        .unwrap();
    assert_eq!(slot.matched, Some(true));
}

#[tokio::test]
async fn progressive_session_survives_reload() {
    let session = MemorySessionStore::new();
    let first = world_over(session.clone());
    let outcomes = dice_rounds(6);

    let mut live = first
        .orchestrator
        .create_progressive(outcomes.clone(), ProgressiveOptions::default())
        .await
        .unwrap();
    for index in 0..3 {
        first
            .orchestrator
            .reveal_outcome_at(&mut live, index, outcomes[index])
            .await
            .unwrap();
    }

    // Page reload: a fresh custodian over the surviving mirror
    let custodian = Arc::new(KeyCustodian::restore(
        Arc::new(session),
        CustodyConfig::default(),
    ));
    let orchestrator = RevealOrchestrator::new(
        first.ledger.clone(),
        first.store.clone(),
        custodian,
        ProtocolConfig::default(),
    );
    let mut resumed = orchestrator
        .resume_progressive::<u8>(live.commitment_id(), ProgressiveOptions::default())
        .await
        .unwrap();

    assert_eq!(resumed.next_index(), Some(3));
    assert!(resumed.outcomes().slots()[3..]
        .iter()
        .all(|slot| slot.outcome.is_none()));

    orchestrator
        .reveal_outcome_at(&mut resumed, 3, outcomes[3])
        .await
        .unwrap();
    let summary = orchestrator.finalize_progressive(&resumed).await.unwrap();
    assert_eq!(summary.total_influenced, 4);
    assert_eq!(summary.matches, 4);
}

#[tokio::test]
async fn unwritable_session_storage_keeps_commitment_revealable() {
    let w = world();
    w.session.set_writable(false);

    let receipt = w
        .orchestrator
        .create_commitment("offline", json!({}))
        .await
        .unwrap();
    assert_eq!(w.ledger.len(), 1);
    assert_eq!(
        w.orchestrator.custodian().pending_ids(),
        vec![receipt.commitment_id.clone()]
    );

    // Storage recovers before the reveal; the purge is mirrored
    w.session.set_writable(true);
    let reveal = w
        .orchestrator
        .reveal_commitment::<String>(&receipt.commitment_id)
        .await
        .unwrap();
    assert_eq!(reveal.payload, "offline");
    assert_eq!(w.orchestrator.custodian().pending_count(), 0);
}
