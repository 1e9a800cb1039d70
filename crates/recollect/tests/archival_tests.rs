//! Integration tests for tiered storage and archival
//!
//! Tests verify that:
//! - Tiers never stay above capacity unless only protected entries remain
//! - Pinned and user-edited entries are never fed to aggregation
//! - Aggregated entries take the newest input timestamp
//! - Background summaries replace placeholders, and late ones no-op safely

use std::sync::Arc;

use tokio::runtime::Handle;

use recollect::config::{Config, MemoryConfig};
use recollect::memory::types::{TAG_SUMMARY_EXTERNAL, TAG_SUMMARY_PENDING, TAG_SUMMARY_SIMPLE};
use recollect::memory::{ArchivalPhase, EntryFilter, MemoryEntry, MemoryKind, MemoryStore, MemoryTier};
use recollect::summarizer::{SummarizerError, SummaryOutcome};
use recollect::testing::{MockSummarizer, agent, conversation_entries};
use recollect::ContextEngine;

fn small_config() -> MemoryConfig {
    MemoryConfig::default()
        .with_capacity(MemoryTier::Active, 3)
        .with_capacity(MemoryTier::Situational, 4)
        .with_capacity(MemoryTier::EventLog, 5)
        .with_capacity(MemoryTier::Archive, 6)
}

// =============================================================================
// Capacity scenario
// =============================================================================

#[test]
fn test_twenty_first_insert_archives_oldest_quarter() {
    let config = MemoryConfig::default().with_capacity(MemoryTier::EventLog, 20);
    let mut store = MemoryStore::new(config);
    let pawn = agent("pawn_1");

    let mut last_report = None;
    for entry in conversation_entries(1, 21) {
        last_report = Some(store.insert(&pawn, entry, MemoryTier::EventLog));
    }

    let memory = store.agent(&pawn).unwrap();
    assert_eq!(memory.len(MemoryTier::EventLog), 16);
    assert_eq!(memory.len(MemoryTier::Archive), 1);

    let archived = &memory.tier(MemoryTier::Archive)[0];
    assert_eq!(archived.kind, MemoryKind::Conversation);
    assert_eq!(archived.timestamp, 5);
    assert!((archived.importance - 0.6).abs() < 1e-5);
    assert!(archived.tags.contains(TAG_SUMMARY_SIMPLE));

    let report = last_report.unwrap();
    assert_eq!(report.consumed.len(), 5);
    assert_eq!(report.created.len(), 1);
    assert!(matches!(
        report.phases[0],
        ArchivalPhase::OverflowDetected { size: 21, capacity: 20, selected: 5, .. }
    ));

    // The oldest survivor in the event log is tick 6
    let oldest = memory.tier(MemoryTier::EventLog).back().unwrap();
    assert_eq!(oldest.timestamp, 6);
}

#[test]
fn test_aggregated_entry_sorts_by_its_own_timestamp() {
    let config = MemoryConfig::default().with_capacity(MemoryTier::EventLog, 4);
    let mut store = MemoryStore::new(config);
    let pawn = agent("pawn_1");

    // A newer entry already sits in the archive
    store.insert(
        &pawn,
        MemoryEntry::new("Founded the colony", MemoryKind::Event, 100),
        MemoryTier::Archive,
    );
    for entry in conversation_entries(1, 5) {
        store.insert(&pawn, entry, MemoryTier::EventLog);
    }

    let archive = store.agent(&pawn).unwrap().tier(MemoryTier::Archive);
    let stamps: Vec<u64> = archive.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![100, 1]);
}

// =============================================================================
// Invariants under mixed workloads
// =============================================================================

#[test]
fn test_tiers_stay_within_capacity() {
    let config = small_config();
    let mut store = MemoryStore::new(config.clone());
    let pawn = agent("pawn_1");
    let tiers = [
        MemoryTier::Active,
        MemoryTier::Situational,
        MemoryTier::EventLog,
        MemoryTier::Archive,
    ];

    for i in 0..300u64 {
        let kind = MemoryKind::ALL[(i % 8) as usize];
        let mut entry = MemoryEntry::new(format!("event {i}"), kind, i)
            .with_importance((i % 10) as f32 / 10.0);
        if i % 11 == 0 {
            entry = entry.pinned();
        }
        let tier = tiers[(i * 7 % 4) as usize];
        let report = store.insert(&pawn, entry, tier);

        for id in &report.consumed {
            assert!(
                store.agent(&pawn).unwrap().get(*id).is_none(),
                "consumed entry still present"
            );
        }

        let memory = store.agent(&pawn).unwrap();
        for tier in tiers {
            let entries = memory.tier(tier);
            let within = entries.len() <= config.capacity(tier);
            let all_protected = entries.iter().all(|e| e.is_protected());
            assert!(
                within || all_protected,
                "{tier} holds {} entries, capacity {}",
                entries.len(),
                config.capacity(tier)
            );

            let stamps: Vec<u64> = entries.iter().map(|e| e.timestamp).collect();
            assert!(stamps.windows(2).all(|w| w[0] >= w[1]), "{tier} out of order");
        }
    }
}

#[test]
fn test_protected_entries_are_never_aggregated() {
    let mut store = MemoryStore::new(MemoryConfig::default().with_capacity(MemoryTier::EventLog, 4));
    let pawn = agent("pawn_1");

    let pinned = MemoryEntry::new("Wedding day", MemoryKind::Event, 1).pinned();
    let pinned_id = pinned.id;
    store.insert(&pawn, pinned, MemoryTier::EventLog);

    let edited = MemoryEntry::new("First harvest", MemoryKind::Event, 2);
    let edited_id = edited.id;
    store.insert(&pawn, edited, MemoryTier::EventLog);
    store
        .edit(&pawn, edited_id, None, Some("keep this".to_string()))
        .unwrap();

    let mut consumed = Vec::new();
    for entry in conversation_entries(3, 10) {
        consumed.extend(store.insert(&pawn, entry, MemoryTier::EventLog).consumed);
    }

    assert!(!consumed.contains(&pinned_id));
    assert!(!consumed.contains(&edited_id));

    let memory = store.agent(&pawn).unwrap();
    assert!(memory.get(pinned_id).is_some());
    assert!(memory.get(edited_id).is_some());
    assert!(memory.len(MemoryTier::EventLog) <= 4);
}

#[test]
fn test_fully_protected_tier_may_exceed_capacity() {
    let mut store = MemoryStore::new(MemoryConfig::default().with_capacity(MemoryTier::EventLog, 2));
    let pawn = agent("pawn_1");

    for ts in 1..=3 {
        let entry = MemoryEntry::new(format!("vow {ts}"), MemoryKind::Event, ts).pinned();
        store.insert(&pawn, entry, MemoryTier::EventLog);
    }

    let memory = store.agent(&pawn).unwrap();
    assert_eq!(memory.len(MemoryTier::EventLog), 3);
    assert_eq!(memory.len(MemoryTier::Archive), 0);
}

#[test]
fn test_archive_overflow_evicts_oldest() {
    let mut store = MemoryStore::new(MemoryConfig::default().with_capacity(MemoryTier::Archive, 4));
    let pawn = agent("pawn_1");

    let mut evicted = Vec::new();
    for entry in conversation_entries(1, 5) {
        evicted.extend(store.insert(&pawn, entry, MemoryTier::Archive).evicted);
    }

    let archive = store.agent(&pawn).unwrap().tier(MemoryTier::Archive);
    assert_eq!(archive.len(), 4);
    assert_eq!(evicted.len(), 1);
    assert!(archive.iter().all(|e| e.timestamp > 1));
}

// =============================================================================
// Manual operations
// =============================================================================

#[test]
fn test_manual_archive_batch_groups_by_kind() {
    let mut store = MemoryStore::new(MemoryConfig::default());
    let pawn = agent("pawn_1");

    let mut ids = Vec::new();
    for (ts, kind) in [
        (1, MemoryKind::Conversation),
        (2, MemoryKind::Action),
        (3, MemoryKind::Conversation),
    ] {
        let entry = MemoryEntry::new(format!("thing {ts}"), kind, ts);
        ids.push(entry.id);
        store.insert(&pawn, entry, MemoryTier::EventLog);
    }

    let report = store.archive_batch(&pawn, &ids, MemoryTier::Archive).unwrap();
    assert_eq!(report.consumed.len(), 3);
    assert_eq!(report.created.len(), 2);

    let archive = store.agent(&pawn).unwrap().tier(MemoryTier::Archive);
    let conversation = archive
        .iter()
        .find(|e| e.kind == MemoryKind::Conversation)
        .unwrap();
    assert_eq!(conversation.timestamp, 3);
}

#[test]
fn test_manual_archive_rejects_protected_and_wrong_target() {
    let mut store = MemoryStore::new(MemoryConfig::default());
    let pawn = agent("pawn_1");

    let pinned = MemoryEntry::new("Keep", MemoryKind::Event, 1).pinned();
    let pinned_id = pinned.id;
    store.insert(&pawn, pinned, MemoryTier::EventLog);

    let plain = MemoryEntry::new("Plain", MemoryKind::Event, 2);
    let plain_id = plain.id;
    store.insert(&pawn, plain, MemoryTier::EventLog);

    assert!(store.archive_batch(&pawn, &[pinned_id], MemoryTier::Archive).is_err());
    assert!(store.archive_batch(&pawn, &[plain_id], MemoryTier::EventLog).is_err());
    assert!(store.archive_batch(&pawn, &[], MemoryTier::Archive).is_err());

    // Nothing moved
    assert_eq!(store.agent(&pawn).unwrap().len(MemoryTier::EventLog), 2);
}

#[test]
fn test_filtered_listing_respects_tier_visibility() {
    let mut store = MemoryStore::new(MemoryConfig::default());
    let pawn = agent("pawn_1");
    store.insert(&pawn, MemoryEntry::new("a", MemoryKind::Event, 1), MemoryTier::Active);
    store.insert(&pawn, MemoryEntry::new("b", MemoryKind::Event, 2), MemoryTier::EventLog);
    store.insert(&pawn, MemoryEntry::new("c", MemoryKind::Event, 3), MemoryTier::Archive);

    let filter = EntryFilter::new().set_tier_visible(MemoryTier::Active, false);
    let listed: Vec<&str> = store
        .filtered_entries(&pawn, &filter)
        .into_iter()
        .map(|e| e.content.as_str())
        .collect();
    assert_eq!(listed, vec!["b", "c"]);
}

// =============================================================================
// Background summaries
// =============================================================================

#[test]
fn test_late_summary_for_deleted_entry_is_ignored() {
    let mut store = MemoryStore::new(MemoryConfig::default().with_capacity(MemoryTier::EventLog, 4))
        .with_summaries(true);
    let pawn = agent("pawn_1");

    for entry in conversation_entries(1, 5) {
        store.insert(&pawn, entry, MemoryTier::EventLog);
    }

    let jobs = store.take_jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    let placeholder = store.agent(&pawn).unwrap().get(job.entry_id).unwrap();
    assert!(placeholder.tags.contains(TAG_SUMMARY_PENDING));

    store.delete(&pawn, job.entry_id).unwrap();

    let applied = store.apply_summary(SummaryOutcome {
        agent: job.agent.clone(),
        entry_id: job.entry_id,
        batch_hash: job.batch_hash,
        result: Ok("Too late".to_string()),
    });
    assert!(!applied);
    assert_eq!(store.pending_summaries(), 0);
}

#[test]
fn test_failed_summary_keeps_placeholder() {
    let mut store = MemoryStore::new(MemoryConfig::default().with_capacity(MemoryTier::EventLog, 4))
        .with_summaries(true);
    let pawn = agent("pawn_1");

    for entry in conversation_entries(1, 5) {
        store.insert(&pawn, entry, MemoryTier::EventLog);
    }
    let job = store.take_jobs().remove(0);
    let before = store.agent(&pawn).unwrap().get(job.entry_id).unwrap().content.clone();

    let applied = store.apply_summary(SummaryOutcome {
        agent: job.agent.clone(),
        entry_id: job.entry_id,
        batch_hash: job.batch_hash,
        result: Err(SummarizerError::EmptyResponse),
    });

    assert!(!applied);
    let entry = store.agent(&pawn).unwrap().get(job.entry_id).unwrap();
    assert_eq!(entry.content, before);
    assert!(entry.tags.contains(TAG_SUMMARY_SIMPLE));
    assert!(!entry.tags.contains(TAG_SUMMARY_PENDING));
}

#[tokio::test]
async fn test_engine_pumps_background_summaries() {
    let mut config = Config::default();
    config.memory.event_log_capacity = 8;

    let summarizer = Arc::new(MockSummarizer::with_reply("Long talks about the harvest."));
    let mut engine = ContextEngine::new(config)
        .unwrap()
        .with_summarizer(summarizer.clone(), Handle::current());
    let pawn = agent("pawn_1");

    for entry in conversation_entries(1, 9) {
        engine.insert_memory(&pawn, entry, MemoryTier::EventLog);
    }

    // Nothing is dispatched until the owner pumps
    assert_eq!(summarizer.calls(), 0);
    assert_eq!(engine.flush_summaries().await, 1);
    assert_eq!(summarizer.calls(), 1);

    let archive = engine.store().agent(&pawn).unwrap().tier(MemoryTier::Archive);
    assert_eq!(archive[0].content, "Long talks about the harvest.");
    assert!(archive[0].tags.contains(TAG_SUMMARY_EXTERNAL));
    assert_eq!(engine.summaries_in_flight(), 0);
}
