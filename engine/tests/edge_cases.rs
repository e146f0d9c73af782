//! Edge case tests for contract-sync-engine
//!
//! These tests cover boundary conditions, unusual inputs and a few
//! properties checked with proptest.

use contract_sync_engine::{
    ChunkPolicy, ConflictPolicy, ConflictResolver, ContractRecord, ContractStatus, CycleResult,
    DownloadLeg, Error, Fields, FilterSpec, FilteredViewCache, MergeReport, MonotonicClock,
    RecordDocument, Resolution, SortOrder, SyncMetadata, SyncStatus, SyncSummary, UploadErrorKind,
    UploadLeg, UploadOutcome, UploadReport,
};
use proptest::prelude::*;
use serde_json::json;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

const STATUSES: [ContractStatus; 5] = [
    ContractStatus::Open,
    ContractStatus::InProgress,
    ContractStatus::Completed,
    ContractStatus::Invoiced,
    ContractStatus::Cancelled,
];

// ============================================================================
// Record Edge Cases
// ============================================================================

#[test]
fn unicode_and_nested_fields_survive_serialization() {
    let record = ContractRecord::new(
        "vertrag-ü-1",
        fields(json!({
            "customer": "Bäckerei Schön & Söhne",
            "notes": "Zugang über Hof 🚪\nSchlüssel beim Hausmeister",
            "site": {"street": "Hauptstraße 1", "floors": [1, 2, 3]},
            "amount": 1234.5,
            "approved": null
        })),
        ContractStatus::InProgress,
        1_706_745_600_000,
    );

    let json = serde_json::to_string(&record).unwrap();
    let parsed: ContractRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}

#[test]
fn record_wire_format_is_camel_case() {
    let mut record = ContractRecord::new("c-1", Fields::new(), ContractStatus::InProgress, 7);
    record.mark_deleted(8);

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["updatedAt"], 8);
    assert_eq!(value["status"], "in_progress");
    assert_eq!(value["tombstone"], true);
}

#[test]
fn minimal_remote_payload_gets_defaults() {
    let record: ContractRecord =
        serde_json::from_value(json!({"id": "c-1", "updatedAt": 42})).unwrap();

    assert!(record.fields.is_empty());
    assert_eq!(record.status, ContractStatus::Open);
    assert!(!record.dirty);
    assert!(!record.tombstone);
}

#[test]
fn overlay_reports_only_real_changes() {
    let mut record = ContractRecord::remote(
        "c-1",
        fields(json!({"contractNumber": "K-1"})),
        ContractStatus::Open,
        1,
    );

    assert!(!record.overlay_fields(&fields(json!({"contractNumber": "K-1"}))));
    assert!(record.overlay_fields(&fields(json!({"assignee": "Team Nord"}))));
    assert_eq!(record.fields.len(), 2);
}

// ============================================================================
// Clock Edge Cases
// ============================================================================

#[test]
fn clock_survives_wall_clock_going_backwards() {
    let mut clock = MonotonicClock::new();
    let a = clock.next(10_000);
    let b = clock.next(5_000);
    let c = clock.next(5_000);
    assert!(a < b && b < c);
}

#[test]
fn clock_saturates_at_max() {
    let mut clock = MonotonicClock::starting_at(u64::MAX);
    assert_eq!(clock.next(0), u64::MAX);
}

// ============================================================================
// Resolver Edge Cases
// ============================================================================

#[test]
fn identical_timestamps_count_as_conflict_for_dirty_local() {
    let local = ContractRecord::new("c-1", fields(json!({"a": 1})), ContractStatus::Open, 100);
    let remote = ContractRecord::remote("c-1", fields(json!({"a": 2})), ContractStatus::Open, 100);

    let resolved = ConflictResolver::default().resolve(Some(&local), remote);
    assert_eq!(resolved.resolution, Resolution::LocalWins);
    assert_eq!(resolved.record, local);
}

#[test]
fn remote_tombstone_replaces_clean_local() {
    let local = ContractRecord::remote("c-1", Fields::new(), ContractStatus::Open, 100);
    let mut remote = ContractRecord::remote("c-1", Fields::new(), ContractStatus::Open, 200);
    remote.tombstone = true;

    let resolved = ConflictResolver::default().resolve(Some(&local), remote);
    assert_eq!(resolved.resolution, Resolution::RemoteNewer);
    assert!(resolved.record.tombstone);
    assert!(!resolved.record.dirty);
}

#[test]
fn local_tombstone_survives_newer_remote_edit() {
    let mut local = ContractRecord::remote("c-1", Fields::new(), ContractStatus::Open, 100);
    local.mark_deleted(150);
    let remote = ContractRecord::remote("c-1", fields(json!({"a": 1})), ContractStatus::Open, 200);

    let resolved = ConflictResolver::default().resolve(Some(&local), remote);
    assert!(resolved.record.tombstone);
    assert!(resolved.record.dirty);
}

#[test]
fn field_merge_keeps_disjoint_edits() {
    let local = ContractRecord::new(
        "c-1",
        fields(json!({"customer": "Local", "notes": "gate code 1234"})),
        ContractStatus::InProgress,
        100,
    );
    let remote = ContractRecord::remote(
        "c-1",
        fields(json!({"customer": "Remote", "assignee": "Team Süd"})),
        ContractStatus::Open,
        300,
    );

    let resolved = ConflictResolver::new(ConflictPolicy::FieldMerge).resolve(Some(&local), remote);

    assert_eq!(resolved.resolution, Resolution::FieldMerged);
    let merged = resolved.record;
    assert_eq!(merged.fields["customer"], "Local");
    assert_eq!(merged.fields["notes"], "gate code 1234");
    assert_eq!(merged.fields["assignee"], "Team Süd");
    assert_eq!(merged.status, ContractStatus::InProgress);
    assert_eq!(merged.updated_at, 301);
    assert!(merged.dirty);
}

#[test]
fn merge_report_counts() {
    let resolver = ConflictResolver::default();
    let mut report = MergeReport::default();

    let local = ContractRecord::new("c-1", Fields::new(), ContractStatus::Completed, 100);
    let remote = ContractRecord::remote("c-1", Fields::new(), ContractStatus::Open, 200);
    let resolved = resolver.resolve(Some(&local), remote);
    report.record(&resolved, Some(100), 200, false);

    let resolved = resolver.resolve(
        None,
        ContractRecord::remote("c-2", Fields::new(), ContractStatus::Open, 50),
    );
    report.record(&resolved, None, 50, true);

    assert_eq!(report.fetched, 2);
    assert_eq!(report.merged, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].id, "c-1");
    assert_eq!(report.conflicts[0].local_updated_at, 100);
    assert_eq!(report.conflicts[0].remote_updated_at, 200);
}

// ============================================================================
// Chunk Planning Edge Cases
// ============================================================================

#[test]
fn chunk_threshold_is_exclusive() {
    let policy = ChunkPolicy::default();
    let at_threshold: Vec<u32> = (0..500).collect();
    let above: Vec<u32> = (0..501).collect();

    assert_eq!(policy.plan(&at_threshold, None).unwrap().len(), 5);
    assert_eq!(policy.plan(&above, None).unwrap().len(), 11);
}

#[test]
fn empty_batch_has_no_chunks() {
    let items: Vec<u32> = Vec::new();
    assert_eq!(ChunkPolicy::default().plan(&items, None).unwrap().len(), 0);
}

#[test]
fn invalid_chunk_policies() {
    assert!(matches!(
        ChunkPolicy::new(500, 0, 50),
        Err(Error::InvalidChunkSize(0))
    ));
    assert!(matches!(
        ChunkPolicy::new(500, 100, 0),
        Err(Error::InvalidChunkSize(0))
    ));
    assert!(ChunkPolicy::default().plan(&[1, 2, 3], Some(0)).is_err());
}

// ============================================================================
// Summary Edge Cases
// ============================================================================

#[test]
fn both_legs_failing_is_an_error() {
    let mut summary = SyncSummary {
        download: DownloadLeg::failed("timeout"),
        upload: UploadLeg {
            ok: false,
            count: 0,
            errors: vec![UploadOutcome::failure(
                "c-1",
                UploadErrorKind::Timeout,
                "request timed out",
            )],
            reason: None,
        },
        status: SyncStatus::InProgress,
    };
    summary.finish();

    assert_eq!(summary.status, SyncStatus::Error);
    assert_eq!(summary.result(), CycleResult::Error);
    assert_eq!(
        summary.describe(),
        "download failed: timeout; uploaded 0 records, 1 failed"
    );
}

#[test]
fn offline_summary_names_both_legs() {
    let summary = SyncSummary::offline();
    assert_eq!(summary.result(), CycleResult::Error);
    assert_eq!(
        summary.describe(),
        "download failed: offline; upload skipped: offline"
    );
}

#[test]
fn summary_serializes_for_callers() {
    let mut summary = SyncSummary {
        upload: UploadLeg::from(&UploadReport::empty()),
        ..SyncSummary::default()
    };
    summary.finish();

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["download"]["ok"], true);
    assert_eq!(value["upload"]["count"], 0);
}

// ============================================================================
// View Cache Edge Cases
// ============================================================================

#[test]
fn text_filter_is_case_insensitive_and_skips_tombstones() {
    let mut deleted = ContractRecord::remote(
        "c-2",
        fields(json!({"customer": "Müller GmbH"})),
        ContractStatus::Open,
        2,
    );
    deleted.tombstone = true;
    let records = vec![
        ContractRecord::remote(
            "c-1",
            fields(json!({"customer": "Müller GmbH"})),
            ContractStatus::Open,
            1,
        ),
        deleted,
    ];

    let spec = FilterSpec::default().with_text("MÜLLER");
    let visible = spec.apply(&records);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, "c-1");

    assert_eq!(spec.include_deleted().apply(&records).len(), 2);
}

#[test]
fn cache_evicts_least_recently_used() {
    let records = vec![ContractRecord::remote(
        "c-1",
        Fields::new(),
        ContractStatus::Open,
        1,
    )];
    let mut cache = FilteredViewCache::new(2);
    let a = FilterSpec::default().limit(1);
    let b = FilterSpec::default().limit(2);
    let c = FilterSpec::default().limit(3);

    cache.get_filtered(&records, &a);
    cache.get_filtered(&records, &b);
    cache.get_filtered(&records, &a);
    cache.get_filtered(&records, &c);

    // b was least recently used and is gone; a still hits
    cache.get_filtered(&records, &a);
    assert_eq!(cache.stats().hits, 2);
    cache.get_filtered(&records, &b);
    assert_eq!(cache.stats().misses, 4);
    assert_eq!(cache.len(), 2);
}

#[test]
fn zero_capacity_cache_still_holds_one_entry() {
    let cache = FilteredViewCache::new(0);
    assert_eq!(cache.capacity(), 1);
}

// ============================================================================
// Document Edge Cases
// ============================================================================

#[test]
fn empty_document() {
    let document = RecordDocument::new(Vec::new(), SyncMetadata::default(), 0);
    let parsed = RecordDocument::from_json(&document.to_json().unwrap()).unwrap();

    assert!(parsed.records.is_empty());
    assert_eq!(parsed.max_updated_at(), 0);
}

#[test]
fn future_document_version_is_rejected() {
    let json = json!({
        "formatVersion": 99,
        "exportedAt": 0,
        "metadata": {},
        "records": []
    })
    .to_string();

    assert!(matches!(
        RecordDocument::from_json(&json),
        Err(Error::UnsupportedFormatVersion { found: 99, .. })
    ));
}

#[test]
fn bare_array_with_duplicate_ids_is_rejected() {
    let json = json!([
        {"id": "c-1", "updatedAt": 1},
        {"id": "c-1", "updatedAt": 2}
    ])
    .to_string();

    assert!(matches!(
        RecordDocument::from_json(&json),
        Err(Error::DuplicateRecord(_))
    ));
}

#[test]
fn garbage_is_an_invalid_document() {
    assert!(matches!(
        RecordDocument::from_json("{not json"),
        Err(Error::InvalidDocument(_))
    ));
}

// ============================================================================
// Properties
// ============================================================================

fn arb_record(dirty: impl Strategy<Value = bool>) -> impl Strategy<Value = ContractRecord> {
    (
        "c-[0-9]{1,2}",
        0usize..STATUSES.len(),
        0u64..10_000,
        dirty,
        any::<bool>(),
        proptest::collection::btree_map("[a-d]", 0i64..100, 0..4),
    )
        .prop_map(|(id, status, updated_at, dirty, tombstone, values)| {
            let fields: Fields = values.into_iter().map(|(k, v)| (k, json!(v))).collect();
            ContractRecord {
                id,
                fields,
                status: STATUSES[status],
                updated_at,
                dirty,
                tombstone,
            }
        })
}

proptest! {
    #[test]
    fn chunk_plan_covers_every_item_in_order(
        len in 0usize..2_000,
        threshold in 1usize..1_000,
        chunk_size in 1usize..200,
        large_chunk_size in 1usize..200,
    ) {
        let policy = ChunkPolicy::new(threshold, chunk_size, large_chunk_size).unwrap();
        let items: Vec<usize> = (0..len).collect();
        let expected_size = if len > threshold { large_chunk_size } else { chunk_size };

        let chunks: Vec<&[usize]> = policy.plan(&items, None).unwrap().collect();

        prop_assert_eq!(chunks.len(), len.div_ceil(expected_size));
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= expected_size));
        let flattened: Vec<usize> = chunks.concat();
        prop_assert_eq!(flattened, items);
    }

    #[test]
    fn override_always_wins(len in 0usize..2_000, size in 1usize..300) {
        let policy = ChunkPolicy::default();
        prop_assert_eq!(policy.chunk_size_for(len, Some(size)).unwrap(), size);
    }

    #[test]
    fn clock_is_strictly_increasing(nows in proptest::collection::vec(0u64..1_000_000, 1..100)) {
        let mut clock = MonotonicClock::new();
        let mut last = None;
        for now in nows {
            let ts = clock.next(now);
            prop_assert!(ts >= now);
            if let Some(previous) = last {
                prop_assert!(ts > previous);
            }
            last = Some(ts);
        }
    }

    #[test]
    fn newer_remote_never_overrides_dirty_local_by_default(
        local in arb_record(Just(true)),
        remote in arb_record(any::<bool>()),
        lead in 0u64..1_000,
    ) {
        let mut remote = remote;
        remote.id = local.id.clone();
        remote.updated_at = local.updated_at + lead;

        let resolved = ConflictResolver::default().resolve(Some(&local), remote);

        prop_assert_eq!(resolved.record, local);
    }

    #[test]
    fn resolved_record_is_one_of_the_inputs(
        local in arb_record(any::<bool>()),
        remote in arb_record(any::<bool>()),
        policy in prop_oneof![Just(ConflictPolicy::LocalWins), Just(ConflictPolicy::ServerWins)],
    ) {
        let mut remote = remote;
        remote.id = local.id.clone();

        let resolved = ConflictResolver::new(policy).resolve(Some(&local), remote.clone());

        let clean_remote = remote.into_remote();
        prop_assert!(resolved.record == local || resolved.record == clean_remote);
        // A dirty local copy is only ever dropped on purpose
        if local.dirty && resolved.record != local {
            prop_assert!(
                policy == ConflictPolicy::ServerWins
                    || local.same_content(&resolved.record)
            );
        }
    }

    #[test]
    fn absent_local_adopts_clean_remote(remote in arb_record(any::<bool>())) {
        let resolved = ConflictResolver::default().resolve(None, remote.clone());

        prop_assert_eq!(resolved.resolution, Resolution::Adopted);
        prop_assert!(!resolved.record.dirty);
        prop_assert!(resolved.record.same_content(&remote));
    }

    #[test]
    fn cached_views_match_uncached(
        records in proptest::collection::vec(arb_record(any::<bool>()), 0..30),
        status in proptest::option::of(0usize..STATUSES.len()),
        dirty_only in any::<bool>(),
        limit in proptest::option::of(0usize..10),
    ) {
        let spec = FilterSpec {
            status: status.map(|i| STATUSES[i]),
            dirty_only,
            limit,
            sort: SortOrder::Id,
            ..FilterSpec::default()
        };
        let mut cache = FilteredViewCache::default();

        let first = cache.get_filtered(&records, &spec);
        let second = cache.get_filtered(&records, &spec);

        prop_assert_eq!(&first, &spec.apply(&records));
        prop_assert_eq!(first, second);
        prop_assert_eq!(cache.stats().hits, 1);
    }
}
