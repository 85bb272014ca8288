//! Integration tests for the watcher: filter pagination, massif/checkpoint
//! pairing, the not-found sentinel, log restriction and the no-changes
//! terminal state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use talus_core::{idtimestamp, Error};
use talus_test_utils::{StoreOp, TestContext, TracingMemoryStore};
use talus_watch::{LogTailCollator, WatchConfig, Watcher, SEAL_ID_NOT_FOUND};

/// Three active logs on one store: two sealed, one not. Small filter pages
/// force the watcher through the pagination path.
async fn seeded_store() -> (Arc<TracingMemoryStore>, Vec<TestContext>) {
    let store = Arc::new(TracingMemoryStore::with_page_size(2));

    let mut contexts = Vec::new();
    for (leaves, sealed) in [(5u64, true), (1, true), (2, false)] {
        let mut tc = TestContext::over(store.clone(), 3);
        let mut committer = tc.committer();
        tc.commit_leaves(&mut committer, leaves).await.unwrap();
        if sealed {
            let mc = committer.get_current_context().await.unwrap();
            tc.seal(&mc).await.unwrap();
        }
        contexts.push(tc);
    }
    (store, contexts)
}

fn latest_config() -> WatchConfig {
    WatchConfig {
        latest: true,
        watch_count: 1,
        object_prefix_url: "https://store.example/".into(),
        ..WatchConfig::default()
    }
}

#[tokio::test]
async fn one_record_per_log_with_seal_pairing() {
    let (store, contexts) = seeded_store().await;

    let mut watcher = Watcher::new(latest_config()).unwrap();
    let mut collator = LogTailCollator::new();
    let cancel = CancellationToken::new();

    store.clear_operations();
    let activity = watcher
        .watch_for_changes(store.as_ref(), &mut collator, &cancel)
        .await
        .unwrap();

    // pagination: the round needed several filter calls
    let filters = store
        .operations()
        .iter()
        .filter(|op| matches!(op, StoreOp::Filter { .. }))
        .count();
    assert!(filters >= 2, "expected paged filtering, got {filters} calls");

    assert_eq!(activity.len(), 3, "one record per active log");

    // log 0: five leaves span massifs 0 and 1; the report pairs the
    // highest-index massif with its seal
    let record = activity
        .iter()
        .find(|a| a.log_id == contexts[0].log_id)
        .unwrap();
    assert_eq!(record.massif, 1);
    assert_ne!(record.id_confirmed, SEAL_ID_NOT_FOUND);
    assert!(record
        .massif_url
        .starts_with("https://store.example/v1/mmrs/tenant/"));
    assert!(record.massif_url.ends_with("/massifs/0000000000000001.log"));
    assert!(record
        .checkpoint_url
        .ends_with("/massifseals/0000000000000001.sth"));

    // the id timestamps decode, and last_modified is the later of the two
    let (massif_id, epoch) = idtimestamp::split_hex(&record.id_committed).unwrap();
    let (seal_id, _) = idtimestamp::split_hex(&record.id_confirmed).unwrap();
    let latest = idtimestamp::time_of(massif_id.max(seal_id), epoch).unwrap();
    assert_eq!(
        record.last_modified,
        latest.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );

    // log 2 has no seal: the sentinel and an empty checkpoint url
    let record = activity
        .iter()
        .find(|a| a.log_id == contexts[2].log_id)
        .unwrap();
    assert_eq!(record.massif, 0);
    assert_eq!(record.id_confirmed, SEAL_ID_NOT_FOUND);
    assert!(record.checkpoint_url.is_empty());
    assert!(!record.last_modified.is_empty());
}

#[tokio::test]
async fn watch_logs_restricts_the_report() {
    let (store, contexts) = seeded_store().await;

    let mut cfg = latest_config();
    cfg.watch_logs = Some(HashSet::from([contexts[1].log_id]));
    let mut watcher = Watcher::new(cfg).unwrap();
    let mut collator = LogTailCollator::new();

    let activity = watcher
        .watch_for_changes(store.as_ref(), &mut collator, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].log_id, contexts[1].log_id);
}

#[tokio::test]
async fn a_floor_above_all_activity_finds_no_changes() {
    let (store, _contexts) = seeded_store().await;

    // anchor far in the future of the fake clock
    let far_future = idtimestamp::to_hex(u64::MAX >> 1, 1);
    let mut watcher = Watcher::new(WatchConfig {
        id_since: Some(far_future),
        watch_count: 1,
        ..WatchConfig::default()
    })
    .unwrap();
    let mut collator = LogTailCollator::new();

    let err = watcher
        .watch_for_changes(store.as_ref(), &mut collator, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoChanges));
}

#[tokio::test]
async fn repeated_empty_rounds_end_with_no_changes() {
    let store = TracingMemoryStore::new();

    let mut watcher = Watcher::new(WatchConfig {
        latest: true,
        watch_count: 3,
        interval: Some(Duration::from_millis(5)),
        ..WatchConfig::default()
    })
    .unwrap();
    let mut collator = LogTailCollator::new();

    let err = watcher
        .watch_for_changes(&store, &mut collator, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoChanges));

    let filters = store
        .operations()
        .iter()
        .filter(|op| matches!(op, StoreOp::Filter { .. }))
        .count();
    assert_eq!(filters, 3, "one filter round per watch count");
}

#[tokio::test]
async fn cancellation_cuts_the_wait_short() {
    let store = TracingMemoryStore::new();

    let mut watcher = Watcher::new(WatchConfig {
        latest: true,
        watch_count: 1000,
        interval: Some(Duration::from_secs(3600)),
        ..WatchConfig::default()
    })
    .unwrap();
    let mut collator = LogTailCollator::new();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = watcher
        .watch_for_changes(&store, &mut collator, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoChanges));
}

#[tokio::test]
async fn reports_render_as_json() {
    let (store, _contexts) = seeded_store().await;

    let mut watcher = Watcher::new(latest_config()).unwrap();
    let mut collator = LogTailCollator::new();
    let activity = watcher
        .watch_for_changes(store.as_ref(), &mut collator, &CancellationToken::new())
        .await
        .unwrap();

    let rendered = talus_watch::render_report(&activity).unwrap();
    assert!(rendered.contains("\"massifUrl\""));
    assert!(rendered.contains("\"idCommitted\""));
}
