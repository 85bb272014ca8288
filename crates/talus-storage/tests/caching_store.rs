//! Integration tests for the caching store: head discovery across pages,
//! partial-read upgrades, native context snapshots and the OCC put
//! contract.

use std::sync::Arc;

use bytes::Bytes;

use talus_core::massif::START_HEADER_END;
use talus_core::paths::ObjectKind;
use talus_core::Error;
use talus_test_utils::{StoreOp, TestContext, TracingMemoryStore};

#[tokio::test]
async fn head_discovery_pages_to_the_last_item() {
    // a backing store that pages at 2 items forces multiple list calls
    let mut tc = TestContext::over(Arc::new(TracingMemoryStore::with_page_size(2)), 3);
    let mut committer = tc.committer();
    // 9 leaves spread over massifs 0, 1 and 2
    tc.commit_leaves(&mut committer, 9).await.unwrap();

    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();

    tc.store.clear_operations();
    let head = store.head_index(ObjectKind::MassifData).await.unwrap();
    assert_eq!(head, 2);

    let lists = tc
        .store
        .operations()
        .iter()
        .filter(|op| matches!(op, StoreOp::List { .. }))
        .count();
    assert!(lists >= 2, "paging should take multiple list calls");

    // discovery seeds the native cache from the listing
    let native = store.native(2, ObjectKind::MassifData).unwrap().unwrap();
    assert!(native.path.ends_with("/massifs/0000000000000002.log"));
    assert!(!native.etag.is_empty());

    // and records the known extents for the kind
    assert_eq!(store.extents(ObjectKind::MassifData).unwrap(), Some((0, 2)));
    assert_eq!(store.extents(ObjectKind::Checkpoint).unwrap(), None);
}

#[tokio::test]
async fn head_discovery_of_an_empty_log_is_log_empty() {
    let tc = TestContext::new();
    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();

    assert!(matches!(
        store.head_index(ObjectKind::MassifData).await,
        Err(Error::LogEmpty)
    ));
    assert!(matches!(
        store.head_index(ObjectKind::Checkpoint).await,
        Err(Error::LogEmpty)
    ));
}

#[tokio::test]
async fn start_reads_are_header_only_and_upgraded_on_body_access() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 2).await.unwrap();

    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();
    tc.store.clear_operations();

    let start = store.get_start(0).await.unwrap();
    assert_eq!(start.first_index, 0);

    // the read was truncated to the header
    let ops = tc.store.operations();
    assert!(
        matches!(
            ops.as_slice(),
            [StoreOp::Read { max_bytes: Some(n), .. }] if *n == START_HEADER_END
        ),
        "got {ops:?}"
    );

    // a body consumer upgrades with a full re-read
    tc.store.clear_operations();
    let data = store.get_data(0).await.unwrap();
    assert!(data.len() > START_HEADER_END);
    let ops = tc.store.operations();
    assert!(
        matches!(ops.as_slice(), [StoreOp::Read { max_bytes: None, .. }]),
        "got {ops:?}"
    );

    // both entities are now cached; no further reads
    tc.store.clear_operations();
    store.get_start(0).await.unwrap();
    store.get_data(0).await.unwrap();
    assert!(tc.store.operations().is_empty());
}

#[tokio::test]
async fn etags_round_trip_between_commits() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();

    let mut previous_etag = String::new();
    for i in 0..3u64 {
        tc.commit_leaves(&mut committer, 1).await.unwrap();
        let native = committer
            .store_mut()
            .native(0, ObjectKind::MassifData)
            .unwrap()
            .unwrap();
        assert!(!native.etag.is_empty());
        assert_ne!(native.etag, previous_etag, "commit {i}");

        // the etag observed by the next read equals the one the write
        // returned
        let mut reader = tc.caching_store();
        reader.select_log(tc.log_id).unwrap();
        reader.head_index(ObjectKind::MassifData).await.unwrap();
        let observed = reader.native(0, ObjectKind::MassifData).unwrap().unwrap();
        assert_eq!(observed.etag, native.etag, "commit {i}");
        previous_etag = native.etag;
    }
}

#[tokio::test]
async fn put_creates_then_guards_updates_with_the_etag() {
    let tc = TestContext::new();
    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();

    // build a plausible massif payload; put sanity-checks the header byte
    let payload = talus_core::MassifContext::new_first(1, 3).data;

    // no native context: the write is a create
    store
        .put(0, ObjectKind::MassifData, Bytes::from(payload.clone()), false)
        .await
        .unwrap();
    let ops = tc.store.operations();
    assert!(
        ops.iter().any(|op| matches!(
            op,
            StoreOp::Put { if_none_match_any: true, if_match: None, .. }
        )),
        "creates must demand absence, got {ops:?}"
    );

    // the native context now carries the etag; an update uses if-match
    tc.store.clear_operations();
    store
        .put(0, ObjectKind::MassifData, Bytes::from(payload.clone()), false)
        .await
        .unwrap();
    let ops = tc.store.operations();
    assert!(
        ops.iter().any(|op| matches!(
            op,
            StoreOp::Put { if_none_match_any: false, if_match: Some(_), .. }
        )),
        "updates must be etag guarded, got {ops:?}"
    );

    // fail_if_exists short-circuits on the cached context without I/O
    tc.store.clear_operations();
    let err = store
        .put(0, ObjectKind::MassifData, Bytes::from(payload), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert!(tc.store.operations().is_empty());
}

#[tokio::test]
async fn put_as_create_collides_when_the_blob_exists() {
    let tc = TestContext::new();
    let payload = talus_core::MassifContext::new_first(1, 3).data;

    // writer one creates through its own cache
    let mut store_one = tc.caching_store();
    store_one.select_log(tc.log_id).unwrap();
    store_one
        .put(0, ObjectKind::MassifData, Bytes::from(payload.clone()), false)
        .await
        .unwrap();

    // writer two has no native context, so its put is a create and loses
    let mut store_two = tc.caching_store();
    store_two.select_log(tc.log_id).unwrap();
    let err = store_two
        .put(0, ObjectKind::MassifData, Bytes::from(payload), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[tokio::test]
async fn checkpoint_reads_require_the_decoder() {
    use talus_storage::{CachingStore, StoreOptions};

    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 2).await.unwrap();
    let mc = committer.get_current_context().await.unwrap();
    tc.seal(&mc).await.unwrap();

    // a store opened without a decoder cannot read checkpoints
    let mut bare = CachingStore::new(tc.store.clone(), StoreOptions::default());
    bare.select_log(tc.log_id).unwrap();
    assert!(matches!(
        bare.get_checkpoint(0).await,
        Err(Error::OpConfigMissing(_))
    ));

    // the wired store decodes and caches it
    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();
    let checkpoint = store.get_checkpoint(0).await.unwrap();
    assert_eq!(checkpoint.state.mmr_size, 3);
    assert_eq!(checkpoint.state.id_timestamp, mc.last_id_timestamp());

    tc.store.clear_operations();
    store.get_checkpoint(0).await.unwrap();
    assert!(tc.store.operations().is_empty(), "second read is cached");
}

#[tokio::test]
async fn verified_context_checks_the_signed_peaks() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 3).await.unwrap();
    let mc = committer.get_current_context().await.unwrap();
    tc.seal(&mc).await.unwrap();

    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();

    let verified = store.head_context_verified().await.unwrap();
    assert_eq!(verified.state.mmr_size, verified.massif.mmr_size());
    assert_eq!(verified.massif.start.massif_index, 0);
}

#[tokio::test]
async fn dropping_an_index_forces_a_re_read() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 1).await.unwrap();

    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();
    store.get_data(0).await.unwrap();

    tc.store.clear_operations();
    store.drop_index(0, ObjectKind::MassifData);
    store.get_data(0).await.unwrap();
    assert_eq!(tc.store.operations().len(), 1, "dropped data is re-read");
}

#[tokio::test]
async fn unavailable_stores_surface_as_not_available() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 1).await.unwrap();

    let mut store = tc.caching_store();
    store.select_log(tc.log_id).unwrap();
    tc.store.fail_paths_under("v1/mmrs/");

    assert!(matches!(
        store.get_data(0).await,
        Err(Error::NotAvailable { .. })
    ));
}
