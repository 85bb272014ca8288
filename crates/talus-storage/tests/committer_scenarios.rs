//! Integration tests for the append-commit engine.
//!
//! Covers the three head states (create-first, extend, create-next), the
//! overfill rule, and the conditional-write conflicts between racing
//! committers.

use talus_core::massif::{peak_stack_bytes, MassifContext, NODE_SIZE, START_HEADER_END};
use talus_core::paths::ObjectKind;
use talus_core::tags::{get_first_index, get_last_id_hex};
use talus_core::Error;
use talus_test_utils::{append_leaf, leaf_value, TestContext};

#[tokio::test]
async fn first_massif_context_is_created_in_memory() {
    let tc = TestContext::new();
    let mut committer = tc.committer();

    let mc = committer.get_current_context().await.unwrap();
    assert!(mc.creating);
    assert_eq!(mc.start.massif_index, 0);
    assert_eq!(mc.start.first_index, 0);
    assert_eq!(mc.start.massif_height, 3);
    assert_eq!(mc.data.len(), START_HEADER_END + peak_stack_bytes(3));
    assert_eq!(mc.count(), 0);

    // the native context is retained for the commit, tagged and pathed
    let native = committer
        .store_mut()
        .native(0, ObjectKind::MassifData)
        .unwrap()
        .unwrap();
    assert!(native.path.ends_with("/massifs/0000000000000000.log"));
    assert_eq!(get_first_index(&native.tags).unwrap(), 0);
    assert!(native.etag.is_empty(), "nothing has been written yet");

    // nothing was written to the store either
    assert_eq!(tc.store.put_count(&native.path), 0);
}

#[tokio::test]
async fn add_two_entries_and_commit() {
    let tc = TestContext::new();
    let mut committer = tc.committer();

    let mut mc = committer.get_current_context().await.unwrap();
    mc.append_node(&[1u8; NODE_SIZE]);
    mc.append_node(&[2u8; NODE_SIZE]);
    committer.commit_context(&mc).await.unwrap();

    let native = committer
        .store_mut()
        .native(0, ObjectKind::MassifData)
        .unwrap()
        .unwrap();
    assert!(!native.etag.is_empty());
    assert_ne!(get_last_id_hex(&native.tags), "");

    let mc = committer.get_current_context().await.unwrap();
    assert!(!mc.creating);
    assert_eq!(mc.start.massif_index, 0);
    assert_eq!(mc.count(), 2);
}

#[tokio::test]
async fn filling_the_massif_starts_the_next() {
    let tc = TestContext::new();
    let mut committer = tc.committer();

    // height 3: seven nodes complete the massif
    let mut mc = committer.get_current_context().await.unwrap();
    for i in 0..7u8 {
        mc.append_node(&[i; NODE_SIZE]);
    }
    committer.commit_context(&mc).await.unwrap();

    let next = committer.get_current_context().await.unwrap();
    assert!(next.creating);
    assert_eq!(next.start.massif_index, 1);
    assert_eq!(next.start.first_index, 7);
    assert_eq!(next.count(), 0);
    // the peak index area carries massif 0's root forward
    assert_eq!(next.peak_stack_entry(0).unwrap(), [6u8; NODE_SIZE]);
    assert_eq!(next.start.previous_root, [6u8; NODE_SIZE]);

    let native = committer
        .store_mut()
        .native(1, ObjectKind::MassifData)
        .unwrap()
        .unwrap();
    assert!(native.path.ends_with("/massifs/0000000000000001.log"));
    assert_eq!(get_first_index(&native.tags).unwrap(), 7);
    assert!(native.etag.is_empty(), "the successor has not been written");
}

#[tokio::test]
async fn overfilled_context_is_rejected_and_the_blob_untouched() {
    let tc = TestContext::new();
    let mut committer = tc.committer();

    let mut mc = committer.get_current_context().await.unwrap();
    // eight nodes in a massif whose allocation ends at mmr size 7
    for i in 0..8u8 {
        mc.append_node(&[i; NODE_SIZE]);
    }
    let err = committer.commit_context(&mc).await.unwrap_err();
    assert!(
        matches!(err, Error::MassifFull { max_mmr_size: 7, .. }),
        "got {err:?}"
    );

    let native = committer
        .store_mut()
        .native(0, ObjectKind::MassifData)
        .unwrap()
        .unwrap();
    assert_eq!(tc.store.put_count(&native.path), 0, "no write must happen");
}

#[tokio::test]
async fn spur_completion_may_exceed_the_base_size() {
    // massif 1 of a height 3 log legitimately holds eight nodes: leaves
    // 4..8 plus the spur that completes the 15 node mmr
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    tc.commit_leaves(&mut committer, 8).await.unwrap();

    let mc = committer.get_current_context().await.unwrap();
    assert!(mc.creating);
    assert_eq!(mc.start.massif_index, 2);
    assert_eq!(mc.start.first_index, 15);
}

#[tokio::test]
async fn three_massifs_with_real_leaves() {
    let mut tc = TestContext::new();
    let mut committer = tc.committer();
    // 4 + 4 + 1 leaves: massifs 0 and 1 full, massif 2 started
    tc.commit_leaves(&mut committer, 9).await.unwrap();

    let store = committer.store_mut();
    assert_eq!(store.head_index(ObjectKind::MassifData).await.unwrap(), 2);

    for (index, first) in [(0u32, 0u64), (1, 7), (2, 15)] {
        let start = store.get_start(index).await.unwrap();
        assert_eq!(start.massif_index, index);
        assert_eq!(start.first_index, first, "massif {index}");
    }

    // earlier massifs are exactly full, the head is partial
    let m0 = store.get_massif_context(0).await.unwrap();
    assert!(!m0.has_capacity());
    let m2 = store.get_massif_context(2).await.unwrap();
    assert!(m2.has_capacity());
    assert_eq!(m2.count(), 1);
}

#[tokio::test]
async fn stale_committer_gets_a_precondition_failure() {
    let mut tc = TestContext::new();
    let mut committer_a = tc.committer();
    tc.commit_leaves(&mut committer_a, 1).await.unwrap();

    let mut committer_b = tc.committer();

    // both read the same head, same etag
    let mut mc_a = committer_a.get_current_context().await.unwrap();
    let mut mc_b = committer_b.get_current_context().await.unwrap();
    assert_eq!(mc_a.count(), mc_b.count());

    append_leaf(&mut mc_a, &leaf_value("a", 1), 2 << 20).unwrap();
    committer_a.commit_context(&mc_a).await.unwrap();

    append_leaf(&mut mc_b, &leaf_value("b", 1), 3 << 20).unwrap();
    let err = committer_b.commit_context(&mc_b).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed { .. }), "got {err:?}");

    // the loser re-reads the head and observes the winner's state
    let mc_b = committer_b.get_current_context().await.unwrap();
    assert_eq!(mc_b.data, mc_a.data);
    let etag_a = committer_a
        .store_mut()
        .native(0, ObjectKind::MassifData)
        .unwrap()
        .unwrap()
        .etag;
    let etag_b = committer_b
        .store_mut()
        .native(0, ObjectKind::MassifData)
        .unwrap()
        .unwrap()
        .etag;
    assert_eq!(etag_a, etag_b);
}

#[tokio::test]
async fn racing_creates_resolve_to_exactly_one_winner() {
    let tc = TestContext::new();
    let mut committer_a = tc.committer();
    let mut committer_b = tc.committer();

    let mut mc_a = committer_a.get_current_context().await.unwrap();
    let mut mc_b = committer_b.get_current_context().await.unwrap();
    assert!(mc_a.creating && mc_b.creating);

    mc_a.append_node(&[0xa; NODE_SIZE]);
    mc_b.append_node(&[0xb; NODE_SIZE]);

    committer_a.commit_context(&mc_a).await.unwrap();
    let err = committer_b.commit_context(&mc_b).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)), "got {err:?}");

    // the loser's remediation: re-read the head and extend the winner's blob
    let mc_b = committer_b.get_current_context().await.unwrap();
    assert!(!mc_b.creating);
    assert_eq!(mc_b.get_node(0).unwrap(), [0xa; NODE_SIZE]);
}

#[tokio::test]
async fn first_index_tag_mismatch_is_fatal() {
    use bytes::Bytes;
    use talus_core::store::{ObjectWriter, WriteOptions};
    use talus_core::tags::{set_first_index, TagMap};

    let tc = TestContext::new();

    // hand-craft a massif blob whose tag disagrees with its header
    let mc = MassifContext::new_first(1, 3);
    let mut tags = TagMap::new();
    set_first_index(&mut tags, 999);
    let path = talus_core::LogPaths::object_path(&tc.log_id, ObjectKind::MassifData, 0).unwrap();
    tc.store
        .put(
            &path,
            Bytes::from(mc.data.clone()),
            WriteOptions {
                tags: Some(tags),
                ..WriteOptions::default()
            },
        )
        .await
        .unwrap();

    let mut committer = tc.committer();
    let err = committer.get_current_context().await.unwrap_err();
    assert!(
        matches!(err, Error::IncorrectFirstIndexTag { tag: 999, header: 0 }),
        "got {err:?}"
    );
}
