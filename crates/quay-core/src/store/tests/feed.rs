use super::*;

#[test]
fn happy_path_messages_sent() {
    let (store, _dir) = test_store();
    let a = test_message("outgoing");
    let mut b = test_message("outgoing");
    b.deliver_by = Some(now_ns() + Duration::from_secs(5).as_nanos() as u64);
    b.max_attempts = Some(3);
    b.headers.insert("header".to_string(), "headervalue".to_string());

    commit_outgoing(&store, &[a.clone(), b.clone()]);
    store.successfully_sent(&a).unwrap();

    let mut feed = store.persisted_outgoing_messages().unwrap();
    let result = feed.recv_timeout(ARRIVAL).unwrap();
    assert_eq!(result.id, b.id);
    assert_eq!(result.queue, b.queue);
    assert_eq!(result.payload, b.payload);
    assert_eq!(result.sent_at, b.sent_at);
    assert_eq!(result.deliver_by, b.deliver_by);
    assert_eq!(result.max_attempts, b.max_attempts);
    assert_eq!(result.headers["header"], "headervalue");
    assert!(feed.recv_timeout(QUIET).is_err(), "only B should be pending");
}

#[test]
fn early_subscriber_sees_every_commit_once_in_order() {
    let (store, _dir) = test_store();
    let mut feed = store.persisted_outgoing_messages().unwrap();
    assert_eq!(feed.backlog_len(), 0);

    let first = vec![test_message("outgoing"), test_message("outgoing")];
    let second = vec![test_message("outgoing")];
    let third = vec![test_message("outgoing"), test_message("outgoing")];
    for batch in [&first, &second, &third] {
        commit_outgoing(&store, batch);
    }

    let expected: Vec<Uuid> = [first, second, third].concat().iter().map(|m| m.id).collect();
    assert_eq!(ids(&drain(&mut feed)), expected);
}

#[test]
fn late_subscriber_catches_up_then_follows() {
    let (store, _dir) = test_store();
    let existing = vec![
        test_message("outgoing"),
        test_message("outgoing"),
        test_message("outgoing"),
    ];
    commit_outgoing(&store, &existing);

    let mut feed = store.persisted_outgoing_messages().unwrap();
    assert_eq!(feed.backlog_len(), 3);

    let newer = test_message("outgoing");
    commit_outgoing(&store, &[newer.clone()]);

    let mut expected = ids(&existing);
    expected.push(newer.id);
    assert_eq!(ids(&drain(&mut feed)), expected);
}

#[test]
fn catch_up_is_ordered_by_sent_time_across_queues() {
    let (store, _dir) = test_store();
    store.create_queue("other").unwrap();

    let mut late = test_message("outgoing");
    late.sent_at = 3_000;
    let mut early = test_message("other");
    early.sent_at = 1_000;
    let mut middle = test_message("outgoing");
    middle.sent_at = 2_000;
    commit_outgoing(&store, &[late.clone(), early.clone(), middle.clone()]);

    let mut feed = store.persisted_outgoing_messages().unwrap();
    assert_eq!(ids(&drain(&mut feed)), vec![early.id, middle.id, late.id]);
}

#[test]
fn live_messages_follow_staging_order() {
    let (store, _dir) = test_store();
    let mut feed = store.persisted_outgoing_messages().unwrap();

    // Staging order wins over sent time for live delivery.
    let mut later = test_message("outgoing");
    later.sent_at = 2_000;
    let mut earlier = test_message("outgoing");
    earlier.sent_at = 1_000;
    commit_outgoing(&store, &[later.clone(), earlier.clone()]);

    assert_eq!(ids(&drain(&mut feed)), vec![later.id, earlier.id]);
}

#[test]
fn rolled_back_messages_are_never_announced() {
    let (store, _dir) = test_store();
    let mut feed = store.persisted_outgoing_messages().unwrap();

    let mut tx = store.begin_transaction().unwrap();
    store.store_outgoing(&mut tx, &test_message("outgoing")).unwrap();
    tx.rollback().unwrap();

    assert!(feed.recv_timeout(QUIET).is_err());
}

#[test]
fn message_removed_in_same_transaction_is_not_announced() {
    let (store, _dir) = test_store();
    let mut feed = store.persisted_outgoing_messages().unwrap();
    let kept = test_message("outgoing");
    let removed = test_message("outgoing");

    let mut tx = store.begin_transaction().unwrap();
    store.store_outgoing(&mut tx, &kept).unwrap();
    store.store_outgoing(&mut tx, &removed).unwrap();
    store
        .remove_outgoing(&mut tx, &removed.queue, &removed.id)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(ids(&drain(&mut feed)), vec![kept.id]);
}

#[test]
fn every_subscriber_gets_its_own_copy() {
    let (store, _dir) = test_store();
    let mut first = store.persisted_outgoing_messages().unwrap();
    let mut second = store.persisted_outgoing_messages().unwrap();

    let msg = test_message("outgoing");
    commit_outgoing(&store, &[msg.clone()]);

    assert_eq!(first.recv_timeout(ARRIVAL).unwrap(), msg);
    assert_eq!(second.recv_timeout(ARRIVAL).unwrap(), msg);
}

#[test]
fn dropped_subscription_stops_receiving() {
    let (store, _dir) = test_store();
    let feed = store.persisted_outgoing_messages().unwrap();
    drop(feed);

    commit_outgoing(&store, &[test_message("outgoing")]);
    assert_eq!(store.publisher.subscriber_count(), 0);
}

#[test]
fn concurrent_writers_deliver_each_message_once() {
    let (store, _dir) = test_store();
    let mut feed = store.persisted_outgoing_messages().unwrap();

    let batches: Vec<Vec<Message>> = (0..4)
        .map(|_| (0..5).map(|_| test_message("outgoing")).collect())
        .collect();
    std::thread::scope(|scope| {
        for batch in &batches {
            let store = &store;
            scope.spawn(move || commit_outgoing(store, batch));
        }
    });

    let mut received = ids(&drain(&mut feed));
    let mut expected: Vec<Uuid> = batches.iter().flat_map(|b| ids(b)).collect();
    received.sort();
    expected.sort();
    assert_eq!(received, expected);
}

#[test]
fn subscription_during_concurrent_commits_sees_each_message_once() {
    let (store, _dir) = test_store();
    let batches: Vec<Vec<Message>> = (0..20)
        .map(|_| vec![test_message("outgoing"), test_message("outgoing")])
        .collect();

    let mut feed = std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for batch in &batches {
                commit_outgoing(&store, batch);
            }
        });
        let feed = store.persisted_outgoing_messages().unwrap();
        writer.join().unwrap();
        feed
    });

    let received = ids(&drain(&mut feed));
    let expected: Vec<Uuid> = batches.iter().flat_map(|b| ids(b)).collect();
    assert_eq!(received.len(), expected.len(), "no duplicates, no gaps");
    let mut sorted = received.clone();
    sorted.sort();
    let mut expected_sorted = expected;
    expected_sorted.sort();
    assert_eq!(sorted, expected_sorted);
}

#[test]
fn close_ends_subscriptions() {
    let (store, _dir) = test_store();
    let msg = test_message("outgoing");
    commit_outgoing(&store, &[msg.clone()]);
    let mut feed = store.persisted_outgoing_messages().unwrap();

    store.close().unwrap();

    // The catch-up backlog is still yielded, then the sequence ends.
    assert_eq!(feed.next().map(|m| m.id), Some(msg.id));
    assert!(feed.next().is_none());
}

#[test]
fn subscription_after_publisher_shutdown_is_not_registered() {
    let (store, _dir) = test_store();
    // Close has shut the publisher down after this caller got past the
    // environment.
    store.publisher.close();

    let err = store.persisted_outgoing_messages().err().unwrap();
    assert!(
        matches!(err, StoreError::Storage(StorageError::StoreClosed)),
        "expected StoreClosed, got {err:?}"
    );
    assert_eq!(store.publisher.subscriber_count(), 0);
}
