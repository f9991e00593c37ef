//! Thread-safe stream backend under real concurrency

use std::collections::HashSet;

use eddy_core::{PushService, SharedBroadcaster, SharedStream, StreamError, StreamRegistry};
use futures::StreamExt;
use tokio_test::{assert_pending, assert_ready_eq, task};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribers_see_one_producer_in_order() {
    let stream = SharedStream::new_hot();
    let subscribers: Vec<_> = (0..4).map(|_| stream.subscribe()).collect();
    let mut broadcaster = stream
        .broadcaster()
        .cloned()
        .expect("hot stream has a broadcaster");

    let readers: Vec<_> = subscribers
        .into_iter()
        .map(|sub| tokio::spawn(sub.collect::<Vec<u32>>()))
        .collect();
    let producer = tokio::spawn(async move {
        for value in 0..100 {
            broadcaster.push(value).unwrap();
            tokio::task::yield_now().await;
        }
        broadcaster.close();
    });

    producer.await.unwrap();
    let expected: Vec<u32> = (0..100).collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_are_observed_in_one_order() {
    let broadcaster = SharedBroadcaster::new();
    let first = broadcaster.subscribe();
    let second = broadcaster.subscribe();

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for value in 0..25 {
                    broadcaster.emit(producer * 100 + value).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    broadcaster.close();

    let first: Vec<u32> = first.collect().await;
    let second: Vec<u32> = second.collect().await;

    assert_eq!(first.len(), 100);
    assert_eq!(first, second);
    assert_eq!(first.iter().collect::<HashSet<_>>().len(), 100);
}

#[tokio::test]
async fn test_cold_shared_stream_replays_across_tasks() {
    let stream = SharedStream::new_cold(vec!["Asset1", "Asset2", "Asset3"]);

    let readers: Vec<_> = (0..3)
        .map(|_| tokio::spawn(stream.subscribe().collect::<Vec<_>>()))
        .collect();

    for reader in readers {
        assert_eq!(reader.await.unwrap(), vec!["Asset1", "Asset2", "Asset3"]);
    }
}

#[test]
fn test_subscription_wakes_on_close() {
    let broadcaster: SharedBroadcaster<u8> = SharedBroadcaster::new();
    let mut sub = broadcaster.subscribe();

    let mut next = task::spawn(sub.next());
    assert_pending!(next.poll());

    broadcaster.close();
    assert!(next.is_woken());
    assert_ready_eq!(next.poll(), None);
}

#[tokio::test]
async fn test_cancelled_subscriber_is_skipped_by_later_emits() {
    let broadcaster = SharedBroadcaster::new();
    let mut cancelled = broadcaster.subscribe();
    let mut kept = broadcaster.subscribe();

    assert_eq!(broadcaster.cancel(&mut cancelled), Ok(0));
    let outcome = broadcaster.emit("Asset1").unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(kept.next_value().await, Some("Asset1"));
    assert_eq!(cancelled.next_value().await, None);
}

#[test]
fn test_double_cancel_is_rejected_by_both_backends() {
    let mut registry = StreamRegistry::new();
    let stream = registry.create_hot();
    let virtual_sub = registry.subscribe(stream).unwrap();
    registry.emit(stream, 1u8).unwrap();

    let broadcaster = SharedBroadcaster::new();
    let mut shared_sub = broadcaster.subscribe();
    broadcaster.emit(1u8).unwrap();

    assert_eq!(registry.cancel(virtual_sub), Ok(1));
    assert_eq!(broadcaster.cancel(&mut shared_sub), Ok(1));
    assert!(matches!(
        registry.cancel(virtual_sub),
        Err(StreamError::AlreadyCancelled { .. })
    ));
    assert!(matches!(
        broadcaster.cancel(&mut shared_sub),
        Err(StreamError::AlreadyCancelled { .. })
    ));
}
