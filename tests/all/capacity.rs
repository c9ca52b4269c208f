use crate::helpers::{settings, EchoServer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use stream_pool::context::Context;
use stream_pool::manager::Manager;
use stream_pool::pool::Error;
use tokio::sync::Barrier;

#[tokio::test]
async fn a_single_slot_is_handed_out_once_and_reused_after_release() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Manager::new(settings(1, 0, 1));
    let ctx = Context::background();

    // Act
    let first = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let first_id = first.id();
    let first_used_at = first.used_at();
    let second = manager.acquire_destination(&ctx, &destination).await;

    // Assert
    assert_eq!(1, manager.status(&destination).unwrap().size);
    assert!(matches!(
        second,
        Err(Error::TooManyConnections { destination: d }) if d == destination
    ));

    // Act
    first.release();
    let third = manager.acquire_destination(&ctx, &destination).await.unwrap();

    // Assert
    assert_eq!(first_id, third.id());
    assert!(third.used_at() > first_used_at);
    assert_eq!(1, server.accepted());
}

#[tokio::test]
async fn a_new_stream_is_dialed_when_the_free_queue_is_empty_up_to_max_count() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Manager::new(settings(1, 0, 2));
    let ctx = Context::background();

    // Act
    let first = manager.acquire_destination(&ctx, &destination).await.unwrap();
    assert_eq!(1, manager.status(&destination).unwrap().size);
    let second = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let third = manager.acquire_destination(&ctx, &destination).await;

    // Assert
    assert_ne!(first.id(), second.id());
    assert_eq!(2, manager.status(&destination).unwrap().size);
    assert!(matches!(third, Err(Error::TooManyConnections { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_open_more_than_max_count_streams() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Arc::new(Manager::new(settings(0, 0, 4)));

    // Act
    let callers = (0..32).map(|_| {
        let manager = manager.clone();
        let destination = destination.clone();
        tokio::spawn(async move {
            match manager
                .acquire_destination(&Context::background(), &destination)
                .await
            {
                Ok(connection) => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    drop(connection);
                    true
                }
                Err(Error::TooManyConnections { .. }) => false,
                Err(e) => panic!("Unexpected error: {e}"),
            }
        })
    });
    let outcomes = futures_util::future::join_all(callers).await;

    // Assert
    let served = outcomes.into_iter().filter(|o| *o.as_ref().unwrap()).count();
    assert!(served >= 4);
    assert!(server.peak() <= 4);
    assert!(server.accepted() <= 4);
    let status = manager.status(&destination).unwrap();
    assert!(status.size <= 4);
    assert_eq!(status.size, status.available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_stream_is_never_checked_out_by_two_callers_at_once() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Arc::new(Manager::new(settings(0, 0, 8)));

    for _round in 0..3 {
        // Act
        let barrier = Arc::new(Barrier::new(8));
        let callers = (0..8).map(|_| {
            let manager = manager.clone();
            let destination = destination.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                let connection = manager
                    .acquire_destination(&Context::background(), &destination)
                    .await
                    .unwrap();
                // Hold on to the stream until every caller has one.
                barrier.wait().await;
                connection.id()
            })
        });
        let ids: Vec<_> = futures_util::future::join_all(callers)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        // Assert
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }
    assert_eq!(8, server.accepted());
}
