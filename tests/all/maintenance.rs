use crate::helpers::{eventually, settings, DuplexTransport, EchoServer};
use std::io;
use std::time::Duration;
use stream_pool::configuration::PoolSettings;
use stream_pool::context::Context;
use stream_pool::manager::Manager;
use stream_pool::transport::Destination;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn checked_every(millis: u64, settings: PoolSettings) -> PoolSettings {
    PoolSettings {
        check_interval_millis: Some(millis),
        ..settings
    }
}

#[tokio::test]
async fn the_pool_is_topped_back_up_to_min_count_after_streams_are_destroyed() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Manager::new(checked_every(100, settings(2, 2, 4)));
    let ctx = Context::background();

    let first = manager.acquire_destination(&ctx, &destination).await.unwrap();
    drop(first);
    assert!(
        eventually(Duration::from_secs(2), || {
            manager.status(&destination).unwrap().size == 2
        })
        .await
    );

    // Act
    let mut first = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let mut second = manager.acquire_destination(&ctx, &destination).await.unwrap();
    first.record_error(&io::Error::from(io::ErrorKind::ConnectionReset));
    second.record_error(&io::Error::from(io::ErrorKind::ConnectionReset));
    drop(first);
    drop(second);
    assert!(manager.status(&destination).unwrap().size < 2);

    // Assert
    assert!(
        eventually(Duration::from_secs(2), || {
            let status = manager.status(&destination).unwrap();
            status.size == 2 && status.available == 2
        })
        .await
    );
}

#[tokio::test]
async fn a_stream_released_with_unread_bytes_is_closed_by_the_sweep() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Manager::new(checked_every(50, settings(0, 0, 2)));
    let ctx = Context::background();

    let mut connection = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let id = connection.id();
    // The echo comes back, but is never read.
    connection.write_all(b"ping").await.unwrap();

    // Act
    connection.release();

    // Assert
    assert!(
        eventually(Duration::from_secs(2), || {
            manager.status(&destination).unwrap().size == 0
        })
        .await
    );
    let connection = manager.acquire_destination(&ctx, &destination).await.unwrap();
    assert_ne!(id, connection.id());
}

#[tokio::test]
async fn bytes_pushed_by_the_peer_to_a_free_stream_get_it_closed() {
    // Arrange
    let transport = DuplexTransport::default();
    let destination = Destination::tcp("peer:1");
    let manager =
        Manager::with_transport(checked_every(50, settings(1, 1, 2)), transport.clone());
    let ctx = Context::background();

    let connection = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let id = connection.id();
    connection.release();

    // Act
    let mut peers = transport.take_peers();
    peers[0].write_all(b"unsolicited").await.unwrap();

    // Assert
    // The leaked stream is closed and replaced to honour `min_count`.
    assert!(eventually(Duration::from_secs(2), || transport.dials() == 2).await);
    assert!(
        eventually(Duration::from_secs(2), || {
            manager.status(&destination).unwrap().available == 1
        })
        .await
    );
    let connection = manager.acquire_destination(&ctx, &destination).await.unwrap();
    assert_ne!(id, connection.id());
}

#[tokio::test]
async fn quiet_free_streams_survive_the_sweep() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    // No `min_count`: a stream closed by the sweep would not be replaced.
    let manager = Manager::new(checked_every(20, settings(1, 0, 2)));
    let ctx = Context::background();

    let mut connection = manager.acquire_destination(&ctx, &destination).await.unwrap();
    connection.write_all(b"ping").await.unwrap();
    let mut pong = [0u8; 4];
    connection.read_exact(&mut pong).await.unwrap();
    connection.release();

    // Act
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert
    assert_eq!(1, manager.status(&destination).unwrap().size);
    assert_eq!(1, server.accepted());
    assert_eq!(1, server.open());
}

#[tokio::test]
async fn idle_streams_are_closed_down_to_the_warm_floor() {
    // Arrange
    let server = EchoServer::start().await;
    let destination = server.destination();
    let manager = Manager::new(PoolSettings {
        init_count: 1,
        min_count: 1,
        max_count: 3,
        check_interval_millis: Some(50),
        idle_timeout_millis: Some(150),
    });
    let ctx = Context::background();

    let first = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let second = manager.acquire_destination(&ctx, &destination).await.unwrap();
    let third = manager.acquire_destination(&ctx, &destination).await.unwrap();
    assert_eq!(3, manager.status(&destination).unwrap().size);

    // Act
    drop(first);
    drop(second);
    drop(third);

    // Assert
    assert!(
        eventually(Duration::from_secs(3), || {
            manager.status(&destination).unwrap().size == 1
        })
        .await
    );
    // The floor holds across later sweeps.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let status = manager.status(&destination).unwrap();
    assert_eq!(1, status.size);
    assert_eq!(1, status.available);
}

#[tokio::test]
async fn the_maintenance_loop_keeps_going_after_dial_failures() {
    // Arrange
    let transport = DuplexTransport::failing_first(3);
    let destination = Destination::tcp("peer:1");
    let manager =
        Manager::with_transport(checked_every(20, settings(0, 1, 2)), transport.clone());

    // Act
    // Creating the pool starts its maintenance loop.
    let connection = manager
        .acquire_destination(&Context::background(), &destination)
        .await;

    // Assert
    assert!(connection.is_err() || transport.dials() > 3);
    drop(connection);
    assert!(
        eventually(Duration::from_secs(2), || {
            manager.status(&destination).unwrap().available >= 1
        })
        .await
    );
    assert!(transport.dials() > 3);
}
