use std::time::Duration;
use stream_pool::configuration::PoolSettings;
use stream_pool::context::Context;
use stream_pool::manager::Manager;
use stream_pool::pool::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A local echo server stands in for the remote service we want to talk to.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    // Every destination gets its own pool, sized by these settings.
    //
    // One stream is dialed as soon as the destination is first used, the maintenance loop keeps
    // at least two open, and no more than four are ever open at the same time.
    // Streams that sit unused for more than 30 seconds are closed, down to `init_count`.
    let settings = PoolSettings {
        init_count: 1,
        min_count: 2,
        max_count: 4,
        check_interval_millis: Some(1_000),
        idle_timeout_millis: Some(30_000),
    };
    let manager = Manager::builder(settings).build()?;

    // Acquisitions can carry a deadline: it bounds the dial when no free stream is available.
    let ctx = Context::background().with_timeout(Duration::from_secs(2));
    let mut connection = manager.acquire(&ctx, "tcp", &address).await?;
    connection.write_all(b"Hello world!").await?;
    let mut reply = [0u8; 12];
    connection.read_exact(&mut reply).await?;
    println!("{} replied {:?}", address, String::from_utf8_lossy(&reply));

    // Dropping the handle hands the stream back to the pool.
    // We fully read the reply first: streams released with unread bytes get closed.
    drop(connection);

    // Hold all four slots: a fifth acquisition fails fast instead of queuing.
    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(manager.acquire(&ctx, "tcp", &address).await?);
    }
    match manager.acquire(&ctx, "tcp", &address).await {
        Err(Error::TooManyConnections { destination }) => {
            println!("{destination} is at capacity, back off and retry later")
        }
        other => println!("unexpected outcome: {:?}", other.map(|c| c.id())),
    }
    drop(held);

    if let Some(status) = manager.status(&stream_pool::transport::Destination::tcp(&address)) {
        println!("{status:?}");
    }

    manager.shutdown().await;
    Ok(())
}
