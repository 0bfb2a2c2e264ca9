use book_sync::{BookFeed, EventEmitter, EventKind, FeedConfig, FeedError, FeedEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = FeedConfig::from_env();
    tracing::info!(
        product = %config.product_id,
        ws = %config.websocket_url,
        version = book_sync::SERVICE_VERSION,
        "Starting book sync service"
    );

    let mut emitter = EventEmitter::new();
    emitter.on(EventKind::StateChanged, |event| {
        if let FeedEvent::StateChanged { old, new } = event {
            tracing::info!(%old, %new, "Feed state changed");
        }
    });
    emitter.on(EventKind::SequenceGap, |event| {
        if let FeedEvent::SequenceGap { expected, received } = event {
            tracing::warn!(expected, received, "Book advanced past missing messages");
        }
    });

    let feed = BookFeed::start(config, emitter);
    feed.connect()?;

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
    ticker.tick().await;

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break feed.shutdown().await;
            }
            _ = ticker.tick() => {
                match feed.view(1).await {
                    Ok(view) => tracing::info!(
                        state = %view.state,
                        sequence = ?view.sequence,
                        orders = view.order_count,
                        best_bid = ?view.best_bid,
                        best_ask = ?view.best_ask,
                        metrics = ?feed.metrics(),
                        "Book status"
                    ),
                    Err(FeedError::Stopped) => break feed.join().await,
                    Err(e) => tracing::warn!(error = %e, "Book status unavailable"),
                }
            }
        }
    };

    result?;
    Ok(())
}
