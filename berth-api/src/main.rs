use anyhow::Context;
use berth_api::{app, worker, AppState};
use berth_booking::BookingService;
use berth_shared::AesGcmCipher;
use berth_store::{Config, DbClient, EventProducer, PgBookingStore, PgTimetable, RedisClient, RedisInventoryLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth_api=debug,berth_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Berth API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?,
    );

    let kafka = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;

    let cipher = AesGcmCipher::from_base64_key(&config.pii.key).context("Invalid PII key")?;

    let bookings = Arc::new(BookingService::new(
        Arc::new(PgBookingStore::new(db.pool.clone())),
        Arc::new(PgTimetable::new(db.pool.clone())),
        Arc::new(cipher),
        Arc::new(RedisInventoryLock::new(redis.as_ref().clone())),
        config.engine.clone(),
    ));

    tokio::spawn(worker::start_reconciliation_worker(
        bookings.clone(),
        Duration::from_secs(config.reconciliation.interval_seconds.max(1)),
        chrono::Duration::seconds(config.reconciliation.grace_seconds),
    ));

    let app_state = AppState {
        bookings,
        redis: Some(redis),
        kafka: Some(Arc::new(kafka)),
        rate_limit: config.rate_limit.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;

    Ok(())
}
