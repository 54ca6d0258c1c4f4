use anyhow::Context;
use rail_api::metrics::Metrics;
use rail_api::state::{AppState, AuthConfig, RateLimit};
use rail_api::{app, worker};
use rail_core::events::{BookingEventSink, NoopEvents};
use rail_core::repository::{BookingStore, ScheduleCatalog};
use rail_order::{BookingReadModel, ExpirySweeper, MemoryCatalog, MemoryStore, ReservationEngine, ReservationPolicy};
use rail_store::app_config::{Config, StorageBackend};
use rail_store::{DbClient, EventProducer, PgBookingStore, PgScheduleCatalog, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rail_api=debug,rail_order=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    info!("Starting Rail API on port {}", config.server.port);

    let (store, catalog) = storage(&config).await?;

    let events: Arc<dyn BookingEventSink> = match &config.kafka {
        Some(kafka) => Arc::new(EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?),
        None => {
            warn!("Kafka not configured, booking events are discarded");
            Arc::new(NoopEvents)
        }
    };

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };
    let rate_limit = config
        .redis
        .as_ref()
        .map(|r| RateLimit {
            limit: r.rate_limit,
            window_seconds: r.rate_window_seconds,
        })
        .unwrap_or(RateLimit {
            limit: i64::MAX,
            window_seconds: 60,
        });

    let booking = &config.booking;
    let policy = ReservationPolicy {
        hold_duration: booking.hold_duration(),
        max_page_size: booking.max_page_size,
        code_attempts: booking.code_attempts,
    };
    let engine = ReservationEngine::new(store.clone(), catalog.clone(), policy).with_events(events.clone());
    let sweeper = ExpirySweeper::new(store, booking.hold_duration(), booking.sweep_batch).with_events(events);

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    tokio::spawn(worker::start_expiry_worker(
        Arc::new(sweeper),
        booking.sweep_interval(),
        metrics.clone(),
    ));

    let app_state = AppState {
        engine,
        read_model: Arc::new(BookingReadModel::new(catalog)),
        redis,
        rate_limit,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        metrics,
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn storage(config: &Config) -> anyhow::Result<(Arc<dyn BookingStore>, Arc<dyn ScheduleCatalog>)> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok((
                Arc::new(PgBookingStore::new(db.pool.clone())),
                Arc::new(PgScheduleCatalog::new(db.pool)),
            ))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; bookings are lost on restart");
            let catalog = MemoryCatalog::new();
            for train in &config.storage.trains {
                catalog.add_train(train.id, &train.name, train.capacity);
            }
            for schedule in &config.storage.schedules {
                catalog.add_schedule(
                    schedule.id,
                    schedule.train_id,
                    &schedule.origin,
                    &schedule.destination,
                    schedule.price,
                );
            }
            Ok((Arc::new(MemoryStore::new()), Arc::new(catalog)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
