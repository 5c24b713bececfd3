use std::sync::Arc;

use thiserror::Error;

use gescom_infra::event_store::{EventStoreError, InMemoryEventStore, PostgresEventStore};
use gescom_infra::{Gescom, ServiceError, Settings, SharedEventStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("event store unavailable: {0}")]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Open the configured event store.
pub async fn build_store(settings: &Settings) -> Result<SharedEventStore, StartupError> {
    match (&settings.database.url, settings.database.use_persistent_store) {
        (Some(url), true) => {
            let store = PostgresEventStore::connect(url, settings.database.max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        _ => {
            tracing::warn!("using the in-memory event store; data is lost on restart");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

/// Wire the application and replay the log into its read models.
///
/// Must run on a multi-threaded runtime: the Postgres store blocks in place.
pub async fn build_services(settings: &Settings) -> Result<Arc<Gescom>, StartupError> {
    let store = build_store(settings).await?;
    let app = Gescom::new(store, Arc::new(gescom_events::InMemoryEventBus::new()), settings);

    let stats = app.rebuild_read_models()?;
    tracing::info!(
        events = stats.events,
        applied = stats.applied,
        skipped = stats.skipped,
        "read models rebuilt"
    );
    Ok(Arc::new(app))
}
