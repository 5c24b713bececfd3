use anyhow::Context;

use gescom_infra::Settings;
use gescom_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    gescom_observability::init(
        &settings.logging.filter,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let app = gescom_api::app::services::build_services(&settings)
        .await
        .context("starting services")?;
    let activity = app
        .spawn_activity_worker()
        .context("spawning the activity log worker")?;

    let router = gescom_api::app::build_app(app);
    let address = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("serving HTTP")?;

    activity.shutdown();
    Ok(())
}
