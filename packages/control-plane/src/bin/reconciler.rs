// Entry point for the lifecycle reconciler loop.
//
// Exactly one instance of this binary should run against a given database:
// the reconciler assumes it is the sole writer driving the state machines.

use anyhow::{Context, Result};
use control_plane::data::DataStore;
use control_plane::reconciler::Reconciler;
use control_plane::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,control_plane=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lifecycle reconciler");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = DataStore::new(pool);
    let provisioner = config.provisioner.build();

    Reconciler::new(store, provisioner).run_until_shutdown().await;

    Ok(())
}
