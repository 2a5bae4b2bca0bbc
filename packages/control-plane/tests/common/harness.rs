//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared across all tests; each test gets its own
//! freshly-migrated database so tests never observe each other's rows.

use control_plane::common::generate_random_id;
use control_plane::data::DataStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedTestInfra {
    host: String,
    port: u16,
    // Keeps the container alive for the entire test run.
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Self {
        // Respect RUST_LOG when debugging tests; ignore double-init.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .expect("failed to start Postgres container");

        let host = postgres.get_host().await.expect("container host").to_string();
        let port = postgres
            .get_host_port_ipv4(5432)
            .await
            .expect("container port");

        Self {
            host,
            port,
            _postgres: postgres,
        }
    }

    fn url_for(&self, database: &str) -> String {
        format!(
            "postgresql://postgres:postgres@{}:{}/{}",
            self.host, self.port, database
        )
    }
}

/// A migrated, empty database wrapped in a [`DataStore`].
pub async fn setup_data_store() -> DataStore {
    DataStore::new(setup_pool().await)
}

/// A migrated, empty per-test database.
pub async fn setup_pool() -> PgPool {
    let infra = SHARED_INFRA.get_or_init(SharedTestInfra::init).await;

    let database = generate_random_id("test_db").replace('-', "_");

    let admin_pool = PgPool::connect(&infra.url_for("postgres"))
        .await
        .expect("failed to connect to admin database");
    sqlx::query(&format!("CREATE DATABASE {database}"))
        .execute(&admin_pool)
        .await
        .expect("failed to create test database");
    admin_pool.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&infra.url_for(&database))
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}
