use crate::entities::reports;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://clinic_reports.db?mode=rwc";

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
        info!("DATABASE_URL not set, using default: {}", DEFAULT_DATABASE_URL);
        DEFAULT_DATABASE_URL.to_string()
    });

    let db = connect(&db_url).await?;
    run_migrations(&db).await?;

    Ok(db)
}

pub async fn connect(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    // Every pooled connection to an in-memory SQLite database would get its own empty database
    if db_url.contains(":memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(20).min_connections(1);
    }

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let stmt = schema
        .create_table_from_entity(reports::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&stmt)).await?;
    info!("   - Table 'reports' checked/created");

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_reports_owner_created ON reports(owner_identity, created_at)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_partition_key ON reports(owner_partition, storage_key)",
    ];

    for query in indexes {
        db.execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await?;
        info!("   - Executed schema update: {}", query);
    }

    Ok(())
}
