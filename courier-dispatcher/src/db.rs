use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Automation scripts and their ACLs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_script (
            name TEXT PRIMARY KEY,
            steps JSONB NOT NULL,
            acl TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_acl (
            name TEXT PRIMARY KEY,
            service JSONB NOT NULL DEFAULT '[]',
            url JSONB NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Endpoint type lookup tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_source (
            cpsid SERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_destination (
            cpdid SERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Control pipelines and their filter membership
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_pipelines (
            cpid SERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            stype INTEGER NOT NULL REFERENCES control_source(cpsid),
            sname TEXT NOT NULL DEFAULT '',
            dtype INTEGER NOT NULL REFERENCES control_destination(cpdid),
            dname TEXT NOT NULL DEFAULT '',
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            execution TEXT NOT NULL DEFAULT 'shared'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_filters (
            cpid INTEGER NOT NULL REFERENCES control_pipelines(cpid) ON DELETE CASCADE,
            forder INTEGER NOT NULL,
            fname TEXT NOT NULL,
            PRIMARY KEY (cpid, fname)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_control_filters_order ON control_filters(cpid, forder)")
        .execute(pool)
        .await?;

    // Asset to ingest-service tracking
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_tracker (
            id SERIAL PRIMARY KEY,
            asset TEXT NOT NULL,
            service TEXT NOT NULL,
            event TEXT NOT NULL,
            ts TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_asset_tracker_asset ON asset_tracker(asset, event)")
        .execute(pool)
        .await?;

    seed_lookup_tables(pool).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Seed the endpoint type lookup tables with the well-known names
async fn seed_lookup_tables(pool: &PgPool) -> Result<(), sqlx::Error> {
    let sources = [
        ("Any", "Any source"),
        ("Service", "A named service"),
        ("API", "The dispatch API"),
        ("Notification", "A notification delivery"),
        ("Schedule", "A schedule execution"),
        ("Script", "An automation script"),
    ];
    for (name, description) in sources {
        sqlx::query(
            "INSERT INTO control_source (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    let destinations = [
        ("Any", "Any destination"),
        ("Service", "A named service"),
        ("Asset", "The service ingesting a named asset"),
        ("Script", "An automation script"),
        ("Broadcast", "All southbound services"),
    ];
    for (name, description) in destinations {
        sqlx::query(
            "INSERT INTO control_destination (name, description) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}
