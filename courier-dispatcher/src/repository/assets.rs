//! Asset Tracker Repository
//!
//! Control requests addressed to an asset are resolved to the service
//! that ingests that asset.

use sqlx::PgPool;

/// The service currently ingesting the given asset, if any
pub async fn ingest_service(pool: &PgPool, asset: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT service FROM asset_tracker
        WHERE asset = $1 AND event = 'Ingest'
        ORDER BY ts DESC
        LIMIT 1
        "#,
    )
    .bind(asset)
    .fetch_optional(pool)
    .await
}
