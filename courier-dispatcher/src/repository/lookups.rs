//! Endpoint Type Lookup Repository
//!
//! The source and destination endpoint types of a pipeline are stored as
//! integer ids referencing two lookup tables.

use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
pub struct SourceTypeRow {
    pub cpsid: i32,
    pub name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DestTypeRow {
    pub cpdid: i32,
    pub name: String,
}

pub async fn load_source_types(pool: &PgPool) -> Result<Vec<SourceTypeRow>, sqlx::Error> {
    sqlx::query_as::<_, SourceTypeRow>("SELECT cpsid, name FROM control_source ORDER BY cpsid")
        .fetch_all(pool)
        .await
}

pub async fn load_dest_types(pool: &PgPool) -> Result<Vec<DestTypeRow>, sqlx::Error> {
    sqlx::query_as::<_, DestTypeRow>("SELECT cpdid, name FROM control_destination ORDER BY cpdid")
        .fetch_all(pool)
        .await
}
