//! Pipeline Repository
//!
//! Database operations for the control pipelines and their filter
//! membership.

use sqlx::PgPool;

/// One row of the control pipelines table
#[derive(Debug, sqlx::FromRow)]
pub struct PipelineRow {
    pub cpid: i32,
    pub name: String,
    pub stype: i32,
    pub sname: String,
    pub dtype: i32,
    pub dname: String,
    pub enabled: bool,
    pub execution: String,
}

/// Load every control pipeline
pub async fn load_all(pool: &PgPool) -> Result<Vec<PipelineRow>, sqlx::Error> {
    sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT cpid, name, stype, sname, dtype, dname, enabled, execution
        FROM control_pipelines
        ORDER BY cpid
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Look up a pipeline's id by name
pub async fn cpid_by_name(pool: &PgPool, name: &str) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT cpid FROM control_pipelines WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// The ordered filter category names of a pipeline
pub async fn filters_for(pool: &PgPool, cpid: i32) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT fname FROM control_filters
        WHERE cpid = $1
        ORDER BY forder
        "#,
    )
    .bind(cpid)
    .fetch_all(pool)
    .await
}
