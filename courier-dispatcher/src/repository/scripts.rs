//! Script Repository
//!
//! Database operations for stored automation scripts.

use sqlx::PgPool;

/// One row of the control script table. The steps column holds either a
/// JSON array or a legacy string form that is normalised at load time.
#[derive(Debug, sqlx::FromRow)]
pub struct ScriptRow {
    pub steps: serde_json::Value,
    pub acl: Option<String>,
}

/// Fetch a script by name
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<ScriptRow>, sqlx::Error> {
    sqlx::query_as::<_, ScriptRow>("SELECT steps, acl FROM control_script WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}
