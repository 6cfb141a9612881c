//! ACL Repository
//!
//! Database operations for script access control lists.

use sqlx::PgPool;

/// One row of the ACL table; the service and url columns are JSON arrays
#[derive(Debug, sqlx::FromRow)]
pub struct AclRow {
    pub name: String,
    pub service: serde_json::Value,
    pub url: serde_json::Value,
}

/// Fetch an ACL by name
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<AclRow>, sqlx::Error> {
    sqlx::query_as::<_, AclRow>("SELECT name, service, url FROM control_acl WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}
