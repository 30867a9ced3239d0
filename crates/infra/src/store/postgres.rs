//! Postgres-backed credential store.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE principals (
//!     id              UUID PRIMARY KEY,
//!     username        TEXT NOT NULL UNIQUE,
//!     email           TEXT,
//!     active          BOOLEAN NOT NULL DEFAULT TRUE,
//!     password_hash   TEXT NOT NULL,
//!     last_access_at  TIMESTAMPTZ,
//!     failed_attempts INTEGER NOT NULL DEFAULT 0 CHECK (failed_attempts >= 0),
//!     locked          BOOLEAN NOT NULL DEFAULT FALSE,
//!     permissions     TEXT[] NOT NULL DEFAULT '{}',
//!     beneficiary     JSONB,
//!     created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE roles (
//!     id          UUID PRIMARY KEY,
//!     name        TEXT NOT NULL UNIQUE,
//!     description TEXT
//! );
//!
//! CREATE TABLE permissions (
//!     code        TEXT PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     description TEXT,
//!     module      TEXT
//! );
//!
//! CREATE TABLE role_permissions (
//!     role_id         UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
//!     permission_code TEXT NOT NULL REFERENCES permissions(code) ON DELETE CASCADE,
//!     PRIMARY KEY (role_id, permission_code)
//! );
//!
//! CREATE TABLE principal_roles (
//!     principal_id UUID NOT NULL REFERENCES principals(id) ON DELETE CASCADE,
//!     role_id      UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
//!     PRIMARY KEY (principal_id, role_id)
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! Lockout counters are changed with a single `UPDATE ... RETURNING`; the
//! right-hand side of `SET` sees the pre-update row, so two concurrent
//! failures always yield two increments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use gatekeeper_auth::{
    BeneficiaryProfile, CredentialRecord, CredentialStore, PasswordHash, Permission, Principal,
    Role, RoleDefinition, StoreError,
};
use gatekeeper_core::{PrincipalId, RoleId};

const PRINCIPAL_COLUMNS: &str = r#"
    id, username, email, active, password_hash, last_access_at,
    failed_attempts, locked, permissions, beneficiary, created_at
"#;

const CREDENTIAL_COLUMNS: &str = "password_hash, last_access_at, failed_attempts, locked";

/// Roles with their permission codes aggregated per role. `predicate` is a
/// complete `WHERE` clause (or empty) spliced in before the grouping; any
/// binds it references, such as `$1`, are supplied by the caller.
fn roles_query(predicate: &str) -> String {
    format!(
        r#"
        SELECT
            r.id,
            r.name,
            r.description,
            COALESCE(
                array_agg(rp.permission_code ORDER BY rp.permission_code)
                    FILTER (WHERE rp.permission_code IS NOT NULL),
                '{{}}'
            ) AS permissions
        FROM roles r
        LEFT JOIN role_permissions rp ON rp.role_id = r.id
        {predicate}
        GROUP BY r.id, r.name, r.description
        ORDER BY r.name
        "#
    )
}

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn roles_of(&self, principal_id: PrincipalId) -> Result<Vec<RoleDefinition>, StoreError> {
        let sql = roles_query(
            "WHERE r.id IN (SELECT role_id FROM principal_roles WHERE principal_id = $1)",
        );
        let rows = sqlx::query(&sql)
            .bind(principal_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_principal_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    async fn hydrate(&self, row: Option<sqlx::postgres::PgRow>) -> Result<Option<Principal>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut principal = principal_from_row(&row)?;
        principal.roles = self.roles_of(principal.id).await?;
        Ok(Some(principal))
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), err)]
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_username", e))?;

        self.hydrate(row).await
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        self.hydrate(row).await
    }

    /// Upsert the principal row and replace its role links in one transaction.
    #[instrument(skip(self, principal), fields(principal_id = %principal.id), err)]
    async fn save(&self, principal: Principal) -> Result<Principal, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let permissions: Vec<String> = principal
            .permissions
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO principals (
                id, username, email, active, password_hash, last_access_at,
                failed_attempts, locked, permissions, beneficiary, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                active = EXCLUDED.active,
                password_hash = EXCLUDED.password_hash,
                last_access_at = EXCLUDED.last_access_at,
                failed_attempts = EXCLUDED.failed_attempts,
                locked = EXCLUDED.locked,
                permissions = EXCLUDED.permissions,
                beneficiary = EXCLUDED.beneficiary
            "#,
        )
        .bind(principal.id.as_uuid())
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(principal.active)
        .bind(principal.credential.password_hash.as_str())
        .bind(principal.credential.last_access_at)
        .bind(i32::try_from(principal.credential.failed_attempts).unwrap_or(i32::MAX))
        .bind(principal.credential.locked)
        .bind(&permissions)
        .bind(principal.beneficiary.as_ref().map(Json))
        .bind(principal.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_principal", e))?;

        sqlx::query("DELETE FROM principal_roles WHERE principal_id = $1")
            .bind(principal.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_principal_roles", e))?;

        let role_ids: Vec<uuid::Uuid> = principal.roles.iter().map(|r| *r.id.as_uuid()).collect();
        if !role_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO principal_roles (principal_id, role_id)
                SELECT $1, id FROM roles WHERE id = ANY($2)
                "#,
            )
            .bind(principal.id.as_uuid())
            .bind(&role_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("link_principal_roles", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        self.find_by_id(principal.id)
            .await?
            .ok_or_else(|| StoreError::Backend("principal vanished after save".to_string()))
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        lockout_threshold: u32,
    ) -> Result<CredentialRecord, StoreError> {
        let sql = format!(
            r#"
            UPDATE principals
            SET failed_attempts = failed_attempts + 1,
                locked = locked OR (failed_attempts + 1 >= $2)
            WHERE id = $1
            RETURNING {CREDENTIAL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(i32::try_from(lockout_threshold).unwrap_or(i32::MAX))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_failed_attempt", e))?
            .ok_or(StoreError::NotFound)?;

        credential_from_row(&row)
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn record_successful_login(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError> {
        let sql = format!(
            r#"
            UPDATE principals
            SET failed_attempts = 0,
                last_access_at = $2
            WHERE id = $1 AND NOT locked
            RETURNING {CREDENTIAL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_successful_login", e))?;

        match row {
            Some(row) => credential_from_row(&row),
            None => {
                // No row updated: either gone or locked.
                let exists = sqlx::query("SELECT 1 FROM principals WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("record_successful_login", e))?
                    .is_some();
                Err(if exists { StoreError::Locked } else { StoreError::NotFound })
            }
        }
    }

    #[instrument(skip(self, hash), fields(principal_id = %id), err)]
    async fn update_password_hash(&self, id: PrincipalId, hash: PasswordHash) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE principals SET password_hash = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(hash.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_password_hash", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_roles_by_name(&self, names: &[Role]) -> Result<Vec<RoleDefinition>, StoreError> {
        let names: Vec<String> = names.iter().map(|r| r.as_str().to_string()).collect();
        let sql = roles_query("WHERE r.name = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(&names)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_roles_by_name", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let sql = roles_query("");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }
}

// SQLx row mapping

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {what}: {err}"))
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> Result<CredentialRecord, StoreError> {
    let read = |e| decode_error("credential row", e);

    let failed_attempts: i32 = row.try_get("failed_attempts").map_err(read)?;
    Ok(CredentialRecord {
        password_hash: PasswordHash::from_stored(row.try_get::<String, _>("password_hash").map_err(read)?),
        last_access_at: row.try_get("last_access_at").map_err(read)?,
        failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
        locked: row.try_get("locked").map_err(read)?,
    })
}

fn principal_from_row(row: &sqlx::postgres::PgRow) -> Result<Principal, StoreError> {
    let read = |e| decode_error("principal row", e);

    let permissions: Vec<String> = row.try_get("permissions").map_err(read)?;
    let beneficiary: Option<Json<BeneficiaryProfile>> = row.try_get("beneficiary").map_err(read)?;

    Ok(Principal {
        id: PrincipalId::from_uuid(row.try_get("id").map_err(read)?),
        username: row.try_get("username").map_err(read)?,
        email: row.try_get("email").map_err(read)?,
        active: row.try_get("active").map_err(read)?,
        credential: credential_from_row(row)?,
        roles: Vec::new(),
        permissions: permissions.into_iter().map(Permission::from).collect(),
        beneficiary: beneficiary.map(|Json(b)| b),
        created_at: row.try_get("created_at").map_err(read)?,
    })
}

fn role_from_row(row: &sqlx::postgres::PgRow) -> Result<RoleDefinition, StoreError> {
    let read = |e| decode_error("role row", e);

    let name: String = row.try_get("name").map_err(read)?;
    let permissions: Vec<String> = row.try_get("permissions").map_err(read)?;

    Ok(RoleDefinition {
        id: RoleId::from_uuid(row.try_get("id").map_err(read)?),
        name: Role::new(name),
        description: row.try_get("description").map_err(read)?,
        permissions: permissions.into_iter().map(Permission::from).collect(),
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_query_splices_predicate() {
        let sql = roles_query("WHERE r.name = ANY($1)");
        assert!(sql.contains("WHERE r.name = ANY($1)"));
        assert!(sql.contains("'{}'"));
        assert!(sql.contains("GROUP BY r.id"));
    }

    #[test]
    fn pool_closed_is_backend() {
        let err = map_sqlx_error("find_by_id", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("find_by_id")));
    }
}
