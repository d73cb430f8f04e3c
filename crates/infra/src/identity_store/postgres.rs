//! Postgres-backed identity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `ForeignKey` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! ## Audit Log Append
//!
//! Appends take a transaction-scoped advisory lock before reading the chain
//! tail, so sequence numbers and chain hashes are assigned serially. The unique
//! constraint on `sequence` backs this up. A trigger rejects any UPDATE or
//! DELETE on `security_events`.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use sentinel_auth::{
    Claim, EventCategory, ExternalIdentity, GENESIS_HASH, NewSecurityEvent, Role, SecurityEvent,
    SecurityEventType, User, UserWithRole, seal,
};
use sentinel_core::{ClaimId, RoleId, SecurityEventId, UserId};

use super::r#trait::{IdentityStore, RoleChange, StoreError};
use crate::seed::Seed;

/// Schema DDL, safe to re-run.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS claims (
    id          UUID PRIMARY KEY,
    claim_type  TEXT NOT NULL,
    claim_value TEXT NOT NULL,
    UNIQUE (claim_type, claim_value)
);

CREATE TABLE IF NOT EXISTS role_claims (
    role_id  UUID NOT NULL REFERENCES roles (id) ON DELETE RESTRICT,
    claim_id UUID NOT NULL REFERENCES claims (id) ON DELETE RESTRICT,
    PRIMARY KEY (role_id, claim_id)
);

CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    provider      TEXT NOT NULL,
    external_id   TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    role_id       UUID NOT NULL REFERENCES roles (id) ON DELETE RESTRICT,
    created_at    TIMESTAMPTZ NOT NULL,
    last_login_at TIMESTAMPTZ NOT NULL,
    UNIQUE (provider, external_id)
);

CREATE TABLE IF NOT EXISTS security_events (
    id               UUID PRIMARY KEY,
    sequence         BIGINT NOT NULL UNIQUE CHECK (sequence > 0),
    event_type       TEXT NOT NULL,
    author_user_id   UUID NOT NULL REFERENCES users (id) ON DELETE RESTRICT,
    affected_user_id UUID NOT NULL REFERENCES users (id) ON DELETE RESTRICT,
    occurred_utc     TIMESTAMPTZ NOT NULL,
    details          TEXT NOT NULL,
    previous_role_id UUID REFERENCES roles (id) ON DELETE RESTRICT,
    new_role_id      UUID REFERENCES roles (id) ON DELETE RESTRICT,
    chain_hash       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS security_events_occurred_idx
    ON security_events (occurred_utc DESC, sequence DESC);

CREATE OR REPLACE FUNCTION security_events_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'security_events is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS security_events_append_only ON security_events;
CREATE TRIGGER security_events_append_only
    BEFORE UPDATE OR DELETE ON security_events
    FOR EACH ROW EXECUTE FUNCTION security_events_append_only();
"#;

/// Advisory lock key serializing audit appends.
const APPEND_LOCK_KEY: i64 = 0x5345_4E54_494E_454C;

const USER_WITH_ROLE_SELECT: &str = r#"
    SELECT
        u.id, u.provider, u.external_id, u.email, u.name, u.role_id,
        u.created_at, u.last_login_at,
        r.name AS role_name, r.description AS role_description,
        COALESCE(
            json_agg(
                json_build_object('id', c.id, 'claim_type', c.claim_type, 'value', c.claim_value)
                ORDER BY c.claim_value
            ) FILTER (WHERE c.id IS NOT NULL),
            '[]'::json
        ) AS claims
    FROM users u
    JOIN roles r ON r.id = u.role_id
    LEFT JOIN role_claims rc ON rc.role_id = r.id
    LEFT JOIN claims c ON c.id = rc.claim_id
"#;

const ROLE_SELECT: &str = r#"
    SELECT
        r.id, r.name, r.description,
        COALESCE(
            json_agg(
                json_build_object('id', c.id, 'claim_type', c.claim_type, 'value', c.claim_value)
                ORDER BY c.claim_value
            ) FILTER (WHERE c.id IS NOT NULL),
            '[]'::json
        ) AS claims
    FROM roles r
    LEFT JOIN role_claims rc ON rc.role_id = r.id
    LEFT JOIN claims c ON c.id = rc.claim_id
"#;

const EVENT_COLUMNS: &str = r#"
    id, sequence, event_type, author_user_id, affected_user_id, occurred_utc,
    details, previous_role_id, new_role_id, chain_hash
"#;

/// Postgres-backed identity store.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Append inside an open transaction. Caller commits.
async fn append_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    event: NewSecurityEvent,
) -> Result<SecurityEvent, StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(APPEND_LOCK_KEY)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_chain", e))?;

    let tail = sqlx::query(
        "SELECT sequence, chain_hash FROM security_events ORDER BY sequence DESC LIMIT 1",
    )
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("read_chain_tail", e))?;

    let (sequence, prev_hash) = match tail {
        Some(row) => {
            let seq: i64 = row.try_get("sequence").map_err(|e| map_sqlx_error("read_chain_tail", e))?;
            let hash: String = row
                .try_get("chain_hash")
                .map_err(|e| map_sqlx_error("read_chain_tail", e))?;
            (seq as u64 + 1, hash)
        }
        None => (1, GENESIS_HASH.to_string()),
    };

    let sealed = seal(event, SecurityEventId::new(), sequence, &prev_hash);

    sqlx::query(
        r#"
        INSERT INTO security_events (
            id, sequence, event_type, author_user_id, affected_user_id, occurred_utc,
            details, previous_role_id, new_role_id, chain_hash
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(sealed.id.as_uuid())
    .bind(sealed.sequence as i64)
    .bind(sealed.event_type.as_str())
    .bind(sealed.author_user_id.as_uuid())
    .bind(sealed.affected_user_id.as_uuid())
    .bind(sealed.occurred_utc)
    .bind(&sealed.details)
    .bind(sealed.previous_role_id.map(|r| *r.as_uuid()))
    .bind(sealed.new_role_id.map(|r| *r.as_uuid()))
    .bind(&sealed.chain_hash)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_event", e))?;

    Ok(sealed)
}

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self, seed), fields(roles = seed.roles.len()), err)]
    async fn apply_seed(&self, seed: &Seed) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        for claim in seed.claims() {
            sqlx::query(
                r#"
                INSERT INTO claims (id, claim_type, claim_value)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(claim.id.as_uuid())
            .bind(&claim.claim_type)
            .bind(&claim.value)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_claim", e))?;
        }

        for role in &seed.roles {
            sqlx::query(
                r#"
                INSERT INTO roles (id, name, description)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(role.id.as_uuid())
            .bind(&role.name)
            .bind(&role.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_role", e))?;

            for claim in &role.claims {
                sqlx::query(
                    r#"
                    INSERT INTO role_claims (role_id, claim_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(role.id.as_uuid())
                .bind(claim.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("seed_role_claim", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> Result<Option<UserWithRole>, StoreError> {
        let sql = format!("{USER_WITH_ROLE_SELECT} WHERE u.id = $1 GROUP BY u.id, r.id");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;

        row.as_ref().map(user_with_role_from_row).transpose()
    }

    #[instrument(skip(self), fields(provider = %identity.provider), err)]
    async fn find_user_by_identity(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<UserWithRole>, StoreError> {
        let sql = format!(
            "{USER_WITH_ROLE_SELECT} WHERE u.provider = $1 AND u.external_id = $2 GROUP BY u.id, r.id"
        );
        let row = sqlx::query(&sql)
            .bind(&identity.provider)
            .bind(&identity.subject)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_identity", e))?;

        row.as_ref().map(user_with_role_from_row).transpose()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, provider = %user.identity.provider), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, provider, external_id, email, name, role_id, created_at, last_login_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.identity.provider)
        .bind(&user.identity.subject)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role_id.as_uuid())
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = GREATEST(last_login_at, $2) WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("touch_last_login", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_count = tracing::field::Empty), err)]
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, provider, external_id, email, name, role_id, created_at, last_login_at
            FROM users
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        let users = rows.iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("user_count", users.len());
        Ok(users)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let sql = format!("{ROLE_SELECT} WHERE r.id = $1 GROUP BY r.id");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;

        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let sql = format!("{ROLE_SELECT} WHERE r.name = $1 GROUP BY r.id");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;

        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let sql = format!("{ROLE_SELECT} GROUP BY r.id ORDER BY r.name ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(
        skip(self, change),
        fields(
            user_id = %change.user_id,
            expected_role_id = %change.expected_role_id,
            new_role_id = %change.new_role_id
        ),
        err
    )]
    async fn change_role(&self, change: RoleChange) -> Result<SecurityEvent, StoreError> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query("UPDATE users SET role_id = $3 WHERE id = $1 AND role_id = $2")
            .bind(change.user_id.as_uuid())
            .bind(change.expected_role_id.as_uuid())
            .bind(change.new_role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user_role", e))?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
                .bind(change.user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_user", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if exists {
                StoreError::Conflict(format!("user {} role changed concurrently", change.user_id))
            } else {
                StoreError::NotFound(format!("user {}", change.user_id))
            });
        }

        // Any failure below drops `tx` uncommitted, which rolls the role update back.
        let event = append_in_tx(&mut tx, change.event).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(event)
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type), err)]
    async fn append_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        let mut tx = self.begin().await?;
        let sealed = append_in_tx(&mut tx, event).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(sealed)
    }

    #[instrument(skip(self), fields(category = ?category), err)]
    async fn list_events(&self, category: EventCategory) -> Result<Vec<SecurityEvent>, StoreError> {
        let types: Vec<String> = category
            .event_types()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM security_events WHERE event_type = ANY($1) \
             ORDER BY occurred_utc DESC, sequence DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(&types)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_events", e))?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn load_chain(&self) -> Result<Vec<SecurityEvent>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM security_events ORDER BY sequence ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_chain", e))?;

        rows.iter().map(event_from_row).collect()
    }
}

#[derive(Debug, Deserialize)]
struct ClaimJson {
    id: uuid::Uuid,
    claim_type: String,
    value: String,
}

fn claims_from_json(value: serde_json::Value) -> Result<Vec<Claim>, StoreError> {
    let claims: Vec<ClaimJson> = serde_json::from_value(value)
        .map_err(|e| StoreError::Backend(format!("failed to decode role claims: {e}")))?;
    Ok(claims
        .into_iter()
        .map(|c| Claim::new(ClaimId::from_uuid(c.id), c.claim_type, c.value))
        .collect())
}

fn decode<T>(operation: &str, r: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    r.map_err(|e| StoreError::Backend(format!("failed to decode row in {operation}: {e}")))
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
    let provider: String = decode("user", row.try_get("provider"))?;
    let external_id: String = decode("user", row.try_get("external_id"))?;
    Ok(User {
        id: UserId::from_uuid(decode("user", row.try_get("id"))?),
        identity: ExternalIdentity::new(&provider, external_id),
        email: decode("user", row.try_get("email"))?,
        name: decode("user", row.try_get("name"))?,
        role_id: RoleId::from_uuid(decode("user", row.try_get("role_id"))?),
        created_at: decode("user", row.try_get("created_at"))?,
        last_login_at: decode("user", row.try_get("last_login_at"))?,
    })
}

fn user_with_role_from_row(row: &sqlx::postgres::PgRow) -> Result<UserWithRole, StoreError> {
    let user = user_from_row(row)?;
    let role = Role {
        id: user.role_id,
        name: decode("user_role", row.try_get("role_name"))?,
        description: decode("user_role", row.try_get("role_description"))?,
        claims: claims_from_json(decode("user_role", row.try_get("claims"))?)?,
    };
    Ok(UserWithRole { user, role })
}

fn role_from_row(row: &sqlx::postgres::PgRow) -> Result<Role, StoreError> {
    Ok(Role {
        id: RoleId::from_uuid(decode("role", row.try_get("id"))?),
        name: decode("role", row.try_get("name"))?,
        description: decode("role", row.try_get("description"))?,
        claims: claims_from_json(decode("role", row.try_get("claims"))?)?,
    })
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<SecurityEvent, StoreError> {
    let event_type: String = decode("event", row.try_get("event_type"))?;
    let event_type = SecurityEventType::from_str(&event_type)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let sequence: i64 = decode("event", row.try_get("sequence"))?;
    let previous_role_id: Option<uuid::Uuid> = decode("event", row.try_get("previous_role_id"))?;
    let new_role_id: Option<uuid::Uuid> = decode("event", row.try_get("new_role_id"))?;

    Ok(SecurityEvent {
        id: SecurityEventId::from_uuid(decode("event", row.try_get("id"))?),
        sequence: sequence as u64,
        event_type,
        author_user_id: UserId::from_uuid(decode("event", row.try_get("author_user_id"))?),
        affected_user_id: UserId::from_uuid(decode("event", row.try_get("affected_user_id"))?),
        occurred_utc: decode("event", row.try_get("occurred_utc"))?,
        details: decode("event", row.try_get("details"))?,
        previous_role_id: previous_role_id.map(RoleId::from_uuid),
        new_role_id: new_role_id.map(RoleId::from_uuid),
        chain_hash: decode("event", row.try_get("chain_hash"))?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::ForeignKey(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
