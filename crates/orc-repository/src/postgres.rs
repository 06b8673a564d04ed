//! Postgres-backed repository. Rows carry a tenant id and an optimistic
//! `version` column; the whole session aside from its indexed columns is
//! stored as a JSON document, keeping flexible, code-agnostic payloads at
//! the boundary (`agent_config` is deliberately untyped since agent
//! configuration shapes vary per session type and per tenant).

use async_trait::async_trait;
use orc_engine::Session;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::RepositoryError;
use crate::filter::{Page, PageResult, SessionFilter};
use crate::repository::SessionRepository;

pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `sessions` table if it does not already exist. Run at
    /// startup; a real deployment would drive this from migrations
    /// instead.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                priority TEXT NOT NULL,
                title TEXT NOT NULL,
                version BIGINT NOT NULL,
                document JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<Session, RepositoryError> {
        let document: serde_json::Value = row.try_get("document").map_err(|e| RepositoryError::Backend(e.to_string()))?;
        serde_json::from_value(document).map_err(|e| RepositoryError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create(&self, ctx: &RequestContext, mut session: Session) -> Result<Session, RepositoryError> {
        session.tenant_id = ctx.tenant_id.clone();
        let document = serde_json::to_value(&session).map_err(|e| RepositoryError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, tenant_id, status, created_at, priority, title, version, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(&session.tenant_id)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(format!("{:?}", session.priority))
        .bind(&session.title)
        .bind(session.version as i64)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<Session, RepositoryError> {
        let row = sqlx::query("SELECT document FROM sessions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(&ctx.tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;

        Self::decode(&row)
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        mut session: Session,
        expected_version: u64,
    ) -> Result<Session, RepositoryError> {
        session.version = expected_version + 1;
        let document = serde_json::to_value(&session).map_err(|e| RepositoryError::Backend(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = $1, version = $2, document = $3, title = $4
            WHERE id = $5 AND tenant_id = $6 AND version = $7
            "#,
        )
        .bind(session.status.as_str())
        .bind(session.version as i64)
        .bind(document)
        .bind(&session.title)
        .bind(session.id)
        .bind(&ctx.tenant_id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current_version: Option<i64> = sqlx::query("SELECT version FROM sessions WHERE id = $1")
                .bind(session.id)
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("version"));

            return match current_version {
                Some(v) => Err(RepositoryError::Conflict(session.id, v as u64)),
                None => Err(RepositoryError::NotFound(session.id)),
            };
        }

        Ok(session)
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: SessionFilter,
        page: Page,
    ) -> Result<PageResult<Session>, RepositoryError> {
        // Filtering is applied client-side on the JSON document for
        // fields beyond the indexed columns; a heavier-traffic deployment
        // would promote priority/date range to generated columns.
        let rows = sqlx::query("SELECT document FROM sessions WHERE tenant_id = $1 ORDER BY created_at DESC, id")
            .bind(&ctx.tenant_id)
            .fetch_all(&self.pool)
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(Self::decode(row)?);
        }

        let filtered: Vec<Session> = sessions
            .into_iter()
            .filter(|s| apply_filter(s, &filter))
            .collect();

        let total = filtered.len() as u64;
        let items = filtered
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();

        Ok(PageResult { items, total })
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<(), RepositoryError> {
        let session = self.get(ctx, id).await?;
        if !session.status.is_terminal() {
            return Err(RepositoryError::InvalidState(id));
        }

        sqlx::query("DELETE FROM sessions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(&ctx.tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_active(&self, _ctx: &RequestContext, tenant_id: &str) -> Result<u64, RepositoryError> {
        let terminal = [
            "completed",
            "partially_completed",
            "failed",
            "timeout",
            "stopped",
            "cancelled",
            "orphaned",
        ];

        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM sessions WHERE tenant_id = $1 AND status != ALL($2)",
        )
        .bind(tenant_id)
        .bind(&terminal[..])
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }
}

fn apply_filter(session: &Session, filter: &SessionFilter) -> bool {
    if let Some(status) = filter.status {
        if session.status != status {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if session.priority != priority {
            return false;
        }
    }
    if let Some(after) = filter.created_after {
        if session.created_at < after {
            return false;
        }
    }
    if let Some(before) = filter.created_before {
        if session.created_at > before {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        if !session.title.to_lowercase().contains(&search.to_lowercase()) {
            return false;
        }
    }
    true
}
