//! PostgreSQL store.
//!
//! Queries are built at runtime, so the crate compiles without a database.
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE stackd_stacks (
//!     id BIGINT PRIMARY KEY, title TEXT NOT NULL, slug TEXT NOT NULL,
//!     namespace TEXT NOT NULL, activity TEXT NOT NULL, created_by TEXT,
//!     properties JSONB NOT NULL DEFAULT '{}', created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE stackd_environments (
//!     name TEXT PRIMARY KEY, description TEXT NOT NULL, activity TEXT NOT NULL,
//!     properties JSONB NOT NULL DEFAULT '{}', created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE stackd_hosts (
//!     id BIGINT PRIMARY KEY, stack_id BIGINT NOT NULL REFERENCES stackd_stacks(id),
//!     hostname TEXT NOT NULL, body JSONB NOT NULL
//! );
//! CREATE TABLE stackd_cloud_accounts (slug TEXT PRIMARY KEY, body JSONB NOT NULL);
//! CREATE TABLE stackd_formula_components (
//!     owner_kind TEXT NOT NULL, owner_id TEXT NOT NULL, sls_path TEXT NOT NULL,
//!     sort_order INTEGER NOT NULL, title TEXT NOT NULL
//! );
//! CREATE TABLE stackd_component_metadata (
//!     id BIGSERIAL PRIMARY KEY, entity_kind TEXT NOT NULL, entity_id TEXT NOT NULL,
//!     sls_path TEXT NOT NULL, host TEXT NOT NULL, status TEXT NOT NULL,
//!     health TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE stackd_history (
//!     id BIGSERIAL PRIMARY KEY, entity_kind TEXT NOT NULL, entity_id TEXT NOT NULL,
//!     level TEXT NOT NULL, message TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE stackd_command_results (
//!     id BIGSERIAL PRIMARY KEY, entity_kind TEXT NOT NULL, entity_id TEXT NOT NULL,
//!     body JSONB NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::{ActivitySwap, StackStore, StoreError, StoreResult};
use crate::models::{
    CloudAccount, CommandResult, ComponentMetadata, EntityKey, Environment, FormulaComponent,
    HistoryEntry, Host, OwnerKind, OwnerRef, Stack,
};
use crate::state_machine::Activity;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("Invalid stored JSON: {err}"))
    }
}

#[derive(Debug, Clone)]
pub struct PgStackStore {
    pool: PgPool,
}

fn entity_columns(entity: &EntityKey) -> (&'static str, String) {
    match entity {
        EntityKey::Stack(id) => ("stack", id.to_string()),
        EntityKey::Environment(name) => ("environment", name.clone()),
    }
}

fn owner_kind(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::Blueprint => "blueprint",
        OwnerKind::BlueprintHostDefinition => "blueprint_host_definition",
        OwnerKind::CloudAccount => "cloud_account",
        OwnerKind::Environment => "environment",
        OwnerKind::Stack => "stack",
    }
}

fn parse_activity(raw: &str) -> StoreResult<Activity> {
    raw.parse()
        .map_err(|e: String| StoreError::Backend(format!("Invalid stored activity: {e}")))
}

impl PgStackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_activity(&self, entity: &EntityKey) -> StoreResult<Option<Activity>> {
        let row = match entity {
            EntityKey::Stack(id) => {
                sqlx::query("SELECT activity FROM stackd_stacks WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            EntityKey::Environment(name) => {
                sqlx::query("SELECT activity FROM stackd_environments WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        row.map(|row| -> StoreResult<Activity> {
            parse_activity(&row.try_get::<String, _>("activity")?)
        })
        .transpose()
    }
}

#[async_trait]
impl StackStore for PgStackStore {
    async fn get_stack(&self, stack_id: i64) -> StoreResult<Option<Stack>> {
        let row = sqlx::query(
            "SELECT id, title, slug, namespace, activity, created_by, properties, created_at \
             FROM stackd_stacks WHERE id = $1",
        )
        .bind(stack_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> StoreResult<Stack> {
            Ok(Stack {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                slug: row.try_get("slug")?,
                namespace: row.try_get("namespace")?,
                activity: parse_activity(&row.try_get::<String, _>("activity")?)?,
                created_by: row.try_get("created_by")?,
                properties: row.try_get("properties")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            })
        })
        .transpose()
    }

    async fn get_environment(&self, name: &str) -> StoreResult<Option<Environment>> {
        let row = sqlx::query(
            "SELECT name, description, activity, properties, created_at \
             FROM stackd_environments WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let formula_components = self.components_for(&OwnerRef::environment(name)).await?;
        Ok(Some(Environment {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            activity: parse_activity(&row.try_get::<String, _>("activity")?)?,
            properties: row.try_get("properties")?,
            formula_components,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn activity(&self, entity: &EntityKey) -> StoreResult<Activity> {
        self.current_activity(entity)
            .await?
            .ok_or_else(|| StoreError::NotFound(entity.to_string()))
    }

    async fn compare_and_set_activity(
        &self,
        entity: &EntityKey,
        allowed: &[Activity],
        new: Activity,
    ) -> StoreResult<ActivitySwap> {
        let allowed: Vec<String> = allowed.iter().map(|a| a.as_str().to_string()).collect();
        let (table, key_column) = match entity {
            EntityKey::Stack(_) => ("stackd_stacks", "id"),
            EntityKey::Environment(_) => ("stackd_environments", "name"),
        };
        // Row lock in the CTE keeps the read and the write one atomic step
        let sql = format!(
            "WITH prev AS (SELECT activity FROM {table} WHERE {key_column} = $2 FOR UPDATE) \
             UPDATE {table} t SET activity = $1 FROM prev \
             WHERE t.{key_column} = $2 AND prev.activity = ANY($3) \
             RETURNING prev.activity AS previous"
        );
        let query = sqlx::query(&sql).bind(new.as_str());
        let query = match entity {
            EntityKey::Stack(id) => query.bind(*id),
            EntityKey::Environment(name) => query.bind(name.clone()),
        };
        let swapped = query.bind(allowed).fetch_optional(&self.pool).await?;

        match swapped {
            Some(row) => Ok(ActivitySwap::Swapped {
                previous: parse_activity(&row.try_get::<String, _>("previous")?)?,
            }),
            None => Ok(ActivitySwap::Rejected {
                current: self.activity(entity).await?,
            }),
        }
    }

    async fn set_activity(&self, entity: &EntityKey, activity: Activity) -> StoreResult<()> {
        let result = match entity {
            EntityKey::Stack(id) => {
                sqlx::query("UPDATE stackd_stacks SET activity = $1 WHERE id = $2")
                    .bind(activity.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            EntityKey::Environment(name) => {
                sqlx::query("UPDATE stackd_environments SET activity = $1 WHERE name = $2")
                    .bind(activity.as_str())
                    .bind(name)
                    .execute(&self.pool)
                    .await?
            }
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(entity.to_string()));
        }
        Ok(())
    }

    async fn list_hosts(&self, stack_id: i64) -> StoreResult<Vec<Host>> {
        let rows = sqlx::query("SELECT body FROM stackd_hosts WHERE stack_id = $1 ORDER BY hostname")
            .bind(stack_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| -> StoreResult<Host> { Ok(serde_json::from_value(row.try_get("body")?)?) })
            .collect()
    }

    async fn update_host(&self, host: &Host) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE stackd_hosts SET hostname = $1, body = $2 WHERE id = $3 AND stack_id = $4",
        )
        .bind(&host.hostname)
        .bind(serde_json::to_value(host)?)
        .bind(host.id)
        .bind(host.stack_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("host {}", host.id)));
        }
        Ok(())
    }

    async fn set_host_activity(
        &self,
        stack_id: i64,
        host_ids: &[i64],
        activity: Activity,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE stackd_hosts SET body = jsonb_set(body, '{activity}', to_jsonb($1::text)) \
             WHERE stack_id = $2 AND id = ANY($3)",
        )
        .bind(activity.as_str())
        .bind(stack_id)
        .bind(host_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_hosts(&self, stack_id: i64, host_ids: &[i64]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM stackd_hosts WHERE stack_id = $1 AND id = ANY($2)")
            .bind(stack_id)
            .bind(host_ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stack(&self, stack_id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let remaining: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM stackd_hosts WHERE stack_id = $1")
                .bind(stack_id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("count")?;
        if remaining > 0 {
            return Err(StoreError::Conflict(format!(
                "stack {stack_id} still has {remaining} hosts"
            )));
        }
        let result = sqlx::query("DELETE FROM stackd_stacks WHERE id = $1")
            .bind(stack_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(EntityKey::Stack(stack_id).to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_cloud_account(&self, slug: &str) -> StoreResult<Option<CloudAccount>> {
        let row = sqlx::query("SELECT body FROM stackd_cloud_accounts WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut account: CloudAccount = serde_json::from_value(row.try_get("body")?)?;
        account.formula_components = self.components_for(&OwnerRef::cloud_account(slug)).await?;
        Ok(Some(account))
    }

    async fn components_for(&self, owner: &OwnerRef) -> StoreResult<Vec<FormulaComponent>> {
        let rows = sqlx::query(
            "SELECT sls_path, sort_order, title FROM stackd_formula_components \
             WHERE owner_kind = $1 AND owner_id = $2 ORDER BY sort_order, sls_path",
        )
        .bind(owner_kind(owner.kind))
        .bind(&owner.id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<FormulaComponent> {
                let order: i32 = row.try_get("sort_order")?;
                Ok(FormulaComponent {
                    sls_path: row.try_get("sls_path")?,
                    order: u32::try_from(order).map_err(|_| {
                        StoreError::Backend(format!("Negative component order {order}"))
                    })?,
                    title: row.try_get("title")?,
                    owner: Some(owner.clone()),
                })
            })
            .collect()
    }

    async fn append_component_metadata(
        &self,
        records: Vec<ComponentMetadata>,
    ) -> StoreResult<Vec<ComponentMetadata>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(records.len());
        for mut record in records {
            let (kind, id) = entity_columns(&record.entity);
            record.id = sqlx::query(
                "INSERT INTO stackd_component_metadata \
                 (entity_kind, entity_id, sls_path, host, status, health, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
            )
            .bind(kind)
            .bind(id)
            .bind(&record.sls_path)
            .bind(&record.host)
            .bind(record.status.as_str())
            .bind(record.health.as_str())
            .bind(record.created_at)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;
            stored.push(record);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn component_history(&self, entity: &EntityKey) -> StoreResult<Vec<ComponentMetadata>> {
        let (kind, id) = entity_columns(entity);
        let rows = sqlx::query(
            "SELECT id, sls_path, host, status, health, created_at FROM stackd_component_metadata \
             WHERE entity_kind = $1 AND entity_id = $2 ORDER BY created_at, id",
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<ComponentMetadata> {
                let status: String = row.try_get("status")?;
                let health: String = row.try_get("health")?;
                Ok(ComponentMetadata {
                    id: row.try_get("id")?,
                    entity: entity.clone(),
                    sls_path: row.try_get("sls_path")?,
                    host: row.try_get("host")?,
                    status: status
                        .parse()
                        .map_err(|e| StoreError::Backend(format!("{e}")))?,
                    health: health
                        .parse()
                        .map_err(|e| StoreError::Backend(format!("{e}")))?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn append_history(&self, entry: HistoryEntry) -> StoreResult<()> {
        let (kind, id) = entity_columns(&entry.entity);
        sqlx::query(
            "INSERT INTO stackd_history (entity_kind, entity_id, level, message, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(kind)
        .bind(id)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, entity: &EntityKey) -> StoreResult<Vec<HistoryEntry>> {
        let (kind, id) = entity_columns(entity);
        let rows = sqlx::query(
            "SELECT level, message, created_at FROM stackd_history \
             WHERE entity_kind = $1 AND entity_id = $2 ORDER BY id",
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<HistoryEntry> {
                let level: String = row.try_get("level")?;
                Ok(HistoryEntry {
                    entity: entity.clone(),
                    level: level.parse().map_err(StoreError::Backend)?,
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn save_command_result(&self, result: CommandResult) -> StoreResult<()> {
        let (kind, id) = entity_columns(&result.entity);
        sqlx::query(
            "INSERT INTO stackd_command_results (entity_kind, entity_id, body) VALUES ($1, $2, $3)",
        )
        .bind(kind)
        .bind(id)
        .bind(serde_json::to_value(&result)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn command_results(&self, entity: &EntityKey) -> StoreResult<Vec<CommandResult>> {
        let (kind, id) = entity_columns(entity);
        let rows = sqlx::query(
            "SELECT body FROM stackd_command_results \
             WHERE entity_kind = $1 AND entity_id = $2 ORDER BY id",
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| -> StoreResult<CommandResult> {
                Ok(serde_json::from_value(row.try_get("body")?)?)
            })
            .collect()
    }
}
