use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InstanceId, Payload, TaskId};
use domain::{SagaInstance, SagaStatus, StepDirection, StepExecution, StepStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::Result;
use crate::error::StoreError;
use crate::store::ResultStore;

/// PostgreSQL-backed result store implementation.
///
/// Instances live in `saga_instances`; their step logs in
/// `step_executions`, keyed by `(instance_id, seq_no)` where `seq_no` is
/// the record's position in the append-only log. A partial unique index on
/// active business keys enforces the one-active-instance-per-key invariant
/// at the datastore.
#[derive(Clone)]
pub struct PostgresResultStore {
    pool: PgPool,
}

impl PostgresResultStore {
    /// Creates a new PostgreSQL result store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn parse_status<T: std::str::FromStr>(value: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| StoreError::InvalidStoredValue(e.to_string()))
    }

    fn payload_from_json(value: serde_json::Value) -> Result<Payload> {
        Ok(serde_json::from_value(value)?)
    }

    fn row_to_step(row: PgRow) -> Result<StepExecution> {
        Ok(StepExecution {
            step_index: row.try_get::<i64, _>("step_index")? as usize,
            task_kind: row.try_get("task_kind")?,
            direction: Self::parse_status::<StepDirection>(&row.try_get::<String, _>("direction")?)?,
            status: Self::parse_status::<StepStatus>(&row.try_get::<String, _>("status")?)?,
            task_id: TaskId::from_uuid(row.try_get::<Uuid, _>("task_id")?),
            attempt: row.try_get::<i64, _>("attempt")? as u32,
            input_data: Self::payload_from_json(row.try_get("input_data")?)?,
            output_data: Self::payload_from_json(row.try_get("output_data")?)?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn load(&self, instance_id: Uuid) -> Result<Option<SagaInstance>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, definition_name, business_key, status, current_step_index,
                   context, failure_reason, created_at, updated_at
            FROM saga_instances
            WHERE id = $1
            "#,
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let step_rows = sqlx::query(
            r#"
            SELECT step_index, task_kind, direction, status, task_id, attempt,
                   input_data, output_data, failure_reason,
                   created_at, dispatched_at, completed_at
            FROM step_executions
            WHERE instance_id = $1
            ORDER BY seq_no ASC
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        let steps = step_rows
            .into_iter()
            .map(Self::row_to_step)
            .collect::<Result<Vec<_>>>()?;

        let status: SagaStatus = Self::parse_status(&row.try_get::<String, _>("status")?)?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(Some(SagaInstance::restore(
            InstanceId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get("definition_name")?,
            row.try_get("business_key")?,
            status,
            row.try_get::<i64, _>("current_step_index")? as usize,
            Self::payload_from_json(row.try_get("context")?)?,
            steps,
            row.try_get("failure_reason")?,
            created_at,
            updated_at,
        )))
    }

    async fn upsert_steps(
        tx: &mut Transaction<'_, Postgres>,
        instance: &SagaInstance,
    ) -> Result<()> {
        for (seq_no, step) in instance.steps().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO step_executions
                    (instance_id, seq_no, step_index, task_kind, direction, status,
                     task_id, attempt, input_data, output_data, failure_reason,
                     created_at, dispatched_at, completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (instance_id, seq_no) DO UPDATE SET
                    status = EXCLUDED.status,
                    task_id = EXCLUDED.task_id,
                    attempt = EXCLUDED.attempt,
                    output_data = EXCLUDED.output_data,
                    failure_reason = EXCLUDED.failure_reason,
                    dispatched_at = EXCLUDED.dispatched_at,
                    completed_at = EXCLUDED.completed_at
                "#,
            )
            .bind(instance.instance_id().as_uuid())
            .bind(seq_no as i64)
            .bind(step.step_index as i64)
            .bind(&step.task_kind)
            .bind(step.direction.as_str())
            .bind(step.status.as_str())
            .bind(step.task_id.as_uuid())
            .bind(i64::from(step.attempt))
            .bind(serde_json::to_value(&step.input_data)?)
            .bind(serde_json::to_value(&step.output_data)?)
            .bind(&step.failure_reason)
            .bind(step.created_at)
            .bind(step.dispatched_at)
            .bind(step.completed_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn insert(&self, instance: &SagaInstance) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO saga_instances
                (id, definition_name, business_key, status, current_step_index,
                 context, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(instance.instance_id().as_uuid())
        .bind(instance.definition_name())
        .bind(instance.business_key())
        .bind(instance.status().as_str())
        .bind(instance.current_step_index() as i64)
        .bind(serde_json::to_value(instance.context())?)
        .bind(instance.failure_reason())
        .bind(instance.created_at())
        .bind(instance.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("uq_active_business_key")
            {
                return StoreError::DuplicateBusinessKey(instance.business_key().to_string());
            }
            StoreError::Database(e)
        })?;

        Self::upsert_steps(&mut tx, instance).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, instance: &SagaInstance) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE saga_instances
            SET status = $2, current_step_index = $3, context = $4,
                failure_reason = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(instance.instance_id().as_uuid())
        .bind(instance.status().as_str())
        .bind(instance.current_step_index() as i64)
        .bind(serde_json::to_value(instance.context())?)
        .bind(instance.failure_reason())
        .bind(instance.updated_at())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance.instance_id()));
        }

        Self::upsert_steps(&mut tx, instance).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Option<SagaInstance>> {
        self.load(instance_id.as_uuid()).await
    }

    async fn find_active_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<SagaInstance>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM saga_instances
            WHERE business_key = $1
              AND status NOT IN ('Completed', 'Compensated', 'Failed')
            LIMIT 1
            "#,
        )
        .bind(business_key)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Option<InstanceId>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT instance_id FROM step_executions WHERE task_id = $1 LIMIT 1",
        )
        .bind(task_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(InstanceId::from_uuid))
    }

    async fn list_non_terminal(&self) -> Result<Vec<SagaInstance>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM saga_instances
            WHERE status NOT IN ('Completed', 'Compensated', 'Failed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.load(id).await? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }
}
