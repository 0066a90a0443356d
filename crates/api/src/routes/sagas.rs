//! Saga trigger, status, and abort endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{InstanceId, Payload};
use domain::SagaInstance;
use result_store::ResultStore;
use saga::SagaCoordinator;
use serde::{Deserialize, Serialize};
use task_channel::TaskChannel;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: ResultStore, C: TaskChannel> {
    pub coordinator: Arc<SagaCoordinator<S, C>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartSagaRequest {
    pub definition: String,
    pub business_key: String,
    #[serde(default)]
    pub input: Payload,
}

// -- Response types --

#[derive(Serialize)]
pub struct StartSagaResponse {
    pub instance_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub instance_id: String,
    pub definition: String,
    pub business_key: String,
    pub status: String,
    pub current_step_index: usize,
    pub context: Payload,
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
pub struct StepResponse {
    pub step_index: usize,
    pub task_kind: String,
    pub direction: String,
    pub status: String,
    pub attempt: u32,
    pub output_data: Payload,
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
pub struct AbortResponse {
    pub instance_id: String,
    pub status: String,
}

impl SagaStatusResponse {
    fn from_instance(instance: &SagaInstance) -> Self {
        Self {
            instance_id: instance.instance_id().to_string(),
            definition: instance.definition_name().to_string(),
            business_key: instance.business_key().to_string(),
            status: instance.status().to_string(),
            current_step_index: instance.current_step_index(),
            context: instance.context().clone(),
            failure_reason: instance.failure_reason().map(String::from),
        }
    }
}

// -- Handlers --

/// POST /sagas — starts a saga instance for a business key.
#[tracing::instrument(skip(state, req), fields(definition = %req.definition, business_key = %req.business_key))]
pub async fn start<S: ResultStore + 'static, C: TaskChannel + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<StartSagaRequest>,
) -> Result<(StatusCode, Json<StartSagaResponse>), ApiError> {
    let instance_id = state
        .coordinator
        .start(&req.definition, &req.business_key, req.input)
        .await?;

    let response = StartSagaResponse {
        instance_id: instance_id.to_string(),
        status: "Running".to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /sagas/{id} — status snapshot of an instance.
#[tracing::instrument(skip(state))]
pub async fn get<S: ResultStore + 'static, C: TaskChannel + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let instance_id = parse_instance_id(&id)?;
    let instance = state
        .coordinator
        .status(instance_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga instance {id} not found")))?;

    Ok(Json(SagaStatusResponse::from_instance(&instance)))
}

/// GET /sagas/{id}/steps — the instance's step execution log.
#[tracing::instrument(skip(state))]
pub async fn steps<S: ResultStore + 'static, C: TaskChannel + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StepResponse>>, ApiError> {
    let instance_id = parse_instance_id(&id)?;
    let instance = state
        .coordinator
        .status(instance_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga instance {id} not found")))?;

    let steps = instance
        .steps()
        .iter()
        .map(|step| StepResponse {
            step_index: step.step_index,
            task_kind: step.task_kind.clone(),
            direction: step.direction.to_string(),
            status: step.status.to_string(),
            attempt: step.attempt,
            output_data: step.output_data.clone(),
            failure_reason: step.failure_reason.clone(),
        })
        .collect();

    Ok(Json(steps))
}

/// POST /sagas/{id}/abort — forces a running instance into compensation.
#[tracing::instrument(skip(state))]
pub async fn abort<S: ResultStore + 'static, C: TaskChannel + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AbortResponse>), ApiError> {
    let instance_id = parse_instance_id(&id)?;
    state.coordinator.abort(instance_id).await?;

    let status = state
        .coordinator
        .status(instance_id)
        .await?
        .map(|instance| instance.status().to_string())
        .unwrap_or_else(|| "Compensating".to_string());

    let response = AbortResponse {
        instance_id: id,
        status,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn parse_instance_id(id: &str) -> Result<InstanceId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid instance id: {e}")))?;
    Ok(InstanceId::from_uuid(uuid))
}
