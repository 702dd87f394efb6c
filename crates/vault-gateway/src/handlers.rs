//! Request handlers

use crate::server::AppState;
use crate::{GatewayError, Result};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info};
use vault_core::{FanSpeed, SwitchState};
use vault_safety::HealthReport;
use vault_tasks::{TaskId, TaskState};

const INVALID_SPEED: &str = "Invalid speed. Must be an integer between 0 and 100.";
const INVALID_STATE: &str = "Invalid state. Must be 'on' or 'off'.";
const INFERENCE_FIELDS_REQUIRED: &str = "model_name and input_data are required";

fn field<'a>(body: &'a Option<Json<Value>>, name: &str) -> Option<&'a Value> {
    body.as_ref().and_then(|Json(value)| value.get(name))
}

fn switch_state(body: &Option<Json<Value>>) -> Result<SwitchState> {
    let raw = field(body, "state")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::validation(INVALID_STATE))?;
    raw.parse::<SwitchState>()
        .map_err(|_| GatewayError::validation(INVALID_STATE))
}

fn model_name(body: &Option<Json<Value>>) -> Result<String> {
    field(body, "model_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::validation("model_name is required"))
}

/// Null, empty, zero and `false` inputs are all treated as missing
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Liveness probe
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.stats.uptime_seconds(),
        "requests": state.stats.total_requests(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Ingest a host temperature sample
pub async fn report_temperature(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let temperature_c = field(&body, "temperature_c")
        .or_else(|| field(&body, "temperature"))
        .and_then(Value::as_f64)
        .filter(|t| t.is_finite())
        .ok_or_else(|| GatewayError::validation("temperature_c is required and must be a number"))?;

    let new_state = state.controller.report_temperature(temperature_c).await;
    Ok(Json(json!({
        "status": "accepted",
        "temperature_c": new_state.temperature_c,
        "fan_speed_percent": new_state.fan_speed_percent,
    })))
}

pub async fn get_fan(State(state): State<AppState>) -> impl IntoResponse {
    let speed = state.controller.snapshot().await.fan_speed_percent;
    Json(json!({
        "speed": speed,
        "fan_speed_percent": speed,
    }))
}

pub async fn set_fan(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let requested = field(&body, "speed")
        .and_then(Value::as_i64)
        .ok_or_else(|| GatewayError::validation(INVALID_SPEED))?;
    let speed = FanSpeed::try_new(requested).map_err(|_| GatewayError::validation(INVALID_SPEED))?;

    let new_state = state.controller.set_fan_speed(speed).await;
    Ok(Json(json!({
        "message": format!("Fan speed set to {}%", speed),
        "speed": new_state.fan_speed_percent,
        "fan_speed_percent": new_state.fan_speed_percent,
    })))
}

pub async fn get_diode(State(state): State<AppState>) -> impl IntoResponse {
    let diode = state.controller.snapshot().await.diode_state;
    Json(json!({
        "diode_state": diode,
        "state": diode,
    }))
}

pub async fn set_diode(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let requested = switch_state(&body)?;
    let new_state = state.controller.set_diode_state(requested).await;
    Ok(Json(json!({
        "message": format!("Fault diode set to {}", requested),
        "diode_state": new_state.diode_state,
        "state": new_state.diode_state,
    })))
}

pub async fn get_power(State(state): State<AppState>) -> impl IntoResponse {
    let power = state.controller.snapshot().await.power_state;
    Json(json!({
        "power_state": power,
        "state": power,
    }))
}

pub async fn set_power(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let requested = switch_state(&body)?;
    let new_state = state.controller.set_array_power(requested).await;
    Ok(Json(json!({
        "message": format!("Power supply turning {}", requested),
        "power_state": new_state.power_state,
        "state": new_state.power_state,
    })))
}

/// Current system state together with the accelerator status
pub async fn system_health(State(state): State<AppState>) -> impl IntoResponse {
    let system_state = state.controller.snapshot().await;
    let npu = state.registry.status().await;
    Json(json!({
        "system_state": system_state,
        "npu": npu,
    }))
}

/// Run the remediation policy over a health report and apply the plan
pub async fn assess(
    State(state): State<AppState>,
    body: Option<Json<HealthReport>>,
) -> Result<impl IntoResponse> {
    let Json(report) = body.ok_or_else(|| GatewayError::validation("A valid health report is required"))?;
    let plan = state.controller.assess(&report).await;
    Ok(Json(plan))
}

pub async fn npu_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.status().await)
}

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list_models().await)
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.registry.model_info(&name).await?))
}

pub async fn load_model(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let name = model_name(&body)?;
    let outcome = state.registry.load(&name).await?;
    Ok(Json(json!({
        "model_name": name,
        "status": outcome,
    })))
}

pub async fn unload_model(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let name = model_name(&body)?;
    let outcome = state.registry.unload(&name).await?;
    Ok(Json(json!({
        "model_name": name,
        "status": outcome,
    })))
}

/// Queue an inference task; the caller polls for the outcome
pub async fn submit_inference(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse> {
    let name = model_name(&body).map_err(|_| GatewayError::validation(INFERENCE_FIELDS_REQUIRED))?;
    let input = field(&body, "input_data")
        .filter(|value| !is_blank(value))
        .cloned()
        .ok_or_else(|| GatewayError::validation(INFERENCE_FIELDS_REQUIRED))?;

    let task_id = state.queue.submit(name.clone(), input).await?;
    info!("Queued inference task {} on '{}'", task_id, name);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "task_id": task_id,
            "status": "pending",
        })),
    ))
}

pub async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse> {
    let id: TaskId = task_id.parse()?;
    let record = state.queue.poll(&id).await?;
    debug!("Task {} polled: {}", id, record.status());

    let response = match record.state {
        TaskState::Pending => (
            StatusCode::ACCEPTED,
            Json(json!({
                "task_id": id,
                "status": "pending",
            })),
        ),
        TaskState::Completed { result } => (
            StatusCode::OK,
            Json(json!({
                "task_id": id,
                "status": "completed",
                "result": result,
            })),
        ),
        TaskState::Failed { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "task_id": id,
                "status": "failed",
                "error": error,
            })),
        ),
    };
    Ok(response)
}
