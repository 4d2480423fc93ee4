use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::debts::normalize_request;
use crate::planner::{
    optimize_with_budget, HorizonPolicy, PlanError, PlanSettings, RepaymentPlan, SolveStatus,
};

#[derive(Debug, Clone)]
pub struct ApiState {
    pub settings: PlanSettings,
}

impl ApiState {
    pub fn new(settings: PlanSettings) -> Self {
        Self { settings }
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<SolveStatus>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    solve_status: Option<SolveStatus>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            solve_status: None,
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        let status = match &err {
            PlanError::Validation(_) | PlanError::InvalidHorizon => StatusCode::BAD_REQUEST,
            PlanError::Optimization { .. } | PlanError::HorizonExceeded { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PlanError::Solver { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            solve_status: err.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            error: self.message,
            status: self.solve_status,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    horizon_months: usize,
    horizon_policy: HorizonPolicy,
    solve_timeout_secs: Option<u64>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/settings", get(settings))
        .route("/api/optimize", post(optimize))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let state = ApiState::new(config.plan_settings());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn settings(State(state): State<ApiState>) -> Json<SettingsResponse> {
    let settings = state.settings;
    Json(SettingsResponse {
        horizon_months: settings.horizon_months,
        horizon_policy: settings.horizon_policy,
        solve_timeout_secs: settings.solve_timeout.map(|d| d.as_secs()),
    })
}

async fn optimize(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RepaymentPlan>, ApiError> {
    let Json(raw) = payload.map_err(|rejection| {
        warn!("rejected optimize request body: {rejection}");
        ApiError::bad_request(rejection.body_text())
    })?;

    let portfolio = normalize_request(&raw).map_err(|err| {
        warn!(path = err.path().unwrap_or(""), "invalid optimize request: {err}");
        ApiError::from(PlanError::from(err))
    })?;

    let plan = optimize_with_budget(portfolio, state.settings).await?;
    Ok(Json(plan))
}
