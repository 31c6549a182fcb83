use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use coursegrid_core::{
    DateRange, Occurrence, ScheduleStatus, SectionId, SemesterId, StudentId, TeacherId,
    TemplateId, UserId, Visibility,
    ics::{IcsExporter, IcsOptions},
    parse_recurrence_rule,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Occurrence listing query
#[derive(Deserialize)]
struct OccurrencesQuery {
    /// Comma separated section ids, e.g. `1,2,3`
    sections: String,
    start: String, // YYYY-MM-DD
    end: String,   // YYYY-MM-DD
    include_cancelled: Option<bool>,
    format: Option<String>, // "json" or "ics", defaults to "json"
}

#[derive(Deserialize)]
struct TeacherQuery {
    start: String,
    end: String,
    include_cancelled: Option<bool>,
    format: Option<String>,
}

#[derive(Deserialize)]
struct ConflictQuery {
    student_id: StudentId,
    section_id: SectionId,
    semester_id: SemesterId,
}

#[derive(Deserialize)]
struct RuleQuery {
    rule: String,
}

#[derive(Deserialize)]
struct StatusChangeRequest {
    status: ScheduleStatus,
    actor_id: UserId,
    reason: Option<String>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/occurrences", get(occurrences_handler))
        .route("/teachers/{teacher_id}/occurrences", get(teacher_occurrences_handler))
        .route("/conflicts", get(conflict_handler))
        .route("/rules/parse", get(parse_rule_handler))
        .route("/schedules/{template_id}/status", post(change_status_handler))
        .route("/changes", get(list_changes_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Coursegrid Schedule Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Recurring class schedule occurrences and conflict checks",
        "endpoints": {
            "health": "/health",
            "occurrences": "/occurrences",
            "teacher_occurrences": "/teachers/{teacher_id}/occurrences",
            "conflicts": "/conflicts",
            "parse_rule": "/rules/parse",
            "change_status": "/schedules/{template_id}/status",
            "changes": "/changes"
        }
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn occurrences_handler(
    Query(params): Query<OccurrencesQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let section_ids = parse_section_ids(&params.sections)?;
    let range = DateRange::parse(&params.start, &params.end)?;
    let visibility = visibility(params.include_cancelled);

    let occurrences = state
        .service
        .section_occurrences(&section_ids, range, visibility)
        .await?;

    Ok(render(occurrences, params.format.as_deref(), "Class Schedule"))
}

async fn teacher_occurrences_handler(
    Path(teacher_id): Path<TeacherId>,
    Query(params): Query<TeacherQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let range = DateRange::parse(&params.start, &params.end)?;
    let occurrences = state
        .service
        .teacher_occurrences(teacher_id, range, visibility(params.include_cancelled))
        .await?;

    Ok(render(
        occurrences,
        params.format.as_deref(),
        &format!("Teaching Schedule {}", teacher_id),
    ))
}

async fn conflict_handler(
    Query(params): Query<ConflictQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conflict = state
        .service
        .conflict_detector()
        .find_conflict(params.student_id, params.section_id, params.semester_id)
        .await?;

    Ok(Json(serde_json::json!({
        "conflict": conflict.is_some(),
        "detail": conflict,
    })))
}

async fn parse_rule_handler(Query(params): Query<RuleQuery>) -> impl IntoResponse {
    let rule = parse_recurrence_rule(&params.rule);
    Json(serde_json::json!({
        "rule": rule,
        "canonical": rule.to_string(),
    }))
}

async fn change_status_handler(
    Path(template_id): Path<TemplateId>,
    State(state): State<AppState>,
    Json(body): Json<StatusChangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .service
        .change_status(template_id, body.status, body.actor_id, body.reason)
        .await?;
    Ok(Json(snapshot))
}

async fn list_changes_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.changes().await)
}

fn visibility(include_cancelled: Option<bool>) -> Visibility {
    if include_cancelled.unwrap_or(false) {
        Visibility::IncludeCancelled
    } else {
        Visibility::Default
    }
}

fn parse_section_ids(raw: &str) -> Result<Vec<SectionId>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SectionId>().map_err(|_| {
                AppError(coursegrid_core::Error::Validation(format!(
                    "Invalid section id '{}'",
                    s
                )))
            })
        })
        .collect()
}

fn render(occurrences: Vec<Occurrence>, format: Option<&str>, calendar_name: &str) -> Response {
    match format {
        Some("ics") => {
            let exporter = IcsExporter::new(IcsOptions {
                calendar_name: Some(calendar_name.to_string()),
                ..Default::default()
            });
            (
                StatusCode::OK,
                [("Content-Type", "text/calendar; charset=utf-8")],
                exporter.export(&occurrences),
            )
                .into_response()
        }
        _ => Json(occurrences).into_response(),
    }
}

/// Application error type
#[derive(Debug)]
struct AppError(coursegrid_core::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use coursegrid_core::Error;

        let (status, error_message) = match &self.0 {
            Error::Validation(_)
            | Error::Config(_)
            | Error::DateTime(_)
            | Error::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, "Invalid request"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<coursegrid_core::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
