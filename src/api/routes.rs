//! Admin REST endpoints for surveys.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::{AdminIdentity, require_admin};
use super::error::ApiError;
use crate::channels::Delivery;
use crate::locale;
use crate::store::Database;
use crate::survey::{
    FIRST_QUESTION_INDEX, QuestionSequencer, Survey, SurveyDetails, SurveyQuestion, SurveyStatus,
    generate_short_code,
};

/// Attempts at drawing an unused short code before giving up.
const CODE_ATTEMPTS: usize = 32;

/// Shared state for admin routes.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<dyn Database>,
    /// Used by the start action to send first questions.
    pub sequencer: QuestionSequencer,
}

/// Build the admin API router. Every `/api` route requires a bearer token.
pub fn survey_routes(state: ApiState) -> Router {
    let admin = Router::new()
        .route("/api/telegram/survey/list", get(list_surveys))
        .route("/api/telegram/survey/finish", get(finish_survey))
        .route("/api/telegram/survey/start", get(start_survey))
        .route("/api/telegram/survey/create", post(create_survey))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(admin)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "survey-bot"
    }))
}

// ── Surveys ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SurveyIdQuery {
    #[serde(rename = "surveyId")]
    survey_id: String,
}

impl SurveyIdQuery {
    /// Unparseable ids are reported the same as unknown ones.
    fn id(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(self.survey_id.trim()).map_err(|_| ApiError::NotFound)
    }
}

/// GET /api/telegram/survey/list
///
/// All surveys owned by the caller, newest first.
async fn list_surveys(
    State(state): State<ApiState>,
    Extension(admin): Extension<AdminIdentity>,
) -> Result<Json<Vec<SurveyDetails>>, ApiError> {
    let surveys = state.db.list_surveys_for_admin(&admin.admin_id).await?;
    Ok(Json(surveys))
}

/// GET /api/telegram/survey/finish?surveyId=<id>
///
/// Marks the survey FINISHED whatever its current status or owner.
async fn finish_survey(
    State(state): State<ApiState>,
    Extension(admin): Extension<AdminIdentity>,
    Query(query): Query<SurveyIdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let survey_id = query.id()?;
    if state.db.get_survey(survey_id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    state
        .db
        .update_survey_status(survey_id, SurveyStatus::Finished)
        .await?;
    info!(%survey_id, admin_id = %admin.admin_id, "Survey finished");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/telegram/survey/start?surveyId=<id>
///
/// Owner only. Moves a not-started survey to IN_PROGRESS and sends the first
/// question to every joined respondent.
async fn start_survey(
    State(state): State<ApiState>,
    Extension(admin): Extension<AdminIdentity>,
    Query(query): Query<SurveyIdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let survey_id = query.id()?;
    let survey = state
        .db
        .get_survey(survey_id)
        .await?
        .filter(|s| s.user_id == admin.admin_id)
        .ok_or(ApiError::NotFound)?;

    let started = state
        .db
        .transition_survey_status(survey.id, SurveyStatus::NotStarted, SurveyStatus::InProgress)
        .await?;
    if !started {
        // Re-read so the message reflects a concurrent finish or start.
        let status = state
            .db
            .get_survey(survey.id)
            .await?
            .map_or(survey.status, |s| s.status);
        return Err(ApiError::Conflict(format!(
            "Survey is already {}",
            locale::survey_status_label(status)
        )));
    }

    let respondents = state.db.list_survey_respondents(survey.id).await?;
    let mut notified = 0usize;
    for respondent in &respondents {
        let delivery = Delivery::Send {
            chat_id: respondent.telegram_id,
        };
        match state
            .sequencer
            .present(survey.id, FIRST_QUESTION_INDEX, delivery)
            .await
        {
            Ok(_) => notified += 1,
            Err(e) => warn!(
                %survey_id,
                respondent_id = %respondent.id,
                error = %e,
                "Failed to send first question"
            ),
        }
    }

    info!(%survey_id, notified, joined = respondents.len(), "Survey started");
    Ok(Json(serde_json::json!({ "success": true, "notified": notified })))
}

#[derive(Debug, Deserialize)]
struct CreateSurveyRequest {
    title: String,
    #[serde(default)]
    questions: Vec<NewQuestion>,
}

#[derive(Debug, Deserialize)]
struct NewQuestion {
    title: String,
    options: Vec<String>,
}

impl CreateSurveyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::BadRequest("Survey title is required".into()));
        }
        for (n, question) in self.questions.iter().enumerate() {
            if question.title.trim().is_empty() {
                return Err(ApiError::BadRequest(format!(
                    "Question {} has no title",
                    n + 1
                )));
            }
            if question.options.iter().all(|o| o.trim().is_empty()) {
                return Err(ApiError::BadRequest(format!(
                    "Question {} has no options",
                    n + 1
                )));
            }
        }
        Ok(())
    }
}

/// POST /api/telegram/survey/create
///
/// Creates a NOT_STARTED survey owned by the caller with a fresh join code.
async fn create_survey(
    State(state): State<ApiState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(body): Json<CreateSurveyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;

    let code = allocate_code(state.db.as_ref()).await?;
    let survey = Survey::new(&code, &admin.admin_id, body.title.trim());

    let questions: Vec<SurveyQuestion> = (FIRST_QUESTION_INDEX..)
        .zip(&body.questions)
        .map(|(index, question)| {
            let options: Vec<&str> = question
                .options
                .iter()
                .map(|o| o.trim())
                .filter(|o| !o.is_empty())
                .collect();
            SurveyQuestion::new(survey.id, index, question.title.trim(), &options)
        })
        .collect();
    state
        .db
        .insert_survey_with_questions(&survey, &questions)
        .await?;

    info!(
        survey_id = %survey.id,
        code = %survey.short_id,
        questions = questions.len(),
        admin_id = %admin.admin_id,
        "Survey created"
    );

    let details = SurveyDetails {
        status_label: locale::survey_status_label(survey.status),
        survey,
        respondents: Vec::new(),
        questions,
    };
    Ok((StatusCode::CREATED, Json(details)))
}

async fn allocate_code(db: &dyn Database) -> Result<String, ApiError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_short_code(&mut rand::thread_rng());
        if !db.survey_code_in_use(&code).await? {
            return Ok(code);
        }
    }
    Err(ApiError::Conflict("No free survey code available".into()))
}
