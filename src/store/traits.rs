//! `Database` trait: single async interface for all survey persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::survey::model::{
    OptionContext, Respondent, RespondentAnswer, Survey, SurveyDetails, SurveyQuestion,
    SurveyStatus,
};

/// Backend-agnostic database trait covering surveys, respondents and answers.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Admin identity ──────────────────────────────────────────────

    /// Register (or re-point) a bearer token for an administrator.
    async fn upsert_admin_token(&self, token: &str, admin_id: &str) -> Result<(), DatabaseError>;

    /// Resolve a bearer token to the administrator it belongs to.
    async fn find_admin_by_token(&self, token: &str) -> Result<Option<String>, DatabaseError>;

    // ── Surveys ─────────────────────────────────────────────────────

    /// Insert a survey row (no questions).
    async fn insert_survey(&self, survey: &Survey) -> Result<(), DatabaseError>;

    /// Insert a question together with its options.
    async fn insert_question(&self, question: &SurveyQuestion) -> Result<(), DatabaseError>;

    /// Insert a survey with all its questions and options, all or nothing.
    async fn insert_survey_with_questions(
        &self,
        survey: &Survey,
        questions: &[SurveyQuestion],
    ) -> Result<(), DatabaseError>;

    async fn get_survey(&self, id: Uuid) -> Result<Option<Survey>, DatabaseError>;

    /// Find a survey by its short code, restricted to one status.
    async fn find_survey_by_code(
        &self,
        short_id: &str,
        status: SurveyStatus,
    ) -> Result<Option<Survey>, DatabaseError>;

    /// Whether a short code is held by a survey that is not finished yet.
    async fn survey_code_in_use(&self, short_id: &str) -> Result<bool, DatabaseError>;

    async fn update_survey_status(
        &self,
        id: Uuid,
        status: SurveyStatus,
    ) -> Result<(), DatabaseError>;

    /// Set `to` only if the survey is currently `from`. Returns whether it changed.
    async fn transition_survey_status(
        &self,
        id: Uuid,
        from: SurveyStatus,
        to: SurveyStatus,
    ) -> Result<bool, DatabaseError>;

    /// All surveys owned by an administrator, newest first, with respondents
    /// and index-ordered questions.
    async fn list_surveys_for_admin(
        &self,
        admin_id: &str,
    ) -> Result<Vec<SurveyDetails>, DatabaseError>;

    /// Lowest-index question of a survey with `index >= min_index`, with options.
    async fn first_question_from(
        &self,
        survey_id: Uuid,
        min_index: i64,
    ) -> Result<Option<SurveyQuestion>, DatabaseError>;

    // ── Respondents ─────────────────────────────────────────────────

    async fn find_respondent_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Respondent>, DatabaseError>;

    /// Insert a respondent. A second row for the same Telegram account is a
    /// `DatabaseError::Constraint`.
    async fn insert_respondent(&self, respondent: &Respondent) -> Result<(), DatabaseError>;

    /// Whether the account already joined a survey with this code and status.
    async fn respondent_joined_survey(
        &self,
        telegram_id: i64,
        short_id: &str,
        status: SurveyStatus,
    ) -> Result<bool, DatabaseError>;

    /// Link a respondent to a survey. Linking twice is a no-op.
    async fn join_survey(&self, respondent_id: Uuid, survey_id: Uuid) -> Result<(), DatabaseError>;

    async fn list_survey_respondents(
        &self,
        survey_id: Uuid,
    ) -> Result<Vec<Respondent>, DatabaseError>;

    // ── Answers ─────────────────────────────────────────────────────

    /// Look up an option whose survey currently has `status`.
    async fn find_option_in_survey_with_status(
        &self,
        option_id: Uuid,
        status: SurveyStatus,
    ) -> Result<Option<OptionContext>, DatabaseError>;

    /// Record an answer. A second answer to the same question by the same
    /// respondent is a `DatabaseError::Constraint`.
    async fn insert_answer(&self, answer: &RespondentAnswer) -> Result<(), DatabaseError>;

    async fn list_answers_for_respondent(
        &self,
        respondent_id: Uuid,
    ) -> Result<Vec<RespondentAnswer>, DatabaseError>;
}
