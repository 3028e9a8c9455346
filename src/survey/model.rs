//! Survey domain types.
//!
//! Field names serialize in camelCase; the admin UI consumes them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a survey. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurveyStatus {
    NotStarted,
    InProgress,
    Finished,
}

impl SurveyStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }
}

impl std::fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SurveyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "FINISHED" => Ok(Self::Finished),
            other => Err(format!("unknown survey status: {other}")),
        }
    }
}

/// A survey owned by an administrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: Uuid,
    /// Four-character code respondents type after `/join`.
    pub short_id: String,
    /// Owning administrator.
    pub user_id: String,
    pub title: String,
    pub status: SurveyStatus,
    pub created_at: DateTime<Utc>,
}

impl Survey {
    pub fn new(short_id: &str, user_id: &str, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            short_id: short_id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: SurveyStatus::NotStarted,
            created_at: Utc::now(),
        }
    }
}

/// One question of a survey. `index` orders presentation and is unique per survey.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyQuestion {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub index: i64,
    pub title: String,
    pub options: Vec<SurveyQuestionOption>,
}

impl SurveyQuestion {
    /// Build a question with its options, positions assigned in order.
    pub fn new<S: AsRef<str>>(survey_id: Uuid, index: i64, title: &str, options: &[S]) -> Self {
        let id = Uuid::new_v4();
        let options = options
            .iter()
            .enumerate()
            .map(|(position, value)| SurveyQuestionOption {
                id: Uuid::new_v4(),
                question_id: id,
                value: value.as_ref().to_string(),
                position: position as i64,
            })
            .collect();
        Self {
            id,
            survey_id,
            index,
            title: title.to_string(),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyQuestionOption {
    pub id: Uuid,
    pub question_id: Uuid,
    /// Button text shown to the respondent.
    pub value: String,
    pub position: i64,
}

/// A person answering surveys through the bot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Respondent {
    pub id: Uuid,
    pub telegram_id: i64,
    pub second_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub created_at: DateTime<Utc>,
}

impl Respondent {
    pub fn new(telegram_id: i64, second_name: &str, first_name: &str, middle_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            telegram_id,
            second_name: second_name.to_string(),
            first_name: first_name.to_string(),
            middle_name: middle_name.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// The option a respondent picked for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentAnswer {
    pub id: Uuid,
    pub respondent_id: Uuid,
    pub option_id: Uuid,
    /// Denormalised from the option so (respondent, question) can be unique.
    pub question_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl RespondentAnswer {
    pub fn new(respondent_id: Uuid, option_id: Uuid, question_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            respondent_id,
            option_id,
            question_id,
            created_at: Utc::now(),
        }
    }
}

/// An option together with the question and survey it belongs to.
#[derive(Debug, Clone)]
pub struct OptionContext {
    pub option: SurveyQuestionOption,
    pub question_index: i64,
    pub survey: Survey,
}

/// A survey with everything the admin list view shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDetails {
    #[serde(flatten)]
    pub survey: Survey,
    /// Localized status text.
    pub status_label: &'static str,
    pub respondents: Vec<Respondent>,
    pub questions: Vec<SurveyQuestion>,
}
