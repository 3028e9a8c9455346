//! Surveys: domain model, callback payloads and question sequencing.

pub mod callback;
pub mod code;
pub mod model;
pub mod sequencer;

pub use callback::CallbackData;
pub use code::generate_short_code;
pub use model::{
    OptionContext, Respondent, RespondentAnswer, Survey, SurveyDetails, SurveyQuestion,
    SurveyQuestionOption, SurveyStatus,
};
pub use sequencer::{FIRST_QUESTION_INDEX, Presented, QuestionSequencer};
