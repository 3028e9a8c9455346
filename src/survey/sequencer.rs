//! Question sequencer: decides what a respondent sees next.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::channels::{Delivery, InlineButton, Messenger, Reply};
use crate::error::Error;
use crate::locale;
use crate::store::Database;
use crate::survey::callback::CallbackData;
use crate::survey::model::SurveyQuestion;

/// Index of the first question of every survey.
pub const FIRST_QUESTION_INDEX: i64 = 1;

/// What the sequencer rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Question { index: i64 },
    Completed,
}

/// Presents survey questions in index order through a `Messenger`.
#[derive(Clone)]
pub struct QuestionSequencer {
    db: Arc<dyn Database>,
    messenger: Arc<dyn Messenger>,
}

impl QuestionSequencer {
    pub fn new(db: Arc<dyn Database>, messenger: Arc<dyn Messenger>) -> Self {
        Self { db, messenger }
    }

    /// Present the lowest-index question with `index >= from_index`, or the
    /// completion message when the survey has none left.
    pub async fn present(
        &self,
        survey_id: Uuid,
        from_index: i64,
        delivery: Delivery,
    ) -> Result<Presented, Error> {
        let Some(question) = self.db.first_question_from(survey_id, from_index).await? else {
            return self.complete(delivery).await;
        };

        let index = question.index;
        self.messenger
            .deliver(delivery, &question_reply(&question)?)
            .await?;
        debug!(%survey_id, index, ?delivery, "Question presented");
        Ok(Presented::Question { index })
    }

    /// Show the completion message.
    pub async fn complete(&self, delivery: Delivery) -> Result<Presented, Error> {
        self.messenger
            .deliver(delivery, &Reply::text(locale::SURVEY_COMPLETED))
            .await?;
        debug!(?delivery, "Survey completed");
        Ok(Presented::Completed)
    }
}

/// Render a question as text plus one button per option, one option per row.
pub fn question_reply(question: &SurveyQuestion) -> Result<Reply, Error> {
    let keyboard = question
        .options
        .iter()
        .map(|option| -> Result<Vec<InlineButton>, Error> {
            let callback_data = CallbackData::QuestionReply {
                option_id: option.id,
            }
            .encode()?;
            Ok(vec![InlineButton {
                text: option.value.clone(),
                callback_data,
            }])
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Reply::text(locale::question_prompt(question.index, &question.title)).with_keyboard(keyboard))
}
