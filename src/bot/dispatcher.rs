//! Command dispatcher. Turns inbound bot updates into survey actions.
//!
//! Validation failures become localized replies and an outcome value; only
//! gateway failures (store, Telegram) surface as `Err`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bot::command::{BotCommand, parse_full_name, parse_survey_code};
use crate::channels::{BotUpdate, CallbackQuery, Messenger, Reply};
use crate::error::{DatabaseError, Error};
use crate::locale;
use crate::store::Database;
use crate::survey::{
    CallbackData, Presented, QuestionSequencer, Respondent, RespondentAnswer, SurveyStatus,
};

/// Result of `/auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    AlreadyAuthenticated,
    InvalidName,
}

/// Result of `/join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { code: String },
    NotAuthenticated,
    InvalidCode,
    AlreadyJoined { code: String },
    SurveyNotFound { code: String },
}

/// Why an answer callback was dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingPayload,
    MalformedPayload,
    /// Option unknown or its survey is not in progress.
    OptionUnavailable,
    UnknownRespondent,
}

/// Result of an answer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Ignored(IgnoreReason),
    /// Answer stored (or already present) and the next step presented.
    Recorded { duplicate: bool, next: Presented },
}

/// Handles inbound updates for one bot.
#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<dyn Database>,
    messenger: Arc<dyn Messenger>,
    sequencer: QuestionSequencer,
}

impl Dispatcher {
    pub fn new(db: Arc<dyn Database>, messenger: Arc<dyn Messenger>) -> Self {
        let sequencer = QuestionSequencer::new(Arc::clone(&db), Arc::clone(&messenger));
        Self {
            db,
            messenger,
            sequencer,
        }
    }

    /// Route one update to its handler.
    pub async fn handle(&self, update: BotUpdate) -> Result<(), Error> {
        match update {
            BotUpdate::Message {
                chat_id,
                from_id,
                text,
            } => match BotCommand::parse(&text) {
                Some(BotCommand::Start) => self.start(chat_id).await,
                Some(BotCommand::Auth(args)) => {
                    self.authenticate(chat_id, from_id, args).await.map(drop)
                }
                Some(BotCommand::Join(args)) => self.join(chat_id, from_id, args).await.map(drop),
                Some(BotCommand::Unknown(name)) => {
                    debug!(command = name, from_id, "Ignoring unknown command");
                    Ok(())
                }
                None => {
                    debug!(from_id, "Ignoring non-command message");
                    Ok(())
                }
            },
            BotUpdate::CallbackQuery(query) => {
                if let Err(e) = self.messenger.answer_callback(&query.id).await {
                    warn!(callback_id = %query.id, error = %e, "Failed to acknowledge callback");
                }
                self.answer(&query).await.map(drop)
            }
        }
    }

    /// `/start`: explain how to authenticate.
    pub async fn start(&self, chat_id: i64) -> Result<(), Error> {
        self.reply(chat_id, locale::START_PROMPT).await
    }

    /// `/auth <second> <first> <middle>`: register the account as a respondent.
    pub async fn authenticate(
        &self,
        chat_id: i64,
        from_id: i64,
        args: &str,
    ) -> Result<AuthOutcome, Error> {
        if self.db.find_respondent_by_telegram_id(from_id).await?.is_some() {
            self.reply(chat_id, locale::ALREADY_AUTHENTICATED).await?;
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        let Some(name) = parse_full_name(args) else {
            self.reply(chat_id, locale::INVALID_FULL_NAME).await?;
            return Ok(AuthOutcome::InvalidName);
        };

        let respondent = Respondent::new(
            from_id,
            &name.second_name,
            &name.first_name,
            &name.middle_name,
        );
        match self.db.insert_respondent(&respondent).await {
            Ok(()) => {}
            // Lost a race with a concurrent /auth from the same account.
            Err(DatabaseError::Constraint(_)) => {
                self.reply(chat_id, locale::ALREADY_AUTHENTICATED).await?;
                return Ok(AuthOutcome::AlreadyAuthenticated);
            }
            Err(e) => return Err(e.into()),
        }

        info!(respondent_id = %respondent.id, telegram_id = from_id, "Respondent authenticated");
        self.reply(chat_id, locale::AUTHENTICATED).await?;
        Ok(AuthOutcome::Authenticated)
    }

    /// `/join <CODE>`: link the respondent to a survey that has not started.
    pub async fn join(&self, chat_id: i64, from_id: i64, args: &str) -> Result<JoinOutcome, Error> {
        let Some(respondent) = self.db.find_respondent_by_telegram_id(from_id).await? else {
            self.reply(chat_id, locale::NOT_AUTHENTICATED).await?;
            return Ok(JoinOutcome::NotAuthenticated);
        };

        let Some(code) = parse_survey_code(args) else {
            self.reply(chat_id, locale::INVALID_SURVEY_CODE).await?;
            return Ok(JoinOutcome::InvalidCode);
        };
        let code = code.to_string();

        if self
            .db
            .respondent_joined_survey(from_id, &code, SurveyStatus::NotStarted)
            .await?
        {
            self.reply(chat_id, &locale::already_joined(&code)).await?;
            return Ok(JoinOutcome::AlreadyJoined { code });
        }

        let Some(survey) = self
            .db
            .find_survey_by_code(&code, SurveyStatus::NotStarted)
            .await?
        else {
            self.reply(chat_id, &locale::survey_not_found(&code)).await?;
            return Ok(JoinOutcome::SurveyNotFound { code });
        };

        self.db.join_survey(respondent.id, survey.id).await?;
        info!(respondent_id = %respondent.id, survey_id = %survey.id, code = %code, "Respondent joined survey");
        self.reply(chat_id, &locale::joined(&code)).await?;
        Ok(JoinOutcome::Joined { code })
    }

    /// Inline-button press: record the chosen option and move to the next question.
    pub async fn answer(&self, query: &CallbackQuery) -> Result<AnswerOutcome, Error> {
        let Some(raw) = query.data.as_deref() else {
            return Ok(AnswerOutcome::Ignored(IgnoreReason::MissingPayload));
        };

        let option_id = match CallbackData::decode(raw) {
            Ok(CallbackData::QuestionReply { option_id }) => option_id,
            Err(e) => {
                debug!(from_id = query.from_id, error = %e, "Ignoring undecodable callback");
                return Ok(AnswerOutcome::Ignored(IgnoreReason::MalformedPayload));
            }
        };

        let Some(option) = self
            .db
            .find_option_in_survey_with_status(option_id, SurveyStatus::InProgress)
            .await?
        else {
            debug!(%option_id, "Ignoring answer for unavailable option");
            return Ok(AnswerOutcome::Ignored(IgnoreReason::OptionUnavailable));
        };

        let Some(respondent) = self.db.find_respondent_by_telegram_id(query.from_id).await? else {
            debug!(from_id = query.from_id, "Ignoring answer from unknown respondent");
            return Ok(AnswerOutcome::Ignored(IgnoreReason::UnknownRespondent));
        };

        let answer = RespondentAnswer::new(respondent.id, option.option.id, option.option.question_id);
        let duplicate = match self.db.insert_answer(&answer).await {
            Ok(()) => false,
            Err(DatabaseError::Constraint(reason)) => {
                warn!(
                    respondent_id = %respondent.id,
                    question_id = %option.option.question_id,
                    %reason,
                    "Duplicate answer ignored"
                );
                true
            }
            Err(e) => return Err(e.into()),
        };

        // No question can follow the largest representable index.
        let next = match option.question_index.checked_add(1) {
            Some(from_index) => {
                self.sequencer
                    .present(option.survey.id, from_index, query.reply_delivery())
                    .await?
            }
            None => self.sequencer.complete(query.reply_delivery()).await?,
        };

        Ok(AnswerOutcome::Recorded { duplicate, next })
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), Error> {
        self.messenger
            .send_message(chat_id, &Reply::text(text))
            .await?;
        Ok(())
    }
}
