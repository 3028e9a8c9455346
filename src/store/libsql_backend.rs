//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Transaction, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::locale;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::survey::model::{
    OptionContext, Respondent, RespondentAnswer, Survey, SurveyDetails, SurveyQuestion,
    SurveyQuestionOption, SurveyStatus,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
///
/// Every write holds `write_lock`, and transactions hold it from BEGIN to
/// COMMIT, so no statement from another task lands inside an open transaction.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open a transaction. Callers must hold `write_lock` until it ends.
    async fn begin(&self, context: &str) -> Result<Transaction, DatabaseError> {
        self.conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context} begin: {e}")))
    }

    async fn load_options(
        &self,
        question_id: Uuid,
    ) -> Result<Vec<SurveyQuestionOption>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OPTION_COLUMNS} FROM survey_question_options WHERE question_id = ?1 ORDER BY position ASC, rowid ASC"
                ),
                params![question_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_options: {e}")))?;

        let mut options = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_options row: {e}")))?
        {
            options.push(row_to_option(&row, 0)?);
        }
        Ok(options)
    }

    async fn load_questions(&self, survey_id: Uuid) -> Result<Vec<SurveyQuestion>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {QUESTION_COLUMNS} FROM survey_questions WHERE survey_id = ?1 ORDER BY question_index ASC"
                ),
                params![survey_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_questions: {e}")))?;

        let mut questions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_questions row: {e}")))?
        {
            questions.push(row_to_question(&row)?);
        }
        for question in &mut questions {
            question.options = self.load_options(question.id).await?;
        }
        Ok(questions)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("bad uuid in {column}: {e}")))
}

fn row_err(context: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{context}: {e}"))
}

/// Map a write failure, keeping constraint violations distinguishable.
fn write_error(context: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("constraint failed") {
        DatabaseError::Constraint(format!("{context}: {message}"))
    } else {
        DatabaseError::Query(format!("{context}: {message}"))
    }
}

/// Commit on success, roll back on failure.
async fn finish_transaction(
    tx: Transaction,
    context: &str,
    result: Result<(), DatabaseError>,
) -> Result<(), DatabaseError> {
    match result {
        Ok(()) => tx
            .commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("{context} commit: {e}"))),
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(context, error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

async fn write_survey(conn: &Connection, survey: &Survey) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO surveys ({SURVEY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            survey.id.to_string(),
            survey.short_id.as_str(),
            survey.user_id.as_str(),
            survey.title.as_str(),
            survey.status.as_str(),
            survey.created_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| write_error("insert_survey", e))?;
    Ok(())
}

/// Question row plus its options.
async fn write_question(conn: &Connection, question: &SurveyQuestion) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO survey_questions ({QUESTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
        params![
            question.id.to_string(),
            question.survey_id.to_string(),
            question.index,
            question.title.as_str(),
        ],
    )
    .await
    .map_err(|e| write_error("insert_question", e))?;

    for option in &question.options {
        conn.execute(
            &format!(
                "INSERT INTO survey_question_options ({OPTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                option.id.to_string(),
                question.id.to_string(),
                option.value.as_str(),
                option.position,
            ],
        )
        .await
        .map_err(|e| write_error("insert_question option", e))?;
    }
    Ok(())
}

/// Map survey columns starting at `offset` (order of SURVEY_COLUMNS).
fn row_to_survey(row: &libsql::Row, offset: i32) -> Result<Survey, DatabaseError> {
    let get = row_err("survey row");
    let id: String = row.get(offset).map_err(&get)?;
    let status: String = row.get(offset + 4).map_err(&get)?;
    let created: String = row.get(offset + 5).map_err(&get)?;

    Ok(Survey {
        id: parse_uuid(&id, "surveys.id")?,
        short_id: row.get(offset + 1).map_err(&get)?,
        user_id: row.get(offset + 2).map_err(&get)?,
        title: row.get(offset + 3).map_err(&get)?,
        status: status.parse().map_err(DatabaseError::Query)?,
        created_at: parse_datetime(&created),
    })
}

/// Questions are returned without options; callers fill them in.
fn row_to_question(row: &libsql::Row) -> Result<SurveyQuestion, DatabaseError> {
    let get = row_err("question row");
    let id: String = row.get(0).map_err(&get)?;
    let survey_id: String = row.get(1).map_err(&get)?;

    Ok(SurveyQuestion {
        id: parse_uuid(&id, "survey_questions.id")?,
        survey_id: parse_uuid(&survey_id, "survey_questions.survey_id")?,
        index: row.get(2).map_err(&get)?,
        title: row.get(3).map_err(&get)?,
        options: Vec::new(),
    })
}

fn row_to_option(row: &libsql::Row, offset: i32) -> Result<SurveyQuestionOption, DatabaseError> {
    let get = row_err("option row");
    let id: String = row.get(offset).map_err(&get)?;
    let question_id: String = row.get(offset + 1).map_err(&get)?;

    Ok(SurveyQuestionOption {
        id: parse_uuid(&id, "survey_question_options.id")?,
        question_id: parse_uuid(&question_id, "survey_question_options.question_id")?,
        value: row.get(offset + 2).map_err(&get)?,
        position: row.get(offset + 3).map_err(&get)?,
    })
}

fn row_to_respondent(row: &libsql::Row) -> Result<Respondent, DatabaseError> {
    let get = row_err("respondent row");
    let id: String = row.get(0).map_err(&get)?;
    let created: String = row.get(5).map_err(&get)?;

    Ok(Respondent {
        id: parse_uuid(&id, "respondents.id")?,
        telegram_id: row.get(1).map_err(&get)?,
        second_name: row.get(2).map_err(&get)?,
        first_name: row.get(3).map_err(&get)?,
        middle_name: row.get(4).map_err(&get)?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_answer(row: &libsql::Row) -> Result<RespondentAnswer, DatabaseError> {
    let get = row_err("answer row");
    let id: String = row.get(0).map_err(&get)?;
    let respondent_id: String = row.get(1).map_err(&get)?;
    let option_id: String = row.get(2).map_err(&get)?;
    let question_id: String = row.get(3).map_err(&get)?;
    let created: String = row.get(4).map_err(&get)?;

    Ok(RespondentAnswer {
        id: parse_uuid(&id, "respondent_answers.id")?,
        respondent_id: parse_uuid(&respondent_id, "respondent_answers.respondent_id")?,
        option_id: parse_uuid(&option_id, "respondent_answers.option_id")?,
        question_id: parse_uuid(&question_id, "respondent_answers.question_id")?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const SURVEY_COLUMNS: &str = "id, short_id, user_id, title, status, created_at";

const QUESTION_COLUMNS: &str = "id, survey_id, question_index, title";

const OPTION_COLUMNS: &str = "id, question_id, value, position";

const RESPONDENT_COLUMNS: &str =
    "id, telegram_id, second_name, first_name, middle_name, created_at";

const ANSWER_COLUMNS: &str = "id, respondent_id, option_id, question_id, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Admin identity ──────────────────────────────────────────────

    async fn upsert_admin_token(&self, token: &str, admin_id: &str) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO admin_tokens (token, admin_id) VALUES (?1, ?2)
                 ON CONFLICT(token) DO UPDATE SET admin_id = excluded.admin_id",
                params![token, admin_id],
            )
            .await
            .map_err(|e| write_error("upsert_admin_token", e))?;
        debug!(admin_id, "Admin token registered");
        Ok(())
    }

    async fn find_admin_by_token(&self, token: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT admin_id FROM admin_tokens WHERE token = ?1",
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_admin_by_token: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get(0).map_err(row_err("find_admin_by_token"))?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_admin_by_token: {e}"))),
        }
    }

    // ── Surveys ─────────────────────────────────────────────────────

    async fn insert_survey(&self, survey: &Survey) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        write_survey(self.conn(), survey).await?;

        debug!(survey_id = %survey.id, short_id = %survey.short_id, "Survey inserted");
        Ok(())
    }

    async fn insert_question(&self, question: &SurveyQuestion) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self.begin("insert_question").await?;
        let result = write_question(&tx, question).await;
        finish_transaction(tx, "insert_question", result).await?;

        debug!(
            question_id = %question.id,
            survey_id = %question.survey_id,
            index = question.index,
            options = question.options.len(),
            "Question inserted"
        );
        Ok(())
    }

    async fn insert_survey_with_questions(
        &self,
        survey: &Survey,
        questions: &[SurveyQuestion],
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self.begin("insert_survey_with_questions").await?;
        let result = async {
            write_survey(&tx, survey).await?;
            for question in questions {
                write_question(&tx, question).await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;
        finish_transaction(tx, "insert_survey_with_questions", result).await?;

        debug!(
            survey_id = %survey.id,
            short_id = %survey.short_id,
            questions = questions.len(),
            "Survey inserted with questions"
        );
        Ok(())
    }

    async fn get_survey(&self, id: Uuid) -> Result<Option<Survey>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SURVEY_COLUMNS} FROM surveys WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_survey: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_survey(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_survey: {e}"))),
        }
    }

    async fn find_survey_by_code(
        &self,
        short_id: &str,
        status: SurveyStatus,
    ) -> Result<Option<Survey>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SURVEY_COLUMNS} FROM surveys WHERE short_id = ?1 AND status = ?2 ORDER BY created_at DESC LIMIT 1"
                ),
                params![short_id, status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_survey_by_code: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_survey(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_survey_by_code: {e}"))),
        }
    }

    async fn survey_code_in_use(&self, short_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM surveys WHERE short_id = ?1 AND status != ?2",
                params![short_id, SurveyStatus::Finished.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("survey_code_in_use: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(row_err("survey_code_in_use"))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("survey_code_in_use: {e}"))),
        }
    }

    async fn update_survey_status(
        &self,
        id: Uuid,
        status: SurveyStatus,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let updated = self
            .conn()
            .execute(
                "UPDATE surveys SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| write_error("update_survey_status", e))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "survey".into(),
                id: id.to_string(),
            });
        }

        debug!(survey_id = %id, status = %status, "Survey status updated");
        Ok(())
    }

    async fn transition_survey_status(
        &self,
        id: Uuid,
        from: SurveyStatus,
        to: SurveyStatus,
    ) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let updated = self
            .conn()
            .execute(
                "UPDATE surveys SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id.to_string(), from.as_str()],
            )
            .await
            .map_err(|e| write_error("transition_survey_status", e))?;

        debug!(survey_id = %id, %from, %to, applied = updated > 0, "Survey status transition");
        Ok(updated > 0)
    }

    async fn list_surveys_for_admin(
        &self,
        admin_id: &str,
    ) -> Result<Vec<SurveyDetails>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SURVEY_COLUMNS} FROM surveys WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ),
                params![admin_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_surveys_for_admin: {e}")))?;

        let mut surveys = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_surveys_for_admin row: {e}")))?
        {
            surveys.push(row_to_survey(&row, 0)?);
        }

        let mut details = Vec::with_capacity(surveys.len());
        for survey in surveys {
            let respondents = self.list_survey_respondents(survey.id).await?;
            let questions = self.load_questions(survey.id).await?;
            details.push(SurveyDetails {
                status_label: locale::survey_status_label(survey.status),
                survey,
                respondents,
                questions,
            });
        }
        Ok(details)
    }

    async fn first_question_from(
        &self,
        survey_id: Uuid,
        min_index: i64,
    ) -> Result<Option<SurveyQuestion>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {QUESTION_COLUMNS} FROM survey_questions
                     WHERE survey_id = ?1 AND question_index >= ?2
                     ORDER BY question_index ASC LIMIT 1"
                ),
                params![survey_id.to_string(), min_index],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("first_question_from: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("first_question_from row: {e}")))?;

        match row {
            Some(row) => {
                let mut question = row_to_question(&row)?;
                question.options = self.load_options(question.id).await?;
                Ok(Some(question))
            }
            None => Ok(None),
        }
    }

    // ── Respondents ─────────────────────────────────────────────────

    async fn find_respondent_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Respondent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RESPONDENT_COLUMNS} FROM respondents WHERE telegram_id = ?1"),
                params![telegram_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_respondent_by_telegram_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_respondent(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "find_respondent_by_telegram_id: {e}"
            ))),
        }
    }

    async fn insert_respondent(&self, respondent: &Respondent) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO respondents ({RESPONDENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    respondent.id.to_string(),
                    respondent.telegram_id,
                    respondent.second_name.as_str(),
                    respondent.first_name.as_str(),
                    respondent.middle_name.as_str(),
                    respondent.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_respondent", e))?;

        debug!(respondent_id = %respondent.id, telegram_id = respondent.telegram_id, "Respondent inserted");
        Ok(())
    }

    async fn respondent_joined_survey(
        &self,
        telegram_id: i64,
        short_id: &str,
        status: SurveyStatus,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM survey_respondents sr
                 JOIN respondents r ON r.id = sr.respondent_id
                 JOIN surveys s ON s.id = sr.survey_id
                 WHERE r.telegram_id = ?1 AND s.short_id = ?2 AND s.status = ?3",
                params![telegram_id, short_id, status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("respondent_joined_survey: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(row_err("respondent_joined_survey"))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("respondent_joined_survey: {e}"))),
        }
    }

    async fn join_survey(&self, respondent_id: Uuid, survey_id: Uuid) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO survey_respondents (survey_id, respondent_id) VALUES (?1, ?2)",
                params![survey_id.to_string(), respondent_id.to_string()],
            )
            .await
            .map_err(|e| write_error("join_survey", e))?;

        debug!(%respondent_id, %survey_id, "Respondent joined survey");
        Ok(())
    }

    async fn list_survey_respondents(
        &self,
        survey_id: Uuid,
    ) -> Result<Vec<Respondent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT r.id, r.telegram_id, r.second_name, r.first_name, r.middle_name, r.created_at
                 FROM respondents r
                 JOIN survey_respondents sr ON sr.respondent_id = r.id
                 WHERE sr.survey_id = ?1
                 ORDER BY sr.joined_at ASC, r.second_name ASC",
                params![survey_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_survey_respondents: {e}")))?;

        let mut respondents = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_survey_respondents row: {e}")))?
        {
            respondents.push(row_to_respondent(&row)?);
        }
        Ok(respondents)
    }

    // ── Answers ─────────────────────────────────────────────────────

    async fn find_option_in_survey_with_status(
        &self,
        option_id: Uuid,
        status: SurveyStatus,
    ) -> Result<Option<OptionContext>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT o.id, o.question_id, o.value, o.position, q.question_index,
                        s.id, s.short_id, s.user_id, s.title, s.status, s.created_at
                 FROM survey_question_options o
                 JOIN survey_questions q ON q.id = o.question_id
                 JOIN surveys s ON s.id = q.survey_id
                 WHERE o.id = ?1 AND s.status = ?2",
                params![option_id.to_string(), status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_option_in_survey_with_status: {e}")))?;

        let row = rows.next().await.map_err(|e| {
            DatabaseError::Query(format!("find_option_in_survey_with_status row: {e}"))
        })?;

        match row {
            Some(row) => Ok(Some(OptionContext {
                option: row_to_option(&row, 0)?,
                question_index: row
                    .get(4)
                    .map_err(row_err("find_option_in_survey_with_status"))?,
                survey: row_to_survey(&row, 5)?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_answer(&self, answer: &RespondentAnswer) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                &format!("INSERT INTO respondent_answers ({ANSWER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    answer.id.to_string(),
                    answer.respondent_id.to_string(),
                    answer.option_id.to_string(),
                    answer.question_id.to_string(),
                    answer.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_answer", e))?;

        debug!(
            respondent_id = %answer.respondent_id,
            option_id = %answer.option_id,
            "Answer recorded"
        );
        Ok(())
    }

    async fn list_answers_for_respondent(
        &self,
        respondent_id: Uuid,
    ) -> Result<Vec<RespondentAnswer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM respondent_answers WHERE respondent_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![respondent_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_answers_for_respondent: {e}")))?;

        let mut answers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_answers_for_respondent row: {e}")))?
        {
            answers.push(row_to_answer(&row)?);
        }
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    /// Survey with questions at the given indices, two options each.
    async fn seed_survey(db: &LibSqlBackend, code: &str, indices: &[i64]) -> (Survey, Vec<SurveyQuestion>) {
        let survey = Survey::new(code, "admin-1", "Feedback");
        db.insert_survey(&survey).await.unwrap();
        let mut questions = Vec::new();
        for &index in indices {
            let q = SurveyQuestion::new(survey.id, index, &format!("Q{index}"), &["Yes", "No"]);
            db.insert_question(&q).await.unwrap();
            questions.push(q);
        }
        (survey, questions)
    }

    // ── Admin tokens ────────────────────────────────────────────────

    #[tokio::test]
    async fn admin_token_lookup() {
        let db = test_db().await;
        db.upsert_admin_token("secret", "admin-1").await.unwrap();

        assert_eq!(
            db.find_admin_by_token("secret").await.unwrap().as_deref(),
            Some("admin-1")
        );
        assert!(db.find_admin_by_token("other").await.unwrap().is_none());

        db.upsert_admin_token("secret", "admin-2").await.unwrap();
        assert_eq!(
            db.find_admin_by_token("secret").await.unwrap().as_deref(),
            Some("admin-2")
        );
    }

    // ── Surveys ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_survey() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[]).await;

        let fetched = db.get_survey(survey.id).await.unwrap().unwrap();
        assert_eq!(fetched.short_id, "AB12");
        assert_eq!(fetched.status, SurveyStatus::NotStarted);
        assert!(db.get_survey(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_code_filters_status() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[]).await;

        assert!(
            db.find_survey_by_code("AB12", SurveyStatus::NotStarted)
                .await
                .unwrap()
                .is_some()
        );
        db.update_survey_status(survey.id, SurveyStatus::InProgress)
            .await
            .unwrap();
        assert!(
            db.find_survey_by_code("AB12", SurveyStatus::NotStarted)
                .await
                .unwrap()
                .is_none()
        );
        assert!(db.survey_code_in_use("AB12").await.unwrap());

        db.update_survey_status(survey.id, SurveyStatus::Finished)
            .await
            .unwrap();
        assert!(!db.survey_code_in_use("AB12").await.unwrap());
    }

    #[tokio::test]
    async fn update_status_of_missing_survey_is_not_found() {
        let db = test_db().await;
        let result = db
            .update_survey_status(Uuid::new_v4(), SurveyStatus::Finished)
            .await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn first_question_from_picks_smallest_index_at_or_above() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[3, 1, 7]).await;

        let q = db.first_question_from(survey.id, 1).await.unwrap().unwrap();
        assert_eq!(q.index, 1);
        assert_eq!(q.options.len(), 2);
        assert_eq!(q.options[0].value, "Yes");

        let q = db.first_question_from(survey.id, 2).await.unwrap().unwrap();
        assert_eq!(q.index, 3);

        let q = db.first_question_from(survey.id, 7).await.unwrap().unwrap();
        assert_eq!(q.index, 7);

        assert!(db.first_question_from(survey.id, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn question_index_unique_per_survey() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[1]).await;

        let dup = SurveyQuestion::new(survey.id, 1, "again", &["x"]);
        let result = db.insert_question(&dup).await;
        assert!(matches!(result, Err(DatabaseError::Constraint(_))));
    }

    #[tokio::test]
    async fn survey_with_questions_is_all_or_nothing() {
        let db = test_db().await;
        let survey = Survey::new("AB12", "admin-1", "Atomic");
        let questions = vec![
            SurveyQuestion::new(survey.id, 1, "Q1", &["Yes", "No"]),
            SurveyQuestion::new(survey.id, 1, "Q1 again", &["Yes"]),
        ];

        let result = db.insert_survey_with_questions(&survey, &questions).await;
        assert!(matches!(result, Err(DatabaseError::Constraint(_))));
        assert!(db.get_survey(survey.id).await.unwrap().is_none());
        assert!(db.first_question_from(survey.id, 1).await.unwrap().is_none());
        assert!(!db.survey_code_in_use("AB12").await.unwrap());

        let questions = vec![
            SurveyQuestion::new(survey.id, 1, "Q1", &["Yes", "No"]),
            SurveyQuestion::new(survey.id, 2, "Q2", &["Yes"]),
        ];
        db.insert_survey_with_questions(&survey, &questions)
            .await
            .unwrap();
        let second = db.first_question_from(survey.id, 2).await.unwrap().unwrap();
        assert_eq!(second.options.len(), 1);
    }

    #[tokio::test]
    async fn transition_applies_only_from_expected_status() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[]).await;
        db.update_survey_status(survey.id, SurveyStatus::Finished)
            .await
            .unwrap();

        let moved = db
            .transition_survey_status(survey.id, SurveyStatus::NotStarted, SurveyStatus::InProgress)
            .await
            .unwrap();
        assert!(!moved);
        assert_eq!(
            db.get_survey(survey.id).await.unwrap().unwrap().status,
            SurveyStatus::Finished
        );

        let (other, _) = seed_survey(&db, "CD34", &[]).await;
        assert!(
            db.transition_survey_status(other.id, SurveyStatus::NotStarted, SurveyStatus::InProgress)
                .await
                .unwrap()
        );
        assert!(
            !db.transition_survey_status(other.id, SurveyStatus::NotStarted, SurveyStatus::InProgress)
                .await
                .unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_writers_share_one_connection() {
        let db = Arc::new(test_db().await);
        let respondent = Respondent::new(1, "Иванов", "Иван", "Иванович");
        db.insert_respondent(&respondent).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..48 {
            let db = Arc::clone(&db);
            let respondent_id = respondent.id;
            handles.push(tokio::spawn(async move {
                let survey = Survey::new(&format!("{n:04}"), "admin-1", "Load");
                let questions: Vec<_> = (1..=3)
                    .map(|i| SurveyQuestion::new(survey.id, i, &format!("Q{i}"), &["Yes", "No"]))
                    .collect();
                db.insert_survey_with_questions(&survey, &questions).await?;
                for i in 4..=6 {
                    db.insert_question(&SurveyQuestion::new(survey.id, i, "extra", &["x"]))
                        .await?;
                }
                let q = &questions[0];
                db.insert_answer(&RespondentAnswer::new(respondent_id, q.options[0].id, q.id))
                    .await?;
                Ok::<Uuid, DatabaseError>(survey.id)
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }

        for id in ids {
            assert_eq!(db.first_question_from(id, 6).await.unwrap().unwrap().index, 6);
        }
        assert_eq!(
            db.list_answers_for_respondent(respondent.id).await.unwrap().len(),
            48
        );
    }

    #[tokio::test]
    async fn list_surveys_newest_first_with_details() {
        let db = test_db().await;
        let (older, _) = seed_survey(&db, "OLD1", &[2, 1]).await;
        let (newer, _) = seed_survey(&db, "NEW1", &[]).await;
        let foreign = Survey::new("ZZZZ", "admin-2", "Other");
        db.insert_survey(&foreign).await.unwrap();

        let respondent = Respondent::new(42, "Иванов", "Иван", "Иванович");
        db.insert_respondent(&respondent).await.unwrap();
        db.join_survey(respondent.id, older.id).await.unwrap();

        let list = db.list_surveys_for_admin("admin-1").await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].survey.id, newer.id);
        assert_eq!(list[1].survey.id, older.id);

        let indices: Vec<i64> = list[1].questions.iter().map(|q| q.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(list[1].respondents.len(), 1);
        assert_eq!(list[1].status_label, "Не начато");
    }

    // ── Respondents ─────────────────────────────────────────────────

    #[tokio::test]
    async fn respondent_telegram_id_is_unique() {
        let db = test_db().await;
        let first = Respondent::new(42, "Иванов", "Иван", "Иванович");
        db.insert_respondent(&first).await.unwrap();

        let second = Respondent::new(42, "Петров", "Пётр", "Петрович");
        let result = db.insert_respondent(&second).await;
        assert!(matches!(result, Err(DatabaseError::Constraint(_))));

        let found = db.find_respondent_by_telegram_id(42).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(db.find_respondent_by_telegram_id(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn join_is_idempotent_and_visible() {
        let db = test_db().await;
        let (survey, _) = seed_survey(&db, "AB12", &[]).await;
        let respondent = Respondent::new(42, "Иванов", "Иван", "Иванович");
        db.insert_respondent(&respondent).await.unwrap();

        assert!(
            !db.respondent_joined_survey(42, "AB12", SurveyStatus::NotStarted)
                .await
                .unwrap()
        );
        db.join_survey(respondent.id, survey.id).await.unwrap();
        db.join_survey(respondent.id, survey.id).await.unwrap();

        assert!(
            db.respondent_joined_survey(42, "AB12", SurveyStatus::NotStarted)
                .await
                .unwrap()
        );
        assert!(
            !db.respondent_joined_survey(42, "AB12", SurveyStatus::InProgress)
                .await
                .unwrap()
        );
        assert_eq!(db.list_survey_respondents(survey.id).await.unwrap().len(), 1);
    }

    // ── Answers ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn option_lookup_requires_status() {
        let db = test_db().await;
        let (survey, questions) = seed_survey(&db, "AB12", &[4]).await;
        let option_id = questions[0].options[1].id;

        assert!(
            db.find_option_in_survey_with_status(option_id, SurveyStatus::InProgress)
                .await
                .unwrap()
                .is_none()
        );

        db.update_survey_status(survey.id, SurveyStatus::InProgress)
            .await
            .unwrap();
        let ctx = db
            .find_option_in_survey_with_status(option_id, SurveyStatus::InProgress)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.option.value, "No");
        assert_eq!(ctx.question_index, 4);
        assert_eq!(ctx.survey.id, survey.id);
    }

    #[tokio::test]
    async fn second_answer_to_same_question_is_constraint() {
        let db = test_db().await;
        let (_, questions) = seed_survey(&db, "AB12", &[1]).await;
        let respondent = Respondent::new(42, "Иванов", "Иван", "Иванович");
        db.insert_respondent(&respondent).await.unwrap();
        let q = &questions[0];

        db.insert_answer(&RespondentAnswer::new(respondent.id, q.options[0].id, q.id))
            .await
            .unwrap();
        let dup = db
            .insert_answer(&RespondentAnswer::new(respondent.id, q.options[1].id, q.id))
            .await;
        assert!(matches!(dup, Err(DatabaseError::Constraint(_))));

        let answers = db.list_answers_for_respondent(respondent.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].option_id, q.options[0].id);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("survey.db");

        let survey_id = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            let survey = Survey::new("AB12", "admin-1", "Persisted");
            db.insert_survey(&survey).await.unwrap();
            survey.id
        };

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let survey = db.get_survey(survey_id).await.unwrap().unwrap();
        assert_eq!(survey.title, "Persisted");
    }
}
