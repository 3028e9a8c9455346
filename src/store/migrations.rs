//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS surveys (
                id TEXT PRIMARY KEY,
                short_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'NOT_STARTED',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_surveys_short_id ON surveys(short_id);
            CREATE INDEX IF NOT EXISTS idx_surveys_user ON surveys(user_id);

            CREATE TABLE IF NOT EXISTS survey_questions (
                id TEXT PRIMARY KEY,
                survey_id TEXT NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
                question_index INTEGER NOT NULL,
                title TEXT NOT NULL,
                UNIQUE (survey_id, question_index)
            );

            CREATE TABLE IF NOT EXISTS survey_question_options (
                id TEXT PRIMARY KEY,
                question_id TEXT NOT NULL REFERENCES survey_questions(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_options_question ON survey_question_options(question_id);

            CREATE TABLE IF NOT EXISTS respondents (
                id TEXT PRIMARY KEY,
                telegram_id INTEGER NOT NULL UNIQUE,
                second_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                middle_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS survey_respondents (
                survey_id TEXT NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
                respondent_id TEXT NOT NULL REFERENCES respondents(id) ON DELETE CASCADE,
                joined_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (survey_id, respondent_id)
            );

            CREATE TABLE IF NOT EXISTS respondent_answers (
                id TEXT PRIMARY KEY,
                respondent_id TEXT NOT NULL REFERENCES respondents(id) ON DELETE CASCADE,
                option_id TEXT NOT NULL REFERENCES survey_question_options(id) ON DELETE CASCADE,
                question_id TEXT NOT NULL REFERENCES survey_questions(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (respondent_id, question_id)
            );
            CREATE INDEX IF NOT EXISTS idx_answers_respondent ON respondent_answers(respondent_id);
        "#,
    },
    Migration {
        version: 2,
        name: "admin_tokens",
        sql: r#"
            CREATE TABLE IF NOT EXISTS admin_tokens (
                token TEXT PRIMARY KEY,
                admin_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_admin_tokens_admin ON admin_tokens(admin_id);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
