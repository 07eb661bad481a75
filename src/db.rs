use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Row};
use uuid::Uuid;

use crate::models::{CardProgress, SessionRecord, StudyMode};

fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for CardProgress {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(CardProgress {
            card_id: uuid_column(row, "card_id")?,
            deck_id: uuid_column(row, "deck_id")?,
            user_id: uuid_column(row, "user_id")?,
            ease_factor: row.try_get("ease_factor")?,
            interval_days: row.try_get("interval_days")?,
            review_count: row.try_get("review_count")?,
            correct_count: row.try_get("correct_count")?,
            mastery_level: row.try_get("mastery_level")?,
            last_reviewed_at: row.try_get("last_reviewed_at")?,
            next_review_at: row.try_get("next_review_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for SessionRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mode_raw: String = row.try_get("mode")?;
        let mode = StudyMode::parse(&mode_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "mode".to_string(),
            source: format!("unknown study mode {mode_raw}").into(),
        })?;
        let outcomes_raw: String = row.try_get("outcomes")?;
        let outcomes =
            serde_json::from_str(&outcomes_raw).map_err(|e| sqlx::Error::ColumnDecode {
                index: "outcomes".to_string(),
                source: Box::new(e),
            })?;
        Ok(SessionRecord {
            session_id: uuid_column(row, "session_id")?,
            deck_id: uuid_column(row, "deck_id")?,
            user_id: uuid_column(row, "user_id")?,
            mode,
            duration_seconds: row.try_get("duration_seconds")?,
            cards_studied: row.try_get("cards_studied")?,
            cards_correct: row.try_get("cards_correct")?,
            accuracy: row.try_get("accuracy")?,
            outcomes,
            finished_at: row.try_get("finished_at")?,
        })
    }
}

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options).await?;

        let db = Db { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Single-connection in-memory store for tests; a pooled :memory:
    /// database would give every connection its own empty schema.
    #[cfg(test)]
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Db { pool };
        db.migrate().await?;

        Ok(db)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS card_progress (
                card_id TEXT NOT NULL,
                deck_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                correct_count INTEGER NOT NULL DEFAULT 0,
                mastery_level INTEGER NOT NULL DEFAULT 0,
                last_reviewed_at DATETIME NOT NULL,
                next_review_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, deck_id, card_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_card_progress_due
                ON card_progress (user_id, deck_id, next_review_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS study_sessions (
                session_id TEXT PRIMARY KEY,
                deck_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                cards_studied INTEGER NOT NULL,
                cards_correct INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                outcomes TEXT NOT NULL,
                finished_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn progress_for_deck(
        &self,
        user_id: Uuid,
        deck_id: Uuid,
    ) -> Result<Vec<CardProgress>, sqlx::Error> {
        sqlx::query_as::<_, CardProgress>(
            "SELECT * FROM card_progress WHERE user_id = ? AND deck_id = ?",
        )
        .bind(user_id.to_string())
        .bind(deck_id.to_string())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn progress_for_card(
        &self,
        user_id: Uuid,
        deck_id: Uuid,
        card_id: Uuid,
    ) -> Result<Option<CardProgress>, sqlx::Error> {
        sqlx::query_as::<_, CardProgress>(
            "SELECT * FROM card_progress WHERE user_id = ? AND deck_id = ? AND card_id = ?",
        )
        .bind(user_id.to_string())
        .bind(deck_id.to_string())
        .bind(card_id.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    /// First-review insert. Returns false when another submission beat
    /// us to creating the row; the caller re-reads and retries.
    pub async fn insert_progress(&self, row: &CardProgress) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO card_progress
                (card_id, deck_id, user_id, ease_factor, interval_days,
                 review_count, correct_count, mastery_level,
                 last_reviewed_at, next_review_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.card_id.to_string())
        .bind(row.deck_id.to_string())
        .bind(row.user_id.to_string())
        .bind(row.ease_factor)
        .bind(row.interval_days)
        .bind(row.review_count)
        .bind(row.correct_count)
        .bind(row.mastery_level)
        .bind(row.last_reviewed_at)
        .bind(row.next_review_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Conditional update keyed on the previously observed
    /// last_reviewed_at. A zero row count means the row moved under us.
    pub async fn update_progress(
        &self,
        row: &CardProgress,
        expected_last_reviewed: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE card_progress
            SET ease_factor = ?, interval_days = ?, review_count = ?,
                correct_count = ?, mastery_level = ?,
                last_reviewed_at = ?, next_review_at = ?
            WHERE user_id = ? AND deck_id = ? AND card_id = ?
              AND last_reviewed_at = ?
            "#,
        )
        .bind(row.ease_factor)
        .bind(row.interval_days)
        .bind(row.review_count)
        .bind(row.correct_count)
        .bind(row.mastery_level)
        .bind(row.last_reviewed_at)
        .bind(row.next_review_at)
        .bind(row.user_id.to_string())
        .bind(row.deck_id.to_string())
        .bind(row.card_id.to_string())
        .bind(expected_last_reviewed)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Append-only audit log; never read back for scheduling.
    pub async fn record_session(&self, record: &SessionRecord) -> Result<(), sqlx::Error> {
        let outcomes = serde_json::to_string(&record.outcomes)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO study_sessions
                (session_id, deck_id, user_id, mode, duration_seconds,
                 cards_studied, cards_correct, accuracy, outcomes, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.session_id.to_string())
        .bind(record.deck_id.to_string())
        .bind(record.user_id.to_string())
        .bind(record.mode.as_str())
        .bind(record.duration_seconds)
        .bind(record.cards_studied)
        .bind(record.cards_correct)
        .bind(record.accuracy)
        .bind(outcomes)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn sessions_for_deck(
        &self,
        user_id: Uuid,
        deck_id: Uuid,
    ) -> Result<Vec<SessionRecord>, sqlx::Error> {
        sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT * FROM study_sessions
            WHERE user_id = ? AND deck_id = ?
            ORDER BY finished_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .bind(deck_id.to_string())
        .fetch_all(&self.pool)
        .await
    }
}
