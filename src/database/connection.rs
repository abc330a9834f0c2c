use std::{future::Future, str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use super::progress::{count_from_db, index_from_db, index_to_db, ProgressRecord, UserProgress};
use crate::error::StorageError;

pub struct Connection {
    pool: SqlitePool,
}

impl Connection {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn perform_migrations(&self) -> Result<(), StorageError> {
        log::debug!("Running migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

type StoreResult<T> = Result<T, StorageError>;

/// Mutations of a user's progress row. Every operation is a single statement
/// and is durable once the future resolves.
pub trait UpdateProgress {
    /// Sets the question index to 0. A new row starts with no correct answers;
    /// an existing row keeps its count.
    fn reset_progress(&self, user_id: i64) -> impl Future<Output = StoreResult<()>> + Send;

    fn set_question_index(
        &self,
        user_id: i64,
        index: usize,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Adds exactly one to the correct answer count, creating the row if needed.
    fn increment_correct(&self, user_id: i64) -> impl Future<Output = StoreResult<()>> + Send;

    fn clear_score(&self, user_id: i64) -> impl Future<Output = StoreResult<()>> + Send;

    /// Sets the question index to 0 and the correct answer count to 0 in one
    /// statement.
    fn restart_with_cleared_score(
        &self,
        user_id: i64,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Moves the user to `next_index` and, when `correct`, adds one to the
    /// count. Both changes land together or not at all. Returns the new count.
    fn advance(
        &self,
        user_id: i64,
        next_index: usize,
        correct: bool,
    ) -> impl Future<Output = StoreResult<u32>> + Send;
}

pub trait RetrieveProgress {
    /// `None` when the user never started a quiz.
    fn get_question_index(
        &self,
        user_id: i64,
    ) -> impl Future<Output = StoreResult<Option<usize>>> + Send;

    fn get_correct_count(&self, user_id: i64) -> impl Future<Output = StoreResult<u32>> + Send;

    fn get_progress(
        &self,
        user_id: i64,
    ) -> impl Future<Output = StoreResult<Option<UserProgress>>> + Send;
}

pub trait ProgressStore: UpdateProgress + RetrieveProgress + Send + Sync {}

impl<T: UpdateProgress + RetrieveProgress + Send + Sync> ProgressStore for T {}

impl UpdateProgress for Connection {
    async fn reset_progress(&self, user_id: i64) -> StoreResult<()> {
        log::debug!("Resetting progress of user {}", user_id);
        sqlx::query(
            "INSERT INTO quiz_state (user_id, question_index) VALUES (?, 0)
             ON CONFLICT(user_id) DO UPDATE SET question_index = 0",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_question_index(&self, user_id: i64, index: usize) -> StoreResult<()> {
        let index = index_to_db(index)?;
        log::debug!("Moving user {} to question index {}", user_id, index);
        sqlx::query(
            "INSERT INTO quiz_state (user_id, question_index) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET question_index = excluded.question_index",
        )
        .bind(user_id)
        .bind(index)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_correct(&self, user_id: i64) -> StoreResult<()> {
        log::debug!("Incrementing correct answers of user {}", user_id);
        sqlx::query(
            "INSERT INTO quiz_state (user_id, correct_count) VALUES (?, 1)
             ON CONFLICT(user_id) DO UPDATE SET correct_count = quiz_state.correct_count + 1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_score(&self, user_id: i64) -> StoreResult<()> {
        log::debug!("Clearing score of user {}", user_id);
        sqlx::query("UPDATE quiz_state SET correct_count = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn restart_with_cleared_score(&self, user_id: i64) -> StoreResult<()> {
        log::debug!("Resetting progress and score of user {}", user_id);
        sqlx::query(
            "INSERT INTO quiz_state (user_id, question_index, correct_count) VALUES (?, 0, 0)
             ON CONFLICT(user_id) DO UPDATE SET question_index = 0, correct_count = 0",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance(&self, user_id: i64, next_index: usize, correct: bool) -> StoreResult<u32> {
        let next_index = index_to_db(next_index)?;
        log::debug!(
            "Moving user {} to question index {} (correct: {})",
            user_id,
            next_index,
            correct
        );
        let count = sqlx::query_scalar::<_, i64>(
            "INSERT INTO quiz_state (user_id, question_index, correct_count) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 question_index = excluded.question_index,
                 correct_count = quiz_state.correct_count + excluded.correct_count
             RETURNING correct_count",
        )
        .bind(user_id)
        .bind(next_index)
        .bind(i64::from(correct))
        .fetch_one(&self.pool)
        .await?;

        count_from_db(user_id, count)
    }
}

impl RetrieveProgress for Connection {
    async fn get_question_index(&self, user_id: i64) -> StoreResult<Option<usize>> {
        let index = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT question_index FROM quiz_state WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        index
            .flatten()
            .map(|index| index_from_db(user_id, index))
            .transpose()
    }

    async fn get_correct_count(&self, user_id: i64) -> StoreResult<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT correct_count FROM quiz_state WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        count_from_db(user_id, count.unwrap_or(0))
    }

    async fn get_progress(&self, user_id: i64) -> StoreResult<Option<UserProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(
            "SELECT user_id, question_index, correct_count FROM quiz_state WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(UserProgress::try_from).transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    /// The database lives as long as the returned directory.
    pub(crate) async fn test_connection() -> (Connection, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("quiz.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let connection = Connection::connect(&url, 4).await.unwrap();
        connection.perform_migrations().await.unwrap();
        (connection, dir)
    }

    #[tokio::test]
    async fn unknown_user_has_no_progress() {
        let (connection, _dir) = test_connection().await;

        assert_eq!(connection.get_question_index(1).await.unwrap(), None);
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 0);
        assert!(connection.get_progress(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_creates_row_at_first_question() {
        let (connection, _dir) = test_connection().await;

        connection.reset_progress(1).await.unwrap();

        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(0));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_keeps_existing_score() {
        let (connection, _dir) = test_connection().await;

        connection.reset_progress(1).await.unwrap();
        connection.increment_correct(1).await.unwrap();
        connection.set_question_index(1, 3).await.unwrap();
        connection.reset_progress(1).await.unwrap();

        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(0));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_question_index_upserts() {
        let (connection, _dir) = test_connection().await;

        connection.set_question_index(5, 2).await.unwrap();
        assert_eq!(connection.get_question_index(5).await.unwrap(), Some(2));
        assert_eq!(connection.get_correct_count(5).await.unwrap(), 0);

        connection.set_question_index(5, 3).await.unwrap();
        assert_eq!(connection.get_question_index(5).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn increment_without_row_creates_unstarted_row() {
        let (connection, _dir) = test_connection().await;

        connection.increment_correct(9).await.unwrap();

        assert_eq!(connection.get_correct_count(9).await.unwrap(), 1);
        assert_eq!(connection.get_question_index(9).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let (connection, _dir) = test_connection().await;
        let connection = Arc::new(connection);
        connection.reset_progress(1).await.unwrap();

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let connection = Arc::clone(&connection);
                tokio::spawn(async move { connection.increment_correct(1).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(connection.get_correct_count(1).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn reads_are_repeatable() {
        let (connection, _dir) = test_connection().await;
        connection.set_question_index(1, 4).await.unwrap();
        connection.increment_correct(1).await.unwrap();

        let first = (
            connection.get_question_index(1).await.unwrap(),
            connection.get_correct_count(1).await.unwrap(),
        );
        let second = (
            connection.get_question_index(1).await.unwrap(),
            connection.get_correct_count(1).await.unwrap(),
        );

        assert_eq!(first, second);
        assert_eq!(first, (Some(4), 1));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (connection, _dir) = test_connection().await;

        connection.reset_progress(1).await.unwrap();
        connection.increment_correct(1).await.unwrap();
        connection.set_question_index(2, 7).await.unwrap();

        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(0));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 1);
        assert_eq!(connection.get_question_index(2).await.unwrap(), Some(7));
        assert_eq!(connection.get_correct_count(2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_score_zeroes_count_only() {
        let (connection, _dir) = test_connection().await;
        connection.set_question_index(1, 2).await.unwrap();
        connection.increment_correct(1).await.unwrap();

        connection.clear_score(1).await.unwrap();

        let progress = connection.get_progress(1).await.unwrap().unwrap();
        assert_eq!(progress.correct_count(), 0);
        assert_eq!(progress.question_index(), Some(2));
    }

    #[tokio::test]
    async fn storage_failures_are_not_masked() {
        let (connection, _dir) = test_connection().await;
        sqlx::query("DROP TABLE quiz_state")
            .execute(&connection.pool)
            .await
            .unwrap();

        assert!(matches!(
            connection.get_question_index(1).await,
            Err(StorageError::Database(_))
        ));
        assert!(matches!(
            connection.get_correct_count(1).await,
            Err(StorageError::Database(_))
        ));
        assert!(connection.reset_progress(1).await.is_err());
    }

    #[tokio::test]
    async fn negative_index_is_reported_as_corrupt() {
        let (connection, _dir) = test_connection().await;
        sqlx::query("INSERT INTO quiz_state (user_id, question_index) VALUES (1, -2)")
            .execute(&connection.pool)
            .await
            .unwrap();

        assert!(matches!(
            connection.get_question_index(1).await,
            Err(StorageError::Corrupt { user_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn advance_moves_index_and_scores_together() {
        let (connection, _dir) = test_connection().await;
        connection.reset_progress(1).await.unwrap();

        assert_eq!(connection.advance(1, 1, true).await.unwrap(), 1);
        assert_eq!(connection.advance(1, 2, false).await.unwrap(), 1);
        assert_eq!(connection.advance(1, 3, true).await.unwrap(), 2);

        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(3));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_advance_leaves_row_untouched() {
        let (connection, _dir) = test_connection().await;
        connection.reset_progress(1).await.unwrap();
        connection.increment_correct(1).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_index BEFORE UPDATE OF question_index ON quiz_state
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&connection.pool)
        .await
        .unwrap();

        assert!(matches!(
            connection.advance(1, 1, true).await,
            Err(StorageError::Database(_))
        ));
        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(0));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn restart_with_cleared_score_zeroes_both() {
        let (connection, _dir) = test_connection().await;
        connection.advance(1, 2, true).await.unwrap();

        connection.restart_with_cleared_score(1).await.unwrap();
        connection.restart_with_cleared_score(2).await.unwrap();

        assert_eq!(connection.get_question_index(1).await.unwrap(), Some(0));
        assert_eq!(connection.get_correct_count(1).await.unwrap(), 0);
        assert_eq!(connection.get_question_index(2).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (connection, _dir) = test_connection().await;
        connection.perform_migrations().await.unwrap();
    }
}
