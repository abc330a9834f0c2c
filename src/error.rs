#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt progress record for user {user_id}: {reason}")]
    Corrupt { user_id: i64, reason: String },

    #[error("question index {0} cannot be stored")]
    IndexOutOfRange(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("user {0} has no active quiz session")]
    NoActiveSession(i64),

    #[error("invalid quiz state: {0}")]
    InvalidQuizState(String),

    #[error("answer for question #{answered} arrived while question #{current} is active")]
    StaleAnswer { answered: usize, current: usize },
}
