use crate::error::QuizError;

/// Where a user stands in the quiz, derived from the stored question index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotStarted,
    InProgress(usize),
    Completed,
}

impl SessionState {
    pub fn from_index(index: Option<usize>, total_questions: usize) -> Self {
        match index {
            None => SessionState::NotStarted,
            Some(index) if index >= total_questions => SessionState::Completed,
            Some(index) => SessionState::InProgress(index),
        }
    }

    /// Index of the question awaiting an answer. Anything other than
    /// `InProgress` means there is nothing to answer.
    pub(crate) fn active_index(
        index: Option<usize>,
        total_questions: usize,
        user_id: i64,
    ) -> Result<usize, QuizError> {
        match index {
            None => Err(QuizError::NoActiveSession(user_id)),
            Some(index) if index == total_questions => Err(QuizError::NoActiveSession(user_id)),
            Some(index) if index > total_questions => Err(QuizError::InvalidQuizState(format!(
                "user {} is at question index {} but the bank has {} questions",
                user_id, index, total_questions
            ))),
            Some(index) => Ok(index),
        }
    }
}
