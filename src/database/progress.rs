use std::fmt;

use crate::error::StorageError;

/// Row of the `quiz_state` table as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ProgressRecord {
    pub(crate) user_id: i64,
    pub(crate) question_index: Option<i64>,
    pub(crate) correct_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProgress {
    user_id: i64,
    question_index: Option<usize>,
    correct_count: u32,
}

impl fmt::Display for UserProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.question_index {
            Some(index) => write!(
                f,
                "user {}: question #{}, {} correct",
                self.user_id,
                index + 1,
                self.correct_count
            ),
            None => write!(
                f,
                "user {}: not started, {} correct",
                self.user_id, self.correct_count
            ),
        }
    }
}

impl UserProgress {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn question_index(&self) -> Option<usize> {
        self.question_index
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }
}

impl TryFrom<ProgressRecord> for UserProgress {
    type Error = StorageError;

    fn try_from(record: ProgressRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: record.user_id,
            question_index: record
                .question_index
                .map(|index| index_from_db(record.user_id, index))
                .transpose()?,
            correct_count: count_from_db(record.user_id, record.correct_count)?,
        })
    }
}

pub(crate) fn index_from_db(user_id: i64, index: i64) -> Result<usize, StorageError> {
    usize::try_from(index).map_err(|_| StorageError::Corrupt {
        user_id,
        reason: format!("question_index {} is negative", index),
    })
}

pub(crate) fn count_from_db(user_id: i64, count: i64) -> Result<u32, StorageError> {
    u32::try_from(count).map_err(|_| StorageError::Corrupt {
        user_id,
        reason: format!("correct_count {} is out of range", count),
    })
}

pub(crate) fn index_to_db(index: usize) -> Result<i64, StorageError> {
    i64::try_from(index).map_err(|_| StorageError::IndexOutOfRange(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_valid_record() {
        let progress = UserProgress::try_from(ProgressRecord {
            user_id: 7,
            question_index: Some(2),
            correct_count: 1,
        })
        .unwrap();

        assert_eq!(progress.user_id(), 7);
        assert_eq!(progress.question_index(), Some(2));
        assert_eq!(progress.correct_count(), 1);
        assert_eq!(progress.to_string(), "user 7: question #3, 1 correct");
    }

    #[test]
    fn absent_index_means_not_started() {
        let progress = UserProgress::try_from(ProgressRecord {
            user_id: 7,
            question_index: None,
            correct_count: 1,
        })
        .unwrap();

        assert_eq!(progress.question_index(), None);
    }

    #[test]
    fn negative_values_are_corrupt() {
        let err = UserProgress::try_from(ProgressRecord {
            user_id: 7,
            question_index: Some(-1),
            correct_count: 0,
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { user_id: 7, .. }));

        assert!(count_from_db(7, -3).is_err());
    }

    #[test]
    fn oversized_index_is_rejected_before_writing() {
        assert_eq!(index_to_db(4).unwrap(), 4);
        assert!(matches!(
            index_to_db(usize::MAX),
            Err(StorageError::IndexOutOfRange(usize::MAX))
        ));
    }
}
