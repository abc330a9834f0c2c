use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::instrument;

use crate::{
    database::connection::ProgressStore, error::QuizError, quiz::QuestionBank,
    state::SessionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerTag {
    Correct,
    Incorrect,
}

impl AnswerTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerTag::Correct => "right_answer",
            AnswerTag::Incorrect => "wrong_answer",
        }
    }
}

impl fmt::Display for AnswerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "right_answer" => Ok(AnswerTag::Correct),
            "wrong_answer" => Ok(AnswerTag::Incorrect),
            other => Err(format!("unknown answer tag '{}'", other)),
        }
    }
}

/// Whether restarting a quiz keeps the correct answer count of earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScorePolicy {
    #[default]
    CarryOver,
    ResetOnStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPayload {
    pub index: usize,
    pub total_questions: usize,
    pub text: String,
    pub options: Vec<(String, AnswerTag)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub correct_answer_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub correct_count: u32,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Continue,
    Finished(SessionSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReport {
    pub outcome: AnswerOutcome,
    pub next: NextStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizEvent {
    Start {
        user_id: i64,
    },
    Answer {
        user_id: i64,
        tag: AnswerTag,
        question_index: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizReply {
    Question(QuestionPayload),
    Answered(AnswerReport),
}

/// One async mutex per user id. Entries nobody holds or waits for are pruned
/// on the next acquisition.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id).or_default())
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drives quiz runs: start, deliver question, record answer, finish.
///
/// Operations for the same user are serialized, so store mutations land in
/// the order the events arrived.
pub struct SessionController<S> {
    store: S,
    bank: Arc<QuestionBank>,
    policy: ScorePolicy,
    locks: UserLocks,
}

impl<S: ProgressStore> SessionController<S> {
    pub fn new(store: S, bank: Arc<QuestionBank>, policy: ScorePolicy) -> Self {
        Self {
            store,
            bank,
            policy,
            locks: UserLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn dispatch(&self, event: QuizEvent) -> Result<QuizReply, QuizError> {
        match event {
            QuizEvent::Start { user_id } => self.start(user_id).await.map(QuizReply::Question),
            QuizEvent::Answer {
                user_id,
                tag,
                question_index: Some(question_index),
            } => self
                .record_answer_at(user_id, question_index, tag)
                .await
                .map(QuizReply::Answered),
            QuizEvent::Answer {
                user_id,
                tag,
                question_index: None,
            } => self
                .record_answer(user_id, tag)
                .await
                .map(QuizReply::Answered),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn start(&self, user_id: i64) -> Result<QuestionPayload, QuizError> {
        if self.bank.is_empty() {
            return Err(QuizError::InvalidQuizState(
                "question bank is empty".to_owned(),
            ));
        }

        let _guard = self.locks.lock(user_id).await;
        match self.policy {
            ScorePolicy::CarryOver => self.store.reset_progress(user_id).await?,
            ScorePolicy::ResetOnStart => self.store.restart_with_cleared_score(user_id).await?,
        }
        log::info!("User {} starts a new quiz run", user_id);

        self.question_payload(0)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn deliver_question(&self, user_id: i64) -> Result<QuestionPayload, QuizError> {
        let _guard = self.locks.lock(user_id).await;
        let index = self.active_index(user_id).await?;
        log::info!("User {}: asking question #{}", user_id, index + 1);

        self.question_payload(index)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn record_answer(
        &self,
        user_id: i64,
        tag: AnswerTag,
    ) -> Result<AnswerReport, QuizError> {
        let _guard = self.locks.lock(user_id).await;
        let index = self.active_index(user_id).await?;

        self.apply_answer(user_id, index, tag).await
    }

    /// Like [`Self::record_answer`], but only accepts the answer if
    /// `question_index` is the question currently awaiting one.
    #[instrument(level = "info", skip(self))]
    pub async fn record_answer_at(
        &self,
        user_id: i64,
        question_index: usize,
        tag: AnswerTag,
    ) -> Result<AnswerReport, QuizError> {
        let _guard = self.locks.lock(user_id).await;
        let index = self.active_index(user_id).await?;
        if index != question_index {
            log::info!(
                "User {} answered question #{} while question #{} is active",
                user_id,
                question_index + 1,
                index + 1
            );
            return Err(QuizError::StaleAnswer {
                answered: question_index,
                current: index,
            });
        }

        self.apply_answer(user_id, index, tag).await
    }

    pub async fn session_state(&self, user_id: i64) -> Result<SessionState, QuizError> {
        let index = self.store.get_question_index(user_id).await?;
        Ok(SessionState::from_index(index, self.bank.len()))
    }

    async fn active_index(&self, user_id: i64) -> Result<usize, QuizError> {
        let index = self.store.get_question_index(user_id).await?;
        SessionState::active_index(index, self.bank.len(), user_id)
    }

    async fn apply_answer(
        &self,
        user_id: i64,
        index: usize,
        tag: AnswerTag,
    ) -> Result<AnswerReport, QuizError> {
        let question = self.bank.get(index).ok_or_else(|| {
            QuizError::InvalidQuizState(format!("question index {} is out of bounds", index))
        })?;
        let correct_answer_text = question
            .correct_answer()
            .ok_or_else(|| {
                QuizError::InvalidQuizState(format!(
                    "question #{} has no correct option",
                    index + 1
                ))
            })?
            .to_owned();

        let is_correct = tag == AnswerTag::Correct;
        let next_index = index + 1;
        let correct_count = self.store.advance(user_id, next_index, is_correct).await?;
        log::info!(
            "User {} answers question #{} '{}'. Correctness: {}",
            user_id,
            index + 1,
            question.text(),
            is_correct
        );

        let next = if next_index < self.bank.len() {
            NextStep::Continue
        } else {
            let summary = SessionSummary {
                correct_count,
                total_questions: self.bank.len(),
            };
            log::info!(
                "User {} completed the quiz with result {}/{}",
                user_id,
                summary.correct_count,
                summary.total_questions
            );
            NextStep::Finished(summary)
        };

        Ok(AnswerReport {
            outcome: AnswerOutcome {
                is_correct,
                correct_answer_text,
            },
            next,
        })
    }

    fn question_payload(&self, index: usize) -> Result<QuestionPayload, QuizError> {
        let question = self.bank.get(index).ok_or_else(|| {
            QuizError::InvalidQuizState(format!("question index {} is out of bounds", index))
        })?;

        let options = question
            .options()
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let tag = if i == question.correct_option() {
                    AnswerTag::Correct
                } else {
                    AnswerTag::Incorrect
                };
                (text.clone(), tag)
            })
            .collect();

        Ok(QuestionPayload {
            index,
            total_questions: self.bank.len(),
            text: question.text().to_owned(),
            options,
        })
    }
}
