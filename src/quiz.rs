use std::{fs, path::Path};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question bank is empty")]
    Empty,

    #[error("question #{0} has no options")]
    NoOptions(usize),

    #[error("question #{index} marks option {correct} as correct but has only {options} options")]
    CorrectOptionOutOfRange {
        index: usize,
        correct: usize,
        options: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "question")]
    text: String,
    options: Vec<String>,
    correct_option: usize,
}

impl QuizQuestion {
    pub fn new(text: impl Into<String>, options: Vec<String>, correct_option: usize) -> Self {
        Self {
            text: text.into(),
            options,
            correct_option,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    /// Text of the correct option. Always `Some` for questions held by a
    /// [`QuestionBank`].
    pub fn correct_answer(&self) -> Option<&str> {
        self.options.get(self.correct_option).map(String::as_str)
    }
}

/// Ordered, validated, read-only list of questions.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<QuizQuestion>,
}

impl QuestionBank {
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }

        for (index, question) in questions.iter().enumerate() {
            if question.options.is_empty() {
                return Err(BankError::NoOptions(index + 1));
            }
            if question.correct_option >= question.options.len() {
                return Err(BankError::CorrectOptionOutOfRange {
                    index: index + 1,
                    correct: question.correct_option,
                    options: question.options.len(),
                });
            }
        }

        Ok(Self { questions })
    }

    pub fn from_json(raw: &str) -> Result<Self, BankError> {
        let questions: Vec<QuizQuestion> = serde_json::from_str(raw)?;
        Self::new(questions)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn get(&self, index: usize) -> Option<&QuizQuestion> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
