use std::{fmt, str::FromStr};

use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardButtonKind, InlineKeyboardMarkup, KeyboardButton,
    KeyboardMarkup,
};

use crate::session::{AnswerTag, QuestionPayload};

pub(crate) const START_QUIZ_BUTTON: &str = "Start quiz📝";
pub(crate) const ANSWERED_CALLBACK: &str = "disabled";

/// Callback data of an option button: `<tag>:<question index>:<option index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnswerCallback {
    pub(crate) tag: AnswerTag,
    pub(crate) question_index: usize,
    pub(crate) option_index: usize,
}

impl fmt::Display for AnswerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tag, self.question_index, self.option_index)
    }
}

impl FromStr for AnswerCallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(tag), Some(question_index), Some(option_index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("malformed answer callback '{}'", s));
        };

        Ok(Self {
            tag: tag.parse()?,
            question_index: question_index
                .parse()
                .map_err(|e| format!("bad question index in '{}': {}", s, e))?,
            option_index: option_index
                .parse()
                .map_err(|e| format!("bad option index in '{}': {}", s, e))?,
        })
    }
}

pub(crate) fn start_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(START_QUIZ_BUTTON)]])
}

pub(crate) fn options_keyboard(payload: &QuestionPayload) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = payload
        .options
        .iter()
        .enumerate()
        .map(|(option_index, (text, tag))| {
            let data = AnswerCallback {
                tag: *tag,
                question_index: payload.index,
                option_index,
            };
            vec![InlineKeyboardButton::callback(text, data.to_string())]
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}

pub(crate) fn answered_keyboard(answer: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        format!("Your answer: {}", answer),
        ANSWERED_CALLBACK,
    )]])
}

/// Text of the button in `markup` that carries `data`.
pub(crate) fn chosen_option_text(markup: &InlineKeyboardMarkup, data: &str) -> Option<String> {
    markup
        .inline_keyboard
        .iter()
        .flatten()
        .find(|button| {
            matches!(&button.kind, InlineKeyboardButtonKind::CallbackData(callback) if callback == data)
        })
        .map(|button| button.text.clone())
}
