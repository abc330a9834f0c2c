use std::sync::Arc;

use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{EditMessageReplyMarkupSetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, ChatId, Message, MessageId, Update, User},
    Bot,
};
use tracing::instrument;

use crate::{
    database::connection::ProgressStore,
    error::QuizError,
    keyboard::{answered_keyboard, chosen_option_text, options_keyboard, AnswerCallback, ANSWERED_CALLBACK},
    session::{
        AnswerReport, NextStep, QuestionPayload, QuizEvent, QuizReply, SessionController,
        SessionSummary,
    },
    HandlerResult,
};

fn user_id(user: &User) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
    Ok(i64::try_from(user.id.0)?)
}

#[instrument(level = "info", skip(bot, msg, update, controller), fields(chat_id = msg.chat.id.0))]
pub(crate) async fn begin_quiz<Store: ProgressStore + 'static>(
    bot: Bot,
    msg: Message,
    update: Update,
    controller: Arc<SessionController<Store>>,
) -> HandlerResult {
    let Some(user) = update.from() else {
        log::info!("Quiz requested in chat {} without a sender", msg.chat.id.0);
        return Ok(());
    };
    let user_id = user_id(user)?;

    bot.send_message(msg.chat.id, "Let's start the quiz!").await?;

    match controller.dispatch(QuizEvent::Start { user_id }).await {
        Ok(QuizReply::Question(payload)) => send_question(&bot, msg.chat.id, &payload).await,
        Ok(other) => {
            log::error!("Unexpected reply to a start event: {:?}", other);
            Ok(())
        }
        Err(e) => report_failure(&bot, msg.chat.id, e).await,
    }
}

#[instrument(level = "info", skip(bot, q, controller), fields(user_id = q.from.id.0))]
pub(crate) async fn take_answer<Store: ProgressStore + 'static>(
    bot: Bot,
    q: CallbackQuery,
    controller: Arc<SessionController<Store>>,
) -> HandlerResult {
    bot.answer_callback_query(&q.id).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    if data == ANSWERED_CALLBACK {
        return Ok(());
    }
    let callback = match data.parse::<AnswerCallback>() {
        Ok(callback) => callback,
        Err(e) => {
            log::warn!("Ignoring callback from {}: {}", q.from.id.0, e);
            return Ok(());
        }
    };

    let user_id = user_id(&q.from)?;
    let chat_id = q.chat_id().unwrap_or_else(|| q.from.id.into());

    let event = QuizEvent::Answer {
        user_id,
        tag: callback.tag,
        question_index: Some(callback.question_index),
    };
    let report = match controller.dispatch(event).await {
        Ok(QuizReply::Answered(report)) => report,
        Ok(other) => {
            log::error!("Unexpected reply to an answer event: {:?}", other);
            return Ok(());
        }
        Err(e) => return report_failure(&bot, chat_id, e).await,
    };

    if let Some(message) = &q.message {
        let chosen = message
            .regular_message()
            .and_then(|m| m.reply_markup())
            .and_then(|markup| chosen_option_text(markup, data))
            .unwrap_or_else(|| callback.tag.to_string());

        replace_answered_keyboard(&bot, chat_id, message.id(), &chosen).await;
    }

    send_outcome(&bot, chat_id, &report).await?;

    match report.next {
        NextStep::Continue => match controller.deliver_question(user_id).await {
            Ok(payload) => send_question(&bot, chat_id, &payload).await,
            Err(e) => report_failure(&bot, chat_id, e).await,
        },
        NextStep::Finished(summary) => send_summary(&bot, chat_id, summary).await,
    }
}

/// Swaps the option buttons for an inert "Your answer" button. The answer is
/// already recorded at this point, so a failure is only logged.
async fn replace_answered_keyboard(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    chosen: &str,
) -> bool {
    match bot
        .edit_message_reply_markup(chat_id, message_id)
        .reply_markup(answered_keyboard(chosen))
        .await
    {
        Ok(_) => true,
        Err(e) => {
            log::warn!(
                "Failed to replace the answered keyboard in chat {}: {}",
                chat_id.0,
                e
            );
            false
        }
    }
}

async fn send_question(bot: &Bot, chat_id: ChatId, payload: &QuestionPayload) -> HandlerResult {
    bot.send_message(
        chat_id,
        format!(
            "Question #{}/{}\n{}",
            payload.index + 1,
            payload.total_questions,
            payload.text
        ),
    )
    .reply_markup(options_keyboard(payload))
    .await?;
    Ok(())
}

async fn send_outcome(bot: &Bot, chat_id: ChatId, report: &AnswerReport) -> HandlerResult {
    let text = if report.outcome.is_correct {
        "Correct!✅".to_owned()
    } else {
        format!(
            "Wrong!❌ The correct answer is: {}",
            report.outcome.correct_answer_text
        )
    };

    bot.send_message(chat_id, text).await?;
    Ok(())
}

async fn send_summary(bot: &Bot, chat_id: ChatId, summary: SessionSummary) -> HandlerResult {
    bot.send_message(
        chat_id,
        format!(
            "That was the last question. Quiz complete!\nYour result: {} of {}",
            summary.correct_count, summary.total_questions
        ),
    )
    .await?;
    Ok(())
}

/// Tells the user what went wrong. Protocol misuse ends here; anything else
/// is handed back to the dispatcher's error handler.
async fn report_failure(bot: &Bot, chat_id: ChatId, error: QuizError) -> HandlerResult {
    match error {
        QuizError::NoActiveSession(user_id) => {
            log::info!("User {} has no active quiz", user_id);
            bot.send_message(
                chat_id,
                "There is no quiz in progress. Send /quiz to start a new one.",
            )
            .await?;
            Ok(())
        }
        QuizError::StaleAnswer { .. } => {
            bot.send_message(chat_id, "That question has already been answered.")
                .await?;
            Ok(())
        }
        e => {
            log::error!("Quiz failure in chat {}: {}", chat_id.0, e);
            bot.send_message(chat_id, "Something went wrong. Please try again later.")
                .await?;
            Err(e.into())
        }
    }
}
