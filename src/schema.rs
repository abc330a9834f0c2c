use teloxide::{
    dispatching::{UpdateFilterExt, UpdateHandler},
    dptree,
    prelude::Requester,
    types::{Message, Update},
    Bot,
};
use tracing::instrument;

use crate::{
    commands::{help, start, Command},
    database::connection::ProgressStore,
    keyboard::START_QUIZ_BUTTON,
    runner, HandlerResult,
};

pub fn schema<Store: ProgressStore + 'static>(
) -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    log::debug!("Building the dispatching tree");

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(help))
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Quiz].endpoint(runner::begin_quiz::<Store>));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.text() == Some(START_QUIZ_BUTTON))
                .endpoint(runner::begin_quiz::<Store>),
        )
        .endpoint(invalid_input);

    let callback_handler =
        Update::filter_callback_query().endpoint(runner::take_answer::<Store>);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}

#[instrument(level = "info", skip(bot, msg), fields(chat_id = msg.chat.id.0))]
async fn invalid_input(bot: Bot, msg: Message) -> HandlerResult {
    log::info!("Chat {}: invalid input '{:?}'", msg.chat.id.0, msg.text());
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Enter /help to see usages.",
    )
    .await?;
    Ok(())
}
