use std::error::Error;
use std::sync::Arc;

use quiz_runner_bot::config::Config;
use quiz_runner_bot::database::connection::Connection;
use quiz_runner_bot::quiz::QuestionBank;
use quiz_runner_bot::schema::schema;
use quiz_runner_bot::session::SessionController;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        log::error!("Bot stopped: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) -> Result<(), BoxError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level)?)
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

async fn run(config: Config) -> Result<(), BoxError> {
    let bank = Arc::new(QuestionBank::load(&config.questions_path)?);
    log::info!(
        "Loaded {} questions from {}",
        bank.len(),
        config.questions_path.display()
    );

    let connection =
        Connection::connect(&config.database_url, config.database_max_connections).await?;
    connection.perform_migrations().await?;

    let controller = Arc::new(SessionController::new(
        connection,
        bank,
        config.score_policy,
    ));

    let bot = Bot::new(config.teloxide_token);
    log::info!("Starting bot...");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema::<Connection>())
        .dependencies(dptree::deps![controller])
        .enable_ctrlc_handler()
        .build();

    if let Some(webhook) = config.webhook {
        log::info!("Listening for webhooks on {}", webhook.addr);
        let listener = webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await?;
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    } else {
        dispatcher.dispatch().await;
    }

    Ok(())
}
