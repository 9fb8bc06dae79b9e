use std::sync::Arc;

use eyre::{Context, Result};
use universe_chat::{
    backend::new_provider,
    chat::ChatService,
    cli::Command,
    config::init_logger,
    context::{ContextAssembler, TokenEstimator},
    retrieval::new_retriever,
    server::{self, AppState},
    storage::new_storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    better_panic::install();

    let config = Arc::new(cmd.get_config()?);
    init_logger(&config.log)?;
    log::info!("Logger initialized");

    let storage = new_storage(&config.storage)
        .await
        .wrap_err("initializing storage")?;
    log::info!("Storage initialized");

    let provider = new_provider(&config.provider).wrap_err("initializing provider")?;
    let retriever = new_retriever(&config.retrieval);

    let estimator = TokenEstimator::for_model(&config.provider.model);
    let assembler = ContextAssembler::new(&config.context, estimator);

    let chat = ChatService::new(
        storage.clone(),
        provider,
        retriever,
        assembler,
        &config.context,
    )
    .with_moderation(config.provider.moderation);

    let state = AppState::new(storage, Arc::new(chat), config.clone());
    server::serve(state, &config.server.bind, server::shutdown_on(tokio::signal::ctrl_c())).await
}
