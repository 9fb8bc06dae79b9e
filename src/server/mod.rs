pub mod error;
pub mod handlers;
pub mod identity;
pub mod shutdown;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use eyre::{Context, Result};

use crate::{chat::ArcChatService, config::Configuration, storage::ArcStorage};

pub use error::ApiError;
pub use identity::Identity;
pub use shutdown::shutdown_on;

#[derive(Clone)]
pub struct AppState {
    pub storage: ArcStorage,
    pub chat: ArcChatService,
    pub config: Arc<Configuration>,
}

impl AppState {
    pub fn new(storage: ArcStorage, chat: ArcChatService, config: Arc<Configuration>) -> Self {
        Self {
            storage,
            chat,
            config,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/send/{id}", post(handlers::send_message))
        .route("/convos", get(handlers::list_conversations))
        .route("/convo", post(handlers::create_conversation))
        .route(
            "/convo/{id}",
            get(handlers::get_conversation)
                .put(handlers::rename_conversation)
                .delete(handlers::delete_conversation),
        )
        .route(
            "/convo/{id}/share",
            post(handlers::share_conversation).delete(handlers::unshare_conversation),
        )
        .route("/share/{token}", get(handlers::get_shared))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then lets in-flight requests finish.
pub async fn serve<F>(state: AppState, bind: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .wrap_err_with(|| format!("binding {}", bind))?;
    log::info!("Listening on {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("serving http")?;

    log::info!("Server stopped");
    Ok(())
}
