//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::get,
};
use sasayaki_shared::shutdown::Shutdown;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    infrastructure::{
        fanout::{RoomTree, spawn_liveness_sweeper},
        store::{MessageStore, StoreError, spawn_flusher},
        users::{ConfigError, UserDirectory},
    },
    usecase::{
        ConnectListenerUseCase, DeleteMessageUseCase, GetMessagesUseCase, PostMessageUseCase,
    },
};

use super::{
    config::ServerConfig,
    handler::{
        delete_message, get_messages, get_perms, health_check, list_users, post_message,
        websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Reason sent to every live socket when the server stops.
pub const SERVER_CLOSING: &str = "Server closing";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(ServerConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bind `host:port` and serve until Ctrl+C / SIGTERM.
    pub async fn run(self, host: String, port: u16) -> Result<(), ServerError> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// On shutdown the flusher and the liveness sweeper finish their last pass,
    /// every live socket is closed and the message log is released.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.config;

        // 1. Users and message store
        let users = Arc::new(UserDirectory::load(
            &config.users_path,
            !config.disable_token_check,
        )?);
        let store = Arc::new(MessageStore::open(&config.store_path, config.max_messages).await?);
        let tree = Arc::new(RoomTree::new());

        // 2. Background tasks
        let stop = Shutdown::new();
        let flusher = spawn_flusher(store.clone(), config.flush_interval, stop.subscribe());
        let sweeper = spawn_liveness_sweeper(tree.clone(), config.sweep, stop.subscribe());

        // 3. UseCases
        let app_state = Arc::new(AppState {
            users: users.clone(),
            post_message_usecase: Arc::new(PostMessageUseCase::new(store.clone(), tree.clone())),
            get_messages_usecase: Arc::new(GetMessagesUseCase::new(store.clone())),
            delete_message_usecase: Arc::new(DeleteMessageUseCase::new(store.clone())),
            connect_listener_usecase: Arc::new(ConnectListenerUseCase::new(
                tree.clone(),
                users.clone(),
            )),
            liveness: config.liveness,
        });

        let app = router(app_state);

        tracing::info!(
            "Chat server listening on {}",
            listener.local_addr()?
        );

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        // Upgraded sockets run outside the HTTP server and outlive it.
        stop.trigger();
        for (name, task) in [("flusher", flusher), ("sweeper", sweeper)] {
            if let Err(e) = task.await {
                tracing::error!("Background {} task failed: {}", name, e);
            }
        }
        tree.close(SERVER_CLOSING).await;
        store.stop().await?;

        result?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket エンドポイント
        .route("/ws", get(websocket_handler))
        // HTTP エンドポイント
        .route("/api/health", get(health_check))
        .route(
            "/messages",
            get(get_messages).post(post_message).delete(delete_message),
        )
        .route("/users", get(list_users))
        .route("/perms", get(get_perms))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
