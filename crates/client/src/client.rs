//! Top-level handle that wires the transport, REST API and session together.

use std::sync::Arc;

use chillow_shared::CurrentUser;

use crate::api_client::ApiClient;
use crate::backend::ChatBackend;
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::session::{ChatSession, SessionSettings};
use crate::ws::WsClient;

/// A signed-in chat client with one live realtime connection.
///
/// Build it once at startup and hand out [`ChatClient::session`] to whatever
/// needs chat state. Call [`ChatClient::shutdown`] on the way out.
#[derive(Debug)]
pub struct ChatClient {
    user: CurrentUser,
    ws: WsClient,
    session: Arc<ChatSession>,
}

impl ChatClient {
    /// Resolve the signed-in user over HTTP, then open the realtime connection.
    pub async fn start(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let api = ApiClient::new()
            .with_base_url(config.api_base_url.clone())
            .with_token(config.bearer_token.clone());
        Self::start_with_backend(config, Arc::new(api)).await
    }

    /// Same as [`ChatClient::start`] with a caller-supplied backend.
    pub async fn start_with_backend(
        config: ClientConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self, ChatError> {
        let user = backend.current_user().await.inspect_err(|e| {
            crate::log_error!("could not resolve the signed-in user: {}", e);
        })?;
        crate::log_info!("signed in as {} ({})", user.nickname, user.id);

        let ws = WsClient::new(config.transport());
        let session = ChatSession::new(
            user.id,
            Arc::new(ws.clone()),
            backend,
            SessionSettings::from(&config),
        );
        session.attach(&ws);
        ws.connect();

        Ok(Self { user, ws, session })
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn session(&self) -> &Arc<ChatSession> {
        &self.session
    }

    pub fn transport(&self) -> &WsClient {
        &self.ws
    }

    /// Detach the session and close the connection for good.
    pub fn shutdown(&self) {
        self.session.shutdown();
        self.ws.close();
    }
}
