//! HTTP API client with bearer-token authentication.

use async_trait::async_trait;
use chillow_shared::{
    ApiError, CurrentUser, Friend, HistoryQuery, MessageId, MessageRecord, UploadedAttachment,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::backend::{AttachmentUpload, ChatBackend};

/// HTTP client for the chat REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send `Authorization: Bearer <token>` on every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn authorized(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = self
            .authorized(rb)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    fn decode<TRes: DeserializeOwned>(text: &str) -> Result<TRes, ApiError> {
        let text = if text.trim().is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(self.client.get(self.url(path))).await?;
        Self::decode(&text)
    }

    /// POST without a body, ignoring whatever the server answers with.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.client.post(self.url(path))).await?;
        Ok(())
    }

    pub async fn post_multipart<TRes: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<TRes, ApiError> {
        let text = self
            .execute(self.client.post(self.url(path)).multipart(form))
            .await?;
        Self::decode(&text)
    }
}

pub(crate) fn history_path(query: &HistoryQuery) -> String {
    let mut path = format!("/api/messages/{}?limit={}", query.friend_id, query.limit);
    if let Some(before) = query.before {
        let cursor = before.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        path.push_str("&before=");
        path.push_str(&urlencoding::encode(&cursor));
    }
    path
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.get_json("/api/users/me").await
    }

    async fn fetch_friends(&self) -> Result<Vec<Friend>, ApiError> {
        let friends: Option<Vec<Friend>> = self.get_json("/api/friends").await?;
        Ok(friends.unwrap_or_default())
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<MessageRecord>, ApiError> {
        let page: Option<Vec<MessageRecord>> = self.get_json(&history_path(query)).await?;
        Ok(page.unwrap_or_default())
    }

    async fn mark_read(&self, message_id: MessageId) -> Result<(), ApiError> {
        self.post_empty(&format!("/api/messages/{message_id}/read"))
            .await
    }

    async fn upload_attachment(
        &self,
        upload: AttachmentUpload,
    ) -> Result<UploadedAttachment, ApiError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| ApiError::Network(format!("invalid attachment type: {e}")))?;
        let form = Form::new().part("file", part);
        self.post_multipart("/api/messages/media", form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn urls_join_base_and_path() {
        let api = ApiClient::new().with_base_url("http://localhost:8080/");
        assert_eq!(api.url("/api/friends"), "http://localhost:8080/api/friends");
        assert_eq!(api.url("api/friends"), "http://localhost:8080/api/friends");
        assert_eq!(api.url("https://cdn.example/x"), "https://cdn.example/x");
    }

    #[test]
    fn history_path_carries_limit_and_cursor() {
        let mut query = HistoryQuery {
            friend_id: 7,
            limit: 30,
            before: None,
        };
        assert_eq!(history_path(&query), "/api/messages/7?limit=30");

        query.before = Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(
            history_path(&query),
            "/api/messages/7?limit=30&before=2025-03-01T10%3A00%3A00.000Z"
        );
    }

    #[test]
    fn empty_bodies_decode_as_null() {
        let friends: Option<Vec<Friend>> = ApiClient::decode("").unwrap();
        assert!(friends.is_none());
        assert!(matches!(
            ApiClient::decode::<Vec<Friend>>("{oops"),
            Err(ApiError::Deserialize(_))
        ));
    }
}
