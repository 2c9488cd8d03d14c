// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    modules::{
        error::{code::ErrorCode, MailSweepResult},
        gmail::GmailApi,
        oauth2::{flow::refresh_user_token, token::TokenStore},
        settings::cli::SETTINGS,
    },
    raise_error,
};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail REST client bound to one user's stored authorization. A 401 from
/// the API triggers exactly one token refresh and retry; a second 401
/// surfaces as `Unauthenticated` to the caller.
pub struct GmailClient {
    user_id: String,
    http: reqwest::Client,
    access_token: Mutex<String>,
}

impl GmailClient {
    pub async fn for_user(user_id: &str) -> MailSweepResult<Self> {
        let mut token = TokenStore::require(user_id).await?;
        if token.is_expired() {
            token = refresh_user_token(user_id).await?;
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Self {
            user_id: user_id.to_string(),
            http,
            access_token: Mutex::new(token.access_token),
        })
    }

    async fn post_json(&self, url: &str, body: Option<serde_json::Value>) -> MailSweepResult<()> {
        self.execute(|token| {
            let mut request = self.http.post(url).bearer_auth(token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            request
        })
        .await
        .map(|_| ())
    }

    /// Runs a request, refreshing the token once on 401.
    async fn execute(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> MailSweepResult<serde_json::Value> {
        for attempt in 0..2 {
            let token = self.access_token.lock().await.clone();
            let response = build(&token).send().await.map_err(|e| {
                raise_error!(
                    format!("Gmail API request failed: {e}"),
                    ErrorCode::NetworkError
                )
            })?;

            match response.status() {
                status if status.is_success() => {
                    if response.content_length() == Some(0) {
                        return Ok(serde_json::Value::Null);
                    }
                    return response.json().await.or(Ok(serde_json::Value::Null));
                }
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    let refreshed = refresh_user_token(&self.user_id).await?;
                    *self.access_token.lock().await = refreshed.access_token;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(raise_error!(
                        format!("Gmail authorization for '{}' was rejected", self.user_id),
                        ErrorCode::Unauthenticated
                    ));
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(raise_error!(
                        format!("Gmail API returned {status}: {body}"),
                        ErrorCode::GmailApiCallFailed
                    ));
                }
            }
        }
        Err(raise_error!(
            "Gmail API retry loop exhausted".into(),
            ErrorCode::GmailApiCallFailed
        ))
    }

    fn chunks(ids: &[String]) -> impl Iterator<Item = &[String]> {
        ids.chunks(SETTINGS.mailsweep_gmail_batch_size.max(1) as usize)
    }
}

impl GmailApi for GmailClient {
    async fn batch_modify(
        &self,
        ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> MailSweepResult<()> {
        let url = format!("{GMAIL_BASE_URL}/messages/batchModify");
        for chunk in Self::chunks(ids) {
            self.post_json(
                &url,
                Some(json!({
                    "ids": chunk,
                    "addLabelIds": add_label_ids,
                    "removeLabelIds": remove_label_ids,
                })),
            )
            .await?;
        }
        Ok(())
    }

    async fn batch_trash(&self, ids: &[String]) -> MailSweepResult<()> {
        for id in ids {
            let url = format!("{GMAIL_BASE_URL}/messages/{id}/trash");
            self.post_json(&url, None).await?;
        }
        Ok(())
    }

    async fn batch_untrash(&self, ids: &[String]) -> MailSweepResult<()> {
        for id in ids {
            let url = format!("{GMAIL_BASE_URL}/messages/{id}/untrash");
            self.post_json(&url, None).await?;
        }
        Ok(())
    }

    async fn batch_delete(&self, ids: &[String]) -> MailSweepResult<()> {
        let url = format!("{GMAIL_BASE_URL}/messages/batchDelete");
        for chunk in Self::chunks(ids) {
            self.post_json(&url, Some(json!({ "ids": chunk }))).await?;
        }
        Ok(())
    }

    async fn list_message_ids(
        &self,
        label_id: &str,
        max_results: u32,
    ) -> MailSweepResult<Vec<String>> {
        #[derive(Deserialize)]
        struct MessageRef {
            id: String,
        }
        #[derive(Deserialize)]
        struct MessageList {
            #[serde(default)]
            messages: Vec<MessageRef>,
            #[serde(rename = "nextPageToken")]
            next_page_token: Option<String>,
        }

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        while (ids.len() as u32) < max_results {
            let mut url = format!(
                "{GMAIL_BASE_URL}/messages?labelIds={label_id}&maxResults={}",
                (max_results - ids.len() as u32).min(500)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={token}"));
            }
            let value = self.execute(|token| self.http.get(&url).bearer_auth(token)).await?;
            let list: MessageList = serde_json::from_value(value).map_err(|e| {
                raise_error!(
                    format!(
                        "Failed to deserialize Gmail API response into MessageList: {:#?}",
                        e
                    ),
                    ErrorCode::GmailApiCallFailed
                )
            })?;
            ids.extend(list.messages.into_iter().map(|m| m.id));
            page_token = list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        ids.truncate(max_results as usize);
        Ok(ids)
    }
}
