// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    decrypt, encrypt,
    modules::{
        error::{code::ErrorCode, MailSweepResult},
        settings::dir::DATA_DIR_MANAGER,
    },
    raise_error, utc_now,
};

/// Decrypted shape of one user's token file. On disk it is the encrypted
/// JSON under `storage_root/tokens/<user_id>_token.enc`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// UNIX epoch milliseconds after which the access token is stale
    pub expires_at: i64,
    pub scopes: Vec<String>,
    pub updated_at: i64,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= utc_now!()
    }

    pub fn expires_within_ms(&self, window_ms: i64) -> bool {
        self.expires_at <= utc_now!() + window_ms
    }
}

pub struct TokenStore;

impl TokenStore {
    pub async fn store(user_id: &str, token: &StoredToken) -> MailSweepResult<()> {
        let serialized = serde_json::to_string(token)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let sealed = encrypt!(&serialized)?;
        let path = DATA_DIR_MANAGER.token_file(user_id);
        fs::write(&path, sealed).await.map_err(|e| {
            raise_error!(
                format!("Failed to write token file {:?}: {e}", path),
                ErrorCode::InternalError
            )
        })
    }

    pub async fn load(user_id: &str) -> MailSweepResult<Option<StoredToken>> {
        let path = DATA_DIR_MANAGER.token_file(user_id);
        let sealed = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(raise_error!(
                    format!("Failed to read token file {:?}: {e}", path),
                    ErrorCode::InternalError
                ))
            }
        };
        let serialized = decrypt!(&sealed)?;
        let token = serde_json::from_str(&serialized).map_err(|e| {
            raise_error!(
                format!("Token file for '{user_id}' is corrupted: {e}"),
                ErrorCode::DataCorrupted
            )
        })?;
        Ok(Some(token))
    }

    pub async fn require(user_id: &str) -> MailSweepResult<StoredToken> {
        Self::load(user_id).await?.ok_or_else(|| {
            raise_error!(
                format!("No Gmail authorization on file for '{user_id}'"),
                ErrorCode::Unauthenticated
            )
        })
    }

    pub async fn remove(user_id: &str) -> MailSweepResult<()> {
        let path = DATA_DIR_MANAGER.token_file(user_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(raise_error!(
                format!("Failed to remove token file {:?}: {e}", path),
                ErrorCode::InternalError
            )),
        }
    }

    /// Users that currently have a token file; the refresh janitor walks
    /// these.
    pub async fn authorized_users() -> MailSweepResult<Vec<String>> {
        let mut users = Vec::new();
        let mut entries = match fs::read_dir(&DATA_DIR_MANAGER.tokens_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(users),
            Err(e) => {
                return Err(raise_error!(
                    format!("Failed to list token directory: {e}"),
                    ErrorCode::InternalError
                ))
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await.map_err(|e| {
            raise_error!(
                format!("Failed to read token directory: {e}"),
                ErrorCode::InternalError
            )
        }) {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(user_id) = name.strip_suffix("_token.enc") {
                    users.push(user_id.to_string());
                }
            }
        }
        Ok(users)
    }
}
