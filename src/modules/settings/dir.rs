// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use crate::{
    modules::{
        common::Initialize,
        error::{code::ErrorCode, MailSweepResult},
        settings::cli::SETTINGS,
    },
    raise_error,
};

pub const META_FILE: &str = "meta.db";
pub const USER_DB_FILE: &str = "mailbox.db";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> = LazyLock::new(DataDirManager::new);

/// Owns the on-disk layout below the configured storage root:
/// `meta.db`, `users/<user_id>/mailbox.db`, `tokens/<user_id>_token.enc`,
/// `users/<user_id>/exports/` and `logs/`.
pub struct DataDirManager {
    pub root: PathBuf,
    pub meta_db: PathBuf,
    pub users_dir: PathBuf,
    pub tokens_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl DataDirManager {
    fn new() -> Self {
        let root = PathBuf::from(&SETTINGS.mailsweep_storage_path);
        DataDirManager {
            meta_db: root.join(META_FILE),
            users_dir: root.join("users"),
            tokens_dir: root.join("tokens"),
            logs_dir: root.join("logs"),
            root,
        }
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.users_dir.join(user_id)
    }

    pub fn user_db_path(&self, user_id: &str) -> MailSweepResult<PathBuf> {
        let dir = self.user_dir(user_id);
        ensure_dir(&dir)?;
        Ok(dir.join(USER_DB_FILE))
    }

    pub fn user_export_dir(&self, user_id: &str) -> MailSweepResult<PathBuf> {
        let dir = self.user_dir(user_id).join("exports");
        ensure_dir(&dir)?;
        Ok(dir)
    }

    pub fn token_file(&self, user_id: &str) -> PathBuf {
        self.tokens_dir.join(format!("{user_id}_token.enc"))
    }
}

fn ensure_dir(dir: &Path) -> MailSweepResult<()> {
    fs::create_dir_all(dir).map_err(|e| {
        raise_error!(
            format!("Failed to create directory {:?}: {e}", dir),
            ErrorCode::InternalError
        )
    })
}

impl Initialize for DataDirManager {
    async fn initialize() -> MailSweepResult<()> {
        ensure_dir(&DATA_DIR_MANAGER.root)?;
        ensure_dir(&DATA_DIR_MANAGER.users_dir)?;
        ensure_dir(&DATA_DIR_MANAGER.tokens_dir)?;
        if SETTINGS.mailsweep_log_to_file {
            ensure_dir(&DATA_DIR_MANAGER.logs_dir)?;
        }
        Ok(())
    }
}
