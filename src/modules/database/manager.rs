use crate::modules::common::Initialize;
use crate::modules::database::{SchemaMeta, META_MODELS, USER_MODELS, USER_SCHEMA_VERSION};
use crate::modules::error::{code::ErrorCode, MailSweepError, MailSweepResult};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::{raise_error, utc_now};
use dashmap::DashMap;
use native_db::{Builder, Database};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::info;

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

/// Owns the process-wide metadata database and hands out per-user database
/// handles. Each user has at most one live handle; concurrent callers for
/// the same user share it.
pub struct DatabaseManager {
    meta_db: Arc<Database<'static>>,
    user_handles: DashMap<String, Arc<Database<'static>>>,
    open_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let meta_db = Self::init_meta_database().expect("Failed to initialize metadata database");
        DatabaseManager {
            meta_db,
            user_handles: DashMap::new(),
            open_locks: DashMap::new(),
        }
    }

    pub fn meta_db(&self) -> &Arc<Database<'static>> {
        &self.meta_db
    }

    /// Returns the shared handle for `user_id`, opening the database on
    /// first use. The per-user open lock prevents two callers from racing
    /// redb's exclusive file lock.
    pub async fn user_db(&self, user_id: &str) -> MailSweepResult<Arc<Database<'static>>> {
        if let Some(handle) = self.user_handles.get(user_id) {
            return Ok(handle.clone());
        }

        let lock = self
            .open_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(handle) = self.user_handles.get(user_id) {
            return Ok(handle.clone());
        }

        let owned = user_id.to_string();
        let database =
            tokio::task::spawn_blocking(move || Self::open_user_database(&owned))
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))??;
        self.user_handles
            .insert(user_id.to_string(), database.clone());
        Ok(database)
    }

    /// Users whose databases are currently open; the job flow polls these.
    pub fn open_users(&self) -> Vec<String> {
        self.user_handles
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn init_meta_database() -> MailSweepResult<Arc<Database<'static>>> {
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .mailsweep_metadata_cache_size
                    .unwrap_or(134217728)
                    .max(67108864),
            ) //default 128MB
            .create(&META_MODELS, DATA_DIR_MANAGER.meta_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    fn open_user_database(user_id: &str) -> MailSweepResult<Arc<Database<'static>>> {
        let path = DATA_DIR_MANAGER.user_db_path(user_id)?;
        info!("Opening user database at: {:?}", path);
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .mailsweep_user_db_cache_size
                    .unwrap_or(134217728)
                    .max(67108864),
            ) //default 128MB
            .create(&USER_MODELS, path)
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Self::apply_schema_version(&database)?;
        Ok(Arc::new(database))
    }

    /// Forward-only schema versioning: a fresh database is stamped with the
    /// current version, an older stamp is migrated up, and a newer stamp
    /// means a newer binary wrote this file so we fail open.
    fn apply_schema_version(database: &Database<'static>) -> MailSweepResult<()> {
        let rw = database
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let existing: Option<SchemaMeta> = rw
            .get()
            .primary("schema".to_string())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

        match existing {
            Some(meta) if meta.version > USER_SCHEMA_VERSION => {
                return Err(raise_error!(
                    format!(
                        "User database schema version {} is newer than supported version {}",
                        meta.version, USER_SCHEMA_VERSION
                    ),
                    ErrorCode::SchemaTooNew
                ));
            }
            Some(meta) if meta.version < USER_SCHEMA_VERSION => {
                // Row-level upgrades ride on native_model versioning; only
                // the stamp needs to move forward here.
                let updated = SchemaMeta {
                    key: "schema".into(),
                    version: USER_SCHEMA_VERSION,
                    updated_at: utc_now!(),
                };
                rw.update(meta, updated)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            }
            Some(_) => {}
            None => {
                rw.insert(SchemaMeta {
                    key: "schema".into(),
                    version: USER_SCHEMA_VERSION,
                    updated_at: utc_now!(),
                })
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            }
        }
        rw.commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }

    fn handle_database_error(error: native_db::db_type::Error) -> MailSweepError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::InternalError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::InternalError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::DataCorrupted
                )
            }
        }
    }
}

impl Initialize for DatabaseManager {
    async fn initialize() -> MailSweepResult<()> {
        // Touch the LazyLock so the metadata database opens (and fails)
        // during startup rather than on the first request.
        let _ = DB_MANAGER.meta_db();
        Ok(())
    }
}
