// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum AccessType {
    #[default]
    DirectView,
    SearchResult,
    ThreadView,
}

/// Append-only record of one access to one message.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 13, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct AccessEventEntity {
    #[secondary_key(unique)]
    pub id: u64,
    #[secondary_key]
    pub email_id: String,
    pub access_type: AccessType,
    pub timestamp: i64,
    pub search_query: Option<String>,
    pub user_context: Option<String>,
}

impl AccessEventEntity {
    fn pk(&self) -> String {
        format!("{}_{}", self.timestamp, self.id)
    }
}

/// Derived per-message access profile, recomputed incrementally as events
/// arrive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 14, version = 1)]
#[native_db]
pub struct AccessSummaryEntity {
    #[primary_key]
    pub email_id: String,
    pub total_accesses: u64,
    pub last_accessed: Option<i64>,
    pub search_appearances: u64,
    pub search_interactions: u64,
    pub access_score: f64,
    pub updated_at: i64,
}
