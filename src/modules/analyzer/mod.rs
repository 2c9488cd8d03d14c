use crate::modules::email::entity::EmailIndex;
use crate::modules::utils::{sender_domain, sender_local_part};
use crate::utc_now;

pub mod config;
pub mod date_size;
pub mod importance;
pub mod label;

const MS_PER_DAY: i64 = 86_400_000;

/// Everything an analyzer may look at for one message: the indexed row plus
/// a handful of fields derived once per analysis run. Analyzers are pure
/// functions over this context and their config.
#[derive(Clone, Debug)]
pub struct EmailAnalysisContext {
    pub email: EmailIndex,
    pub now: i64,
    pub age_days: Option<i64>,
    pub size_mb: Option<f64>,
    pub sender_domain: Option<String>,
    pub sender_local_part: Option<String>,
}

impl EmailAnalysisContext {
    pub fn new(email: EmailIndex) -> Self {
        Self::at(email, utc_now!())
    }

    /// Builds a context against an explicit clock; analysis stays
    /// deterministic under test.
    pub fn at(email: EmailIndex, now: i64) -> Self {
        let age_days = email.date.map(|date| ((now - date).max(0)) / MS_PER_DAY);
        let size_mb = email.size.map(|size| size as f64 / (1024.0 * 1024.0));
        let sender_domain = sender_domain(&email.sender);
        let sender_local_part = sender_local_part(&email.sender);
        Self {
            email,
            now,
            age_days,
            size_mb,
            sender_domain,
            sender_local_part,
        }
    }

    pub fn label_set(&self) -> Vec<String> {
        self.email
            .labels
            .iter()
            .map(|label| label.to_ascii_uppercase())
            .collect()
    }
}
