// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, LazyLock};

use ahash::AHashMap;
use tokio::fs;

use crate::{
    modules::{
        email::entity::EmailIndex,
        error::{code::ErrorCode, MailSweepResult},
        settings::dir::DATA_DIR_MANAGER,
    },
    raise_error,
};

/// One export encoding. Implementations are registered at startup and
/// looked up by the format name carried on a policy's action.
pub trait ExportFormatter: Send + Sync {
    fn format_name(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn render(&self, emails: &[EmailIndex]) -> MailSweepResult<String>;
}

pub struct FormatterRegistry {
    formatters: AHashMap<String, Arc<dyn ExportFormatter>>,
}

static EXPORT_REGISTRY: LazyLock<FormatterRegistry> = LazyLock::new(|| {
    let mut registry = FormatterRegistry {
        formatters: AHashMap::new(),
    };
    registry.register(Arc::new(JsonFormatter));
    registry.register(Arc::new(CsvFormatter));
    registry
});

impl FormatterRegistry {
    fn register(&mut self, formatter: Arc<dyn ExportFormatter>) {
        self.formatters
            .insert(formatter.format_name().to_string(), formatter);
    }

    pub fn get(format: &str) -> MailSweepResult<Arc<dyn ExportFormatter>> {
        EXPORT_REGISTRY
            .formatters
            .get(&format.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                raise_error!(
                    format!("Unknown export format '{format}'"),
                    ErrorCode::InvalidParameter
                )
            })
    }

    pub fn known_formats() -> Vec<String> {
        EXPORT_REGISTRY.formatters.keys().cloned().collect()
    }
}

/// Renders one batch and streams it to the user's export directory.
/// Returns the file location and its size in bytes.
pub async fn export_batch(
    user_id: &str,
    archive_id: u64,
    format: &str,
    emails: &[EmailIndex],
) -> MailSweepResult<(String, u64)> {
    let formatter = FormatterRegistry::get(format)?;
    let rendered = formatter.render(emails)?;
    let dir = DATA_DIR_MANAGER.user_export_dir(user_id)?;
    let path = dir.join(format!("{archive_id}.{}", formatter.file_extension()));
    fs::write(&path, rendered.as_bytes()).await.map_err(|e| {
        raise_error!(
            format!("Failed to write export file {:?}: {e}", path),
            ErrorCode::InternalError
        )
    })?;
    Ok((path.to_string_lossy().into_owned(), rendered.len() as u64))
}

struct JsonFormatter;

impl ExportFormatter for JsonFormatter {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, emails: &[EmailIndex]) -> MailSweepResult<String> {
        serde_json::to_string_pretty(emails)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
    }
}

struct CsvFormatter;

impl ExportFormatter for CsvFormatter {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, emails: &[EmailIndex]) -> MailSweepResult<String> {
        let mut out = String::from("email_id,thread_id,sender,subject,date,size,labels\n");
        for email in emails {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                csv_escape(&email.email_id),
                csv_escape(&email.thread_id),
                csv_escape(&email.sender),
                csv_escape(&email.subject),
                email.date.map(|d| d.to_string()).unwrap_or_default(),
                email.size.map(|s| s.to_string()).unwrap_or_default(),
                csv_escape(&email.labels.join("|")),
            ));
        }
        Ok(out)
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<EmailIndex> {
        vec![EmailIndex {
            email_id: "e1".into(),
            thread_id: "t1".into(),
            sender: "a@example.com".into(),
            subject: "Hello, world".into(),
            labels: vec!["INBOX".into()],
            size: Some(10),
            ..Default::default()
        }]
    }

    #[test]
    fn unknown_format_is_invalid() {
        assert!(FormatterRegistry::get("mbox").is_err());
        assert!(FormatterRegistry::get("json").is_ok());
        assert!(FormatterRegistry::get("CSV").is_ok());
    }

    #[test]
    fn csv_escapes_commas() {
        let rendered = CsvFormatter.render(&sample()).unwrap();
        assert!(rendered.contains("\"Hello, world\""));
    }

    #[test]
    fn json_round_trips() {
        let rendered = JsonFormatter.render(&sample()).unwrap();
        let parsed: Vec<EmailIndex> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0].email_id, "e1");
    }
}
