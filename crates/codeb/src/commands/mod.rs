pub mod preview;
pub mod registry;

use codeb_registry::{DeployStatus, PreviewEntry};
use colored::{ColoredString, Colorize};
use serde::Serialize;

/// `--json` 時の出力
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn status_label(status: DeployStatus) -> ColoredString {
    match status {
        DeployStatus::Running => status.to_string().green(),
        DeployStatus::Pending => status.to_string().yellow(),
        DeployStatus::Stopped => status.to_string().red(),
    }
}

/// Preview 一覧の行（期限切れは赤で表示）
pub fn print_preview_rows(entries: &[PreviewEntry<'_>]) {
    for entry in entries {
        let expires = entry
            .preview
            .expires_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let expires = if entry.expired {
            format!("{} (期限切れ)", expires).red()
        } else {
            expires.dimmed()
        };
        println!(
            "  {:<24} {:<6} {:<44} {:<8} {}",
            entry.key.yellow(),
            entry.preview.port,
            entry.preview.url,
            status_label(entry.preview.status),
            expires
        );
    }
}
