//! Plain-text statistics for the dashboard widgets

use crate::api::AppState;
use crate::plugins::byte_count_decimal;
use axum::extract::State;
use tracing::warn;

pub async fn plugin_count(State(state): State<AppState>) -> String {
    state.registry.len().to_string()
}

pub async fn processor_count() -> String {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .to_string()
}

/// Resident memory of this process, read from `/proc/self/status`
pub async fn memory_usage() -> String {
    match tokio::fs::read_to_string("/proc/self/status").await {
        Ok(status) => match resident_bytes(&status) {
            Some(bytes) => byte_count_decimal(bytes),
            None => {
                warn!("No VmRSS entry in /proc/self/status");
                "unknown".to_string()
            }
        },
        Err(e) => {
            warn!("Failed to read process status: {}", e);
            "unknown".to_string()
        }
    }
}

/// `VmRSS` of a `/proc/<pid>/status` document, in bytes
fn resident_bytes(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let mut fields = line["VmRSS:".len()..].split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;

    match fields.next() {
        Some("kB") => value.checked_mul(1024),
        None => Some(value),
        Some(_) => None,
    }
}

/// Combined size of the files in the log directory
pub async fn log_size(State(state): State<AppState>) -> String {
    let mut total: u64 = 0;

    match tokio::fs::read_dir(&state.log_dir).await {
        Ok(mut entries) => loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => match entry.metadata().await {
                    Ok(metadata) if metadata.is_file() => total += metadata.len(),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to access {}: {}", entry.path().display(), e),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read log directory: {}", e);
                    break;
                }
            }
        },
        Err(e) => warn!("Failed to access {}: {}", state.log_dir.display(), e),
    }

    byte_count_decimal(total)
}
