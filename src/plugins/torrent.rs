//! Torrent plugin
//!
//! Accepts `.torrent` uploads into its `torrents` data directory and keeps a
//! table of the files found there.

use crate::error::{HomeError, Result};
use crate::plugin::{Namespace, PluginDescriptor, Producer, StatementTemplate};
use crate::plugins::byte_count_decimal;
use crate::row;
use crate::store::{BatchWrite, SqlValue, StorageGateway};
use async_trait::async_trait;
use axum::{
    extract::State,
    routing::{get, post},
    Json,
};
use axum_extra::extract::Multipart;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "TorrentPlugin";

const TORRENTS_DIR: &str = "torrents";
const DOWNLOADS_DIR: &str = "downloads";
const EXTENSION: &str = ".torrent";
const UPLOAD_FIELD: &str = "torrentfile";

pub const SCHEMA: [&str; 1] = ["CREATE TABLE IF NOT EXISTS {plugin}_torrent_file (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        size BIGINT,
        added TIMESTAMPTZ NOT NULL DEFAULT now()
    );"];

pub const TABLES: [&str; 1] = ["{plugin}_torrent_file"];

const UPSERT_TORRENT_FILE: &str = "INSERT INTO {plugin}_torrent_file (name, size) VALUES ($1, $2) \
     ON CONFLICT (name) DO UPDATE SET size = EXCLUDED.size;";

pub fn plugin(gateway: Arc<StorageGateway>, data_root: &Path) -> PluginDescriptor {
    let namespace = Namespace::new(NAME);
    let torrent_dir = namespace.data_dir(data_root, TORRENTS_DIR);

    let state = TorrentState {
        gateway,
        torrent_dir: torrent_dir.clone(),
        table: namespace.table("torrent_file"),
    };

    PluginDescriptor::new(
        NAME,
        "Download torrents",
        "Internet",
        TorrentScanner::new(torrent_dir, &namespace),
    )
    .with_schema(SCHEMA)
    .with_tables(TABLES)
    .with_api_route("/add/", post(add_torrent).with_state(state.clone()))
    .with_view_route("/", get(list_torrents).with_state(state))
    .with_data_dirs([TORRENTS_DIR, DOWNLOADS_DIR])
}

/// Upserts one row per `.torrent` file in the plugin's torrents directory
pub struct TorrentScanner {
    dir: PathBuf,
    statement: String,
}

impl TorrentScanner {
    pub fn new(dir: PathBuf, namespace: &Namespace) -> Self {
        Self {
            dir,
            statement: StatementTemplate::parse(UPSERT_TORRENT_FILE).render(namespace),
        }
    }
}

#[async_trait]
impl Producer for TorrentScanner {
    async fn produce(&self) -> Result<Vec<BatchWrite>> {
        let mut batch = BatchWrite::new(self.statement.clone());

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Torrent directory {} does not exist yet", self.dir.display());
                return Ok(vec![batch]);
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(EXTENSION) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                files.push((name, metadata.len()));
            }
        }

        files.sort();
        for (name, size) in files {
            batch.push_row(row![name, i64::try_from(size).unwrap_or(i64::MAX)]);
        }

        info!("Found {} torrent files", batch.len());
        Ok(vec![batch])
    }
}

#[derive(Clone)]
struct TorrentState {
    gateway: Arc<StorageGateway>,
    torrent_dir: PathBuf,
    table: String,
}

#[derive(Debug, Serialize)]
pub struct AddTorrentResponse {
    pub status: u16,
    pub status_text: String,
    pub file: String,
}

/// Stored file name: the final path component of the upload, with the
/// `.torrent` extension added when missing
pub fn torrent_file_name(upload_name: &str) -> Option<String> {
    let base = Path::new(upload_name).file_name()?.to_string_lossy().to_string();
    if base.is_empty() {
        return None;
    }

    if base.ends_with(EXTENSION) {
        Some(base)
    } else {
        Some(format!("{}{}", base, EXTENSION))
    }
}

async fn add_torrent(
    State(state): State<TorrentState>,
    mut multipart: Multipart,
) -> Result<Json<AddTorrentResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| HomeError::InvalidRequest {
        message: format!("Failed to parse multipart form: {}", e),
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            warn!("Unknown field in multipart: {}", field.name().unwrap_or(""));
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(torrent_file_name)
            .ok_or_else(|| HomeError::InvalidRequest {
                message: "Upload is missing a file name".to_string(),
            })?;

        let data = field.bytes().await.map_err(|e| HomeError::InvalidRequest {
            message: format!("Failed to read torrent file: {}", e),
        })?;

        let path = state.torrent_dir.join(&file_name);
        tokio::fs::write(&path, &data).await?;
        info!("Stored torrent {} ({} bytes)", path.display(), data.len());

        return Ok(Json(AddTorrentResponse {
            status: 200,
            status_text: "Torrent successfully added".to_string(),
            file: file_name,
        }));
    }

    Err(HomeError::InvalidRequest {
        message: format!("Missing '{}' field", UPLOAD_FIELD),
    })
}

#[derive(Debug, Serialize)]
pub struct TorrentFile {
    pub id: i64,
    pub name: String,
    pub size: Option<i64>,
    pub readable_size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TorrentListResponse {
    pub count: usize,
    pub torrents: Vec<TorrentFile>,
}

async fn list_torrents(State(state): State<TorrentState>) -> Json<TorrentListResponse> {
    let sql = format!("SELECT id, name, size FROM {} ORDER BY name;", state.table);
    let rows = state.gateway.query(&sql, &[] as &[SqlValue]).await.collect().await;

    let torrents: Vec<TorrentFile> = rows
        .iter()
        .map(|row| {
            let size = row.int("size");
            TorrentFile {
                id: row.int("id").unwrap_or_default(),
                name: row.text("name").unwrap_or_default(),
                size,
                readable_size: size.map(|s| byte_count_decimal(s.max(0) as u64)),
            }
        })
        .collect();

    Json(TorrentListResponse {
        count: torrents.len(),
        torrents,
    })
}
