//! JSON views over the movie tables

use crate::error::{HomeError, Result};
use crate::plugin::Namespace;
use crate::store::{Row, SqlValue, StorageGateway};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PAGE_SIZE: i64 = 48;
const SEARCH_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct MovieViews {
    gateway: Arc<StorageGateway>,
    movie_table: String,
    genre_table: String,
    movie_genre_table: String,
    torrent_table: String,
}

impl MovieViews {
    pub fn new(gateway: Arc<StorageGateway>, namespace: &Namespace) -> Self {
        Self {
            gateway,
            movie_table: namespace.table("movie"),
            genre_table: namespace.table("genre"),
            movie_genre_table: namespace.table("movie_genre"),
            torrent_table: namespace.table("torrent"),
        }
    }

    pub async fn overview(&self, page: i64, downloaded: bool) -> Vec<MovieSummary> {
        let sql = format!(
            "SELECT id, title, cover_image, year, rating, length FROM {} \
             WHERE downloaded = $1 ORDER BY year DESC, title LIMIT $2 OFFSET $3;",
            self.movie_table
        );
        let Some(offset) = page.max(0).checked_mul(PAGE_SIZE) else {
            return Vec::new();
        };
        let params = [
            SqlValue::from(downloaded),
            SqlValue::from(PAGE_SIZE),
            SqlValue::from(offset),
        ];

        let rows = self.gateway.query(&sql, &params).await.collect().await;
        rows.iter().map(MovieSummary::from_row).collect()
    }

    pub async fn search_title(&self, title: &str, downloaded: bool) -> Vec<MovieSummary> {
        let sql = format!(
            "SELECT id, title, cover_image, year, rating, length FROM {} \
             WHERE downloaded = $1 AND to_tsvector('english', title) @@ plainto_tsquery('english', $2) \
             LIMIT $3;",
            self.movie_table
        );
        let params = [
            SqlValue::from(downloaded),
            SqlValue::from(title),
            SqlValue::from(SEARCH_LIMIT),
        ];

        let rows = self.gateway.query(&sql, &params).await.collect().await;
        rows.iter().map(MovieSummary::from_row).collect()
    }

    pub async fn movie(&self, id: i64) -> Option<MovieDetail> {
        let sql = format!(
            "SELECT id, title, year, rating, length, description, cover_image FROM {} WHERE id = $1;",
            self.movie_table
        );
        let mut rows = self.gateway.query(&sql, &[SqlValue::from(id)]).await;
        let row = rows.next().await?;
        rows.close();

        Some(MovieDetail {
            summary: MovieSummary::from_row(&row),
            description: row.text("description").unwrap_or_default(),
            genres: self.genres(id).await,
            torrents: self.torrents(id).await,
        })
    }

    async fn genres(&self, movie_id: i64) -> Vec<String> {
        let sql = format!(
            "SELECT name FROM {} WHERE id IN (SELECT genre_id FROM {} WHERE movie_id = $1) ORDER BY name;",
            self.genre_table, self.movie_genre_table
        );
        let rows = self.gateway.query(&sql, &[SqlValue::from(movie_id)]).await.collect().await;
        rows.iter().filter_map(|row| row.text("name")).collect()
    }

    async fn torrents(&self, movie_id: i64) -> Vec<TorrentLink> {
        let sql = format!(
            "SELECT id, quality, type, size, url FROM {} WHERE movie = $1 ORDER BY quality;",
            self.torrent_table
        );
        let rows = self.gateway.query(&sql, &[SqlValue::from(movie_id)]).await.collect().await;
        rows.iter().map(TorrentLink::from_row).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieSummary {
    pub id: i64,
    pub title: String,
    pub cover_image: Option<String>,
    pub year: Option<i64>,
    pub rating: Option<f64>,
    pub length: Option<i64>,
}

impl MovieSummary {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.int("id").unwrap_or_default(),
            title: row.text("title").unwrap_or_default(),
            cover_image: row.text("cover_image"),
            year: row.int("year"),
            rating: row.float("rating"),
            length: row.int("length"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentLink {
    pub id: i64,
    pub quality: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<String>,
    pub url: Option<String>,
}

impl TorrentLink {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.int("id").unwrap_or_default(),
            quality: row.text("quality"),
            kind: row.text("type"),
            size: row.text("size"),
            url: row.text("url"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub summary: MovieSummary,
    pub description: String,
    pub genres: Vec<String>,
    pub torrents: Vec<TorrentLink>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub page: Option<i64>,
    pub downloaded: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub downloaded: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub page: i64,
    pub count: usize,
    pub movies: Vec<MovieSummary>,
}

pub async fn overview(
    State(views): State<MovieViews>,
    Query(query): Query<OverviewQuery>,
) -> Json<MovieListResponse> {
    let page = query.page.unwrap_or(0);
    let movies = views.overview(page, query.downloaded.unwrap_or(false)).await;

    Json(MovieListResponse {
        page,
        count: movies.len(),
        movies,
    })
}

/// Falls back to the overview when no title is given
pub async fn search_title(
    State(views): State<MovieViews>,
    Query(query): Query<SearchQuery>,
) -> Json<MovieListResponse> {
    let downloaded = query.downloaded.unwrap_or(false);
    let movies = match query.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => views.search_title(title, downloaded).await,
        _ => views.overview(0, downloaded).await,
    };

    Json(MovieListResponse {
        page: 0,
        count: movies.len(),
        movies,
    })
}

pub async fn movie(
    State(views): State<MovieViews>,
    Path(movie_id): Path<i64>,
) -> Result<Json<MovieDetail>> {
    views
        .movie(movie_id)
        .await
        .map(Json)
        .ok_or_else(|| HomeError::NotFound {
            resource: format!("Movie {}", movie_id),
        })
}
