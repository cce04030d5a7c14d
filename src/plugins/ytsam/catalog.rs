//! Movie catalog boundary
//!
//! The producer only sees [`MovieCatalog`]; [`YtsCatalog`] is the HTTP adapter
//! for the YTS list endpoint.

use crate::error::{HomeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogTorrent {
    pub quality: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogMovie {
    pub title: String,
    pub year: i32,
    pub rating: f64,
    pub runtime: i32,
    #[serde(rename = "description_full")]
    pub description: String,
    #[serde(rename = "large_cover_image")]
    pub cover_image: String,
    pub genres: Vec<String>,
    pub torrents: Vec<CatalogTorrent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListData {
    movie_count: u64,
    page_number: u32,
    movies: Vec<CatalogMovie>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListResponse {
    status: String,
    status_message: String,
    data: ListData,
}

/// A paged source of movies. Page numbers start at 1; an empty page ends the listing.
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    async fn page(&self, page: u32) -> Result<Vec<CatalogMovie>>;
}

pub struct YtsCatalog {
    client: reqwest::Client,
    base_url: String,
    limit: u32,
}

impl YtsCatalog {
    pub fn new(base_url: &str, limit: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            limit,
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}list_movies.json?limit={}&page={}", self.base_url, self.limit, page)
    }
}

#[async_trait]
impl MovieCatalog for YtsCatalog {
    async fn page(&self, page: u32) -> Result<Vec<CatalogMovie>> {
        let response = self
            .client
            .get(self.page_url(page))
            .send()
            .await?
            .error_for_status()?;

        let body: ListResponse = response.json().await?;
        parse_listing(body)
    }
}

fn parse_listing(body: ListResponse) -> Result<Vec<CatalogMovie>> {
    if body.status != "ok" {
        return Err(HomeError::Catalog {
            cause: format!("Query failed: {}", body.status_message),
        });
    }

    debug!(
        "Catalog page {} returned {} movies ({} total)",
        body.data.page_number,
        body.data.movies.len(),
        body.data.movie_count
    );

    Ok(body.data.movies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_deserializes_catalog_fields() {
        let body: ListResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "status_message": "Query was successful",
                "data": {
                    "movie_count": 1,
                    "page_number": 1,
                    "movies": [{
                        "id": 10,
                        "title": "Arrival",
                        "year": 2016,
                        "rating": 7.9,
                        "runtime": 116,
                        "description_full": "A linguist is recruited.",
                        "large_cover_image": "https://img/arrival.jpg",
                        "genres": ["Drama", "Sci-Fi"],
                        "torrents": [{"quality": "1080p", "type": "bluray", "size": "1.9 GB", "url": "https://t/1"}]
                    }]
                }
            }"#,
        )
        .unwrap();

        let movies = parse_listing(body).unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].description, "A linguist is recruited.");
        assert_eq!(movies[0].torrents[0].kind, "bluray");
    }

    #[test]
    fn test_listing_without_movies_is_an_empty_page() {
        let body: ListResponse =
            serde_json::from_str(r#"{"status": "ok", "data": {"movie_count": 12, "page_number": 9}}"#).unwrap();
        assert!(parse_listing(body).unwrap().is_empty());
    }

    #[test]
    fn test_listing_with_error_status_fails() {
        let body: ListResponse =
            serde_json::from_str(r#"{"status": "error", "status_message": "Invalid page"}"#).unwrap();
        let err = parse_listing(body).unwrap_err();
        assert!(err.to_string().contains("Invalid page"));
    }

    #[test]
    fn test_page_url() {
        let catalog = YtsCatalog::new("https://yts.am/api/v2", 50).unwrap();
        assert_eq!(
            catalog.page_url(3),
            "https://yts.am/api/v2/list_movies.json?limit=50&page=3"
        );
    }
}
