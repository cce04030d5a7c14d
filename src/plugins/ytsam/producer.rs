use crate::error::Result;
use crate::plugin::{Namespace, Producer, StatementTemplate};
use crate::plugins::ytsam::catalog::{CatalogMovie, MovieCatalog};
use crate::row;
use crate::store::BatchWrite;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

const INSERT_GENRE: &str = "INSERT INTO {plugin}_genre (name) VALUES ($1) ON CONFLICT DO NOTHING;";

const INSERT_MOVIE: &str = "INSERT INTO {plugin}_movie (title, year, rating, length, description, cover_image) \
     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING;";

const INSERT_MOVIE_GENRE: &str = "INSERT INTO {plugin}_movie_genre (movie_id, genre_id) VALUES (\
     (SELECT id FROM {plugin}_movie WHERE title = $1), \
     (SELECT id FROM {plugin}_genre WHERE name = $2)) ON CONFLICT DO NOTHING;";

const INSERT_TORRENT: &str = "INSERT INTO {plugin}_torrent (quality, type, size, url, movie) \
     VALUES ($1, $2, $3, $4, (SELECT id FROM {plugin}_movie WHERE title = $5)) ON CONFLICT DO NOTHING;";

/// Pages through the catalog and turns every movie into rows for four
/// batches: genres, movies, movie-genre links, torrents. The links and
/// torrents resolve their foreign keys by title, so batch order matters.
pub struct MovieProducer {
    catalog: Arc<dyn MovieCatalog>,
    namespace: Namespace,
    max_pages: Option<u32>,
}

impl MovieProducer {
    pub fn new(catalog: Arc<dyn MovieCatalog>, namespace: Namespace, max_pages: Option<u32>) -> Self {
        Self {
            catalog,
            namespace,
            max_pages,
        }
    }

    fn statement(&self, template: &str) -> String {
        StatementTemplate::parse(template).render(&self.namespace)
    }

    async fn fetch_all(&self) -> Result<Vec<CatalogMovie>> {
        let mut movies = Vec::new();
        let mut page = 1;

        loop {
            if self.max_pages.is_some_and(|max| page > max) {
                info!("Reached the page cap of {} pages", page - 1);
                break;
            }

            info!("Requesting page {}", page);
            let batch = match self.catalog.page(page).await {
                Ok(batch) => batch,
                // Nothing fetched yet means the catalog is unreachable
                Err(e) if movies.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Stopping at page {}: {}", page, e);
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            movies.extend(batch);
            page += 1;
        }

        Ok(movies)
    }

    fn build_batches(&self, movies: &[CatalogMovie]) -> Vec<BatchWrite> {
        let mut genres = BatchWrite::new(self.statement(INSERT_GENRE));
        let mut movie_rows = BatchWrite::new(self.statement(INSERT_MOVIE));
        let mut movie_genres = BatchWrite::new(self.statement(INSERT_MOVIE_GENRE));
        let mut torrents = BatchWrite::new(self.statement(INSERT_TORRENT));

        for movie in movies {
            movie_rows.push_row(row![
                movie.title.as_str(),
                movie.year,
                movie.rating,
                movie.runtime,
                movie.description.as_str(),
                movie.cover_image.as_str()
            ]);

            for genre in &movie.genres {
                genres.push_row(row![genre.as_str()]);
                movie_genres.push_row(row![movie.title.as_str(), genre.as_str()]);
            }

            for torrent in &movie.torrents {
                torrents.push_row(row![
                    torrent.quality.as_str(),
                    torrent.kind.as_str(),
                    torrent.size.as_str(),
                    torrent.url.as_str(),
                    movie.title.as_str()
                ]);
            }
        }

        vec![genres, movie_rows, movie_genres, torrents]
    }
}

#[async_trait]
impl Producer for MovieProducer {
    async fn produce(&self) -> Result<Vec<BatchWrite>> {
        let movies = self.fetch_all().await?;
        info!("Created rows for {} movies", movies.len());
        Ok(self.build_batches(&movies))
    }
}
