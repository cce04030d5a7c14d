//! Movie catalog plugin
//!
//! Pulls movies, genres and torrent links from a YTS-style catalog into four
//! namespaced tables and serves JSON views over them.

mod catalog;
mod producer;
mod views;

pub use catalog::{CatalogMovie, CatalogTorrent, MovieCatalog, YtsCatalog};
pub use producer::MovieProducer;
pub use views::{MovieDetail, MovieSummary, MovieViews, TorrentLink};

use crate::plugin::{Namespace, PluginDescriptor};
use crate::store::StorageGateway;
use axum::routing::get;
use std::sync::Arc;

pub const NAME: &str = "YTSAMPlugin";

pub const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS {plugin}_genre (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );",
    "CREATE TABLE IF NOT EXISTS {plugin}_movie (
        id SERIAL PRIMARY KEY,
        title TEXT NOT NULL UNIQUE,
        year INT,
        rating FLOAT,
        length INT,
        description TEXT,
        cover_image TEXT UNIQUE,
        downloaded BOOLEAN NOT NULL DEFAULT FALSE
    );",
    "CREATE TABLE IF NOT EXISTS {plugin}_torrent (
        id SERIAL PRIMARY KEY,
        quality TEXT,
        type TEXT,
        size TEXT,
        url TEXT,
        movie INT REFERENCES {plugin}_movie(id) ON UPDATE CASCADE,
        UNIQUE (movie, quality)
    );",
    "CREATE TABLE IF NOT EXISTS {plugin}_movie_genre (
        id SERIAL PRIMARY KEY,
        movie_id INT REFERENCES {plugin}_movie(id) ON UPDATE CASCADE ON DELETE CASCADE,
        genre_id INT REFERENCES {plugin}_genre(id) ON UPDATE CASCADE,
        UNIQUE (movie_id, genre_id)
    );",
];

/// Teardown order; drops cascade so dependents go with their parents
pub const TABLES: [&str; 4] = [
    "{plugin}_movie",
    "{plugin}_genre",
    "{plugin}_torrent",
    "{plugin}_movie_genre",
];

pub fn plugin(
    gateway: Arc<StorageGateway>,
    catalog: Arc<dyn MovieCatalog>,
    max_pages: Option<u32>,
) -> PluginDescriptor {
    let namespace = Namespace::new(NAME);
    let views = MovieViews::new(gateway, &namespace);

    PluginDescriptor::new(
        NAME,
        "Pulls movies from YTS.AM and allows you to download them",
        "Entertainment",
        MovieProducer::new(catalog, namespace, max_pages),
    )
    .with_schema(SCHEMA)
    .with_tables(TABLES)
    .with_view_route("/", get(views::overview).with_state(views.clone()))
    .with_view_route("/search/title/", get(views::search_title).with_state(views.clone()))
    .with_view_route("/view/{movieid}/", get(views::movie).with_state(views))
    .with_data_dirs(["torrents"])
}
