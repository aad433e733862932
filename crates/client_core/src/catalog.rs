//! Movie browser: catalog client and the screen that lists one feed page.

use async_trait::async_trait;
use reqwest::{header, Client};
use shared::domain::{Movie, MoviePage};
use tracing::{debug, info};

use crate::{
    config::ClientSettings,
    error::{ClientError, Result},
    http::{endpoint, read_json},
    load_state::LoadState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovieFeed {
    #[default]
    Popular,
    NowPlaying,
}

impl MovieFeed {
    fn path(self) -> &'static str {
        match self {
            Self::Popular => "movie/popular",
            Self::NowPlaying => "movie/now_playing",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            Self::Popular => "Popular movies",
            Self::NowPlaying => "Now playing",
        }
    }
}

#[async_trait]
pub trait MovieCatalog: Send + Sync {
    async fn popular(&self, page: u32) -> Result<MoviePage>;
    async fn now_playing(&self, page: u32) -> Result<MoviePage>;

    async fn feed(&self, feed: MovieFeed, page: u32) -> Result<MoviePage> {
        match feed {
            MovieFeed::Popular => self.popular(page).await,
            MovieFeed::NowPlaying => self.now_playing(page).await,
        }
    }
}

pub struct CatalogClient {
    http: Client,
    base_url: String,
    token: String,
    language: String,
}

impl CatalogClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            language: language.into(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            settings.catalog_base_url.clone(),
            settings.catalog_token.clone(),
            settings.catalog_language.clone(),
        )
    }

    async fn fetch(&self, feed: MovieFeed, page: u32) -> Result<MoviePage> {
        if self.token.trim().is_empty() {
            return Err(ClientError::Validation(
                "catalog token is not configured; set SCREENS__CATALOG_TOKEN".into(),
            ));
        }
        let url = endpoint(&self.base_url, feed.path())?;
        debug!(%url, page, "fetching catalog page");
        let res = self
            .http
            .get(url)
            .query(&[("language", self.language.as_str())])
            .query(&[("page", page)])
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .send()
            .await?;
        read_json(res).await
    }
}

#[async_trait]
impl MovieCatalog for CatalogClient {
    async fn popular(&self, page: u32) -> Result<MoviePage> {
        self.fetch(MovieFeed::Popular, page).await
    }

    async fn now_playing(&self, page: u32) -> Result<MoviePage> {
        self.fetch(MovieFeed::NowPlaying, page).await
    }
}

pub struct MovieScreen<C: MovieCatalog> {
    catalog: C,
    feed: MovieFeed,
    state: LoadState<Vec<Movie>>,
}

impl<C: MovieCatalog> MovieScreen<C> {
    pub fn new(catalog: C, feed: MovieFeed) -> Self {
        Self {
            catalog,
            feed,
            state: LoadState::Idle,
        }
    }

    pub fn state(&self) -> &LoadState<Vec<Movie>> {
        &self.state
    }

    /// Issues exactly one catalog request for the first page of the feed.
    pub async fn mount(&mut self) {
        self.state = LoadState::Loading;
        let result = self
            .catalog
            .feed(self.feed, 1)
            .await
            .map(|page| page.results);
        if let Ok(movies) = &result {
            info!(feed = ?self.feed, count = movies.len(), "movies loaded");
        }
        self.state = LoadState::from_result(result, "movies");
    }

    pub fn render(&self) -> Vec<String> {
        match &self.state {
            LoadState::Idle => Vec::new(),
            LoadState::Loading => vec!["loading movies...".to_string()],
            LoadState::Failed(message) => vec![format!("could not load movies: {message}")],
            LoadState::Ready(movies) => movies.iter().map(render_movie).collect(),
        }
    }
}

fn render_movie(movie: &Movie) -> String {
    let mut line = format!("{} (popularity {:.1})", movie.title, movie.popularity);
    if let Some(date) = movie.release_date.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(&format!(" [{date}]"));
    }
    line
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
