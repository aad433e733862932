use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ENV_PREFIX: &str = "SCREENS";

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub catalog_base_url: String,
    /// Bearer token for the movie catalog. Supplied through config or
    /// `SCREENS__CATALOG_TOKEN`, never compiled in.
    pub catalog_token: String,
    pub catalog_language: String,
    pub backend_url: String,
    pub token_path: PathBuf,
    pub search_debounce_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            catalog_base_url: "https://api.themoviedb.org/3".into(),
            catalog_token: String::new(),
            catalog_language: "en-US".into(),
            backend_url: "http://127.0.0.1:8080".into(),
            token_path: default_token_path(),
            search_debounce_ms: 800,
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("catalog_base_url", &self.catalog_base_url)
            .field(
                "catalog_token",
                &if self.catalog_token.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .field("catalog_language", &self.catalog_language)
            .field("backend_url", &self.backend_url)
            .field("token_path", &self.token_path)
            .field("search_debounce_ms", &self.search_debounce_ms)
            .finish()
    }
}

impl ClientSettings {
    /// Layers built-in defaults, then `screens.toml` (or `path` when given,
    /// which must then exist), then `SCREENS__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("screens").required(false),
        };
        Self::load_from(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(
        file: File<config::FileSourceFile, config::FileFormat>,
        env: Environment,
    ) -> Result<Self> {
        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(env.prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn default_token_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screens")
        .join("tokens.json")
}
