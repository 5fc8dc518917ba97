use std::env;
use std::time::Duration;

/// Process mode, taken from `NODE_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
    /// Production plus provider catalog indexing
    Seed,
}

impl RunMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" => RunMode::Production,
            "seed" => RunMode::Seed,
            _ => RunMode::Development,
        }
    }

    /// Whether a catalog sync runs at startup
    pub fn syncs_on_start(&self) -> bool {
        matches!(self, RunMode::Production | RunMode::Seed)
    }
}

/// Fatal configuration problems
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("TMDB_KEY is not set")]
    MissingTmdbKey,
    #[error("ADMIN_KEY must be set in {0:?} mode")]
    MissingAdminKey(RunMode),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub node_env: String,
    pub base_url: String,

    // PostgreSQL
    pub database_url: String,
    pub db_max_connections: u32,

    // Upstream catalog
    pub tmdb_key: String,
    pub tmdb_api_url: String,
    pub tmdb_image_url: String,
    pub tmdb_language: String,

    // Secondary metadata
    pub omdb_key: Option<String>,
    pub omdb_api_url: String,

    // Providers
    pub providers_url: String,
    pub app_url: String,
    pub proxy_url: Option<String>,
    pub addon_prefix: String,

    // Admin
    /// Admin routes are disabled when unset
    pub admin_key: Option<String>,

    // Caching
    pub stream_ttl_secs: u64,
    pub metadata_cache_ttl_secs: u64,
    pub metadata_cache_max_entries: Option<usize>,

    // Network
    pub probe_timeout_ms: u64,
    pub fetch_timeout_ms: u64,

    // Sync
    pub sync_pages: u32,
    pub sync_concurrency: usize,
    pub sync_max_attempts: u32,
    pub sync_interval_secs: u64,
    pub endpoint_refresh_secs: u64,

    // Misc
    pub user_agent: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let port: u16 = var_or("PORT", "3001").parse().unwrap_or(3001);
        let base_url = var_or("BASE_URL", &format!("http://localhost:{}", port));

        Self {
            // Server
            port,
            node_env: var_or("NODE_ENV", "development"),
            app_url: optional("APP_URL").unwrap_or_else(|| base_url.clone()),
            base_url,

            // PostgreSQL
            database_url: var_or("DATABASE_URL", "postgres://localhost/cinestream"),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", "15").parse().unwrap_or(15),

            // Upstream catalog
            tmdb_key: var_or("TMDB_KEY", ""),
            tmdb_api_url: var_or("TMDB_API_URL", "https://api.themoviedb.org/3"),
            tmdb_image_url: var_or("TMDB_IMAGE_URL", "https://image.tmdb.org/t/p/original"),
            tmdb_language: var_or("TMDB_LANGUAGE", "pt-BR"),

            // Secondary metadata
            omdb_key: optional("OMDB_KEY"),
            omdb_api_url: var_or("OMDB_API_URL", "https://www.omdbapi.com"),

            // Providers
            providers_url: var_or("PROVIDERS_URL", "https://pastebin.com/raw/mAt4pVJz"),
            proxy_url: optional("PROXY_URL"),
            addon_prefix: var_or("ADDON_PREFIX", "CineStream"),

            // Admin
            admin_key: optional("ADMIN_KEY"),

            // Caching
            stream_ttl_secs: var_or("STREAM_TTL_SECS", "3600").parse().unwrap_or(3600), // 1 hour
            metadata_cache_ttl_secs: var_or("METADATA_CACHE_TTL_SECS", "86400")
                .parse()
                .unwrap_or(86_400), // 24 hours
            metadata_cache_max_entries: optional("METADATA_CACHE_MAX_ENTRIES")
                .and_then(|v| v.parse().ok()),

            // Network
            probe_timeout_ms: var_or("PROBE_TIMEOUT_MS", "5000").parse().unwrap_or(5000),
            fetch_timeout_ms: var_or("FETCH_TIMEOUT_MS", "10000").parse().unwrap_or(10_000),

            // Sync
            sync_pages: var_or("SYNC_PAGES", "100").parse().unwrap_or(100),
            sync_concurrency: var_or("SYNC_CONCURRENCY", "25").parse().unwrap_or(25),
            sync_max_attempts: var_or("SYNC_MAX_ATTEMPTS", "3").parse().unwrap_or(3),
            sync_interval_secs: var_or("SYNC_INTERVAL_SECS", "21600")
                .parse()
                .unwrap_or(21_600), // 6 hours
            endpoint_refresh_secs: var_or("ENDPOINT_REFRESH_SECS", "1800")
                .parse()
                .unwrap_or(1800),

            // Misc
            user_agent: var_or(
                "USER_AGENT",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            ),
        }
    }

    /// Check for problems the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tmdb_key.trim().is_empty() {
            return Err(ConfigError::MissingTmdbKey);
        }
        let mode = self.run_mode();
        if mode != RunMode::Development && self.admin_key.is_none() {
            return Err(ConfigError::MissingAdminKey(mode));
        }
        if self.sync_concurrency == 0 {
            return Err(ConfigError::Zero("SYNC_CONCURRENCY"));
        }
        if self.sync_pages == 0 {
            return Err(ConfigError::Zero("SYNC_PAGES"));
        }
        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::parse(&self.node_env)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stream_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_ttl_secs)
    }

    pub fn metadata_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode() {
        assert_eq!(RunMode::parse("production"), RunMode::Production);
        assert_eq!(RunMode::parse("SEED"), RunMode::Seed);
        assert_eq!(RunMode::parse("test"), RunMode::Development);
        assert!(RunMode::Seed.syncs_on_start());
        assert!(!RunMode::Development.syncs_on_start());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::from_env();
        config.node_env = "development".to_string();
        config.tmdb_key = String::new();
        config.sync_concurrency = 25;
        config.sync_pages = 100;
        assert_eq!(config.validate(), Err(ConfigError::MissingTmdbKey));

        config.tmdb_key = "token".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.sync_concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("SYNC_CONCURRENCY")));
    }

    #[test]
    fn test_admin_key_required_outside_development() {
        let mut config = Config::from_env();
        config.tmdb_key = "token".to_string();
        config.sync_concurrency = 25;
        config.sync_pages = 100;
        config.admin_key = None;

        config.node_env = "development".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.node_env = "production".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingAdminKey(RunMode::Production))
        );

        config.node_env = "seed".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingAdminKey(RunMode::Seed))
        );

        config.admin_key = Some("s3cret".to_string());
        assert_eq!(config.validate(), Ok(()));
    }
}
