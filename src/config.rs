use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path every resource URL is relative to, e.g. `/api`
    pub route_prefix: String,
    /// Write classified errors as detail arrays instead of bare messages
    pub use_verbose_errors: bool,
    pub max_batch_requests: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            route_prefix: "/api".to_string(),
            use_verbose_errors: true,
            max_batch_requests: 100,
        }
    }
}

impl ApiConfig {
    /// Route prefix with a leading slash and no trailing slash; empty for the root
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.route_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// `path` relative to the route prefix, or `None` when it lies outside it
    pub fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let prefix = self.normalized_prefix();
        let rest = path.strip_prefix(prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Environment variables like GATEWAY_API__ROUTE_PREFIX
        config = config.add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_stripping() {
        let api = ApiConfig::default();
        assert_eq!(api.strip_prefix("/api/People(1)"), Some("/People(1)"));
        assert_eq!(api.strip_prefix("/api"), Some(""));
        assert_eq!(api.strip_prefix("/apiary"), None);
        assert_eq!(api.strip_prefix("/other"), None);

        let root = ApiConfig {
            route_prefix: "/".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(root.strip_prefix("/People"), Some("/People"));
    }

    #[test]
    fn test_defaults_load_without_sources() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.port, 3001);
        assert!(config.api.max_batch_requests > 0);
    }
}
