//! Environment variable configuration module.
//!
//! Provides environment variable loading and the global `APP_CONFIG` instance.

use std::env;
use std::sync::Once;

use once_cell::sync::Lazy;

static INIT: Once = Once::new();

/// Initializes the environment by loading the .env file.
/// This is called automatically when `get_env` is first used.
fn init_env() {
    INIT.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Warning: .env file not found or error loading: {}", e);
        }
    });
}

/// Retrieves an environment variable by key.
///
/// If the variable is not set, returns the provided default value.
/// If no default is provided and the variable is not set, returns an empty string.
pub fn get_env(key: &str, default: Option<&str>) -> String {
    init_env();
    env::var(key).unwrap_or_else(|_| default.unwrap_or("").to_string())
}

/// Retrieves an environment variable as a parsed type.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    init_env();
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server settings
    pub server_port: String,
    pub app_name: String,

    // Environment
    pub is_production: bool,

    // Sentry settings
    pub sentry_dsn: String,
    pub sentry_traces_sample_rate: f32,

    // Database settings
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,
    pub db_max_lifetime_secs: u64,

    // Cache settings
    pub redis_max_connections: usize,

    // CORS settings
    pub cors_origins: String,

    // Rate limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,

    // Migration
    pub run_migrations: bool,

    // Public URLs
    pub base_url: String,
    pub api_url: String,

    // Cookies
    pub cookie_domain: String,
    pub session_cookie_max_age_days: i64,

    // LinkedIn OAuth and API
    pub li_client_id: String,
    pub li_client_secret: String,
    pub li_redirect_uri: String,
    pub li_api_url: String,

    // Outbound HTTP
    pub http_timeout_secs: u64,
    pub http_retry_attempts: u32,
    pub http_retry_delay_secs: u64,

    // Generative AI
    pub genai_api_key: String,
    pub genai_base_url: String,
    pub genai_pro_model: String,
    pub genai_flash_model: String,
    pub genai_temperature: f32,
    pub max_revision_cycles: u32,

    // Task queue
    pub task_queue_prefix: String,
    pub worker_concurrency: usize,
    pub task_result_ttl_secs: u64,
    pub worker_poll_secs: u64,
    pub publish_dedupe_secs: u64,
}

impl AppConfig {
    /// Creates a new `AppConfig` from environment variables.
    pub fn from_env() -> Self {
        let rust_env = get_env("RUST_ENV", Some("development"));
        let is_production = rust_env == "production" || rust_env == "prod";

        let api_url = get_env("API_URL", Some("http://localhost:3000"))
            .trim_end_matches('/')
            .to_string();
        let li_redirect_uri = get_env(
            "LI_REDIRECT_URI",
            Some(&format!("{api_url}/auth/callback/linkedin")),
        );

        Self {
            server_port: get_env("SERVER_PORT", Some("3000")),
            app_name: get_env("APP_NAME", Some("social-media-suite")),

            is_production,

            sentry_dsn: get_env("SENTRY_DSN", None),
            sentry_traces_sample_rate: get_env_parsed("SENTRY_TRACES_SAMPLE_RATE", 0.1),

            db_max_connections: get_env_parsed("DB_MAX_CONNECTIONS", 20),
            db_min_connections: get_env_parsed("DB_MIN_CONNECTIONS", 2),
            db_acquire_timeout_secs: get_env_parsed("DB_ACQUIRE_TIMEOUT_SECS", 5),
            db_idle_timeout_secs: get_env_parsed("DB_IDLE_TIMEOUT_SECS", 600),
            db_max_lifetime_secs: get_env_parsed("DB_MAX_LIFETIME_SECS", 1800),

            redis_max_connections: get_env_parsed("REDIS_MAX_CONNECTIONS", 20),

            cors_origins: get_env("CORS_ORIGINS", Some("*")),

            rate_limit_per_second: get_env_parsed("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: get_env_parsed("RATE_LIMIT_BURST_SIZE", 50),

            run_migrations: get_env("RUN_MIGRATIONS", Some("true")) == "true",

            base_url: get_env("BASE_URL", Some("http://localhost:8501")),
            api_url,

            cookie_domain: get_env("COOKIE_DOMAIN", None),
            session_cookie_max_age_days: get_env_parsed("SESSION_COOKIE_MAX_AGE_DAYS", 7),

            li_client_id: get_env("LI_CLIENT_ID", None),
            li_client_secret: get_env("LI_CLIENT_SECRET", None),
            li_redirect_uri,
            li_api_url: get_env("LI_API_URL", Some("https://api.linkedin.com/v2"))
                .trim_end_matches('/')
                .to_string(),

            http_timeout_secs: get_env_parsed("HTTP_TIMEOUT_SECS", 20),
            http_retry_attempts: get_env_parsed("HTTP_RETRY_ATTEMPTS", 3),
            http_retry_delay_secs: get_env_parsed("HTTP_RETRY_DELAY_SECS", 5),

            genai_api_key: get_env("GENAI_API_KEY", None),
            genai_base_url: get_env(
                "GENAI_BASE_URL",
                Some("https://generativelanguage.googleapis.com/v1beta/models"),
            ),
            genai_pro_model: get_env("GENAI_PRO_MODEL", Some("gemini-2.0-flash-lite")),
            genai_flash_model: get_env("GENAI_FLASH_MODEL", Some("gemini-2.0-flash-lite")),
            genai_temperature: get_env_parsed("GENAI_TEMPERATURE", 0.9),
            max_revision_cycles: get_env_parsed("MAX_REVISION_CYCLES", 2),

            task_queue_prefix: get_env("TASK_QUEUE_PREFIX", Some("sms")),
            worker_concurrency: get_env_parsed("WORKER_CONCURRENCY", 4),
            task_result_ttl_secs: get_env_parsed("TASK_RESULT_TTL_SECS", 86_400),
            worker_poll_secs: get_env_parsed("WORKER_POLL_SECS", 1),
            publish_dedupe_secs: get_env_parsed("PUBLISH_DEDUPE_SECS", 60),
        }
    }

    /// Returns true when the LinkedIn OAuth application is configured.
    pub fn linkedin_configured(&self) -> bool {
        !self.li_client_id.is_empty() && !self.li_redirect_uri.is_empty()
    }
}

/// Global application configuration instance.
pub static APP_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    // ============ get_env ============

    #[test]
    fn test_get_env_with_default() {
        let result = get_env("NON_EXISTENT_VAR_FOR_TEST_12345", Some("default_value"));
        assert_eq!(result, "default_value");
    }

    #[test]
    fn test_get_env_no_default() {
        let result = get_env("NON_EXISTENT_VAR_FOR_TEST_67890", None);
        assert_eq!(result, "");
    }

    #[test]
    fn test_get_env_special_characters_in_default() {
        let result = get_env("NON_EXISTENT_SPECIAL", Some("!@#$%^&*()"));
        assert_eq!(result, "!@#$%^&*()");
    }

    // ============ get_env_parsed ============

    #[test]
    fn test_get_env_parsed_default_u32() {
        let result: u32 = get_env_parsed("NON_EXISTENT_U32_VAR", 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn test_get_env_parsed_default_f32() {
        let result: f32 = get_env_parsed("NON_EXISTENT_F32_VAR", 0.5);
        assert!((result - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_get_env_parsed_default_usize() {
        let result: usize = get_env_parsed("NON_EXISTENT_USIZE_VAR", 100);
        assert_eq!(result, 100);
    }

    // ============ AppConfig ============

    #[test]
    fn test_app_config_from_env_defaults_are_sane() {
        let config = AppConfig::from_env();

        assert!(!config.server_port.is_empty());
        assert!(config.db_max_connections >= config.db_min_connections);
        assert!(config.rate_limit_per_second > 0);
        assert!(config.worker_concurrency > 0);
        assert!(config.task_result_ttl_secs > 0);
        assert!(config.http_retry_attempts > 0);
    }

    #[test]
    fn test_app_config_urls_have_no_trailing_slash() {
        let config = AppConfig::from_env();
        assert!(!config.api_url.ends_with('/'));
        assert!(!config.li_api_url.ends_with('/'));
    }

    #[test]
    fn test_redirect_uri_points_at_linkedin_callback() {
        let config = AppConfig::from_env();
        if std::env::var("LI_REDIRECT_URI").is_err() {
            assert_eq!(
                config.li_redirect_uri,
                format!("{}/auth/callback/linkedin", config.api_url)
            );
        }
    }

    #[test]
    fn test_linkedin_configured_requires_client_id() {
        let mut config = AppConfig::from_env();
        config.li_client_id = String::new();
        assert!(!config.linkedin_configured());

        config.li_client_id = "client".to_string();
        config.li_redirect_uri = "http://localhost/cb".to_string();
        assert!(config.linkedin_configured());
    }

    #[test]
    fn test_app_config_sentry_traces_sample_rate_range() {
        let config = AppConfig::from_env();
        assert!(config.sentry_traces_sample_rate >= 0.0);
        assert!(config.sentry_traces_sample_rate <= 1.0);
    }

    #[test]
    fn test_app_config_debug_lists_fields() {
        let config = AppConfig::from_env();
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("AppConfig"));
        assert!(debug_str.contains("worker_concurrency"));
        assert!(debug_str.contains("li_api_url"));
    }

    // ============ APP_CONFIG ============

    #[test]
    fn test_app_config_global_instance() {
        let port = &APP_CONFIG.server_port;
        assert!(!port.is_empty());
    }

    #[test]
    fn test_app_config_is_production_default() {
        let config = AppConfig::from_env();
        assert!(!config.is_production || std::env::var("RUST_ENV").is_ok());
    }
}
