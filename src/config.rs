use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const DEFAULT_LOG_LEVEL: &str = "hakayat=debug,tower_http=debug";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Storage configuration
    pub storage_type: String,
    pub data_dir: PathBuf,

    // Session configuration
    pub session_secret: String,
    pub session_ttl_hours: i64,

    // Content settings
    pub notification_limit: usize,
    pub max_title_length: usize,
    pub max_story_length: usize,
    pub max_comment_length: usize,

    // AI generation
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub generation_temperature: f32,
    pub generation_timeout_secs: u64,

    // Rate limiting (per minute, generation only)
    pub rate_limit_requests: u32,
    /// 仅在部署于可信反向代理之后时读取 X-Forwarded-For / X-Real-IP
    pub trust_proxy_headers: bool,

    // CORS configuration
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),

            storage_type: env::var("STORAGE_TYPE").unwrap_or_else(|_| "file".to_string()),
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            session_secret: env::var("SESSION_SECRET")
                .map_err(|_| anyhow::anyhow!("SESSION_SECRET must be set"))?,
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "720".to_string())
                .parse()?,

            notification_limit: env::var("NOTIFICATION_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_title_length: env::var("MAX_TITLE_LENGTH")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
            max_story_length: env::var("MAX_STORY_LENGTH")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()?,
            max_comment_length: env::var("MAX_COMMENT_LENGTH")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,

            gemini_api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            gemini_api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            generation_temperature: env::var("GENERATION_TEMPERATURE")
                .unwrap_or_else(|_| "0.8".to_string())
                .parse()?,
            generation_timeout_secs: env::var("GENERATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,

            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn uses_memory_storage(&self) -> bool {
        self.storage_type.eq_ignore_ascii_case("memory")
    }
}

impl Default for Config {
    /// 测试与本地运行的默认配置（内存存储，未配置 AI 密钥）
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            storage_type: "memory".to_string(),
            data_dir: PathBuf::from("./data"),
            session_secret: "hakayat-development-secret".to_string(),
            session_ttl_hours: 720,
            notification_limit: 50,
            max_title_length: 200,
            max_story_length: 100_000,
            max_comment_length: 5000,
            gemini_api_key: None,
            gemini_api_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            generation_temperature: 0.8,
            generation_timeout_secs: 120,
            rate_limit_requests: 10,
            trust_proxy_headers: false,
            cors_allowed_origins: "http://localhost:5173".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level_is_a_valid_filter() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(tracing_subscriber::EnvFilter::try_new(&config.log_level).is_ok());
        assert!(!config.trust_proxy_headers);
    }
}
