use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub max_batch_size: i64,
    pub unit_timeout_secs: u64,
    pub log_level: String,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;

        let host: IpAddr = env_or("STUDYFORGE_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid STUDYFORGE_HOST: {e}"))?;

        let port: u16 = env_or("STUDYFORGE_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid STUDYFORGE_PORT: {e}"))?;

        let max_batch_size: i64 = env_or("STUDYFORGE_MAX_BATCH_SIZE", "50")
            .parse()
            .map_err(|e| format!("Invalid STUDYFORGE_MAX_BATCH_SIZE: {e}"))?;

        let unit_timeout_secs: u64 = env_or("STUDYFORGE_UNIT_TIMEOUT_SECS", "45")
            .parse()
            .map_err(|e| format!("Invalid STUDYFORGE_UNIT_TIMEOUT_SECS: {e}"))?;

        let log_level = env_or("STUDYFORGE_LOG_LEVEL", "studyforge=info,tower_http=info");

        let llm = LlmConfig {
            base_url: env_or("STUDYFORGE_LLM_BASE_URL", "http://127.0.0.1:11434"),
            model: env_or("STUDYFORGE_LLM_MODEL", "llama3.1"),
            api_key: std::env::var("STUDYFORGE_LLM_API_KEY").ok(),
            request_timeout_secs: env_or("STUDYFORGE_LLM_TIMEOUT_SECS", "45")
                .parse()
                .map_err(|e| format!("Invalid STUDYFORGE_LLM_TIMEOUT_SECS: {e}"))?,
        };

        Ok(Config {
            database_url,
            host,
            port,
            max_batch_size,
            unit_timeout_secs,
            log_level,
            llm,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
