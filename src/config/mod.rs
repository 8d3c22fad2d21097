use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub request: RequestConfig,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
    pub detector: DetectorConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

/// Analysis backend endpoints
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub ws_path: String,
    pub socket_url: String,
    pub language: String,
    pub variant: TransportVariant,
}

/// Wire shape spoken by the backend channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportVariant {
    /// `{stage, data, error?}` frames, no reconnection
    StageTagged,
    /// `{step, data}` or `[event, payload]` frames, bounded reconnection
    EventTagged,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Streaming channel timing
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for a terminal stage after a request is sent
    pub analysis_timeout_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_delay_max_ms: u64,
}

/// Extension relay bookkeeping
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub session_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    /// Match pattern for tabs that receive completion broadcasts
    pub host_url_pattern: String,
    pub analysis_site_url: String,
}

/// Completion detector timing
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub poll_interval_ms: u64,
    pub ceiling_ms: u64,
    pub initial_check_ms: u64,
}

/// Host page control timing
#[derive(Debug, Clone)]
pub struct UiConfig {
    pub error_reset_ms: u64,
    pub notification_dismiss_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig {
            base_url: env::var("BACKEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            ws_path: env::var("BACKEND_WS_PATH").unwrap_or_else(|_| "/ws/analyze".to_string()),
            socket_url: env::var("BACKEND_SOCKET_URL")
                .unwrap_or_else(|_| "ws://localhost:3001".to_string()),
            language: env::var("ANALYSIS_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            variant: match env::var("TRANSPORT_VARIANT") {
                Ok(raw) => raw.parse().map_err(|message| AppError::Config { message })?,
                Err(_) => TransportVariant::StageTagged,
            },
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
        };

        let transport = TransportConfig {
            analysis_timeout_ms: env_parse("ANALYSIS_TIMEOUT_MS", 30000),
            reconnect_attempts: env_parse("RECONNECT_ATTEMPTS", 5),
            reconnect_delay_ms: env_parse("RECONNECT_DELAY_MS", 1000),
            reconnect_delay_max_ms: env_parse("RECONNECT_DELAY_MAX_MS", 5000),
        };

        let relay = RelayConfig {
            session_ttl_ms: env_parse("SESSION_TTL_MS", 600_000),
            sweep_interval_ms: env_parse("SWEEP_INTERVAL_MS", 60_000),
            host_url_pattern: env::var("HOST_URL_PATTERN")
                .unwrap_or_else(|_| "*://www.youtube.com/*".to_string()),
            analysis_site_url: env::var("ANALYSIS_SITE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        };

        let detector = DetectorConfig {
            poll_interval_ms: env_parse("DETECTOR_POLL_MS", 2000),
            ceiling_ms: env_parse("DETECTOR_CEILING_MS", 600_000),
            initial_check_ms: env_parse("DETECTOR_INITIAL_CHECK_MS", 1000),
        };

        let ui = UiConfig {
            error_reset_ms: env_parse("ERROR_RESET_MS", 2000),
            notification_dismiss_ms: env_parse("NOTIFICATION_DISMISS_MS", 10_000),
        };

        if relay.sweep_interval_ms == 0 || detector.poll_interval_ms == 0 {
            return Err(AppError::Config {
                message: "SWEEP_INTERVAL_MS and DETECTOR_POLL_MS must be positive".to_string(),
            });
        }

        Ok(Config {
            backend,
            request,
            transport,
            relay,
            detector,
            ui,
            logging,
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl BackendConfig {
    /// Stage-tagged analysis endpoint, derived from the HTTP base URL
    pub fn analyze_ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, self.ws_path)
    }
}

impl FromStr for TransportVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stage" | "stage_tagged" | "websocket" => Ok(TransportVariant::StageTagged),
            "event" | "event_tagged" | "pubsub" => Ok(TransportVariant::EventTagged),
            _ => Err(format!("Unknown transport variant: {}", s)),
        }
    }
}

impl TransportConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_path: "/ws/analyze".to_string(),
            socket_url: "ws://localhost:3001".to_string(),
            language: "en".to_string(),
            variant: TransportVariant::StageTagged,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_ms: 30000,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            reconnect_delay_max_ms: 5000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: 600_000,
            sweep_interval_ms: 60_000,
            host_url_pattern: "*://www.youtube.com/*".to_string(),
            analysis_site_url: "http://localhost:5173".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            ceiling_ms: 600_000,
            initial_check_ms: 1000,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            error_reset_ms: 2000,
            notification_dismiss_ms: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            request: RequestConfig::default(),
            transport: TransportConfig::default(),
            relay: RelayConfig::default(),
            detector: DetectorConfig::default(),
            ui: UiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
