use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use uniadmin_auth::TokenConfig;
use uniadmin_contracts::Locale;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub store_backend: StoreBackend,
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_ms: u64,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub jwt_clock_skew_secs: u64,
    pub page_size: u32,
    pub max_page_size: u32,
    pub locale: Locale,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub metrics_require_auth: bool,
    pub cors_allow_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

fn invalid(message: impl Into<String>) -> StartupError {
    StartupError {
        code: "ERR_INVALID_CONFIG",
        message: message.into(),
    }
}

impl ApiConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("UNIADMIN_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("UNIADMIN_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000),
            "UNIADMIN_BIND_ADDR",
        )?;

        let store_backend = parse_store_backend(kv.get("UNIADMIN_STORE"))?;

        let dev_allow_nonlocal_bind = parse_flag(
            kv.get("UNIADMIN_DEV_ALLOW_NONLOCAL_BIND"),
            false,
            "UNIADMIN_DEV_ALLOW_NONLOCAL_BIND",
        )?;

        if !bind_addr.ip().is_loopback() && store_backend == StoreBackend::Memory {
            if dev_allow_nonlocal_bind && is_unspecified_ip(bind_addr.ip()) {
                // Dev-only escape hatch for containers.
            } else {
                return Err(StartupError {
                    code: "ERR_NONLOCAL_BIND_REQUIRES_DB",
                    message: "non-local bind requires the postgres store; refuse startup"
                        .to_string(),
                });
            }
        }

        let db_url = match store_backend {
            StoreBackend::Postgres => Some(require_nonempty(kv, "UNIADMIN_DB_URL")?),
            StoreBackend::Memory => optional(kv, "UNIADMIN_DB_URL"),
        };

        let db_max_connections = parse_u32(
            kv.get("UNIADMIN_DB_MAX_CONNECTIONS"),
            8,
            "UNIADMIN_DB_MAX_CONNECTIONS",
        )?;
        if db_max_connections == 0 {
            return Err(invalid("UNIADMIN_DB_MAX_CONNECTIONS must be >= 1"));
        }

        let db_timeout_ms = parse_u64(
            kv.get("UNIADMIN_DB_TIMEOUT_MS"),
            2000,
            "UNIADMIN_DB_TIMEOUT_MS",
        )?;
        if db_timeout_ms == 0 {
            return Err(invalid("UNIADMIN_DB_TIMEOUT_MS must be >= 1"));
        }

        let jwt_secret = require_nonempty(kv, "UNIADMIN_JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(invalid("UNIADMIN_JWT_SECRET must be at least 32 bytes"));
        }

        let jwt_issuer = optional(kv, "UNIADMIN_JWT_ISSUER").unwrap_or_else(|| "uniadmin".to_string());

        let access_token_ttl_secs = parse_u64(
            kv.get("UNIADMIN_ACCESS_TOKEN_TTL_SECS"),
            5 * 60,
            "UNIADMIN_ACCESS_TOKEN_TTL_SECS",
        )?;
        let refresh_token_ttl_secs = parse_u64(
            kv.get("UNIADMIN_REFRESH_TOKEN_TTL_SECS"),
            24 * 60 * 60,
            "UNIADMIN_REFRESH_TOKEN_TTL_SECS",
        )?;
        if access_token_ttl_secs == 0 || refresh_token_ttl_secs == 0 {
            return Err(invalid("token TTLs must be >= 1 second"));
        }
        let jwt_clock_skew_secs = parse_u64(
            kv.get("UNIADMIN_JWT_CLOCK_SKEW_SECS"),
            0,
            "UNIADMIN_JWT_CLOCK_SKEW_SECS",
        )?;

        let page_size = parse_u32(kv.get("UNIADMIN_PAGE_SIZE"), 20, "UNIADMIN_PAGE_SIZE")?;
        let max_page_size = parse_u32(
            kv.get("UNIADMIN_MAX_PAGE_SIZE"),
            100,
            "UNIADMIN_MAX_PAGE_SIZE",
        )?;
        if page_size == 0 || max_page_size < page_size {
            return Err(invalid(
                "UNIADMIN_PAGE_SIZE must be >= 1 and <= UNIADMIN_MAX_PAGE_SIZE",
            ));
        }

        let locale = match optional(kv, "UNIADMIN_LANGUAGE") {
            None => Locale::En,
            Some(raw) => Locale::parse(&raw)
                .ok_or_else(|| invalid("UNIADMIN_LANGUAGE must be en or vi"))?,
        };

        let bootstrap_admin = match (
            optional(kv, "UNIADMIN_BOOTSTRAP_ADMIN_USERNAME"),
            optional(kv, "UNIADMIN_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (None, None) => None,
            (Some(username), Some(password)) => {
                if password.chars().count() < 8 {
                    return Err(invalid(
                        "UNIADMIN_BOOTSTRAP_ADMIN_PASSWORD must be at least 8 characters",
                    ));
                }
                Some(BootstrapAdmin { username, password })
            }
            _ => {
                return Err(invalid(
                    "UNIADMIN_BOOTSTRAP_ADMIN_USERNAME and UNIADMIN_BOOTSTRAP_ADMIN_PASSWORD must be set together",
                ));
            }
        };

        let metrics_require_auth = parse_flag(
            kv.get("UNIADMIN_METRICS_REQUIRE_AUTH"),
            false,
            "UNIADMIN_METRICS_REQUIRE_AUTH",
        )?;
        let cors_allow_all = parse_flag(
            kv.get("UNIADMIN_CORS_ALLOW_ALL"),
            true,
            "UNIADMIN_CORS_ALLOW_ALL",
        )?;

        Ok(Self {
            bind_addr,
            store_backend,
            db_url,
            db_max_connections,
            db_timeout_ms,
            jwt_secret,
            jwt_issuer,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            jwt_clock_skew_secs,
            page_size,
            max_page_size,
            locale,
            bootstrap_admin,
            metrics_require_auth,
            cors_allow_all,
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.jwt_secret.clone(),
            issuer: self.jwt_issuer.clone(),
            access_ttl: Duration::from_secs(self.access_token_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_token_ttl_secs),
            clock_skew: Duration::from_secs(self.jwt_clock_skew_secs),
        }
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_lines(&contents)
}

fn parse_env_lines(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn optional(kv: &HashMap<String, String>, key: &str) -> Option<String> {
    kv.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    optional(kv, key).ok_or_else(|| StartupError {
        code: "ERR_MISSING_CONFIG",
        message: format!("missing required config key {}", key),
    })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| invalid(format!("{} must be a valid host:port socket address", key))),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(format!("{} must be an integer", key))),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(format!("{} must be an integer", key))),
    }
}

fn parse_flag(value: Option<&String>, default: bool, key: &'static str) -> Result<bool, StartupError> {
    let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
        _ => Err(invalid(format!("{} must be a boolean", key))),
    }
}

fn parse_store_backend(value: Option<&String>) -> Result<StoreBackend, StartupError> {
    let backend = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("postgres");

    match backend {
        "postgres" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        _ => Err(invalid("UNIADMIN_STORE must be postgres or memory")),
    }
}

fn is_unspecified_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified(),
    }
}
