use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Session revocations fall back to an in-process store when unset.
    pub redis_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_access_token_expiry_secs: i64,
    pub jwt_refresh_token_expiry_secs: i64,
    pub frontend_url: String,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub storage_root: PathBuf,
    pub storage_public_url: String,
    pub pdf_engine_bin: String,
    pub pdf_engine_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub max_photos_per_record: usize,
    pub organization_name: String,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("BACKEND_PORT", 3000),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_access_token_expiry_secs: parse_or("JWT_ACCESS_TOKEN_EXPIRY_SECS", 900),
            jwt_refresh_token_expiry_secs: parse_or("JWT_REFRESH_TOKEN_EXPIRY_SECS", 604800),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "https://localhost:5173".to_string()),
            session_cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "pm_session".to_string()),
            session_cookie_secure: parse_or("SESSION_COOKIE_SECURE", true),
            storage_root: env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./storage")),
            storage_public_url: env::var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "/storage".to_string()),
            pdf_engine_bin: env::var("PDF_ENGINE_BIN")
                .unwrap_or_else(|_| "wkhtmltopdf".to_string()),
            pdf_engine_timeout_secs: parse_or("PDF_ENGINE_TIMEOUT_SECS", 30),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            max_photos_per_record: parse_or("MAX_PHOTOS_PER_RECORD", 10),
            organization_name: env::var("ORGANIZATION_NAME")
                .unwrap_or_else(|_| "Preventive Maintenance".to_string()),
            tls_cert_path: env::var("TLS_CERT_PATH").ok().map(PathBuf::from),
            tls_key_path: env::var("TLS_KEY_PATH").ok().map(PathBuf::from),
        })
    }

    /// Total request body limit for multipart endpoints (all photos plus form fields).
    pub fn request_body_limit(&self) -> usize {
        self.max_upload_bytes
            .saturating_mul(self.max_photos_per_record.max(1))
            .saturating_add(1024 * 1024)
    }
}

/// Read an env var and parse it, falling back to `default` when unset or malformed.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl AppConfig {
    /// Local defaults for unit tests that never touch the environment.
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 1,
            redis_url: None,
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "unit-test-secret".to_string(),
            jwt_access_token_expiry_secs: 900,
            jwt_refresh_token_expiry_secs: 3600,
            frontend_url: "http://localhost:5173".to_string(),
            session_cookie_name: "pm_session".to_string(),
            session_cookie_secure: false,
            storage_root: std::env::temp_dir(),
            storage_public_url: "/storage".to_string(),
            pdf_engine_bin: "wkhtmltopdf".to_string(),
            pdf_engine_timeout_secs: 5,
            max_upload_bytes: 1024,
            max_photos_per_record: 2,
            organization_name: "Org".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}
