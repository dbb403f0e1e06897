use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

use crate::metadata::BackendKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cors: CorsConfig,
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub storage: StorageConfig,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

/// Cross-origin rules for the public listener. An origin of `*` allows any.
#[derive(Debug, Clone, PartialEq)]
pub struct CorsConfig {
    pub headers: Vec<String>,
    pub methods: Vec<String>,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Listener for the internal service-to-service routes
    pub rpc_bind_address: String,
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub permissions_url: String,
    pub settings_url: String,
    pub timeout_ms: u64,
    pub users_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend new uploads are written to
    pub backend: BackendKind,
    /// Root directory for the filesystem backend
    pub local_storage_path: String,
    /// Object store settings; present whenever `S3_BUCKET` is set
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3Config {
    pub access_key: Option<String>,
    pub bucket: String,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub secret_key: Option<String>,
    pub use_path_style: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            headers: ["Content-Type", "Authorization", "X-Tmp-Auth"]
                .map(String::from)
                .to_vec(),
            methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            origins: vec!["*".to_string()],
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.origins.iter().any(|o| o == "*")
    }

    pub fn parsed_headers(&self) -> Result<Vec<HeaderName>, ConfigError> {
        self.headers
            .iter()
            .map(|h| {
                h.parse().map_err(|_| {
                    ConfigError::ValidationError(format!("CORS_HEADERS: invalid header '{h}'"))
                })
            })
            .collect()
    }

    pub fn parsed_methods(&self) -> Result<Vec<Method>, ConfigError> {
        self.methods
            .iter()
            .map(|m| {
                m.parse().map_err(|_| {
                    ConfigError::ValidationError(format!("CORS_METHODS: invalid method '{m}'"))
                })
            })
            .collect()
    }

    pub fn parsed_origins(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).map_err(|_| {
                    ConfigError::ValidationError(format!("CORS_ORIGINS: invalid origin '{o}'"))
                })
            })
            .collect()
    }
}

/// Split a comma-separated variable, dropping blank entries.
fn list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
            rpc_bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            permissions_url: "http://localhost:8080".to_string(),
            settings_url: "http://localhost:8080".to_string(),
            timeout_ms: 5000,
            users_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            local_storage_path: "./files".to_string(),
            s3: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cors_defaults = CorsConfig::default();
        let server_defaults = ServerConfig::default();
        let services_defaults = ServicesConfig::default();

        let bind_address = var("BIND_ADDRESS").unwrap_or(server_defaults.bind_address);
        let rpc_bind_address = var("RPC_BIND_ADDRESS").unwrap_or(server_defaults.rpc_bind_address);
        let data_dir = var("DATA_DIR").unwrap_or(server_defaults.data_dir);

        let max_upload_size = var("MAX_UPLOAD_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let backend = match var("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => BackendKind::Local,
            "s3" => BackendKind::S3,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "STORAGE_BACKEND must be 'local' or 's3', got '{other}'"
                )))
            }
        };

        let local_storage_path =
            var("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./files".to_string());

        let s3 = var("S3_BUCKET")
            .filter(|b| !b.trim().is_empty())
            .map(|bucket| S3Config {
                access_key: var("S3_ACCESS_KEY"),
                bucket,
                endpoint: var("S3_ENDPOINT"),
                region: var("S3_REGION"),
                secret_key: var("S3_SECRET_KEY"),
                use_path_style: var("S3_USE_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
            });

        let timeout_ms = var("REMOTE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(services_defaults.timeout_ms);

        let config = Config {
            cors: CorsConfig {
                headers: var("CORS_HEADERS").map(list).unwrap_or(cors_defaults.headers),
                methods: var("CORS_METHODS").map(list).unwrap_or(cors_defaults.methods),
                origins: var("CORS_ORIGINS").map(list).unwrap_or(cors_defaults.origins),
            },
            server: ServerConfig {
                bind_address,
                data_dir,
                rpc_bind_address,
            },
            services: ServicesConfig {
                permissions_url: var("PERMISSIONS_SERVICE_URL")
                    .unwrap_or(services_defaults.permissions_url),
                settings_url: var("SETTINGS_SERVICE_URL").unwrap_or(services_defaults.settings_url),
                timeout_ms,
                users_url: var("USERS_SERVICE_URL").unwrap_or(services_defaults.users_url),
            },
            storage: StorageConfig {
                backend,
                local_storage_path,
                s3,
            },
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == BackendKind::S3 && self.storage.s3.is_none() {
            return Err(ConfigError::ValidationError(
                "S3_BUCKET is required when STORAGE_BACKEND=s3".to_string(),
            ));
        }

        if self.storage.s3.as_ref().is_some_and(|s3| s3.access_key.is_some() != s3.secret_key.is_some()) {
            return Err(ConfigError::ValidationError(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be set together".to_string(),
            ));
        }

        if self.cors.origins.is_empty() || self.cors.methods.is_empty() {
            return Err(ConfigError::ValidationError(
                "CORS_ORIGINS and CORS_METHODS must not be empty".to_string(),
            ));
        }
        self.cors.parsed_headers()?;
        self.cors.parsed_methods()?;
        if !self.cors.allows_any_origin() {
            self.cors.parsed_origins()?;
        }

        if self.services.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "REMOTE_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
