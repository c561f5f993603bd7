use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Longest expiry S3 presigning accepts (7 days)
pub const MAX_PRESIGN_TTL_SECS: u64 = 604_800;

/// Flat environment variables recognized on top of the layered sources,
/// mapped to their configuration keys
const FLAT_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("S3_BUCKET", "s3.bucket"),
    ("S3_REGION", "s3.region"),
    ("AWS_ACCESS_KEY_ID", "s3.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "s3.secret_access_key"),
    ("S3_ENDPOINT_URL", "s3.endpoint_url"),
    ("S3_URL_MODE", "s3.url_mode"),
];

/// Largest placeholder canvas side, in pixels
pub const MAX_CANVAS_DIMENSION: u32 = 4096;

/// Largest glyph scale factor
pub const MAX_TEXT_SCALE: u32 = 64;

/// Most prompt characters drawn on a placeholder
pub const MAX_PROMPT_CHARS: usize = 256;

const PRESIGN_TTL_ENV: &str = "S3_PRESIGN_TTL_SECONDS";

/// Main configuration for the asset storage service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Placeholder image generation
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// How access URLs are issued for stored objects.
///
/// Chosen once per deployment. `Public` assumes the bucket grants public read,
/// `Presigned` works against private buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMode {
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`, never expires
    Public,
    /// Time-limited signed GET URL
    Presigned,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Target bucket name
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Static access key; absent means the ambient credential chain is used
    pub access_key_id: Option<String>,
    /// Static secret key, paired with `access_key_id`
    pub secret_access_key: Option<String>,
    /// Custom endpoint URL (for MinIO, R2, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
    /// Access URL mode
    #[serde(default = "default_url_mode")]
    pub url_mode: UrlMode,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Placeholder image generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Canvas width in pixels
    #[serde(default = "default_canvas_size")]
    pub width: u32,
    /// Canvas height in pixels
    #[serde(default = "default_canvas_size")]
    pub height: u32,
    /// Background RGB colour
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    /// Text RGB colour
    #[serde(default = "default_text_color")]
    pub text_color: [u8; 3],
    /// Left edge of the first glyph
    #[serde(default = "default_text_x")]
    pub text_x: u32,
    /// Top edge of the text line
    #[serde(default = "default_text_y")]
    pub text_y: u32,
    /// Integer glyph scale factor
    #[serde(default = "default_text_scale")]
    pub text_scale: u32,
    /// Number of prompt characters drawn
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Directory for temporary image files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

// Default value functions
fn default_service_name() -> String {
    "asset-storage-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presign_ttl_secs() -> u64 {
    3600
}

fn default_url_mode() -> UrlMode {
    UrlMode::Presigned
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024 // 25MB
}

fn default_canvas_size() -> u32 {
    256
}

fn default_background() -> [u8; 3] {
    [73, 109, 137]
}

fn default_text_color() -> [u8; 3] {
    [255, 255, 0]
}

fn default_text_x() -> u32 {
    10
}

fn default_text_y() -> u32 {
    120
}

fn default_text_scale() -> u32 {
    2
}

fn default_max_prompt_chars() -> usize {
    20
}

impl Config {
    /// Load configuration from config files, environment and `.env`-style flat variables
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration, resolving the flat variables through `lookup`
    pub fn load_with<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            // Start with default values
            .set_default("service.name", "asset-storage-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/storage").required(false))
            .add_source(config::File::with_name("/etc/asset-storage/storage").required(false))
            // Override with environment variables
            // STORAGE__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("STORAGE")
                    .separator("__")
                    .try_parsing(true),
            );

        // Flat variables win over everything else; empty values count as unset
        for (var, key) in FLAT_ENV_OVERRIDES {
            let value = lookup(*var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| if *key == "s3.url_mode" { v.to_lowercase() } else { v });
            builder = builder.set_override_option(*key, value)?;
        }

        let ttl = match lookup(PRESIGN_TTL_ENV).filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|e| {
                anyhow::anyhow!("{PRESIGN_TTL_ENV} must be an integer number of seconds: {e}")
            })?),
            None => None,
        };
        builder = builder.set_override_option("s3.presign_ttl_secs", ttl)?;

        let config = builder.build()?;
        config.try_deserialize().map_err(Into::into)
    }

    /// Check cross-field constraints that deserialization cannot express
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("s3.bucket".to_string()));
        }

        if self.s3.region.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("s3.region".to_string()));
        }

        if self.s3.presign_ttl_secs == 0 || self.s3.presign_ttl_secs > MAX_PRESIGN_TTL_SECS {
            return Err(ConfigValidationError::InvalidValue {
                field: "s3.presign_ttl_secs".to_string(),
                message: format!("must be between 1 and {MAX_PRESIGN_TTL_SECS}"),
            });
        }

        match (&self.s3.access_key_id, &self.s3.secret_access_key) {
            (Some(_), None) => {
                return Err(ConfigValidationError::MissingField(
                    "s3.secret_access_key".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigValidationError::MissingField(
                    "s3.access_key_id".to_string(),
                ))
            }
            _ => {}
        }

        let generation = &self.generation;
        for (field, value) in [
            ("generation.width", generation.width),
            ("generation.height", generation.height),
        ] {
            if value == 0 || value > MAX_CANVAS_DIMENSION {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 1 and {MAX_CANVAS_DIMENSION}"),
                });
            }
        }

        if generation.text_scale == 0 || generation.text_scale > MAX_TEXT_SCALE {
            return Err(ConfigValidationError::InvalidValue {
                field: "generation.text_scale".to_string(),
                message: format!("must be between 1 and {MAX_TEXT_SCALE}"),
            });
        }

        if generation.max_prompt_chars > MAX_PROMPT_CHARS {
            return Err(ConfigValidationError::InvalidValue {
                field: "generation.max_prompt_chars".to_string(),
                message: format!("must be at most {MAX_PROMPT_CHARS}"),
            });
        }

        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presign_ttl(&self) -> Duration {
        self.s3.presign_ttl()
    }
}

impl S3Config {
    /// Static credentials, when both halves are configured
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Get presigned URL expiry as Duration
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_size(),
            height: default_canvas_size(),
            background: default_background(),
            text_color: default_text_color(),
            text_x: default_text_x(),
            text_y: default_text_y(),
            text_scale: default_text_scale(),
            max_prompt_chars: default_max_prompt_chars(),
            temp_dir: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
