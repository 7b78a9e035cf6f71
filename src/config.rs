use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Where uploaded photos live.
#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Fs {
        dir: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub photo_name_len: usize,
    pub max_upload_mb: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        match env_or("STORAGE_BACKEND", "fs").as_str() {
            "fs" => Ok(StorageConfig::Fs {
                dir: env_or("PHOTO_DIR", "static/img"),
            }),
            "s3" => Ok(StorageConfig::S3 {
                endpoint: env_required("S3_ENDPOINT")?,
                bucket: env_required("S3_BUCKET")?,
                access_key: env_required("S3_ACCESS_KEY")?,
                secret_key: env_required("S3_SECRET_KEY")?,
                region: env_or("S3_REGION", "us-east-1"),
            }),
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected fs or s3"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: env_required("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "storefront"),
            audience: env_or("JWT_AUDIENCE", "storefront-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            jwt,
            storage: StorageConfig::from_env()?,
            photo_name_len: env_parse("PHOTO_NAME_LEN", 16),
            max_upload_mb: env_parse("MAX_UPLOAD_MB", 10),
        })
    }
}
