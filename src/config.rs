use crate::services::content_store::DEFAULT_CHUNK_SIZE;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_IMAGE_MAX_AGE: u64 = 3600;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub chunk_size: usize,
    pub max_upload_bytes: usize,
    pub image_max_age: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Product catalog with chunked image storage")]
pub struct Args {
    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image chunks are stored (overrides CATALOG_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Chunk size in bytes for stored objects (overrides CATALOG_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum request body size in bytes (overrides CATALOG_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Cache-Control max-age for images, in seconds (overrides CATALOG_IMAGE_MAX_AGE)
    #[arg(long)]
    pub image_max_age: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |key| env::var(key))?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values read through `lookup`, then defaults.
    fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|_| default.into());

        let cfg = Self {
            host: args.host.unwrap_or_else(|| text("CATALOG_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => env_number(&lookup, "CATALOG_PORT", 3000)?,
            },
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| text("CATALOG_STORAGE_DIR", "./data/objects")),
            database_url: args
                .database_url
                .unwrap_or_else(|| text("CATALOG_DATABASE_URL", "sqlite://./data/meta/catalog.db")),
            chunk_size: match args.chunk_size {
                Some(size) => size,
                None => env_number(&lookup, "CATALOG_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            },
            max_upload_bytes: match args.max_upload_bytes {
                Some(bytes) => bytes,
                None => env_number(&lookup, "CATALOG_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            image_max_age: match args.image_max_age {
                Some(age) => age,
                None => env_number(&lookup, "CATALOG_IMAGE_MAX_AGE", DEFAULT_IMAGE_MAX_AGE)?,
            },
        };

        if cfg.chunk_size == 0 {
            anyhow::bail!("chunk size must be greater than zero");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a numeric variable, falling back to `default` when it is unset.
fn env_number<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let cfg = AppConfig::merge(Args::parse_from(["catalog-store"]), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.image_max_age, 3600);
        assert_eq!(cfg.database_url, "sqlite://./data/meta/catalog.db");
    }

    #[test]
    fn args_override_env() {
        let args = Args::parse_from(["catalog-store", "--port", "9000", "--chunk-size", "1024"]);
        let env = lookup(&[("CATALOG_PORT", "8000"), ("CATALOG_HOST", "127.0.0.1")]);
        let cfg = AppConfig::merge(args, env).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.chunk_size, 1024);
    }

    #[test]
    fn malformed_numbers_fail() {
        let args = Args::parse_from(["catalog-store"]);
        let err = AppConfig::merge(args, lookup(&[("CATALOG_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("CATALOG_PORT"));

        let args = Args::parse_from(["catalog-store", "--chunk-size", "0"]);
        assert!(AppConfig::merge(args, lookup(&[])).is_err());
    }
}
