use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Where inference runs. `Auto` tries the CUDA execution provider and falls
/// back to the CPU when it is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(AppError::Config(format!(
                "DEVICE must be one of auto, cpu, cuda (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub cdn_base_url: String,
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub prefix: String,
    pub public_read: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub models_dir: PathBuf,
    pub device: Device,
    pub intra_threads: usize,
    pub max_sentence_chars: usize,
    pub storage: Option<StorageConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_var(&var, "PORT", 8000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address {}:{}: {}", host, port, e)))?;

        let models_dir = var("MODELS_DIR").unwrap_or_else(|| "./models".to_string());
        let device = match var("DEVICE") {
            Some(d) => d.parse()?,
            None => Device::Auto,
        };

        let storage = match (var("BUCKET_NAME"), var("CDN_BASE_URL")) {
            (Some(bucket), Some(cdn_base_url)) => Some(StorageConfig {
                bucket,
                cdn_base_url,
                endpoint_url: var("S3_ENDPOINT_URL"),
                region: var("S3_REGION"),
                prefix: var("UPLOAD_PREFIX").unwrap_or_default(),
                public_read: parse_var(&var, "UPLOAD_PUBLIC_READ", false)?,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "BUCKET_NAME and CDN_BASE_URL must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            addr,
            models_dir: models_dir.into(),
            device,
            intra_threads: parse_var(&var, "INTRA_THREADS", 4)?,
            max_sentence_chars: parse_var(&var, "MAX_SENTENCE_CHARS", 10_000)?,
            storage,
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid ('{}'): {}", key, raw, e))),
        None => Ok(default),
    }
}
