use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;

use crate::provisioning::{DevProvisioner, ExternalProvisioner, Provisioner};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub api_key: String,
    pub provisioner: ProvisionerConfig,
}

/// Which provisioner backend the binaries should talk to.
#[derive(Debug, Clone)]
pub enum ProvisionerConfig {
    /// In-memory mock; workers terminate `lag_cycles` polls after their
    /// execution finishes.
    Dev { lag_cycles: u32 },
    /// External HTTP driver.
    External { api_url: String, api_key: String },
}

impl Config {
    /// Load configuration from environment variables, reading a `.env` file
    /// first when present (development).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            api_key: env::var("API_KEY").context("API_KEY must be set")?,
            provisioner: ProvisionerConfig::from_env()?,
        })
    }
}

impl ProvisionerConfig {
    fn from_env() -> Result<Self> {
        let kind = env::var("PROVISIONER").unwrap_or_else(|_| "dev".to_string());

        match kind.as_str() {
            "dev" => {
                let lag_cycles = env::var("DEV_PROVISIONER_LAG_CYCLES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("DEV_PROVISIONER_LAG_CYCLES must be a valid number")?;
                Ok(ProvisionerConfig::Dev { lag_cycles })
            }
            "external" => Ok(ProvisionerConfig::External {
                api_url: env::var("PROVISIONER_API_URL")
                    .context("PROVISIONER_API_URL must be set for the external provisioner")?,
                api_key: env::var("PROVISIONER_API_KEY")
                    .context("PROVISIONER_API_KEY must be set for the external provisioner")?,
            }),
            other => bail!("unknown PROVISIONER value: {other} (expected dev or external)"),
        }
    }

    pub fn build(&self) -> Arc<dyn Provisioner> {
        match self {
            ProvisionerConfig::Dev { lag_cycles } => Arc::new(DevProvisioner::new(*lag_cycles)),
            ProvisionerConfig::External { api_url, api_key } => {
                Arc::new(ExternalProvisioner::new(api_url.clone(), api_key.clone()))
            }
        }
    }
}
