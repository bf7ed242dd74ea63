use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use home::home_dir;
use log::{debug, error, warn};

use crate::config::userconfig::{CliConfig, UserDockerConfig};
use crate::reg::region::DEFAULT_REGION;

pub mod cmd;
pub mod userconfig;

/// Environment variables holding an IBM Cloud API key, in lookup order.
pub const API_KEY_ENVS: [&str; 4] = ["IBMCLOUD_API_KEY", "IC_API_KEY", "BLUEMIX_API_KEY", "BM_API_KEY"];

/// Where the local credential stores live.
#[derive(Debug, Clone)]
pub struct CredentialPaths {
    pub docker_config: PathBuf,
    pub cli_config: PathBuf,
}

impl CredentialPaths {
    pub fn from_home(home: &Path) -> CredentialPaths {
        CredentialPaths {
            docker_config: home.join(".docker/config.json"),
            cli_config: home.join(".bluemix/config.json"),
        }
    }

    pub fn from_home_dir() -> Result<CredentialPaths> {
        let home = home_dir().ok_or_else(|| anyhow!("can not find the home directory"))?;
        Ok(Self::from_home(&home))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Exchanged with IAM for a token.
    ApiKey { key: String },
    /// Reused from an `ibmcloud login` session.
    CliSession {
        iam_token: String,
        refresh_token: String,
        account_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub region: String,
    pub ssl_disabled: bool,
    pub credentials: Credentials,
}

/// Resolves credentials for `endpoint`.
///
/// The Docker credential store is tried first and its failures are only logged.
/// Then the API key environment variables, and finally the IBM Cloud CLI session,
/// whose failures are fatal.
pub fn resolve<F>(paths: &CredentialPaths, endpoint: &str, env: F) -> Result<AuthConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut api_key = match api_key_from_docker_config(&paths.docker_config, endpoint) {
        Ok(key) => key,
        Err(err) => {
            error!("Error Fetching Docker Config: {:#}", err);
            None
        }
    };
    if api_key.is_none() {
        api_key = api_key_from_env(env);
    }
    if let Some(key) = api_key {
        return Ok(AuthConfig {
            region: DEFAULT_REGION.to_string(),
            ssl_disabled: false,
            credentials: Credentials::ApiKey { key },
        });
    }

    warn!("API key not set, trying to use a pre-authenticated CLI Session...");
    let cli_config = config_from_cli(&paths.cli_config).context("IBM Cloud configuration error.")?;
    Ok(AuthConfig {
        region: if cli_config.region.is_empty() { DEFAULT_REGION.to_string() } else { cli_config.region },
        ssl_disabled: cli_config.ssl_disabled,
        credentials: Credentials::CliSession {
            iam_token: cli_config.iam_token,
            refresh_token: cli_config.iam_refresh_token,
            account_id: cli_config.account.guid,
        },
    })
}

/// Only API keys stored as registry passwords are supported.
pub fn api_key_from_docker_config(config_path: &Path, endpoint: &str) -> Result<Option<String>> {
    if !config_path.is_file() {
        debug!("Docker config not found: {}", config_path.display());
        return Ok(None);
    }
    let config_file = File::open(config_path)?;
    let user_docker_config = serde_json::from_reader::<_, UserDockerConfig>(config_file)
        .with_context(|| format!("invalid docker config: {}", config_path.display()))?;
    get_api_key_from_dockerconfig(user_docker_config, endpoint)
}

fn get_api_key_from_dockerconfig(user_docker_config: UserDockerConfig, endpoint: &str) -> Result<Option<String>> {
    let auth = user_docker_config
        .auths
        .as_ref()
        .and_then(|auth_map| auth_map.get(endpoint))
        .ok_or_else(|| anyhow!("Registry {} not found in docker creds!", endpoint))?;
    if let Some(password) = auth.password.as_ref().filter(|password| !password.is_empty()) {
        return Ok(Some(password.clone()));
    }
    match auth.auth.as_ref().filter(|auth| !auth.is_empty()) {
        Some(base64_str) => {
            let decoded = STANDARD.decode(base64_str)?;
            let decode_str = String::from_utf8(decoded)?;
            Ok(decode_str.split(':').nth(1).map(str::to_string))
        }
        None => Err(anyhow!("Found docker config but unable to find API Key for {}!", endpoint)),
    }
}

pub fn api_key_from_env<F>(env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_ENVS
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.is_empty())
}

pub fn config_from_cli(config_path: &Path) -> Result<CliConfig> {
    let config_file = File::open(config_path)
        .with_context(|| format!("can not open IBM Cloud CLI config: {}", config_path.display()))?;
    let cli_config = serde_json::from_reader::<_, CliConfig>(config_file)
        .with_context(|| format!("invalid IBM Cloud CLI config: {}", config_path.display()))?;
    if cli_config.iam_token.is_empty() && cli_config.iam_refresh_token.is_empty() {
        return Err(anyhow!("not logged in, run 'ibmcloud login' first"));
    }
    Ok(cli_config)
}
