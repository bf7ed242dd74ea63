use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use url::Url;

use crate::config::{resolve, AuthConfig, CredentialPaths, Credentials};
use crate::reg::builds::{BuildTargetHeader, Builds};
use crate::reg::http::auth::{strip_bearer, token_expired, IamClient, IamToken, DEFAULT_IAM_ENDPOINT, IAM_ENDPOINT_ENV};
use crate::reg::http::{new_http_client, HttpOptions};
use crate::reg::reference::{add_registry, registry_endpoint};
use crate::reg::region::{registry_endpoint_for_region, DEFAULT_REGION};

/// Request timeout of IAM calls. Registry calls have none.
const IAM_TIMEOUT_SECS: u64 = 60;

/// Inputs of the session bootstrap that are taken from the environment in production.
pub struct SessionOptions {
    credential_paths: CredentialPaths,
    iam_endpoint: String,
    env: Box<dyn Fn(&str) -> Option<String>>,
    registry_url_override: Option<String>,
}

impl SessionOptions {
    pub fn from_env() -> Result<SessionOptions> {
        Ok(Self::new(CredentialPaths::from_home_dir()?, |name| std::env::var(name).ok()))
    }

    /// `env` supplies the API key variables and the IAM endpoint override.
    pub fn new<F>(credential_paths: CredentialPaths, env: F) -> SessionOptions
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        let iam_endpoint = env(IAM_ENDPOINT_ENV)
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string());
        SessionOptions {
            credential_paths,
            iam_endpoint,
            env: Box::new(env),
            registry_url_override: None,
        }
    }

    /// Sends registry calls to `url` instead of `https://<host>`.
    #[cfg(test)]
    pub fn with_registry_url(mut self, url: String) -> SessionOptions {
        self.registry_url_override = Some(url);
        self
    }
}

/// An authenticated session against one registry endpoint.
pub struct RegistrySession {
    /// Registry URL, e.g. `https://us.icr.io`.
    pub registry: String,
    pub build_target_header: BuildTargetHeader,
    client: Client,
    iam: IamClient,
    token: Mutex<IamToken>,
}

impl RegistrySession {
    /// Authenticates for `image_name` and returns the session together with the image name,
    /// qualified with the default registry when it named none.
    pub fn new(image_name: &str, options: &SessionOptions) -> Result<(RegistrySession, String)> {
        let mut image_name = image_name.to_string();
        let (endpoint_host, mut registry) = match registry_endpoint(&image_name) {
            None => {
                let registry = registry_endpoint_for_region(DEFAULT_REGION)?;
                image_name = add_registry(&registry, &image_name)?;
                let host = registry_host(&registry).context("Error Parsing registry endpoint")?;
                (host, registry)
            }
            Some(host) => {
                let registry = format!("https://{}", host);
                (host, registry)
            }
        };
        if let Some(url) = &options.registry_url_override {
            registry = url.clone();
        }
        debug!("Registry endpoint: {} ({})", &registry, &endpoint_host);

        let auth_config = resolve(&options.credential_paths, &endpoint_host, &options.env)?;
        debug!("IBM Cloud region: {}", &auth_config.region);
        let http_options = HttpOptions {
            ssl_disabled: auth_config.ssl_disabled,
            timeout: None,
        };
        let client = new_http_client(&http_options).context("IBM Cloud configuration error.")?;
        let iam_options = HttpOptions {
            timeout: Some(Duration::from_secs(IAM_TIMEOUT_SECS)),
            ..http_options
        };
        let iam_client = new_http_client(&iam_options).context("IBM Cloud configuration error.")?;
        let iam = IamClient::new(&options.iam_endpoint, iam_client);
        let (token, account) = authenticate(&iam, auth_config)?;

        let account = match account {
            Some(account) => account,
            None => iam
                .account_id(&token.access_token)
                .context("IBM Cloud fetching user account error.")?,
        };
        info!("Authenticated with IBM Cloud account {}", &account);

        Ok((
            RegistrySession {
                registry,
                build_target_header: BuildTargetHeader { account_id: account },
                client,
                iam,
                token: Mutex::new(token),
            },
            image_name,
        ))
    }

    pub fn builds(&self) -> Builds<'_> {
        Builds::new(self)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn access_token(&self) -> Result<String> {
        let token = self.token.lock().map_err(|_| anyhow!("token lock poisoned"))?;
        Ok(token.access_token.clone())
    }

    /// Exchanges the refresh token for a new access token.
    /// Returns `false` when the session has no refresh token.
    pub fn refresh_token(&self) -> Result<bool> {
        let mut token = self.token.lock().map_err(|_| anyhow!("token lock poisoned"))?;
        let Some(refresh_token) = token.refresh_token.clone() else {
            return Ok(false);
        };
        *token = self.iam.refresh(&refresh_token).context("IBM Cloud auth error.")?;
        Ok(true)
    }
}

fn registry_host(registry: &str) -> Result<String> {
    let url = Url::parse(registry)?;
    let host = url.host_str().ok_or_else(|| anyhow!("no host in {}", registry))?;
    Ok(match url.port() {
        None => host.to_string(),
        Some(port) => format!("{}:{}", host, port),
    })
}

/// Returns the session token and, for CLI sessions, the account id.
fn authenticate(iam: &IamClient, auth_config: AuthConfig) -> Result<(IamToken, Option<String>)> {
    match auth_config.credentials {
        Credentials::ApiKey { key } => {
            let token = iam.token_from_api_key(&key).context("IBM Cloud auth error.")?;
            Ok((token, None))
        }
        Credentials::CliSession {
            iam_token,
            refresh_token,
            account_id,
        } => {
            let refresh_token = Some(refresh_token).filter(|token| !token.is_empty());
            let access_token = strip_bearer(&iam_token).to_string();
            let token = match &refresh_token {
                Some(refresh) if access_token.is_empty() || token_expired(&access_token) => {
                    warn!("IBM Cloud CLI session token expired, refreshing it");
                    iam.refresh(refresh).context("IBM Cloud auth error.")?
                }
                _ => IamToken {
                    access_token,
                    refresh_token,
                },
            };
            Ok((token, Some(account_id).filter(|account| !account.is_empty())))
        }
    }
}
