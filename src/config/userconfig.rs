use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// `~/.docker/config.json`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserDockerConfig {
    pub auths: Option<HashMap<String, UserDockerConfigAuth>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserDockerConfigAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth: Option<String>,
    pub email: Option<String>,
}

/// `~/.bluemix/config.json`, written by the IBM Cloud CLI after `ibmcloud login`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CliConfig {
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "IAMToken", default)]
    pub iam_token: String,
    #[serde(rename = "IAMRefreshToken", default)]
    pub iam_refresh_token: String,
    #[serde(rename = "Account", default)]
    pub account: CliAccount,
    #[serde(rename = "SSLDisabled", default)]
    pub ssl_disabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CliAccount {
    #[serde(rename = "GUID", default)]
    pub guid: String,
}
