use anyhow::{anyhow, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use fantasy_util::time::system_time::SystemLocalTime;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::Method;
use serde::Deserialize;

use crate::reg::http::{build_request, HttpAuth, RequestBody, RequestContentType};

pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";
pub const IAM_ENDPOINT_ENV: &str = "IBMCLOUD_IAM_ENDPOINT";

const API_KEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// Tokens are refreshed this many seconds before they really expire.
const EXPIRY_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct IamErrorResponse {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    account: Option<UserInfoAccount>,
}

#[derive(Deserialize)]
struct UserInfoAccount {
    bss: Option<String>,
}

/// Talks to the IAM identity service.
pub struct IamClient {
    endpoint: String,
    client: Client,
}

impl IamClient {
    pub fn new(endpoint: &str, client: Client) -> IamClient {
        IamClient {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn token_from_api_key(&self, api_key: &str) -> Result<IamToken> {
        debug!("Exchanging API key for an IAM token at {}", &self.endpoint);
        self.request_token(vec![
            ("grant_type", API_KEY_GRANT_TYPE.to_string()),
            ("response_type", "cloud_iam".to_string()),
            ("apikey", api_key.to_string()),
        ])
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<IamToken> {
        debug!("Refreshing IAM token at {}", &self.endpoint);
        let mut token = self.request_token(vec![
            ("grant_type", REFRESH_GRANT_TYPE.to_string()),
            ("refresh_token", refresh_token.to_string()),
        ])?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// The BSS account id owning `token`.
    pub fn account_id(&self, token: &str) -> Result<String> {
        let url = format!("{}/identity/userinfo", &self.endpoint);
        let auth = HttpAuth::BearerToken { token: token.to_string() };
        let request = build_request(&self.client, &url, Method::GET, Some(&auth), Some(&RequestContentType::JSON), &[], None)?;
        let response_text = self.execute(request)?;
        let user_info = serde_json::from_str::<UserInfo>(&response_text)
            .map_err(|err| anyhow!("deserialization 'userinfo' response failed: {}. response: {}.", err, response_text))?;
        user_info
            .account
            .and_then(|account| account.bss)
            .filter(|bss| !bss.is_empty())
            .ok_or_else(|| anyhow!("account not found in 'userinfo' response"))
    }

    fn request_token(&self, form: Vec<(&'static str, String)>) -> Result<IamToken> {
        let url = format!("{}/identity/token", &self.endpoint);
        let auth = HttpAuth::BasicAuth {
            username: "bx".to_string(),
            password: "bx".to_string(),
        };
        let request = build_request(
            &self.client,
            &url,
            Method::POST,
            Some(&auth),
            Some(&RequestContentType::JSON),
            &[],
            Some(RequestBody::Form(form)),
        )?;
        let response_text = self.execute(request)?;
        let token_response = serde_json::from_str::<TokenResponse>(&response_text)
            .map_err(|err| anyhow!("deserialization 'get token' response failed: {}. response: {}.", err, response_text))?;
        if token_response.expires_in.is_none() {
            warn!("'expires_in' not found in token response.");
        }
        Ok(IamToken {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.filter(|token| !token.is_empty()),
        })
    }

    fn execute(&self, request: reqwest::blocking::Request) -> Result<String> {
        let http_response = self.client.execute(request)?;
        let status = http_response.status();
        let response_text = http_response.text().unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<IamErrorResponse>(&response_text)
                .ok()
                .and_then(|err| err.error_message)
                .unwrap_or(response_text);
            return Err(anyhow!("IAM request failed,code: {}. response: {}", status.as_str(), message));
        }
        Ok(response_text)
    }
}

/// Drops the `Bearer ` prefix the CLI stores its tokens with.
pub fn strip_bearer(token: &str) -> &str {
    token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .unwrap_or(token)
        .trim()
}

/// Reads the `exp` claim of a JWT without checking its signature.
pub fn token_expiry(token: &str) -> Option<u64> {
    let payload = strip_bearer(token).split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims = serde_json::from_slice::<serde_json::Value>(&decoded).ok()?;
    claims.get("exp")?.as_u64()
}

/// A token whose expiry can not be read is assumed to be valid.
pub fn token_expired(token: &str) -> bool {
    token_expired_at(token, SystemLocalTime::unix_secs())
}

fn token_expired_at(token: &str, now_secs: u64) -> bool {
    match token_expiry(token) {
        None => false,
        Some(exp) => now_secs + EXPIRY_LEEWAY_SECS >= exp,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::reg::http::{new_http_client, HttpOptions};
    use crate::test_util::{MockResponse, MockServer};

    use super::*;

    pub(crate) fn jwt_with_exp(exp: u64) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"iam_id":"IBMid-1"}}"#, exp));
        format!("{}.{}.sig", header, payload)
    }

    fn iam_client(server: &MockServer) -> IamClient {
        IamClient::new(&server.url(), new_http_client(&HttpOptions::default()).unwrap())
    }

    #[test]
    fn api_key_exchange() -> Result<()> {
        let server = MockServer::start(vec![MockResponse::json(
            200,
            r#"{"access_token":"access","refresh_token":"refresh","expires_in":3600}"#,
        )]);
        let token = iam_client(&server).token_from_api_key("my-key")?;
        assert_eq!(token.access_token, "access");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));

        let requests = server.finish();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/identity/token");
        assert_eq!(requests[0].header("authorization").as_deref(), Some("Basic Yng6Yng="));
        assert_eq!(requests[0].header("accept").as_deref(), Some("application/json"));
        assert_eq!(
            requests[0].header("content-type").as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        let body = requests[0].body_str();
        assert!(body.contains("grant_type=urn%3Aibm%3Aparams%3Aoauth%3Agrant-type%3Aapikey"));
        assert!(body.contains("apikey=my-key"));
        Ok(())
    }

    #[test]
    fn refresh_keeps_old_refresh_token() -> Result<()> {
        let server = MockServer::start(vec![MockResponse::json(200, r#"{"access_token":"new"}"#)]);
        let token = iam_client(&server).refresh("old-refresh")?;
        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        let requests = server.finish();
        assert!(requests[0].body_str().contains("grant_type=refresh_token"));
        Ok(())
    }

    #[test]
    fn iam_error_message_is_reported() {
        let server = MockServer::start(vec![MockResponse::json(
            400,
            r#"{"errorCode":"BXNIM0415E","errorMessage":"Provided API key could not be found."}"#,
        )]);
        let err = iam_client(&server).token_from_api_key("bad").unwrap_err();
        assert!(err.to_string().contains("Provided API key could not be found."));
        assert!(err.to_string().contains("400"));
        server.finish();
    }

    #[test]
    fn account_from_userinfo() -> Result<()> {
        let server = MockServer::start(vec![MockResponse::json(200, r#"{"account":{"bss":"bss-account","ims":"1"}}"#)]);
        assert_eq!(iam_client(&server).account_id("token")?, "bss-account");
        let requests = server.finish();
        assert_eq!(requests[0].path, "/identity/userinfo");
        assert_eq!(requests[0].header("authorization").as_deref(), Some("Bearer token"));
        Ok(())
    }

    #[test]
    fn userinfo_without_account_fails() {
        let server = MockServer::start(vec![MockResponse::json(200, r#"{"sub":"x"}"#)]);
        assert!(iam_client(&server).account_id("token").is_err());
        server.finish();
    }

    #[test]
    fn expiry_is_read_from_the_payload() {
        let token = jwt_with_exp(1_000);
        assert_eq!(token_expiry(&token), Some(1_000));
        assert_eq!(token_expiry(&format!("Bearer {}", token)), Some(1_000));
        assert!(token_expired_at(&token, 990));
        assert!(!token_expired_at(&token, 900));
        assert!(!token_expired_at("opaque-token", u64::MAX - EXPIRY_LEEWAY_SECS));
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
    }
}
