use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::{Body, Client, ClientBuilder, Request};
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Method, Url};

pub mod auth;

#[derive(Clone)]
pub enum HttpAuth {
    BasicAuth { username: String, password: String },
    BearerToken { token: String },
}

pub struct RequestContentType(&'static str);

impl RequestContentType {
    pub const JSON: Self = Self("application/json");
    pub const TAR: Self = Self("application/tar");

    pub fn val(&self) -> &'static str {
        self.0
    }
}

pub enum RequestBody {
    Form(Vec<(&'static str, String)>),
    Read(Body),
}

/// Connection settings shared by the IAM and registry clients.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub ssl_disabled: bool,
    /// `None` lets long running build streams stay open.
    pub timeout: Option<Duration>,
}

/// Proxies are taken from the environment by reqwest.
pub fn new_http_client(options: &HttpOptions) -> Result<Client> {
    let client = ClientBuilder::new()
        .timeout(options.timeout)
        .connect_timeout(Duration::from_secs(50))
        .tcp_keepalive(Duration::from_secs(30))
        .danger_accept_invalid_certs(options.ssl_disabled)
        .redirect(Policy::default())
        .user_agent(concat!("icrbuild/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub fn build_request(
    client: &Client,
    url: &str,
    method: Method,
    http_auth_opt: Option<&HttpAuth>,
    accept: Option<&RequestContentType>,
    headers: &[(&str, &str)],
    body: Option<RequestBody>,
) -> Result<Request> {
    let url = Url::from_str(url)?;
    let mut builder = client.request(method, url);
    match http_auth_opt {
        None => {}
        Some(HttpAuth::BasicAuth { username, password }) => builder = builder.basic_auth(username, Some(password)),
        Some(HttpAuth::BearerToken { token }) => builder = builder.bearer_auth(token),
    }
    if let Some(accept) = accept {
        builder = builder.header("Accept", accept.val());
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        None => {}
        Some(RequestBody::Form(form)) => builder = builder.form(&form),
        Some(RequestBody::Read(body)) => builder = builder.header("Content-Type", RequestContentType::TAR.val()).body(body),
    }
    Ok(builder.build()?)
}

pub fn get_header(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers.get(header_name).and_then(|value| match value.to_str() {
        Ok(str) => Some(String::from(str)),
        Err(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn request_timeout_is_applied() -> Result<()> {
        // accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let url = format!("http://{}/identity/token", listener.local_addr()?);
        let options = HttpOptions {
            ssl_disabled: false,
            timeout: Some(Duration::from_millis(300)),
        };
        let client = new_http_client(&options)?;
        let request = build_request(&client, &url, Method::GET, None, Some(&RequestContentType::JSON), &[], None)?;
        let err = client.execute(request).unwrap_err();
        assert!(err.is_timeout(), "{:?}", err);
        drop(listener);
        Ok(())
    }

    #[test]
    fn headers_and_auth_are_set() -> Result<()> {
        let client = new_http_client(&HttpOptions::default())?;
        let auth = HttpAuth::BearerToken {
            token: "tok".to_string(),
        };
        let request = build_request(
            &client,
            "http://127.0.0.1:9/api/v1/builds",
            Method::POST,
            Some(&auth),
            Some(&RequestContentType::JSON),
            &[("Account", "acc")],
            Some(RequestBody::Read(Body::from(b"tar".to_vec()))),
        )?;
        assert_eq!(get_header(request.headers(), "authorization").as_deref(), Some("Bearer tok"));
        assert_eq!(get_header(request.headers(), "accept").as_deref(), Some("application/json"));
        assert_eq!(get_header(request.headers(), "account").as_deref(), Some("acc"));
        assert_eq!(get_header(request.headers(), "content-type").as_deref(), Some("application/tar"));
        Ok(())
    }
}
