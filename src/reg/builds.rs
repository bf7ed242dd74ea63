use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use reqwest::blocking::{Body, Response};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::reg::http::{build_request, get_header, HttpAuth, RequestBody, RequestContentType};
use crate::reg::session::RegistrySession;

/// Identifies the account the build runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTargetHeader {
    pub account_id: String,
}

impl BuildTargetHeader {
    pub fn headers(&self) -> Vec<(&'static str, &str)> {
        vec![("Account", self.account_id.as_str())]
    }
}

/// Query parameters of `POST /api/v1/builds`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuildRequest {
    pub t: String,
    pub dockerfile: String,
    pub buildargs: String,
    pub nocache: bool,
    pub pull: bool,
    pub quiet: bool,
}

impl ImageBuildRequest {
    /// Empty and false values are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        for (name, value) in [("t", &self.t), ("dockerfile", &self.dockerfile), ("buildargs", &self.buildargs)] {
            if !value.is_empty() {
                pairs.push((name, value.clone()));
            }
        }
        for (name, value) in [("nocache", self.nocache), ("pull", self.pull), ("q", self.quiet)] {
            if value {
                pairs.push((name, "true".to_string()));
            }
        }
        pairs
    }
}

/// The build API of one registry session.
pub struct Builds<'a> {
    session: &'a RegistrySession,
}

impl<'a> Builds<'a> {
    pub fn new(session: &'a RegistrySession) -> Builds<'a> {
        Builds { session }
    }

    /// Uploads the build context archive at `context` and copies the build output to `out`.
    pub fn image_build<W: Write + ?Sized>(
        &self,
        request: &ImageBuildRequest,
        context: &Path,
        target: &BuildTargetHeader,
        out: &mut W,
    ) -> Result<()> {
        let url = self.build_url(request)?;
        let mut response = self.send(&url, context, target)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Registry rejected the IAM token, refreshing it");
            if self.session.refresh_token()? {
                response = self.send(&url, context, target)?;
            }
        }
        let status = response.status();
        if !status.is_success() {
            let content_type = get_header(response.headers(), "content-type");
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Request to registry failed,status_code:{} ,content-type:{} ,body:{}",
                status.as_str(),
                content_type.unwrap_or_default(),
                body.trim()
            ));
        }
        io::copy(&mut response, out).context("reading build output failed")?;
        Ok(())
    }

    fn build_url(&self, request: &ImageBuildRequest) -> Result<String> {
        let mut url = Url::parse(&format!("{}/api/v1/builds", self.session.registry.trim_end_matches('/')))?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in request.query_pairs() {
                query.append_pair(name, &value);
            }
        }
        let mut url = url.to_string();
        if url.ends_with('?') {
            url.pop();
        }
        Ok(url)
    }

    fn send(&self, url: &str, context: &Path, target: &BuildTargetHeader) -> Result<Response> {
        let context_file = File::open(context)?;
        let size = context_file.metadata()?.len();
        debug!("POST {} ({} bytes of context)", url, size);
        let auth = HttpAuth::BearerToken {
            token: self.session.access_token()?,
        };
        let client = self.session.client();
        let request = build_request(
            client,
            url,
            Method::POST,
            Some(&auth),
            Some(&RequestContentType::JSON),
            &target.headers(),
            Some(RequestBody::Read(Body::sized(context_file, size))),
        )?;
        Ok(client.execute(request)?)
    }
}
