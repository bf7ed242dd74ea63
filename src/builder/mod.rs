use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::debug;
use serde_json::json;

use crate::builder::context::ContextArchive;
use crate::reg::builds::ImageBuildRequest;
use crate::reg::session::RegistrySession;
use crate::util::io::pipe;

pub mod context;
pub mod dockerignore;
pub mod message;

/// What a build engine needs to know about one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuildOptions {
    pub tags: Vec<String>,
    /// Dockerfile path inside the build context.
    pub dockerfile: String,
    /// `None` values are build args declared without a value.
    pub build_args: BTreeMap<String, Option<String>>,
    pub pull_parent: bool,
    pub no_cache: bool,
    pub suppress_output: bool,
}

pub struct ImageBuildResponse {
    /// A stream of JSON messages.
    pub body: Box<dyn Read + Send>,
}

/// The client side of a build engine.
pub trait BuildClient {
    fn image_build(&self, context: ContextArchive, options: &ImageBuildOptions) -> Result<ImageBuildResponse>;

    fn daemon_host(&self) -> String;
}

/// Runs builds in IBM Cloud Container Registry.
pub struct RegistryBuilder {
    session: Arc<RegistrySession>,
}

impl RegistryBuilder {
    pub fn new(session: RegistrySession) -> RegistryBuilder {
        RegistryBuilder {
            session: Arc::new(session),
        }
    }
}

impl BuildClient for RegistryBuilder {
    /// Starts the remote build on a worker thread. Failures of the remote call end up in the
    /// returned stream as an `errorDetail` message.
    fn image_build(&self, context: ContextArchive, options: &ImageBuildOptions) -> Result<ImageBuildResponse> {
        let buildargs = if options.build_args.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&options.build_args).context("Unable to marshal build args as json")?
        };
        let request = ImageBuildRequest {
            t: options.tags.first().cloned().unwrap_or_default(),
            dockerfile: options.dockerfile.clone(),
            buildargs,
            nocache: options.no_cache,
            pull: options.pull_parent,
            quiet: options.suppress_output,
        };
        debug!("Image build request: {:?}", &request);

        let (reader, mut writer) = pipe();
        let session = self.session.clone();
        thread::spawn(move || {
            let target = session.build_target_header.clone();
            if let Err(err) = session.builds().image_build(&request, context.path(), &target, &mut writer) {
                let message = json!({ "errorDetail": { "message": format!("{:#}", err) } });
                let _ = writer.write_all(message.to_string().as_bytes());
            }
        });
        Ok(ImageBuildResponse { body: Box::new(reader) })
    }

    fn daemon_host(&self) -> String {
        String::new()
    }
}
