use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{anyhow, Error};
use clap::Parser;

use crate::version;

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| version::get().to_string());

/// Build an image in IBM Cloud Container Registry.
#[derive(Parser, Debug)]
#[command(name = "icrbuild", version, long_version = LONG_VERSION.as_str())]
pub struct CmdArgs {
    /// Do not use cache when building the image
    #[arg(long)]
    pub no_cache: bool,

    /// Always attempt to pull a newer version of the image
    #[arg(long)]
    pub pull: bool,

    /// Suppress the build output and print image ID on success
    #[arg(long, short)]
    pub quiet: bool,

    /// Set build-time variables. Example:'VERSION=1.0','HTTP_PROXY'
    #[arg(long = "build-arg", value_name = "KEY=VALUE")]
    pub build_args: Vec<BuildArg>,

    /// Name of the Dockerfile, relative to DIRECTORY (Default is 'DIRECTORY/Dockerfile')
    #[arg(long, short)]
    pub file: Option<String>,

    /// Name and optionally a tag in the 'name:tag' format
    #[arg(long, short, required = true)]
    pub tag: String,

    /// Compress the build context using gzip
    #[arg(long)]
    pub compress: bool,

    /// [OPTION] Log level. Overrides RUST_LOG, default is 'info'
    #[arg(long)]
    pub log_level: Option<String>,

    /// Build context directory
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArg {
    pub key: String,
    pub value: Option<String>,
}

impl FromStr for BuildArg {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (arg, None),
        };
        if key.is_empty() {
            return Err(anyhow!("invalid build arg: {}", arg));
        }
        Ok(BuildArg {
            key: key.to_string(),
            value,
        })
    }
}

/// Build args without a value take it from `env`, or stay `None` when unset there.
pub fn resolve_build_args<F>(args: &[BuildArg], env: F) -> BTreeMap<String, Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    args.iter()
        .map(|arg| {
            let value = arg.value.clone().or_else(|| env(&arg.key));
            (arg.key.clone(), value)
        })
        .collect()
}
