use std::io::{self, Write};

use anyhow::{Context, Result};
use colored::Colorize;
use log::debug;

use crate::builder::context::create_context;
use crate::builder::message::{display_quiet, display_stream};
use crate::builder::{BuildClient, ImageBuildOptions, RegistryBuilder};
use crate::config::cmd::{resolve_build_args, CmdArgs};
use crate::reg::reference::validate_reference;
use crate::reg::session::{RegistrySession, SessionOptions};

pub struct BuildCommand {}

impl BuildCommand {
    pub fn build(build_args: &CmdArgs) -> Result<()> {
        let options = SessionOptions::from_env()?;
        let stdout = io::stdout();
        let stderr = io::stderr();
        let image_name = Self::run(build_args, &options, &mut stdout.lock(), &mut stderr.lock())?;
        if !build_args.quiet {
            print_build_success(&image_name);
        }
        Ok(())
    }

    /// Runs one build and returns the fully qualified image name.
    pub fn run<O: Write, E: Write>(build_args: &CmdArgs, options: &SessionOptions, out: &mut O, err: &mut E) -> Result<String> {
        validate_reference(&build_args.tag)?;
        let (session, image_name) =
            RegistrySession::new(&build_args.tag, options).context("Unable to Connect to IBM Cloud")?;
        debug!(
            "Build context: {}, Dockerfile: {}",
            build_args.directory.display(),
            build_args.file.as_deref().unwrap_or("<default>")
        );
        let context_dir = std::path::absolute(&build_args.directory)
            .context("Docker build Context error! Check supplied context path")?;
        let build_arg_values = resolve_build_args(&build_args.build_args, |name| std::env::var(name).ok());

        let archive = create_context(&context_dir, build_args.file.as_deref(), build_args.compress)
            .context("Docker build Context error! Check supplied context path")?;
        debug!("Build context archive {} ({} bytes)", archive.path().display(), archive.size);
        let image_build_options = ImageBuildOptions {
            tags: vec![image_name.clone()],
            dockerfile: archive.dockerfile.clone(),
            build_args: build_arg_values,
            pull_parent: build_args.pull,
            no_cache: build_args.no_cache,
            suppress_output: build_args.quiet,
        };
        let builder = RegistryBuilder::new(session);
        debug!("Build daemon host: {:?}", builder.daemon_host());
        let response = builder.image_build(archive, &image_build_options)?;
        if build_args.quiet {
            display_quiet(response.body, out, err)?;
        } else {
            display_stream(response.body, out)?;
        }
        Ok(image_name)
    }
}

fn print_build_success(image_name: &str) {
    println!(
        "{}",
        format!(
            r#"
Build job successful!

Target image:
{}
"#,
            image_name
        )
        .green()
    );
}

pub fn print_build_failed(err: &anyhow::Error) {
    eprintln!(
        "{}",
        format!(
            r#"
Build job failed!

{:#}
"#,
            err
        )
        .red()
    );
}
