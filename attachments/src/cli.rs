//! Command-line interface for attachments.
//!
//! Parsing and output formatting only; everything else is delegated to
//! [`attachments_core`]. stdout carries results (JSON or tab-separated
//! lines), logs go to stderr.
//!
//! ## Subcommands
//! - `att <INPUT>`: unpack, process and print the artifacts as JSON.
//! - `unpack <INPUT>`: print one `name<TAB>size` line per unpacked entry.
//! - `health`: print the remote service health JSON.
//! - `deps`: print which optional capabilities this build has.
//!
//! [`run`] is the async entrypoint shared by `main` and the integration tests.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use attachments_core::{capabilities, Attachments, CallOptions, ConfigPatch, PreferMode};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::load_config::load_config;

/// Turn files, directories, archives and URLs into LLM-ready text.
#[derive(Debug, Parser)]
#[clap(name = "attachments", version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Configuration flags shared by commands that talk to the service.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// YAML file with configuration keys (api_key, prefer, service_url, ...)
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// local, service, local-only or service-only
    #[clap(long)]
    pub prefer: Option<PreferMode>,

    /// Service API key; ATTACHMENTS_API_KEY is used when absent
    #[clap(long)]
    pub api_key: Option<String>,

    #[clap(long)]
    pub service_url: Option<String>,
}

impl ConfigArgs {
    /// Flags over the config file. Environment and defaults are layered in by the core.
    pub fn to_patch(&self) -> Result<ConfigPatch> {
        let file = match &self.config {
            Some(path) => load_config(path)?,
            None => ConfigPatch::default(),
        };
        let flags = ConfigPatch {
            api_key: self.api_key.clone(),
            prefer: self.prefer,
            service_url: self.service_url.clone(),
            ..Default::default()
        };
        Ok(flags.or(file))
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process an input into artifacts and print them as JSON
    Att {
        /// Path, directory, archive, URL or github:// spec, with optional [key: value] suffix
        input: String,

        #[clap(flatten)]
        config: ConfigArgs,

        /// Processor option, repeatable
        #[clap(long = "option", short = 'o', value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Print JSON on one line
        #[clap(long)]
        compact: bool,
    },
    /// List the files an input resolves to
    Unpack {
        input: String,
    },
    /// Query the remote service health endpoint
    Health {
        #[clap(flatten)]
        config: ConfigArgs,
    },
    /// Report which optional capabilities are compiled in
    Deps,
}

/// Parse `key=value`; the value is read as JSON when it parses, else kept as a string.
pub fn parse_option(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid option '{raw}', expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("invalid option '{raw}', empty key"));
    }
    let value = value.trim();
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("writing to stdout")?;
    Ok(())
}

/// Async CLI entrypoint.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");
    let ctx = Attachments::new();

    match cli.command {
        Commands::Att {
            input,
            config,
            options,
            compact,
        } => {
            let mut call = CallOptions::new().with_config(config.to_patch()?);
            for raw in &options {
                let (key, value) = parse_option(raw)?;
                call = call.with_option(&key, value);
            }
            tracing::info!(command = "att", input = %input, "Processing input");
            let artifacts = ctx.att(&input, &call).await;
            let failed = artifacts.iter().filter(|a| a.error_message().is_some()).count();
            tracing::info!(
                command = "att",
                artifacts = artifacts.len(),
                failed,
                "Processing complete"
            );
            print_json(&artifacts, compact)
        }
        Commands::Unpack { input } => {
            tracing::info!(command = "unpack", input = %input, "Unpacking input");
            let entries = ctx
                .unpack(&input, &[])
                .await
                .with_context(|| format!("unpacking {input}"))?;
            let mut stdout = std::io::stdout().lock();
            for entry in &entries {
                writeln!(stdout, "{}\t{}", entry.name, entry.content.len())?;
            }
            Ok(())
        }
        Commands::Health { config } => {
            let health = ctx.health(&config.to_patch()?).await;
            print_json(&health, false)
        }
        Commands::Deps => print_json(&capabilities(), false),
    }
}
