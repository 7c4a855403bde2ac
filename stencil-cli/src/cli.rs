//! Command line definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(version)]
#[command(about = "Expand project templates into a directory")]
#[command(long_about = "
stencil expands project templates described by a YAML manifest. Every file in
the manifest is parsed, expanded against the parameters you pass, and written
into the target directory.

Example usage:
  stencil list ./templates                                  # Show available templates
  stencil show ./templates/rust-lib/template.yaml           # Describe one template
  stencil expand ./templates/rust-lib/template.yaml \\
      --directory ./demo --param name=demo                  # Write a project
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand a project template into a directory
    Expand {
        /// Path to the template manifest
        manifest: PathBuf,

        /// Directory the project is written into
        #[arg(long, short = 'C')]
        directory: PathBuf,

        /// Template parameter as key=value; may be repeated
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Pipeline timing configuration file (toml, yaml or json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Expand in memory and list the files that would be written
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a template manifest as JSON
    Show {
        /// Path to the template manifest
        manifest: PathBuf,
    },
    /// List templates found under a directory, sorted by name
    List {
        /// Directory searched for template.yaml manifests
        directory: PathBuf,
    },
}

/// Parse a `key=value` parameter
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter '{}' has an empty key", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
