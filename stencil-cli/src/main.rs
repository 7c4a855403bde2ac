//! `stencil` command line host

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stencil::{
    ManifestTemplate, MemoryStorage, PipelineConfig, ProjectParams, ProjectTemplate,
    ProjectTemplateRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.quiet);

    match cli.command {
        Commands::Expand {
            manifest,
            directory,
            params,
            config,
            dry_run,
        } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling expansion");
                    on_interrupt.cancel();
                }
            });

            let written = expand(
                &manifest,
                &directory,
                params,
                config.as_deref(),
                dry_run,
                &cancel,
            )
            .await?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Show { manifest } => {
            let template = ManifestTemplate::load(&manifest)?;
            println!("{}", serde_json::to_string_pretty(template.manifest())?);
        }
        Commands::List { directory } => {
            let mut registry = ProjectTemplateRegistry::new();
            registry.load_directory(&directory)?;
            println!("{}", serde_json::to_string_pretty(&describe(&registry))?);
        }
    }

    Ok(())
}

fn configure_logging(debug: bool, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

    let default_level = if quiet {
        "error"
    } else if debug {
        "stencil=debug,stencil_templating=debug,warn"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Expand `manifest` into `directory`, returning the files written
async fn expand(
    manifest: &Path,
    directory: &Path,
    params: Vec<(String, String)>,
    config: Option<&Path>,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let config = PipelineConfig::load_from(config).context("loading pipeline configuration")?;
    let mut template = ManifestTemplate::load(manifest)?.with_config(config);

    let mut project_params: ProjectParams = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    project_params.insert(
        "directory".to_string(),
        Value::String(directory.display().to_string()),
    );
    debug!("expanding '{}' into {}", template.id(), directory.display());

    let preview = Arc::new(MemoryStorage::new());
    if dry_run {
        template = template.with_storage(preview.clone());
    }

    let mut pipeline = template.pipeline(&project_params)?;
    let destinations: Vec<PathBuf> = pipeline
        .records()
        .iter()
        .map(|record| record.destination().to_path_buf())
        .collect();

    pipeline
        .expand_all(cancel)
        .await
        .with_context(|| format!("expanding template '{}'", template.id()))?;

    if dry_run {
        return Ok(preview.file_paths());
    }
    info!("wrote {} files", destinations.len());
    Ok(destinations)
}

fn describe(registry: &ProjectTemplateRegistry) -> Value {
    Value::Array(
        registry
            .list()
            .iter()
            .map(|template| {
                json!({
                    "id": template.id(),
                    "name": template.name(),
                    "description": template.description(),
                    "languages": template.languages(),
                    "icon_name": template.icon_name(),
                })
            })
            .collect(),
    )
}
