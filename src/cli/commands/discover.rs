//! CLI command for `firmkit discover`
//!
//! Runs library discovery for the project in the current directory and
//! prints the resulting include folders and libraries.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{spinner_for, status, OutputConfig};
use crate::core::diagnostics::Diagnostic;
use crate::core::discovery::{
    used_and_not_used_report, DiscoveryContext, DiscoveryEngine, DiscoveryResult,
};
use crate::core::project::Project;
use crate::error::{DiscoveryError, FirmkitError};

/// Options for `firmkit discover`
#[derive(Debug, Clone, Default)]
pub struct DiscoverArgs {
    /// Sketch main file name override
    pub sketch: Option<String>,
    /// Reuse `libraries.cache`
    pub use_cached: bool,
    /// Compilation-database mode
    pub compilation_db: bool,
}

struct Outcome {
    result: Result<DiscoveryResult, DiscoveryError>,
    diagnostics: Vec<Diagnostic>,
    report: Option<String>,
}

/// Execute the discover command
pub async fn execute(project_dir: &Path, args: DiscoverArgs, output: &OutputConfig) -> Result<()> {
    let project = Project::load(project_dir).map_err(FirmkitError::from)?;
    let index = project.library_index().map_err(FirmkitError::from)?;
    let preprocessor = project.preprocessor();

    let mut opts = project.discovery_options(args.sketch.as_deref());
    opts.use_cached_libraries_resolution = args.use_cached;
    opts.only_update_compilation_database = args.compilation_db;

    let cancel = CancellationToken::new();
    let ctx = DiscoveryContext {
        verbose: output.verbose > 0,
        cancel: cancel.clone(),
    };

    tracing::info!(
        "Discovering libraries for {} ({} libraries indexed)",
        opts.main_file.display(),
        index.libraries().len()
    );
    let spinner = spinner_for(output, "Discovering libraries...");

    let task = tokio::task::spawn_blocking(move || {
        let mut engine = DiscoveryEngine::new(ctx, &preprocessor, &index);
        let result = engine.run(&opts);
        Outcome {
            result,
            diagnostics: engine.diagnostics().to_vec(),
            report: used_and_not_used_report(engine.resolution_results()),
        }
    });

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });
    let outcome = task.await.context("Library discovery task failed")?;
    watcher.abort();
    spinner.finish_and_clear();

    match outcome.result {
        Ok(result) => {
            if let Some(report) = &outcome.report {
                if output.verbose > 0 {
                    tracing::info!("{report}");
                }
            }
            print_result(&result, output)?;
            Ok(())
        }
        Err(e) => {
            if let Some(report) = &outcome.report {
                tracing::warn!("{report}");
            }
            if output.json {
                let doc = json!({
                    "error": e.to_string(),
                    "diagnostics": outcome.diagnostics,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
            Err(FirmkitError::from(e).into())
        }
    }
}

fn print_result(result: &DiscoveryResult, output: &OutputConfig) -> Result<()> {
    if output.json {
        let libraries: Vec<_> = result
            .imported_libraries
            .iter()
            .map(|lib| {
                json!({
                    "name": lib.name,
                    "version": lib.version.as_ref().map(|v| v.to_string()),
                    "install_dir": lib.install_dir,
                    "location": lib.location.to_string(),
                })
            })
            .collect();
        let doc = json!({
            "include_folders": result.include_folders,
            "libraries": libraries,
            "from_libraries_cache": result.from_libraries_cache,
            "stats": {
                "preprocessor_runs": result.stats.preprocessor_runs,
                "cache_hits": result.stats.cache_hits,
                "files_scanned": result.stats.files_scanned,
            },
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if !output.show_text() {
        return Ok(());
    }

    println!(
        "{} Discovered {} libraries",
        status::SUCCESS,
        result.imported_libraries.len()
    );
    if result.from_libraries_cache {
        println!("{} Using cached library resolution", status::INFO);
    }
    println!("\nInclude folders:");
    for folder in &result.include_folders {
        println!("  {}", folder.display());
    }
    if !result.imported_libraries.is_empty() {
        println!("\nLibraries:");
        for lib in &result.imported_libraries {
            println!("  {lib} ({})", lib.install_dir.display());
        }
    }
    Ok(())
}
