//! CLI command for `firmkit cache`
//!
//! Shows and deletes the discovery caches of the project build folder.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{status, OutputConfig};
use crate::core::include_cache::IncludeCache;
use crate::core::project::Project;
use crate::error::FirmkitError;
use crate::infra::filesystem;

/// Execute cache info subcommand
pub async fn execute_info(project_dir: &Path, output: &OutputConfig) -> Result<()> {
    let project = Project::load(project_dir).map_err(FirmkitError::from)?;
    let opts = project.discovery_options(None);

    let includes_path = opts.includes_cache_path();
    let libraries_path = opts.libraries_cache_path();
    let includes = includes_path
        .is_file()
        .then(|| IncludeCache::load(&includes_path));

    if output.json {
        let doc = json!({
            "includes_cache": {
                "path": includes_path,
                "exists": includes.is_some(),
                "readable": includes.as_ref().is_some_and(|c| c.is_valid()),
                "entries": includes.as_ref().map_or(0, |c| c.entries().len()),
            },
            "libraries_cache": {
                "path": libraries_path,
                "exists": libraries_path.is_file(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if output.quiet {
        return Ok(());
    }

    println!("Include cache: {}", includes_path.display());
    match &includes {
        Some(cache) if cache.is_valid() => println!("  Entries: {}", cache.entries().len()),
        Some(_) => println!("  {} Unreadable, will be rebuilt", status::WARNING),
        None => println!("  {} Not present", status::INFO),
    }
    println!("Library resolution cache: {}", libraries_path.display());
    if !libraries_path.is_file() {
        println!("  {} Not present", status::INFO);
    }
    Ok(())
}

/// Execute cache clean subcommand
pub async fn execute_clean(project_dir: &Path, output: &OutputConfig) -> Result<()> {
    let project = Project::load(project_dir).map_err(FirmkitError::from)?;
    let opts = project.discovery_options(None);

    let mut removed = 0;
    for path in [opts.includes_cache_path(), opts.libraries_cache_path()] {
        if path.is_file() {
            removed += 1;
        }
        filesystem::remove_file(&path).map_err(FirmkitError::from)?;
    }
    tracing::debug!("Removed {removed} cache files");

    if output.json {
        println!("{}", json!({ "removed": removed }));
    } else if !output.quiet {
        if removed > 0 {
            println!("{} Discovery cache cleared", status::SUCCESS);
        } else {
            println!("{} Discovery cache was already empty", status::SUCCESS);
        }
    }
    Ok(())
}
