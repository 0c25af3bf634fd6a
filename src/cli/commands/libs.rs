//! CLI command for `firmkit libs`
//!
//! Lists the libraries visible to the project, or the candidates for one
//! header ranked the way discovery would rank them.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{status, OutputConfig};
use crate::core::project::Project;
use crate::core::resolver::{compute_priority, LibraryResolver};
use crate::error::FirmkitError;

/// Execute the libs command
pub async fn execute(project_dir: &Path, header: Option<&str>, output: &OutputConfig) -> Result<()> {
    let project = Project::load(project_dir).map_err(FirmkitError::from)?;
    let index = project.library_index().map_err(FirmkitError::from)?;
    let arch = project.config.build.arch.as_str();

    let Some(header) = header else {
        if output.json {
            let libs: Vec<_> = index
                .libraries()
                .iter()
                .map(|lib| {
                    json!({
                        "name": lib.name,
                        "version": lib.version.as_ref().map(|v| v.to_string()),
                        "location": lib.location.to_string(),
                        "install_dir": lib.install_dir,
                        "compatible": lib.is_compatible_with(arch),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&libs)?);
        } else if !output.quiet {
            if index.libraries().is_empty() {
                println!("{} No libraries found", status::INFO);
            }
            for lib in index.libraries() {
                println!(
                    "{:<30} {:<20} {}",
                    lib.to_string(),
                    lib.location.to_string(),
                    lib.install_dir.display()
                );
            }
        }
        return Ok(());
    };

    let mut ranked: Vec<_> = index
        .alternatives_for(header)
        .into_iter()
        .map(|lib| (compute_priority(&lib, header, arch), lib))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    let selected = index.resolve_for(header, arch);

    if output.json {
        let candidates: Vec<_> = ranked
            .iter()
            .map(|(priority, lib)| {
                json!({
                    "name": lib.name,
                    "priority": priority,
                    "install_dir": lib.install_dir,
                    "selected": selected.as_ref() == Some(lib),
                })
            })
            .collect();
        let doc = json!({ "header": header, "candidates": candidates });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else if !output.quiet {
        if ranked.is_empty() {
            println!("{} No library provides {header}", status::WARNING);
        }
        for (priority, lib) in &ranked {
            let mark = if selected.as_ref() == Some(lib) { status::SUCCESS } else { " " };
            println!(
                "{mark} {:<30} {priority:>6} {}",
                lib.to_string(),
                lib.install_dir.display()
            );
        }
    }
    Ok(())
}
