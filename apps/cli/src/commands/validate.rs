//! Model validation command.
//!
//! Builds each model, runs one smoke-test inference and discards it.

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use vecta_core::{EmbeddingService, Settings};

use super::print_json;

#[derive(Debug, Serialize)]
struct ValidationOutput {
    total: usize,
    valid: usize,
    invalid: usize,
    all_valid: bool,
    results: Vec<ValidationResult>,
}

#[derive(Debug, Serialize)]
struct ValidationResult {
    model_id: String,
    valid: bool,
}

/// Execute the validate command.
///
/// Fails if any model is invalid.
pub async fn execute(settings: Settings, model_ids: &[String], json: bool) -> anyhow::Result<()> {
    if model_ids.is_empty() {
        anyhow::bail!("At least one model id is required");
    }

    let service =
        EmbeddingService::from_settings(settings).context("Failed to create embedding service")?;

    if !json {
        println!("{}", "vecta validate".bold().cyan());
        println!();
        println!("  Validating {} model(s)...", model_ids.len());
        println!();
    }

    let mut results = Vec::with_capacity(model_ids.len());
    for model_id in model_ids {
        let valid = service.validate(model_id).await;
        if !json {
            if valid {
                println!("  {} {}", "✓".green(), model_id);
            } else {
                println!("  {} {}", "✗".red(), model_id.red());
            }
        }
        results.push(ValidationResult { model_id: model_id.clone(), valid });
    }
    service.shutdown().await;

    let valid = results.iter().filter(|r| r.valid).count();
    let invalid = results.len() - valid;
    if json {
        print_json(&ValidationOutput {
            total: results.len(),
            valid,
            invalid,
            all_valid: invalid == 0,
            results,
        })?;
    } else {
        println!();
        println!("  {} valid, {} invalid", valid.to_string().green(), invalid.to_string().red());
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} model(s) failed validation");
    }
    Ok(())
}
