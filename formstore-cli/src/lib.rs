//! # Formstore CLI
//!
//! Loads a JSON schema document and a JSON record, builds the store tree
//! and a form over it, and reports the form validation state.
//!
//! ```text
//! formstore --schema schema.json --entity Person --data ada.json --edit
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use formstore_core::{build_node, make_form_node, ErrorMap, FormNodeOptions, SchemaRegistry};
use serde::Serialize;
use serde_json::Value;

/// Command-line arguments for formstore.
#[derive(Debug, Clone, Parser)]
#[command(name = "formstore")]
#[command(about = "Validate a JSON record against a formstore schema")]
#[command(version)]
pub struct CliArgs {
    /// Path to the JSON schema document
    #[arg(long, env = "FORMSTORE_SCHEMA")]
    pub schema: PathBuf,

    /// Entity to instantiate
    #[arg(long)]
    pub entity: String,

    /// Path to the JSON record (empty record if omitted)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Build the form in edit mode, so that validation errors are reported
    #[arg(long, env = "FORMSTORE_EDIT")]
    pub edit: bool,

    /// Pretty-print the report
    #[arg(long)]
    pub pretty: bool,
}

/// Validation report printed by the binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Whether the form has no invalid field.
    pub valid: bool,
    /// Errors of the invalid fields.
    pub errors: ErrorMap,
    /// Form values after loading the record.
    pub values: Value,
}

/// Build a form for `entity` over `record` and report its state.
///
/// # Errors
///
/// Returns an error if the schema does not load, the entity is unknown or
/// the record does not match the entity shape.
pub fn evaluate(schema: &str, entity: &str, record: &Value, edit: bool) -> Result<Report> {
    let registry = SchemaRegistry::from_json(schema).context("invalid schema document")?;
    let entity = registry.entity(entity).with_context(|| {
        let known: Vec<_> = registry.entity_names().collect();
        format!("unknown entity '{entity}' (known: {})", known.join(", "))
    })?;

    let node = build_node(entity);
    node.set(record).context("record does not match the entity")?;

    let form = make_form_node(
        &node,
        FormNodeOptions {
            is_edit: edit,
            is_empty: false,
        },
    )?;
    let report = Report {
        valid: form.is_valid(),
        errors: form.errors(),
        values: form.to_flat_values(),
    };
    form.dispose();

    tracing::info!(entity = %entity.name(), valid = report.valid, errors = report.errors.len(), "record evaluated");
    Ok(report)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Run the command described by `args`.
///
/// # Errors
///
/// Returns an error if a file cannot be read or parsed, or if
/// [`evaluate`] fails.
pub fn run(args: &CliArgs) -> Result<Report> {
    let schema = read(&args.schema)?;
    let record = match &args.data {
        Some(path) => serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        None => Value::Object(serde_json::Map::new()),
    };
    tracing::debug!(schema = %args.schema.display(), entity = %args.entity, edit = args.edit, "running");
    evaluate(&schema, &args.entity, &record, args.edit)
}

/// Render a report as JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render(report: &Report, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    Ok(json)
}
