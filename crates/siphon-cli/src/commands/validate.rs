//! Validate configuration command

use anyhow::{bail, Context, Result};
use siphon_core::schema::{DirectoryCatalog, SchemaCatalog};
use siphon_core::{Pipeline, Project, ValidationEngine, ValidationResult};
use walkdir::WalkDir;

/// Per-pipeline outcome collected for reporting
struct PipelineOutcome {
    ok: bool,
    items: Vec<ValidationResult>,
    /// Pipeline-level failures with no item to attach to (e.g. a
    /// missing schema snapshot)
    failures: Vec<String>,
}

/// Run the validate command
pub fn run(project_path: &str, pipeline_filter: Option<&str>, json: bool) -> Result<()> {
    tracing::info!("Validating project: {}", project_path);

    let project = Project::load(project_path).context("Failed to load project")?;
    let sources = project
        .load_sources()
        .context("Failed to load source-group configuration")?;
    let pipelines = load_pipelines(&project, pipeline_filter)?;

    if pipelines.is_empty() {
        bail!("no pipelines found to validate");
    }

    let engine = ValidationEngine::new(&sources, None);
    let mut catalog = DirectoryCatalog::new(project.schemas_dir());
    let mut reports = Vec::new();
    let mut failed = 0usize;

    for pipeline in &pipelines {
        let outcome = validate_pipeline(&engine, &mut catalog, pipeline);
        if outcome.ok {
            tracing::info!("✓ Pipeline '{}' is valid", pipeline.name);
        } else {
            failed += 1;
        }
        reports.push(serde_json::json!({
            "pipeline": pipeline.name,
            "valid": outcome.ok,
            "failures": outcome.failures,
            "items": outcome.items,
        }));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failed > 0 {
        bail!(
            "validation failed for {failed} of {} pipeline(s)",
            pipelines.len()
        );
    }
    tracing::info!("✓ All {} pipeline(s) valid", pipelines.len());
    Ok(())
}

/// Discover pipeline files recursively under `pipelines/`, in sorted
/// order, so group subdirectories work.
fn load_pipelines(project: &Project, filter: Option<&str>) -> Result<Vec<Pipeline>> {
    let dir = project.base_path.join("pipelines");
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut pipelines = Vec::new();
    for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.context("Failed to walk pipelines directory")?;
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        let contents = std::fs::read_to_string(entry.path())?;
        let pipeline: Pipeline = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", entry.path().display()))?;
        if filter.map_or(true, |name| name == pipeline.name) {
            pipelines.push(pipeline);
        }
    }
    Ok(pipelines)
}

fn validate_pipeline(
    engine: &ValidationEngine<'_>,
    catalog: &mut DirectoryCatalog,
    pipeline: &Pipeline,
) -> PipelineOutcome {
    let mut outcome = PipelineOutcome {
        ok: true,
        items: Vec::new(),
        failures: Vec::new(),
    };

    let schema = match catalog.get(&pipeline.source_table) {
        Ok(schema) => schema,
        Err(err) => {
            // Cannot validate anything for this table without a schema.
            fail(&mut outcome, &pipeline.name, err.to_string());
            return outcome;
        }
    };

    let report = engine.validate_chain(&schema, &pipeline.transforms);
    for item in report.items {
        record(&mut outcome, &pipeline.name, item);
    }

    for column in &pipeline.columns {
        let result = engine.validate_template(&schema, column);
        record(&mut outcome, &pipeline.name, result);
    }

    if !pipeline.mappings.is_empty() {
        match pipeline.sink_table.as_deref() {
            Some(sink_table) => match catalog.get(sink_table) {
                Ok(sink) => {
                    let result = engine.validate_mappings(&sink, &schema, &pipeline.mappings);
                    record(&mut outcome, &pipeline.name, result);
                }
                Err(err) => fail(&mut outcome, &pipeline.name, err.to_string()),
            },
            None => fail(
                &mut outcome,
                &pipeline.name,
                "mappings declared without a sink_table".to_string(),
            ),
        }
    }

    outcome
}

fn record(outcome: &mut PipelineOutcome, pipeline_name: &str, result: ValidationResult) {
    for error in &result.errors {
        tracing::error!("✗ Pipeline '{}': {}", pipeline_name, error);
    }
    for warning in &result.warnings {
        tracing::warn!("Pipeline '{}': {}", pipeline_name, warning);
    }
    if !result.is_valid {
        outcome.ok = false;
    }
    outcome.items.push(result);
}

fn fail(outcome: &mut PipelineOutcome, pipeline_name: &str, message: String) {
    tracing::error!("✗ Pipeline '{}': {}", pipeline_name, message);
    outcome.failures.push(message);
    outcome.ok = false;
}
