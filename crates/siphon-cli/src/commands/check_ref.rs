//! Check or resolve a source-group reference

use anyhow::{bail, Context, Result};
use siphon_core::{Project, SourceRef};

/// Run the check-ref command
pub fn run(
    project_path: &str,
    reference: &str,
    source: Option<&str>,
    env: Option<&str>,
) -> Result<()> {
    let project = Project::load(project_path).context("Failed to load project")?;
    let sources = project
        .load_sources()
        .context("Failed to load source-group configuration")?;

    let parsed = match SourceRef::parse(reference) {
        Some(parsed) => parsed,
        None => bail!("'{reference}' is not a valid reference ({{group.sources.*.key}})"),
    };

    match source {
        Some(source_name) => {
            // Resolve for one concrete source, honoring the project's
            // default environment when none is given.
            let env = env.or(project.config.default_env.as_deref());
            let value = parsed.resolve(source_name, env, &sources)?;
            tracing::info!("✓ {} => '{}' for source '{}'", reference, value, source_name);
        }
        None => {
            let errors = parsed.validate_for_all_sources(&sources)?;
            if errors.is_empty() {
                tracing::info!("✓ {} resolves for every source and environment", reference);
            } else {
                for error in &errors {
                    tracing::error!("✗ {}", error);
                }
                bail!("reference fails for {} source/environment combination(s)", errors.len());
            }
        }
    }

    Ok(())
}
