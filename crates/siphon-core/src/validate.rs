//! Pipeline validation engine
//!
//! Ties the expression analyzer, reference resolver, and type lattice
//! together. Single items are checked against a column universe; a
//! transform chain is checked with a forward dataflow pass in which
//! columns produced by earlier transforms become readable by later
//! ones.
//!
//! The engine never returns `Err` from a validation call. Every failure
//! is accumulated into the per-item result so one invocation yields one
//! complete report; resolver-level lookup failures are converted to
//! error strings at their single call site.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::pipeline::{ColumnMapping, ColumnTemplateDef, PipelineItem, TransformDef, ValueSource};
use crate::schema::TableSchema;
use crate::source_ref::{ConfigNode, SourceRef};
use crate::{expr, type_compat};

/// Characters permitted in raw SQL default values: identifiers,
/// function calls, casts, and simple arithmetic.
const SQL_ALLOWED_PUNCT: &str = "()',.\"_-+*/:=<> ";

/// Optional full-grammar checker for mapping expressions.
///
/// The engine itself only extracts references. When a linter is
/// supplied, its syntax errors are surfaced under the item key; when it
/// is absent, expressions are assumed syntactically valid.
pub trait ExpressionLinter {
    /// Return a syntax error description, or `None` if the expression
    /// parses.
    fn lint(&self, expression: &str) -> Option<String>;
}

/// Outcome of validating one template or transform item
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    /// Key of the item this result describes
    pub item_key: String,

    /// `true` iff `errors` is empty; warnings never affect validity
    pub is_valid: bool,

    /// Accumulated errors, in discovery order
    pub errors: Vec<String>,

    /// Accumulated warnings, in discovery order
    pub warnings: Vec<String>,

    /// Columns the item's expression reads
    pub referenced_columns: BTreeSet<String>,

    /// Environment variables the item's expression reads
    pub env_vars: BTreeSet<String>,

    /// Columns the item declares as outputs
    pub produced_columns: BTreeSet<String>,
}

impl ValidationResult {
    fn new(item_key: &str) -> Self {
        Self {
            item_key: item_key.to_string(),
            is_valid: true,
            ..Default::default()
        }
    }

    fn push_error(&mut self, message: String) {
        self.errors.push(message);
        self.is_valid = false;
    }
}

/// Aggregate outcome of validating an ordered transform chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainReport {
    /// Per-item results, in chain order
    pub items: Vec<ValidationResult>,

    /// `true` iff every item's result is valid
    pub is_valid: bool,

    /// Columns available after the whole chain: schema columns plus
    /// every item's declared outputs
    pub available_columns: BTreeSet<String>,
}

/// Validates templates, transform chains, and column mappings against a
/// table schema and a source-group configuration tree.
pub struct ValidationEngine<'a> {
    sources: &'a ConfigNode,
    linter: Option<&'a dyn ExpressionLinter>,
}

impl<'a> ValidationEngine<'a> {
    /// Create an engine over a source-group tree, with an optional
    /// expression linter.
    pub fn new(sources: &'a ConfigNode, linter: Option<&'a dyn ExpressionLinter>) -> Self {
        Self { sources, linter }
    }

    /// Validate a single item against a column universe.
    ///
    /// `available` is the set of columns the item may reference; for a
    /// standalone template this is the schema's columns, during chain
    /// validation it is the runtime-available set. A caller-supplied
    /// `override_value` replaces the item's stored default.
    pub fn validate_item<I: PipelineItem>(
        &self,
        item: &I,
        available: &BTreeSet<String>,
        override_value: Option<&str>,
    ) -> ValidationResult {
        let mut result = ValidationResult::new(item.key());
        let value = override_value.unwrap_or_else(|| item.value());
        let value_source = item
            .value_source()
            .unwrap_or_else(|| ValueSource::infer(value));

        tracing::debug!(item = item.key(), ?value_source, "validating item");

        match value_source {
            ValueSource::SourceRef => self.check_source_ref(&mut result, value),
            ValueSource::Sql => check_sql_value(&mut result, value),
            ValueSource::Expression => self.check_expression(&mut result, value, available),
        }

        result
    }

    /// Validate a column template against the schema's own columns.
    ///
    /// The template's column name is recorded as produced output in
    /// addition to anything its expression assigns.
    pub fn validate_template(
        &self,
        schema: &TableSchema,
        template: &ColumnTemplateDef,
    ) -> ValidationResult {
        let mut result = self.validate_item(template, &schema.column_names(), None);
        result.produced_columns.insert(template.name.clone());
        result
    }

    /// Validate an ordered transform chain with a forward dataflow
    /// pass.
    ///
    /// The available-column set starts as the schema's columns and
    /// grows with each item's declared outputs; it never shrinks, and
    /// outputs are added whether or not the item validated, so one run
    /// reports every real error without cascading misses. Items are
    /// checked strictly in list order: a transform may read columns
    /// produced by any earlier transform, never a later one.
    pub fn validate_chain(&self, schema: &TableSchema, items: &[TransformDef]) -> ChainReport {
        let mut available = schema.column_names();
        let mut report = ChainReport {
            is_valid: true,
            ..Default::default()
        };

        for item in items {
            let result = self.validate_item(item, &available, None);
            if !result.is_valid {
                report.is_valid = false;
            }
            available.extend(result.produced_columns.iter().cloned());
            report.items.push(result);
        }

        report.available_columns = available;
        report
    }

    /// Type-check declared sink/source column pairings.
    ///
    /// Missing columns are errors; family mismatches are warnings (the
    /// replication may still be intended, e.g. through a cast).
    pub fn validate_mappings(
        &self,
        sink: &TableSchema,
        source: &TableSchema,
        mappings: &[ColumnMapping],
    ) -> ValidationResult {
        let mut result = ValidationResult::new("mappings");

        for mapping in mappings {
            let sink_type = match sink.column_type(&mapping.sink_column) {
                Some(t) => t,
                None => {
                    result.push_error(format!(
                        "sink table '{}' has no column '{}' (available columns: {})",
                        sink.table_name,
                        mapping.sink_column,
                        join_columns(&sink.column_names())
                    ));
                    continue;
                }
            };
            let source_type = match source.column_type(&mapping.source_column) {
                Some(t) => t,
                None => {
                    result.push_error(format!(
                        "source table '{}' has no column '{}' (available columns: {})",
                        source.table_name,
                        mapping.source_column,
                        join_columns(&source.column_names())
                    ));
                    continue;
                }
            };

            if let Some(warning) = type_compat::validate_column_mapping_types(
                &mapping.sink_column,
                sink_type,
                &mapping.source_column,
                source_type,
            ) {
                result.warnings.push(warning);
            }
        }

        result
    }

    /// Source-ref values are validated for every source in the group;
    /// column checks do not apply.
    fn check_source_ref(&self, result: &mut ValidationResult, value: &str) {
        let reference = match SourceRef::parse(value) {
            Some(r) => r,
            None => {
                result.push_error(format!(
                    "{}: '{}' is not a valid source reference ({{group.sources.*.key}})",
                    result.item_key, value
                ));
                return;
            }
        };

        match reference.validate_for_all_sources(self.sources) {
            Ok(errors) => {
                for error in errors {
                    result.push_error(format!("{}: {}", result.item_key, error));
                }
            }
            // The one point where resolver lookup failures become
            // accumulated errors.
            Err(err) => result.push_error(format!("{}: {}", result.item_key, err)),
        }
    }

    fn check_expression(
        &self,
        result: &mut ValidationResult,
        value: &str,
        available: &BTreeSet<String>,
    ) {
        if let Some(linter) = self.linter {
            if let Some(syntax_error) = linter.lint(value) {
                result.push_error(format!("{}: {}", result.item_key, syntax_error));
            }
        }

        let analysis = expr::analyze(value);
        result.env_vars = analysis.env_vars;
        result.produced_columns = analysis.produced_columns;

        // Static expressions read no columns; nothing to check against
        // the schema.
        if analysis.referenced_columns.is_empty() {
            return;
        }

        for column in &analysis.referenced_columns {
            if !available.contains(column) {
                result.push_error(format!(
                    "{}: references unknown column '{}' (available columns: {})",
                    result.item_key,
                    column,
                    join_columns(available)
                ));
            }
        }
        result.referenced_columns = analysis.referenced_columns;
    }
}

/// SQL values are raw default expressions; mapping-language tokens and
/// reference braces do not belong in them.
fn check_sql_value(result: &mut ValidationResult, value: &str) {
    for token in ["this.", "meta("] {
        if value.contains(token) {
            result.push_error(format!(
                "{}: sql value contains mapping-language token '{}'",
                result.item_key, token
            ));
        }
    }
    if value.contains('{') || value.contains('}') {
        result.push_error(format!(
            "{}: sql value contains reference syntax braces",
            result.item_key
        ));
    }

    if let Some(bad) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !SQL_ALLOWED_PUNCT.contains(*c))
    {
        result.push_error(format!(
            "{}: sql value contains disallowed character '{}'",
            result.item_key, bad
        ));
    }
}

fn join_columns(columns: &BTreeSet<String>) -> String {
    if columns.is_empty() {
        return "none".to_string();
    }
    columns.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(columns: &[(&str, &str)]) -> TableSchema {
        TableSchema {
            table_name: "users".to_string(),
            schema_name: "public".to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
        }
    }

    fn sources() -> ConfigNode {
        serde_yaml::from_str(
            r#"
asma:
  sources:
    directory:
      customer_id: "3"
      dev:
        database: asma_dev
      prod:
        database: asma_prod
"#,
        )
        .unwrap()
    }

    fn transform(name: &str, value: &str) -> TransformDef {
        TransformDef {
            name: name.to_string(),
            description: None,
            value: value.to_string(),
            value_source: None,
        }
    }

    fn template(name: &str, value: &str, value_source: Option<ValueSource>) -> ColumnTemplateDef {
        ColumnTemplateDef {
            name: name.to_string(),
            description: None,
            value: value.to_string(),
            value_source,
        }
    }

    #[test]
    fn test_expression_item_valid_reference() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("customer_id", "uuid")]);

        let result = engine.validate_template(&schema, &template("copy", "this.customer_id", None));
        assert!(result.is_valid);
        assert!(result.referenced_columns.contains("customer_id"));
    }

    #[test]
    fn test_expression_item_missing_column() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("customer_id", "uuid"), ("name", "text")]);

        let result = engine.validate_template(&schema, &template("bad", "this.user.name", None));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        // Only the first path segment is the column.
        assert!(result.errors[0].contains("'user'"));
        assert!(result.errors[0].contains("customer_id, name"));
    }

    #[test]
    fn test_static_expression_skips_column_checks() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        let result = engine.validate_template(
            &schema,
            &template("region", r#"meta("region") + "${REGION}""#, None),
        );
        assert!(result.is_valid);
        assert!(result.env_vars.contains("REGION"));
    }

    #[test]
    fn test_source_ref_item_valid_for_all_sources() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        let result = engine.validate_template(
            &schema,
            &template("customer_id", "{asma.sources.*.customer_id}", None),
        );
        assert!(result.is_valid, "unexpected: {:?}", result.errors);
    }

    #[test]
    fn test_source_ref_item_partial_environment_coverage() {
        let config: ConfigNode = serde_yaml::from_str(
            r#"
asma:
  sources:
    directory:
      dev:
        database: asma_dev
      prod:
        host: db.prod
"#,
        )
        .unwrap();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        let result = engine.validate_template(
            &schema,
            &template("database", "{asma.sources.*.database}", None),
        );
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("database:"));
        assert!(result.errors[0].contains("prod"));
    }

    #[test]
    fn test_source_ref_item_missing_group_is_one_error() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        let result = engine.validate_template(
            &schema,
            &template("database", "{ledger.sources.*.database}", None),
        );
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("ledger"));
        assert!(result.errors[0].contains("asma"));
    }

    #[test]
    fn test_source_ref_tag_with_bad_grammar() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        let result = engine.validate_template(
            &schema,
            &template("bad", "not a reference", Some(ValueSource::SourceRef)),
        );
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("not a valid source reference"));
    }

    #[test]
    fn test_sql_value_accepts_plain_sql() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[]);

        for value in ["current_timestamp", "now()", "'fixed'::text", "coalesce(1, 2)"] {
            let result = engine.validate_template(
                &schema,
                &template("dflt", value, Some(ValueSource::Sql)),
            );
            assert!(result.is_valid, "rejected '{value}': {:?}", result.errors);
        }
    }

    #[test]
    fn test_sql_value_rejects_mapping_tokens() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("a", "text")]);

        let result = engine.validate_template(
            &schema,
            &template("dflt", "this.a", Some(ValueSource::Sql)),
        );
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("this."));

        let result = engine.validate_template(
            &schema,
            &template("dflt", "{asma.sources.*.customer_id}", Some(ValueSource::Sql)),
        );
        assert!(!result.is_valid);

        let result = engine.validate_template(
            &schema,
            &template("dflt", "drop table; --", Some(ValueSource::Sql)),
        );
        assert!(!result.is_valid);
    }

    #[test]
    fn test_override_value_replaces_default() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        let item = template("n", "this.missing", None);
        let result = engine.validate_item(&item, &schema.column_names(), Some("this.name"));
        assert!(result.is_valid);
    }

    #[test]
    fn test_chain_forward_dataflow() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        let produce = transform("a", "root._norm = this.name.lowercase()");
        let consume = transform("b", "this._norm.length()");

        let report = engine.validate_chain(&schema, &[produce.clone(), consume.clone()]);
        assert!(report.is_valid);
        assert!(report.available_columns.contains("_norm"));

        // Reversed order must fail: outputs never flow backwards.
        let report = engine.validate_chain(&schema, &[consume, produce]);
        assert!(!report.is_valid);
        assert!(!report.items[0].is_valid);
        assert!(report.items[0].errors[0].contains("'_norm'"));
        assert!(report.items[1].is_valid);
    }

    #[test]
    fn test_chain_sees_outputs_of_every_earlier_item() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        let report = engine.validate_chain(
            &schema,
            &[
                transform("a", "root._x = this.name"),
                transform("b", "root._y = 1"),
                transform("c", "this._x + this._y"),
            ],
        );
        assert!(report.is_valid);
    }

    #[test]
    fn test_chain_does_not_short_circuit() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        let report = engine.validate_chain(
            &schema,
            &[
                transform("a", "this.ghost"),
                transform("b", "root._ok = this.name"),
                transform("c", "this.phantom"),
            ],
        );
        assert!(!report.is_valid);
        assert_eq!(report.items.len(), 3);
        assert!(!report.items[0].is_valid);
        assert!(report.items[1].is_valid);
        assert!(!report.items[2].is_valid);
    }

    #[test]
    fn test_chain_outputs_counted_even_for_invalid_items() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        // Item a is invalid but still declares _x; item b may read it.
        let report = engine.validate_chain(
            &schema,
            &[
                transform("a", "root._x = this.ghost"),
                transform("b", "this._x"),
            ],
        );
        assert!(!report.items[0].is_valid);
        assert!(report.items[1].is_valid);
    }

    #[test]
    fn test_chain_empty_is_valid() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let schema = schema(&[("name", "text")]);

        let report = engine.validate_chain(&schema, &[]);
        assert!(report.is_valid);
        assert_eq!(report.available_columns, schema.column_names());
    }

    #[test]
    fn test_mapping_type_mismatch_is_warning() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let sink = schema(&[("age", "boolean")]);
        let source = schema(&[("age", "integer")]);

        let result = engine.validate_mappings(
            &sink,
            &source,
            &[ColumnMapping {
                sink_column: "age".to_string(),
                source_column: "age".to_string(),
            }],
        );
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("type mismatch"));
        assert!(result.warnings[0].contains("boolean"));
        assert!(result.warnings[0].contains("integer"));
    }

    #[test]
    fn test_mapping_missing_column_is_error() {
        let config = sources();
        let engine = ValidationEngine::new(&config, None);
        let sink = schema(&[("age", "integer")]);
        let source = schema(&[("years", "integer")]);

        let result = engine.validate_mappings(
            &sink,
            &source,
            &[ColumnMapping {
                sink_column: "age".to_string(),
                source_column: "age".to_string(),
            }],
        );
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("years"));
    }

    struct RejectAll;

    impl ExpressionLinter for RejectAll {
        fn lint(&self, _expression: &str) -> Option<String> {
            Some("syntax error at line 1".to_string())
        }
    }

    #[test]
    fn test_linter_errors_surface_under_item_key() {
        let config = sources();
        let linter = RejectAll;
        let engine = ValidationEngine::new(&config, Some(&linter));
        let schema = schema(&[("name", "text")]);

        let result = engine.validate_template(&schema, &template("n", "this.name", None));
        assert!(!result.is_valid);
        assert!(result.errors[0].starts_with("n: syntax error"));
    }
}
