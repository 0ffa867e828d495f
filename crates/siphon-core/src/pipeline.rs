//! Pipeline definitions
//!
//! A pipeline replicates one source table into a sink table through an
//! ordered chain of transforms. Pipeline definitions are parsed here;
//! validation lives in [`crate::validate`].
//!
//! # Example
//!
//! ```yaml
//! name: directory_users
//! source_table: users
//! sink_table: dim_users
//! transforms:
//!   - name: normalize_name
//!     value: root._norm = this.name.lowercase()
//!   - name: keep_active
//!     value: root = if this.active { this } else { deleted() }
//! columns:
//!   - name: customer_id
//!     value: "{asma.sources.*.customer_id}"
//! ```

use serde::{Deserialize, Serialize};

use crate::source_ref::SourceRef;

/// How a template or transform value string should be interpreted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// A mapping-language expression
    Expression,

    /// A `{group.sources.*.key}` placeholder
    SourceRef,

    /// A raw SQL default expression
    Sql,
}

impl ValueSource {
    /// Infer the value source for an untagged value: anything matching
    /// the reference grammar is a source ref, everything else an
    /// expression. `sql` is never inferred; it must be tagged.
    pub fn infer(value: &str) -> ValueSource {
        if SourceRef::is_reference(value) {
            ValueSource::SourceRef
        } else {
            ValueSource::Expression
        }
    }
}

/// A named, reusable definition adding one derived column to a sink
/// table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnTemplateDef {
    /// Column name produced by this template
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Value expression, reference, or SQL default
    pub value: String,

    /// Explicit value-source tag; inferred from the value when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
}

/// An ordered pipeline step that reads and may produce columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDef {
    /// Transform name (unique within the pipeline)
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Value expression, reference, or SQL default
    pub value: String,

    /// Explicit value-source tag; inferred from the value when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
}

/// A sink-column to source-column pairing checked for type
/// compatibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column in the sink table
    pub sink_column: String,

    /// Column in the source table
    pub source_column: String,
}

/// A pipeline definition from `pipelines/*.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (must be unique within project)
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source table whose schema snapshot anchors validation
    pub source_table: String,

    /// Sink table, when column mappings are declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_table: Option<String>,

    /// Ordered transform chain
    #[serde(default)]
    pub transforms: Vec<TransformDef>,

    /// Derived column templates
    #[serde(default)]
    pub columns: Vec<ColumnTemplateDef>,

    /// Sink/source column pairings to type-check
    #[serde(default)]
    pub mappings: Vec<ColumnMapping>,
}

/// Common view of the two validatable item kinds
pub trait PipelineItem {
    /// Item key used in reports and error prefixes
    fn key(&self) -> &str;

    /// The stored default value
    fn value(&self) -> &str;

    /// Explicit value-source tag, if any
    fn value_source(&self) -> Option<ValueSource>;
}

impl PipelineItem for ColumnTemplateDef {
    fn key(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn value_source(&self) -> Option<ValueSource> {
        self.value_source
    }
}

impl PipelineItem for TransformDef {
    fn key(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn value_source(&self) -> Option<ValueSource> {
        self.value_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
name: directory_users
source_table: users
"#;
        let pipeline: Pipeline = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pipeline.name, "directory_users");
        assert_eq!(pipeline.source_table, "users");
        assert!(pipeline.transforms.is_empty());
        assert!(pipeline.columns.is_empty());
    }

    #[test]
    fn test_parse_full_pipeline() {
        let yaml = r#"
name: directory_users
description: "Replicates directory users"
source_table: users
sink_table: dim_users
transforms:
  - name: normalize
    value: root._norm = this.name.lowercase()
columns:
  - name: customer_id
    value: "{asma.sources.*.customer_id}"
  - name: loaded_by
    value: "current_user"
    value_source: sql
mappings:
  - sink_column: age
    source_column: age
"#;
        let pipeline: Pipeline = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pipeline.transforms.len(), 1);
        assert_eq!(pipeline.columns.len(), 2);
        assert_eq!(pipeline.columns[1].value_source, Some(ValueSource::Sql));
        assert_eq!(pipeline.mappings.len(), 1);
    }

    #[test]
    fn test_infer_source_ref() {
        assert_eq!(
            ValueSource::infer("{asma.sources.*.customer_id}"),
            ValueSource::SourceRef
        );
    }

    #[test]
    fn test_infer_expression() {
        assert_eq!(ValueSource::infer("this.name"), ValueSource::Expression);
        // sql is never inferred
        assert_eq!(ValueSource::infer("current_user"), ValueSource::Expression);
    }

    #[test]
    fn test_value_source_tag_round_trip() {
        let tag: ValueSource = serde_yaml::from_str("source_ref").unwrap();
        assert_eq!(tag, ValueSource::SourceRef);
        let tag: ValueSource = serde_yaml::from_str("expression").unwrap();
        assert_eq!(tag, ValueSource::Expression);
    }

    #[test]
    fn test_parse_missing_required_fields() {
        let yaml = "description: no name or source table\n";
        let parsed: Result<Pipeline, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }
}
