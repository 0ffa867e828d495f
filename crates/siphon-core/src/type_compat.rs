//! Cross-dialect column type compatibility
//!
//! Source and sink tables live in different databases, so declared types
//! rarely match textually. Types are normalized (lowercased, trailing
//! parameter stripped) and judged by family membership: two types in the
//! same family may replicate into each other. A text-family sink
//! additionally accepts any source type, since text can hold a
//! serialized form of anything; the reverse does not hold.

/// Type families considered mutually compatible.
const FAMILIES: &[&[&str]] = &[
    TEXT_FAMILY,
    &[
        "int", "integer", "bigint", "smallint", "tinyint", "int2", "int4", "int8", "serial",
        "bigserial",
    ],
    &[
        "float", "float4", "float8", "real", "double", "double precision", "numeric", "decimal",
    ],
    &["boolean", "bool", "bit"],
    &["uuid", "uniqueidentifier"],
    &[
        "timestamp", "timestamp without time zone", "datetime", "datetime2", "smalldatetime",
    ],
    &["timestamptz", "timestamp with time zone", "datetimeoffset"],
    &["date"],
    &["time", "time without time zone"],
    &["json", "jsonb"],
    &["binary", "varbinary", "bytea", "blob"],
];

const TEXT_FAMILY: &[&str] = &[
    "text", "varchar", "nvarchar", "char", "nchar", "character varying", "string",
];

/// Lowercase a declared type and strip a trailing parenthesized
/// parameter: `VARCHAR(100)` becomes `varchar`.
pub fn normalize_type(declared: &str) -> String {
    let lowered = declared.trim().to_lowercase();
    if lowered.ends_with(')') {
        if let Some(open) = lowered.rfind('(') {
            return lowered[..open].trim_end().to_string();
        }
    }
    lowered
}

/// Whether a sink column of `sink_type` may receive values of
/// `source_type`.
pub fn compatible(sink_type: &str, source_type: &str) -> bool {
    let sink = normalize_type(sink_type);
    let source = normalize_type(source_type);

    if sink == source {
        return true;
    }
    // Text sinks accept anything; one-directional.
    if TEXT_FAMILY.contains(&sink.as_str()) {
        return true;
    }
    FAMILIES
        .iter()
        .any(|family| family.contains(&sink.as_str()) && family.contains(&source.as_str()))
}

/// Check one sink/source column pairing, returning a warning message on
/// a family mismatch.
pub fn validate_column_mapping_types(
    sink_column: &str,
    sink_type: &str,
    source_column: &str,
    source_type: &str,
) -> Option<String> {
    if compatible(sink_type, source_type) {
        return None;
    }
    Some(format!(
        "type mismatch: sink column '{}' ({}) cannot safely receive source column '{}' ({})",
        sink_column, sink_type, source_column, source_type
    ))
}
