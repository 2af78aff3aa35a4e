//! Monitor schema: which columns are fetched, how they are labelled, and
//! which of them are list-fields.
//!
//! The schema is data, not code. The built-in [`MonitorSchema::reference`]
//! describes the pharmacy score view; deployments can load their own from a
//! JSON document with [`MonitorSchema::from_json`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::snapshot::{FieldValue, RecordSnapshot};

/// Default message header.
pub const DEFAULT_HEADER: &str = "PATIENT CLINICAL UPDATE";

/// Default label for the record identifier line.
pub const DEFAULT_ID_LABEL: &str = "Record";

/// Maximum length accepted for a SQL identifier.
const MAX_IDENTIFIER_LEN: usize = 128;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// How a column is read from the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Decimal,
}

impl FieldKind {
    /// SQL type the column is cast to before decoding.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "BIGINT",
            Self::Decimal => "DOUBLE PRECISION",
        }
    }
}

// ---------------------------------------------------------------------------
// FieldSpec / ListGroup
// ---------------------------------------------------------------------------

/// A scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key in the record snapshot and the persisted document.
    pub key: String,
    /// Source column name.
    pub column: String,
    /// Human label used in messages.
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Appended after the value when rendered, e.g. `"years"`.
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl FieldSpec {
    pub fn new(
        key: impl Into<String>,
        column: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            column: column.into(),
            label: label.into(),
            kind: FieldKind::Text,
            suffix: None,
            icon: None,
        }
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// A tracked list-field group, e.g. the medication list and its count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListGroup {
    /// Key of the delimited items field.
    pub key: String,
    /// Source column holding the delimited items.
    pub column: String,
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Optional companion count column reported by the source.
    #[serde(default)]
    pub count: Option<FieldSpec>,
}

impl ListGroup {
    pub fn new(
        key: impl Into<String>,
        column: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            column: column.into(),
            label: label.into(),
            icon: None,
            count: None,
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Attach a count column; its kind is forced to [`FieldKind::Integer`].
    pub fn count(mut self, key: impl Into<String>, column: impl Into<String>) -> Self {
        let label = format!("{} count", self.label);
        self.count = Some(FieldSpec::new(key, column, label).kind(FieldKind::Integer));
        self
    }
}

/// A fetched column in query order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub kind: FieldKind,
}

// ---------------------------------------------------------------------------
// MonitorSchema
// ---------------------------------------------------------------------------

fn default_header() -> String {
    DEFAULT_HEADER.to_string()
}

fn default_id_label() -> String {
    DEFAULT_ID_LABEL.to_string()
}

/// Full description of the monitored view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSchema {
    /// Table or view queried each cycle (optionally schema-qualified).
    pub source: String,
    /// Column holding the record identifier.
    pub id_column: String,
    #[serde(default = "default_id_label")]
    pub id_label: String,
    #[serde(default = "default_header")]
    pub header: String,
    /// Descriptive fields, rendered first in this order.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Headline score.
    pub score: FieldSpec,
    #[serde(default)]
    pub groups: Vec<ListGroup>,
}

impl MonitorSchema {
    pub fn new(source: impl Into<String>, id_column: impl Into<String>, score: FieldSpec) -> Self {
        Self {
            source: source.into(),
            id_column: id_column.into(),
            id_label: default_id_label(),
            header: default_header(),
            fields: Vec::new(),
            score,
            groups: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_group(mut self, group: ListGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn id_label(mut self, label: impl Into<String>) -> Self {
        self.id_label = label.into();
        self
    }

    /// The pharmacy score view this monitor was built for.
    ///
    /// Record keys match the documents already persisted by existing
    /// deployments, so an old state file stays a valid baseline.
    pub fn reference() -> Self {
        Self::new(
            "hc_score_farmacia_det",
            "nr_atendimento",
            FieldSpec::new("score", "total_pontos", "TOTAL SCORE")
                .kind(FieldKind::Integer)
                .icon("🔢"),
        )
        .id_label("Encounter")
        .with_field(FieldSpec::new("paciente", "nm_paciente", "Patient").icon("👤"))
        .with_field(
            FieldSpec::new("idade", "idade", "Age")
                .kind(FieldKind::Integer)
                .suffix("years")
                .icon("🎂"),
        )
        .with_field(
            FieldSpec::new("creatinina", "creatinina", "Creatinine")
                .kind(FieldKind::Decimal)
                .icon("🧪"),
        )
        .with_group(
            ListGroup::new("nm_medicamentos", "nm_medicamentos", "Medications")
                .icon("💊")
                .count("qtd_medicamentos", "qtd_medicamentos"),
        )
        .with_group(
            ListGroup::new("nm_mav", "nm_medicamentos_mav", "High-alert medications (MAV)")
                .icon("🚨")
                .count("qtd_mav", "qtd_medicamentos_mav"),
        )
        .with_group(
            ListGroup::new("nm_dispositivo", "nm_dispositivo", "Devices")
                .icon("🧰")
                .count("qtd_dispositivo", "qtd_dispositivo"),
        )
        .with_group(
            ListGroup::new("nm_parenteral", "nm_parenteral", "Parenteral nutrition")
                .icon("🥣")
                .count("qtd_parenteral", "qtd_parenteral"),
        )
    }

    /// Parse and validate a schema document.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let schema: Self =
            serde_json::from_str(raw).map_err(|e| CoreError::Schema(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check keys are unique and non-empty and every SQL name is a plain
    /// identifier.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_identifier(&self.source, "source")?;
        validate_identifier(&self.id_column, "id_column")?;

        let mut seen = HashSet::new();
        for column in self.columns() {
            if column.key.trim().is_empty() {
                return Err(CoreError::Schema(format!(
                    "Column '{}' has an empty key",
                    column.name
                )));
            }
            if !seen.insert(column.key) {
                return Err(CoreError::Schema(format!(
                    "Duplicate field key '{}'",
                    column.key
                )));
            }
            validate_identifier(column.name, column.key)?;
        }
        Ok(())
    }

    /// All fetched columns (identifier excluded) in query order: descriptive
    /// fields, score, then each group's count and items.
    pub fn columns(&self) -> Vec<Column<'_>> {
        let mut columns: Vec<Column<'_>> = self
            .fields
            .iter()
            .chain(std::iter::once(&self.score))
            .map(field_column)
            .collect();

        for group in &self.groups {
            if let Some(count) = &group.count {
                columns.push(field_column(count));
            }
            columns.push(Column {
                key: &group.key,
                name: &group.column,
                kind: FieldKind::Text,
            });
        }
        columns
    }

    /// Whether `key` is the items field of a tracked list group.
    pub fn is_list_field(&self, key: &str) -> bool {
        self.groups.iter().any(|g| g.key == key)
    }

    /// Whether `key` is produced by this schema.
    pub fn is_known_key(&self, key: &str) -> bool {
        self.columns().iter().any(|c| c.key == key)
    }

    /// Build a record from one row of values in [`columns`](Self::columns)
    /// order. Absent values become [`FieldValue::empty`].
    pub fn record_from_row(
        &self,
        values: Vec<Option<FieldValue>>,
    ) -> Result<RecordSnapshot, CoreError> {
        let columns = self.columns();
        if values.len() != columns.len() {
            return Err(CoreError::Validation(format!(
                "Row has {} values, schema expects {}",
                values.len(),
                columns.len()
            )));
        }

        Ok(columns
            .iter()
            .zip(values)
            .map(|(column, value)| (column.key, value.unwrap_or_default()))
            .collect())
    }
}

impl Default for MonitorSchema {
    fn default() -> Self {
        Self::reference()
    }
}

fn field_column(field: &FieldSpec) -> Column<'_> {
    Column {
        key: &field.key,
        name: &field.column,
        kind: field.kind,
    }
}

/// Allowed SQL names: dot-separated parts of `[A-Za-z_][A-Za-z0-9_]*`.
/// Names are interpolated into the query, so nothing else is accepted.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn validate_identifier(name: &str, context: &str) -> Result<(), CoreError> {
    if is_safe_identifier(name) {
        Ok(())
    } else {
        Err(CoreError::Schema(format!(
            "'{name}' ({context}) is not a valid SQL identifier"
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
