//! Row model and conversion to spreadsheet cells.
//!
//! Input rows arrive in one of three shapes: a positional list of values, a
//! record of named values, or a single scalar. [`convert_row`] turns any of
//! them into the `Vec<String>` the Sheets API expects, optionally projected
//! through a [`FieldMap`] that picks and orders the columns.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell.
    Null,
    /// Boolean, rendered as `TRUE` / `FALSE`.
    Bool(bool),
    /// Number, rendered with its JSON representation.
    Number(serde_json::Number),
    /// Plain text.
    Text(String),
}

impl CellValue {
    /// Converts a JSON value into a cell.
    ///
    /// Arrays and objects cannot live inside a single cell and are rejected.
    pub fn from_json(value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => Ok(Self::Number(n)),
            Value::String(s) => Ok(Self::Text(s)),
            Value::Array(_) => Err(CoreError::unknown_shape(
                "nested array cannot be used as a cell value",
            )),
            Value::Object(_) => Err(CoreError::unknown_shape(
                "nested object cannot be used as a cell value",
            )),
        }
    }

    /// Returns the text written to the spreadsheet for this cell.
    pub fn to_cell_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// One input row, in one of the supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RowData {
    /// Positional values.
    List(Vec<CellValue>),
    /// Named values in insertion order.
    Record(Vec<(String, CellValue)>),
    /// A lone value.
    Scalar(CellValue),
}

impl RowData {
    /// Converts a JSON value into a row.
    ///
    /// Arrays become [`RowData::List`], objects become [`RowData::Record`]
    /// (keeping key order) and anything else becomes [`RowData::Scalar`].
    pub fn from_json(value: Value) -> CoreResult<Self> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(CellValue::from_json)
                .collect::<CoreResult<Vec<_>>>()
                .map(Self::List),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| CellValue::from_json(v).map(|cell| (k, cell)))
                .collect::<CoreResult<Vec<_>>>()
                .map(Self::Record),
            other => CellValue::from_json(other).map(Self::Scalar),
        }
    }

    /// Converts every element of a JSON array into a row.
    pub fn many_from_json(value: Value) -> CoreResult<Vec<Self>> {
        match value {
            Value::Array(rows) => rows.into_iter().map(Self::from_json).collect(),
            Value::Object(_) => Err(CoreError::unknown_shape(
                "expected an array of rows, found an object",
            )),
            _ => Err(CoreError::unknown_shape(
                "expected an array of rows, found a scalar",
            )),
        }
    }

    /// Builds a list row from anything convertible into cells.
    pub fn list<I, C>(cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CellValue>,
    {
        Self::List(cells.into_iter().map(Into::into).collect())
    }

    /// Builds a record row from `(name, value)` pairs.
    pub fn record<I, K, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<CellValue>,
    {
        Self::Record(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn field(&self, name: &str) -> Option<&CellValue> {
        match self {
            Self::Record(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Ordered mapping of row field names to column headers.
///
/// The declaration order decides the column order of the exported sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field with its header label.
    ///
    /// Re-declaring a field replaces its header but keeps its position.
    pub fn with_field(mut self, field: impl Into<String>, header: impl Into<String>) -> Self {
        self.insert(field, header);
        self
    }

    /// Inserts a field, keeping the first declaration position.
    pub fn insert(&mut self, field: impl Into<String>, header: impl Into<String>) {
        let field = field.into();
        let header = header.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = header,
            None => self.entries.push((field, header)),
        }
    }

    /// Parses `name=Header` specs, as given on the command line.
    ///
    /// A spec without `=` uses the field name as its own header.
    pub fn parse_specs<I, S>(specs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            let (field, header) = match spec.split_once('=') {
                Some((field, header)) => (field.trim(), header.trim()),
                None => (spec.trim(), spec.trim()),
            };
            if field.is_empty() {
                return Err(CoreError::InvalidFieldMapping(spec.to_string()));
            }
            map.insert(field, header);
        }
        Ok(map)
    }

    /// Returns the field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    /// Returns the header labels in declaration order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, h)| h.as_str())
    }

    /// Returns the number of mapped fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no field is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, header) in &self.entries {
            map.serialize_entry(field, header)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to header labels")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((field, header)) = access.next_entry::<String, String>()? {
                    map.insert(field, header);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Converts one row into spreadsheet cell text.
///
/// With a field mapping, the output has exactly one cell per mapped field in
/// declaration order: records are looked up by name, lists by position, a
/// scalar fills the first column. Missing values become empty cells.
///
/// Without a mapping, lists pass through unchanged, records yield their
/// values in insertion order and a scalar yields a single cell.
pub fn convert_row(row: &RowData, fields: Option<&FieldMap>) -> Vec<String> {
    match fields.filter(|f| !f.is_empty()) {
        Some(fields) => match row {
            RowData::Record(_) => fields
                .fields()
                .map(|name| row.field(name).map(CellValue::to_cell_text).unwrap_or_default())
                .collect(),
            RowData::List(cells) => (0..fields.len())
                .map(|i| cells.get(i).map(CellValue::to_cell_text).unwrap_or_default())
                .collect(),
            RowData::Scalar(cell) => std::iter::once(cell.to_cell_text())
                .chain(std::iter::repeat_n(String::new(), fields.len() - 1))
                .collect(),
        },
        None => match row {
            RowData::List(cells) => cells.iter().map(CellValue::to_cell_text).collect(),
            RowData::Record(pairs) => pairs.iter().map(|(_, v)| v.to_cell_text()).collect(),
            RowData::Scalar(cell) => vec![cell.to_cell_text()],
        },
    }
}

/// Returns the header row for an export, if one applies.
///
/// A field mapping always provides the headers. Otherwise the keys of the
/// first row are used when it is a record; lists and scalars have none.
pub fn header_row(first: Option<&RowData>, fields: Option<&FieldMap>) -> Option<Vec<String>> {
    if let Some(fields) = fields.filter(|f| !f.is_empty()) {
        return Some(fields.headers().map(str::to_string).collect());
    }
    match first {
        Some(RowData::Record(pairs)) => Some(pairs.iter().map(|(k, _)| k.clone()).collect()),
        _ => None,
    }
}
