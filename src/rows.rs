use std::collections::HashMap;
use std::sync::Arc;

use crate::hrana;
use crate::types::Value;

/// A row from a query result, with access by column name or index.
///
/// Column names are shared across all rows of one result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
    // Avoids repeated string comparisons on name lookups.
    index: Arc<HashMap<String, usize>>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<String>>, index: Arc<HashMap<String, usize>>, values: Vec<Value>) -> Self {
        Self {
            columns,
            values,
            index,
        }
    }

    /// Get a value by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self
            .index
            .get(column)
            .copied()
            .or_else(|| self.columns.iter().position(|c| c == column))?;
        self.values.get(idx)
    }

    /// Get a value by 0-based column index.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.values == other.values
    }
}

/// Value of one entry in a keyed mapping built by `map`.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedValue {
    /// The result had exactly one column; there is nothing to map to.
    Absent,
    /// The result had exactly two columns; the second column's value.
    Scalar(Value),
    /// The result had three or more columns; the whole row.
    Row(Row),
}

/// Widen a wire value back into the API value space. Structural only; text
/// is never re-interpreted as JSON or timestamps on the way out.
pub(crate) fn from_wire(value: hrana::Value) -> Value {
    match value {
        hrana::Value::Null => Value::Null,
        hrana::Value::Integer(i) => Value::Int(i),
        hrana::Value::Real(f) => Value::Float(f),
        hrana::Value::Text(s) => Value::Text(s),
        hrana::Value::Blob(bytes) => Value::Blob(bytes),
    }
}

fn column_index(columns: &[String]) -> Arc<HashMap<String, usize>> {
    Arc::new(
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect(),
    )
}

/// Shape a single-row outcome.
pub(crate) fn single_row(result: hrana::RowResult) -> Option<Row> {
    let columns = Arc::new(result.columns);
    let index = column_index(&columns);
    result
        .row
        .map(|values| Row::new(columns, index, values.into_iter().map(from_wire).collect()))
}

/// Shape a full row set into an ordered row array.
pub(crate) fn row_array(set: hrana::RowSet) -> Vec<Row> {
    let columns = Arc::new(set.columns);
    let index = column_index(&columns);
    set.rows
        .into_iter()
        .map(|values| {
            Row::new(
                Arc::clone(&columns),
                Arc::clone(&index),
                values.into_iter().map(from_wire).collect(),
            )
        })
        .collect()
}

/// Shape a full row set into a mapping keyed by each row's first column.
///
/// Two columns map key to the second column's value; one column maps key to
/// nothing; three or more map key to the whole row.
pub(crate) fn keyed_mapping(set: hrana::RowSet) -> HashMap<String, MappedValue> {
    let column_count = set.columns.len();
    let mut mapping = HashMap::new();
    for row in row_array(set) {
        let Some(key) = row.get_index(0) else { continue };
        let key = key.to_string();
        let value = match column_count {
            1 => MappedValue::Absent,
            2 => match row.get_index(1) {
                Some(v) => MappedValue::Scalar(v.clone()),
                None => MappedValue::Absent,
            },
            _ => MappedValue::Row(row),
        };
        mapping.insert(key, value);
    }
    mapping
}
