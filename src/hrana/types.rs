/// Wire-level value. The protocol speaks the five SQLite storage classes;
/// richer API values are narrowed to these at the binding boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One SQL text plus its current bound-parameter set.
///
/// Positional bindings are 1-based and may be sparse (an unbound slot stays
/// `None`); named bindings carry bare parameter names, sigils already
/// stripped by the binder.
#[derive(Debug, Clone)]
pub struct Stmt {
    sql: String,
    positional: Vec<Option<Value>>,
    named: Vec<(String, Value)>,
}

impl Stmt {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind a value at a 1-based position. Index 0 is ignored rather than
    /// panicking; the binder never produces it.
    pub fn bind_index(&mut self, index: usize, value: Value) {
        if index == 0 {
            return;
        }
        if self.positional.len() < index {
            self.positional.resize(index, None);
        }
        self.positional[index - 1] = Some(value);
    }

    /// Bind a value to a bare parameter name, replacing any earlier binding
    /// of the same name.
    pub fn bind_name(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.named.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.named.push((name, value));
        }
    }

    /// Drop every bound parameter, positional and named.
    pub fn unbind_all(&mut self) {
        self.positional.clear();
        self.named.clear();
    }

    #[must_use]
    pub fn positional(&self) -> &[Option<Value>] {
        &self.positional
    }

    #[must_use]
    pub fn named(&self) -> &[(String, Value)] {
        &self.named
    }
}

/// Scalar outcome of executing a statement for effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StmtResult {
    /// Rows changed by the statement; 0 when not applicable.
    pub affected_row_count: u64,
    /// Rowid of the last inserted row, when the service reported one.
    pub last_insert_rowid: Option<i64>,
}

/// Outcome of fetching at most one row.
#[derive(Debug, Clone)]
pub struct RowResult {
    pub result: StmtResult,
    pub columns: Vec<String>,
    pub row: Option<Vec<Value>>,
}

/// Outcome of fetching a full row set.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub result: StmtResult,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}
