use std::collections::HashMap;

use crate::error::CompatError;
use crate::hrana;
use crate::types::Value;

/// Bound-parameter set for one statement invocation.
///
/// The flexible call shapes of the compatibility API collapse into three
/// forms: nothing, 1-based positional values (absent entries are skipped,
/// leaving the slot unbound), or named values with an optional `$`/`@`/`:`
/// sigil on each name.
#[derive(Debug, Clone, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Option<Value>>),
    Named(Vec<(String, Option<Value>)>),
}

impl Params {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }

    /// Apply this parameter set to a statement.
    ///
    /// Existing bindings are cleared first, then each present value is bound.
    /// `Params::None` leaves the statement's bindings untouched; callers that
    /// must clear unconditionally (the statement-level `bind`) do so
    /// explicitly before applying.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when a named parameter reduces to an
    /// empty name after sigil stripping.
    pub fn apply_to(&self, stmt: &mut hrana::Stmt) -> Result<(), CompatError> {
        match self {
            Params::None => {}
            Params::Positional(values) => {
                stmt.unbind_all();
                for (i, value) in values.iter().enumerate() {
                    if let Some(value) = value {
                        stmt.bind_index(i + 1, to_wire(value));
                    }
                }
            }
            Params::Named(entries) => {
                stmt.unbind_all();
                for (name, value) in entries {
                    let Some(value) = value else { continue };
                    let bare = strip_sigil(name);
                    if bare.is_empty() {
                        return Err(CompatError::Argument(format!(
                            "invalid parameter name {name:?}"
                        )));
                    }
                    stmt.bind_name(bare, to_wire(value));
                }
            }
        }
        Ok(())
    }
}

/// Strip a single leading `$`, `@` or `:` sigil; bare names pass through.
fn strip_sigil(name: &str) -> &str {
    name.strip_prefix(['$', '@', ':']).unwrap_or(name)
}

/// Narrow an API value to the wire value space, the same way the libsql
/// backends narrow middleware values: booleans become 0/1 integers,
/// timestamps and JSON become text.
pub(crate) fn to_wire(value: &Value) -> hrana::Value {
    match value {
        Value::Int(i) => hrana::Value::Integer(*i),
        Value::Float(f) => hrana::Value::Real(*f),
        Value::Text(s) => hrana::Value::Text(s.clone()),
        Value::Bool(b) => hrana::Value::Integer(i64::from(*b)),
        Value::Timestamp(dt) => hrana::Value::Text(dt.format("%F %T%.f").to_string()),
        Value::Null => hrana::Value::Null,
        Value::Json(j) => hrana::Value::Text(j.to_string()),
        Value::Blob(bytes) => hrana::Value::Blob(bytes.clone()),
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::None
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Params::Positional(vec![Some(value)])
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values.into_iter().map(Some).collect())
    }
}

impl From<&[Value]> for Params {
    fn from(values: &[Value]) -> Self {
        values.to_vec().into()
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        values.to_vec().into()
    }
}

impl From<Vec<Option<Value>>> for Params {
    fn from(values: Vec<Option<Value>>) -> Self {
        Params::Positional(values)
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(entries: Vec<(String, Value)>) -> Self {
        Params::Named(entries.into_iter().map(|(n, v)| (n, Some(v))).collect())
    }
}

impl From<&[(&str, Value)]> for Params {
    fn from(entries: &[(&str, Value)]) -> Self {
        Params::Named(
            entries
                .iter()
                .map(|(n, v)| ((*n).to_owned(), Some(v.clone())))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Params {
    fn from(entries: [(&str, Value); N]) -> Self {
        Params::Named(
            entries
                .into_iter()
                .map(|(n, v)| (n.to_owned(), Some(v)))
                .collect(),
        )
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(entries: HashMap<String, Value>) -> Self {
        Params::Named(entries.into_iter().map(|(n, v)| (n, Some(v))).collect())
    }
}
