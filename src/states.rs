use crate::{schema::FieldDescriptor, value::Record};

/// Per-render derivation of one field's dynamic attributes. Never stored;
/// recomputed from the descriptor and the current record every time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldState {
    pub required: bool,
    pub readonly: bool,
    pub invisible: bool,
}

impl FieldState {
    /// Static descriptor flags overlaid with any `states` expressions.
    pub fn evaluate(descriptor: &FieldDescriptor, record: &Record) -> Self {
        let mut state = Self {
            required: descriptor.required,
            readonly: descriptor.readonly,
            invisible: false,
        };
        for (attr, expr) in &descriptor.states {
            let value = StateExpr::parse(expr)
                .map(|e| e.eval(record))
                .unwrap_or(false);
            match attr.as_str() {
                "required" => state.required = value,
                "readonly" => state.readonly = value,
                "invisible" => state.invisible = value,
                _ => {}
            }
        }
        state
    }
}

/// The closed states-expression grammar:
///
/// ```text
/// expr := 'true' | 'false'         boolean literal
///       | name                     bare field truthiness
///       | name == 'literal'        equality against a quoted literal
/// ```
///
/// Anything outside this grammar fails to parse, and evaluation of a
/// missing field reads as absent. Both cases resolve to `false`: showing
/// an editable field that should be locked is recoverable, silently hiding
/// data entry is not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateExpr {
    Literal(bool),
    Truthy(String),
    Equals(String, String),
}

impl StateExpr {
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        match expr {
            "true" | "True" => return Some(StateExpr::Literal(true)),
            "false" | "False" => return Some(StateExpr::Literal(false)),
            _ => {}
        }

        if let Some((lhs, rhs)) = expr.split_once("==") {
            let name = lhs.trim();
            if !is_field_name(name) {
                return None;
            }
            let rhs = rhs.trim();
            let literal = rhs
                .strip_prefix('\'')
                .and_then(|r| r.strip_suffix('\''))?;
            if literal.contains('\'') {
                return None;
            }
            return Some(StateExpr::Equals(name.to_string(), literal.to_string()));
        }

        if is_field_name(expr) {
            return Some(StateExpr::Truthy(expr.to_string()));
        }
        None
    }

    /// Total evaluation: a reference to a missing field is `false`, never
    /// an error.
    pub fn eval(&self, record: &Record) -> bool {
        match self {
            StateExpr::Literal(b) => *b,
            StateExpr::Truthy(name) => record.get(name).is_some_and(|v| v.truthy()),
            StateExpr::Equals(name, literal) => record
                .get(name)
                .is_some_and(|v| v.matches_literal(literal)),
        }
    }
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
