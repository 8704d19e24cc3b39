use std::collections::BTreeMap;

/// A single field value as exchanged with the server.
///
/// Relational-to-one values travel as an id plus display label; relational-
/// to-many values are bare id lists. Everything else is scalar.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Relation(i64, String),
    Many(Vec<i64>),
}

impl Value {
    /// Truthiness as used by states expressions: null, false, zero, the
    /// empty string and an empty id list are all false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Relation(..) => true,
            Value::Many(ids) => !ids.is_empty(),
        }
    }

    /// Emptiness as used by required-ness checks. Distinct from `truthy`:
    /// a filled-in `false` or `0` satisfies a required field.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Many(ids) => ids.is_empty(),
            _ => false,
        }
    }

    /// Literal comparison for `field == 'literal'` states expressions.
    /// The literal is always textual in the markup, so scalars compare
    /// through their canonical text form.
    pub fn matches_literal(&self, literal: &str) -> bool {
        match self {
            Value::Null => literal.is_empty(),
            Value::Bool(b) => literal == if *b { "true" } else { "false" },
            Value::Int(n) => literal.parse::<i64>() == Ok(*n),
            Value::Float(f) => literal.parse::<f64>() == Ok(*f),
            Value::Text(s) => s == literal,
            Value::Relation(_, label) => label == literal,
            Value::Many(_) => false,
        }
    }
}

/// One open editor's working copy of a record.
///
/// Mutated only by the session that owns it; replaced wholesale by the
/// server's authoritative values after a successful save.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Overwrite every field present in `patch`. Pure overwrite: applying
    /// the same patch twice yields the same record.
    pub fn merge_all(&mut self, patch: &Record) {
        for (name, value) in &patch.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
