use std::collections::{BTreeMap, BTreeSet};

use crate::value::Value;

/// Server-declared type of a field.
///
/// `Other` keeps descriptors for field types this client predates; the
/// widget resolver still maps them to a renderable fallback. Serialized as
/// the server's plain type name, so unknown names deserialize into `Other`
/// instead of rejecting the whole descriptor set.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Char,
    Text,
    Integer,
    Float,
    Numeric,
    Boolean,
    Date,
    DateTime,
    Selection,
    Many2One,
    One2Many,
    Many2Many,
    Binary,
    Other(String),
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "char" => FieldType::Char,
            "text" => FieldType::Text,
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "numeric" => FieldType::Numeric,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "selection" => FieldType::Selection,
            "many2one" => FieldType::Many2One,
            "one2many" => FieldType::One2Many,
            "many2many" => FieldType::Many2Many,
            "binary" => FieldType::Binary,
            _ => FieldType::Other(name),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        match t {
            FieldType::Char => "char".to_string(),
            FieldType::Text => "text".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Numeric => "numeric".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::DateTime => "datetime".to_string(),
            FieldType::Selection => "selection".to_string(),
            FieldType::Many2One => "many2one".to_string(),
            FieldType::One2Many => "one2many".to_string(),
            FieldType::Many2Many => "many2many".to_string(),
            FieldType::Binary => "binary".to_string(),
            FieldType::Other(name) => name,
        }
    }
}

/// Per-field metadata delivered alongside the view markup.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_model: Option<String>,
    /// (value, display label) pairs for selection fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selection: Vec<(String, String)>,
    /// Editing this field triggers a whole-record on_change recomputation.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub on_change: BTreeSet<String>,
    /// Source fields whose edits recompute this field (on_change_with).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub on_change_with: BTreeSet<String>,
    /// Dynamic state expressions, keyed by `required`/`readonly`/`invisible`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub states: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<serde_json::Value>,
    /// (integer, fractional) digit widths for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digits: Option<(u8, u8)>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type,
            required: false,
            readonly: false,
            relation_model: None,
            selection: Vec::new(),
            on_change: BTreeSet::new(),
            on_change_with: BTreeSet::new(),
            states: BTreeMap::new(),
            domain: None,
            digits: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn selection(mut self, options: Vec<(String, String)>) -> Self {
        self.selection = options;
        self
    }

    pub fn on_change(mut self, triggers: impl IntoIterator<Item = String>) -> Self {
        self.on_change = triggers.into_iter().collect();
        self
    }

    pub fn on_change_with(mut self, sources: impl IntoIterator<Item = String>) -> Self {
        self.on_change_with = sources.into_iter().collect();
        self
    }

    pub fn state(mut self, attr: impl Into<String>, expr: impl Into<String>) -> Self {
        self.states.insert(attr.into(), expr.into());
        self
    }

    /// Whether `value` has a plausible shape for this field's type. The
    /// precise rules live in `validate`; this is the cheap structural check
    /// used by widgets.
    pub fn accepts(&self, value: &Value) -> bool {
        crate::validate::validate_field(self, value).is_ok()
    }
}

/// All descriptors for one view, injected into the interpreter and the
/// session rather than held globally, so concurrent editors stay isolated.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldRegistry(BTreeMap<String, FieldDescriptor>);

impl FieldRegistry {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, descriptor: FieldDescriptor) {
        self.0.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.0.values()
    }

    /// Fields whose `on_change_with` set names `edited`.
    pub fn dependents_of<'a>(&'a self, edited: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.0
            .values()
            .filter(move |d| d.on_change_with.contains(edited))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FieldDescriptor> for FieldRegistry {
    fn from_iter<I: IntoIterator<Item = FieldDescriptor>>(iter: I) -> Self {
        let mut reg = Self::new();
        for d in iter {
            reg.insert(d);
        }
        reg
    }
}
