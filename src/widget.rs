use crate::schema::FieldType;

/// The closed set of renderable widgets.
///
/// `Raw` is the mandatory fallback: it displays the field type and the raw
/// value, so resolution is total and the interpreter never aborts on an
/// unknown or future field type.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Char,
    Text,
    Integer,
    Float,
    Numeric,
    Checkbox,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Selection,
    #[serde(rename = "many2one")]
    Many2One,
    #[serde(rename = "one2many")]
    One2Many,
    #[serde(rename = "many2many")]
    Many2Many,
    Binary,
    Url,
    Image,
    #[serde(rename = "progressbar")]
    ProgressBar,
    Raw,
}

/// Resolve a field to its widget. Explicit override wins, else the type
/// default, else `Raw`. Total: every input maps to something renderable.
pub fn resolve_widget(field_type: &FieldType, override_name: Option<&str>) -> WidgetKind {
    if let Some(name) = override_name
        && let Some(widget) = by_name(name)
    {
        return widget;
    }
    type_default(field_type)
}

fn by_name(name: &str) -> Option<WidgetKind> {
    let widget = match name {
        "char" => WidgetKind::Char,
        "text" => WidgetKind::Text,
        "integer" => WidgetKind::Integer,
        "float" => WidgetKind::Float,
        "numeric" => WidgetKind::Numeric,
        "checkbox" | "boolean" => WidgetKind::Checkbox,
        "date" => WidgetKind::Date,
        "datetime" => WidgetKind::DateTime,
        "selection" => WidgetKind::Selection,
        "many2one" => WidgetKind::Many2One,
        "one2many" => WidgetKind::One2Many,
        "many2many" => WidgetKind::Many2Many,
        "binary" => WidgetKind::Binary,
        "url" => WidgetKind::Url,
        "image" => WidgetKind::Image,
        "progressbar" => WidgetKind::ProgressBar,
        _ => return None,
    };
    Some(widget)
}

fn type_default(field_type: &FieldType) -> WidgetKind {
    match field_type {
        FieldType::Char => WidgetKind::Char,
        FieldType::Text => WidgetKind::Text,
        FieldType::Integer => WidgetKind::Integer,
        FieldType::Float => WidgetKind::Float,
        FieldType::Numeric => WidgetKind::Numeric,
        FieldType::Boolean => WidgetKind::Checkbox,
        FieldType::Date => WidgetKind::Date,
        FieldType::DateTime => WidgetKind::DateTime,
        FieldType::Selection => WidgetKind::Selection,
        FieldType::Many2One => WidgetKind::Many2One,
        FieldType::One2Many => WidgetKind::One2Many,
        FieldType::Many2Many => WidgetKind::Many2Many,
        FieldType::Binary => WidgetKind::Binary,
        FieldType::Other(_) => WidgetKind::Raw,
    }
}
