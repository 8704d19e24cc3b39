use std::collections::BTreeMap;

use crate::{
    schema::{FieldDescriptor, FieldType},
    value::Value,
};

/// Validation state for one editor, replaced wholesale by each pre-save
/// pass; per-field entries are replaced (never merged) by per-edit checks.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    pub field_errors: BTreeMap<String, String>,
    pub field_warnings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_error: Option<String>,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.field_errors.is_empty() && self.form_error.is_none()
    }

    /// Record the outcome of one field's local validation, replacing any
    /// prior entry for that field.
    pub fn set_field(&mut self, field: &str, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => {
                self.field_errors.remove(field);
            }
            Err(msg) => {
                self.field_errors.insert(field.to_string(), msg);
            }
        }
    }
}

/// Local type + required rule for one field. `required` is the effective
/// (state-evaluated) flag, not the descriptor's static one.
pub fn check_field(
    descriptor: &FieldDescriptor,
    value: Option<&Value>,
    required: bool,
) -> Result<(), String> {
    let value = value.unwrap_or(&Value::Null);
    if required && value.is_empty() {
        return Err(format!("{} is required", descriptor.label));
    }
    if value.is_empty() {
        return Ok(());
    }
    validate_field(descriptor, value)
}

/// Type rule only: does `value` fit the declared field type?
pub fn validate_field(descriptor: &FieldDescriptor, value: &Value) -> Result<(), String> {
    if matches!(value, Value::Null) {
        return Ok(());
    }
    let label = &descriptor.label;
    match &descriptor.field_type {
        FieldType::Char | FieldType::Text => match value {
            Value::Text(_) => Ok(()),
            _ => Err(format!("{label} must be text")),
        },
        FieldType::Integer => match value {
            Value::Int(_) => Ok(()),
            _ => Err(format!("{label} must be an integer")),
        },
        FieldType::Float => match value {
            Value::Float(_) | Value::Int(_) => Ok(()),
            _ => Err(format!("{label} must be a number")),
        },
        FieldType::Numeric => match value {
            Value::Float(f) => check_digits(label, *f, descriptor.digits),
            Value::Int(_) => Ok(()),
            _ => Err(format!("{label} must be a number")),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(format!("{label} must be true or false")),
        },
        // Dates travel as ISO text on this wire.
        FieldType::Date | FieldType::DateTime => match value {
            Value::Text(_) => Ok(()),
            _ => Err(format!("{label} must be a date")),
        },
        FieldType::Selection => match value {
            Value::Text(s) => {
                if descriptor.selection.is_empty()
                    || descriptor.selection.iter().any(|(v, _)| v == s)
                {
                    Ok(())
                } else {
                    Err(format!("{label}: '{s}' is not a valid choice"))
                }
            }
            _ => Err(format!("{label} must be one of its choices")),
        },
        FieldType::Many2One => match value {
            Value::Relation(..) => Ok(()),
            _ => Err(format!("{label} must reference a record")),
        },
        FieldType::One2Many | FieldType::Many2Many => match value {
            Value::Many(_) => Ok(()),
            _ => Err(format!("{label} must be a list of records")),
        },
        FieldType::Binary => match value {
            Value::Text(_) => Ok(()),
            _ => Err(format!("{label} must be binary data")),
        },
        // Unknown future types cannot be checked locally; the server's
        // pre_validate still gets the final word.
        FieldType::Other(_) => Ok(()),
    }
}

fn check_digits(label: &str, value: f64, digits: Option<(u8, u8)>) -> Result<(), String> {
    let Some((_, frac)) = digits else {
        return Ok(());
    };
    let scale = 10f64.powi(i32::from(frac));
    let scaled = value * scale;
    if (scaled - scaled.round()).abs() > 1e-9 {
        return Err(format!("{label} allows at most {frac} decimal places"));
    }
    Ok(())
}
