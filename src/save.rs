use crate::{
    error::FormwrightResult,
    rpc::{FailureKind, RpcGateway},
    session::EditorSession,
    states::FieldState,
    validate::{self, ValidationResult},
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SaveOutcome {
    /// Committed; the session's record now holds the server's
    /// authoritative post-save values.
    Saved { id: i64 },
    /// Phase A or Phase B reported violations; see the session's
    /// validation state. Nothing was written.
    Blocked,
}

const GENERIC_REJECTION: &str = "The server rejected this record.";

/// Two-phase save gate.
///
/// Phase A validates every visible, non-readonly field locally; any
/// violation blocks the save and Phase B is never entered. Phase B submits
/// the full record for server-side business-rule checking; a rejection
/// surfaces as a single form-level error because business rules may span
/// fields. On success the record is replaced wholesale by the server's
/// post-save values, never merged.
#[tracing::instrument(skip_all, fields(model = %session.model, id = ?session.id))]
pub fn save(session: &mut EditorSession, gateway: &dyn RpcGateway) -> FormwrightResult<SaveOutcome> {
    if session.is_closed() {
        return Err(crate::error::FormwrightError::session(
            "cannot save a closed editor",
        ));
    }

    // Phase A: local, synchronous, replaces the validation state wholesale.
    let mut validation = ValidationResult::default();
    for descriptor in session.registry.iter() {
        let state = FieldState::evaluate(descriptor, &session.record);
        if state.invisible || state.readonly {
            continue;
        }
        let outcome = validate::check_field(
            descriptor,
            session.record.get(&descriptor.name),
            state.required,
        );
        validation.set_field(&descriptor.name, outcome);
    }
    if !validation.is_clean() {
        tracing::debug!(
            errors = validation.field_errors.len(),
            "save blocked by local validation"
        );
        session.validation = validation;
        return Ok(SaveOutcome::Blocked);
    }

    // Phase B: remote business rules, one form-level error on rejection.
    if let Err(fail) = gateway.pre_validate(&session.model, &session.record) {
        validation.form_error = Some(match fail.kind {
            FailureKind::ValidationRejected if !fail.message.is_empty() => fail.message,
            _ => {
                tracing::warn!(%fail, "pre_validate failed with unexpected shape");
                GENERIC_REJECTION.to_string()
            }
        });
        session.validation = validation;
        return Ok(SaveOutcome::Blocked);
    }
    session.validation = validation;

    let id = match session.id {
        Some(id) => {
            gateway.write(&session.model, &[id], &session.record)?;
            id
        }
        None => gateway.create(&session.model, &session.record)?,
    };

    // Reload the authoritative values and replace, never merge.
    let fields: Vec<String> = session.registry.iter().map(|d| d.name.clone()).collect();
    let mut records = gateway.read(&session.model, &[id], &fields)?;
    if records.is_empty() {
        return Err(crate::error::FormwrightError::session(format!(
            "record {id} vanished after save"
        )));
    }
    session.id = Some(id);
    session.replace_record(records.remove(0));

    Ok(SaveOutcome::Saved { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        rpc::{RpcFailure, ViewDefinition},
        schema::{FieldDescriptor, FieldRegistry, FieldType},
        session::EditorId,
        value::{Record, Value},
    };
    use std::cell::RefCell;

    /// Scripted gateway: records which calls happen, in order.
    #[derive(Default)]
    struct ScriptedGateway {
        calls: RefCell<Vec<String>>,
        reject: Option<RpcFailure>,
        stored: RefCell<Option<Record>>,
    }

    impl ScriptedGateway {
        fn log(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_string());
        }
    }

    impl RpcGateway for ScriptedGateway {
        fn fetch_view(
            &self,
            _: &str,
            _: Option<i64>,
            _: &str,
        ) -> Result<ViewDefinition, RpcFailure> {
            unimplemented!("not used in save tests")
        }

        fn read(&self, _: &str, _: &[i64], _: &[String]) -> Result<Vec<Record>, RpcFailure> {
            self.log("read");
            Ok(vec![self.stored.borrow().clone().unwrap_or_default()])
        }

        fn defaults(
            &self,
            _: &str,
            _: &[String],
            _: &serde_json::Value,
        ) -> Result<Record, RpcFailure> {
            self.log("defaults");
            Ok(Record::new())
        }

        fn write(&self, _: &str, _: &[i64], values: &Record) -> Result<(), RpcFailure> {
            self.log("write");
            *self.stored.borrow_mut() = Some(values.clone());
            Ok(())
        }

        fn create(&self, _: &str, values: &Record) -> Result<i64, RpcFailure> {
            self.log("create");
            *self.stored.borrow_mut() = Some(values.clone());
            Ok(42)
        }

        fn on_change(&self, _: &str, _: &Record, _: &[String]) -> Result<Record, RpcFailure> {
            self.log("on_change");
            Ok(Record::new())
        }

        fn on_change_with(&self, _: &str, _: &Record, _: &str) -> Result<Value, RpcFailure> {
            self.log("on_change_with");
            Ok(Value::Null)
        }

        fn pre_validate(&self, _: &str, _: &Record) -> Result<(), RpcFailure> {
            self.log("pre_validate");
            match &self.reject {
                Some(fail) => Err(fail.clone()),
                None => Ok(()),
            }
        }

        fn invoke_button(
            &self,
            _: &str,
            _: &str,
            _: &[i64],
            _: &serde_json::Value,
        ) -> Result<Option<serde_json::Value>, RpcFailure> {
            self.log("invoke_button");
            Ok(None)
        }
    }

    fn registry() -> FieldRegistry {
        [
            FieldDescriptor::new("quantity", FieldType::Integer)
                .label("Quantity")
                .required(true),
            FieldDescriptor::new("price", FieldType::Float).label("Price"),
            FieldDescriptor::new("internal", FieldType::Char)
                .label("Internal")
                .required(true)
                .readonly(true),
        ]
        .into_iter()
        .collect()
    }

    fn session(quantity: Value) -> EditorSession {
        let record: Record = [
            ("quantity".to_string(), quantity),
            ("price".to_string(), Value::Float(10.0)),
        ]
        .into_iter()
        .collect();
        EditorSession::new(EditorId(1), "sale.line", Some(7), registry(), record)
    }

    #[test]
    fn phase_a_violation_blocks_and_phase_b_never_runs() {
        let gateway = ScriptedGateway::default();
        let mut s = session(Value::Null);
        let outcome = save(&mut s, &gateway).unwrap();
        assert_eq!(outcome, SaveOutcome::Blocked);
        assert_eq!(
            s.validation().field_errors.get("quantity").map(String::as_str),
            Some("Quantity is required")
        );
        assert_eq!(s.validation().field_errors.len(), 1);
        assert!(gateway.calls.borrow().is_empty(), "no remote call expected");
    }

    #[test]
    fn readonly_required_field_does_not_block() {
        // `internal` is required but readonly, so Phase A skips it.
        let gateway = ScriptedGateway::default();
        let mut s = session(Value::Int(5));
        let outcome = save(&mut s, &gateway).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { id: 7 });
    }

    #[test]
    fn phase_b_rejection_is_one_form_level_error() {
        let gateway = ScriptedGateway {
            reject: Some(RpcFailure::validation_rejected("Quantity exceeds stock")),
            ..Default::default()
        };
        let mut s = session(Value::Int(5));
        let outcome = save(&mut s, &gateway).unwrap();
        assert_eq!(outcome, SaveOutcome::Blocked);
        assert_eq!(
            s.validation().form_error.as_deref(),
            Some("Quantity exceeds stock")
        );
        assert!(s.validation().field_errors.is_empty());
        assert_eq!(gateway.calls.borrow().as_slice(), ["pre_validate"]);
    }

    #[test]
    fn unrecognized_failure_degrades_to_generic_message() {
        let gateway = ScriptedGateway {
            reject: Some(RpcFailure::new(
                crate::rpc::FailureKind::Unknown,
                "stack trace goes here",
            )),
            ..Default::default()
        };
        let mut s = session(Value::Int(5));
        save(&mut s, &gateway).unwrap();
        assert_eq!(s.validation().form_error.as_deref(), Some(GENERIC_REJECTION));
    }

    #[test]
    fn successful_save_replaces_record_wholesale() {
        let gateway = ScriptedGateway::default();
        // The server normalizes the record on write; read returns more
        // than the client sent.
        let mut s = session(Value::Int(5));
        s.edit("price", Value::Float(12.5));
        let outcome = save(&mut s, &gateway).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { id: 7 });
        assert_eq!(
            gateway.calls.borrow().as_slice(),
            ["pre_validate", "write", "read"]
        );
        assert_eq!(s.record().get("price"), Some(&Value::Float(12.5)));
        assert!(s.validation().is_clean());
    }

    #[test]
    fn new_record_goes_through_create_and_learns_its_id() {
        let gateway = ScriptedGateway::default();
        let record: Record = [("quantity".to_string(), Value::Int(1))].into_iter().collect();
        let mut s = EditorSession::new(EditorId(1), "sale.line", None, registry(), record);
        let outcome = save(&mut s, &gateway).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { id: 42 });
        assert_eq!(s.id(), Some(42));
        assert_eq!(
            gateway.calls.borrow().as_slice(),
            ["pre_validate", "create", "read"]
        );
    }
}
