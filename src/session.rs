use std::collections::BTreeMap;

use crate::{
    error::{FormwrightError, FormwrightResult},
    rpc::{RpcFailure, RpcGateway},
    schema::FieldRegistry,
    states::FieldState,
    validate::{self, ValidationResult},
    value::{Record, Value},
};

/// Identity of one open editor. Host-assigned; the stale-response guard
/// keys on it so a closed or replaced editor never absorbs late responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct EditorId(pub u64);

/// Correlates one recomputation request with its response. `seq` is the
/// issuance counter: responses for a target apply only if they carry the
/// newest issued seq for that target (last issued wins, not last arrived).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ticket {
    pub editor: EditorId,
    pub target: String,
    pub seq: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RecomputeKind {
    /// Whole-record recomputation triggered by the edited field.
    OnChange { changed: String },
    /// Single-field recomputation for a dependent of the edited field.
    OnChangeWith,
}

/// An issued, not-yet-resolved recomputation. Carries a full snapshot of
/// the record as it stood at issuance.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecomputeRequest {
    pub ticket: Ticket,
    pub kind: RecomputeKind,
    pub record: Record,
}

/// One open record editor: the working record, its validation state and
/// the cascade bookkeeping. Single-threaded by construction; hosts drive
/// it from their event loop and carry tickets through their own I/O.
#[derive(Clone, Debug)]
pub struct EditorSession {
    pub(crate) editor: EditorId,
    pub(crate) model: String,
    pub(crate) id: Option<i64>,
    pub(crate) registry: FieldRegistry,
    pub(crate) record: Record,
    pub(crate) validation: ValidationResult,
    seq: u64,
    latest_issued: BTreeMap<String, u64>,
    closed: bool,
}

impl EditorSession {
    pub fn new(
        editor: EditorId,
        model: impl Into<String>,
        id: Option<i64>,
        registry: FieldRegistry,
        record: Record,
    ) -> Self {
        Self {
            editor,
            model: model.into(),
            id,
            registry,
            record,
            validation: ValidationResult::default(),
            seq: 0,
            latest_issued: BTreeMap::new(),
            closed: false,
        }
    }

    /// Open an editor on an existing record, seeding it from `read`.
    #[tracing::instrument(skip(gateway, registry))]
    pub fn open_existing(
        gateway: &dyn RpcGateway,
        editor: EditorId,
        model: &str,
        id: i64,
        registry: FieldRegistry,
    ) -> FormwrightResult<Self> {
        let fields: Vec<String> = registry.iter().map(|d| d.name.clone()).collect();
        let mut records = gateway.read(model, &[id], &fields)?;
        if records.is_empty() {
            return Err(FormwrightError::session(format!(
                "record {id} of {model} does not exist"
            )));
        }
        Ok(Self::new(editor, model, Some(id), registry, records.remove(0)))
    }

    /// Open an editor on a new record, seeding it from server defaults.
    #[tracing::instrument(skip(gateway, registry, context))]
    pub fn open_new(
        gateway: &dyn RpcGateway,
        editor: EditorId,
        model: &str,
        registry: FieldRegistry,
        context: &serde_json::Value,
    ) -> FormwrightResult<Self> {
        let fields: Vec<String> = registry.iter().map(|d| d.name.clone()).collect();
        let record = gateway.defaults(model, &fields, context)?;
        Ok(Self::new(editor, model, None, registry, record))
    }

    pub fn editor(&self) -> EditorId {
        self.editor
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closing or navigating away: every still-in-flight response for this
    /// editor is suppressed from now on.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Apply one user edit. The record updates synchronously and the field
    /// is locally validated before any network round-trip; the returned
    /// requests are the recomputations this edit triggers, to be resolved
    /// by the host (or by [`run_cascade`]).
    #[tracing::instrument(skip(self, value), fields(editor = self.editor.0))]
    pub fn edit(&mut self, field: &str, value: Value) -> Vec<RecomputeRequest> {
        if self.closed {
            tracing::warn!(field, "edit on closed editor ignored");
            return Vec::new();
        }

        self.record.set(field, value);
        self.validate_one(field);

        let mut requests = Vec::new();
        let snapshot = self.record.clone();

        if self
            .registry
            .get(field)
            .is_some_and(|d| !d.on_change.is_empty())
        {
            requests.push(RecomputeRequest {
                ticket: self.issue(field),
                kind: RecomputeKind::OnChange {
                    changed: field.to_string(),
                },
                record: snapshot.clone(),
            });
        }

        let dependents: Vec<String> = self
            .registry
            .dependents_of(field)
            // A field never re-triggers its own cascade.
            .filter(|d| d.name != field)
            .map(|d| d.name.clone())
            .collect();
        for target in dependents {
            requests.push(RecomputeRequest {
                ticket: self.issue(&target),
                kind: RecomputeKind::OnChangeWith,
                record: snapshot.clone(),
            });
        }

        tracing::debug!(field, issued = requests.len(), "edit applied");
        requests
    }

    /// Resolve a whole-record recomputation. Every returned field except
    /// the edited one is written back, each write re-validated locally.
    /// Failures are logged and swallowed: the user's direct edit stands.
    pub fn apply_on_change(&mut self, ticket: &Ticket, outcome: Result<Record, RpcFailure>) {
        if self.is_stale(ticket) {
            return;
        }
        let patch = match outcome {
            Ok(patch) => patch,
            Err(fail) => {
                tracing::warn!(target = %ticket.target, %fail, "on_change failed; edit stands");
                return;
            }
        };
        for (name, value) in patch.iter() {
            if name == &ticket.target {
                continue; // never clobber or re-validate the edited field
            }
            self.record.set(name.clone(), value.clone());
            self.validate_one(name);
        }
    }

    /// Resolve a single-field recomputation.
    pub fn apply_on_change_with(&mut self, ticket: &Ticket, outcome: Result<Value, RpcFailure>) {
        if self.is_stale(ticket) {
            return;
        }
        match outcome {
            Ok(value) => {
                self.record.set(ticket.target.clone(), value);
                self.validate_one(&ticket.target);
            }
            Err(fail) => {
                tracing::warn!(target = %ticket.target, %fail, "on_change_with failed; edit stands");
            }
        }
    }

    /// Replace the working record wholesale (authoritative post-save
    /// values). Outstanding recomputations are invalidated: they were
    /// issued against the pre-save record.
    pub(crate) fn replace_record(&mut self, record: Record) {
        self.record = record;
        self.latest_issued.clear();
        self.validation = ValidationResult::default();
    }

    pub(crate) fn validate_one(&mut self, field: &str) {
        let Some(descriptor) = self.registry.get(field) else {
            return;
        };
        let state = FieldState::evaluate(descriptor, &self.record);
        let outcome = validate::check_field(descriptor, self.record.get(field), state.required);
        self.validation.set_field(field, outcome);
    }

    fn issue(&mut self, target: &str) -> Ticket {
        self.seq += 1;
        self.latest_issued.insert(target.to_string(), self.seq);
        Ticket {
            editor: self.editor,
            target: target.to_string(),
            seq: self.seq,
        }
    }

    fn is_stale(&self, ticket: &Ticket) -> bool {
        if self.closed || ticket.editor != self.editor {
            return true;
        }
        match self.latest_issued.get(&ticket.target) {
            Some(latest) => ticket.seq < *latest,
            // Unknown target seq: issued before a wholesale replacement.
            None => true,
        }
    }
}

/// Drive every request of one edit against the gateway immediately and in
/// issue order. Hosts with a real event loop resolve tickets through their
/// own I/O instead; applying a response never issues further requests, so
/// a cascade is bounded to depth one.
#[tracing::instrument(skip_all, fields(count = requests.len()))]
pub fn run_cascade(
    session: &mut EditorSession,
    gateway: &dyn RpcGateway,
    requests: Vec<RecomputeRequest>,
) {
    for req in requests {
        match &req.kind {
            RecomputeKind::OnChange { changed } => {
                let outcome = gateway.on_change(
                    &session.model,
                    &req.record,
                    std::slice::from_ref(changed),
                );
                session.apply_on_change(&req.ticket, outcome);
            }
            RecomputeKind::OnChangeWith => {
                let outcome =
                    gateway.on_change_with(&session.model, &req.record, &req.ticket.target);
                session.apply_on_change_with(&req.ticket, outcome);
            }
        }
    }
}
