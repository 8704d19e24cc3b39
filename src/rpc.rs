use crate::{
    error::FormwrightResult,
    markup::{self, ViewNode},
    schema::{FieldDescriptor, FieldRegistry},
    value::{Record, Value},
};

/// Failure classification shared by every gateway call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    ValidationRejected,
    ConcurrentModification,
    Unauthorized,
    Network,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("{kind:?}: {message}")]
pub struct RpcFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl RpcFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn validation_rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ValidationRejected, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// What `fetch_view` delivers: raw markup plus the descriptors for every
/// field the view can reference.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ViewDefinition {
    pub markup: String,
    pub descriptors: Vec<FieldDescriptor>,
}

/// The single server primitive this core consumes, split into the typed
/// calls the protocol defines. Transport, retry and authentication live
/// behind the implementation; this crate only classifies failures.
pub trait RpcGateway {
    fn fetch_view(
        &self,
        model: &str,
        view_id: Option<i64>,
        view_type: &str,
    ) -> Result<ViewDefinition, RpcFailure>;

    fn read(&self, model: &str, ids: &[i64], fields: &[String]) -> Result<Vec<Record>, RpcFailure>;

    fn defaults(
        &self,
        model: &str,
        fields: &[String],
        context: &serde_json::Value,
    ) -> Result<Record, RpcFailure>;

    fn write(&self, model: &str, ids: &[i64], values: &Record) -> Result<(), RpcFailure>;

    fn create(&self, model: &str, values: &Record) -> Result<i64, RpcFailure>;

    /// Whole-record recomputation after `changed` fields were edited.
    /// Returns a partial record of recomputed values.
    fn on_change(
        &self,
        model: &str,
        record: &Record,
        changed: &[String],
    ) -> Result<Record, RpcFailure>;

    /// Recompute a single dependent field from the full record.
    fn on_change_with(
        &self,
        model: &str,
        record: &Record,
        target: &str,
    ) -> Result<Value, RpcFailure>;

    /// Server-side business-rule check; `ValidationRejected` carries the
    /// human-readable reason.
    fn pre_validate(&self, model: &str, record: &Record) -> Result<(), RpcFailure>;

    fn invoke_button(
        &self,
        model: &str,
        button: &str,
        ids: &[i64],
        context: &serde_json::Value,
    ) -> Result<Option<serde_json::Value>, RpcFailure>;
}

/// Fetch and parse a view in one step, building the field registry from the
/// delivered descriptors. A parse failure is fatal only to this view load.
#[tracing::instrument(skip(gateway))]
pub fn load_view(
    gateway: &dyn RpcGateway,
    model: &str,
    view_id: Option<i64>,
    view_type: &str,
) -> FormwrightResult<(ViewNode, FieldRegistry)> {
    let def = gateway.fetch_view(model, view_id, view_type)?;
    let tree = markup::parse_view(&def.markup)?;
    let registry = def.descriptors.into_iter().collect();
    Ok((tree, registry))
}
