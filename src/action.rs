use crate::rpc::RpcGateway;

/// Classified result of a button press. Exactly one of these per
/// invocation; a failure never discards the editor's unsaved edits.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ActionOutcome {
    /// Discard current view state and refetch the record.
    Reload,
    /// Open a new view/window with server-supplied parameters.
    OpenView(OpenView),
    /// The action failed; the message is attributable to the action.
    Failed { message: String },
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpenView {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<i64>,
    #[serde(default)]
    pub view_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub domain: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

/// Route one button press to the server and classify the outcome.
///
/// A `null` result means the action completed server-side and the client
/// should reload. A descriptor naming a model opens a new view. Anything
/// unrecognizable degrades to `Reload` rather than guessing.
#[tracing::instrument(skip(gateway, context))]
pub fn dispatch_button(
    gateway: &dyn RpcGateway,
    model: &str,
    button: &str,
    ids: &[i64],
    context: &serde_json::Value,
) -> ActionOutcome {
    match gateway.invoke_button(model, button, ids, context) {
        Ok(None) => ActionOutcome::Reload,
        Ok(Some(descriptor)) => classify(descriptor),
        Err(fail) => {
            tracing::warn!(button, %fail, "button action failed");
            ActionOutcome::Failed {
                message: fail.message,
            }
        }
    }
}

fn classify(descriptor: serde_json::Value) -> ActionOutcome {
    let Some(model) = descriptor.get("model").and_then(|m| m.as_str()) else {
        tracing::warn!(?descriptor, "unrecognized action descriptor; reloading");
        return ActionOutcome::Reload;
    };
    ActionOutcome::OpenView(OpenView {
        model: model.to_string(),
        view_id: descriptor.get("view_id").and_then(|v| v.as_i64()),
        view_type: descriptor
            .get("view_type")
            .and_then(|v| v.as_str())
            .unwrap_or("form")
            .to_string(),
        domain: descriptor.get("domain").cloned().unwrap_or_default(),
        context: descriptor.get("context").cloned().unwrap_or_default(),
    })
}
