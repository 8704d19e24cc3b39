#![forbid(unsafe_code)]

pub mod action;
pub mod error;
pub mod interpret;
pub mod markup;
pub mod rpc;
pub mod save;
pub mod schema;
pub mod session;
pub mod states;
pub mod validate;
pub mod value;
pub mod widget;

pub use action::{ActionOutcome, OpenView, dispatch_button};
pub use error::{FormwrightError, FormwrightResult};
pub use interpret::{FieldUnit, NodePath, RenderPlan, RenderUnit, UiState, interpret};
pub use markup::{Tag, ViewNode, parse_view};
pub use rpc::{FailureKind, RpcFailure, RpcGateway, ViewDefinition, load_view};
pub use save::{SaveOutcome, save};
pub use schema::{FieldDescriptor, FieldRegistry, FieldType};
pub use session::{EditorId, EditorSession, RecomputeKind, RecomputeRequest, Ticket, run_cascade};
pub use states::{FieldState, StateExpr};
pub use validate::ValidationResult;
pub use value::{Record, Value};
pub use widget::{WidgetKind, resolve_widget};
