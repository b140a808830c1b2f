//! Core data models shared across the engine.

pub mod outcome;
pub mod request;
pub mod response;
pub mod result;
pub mod run;
pub mod variable;

pub use outcome::{ConsoleLevel, ConsoleLine, ScriptPhase, TestEntry, TestOutcome};
pub use request::{
    ApiKeyPlacement, AuthSpec, BodyKind, FormField, Pair, RequestConfig, ResolvedRequest,
    TransportOptions, UrlEncodedPayload,
};
pub use response::{CookieInfo, ErrorKind, RequestError, ResponseInfo, SizeInfo, TimingInfo};
pub use result::ExecutionResult;
pub use run::{
    CollectionRunResult, DataRow, IterationResult, RequestRunResult, RequestStatus, RunStatus,
};
pub use variable::{apply_updates, ScopeId, VarUpdate, Variable, VariableKind, VariableUpdates};
