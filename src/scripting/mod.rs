//! Sandboxed JavaScript for pre-request and test scripts.
//!
//! Scripts are untrusted input. The sandbox gives each execution its own
//! QuickJS realm with resource limits and a capability surface defined by
//! the prelude; see [`ScriptSandbox`] for the isolation contract.

mod bindings;
mod sandbox;

pub use bindings::{RequestView, ResponseView, ScriptInput};
pub use sandbox::{SandboxLimits, ScriptSandbox};
