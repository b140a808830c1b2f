//! QuickJS sandbox for untrusted scripts.
//!
//! Collection authors write the scripts; the application embedding this
//! crate does not get to review them. Every execution gets a fresh
//! runtime and realm with a memory limit, a stack limit, and a wall-clock
//! interrupt, and the only capabilities inside are the prelude's API over
//! an injected snapshot. There is no filesystem, network, or process
//! access to reach.

use std::time::Instant;

use rquickjs::{Context, Ctx, Function, Runtime, Value};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{Result, WaypostError};
use crate::models::{ConsoleLine, TestEntry, TestOutcome, VariableUpdates};
use crate::scripting::bindings::ScriptInput;

const PRELUDE: &str = include_str!("prelude.js");

/// Resource limits applied to each execution.
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub memory_bytes: usize,
    pub stack_bytes: usize,
    pub timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            // 64MB keeps runaway scripts from taking the process down
            memory_bytes: 64 * 1024 * 1024,
            stack_bytes: 1024 * 1024,
            timeout_ms: 5_000,
        }
    }
}

/// Executes untrusted script phases. `run` builds a fresh runtime per
/// call, so state cannot leak between executions and a tripped limit
/// cannot poison the next script.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SandboxLimits) -> Self {
        ScriptSandbox { limits }
    }

    /// Runs one script phase to completion. A throwing or interrupted
    /// script yields an outcome carrying a synthetic failing entry named
    /// for the phase; `Err` means the sandbox itself could not start.
    pub fn run(&self, source: &str, input: &ScriptInput) -> Result<TestOutcome> {
        let started = Instant::now();
        let phase = input.phase;

        let runtime = Runtime::new()
            .map_err(|e| WaypostError::Script(format!("Failed to create JS runtime: {}", e)))?;
        runtime.set_memory_limit(self.limits.memory_bytes);
        runtime.set_max_stack_size(self.limits.stack_bytes);

        let deadline = started + std::time::Duration::from_millis(self.limits.timeout_ms);
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

        let context = Context::full(&runtime)
            .map_err(|e| WaypostError::Script(format!("Failed to create JS context: {}", e)))?;

        let input_json = serde_json::to_string(input)?;

        let mut outcome = context.with(|ctx| -> Result<TestOutcome> {
            register_host_functions(&ctx)?;

            // Inject the input document, then the prelude that builds the
            // script-facing API over it.
            let inject = format!(
                "globalThis.__wpInput = JSON.parse({});",
                js_string_literal(&input_json)
            );
            ctx.eval::<Value, _>(inject.as_bytes())
                .map_err(|e| WaypostError::Script(format!("Failed to inject script input: {}", e)))?;
            ctx.eval::<Value, _>(PRELUDE.as_bytes())
                .map_err(|e| WaypostError::Script(format!("Failed to evaluate prelude: {}", e)))?;

            let script_error = match ctx.eval::<Value, _>(source.as_bytes()) {
                Ok(_) => None,
                Err(err) => Some(exception_message(&ctx, err)),
            };

            let mut outcome = read_outcome(&ctx);
            if let Some(message) = script_error {
                outcome.push_failure(phase.label(), message);
            }
            Ok(outcome)
        })?;

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            phase = phase.label(),
            tests = outcome.tests.len(),
            failed = outcome.failed,
            elapsed_ms = outcome.elapsed_ms,
            "script phase finished"
        );
        Ok(outcome)
    }
}

/// Shape the prelude's `__wpFinish()` returns.
#[derive(Deserialize)]
struct Readback {
    tests: Vec<TestEntry>,
    console: Vec<ConsoleLine>,
    environment: VariableUpdates,
    collection: VariableUpdates,
}

/// Reads the accumulated results out of the realm. A script that
/// clobbered the readback hook gets an outcome with a failing entry
/// instead of taking the engine down.
fn read_outcome(ctx: &Ctx<'_>) -> TestOutcome {
    let parsed = ctx
        .eval::<String, _>(&b"JSON.stringify(globalThis.__wpFinish())"[..])
        .map_err(|e| WaypostError::Script(format!("Failed to read script results: {}", e)))
        .and_then(|json| {
            serde_json::from_str::<Readback>(&json)
                .map_err(|e| WaypostError::Script(format!("Malformed script results: {}", e)))
        });

    match parsed {
        Ok(readback) => {
            let passed = readback.tests.iter().filter(|t| t.passed).count();
            let failed = readback.tests.len() - passed;
            TestOutcome {
                tests: readback.tests,
                passed,
                failed,
                elapsed_ms: 0,
                console: readback.console,
                environment_updates: readback.environment,
                collection_updates: readback.collection,
            }
        }
        Err(err) => {
            let mut outcome = TestOutcome::default();
            outcome.push_failure("Script results", err.to_string());
            outcome
        }
    }
}

/// Extracts a readable message from a thrown value.
fn exception_message(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    let caught = ctx.catch();
    if let Some(obj) = caught.as_object() {
        let name: String = obj.get("name").unwrap_or_default();
        let message: String = obj.get("message").unwrap_or_default();
        if !message.is_empty() {
            return if name.is_empty() {
                message
            } else {
                format!("{}: {}", name, message)
            };
        }
    }
    if let Some(s) = caught.as_string() {
        if let Ok(text) = s.to_string() {
            return text;
        }
    }
    "Script threw an exception".to_string()
}

fn register_host_functions(ctx: &Ctx<'_>) -> Result<()> {
    let globals = ctx.globals();
    globals
        .set("__wpSchemaErrors", Function::new(ctx.clone(), schema_errors)?)
        .map_err(|e| WaypostError::Script(format!("Failed to register schema hook: {}", e)))?;
    Ok(())
}

/// JSON Schema validation backing `toMatchSchema`. Both sides arrive as
/// JSON text; the result is a JSON array of error strings, empty when
/// the value conforms.
fn schema_errors(schema_json: String, data_json: String) -> String {
    let schema: serde_json::Value = match serde_json::from_str(&schema_json) {
        Ok(s) => s,
        Err(e) => {
            return serde_json::json!([format!("Invalid schema JSON: {}", e)]).to_string();
        }
    };

    let data: serde_json::Value = match serde_json::from_str(&data_json) {
        Ok(d) => d,
        Err(e) => {
            return serde_json::json!([format!("Invalid data JSON: {}", e)]).to_string();
        }
    };

    let validator = match jsonschema::Validator::new(&schema) {
        Ok(v) => v,
        Err(e) => {
            return serde_json::json!([format!("Invalid schema: {}", e)]).to_string();
        }
    };

    let errors: Vec<String> = validator.iter_errors(&data).map(|e| e.to_string()).collect();

    serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string())
}

/// Encodes text as a JS string literal. JSON escaping is a valid JS
/// string escape for everything serde_json emits.
fn js_string_literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScriptPhase, VarUpdate};
    use crate::resolver::ScopeSet;
    use crate::scripting::bindings::ResponseView;
    use crate::models::{ResponseInfo, SizeInfo, TimingInfo, Variable};

    fn input() -> ScriptInput {
        ScriptInput::for_phase(ScriptPhase::Test, &ScopeSet::default())
    }

    fn input_with_env(vars: Vec<Variable>) -> ScriptInput {
        let scopes = ScopeSet {
            environment: vars,
            ..ScopeSet::default()
        };
        ScriptInput::for_phase(ScriptPhase::Test, &scopes)
    }

    fn response(body: &str) -> ResponseView {
        ResponseView::from_response(&ResponseInfo {
            status: 200,
            reason: Some("OK".to_string()),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string(),
            cookies: Vec::new(),
            timing: TimingInfo {
                ttfb_ms: 3,
                total_ms: 7,
            },
            size: SizeInfo {
                headers_bytes: 40,
                body_bytes: body.len() as u64,
                total_bytes: 40 + body.len() as u64,
            },
        })
    }

    #[test]
    fn test_passing_and_failing_entries() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                test('math works', function () { expect(1 + 1).toBe(2); });
                test('math is broken', function () { expect(1 + 1).toBe(3); });
                "#,
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.tests.len(), 2);
        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.tests[0].passed);
        assert!(!outcome.tests[1].passed);
        assert!(outcome.tests[1].error.as_deref().unwrap().contains("to be 3"));
    }

    #[test]
    fn test_failure_does_not_stop_later_tests() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                test('this one throws', function () { throw new Error('early'); });
                test('this one still runs', function () { expect(true).toBeTruthy(); });
                "#,
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.tests.len(), 2);
        assert!(!outcome.tests[0].passed);
        assert!(outcome.tests[0].error.as_deref().unwrap().contains("early"));
        assert!(outcome.tests[1].passed);
    }

    #[test]
    fn test_throw_outside_test_is_synthetic_failure() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox.run("undefinedFunction();", &input()).unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.tests[0].name, "Test script");
        assert!(outcome.tests[0]
            .error
            .as_deref()
            .unwrap()
            .contains("undefinedFunction"));
    }

    #[test]
    fn test_console_capture() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                console.log('a', 1, {b: true});
                console.warn('careful');
                console.error('bad');
                "#,
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.console.len(), 3);
        assert_eq!(outcome.console[0].message, r#"a 1 {"b":true}"#);
        assert_eq!(outcome.console[1].level, crate::models::ConsoleLevel::Warn);
        assert_eq!(outcome.console[2].level, crate::models::ConsoleLevel::Error);
    }

    #[test]
    fn test_environment_accessors_and_pending_updates() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                test('sees snapshot', function () {
                    expect(environment.get('host')).toBe('example.com');
                    expect(environment.has('host')).toBeTruthy();
                });
                environment.set('token', 'abc');
                environment.unset('host');
                test('read-your-writes', function () {
                    expect(environment.get('token')).toBe('abc');
                    expect(environment.get('host')).toBe(undefined);
                });
                "#,
                &input_with_env(vec![Variable::new("host", "example.com")]),
            )
            .unwrap();

        assert_eq!(outcome.failed, 0, "failures: {:?}", outcome.tests);
        assert_eq!(
            outcome.environment_updates.get("token"),
            Some(&VarUpdate::Set { value: "abc".to_string() })
        );
        assert_eq!(outcome.environment_updates.get("host"), Some(&VarUpdate::Unset));
    }

    #[test]
    fn test_set_stringifies_values() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run("environment.set('n', 5); collectionVariables.set('f', true);", &input())
            .unwrap();

        assert_eq!(
            outcome.environment_updates.get("n"),
            Some(&VarUpdate::Set { value: "5".to_string() })
        );
        assert_eq!(
            outcome.collection_updates.get("f"),
            Some(&VarUpdate::Set { value: "true".to_string() })
        );
    }

    #[test]
    fn test_response_json_and_headers() {
        let sandbox = ScriptSandbox::new();
        let mut scripted = input();
        scripted.response = Some(response(r#"{"items": [1, 2, 3]}"#));

        let outcome = sandbox
            .run(
                r#"
                test('json body', function () {
                    expect(response.json().items).toHaveLength(3);
                });
                test('status and headers', function () {
                    expect(response.status).toBe(200);
                    expect(response.headers['content-type']).toBe('application/json');
                });
                "#,
                &scripted,
            )
            .unwrap();

        assert_eq!(outcome.failed, 0, "failures: {:?}", outcome.tests);
    }

    #[test]
    fn test_matchers() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                test('matchers', function () {
                    expect({a: [1, 2]}).toEqual({a: [1, 2]});
                    expect(5).toBeGreaterThan(4).toBeAtMost(5);
                    expect('waypost').toContain('post');
                    expect([1, 2]).toContain(2);
                    expect({name: 'x'}).toHaveProperty('name');
                    expect(null).toBeFalsy();
                    expect('text').toBeA('string');
                    expect([1]).toBeAn('array');
                    expect(3).not.toBe(4);
                    expect({a: 1}).not.toEqual({a: 2});
                });
                "#,
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.failed, 0, "failures: {:?}", outcome.tests);
    }

    #[test]
    fn test_schema_matcher() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run(
                r#"
                var schema = {type: 'object', required: ['id'], properties: {id: {type: 'number'}}};
                test('conforms', function () {
                    expect({id: 7}).toMatchSchema(schema);
                });
                test('does not conform', function () {
                    expect({id: 'seven'}).toMatchSchema(schema);
                });
                "#,
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.tests[1].error.as_deref().unwrap().contains("schema mismatch"));
    }

    #[test]
    fn test_infinite_loop_is_interrupted() {
        let sandbox = ScriptSandbox::with_limits(SandboxLimits {
            timeout_ms: 200,
            ..SandboxLimits::default()
        });
        let outcome = sandbox.run("while (true) {}", &input()).unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.tests[0].name, "Test script");
    }

    #[test]
    fn test_realms_do_not_share_state() {
        let sandbox = ScriptSandbox::new();
        sandbox.run("globalThis.leak = 'value';", &input()).unwrap();
        let outcome = sandbox
            .run(
                "test('no leak', function () { expect(typeof globalThis.leak).toBe('undefined'); });",
                &input(),
            )
            .unwrap();

        assert_eq!(outcome.failed, 0, "failures: {:?}", outcome.tests);
    }

    #[test]
    fn test_clobbered_readback_does_not_crash() {
        let sandbox = ScriptSandbox::new();
        let outcome = sandbox
            .run("globalThis.__wpFinish = 'gone';", &input())
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.tests[0].name, "Script results");
    }

    #[test]
    fn test_iteration_and_data_visible() {
        let sandbox = ScriptSandbox::new();
        let mut scripted = input();
        scripted.iteration = 2;
        let mut row = crate::models::DataRow::new();
        row.insert("user".to_string(), serde_json::json!("ada"));
        scripted.data = Some(row);

        let outcome = sandbox
            .run(
                r#"
                test('iteration data', function () {
                    expect(iteration).toBe(2);
                    expect(data.user).toBe('ada');
                });
                "#,
                &scripted,
            )
            .unwrap();

        assert_eq!(outcome.failed, 0, "failures: {:?}", outcome.tests);
    }
}
