//! Script sandbox behavior through the executor: the test DSL, variable
//! scopes, console capture, and resource limits.
mod common;

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{env_scope, env_vars, executor, get};
use waypost::models::{ConsoleLevel, ScopeId, Variable};
use waypost::request::{ExecuteOptions, RequestExecutor};
use waypost::scripting::SandboxLimits;
use waypost::stores::{InMemoryHistory, InMemoryVariableStore, VariableStore};

async fn server_with_ok_json() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [1, 2, 3],
            "owner": {"name": "ada"}
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_matchers_over_a_live_response() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        test("body shape", function () {
            var body = response.json();
            expect(body).toHaveProperty("items");
            expect(body.items).toBeAn("array").toHaveLength(3).toContain(2);
            expect(body.owner.name).toBeA("string").not.toBe("grace");
        });
        test("status and timing", function () {
            expect(response.status).toBeAtLeast(200).toBeLessThan(300);
            expect(response.timeMs).toBeAtLeast(0);
        });
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();

    let tests = result.tests.unwrap();
    assert_eq!(tests.failed, 0, "failures: {:?}", tests.tests);
    assert_eq!(tests.passed, 2);
}

#[tokio::test]
async fn test_schema_matcher() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        test("matches the contract", function () {
            expect(response.json()).toMatchSchema({
                type: "object",
                required: ["items", "owner"],
                properties: {
                    items: {type: "array"},
                    owner: {type: "object", required: ["name"]}
                }
            });
        });
        test("rejects a wrong contract", function () {
            expect(response.json()).not.toMatchSchema({
                type: "object",
                required: ["missing_field"]
            });
        });
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();
    let tests = result.tests.unwrap();
    assert_eq!(tests.failed, 0, "failures: {:?}", tests.tests);
}

#[tokio::test]
async fn test_console_lines_captured_in_order() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        console.log("starting", 42);
        console.warn("watch out");
        console.error({"code": 7});
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();

    let console = result.tests.unwrap().console;
    assert_eq!(console.len(), 3);
    assert_eq!(console[0].level, ConsoleLevel::Log);
    assert_eq!(console[0].message, "starting 42");
    assert_eq!(console[1].level, ConsoleLevel::Warn);
    assert_eq!(console[2].level, ConsoleLevel::Error);
    assert_eq!(console[2].message, r#"{"code":7}"#);
}

#[tokio::test]
async fn test_throwing_script_becomes_a_phase_failure() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        test("ran before the throw", function () { expect(1).toBe(1); });
        throw new Error("kaput");
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();

    let tests = result.tests.as_ref().unwrap();
    // The completed test entry survives alongside the synthetic failure
    assert_eq!(tests.tests.len(), 2);
    assert!(tests.tests[0].passed);
    let failure = &tests.tests[1];
    assert_eq!(failure.name, "Test script");
    assert!(failure.error.as_deref().unwrap().contains("kaput"));
    assert!(!result.passed());
}

#[tokio::test]
async fn test_runaway_script_is_interrupted() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some("while (true) {}".to_string());

    let limits = SandboxLimits {
        timeout_ms: 200,
        ..SandboxLimits::default()
    };
    let exec = RequestExecutor::with_limits(
        env_vars(&[]),
        Arc::new(InMemoryHistory::new()),
        limits,
    )
    .unwrap();

    let started = Instant::now();
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();

    assert!(started.elapsed().as_secs() < 5);
    let tests = result.tests.unwrap();
    assert_eq!(tests.failed, 1);
    assert_eq!(tests.tests[0].name, "Test script");
}

#[tokio::test]
async fn test_set_and_unset_persist_to_the_store() {
    let server = server_with_ok_json().await;
    let vars = env_vars(&[("stale", "old"), ("keep", "yes")]);
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        environment.set("fresh", "new");
        environment.unset("stale");
        "#
        .to_string(),
    );

    let exec = executor(vars.clone(), Arc::new(InMemoryHistory::new()));
    exec.execute(&config, &ExecuteOptions::new().environment("env1"))
        .await
        .unwrap();

    let stored = vars.scope_variables(&env_scope()).await.unwrap();
    let keys: Vec<&str> = stored.iter().map(|v| v.key.as_str()).collect();
    assert!(keys.contains(&"fresh"));
    assert!(keys.contains(&"keep"));
    assert!(!keys.contains(&"stale"));
}

#[tokio::test]
async fn test_collection_scope_writes_stay_in_collection() {
    let server = server_with_ok_json().await;
    let collection_scope = ScopeId::Collection("c1".to_string());
    let vars = Arc::new(
        InMemoryVariableStore::new()
            .with_scope(env_scope(), vec![Variable::new("side", "env")])
            .with_scope(collection_scope.clone(), Vec::new()),
    );

    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(r#"collectionVariables.set("shared", "c-val");"#.to_string());

    let exec = executor(vars.clone(), Arc::new(InMemoryHistory::new()));
    exec.execute(
        &config,
        &ExecuteOptions::new().environment("env1").collection("c1"),
    )
    .await
    .unwrap();

    let collection_vars = vars.scope_variables(&collection_scope).await.unwrap();
    assert!(collection_vars
        .iter()
        .any(|v| v.key == "shared" && v.value == "c-val"));
    let environment_vars = vars.scope_variables(&env_scope()).await.unwrap();
    assert!(!environment_vars.iter().any(|v| v.key == "shared"));
}

#[tokio::test]
async fn test_updates_without_a_target_scope_are_dropped() {
    let server = server_with_ok_json().await;
    let vars = env_vars(&[]);
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(r#"environment.set("orphan", "x");"#.to_string());

    // No environment selected, so the write has nowhere to land
    let exec = executor(vars.clone(), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();

    assert!(result.passed());
    let stored = vars.scope_variables(&env_scope()).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_globals_are_read_only() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        test("globals expose no setter", function () {
            expect(typeof globals.set).toBe("undefined");
        });
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &ExecuteOptions::new()).await.unwrap();
    assert_eq!(result.tests.unwrap().failed, 0);
}

#[tokio::test]
async fn test_iteration_and_data_visible_to_scripts() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        test("iteration context", function () {
            expect(iteration).toBe(3);
            expect(data.city).toBe("lyon");
        });
        "#
        .to_string(),
    );

    let mut row = waypost::models::DataRow::new();
    row.insert("city".to_string(), json!("lyon"));
    let mut options = ExecuteOptions::new();
    options.data_row = Some(row);
    options.iteration = 3;

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec.execute(&config, &options).await.unwrap();
    let tests = result.tests.unwrap();
    assert_eq!(tests.failed, 0, "failures: {:?}", tests.tests);
}

#[tokio::test]
async fn test_reads_see_pending_writes_in_the_same_phase() {
    let server = server_with_ok_json().await;
    let mut config = get(format!("{}/data", server.uri()));
    config.test_script = Some(
        r#"
        environment.set("n", "1");
        test("read-your-writes", function () {
            expect(environment.get("n")).toBe("1");
            environment.unset("n");
            expect(environment.get("n")).toBe(undefined);
        });
        "#
        .to_string(),
    );

    let exec = executor(env_vars(&[]), Arc::new(InMemoryHistory::new()));
    let result = exec
        .execute(&config, &ExecuteOptions::new().environment("env1"))
        .await
        .unwrap();
    assert_eq!(result.tests.unwrap().failed, 0);
}
