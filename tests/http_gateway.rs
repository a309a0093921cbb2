//! The HTTP front end over a live listener.

use std::sync::Arc;

use async_trait::async_trait;
use ds_gateway::config::DataStageConfig;
use ds_gateway::datastage::DataStage;
use ds_gateway::exec::{ExecError, Executor};
use ds_gateway::gateway::{self, Gateway, HttpServer};
use ds_gateway::registry::{self, prompts::load_prompts};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Answers `-ljobs` with two jobs and fails everything else.
struct ScriptedExecutor;

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, argv: &[String]) -> Result<String, ExecError> {
        if argv.iter().any(|a| a == "-ljobs") {
            Ok("JOB_A\nJOB_B".into())
        } else {
            Err(ExecError::CommandFailed {
                exit_status: 1,
                command: ds_gateway::exec::display_command(argv),
                stdout: String::new(),
                stderr: "ERROR: Job does not exist".into(),
            })
        }
    }
}

fn build_gateway(dir: &TempDir) -> Gateway {
    let tools = dir.path().join("tools");
    let prompts = dir.path().join("prompts");
    std::fs::create_dir(&tools).unwrap();
    std::fs::create_dir(&prompts).unwrap();
    std::fs::write(
        tools.join("list_jobs.yaml"),
        "name: list_jobs\ndescription: List jobs\nfunction: datastage.get_jobs\n",
    )
    .unwrap();
    std::fs::write(
        tools.join("job_info.yaml"),
        "name: job_info\ndescription: Job info\nfunction: datastage.get_job_info\n",
    )
    .unwrap();
    std::fs::write(
        prompts.join("triage.yaml"),
        "name: triage\ndescription: Triage a failed job\ntemplate: look at {job}\n",
    )
    .unwrap();

    let config = DataStageConfig {
        domain: Some("svc:9443".into()),
        server: Some("ENGINE".into()),
        user: Some("etl".into()),
        password: Some("hunter2".into()),
        ..Default::default()
    };
    let ds = Arc::new(DataStage::new(config, Arc::new(ScriptedExecutor), None));

    let report = registry::load(&tools, &gateway::symbol_table(&ds)).unwrap();
    let mut gw = Gateway::new();
    gw.register_all(report.bindings);
    gw.set_prompts(load_prompts(&prompts).prompts);
    gw
}

async fn start(token: Option<&str>) -> (TempDir, HttpServer, CancellationToken, String) {
    let dir = TempDir::new().unwrap();
    let gw = Arc::new(build_gateway(&dir));
    let shutdown = CancellationToken::new();
    let server = gateway::start_http(
        "127.0.0.1:0".parse().unwrap(),
        gw,
        token.map(String::from),
        shutdown.clone(),
    )
    .await
    .unwrap();
    let base = format!("http://{}", server.addr);
    (dir, server, shutdown, base)
}

#[tokio::test]
async fn status_and_listing() {
    let (_dir, server, shutdown, base) = start(None).await;
    let client = reqwest::Client::new();

    let status: Value = client.get(format!("{base}/api/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["status"], "ok");
    assert_eq!(status["operations"], 2);

    let tools: Value = client.get(format!("{base}/api/tools")).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        tools,
        json!([
            {"name": "job_info", "description": "Job info"},
            {"name": "list_jobs", "description": "List jobs"}
        ])
    );

    let prompts: Value = client.get(format!("{base}/api/prompts")).send().await.unwrap().json().await.unwrap();
    assert_eq!(prompts[0]["name"], "triage");
    let prompt = client.get(format!("{base}/api/prompts/triage")).send().await.unwrap();
    assert_eq!(prompt.status(), 200);
    let missing = client.get(format!("{base}/api/prompts/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    drop(client);
    shutdown.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn invoke_returns_result_or_structured_error() {
    let (_dir, server, shutdown, base) = start(None).await;
    let client = reqwest::Client::new();

    let ok = client
        .post(format!("{base}/api/tools/list_jobs"))
        .json(&json!({"project": "P1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["result"], json!(["JOB_A", "JOB_B"]));

    let failed = client
        .post(format!("{base}/api/tools/job_info"))
        .json(&json!({"project": "P1", "job": "NOPE"}))
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), 502);
    let body: Value = failed.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "ExternalCommandError");
    assert_eq!(body["error"]["exit_status"], 1);
    assert_eq!(body["error"]["stderr"], "ERROR: Job does not exist");
    assert!(!body["error"]["command"].as_str().unwrap().contains("hunter2"));

    let missing = client
        .post(format!("{base}/api/tools/list_jobs"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    let bad_body = client
        .post(format!("{base}/api/tools/list_jobs"))
        .json(&json!(["P1"]))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_body.status(), 400);

    let unknown = client
        .post(format!("{base}/api/tools/drop_everything"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "UnknownOperation");

    drop(client);
    shutdown.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn bearer_token_is_enforced() {
    let (_dir, server, shutdown, base) = start(Some("s3cret")).await;
    let client = reqwest::Client::new();

    let anonymous = client.get(format!("{base}/api/tools")).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let wrong = client
        .get(format!("{base}/api/tools"))
        .bearer_auth("guess")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let authorised = client
        .get(format!("{base}/api/tools"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(authorised.status(), 200);

    drop(client);
    shutdown.cancel();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_rejected_before_invoking() {
    let (_dir, server, shutdown, base) = start(None).await;
    let client = reqwest::Client::new();

    let truncated = client
        .post(format!("{base}/api/tools/list_jobs"))
        .header("content-type", "application/json")
        .body(r#"{"project": "P1""#)
        .send()
        .await
        .unwrap();
    assert_eq!(truncated.status(), 400);
    let body: Value = truncated.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "InvalidArgument");
    assert!(body["error"].get("operation").is_none());

    // An empty body reaches the operation with no arguments.
    let empty = client
        .post(format!("{base}/api/tools/list_jobs"))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "MissingArgument");
    assert_eq!(body["error"]["operation"], "list_jobs");

    drop(client);
    shutdown.cancel();
    server.handle.await.unwrap();
}
