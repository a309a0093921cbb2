//! The `datastage` namespace: one async function per operation.
//!
//! Enumeration and structural queries are memoized through
//! [`DataStage::cached`]; anything with side effects (running a job,
//! exporting) or whose answer tracks run state (status, logs, reports,
//! runtime info) always reaches the client binary.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::{optional_str, optional_str_list, required_str, DataStage};
use crate::error::OpError;
use crate::registry::{Args, Handler, Namespace, OpFuture};
use crate::utils::non_empty_lines;

/// Report formats accepted by `dsjob -report`.
const REPORT_TYPES: &[&str] = &["BASIC", "DETAIL", "XML"];

/// Build the `datastage` namespace bound to `ds`.
pub fn namespace(ds: &Arc<DataStage>) -> Namespace {
    Namespace::new("datastage")
        .alias("utilidades.datastage")
        .symbol("dsjob_command", handler(ds, dsjob_command))
        .symbol("export_job_to_file", handler(ds, export_job_to_file))
        .symbol("dssearch_command", handler(ds, dssearch_command))
        .symbol("get_datastage_domain", handler(ds, get_datastage_domain))
        .symbol("get_datastage_server", handler(ds, get_datastage_server))
        .symbol("get_projects", handler(ds, get_projects))
        .symbol("get_jobs", handler(ds, get_jobs))
        .symbol("get_jobs_with_status", handler(ds, get_jobs_with_status))
        .symbol("get_stages", handler(ds, get_stages))
        .symbol("get_links", handler(ds, get_links))
        .symbol("get_params", handler(ds, get_params))
        .symbol("get_invocations", handler(ds, get_invocations))
        .symbol("get_queues", handler(ds, get_queues))
        .symbol("get_job_info", handler(ds, get_job_info))
        .symbol("get_stage_info", handler(ds, get_stage_info))
        .symbol("get_link_info", handler(ds, get_link_info))
        .symbol("get_parameter_info", handler(ds, get_parameter_info))
        .symbol("get_log_job", handler(ds, get_log_job))
        .symbol("get_report_job", handler(ds, get_report_job))
        .symbol("get_jobs_uses", handler(ds, get_jobs_uses))
}

fn handler<F, Fut>(ds: &Arc<DataStage>, op: F) -> Handler
where
    F: Fn(Arc<DataStage>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, OpError>> + Send + 'static,
{
    let ds = Arc::clone(ds);
    Arc::new(move |args: Args| -> OpFuture { Box::pin(op(Arc::clone(&ds), args)) })
}

// ── Output shaping ──────────────────────────────────────────

async fn run_list(ds: &DataStage, argv: Vec<String>) -> Result<Value, OpError> {
    let out = ds.run(argv).await?;
    Ok(json!(non_empty_lines(&out)))
}

async fn run_text(ds: &DataStage, argv: Vec<String>) -> Result<Value, OpError> {
    Ok(Value::String(ds.run(argv).await?))
}

// ── Side-effecting operations ───────────────────────────────

/// `dsjob -<command> [args...] <project> <job>`.
///
/// Extra `args` are placed before the project, where `dsjob` expects its
/// per-command options (`-run -param X=1 -wait P J`).
pub async fn dsjob_command(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let job = required_str(&args, "job_name")?;
    let command = required_str(&args, "command")?;
    let project = ds.project(&args)?;
    let extra = optional_str_list(&args, "args")?;

    let command = command.trim_start_matches('-');
    if command.is_empty() || !command.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(OpError::invalid(
            "command",
            "expected a dsjob selector such as `run`, `stop` or `jobinfo`",
        ));
    }
    let selector = format!("-{}", command.to_ascii_lowercase());

    let mut options: Vec<&str> = vec![selector.as_str()];
    options.extend(extra.iter().map(String::as_str));
    let argv = ds.dsjob_argv(&options, &[project.as_str(), job.as_str()])?;
    run_text(&ds, argv).await
}

/// Export one job (without dependents) to a `.dsx` file.
pub async fn export_job_to_file(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let job = required_str(&args, "object_name")?;
    let output_file = required_str(&args, "output_file")?;
    let project = ds.project(&args)?;

    let argv = ds.dsexport_argv(&project, &job, &output_file)?;
    let out = ds.run(argv).await?;
    Ok(json!({
        "message": format!("Successfully exported JOB {job} to {output_file}"),
        "project": project,
        "job": job,
        "output_file": output_file,
        "output": out,
    }))
}

// ── Search ──────────────────────────────────────────────────

/// Best-effort object search: lists the project's jobs and keeps those
/// whose name contains `search_string` (case-insensitive).  Only jobs
/// are enumerated, so every hit has type `JOB`.
pub async fn dssearch_command(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let needle = required_str(&args, "search_string")?;
    let project = ds.project(&args)?;
    let object_type = optional_str(&args, "object_type")?;

    let argv = ds.dsjob_argv(&["-ljobs"], &[project.as_str()])?;
    let type_key = object_type.clone().unwrap_or_default();
    ds.cached(
        "dssearch_command",
        &[project.as_str(), needle.as_str(), type_key.as_str()],
        || search(&ds, argv, &needle, object_type.as_deref()),
    )
    .await
}

async fn search(
    ds: &DataStage,
    argv: Vec<String>,
    needle: &str,
    object_type: Option<&str>,
) -> Result<Value, OpError> {
    let out = ds.run(argv).await?;
    Ok(Value::Array(filter_jobs(&non_empty_lines(&out), needle, object_type)))
}

/// Substring match over job names, optionally narrowed by object type.
pub fn filter_jobs(jobs: &[String], needle: &str, object_type: Option<&str>) -> Vec<Value> {
    let needle = needle.to_lowercase();
    jobs.iter()
        .filter(|job| job.to_lowercase().contains(&needle))
        .map(|job| json!({ "type": "JOB", "name": job }))
        .filter(|hit| {
            object_type.map_or(true, |t| {
                hit["type"].as_str().is_some_and(|ty| ty.eq_ignore_ascii_case(t))
            })
        })
        .collect()
}

// ── Configuration echoes ────────────────────────────────────

pub async fn get_datastage_domain(ds: Arc<DataStage>, _args: Args) -> Result<Value, OpError> {
    Ok(Value::String(ds.domain()?.to_string()))
}

pub async fn get_datastage_server(ds: Arc<DataStage>, _args: Args) -> Result<Value, OpError> {
    Ok(Value::String(ds.server()?.to_string()))
}

// ── Enumerations ────────────────────────────────────────────

pub async fn get_projects(ds: Arc<DataStage>, _args: Args) -> Result<Value, OpError> {
    let argv = ds.dsjob_argv(&["-lprojects"], &[])?;
    ds.cached("get_projects", &[], || run_list(&ds, argv)).await
}

pub async fn get_jobs(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let argv = ds.dsjob_argv(&["-ljobs"], &[project.as_str()])?;
    ds.cached("get_jobs", &[project.as_str()], || run_list(&ds, argv)).await
}

/// Jobs filtered by run status; not cached since status follows runs.
pub async fn get_jobs_with_status(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let status = required_str(&args, "status")?;
    let argv = ds.dsjob_argv(&["-ljobs", "-status", status.as_str()], &[project.as_str()])?;
    run_list(&ds, argv).await
}

pub async fn get_stages(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let targets = [project.as_str(), job.as_str()];
    let argv = ds.dsjob_argv(&["-lstages"], &targets)?;
    ds.cached("get_stages", &targets, || run_list(&ds, argv)).await
}

pub async fn get_links(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let stage = required_str(&args, "stage")?;
    let targets = [project.as_str(), job.as_str(), stage.as_str()];
    let argv = ds.dsjob_argv(&["-llinks"], &targets)?;
    ds.cached("get_links", &targets, || run_list(&ds, argv)).await
}

pub async fn get_params(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let targets = [project.as_str(), job.as_str()];
    let argv = ds.dsjob_argv(&["-lparams"], &targets)?;
    ds.cached("get_params", &targets, || run_list(&ds, argv)).await
}

pub async fn get_invocations(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let argv = ds.dsjob_argv(&["-linvocations"], &[project.as_str(), job.as_str()])?;
    run_list(&ds, argv).await
}

pub async fn get_queues(ds: Arc<DataStage>, _args: Args) -> Result<Value, OpError> {
    let argv = ds.dsjob_argv(&["-lqueues"], &[])?;
    ds.cached("get_queues", &[], || run_list(&ds, argv)).await
}

/// Jobs that use `job`, via the `dssearch` client.
pub async fn get_jobs_uses(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let targets = [project.as_str(), job.as_str()];
    let argv = ds.dssearch_argv(&["-ljobs", "-uses"], &targets)?;
    ds.cached("get_jobs_uses", &targets, || run_list(&ds, argv)).await
}

// ── Detail queries ──────────────────────────────────────────

pub async fn get_job_info(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let argv = ds.dsjob_argv(&["-jobinfo"], &[project.as_str(), job.as_str()])?;
    run_text(&ds, argv).await
}

pub async fn get_stage_info(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let stage = required_str(&args, "stage")?;
    let argv = ds.dsjob_argv(&["-stageinfo"], &[project.as_str(), job.as_str(), stage.as_str()])?;
    run_text(&ds, argv).await
}

pub async fn get_link_info(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let stage = required_str(&args, "stage")?;
    let link = required_str(&args, "link")?;
    let argv = ds.dsjob_argv(
        &["-linkinfo"],
        &[project.as_str(), job.as_str(), stage.as_str(), link.as_str()],
    )?;
    run_text(&ds, argv).await
}

pub async fn get_parameter_info(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let param = required_str(&args, "param")?;
    let targets = [project.as_str(), job.as_str(), param.as_str()];
    let argv = ds.dsjob_argv(&["-paraminfo"], &targets)?;
    ds.cached("get_parameter_info", &targets, || run_text(&ds, argv)).await
}

pub async fn get_log_job(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let argv = ds.dsjob_argv(&["-logsum"], &[project.as_str(), job.as_str()])?;
    run_text(&ds, argv).await
}

/// `dsjob -report <project> <job> [BASIC|DETAIL|XML]`, default `BASIC`.
pub async fn get_report_job(ds: Arc<DataStage>, args: Args) -> Result<Value, OpError> {
    let project = ds.project(&args)?;
    let job = required_str(&args, "job")?;
    let report_type = optional_str(&args, "report_type")?
        .map(|t| t.to_ascii_uppercase())
        .unwrap_or_else(|| "BASIC".into());
    if !REPORT_TYPES.contains(&report_type.as_str()) {
        return Err(OpError::invalid(
            "report_type",
            format!("expected one of {}", REPORT_TYPES.join(", ")),
        ));
    }
    let argv = ds.dsjob_argv(&["-report"], &[project.as_str(), job.as_str(), report_type.as_str()])?;
    run_text(&ds, argv).await
}
