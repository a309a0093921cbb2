//! Descriptor loading and static binding.

use std::path::Path;
use std::sync::Arc;

use ds_gateway::registry::{self, Args, Handler, Namespace, OpFuture, RegistryError, SymbolTable};
use serde_json::{json, Value};
use tempfile::TempDir;

fn constant(value: Value) -> Handler {
    Arc::new(move |_args: Args| -> OpFuture {
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    })
}

fn symbols() -> SymbolTable {
    SymbolTable::new().with(
        Namespace::new("datastage")
            .alias("utilidades.datastage")
            .symbol("get_jobs", constant(json!(["JOB_A"])))
            .symbol("get_projects", constant(json!(["P1", "P2"]))),
    )
}

fn write(dir: &Path, file: &str, body: &str) {
    std::fs::write(dir.join(file), body).unwrap();
}

fn descriptor(name: &str, target: &str) -> String {
    format!("name: {name}\ndescription: test operation {name}\nfunction: {target}\n")
}

// ── load ─────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_descriptor_is_skipped_and_reported() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yaml", &descriptor("list_jobs", "datastage.get_jobs"));
    write(dir.path(), "b.yaml", &descriptor("list_projects", "datastage.get_projects"));
    write(dir.path(), "c.yaml", "name: broken\ndescription: no function key\n");

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert_eq!(report.bindings.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], RegistryError::DescriptorParse { .. }));

    let list_jobs = report.bindings.iter().find(|b| b.name == "list_jobs").unwrap();
    assert_eq!(list_jobs.target, "datastage.get_jobs");
    assert_eq!((list_jobs.handler)(Args::new()).await.unwrap(), json!(["JOB_A"]));
}

#[test]
fn unknown_symbol_and_namespace_are_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yaml", &descriptor("ghost", "datastage.get_ghosts"));
    write(dir.path(), "b.yaml", &descriptor("elsewhere", "nowhere.get_jobs"));
    write(dir.path(), "c.yaml", &descriptor("undotted", "get_jobs"));

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert!(report.bindings.is_empty());
    assert_eq!(report.errors.len(), 3);
    for err in &report.errors {
        assert!(matches!(err, RegistryError::SymbolNotFound { .. }), "{err}");
    }
    assert!(report.errors[1].to_string().contains("unknown namespace `nowhere`"));
}

#[test]
fn non_descriptor_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "list_jobs.yaml", &descriptor("list_jobs", "datastage.get_jobs"));
    write(
        dir.path(),
        "list_projects.json",
        r#"{"name": "list_projects", "description": "projects", "function": "datastage.get_projects"}"#,
    );
    write(dir.path(), "README.md", "# not a descriptor");
    write(dir.path(), "notes.txt", "name: nope");
    std::fs::create_dir(dir.path().join("sub.yaml")).unwrap();

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert!(report.errors.is_empty());
    let mut names: Vec<_> = report.bindings.iter().map(|b| b.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["list_jobs", "list_projects"]);
}

#[test]
fn duplicate_names_keep_the_first_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "1_first.yaml", &descriptor("list_jobs", "datastage.get_jobs"));
    write(dir.path(), "2_second.yaml", &descriptor("list_jobs", "datastage.get_projects"));

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert_eq!(report.bindings.len(), 1);
    assert_eq!(report.bindings[0].target, "datastage.get_jobs");
    assert!(matches!(
        &report.errors[..],
        [RegistryError::DuplicateName { name, .. }] if name == "list_jobs"
    ));
}

#[test]
fn extra_keys_are_ignored_and_empty_fields_rejected() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "a.yaml",
        "name: list_jobs\ndescription: jobs\nfunction: datastage.get_jobs\nparameters:\n  project: string\n",
    );
    write(dir.path(), "b.yaml", "name: blank\ndescription: ''\nfunction: datastage.get_jobs\n");

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert_eq!(report.bindings.len(), 1);
    assert_eq!(report.bindings[0].name, "list_jobs");
    assert!(report.errors[0].to_string().contains("`description` must not be empty"));
}

#[test]
fn alias_namespace_resolves() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yaml", &descriptor("list_jobs", "utilidades.datastage.get_jobs"));

    let report = registry::load(dir.path(), &symbols()).unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.bindings.len(), 1);
}

#[test]
fn missing_directory_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = registry::load(&dir.path().join("absent"), &symbols()).unwrap_err();
    assert!(matches!(err, RegistryError::Directory { .. }));
}

#[test]
fn resolve_reports_known_namespaces() {
    let table = symbols();
    assert!(table.resolve("datastage.get_jobs").is_ok());
    let Err(reason) = table.resolve("sql.run") else {
        panic!("expected resolution failure");
    };
    assert!(reason.contains("datastage"));
    assert!(reason.contains("utilidades.datastage"));
}
