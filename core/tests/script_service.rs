mod common;

use std::sync::Arc;

use common::{FakeLauncher, FakeRun};
use opsbook_core::error::ScriptError;
use opsbook_core::runbook::ScriptRef;
use opsbook_core::runner::{CancelReason, CancelSignal, CancelSource};
use opsbook_core::script::{
    Profile, RunStatus, ScriptDefinition, ScriptService, StaticScriptCatalog, RUN_DIR_ENV,
    RUN_ID_ENV, PROFILE_ID_ENV, PROFILE_NAME_ENV,
};
use opsbook_core::store::{ExecutionStore, MemoryStore};
use pretty_assertions::assert_eq;

struct Fixture {
    service: ScriptService,
    store: Arc<MemoryStore>,
    launcher: Arc<FakeLauncher>,
    _runs: tempfile::TempDir,
}

fn fixture(scripts: Vec<ScriptDefinition>) -> Fixture {
    let launcher = FakeLauncher::new();
    let store = Arc::new(MemoryStore::new());
    let runs = tempfile::tempdir().unwrap();
    let service = ScriptService::new(
        Arc::new(StaticScriptCatalog::new(scripts)),
        launcher.clone(),
        store.clone() as Arc<dyn ExecutionStore>,
        runs.path(),
    );
    Fixture {
        service,
        store,
        launcher,
        _runs: runs,
    }
}

fn deploy_script() -> ScriptDefinition {
    ScriptDefinition::new("deploy", "/fake/deploy.sh")
        .with_profile(Profile {
            id: "staging".into(),
            name: "Staging".into(),
            args: "--env staging".into(),
            default: true,
            env: [("REGION".to_string(), "eu-west-1".to_string())]
                .into_iter()
                .collect(),
            ..Profile::default()
        })
        .with_profile(Profile {
            id: "prod".into(),
            name: "Production".into(),
            args: "--env prod".into(),
            working_dir: Some("/srv/prod".into()),
            env: [(PROFILE_NAME_ENV.to_string(), "overridden".to_string())]
                .into_iter()
                .collect(),
            ..Profile::default()
        })
}

fn script_ref(script: &str, profile: Option<&str>, args: Option<&str>) -> ScriptRef {
    ScriptRef {
        script: script.into(),
        profile: profile.map(str::to_string),
        args: args.map(str::to_string),
    }
}

#[tokio::test]
async fn default_profile_supplies_args_env_and_identity() {
    let f = fixture(vec![deploy_script()]);
    let summary = f
        .service
        .execute(&script_ref("deploy", None, None), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Succeeded);
    assert_eq!(summary.profile_id, "staging");
    assert_eq!(summary.args, "--env staging");
    assert_eq!(summary.exit_code, Some(0));
    assert_eq!(summary.failure_fingerprint, None);
    assert_eq!(summary.stdout_lines, 1);
    assert_eq!(summary.stdout_preview.as_deref(), Some("done"));

    let call = &f.launcher.calls_for("deploy")[0];
    assert_eq!(call.args, "--env staging");
    assert_eq!(call.env.get("REGION").map(String::as_str), Some("eu-west-1"));
    assert_eq!(call.env.get(RUN_ID_ENV), Some(&summary.run_id));
    assert_eq!(call.env.get(PROFILE_ID_ENV).map(String::as_str), Some("staging"));
    assert_eq!(
        call.env.get(RUN_DIR_ENV).map(std::path::PathBuf::from),
        Some(summary.run_dir.clone())
    );
    assert!(summary.run_dir.is_dir());
    // Script directory is the fallback working directory.
    assert_eq!(call.working_dir.as_deref(), Some(std::path::Path::new("/fake")));

    let stored = f.store.get_run(&summary.run_id).await.unwrap().unwrap();
    assert_eq!(stored, summary);
}

#[tokio::test]
async fn explicit_profile_and_arg_override() {
    let f = fixture(vec![deploy_script()]);
    let summary = f
        .service
        .execute(
            &script_ref("deploy", Some("prod"), Some("--dry-run")),
            CancelSignal::never(),
        )
        .await
        .unwrap();

    assert_eq!(summary.profile_id, "prod");
    assert_eq!(summary.args, "--dry-run");
    let call = &f.launcher.calls_for("deploy")[0];
    assert_eq!(call.working_dir.as_deref(), Some(std::path::Path::new("/srv/prod")));
    // Profile environment wins over identity variables.
    assert_eq!(
        call.env.get(PROFILE_NAME_ENV).map(String::as_str),
        Some("overridden")
    );
}

#[tokio::test]
async fn failed_run_gets_stable_fingerprint() {
    let f = fixture(vec![ScriptDefinition::new("job", "/fake/job.sh")]);
    f.launcher.plan(
        "job",
        vec![
            FakeRun::fail(
                1,
                3,
                "2024-01-05T10:00:00Z error connecting to 10.0.0.1\nat /home/alice/app.py:12:4",
            ),
            FakeRun::fail(
                1,
                3,
                "2024-02-17T23:59:59Z error connecting to 10.0.0.1\nat /home/bob/app.py:98:1",
            ),
        ],
    );

    let first = f
        .service
        .execute(&script_ref("job", None, None), CancelSignal::never())
        .await
        .unwrap();
    let second = f
        .service
        .execute(&script_ref("job", None, None), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.exit_code, Some(3));
    assert_eq!(first.stderr_lines, 2);
    assert_eq!(
        first.stderr_preview.as_deref(),
        Some("at /home/alice/app.py:12:4")
    );
    let fp = first.failure_fingerprint.clone().unwrap();
    assert_eq!(fp.len(), 64);
    assert_eq!(second.failure_fingerprint.as_deref(), Some(fp.as_str()));

    let grouped = f.store.runs_by_fingerprint(&fp).await.unwrap();
    assert_eq!(grouped.len(), 2);
}

#[tokio::test]
async fn artifacts_in_run_dir_are_recorded() {
    let f = fixture(vec![ScriptDefinition::new("report", "/fake/report.sh")]);
    f.launcher.plan(
        "report",
        vec![FakeRun::ok(1).with_artifact("report.json", "{\"ok\":true}")],
    );

    let summary = f
        .service
        .execute(&script_ref("report", None, None), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(summary.artifact_count, 1);
    let artifacts = f.store.artifacts_for_run(&summary.run_id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    let artifact = &artifacts[0];
    assert_eq!(artifact.media_type, "application/json");
    assert_eq!(artifact.size_bytes, 11);
    assert_eq!(artifact.sha256.len(), 64);
    assert!(artifact.path.ends_with("report.json"));
}

#[tokio::test]
async fn canceled_run_has_no_fingerprint() {
    let f = fixture(vec![ScriptDefinition::new("slow", "/fake/slow.sh")]);
    f.launcher
        .plan("slow", vec![FakeRun::fail(5_000, 1, "would fail")]);

    let source = CancelSource::new();
    let signal = source.signal();
    let canceler = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        source.cancel(CancelReason::Requested);
    });

    let summary = f
        .service
        .execute(&script_ref("slow", None, None), signal)
        .await
        .unwrap();
    canceler.await.unwrap();

    assert_eq!(summary.status, RunStatus::Canceled);
    assert_eq!(summary.exit_code, None);
    assert_eq!(summary.failure_fingerprint, None);
}

#[tokio::test]
async fn launch_failure_is_reported_as_error() {
    let f = fixture(vec![ScriptDefinition::new("bad", "/fake/bad.sh")]);
    f.launcher.plan("bad", vec![FakeRun::spawn_error()]);

    let err = f
        .service
        .execute(&script_ref("bad", None, None), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Launch(_)));
    assert!(err.to_string().contains("cannot start bad"));
    assert_eq!(f.launcher.calls().len(), 0);
}

#[tokio::test]
async fn unknown_script_is_rejected_without_a_run() {
    let f = fixture(Vec::new());
    let err = f
        .service
        .execute(&script_ref("ghost", None, None), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::UnknownScript(id) if id == "ghost"));
    assert!(f.launcher.calls().is_empty());
}
