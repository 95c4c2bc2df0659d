//! Supervision tests driven by in-memory workers and paused time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, sleep};

use super::test_support::{FakeLauncher, FakeWorker, Launch, healthy_answers};
use super::*;
use crate::context::Severity;
use crate::manifest::validate;

fn acme_manifest() -> PackageManifest {
    validate(&json!({
        "name": "acme-db",
        "version": "2.1.0",
        "displayName": "Acme DB",
        "author": "acme",
        "license": "commercial",
        "capabilities": {"network": ["api.acme.io"]},
        "checkers": [{"name": "slow-queries", "file": "slow.js", "type": "performance"}]
    }))
    .expect("valid manifest")
}

/// Settings whose health checks never fire within a test.
fn quiet_settings() -> WorkerSettings {
    WorkerSettings {
        health_interval: Duration::from_secs(3600),
        ..WorkerSettings::default()
    }
}

async fn spawn_with(launcher: &Arc<FakeLauncher>, settings: WorkerSettings) -> WorkerSupervisor {
    WorkerSupervisor::spawn(
        acme_manifest(),
        "/opt/fleet/packages/acme-db",
        settings,
        Arc::clone(launcher) as Arc<dyn WorkerLauncher>,
    )
    .await
    .expect("worker starts")
}

async fn next_worker(workers: &mut UnboundedReceiver<FakeWorker>) -> FakeWorker {
    workers.recv().await.expect("worker launched")
}

fn send_in_background(
    supervisor: &WorkerSupervisor,
    method: WorkerMethod,
) -> JoinHandle<Result<Value, WorkerError>> {
    let handle = supervisor.clone();
    tokio::spawn(async move { handle.send(method, json!({})).await })
}

/// Lets spawned tasks run until `supervisor` reaches `state`.
async fn settle_into(supervisor: &WorkerSupervisor, state: WorkerState) {
    for _ in 0..100 {
        if supervisor.state() == state {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("worker stuck in {}, expected {state}", supervisor.state());
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn spawn_waits_for_readiness_and_describes_the_package() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;

    assert_eq!(supervisor.state(), WorkerState::Ready);
    assert!(supervisor.is_running());
    let worker = next_worker(&mut workers).await;
    assert_eq!(worker.spec.package, "acme-db");
    assert_eq!(
        worker.spec.program,
        Path::new("/opt/fleet/packages/acme-db/worker")
    );
    assert_eq!(worker.spec.capabilities, r#"{"network":["api.acme.io"]}"#);
    assert_eq!(worker.spec.memory_limit_mb, Some(512));
}

#[tokio::test(start_paused = true)]
async fn silent_worker_times_out_at_startup_and_is_killed() {
    let (launcher, _workers) = FakeLauncher::new(Vec::new(), Launch::Silent);
    let started = Instant::now();

    let error = WorkerSupervisor::spawn(
        acme_manifest(),
        "/opt/fleet/packages/acme-db",
        quiet_settings(),
        Arc::clone(&launcher) as Arc<dyn WorkerLauncher>,
    )
    .await
    .expect_err("startup times out");

    assert!(
        matches!(error, WorkerError::StartupTimeout { timeout, .. } if timeout == Duration::from_secs(10)),
        "{error}"
    );
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(launcher.kills(), 1);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_reported() {
    let (launcher, _workers) = FakeLauncher::new(Vec::new(), Launch::Fail);
    let supervisor = WorkerSupervisor::new(
        acme_manifest(),
        "/opt/fleet/packages/acme-db",
        quiet_settings(),
        Arc::clone(&launcher) as Arc<dyn WorkerLauncher>,
    );

    let error = supervisor.start().await.expect_err("spawn fails");
    assert!(matches!(error, WorkerError::SpawnFailed { .. }), "{error}");
    assert_eq!(supervisor.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn requests_are_refused_before_start() {
    let (launcher, _workers) = FakeLauncher::ready();
    let supervisor = WorkerSupervisor::new(
        acme_manifest(),
        "/opt/fleet/packages/acme-db",
        quiet_settings(),
        Arc::clone(&launcher) as Arc<dyn WorkerLauncher>,
    );

    let error = supervisor
        .send(WorkerMethod::Health, json!({}))
        .await
        .expect_err("not running");
    assert!(matches!(error, WorkerError::NotRunning { .. }), "{error}");
    assert_eq!(supervisor.state(), WorkerState::Unstarted);
    assert_eq!(launcher.launches(), 0);
}

// ---------------------------------------------------------------------------
// Request correlation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn analyze_round_trips_context_and_results() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let mut worker = next_worker(&mut workers).await;

    let mut context = PackageCheckerContext::new("vm-1");
    context.settings.insert(String::from("threshold"), json!(75));
    let call = tokio::spawn({
        let handle = supervisor.clone();
        async move { handle.analyze(&context, Some("slow-queries")).await }
    });

    let request = worker.next_request().await.expect("analyze request");
    assert_eq!(request.method, "analyze");
    assert_eq!(request.params["vmId"], "vm-1");
    assert_eq!(request.params["checker"], "slow-queries");
    assert_eq!(request.params["context"]["settings"]["threshold"], 75);
    worker
        .reply(
            request.id,
            json!({"recommendations": [{
                "type": "performance",
                "text": "12 slow queries",
                "action": "add an index",
                "severity": "medium"
            }]}),
        )
        .await;

    let results = call.await.expect("join").expect("analyze succeeds");
    assert_eq!(results.len(), 1);
    assert_eq!(results.first().map(|r| r.severity), Some(Severity::Medium));
    assert_eq!(supervisor.stats().request_count, 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_responses_resolve_a_request_once() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let mut worker = next_worker(&mut workers).await;

    let call = send_in_background(&supervisor, WorkerMethod::Health);
    let request = worker.next_request().await.expect("request");
    worker.reply(request.id, json!({"healthy": true})).await;
    worker.reply(request.id, json!({"healthy": false})).await;
    assert_eq!(
        call.await.expect("join").expect("resolved"),
        json!({"healthy": true})
    );

    // A later request gets its own id and its own answer.
    let follow_up = send_in_background(&supervisor, WorkerMethod::Health);
    let next = worker.next_request().await.expect("second request");
    assert_eq!(next.id, request.id + 1);
    worker.reply(next.id, json!({"healthy": true})).await;
    assert!(follow_up.await.expect("join").is_ok());

    assert!(supervisor.inner.pending().is_empty());
    assert_eq!(supervisor.stats().error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_after_timeout_is_dropped() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let mut worker = next_worker(&mut workers).await;
    let started = Instant::now();

    let call = send_in_background(&supervisor, WorkerMethod::Analyze);
    let request = worker.next_request().await.expect("request");
    let error = call.await.expect("join").expect_err("times out");

    assert!(
        matches!(
            &error,
            WorkerError::RequestTimeout { request_id, method, .. }
                if *request_id == request.id && method == "analyze"
        ),
        "{error}"
    );
    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert!(supervisor.inner.pending().is_empty());

    sleep(Duration::from_secs(10)).await;
    worker
        .reply(request.id, json!({"recommendations": []}))
        .await;

    let check = send_in_background(&supervisor, WorkerMethod::Health);
    let next = worker.next_request().await.expect("health request");
    worker.reply(next.id, json!({"healthy": true})).await;
    assert_eq!(
        check.await.expect("join").expect("worker still serves"),
        json!({"healthy": true})
    );
    assert_eq!(supervisor.state(), WorkerState::Ready);
    assert_eq!(supervisor.stats().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn noise_on_stdout_does_not_disturb_requests() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let mut worker = next_worker(&mut workers).await;

    worker.write_raw("starting cache warm-up").await;
    worker
        .write_raw(r#"{"jsonrpc":"2.0","id":999,"result":1}"#)
        .await;
    worker.write_raw(r#"{"jsonrpc":"2.0","result":1}"#).await;

    let call = send_in_background(&supervisor, WorkerMethod::Configure);
    let request = worker.next_request().await.expect("request");
    worker
        .write_raw(&format!(
            r#"{{"jsonrpc":"2.0","id":{},"error":{{"code":-32602,"message":"bad settings"}}}}"#,
            request.id
        ))
        .await;

    let error = call.await.expect("join").expect_err("remote error");
    assert!(
        matches!(&error, WorkerError::Remote { code: -32602, message, .. } if message == "bad settings"),
        "{error}"
    );
    assert_eq!(supervisor.state(), WorkerState::Ready);
}

// ---------------------------------------------------------------------------
// Crashes and restarts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn exit_rejects_every_outstanding_request() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let mut worker = next_worker(&mut workers).await;

    let calls: Vec<_> = (0..3)
        .map(|_| send_in_background(&supervisor, WorkerMethod::Health))
        .collect();
    for _ in 0..3 {
        worker.next_request().await.expect("request");
    }
    assert_eq!(supervisor.inner.pending().len(), 3);

    worker.exit(Some(1));
    for call in calls {
        let error = call.await.expect("join").expect_err("rejected");
        assert!(
            matches!(error, WorkerError::UnexpectedExit { status: Some(1), .. }),
            "{error}"
        );
    }
    assert!(supervisor.inner.pending().is_empty());
    assert_eq!(supervisor.state(), WorkerState::Unstarted);

    sleep(Duration::from_millis(999)).await;
    assert_eq!(launcher.launches(), 1);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(launcher.launches(), 2);
    settle_into(&supervisor, WorkerState::Ready).await;

    sleep(Duration::from_secs(60)).await;
    assert_eq!(launcher.launches(), 2);
    assert_eq!(supervisor.stats().restart_count, 1);
}

#[tokio::test(start_paused = true)]
async fn restart_backoff_grows_until_the_budget_is_spent() {
    let (launcher, mut workers) = FakeLauncher::new(vec![Launch::Ready], Launch::Silent);
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let worker = next_worker(&mut workers).await;

    let crashed_at = Instant::now();
    worker.exit(None);
    sleep(Duration::from_secs(120)).await;

    assert_eq!(supervisor.state(), WorkerState::Stopped);
    assert_eq!(supervisor.stats().restart_count, 3);
    let times = launcher.launch_times();
    let [_, first, second, third] = times.as_slice() else {
        panic!("expected four launches, got {}", times.len());
    };
    let startup = Duration::from_secs(10);
    let backoff = [
        first.duration_since(crashed_at),
        second.duration_since(*first) - startup,
        third.duration_since(*second) - startup,
    ];
    assert_eq!(
        backoff,
        [
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn crash_without_auto_restart_stops_the_worker() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let settings = WorkerSettings {
        auto_restart: false,
        ..quiet_settings()
    };
    let supervisor = spawn_with(&launcher, settings).await;
    let worker = next_worker(&mut workers).await;

    worker.exit(Some(2));
    sleep(Duration::from_secs(30)).await;

    assert_eq!(supervisor.state(), WorkerState::Stopped);
    assert_eq!(launcher.launches(), 1);
    assert_eq!(supervisor.ended().await, WorkerEnd::Failed);
}

#[tokio::test(start_paused = true)]
async fn forced_restart_goes_through_the_crash_path() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let _first = next_worker(&mut workers).await;

    supervisor.force_restart();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(launcher.kills(), 1);
    assert_eq!(launcher.launches(), 2);
    settle_into(&supervisor, WorkerState::Ready).await;
    assert_eq!(supervisor.stats().restart_count, 1);
}

// ---------------------------------------------------------------------------
// Health polling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn consecutive_health_failures_force_one_restart() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, WorkerSettings::default()).await;
    let worker = next_worker(&mut workers).await;
    let _serving = worker.serve(|request| match WorkerMethod::parse(&request.method) {
        Some(WorkerMethod::Health) => Some(json!({"healthy": false})),
        _ => healthy_answers(request),
    });

    sleep(Duration::from_secs(89)).await;
    assert_eq!(supervisor.state(), WorkerState::Degraded);
    assert_eq!(supervisor.stats().health_failures, 2);
    assert_eq!(launcher.kills(), 0);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(launcher.kills(), 1);
    assert_eq!(launcher.launches(), 2);
    settle_into(&supervisor, WorkerState::Ready).await;
    assert_eq!(supervisor.stats().health_failures, 0);
    assert_eq!(supervisor.stats().restart_count, 1);
}

#[tokio::test(start_paused = true)]
async fn a_healthy_check_resets_the_failure_count() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, WorkerSettings::default()).await;
    let worker = next_worker(&mut workers).await;
    let mut verdicts = [false, false, true, false, false, true].into_iter();
    let _serving = worker.serve(move |request| match WorkerMethod::parse(&request.method) {
        Some(WorkerMethod::Health) => Some(json!({"healthy": verdicts.next().unwrap_or(true)})),
        _ => healthy_answers(request),
    });

    sleep(Duration::from_secs(155)).await;
    assert_eq!(supervisor.state(), WorkerState::Degraded);
    assert_eq!(supervisor.stats().health_failures, 2);
    assert_eq!(launcher.kills(), 0);
    assert_eq!(launcher.launches(), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(supervisor.state(), WorkerState::Ready);
    assert_eq!(supervisor.stats().health_failures, 0);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn graceful_shutdown_lets_the_worker_exit() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let serving = next_worker(&mut workers).await.serve(healthy_answers);

    supervisor.shutdown().await;

    assert_eq!(supervisor.state(), WorkerState::Stopped);
    assert_eq!(supervisor.ended().await, WorkerEnd::ShutdownRequested);
    assert_eq!(launcher.kills(), 0);
    serving.await.expect("worker task");
    sleep(Duration::from_secs(30)).await;
    assert_eq!(launcher.launches(), 1);
    let error = supervisor
        .send(WorkerMethod::Health, json!({}))
        .await
        .expect_err("stopped");
    assert!(matches!(error, WorkerError::NotRunning { .. }), "{error}");
}

#[tokio::test(start_paused = true)]
async fn unresponsive_worker_is_killed_after_the_grace_period() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let _ignored = next_worker(&mut workers).await;
    let started = Instant::now();

    supervisor.shutdown().await;

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(supervisor.state(), WorkerState::Stopped);
    assert_eq!(launcher.kills(), 1);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_after_shutdown_launches_a_fresh_session() {
    let (launcher, mut workers) = FakeLauncher::ready();
    let supervisor = spawn_with(&launcher, quiet_settings()).await;
    let _first = next_worker(&mut workers).await.serve(healthy_answers);
    supervisor.shutdown().await;

    supervisor.start().await.expect("restart after shutdown");

    assert_eq!(supervisor.state(), WorkerState::Ready);
    assert_eq!(launcher.launches(), 2);
}
