//! Integration tests for the policy lifecycle.
//!
//! These tests drive a real `PolicyManager` with a scripted backend and a
//! recording ingestion client. Time-dependent tests run on tokio's paused
//! clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use policy_agent::Error;
use policy_agent::backend::{Backend, BackendRegistry, Entity, Metadata};
use policy_agent::config::{Policy, PolicyConfig, Scope, SinkConfig};
use policy_agent::ingest::{ClientIdentity, IngestClient, IngestClientFactory, IngestResponse};
use policy_agent::policy::{PolicyManager, RunnerContext, Status};

/// Backend whose behavior is picked by the policy's `mode` setting.
struct ScriptedBackend {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn setup(&self) -> policy_agent::Result<Metadata> {
        Ok(Metadata::new("scripted", "scripted-backend", "0.0.1"))
    }

    async fn run(&self, config: &PolicyConfig, scope: &Scope) -> policy_agent::Result<Vec<Entity>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match config.setting("mode").and_then(|mode| mode.as_str()) {
            Some("fail") => Err(Error::backend("target refused connection")),
            Some("fatal") => Err(Error::unrecoverable("driver not installed")),
            _ => Ok(scope
                .as_array()
                .map(|targets| targets.iter().cloned().map(Entity).collect())
                .unwrap_or_default()),
        }
    }
}

struct RecordingClient {
    errors: Vec<String>,
    batches: Arc<Mutex<Vec<Vec<Entity>>>>,
}

#[async_trait]
impl IngestClient for RecordingClient {
    async fn ingest(&self, entities: Vec<Entity>) -> policy_agent::Result<IngestResponse> {
        self.batches.lock().push(entities);
        Ok(IngestResponse {
            errors: self.errors.clone(),
        })
    }
}

struct RecordingFactory {
    errors: Vec<String>,
    batches: Arc<Mutex<Vec<Vec<Entity>>>>,
}

impl IngestClientFactory for RecordingFactory {
    fn create(
        &self,
        _sink: &SinkConfig,
        _identity: ClientIdentity,
    ) -> policy_agent::Result<Arc<dyn IngestClient>> {
        Ok(Arc::new(RecordingClient {
            errors: self.errors.clone(),
            batches: self.batches.clone(),
        }))
    }
}

struct Fixture {
    manager: PolicyManager,
    runs: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<Entity>>>>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_sink_errors(Vec::new())
    }

    fn with_sink_errors(errors: Vec<String>) -> Self {
        let runs = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));

        let mut backends = BackendRegistry::with_builtins();
        let backend_runs = runs.clone();
        backends.register("scripted", move || {
            Ok(Arc::new(ScriptedBackend {
                runs: backend_runs.clone(),
            }) as Arc<dyn Backend>)
        });

        let factory = Arc::new(RecordingFactory {
            errors,
            batches: batches.clone(),
        });
        let context = RunnerContext::new(
            SinkConfig::new("http://sink.local/ingest"),
            Arc::new(backends),
            factory,
        );

        Self {
            manager: PolicyManager::new(context),
            runs,
            batches,
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn ingest_calls(&self) -> usize {
        self.batches.lock().len()
    }
}

fn policy(schedule: Option<&str>) -> Policy {
    let mut config = PolicyConfig::new("scripted");
    if let Some(schedule) = schedule {
        config = config.with_schedule(schedule);
    }
    Policy::new(config, json!([{"host": "10.0.0.1"}]))
}

fn policy_with_mode(schedule: &str, mode: &str) -> Policy {
    let mut policy = policy(Some(schedule));
    policy.config = policy.config.with_setting("mode", json!(mode));
    policy
}

mod registry_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_name_conflicts_and_keeps_existing_runner() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("policy1", policy(Some("0 * * * *"))).unwrap();

        let err = fixture
            .manager
            .start_policy("policy1", policy(None))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(fixture.manager.len(), 1);
        assert_eq!(fixture.manager.policy_status("policy1"), Some(Status::Running));
        fixture.manager.stop();
    }

    #[tokio::test]
    async fn test_delete_unknown_policy_leaves_registry_unchanged() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("a", policy(Some("0 * * * *"))).unwrap();
        let before = fixture.manager.policy_names();

        let err = fixture.manager.delete_policy("b").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fixture.manager.policy_names(), before);
        fixture.manager.stop();
    }

    #[tokio::test]
    async fn test_schedule_validation() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("hourly", policy(Some("0 * * * *"))).unwrap();
        assert_eq!(fixture.manager.policy_status("hourly"), Some(Status::Running));

        let err = fixture
            .manager
            .start_policy("broken", policy(Some("not a cron")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
        assert!(!fixture.manager.policy_exists("broken"));
        fixture.manager.stop();
    }

    #[tokio::test]
    async fn test_end_to_end_register_and_delete() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("policy1", policy(Some("0 * * * *"))).unwrap();
        assert!(fixture.manager.policy_exists("policy1"));

        fixture.manager.delete_policy("policy1").unwrap();
        assert!(!fixture.manager.policy_exists("policy1"));
        assert!(fixture.manager.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back_request() {
        let fixture = Fixture::new();
        let body = br#"
policies:
  a_first:
    config:
      schedule: "0 * * * *"
      backend: scripted
    scope: []
  b_second:
    config:
      backend: unknown
    scope: []
"#;
        let request = fixture.manager.parse_policy(body).unwrap();
        let err = fixture.manager.start_policies(request).unwrap_err();

        assert!(matches!(err, Error::Resolution { .. }));
        assert!(fixture.manager.is_empty());
    }
}

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_starts_register_one_runner() {
        let fixture = Arc::new(Fixture::new());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let fixture = fixture.clone();
                tokio::spawn(async move {
                    fixture.manager.start_policy("p", policy(Some("0 * * * *")))
                })
            })
            .collect();

        let mut started = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => started += 1,
                Err(err) => assert!(matches!(err, Error::Conflict(_)), "{err}"),
            }
        }

        assert_eq!(started, 1);
        assert_eq!(fixture.manager.len(), 1);
        assert_eq!(fixture.manager.policy_status("p"), Some(Status::Running));
        fixture.manager.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_start_and_delete_keep_one_runner_per_name() {
        let fixture = Arc::new(Fixture::new());
        fixture.manager.start_policy("p", policy(Some("0 * * * *"))).unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let fixture = fixture.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        fixture.manager.delete_policy("p")
                    } else {
                        fixture.manager.start_policy("p", policy(Some("0 * * * *")))
                    }
                })
            })
            .collect();

        for task in tasks {
            if let Err(err) = task.await.unwrap() {
                assert!(
                    matches!(err, Error::Conflict(_) | Error::NotFound(_)),
                    "{err}"
                );
            }
        }

        assert!(fixture.manager.len() <= 1);
        if fixture.manager.policy_exists("p") {
            assert_eq!(fixture.manager.policy_status("p"), Some(Status::Running));
        }
        fixture.manager.stop();
        assert!(fixture.manager.is_empty());
    }
}

mod execution_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_policy_runs_exactly_once() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("once", policy(None)).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fixture.runs(), 0);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(fixture.runs(), 1);
        assert_eq!(fixture.batches.lock()[0], [Entity(json!({"host": "10.0.0.1"}))]);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fixture.runs(), 1);
        assert_eq!(fixture.ingest_calls(), 1);
        fixture.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_executions() {
        let fixture = Fixture::new();
        fixture.manager.start_policy("minutely", policy(Some("* * * * *"))).unwrap();

        tokio::time::sleep(Duration::from_secs(125)).await;
        let calls = fixture.ingest_calls();
        assert!(calls >= 1);

        fixture.manager.delete_policy("minutely").unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fixture.ingest_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_errors_do_not_stop_the_schedule() {
        let fixture = Fixture::new();
        fixture
            .manager
            .start_policy("flaky", policy_with_mode("* * * * *", "fail"))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert!(fixture.runs() >= 2, "ran {} times", fixture.runs());
        assert_eq!(fixture.ingest_calls(), 0);
        assert_eq!(fixture.manager.policy_status("flaky"), Some(Status::Running));
        fixture.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_error_fails_policy() {
        let fixture = Fixture::new();
        fixture
            .manager
            .start_policy("doomed", policy_with_mode("* * * * *", "fatal"))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(fixture.runs(), 1);
        assert_eq!(fixture.manager.policy_status("doomed"), Some(Status::Failed));

        // Deleting a failed policy still works and keeps it failed.
        fixture.manager.delete_policy("doomed").unwrap();
        assert!(!fixture.manager.policy_exists("doomed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_errors_keep_policy_running() {
        let fixture = Fixture::with_sink_errors(vec!["invalid entity".to_string()]);
        fixture.manager.start_policy("rejected", policy(None)).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fixture.ingest_calls(), 1);
        assert_eq!(fixture.manager.policy_status("rejected"), Some(Status::Running));
        fixture.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_policies_run_independently() {
        let fixture = Fixture::new();
        fixture
            .manager
            .start_policy("flaky", policy_with_mode("* * * * *", "fatal"))
            .unwrap();
        fixture.manager.start_policy("steady", policy(Some("* * * * *"))).unwrap();

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(fixture.manager.policy_status("flaky"), Some(Status::Failed));
        assert_eq!(fixture.manager.policy_status("steady"), Some(Status::Running));
        assert!(fixture.ingest_calls() >= 2);
        fixture.manager.stop();
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_env_placeholders_resolve() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("POLICY_AGENT_IT_TOKEN", "abc") };

        let fixture = Fixture::new();
        let body = br#"
policies:
  p:
    config:
      backend: scripted
      token: ${POLICY_AGENT_IT_TOKEN}
      missing: ${POLICY_AGENT_IT_UNSET_TOKEN}
    scope: ~
"#;
        let request = fixture.manager.parse_policy(body).unwrap();
        let config = &request.policies["p"].config;
        assert_eq!(config.setting("token"), Some(&json!("abc")));
        assert_eq!(
            config.setting("missing"),
            Some(&json!("${POLICY_AGENT_IT_UNSET_TOKEN}"))
        );
    }
}
