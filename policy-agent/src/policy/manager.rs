//! Policy registry.
//!
//! The `PolicyManager` owns every registered [`PolicyRunner`]:
//! - Keys runners by sanitized policy name, one runner per name
//! - Registers a policy atomically (conflict check, setup, insert)
//! - Stops runners on deletion and on shutdown

use std::collections::HashMap;

use cron_scheduler::SchedulerStats;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::runner::{PolicyRunner, RunnerContext, sanitize_name};
use super::status::Status;
use crate::config::{self, Policy, PolicyRequest};
use crate::error::{Error, Result};

/// Registry of running policies.
pub struct PolicyManager {
    context: RunnerContext,
    runners: Mutex<HashMap<String, PolicyRunner>>,
}

impl PolicyManager {
    pub fn new(context: RunnerContext) -> Self {
        Self {
            context,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Set up and register one policy.
    ///
    /// Fails with [`Error::Conflict`] if the name is taken; the existing
    /// runner is left untouched. Setup errors propagate and nothing is
    /// registered.
    pub fn start_policy(&self, name: &str, policy: Policy) -> Result<()> {
        // Held across setup so two requests cannot register the same name.
        let mut runners = self.runners.lock();
        let name = self.start_locked(&mut runners, name, policy)?;

        info!(policy = %name, "policy started");
        Ok(())
    }

    /// Start every policy of a request, in name order.
    ///
    /// The registry stays locked for the whole batch. On the first failure
    /// the policies started by this call are removed and stopped, and the
    /// error is returned. Returns the started names.
    pub fn start_policies(&self, request: PolicyRequest) -> Result<Vec<String>> {
        if request.is_empty() {
            return Err(Error::config("no policies found in request"));
        }

        let mut runners = self.runners.lock();
        let mut started: Vec<String> = Vec::with_capacity(request.policies.len());
        for (name, policy) in request.policies {
            match self.start_locked(&mut runners, &name, policy) {
                Ok(name) => started.push(name),
                Err(err) => {
                    let rolled_back: Vec<PolicyRunner> = started
                        .iter()
                        .filter_map(|name| runners.remove(name))
                        .collect();
                    drop(runners);

                    for runner in rolled_back {
                        warn!(policy = %runner.name(), "rolling back policy");
                        runner.stop();
                    }
                    return Err(err);
                }
            }
        }
        drop(runners);

        info!(policies = ?started, "policies started");
        Ok(started)
    }

    /// Conflict check, setup and insert under an already held lock.
    /// Returns the sanitized name.
    fn start_locked(
        &self,
        runners: &mut HashMap<String, PolicyRunner>,
        name: &str,
        policy: Policy,
    ) -> Result<String> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(Error::config("policy name must not be empty"));
        }
        if runners.contains_key(&name) {
            return Err(Error::Conflict(name));
        }

        let mut runner = PolicyRunner::new();
        runner.setup(&name, &self.context, policy.config, policy.scope)?;
        runners.insert(name.clone(), runner);
        Ok(name)
    }

    /// Remove a policy and stop its runner.
    pub fn delete_policy(&self, name: &str) -> Result<()> {
        let name = sanitize_name(name);
        let runner = self
            .runners
            .lock()
            .remove(&name)
            .ok_or_else(|| Error::NotFound(name.clone()))?;

        runner.stop();
        info!(policy = %name, "policy deleted");
        Ok(())
    }

    pub fn policy_exists(&self, name: &str) -> bool {
        self.runners.lock().contains_key(&sanitize_name(name))
    }

    pub fn policy_status(&self, name: &str) -> Option<Status> {
        self.runners
            .lock()
            .get(&sanitize_name(name))
            .map(PolicyRunner::status)
    }

    /// Execution counters of a policy's scheduler.
    pub fn policy_stats(&self, name: &str) -> Option<SchedulerStats> {
        self.runners
            .lock()
            .get(&sanitize_name(name))
            .and_then(PolicyRunner::stats)
    }

    /// Registered policy names, sorted.
    pub fn policy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runners.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.runners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.lock().is_empty()
    }

    /// Stop every runner and empty the registry.
    pub fn stop(&self) {
        let runners: Vec<(String, PolicyRunner)> = self.runners.lock().drain().collect();
        if runners.is_empty() {
            return;
        }

        info!(count = runners.len(), "stopping policies");
        for (_, runner) in runners {
            runner.stop();
        }
    }

    /// Parse a YAML policy submission.
    pub fn parse_policy(&self, body: &[u8]) -> Result<PolicyRequest> {
        config::parse_policy_request(body)
    }

    /// Identifiers of the backends policies can use.
    pub fn capabilities(&self) -> Vec<String> {
        self.context.backends.identifiers()
    }

    pub fn context(&self) -> &RunnerContext {
        &self.context
    }
}

impl std::fmt::Debug for PolicyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyManager")
            .field("policies", &self.policy_names())
            .finish_non_exhaustive()
    }
}
