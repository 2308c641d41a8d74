#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autopsy_core::pod::PHASE_RUNNING;
use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, Pod};
use autopsy_operator::{DetectOutcome, DiagnosisController, FailureDetector, LifecycleSettings};
use autopsy_reasoning::{Diagnosis, Reasoner, ReasoningError};
use autopsy_store::MemoryStore;

type Hook = Box<dyn FnOnce() + Send>;

/// Reasoner that replays scripted results, then a fixed answer.
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<Diagnosis, ReasoningError>>>,
    fallback: Diagnosis,
    delay: Duration,
    hook: Mutex<Option<Hook>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub pod_name: String,
    pub trigger_reason: String,
    pub logs: String,
}

impl ScriptedReasoner {
    pub fn answering(root_cause: &str, suggestion: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Diagnosis {
                root_cause: root_cause.into(),
                suggestion: suggestion.into(),
            },
            delay: Duration::ZERO,
            hook: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, error: ReasoningError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `hook` inside the first call, before it answers.
    pub fn on_first_call(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn diagnose(
        &self,
        pod_name: &str,
        trigger_reason: &str,
        logs: &str,
    ) -> Result<Diagnosis, ReasoningError> {
        self.calls.lock().unwrap().push(Call {
            pod_name: pod_name.into(),
            trigger_reason: trigger_reason.into(),
            logs: logs.into(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub fn api_error(status: u16) -> ReasoningError {
    ReasoningError::Api {
        status,
        body: "upstream says no".into(),
    }
}

pub fn crash_looping_pod(name: &str) -> Pod {
    Pod::new("shop", name)
        .with_phase(PHASE_RUNNING)
        .with_waiting_container(name, "CrashLoopBackOff")
}

pub const SAMPLE_LOGS: &str = "starting cart service\nfatal error: runtime: out of memory\n";

/// A crash-looping pod with logs and a pending diagnosis created by the
/// detector. Returns the pod key and the diagnosis key.
pub async fn pending_diagnosis(store: &Arc<MemoryStore>) -> (ObjectKey, ObjectKey) {
    let pod = store.upsert_pod(crash_looping_pod("cart"));
    store.set_logs(&pod.key(), SAMPLE_LOGS);

    let outcome = FailureDetector::new(store.clone())
        .reconcile_pod(&pod.key())
        .await
        .unwrap();
    let DetectOutcome::Created { diagnosis } = outcome else {
        panic!("expected a new diagnosis, got {outcome:?}");
    };
    (pod.key(), ObjectKey::new("shop", diagnosis))
}

pub fn controller(
    store: &Arc<MemoryStore>,
    reasoner: &Arc<ScriptedReasoner>,
    settings: LifecycleSettings,
) -> DiagnosisController {
    DiagnosisController::new(
        store.clone(),
        store.clone(),
        store.clone(),
        reasoner.clone(),
        settings,
    )
}
