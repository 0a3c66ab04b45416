use std::sync::Arc;

use classpilot_server::{
    AssistError, AssistProvider, CompletedJob, DocumentKind, FormContext, JobPoll,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::prompts::{self, SYSTEM_INSTRUCTION};
use crate::render;
use crate::services::completion::CompletionClient;
use crate::services::jobs::{JobOutcome, JobTracker};

/// Bridges the HTTP layer to prompt building, background generation and
/// rendering.
#[derive(Clone)]
pub struct AssistService {
    tracker: Arc<JobTracker>,
    client: Arc<dyn CompletionClient>,
    model: Arc<str>,
}

impl AssistService {
    pub fn new(
        tracker: Arc<JobTracker>,
        client: Arc<dyn CompletionClient>,
        model: impl Into<Arc<str>>,
    ) -> Self {
        let model = model.into();
        debug_assert!(!model.is_empty());
        Self {
            tracker,
            client,
            model,
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Runs the completion for `request_id` on a background task and records
    /// the outcome. Must be called from within a tokio runtime.
    pub fn dispatch(&self, request_id: String, prompt: String) -> JoinHandle<()> {
        self.dispatch_on(&Handle::current(), request_id, prompt)
    }

    fn dispatch_on(&self, runtime: &Handle, request_id: String, prompt: String) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let client = Arc::clone(&self.client);
        let model = Arc::clone(&self.model);

        runtime.spawn(async move {
            debug!(%request_id, model = %model, "generation dispatched");
            let recorded = match client.complete(SYSTEM_INSTRUCTION, &prompt, &model).await {
                Ok(text) => {
                    info!(%request_id, chars = text.len(), "generation completed");
                    tracker.complete(&request_id, text)
                }
                Err(err) => {
                    warn!(%request_id, error = %err, "generation failed");
                    tracker.fail(&request_id, format!("Failed to generate response: {err}"))
                }
            };
            if let Err(err) = recorded {
                warn!(%request_id, error = %err, "generation outcome not recorded");
            }
        })
    }
}

impl AssistProvider for AssistService {
    fn submit(&self, kind: DocumentKind, form: FormContext) -> Result<String, AssistError> {
        let prompt = prompts::build_prompt(kind, &form)
            .map_err(|err| AssistError::invalid_field(err.field(), err.to_string()))?;
        let runtime = Handle::try_current().map_err(|err| {
            AssistError::internal(format!("no async runtime to run generation on: {err}"))
        })?;
        let request_id = self.tracker.register(kind);
        self.dispatch_on(&runtime, request_id.clone(), prompt);
        Ok(request_id)
    }

    fn poll(&self, request_id: &str) -> JobPoll {
        match self.tracker.poll(request_id) {
            JobOutcome::NotFound => JobPoll::NotFound,
            JobOutcome::Processing => JobPoll::Processing,
            JobOutcome::Completed { kind, text } => {
                let report = render::parse(kind, &text);
                if report.is_degraded() {
                    warn!(
                        request_id,
                        %kind,
                        warnings = report.warnings.len(),
                        "rendered document is degraded"
                    );
                }
                let (document, warnings) = report.into_json_parts();
                JobPoll::Completed(CompletedJob {
                    kind,
                    text,
                    document,
                    warnings,
                })
            }
            JobOutcome::Failed { message, .. } => JobPoll::Failed { message },
        }
    }
}
