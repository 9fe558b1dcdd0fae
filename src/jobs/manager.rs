//! Job submission, background execution and lookup.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::{ConversationEngine, ConversationMessage, RunContext};
use crate::commands::{CommandCatalog, build_prompt};
use crate::config::{Config, ToolsConfig};
use crate::error::{JobError, LlmError};
use crate::jobs::{Job, JobId, JobSnapshot, JobStore};
use crate::llm::{LlmProvider, Pricing, create_llm_provider};
use crate::tools::ToolExecutor;

/// Inputs for one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub command: String,
    pub prompt: String,
    pub working_dir: PathBuf,
}

/// Validates requests, spawns one conversation per job, and answers status
/// queries from the shared [`JobStore`].
pub struct JobManager {
    store: Arc<JobStore>,
    catalog: CommandCatalog,
    engine: Arc<ConversationEngine>,
    pricing: Pricing,
    tools_config: ToolsConfig,
}

impl JobManager {
    pub fn new(
        store: Arc<JobStore>,
        catalog: CommandCatalog,
        engine: Arc<ConversationEngine>,
        pricing: Pricing,
        tools_config: ToolsConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            engine,
            pricing,
            tools_config,
        }
    }

    /// Wire a manager to the configured model provider with a fresh store.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let llm = create_llm_provider(&config.vertex)?;
        let pricing = Pricing::for_model(llm.model_name(), &config.pricing);
        let engine = Arc::new(ConversationEngine::new(llm, &config.agent));
        Ok(Self::new(
            Arc::new(JobStore::new()),
            CommandCatalog::new(&config.context),
            engine,
            pricing,
            config.tools.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    /// Validate and register a job, then start it in the background.
    ///
    /// Validation failures create no job. The returned id is usable for
    /// status and streaming immediately.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, JobError> {
        let job = self.create(request).await?;
        let id = job.id.clone();
        self.spawn(job);
        Ok(id)
    }

    /// Submit a job and wait for it to finish.
    pub async fn run_to_completion(&self, request: JobRequest) -> Result<JobSnapshot, JobError> {
        let id = self.submit(request).await?;
        self.wait(&id).await
    }

    pub async fn get(&self, id: &JobId) -> Result<Arc<Job>, JobError> {
        self.store.get(id).await
    }

    pub async fn status(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        Ok(self.store.get(id).await?.snapshot().await)
    }

    /// Request cooperative cancellation. A finished job is left as is.
    pub async fn cancel(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        let job = self.store.get(id).await?;
        if !job.is_finished().await {
            tracing::info!(job_id = %id, "Cancelling job");
            job.cancel_token().cancel();
        }
        Ok(job.snapshot().await)
    }

    /// Block until the job reaches a terminal status.
    pub async fn wait(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        let job = self.store.get(id).await?;
        let mut progress = job.subscribe();
        loop {
            progress.borrow_and_update();
            if job.is_finished().await {
                return Ok(job.snapshot().await);
            }
            if progress.changed().await.is_err() {
                return Ok(job.snapshot().await);
            }
        }
    }

    async fn create(&self, request: JobRequest) -> Result<Arc<Job>, JobError> {
        self.catalog.resolve(&request.command)?;

        if request.prompt.trim().is_empty() {
            return Err(JobError::InvalidPrompt {
                reason: "prompt must not be empty".to_string(),
            });
        }

        let is_dir = tokio::fs::metadata(&request.working_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(JobError::InvalidWorkingDir {
                path: request.working_dir,
            });
        }

        let job = Arc::new(Job::new(
            request.command,
            request.prompt,
            request.working_dir,
        ));
        self.store.insert(job.clone()).await;

        tracing::info!(
            job_id = %job.id,
            command = %job.command,
            working_dir = %job.working_dir.display(),
            "Job submitted"
        );
        Ok(job)
    }

    fn spawn(&self, job: Arc<Job>) {
        let catalog = self.catalog.clone();
        let engine = Arc::clone(&self.engine);
        let pricing = self.pricing;
        let tools_config = self.tools_config.clone();

        tokio::spawn(async move {
            run_job(job, catalog, engine, pricing, tools_config).await;
        });
    }
}

async fn run_job(
    job: Arc<Job>,
    catalog: CommandCatalog,
    engine: Arc<ConversationEngine>,
    pricing: Pricing,
    tools_config: ToolsConfig,
) {
    let Ok(command) = catalog.resolve(&job.command) else {
        job.fail(format!("Unknown command: {}", job.command)).await;
        return;
    };

    let executor = match ToolExecutor::new(job.working_dir.clone(), &tools_config) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!(job_id = %job.id, "Failed to set up tools: {}", e);
            job.fail(e.to_string()).await;
            return;
        }
    };

    let system_prompt = catalog.load_context(command).await;
    let prompt = build_prompt(command.name, &job.prompt);

    let (tx, rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_messages(Arc::clone(&job), rx));
    let ctx = RunContext::new(tx, job.cancel_token());

    tracing::info!(job_id = %job.id, command = command.name, "Job started");
    let result = engine
        .run(&system_prompt, &prompt, &executor, &ctx)
        .await;

    // Closing the last sender ends the forwarder once it has drained.
    drop(ctx);
    if let Err(e) = forwarder.await {
        tracing::error!(job_id = %job.id, "Message forwarder failed: {}", e);
    }

    let cost = pricing.cost(result.usage());
    tracing::info!(
        job_id = %job.id,
        success = result.success,
        input_tokens = result.input_tokens,
        output_tokens = result.output_tokens,
        cost_usd = %cost,
        "Job run complete"
    );
    job.finish(&result, cost).await;
}

async fn forward_messages(job: Arc<Job>, mut rx: mpsc::UnboundedReceiver<ConversationMessage>) {
    while let Some(message) = rx.recv().await {
        job.push_message(message).await;
    }
}
