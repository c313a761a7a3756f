//! Autonomous job-application orchestration layer.
//!
//! Coordinates LLM routing, job search, HR contact resolution, CV tailoring, email composition,
//! reply watching, and the per-application approval pipeline behind a single chat-style API,
//! persisting per-user session history to disk.

pub mod config;
pub mod cv_tailor;
pub mod email;
pub mod error;
pub mod events;
pub mod hr;
pub mod json_tolerant;
pub mod jobs;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod quota;
pub mod reply_watcher;
pub mod server;
pub mod session;
pub mod supervisor;

pub use config::Config;
pub use error::{OrchestrationError, Result};
pub use events::{AgentEvent, EventBus, SharedEventBus};
pub use llm::Router as LlmRouter;
pub use pipeline::PipelineController;
pub use quota::QuotaLedger;
pub use session::SessionStore;
pub use supervisor::Supervisor;
