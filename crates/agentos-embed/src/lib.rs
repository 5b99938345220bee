//! Embedding pipeline for AgentOS.
//!
//! [`Embedder`] abstracts the outbound vector provider; [`EmbedWorker`] is
//! the claim-and-process loop that turns queued embedding jobs into stored
//! vectors. Provider error bodies never cross this crate's boundary — only
//! statuses are surfaced and logged.

pub mod embedder;
pub mod text;
pub mod worker;

pub use embedder::{EmbedError, Embedder, OpenAiEmbedder};
pub use worker::{EmbedWorker, JobOutcome};
