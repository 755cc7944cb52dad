//! Run orchestration.
//!
//! - [`Orchestrator`]: the state machine that plans, renders, uploads and
//!   finalizes one run
//! - [`UploadSession`]: the `start` / `cancel` / `progress` surface that owns
//!   shared progress and allows one run at a time

mod orchestrator;
mod session;


pub use orchestrator::{Orchestrator, RunState, RunSummary, UPLOAD_CONCURRENCY};
pub use session::UploadSession;
