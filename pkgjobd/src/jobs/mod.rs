//! Job records, the status state machine, and the bounded job queue.
//!
//! - [`Job`] - a single unit of package work with identity, retry budget and
//!   an optional chained successor
//! - [`JobView`] - an immutable snapshot handed to observers
//! - [`valid_transition`] / [`transition`] - the status state machine
//! - [`JobQueue`] - an ordered job list with a concurrency cap

mod job;
mod queue;
mod state;

pub use job::{Job, JobId, JobView, DEFAULT_RETRY};
pub use queue::JobQueue;
pub use state::{transition, valid_transition};
