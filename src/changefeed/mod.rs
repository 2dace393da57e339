//! Change feed processing: store events in, moderation decisions out.
//!
//! - `ChangeEventDispatcher`: per-event skip rules and bounded parallel
//!   moderation with partial-failure isolation
//! - `ChangeFeedConsumer`: batching loop over a store subscription
//! - `ProcessingReport`: per-batch counts and per-event outcomes

mod consumer;
mod dispatcher;
mod report;

pub use consumer::ChangeFeedConsumer;
pub use dispatcher::{
    ChangeEventDispatcher, Classification, DispatcherStats, DispatcherStatsSnapshot,
};
pub use report::{EventDisposition, EventOutcome, IgnoreReason, ProcessingReport};
