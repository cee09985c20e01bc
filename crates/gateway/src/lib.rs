//! HTTP listener: WeCom callback intake plus the health/status surface.
//!
//! Callback handlers only mutate in-memory session state and return
//! immediately; all network-bound work (model calls, delivery, persistence)
//! happens on the scheduler/pipeline path, off the request cycle.

mod callback;
pub mod server;
pub mod state;

pub use {
    server::build_app,
    state::{AppState, SchedulerHealth},
};
