//! The processing pipeline: merges a batch into one model-facing turn, calls
//! the model backend, splits the reply on the segmentation marker, and
//! delivers the segments in order.

pub mod error;
pub mod model;
pub mod outbound;
mod process;
pub mod turn;

pub use {
    error::ProcessError,
    model::{ContextStore, ModelBackend, ModelReply, ModelTurn, SILENT_SENTINEL},
    outbound::Outbound,
    process::TurnPipeline,
    turn::{SEGMENT_MARKER, merge_batch, split_segments},
};
