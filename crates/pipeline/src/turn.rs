use {chrono::Local, huddle_sessions::Message};

/// Delimiter with a double life: it joins queued messages into one turn, and
/// the model uses the same marker to split its reply into independently
/// deliverable pieces.
pub const SEGMENT_MARKER: &str = "<SEGMENTATION>";

/// Concatenate a batch into one model-facing turn.
///
/// Each message is prefixed with its local time of day and the marker goes
/// between consecutive messages only (never after the last one):
///
/// ```text
/// [09:15:02] hi
/// <SEGMENTATION>
/// [09:15:04] are you there?
/// ```
pub fn merge_batch(batch: &[Message]) -> String {
    let mut lines = Vec::with_capacity(batch.len() * 2);
    for (i, message) in batch.iter().enumerate() {
        let clock = message.received_at.with_timezone(&Local).format("%H:%M:%S");
        lines.push(format!("[{clock}] {}", message.content));
        if i + 1 < batch.len() {
            lines.push(SEGMENT_MARKER.to_string());
        }
    }
    lines.join("\n")
}

/// Split a model reply on [`SEGMENT_MARKER`]. Segments are trimmed and empty
/// ones dropped, so a reply without any marker yields exactly one segment and
/// a whitespace-only reply yields none.
pub fn split_segments(reply: &str) -> Vec<String> {
    reply
        .split(SEGMENT_MARKER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
