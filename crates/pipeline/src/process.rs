use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use {
    huddle_scheduler::BatchProcessor,
    huddle_sessions::Message,
};

use crate::{
    error::ProcessError,
    model::{ContextStore, ModelBackend, ModelReply, ModelTurn},
    outbound::Outbound,
    turn::{merge_batch, split_segments},
};

/// Default pause between consecutive reply segments.
const DEFAULT_SEGMENT_DELAY: Duration = Duration::from_millis(500);

/// Batch-to-reply pipeline: merge, generate, segment, deliver.
pub struct TurnPipeline {
    model: Arc<dyn ModelBackend>,
    outbound: Arc<dyn Outbound>,
    context: Option<Arc<dyn ContextStore>>,
    segment_delay: Duration,
}

impl TurnPipeline {
    pub fn new(model: Arc<dyn ModelBackend>, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            model,
            outbound,
            context: None,
            segment_delay: DEFAULT_SEGMENT_DELAY,
        }
    }

    #[must_use]
    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context = Some(store);
        self
    }

    #[must_use]
    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }

    async fn recall_context(&self, user_id: &str, query: &str) -> Option<String> {
        let store = self.context.as_ref()?;
        match store.recall(user_id, query).await {
            Ok(context) => context,
            Err(e) => {
                warn!(user_id = %user_id, error = %format!("{e:#}"), "memory recall failed, continuing without context");
                None
            },
        }
    }

    /// Deliver segments in order with a pause between them. Returns how many
    /// went out.
    async fn deliver(&self, user_id: &str, segments: &[String]) -> usize {
        let mut delivered = 0;
        for (i, segment) in segments.iter().enumerate() {
            match self.outbound.send_text(user_id, segment).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(user_id = %user_id, segment = i + 1, total = segments.len(), "segment sent");
                },
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        segment = i + 1,
                        total = segments.len(),
                        error = %format!("{e:#}"),
                        "segment delivery failed"
                    );
                },
            }
            if i + 1 < segments.len() {
                tokio::time::sleep(self.segment_delay).await;
            }
        }
        delivered
    }
}

#[async_trait]
impl BatchProcessor for TurnPipeline {
    async fn process(&self, user_id: &str, batch: &[Message]) -> anyhow::Result<()> {
        let text = merge_batch(batch);
        let context = self.recall_context(user_id, &text).await;

        let turn = ModelTurn {
            user_id: user_id.to_string(),
            text: text.clone(),
            context,
        };
        let reply = self
            .model
            .generate(turn)
            .await
            .map_err(ProcessError::model)?;

        let reply_text = match reply {
            ModelReply::Silent => {
                info!(user_id = %user_id, "model chose silence, nothing to deliver");
                return Ok(());
            },
            ModelReply::Text(reply_text) => reply_text,
        };

        let segments = split_segments(&reply_text);
        if segments.is_empty() {
            debug!(user_id = %user_id, "reply reduced to no segments, nothing to deliver");
            return Ok(());
        }

        info!(user_id = %user_id, segments = segments.len(), "delivering reply");
        let delivered = self.deliver(user_id, &segments).await;
        if delivered == 0 {
            return Err(ProcessError::DeliveryFailed {
                attempted: segments.len(),
            }
            .into());
        }
        if delivered < segments.len() {
            warn!(
                user_id = %user_id,
                delivered,
                total = segments.len(),
                "partial delivery, counting the turn as handled"
            );
        }

        if let Some(store) = &self.context {
            if let Err(e) = store.remember(user_id, &text, &reply_text).await {
                warn!(user_id = %user_id, error = %format!("{e:#}"), "failed to record exchange in memory");
            }
        }

        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::turn::SEGMENT_MARKER;

    struct ScriptedModel {
        reply: ModelReply,
        seen_turns: Mutex<Vec<ModelTurn>>,
    }

    impl ScriptedModel {
        fn text(reply: &str) -> Self {
            Self {
                reply: ModelReply::Text(reply.to_string()),
                seen_turns: Mutex::new(Vec::new()),
            }
        }

        fn silent() -> Self {
            Self {
                reply: ModelReply::Silent,
                seen_turns: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedModel {
        async fn generate(&self, turn: ModelTurn) -> anyhow::Result<ModelReply> {
            self.seen_turns.lock().unwrap().push(turn);
            Ok(self.reply.clone())
        }
    }

    /// Outbound that fails the first `fail_first` sends, then succeeds.
    struct FlakyOutbound {
        fail_first: usize,
        attempts: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl FlakyOutbound {
        fn reliable() -> Self {
            Self::failing(0)
        }

        fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                attempts: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Outbound for FlakyOutbound {
        async fn send_text(&self, _user_id: &str, text: &str) -> anyhow::Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                anyhow::bail!("network down");
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn pipeline(model: Arc<ScriptedModel>, outbound: Arc<FlakyOutbound>) -> TurnPipeline {
        TurnPipeline::new(model, outbound).with_segment_delay(Duration::from_millis(0))
    }

    fn batch() -> Vec<Message> {
        vec![
            Message::text("m1", "u1", "hi"),
            Message::text("m2", "u1", "there"),
        ]
    }

    #[tokio::test]
    async fn segmented_reply_is_delivered_in_order() {
        let model = Arc::new(ScriptedModel::text(&format!(
            "one{SEGMENT_MARKER}two{SEGMENT_MARKER}three"
        )));
        let outbound = Arc::new(FlakyOutbound::reliable());
        pipeline(Arc::clone(&model), Arc::clone(&outbound))
            .process("u1", &batch())
            .await
            .unwrap();

        assert_eq!(*outbound.sent.lock().unwrap(), ["one", "two", "three"]);

        // The model saw the merged turn, not individual messages.
        let turns = model.seen_turns.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].text.contains("hi"));
        assert!(turns[0].text.contains(SEGMENT_MARKER));
        assert_eq!(turns[0].user_id, "u1");
    }

    #[tokio::test]
    async fn silent_reply_is_success_without_delivery() {
        let model = Arc::new(ScriptedModel::silent());
        let outbound = Arc::new(FlakyOutbound::reliable());
        pipeline(model, Arc::clone(&outbound))
            .process("u1", &batch())
            .await
            .unwrap();

        assert!(outbound.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitespace_reply_is_success_without_delivery() {
        let model = Arc::new(ScriptedModel::text("  \n "));
        let outbound = Arc::new(FlakyOutbound::reliable());
        pipeline(model, Arc::clone(&outbound))
            .process("u1", &batch())
            .await
            .unwrap();

        assert!(outbound.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_delivery_counts_as_handled() {
        let model = Arc::new(ScriptedModel::text(&format!("one{SEGMENT_MARKER}two")));
        let outbound = Arc::new(FlakyOutbound::failing(1));
        pipeline(model, Arc::clone(&outbound))
            .process("u1", &batch())
            .await
            .unwrap();

        assert_eq!(*outbound.sent.lock().unwrap(), ["two"]);
    }

    #[tokio::test]
    async fn total_delivery_failure_is_an_error() {
        let model = Arc::new(ScriptedModel::text(&format!("one{SEGMENT_MARKER}two")));
        let outbound = Arc::new(FlakyOutbound::failing(99));
        let err = pipeline(model, outbound)
            .process("u1", &batch())
            .await
            .unwrap_err();

        let process_err = err.downcast::<ProcessError>().unwrap();
        assert!(matches!(
            process_err,
            ProcessError::DeliveryFailed { attempted: 2 }
        ));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        struct BrokenModel;

        #[async_trait]
        impl ModelBackend for BrokenModel {
            async fn generate(&self, _turn: ModelTurn) -> anyhow::Result<ModelReply> {
                anyhow::bail!("upstream 500");
            }
        }

        let outbound = Arc::new(FlakyOutbound::reliable());
        let err = TurnPipeline::new(Arc::new(BrokenModel), Arc::clone(&outbound))
            .process("u1", &batch())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("model call failed"));
        assert!(outbound.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_is_recalled_and_exchange_remembered() {
        struct FakeMemory {
            remembered: Mutex<Vec<(String, String)>>,
        }

        #[async_trait]
        impl ContextStore for FakeMemory {
            async fn recall(&self, _user_id: &str, _query: &str) -> anyhow::Result<Option<String>> {
                Ok(Some("likes tea".to_string()))
            }

            async fn remember(&self, _user_id: &str, turn: &str, reply: &str) -> anyhow::Result<()> {
                self.remembered
                    .lock()
                    .unwrap()
                    .push((turn.to_string(), reply.to_string()));
                Ok(())
            }
        }

        let model = Arc::new(ScriptedModel::text("noted"));
        let outbound = Arc::new(FlakyOutbound::reliable());
        let memory = Arc::new(FakeMemory {
            remembered: Mutex::new(Vec::new()),
        });

        pipeline(Arc::clone(&model), outbound)
            .with_context_store(Arc::clone(&memory) as Arc<dyn ContextStore>)
            .process("u1", &batch())
            .await
            .unwrap();

        let turns = model.seen_turns.lock().unwrap();
        assert_eq!(turns[0].context.as_deref(), Some("likes tea"));

        let remembered = memory.remembered.lock().unwrap();
        assert_eq!(remembered.len(), 1);
        assert_eq!(remembered[0].1, "noted");
    }
}
