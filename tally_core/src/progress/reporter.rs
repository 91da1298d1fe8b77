use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use super::models::{MessageRef, Stage, UpdatePolicy};
use super::traits::MessageSink;

/// Serializes stage-text edits to one live status message.
///
/// Cheaply clonable; clones share the session. The session mutex is held
/// across the sink call, so exactly one outbound edit is in flight at a
/// time. `complete`/`fail` acquire the same mutex, which gives the
/// happens-before guarantee the terminal flag needs: an in-flight edit
/// finishes, anything requested after the terminal transition is a no-op.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn MessageSink>,
    target: MessageRef,
    policy: UpdatePolicy,
    terminal: AtomicBool,
    edit: Mutex<EditState>,
    /// Single replaceable slot for `UpdatePolicy::CoalesceLatest`.
    pending: StdMutex<Option<Stage>>,
}

struct EditState {
    current: Option<Stage>,
}

impl ProgressReporter {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(sink: Arc<dyn MessageSink>, target: MessageRef, policy: UpdatePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                target,
                policy,
                terminal: AtomicBool::new(false),
                edit: Mutex::new(EditState { current: None }),
                pending: StdMutex::new(None),
            }),
        }
    }

    pub fn target(&self) -> &MessageRef {
        &self.inner.target
    }

    /// True until `complete`/`fail`; irreversible after.
    pub fn is_active(&self) -> bool {
        !self.inner.terminal.load(Ordering::SeqCst)
    }

    /// Idempotently move the visible status message to `stage`.
    ///
    /// No-ops when the session is terminal, when `stage` is already
    /// displayed, or (per policy) when another edit is in flight. Edit
    /// failures are logged at debug and swallowed; progress is cosmetic.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn update(&self, stage: Stage) {
        if self.inner.terminal.load(Ordering::SeqCst) {
            return;
        }

        let mut state = match self.inner.edit.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                match self.inner.policy {
                    UpdatePolicy::DropWhileBusy => {}
                    UpdatePolicy::CoalesceLatest => {
                        // Replace, never queue: only the latest stage is
                        // worth showing once the in-flight edit lands.
                        *self.inner.pending.lock().expect("pending lock") = Some(stage);
                    }
                }
                return;
            }
        };

        self.apply(&mut state, stage).await;

        // Drain the coalesce slot before releasing the session so a stage
        // accepted while we were editing still lands.
        loop {
            let next = self.inner.pending.lock().expect("pending lock").take();
            match next {
                Some(stage) => self.apply(&mut state, stage).await,
                None => break,
            }
        }
    }

    /// Non-blocking fire-and-forget wrapper over [`update`](Self::update).
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn emit(&self, stage: Stage) {
        let this = self.clone();
        tokio::spawn(async move {
            this.update(stage).await;
        });
    }

    /// Mark the session terminal. Any edit already in flight finishes; no
    /// update requested after this call is honored.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn complete(&self) {
        let _state = self.inner.edit.lock().await;
        self.inner.terminal.store(true, Ordering::SeqCst);
        self.inner.pending.lock().expect("pending lock").take();
    }

    /// Mark the session terminal and clear the status message rather than
    /// leaving it frozen mid-progress. Best-effort: a failed delete is
    /// logged and swallowed.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn fail(&self) {
        let _state = self.inner.edit.lock().await;
        self.inner.terminal.store(true, Ordering::SeqCst);
        self.inner.pending.lock().expect("pending lock").take();
        if let Err(error) = self.inner.sink.delete(&self.inner.target).await {
            tracing::debug!(%error, "failed to delete progress message");
        }
    }

    async fn apply(&self, state: &mut EditState, stage: Stage) {
        // Re-checked under the lock: a terminal transition may have landed
        // between the caller's entry check and lock acquisition.
        if self.inner.terminal.load(Ordering::SeqCst) {
            return;
        }
        if state.current == Some(stage) {
            return;
        }
        match self
            .inner
            .sink
            .edit_text(&self.inner.target, stage.text())
            .await
        {
            Ok(()) => state.current = Some(stage),
            Err(error) => {
                // No retry: the next distinct stage will try again.
                tracing::debug!(%error, stage = stage.text(), "progress edit failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatId, Result};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Sink that records edits and can hold them in flight until the test
    /// releases permits.
    struct GatedSink {
        gate: Semaphore,
        edits: StdMutex<Vec<String>>,
        deletes: AtomicUsize,
    }

    impl GatedSink {
        fn open() -> Self {
            Self::with_permits(1024)
        }

        fn with_permits(permits: usize) -> Self {
            Self {
                gate: Semaphore::new(permits),
                edits: StdMutex::new(Vec::new()),
                deletes: AtomicUsize::new(0),
            }
        }

        fn edits(&self) -> Vec<String> {
            self.edits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSink for GatedSink {
        async fn send_text(&self, chat: ChatId, _text: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat,
                message_id: 1,
            })
        }

        async fn edit_text(&self, _target: &MessageRef, text: &str) -> Result<()> {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn delete(&self, _target: &MessageRef) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reporter(sink: Arc<GatedSink>, policy: UpdatePolicy) -> ProgressReporter {
        let target = MessageRef {
            chat: ChatId(10),
            message_id: 1,
        };
        ProgressReporter::new(sink, target, policy)
    }

    #[tokio::test]
    async fn repeated_stage_is_edited_once() {
        let sink = Arc::new(GatedSink::open());
        let reporter = reporter(sink.clone(), UpdatePolicy::DropWhileBusy);

        reporter.update(Stage::Classifying).await;
        reporter.update(Stage::Classifying).await;
        assert_eq!(sink.edits(), vec![Stage::Classifying.text()]);
    }

    #[tokio::test]
    async fn busy_updates_are_dropped_under_drop_policy() {
        let sink = Arc::new(GatedSink::with_permits(0));
        let reporter = reporter(sink.clone(), UpdatePolicy::DropWhileBusy);

        // First update takes the session and blocks inside the sink.
        let first = {
            let r = reporter.clone();
            tokio::spawn(async move { r.update(Stage::Received).await })
        };
        tokio::task::yield_now().await;

        // These arrive while the edit is in flight and are dropped.
        reporter.update(Stage::Classifying).await;
        reporter.update(Stage::Logging).await;

        sink.gate.add_permits(8);
        first.await.unwrap();

        assert_eq!(sink.edits(), vec![Stage::Received.text()]);

        // The session is free again: the next update lands.
        reporter.update(Stage::Replying).await;
        assert_eq!(
            sink.edits(),
            vec![Stage::Received.text(), Stage::Replying.text()]
        );
    }

    #[tokio::test]
    async fn coalesce_policy_delivers_only_the_latest_pending_stage() {
        let sink = Arc::new(GatedSink::with_permits(0));
        let reporter = reporter(sink.clone(), UpdatePolicy::CoalesceLatest);

        let first = {
            let r = reporter.clone();
            tokio::spawn(async move { r.update(Stage::Received).await })
        };
        tokio::task::yield_now().await;

        reporter.update(Stage::Classifying).await; // replaced below
        reporter.update(Stage::Logging).await;

        sink.gate.add_permits(8);
        first.await.unwrap();

        assert_eq!(
            sink.edits(),
            vec![Stage::Received.text(), Stage::Logging.text()]
        );
    }

    #[tokio::test]
    async fn terminal_is_irreversible_and_silences_updates() {
        let sink = Arc::new(GatedSink::open());
        let reporter = reporter(sink.clone(), UpdatePolicy::DropWhileBusy);

        reporter.update(Stage::Received).await;
        reporter.complete().await;
        assert!(!reporter.is_active());

        reporter.update(Stage::Replying).await;
        reporter.emit(Stage::Logging);
        tokio::task::yield_now().await;

        assert_eq!(sink.edits(), vec![Stage::Received.text()]);
        assert!(!reporter.is_active());
    }

    #[tokio::test]
    async fn complete_waits_for_the_in_flight_edit() {
        let sink = Arc::new(GatedSink::with_permits(0));
        let reporter = reporter(sink.clone(), UpdatePolicy::DropWhileBusy);

        let first = {
            let r = reporter.clone();
            tokio::spawn(async move { r.update(Stage::Received).await })
        };
        tokio::task::yield_now().await;

        let completer = {
            let r = reporter.clone();
            tokio::spawn(async move { r.complete().await })
        };
        tokio::task::yield_now().await;

        // The in-flight edit is allowed to finish before the terminal flag
        // takes effect.
        sink.gate.add_permits(8);
        first.await.unwrap();
        completer.await.unwrap();

        assert_eq!(sink.edits(), vec![Stage::Received.text()]);
        assert!(!reporter.is_active());
    }

    #[tokio::test]
    async fn fail_deletes_the_status_message() {
        let sink = Arc::new(GatedSink::open());
        let reporter = reporter(sink.clone(), UpdatePolicy::DropWhileBusy);

        reporter.update(Stage::Received).await;
        reporter.fail().await;

        assert_eq!(sink.deletes.load(Ordering::SeqCst), 1);
        assert!(!reporter.is_active());

        reporter.update(Stage::Replying).await;
        assert_eq!(sink.edits(), vec![Stage::Received.text()]);
    }
}
