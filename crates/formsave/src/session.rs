//! Auto-save session engine.
//!
//! [`AutoSaveSession`] coordinates when a host-supplied save function runs,
//! given a stream of "field changed" and "field blurred" signals, while
//! giving the UI a single [`SaveStatus`] value to render. The session is
//! framework-agnostic: whatever layer wraps the form wires its change
//! events to [`mark_dirty`](AutoSaveSession::mark_dirty) and its blur or
//! submit events to [`save_now`](AutoSaveSession::save_now).
//!
//! Timers run on the ambient Tokio runtime. Only one save attempt is ever
//! in flight per session; edits that land while a save is running are
//! carried into the next save cycle rather than the current one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::AutoSaveConfig;
use crate::error::{AutoSaveError, BoxError};
use crate::status::SaveStatus;

/// Injected persistence closure. Expected to read current form values
/// itself at call time and perform the actual mutation.
type SaveFn = dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// Callback invoked after a save fails permanently.
type ErrorHandler = dyn Fn(&AutoSaveError) + Send + Sync;

/// Result of a completed [`AutoSaveSession::save_now`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The save function ran and succeeded.
    Saved,
    /// Nothing was dirty; the save function was not called.
    NothingToSave,
    /// Another save was already in flight; no second call was started.
    InFlight,
}

/// Mutable session state. Everything lives behind one mutex, and the lock
/// is never held across an await point.
struct SessionState {
    /// Whether there are edits not yet confirmed by a successful save.
    dirty: bool,
    /// Whether a save attempt is currently in flight.
    saving: bool,
    /// Set once by `dispose`; every timer callback and retry loop checks
    /// it before touching state.
    disposed: bool,
    /// Bumped on every `mark_dirty`; compared at save completion to detect
    /// edits that landed while the save was in flight.
    edit_seq: u64,
    /// Bumped whenever the debounce timer is (re)armed or cancelled; a
    /// timer that wakes with a stale epoch must no-op.
    timer_epoch: u64,
    /// Bumped each time `Saved` is entered; keeps an older save's decay
    /// timer from cutting a newer indicator short.
    saved_epoch: u64,
    /// Retries performed within the current save procedure.
    retry_count: u32,
    /// Message of the last permanent failure, for inline error banners.
    last_error: Option<String>,
    /// When the most recent edit was recorded.
    last_change: Option<Instant>,
    /// When the first edit since the last successful save was recorded.
    first_unsaved_change: Option<Instant>,
    /// When the first edit after the in-flight save started was recorded;
    /// becomes the batch anchor if that save succeeds.
    first_midflight_change: Option<Instant>,
    /// Pending debounce timer. `Some` only while the timer is waiting;
    /// the timer claims (clears) the slot when it wakes.
    debounce_handle: Option<JoinHandle<()>>,
    /// Pending saved-indicator decay timer.
    decay_handle: Option<JoinHandle<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            dirty: false,
            saving: false,
            disposed: false,
            edit_seq: 0,
            timer_epoch: 0,
            saved_epoch: 0,
            retry_count: 0,
            last_error: None,
            last_change: None,
            first_unsaved_change: None,
            first_midflight_change: None,
            debounce_handle: None,
            decay_handle: None,
        }
    }
}

struct Inner {
    config: AutoSaveConfig,
    save_fn: Box<SaveFn>,
    on_error: Mutex<Option<Arc<ErrorHandler>>>,
    state: Mutex<SessionState>,
    status_tx: watch::Sender<SaveStatus>,
}

/// Debounced, retrying auto-save coordinator for a single mounted form.
///
/// Wraps an injected asynchronous save function and decides when it runs:
/// a trailing-debounce timer after edits, immediately on
/// [`save_now`](Self::save_now), with exponential-backoff retries on
/// failure. The current [`SaveStatus`] is readable at any time and
/// observable through [`subscribe`](Self::subscribe).
///
/// Dropping the session (or calling [`dispose`](Self::dispose)) cancels
/// pending timers and abandons in-flight retries; no state changes happen
/// after teardown.
///
/// # Runtime
///
/// [`mark_dirty`](Self::mark_dirty) arms timers with `tokio::spawn` and
/// therefore must be called from within a Tokio runtime.
pub struct AutoSaveSession {
    inner: Arc<Inner>,
}

impl AutoSaveSession {
    /// Create a session with the default [`AutoSaveConfig`].
    #[must_use]
    pub fn new<F, Fut>(save_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::with_config(AutoSaveConfig::default(), save_fn)
    }

    /// Create a session with an explicit configuration.
    #[must_use]
    pub fn with_config<F, Fut>(config: AutoSaveConfig, save_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let (status_tx, _) = watch::channel(SaveStatus::Pristine);
        let save_fn: Box<SaveFn> =
            Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(save_fn())
            });
        Self {
            inner: Arc::new(Inner {
                config,
                save_fn,
                on_error: Mutex::new(None),
                state: Mutex::new(SessionState::new()),
                status_tx,
            }),
        }
    }

    /// Register a callback invoked after a save fails permanently, e.g.
    /// to show a toast. The callback runs outside the session lock.
    pub fn on_error<H>(&self, handler: H)
    where
        H: Fn(&AutoSaveError) + Send + Sync + 'static,
    {
        *self.inner.on_error.lock() = Some(Arc::new(handler));
    }

    /// Record an edit and (re)schedule the automatic save.
    ///
    /// Restarts the trailing-debounce timer: only the last call within a
    /// burst arms the save that actually fires. During an in-flight save
    /// the edit is recorded for the next cycle and the status stays
    /// `Saving`; otherwise the status moves to `Pending`.
    pub fn mark_dirty(&self) {
        Inner::mark_dirty(&self.inner);
    }

    /// Cancel any pending debounce timer and save immediately.
    ///
    /// Intended for blur and submit events. Resolves once the attempt,
    /// including retries, completes or exhausts. Calling this with no
    /// unsaved edits performs no save call at all, and calling it while
    /// a save is already in flight does not start a second one.
    ///
    /// # Errors
    ///
    /// [`AutoSaveError::RetriesExhausted`] after the retry budget is spent;
    /// [`AutoSaveError::Disposed`] if the session was torn down before or
    /// during the attempt. Failures are also surfaced through the status
    /// and the [`on_error`](Self::on_error) handler.
    pub async fn save_now(&self) -> Result<SaveOutcome, AutoSaveError> {
        Inner::save_now(&self.inner).await
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        *self.inner.status_tx.borrow()
    }

    /// Subscribe to status changes, for driving a save indicator.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Check if there are unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Check if a save is in progress.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.inner.state.lock().saving
    }

    /// Retries performed within the current save procedure.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.state.lock().retry_count
    }

    /// Message of the last permanent save failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    /// Get milliseconds since the last edit.
    #[must_use]
    pub fn ms_since_last_change(&self) -> Option<u64> {
        self.inner
            .state
            .lock()
            .last_change
            .map(|t| t.elapsed().as_millis() as u64)
    }

    /// Get milliseconds since the first edit of the current unsaved batch.
    #[must_use]
    pub fn ms_since_first_unsaved(&self) -> Option<u64> {
        self.inner
            .state
            .lock()
            .first_unsaved_change
            .map(|t| t.elapsed().as_millis() as u64)
    }

    /// Tear the session down: cancel pending timers and abandon in-flight
    /// retries. Idempotent. After this, `mark_dirty` is a no-op and
    /// `save_now` returns [`AutoSaveError::Disposed`].
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for AutoSaveSession {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for AutoSaveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AutoSaveSession")
            .field("status", &*self.inner.status_tx.borrow())
            .field("dirty", &state.dirty)
            .field("saving", &state.saving)
            .field("retry_count", &state.retry_count)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn publish(&self, status: SaveStatus) {
        self.status_tx.send_replace(status);
    }

    fn mark_dirty(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        let now = Instant::now();
        state.dirty = true;
        state.edit_seq += 1;
        state.last_change = Some(now);
        if state.first_unsaved_change.is_none() {
            state.first_unsaved_change = Some(now);
        }
        if state.saving && state.first_midflight_change.is_none() {
            state.first_midflight_change = Some(now);
        }
        if !state.saving {
            self.publish(SaveStatus::Pending);
        }
        if self.config.enabled {
            Self::arm_debounce(self, &mut state, now);
        }
        tracing::trace!(edit_seq = state.edit_seq, "change recorded");
    }

    /// (Re)arm the trailing-debounce timer, cancelling any pending one.
    /// With `max_delay_ms` set, the deadline is capped relative to the
    /// first unsaved edit so a continuous edit stream still saves.
    fn arm_debounce(self: &Arc<Self>, state: &mut SessionState, now: Instant) {
        state.timer_epoch += 1;
        let epoch = state.timer_epoch;
        if let Some(handle) = state.debounce_handle.take() {
            handle.abort();
        }
        let mut deadline = now + self.config.debounce();
        if let (Some(max_ms), Some(first)) = (self.config.max_delay_ms, state.first_unsaved_change)
        {
            deadline = deadline.min(first + Duration::from_millis(max_ms));
        }
        let inner = Arc::clone(self);
        state.debounce_handle = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            Inner::debounce_fired(&inner, epoch).await;
        }));
        tracing::trace!(epoch, "debounce timer armed");
    }

    async fn debounce_fired(self: &Arc<Self>, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.disposed || state.timer_epoch != epoch {
                return;
            }
            state.debounce_handle = None;
            if state.saving {
                // A save is already in flight; its completion handler owns
                // rescheduling for edits that arrived mid-flight.
                return;
            }
            if !state.dirty {
                return;
            }
        }
        tracing::debug!("debounce elapsed, auto-saving");
        // Failures are surfaced through the status and the error handler;
        // the automatic path has no caller to return them to.
        let _ = Inner::run_save(self).await;
    }

    async fn save_now(self: &Arc<Self>) -> Result<SaveOutcome, AutoSaveError> {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(AutoSaveError::Disposed);
            }
            state.timer_epoch += 1;
            if let Some(handle) = state.debounce_handle.take() {
                handle.abort();
            }
        }
        Inner::run_save(self).await
    }

    /// The save procedure: guard, attempt, retry with backoff, settle.
    async fn run_save(self: &Arc<Self>) -> Result<SaveOutcome, AutoSaveError> {
        let edits_at_start;
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(AutoSaveError::Disposed);
            }
            if state.saving {
                return Ok(SaveOutcome::InFlight);
            }
            if !state.dirty {
                return Ok(SaveOutcome::NothingToSave);
            }
            state.saving = true;
            state.retry_count = 0;
            state.last_error = None;
            edits_at_start = state.edit_seq;
            self.publish(SaveStatus::Saving);
        }

        let mut attempts: u32 = 0;
        let failure = loop {
            attempts += 1;
            tracing::debug!(attempt = attempts, "save attempt started");
            let source = match (self.save_fn)().await {
                Ok(()) => {
                    if self.finish_success(edits_at_start) {
                        return Ok(SaveOutcome::Saved);
                    }
                    return Err(AutoSaveError::Disposed);
                }
                Err(source) => source,
            };

            let backoff = {
                let mut state = self.state.lock();
                if state.disposed {
                    return Err(AutoSaveError::Disposed);
                }
                let policy = &self.config.retry;
                if policy.enabled && state.retry_count < policy.max_retries {
                    state.retry_count += 1;
                    Some(policy.backoff_delay(state.retry_count))
                } else {
                    None
                }
            };
            match backoff {
                Some(delay) => {
                    tracing::warn!(
                        attempt = attempts,
                        ?delay,
                        error = %source,
                        "save attempt failed, retrying"
                    );
                    time::sleep(delay).await;
                    if self.state.lock().disposed {
                        return Err(AutoSaveError::Disposed);
                    }
                }
                None => break source,
            }
        };
        self.finish_failure(attempts, failure)
    }

    /// Apply the success transition. Edits that landed mid-flight keep the
    /// session dirty and roll into the next save cycle; otherwise the
    /// saved indicator is shown and left to decay. Returns false if the
    /// session was disposed mid-flight and the result must not be applied.
    fn finish_success(self: &Arc<Self>, edits_at_start: u64) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }
        state.saving = false;
        state.retry_count = 0;
        state.last_error = None;
        if state.edit_seq == edits_at_start {
            state.dirty = false;
            state.first_unsaved_change = None;
            state.saved_epoch += 1;
            self.publish(SaveStatus::Saved);
            Self::arm_decay(self, &mut state);
            tracing::debug!("save succeeded");
        } else {
            // The persisted batch is gone; the unsaved batch now starts at
            // the first mid-flight edit.
            state.first_unsaved_change = state.first_midflight_change.take();
            self.publish(SaveStatus::Pending);
            // A mid-flight mark_dirty usually left its own timer pending,
            // anchored to the edit; arm a fresh window only if its timer
            // already fired into the in-flight save.
            if self.config.enabled && state.debounce_handle.is_none() {
                Self::arm_debounce(self, &mut state, Instant::now());
            }
            tracing::debug!("save succeeded, new edits pending");
        }
        true
    }

    /// Schedule the `Saved -> Pristine` indicator decay.
    fn arm_decay(self: &Arc<Self>, state: &mut SessionState) {
        let epoch = state.saved_epoch;
        if let Some(handle) = state.decay_handle.take() {
            handle.abort();
        }
        let delay = self.config.saved_indicator();
        let inner = Arc::clone(self);
        state.decay_handle = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let mut state = inner.state.lock();
            if state.disposed || state.saved_epoch != epoch || state.dirty {
                return;
            }
            state.decay_handle = None;
            inner.publish(SaveStatus::Pristine);
        }));
    }

    fn finish_failure(
        &self,
        attempts: u32,
        source: BoxError,
    ) -> Result<SaveOutcome, AutoSaveError> {
        let error = AutoSaveError::RetriesExhausted { attempts, source };
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(AutoSaveError::Disposed);
            }
            state.saving = false;
            state.last_error = Some(error.to_string());
            // dirty stays true: the edits are preserved for a later retry,
            // merged into the still-unsaved batch
            state.first_midflight_change = None;
            self.publish(SaveStatus::Error);
        }
        tracing::error!(attempts, error = %error, "save failed permanently");
        let handler = self.on_error.lock().clone();
        if let Some(handler) = handler.as_deref() {
            handler(&error);
        }
        Err(error)
    }

    fn dispose(&self) {
        let (debounce, decay) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.timer_epoch += 1;
            (state.debounce_handle.take(), state.decay_handle.take())
        };
        if let Some(handle) = debounce {
            handle.abort();
        }
        if let Some(handle) = decay {
            handle.abort();
        }
        tracing::debug!("auto-save session disposed");
    }
}
