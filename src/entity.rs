//! Fetch-once entities.
//!
//! A [`FetchableEntity`] owns the [`State`] of one remote resource. At most
//! one fetch per entity is in flight at any time: the decision to start a
//! fetch is taken under the entity's lock, and the fetch itself runs after
//! the lock is released.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::state::State;

/// Source of raw entity payloads.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Payload: Send;

    /// Fetch the payload of entity `id` within context `context_id`.
    async fn fetch(&self, id: &str, context_id: &str) -> Result<Self::Payload>;
}

/// Maps a raw payload to the entity's domain type.
pub type Mapper<P, T> = Arc<dyn Fn(P) -> Result<T> + Send + Sync>;

const TRANSITION_CAPACITY: usize = 16;

pub struct FetchableEntity<T, P> {
    id: String,
    context_id: String,
    // The lock guards every transition, including check-then-set.
    state: Mutex<State<T>>,
    transitions: broadcast::Sender<State<T>>,
    source: Arc<dyn DataSource<Payload = P>>,
    mapper: Mapper<P, T>,
    // Runtime to spawn background fetches on when the caller has none.
    runtime: Option<Handle>,
}

impl<T, P> FetchableEntity<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    pub fn new(
        id: impl Into<String>,
        context_id: impl Into<String>,
        source: Arc<dyn DataSource<Payload = P>>,
        mapper: impl Fn(P) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            id: id.into(),
            context_id: context_id.into(),
            state: Mutex::new(State::Ready),
            transitions,
            source,
            mapper: Arc::new(mapper),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Spawn background fetches on `runtime` when the calling thread is not
    /// inside one. Defaults to the runtime current at construction, if any.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State<T> {
        self.state.lock().clone()
    }

    /// The current state followed by every later transition, in order.
    pub fn subscribe(&self) -> StateStream<T> {
        let state = self.state.lock();
        StateStream {
            initial: Some(state.clone()),
            inner: BroadcastStream::new(self.transitions.subscribe()),
        }
    }

    /// Start a fetch in the background unless one already ran or is running.
    ///
    /// The entity is `Loading` when this returns, if it was `Ready` before.
    /// The outcome is only observable through [`state`](Self::state) and
    /// [`subscribe`](Self::subscribe). The fetch runs on the caller's
    /// runtime, or else on the entity's own; with neither, the call is
    /// logged and the entity stays `Ready`.
    pub fn fetch_if_needed(self: &Arc<Self>) {
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            warn!(id = %self.id, "no tokio runtime to fetch on, staying ready");
            return;
        };
        if !self.begin() {
            return;
        }
        let entity = Arc::clone(self);
        runtime.spawn(async move { entity.run_load().await });
    }

    /// Fetch in place unless one already ran or is running.
    ///
    /// Returns whether this call performed the fetch. Dropping the future
    /// mid-fetch puts the entity back to `Ready`.
    pub async fn load_if_needed(&self) -> bool {
        if !self.begin() {
            return false;
        }
        self.run_load().await;
        true
    }

    /// Return to `Ready` so the next call fetches again.
    ///
    /// Refused while a fetch is in flight; returns whether the entity is
    /// `Ready` afterwards.
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Loading => false,
            State::Ready => true,
            _ => {
                self.transition(&mut state, State::Ready);
                true
            }
        }
    }

    fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if !state.is_ready() {
            return false;
        }
        self.transition(&mut state, State::Loading);
        true
    }

    async fn run_load(&self) {
        let mut pending = PendingLoad {
            entity: self,
            settled: false,
        };
        debug!(id = %self.id, context = %self.context_id, "fetching entity");

        let next = match AssertUnwindSafe(self.load()).catch_unwind().await {
            Ok(Ok(data)) => State::Loaded(data),
            Ok(Err(err)) => {
                warn!(id = %self.id, error = %err, "entity fetch failed");
                State::failed(err)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(id = %self.id, %reason, "entity load panicked");
                State::failed(StateError::Panicked(reason))
            }
        };
        pending.settle(next);
    }

    async fn load(&self) -> Result<T> {
        let payload = self.source.fetch(&self.id, &self.context_id).await?;
        (self.mapper)(payload)
    }

    fn transition(&self, state: &mut State<T>, next: State<T>) {
        *state = next.clone();
        let _ = self.transitions.send(next);
    }
}

impl<T, P> fmt::Debug for FetchableEntity<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchableEntity")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("state", &self.state.lock().kind())
            .finish()
    }
}

/// Settles the entity exactly once, even if the load future is dropped.
struct PendingLoad<'a, T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    entity: &'a FetchableEntity<T, P>,
    settled: bool,
}

impl<T, P> PendingLoad<'_, T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    fn settle(&mut self, next: State<T>) {
        let mut state = self.entity.state.lock();
        debug_assert!(state.is_loading(), "settling an entity that is not loading");
        self.entity.transition(&mut state, next);
        self.settled = true;
    }
}

impl<T, P> Drop for PendingLoad<'_, T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            debug!(id = %self.entity.id, "entity load dropped before completion");
            self.settle(State::Ready);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Stream returned by [`FetchableEntity::subscribe`].
pub struct StateStream<T> {
    initial: Option<State<T>>,
    inner: BroadcastStream<State<T>>,
}

// Never pinned structurally; `initial` is moved out by value.
impl<T> Unpin for StateStream<T> {}

impl<T: Clone + Send + 'static> Stream for StateStream<T> {
    type Item = State<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<State<T>>> {
        if let Some(initial) = self.initial.take() {
            return Poll::Ready(Some(initial));
        }
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(state))) => return Poll::Ready(Some(state)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "state subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
