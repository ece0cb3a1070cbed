//! In-memory provider for tests and dry runs
//!
//! `get` replays a scripted sequence of results per target; the last entry
//! repeats forever. `watch` opens a channel-backed stream that first yields
//! the target's current scripted state, then whatever the test pushes.

use super::{ProviderError, StateEvent, StateProvider, StateStream};
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use crate::wait::WaitEvent;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

type Step = Result<ResourceState, ProviderError>;
type EventSender = UnboundedSender<Result<StateEvent, ProviderError>>;

#[derive(Default)]
struct Inner {
    scripts: HashMap<ResourceRef, VecDeque<Step>>,
    watch_failures: HashMap<ResourceRef, ProviderError>,
    watchers: HashMap<ResourceRef, Vec<EventSender>>,
    events: HashMap<ResourceRef, Vec<WaitEvent>>,
    stats: HashMap<ResourceRef, Stats>,
}

#[derive(Default, Clone, Copy)]
struct Stats {
    gets: usize,
    opened: usize,
    active: usize,
}

/// Replays scripted resource states
#[derive(Default)]
pub struct ScriptedProvider {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Results returned by successive `get` calls for `target`
    ///
    /// The last result repeats once the script is exhausted. Targets without
    /// a script are reported as not found.
    pub fn script(&self, target: ResourceRef, steps: Vec<Step>) {
        self.lock().scripts.insert(target, steps.into());
    }

    /// Make every `watch` on `target` fail to open
    pub fn fail_watch(&self, target: ResourceRef, error: ProviderError) {
        self.lock().watch_failures.insert(target, error);
    }

    /// Events returned by `recent_events`
    pub fn set_events(&self, target: ResourceRef, events: Vec<WaitEvent>) {
        self.lock().events.insert(target, events);
    }

    /// Deliver `event` to every open watch on `target`
    pub fn push(&self, target: &ResourceRef, event: StateEvent) {
        self.send(target, Ok(event));
    }

    pub fn push_error(&self, target: &ResourceRef, error: ProviderError) {
        self.send(target, Err(error));
    }

    /// Close every open watch on `target` from the server side
    pub fn end_watches(&self, target: &ResourceRef) {
        self.lock().watchers.remove(target);
    }

    pub fn get_calls(&self, target: &ResourceRef) -> usize {
        self.stats(target).gets
    }

    pub fn watches_opened(&self, target: &ResourceRef) -> usize {
        self.stats(target).opened
    }

    /// Watch streams on `target` that have not been dropped yet
    pub fn active_watches(&self, target: &ResourceRef) -> usize {
        self.stats(target).active
    }

    fn stats(&self, target: &ResourceRef) -> Stats {
        self.lock().stats.get(target).copied().unwrap_or_default()
    }

    fn send(&self, target: &ResourceRef, item: Result<StateEvent, ProviderError>) {
        let mut inner = self.lock();
        if let Some(senders) = inner.watchers.get_mut(target) {
            senders.retain(|tx| tx.unbounded_send(item.clone()).is_ok());
        }
    }
}

#[async_trait]
impl StateProvider for ScriptedProvider {
    async fn get(&self, target: &ResourceRef) -> Result<ResourceState, ProviderError> {
        let mut inner = self.lock();
        inner.stats.entry(target.clone()).or_default().gets += 1;

        let Some(steps) = inner.scripts.get_mut(target) else {
            return Err(ProviderError::NotFound(target.short()));
        };
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };
        step.unwrap_or_else(|| Err(ProviderError::NotFound(target.short())))
    }

    async fn watch(&self, target: &ResourceRef) -> Result<StateStream, ProviderError> {
        let mut inner = self.lock();
        if let Some(error) = inner.watch_failures.get(target) {
            return Err(error.clone());
        }

        let (tx, rx) = unbounded();
        if let Some(Ok(state)) = inner.scripts.get(target).and_then(|steps| steps.front()) {
            let _ = tx.unbounded_send(Ok(StateEvent::Applied(state.clone())));
        }
        inner.watchers.entry(target.clone()).or_default().push(tx);

        let stats = inner.stats.entry(target.clone()).or_default();
        stats.opened += 1;
        stats.active += 1;

        Ok(Box::pin(TrackedStream {
            rx,
            inner: Arc::clone(&self.inner),
            target: target.clone(),
        }))
    }

    async fn recent_events(&self, target: &ResourceRef) -> Vec<WaitEvent> {
        self.lock().events.get(target).cloned().unwrap_or_default()
    }
}

/// Watch stream that reports its own release
struct TrackedStream {
    rx: UnboundedReceiver<Result<StateEvent, ProviderError>>,
    inner: Arc<Mutex<Inner>>,
    target: ResourceRef,
}

impl Stream for TrackedStream {
    type Item = Result<StateEvent, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        if let Some(stats) = lock(&self.inner).stats.get_mut(&self.target) {
            stats.active = stats.active.saturating_sub(1);
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
