//! Lifecycle state of a fetchable resource.

use std::sync::Arc;

use crate::error::{Result, StateError};

/// Observable status of a fetchable resource.
///
/// A resource starts in `Ready`, moves to `Loading` when a fetch starts and
/// ends the attempt in exactly one of `Loaded` or `Failed`.
#[derive(Debug, Clone)]
pub enum State<T> {
    /// No fetch attempted yet, or the state was reset.
    Ready,
    /// A fetch is in flight.
    Loading,
    /// The fetch succeeded.
    Loaded(T),
    /// The fetch failed.
    Failed(Arc<StateError>),
}

/// Variant of a [`State`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// See [`State::Ready`].
    Ready,
    /// See [`State::Loading`].
    Loading,
    /// See [`State::Loaded`].
    Loaded,
    /// See [`State::Failed`].
    Failed,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        State::Ready
    }
}

impl<T> State<T> {
    /// A `Failed` state owning `error`.
    pub fn failed(error: StateError) -> Self {
        State::Failed(Arc::new(error))
    }

    /// The variant, without its payload.
    pub fn kind(&self) -> StateKind {
        match self {
            State::Ready => StateKind::Ready,
            State::Loading => StateKind::Loading,
            State::Loaded(_) => StateKind::Loaded,
            State::Failed(_) => StateKind::Failed,
        }
    }

    /// True when no fetch has been attempted since the last reset.
    pub fn is_ready(&self) -> bool {
        matches!(self, State::Ready)
    }

    /// True while a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, State::Loading)
    }

    /// True once the attempt has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, State::Loaded(_) | State::Failed(_))
    }

    /// The loaded data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            State::Loaded(data) => Some(data),
            _ => None,
        }
    }

    /// Consume the state, keeping the loaded data, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            State::Loaded(data) => Some(data),
            _ => None,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&Arc<StateError>> {
        match self {
            State::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Borrow the payload; the error is shared, not cloned.
    pub fn as_ref(&self) -> State<&T> {
        match self {
            State::Ready => State::Ready,
            State::Loading => State::Loading,
            State::Loaded(data) => State::Loaded(data),
            State::Failed(error) => State::Failed(Arc::clone(error)),
        }
    }

    /// Project loaded data through `f`; other variants pass through.
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> State<U> {
        match self {
            State::Ready => State::Ready,
            State::Loading => State::Loading,
            State::Loaded(data) => State::Loaded(f(data)),
            State::Failed(error) => State::Failed(error),
        }
    }

    /// Like [`map_data`](Self::map_data), but a failing `f` yields `Failed`.
    pub fn try_map_data<U>(self, f: impl FnOnce(T) -> Result<U>) -> State<U> {
        match self {
            State::Ready => State::Ready,
            State::Loading => State::Loading,
            State::Loaded(data) => match f(data) {
                Ok(mapped) => State::Loaded(mapped),
                Err(error) => State::failed(error),
            },
            State::Failed(error) => State::Failed(error),
        }
    }
}

impl<T: PartialEq> PartialEq for State<T> {
    /// Failures compare equal when they carry the same error instance.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (State::Ready, State::Ready) | (State::Loading, State::Loading) => true,
            (State::Loaded(a), State::Loaded(b)) => a == b,
            (State::Failed(a), State::Failed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
