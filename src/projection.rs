//! Stream combinators over [`State`].
//!
//! These turn a stream of raw states into display-ready projections while
//! keeping `Ready`, `Loading` and `Failed` intact. Each input item produces
//! exactly one output item, in order.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::Result;
use crate::state::State;

pub trait MapDataExt<T>: Stream<Item = State<T>> + Sized {
    /// Map `Loaded` data through `f`.
    fn map_data<U, F>(self, f: F) -> MapData<Self, F>
    where
        F: FnMut(T) -> U,
    {
        MapData {
            stream: Box::pin(self),
            f,
        }
    }

    /// Map `Loaded` data through a fallible `f`; errors become `Failed`.
    fn try_map_data<U, F>(self, f: F) -> TryMapData<Self, F>
    where
        F: FnMut(T) -> Result<U>,
    {
        TryMapData {
            stream: Box::pin(self),
            f,
        }
    }
}

impl<T, S> MapDataExt<T> for S where S: Stream<Item = State<T>> {}

/// Stream returned by [`MapDataExt::map_data`].
pub struct MapData<S, F> {
    stream: Pin<Box<S>>,
    f: F,
}

// `f` is only ever used through `&mut`; the source is boxed.
impl<S, F> Unpin for MapData<S, F> {}

impl<S, T, U, F> Stream for MapData<S, F>
where
    S: Stream<Item = State<T>>,
    F: FnMut(T) -> U,
{
    type Item = State<U>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<State<U>>> {
        let this = self.get_mut();
        this.stream
            .as_mut()
            .poll_next(cx)
            .map(|item| item.map(|state| state.map_data(&mut this.f)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

/// Stream returned by [`MapDataExt::try_map_data`].
pub struct TryMapData<S, F> {
    stream: Pin<Box<S>>,
    f: F,
}

impl<S, F> Unpin for TryMapData<S, F> {}

impl<S, T, U, F> Stream for TryMapData<S, F>
where
    S: Stream<Item = State<T>>,
    F: FnMut(T) -> Result<U>,
{
    type Item = State<U>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<State<U>>> {
        let this = self.get_mut();
        this.stream
            .as_mut()
            .poll_next(cx)
            .map(|item| item.map(|state| state.try_map_data(&mut this.f)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::state::StateKind;
    use futures::stream;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_map_data_preserves_order_and_kinds() {
        let source = stream::iter(vec![
            State::Ready,
            State::Loading,
            State::Loaded(2),
            State::failed(StateError::fetch("offline")),
            State::Loaded(5),
        ]);

        let projected: Vec<State<String>> =
            source.map_data(|n: i32| format!("#{n}")).collect().await;

        let kinds: Vec<StateKind> = projected.iter().map(State::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StateKind::Ready,
                StateKind::Loading,
                StateKind::Loaded,
                StateKind::Failed,
                StateKind::Loaded,
            ]
        );
        assert_eq!(projected[2].data().map(String::as_str), Some("#2"));
        assert_eq!(projected[4].data().map(String::as_str), Some("#5"));
    }

    #[tokio::test]
    async fn test_try_map_data_turns_errors_into_failed() {
        let source = stream::iter(vec![State::Loading, State::Loaded("7"), State::Loaded("x")]);

        let projected: Vec<State<u8>> = source
            .try_map_data(|s: &str| s.parse::<u8>().map_err(StateError::mapping))
            .collect()
            .await;

        assert_eq!(projected.len(), 3);
        assert!(projected[0].is_loading());
        assert_eq!(projected[1].data(), Some(&7));
        assert!(matches!(
            projected[2].error().map(|e| e.as_ref()),
            Some(StateError::Mapping(_))
        ));
    }

    #[tokio::test]
    async fn test_mapper_is_stateful() {
        let mut calls = 0;
        let source = vec![State::Loaded(()), State::Ready, State::Loaded(())];
        let projected: Vec<State<usize>> = stream::iter(source)
            .map_data(|()| {
                calls += 1;
                calls
            })
            .collect()
            .await;

        assert_eq!(projected[0].data(), Some(&1));
        assert_eq!(projected[2].data(), Some(&2));
    }
}
