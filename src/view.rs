//! Presentation-facing projection of one entity.

use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::entity::FetchableEntity;
use crate::projection::MapDataExt;
use crate::state::State;

/// An entity's state, projected through a mapping function and mirrored
/// into a single watch channel.
///
/// Readers see projected states in the order the entity produced them.
pub struct EntityView<T, P, U> {
    entity: Arc<FetchableEntity<T, P>>,
    state: watch::Receiver<State<U>>,
    forward: JoinHandle<()>,
}

impl<T, P, U> EntityView<T, P, U>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Start mirroring `entity` through `project`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        entity: Arc<FetchableEntity<T, P>>,
        project: impl FnMut(T) -> U + Send + 'static,
    ) -> Self {
        let mut projected = entity.subscribe().map_data(project);

        // The subscription yields the current state without waiting.
        let initial = projected
            .next()
            .now_or_never()
            .flatten()
            .unwrap_or_default();
        let (tx, state) = watch::channel(initial);

        let forward = tokio::spawn(async move {
            while let Some(next) = projected.next().await {
                if tx.send(next).is_err() {
                    break;
                }
            }
        });

        Self {
            entity,
            state,
            forward,
        }
    }

    pub fn id(&self) -> &str {
        self.entity.id()
    }

    pub fn context_id(&self) -> &str {
        self.entity.context_id()
    }

    pub fn entity(&self) -> &Arc<FetchableEntity<T, P>> {
        &self.entity
    }

    /// Ask the entity to load, if it has not already.
    pub fn fetch_data(&self) {
        self.entity.fetch_if_needed();
    }

    pub fn state(&self) -> State<U> {
        self.state.borrow().clone()
    }

    /// Wait for the next projected state. Returns false once the entity's
    /// state stream has ended.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<State<U>> {
        self.state.clone()
    }
}

impl<T, P, U> Drop for EntityView<T, P, U> {
    fn drop(&mut self) {
        self.forward.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::ScriptedSource;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        title: String,
    }

    fn view(source: Arc<ScriptedSource>) -> EntityView<String, String, Row> {
        let entity = Arc::new(FetchableEntity::new("rathalos", "mhw", source, |raw: String| {
            Ok(raw)
        }));
        EntityView::new(entity, |raw: String| Row {
            title: raw.to_uppercase(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_follows_entity() {
        let source = ScriptedSource::ok("ok", Duration::from_millis(100));
        let mut view = view(source.clone());
        assert!(view.state().is_ready());
        assert_eq!(view.id(), "rathalos");
        assert_eq!(view.context_id(), "mhw");

        view.fetch_data();
        view.fetch_data();
        assert!(view.changed().await);
        assert!(view.state().is_loading());

        assert!(view.changed().await);
        assert_eq!(
            view.state().data(),
            Some(&Row {
                title: "MHW/RATHALOS:OK".to_string()
            })
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_starts_from_current_state() {
        let source = ScriptedSource::failing(Duration::ZERO);
        let entity = Arc::new(FetchableEntity::new("rathalos", "mhw", source, |raw: String| {
            Ok(raw)
        }));
        entity.load_if_needed().await;

        let view = EntityView::new(Arc::clone(&entity), |raw: String| raw.len());
        assert!(view.state().error().is_some());
        assert!(Arc::ptr_eq(view.entity(), &entity));
    }
}
