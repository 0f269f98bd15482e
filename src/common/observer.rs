use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use super::command::CommandHook;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedrawRequest {
    /// Property panes should re-read the selected object.
    pub update_properties: bool,
    /// The selection may reference objects that no longer exist.
    pub check_selection: bool,
}

// The observer trait, implemented by drawing surfaces
pub trait DiagramObserver: Send + Sync {
    fn notify_draw(&mut self, request: RedrawRequest);
}

type ObserverList = VecDeque<Arc<RwLock<dyn DiagramObserver>>>;

/// Shared handle to the observers of one diagram.
///
/// Clones refer to the same observer list, so commands can carry one to
/// notify after undo/redo without borrowing the diagram.
#[derive(Clone, Default)]
pub struct SurfaceNotifier {
    observers: Arc<RwLock<ObserverList>>,
}

impl SurfaceNotifier {
    pub fn notify_draw(&self, update_properties: bool, check_selection: bool) {
        let request = RedrawRequest {
            update_properties,
            check_selection,
        };
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .notify_draw(request);
        }
    }

    pub fn register_observer(&self, observer: Arc<RwLock<dyn DiagramObserver>>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(observer);
    }

    pub fn unregister_observer(&self, observer: &Arc<RwLock<dyn DiagramObserver>>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !std::ptr::addr_eq(Arc::as_ptr(o), Arc::as_ptr(observer)));
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for SurfaceNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceNotifier")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// When a [`RedrawHook`] asks observers to validate their selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionCheck {
    Never,
    OnUndo,
    OnRedo,
}

/// Command hook asking the observers to redraw after undo/redo.
#[derive(Debug)]
pub struct RedrawHook {
    notifier: SurfaceNotifier,
    update_properties: bool,
    check_selection: SelectionCheck,
}

impl RedrawHook {
    pub fn new(
        notifier: SurfaceNotifier,
        update_properties: bool,
        check_selection: SelectionCheck,
    ) -> Arc<Self> {
        Arc::new(Self {
            notifier,
            update_properties,
            check_selection,
        })
    }
}

impl CommandHook for RedrawHook {
    fn after(&self, is_undo: bool) {
        let check_selection = match self.check_selection {
            SelectionCheck::Never => false,
            SelectionCheck::OnUndo => is_undo,
            SelectionCheck::OnRedo => !is_undo,
        };
        self.notifier
            .notify_draw(self.update_properties, check_selection);
    }
}
