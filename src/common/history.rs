use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use super::command::{Command, Reversible};

/// Receives the history's state changes, e.g. to refresh undo/redo buttons
/// or a "modified" marker.
pub trait HistoryListener: Send + Sync {
    fn on_undo(&mut self) {}
    fn on_redo(&mut self) {}
    /// A command was recorded, discarding everything that could be redone.
    fn on_branch_cut(&mut self) {}
    fn on_clear(&mut self) {}
    fn on_save(&mut self) {}
}

/// Linear undo/redo list with a cursor and a saved-position marker.
pub struct CommandHistory<E> {
    commands: Vec<Command<E>>,
    position: usize,
    saved_position: Option<usize>,
    listeners: VecDeque<Arc<RwLock<dyn HistoryListener>>>,
}

impl<E> Default for CommandHistory<E> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            position: 0,
            saved_position: Some(0),
            listeners: VecDeque::new(),
        }
    }
}

impl<E: Reversible> CommandHistory<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
    pub fn position(&self) -> usize {
        self.position
    }
    pub fn can_undo(&self) -> bool {
        self.position > 0
    }
    pub fn can_redo(&self) -> bool {
        self.position < self.commands.len()
    }

    /// Records an already applied command. `None` is ignored.
    pub fn record(&mut self, command: impl Into<Option<Command<E>>>) {
        let Some(command) = command.into() else {
            return;
        };
        let discarded = self.commands.len() - self.position;
        if self.saved_position.is_some_and(|saved| saved > self.position) {
            self.saved_position = None;
        }
        self.commands.truncate(self.position);
        self.commands.push(command);
        self.position += 1;
        tracing::debug!(
            position = self.position,
            discarded,
            "recorded command"
        );
        self.notify(|l| l.on_branch_cut());
    }

    pub fn undo(&mut self, target: &mut E::Target) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.position -= 1;
        self.commands[self.position].undo(target);
        tracing::debug!(position = self.position, "undo");
        self.notify(|l| l.on_undo());
        true
    }

    pub fn redo(&mut self, target: &mut E::Target) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.commands[self.position].redo(target);
        self.position += 1;
        tracing::debug!(position = self.position, "redo");
        self.notify(|l| l.on_redo());
        true
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.position = 0;
        self.saved_position = Some(0);
        self.notify(|l| l.on_clear());
    }

    pub fn mark_saved(&mut self) {
        self.saved_position = Some(self.position);
        self.notify(|l| l.on_save());
    }

    pub fn is_at_saved_position(&self) -> bool {
        self.saved_position == Some(self.position)
    }

    pub fn add_listener(&mut self, listener: Arc<RwLock<dyn HistoryListener>>) {
        self.listeners.push_back(listener);
    }
    pub fn remove_listener(&mut self, listener: &Arc<RwLock<dyn HistoryListener>>) {
        self.listeners
            .retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
    }

    fn notify(&self, f: impl Fn(&mut dyn HistoryListener)) {
        for l in &self.listeners {
            let mut l = l.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut *l);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::command::test::{push, PushEdit};

    #[derive(Default)]
    struct CountingListener {
        undos: usize,
        redos: usize,
        cuts: usize,
        clears: usize,
        saves: usize,
    }

    impl HistoryListener for CountingListener {
        fn on_undo(&mut self) {
            self.undos += 1;
        }
        fn on_redo(&mut self) {
            self.redos += 1;
        }
        fn on_branch_cut(&mut self) {
            self.cuts += 1;
        }
        fn on_clear(&mut self) {
            self.clears += 1;
        }
        fn on_save(&mut self) {
            self.saves += 1;
        }
    }

    #[test]
    fn test_undo_redo_bounds() {
        let mut history = CommandHistory::<PushEdit>::new();
        let mut v = vec![];
        assert!(!history.undo(&mut v));
        assert!(!history.redo(&mut v));

        history.record(push(&mut v, 1));
        history.record(push(&mut v, 2));
        assert!(history.undo(&mut v));
        assert!(history.undo(&mut v));
        assert!(!history.undo(&mut v));
        assert!(v.is_empty());

        assert!(history.redo(&mut v));
        assert!(history.redo(&mut v));
        assert!(!history.redo(&mut v));
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn test_none_is_ignored() {
        let mut history = CommandHistory::<PushEdit>::new();
        history.record(None::<Command<PushEdit>>);
        assert_eq!(history.len(), 0);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_branch_cut() {
        let listener = Arc::new(RwLock::new(CountingListener::default()));
        let mut history = CommandHistory::<PushEdit>::new();
        history.add_listener(listener.clone());
        let mut v = vec![];

        history.record(push(&mut v, 1));
        history.record(push(&mut v, 2));
        history.undo(&mut v);
        history.record(push(&mut v, 3));

        assert_eq!(history.len(), 2);
        assert_eq!(history.position(), 2);
        assert!(!history.can_redo());
        assert!(!history.redo(&mut v));
        assert_eq!(v, vec![1, 3]);

        let l = listener.read().unwrap();
        assert_eq!(l.cuts, 3);
        assert_eq!(l.undos, 1);
        assert_eq!(l.redos, 0);
    }

    #[test]
    fn test_branch_cut_drops_saved_position() {
        let mut history = CommandHistory::<PushEdit>::new();
        let mut v = vec![];

        history.record(push(&mut v, 1));
        history.record(push(&mut v, 2));
        history.record(push(&mut v, 3));
        history.mark_saved();
        history.undo(&mut v);
        history.undo(&mut v);
        history.record(push(&mut v, 4));

        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
        assert_eq!(v, vec![1, 4]);
        assert!(!history.is_at_saved_position());

        history.undo(&mut v);
        history.undo(&mut v);
        assert!(v.is_empty());
        history.redo(&mut v);
        history.redo(&mut v);
        assert_eq!(v, vec![1, 4]);

        // the saved state is gone for good, even at its old depth
        history.record(push(&mut v, 5));
        assert_eq!(history.position(), 3);
        assert!(!history.is_at_saved_position());
    }

    #[test]
    fn test_saved_position() {
        let listener = Arc::new(RwLock::new(CountingListener::default()));
        let mut history = CommandHistory::<PushEdit>::new();
        history.add_listener(listener.clone());
        let mut v = vec![];

        assert!(history.is_at_saved_position());
        history.record(push(&mut v, 1));
        history.mark_saved();
        assert!(history.is_at_saved_position());

        history.record(push(&mut v, 2));
        assert!(!history.is_at_saved_position());
        history.undo(&mut v);
        assert!(history.is_at_saved_position());
        history.undo(&mut v);
        assert!(!history.is_at_saved_position());
        history.redo(&mut v);
        assert!(history.is_at_saved_position());

        assert_eq!(listener.read().unwrap().saves, 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let listener = Arc::new(RwLock::new(CountingListener::default()));
        let mut history = CommandHistory::<PushEdit>::new();
        let as_dyn: Arc<RwLock<dyn HistoryListener>> = listener.clone();
        history.add_listener(as_dyn.clone());
        let mut v = vec![];

        history.record(push(&mut v, 1));
        history.mark_saved();
        history.record(push(&mut v, 2));
        history.clear();

        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(history.is_at_saved_position());
        assert_eq!(listener.read().unwrap().clears, 1);

        history.remove_listener(&as_dyn);
        history.record(push(&mut v, 3));
        assert_eq!(listener.read().unwrap().cuts, 2);
    }
}
