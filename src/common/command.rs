use std::fmt::Debug;
use std::sync::Arc;

/// A recorded change that knows how to reapply and revert itself against `Target`.
///
/// Implementors carry the before/after payload they need; they never capture
/// references to the objects they change.
pub trait Reversible: Debug {
    type Target;

    fn redo(&self, target: &mut Self::Target);
    fn undo(&self, target: &mut Self::Target);
}

/// Side effects run around a command whenever it is undone or redone.
///
/// Hooks are not run when the command is first constructed, the creating
/// operation notifies on its own.
pub trait CommandHook: Debug + Send + Sync {
    fn before(&self, _is_undo: bool) {}
    fn after(&self, is_undo: bool);
}

/// A reversible unit of work.
///
/// Commands are handed out already applied, so the first call on a fresh
/// command is always `undo`.
#[derive(Debug)]
pub enum Command<E> {
    Edit(E),
    /// Undone in list order, redone in reverse list order.
    Composite(Vec<Command<E>>),
    Hooked(Box<Command<E>>, Arc<dyn CommandHook>),
}

impl<E> Command<E> {
    pub fn empty() -> Self {
        Self::Composite(Vec::new())
    }

    /// Bundles steps listed in the order they were applied.
    pub fn from_applied(steps: Vec<Self>) -> Self {
        let mut c = Self::Composite(steps);
        c.reverse();
        c
    }

    pub fn hooked(self, hook: Arc<dyn CommandHook>) -> Self {
        Self::Hooked(Box::new(self), hook)
    }

    pub fn reverse(&mut self) {
        if let Self::Composite(children) = self {
            children.reverse();
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Edit(_) => false,
            Self::Composite(children) => children.iter().all(|c| c.is_empty()),
            Self::Hooked(inner, _) => inner.is_empty(),
        }
    }

    pub fn lift<F: From<E>>(self) -> Command<F> {
        match self {
            Self::Edit(e) => Command::Edit(e.into()),
            Self::Composite(children) => {
                Command::Composite(children.into_iter().map(|c| c.lift()).collect())
            }
            Self::Hooked(inner, hook) => Command::Hooked(Box::new(inner.lift()), hook),
        }
    }
}

impl<E: Reversible> Command<E> {
    pub fn undo(&self, target: &mut E::Target) {
        match self {
            Self::Edit(e) => e.undo(target),
            Self::Composite(children) => {
                for c in children {
                    c.undo(target);
                }
            }
            Self::Hooked(inner, hook) => {
                hook.before(true);
                inner.undo(target);
                hook.after(true);
            }
        }
    }

    pub fn redo(&self, target: &mut E::Target) {
        match self {
            Self::Edit(e) => e.redo(target),
            Self::Composite(children) => {
                for c in children.iter().rev() {
                    c.redo(target);
                }
            }
            Self::Hooked(inner, hook) => {
                hook.before(false);
                inner.redo(target);
                hook.after(false);
            }
        }
    }
}

impl<E> From<E> for Command<E> {
    fn from(value: E) -> Self {
        Self::Edit(value)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::Mutex;

    /// Pushes a value on redo and pops it on undo.
    #[derive(Debug)]
    pub(crate) struct PushEdit(pub i32);

    impl Reversible for PushEdit {
        type Target = Vec<i32>;

        fn redo(&self, target: &mut Vec<i32>) {
            target.push(self.0);
        }
        fn undo(&self, target: &mut Vec<i32>) {
            assert_eq!(target.pop(), Some(self.0));
        }
    }

    pub(crate) fn push(target: &mut Vec<i32>, value: i32) -> Command<PushEdit> {
        target.push(value);
        Command::Edit(PushEdit(value))
    }

    #[derive(Debug, Default)]
    struct LoggingHook {
        log: Mutex<Vec<String>>,
    }

    impl CommandHook for LoggingHook {
        fn before(&self, is_undo: bool) {
            self.log.lock().unwrap().push(format!("before {is_undo}"));
        }
        fn after(&self, is_undo: bool) {
            self.log.lock().unwrap().push(format!("after {is_undo}"));
        }
    }

    #[test]
    fn test_applied_sequence_undoes_backwards() {
        let mut v = vec![];
        let steps = vec![push(&mut v, 1), push(&mut v, 2), push(&mut v, 3)];
        let c = Command::from_applied(steps);

        c.undo(&mut v);
        assert!(v.is_empty());
        c.redo(&mut v);
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn test_composite_order_and_reverse() {
        let mut v = vec![1, 2];
        // undo walks list order, so the list must already be last-applied-first
        let mut c = Command::Composite(vec![Command::Edit(PushEdit(2)), Command::Edit(PushEdit(1))]);
        c.undo(&mut v);
        assert!(v.is_empty());
        c.redo(&mut v);
        assert_eq!(v, vec![1, 2]);

        c.reverse();
        let Command::Composite(children) = &c else {
            panic!()
        };
        assert!(matches!(children[0], Command::Edit(PushEdit(1))));
    }

    #[test]
    fn test_hooks_fire_once_per_direction() {
        let hook = Arc::new(LoggingHook::default());
        let mut v = vec![];
        let plain = Command::from_applied(vec![push(&mut v, 7), push(&mut v, 8)]);
        plain.undo(&mut v);
        plain.redo(&mut v);
        assert_eq!(v, vec![7, 8]);

        let nested = Command::from_applied(vec![push(&mut v, 9)]).hooked(hook.clone());
        let outer = Command::from_applied(vec![nested]);
        outer.undo(&mut v);
        outer.redo(&mut v);
        assert_eq!(v, vec![7, 8, 9]);
        assert_eq!(
            *hook.log.lock().unwrap(),
            vec!["before true", "after true", "before false", "after false"]
        );
    }

    #[test]
    fn test_lift_keeps_structure() {
        #[derive(Debug, derive_more::From)]
        enum Wrapped {
            Push(PushEdit),
        }
        impl Reversible for Wrapped {
            type Target = Vec<i32>;
            fn redo(&self, target: &mut Vec<i32>) {
                let Wrapped::Push(p) = self;
                p.redo(target)
            }
            fn undo(&self, target: &mut Vec<i32>) {
                let Wrapped::Push(p) = self;
                p.undo(target)
            }
        }

        let mut v = vec![];
        let c: Command<Wrapped> =
            Command::from_applied(vec![push(&mut v, 1), push(&mut v, 2)]).lift();
        c.undo(&mut v);
        assert!(v.is_empty());
        assert!(!c.is_empty());
        assert!(Command::<Wrapped>::empty().is_empty());
    }
}
