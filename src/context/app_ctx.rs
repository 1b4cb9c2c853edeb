//! Application context and its `g` namespace.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::context::APP_STACK;
use crate::dispatch::App;

/// Application globals: one value per type, fresh for every activation.
#[derive(Default)]
pub struct G {
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl G {
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok().map(|b| *b))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    pub fn get_or_insert_with<T: 'static>(&mut self, f: impl FnOnce() -> T) -> &mut T {
        self.values
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(f()))
            .downcast_mut()
            .unwrap_or_else(|| unreachable!("G entries are keyed by their own TypeId"))
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok().map(|b| *b))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for G {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("G").field("values", &self.values.len()).finish()
    }
}

pub(crate) struct AppFrame {
    pub(crate) app: App,
    pub(crate) g: RefCell<G>,
    pushes: Cell<usize>,
}

/// Activation of an application on the current thread.
///
/// Pushing the same context again nests: only the final pop removes it.
#[derive(Clone)]
pub struct AppContext {
    frame: Rc<AppFrame>,
}

impl AppContext {
    pub fn new(app: App) -> Self {
        Self {
            frame: Rc::new(AppFrame {
                app,
                g: RefCell::new(G::default()),
                pushes: Cell::new(0),
            }),
        }
    }

    pub fn app(&self) -> &App {
        &self.frame.app
    }

    /// Activate this context; it stays active until the guard is popped or
    /// dropped.
    #[must_use = "the context is popped when the guard is dropped"]
    pub fn push(&self) -> AppContextGuard {
        self.frame.pushes.set(self.frame.pushes.get() + 1);
        APP_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(&self.frame)));
        tracing::trace!(app = %self.frame.app.name(), depth = self.frame.pushes.get(), "App context pushed");
        AppContextGuard {
            frame: Some(Rc::clone(&self.frame)),
        }
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("app", &self.frame.app.name())
            .field("pushes", &self.frame.pushes.get())
            .finish()
    }
}

/// Pops its [`AppContext`] when popped explicitly or dropped.
#[derive(Debug)]
pub struct AppContextGuard {
    frame: Option<Rc<AppFrame>>,
}

impl AppContextGuard {
    pub fn pop(mut self) {
        self.pop_inner(true);
    }

    fn pop_inner(&mut self, strict: bool) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        if !super::remove_top(&APP_STACK, &frame) && strict {
            panic!("Popped wrong app context. (expected {:?})", frame.app.name());
        }
        let remaining = frame.pushes.get().saturating_sub(1);
        frame.pushes.set(remaining);
        if remaining == 0 {
            frame.g.borrow_mut().values.clear();
        }
        tracing::trace!(app = %frame.app.name(), depth = remaining, "App context popped");
    }
}

impl Drop for AppContextGuard {
    fn drop(&mut self) {
        // While unwinding, clean up without asserting so the thread's stack
        // is usable for its next request.
        self.pop_inner(!std::thread::panicking());
    }
}

impl fmt::Debug for AppFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppFrame")
            .field("app", &self.app.name())
            .field("pushes", &self.pushes.get())
            .finish()
    }
}
