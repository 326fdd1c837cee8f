use crate::trace::SpanContext;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::sync::Arc;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Vec<Context>> = RefCell::new(Vec::new());
}

/// An execution-scoped collection of values.
///
/// A [`Context`] is an immutable value: adding an entry produces a new
/// context that shares the rest of its state with its parent. Contexts are
/// propagated explicitly by passing them as arguments, or implicitly through
/// the per-thread current-context stack managed by [`Context::attach`].
///
/// Besides arbitrary typed entries (see [`Context::with_value`]), a context
/// carries two pieces of state the tracing pipeline cares about directly:
/// the active [`SpanContext`] used for parenting and propagation, and a
/// suppression flag that stops telemetry from being produced about
/// telemetry-internal work.
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span_context: Option<Arc<SpanContext>>,
    entries: Option<Arc<EntryMap>>,
    suppress_telemetry: bool,
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>, BuildHasherDefault<IdHasher>>;

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a clone of the current thread's active context.
    ///
    /// If no context has been attached on this thread, an empty context is
    /// returned.
    pub fn current() -> Self {
        Context::map_current(Context::clone)
    }

    /// Applies a function to the current thread's active context without
    /// cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|stack| match stack.borrow().last() {
            Some(cx) => f(cx),
            None => f(&Context::default()),
        })
    }

    /// Returns a reference to the entry of type `T`, if it exists.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a new context containing `value`, replacing any previous
    /// entry of the same type.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut entries = self
            .entries
            .as_deref()
            .cloned()
            .unwrap_or_default();
        entries.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            span_context: self.span_context.clone(),
            entries: Some(Arc::new(entries)),
            suppress_telemetry: self.suppress_telemetry,
        }
    }

    /// Makes this context the current one for the calling thread until the
    /// returned guard is dropped.
    ///
    /// Guards nest: dropping a guard restores whatever context was current
    /// when it was created.
    pub fn attach(self) -> ContextGuard {
        CURRENT_CONTEXT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard {
            _marker: std::marker::PhantomData,
        }
    }

    /// Whether telemetry produced under this context should be suppressed.
    ///
    /// Components that export telemetry over instrumented transports use
    /// this to keep the pipeline from tracing itself.
    pub fn is_telemetry_suppressed(&self) -> bool {
        self.suppress_telemetry
    }

    /// Returns a new context with telemetry suppression enabled.
    pub fn with_telemetry_suppressed(&self) -> Self {
        Context {
            span_context: self.span_context.clone(),
            entries: self.entries.clone(),
            suppress_telemetry: true,
        }
    }

    pub(crate) fn with_span_context_arc(&self, span_context: Arc<SpanContext>) -> Self {
        Context {
            span_context: Some(span_context),
            entries: self.entries.clone(),
            suppress_telemetry: self.suppress_telemetry,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span_context", &self.span_context)
            .field(
                "entries",
                &self.entries.as_ref().map(|e| e.len()).unwrap_or(0),
            )
            .field("suppress_telemetry", &self.suppress_telemetry)
            .finish()
    }
}

/// A guard that resets the current context when dropped.
#[derive(Debug)]
#[must_use = "the current context resets immediately if the guard is dropped"]
pub struct ContextGuard {
    // Contexts are thread-bound; keep the guard from crossing threads.
    _marker: std::marker::PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|stack| stack.borrow_mut().pop());
    }
}

/// Hasher for the context entry map.
///
/// Entry keys are `TypeId`s, which are already high-quality hashes; this
/// hasher passes them through instead of re-hashing.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}
