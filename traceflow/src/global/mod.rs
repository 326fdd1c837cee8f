//! Process-wide provider registry and deferred tracer binding.
//!
//! Rather than an ambient mutable global, traceflow uses an explicit
//! [`TracerRegistry`] object that applications create, register their
//! provider into, and pass (usually behind an `Arc`) to whatever needs
//! tracers. Resolution is guarded by an API version check:
//! registrations made against a different [`TRACEFLOW_API_VERSION`] resolve
//! to the no-op provider instead of a mismatched implementation.
//!
//! Libraries that need a tracer before the application has registered a
//! provider can hold a [`LazyTracer`]: it serves no-op spans until a
//! compatible provider appears, then binds to it once and keeps that
//! binding for its lifetime.

mod trace;

pub use trace::{
    BoxedSpan, BoxedTracer, ObjectSafeSpan, ObjectSafeTracer, ObjectSafeTracerProvider,
};

use crate::trace::noop::{NoopTracer, NoopTracerProvider};
use crate::trace::{SpanBuilder, Tracer, TracerProvider};
use crate::Context;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// The API compatibility version of this crate.
///
/// Providers register themselves with the version they were compiled
/// against; resolution only succeeds when it matches the resolver's
/// required version.
pub const TRACEFLOW_API_VERSION: u32 = 1;

static NOOP_TRACER_PROVIDER: OnceLock<Arc<NoopTracerProvider>> = OnceLock::new();

fn noop_tracer_provider() -> Arc<dyn ObjectSafeTracerProvider + Send + Sync> {
    NOOP_TRACER_PROVIDER
        .get_or_init(|| Arc::new(NoopTracerProvider::new()))
        .clone()
}

struct Registration {
    version: u32,
    provider: Arc<dyn ObjectSafeTracerProvider + Send + Sync>,
}

/// An explicit, injectable registry of named tracer providers.
pub struct TracerRegistry {
    providers: RwLock<HashMap<String, Registration>>,
}

impl fmt::Debug for TracerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("TracerRegistry")
            .field("providers", &len)
            .finish()
    }
}

impl Default for TracerRegistry {
    fn default() -> Self {
        TracerRegistry::new()
    }
}

impl TracerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        TracerRegistry {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a provider under the given name and API version.
    ///
    /// Replaces (and logs) any provider previously registered under the
    /// same name.
    pub fn register_tracer_provider<P>(
        &self,
        name: impl Into<String>,
        version: u32,
        provider: P,
    ) where
        P: TracerProvider + Send + Sync + 'static,
        P::Tracer: Send + Sync + 'static,
        <P::Tracer as Tracer>::Span: Send + Sync + 'static,
    {
        let name = name.into();
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let replaced = providers
            .insert(
                name.clone(),
                Registration {
                    version,
                    provider: Arc::new(provider),
                },
            )
            .is_some();
        if replaced {
            flow_warn!(
                name: "TracerRegistry.ProviderReplaced",
                provider_name = name.as_str()
            );
        }
    }

    /// Removes the provider registered under the given name, if any.
    ///
    /// Tracers already bound to the removed provider keep working;
    /// subsequent resolutions fall back to the no-op provider.
    pub fn deregister_tracer_provider(&self, name: &str) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Resolves a provider by name, requiring the given API version.
    ///
    /// Falls back to the no-op provider when nothing is registered under
    /// the name or the registration was made against a different version.
    pub fn resolve_tracer_provider(
        &self,
        name: &str,
        required_version: u32,
    ) -> GlobalTracerProvider {
        GlobalTracerProvider {
            provider: self
                .compatible_provider(name, required_version)
                .unwrap_or_else(noop_tracer_provider),
        }
    }

    /// Shorthand for resolving a provider and creating a tracer from it.
    pub fn tracer(
        &self,
        provider_name: &str,
        required_version: u32,
        scope_name: impl Into<Cow<'static, str>>,
    ) -> BoxedTracer {
        self.resolve_tracer_provider(provider_name, required_version)
            .tracer(scope_name)
    }

    /// Creates a tracer that binds to the named provider on first use.
    pub fn lazy_tracer(
        self: &Arc<Self>,
        provider_name: impl Into<String>,
        required_version: u32,
        scope_name: impl Into<Cow<'static, str>>,
    ) -> LazyTracer {
        LazyTracer {
            registry: Arc::clone(self),
            provider_name: provider_name.into(),
            required_version,
            scope_name: scope_name.into(),
            delegate: OnceLock::new(),
        }
    }

    fn compatible_provider(
        &self,
        name: &str,
        required_version: u32,
    ) -> Option<Arc<dyn ObjectSafeTracerProvider + Send + Sync>> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match providers.get(name) {
            Some(registration) if registration.version == required_version => {
                Some(registration.provider.clone())
            }
            Some(registration) => {
                flow_warn!(
                    name: "TracerRegistry.VersionMismatch",
                    provider_name = name,
                    registered_version = registration.version,
                    required_version = required_version
                );
                None
            }
            None => None,
        }
    }
}

/// A provider handle resolved through a [`TracerRegistry`].
#[derive(Clone)]
pub struct GlobalTracerProvider {
    provider: Arc<dyn ObjectSafeTracerProvider + Send + Sync>,
}

impl fmt::Debug for GlobalTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GlobalTracerProvider")
    }
}

impl TracerProvider for GlobalTracerProvider {
    type Tracer = BoxedTracer;

    fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Self::Tracer {
        BoxedTracer::new(self.provider.boxed_tracer(name.into()))
    }
}

/// A tracer with deferred binding.
///
/// Until a compatible provider is registered, spans come from the no-op
/// tracer (propagating any parent span context). The first span built
/// after a compatible provider appears binds this tracer to it; the
/// binding is cached for the tracer's lifetime, so a later re-registration
/// does not rebind it.
pub struct LazyTracer {
    registry: Arc<TracerRegistry>,
    provider_name: String,
    required_version: u32,
    scope_name: Cow<'static, str>,
    delegate: OnceLock<BoxedTracer>,
}

impl fmt::Debug for LazyTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTracer")
            .field("provider_name", &self.provider_name)
            .field("bound", &self.delegate.get().is_some())
            .finish()
    }
}

impl LazyTracer {
    fn delegate(&self) -> Option<&BoxedTracer> {
        if self.delegate.get().is_none() {
            if let Some(provider) = self
                .registry
                .compatible_provider(&self.provider_name, self.required_version)
            {
                let tracer = BoxedTracer::new(provider.boxed_tracer(self.scope_name.clone()));
                let _ = self.delegate.set(tracer);
            }
        }
        self.delegate.get()
    }
}

impl Tracer for LazyTracer {
    type Span = BoxedSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        match self.delegate() {
            Some(tracer) => tracer.build_with_context(builder, parent_cx),
            None => BoxedSpan::new(Box::new(
                NoopTracer::new().build_with_context(builder, parent_cx),
            )),
        }
    }
}
