//! The polymorphic pool handle — a tagged capability set standing in for
//! inheritance. Concrete backends implement [`PoolHandle`] and are stored
//! behind `Arc<dyn PoolHandle>`; the native pool is recovered only through
//! [`downcast`], keyed by [`BackendKind`].

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{PoolError, PoolResult};

/// Stable tag identifying a driver family (e.g. `relational-a`,
/// `relational-b`). Opaque to the manager; meaningful only to adapters and
/// the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendKind(String);

impl BackendKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BackendKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Polymorphic handle over a native backend pool.
///
/// Implementations MUST NOT expose the native pool except through
/// [`downcast`]. `dispose` MUST be idempotent — calls after the first are
/// no-ops.
pub trait PoolHandle: Send + Sync + std::fmt::Debug {
    /// No-op round trip against the native pool, bounded by `deadline`.
    fn probe<'a>(&'a self, deadline: Duration) -> BoxFuture<'a, PoolResult<()>>;

    /// Release all native connections. Idempotent.
    fn dispose<'a>(&'a self) -> BoxFuture<'a, PoolResult<()>>;

    /// Stable tag matching the adapter's registry key.
    fn kind(&self) -> &BackendKind;

    /// Type-erased view used only by [`downcast`].
    fn as_any(&self) -> &dyn Any;
}

/// Recovers the concrete native pool type `T` from a handle, failing with
/// [`PoolError::Downcast`] when the handle's kind or concrete type does not
/// match.
pub fn downcast<T: 'static>(handle: &dyn PoolHandle, expected: &BackendKind) -> PoolResult<&T> {
    if handle.kind() != expected {
        return Err(PoolError::Downcast {
            expected: expected.to_string(),
            actual: handle.kind().to_string(),
        });
    }
    handle.as_any().downcast_ref::<T>().ok_or_else(|| PoolError::Downcast {
        expected: expected.to_string(),
        actual: handle.kind().to_string(),
    })
}

/// Builds a native pool for a connection string, supplied by the caller
/// (ultimately an adapter's registered factory) so the manager itself never
/// special-cases a backend kind.
pub trait PoolBuilder: Send + Sync {
    fn build<'a>(&'a self, conn_string: &'a str) -> BoxFuture<'a, PoolResult<std::sync::Arc<dyn PoolHandle>>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    /// A controllable mock pool handle for tests across this crate.
    #[derive(Debug)]
    pub struct MockHandle {
        pub kind: BackendKind,
        pub healthy: AtomicBool,
        pub disposed: AtomicBool,
        pub probe_calls: AtomicU32,
        pub dispose_calls: AtomicU32,
    }

    impl MockHandle {
        pub fn new(kind: impl Into<BackendKind>) -> Arc<Self> {
            Arc::new(Self {
                kind: kind.into(),
                healthy: AtomicBool::new(true),
                disposed: AtomicBool::new(false),
                probe_calls: AtomicU32::new(0),
                dispose_calls: AtomicU32::new(0),
            })
        }

        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }
    }

    impl PoolHandle for MockHandle {
        fn probe<'a>(&'a self, _deadline: Duration) -> BoxFuture<'a, PoolResult<()>> {
            Box::pin(async move {
                self.probe_calls.fetch_add(1, Ordering::SeqCst);
                if self.disposed.load(Ordering::SeqCst) || !self.healthy.load(Ordering::SeqCst) {
                    Err(PoolError::Backend("unhealthy".into()))
                } else {
                    Ok(())
                }
            })
        }

        fn dispose<'a>(&'a self) -> BoxFuture<'a, PoolResult<()>> {
            Box::pin(async move {
                self.dispose_calls.fetch_add(1, Ordering::SeqCst);
                self.disposed.store(true, Ordering::SeqCst);
                Ok(())
            })
        }

        fn kind(&self) -> &BackendKind {
            &self.kind
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub struct MockBuilder {
        pub kind: BackendKind,
        pub fail: AtomicBool,
        pub build_calls: AtomicU32,
    }

    impl MockBuilder {
        pub fn new(kind: impl Into<BackendKind>) -> Self {
            Self {
                kind: kind.into(),
                fail: AtomicBool::new(false),
                build_calls: AtomicU32::new(0),
            }
        }
    }

    impl PoolBuilder for MockBuilder {
        fn build<'a>(&'a self, _conn_string: &'a str) -> BoxFuture<'a, PoolResult<Arc<dyn PoolHandle>>> {
            Box::pin(async move {
                self.build_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail.load(Ordering::SeqCst) {
                    Err(PoolError::Unavailable("mock build failure".into()))
                } else {
                    Ok(MockHandle::new(self.kind.clone()) as Arc<dyn PoolHandle>)
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockHandle;
    use super::*;

    #[test]
    fn downcast_succeeds_for_matching_kind() {
        struct Wrapper(u32);
        impl std::fmt::Debug for Wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "Wrapper")
            }
        }
        impl PoolHandle for Wrapper {
            fn probe<'a>(&'a self, _deadline: Duration) -> BoxFuture<'a, PoolResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn dispose<'a>(&'a self) -> BoxFuture<'a, PoolResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn kind(&self) -> &BackendKind {
                static KIND: std::sync::OnceLock<BackendKind> = std::sync::OnceLock::new();
                KIND.get_or_init(|| BackendKind::new("relational-a"))
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let handle = Wrapper(7);
        let kind = BackendKind::new("relational-a");
        let recovered: &Wrapper = downcast(&handle, &kind).unwrap();
        assert_eq!(recovered.0, 7);
    }

    #[test]
    fn downcast_fails_for_mismatched_kind() {
        let handle = MockHandle::new("relational-a");
        let wrong = BackendKind::new("relational-b");
        let result = downcast::<MockHandle>(handle.as_ref(), &wrong);
        assert!(matches!(result, Err(PoolError::Downcast { .. })));
    }
}
