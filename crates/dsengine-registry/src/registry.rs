//! Process-wide registry mapping a backend kind tag to the three factory
//! callbacks that build its capability adapters.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dsengine_capability::{CapabilityResult, ConnectionTester, QueryExecutor, SchemaDiscoverer};
use dsengine_pool::{BackendKind, ConnectionManager};

use crate::error::{RegistryError, RegistryResult};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// `{kind, displayName, description, iconTag}` — consumed by discovery
/// endpoints outside this crate's scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub kind: BackendKind,
    pub display_name: String,
    pub description: String,
    pub icon_tag: String,
}

/// Arguments threaded into every registered factory callback.
pub struct FactoryArgs {
    pub raw_config: serde_json::Value,
    pub manager: Arc<ConnectionManager>,
    pub project_id: String,
    pub user_id: String,
    pub datasource_id: String,
    pub cancel: CancellationToken,
}

pub type TesterFactory =
    Arc<dyn Fn(FactoryArgs) -> BoxFuture<CapabilityResult<Arc<dyn ConnectionTester>>> + Send + Sync>;
pub type DiscovererFactory =
    Arc<dyn Fn(FactoryArgs) -> BoxFuture<CapabilityResult<Arc<dyn SchemaDiscoverer>>> + Send + Sync>;
pub type ExecutorFactory =
    Arc<dyn Fn(FactoryArgs) -> BoxFuture<CapabilityResult<Arc<dyn QueryExecutor>>> + Send + Sync>;

struct AdapterEntry {
    info: AdapterInfo,
    tester: TesterFactory,
    discoverer: DiscovererFactory,
    executor: ExecutorFactory,
}

fn registry() -> &'static RwLock<HashMap<BackendKind, AdapterEntry>> {
    static REGISTRY: OnceLock<RwLock<HashMap<BackendKind, AdapterEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers the three factories for `info.kind`. Safe to call concurrently;
/// intended to be called once per adapter package at process start (explicit
/// wiring, not an implicit linker-collected side effect).
pub fn register(
    info: AdapterInfo,
    tester: TesterFactory,
    discoverer: DiscovererFactory,
    executor: ExecutorFactory,
) {
    let kind = info.kind.clone();
    registry().write().insert(
        kind.clone(),
        AdapterEntry {
            info,
            tester,
            discoverer,
            executor,
        },
    );
    info!(%kind, "adapter registered");
}

/// Registry info for every registered kind, for discovery endpoints.
pub fn list() -> Vec<AdapterInfo> {
    registry().read().values().map(|e| e.info.clone()).collect()
}

/// Resolves `kind` and invokes its tester factory.
pub async fn build_tester(kind: &BackendKind, args: FactoryArgs) -> RegistryResult<Arc<dyn ConnectionTester>> {
    let factory = {
        let entries = registry().read();
        entries
            .get(kind)
            .map(|e| Arc::clone(&e.tester))
            .ok_or_else(|| RegistryError::NotSupported(kind.to_string()))?
    };
    Ok(factory(args).await?)
}

/// Resolves `kind` and invokes its schema-discoverer factory.
pub async fn build_discoverer(kind: &BackendKind, args: FactoryArgs) -> RegistryResult<Arc<dyn SchemaDiscoverer>> {
    let factory = {
        let entries = registry().read();
        entries
            .get(kind)
            .map(|e| Arc::clone(&e.discoverer))
            .ok_or_else(|| RegistryError::NotSupported(kind.to_string()))?
    };
    Ok(factory(args).await?)
}

/// Resolves `kind` and invokes its query-executor factory.
pub async fn build_executor(kind: &BackendKind, args: FactoryArgs) -> RegistryResult<Arc<dyn QueryExecutor>> {
    let factory = {
        let entries = registry().read();
        entries
            .get(kind)
            .map(|e| Arc::clone(&e.executor))
            .ok_or_else(|| RegistryError::NotSupported(kind.to_string()))?
    };
    Ok(factory(args).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsengine_pool::ManagerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopTester;
    impl ConnectionTester for NoopTester {
        fn test<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = CapabilityResult<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
        fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = CapabilityResult<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn test_kind(tag: &str) -> BackendKind {
        BackendKind::new(format!("test-{tag}-{}", std::process::id()))
    }

    fn test_args(manager: Arc<ConnectionManager>) -> FactoryArgs {
        FactoryArgs {
            raw_config: serde_json::json!({}),
            manager,
            project_id: "p".into(),
            user_id: "u".into(),
            datasource_id: "d".into(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn unregistered_kind_fails_not_supported() {
        let manager = ConnectionManager::spawn(ManagerConfig::default());
        let kind = test_kind("missing");
        let result = build_tester(&kind, test_args(manager)).await;
        assert!(matches!(result, Err(RegistryError::NotSupported(_))));
    }

    #[tokio::test]
    async fn registered_factory_is_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let kind = test_kind("present");

        let calls_clone = Arc::clone(&calls);
        register(
            AdapterInfo {
                kind: kind.clone(),
                display_name: "Test".into(),
                description: "test adapter".into(),
                icon_tag: "test".into(),
            },
            Arc::new(move |_args: FactoryArgs| {
                let calls = Arc::clone(&calls_clone);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(NoopTester) as Arc<dyn ConnectionTester>)
                }) as BoxFuture<CapabilityResult<Arc<dyn ConnectionTester>>>
            }),
            Arc::new(|_| Box::pin(async { Err(dsengine_capability::CapabilityError::Backend("unused".into())) })),
            Arc::new(|_| Box::pin(async { Err(dsengine_capability::CapabilityError::Backend("unused".into())) })),
        );

        let manager = ConnectionManager::spawn(ManagerConfig::default());
        let tester = build_tester(&kind, test_args(manager)).await.unwrap();
        tester.test(&CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(list().iter().any(|i| i.kind == kind));
    }
}
