//! Concrete adapters for each supported relational backend, registered
//! into `dsengine_registry` at process start via [`register_all`].

pub mod mysql;
pub mod params;
pub mod postgres;

/// Registers every built-in adapter. Call once during process start-up,
/// before any `AcquireOrBuild`/`build_tester`/`build_discoverer`/`build_executor`
/// call for a relational kind.
pub fn register_all() {
    postgres::register_adapter();
    mysql::register_adapter();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsengine_registry::list;

    #[test]
    fn registering_all_adapters_exposes_both_kinds() {
        register_all();
        let kinds: Vec<_> = list().into_iter().map(|info| info.kind.to_string()).collect();
        assert!(kinds.contains(&"relational-a".to_string()));
        assert!(kinds.contains(&"relational-b".to_string()));
    }
}
