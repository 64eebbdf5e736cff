/// Identity under which a managed connection is cached.
///
/// The connection string is deliberately not part of the key — two
/// `AcquireOrBuild` calls with equal keys are considered the same logical
/// datasource even if their connection strings differ, and will share a
/// pool. Callers that need to distinguish must issue distinct
/// `datasource_id`s.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub project_id: String,
    pub user_id: String,
    pub datasource_id: String,
}

impl PoolKey {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        datasource_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            datasource_id: datasource_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_triples_are_equal_keys() {
        let a = PoolKey::new("p1", "u1", "d1");
        let b = PoolKey::new("p1", "u1", "d1");
        assert_eq!(a, b);
    }

    #[test]
    fn any_differing_component_is_a_distinct_key() {
        let base = PoolKey::new("p1", "u1", "d1");
        assert_ne!(base, PoolKey::new("p2", "u1", "d1"));
        assert_ne!(base, PoolKey::new("p1", "u2", "d1"));
        assert_ne!(base, PoolKey::new("p1", "u1", "d2"));
    }
}
