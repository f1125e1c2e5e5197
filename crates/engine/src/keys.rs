/// Storage key layout under one namespace.
#[derive(Debug, Clone)]
pub struct StoreKeys {
    namespace: String,
}

impl StoreKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn visitor_id(&self) -> String {
        format!("{}:visitor_id", self.namespace)
    }

    pub fn experiments(&self) -> String {
        format!("{}:experiments", self.namespace)
    }

    pub fn assignment(&self, experiment_id: &str, visitor_id: &str) -> String {
        format!("{}{visitor_id}", self.assignment_prefix(experiment_id))
    }

    pub fn assignment_prefix(&self, experiment_id: &str) -> String {
        format!("{}:assignment:{experiment_id}:", self.namespace)
    }

    pub fn conversions(&self, experiment_id: &str, visitor_id: &str) -> String {
        format!("{}{visitor_id}", self.conversions_prefix(experiment_id))
    }

    pub fn conversions_prefix(&self, experiment_id: &str) -> String {
        format!("{}:conversions:{experiment_id}:", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let keys = StoreKeys::new("splitline");
        assert_eq!(keys.visitor_id(), "splitline:visitor_id");
        assert_eq!(keys.experiments(), "splitline:experiments");
        assert_eq!(
            keys.assignment("btn-color", "abc123"),
            "splitline:assignment:btn-color:abc123"
        );
        assert!(keys
            .conversions("btn-color", "abc123")
            .starts_with(&keys.conversions_prefix("btn-color")));
    }
}
