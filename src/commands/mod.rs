pub mod feeds;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::manager::ConnectionManager;
    use crate::transport::mock::MockConnector;
    use crate::types::config::ManagerConfig;

    #[test]
    fn overview_returns_valid_json() {
        let manager =
            ConnectionManager::new(ManagerConfig::default(), Arc::new(MockConnector::new()))
                .unwrap();
        let summary = feeds::overview(&manager);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"connections\""));
        assert!(json.contains("\"status\":\"disconnected\""));
    }

    #[test]
    fn statuses_returns_list() {
        let manager =
            ConnectionManager::new(ManagerConfig::default(), Arc::new(MockConnector::new()))
                .unwrap();
        let json = serde_json::to_string(&feeds::statuses(&manager)).unwrap();
        // Should be a JSON array with one entry per default endpoint
        assert!(json.starts_with('['));
        assert_eq!(feeds::statuses(&manager).len(), 4);
    }
}
