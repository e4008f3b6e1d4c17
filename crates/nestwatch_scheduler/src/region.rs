//! Region routing (§4.1 "Region routing").
//!
//! Decides which routing key(s) a dispatch uses. Kept as plain functions
//! over the data model so the tick loop and its tests don't need a bus.

use nestwatch_protocol::defaults::amqp;
use nestwatch_protocol::types::Service;

/// One routing key per selected region, or a single `check_service_once`
/// targeting any worker when the service has no region preference.
pub fn routing_keys(service: &Service) -> Vec<String> {
    if service.regions.regions.is_empty() {
        vec![amqp::ROUTING_KEY_CHECK_SERVICE_ONCE.to_string()]
    } else {
        service
            .regions
            .regions
            .iter()
            .map(|region| amqp::routing_key_for_region(region))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_protocol::types::{RegionSelection, RegionStrategy, ServiceConfig};

    fn service_with_regions(regions: Vec<&str>) -> Service {
        Service {
            id: "s1".into(),
            nest_id: "n1".into(),
            name: "test".into(),
            target: "https://example.com".into(),
            interval_secs: 30,
            config: ServiceConfig::Ping,
            regions: RegionSelection {
                regions: regions.into_iter().map(String::from).collect(),
                strategy: RegionStrategy::AllSelected,
                min_regions: 1,
                max_regions: 2,
            },
            notification_sinks: vec![],
            active: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn no_regions_routes_to_any_worker() {
        let service = service_with_regions(vec![]);
        assert_eq!(routing_keys(&service), vec!["check_service_once"]);
    }

    #[test]
    fn two_regions_produce_two_distinct_routing_keys() {
        let service = service_with_regions(vec!["us-east-1", "eu-west-1"]);
        assert_eq!(
            routing_keys(&service),
            vec![
                "check_service_once.us-east-1".to_string(),
                "check_service_once.eu-west-1".to_string()
            ]
        );
    }
}
