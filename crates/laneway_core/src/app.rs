//! Application identity and label passes.
//!
//! Labels are emitted through a callback rather than collected into a map,
//! so registration and telemetry collaborators can stream them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::InstanceId;
use crate::labels::*;

/// Physical and logical location of the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    /// Cloud provider
    pub cloud: Option<String>,
    /// Region
    pub region: Option<String>,
    /// Availability zone
    pub zone: Option<String>,
    /// Cluster
    pub cluster: Option<String>,
    /// Instance address
    pub ip: Option<String>,
    /// Live space this instance belongs to
    pub live_space_id: Option<String>,
    /// Unit rule in effect
    pub unit_rule_id: Option<String>,
    /// Unit
    pub unit: Option<String>,
    /// Cell
    pub cell: Option<String>,
    /// Lane space this instance belongs to
    pub lane_space_id: Option<String>,
    /// Lane
    pub lane: Option<String>,
}

impl Location {
    /// Not part of any live space
    #[must_use]
    pub fn is_liveless(&self) -> bool {
        self.live_space_id.as_deref().is_none_or(str::is_empty)
    }

    /// Not part of any lane space
    #[must_use]
    pub fn is_laneless(&self) -> bool {
        self.lane_space_id.as_deref().is_none_or(str::is_empty)
    }

    /// Set the zone
    #[must_use]
    pub fn with_zone(mut self, region: &str, zone: &str) -> Self {
        self.region = Some(region.to_string());
        self.zone = Some(zone.to_string());
        self
    }

    /// Place in a live space
    #[must_use]
    pub fn with_live(mut self, live_space_id: &str, unit: &str, cell: &str) -> Self {
        self.live_space_id = Some(live_space_id.to_string());
        self.unit = Some(unit.to_string());
        self.cell = Some(cell.to_string());
        self
    }

    /// Place in a lane space
    #[must_use]
    pub fn with_lane(mut self, lane_space_id: &str, lane: &str) -> Self {
        self.lane_space_id = Some(lane_space_id.to_string());
        self.lane = Some(lane.to_string());
        self
    }
}

/// Service exposed by the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppService {
    /// Service name
    pub name: Option<String>,
    /// Service group
    pub group: Option<String>,
    /// Service level metadata, emitted verbatim as labels
    pub meta: BTreeMap<String, String>,
}

/// Application identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application name
    pub name: String,
    /// Instance identifier
    #[serde(default)]
    pub instance: InstanceId,
    /// Exposed service
    #[serde(default)]
    pub service: Option<AppService>,
    /// Location
    #[serde(default)]
    pub location: Option<Location>,
    /// Free-form metadata
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Application {
    /// Create an application with a fresh instance id
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instance: InstanceId::new(),
            service: None,
            location: None,
            meta: BTreeMap::new(),
        }
    }

    /// Set the service
    #[must_use]
    pub fn with_service(mut self, service: AppService) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the location
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    /// Metadata value
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Process id of the running application
    #[must_use]
    pub fn pid() -> u32 {
        std::process::id()
    }

    /// Labels used when registering this instance
    pub fn label_registry(&self, consumer: &mut dyn FnMut(&str, &str)) {
        self.label_instance(consumer);
        if let Some(location) = &self.location {
            label_zone(location, consumer);
            label_live_space(location, consumer);
            label_lane(location, consumer);
        }
        self.label_service(consumer);
    }

    /// Labels used when synchronizing policies for this instance
    pub fn label_sync(&self, consumer: &mut dyn FnMut(&str, &str)) {
        self.label_instance(consumer);
        if let Some(location) = &self.location {
            label_zone(location, consumer);
            label_live_space(location, consumer);
            label_lane(location, consumer);
            accept(consumer, LABEL_INSTANCE_IP, location.ip.as_deref());
        }
        accept(consumer, LABEL_AGENT_VERSION, self.meta(LABEL_AGENT_VERSION));
    }

    fn label_instance(&self, consumer: &mut dyn FnMut(&str, &str)) {
        accept(consumer, LABEL_APPLICATION, Some(self.name.as_str()));
        accept(consumer, LABEL_INSTANCE_ID, Some(self.instance.to_string().as_str()));
    }

    fn label_service(&self, consumer: &mut dyn FnMut(&str, &str)) {
        if let Some(service) = &self.service {
            accept(consumer, LABEL_SERVICE_GROUP, service.group.as_deref());
            for (key, value) in &service.meta {
                consumer(key, value);
            }
        }
    }
}

fn label_zone(location: &Location, consumer: &mut dyn FnMut(&str, &str)) {
    accept(consumer, LABEL_CLOUD, location.cloud.as_deref());
    accept(consumer, LABEL_REGION, location.region.as_deref());
    accept(consumer, LABEL_ZONE, location.zone.as_deref());
    accept(consumer, LABEL_CLUSTER, location.cluster.as_deref());
}

fn label_live_space(location: &Location, consumer: &mut dyn FnMut(&str, &str)) {
    if !location.is_liveless() {
        accept(consumer, LABEL_LIVE_SPACE_ID, location.live_space_id.as_deref());
        accept(consumer, LABEL_RULE_ID, location.unit_rule_id.as_deref());
        accept(consumer, LABEL_UNIT, location.unit.as_deref());
        accept(consumer, LABEL_CELL, location.cell.as_deref());
    }
}

fn label_lane(location: &Location, consumer: &mut dyn FnMut(&str, &str)) {
    if !location.is_laneless() {
        accept(consumer, LABEL_LANE_SPACE_ID, location.lane_space_id.as_deref());
        accept(consumer, LABEL_LANE, location.lane.as_deref());
    }
}

fn accept(consumer: &mut dyn FnMut(&str, &str), key: &str, value: Option<&str>) {
    if let Some(value) = value {
        consumer(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(app: &Application, sync: bool) -> Vec<(String, String)> {
        let mut labels = Vec::new();
        let mut consumer = |k: &str, v: &str| labels.push((k.to_string(), v.to_string()));
        if sync {
            app.label_sync(&mut consumer);
        } else {
            app.label_registry(&mut consumer);
        }
        labels
    }

    fn keys(labels: &[(String, String)]) -> Vec<&str> {
        labels.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_minimal_application_labels() {
        let app = Application::new("order");
        let labels = collect(&app, false);
        assert_eq!(keys(&labels), vec![LABEL_APPLICATION, LABEL_INSTANCE_ID]);
        assert_eq!(labels[0].1, "order");
        assert_eq!(labels[1].1, app.instance.to_string());
    }

    #[test]
    fn test_live_and_lane_aware_labels() {
        let location = Location::default()
            .with_zone("cn-north", "az1")
            .with_live("space-1", "unit-a", "cell-1")
            .with_lane("lanes", "beta");
        let mut service = AppService {
            group: Some("blue".to_string()),
            ..Default::default()
        };
        service.meta.insert("tier".to_string(), "gold".to_string());
        let app = Application::new("order")
            .with_location(location)
            .with_service(service);

        let labels = collect(&app, false);
        let keys = keys(&labels);
        assert!(keys.contains(&LABEL_REGION));
        assert!(keys.contains(&LABEL_ZONE));
        assert!(keys.contains(&LABEL_LIVE_SPACE_ID));
        assert!(keys.contains(&LABEL_UNIT));
        assert!(keys.contains(&LABEL_CELL));
        assert!(keys.contains(&LABEL_LANE));
        assert!(keys.contains(&LABEL_SERVICE_GROUP));
        assert!(keys.contains(&"tier"));
        // absent values are skipped
        assert!(!keys.contains(&LABEL_CLOUD));
        assert!(!keys.contains(&LABEL_RULE_ID));
    }

    #[test]
    fn test_liveless_location_skips_live_labels() {
        let location = Location {
            unit: Some("unit-a".to_string()),
            lane: Some("beta".to_string()),
            ..Default::default()
        };
        assert!(location.is_liveless());
        assert!(location.is_laneless());

        let app = Application::new("order").with_location(location);
        let labels = collect(&app, false);
        let keys = keys(&labels);
        assert!(!keys.contains(&LABEL_UNIT));
        assert!(!keys.contains(&LABEL_LANE));
    }

    #[test]
    fn test_sync_labels() {
        let location = Location {
            ip: Some("10.0.0.7".to_string()),
            ..Default::default()
        };
        let app = Application::new("order")
            .with_location(location)
            .with_service(AppService {
                group: Some("blue".to_string()),
                ..Default::default()
            })
            .with_meta(LABEL_AGENT_VERSION, "1.4.0");

        let labels = collect(&app, true);
        let keys = keys(&labels);
        assert!(keys.contains(&LABEL_INSTANCE_IP));
        assert!(keys.contains(&LABEL_AGENT_VERSION));
        // the sync pass carries no service labels
        assert!(!keys.contains(&LABEL_SERVICE_GROUP));
    }

    #[test]
    fn test_application_from_json() {
        let json = r#"{
            "name": "order",
            "location": {"region": "r1", "zone": "z1", "laneSpaceId": "ls", "lane": "gray"},
            "service": {"group": "g1", "meta": {"weight": "100"}}
        }"#;
        let app: Application = serde_json::from_str(json).unwrap();
        assert_eq!(app.name, "order");
        let location = app.location.as_ref().unwrap();
        assert!(!location.is_laneless());
        assert_eq!(location.lane.as_deref(), Some("gray"));
    }

    proptest! {
        #[test]
        fn prop_labels_never_emit_empty_keys(
            zone in proptest::option::of("[a-z]{1,8}"),
            unit in proptest::option::of("[a-z]{1,8}"),
            lane in proptest::option::of("[a-z]{1,8}"),
        ) {
            let location = Location {
                zone,
                unit,
                lane,
                live_space_id: Some("space".to_string()),
                lane_space_id: Some("lanes".to_string()),
                ..Default::default()
            };
            let app = Application::new("svc").with_location(location);
            let labels = collect(&app, false);
            for (key, _) in &labels {
                prop_assert!(!key.is_empty());
            }
            prop_assert_eq!(labels[0].0.as_str(), LABEL_APPLICATION);
        }
    }
}
