//! Well-known label keys.
//!
//! Shared by the application label passes and by endpoint metadata so both
//! sides of a routing decision speak the same vocabulary.

/// Application name
pub const LABEL_APPLICATION: &str = "application";
/// Instance identifier
pub const LABEL_INSTANCE_ID: &str = "instance";
/// Instance address
pub const LABEL_INSTANCE_IP: &str = "ip";
/// Cloud provider
pub const LABEL_CLOUD: &str = "cloud";
/// Region
pub const LABEL_REGION: &str = "region";
/// Availability zone
pub const LABEL_ZONE: &str = "zone";
/// Cluster
pub const LABEL_CLUSTER: &str = "cluster";
/// Live space identifier
pub const LABEL_LIVE_SPACE_ID: &str = "liveSpaceId";
/// Unit rule identifier
pub const LABEL_RULE_ID: &str = "ruleId";
/// Unit
pub const LABEL_UNIT: &str = "unit";
/// Cell
pub const LABEL_CELL: &str = "cell";
/// Lane space identifier
pub const LABEL_LANE_SPACE_ID: &str = "laneSpaceId";
/// Lane
pub const LABEL_LANE: &str = "lane";
/// Service group
pub const LABEL_SERVICE_GROUP: &str = "group";
/// Service version
pub const LABEL_VERSION: &str = "version";
/// Agent version
pub const LABEL_AGENT_VERSION: &str = "agentVersion";
