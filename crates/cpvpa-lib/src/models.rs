//! Core data models for the autoscaler
//!
//! A [`ScalingConfig`] maps container names to per-class, per-resource
//! [`ScalingRule`]s. Everything here is a plain owned value: `Clone` yields a
//! fully independent copy, which is what lets the controller overlay a config
//! file onto the default without ever touching the default itself.

use crate::error::ConfigError;
use crate::quantity::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Cluster size observed at one poll instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterSample {
    pub nodes: u64,
    pub cores: u64,
}

impl ClusterSample {
    pub fn new(nodes: u64, cores: u64) -> Self {
        Self { nodes, cores }
    }
}

impl fmt::Display for ClusterSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ nodes={} cores={} }}", self.nodes, self.cores)
    }
}

/// Requests or limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementClass {
    Requests,
    Limits,
}

impl RequirementClass {
    pub const ALL: [RequirementClass; 2] = [RequirementClass::Requests, RequirementClass::Limits];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementClass::Requests => "requests",
            RequirementClass::Limits => "limits",
        }
    }
}

impl fmt::Display for RequirementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coefficients of the scaling function for one resource.
///
/// The target is `base + step * steps`, computed separately from the core
/// count and the node count, each capped at `max`, and the larger of the two
/// wins. Counts are rounded *up* to the next whole step: with
/// `cores_per_step = 4`, a 5-core cluster already counts as two steps. This
/// never under-provisions when the count falls between boundaries, but a
/// coarse `cores_per_step`/`nodes_per_step` can over-provision by nearly one
/// full `step`.
///
/// Absent fields compute as zero but are omitted when serialized, so an
/// explicit `"max": "0"` survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScalingRule {
    /// The baseline quantity required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Quantity>,

    /// Upper bound; absent or non-positive means uncapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Quantity>,

    /// Amount added per step of cluster growth
    #[serde(default, alias = "increment", skip_serializing_if = "Option::is_none")]
    pub step: Option<Quantity>,

    /// Cores per step; zero or negative disables the core axis
    #[serde(default, alias = "coresPerIncrement", skip_serializing_if = "Option::is_none")]
    pub cores_per_step: Option<i64>,

    /// Nodes per step; zero or negative disables the node axis
    #[serde(default, alias = "nodesPerIncrement", skip_serializing_if = "Option::is_none")]
    pub nodes_per_step: Option<i64>,
}

impl ScalingRule {
    fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.base.is_some_and(|q| q.is_negative()) {
            return Err(ConfigError::Parse(format!("{}: base must not be negative", path)));
        }
        if self.step.is_some_and(|q| q.is_negative()) {
            return Err(ConfigError::Parse(format!("{}: step must not be negative", path)));
        }
        Ok(())
    }
}

impl fmt::Display for ScalingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        if let Some(base) = &self.base {
            write!(f, "base={} ", base)?;
        }
        if let Some(max) = &self.max {
            write!(f, "max={} ", max)?;
        }
        if let Some(step) = &self.step {
            write!(f, "step={} ", step)?;
        }
        if let Some(cores) = self.cores_per_step {
            write!(f, "cores_per_step={} ", cores)?;
        }
        if let Some(nodes) = self.nodes_per_step {
            write!(f, "nodes_per_step={} ", nodes)?;
        }
        f.write_str("}")
    }
}

/// Per-container rules, keyed by resource name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerScalingConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, ScalingRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, ScalingRule>,
}

impl ContainerScalingConfig {
    pub fn rules(&self, class: RequirementClass) -> &BTreeMap<String, ScalingRule> {
        match class {
            RequirementClass::Requests => &self.requests,
            RequirementClass::Limits => &self.limits,
        }
    }
}

fn write_rules(f: &mut fmt::Formatter<'_>, rules: &BTreeMap<String, ScalingRule>) -> fmt::Result {
    f.write_str("{ ")?;
    for (resource, rule) in rules {
        write!(f, "[{}]: {}, ", resource, rule)?;
    }
    f.write_str("}")
}

impl fmt::Display for ContainerScalingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ requests: ")?;
        write_rules(f, &self.requests)?;
        f.write_str(", limits: ")?;
        write_rules(f, &self.limits)?;
        f.write_str(" }")
    }
}

/// Scaling rules for every container of the target, keyed by container name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScalingConfig(BTreeMap<String, ContainerScalingConfig>);

impl ScalingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON document; nothing is returned on any error
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: ScalingConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (container, cfg) in &self.0 {
            for class in RequirementClass::ALL {
                for (resource, rule) in cfg.rules(class) {
                    rule.validate(&format!("{}.{}[{}]", container, class, resource))?;
                }
            }
        }
        Ok(())
    }

    /// A new config where each container named in `overrides` replaces the
    /// corresponding entry of `self`; all other containers are kept as-is.
    pub fn overlaid_with(&self, overrides: &ScalingConfig) -> ScalingConfig {
        let mut merged = self.clone();
        for (container, cfg) in &overrides.0 {
            merged.0.insert(container.clone(), cfg.clone());
        }
        merged
    }

    pub fn insert(&mut self, container: impl Into<String>, cfg: ContainerScalingConfig) {
        self.0.insert(container.into(), cfg);
    }

    pub fn get(&self, container: &str) -> Option<&ContainerScalingConfig> {
        self.0.get(container)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ContainerScalingConfig> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ScalingConfig {
    type Item = (&'a String, &'a ContainerScalingConfig);
    type IntoIter = btree_map::Iter<'a, String, ContainerScalingConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ScalingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (container, cfg) in &self.0 {
            write!(f, "[{}]: {}, ", container, cfg)?;
        }
        f.write_str("}")
    }
}

/// Computed requests and limits for one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

impl ResourceRequirements {
    pub fn class_mut(&mut self, class: RequirementClass) -> &mut BTreeMap<String, Quantity> {
        match class {
            RequirementClass::Requests => &mut self.requests,
            RequirementClass::Limits => &mut self.limits,
        }
    }

    pub fn class(&self, class: RequirementClass) -> &BTreeMap<String, Quantity> {
        match class {
            RequirementClass::Requests => &self.requests,
            RequirementClass::Limits => &self.limits,
        }
    }
}

/// Computed requirements for every container, keyed by container name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRequirementSet(BTreeMap<String, ResourceRequirements>);

impl ResourceRequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requirements for a container, created empty on first use
    pub fn container_mut(&mut self, container: &str) -> &mut ResourceRequirements {
        self.0.entry(container.to_string()).or_default()
    }

    pub fn get(&self, container: &str) -> Option<&ResourceRequirements> {
        self.0.get(container)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ResourceRequirements> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResourceRequirementSet {
    type Item = (&'a String, &'a ResourceRequirements);
    type IntoIter = btree_map::Iter<'a, String, ResourceRequirements>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ResourceRequirementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (container, reqs) in &self.0 {
            write!(f, "[{}]: {{ ", container)?;
            for class in RequirementClass::ALL {
                write!(f, "{}: {{ ", class)?;
                for (resource, quantity) in reqs.class(class) {
                    write!(f, "{}={} ", resource, quantity)?;
                }
                f.write_str("} ")?;
            }
            f.write_str("}, ")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
      "fake-agent": {
        "requests": {
          "cpu": { "base": "10m", "step": "1m", "coresPerStep": 1 },
          "memory": { "base": "8Mi", "max": "1Gi", "increment": "1Mi", "nodesPerIncrement": 2 }
        },
        "limits": {
          "memory": { "base": "16Mi" }
        }
      }
    }"#;

    #[test]
    fn test_parse_scaling_config() {
        let config = ScalingConfig::from_json(SAMPLE.as_bytes()).unwrap();
        let agent = config.get("fake-agent").unwrap();

        let cpu = &agent.requests["cpu"];
        assert_eq!(cpu.base, Some(Quantity::parse("10m").unwrap()));
        assert_eq!(cpu.cores_per_step, Some(1));
        assert_eq!(cpu.max, None);

        let memory = &agent.requests["memory"];
        assert_eq!(memory.step, Some(Quantity::parse("1Mi").unwrap()));
        assert_eq!(memory.nodes_per_step, Some(2));
        assert_eq!(agent.limits.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_documents() {
        assert!(matches!(
            ScalingConfig::from_json(b"{ not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(ScalingConfig::from_json(br#"{"c": {"requests": {"cpu": {"base": "lots"}}}}"#).is_err());
        assert!(ScalingConfig::from_json(br#"{"c": {"requests": {"cpu": {"bsae": "1"}}}}"#).is_err());
        assert!(ScalingConfig::from_json(br#"{"c": {"requests": {"cpu": {"coresPerStep": "x"}}}}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_negative_base_and_step() {
        let err = ScalingConfig::from_json(br#"{"c": {"limits": {"cpu": {"base": "-1"}}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("c.limits[cpu]"));
        assert!(ScalingConfig::from_json(br#"{"c": {"requests": {"cpu": {"step": "-5m"}}}}"#).is_err());
        // A negative max is legal and simply means "no cap".
        assert!(ScalingConfig::from_json(br#"{"c": {"requests": {"cpu": {"max": "-1"}}}}"#).is_ok());
    }

    #[test]
    fn test_absent_fields_round_trip() {
        let input = br#"{"c":{"requests":{"cpu":{"base":"10m","max":"0"}}}}"#;
        let config = ScalingConfig::from_json(input).unwrap();
        let output = serde_json::to_string(&config).unwrap();
        assert_eq!(output, r#"{"c":{"requests":{"cpu":{"base":"10m","max":"0"}}}}"#);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = ScalingConfig::from_json(SAMPLE.as_bytes()).unwrap();
        let mut copy = original.clone();
        copy.0
            .get_mut("fake-agent")
            .unwrap()
            .requests
            .get_mut("cpu")
            .unwrap()
            .base = Some(Quantity::parse("999").unwrap());

        assert_eq!(
            original.get("fake-agent").unwrap().requests["cpu"].base,
            Some(Quantity::parse("10m").unwrap())
        );
        assert_ne!(original, copy);
    }

    #[test]
    fn test_overlay_replaces_whole_containers() {
        let default = ScalingConfig::from_json(
            br#"{"a": {"requests": {"cpu": {"base": "1"}}}, "b": {"limits": {"memory": {"base": "1Gi"}}}}"#,
        )
        .unwrap();
        let overrides =
            ScalingConfig::from_json(br#"{"a": {"limits": {"cpu": {"base": "2"}}}}"#).unwrap();

        let merged = default.overlaid_with(&overrides);

        let a = merged.get("a").unwrap();
        assert!(a.requests.is_empty());
        assert_eq!(a.limits["cpu"].base, Some(Quantity::parse("2").unwrap()));
        assert_eq!(merged.get("b"), default.get("b"));
        // The default itself is untouched.
        assert_eq!(default.get("a").unwrap().requests.len(), 1);
    }

    #[test]
    fn test_rule_display_field_order() {
        let rule = ScalingRule {
            base: Some(Quantity::parse("10").unwrap()),
            max: Some(Quantity::parse("100").unwrap()),
            step: Some(Quantity::parse("2").unwrap()),
            cores_per_step: Some(4),
            nodes_per_step: Some(2),
        };
        assert_eq!(
            rule.to_string(),
            "{ base=10 max=100 step=2 cores_per_step=4 nodes_per_step=2 }"
        );

        let sparse = ScalingRule {
            step: Some(Quantity::parse("5m").unwrap()),
            ..Default::default()
        };
        assert_eq!(sparse.to_string(), "{ step=5m }");
    }

    #[test]
    fn test_config_display_is_sorted() {
        let config = ScalingConfig::from_json(
            br#"{"zeta": {"requests": {"cpu": {"base": "1"}}}, "alpha": {}}"#,
        )
        .unwrap();
        assert_eq!(
            config.to_string(),
            "{ [alpha]: { requests: { }, limits: { } }, [zeta]: { requests: { [cpu]: { base=1 }, }, limits: { } }, }"
        );
    }
}
