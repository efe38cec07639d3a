//! Serializable topology description.
//!
//! ```json
//! { "nodes": 3, "links": [ { "a": 0, "b": 1, "weight": 2.0 } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::{NodeId, Topology, TopologyError};

/// One link in a [`TopologySpec`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: u64,
    pub b: u64,
    pub weight: f64,
}

/// On-disk form of a [`Topology`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub nodes: usize,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

impl TryFrom<TopologySpec> for Topology {
    type Error = TopologyError;

    fn try_from(spec: TopologySpec) -> Result<Self, Self::Error> {
        Topology::from_links(
            spec.nodes,
            spec.links.into_iter().map(|l| (l.a, l.b, l.weight)),
        )
    }
}

impl From<&Topology> for TopologySpec {
    fn from(topology: &Topology) -> Self {
        Self {
            nodes: topology.node_count(),
            links: topology
                .links()
                .iter()
                .map(|l| LinkSpec {
                    a: l.a.value(),
                    b: l.b.value(),
                    weight: l.weight,
                })
                .collect(),
        }
    }
}

impl TopologySpec {
    /// Validate into a [`Topology`].
    pub fn build(self) -> Result<Topology, TopologyError> {
        Topology::try_from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_validates() {
        let json = r#"{"nodes": 3, "links": [{"a": 0, "b": 1, "weight": 2.0}, {"a": 1, "b": 2, "weight": 1.5}]}"#;
        let spec: TopologySpec = serde_json::from_str(json).unwrap();
        let topology = spec.build().unwrap();
        assert_eq!(topology.link_count(), 2);
        assert_eq!(topology.port_weights(NodeId(1)), vec![2.0, 1.5]);
    }

    #[test]
    fn links_default_to_empty() {
        let spec: TopologySpec = serde_json::from_str(r#"{"nodes": 1}"#).unwrap();
        assert_eq!(spec.build().unwrap().node_count(), 1);
    }

    #[test]
    fn bad_link_is_reported() {
        let json = r#"{"nodes": 2, "links": [{"a": 0, "b": 0, "weight": 1.0}]}"#;
        let spec: TopologySpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.build(), Err(TopologyError::SelfLoop(NodeId(0))));
    }

    #[test]
    fn spec_reflects_topology() {
        let topology = Topology::chain(&[3.0]).unwrap();
        let spec = TopologySpec::from(&topology);
        assert_eq!(spec.nodes, 2);
        assert_eq!(spec.links, vec![LinkSpec { a: 0, b: 1, weight: 3.0 }]);
    }
}
