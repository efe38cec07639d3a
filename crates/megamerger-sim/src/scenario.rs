//! Named topologies for the command line and tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use megamerger_protocol::{NodeId, Topology};
use megamerger_topology::TopologySpec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SimError};

/// Largest random weight handed out by generated scenarios.
pub const MAX_WEIGHT: u32 = 100;

/// Where a topology comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// JSON topology file
    File(PathBuf),
    /// Cycle of `n` nodes
    Ring(usize),
    /// `width` x `height` grid
    Grid(usize, usize),
    /// Random connected graph on `n` nodes
    Random(usize),
}

impl FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || SimError::Config(format!("cannot parse scenario {s:?}"));
        match s.split_once(':') {
            Some(("ring", n)) => n.parse().map(Scenario::Ring).map_err(|_| bad()),
            Some(("random", n)) => n.parse().map(Scenario::Random).map_err(|_| bad()),
            Some(("grid", dims)) => {
                let (w, h) = dims.split_once('x').ok_or_else(bad)?;
                Ok(Scenario::Grid(
                    w.parse().map_err(|_| bad())?,
                    h.parse().map_err(|_| bad())?,
                ))
            }
            Some(_) => Err(bad()),
            None => Ok(Scenario::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::File(path) => write!(f, "{}", path.display()),
            Scenario::Ring(n) => write!(f, "ring:{n}"),
            Scenario::Grid(w, h) => write!(f, "grid:{w}x{h}"),
            Scenario::Random(n) => write!(f, "random:{n}"),
        }
    }
}

impl Scenario {
    /// Build the topology; generated weights come from `seed`.
    pub fn build(&self, seed: u64) -> Result<Topology> {
        let mut rng = StdRng::seed_from_u64(seed);
        match self {
            Scenario::File(path) => load_topology(path),
            Scenario::Ring(n) => {
                let weights: Vec<f64> = (0..*n).map(|_| random_weight(&mut rng)).collect();
                Ok(Topology::ring(&weights)?)
            }
            Scenario::Grid(w, h) => Ok(Topology::grid(*w, *h, |_, _| random_weight(&mut rng))?),
            Scenario::Random(n) => random_connected(*n, *n / 2, &mut rng),
        }
    }
}

fn random_weight<R: Rng>(rng: &mut R) -> f64 {
    f64::from(rng.gen_range(1..=MAX_WEIGHT))
}

/// A random spanning tree over `n` nodes plus up to `extra` additional links.
///
/// Extra links that would be self loops or parallel links are skipped.
pub fn random_connected<R: Rng>(n: usize, extra: usize, rng: &mut R) -> Result<Topology> {
    if n == 0 {
        return Err(SimError::Config("a random topology needs at least one node".into()));
    }
    let mut topology = Topology::new(n);
    for i in 1..n {
        let parent = rng.gen_range(0..i);
        let weight = random_weight(rng);
        topology.add_link(NodeId::from(i), NodeId::from(parent), weight)?;
    }
    for _ in 0..extra {
        let a = NodeId::from(rng.gen_range(0..n));
        let b = NodeId::from(rng.gen_range(0..n));
        if a == b || topology.find_link(a, b).is_some() {
            continue;
        }
        let weight = random_weight(rng);
        topology.add_link(a, b, weight)?;
    }
    Ok(topology)
}

/// Read a JSON topology file.
pub fn load_topology(path: &Path) -> Result<Topology> {
    let raw = std::fs::read_to_string(path)?;
    let spec: TopologySpec = serde_json::from_str(&raw)?;
    Ok(spec.build()?)
}

/// Write `topology` as JSON.
pub fn save_topology(path: &Path, topology: &Topology) -> Result<()> {
    let json = serde_json::to_string_pretty(&TopologySpec::from(topology))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scenarios() {
        assert_eq!("ring:8".parse::<Scenario>().unwrap(), Scenario::Ring(8));
        assert_eq!("grid:3x4".parse::<Scenario>().unwrap(), Scenario::Grid(3, 4));
        assert_eq!("random:20".parse::<Scenario>().unwrap(), Scenario::Random(20));
        assert_eq!(
            "net.json".parse::<Scenario>().unwrap(),
            Scenario::File(PathBuf::from("net.json"))
        );
        assert!("grid:3".parse::<Scenario>().is_err());
        assert!("ring:x".parse::<Scenario>().is_err());
        assert!("torus:4".parse::<Scenario>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for s in ["ring:5", "grid:2x7", "random:12"] {
            assert_eq!(s.parse::<Scenario>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn generated_scenarios_are_connected() {
        for scenario in [Scenario::Ring(6), Scenario::Grid(3, 3), Scenario::Random(15)] {
            let topology = scenario.build(7).unwrap();
            assert!(topology.is_connected(), "{scenario} is split");
        }
        assert_eq!(Scenario::Grid(3, 3).build(1).unwrap().link_count(), 12);
    }

    #[test]
    fn same_seed_same_weights() {
        let a = Scenario::Random(10).build(3).unwrap();
        let b = Scenario::Random(10).build(3).unwrap();
        assert_eq!(a.links(), b.links());
    }

    #[test]
    fn lone_random_node() {
        let topology = random_connected(1, 4, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!((topology.node_count(), topology.link_count()), (1, 0));
        assert!(random_connected(0, 0, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("megamerger-scenario-{}.json", std::process::id()));
        let topology = Scenario::Ring(4).build(11).unwrap();
        save_topology(&path, &topology).unwrap();

        let loaded = Scenario::File(path.clone()).build(0).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.links(), topology.links());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_topology(Path::new("/nonexistent/megamerger.json")).unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
