//! End-to-end runs over generated topologies.

use std::sync::Arc;

use megamerger_protocol::{MegaMergerNode, NodeConfig, NodeId, Status, Topology};
use megamerger_sim::{
    random_connected, run_actors, verify_run, ProtocolEvent, Scenario, SimError, Simulation,
    SimulationConfig,
};
use megamerger_topology::reference_mst;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn settle(topology: Topology, config: SimulationConfig) -> Simulation {
    let mut sim = Simulation::new(topology, config).unwrap();
    sim.run().unwrap();
    sim
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_graphs_build_the_mst(
        n in 1usize..24,
        extra in 0usize..30,
        graph_seed in any::<u64>(),
        seed in any::<u64>(),
        max_delay in 1u64..40,
    ) {
        let topology = random_connected(n, extra, &mut StdRng::seed_from_u64(graph_seed)).unwrap();
        let expected = reference_mst(&topology);
        let sim = settle(
            topology,
            SimulationConfig::default().with_seed(seed).with_delays(1, max_delay),
        );

        let tree = verify_run(sim.topology(), &sim.views(), sim.events()).unwrap();
        prop_assert_eq!(tree.links.len(), n - 1);
        prop_assert!((tree.total_weight - expected.total_weight).abs() < 1e-9);
    }

    #[test]
    fn single_initiator_wakes_everyone(
        n in 2usize..16,
        graph_seed in any::<u64>(),
        starter in any::<usize>(),
    ) {
        let topology = random_connected(n, n, &mut StdRng::seed_from_u64(graph_seed)).unwrap();
        let config = SimulationConfig::default().with_initiators([NodeId::from(starter % n)]);
        let sim = settle(topology, config);
        prop_assert!(verify_run(sim.topology(), &sim.views(), sim.events()).is_ok());
    }
}

#[test]
fn lone_node_leads_itself() {
    let sim = settle(Topology::new(1), SimulationConfig::default());
    assert_eq!(sim.summary().leaders, vec![NodeId(0)]);
    assert_eq!(sim.summary().messages, 0);
}

#[test]
fn forest_has_one_leader_per_component() {
    // Two triangles and an isolated node.
    let topology = Topology::from_links(
        7,
        [
            (0, 1, 3.0),
            (1, 2, 1.0),
            (0, 2, 2.0),
            (3, 4, 5.0),
            (4, 5, 4.0),
            (3, 5, 6.0),
        ],
    )
    .unwrap();
    let sim = settle(topology, SimulationConfig::default());
    let tree = verify_run(sim.topology(), &sim.views(), sim.events()).unwrap();

    assert_eq!(tree.leaders.len(), 3);
    assert!(tree.leaders.contains(&NodeId(6)));
    assert_eq!(tree.total_weight, 3.0 + 9.0);
}

#[test]
fn equal_weights_break_ties_by_id() {
    let topology = Topology::complete(6, |_, _| 1.0).unwrap();
    let sim = settle(topology, SimulationConfig::default().with_seed(3));
    let tree = verify_run(sim.topology(), &sim.views(), sim.events()).unwrap();

    // Lowest keys all touch node 0.
    assert!(tree.links.iter().all(|l| l.a == NodeId(0) || l.b == NodeId(0)));
}

#[test]
fn scenarios_run_end_to_end() {
    for scenario in ["ring:9", "grid:4x3", "random:30"] {
        let scenario: Scenario = scenario.parse().unwrap();
        let sim = settle(scenario.build(5).unwrap(), SimulationConfig::default());
        assert!(
            verify_run(sim.topology(), &sim.views(), sim.events()).is_ok(),
            "{scenario} failed"
        );
    }
}

#[test]
fn routing_phase_fills_every_table() {
    let topology = Scenario::Grid(3, 3).build(8).unwrap();
    let sim = settle(topology, SimulationConfig::default().with_routes(true));

    assert!(sim.is_finished());
    for node in sim.nodes() {
        let table = node.routing_table().unwrap();
        assert_eq!(table.len(), 9);
        assert_eq!(table.distance(node.uid()), Some(0.0));
    }
}

#[test]
fn timeline_tracks_every_message() {
    let topology = Topology::ring(&[2.0, 7.0, 1.0, 4.0]).unwrap();
    let sim = settle(topology, SimulationConfig::default());

    let sent = sim
        .events()
        .iter()
        .filter(|e| matches!(e, ProtocolEvent::MessageSent { .. }))
        .count() as u64;
    assert_eq!(sent, sim.summary().messages);

    let json = serde_json::to_string(sim.events()).unwrap();
    let back: Vec<ProtocolEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sim.events());
}

#[test]
fn step_limit_is_reported() {
    let topology = Scenario::Random(12).build(1).unwrap();
    let mut sim = Simulation::new(topology, SimulationConfig::default().with_max_steps(10)).unwrap();
    assert!(matches!(sim.run(), Err(SimError::StepLimit(10))));
}

#[tokio::test]
async fn actors_build_the_same_tree() {
    let topology = Arc::new(Scenario::Random(20).build(4).unwrap());
    let initiators: Vec<NodeId> = topology.node_ids().step_by(3).collect();
    let nodes = run_actors(Arc::clone(&topology), NodeConfig::default(), &initiators)
        .await
        .unwrap();

    let views: Vec<_> = nodes.iter().map(MegaMergerNode::view).collect();
    let tree = verify_run(&topology, &views, &[]).unwrap();
    assert_eq!(tree.total_weight, reference_mst(&topology).total_weight);
    assert_eq!(nodes.iter().filter(|n| n.status() == Status::Leader).count(), 1);
}

#[test]
fn actors_gather_routes() {
    let topology = Arc::new(Topology::ring(&[3.0, 1.0, 2.0, 5.0, 4.0]).unwrap());
    let nodes = tokio_test::block_on(run_actors(
        Arc::clone(&topology),
        NodeConfig::default().with_routes(true),
        &[NodeId(2)],
    ))
    .unwrap();

    assert!(nodes.iter().all(MegaMergerNode::is_finished));
    let table = nodes[0].routing_table().unwrap();
    assert_eq!(table.distance(NodeId(2)), Some(4.0));
}
