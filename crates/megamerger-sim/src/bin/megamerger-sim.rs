//! MegaMerger simulation runner
//!
//! Build a topology, run the protocol over it and check the resulting tree.
//!
//! ```text
//! megamerger-sim [topology.json | ring:N | grid:WxH | random:N] [seed] [--timeline out.json] [--actors]
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use megamerger_protocol::MegaMergerNode;
use megamerger_sim::{
    check_termination, run_actors, verify_run, NetworkSnapshot, Scenario, Simulation, SimulationConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "megamerger_sim=info,megamerger_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line args
    let mut positional = Vec::new();
    let mut timeline: Option<PathBuf> = None;
    let mut actors = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--timeline" => {
                timeline = Some(args.next().ok_or("--timeline needs a path")?.into());
            }
            "--actors" => actors = true,
            _ => positional.push(arg),
        }
    }

    let scenario: Scenario = positional.first().map_or("random:16", String::as_str).parse()?;
    let mut config = SimulationConfig::from_env()?;
    if let Some(seed) = positional.get(1) {
        config = config.with_seed(seed.parse()?);
    }

    let topology = scenario.build(config.seed)?;

    println!("MegaMerger Simulation");
    println!("=====================");
    println!();
    println!(
        "Scenario {scenario}: {} nodes, {} links, seed {}",
        topology.node_count(),
        topology.link_count(),
        config.seed
    );

    if actors {
        let initiators: Vec<_> = match &config.initiators {
            Some(list) => list.clone(),
            None => topology.node_ids().collect(),
        };
        let topology = Arc::new(topology);
        let nodes = run_actors(Arc::clone(&topology), config.node_config(), &initiators).await?;
        let views: Vec<_> = nodes.iter().map(MegaMergerNode::view).collect();
        let leaders = check_termination(&topology, &views)?;
        let sent: u64 = nodes.iter().map(|n| n.metrics().sent).sum();

        println!();
        println!("Actors finished:");
        println!("  Messages: {sent}");
        println!("  Leaders: {leaders:?}");
        return Ok(());
    }

    let mut sim = Simulation::new(topology, config)?;
    let summary = sim.run()?;
    let tree = verify_run(sim.topology(), &sim.views(), sim.events())?;
    let snapshot: NetworkSnapshot = sim.snapshot();

    println!();
    println!("Simulation complete:");
    println!("  Steps: {}", summary.steps);
    println!("  Messages: {}", summary.messages);
    println!("  End time: {}", summary.end_time);
    println!("  Max level: {}", snapshot.max_level);
    println!("  Leaders: {:?}", tree.leaders);
    println!("  Tree links: {}", tree.links.len());
    println!("  Tree weight: {}", tree.total_weight);
    if summary.violations > 0 {
        println!("  Discarded events: {}", summary.violations);
    }

    if let Some(path) = timeline {
        std::fs::write(&path, serde_json::to_string_pretty(sim.events())?)?;
        println!();
        println!("Timeline written to {}", path.display());
    }

    Ok(())
}
