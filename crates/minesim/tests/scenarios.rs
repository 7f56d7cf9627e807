use std::sync::{Arc, Mutex};

use minesim::prelude::*;

fn pair(delay: f64) -> Topology {
    let mut topology = Topology::new();
    let a = topology.add_miner("a", 1.0).unwrap();
    let b = topology.add_miner("b", 1.0).unwrap();
    topology.connect(a, b, delay).unwrap();
    topology
}

fn mesh(hashrates: &[f64], delay: f64) -> Topology {
    let mut topology = Topology::new();
    let ids: Vec<_> = hashrates
        .iter()
        .enumerate()
        .map(|(i, &h)| topology.add_miner(format!("m{}", i), h).unwrap())
        .collect();

    for (i, &from) in ids.iter().enumerate() {
        for &to in ids[i + 1..].iter() {
            topology.connect(from, to, delay).unwrap();
        }
    }

    topology
}

fn traced(builder: SimulationBuilder) -> (Simulation, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&lines);
    let sim = builder
        .tracer(move |event: &TraceEvent<'_>| {
            sink.lock().unwrap().push(event.to_string())
        })
        .build_simulation()
        .unwrap();

    (sim, lines)
}

/// a mines at 50 and 50.2, b mines a competing block at 50.5 and learns of
/// a's taller branch at 51.2.
fn race() -> SimulationBuilder {
    SimulationBuilder::new()
        .topology(pair(1.0))
        .solve_times(Scripted::new([50.0, 50.5, 0.2, 100.0]))
}

#[test]
fn tie_does_not_switch() {
    let mut sim = race().build_simulation().unwrap();

    // 50.0, 50.2, 50.5, 51.0
    for _ in 0..4 {
        sim.step().unwrap();
    }

    // b received a's first block at 51 while mining on its own block of the
    // same height, and kept its own.
    assert_eq!(sim.clock(), 51.0);
    assert_eq!(sim.miners()[1].tip, BlockId::from(1003));
    assert_eq!(sim.max_reorg_depth(), 0);
}

#[test]
fn taller_branch_wins() {
    let (sim, lines) = traced(race().steps(5));
    let output = sim.run().unwrap();

    assert!((output.clock - 51.2).abs() < 1e-9);
    assert_eq!(output.max_reorg_depth, 1);
    assert_eq!(output.confirmed_height, 2);
    assert_eq!(output.base_id, BlockId::from(1002));
    assert_eq!((output.miners[0].mined, output.miners[0].credited), (2, 2));
    assert_eq!((output.miners[1].mined, output.miners[1].credited), (1, 0));

    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], "0.000 a start-on 1000 height 0 mined 0 credit 0 solve 50.00");
    assert!(lines.contains(&"50.000 a mined-newid 1001 on 1000 height 1".into()));
    assert!(lines.contains(&"50.500 b mined-newid 1003 on 1000 height 1".into()));
    assert!(lines.contains(&"51.200 b received-switch-to 1002".into()));
    assert!(lines.contains(&"51.200 b reorg 1 maxreorg 0".into()));
}

#[test]
fn deep_reorg() {
    // a finds two blocks quickly, b finds four in private while a's blocks
    // are in flight on a slow link.
    let (sim, lines) = traced(
        SimulationBuilder::new()
            .topology(pair(10.0))
            .solve_times(Scripted::new([
                1.0, 2.0, 0.5, 1000.0, 1.0, 1.0, 1.0, 1000.0, 1000.0,
            ]))
            .steps(10),
    );
    let output = sim.run().unwrap();

    assert_eq!(output.clock, 15.0);
    assert_eq!(output.max_reorg_depth, 2);
    assert_eq!(output.confirmed_height, 4);
    assert_eq!(output.base_id, BlockId::from(1006));
    assert_eq!((output.miners[0].mined, output.miners[0].credited), (2, 0));
    assert_eq!((output.miners[1].mined, output.miners[1].credited), (4, 4));

    let lines = lines.lock().unwrap();
    assert!(lines.contains(&"14.000 a reorg 2 maxreorg 0".into()));
    // The second switch extends the first, so it is not a reorg.
    assert!(lines.contains(&"15.000 a received-switch-to 1006".into()));
    assert!(!lines.iter().any(|line| line.starts_with("15.000 a reorg")));
}

#[test]
fn prune_is_idempotent() {
    let mut sim = SimulationBuilder::new()
        .topology(mesh(&[1.0, 2.0, 3.0], 0.5))
        .block_interval(5.0)
        .prune_trigger(PruneTrigger::HeightBatch(1_000))
        .seed(3)
        .build_simulation()
        .unwrap();

    for _ in 0..500 {
        sim.step().unwrap();
    }

    sim.prune().unwrap();
    let credited: Vec<_> = sim.miners().iter().map(|m| m.credited).collect();
    let base = sim.arena().base();

    assert_eq!(sim.prune().unwrap(), 0);
    assert_eq!(sim.arena().base(), base);
    assert_eq!(
        sim.miners().iter().map(|m| m.credited).collect::<Vec<_>>(),
        credited
    );
}

#[test]
fn accounting_invariants_hold_at_every_step() {
    for prune in [PruneTrigger::SingleTip, PruneTrigger::HeightBatch(8)] {
        let mut sim = SimulationBuilder::new()
            .topology(mesh(&[1.0, 1.0, 2.0, 4.0], 1.5))
            .block_interval(6.0)
            .prune_trigger(prune)
            .seed(11)
            .build_simulation()
            .unwrap();

        let mut previous = vec![0; 4];
        for _ in 0..20_000 {
            sim.step().unwrap();

            let base = sim.arena().base();
            let base_height = sim.arena().height_of(base).unwrap();
            let credited: u64 = sim.miners().iter().map(|m| m.credited).sum();
            assert_eq!(credited, base_height);

            for (miner, before) in sim.miners().iter().zip(previous.iter_mut()) {
                assert!(miner.credited <= miner.mined);
                assert!(miner.credited >= *before);
                assert!(sim.arena().is_retained(miner.tip));
                *before = miner.credited;
            }
        }

        assert!(sim.max_reorg_depth() >= 1);
    }
}

#[test]
fn equal_shares_converge_without_delay() {
    let output = SimulationBuilder::new()
        .topology(mesh(&[1.0; 4], 0.0))
        .block_interval(1.0)
        .height(4_000)
        .seed(5)
        .build_simulation()
        .unwrap()
        .run()
        .unwrap();

    let summary = Summary::new(&output);

    // Without delay there is never a fork. Only the final block, which has
    // not reached the other miners yet, goes uncredited.
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.max_reorg_depth, 0);
    for miner in summary.miners.iter() {
        let revenue = miner.revenue.unwrap();
        assert!((revenue - 0.25).abs() < 0.03, "{}: {}", miner.name, revenue);
    }
}

#[test]
fn hashrate_shares_converge_with_small_delay() {
    let output = SimulationBuilder::new()
        .topology(mesh(&[1.0, 3.0], 0.01))
        .block_interval(10.0)
        .height(4_000)
        .seed(8)
        .build_simulation()
        .unwrap()
        .run()
        .unwrap();

    let summary = Summary::new(&output);
    let revenue = summary.miners[1].revenue.unwrap();
    assert!((revenue - 0.75).abs() < 0.03, "{}", revenue);
}

#[test]
fn same_seed_same_run() {
    let run = |seed| {
        SimulationBuilder::new()
            .topology(mesh(&[1.0, 2.0, 3.0], 2.0))
            .block_interval(10.0)
            .height(300)
            .seed(seed)
            .build_simulation()
            .unwrap()
            .run()
            .unwrap()
    };

    assert_eq!(run(21), run(21));
    assert_ne!(run(21).clock, run(22).clock);
}

#[test]
fn group_runs_use_consecutive_seeds() {
    let builder = || {
        SimulationBuilder::new()
            .topology(mesh(&[1.0, 2.0, 3.0], 1.0))
            .block_interval(10.0)
            .height(50)
    };

    let data = builder()
        .seed(7)
        .repeat_all(3)
        .build()
        .unwrap()
        .run_all()
        .unwrap()
        .data();

    assert_eq!(data.iter().map(|d| d.seed).collect::<Vec<_>>(), [7, 8, 9]);

    let single = builder().seed(8).build_simulation().unwrap().run().unwrap();
    assert_eq!(data[1], single);
}

#[test]
fn group_results_table() {
    let table = SimulationBuilder::new()
        .topology(mesh(&[1.0, 1.0], 1.0))
        .block_interval(10.0)
        .height(20)
        .repeat_all(5)
        .build()
        .unwrap()
        .run_all()
        .unwrap()
        .all()
        .average(Average::Median)
        .format(Format::CSV)
        .build();

    assert_eq!(table.len(), 1);
    assert_eq!(table.titles().last().map(String::as_str), Some("Median Of"));
    assert!(table.to_string().lines().nth(1).unwrap().ends_with(",5"));
}

#[test]
fn topology_file() {
    let path = std::env::temp_dir().join("minesim-topology-file-test");
    std::fs::write(&path, "# two miners\nx 1 y 0.5\n\ny 3 x 0.5\n").unwrap();

    let topology = Topology::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(topology.len(), 2);
    assert_eq!(topology.miner_id("y"), Some(MinerId::from(1)));

    let missing = Topology::from_file(path.with_extension("missing"));
    assert!(matches!(missing, Err(TopologyError::Io { .. })));
}
