//! Per-event execution trace.

use std::fmt::Display;

use crate::block::BlockId;

/// One step of the simulation, as reported to a [`Tracer`].
///
/// The [`Display`] implementation renders a single trace line.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent<'a> {
    /// A miner started mining on top of `tip`.
    StartOn {
        time: f64,
        miner: &'a str,
        tip: BlockId,
        height: u64,
        mined: u64,
        credited: u64,
        solve_time: f64,
    },
    /// A miner found block `id` on top of `parent`.
    Mined {
        time: f64,
        miner: &'a str,
        id: BlockId,
        parent: BlockId,
        height: u64,
    },
    /// A miner switched to a strictly taller block received from a peer.
    Switched {
        time: f64,
        miner: &'a str,
        block: BlockId,
    },
    /// The switch abandoned `depth` blocks. `max_depth` is the deepest reorg
    /// seen before this one.
    Reorg {
        time: f64,
        miner: &'a str,
        depth: u64,
        max_depth: u64,
    },
}

impl Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartOn {
                time,
                miner,
                tip,
                height,
                mined,
                credited,
                solve_time,
            } => write!(
                f,
                "{:.3} {} start-on {} height {} mined {} credit {} solve {:.2}",
                time, miner, tip, height, mined, credited, solve_time
            ),
            Self::Mined { time, miner, id, parent, height } => write!(
                f,
                "{:.3} {} mined-newid {} on {} height {}",
                time, miner, id, parent, height
            ),
            Self::Switched { time, miner, block } => {
                write!(f, "{:.3} {} received-switch-to {}", time, miner, block)
            }
            Self::Reorg { time, miner, depth, max_depth } => write!(
                f,
                "{:.3} {} reorg {} maxreorg {}",
                time, miner, depth, max_depth
            ),
        }
    }
}

/// Receives every [`TraceEvent`] of a simulation run.
///
/// Implemented for any cloneable `FnMut(&TraceEvent)` closure.
pub trait Tracer: dyn_clone::DynClone + Send {
    fn record(&mut self, event: &TraceEvent<'_>);
}

dyn_clone::clone_trait_object!(Tracer);

impl<F> Tracer for F
where
    F: FnMut(&TraceEvent<'_>) + Clone + Send,
{
    fn record(&mut self, event: &TraceEvent<'_>) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn trace_lines() {
        let start = TraceEvent::StartOn {
            time: 12.5,
            miner: "alice",
            tip: BlockId(1003),
            height: 2,
            mined: 4,
            credited: 1,
            solve_time: 301.25,
        };
        assert_eq!(
            start.to_string(),
            "12.500 alice start-on 1003 height 2 mined 4 credit 1 solve 301.25"
        );

        let mined = TraceEvent::Mined {
            time: 0.25,
            miner: "bob",
            id: BlockId(1004),
            parent: BlockId(1003),
            height: 3,
        };
        assert_eq!(mined.to_string(), "0.250 bob mined-newid 1004 on 1003 height 3");

        let switched =
            TraceEvent::Switched { time: 1.0, miner: "bob", block: BlockId(1005) };
        assert_eq!(switched.to_string(), "1.000 bob received-switch-to 1005");

        let reorg =
            TraceEvent::Reorg { time: 1.0, miner: "bob", depth: 2, max_depth: 1 };
        assert_eq!(reorg.to_string(), "1.000 bob reorg 2 maxreorg 1");
    }

    #[test]
    fn closures_are_tracers() {
        let lines = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&lines);
        let mut tracer: Box<dyn Tracer> =
            Box::new(move |event: &TraceEvent<'_>| {
                sink.lock().unwrap().push(event.to_string())
            });

        let event =
            TraceEvent::Switched { time: 0.0, miner: "c", block: BlockId(1) };
        tracer.record(&event);
        dyn_clone::clone_box(&*tracer).record(&event);

        assert_eq!(
            *lines.lock().unwrap(),
            vec!["0.000 c received-switch-to 1"; 2]
        );
    }
}
