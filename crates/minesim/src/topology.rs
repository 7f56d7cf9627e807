/*!
Network topology: the set of miners, their hash power and their relay links

# Text Format

One miner per line, whitespace separated:

```text
name hashrate [peer delay]...
```

Blank lines are ignored, as are lines whose first token begins with `#`.
Peer names may refer to miners declared further down the file. Links are
directed, so a two-way link needs a declaration on both lines.

```
use minesim::topology::Topology;

let topology: Topology = "
    alice 30 bob 2.5
    bob   70 alice 2.5
"
.parse()
.unwrap();

assert_eq!(topology.len(), 2);
assert_eq!(topology.total_hashrate(), 100.0);
```
*/

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;

use crate::miner::{MinerId, Peer};

/// A validated network of miners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    miners: Vec<MinerSpec>,
    ids: HashMap<String, MinerId>,
}

/// Static description of one miner within a [`Topology`].
#[derive(Debug, Clone, PartialEq)]
pub struct MinerSpec {
    pub name: String,
    pub hashrate: f64,
    pub peers: Vec<Peer>,
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("could not read topology file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {error}")]
    AtLine {
        line: usize,
        error: Box<TopologyError>,
    },
    #[error("duplicate miner name: {0}")]
    DuplicateName(String),
    #[error("missing hashrate for miner {0}")]
    MissingHashrate(String),
    #[error("bad hashrate: {0}")]
    BadHashrate(String),
    #[error("hashrate of miner {name} must be a positive number, got {hashrate}")]
    NonPositiveHashrate { name: String, hashrate: f64 },
    #[error("bad peer delay pairs for miner {name}: unpaired token {token}")]
    UnpairedPeer { name: String, token: String },
    #[error("no such miner: {0}")]
    UnknownPeer(String),
    #[error("no miner with id {0}")]
    UnknownMinerId(MinerId),
    #[error("bad delay: {0}")]
    BadDelay(String),
    #[error("delay from {from} to {to} must be a non-negative number, got {delay}")]
    NegativeDelay { from: String, to: String, delay: f64 },
    #[error("no miners")]
    NoMiners,
}

impl TopologyError {
    fn at_line(self, line: usize) -> Self {
        Self::AtLine { line, error: Box::new(self) }
    }
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses the topology file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            TopologyError::Io { path: path.to_path_buf(), source }
        })?;

        text.parse()
    }

    /// Adds a miner with no peers, returning its id.
    pub fn add_miner<N: Into<String>>(
        &mut self,
        name: N,
        hashrate: f64,
    ) -> Result<MinerId, TopologyError> {
        let name = name.into();

        if self.ids.contains_key(&name) {
            return Err(TopologyError::DuplicateName(name));
        }
        if !(hashrate > 0.0 && hashrate.is_finite()) {
            return Err(TopologyError::NonPositiveHashrate { name, hashrate });
        }

        let id = MinerId(self.miners.len());
        self.ids.insert(name.clone(), id);
        self.miners.push(MinerSpec { name, hashrate, peers: vec![] });

        Ok(id)
    }

    /// Adds a directed link from `from` to `to`.
    pub fn add_peer(
        &mut self,
        from: MinerId,
        to: MinerId,
        delay: f64,
    ) -> Result<(), TopologyError> {
        let to_name = match self.miners.get(to.0) {
            Some(spec) => &spec.name,
            None => return Err(TopologyError::UnknownMinerId(to)),
        };
        if !(delay >= 0.0 && delay.is_finite()) {
            let from = self
                .miners
                .get(from.0)
                .map(|spec| spec.name.clone())
                .unwrap_or_else(|| from.to_string());

            return Err(TopologyError::NegativeDelay {
                from,
                to: to_name.clone(),
                delay,
            });
        }

        match self.miners.get_mut(from.0) {
            Some(spec) => {
                spec.peers.push(Peer { target: to, delay });
                Ok(())
            }
            None => Err(TopologyError::UnknownMinerId(from)),
        }
    }

    /// Adds links in both directions between `a` and `b`.
    pub fn connect(
        &mut self,
        a: MinerId,
        b: MinerId,
        delay: f64,
    ) -> Result<(), TopologyError> {
        self.add_peer(a, b, delay)?;
        self.add_peer(b, a, delay)
    }

    /// Returns the id of the miner with the given name.
    pub fn miner_id(&self, name: &str) -> Option<MinerId> {
        self.ids.get(name).copied()
    }

    /// All miners, indexed by [`MinerId`].
    pub fn miners(&self) -> &[MinerSpec] {
        &self.miners
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    /// Sum of all miners' hashrates.
    pub fn total_hashrate(&self) -> f64 {
        self.miners.iter().map(|spec| spec.hashrate).sum()
    }
}

impl FromStr for Topology {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut topology = Topology::new();

        // Peers may be declared after the lines referring to them, so they
        // are resolved once every miner is known.
        let mut pending = vec![];
        for (i, line) in s.lines().enumerate() {
            let line_num = i + 1;
            let fields: Vec<_> = line.split_whitespace().collect();

            let (name, rest) = match fields.split_first() {
                None => continue,
                Some((name, _)) if name.starts_with('#') => continue,
                Some((name, rest)) => (*name, rest),
            };

            let hashrate = match rest.first() {
                None => {
                    let err = TopologyError::MissingHashrate(name.into());
                    return Err(err.at_line(line_num));
                }
                Some(token) => token.parse::<f64>().map_err(|_| {
                    TopologyError::BadHashrate(token.to_string())
                        .at_line(line_num)
                })?,
            };

            let id = topology
                .add_miner(name, hashrate)
                .map_err(|err| err.at_line(line_num))?;
            pending.push((line_num, id, rest[1..].to_vec()));
        }

        if topology.is_empty() {
            return Err(TopologyError::NoMiners);
        }

        for (line_num, id, peers) in pending {
            if peers.len() % 2 != 0 {
                let err = TopologyError::UnpairedPeer {
                    name: topology.miners[id.0].name.clone(),
                    token: peers[peers.len() - 1].to_string(),
                };
                return Err(err.at_line(line_num));
            }

            for pair in peers.chunks_exact(2) {
                let target = topology.miner_id(pair[0]).ok_or_else(|| {
                    TopologyError::UnknownPeer(pair[0].to_string())
                        .at_line(line_num)
                })?;
                let delay = pair[1].parse::<f64>().map_err(|_| {
                    TopologyError::BadDelay(pair[1].to_string())
                        .at_line(line_num)
                })?;

                topology
                    .add_peer(id, target, delay)
                    .map_err(|err| err.at_line(line_num))?;
            }
        }

        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(text: &str) -> (usize, TopologyError) {
        match text.parse::<Topology>() {
            Err(TopologyError::AtLine { line, error }) => (line, *error),
            other => panic!("expected a line error, got {:?}", other),
        }
    }

    #[test]
    fn parses_peers_and_forward_references() {
        let topology: Topology = "
            # comment line
            a 1 b 1.5 c 0

            b 2.5 a 1.5
            c 0.5
        "
        .parse()
        .unwrap();

        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| topology.miner_id(name).unwrap())
            .collect();
        assert_eq!(ids, vec![MinerId(0), MinerId(1), MinerId(2)]);

        let a = &topology.miners()[0];
        assert_eq!(a.hashrate, 1.0);
        assert_eq!(
            a.peers,
            vec![
                Peer { target: MinerId(1), delay: 1.5 },
                Peer { target: MinerId(2), delay: 0.0 },
            ]
        );
        assert!(topology.miners()[2].peers.is_empty());
        assert_eq!(topology.total_hashrate(), 4.0);
    }

    #[test]
    fn comment_marker_must_lead_the_line() {
        let topology: Topology = "#a 1\n  #b 2\nc 3\n".parse().unwrap();
        assert_eq!(topology.len(), 1);
        assert!(topology.miner_id("c").is_some());
    }

    #[test]
    fn rejects_duplicate_names() {
        let (line, err) = parse_err("a 1\nb 1\na 2\n");
        assert_eq!(line, 3);
        assert!(matches!(err, TopologyError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn rejects_bad_hashrates() {
        let (_, err) = parse_err("a fast\n");
        assert!(matches!(err, TopologyError::BadHashrate(_)));

        let (_, err) = parse_err("a 0\n");
        assert!(matches!(err, TopologyError::NonPositiveHashrate { .. }));

        let (_, err) = parse_err("a -3\n");
        assert!(matches!(err, TopologyError::NonPositiveHashrate { .. }));

        let (_, err) = parse_err("a\n");
        assert!(matches!(err, TopologyError::MissingHashrate(_)));
    }

    #[test]
    fn rejects_bad_peer_lists() {
        let (line, err) = parse_err("a 1 b 1\nb 1 a\n");
        assert_eq!(line, 2);
        assert!(
            matches!(err, TopologyError::UnpairedPeer { token, .. } if token == "a")
        );

        let (line, err) = parse_err("a 1 z 1\nb 1\n");
        assert_eq!(line, 1);
        assert!(matches!(err, TopologyError::UnknownPeer(name) if name == "z"));

        let (_, err) = parse_err("a 1 b soon\nb 1\n");
        assert!(matches!(err, TopologyError::BadDelay(_)));

        let (_, err) = parse_err("a 1 b -1\nb 1\n");
        assert!(matches!(err, TopologyError::NegativeDelay { .. }));
    }

    #[test]
    fn rejects_empty_topology() {
        let err = "\n# nobody here\n".parse::<Topology>().unwrap_err();
        assert!(matches!(err, TopologyError::NoMiners));
    }

    #[test]
    fn programmatic_construction() {
        let mut topology = Topology::new();
        let a = topology.add_miner("a", 1.0).unwrap();
        let b = topology.add_miner("b", 3.0).unwrap();
        topology.connect(a, b, 0.25).unwrap();

        assert_eq!(topology.miners()[0].peers[0].target, b);
        assert_eq!(topology.miners()[1].peers[0].target, a);
        assert!(topology.add_miner("a", 1.0).is_err());
        assert!(topology.add_peer(a, MinerId(7), 1.0).is_err());
    }
}
