//! Netlist database loaded from Bookshelf benchmark files.
//!
//! Only `terminal` rows of the `.nodes` file become placeable macros; the
//! standard-cell rows are ignored. Net membership is filtered down to those
//! macros, and nets left with fewer than two members are dropped.

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::PlaceError;

/// A rectangular block to be placed on the grid.
#[derive(Debug, Clone)]
pub struct Macro {
    /// Node name from the benchmark (e.g. `o450`).
    pub name: String,
    /// Footprint width in database units.
    pub width: f64,
    /// Footprint height in database units.
    pub height: f64,
}

/// One macro's connection point on a net.
#[derive(Debug, Clone)]
pub struct NetPin {
    /// Index into [`NetlistDb::macros`].
    pub macro_id: usize,
    /// Pin offset from the macro origin along x.
    pub x_offset: f64,
    /// Pin offset from the macro origin along y.
    pub y_offset: f64,
}

/// A hyperedge grouping two or more macros that must be wired together.
#[derive(Debug, Clone)]
pub struct Net {
    /// Net name from the benchmark.
    pub name: String,
    /// Member pins, one per macro (duplicate memberships collapse).
    pub pins: Vec<NetPin>,
}

/// Macro and net tables for one benchmark.
///
/// Macro ids are vector indices; insertion order follows file order, which
/// also fixes the placement order used by the environment.
#[derive(Debug, Clone)]
pub struct NetlistDb {
    /// All placeable macros.
    pub macros: Vec<Macro>,
    /// All nets with at least two macro members.
    pub nets: Vec<Net>,
    /// Maximum x extent (width + placed x) over the original placement.
    pub extent_x: f64,
    /// Maximum y extent (height + placed y) over the original placement.
    pub extent_y: f64,
    name_to_id: HashMap<String, usize>,
}

impl NetlistDb {
    /// Load `{benchmark}.nodes`, `{benchmark}.nets` and `{benchmark}.pl`
    /// from `dir`.
    pub fn from_bookshelf(dir: &Path, benchmark: &str) -> Result<Self, PlaceError> {
        let nodes_path = dir.join(format!("{benchmark}.nodes"));
        let nets_path = dir.join(format!("{benchmark}.nets"));
        let pl_path = dir.join(format!("{benchmark}.pl"));

        let (macros, name_to_id) = parse_nodes(&read(&nodes_path)?, &nodes_path)?;
        let nets = parse_nets(&read(&nets_path)?, &nets_path, &name_to_id)?;
        let (extent_x, extent_y) = parse_pl(&read(&pl_path)?, &pl_path, &macros, &name_to_id)?;

        Ok(Self {
            macros,
            nets,
            extent_x,
            extent_y,
            name_to_id,
        })
    }

    /// Generate a random netlist for smoke training and tests.
    ///
    /// Every net connects 2..=`max_fanout` distinct macros chosen uniformly.
    pub fn synthetic(num_macros: usize, num_nets: usize, max_fanout: usize, seed: u64) -> Self {
        assert!(num_macros >= 2, "need at least two macros to form a net");
        let max_fanout = max_fanout.clamp(2, num_macros);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut macros = Vec::with_capacity(num_macros);
        let mut name_to_id = HashMap::new();
        let mut extent_x: f64 = 0.0;
        let mut extent_y: f64 = 0.0;
        for id in 0..num_macros {
            let name = format!("m{id}");
            let width = rng.random_range(4..=32) as f64;
            let height = rng.random_range(4..=32) as f64;
            extent_x = extent_x.max(width);
            extent_y = extent_y.max(height);
            name_to_id.insert(name.clone(), id);
            macros.push(Macro {
                name,
                width,
                height,
            });
        }

        let mut ids: Vec<usize> = (0..num_macros).collect();
        let mut nets = Vec::with_capacity(num_nets);
        for net_id in 0..num_nets {
            let fanout = rng.random_range(2..=max_fanout);
            ids.shuffle(&mut rng);
            let pins = ids[..fanout]
                .iter()
                .map(|&macro_id| NetPin {
                    macro_id,
                    x_offset: 0.0,
                    y_offset: 0.0,
                })
                .collect();
            nets.push(Net {
                name: format!("n{net_id}"),
                pins,
            });
        }

        Self {
            macros,
            nets,
            extent_x,
            extent_y,
            name_to_id,
        }
    }

    /// Number of placeable macros.
    pub fn macro_count(&self) -> usize {
        self.macros.len()
    }

    /// Number of nets after degenerate-net filtering.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    /// Look up a macro id by node name.
    pub fn macro_id(&self, name: &str) -> Option<usize> {
        self.name_to_id.get(name).copied()
    }
}

fn read(path: &Path) -> Result<String, PlaceError> {
    std::fs::read_to_string(path).map_err(|source| PlaceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_error(path: &Path, line: usize, reason: impl Into<String>) -> PlaceError {
    PlaceError::Parse {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Parse `.nodes` rows of the form `name width height terminal`.
fn parse_nodes(
    content: &str,
    path: &Path,
) -> Result<(Vec<Macro>, HashMap<String, usize>), PlaceError> {
    let mut macros = Vec::new();
    let mut name_to_id = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.last() != Some(&"terminal") {
            continue;
        }
        if tokens.len() != 4 {
            return Err(parse_error(path, idx + 1, "malformed terminal row"));
        }
        let width: f64 = tokens[1]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad node width"))?;
        let height: f64 = tokens[2]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad node height"))?;

        let name = tokens[0].to_string();
        name_to_id.insert(name.clone(), macros.len());
        macros.push(Macro {
            name,
            width,
            height,
        });
    }

    Ok((macros, name_to_id))
}

/// Parse `.nets` blocks: a `NetDegree : k name` header followed by member
/// rows. Member rows naming standard cells (unknown nodes) are skipped.
fn parse_nets(
    content: &str,
    path: &Path,
    name_to_id: &HashMap<String, usize>,
) -> Result<Vec<Net>, PlaceError> {
    let mut nets: Vec<Net> = Vec::new();
    let mut current: Option<Net> = None;

    for (idx, raw) in content.lines().enumerate() {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            continue;
        };

        if first == "NetDegree" {
            let Some(&name) = tokens.last() else {
                return Err(parse_error(path, idx + 1, "NetDegree without a net name"));
            };
            if let Some(net) = current.take() {
                nets.push(net);
            }
            current = Some(Net {
                name: name.to_string(),
                pins: Vec::new(),
            });
            continue;
        }

        let Some(&macro_id) = name_to_id.get(first) else {
            continue;
        };
        let Some(net) = current.as_mut() else {
            return Err(parse_error(path, idx + 1, "pin row before any NetDegree"));
        };
        if tokens.len() < 3 {
            return Err(parse_error(path, idx + 1, "pin row without offsets"));
        }
        let x_offset: f64 = tokens[tokens.len() - 2]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad pin x offset"))?;
        let y_offset: f64 = tokens[tokens.len() - 1]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad pin y offset"))?;

        // One pin per macro per net; a repeated membership updates offsets.
        match net.pins.iter_mut().find(|p| p.macro_id == macro_id) {
            Some(pin) => {
                pin.x_offset = x_offset;
                pin.y_offset = y_offset;
            }
            None => net.pins.push(NetPin {
                macro_id,
                x_offset,
                y_offset,
            }),
        }
    }

    if let Some(net) = current.take() {
        nets.push(net);
    }

    // Nets that connect fewer than two macros carry no wirelength signal.
    nets.retain(|net| net.pins.len() >= 2);
    Ok(nets)
}

/// Parse `.pl` rows `name x y : orient` and derive the placement extents.
fn parse_pl(
    content: &str,
    path: &Path,
    macros: &[Macro],
    name_to_id: &HashMap<String, usize>,
) -> Result<(f64, f64), PlaceError> {
    let mut extent_x: f64 = 0.0;
    let mut extent_y: f64 = 0.0;

    for (idx, raw) in content.lines().enumerate() {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            continue;
        };
        let Some(&macro_id) = name_to_id.get(first) else {
            continue;
        };
        if tokens.len() < 3 {
            return Err(parse_error(path, idx + 1, "malformed placement row"));
        }
        let x: f64 = tokens[1]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad placement x"))?;
        let y: f64 = tokens[2]
            .parse()
            .map_err(|_| parse_error(path, idx + 1, "bad placement y"))?;

        extent_x = extent_x.max(macros[macro_id].width + x);
        extent_y = extent_y.max(macros[macro_id].height + y);
    }

    Ok((extent_x, extent_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = "\
UCLA nodes 1.0
# Comment line
NumNodes : 5
NumTerminals : 3
\tc0 4 4
\to0 10 12 terminal
\to1 8 6 terminal
\tc1 4 4
\to2 20 10 terminal
";

    const NETS: &str = "\
UCLA nets 1.0
NumNets : 3
NetDegree : 3 n0
\to0 I : 1.0 2.0
\tc0 I : 0.0 0.0
\to1 O : -1.5 0.5
NetDegree : 2 n1
\to0 I : 0.0 0.0
\tc1 O : 0.0 0.0
NetDegree : 2 n2
\to1 I : 0.0 0.0
\to2 O : 3.0 -3.0
";

    const PL: &str = "\
UCLA pl 1.0
o0 100 200 : N
o1 0 0 : N
c0 5 5 : N
o2 30 40 : N
";

    fn fixture_db() -> NetlistDb {
        let dir = std::env::temp_dir().join(format!(
            "macroplace_db_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tiny.nodes"), NODES).unwrap();
        std::fs::write(dir.join("tiny.nets"), NETS).unwrap();
        std::fs::write(dir.join("tiny.pl"), PL).unwrap();

        let db = NetlistDb::from_bookshelf(&dir, "tiny").unwrap();
        std::fs::remove_dir_all(&dir).ok();
        db
    }

    #[test]
    fn parses_terminal_nodes_only() {
        let db = fixture_db();
        assert_eq!(db.macro_count(), 3);
        assert_eq!(db.macro_id("o0"), Some(0));
        assert_eq!(db.macro_id("o1"), Some(1));
        assert_eq!(db.macro_id("o2"), Some(2));
        assert_eq!(db.macro_id("c0"), None);
        assert!((db.macros[0].width - 10.0).abs() < 1e-9);
        assert!((db.macros[0].height - 12.0).abs() < 1e-9);
    }

    #[test]
    fn drops_degenerate_nets() {
        let db = fixture_db();
        // n1 keeps only o0 after standard-cell filtering and is dropped.
        assert_eq!(db.net_count(), 2);
        assert_eq!(db.nets[0].name, "n0");
        assert_eq!(db.nets[0].pins.len(), 2);
        assert_eq!(db.nets[1].name, "n2");
        let members: Vec<usize> = db.nets[1].pins.iter().map(|p| p.macro_id).collect();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn keeps_pin_offsets() {
        let db = fixture_db();
        let pin = &db.nets[0].pins[1];
        assert_eq!(pin.macro_id, 1);
        assert!((pin.x_offset + 1.5).abs() < 1e-9);
        assert!((pin.y_offset - 0.5).abs() < 1e-9);
    }

    #[test]
    fn computes_extents_from_placement() {
        let db = fixture_db();
        // o0: 10 + 100 = 110 in x, 12 + 200 = 212 in y.
        assert!((db.extent_x - 110.0).abs() < 1e-9);
        assert!((db.extent_y - 212.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = std::env::temp_dir().join("macroplace_db_missing");
        let err = NetlistDb::from_bookshelf(&dir, "nope").unwrap_err();
        assert!(matches!(err, PlaceError::Io { .. }));
    }

    #[test]
    fn synthetic_nets_use_distinct_members() {
        let db = NetlistDb::synthetic(10, 20, 4, 7);
        assert_eq!(db.macro_count(), 10);
        assert_eq!(db.net_count(), 20);
        for net in &db.nets {
            assert!(net.pins.len() >= 2);
            assert!(net.pins.len() <= 4);
            let mut ids: Vec<usize> = net.pins.iter().map(|p| p.macro_id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), net.pins.len());
        }
    }

    #[test]
    fn synthetic_is_deterministic_per_seed() {
        let a = NetlistDb::synthetic(8, 5, 3, 42);
        let b = NetlistDb::synthetic(8, 5, 3, 42);
        for (na, nb) in a.nets.iter().zip(b.nets.iter()) {
            let ids_a: Vec<usize> = na.pins.iter().map(|p| p.macro_id).collect();
            let ids_b: Vec<usize> = nb.pins.iter().map(|p| p.macro_id).collect();
            assert_eq!(ids_a, ids_b);
        }
    }
}
