//! Static macro-connectivity graph derived from the net table.
//!
//! Each net expands into a clique over its member macros. Edges are directed
//! and kept with multiplicity: two macros sharing three nets are connected by
//! three parallel edges per direction, and the neighbor-sum aggregation in the
//! graph encoder counts each of them.

use crate::db::NetlistDb;

/// Connectivity graph over all macros of a netlist.
///
/// Built once per database and immutable afterwards. Construction order:
/// clique expansion per net (one edge per unordered member pair), padding
/// with isolated nodes up to the macro count, a reversed duplicate of every
/// edge, then one self-loop per node.
#[derive(Debug, Clone)]
pub struct ConnectivityGraph {
    num_nodes: usize,
    edges: Vec<(usize, usize)>,
}

impl ConnectivityGraph {
    /// Build the graph for `db`.
    pub fn from_db(db: &NetlistDb) -> Self {
        let mut edges = Vec::new();
        for net in &db.nets {
            for i in 0..net.pins.len().saturating_sub(1) {
                for j in (i + 1)..net.pins.len() {
                    edges.push((net.pins[i].macro_id, net.pins[j].macro_id));
                }
            }
        }

        let num_nodes = db.macro_count();

        let reversed: Vec<(usize, usize)> = edges.iter().map(|&(src, dst)| (dst, src)).collect();
        edges.extend(reversed);
        edges.extend((0..num_nodes).map(|node| (node, node)));

        Self { num_nodes, edges }
    }

    /// Number of nodes, equal to the macro count of the source database.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of directed edges including reverses and self-loops.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Directed `(src, dst)` edge list with multiplicity.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Dense row-major adjacency with edge counts: `A[dst][src]` is the
    /// number of edges from `src` to `dst`, so `A · H` sums each node's
    /// in-neighbor features.
    pub fn adjacency(&self) -> Vec<f32> {
        let n = self.num_nodes;
        let mut matrix = vec![0.0f32; n * n];
        for &(src, dst) in &self.edges {
            matrix[dst * n + src] += 1.0;
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Net, NetPin};

    fn db_with_nets(num_macros: usize, nets: &[&[usize]]) -> NetlistDb {
        let mut db = NetlistDb::synthetic(num_macros.max(2), 1, 2, 0);
        db.nets = nets
            .iter()
            .enumerate()
            .map(|(i, members)| Net {
                name: format!("n{i}"),
                pins: members
                    .iter()
                    .map(|&macro_id| NetPin {
                        macro_id,
                        x_offset: 0.0,
                        y_offset: 0.0,
                    })
                    .collect(),
            })
            .collect();
        db
    }

    #[test]
    fn triangle_net_expands_to_symmetric_clique() {
        let db = db_with_nets(3, &[&[0, 1, 2]]);
        let graph = ConnectivityGraph::from_db(&db);

        assert_eq!(graph.num_nodes(), 3);
        // 3 clique edges + 3 reverses + 3 self-loops.
        assert_eq!(graph.num_edges(), 9);

        let adj = graph.adjacency();
        for i in 0..3 {
            for j in 0..3 {
                let expected = 1.0;
                assert!((adj[i * 3 + j] - expected).abs() < 1e-6);
                assert!((adj[i * 3 + j] - adj[j * 3 + i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn shared_nets_accumulate_multiplicity() {
        let db = db_with_nets(2, &[&[0, 1], &[0, 1], &[1, 0]]);
        let graph = ConnectivityGraph::from_db(&db);

        let adj = graph.adjacency();
        assert!((adj[1] - 3.0).abs() < 1e-6);
        assert!((adj[2] - 3.0).abs() < 1e-6);
        assert!((adj[0] - 1.0).abs() < 1e-6);
        assert!((adj[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unconnected_macros_stay_as_isolated_nodes() {
        let db = db_with_nets(4, &[&[0, 1]]);
        let graph = ConnectivityGraph::from_db(&db);

        assert_eq!(graph.num_nodes(), 4);
        let adj = graph.adjacency();
        // Macro 3 has only its self-loop.
        for src in 0..4 {
            let expected = if src == 3 { 1.0 } else { 0.0 };
            assert!((adj[3 * 4 + src] - expected).abs() < 1e-6);
        }
    }
}
