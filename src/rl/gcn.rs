//! Graph encoder producing per-macro connectivity embeddings.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::graph::ConnectivityGraph;

/// Per-macro embedding width produced by the encoder.
pub const GRAPH_EMBED_DIM: usize = 32;
/// Width of the first aggregation layer.
const HIDDEN_DIM: usize = 64;

/// Device-resident view of a [`ConnectivityGraph`]: dense adjacency plus the
/// one-hot identity features fed to the encoder.
#[derive(Debug, Clone)]
pub struct GraphTensors<B: Backend> {
    /// Dense adjacency `[n, n]`; `A[dst][src]` counts edges from src to dst.
    pub adjacency: Tensor<B, 2>,
    /// One-hot identity features `[n, n]`.
    pub features: Tensor<B, 2>,
    /// Node count.
    pub num_nodes: usize,
}

impl<B: Backend> GraphTensors<B> {
    pub fn new(graph: &ConnectivityGraph, device: &B::Device) -> Self {
        let n = graph.num_nodes();
        let adjacency =
            Tensor::<B, 1>::from_floats(graph.adjacency().as_slice(), device).reshape([n, n]);

        let mut eye = vec![0.0f32; n * n];
        for i in 0..n {
            eye[i * n + i] = 1.0;
        }
        let features = Tensor::<B, 1>::from_floats(eye.as_slice(), device).reshape([n, n]);

        Self {
            adjacency,
            features,
            num_nodes: n,
        }
    }
}

/// Two-layer neighbor-sum graph encoder.
///
/// Each layer sums every node's in-neighbor features (parallel edges count
/// once each) and applies a linear transform. Layer 1 is ReLU-activated;
/// layer 2's output is the final embedding, unactivated.
#[derive(Module, Debug)]
pub struct GraphEncoder<B: Backend> {
    layer1: Linear<B>,
    layer2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> GraphEncoder<B> {
    /// `in_feats` is the node count: the input is the one-hot identity.
    pub fn new(device: &B::Device, in_feats: usize) -> Self {
        Self {
            layer1: LinearConfig::new(in_feats, HIDDEN_DIM).init(device),
            layer2: LinearConfig::new(HIDDEN_DIM, GRAPH_EMBED_DIM).init(device),
            activation: Relu::new(),
        }
    }

    /// Embed all nodes: `[n, in_feats]` features to `[n, 32]` embeddings.
    pub fn forward(&self, graph: &GraphTensors<B>, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = graph.adjacency.clone().matmul(features);
        let x = self.activation.forward(self.layer1.forward(x));
        let x = graph.adjacency.clone().matmul(x);
        self.layer2.forward(x)
    }

    /// Embed all nodes from the graph's own identity features.
    pub fn embed(&self, graph: &GraphTensors<B>) -> Tensor<B, 2> {
        self.forward(graph, graph.features.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NetlistDb;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn embedding_has_one_row_per_macro() {
        let db = NetlistDb::synthetic(5, 4, 3, 3);
        let graph = ConnectivityGraph::from_db(&db);
        let device = Default::default();
        let tensors = GraphTensors::<TestBackend>::new(&graph, &device);
        let encoder = GraphEncoder::<TestBackend>::new(&device, graph.num_nodes());

        let embeddings = encoder.embed(&tensors);
        assert_eq!(embeddings.dims(), [5, GRAPH_EMBED_DIM]);
    }

    #[test]
    fn symmetric_nodes_share_an_embedding() {
        // Two macros on one net aggregate identical neighborhoods, so both
        // rows of A * I coincide and the encoder cannot tell them apart.
        let mut db = NetlistDb::synthetic(2, 1, 2, 0);
        db.nets[0].pins[0].macro_id = 0;
        db.nets[0].pins[1].macro_id = 1;
        let graph = ConnectivityGraph::from_db(&db);
        let device = Default::default();
        let tensors = GraphTensors::<TestBackend>::new(&graph, &device);
        let encoder = GraphEncoder::<TestBackend>::new(&device, 2);

        let rows: Vec<f32> = encoder
            .embed(&tensors)
            .into_data()
            .to_vec()
            .unwrap();
        let (row0, row1) = rows.split_at(GRAPH_EMBED_DIM);
        for (a, b) in row0.iter().zip(row1.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn graph_tensors_match_graph_shape() {
        let db = NetlistDb::synthetic(4, 2, 2, 9);
        let graph = ConnectivityGraph::from_db(&db);
        let device = Default::default();
        let tensors = GraphTensors::<TestBackend>::new(&graph, &device);

        assert_eq!(tensors.num_nodes, 4);
        assert_eq!(tensors.adjacency.dims(), [4, 4]);
        assert_eq!(tensors.features.dims(), [4, 4]);

        let eye: Vec<f32> = tensors.features.into_data().to_vec().unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((eye[i * 4 + j] - expected).abs() < 1e-6);
            }
        }
    }
}
