//! Actor-critic network over the joint graph and spatial features.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use crate::env::Observation;

use super::gcn::{GRAPH_EMBED_DIM, GraphEncoder, GraphTensors};
use super::spatial::{SPATIAL_EMBED_DIM, SpatialEncoder};

/// Additive logit penalty that removes occupied cells from consideration.
/// Large enough that no occupied cell can win the sample, small enough to
/// keep log-probabilities finite.
const MASK_PENALTY: f32 = 1.0e8;

const HEAD_HIDDEN: usize = 64;

/// PPO hyperparameters.
#[derive(Debug, Config)]
pub struct PpoConfig {
    /// Actor head learning rate.
    pub lr_actor: f64,
    /// Critic head learning rate.
    pub lr_critic: f64,
    /// Discount factor.
    pub gamma: f32,
    /// Clip range for the surrogate objective.
    pub eps_clip: f32,
    /// Optimization epochs per update.
    pub k_epochs: usize,
    /// Entropy bonus coefficient.
    pub entropy_coef: f32,
    /// Value loss coefficient.
    pub value_coef: f32,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            lr_actor: 3e-4,
            lr_critic: 1e-3,
            gamma: 0.99,
            eps_clip: 0.2,
            k_epochs: 10,
            entropy_coef: 0.01,
            value_coef: 0.5,
        }
    }
}

/// Actor head mapping joint features to one logit per grid cell.
#[derive(Module, Debug)]
pub struct PolicyHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> PolicyHead<B> {
    pub fn new(device: &B::Device, num_actions: usize) -> Self {
        Self {
            fc1: LinearConfig::new(GRAPH_EMBED_DIM + SPATIAL_EMBED_DIM, HEAD_HIDDEN).init(device),
            fc2: LinearConfig::new(HEAD_HIDDEN, HEAD_HIDDEN).init(device),
            out: LinearConfig::new(HEAD_HIDDEN, num_actions).init(device),
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(features).tanh();
        let x = self.fc2.forward(x).tanh();
        self.out.forward(x)
    }
}

/// Critic head mapping joint features to a scalar state value.
#[derive(Module, Debug)]
pub struct ValueHead<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> ValueHead<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(GRAPH_EMBED_DIM + SPATIAL_EMBED_DIM, HEAD_HIDDEN).init(device),
            fc2: LinearConfig::new(HEAD_HIDDEN, HEAD_HIDDEN).init(device),
            out: LinearConfig::new(HEAD_HIDDEN, 1).init(device),
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = self.fc1.forward(features).tanh();
        let x = self.fc2.forward(x).tanh();
        self.out.forward(x).squeeze(1)
    }
}

/// Joint policy/value network.
///
/// The two encoders turn an observation into a 96-wide feature; the heads
/// read logits and values off it. Only the heads are optimized during
/// training, so the encoders stay at their initial weights and act as fixed
/// random projections.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    pub gcn: GraphEncoder<B>,
    pub spatial: SpatialEncoder<B>,
    pub actor: PolicyHead<B>,
    pub critic: ValueHead<B>,
}

impl<B: Backend> ActorCritic<B> {
    pub fn new(device: &B::Device, num_macros: usize, num_actions: usize) -> Self {
        Self {
            gcn: GraphEncoder::new(device, num_macros),
            spatial: SpatialEncoder::new(device),
            actor: PolicyHead::new(device, num_actions),
            critic: ValueHead::new(device),
        }
    }

    /// Assemble `[batch, 96]` joint features: each row concatenates the
    /// pending macro's graph embedding with the occupancy embedding.
    fn joint_features(
        &self,
        graph: &GraphTensors<B>,
        macro_indices: Tensor<B, 1, Int>,
        grids: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let [batch, cells] = grids.dims();
        let grid = (cells as f64).sqrt() as usize;

        let node_embeddings = self.gcn.embed(graph);
        let macro_embed = node_embeddings.select(0, macro_indices);

        let images = grids.reshape([batch, 1, grid, grid]);
        let spatial_embed = self.spatial.forward(images);

        Tensor::cat(vec![macro_embed, spatial_embed], 1)
    }

    /// Masked log-probabilities over the grid cells. The occupancy doubles
    /// as the action mask, so occupied cells end up near -MASK_PENALTY.
    fn masked_log_probs(logits: Tensor<B, 2>, occupancy: Tensor<B, 2>) -> Tensor<B, 2> {
        log_softmax(logits - occupancy * MASK_PENALTY, 1)
    }

    /// Sample a placement for one observation. Returns the flat cell index
    /// and its log-probability under the current parameters.
    pub fn act(&self, graph: &GraphTensors<B>, obs: &Observation) -> (usize, f32) {
        let device = graph.adjacency.device();
        let cells = obs.occupancy.len();
        let macro_index =
            Tensor::<B, 1, Int>::from_ints([obs.macro_index as i64].as_slice(), &device);
        let occupancy =
            Tensor::<B, 1>::from_floats(obs.occupancy.as_slice(), &device).reshape([1, cells]);

        let features = self.joint_features(graph, macro_index, occupancy.clone());
        let logits = self.actor.forward(features);
        let log_probs = Self::masked_log_probs(logits, occupancy);

        // Gumbel-max sample from the categorical distribution.
        let uniform = Tensor::<B, 2>::random(
            log_probs.shape(),
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let gumbel = -(-uniform.log()).log();
        let action = (log_probs.clone() + gumbel).argmax(1);

        let log_prob = log_probs.gather(1, action.clone());

        let action = action.into_data().to_vec::<i64>().unwrap()[0] as usize;
        let log_prob = log_prob.into_data().to_vec::<f32>().unwrap()[0];
        (action, log_prob)
    }

    /// Re-evaluate buffered observations and actions under the current
    /// parameters. Returns per-transition log-probabilities, entropies and
    /// state values, each `[batch]`.
    pub fn evaluate(
        &self,
        graph: &GraphTensors<B>,
        macro_indices: Tensor<B, 1, Int>,
        grids: Tensor<B, 2>,
        actions: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>) {
        let batch = actions.dims()[0];
        let features = self.joint_features(graph, macro_indices, grids.clone());

        let logits = self.actor.forward(features.clone());
        let log_probs = Self::masked_log_probs(logits, grids);
        let probs = log_probs.clone().exp();

        let action_log_probs = log_probs
            .clone()
            .gather(1, actions.reshape([batch, 1]))
            .squeeze(1);
        let entropy = -(probs * log_probs).sum_dim(1).squeeze(1);

        let values = self.critic.forward(features);

        (action_log_probs, entropy, values)
    }
}

/// Rollout storage shared across the episodes of one update.
///
/// The policy side of a transition is recorded at selection time, the
/// environment side after stepping, so the vectors stay index-aligned.
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    pub macro_indices: Vec<usize>,
    pub grids: Vec<Vec<f32>>,
    pub actions: Vec<i64>,
    pub log_probs: Vec<f32>,
    pub rewards: Vec<f32>,
    pub is_terminals: Vec<bool>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the observation, sampled action and its log-probability.
    pub fn record_step(&mut self, obs: &Observation, action: usize, log_prob: f32) {
        self.macro_indices.push(obs.macro_index);
        self.grids.push(obs.occupancy.clone());
        self.actions.push(action as i64);
        self.log_probs.push(log_prob);
    }

    /// Record the reward and terminal flag for the latest step.
    pub fn record_outcome(&mut self, reward: f32, done: bool) {
        self.rewards.push(reward);
        self.is_terminals.push(done);
    }

    /// Number of completed transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn clear(&mut self) {
        self.macro_indices.clear();
        self.grids.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.rewards.clear();
        self.is_terminals.clear();
    }
}
