//! PPO training loop for the placement policy.

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;

use crate::env::{Observation, PlaceEnv};
use crate::error::PlaceError;
use crate::graph::ConnectivityGraph;
use crate::metrics::{CsvLogger, EvaluationMetrics, TrainingMetrics};

use super::gcn::GraphTensors;
use super::policy::{ActorCritic, PolicyHead, PpoConfig, RolloutBuffer, ValueHead};

/// Training run configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Number of collect/update iterations.
    pub num_iterations: usize,
    /// Episodes collected per iteration.
    pub episodes_per_iteration: usize,
    /// Console/CSV logging cadence, in iterations.
    pub log_freq: usize,
    /// Checkpoint cadence, in iterations.
    pub checkpoint_freq: usize,
    /// Directory for model checkpoints.
    pub checkpoint_dir: String,
    /// Directory for CSV logs.
    pub log_dir: String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_iterations: 2000,
            episodes_per_iteration: 8,
            log_freq: 10,
            checkpoint_freq: 100,
            checkpoint_dir: "checkpoints".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

/// Discounted returns over a buffer that may span several episodes.
/// The running sum resets at each terminal so credit never leaks across
/// episode boundaries.
fn discounted_returns(rewards: &[f32], is_terminals: &[bool], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0f32; rewards.len()];
    let mut discounted = 0.0f32;
    for t in (0..rewards.len()).rev() {
        if is_terminals[t] {
            discounted = 0.0;
        }
        discounted = rewards[t] + gamma * discounted;
        returns[t] = discounted;
    }
    returns
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_data().to_vec::<f32>().unwrap()[0]
}

/// PPO trainer.
///
/// `policy_old` is the frozen sampling network; `policy` is the one being
/// optimized. The two heads get their own Adam instance so the actor and
/// critic learning rates stay independent, while the encoders are outside
/// both optimizers and keep their initial weights.
pub struct PpoTrainer<B: AutodiffBackend> {
    policy: ActorCritic<B>,
    policy_old: ActorCritic<B>,
    optimizer_actor: OptimizerAdaptor<Adam, PolicyHead<B>, B>,
    optimizer_critic: OptimizerAdaptor<Adam, ValueHead<B>, B>,
    graph: GraphTensors<B>,
    buffer: RolloutBuffer,
    config: PpoConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> PpoTrainer<B> {
    pub fn new(
        device: B::Device,
        env: &PlaceEnv,
        graph: &ConnectivityGraph,
        config: PpoConfig,
    ) -> Self {
        assert!(config.k_epochs > 0, "k_epochs must be at least 1");
        let policy = ActorCritic::new(&device, env.num_macros(), env.num_actions());
        let policy_old = policy.clone();
        let graph = GraphTensors::new(graph, &device);

        Self {
            policy,
            policy_old,
            optimizer_actor: AdamConfig::new().init(),
            optimizer_critic: AdamConfig::new().init(),
            graph,
            buffer: RolloutBuffer::new(),
            config,
            device,
        }
    }

    /// Sample a placement through the frozen network and record the policy
    /// side of the transition.
    pub fn select_action(&mut self, obs: &Observation) -> usize {
        let (action, log_prob) = self.policy_old.act(&self.graph, obs);
        self.buffer.record_step(obs, action, log_prob);
        action
    }

    /// Record the environment side of the latest transition.
    pub fn record_outcome(&mut self, reward: f32, done: bool) {
        self.buffer.record_outcome(reward, done);
    }

    /// Run episodes through the frozen policy, filling the buffer.
    /// Returns the number of environment steps taken.
    pub fn collect_episodes(
        &mut self,
        env: &mut PlaceEnv,
        episodes: usize,
        metrics: &mut TrainingMetrics,
    ) -> usize {
        let mut steps = 0;
        for _ in 0..episodes {
            let mut obs = env.reset();
            let mut episode_reward = 0.0;
            let mut episode_length = 0;
            let mut final_hpwl = None;
            loop {
                let action = self.select_action(&obs);
                let result = env.step(action);
                self.buffer.record_outcome(result.reward, result.done);

                episode_reward += result.reward;
                episode_length += 1;
                steps += 1;
                obs = result.observation;

                if result.done {
                    final_hpwl = result.info.hpwl;
                    break;
                }
            }
            metrics.record_episode(episode_reward, episode_length, final_hpwl);
        }
        steps
    }

    /// Lift the buffered transitions onto the device.
    fn buffer_tensors(
        &self,
    ) -> (
        Tensor<B, 1, Int>,
        Tensor<B, 2>,
        Tensor<B, 1, Int>,
        Tensor<B, 1>,
    ) {
        let batch = self.buffer.len();
        let cells = self.buffer.grids[0].len();

        let macro_indices: Vec<i64> = self.buffer.macro_indices.iter().map(|&i| i as i64).collect();
        let macro_indices = Tensor::<B, 1, Int>::from_ints(macro_indices.as_slice(), &self.device);

        let flat_grids: Vec<f32> = self.buffer.grids.iter().flatten().copied().collect();
        let grids =
            Tensor::<B, 1>::from_floats(flat_grids.as_slice(), &self.device).reshape([batch, cells]);

        let actions = Tensor::<B, 1, Int>::from_ints(self.buffer.actions.as_slice(), &self.device);
        let old_log_probs =
            Tensor::<B, 1>::from_floats(self.buffer.log_probs.as_slice(), &self.device);

        (macro_indices, grids, actions, old_log_probs)
    }

    /// Consume the buffer: compute normalized returns, run the clipped
    /// surrogate optimization for `k_epochs`, sync the frozen network and
    /// clear the rollout. Returns the averaged (policy_loss, value_loss,
    /// entropy) over the epochs.
    pub fn update(&mut self) -> (f32, f32, f32) {
        assert!(!self.buffer.is_empty(), "update called with an empty buffer");
        assert_eq!(
            self.buffer.actions.len(),
            self.buffer.rewards.len(),
            "buffered actions without outcomes"
        );

        let returns = discounted_returns(
            &self.buffer.rewards,
            &self.buffer.is_terminals,
            self.config.gamma,
        );
        let n = returns.len() as f32;
        let mean = returns.iter().sum::<f32>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n;
        let std = variance.sqrt();
        let normalized: Vec<f32> = returns.iter().map(|r| (r - mean) / (std + 1e-7)).collect();

        let (macro_indices, grids, actions, old_log_probs) = self.buffer_tensors();
        let returns = Tensor::<B, 1>::from_floats(normalized.as_slice(), &self.device);

        let mut total_policy_loss = 0.0;
        let mut total_value_loss = 0.0;
        let mut total_entropy = 0.0;

        for _ in 0..self.config.k_epochs {
            // Actor pass. Advantages use the critic as it stood before this
            // epoch's value step, detached from the actor's graph.
            let (log_probs, entropy, values) = self.policy.evaluate(
                &self.graph,
                macro_indices.clone(),
                grids.clone(),
                actions.clone(),
            );

            let ratios = (log_probs - old_log_probs.clone()).exp();
            let advantages = returns.clone() - values.detach();
            let surr1 = ratios.clone() * advantages.clone();
            let surr2 = ratios
                .clamp(1.0 - self.config.eps_clip, 1.0 + self.config.eps_clip)
                * advantages;

            let policy_loss = -surr1.min_pair(surr2).mean();
            let entropy_mean = entropy.mean();
            let actor_loss = policy_loss.clone() - entropy_mean.clone() * self.config.entropy_coef;

            let grads = actor_loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.policy.actor);
            let actor = self.policy.actor.clone();
            self.policy.actor = self.optimizer_actor.step(self.config.lr_actor, actor, grads);

            // Critic pass against the same normalized returns.
            let (_, _, values) = self.policy.evaluate(
                &self.graph,
                macro_indices.clone(),
                grids.clone(),
                actions.clone(),
            );
            let value_loss = (values - returns.clone()).powf_scalar(2.0).mean();
            let critic_loss = value_loss.clone() * self.config.value_coef;

            let grads = critic_loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.policy.critic);
            let critic = self.policy.critic.clone();
            self.policy.critic = self.optimizer_critic.step(self.config.lr_critic, critic, grads);

            total_policy_loss += scalar(policy_loss);
            total_value_loss += scalar(value_loss);
            total_entropy += scalar(entropy_mean);
        }

        self.policy_old = self.policy.clone();
        self.buffer.clear();

        let k = self.config.k_epochs as f32;
        (
            total_policy_loss / k,
            total_value_loss / k,
            total_entropy / k,
        )
    }

    /// Full training loop: collect, update, log, checkpoint.
    pub fn train(&mut self, env: &mut PlaceEnv, config: &TrainConfig) -> Result<(), PlaceError> {
        let mut metrics = TrainingMetrics::new(100);
        let mut logger = CsvLogger::new(&config.log_dir);

        tracing::info!(
            "Starting training for {} iterations ({} episodes each)",
            config.num_iterations,
            config.episodes_per_iteration
        );

        for iteration in 0..config.num_iterations {
            let steps = self.collect_episodes(env, config.episodes_per_iteration, &mut metrics);
            let (policy_loss, value_loss, entropy) = self.update();

            metrics.record_losses(policy_loss, value_loss, entropy);
            metrics.update_iteration(iteration, steps);

            if iteration % config.log_freq == 0 {
                metrics.log_to_console();
                logger.log_metrics(&metrics);
            }
            if iteration % config.checkpoint_freq == 0 {
                let path = format!("{}/checkpoint_{iteration}", config.checkpoint_dir);
                self.save_checkpoint(&path)?;
            }
        }

        self.save_checkpoint(&format!("{}/final", config.checkpoint_dir))?;
        tracing::info!("Training complete!");
        Ok(())
    }

    /// Run evaluation episodes through the frozen policy.
    pub fn evaluate(&self, env: &mut PlaceEnv, episodes: usize) -> EvaluationMetrics {
        let mut metrics = EvaluationMetrics::new();
        for _ in 0..episodes {
            let mut obs = env.reset();
            let mut episode_reward = 0.0;
            let mut steps = 0;
            let mut hpwl = None;
            loop {
                let (action, _) = self.policy_old.act(&self.graph, &obs);
                let result = env.step(action);
                episode_reward += result.reward;
                steps += 1;
                obs = result.observation;
                if result.done {
                    hpwl = result.info.hpwl;
                    break;
                }
            }
            metrics.record_episode(episode_reward, steps, hpwl);
        }
        metrics
    }

    /// Persist the frozen network.
    pub fn save_checkpoint(&self, path: &str) -> Result<(), PlaceError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|source| PlaceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.policy_old.clone().save_file(path, &recorder)?;
        tracing::info!("Saved checkpoint to {}", path);
        Ok(())
    }

    /// Restore both networks from a checkpoint.
    pub fn load_checkpoint(&mut self, path: &str) -> Result<(), PlaceError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.policy = self.policy.clone().load_file(path, &recorder, &self.device)?;
        self.policy_old = self.policy.clone();
        tracing::info!("Loaded checkpoint from {}", path);
        Ok(())
    }
}
