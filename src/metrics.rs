//! Metrics and CSV logging for placement training.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

/// Moving average calculator.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Training metrics tracker.
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Episode rewards.
    pub episode_rewards: MovingAverage,
    /// Episode lengths in steps.
    pub episode_lengths: MovingAverage,
    /// Wirelength of successful episodes.
    pub episode_hpwl: MovingAverage,
    /// Fraction of episodes placing every macro.
    pub success_rate: MovingAverage,
    /// Policy loss.
    pub policy_loss: MovingAverage,
    /// Value loss.
    pub value_loss: MovingAverage,
    /// Entropy.
    pub entropy: MovingAverage,
    /// Current iteration.
    pub iteration: usize,
    /// Total environment steps.
    pub total_steps: usize,
    /// Training start time.
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            episode_hpwl: MovingAverage::new(window_size),
            success_rate: MovingAverage::new(window_size),
            policy_loss: MovingAverage::new(window_size),
            value_loss: MovingAverage::new(window_size),
            entropy: MovingAverage::new(window_size),
            iteration: 0,
            total_steps: 0,
            start_time: Instant::now(),
        }
    }

    /// Record a finished episode. `hpwl` is present only when every macro
    /// was placed.
    pub fn record_episode(&mut self, reward: f32, length: usize, hpwl: Option<f32>) {
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
        self.success_rate.push(if hpwl.is_some() { 1.0 } else { 0.0 });
        if let Some(hpwl) = hpwl {
            self.episode_hpwl.push(hpwl);
        }
    }

    /// Record losses from one optimization pass.
    pub fn record_losses(&mut self, policy_loss: f32, value_loss: f32, entropy: f32) {
        self.policy_loss.push(policy_loss);
        self.value_loss.push(value_loss);
        self.entropy.push(entropy);
    }

    /// Update iteration counter.
    pub fn update_iteration(&mut self, iteration: usize, steps: usize) {
        self.iteration = iteration;
        self.total_steps += steps;
    }

    /// Get training duration in seconds.
    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Get environment steps per second.
    pub fn steps_per_second(&self) -> f64 {
        let duration = self.training_duration_secs();
        if duration > 0.0 {
            self.total_steps as f64 / duration
        } else {
            0.0
        }
    }

    /// Log current metrics to console.
    pub fn log_to_console(&self) {
        tracing::info!(
            "Iteration {} | Steps {} | SPS {:.1}",
            self.iteration,
            self.total_steps,
            self.steps_per_second()
        );
        tracing::info!(
            "  Episode: reward={:.2}, length={:.1}, success={:.1}%, hpwl={:.1}",
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.success_rate.average() * 100.0,
            self.episode_hpwl.average()
        );
        tracing::info!(
            "  Losses: policy={:.4}, value={:.4}, entropy={:.4}",
            self.policy_loss.average(),
            self.value_loss.average(),
            self.entropy.average()
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// CSV scalar logger, one file per tag.
pub struct CsvLogger {
    log_dir: String,
}

impl CsvLogger {
    pub fn new(log_dir: &str) -> Self {
        std::fs::create_dir_all(log_dir).ok();

        Self {
            log_dir: log_dir.to_string(),
        }
    }

    /// Append a scalar value under `tag`.
    pub fn log_scalar(&mut self, tag: &str, value: f32, step: usize) {
        let csv_path = format!("{}/{}.csv", self.log_dir, tag.replace('/', "_"));

        let file_exists = Path::new(&csv_path).exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .ok();

        if let Some(ref mut f) = file {
            use std::io::Write;
            if !file_exists {
                writeln!(f, "step,value").ok();
            }
            writeln!(f, "{},{}", step, value).ok();
        }
    }

    /// Log the tracked training metrics at their current iteration.
    pub fn log_metrics(&mut self, metrics: &TrainingMetrics) {
        let step = metrics.iteration;

        self.log_scalar("episode/reward", metrics.episode_rewards.average(), step);
        self.log_scalar("episode/length", metrics.episode_lengths.average(), step);
        self.log_scalar("episode/hpwl", metrics.episode_hpwl.average(), step);
        self.log_scalar("episode/success_rate", metrics.success_rate.average(), step);

        self.log_scalar("losses/policy", metrics.policy_loss.average(), step);
        self.log_scalar("losses/value", metrics.value_loss.average(), step);
        self.log_scalar("losses/entropy", metrics.entropy.average(), step);

        self.log_scalar("performance/steps", metrics.total_steps as f32, step);
        self.log_scalar("performance/sps", metrics.steps_per_second() as f32, step);
    }
}

/// Aggregated statistics over evaluation episodes.
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    /// Number of evaluation episodes.
    pub num_episodes: usize,
    /// Total reward across all episodes.
    pub total_reward: f32,
    /// Episodes that placed every macro.
    pub num_success: usize,
    /// Total steps across all episodes.
    pub total_steps: usize,
    /// Summed wirelength of successful episodes.
    pub total_hpwl: f32,
    /// Best (lowest) wirelength seen.
    pub best_hpwl: Option<f32>,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an evaluation episode.
    pub fn record_episode(&mut self, reward: f32, steps: usize, hpwl: Option<f32>) {
        self.num_episodes += 1;
        self.total_reward += reward;
        self.total_steps += steps;

        if let Some(hpwl) = hpwl {
            self.num_success += 1;
            self.total_hpwl += hpwl;
            self.best_hpwl = Some(match self.best_hpwl {
                Some(best) => best.min(hpwl),
                None => hpwl,
            });
        }
    }

    /// Get average reward.
    pub fn avg_reward(&self) -> f32 {
        if self.num_episodes > 0 {
            self.total_reward / self.num_episodes as f32
        } else {
            0.0
        }
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f32 {
        if self.num_episodes > 0 {
            self.num_success as f32 / self.num_episodes as f32
        } else {
            0.0
        }
    }

    /// Get average episode length.
    pub fn avg_steps(&self) -> f32 {
        if self.num_episodes > 0 {
            self.total_steps as f32 / self.num_episodes as f32
        } else {
            0.0
        }
    }

    /// Get average wirelength over successful episodes.
    pub fn avg_hpwl(&self) -> f32 {
        if self.num_success > 0 {
            self.total_hpwl / self.num_success as f32
        } else {
            0.0
        }
    }

    /// Print summary.
    pub fn print_summary(&self) {
        tracing::info!("=== Evaluation Summary ===");
        tracing::info!("Episodes: {}", self.num_episodes);
        tracing::info!("Avg Reward: {:.2}", self.avg_reward());
        tracing::info!("Success Rate: {:.1}%", self.success_rate() * 100.0);
        tracing::info!("Avg Steps: {:.1}", self.avg_steps());
        tracing::info!("Avg HPWL: {:.1}", self.avg_hpwl());
        if let Some(best) = self.best_hpwl {
            tracing::info!("Best HPWL: {:.1}", best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut avg = MovingAverage::new(3);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);

        avg.push(2.0);
        assert!((avg.average() - 1.5).abs() < 1e-6);

        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // Pushes out 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_training_metrics_hpwl_only_on_success() {
        let mut metrics = TrainingMetrics::new(10);

        metrics.record_episode(0.0, 3, None);
        metrics.record_episode(12.0, 5, Some(40.0));

        assert_eq!(metrics.episode_hpwl.len(), 1);
        assert!((metrics.episode_hpwl.average() - 40.0).abs() < 1e-6);
        assert!((metrics.success_rate.average() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_evaluation_metrics() {
        let mut metrics = EvaluationMetrics::new();

        metrics.record_episode(10.0, 50, Some(120.0));
        metrics.record_episode(5.0, 30, None);
        metrics.record_episode(14.0, 50, Some(90.0));

        assert_eq!(metrics.num_episodes, 3);
        assert!((metrics.avg_reward() - 29.0 / 3.0).abs() < 1e-6);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-6);
        assert!((metrics.avg_hpwl() - 105.0).abs() < 1e-6);
        assert_eq!(metrics.best_hpwl, Some(90.0));
    }
}
