//! Placement environment - gym-like interface for training.
//!
//! Macros are placed one per step in id order. An episode ends either when
//! every macro is placed (success, wirelength-based reward) or when the
//! policy selects an occupied cell (invalid move, configured reward).

use crate::db::NetlistDb;
use crate::error::PlaceError;

/// Environment configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Grid edge length in cells; the action space is `grid * grid`.
    pub grid: usize,
    /// Reward for selecting an occupied cell. Zero by default; a large
    /// negative value turns invalid moves into explicit penalties.
    pub invalid_move_reward: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            grid: 32,
            invalid_move_reward: 0.0,
        }
    }
}

/// Observation returned by the environment.
///
/// The occupancy vector doubles as the action-validity mask: a cell holding
/// 1.0 is occupied and must not be selected.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Index of the next macro to place, equal to the number already placed.
    pub macro_index: usize,
    /// Flattened 0/1 occupancy grid, row-major.
    pub occupancy: Vec<f32>,
}

/// Step result from the environment.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation.
    pub observation: Observation,
    /// Step reward; non-zero only on terminal steps.
    pub reward: f32,
    /// Episode done.
    pub done: bool,
    /// Additional info.
    pub info: StepInfo,
}

/// Additional information from a step.
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Macros placed so far.
    pub placed: usize,
    /// Episode ended by selecting an occupied cell.
    pub invalid_move: bool,
    /// Total wirelength, reported at success termination.
    pub hpwl: Option<f32>,
}

/// Sequential macro placement environment.
#[derive(Debug)]
pub struct PlaceEnv {
    config: EnvConfig,
    /// Member macro ids per net.
    nets: Vec<Vec<usize>>,
    num_macros: usize,
    /// Flattened 0/1 occupancy, row-major (`cell = x * grid + y`).
    canvas: Vec<f32>,
    /// Grid cell per macro id, populated in placement order.
    positions: Vec<Option<(usize, usize)>>,
    num_placed: usize,
    done: bool,
}

impl PlaceEnv {
    /// Create an environment for `db`.
    ///
    /// Fails when the grid is too small to leave the sampling policy enough
    /// free cells for a fully legal placement.
    pub fn new(db: &NetlistDb, config: EnvConfig) -> Result<Self, PlaceError> {
        let num_macros = db.macro_count();
        let cells = config.grid * config.grid;
        if (cells as f64) < 1.5 * num_macros as f64 {
            return Err(PlaceError::GridTooSmall {
                grid: config.grid,
                macros: num_macros,
            });
        }

        let nets = db
            .nets
            .iter()
            .map(|net| net.pins.iter().map(|pin| pin.macro_id).collect())
            .collect();

        Ok(Self {
            config,
            nets,
            num_macros,
            canvas: vec![0.0; cells],
            positions: vec![None; num_macros],
            num_placed: 0,
            done: false,
        })
    }

    /// Reset to an empty grid and return the initial observation.
    pub fn reset(&mut self) -> Observation {
        self.canvas.fill(0.0);
        self.positions.fill(None);
        self.num_placed = 0;
        self.done = false;

        self.get_observation()
    }

    /// Get the current observation.
    pub fn get_observation(&self) -> Observation {
        Observation {
            macro_index: self.num_placed,
            occupancy: self.canvas.clone(),
        }
    }

    /// Place the next macro at the cell decoded from `action`.
    ///
    /// `action` must be in `[0, grid * grid)` and the episode must not be
    /// finished; both are caller bugs, not runtime failures.
    pub fn step(&mut self, action: usize) -> StepResult {
        assert!(!self.done, "step called on a finished episode");
        assert!(
            action < self.canvas.len(),
            "action {action} outside grid of {} cells",
            self.canvas.len()
        );

        let x = action / self.config.grid;
        let y = action % self.config.grid;

        let mut info = StepInfo::default();
        let reward;

        if self.canvas[action] == 1.0 {
            // Invalid move: terminate without placing.
            self.done = true;
            info.invalid_move = true;
            reward = self.config.invalid_move_reward;
        } else {
            self.canvas[action] = 1.0;
            self.positions[self.num_placed] = Some((x, y));
            self.num_placed += 1;

            if self.num_placed == self.num_macros {
                self.done = true;
                let hpwl = self.hpwl();
                info.hpwl = Some(hpwl);
                reward = (2 * self.config.grid * self.nets.len()) as f32 - hpwl;
            } else {
                reward = 0.0;
            }
        }

        info.placed = self.num_placed;

        StepResult {
            observation: self.get_observation(),
            reward,
            done: self.done,
            info,
        }
    }

    /// Half-perimeter wirelength over the currently placed macros.
    ///
    /// Each net contributes the half perimeter of the bounding box of its
    /// placed members, offset so a single-cell box counts 2. Nets with no
    /// placed member contribute nothing. Depends only on per-axis min/max,
    /// not on member order.
    pub fn hpwl(&self) -> f32 {
        let mut total = 0.0f32;
        for net in &self.nets {
            let mut bbox: Option<(usize, usize, usize, usize)> = None;
            for &macro_id in net {
                if let Some((x, y)) = self.positions[macro_id] {
                    bbox = Some(match bbox {
                        None => (x, x, y, y),
                        Some((min_x, max_x, min_y, max_y)) => (
                            min_x.min(x),
                            max_x.max(x),
                            min_y.min(y),
                            max_y.max(y),
                        ),
                    });
                }
            }
            if let Some((min_x, max_x, min_y, max_y)) = bbox {
                total += ((max_x - min_x + 1) + (max_y - min_y + 1)) as f32;
            }
        }
        total
    }

    /// Grid edge length in cells.
    pub fn grid(&self) -> usize {
        self.config.grid
    }

    /// Size of the discrete action space.
    pub fn num_actions(&self) -> usize {
        self.canvas.len()
    }

    /// Number of macros to place per episode.
    pub fn num_macros(&self) -> usize {
        self.num_macros
    }

    /// Number of nets contributing to the reward.
    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    /// Whether the current episode has terminated.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Grid cell per macro id for the current episode.
    pub fn positions(&self) -> &[Option<(usize, usize)>] {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Net, NetPin};

    fn single_net_db(num_macros: usize, members: &[usize]) -> NetlistDb {
        let mut db = NetlistDb::synthetic(num_macros, 1, 2, 0);
        db.nets = vec![Net {
            name: "n0".to_string(),
            pins: members
                .iter()
                .map(|&macro_id| NetPin {
                    macro_id,
                    x_offset: 0.0,
                    y_offset: 0.0,
                })
                .collect(),
        }];
        db
    }

    fn tiny_env(invalid_move_reward: f32) -> PlaceEnv {
        let db = single_net_db(3, &[0, 1, 2]);
        let config = EnvConfig {
            grid: 4,
            invalid_move_reward,
        };
        PlaceEnv::new(&db, config).unwrap()
    }

    #[test]
    fn reset_clears_all_state() {
        let mut env = tiny_env(0.0);
        env.step(0);
        env.step(5);

        let obs = env.reset();
        assert_eq!(obs.macro_index, 0);
        assert!(obs.occupancy.iter().all(|&c| c == 0.0));
        assert!(!env.is_done());
        assert!(env.positions().iter().all(|p| p.is_none()));
    }

    #[test]
    fn rejects_grid_without_slack() {
        // 4x4 = 16 cells, 11 macros would need 16.5.
        let db = NetlistDb::synthetic(11, 2, 3, 0);
        let config = EnvConfig {
            grid: 4,
            invalid_move_reward: 0.0,
        };
        let err = PlaceEnv::new(&db, config).unwrap_err();
        assert!(matches!(err, PlaceError::GridTooSmall { grid: 4, macros: 11 }));

        let db = NetlistDb::synthetic(10, 2, 3, 0);
        let config = EnvConfig {
            grid: 4,
            invalid_move_reward: 0.0,
        };
        assert!(PlaceEnv::new(&db, config).is_ok());
    }

    #[test]
    fn success_reward_matches_wirelength_formula() {
        let mut env = tiny_env(0.0);
        env.reset();

        // (0,0), (0,3), (3,0) on a 4x4 grid.
        let first = env.step(0);
        assert!(!first.done);
        assert_eq!(first.reward, 0.0);
        assert_eq!(first.info.placed, 1);

        let second = env.step(3);
        assert!(!second.done);
        assert_eq!(second.reward, 0.0);

        // Bounding box is 4x4 cells: hpwl = (3+1)+(3+1) = 8,
        // reward = 2*4*1 - 8 = 0.
        let last = env.step(12);
        assert!(last.done);
        assert!(!last.info.invalid_move);
        assert_eq!(last.info.hpwl, Some(8.0));
        assert_eq!(last.reward, 0.0);
        assert_eq!(last.observation.macro_index, 3);
    }

    #[test]
    fn occupied_cell_terminates_immediately() {
        let mut env = tiny_env(0.0);
        env.reset();

        env.step(7);
        let result = env.step(7);
        assert!(result.done);
        assert!(result.info.invalid_move);
        assert_eq!(result.reward, 0.0);
        assert_eq!(result.info.placed, 1);
        assert!(env.is_done());
    }

    #[test]
    fn invalid_move_reward_is_configurable() {
        let mut env = tiny_env(-50.0);
        env.reset();

        env.step(0);
        let result = env.step(0);
        assert!(result.done);
        assert_eq!(result.reward, -50.0);
    }

    #[test]
    #[should_panic(expected = "finished episode")]
    fn step_after_termination_panics() {
        let mut env = tiny_env(0.0);
        env.reset();
        env.step(0);
        env.step(0);
        env.step(1);
    }

    #[test]
    fn hpwl_ignores_net_member_order() {
        let mut forward = {
            let db = single_net_db(3, &[0, 1, 2]);
            PlaceEnv::new(
                &db,
                EnvConfig {
                    grid: 4,
                    invalid_move_reward: 0.0,
                },
            )
            .unwrap()
        };
        let mut shuffled = {
            let db = single_net_db(3, &[2, 0, 1]);
            PlaceEnv::new(
                &db,
                EnvConfig {
                    grid: 4,
                    invalid_move_reward: 0.0,
                },
            )
            .unwrap()
        };

        for env in [&mut forward, &mut shuffled] {
            env.reset();
            env.step(1);
            env.step(6);
            env.step(11);
        }

        assert_eq!(forward.hpwl(), shuffled.hpwl());
    }

    #[test]
    fn hpwl_covers_only_placed_members() {
        let mut env = tiny_env(0.0);
        env.reset();
        assert_eq!(env.hpwl(), 0.0);

        // Single placed member: 1x1 box contributes 2.
        env.step(0);
        assert_eq!(env.hpwl(), 2.0);

        // (0,0) and (1,1): 2x2 box contributes 4.
        env.step(5);
        assert_eq!(env.hpwl(), 4.0);
    }

    #[test]
    fn multi_net_reward_sums_bounding_boxes() {
        let mut db = NetlistDb::synthetic(3, 1, 2, 0);
        db.nets = vec![
            Net {
                name: "n0".to_string(),
                pins: vec![
                    NetPin {
                        macro_id: 0,
                        x_offset: 0.0,
                        y_offset: 0.0,
                    },
                    NetPin {
                        macro_id: 1,
                        x_offset: 0.0,
                        y_offset: 0.0,
                    },
                ],
            },
            Net {
                name: "n1".to_string(),
                pins: vec![
                    NetPin {
                        macro_id: 1,
                        x_offset: 0.0,
                        y_offset: 0.0,
                    },
                    NetPin {
                        macro_id: 2,
                        x_offset: 0.0,
                        y_offset: 0.0,
                    },
                ],
            },
        ];
        let mut env = PlaceEnv::new(
            &db,
            EnvConfig {
                grid: 4,
                invalid_move_reward: 0.0,
            },
        )
        .unwrap();
        env.reset();

        // Macros at (0,0), (0,1), (2,1).
        env.step(0);
        env.step(1);
        let last = env.step(9);

        // n0 box 1x2 -> 3, n1 box 3x1 -> 4; reward = 2*4*2 - 7 = 9.
        assert!(last.done);
        assert_eq!(last.info.hpwl, Some(7.0));
        assert_eq!(last.reward, 9.0);
    }
}
