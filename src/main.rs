use std::env;
use std::path::Path;

use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use macroplace::env::EnvConfig;
use macroplace::rl::{PpoConfig, PpoTrainer, TrainConfig};
use macroplace::{ConnectivityGraph, NetlistDb, PlaceEnv, PlaceError};

type Backend = burn::backend::Autodiff<burn::backend::NdArray>;

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("macroplace=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Load a bookshelf benchmark when `PLACE_BENCHMARK_DIR` is set, otherwise
/// fall back to a seeded synthetic netlist.
fn load_netlist() -> Result<NetlistDb, PlaceError> {
    if let Ok(dir) = env::var("PLACE_BENCHMARK_DIR") {
        let benchmark = env::var("PLACE_BENCHMARK")
            .expect("PLACE_BENCHMARK environment variable is required with PLACE_BENCHMARK_DIR");
        tracing::info!("Loading benchmark '{}' from {}", benchmark, dir);
        NetlistDb::from_bookshelf(Path::new(&dir), &benchmark)
    } else {
        let num_macros = get_env_var("PLACE_NUM_MACROS").unwrap_or(64);
        let num_nets = get_env_var("PLACE_NUM_NETS").unwrap_or(128);
        let max_fanout = get_env_var("PLACE_MAX_FANOUT").unwrap_or(6);
        let seed = get_env_var("PLACE_SEED").unwrap_or(42);
        tracing::info!(
            "Generating synthetic netlist: {} macros, {} nets (seed {})",
            num_macros,
            num_nets,
            seed
        );
        Ok(NetlistDb::synthetic(num_macros, num_nets, max_fanout, seed))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let mode = env::args().nth(1).unwrap_or_else(|| "train".to_string());

    let db = load_netlist()?;
    let graph = ConnectivityGraph::from_db(&db);

    let env_config = EnvConfig {
        grid: get_env_var("PLACE_GRID").unwrap_or(32),
        invalid_move_reward: get_env_var("PLACE_INVALID_REWARD").unwrap_or(0.0),
    };
    let mut place_env = PlaceEnv::new(&db, env_config)?;

    tracing::info!(
        "Netlist has {} macros and {} nets on a {}x{} grid",
        db.macro_count(),
        db.net_count(),
        place_env.grid(),
        place_env.grid()
    );

    let mut ppo = PpoConfig::default();
    if let Some(lr) = get_env_var("PLACE_LR_ACTOR") {
        ppo.lr_actor = lr;
    }
    if let Some(lr) = get_env_var("PLACE_LR_CRITIC") {
        ppo.lr_critic = lr;
    }

    let device = Default::default();
    let mut trainer = PpoTrainer::<Backend>::new(device, &place_env, &graph, ppo);

    if let Ok(path) = env::var("PLACE_CHECKPOINT") {
        trainer.load_checkpoint(&path)?;
    }

    match mode.as_str() {
        "train" => {
            let config = TrainConfig {
                num_iterations: get_env_var("PLACE_ITERATIONS").unwrap_or(2000),
                episodes_per_iteration: get_env_var("PLACE_EPISODES_PER_ITER").unwrap_or(8),
                checkpoint_dir: env::var("PLACE_CHECKPOINT_DIR")
                    .unwrap_or_else(|_| "checkpoints".to_string()),
                log_dir: env::var("PLACE_LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
                ..TrainConfig::default()
            };
            trainer.train(&mut place_env, &config)?;
        }
        "eval" => {
            let episodes = get_env_var("PLACE_EVAL_EPISODES").unwrap_or(20);
            let metrics = trainer.evaluate(&mut place_env, episodes);
            metrics.print_summary();
        }
        other => {
            tracing::error!("Unknown mode '{}', expected 'train' or 'eval'", other);
            std::process::exit(2);
        }
    }

    Ok(())
}
