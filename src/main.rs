use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use log::info;
use rand::{SeedableRng, rngs::StdRng};
use tpn_train::config::{RcnnConfig, SolverParameter, TrainConfig};
use tpn_train::dataset::Dataset;
use tpn_train::stats::BBoxNormalizationStats;
use tpn_train::target::IouTargetAssigner;
use tpn_train::tracker::{GeometryFeatureNet, PropagationConfig, RoiPropagator};
use tpn_train::training::{DriverOptions, DryRunSolver, RecurrentSolver, TrainingDriver};

#[derive(Debug, Clone, Parser)]
/// Train a tubelet proposal network
struct Args {
    /// solver parameter file
    solver: PathBuf,
    /// feature net definition
    feature_net: PathBuf,
    /// feature net parameters
    feature_param: PathBuf,
    #[arg(long)]
    /// training configuration file
    train_cfg: PathBuf,
    #[arg(long)]
    /// region-proposal configuration file
    rcnn_cfg: Option<PathBuf>,
    #[arg(long)]
    /// train on a small subset of the video list
    debug: bool,
    #[arg(long)]
    /// log every propagated box
    vis_debug: bool,
    #[arg(long, requires = "bbox_std")]
    /// per-class regression target means
    bbox_mean: Option<PathBuf>,
    #[arg(long, requires = "bbox_mean")]
    /// per-class regression target standard deviations
    bbox_std: Option<PathBuf>,
    #[arg(long, default_value_t = 32)]
    /// ROIs per feature net call
    num_per_batch: usize,
    #[arg(long, conflicts_with = "snapshot")]
    /// initialize the recurrent net from trained weights
    weights: Option<PathBuf>,
    #[arg(long)]
    /// resume from a solver snapshot
    snapshot: Option<PathBuf>,
    #[arg(long, env = "OMPI_COMM_WORLD_RANK", default_value_t = 0)]
    rank: usize,
    #[arg(long, env = "OMPI_COMM_WORLD_SIZE", default_value_t = 1)]
    world_size: usize,
}

fn main() -> Result<()> {
    // setup logging
    if std::env::var_os("RUST_LOG").is_none() {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        pretty_env_logger::init();
    }

    let args = Args::parse();
    ensure!(
        args.rank < args.world_size,
        "rank {} is outside a world of size {}",
        args.rank,
        args.world_size
    );

    let train_cfg = TrainConfig::open(&args.train_cfg).with_context(|| {
        format!(
            "failed to load training config '{}'",
            args.train_cfg.display()
        )
    })?;
    let rcnn_cfg = match &args.rcnn_cfg {
        Some(path) => RcnnConfig::open(path)
            .with_context(|| format!("failed to load rcnn config '{}'", path.display()))?,
        None => RcnnConfig::default(),
    };
    let solver_param = SolverParameter::open(&args.solver)
        .with_context(|| format!("failed to load solver '{}'", args.solver.display()))?;
    info!("rank {}: training config {:#?}", args.rank, train_cfg);
    info!("rank {}: rcnn config {:#?}", args.rank, rcnn_cfg);

    let device = solver_param.device_for(args.rank, args.world_size)?;
    info!("rank {}: using device {}", args.rank, device);

    let seed = train_cfg.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(args.rank as u64));
    let dataset = Dataset::load(&train_cfg, args.debug, &mut rng)?;
    info!("rank {}: {} videos loaded", args.rank, dataset.len());

    let net = GeometryFeatureNet::open(&args.feature_net, &args.feature_param)
        .with_context(|| {
            format!(
                "failed to load feature net '{}'",
                args.feature_param.display()
            )
        })?;
    let stats = match (&args.bbox_mean, &args.bbox_std) {
        (Some(mean), Some(std)) => BBoxNormalizationStats::open(mean, std)
            .context("failed to load bbox normalization stats")?,
        _ => BBoxNormalizationStats::identity(net.num_classes())?,
    };
    ensure!(
        stats.num_classes() == net.num_classes(),
        "stats cover {} classes, feature net predicts {}",
        stats.num_classes(),
        net.num_classes()
    );

    let mut solver = DryRunSolver::new(solver_param.clone()).with_num_classes(net.num_classes());
    if let Some(snapshot) = &args.snapshot {
        solver.restore(snapshot)?;
    } else if let Some(weights) = &args.weights {
        solver.copy_weights(weights)?;
    }

    let propagator = RoiPropagator::new(PropagationConfig {
        num_tracks: train_cfg.track_per_vid,
        track_length: train_cfg.track_length,
        fg_ratio: train_cfg.fg_ratio,
        batch_size: args.num_per_batch,
    });
    let options = DriverOptions {
        max_iter: solver_param.max_iter,
        rank: args.rank,
        reshuffle_on_wrap: train_cfg.reshuffle_on_wrap,
        vis_debug: args.vis_debug,
        seed,
        ..DriverOptions::default()
    };
    let mut driver = TrainingDriver::new(
        dataset,
        propagator,
        IouTargetAssigner::new(rcnn_cfg.train),
        stats,
        net,
        solver,
        options,
    )?;
    driver.run()?;

    Ok(())
}
