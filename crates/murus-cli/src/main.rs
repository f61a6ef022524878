use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use murus_bridge::{
    run_pipeline, synthetic_wall, FixedPlaneProvider, PipelineConfig, PlaneProvider, RansacPlaneProvider,
};
use murus_core::{Cloud, PlaneModel};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// ---------- helpers ----------

fn t0() -> std::time::Instant { std::time::Instant::now() }
fn lap(t: std::time::Instant, label: &str) {
    let ms = t.elapsed().as_secs_f64()*1000.0;
    println!("[{label}] {ms:.1} ms");
}

fn plane_arg(v: &[f32]) -> Result<PlaneModel> {
    anyhow::ensure!(v.len() == 4, "--plane takes 4 coefficients (a b c d), got {}", v.len());
    Ok(PlaneModel::new(v[0], v[1], v[2], v[3])?)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p).with_context(|| format!("config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn synthetic_input(cfg: &PipelineConfig, seed: Option<u64>) -> Cloud {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(cfg.synthetic.seed));
    synthetic_wall(&cfg.synthetic, &mut rng)
}

// ---------- CLI ----------

#[derive(Parser)]
#[command(name="murus", version, about="murus: wall damage histograms from point clouds")]
struct Args { #[command(subcommand)] cmd: Cmd }

#[derive(Subcommand)]
enum Cmd {
    /// Print point count, attributes and bounds of a file (PLY / LAS)
    Info { input: PathBuf },

    /// Write the synthetic two-sheet wall to PLY
    Synth {
        output: PathBuf,
        #[arg(long)] config: Option<PathBuf>,
        #[arg(long)] seed: Option<u64>,
    },

    /// Voxel downsample (centroid per cell)
    Voxel {
        input: PathBuf, output: PathBuf,
        #[arg(short, long, default_value_t=0.01)] size: f32,
    },

    /// Per-point distance / angle offsets against a given plane
    Damage {
        input: PathBuf, output: PathBuf,
        #[arg(long, num_args=4, allow_negative_numbers=true, value_names=["A", "B", "C", "D"], required=true)]
        plane: Vec<f32>,
        #[arg(short='k', long, default_value_t=murus_features::DEFAULT_K_SEARCH)] k: usize,
    },

    /// Full pipeline: wall, damage, voxel anchors, histograms
    Run {
        #[arg(required_unless_present="synthetic", conflicts_with="synthetic")]
        input: Option<PathBuf>,
        /// use the synthetic wall instead of an input file
        #[arg(long)] synthetic: bool,
        #[arg(long)] seed: Option<u64>,
        /// YAML run parameters; flags below override it
        #[arg(long)] config: Option<PathBuf>,
        #[arg(short='k', long)] k_search: Option<usize>,
        #[arg(long)] leaf_size: Option<f32>,
        #[arg(long)] angle_bins: Option<usize>,
        #[arg(long)] dist_bins: Option<usize>,
        /// manual bin limits; disables automatic limits
        #[arg(long, num_args=4, allow_negative_numbers=true,
              value_names=["ANGLE_LO", "ANGLE_HI", "DIST_LO", "DIST_HI"])]
        bin_limits: Option<Vec<f32>>,
        /// skip detection and use this plane for the whole cloud
        #[arg(long, num_args=4, allow_negative_numbers=true, value_names=["A", "B", "C", "D"])]
        plane: Option<Vec<f32>>,
        #[arg(short, long, default_value="murus-out")] out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match args.cmd {
        Cmd::Info { input } => cmd_info(&input),
        Cmd::Synth { output, config, seed } => cmd_synth(&output, config.as_deref(), seed),
        Cmd::Voxel { input, output, size } => cmd_voxel(&input, &output, size),
        Cmd::Damage { input, output, plane, k } => cmd_damage(&input, &output, &plane, k),
        Cmd::Run {
            input, synthetic, seed, config, k_search, leaf_size, angle_bins, dist_bins, bin_limits, plane, out_dir,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(k) = k_search { cfg.k_search = k; }
            if let Some(l) = leaf_size { cfg.leaf_size = l; }
            if let Some(b) = angle_bins { cfg.angle_bins = b; }
            if let Some(b) = dist_bins { cfg.dist_bins = b; }
            if let Some(l) = bin_limits {
                cfg.automatically_set_bins = false;
                cfg.lower_angle_bin_limit = l[0];
                cfg.upper_angle_bin_limit = l[1];
                cfg.lower_dist_bin_limit = l[2];
                cfg.upper_dist_bin_limit = l[3];
            }
            cfg.validate()?;
            let source = if synthetic { None } else { input };
            cmd_run(source.as_deref(), seed, plane.as_deref(), &cfg, &out_dir)
        }
    }
}

// ---------- commands ----------

fn cmd_info(path: &Path) -> Result<()> {
    let cloud = murus_io::read_auto(path)?;
    println!("points: {}", cloud.len());
    println!("attributes: {:?}", cloud.aligned_attrs());
    if !cloud.is_empty() {
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for i in 0..cloud.len() {
            let p = cloud.point(i);
            for a in 0..3 {
                lo[a] = lo[a].min(p[a]);
                hi[a] = hi[a].max(p[a]);
            }
        }
        println!("bounds: min={:?} max={:?}", lo, hi);
    }
    Ok(())
}

fn cmd_synth(output: &Path, config: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let cfg = load_config(config)?;
    let cloud = synthetic_input(&cfg, seed);
    murus_io::write_ply_ascii(output, &cloud)?;
    println!("synth: {} points -> {}", cloud.len(), output.display());
    Ok(())
}

fn cmd_voxel(input: &Path, output: &Path, size: f32) -> Result<()> {
    let cloud = murus_io::read_auto(input)?;
    let out = murus_filters::voxel_downsample(&cloud, size)?;
    murus_io::write_ply_ascii(output, &out)?;
    println!("downsampled: {} -> {}", cloud.len(), out.len());
    Ok(())
}

fn cmd_damage(input: &Path, output: &Path, plane: &[f32], k: usize) -> Result<()> {
    let plane = plane_arg(plane)?;
    let t_read = t0();
    let cloud = murus_io::read_auto(input)?;
    lap(t_read, "read");

    let t_damage = t0();
    let damage = murus_features::estimate_wall_damage(&cloud, &plane, k)?;
    lap(t_damage, "damage");

    murus_io::write_damage_ply(output, &damage)?;
    println!("damage: {} pts -> {}", damage.len(), output.display());
    Ok(())
}

fn cmd_run(
    input: Option<&Path>, seed: Option<u64>, plane: Option<&[f32]>, cfg: &PipelineConfig, out_dir: &Path,
) -> Result<()> {
    let t_read = t0();
    let cloud = match input {
        Some(p) => murus_io::read_auto(p)?,
        None => synthetic_input(cfg, seed),
    };
    lap(t_read, "input");

    let provider: Box<dyn PlaneProvider> = match plane {
        Some(v) => Box::new(FixedPlaneProvider::new(plane_arg(v)?)),
        None => Box::new(RansacPlaneProvider::new(cfg.ransac.clone())),
    };

    let t_run = t0();
    let out = run_pipeline(&cloud, provider.as_ref(), cfg)?;
    lap(t_run, "pipeline");

    let t_write = t0();
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    murus_io::write_ply_ascii(&out_dir.join("input.ply"), &cloud)?;
    murus_io::write_ply_ascii(&out_dir.join("wall.ply"), &out.wall)?;
    murus_io::write_ply_ascii(&out_dir.join("voxelized.ply"), &out.voxelized)?;
    murus_io::write_damage_ply(&out_dir.join("damage.ply"), &out.damage)?;
    murus_io::write_histogram_ply(&out_dir.join("histogram.ply"), &out.histograms)?;
    let csv = out_dir.join("histograms.csv");
    murus_io::write_histogram_csv(&csv, &out.histograms)?;
    let summary = out.summary(cloud.len());
    serde_json::to_writer_pretty(File::create(out_dir.join("summary.json"))?, &summary)?;
    lap(t_write, "write");
    info!("wrote outputs to {}", out_dir.display());

    println!(
        "run: {} pts, wall {}, {} anchors x {} bins{} -> {}",
        summary.input_points,
        summary.wall_points,
        summary.voxel_anchors,
        summary.histogram_bins,
        if summary.degraded { " (degraded: whole cloud, fallback plane)" } else { "" },
        csv.display()
    );
    Ok(())
}
