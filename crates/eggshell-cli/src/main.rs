//! Ellipsoid fitting and surface projection from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eggshell::{
    estimate_ellipsoid, fit_ellipsoid, project, CostKind, CylinderFrame, DistanceBandVolume,
    Ellipsoid, EllipsoidParams, EstimatorConfig, ProjectionMethod, ProjectionRequest,
};
use image::{ImageBuffer, Luma};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "eggshell")]
#[command(about = "Fit ellipsoids to 3D point detections and unwrap volumes around them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an ellipsoid to a point file.
    Fit(FitArgs),

    /// Closest surface point and signed distance of a query point.
    Distance {
        /// Ellipsoid JSON (output of `fit`).
        #[arg(long)]
        ellipsoid: PathBuf,

        /// Query point as `x,y,z`.
        #[arg(long, allow_hyphen_values = true)]
        point: String,
    },

    /// Print the cylinder frame used for unwrapping.
    Frame {
        #[arg(long)]
        ellipsoid: PathBuf,

        #[arg(long)]
        flip_z: bool,

        #[arg(long)]
        align_y: bool,
    },

    /// Project the distance band around an ellipsoid and write 16-bit PNG planes.
    Project(ProjectArgs),
}

#[derive(Debug, Clone, Args)]
struct FitArgs {
    /// Whitespace or comma separated `x y z` lines; `#` starts a comment.
    #[arg(long)]
    points: PathBuf,

    /// Estimator configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of random minimal-sample trials.
    #[arg(long)]
    trials: Option<usize>,

    /// Cost cap for points outside a candidate.
    #[arg(long)]
    outside_cutoff: Option<f64>,

    /// Cost cap for points inside a candidate.
    #[arg(long)]
    inside_cutoff: Option<f64>,

    #[arg(long, value_enum)]
    cost: Option<CostArg>,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Plain least-squares fit on all points, no outlier rejection.
    #[arg(long)]
    direct: bool,

    /// Output path (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ProjectArgs {
    #[arg(long)]
    ellipsoid: PathBuf,

    /// Projection request (JSON). Missing fields take their defaults.
    #[arg(long)]
    request: Option<PathBuf>,

    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Band start; defaults to the request's min distance.
    #[arg(long, allow_hyphen_values = true)]
    band_min: Option<f64>,

    /// Band end; defaults to the request's max distance.
    #[arg(long, allow_hyphen_values = true)]
    band_max: Option<f64>,

    /// Directory receiving one PNG per (timepoint, slice).
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CostArg {
    Absolute,
    Squared,
}

impl CostArg {
    fn to_core(self) -> CostKind {
        match self {
            Self::Absolute => CostKind::Absolute,
            Self::Squared => CostKind::Squared,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Cylindrical,
    Spherical,
}

impl MethodArg {
    fn to_core(self) -> ProjectionMethod {
        match self {
            Self::Cylindrical => ProjectionMethod::Cylindrical,
            Self::Spherical => ProjectionMethod::Spherical,
        }
    }
}

/// Written by `fit`; `ellipsoid` is what the other subcommands read.
#[derive(Debug, Serialize)]
struct FitReport {
    ellipsoid: EllipsoidParams,
    num_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_inliers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_trials: Option<usize>,
}

/// Accepts either a [`FitReport`] or bare [`EllipsoidParams`].
#[derive(Deserialize)]
#[serde(untagged)]
enum EllipsoidFile {
    Report { ellipsoid: EllipsoidParams },
    Bare(EllipsoidParams),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fit(args) => run_fit(&args),
        Commands::Distance { ellipsoid, point } => run_distance(&ellipsoid, &point),
        Commands::Frame {
            ellipsoid,
            flip_z,
            align_y,
        } => run_frame(&ellipsoid, flip_z, align_y),
        Commands::Project(args) => run_project(&args),
    }
}

// ── input helpers ──────────────────────────────────────────────────────

fn parse_points(text: &str) -> Result<Vec<[f64; 3]>> {
    let mut points = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        points.push(
            parse_triplet(line).with_context(|| format!("line {}: `{}`", lineno + 1, line))?,
        );
    }
    Ok(points)
}

fn parse_triplet(s: &str) -> Result<[f64; 3]> {
    let values: Vec<f64> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>().with_context(|| format!("invalid number `{t}`")))
        .collect::<Result<_>>()?;
    match values[..] {
        [x, y, z] => Ok([x, y, z]),
        _ => bail!("expected 3 coordinates, got {}", values.len()),
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_ellipsoid(path: &Path) -> Result<Ellipsoid> {
    let params = match load_json::<EllipsoidFile>(path)? {
        EllipsoidFile::Report { ellipsoid } => ellipsoid,
        EllipsoidFile::Bare(params) => params,
    };
    Ellipsoid::try_from(params).with_context(|| format!("invalid ellipsoid in {}", path.display()))
}

fn vec3(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

// ── fit ────────────────────────────────────────────────────────────────

fn run_fit(args: &FitArgs) -> Result<()> {
    let text = fs::read_to_string(&args.points)
        .with_context(|| format!("failed to read {}", args.points.display()))?;
    let points = parse_points(&text)?;
    tracing::info!("Loaded {} points from {}", points.len(), args.points.display());

    let report = if args.direct {
        let ellipsoid = fit_ellipsoid(&points).context("direct ellipsoid fit failed")?;
        FitReport {
            ellipsoid: ellipsoid.into(),
            num_points: points.len(),
            num_inliers: None,
            best_cost: None,
            valid_trials: None,
        }
    } else {
        let mut config: EstimatorConfig = match &args.config {
            Some(path) => load_json(path)?,
            None => EstimatorConfig::default(),
        };
        if let Some(v) = args.trials {
            config.num_trials = v;
        }
        if let Some(v) = args.outside_cutoff {
            config.outside_cutoff = v;
        }
        if let Some(v) = args.inside_cutoff {
            config.inside_cutoff = v;
        }
        if let Some(v) = args.cost {
            config.cost = v.to_core();
        }
        if args.seed.is_some() {
            config.seed = args.seed;
        }

        let mut rng = config.rng();
        let res = estimate_ellipsoid(&points, &config, &mut rng)
            .context("robust ellipsoid estimation failed")?;
        FitReport {
            ellipsoid: res.ellipsoid.into(),
            num_points: points.len(),
            num_inliers: Some(res.num_inliers),
            best_cost: Some(res.best_cost),
            valid_trials: Some(res.valid_trials),
        }
    };

    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&args.out, json).with_context(|| format!("failed to write {}", args.out.display()))?;
    tracing::info!("Ellipsoid written to {}", args.out.display());
    Ok(())
}

// ── distance ───────────────────────────────────────────────────────────

fn run_distance(ellipsoid: &Path, point: &str) -> Result<()> {
    let e = load_ellipsoid(ellipsoid)?;
    let p = Vector3::from(parse_triplet(point).context("invalid --point")?);
    let d = e.distance_to(&p);
    let out = serde_json::json!({
        "closest_point": vec3(&d.closest_point),
        "distance": d.distance,
        "signed_distance": d.signed_distance(),
        "inside": d.inside,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ── frame ──────────────────────────────────────────────────────────────

fn run_frame(ellipsoid: &Path, flip_z: bool, align_y: bool) -> Result<()> {
    let e = load_ellipsoid(ellipsoid)?;
    let f = CylinderFrame::new(&e, flip_z, align_y);
    let out = serde_json::json!({
        "a": vec3(&f.a),
        "z": vec3(&f.z),
        "l": vec3(&f.l),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ── project ────────────────────────────────────────────────────────────

fn run_project(args: &ProjectArgs) -> Result<()> {
    let e = load_ellipsoid(&args.ellipsoid)?;
    let mut request: ProjectionRequest = match &args.request {
        Some(path) => load_json(path)?,
        None => ProjectionRequest::default(),
    };
    if let Some(m) = args.method {
        request.method = m.to_core();
    }
    request.validate().context("invalid projection request")?;

    let mut band = DistanceBandVolume::new(
        e,
        args.band_min.unwrap_or(request.min_distance),
        args.band_max.unwrap_or(request.max_distance),
    );
    band.timepoints = request.max_timepoint.saturating_add(1);

    let stack = project(&e, &request, &band).context("projection failed")?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let (w, h) = (stack.width() as u32, stack.height() as u32);
    for ti in 0..stack.timepoints() {
        for slice in 0..stack.depth() {
            let pixels: Vec<u16> = stack
                .plane(slice, ti)
                .iter()
                .map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16)
                .collect();
            let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, pixels)
                .context("plane size does not match image dimensions")?;
            let path = args.out_dir.join(format!(
                "t{:03}_s{:03}.png",
                request.min_timepoint + ti,
                slice
            ));
            img.save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }
    tracing::info!(
        "Wrote {} planes of {}x{} to {}",
        stack.num_planes(),
        w,
        h,
        args.out_dir.display()
    );

    let out = serde_json::json!({
        "shape": stack.shape(),
        "method": request.method,
        "out_dir": args.out_dir,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
