use approx::assert_abs_diff_eq;
use murus_bridge::{
    run_pipeline, synthetic_wall, FixedPlaneProvider, PipelineConfig, PlaneProvider, PlaneRegion,
    RansacPlaneProvider,
};
use murus_core::{Cloud, Error, PlaneModel, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct Unavailable;

impl PlaneProvider for Unavailable {
    fn detect(&self, _: &Cloud) -> Result<Vec<PlaneRegion>> {
        Err(Error::ExternalServiceFailure("primitive extraction service not reachable".into()))
    }
}

struct Rejecting(Error);

impl PlaneProvider for Rejecting {
    fn detect(&self, _: &Cloud) -> Result<Vec<PlaneRegion>> { Err(self.0.clone()) }
}

struct Nothing;

impl PlaneProvider for Nothing {
    fn detect(&self, _: &Cloud) -> Result<Vec<PlaneRegion>> { Ok(Vec::new()) }
}

fn flat_grid(n: usize, step: f32) -> Cloud {
    let mut c = Cloud::default();
    for i in 0..n {
        for j in 0..n {
            c.push(i as f32 * step, j as f32 * step, 0.0);
        }
    }
    c
}

#[test]
fn flat_wall_with_stub_provider() {
    let input = flat_grid(12, 0.05);
    let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
    // cell edges at multiples of 0.12 fall between grid rows: 5 cells per axis
    let cfg = PipelineConfig { k_search: 10, leaf_size: 0.12, ..Default::default() };
    let out = run_pipeline(&input, &FixedPlaneProvider::new(plane), &cfg).unwrap();

    assert!(!out.degraded);
    assert_eq!(out.wall.len(), input.len());
    assert_eq!(out.damage.len(), input.len());
    assert_eq!(out.voxelized.len(), 25);
    assert_eq!(out.histograms.len(), out.voxelized.len());
    for d in &out.damage.data {
        assert_abs_diff_eq!(d.dist_offset, 0.0);
        assert_abs_diff_eq!(d.angle_offset, 0.0, epsilon = 1e-4);
    }
    for h in &out.histograms.data {
        assert_eq!(h.len(), 80);
        assert_eq!(h.total(), 10);
    }
}

#[test]
fn manual_limits_clamp_out_of_range_offsets() {
    // every point sits 1.0 above the plane, far outside [-0.02, 0.02]
    let mut input = flat_grid(8, 0.05);
    input.z.iter_mut().for_each(|z| *z = 1.0);
    let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
    let cfg = PipelineConfig {
        k_search: 5,
        leaf_size: 0.2,
        automatically_set_bins: false,
        ..Default::default()
    };
    let out = run_pipeline(&input, &FixedPlaneProvider::new(plane), &cfg).unwrap();
    assert_abs_diff_eq!(out.limits.dist.hi, 0.02);
    for h in &out.histograms.data {
        // angle bin 0, last distance bin
        assert_eq!(h.counts[cfg.dist_bins - 1], 5);
        assert_eq!(h.total(), 5);
    }
}

#[test]
fn provider_failure_degrades_to_whole_cloud() {
    let input = flat_grid(6, 0.1);
    let cfg = PipelineConfig { k_search: 4, leaf_size: 0.25, ..Default::default() };
    for provider in [&Unavailable as &dyn PlaneProvider, &Nothing] {
        let out = run_pipeline(&input, provider, &cfg).unwrap();
        assert!(out.degraded);
        assert_eq!(out.wall.x, input.x);
        assert_eq!(out.plane.coefficients(), [0.0, 1.0, -1.0, 0.0]);
        assert_eq!(out.damage.len(), input.len());
        assert!(out.summary(input.len()).degraded);
    }
}

#[test]
fn provider_input_errors_end_the_run() {
    let input = flat_grid(6, 0.1);
    let cfg = PipelineConfig { k_search: 4, leaf_size: 0.25, ..Default::default() };
    let rejected = Rejecting(Error::invalid("cloud too sparse for detection"));
    assert!(matches!(run_pipeline(&input, &rejected, &cfg), Err(Error::InvalidInput(_))));
    let degenerate = Rejecting(Error::DegeneratePlane);
    assert_eq!(run_pipeline(&input, &degenerate, &cfg).unwrap_err(), Error::DegeneratePlane);
}

#[test]
fn invalid_config_fails_fast() {
    let input = flat_grid(4, 0.1);
    let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
    let cfg = PipelineConfig {
        automatically_set_bins: false,
        lower_angle_bin_limit: 2.0,
        upper_angle_bin_limit: 1.0,
        ..Default::default()
    };
    let err = run_pipeline(&input, &FixedPlaneProvider::new(plane), &cfg).unwrap_err();
    assert!(matches!(err, Error::DegenerateRange { axis: "angle", .. }));
}

#[test]
fn synthetic_run_writes_expected_csv() {
    let cfg = PipelineConfig::default();
    let input = synthetic_wall(&cfg.synthetic, &mut ChaCha8Rng::seed_from_u64(2024));
    let out = run_pipeline(&input, &RansacPlaneProvider::new(cfg.ransac.clone()), &cfg).unwrap();

    assert!(!out.degraded);
    assert!(out.wall.len() >= 800, "wall has {} points", out.wall.len());
    let n = out.plane.unit_normal().unwrap();
    // the flat sheet lies on y = z
    assert_abs_diff_eq!(n[0].abs(), 0.0, epsilon = 0.05);
    assert_abs_diff_eq!(n[1].abs(), std::f32::consts::FRAC_1_SQRT_2, epsilon = 0.05);
    assert_abs_diff_eq!((n[1] + n[2]).abs(), 0.0, epsilon = 0.05);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("histograms.csv");
    murus_io::write_histogram_csv(&path, &out.histograms).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), out.voxelized.len() + 1);
    assert!(lines[0].starts_with('#'));
    for row in &lines[1..] {
        let counts: Vec<u32> = row.split(", ").map(|v| v.parse().unwrap()).collect();
        assert_eq!(counts.len(), 80);
        assert_eq!(counts.iter().sum::<u32>(), 30);
    }

    let summary = out.summary(input.len());
    assert_eq!(summary.input_points, 1800);
    assert_eq!(summary.histogram_bins, 80);
}
