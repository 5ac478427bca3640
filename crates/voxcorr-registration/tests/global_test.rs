use std::sync::Arc;

use voxcorr_core::interpolation::InterpolationOrder;
use voxcorr_core::Volume;
use voxcorr_registration::global::{box_mesh, label_tetrahedra};
use voxcorr_registration::{
    global_correlation, GlobalCorrelation, GlobalCorrelationConfig, HistoryObserver,
    IterationObserver, ReturnStatus,
};

const SIZE: usize = 24;

fn field(z: f64, y: f64, x: f64) -> f32 {
    (3.0 + (0.42 * x + 0.15 * z).sin() * (0.37 * y).cos()
        + 0.6 * (0.33 * z - 0.2 * y).sin()
        + 0.4 * (0.29 * x + 0.31 * y + 0.25 * z).cos()) as f32
}

/// Pair with `im1(X) = im2(X + shift)`.
fn pair(shift: [f64; 3]) -> (Volume, Volume) {
    let shape = [SIZE; 3];
    let im1 = Volume::from_fn(shape, |z, y, x| field(z as f64, y as f64, x as f64));
    let im2 = Volume::from_fn(shape, |z, y, x| {
        field(z as f64 - shift[0], y as f64 - shift[1], x as f64 - shift[2])
    });
    (im1, im2)
}

#[test]
fn test_uniform_translation_is_recovered_at_every_node() {
    let shift = [0.6, -0.4, 0.3];
    let (im1, im2) = pair(shift);
    let mesh = box_mesh([4.0, 4.0, 4.0], [15.0, 15.0, 15.0]).unwrap();
    let config = GlobalCorrelationConfig::new()
        .with_max_iterations(40)
        .with_tolerance(1e-4);

    let result = global_correlation(&im1, &im2, &mesh, &config).unwrap();

    assert_eq!(result.status, ReturnStatus::Converged);
    assert_eq!(result.displacements.len(), 8);
    for u in &result.displacements {
        for axis in 0..3 {
            assert!(
                (u[axis] - shift[axis]).abs() < 0.1,
                "node displacement {:?}, expected {:?}",
                u,
                shift
            );
        }
    }
    assert!(result.error < 1e-3);
}

#[test]
fn test_prescribed_displacement_is_exact() {
    let shift = [0.5, 0.2, -0.3];
    let (im1, im2) = pair(shift);
    let mesh = box_mesh([4.0, 4.0, 4.0], [15.0, 15.0, 15.0]).unwrap();
    let config = GlobalCorrelationConfig::new()
        .with_max_iterations(40)
        .with_dirichlet(0, 2, 0.25)
        .with_dirichlet(7, 0, -0.1);

    let result = global_correlation(&im1, &im2, &mesh, &config).unwrap();

    assert_ne!(result.status, ReturnStatus::SingularMatrix);
    assert_eq!(result.displacements[0][2], 0.25);
    assert_eq!(result.displacements[7][0], -0.1);
}

#[test]
fn test_initial_displacements_and_labels_are_used() {
    let shift = [0.6, -0.4, 0.3];
    let (im1, im2) = pair(shift);
    let mesh = box_mesh([4.0, 4.0, 4.0], [15.0, 15.0, 15.0]).unwrap();
    let labels = label_tetrahedra(im1.shape(), &mesh);
    let history = Arc::new(HistoryObserver::new());

    let result = GlobalCorrelation::new(
        GlobalCorrelationConfig::new()
            .with_max_iterations(40)
            .with_tolerance(1e-4),
    )
    .with_initial_displacements(vec![shift; 8])
    .with_observer(history.clone() as Arc<dyn IterationObserver>)
    .correlate(&im1, &im2, &mesh, Some(&labels))
    .unwrap();

    assert_eq!(result.status, ReturnStatus::Converged);
    assert_eq!(history.history().len(), result.iterations);
    assert!(result.iterations < 10);
    for u in &result.displacements {
        for axis in 0..3 {
            assert!((u[axis] - shift[axis]).abs() < 0.1);
        }
    }
}

#[test]
fn test_cubic_warp_matches_linear_answer() {
    let shift = [0.3, 0.3, -0.5];
    let (im1, im2) = pair(shift);
    let mesh = box_mesh([4.0, 4.0, 4.0], [15.0, 15.0, 15.0]).unwrap();
    let mut config = GlobalCorrelationConfig::new().with_max_iterations(40);
    config.interpolation = InterpolationOrder::Cubic;

    let result = global_correlation(&im1, &im2, &mesh, &config).unwrap();

    assert_eq!(result.status, ReturnStatus::Converged);
    for u in &result.displacements {
        for axis in 0..3 {
            assert!((u[axis] - shift[axis]).abs() < 0.1);
        }
    }
}
