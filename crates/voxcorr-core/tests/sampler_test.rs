use proptest::prelude::*;
use voxcorr_core::interpolation::{InterpolationOrder, SamplerBackend};
use voxcorr_core::{apply_phi, Phi, Volume};

fn texture(shape: [usize; 3]) -> Volume {
    Volume::from_fn(shape, |z, y, x| {
        let (z, y, x) = (z as f32, y as f32, x as f32);
        (0.45 * x).sin() * (0.31 * y).cos() + 0.5 * (0.27 * z + 0.2 * x).sin() + 2.0
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_backends_agree(
        tz in -1.5f64..1.5, ty in -1.5f64..1.5, tx in -1.5f64..1.5,
        rx in -0.1f64..0.1, k in 0.95f64..1.05,
        cubic in proptest::bool::ANY
    ) {
        let volume = texture([7, 9, 11]);
        let phi = Phi::from_components([tz, ty, tx], [0.0, 0.0, rx], [k, 1.0, 1.0], [0.0; 3]);
        let order = if cubic { InterpolationOrder::Cubic } else { InterpolationOrder::Linear };
        let scalar = apply_phi(&volume, &phi, order, SamplerBackend::Scalar).unwrap();
        let tensor = apply_phi(&volume, &phi, order, SamplerBackend::Tensor).unwrap();
        prop_assert_eq!(scalar.shape(), tensor.shape());
        let mut compared = 0;
        for (a, b) in scalar.data().iter().zip(tensor.data()) {
            if a.is_finite() && b.is_finite() {
                prop_assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
                compared += 1;
            }
        }
        prop_assert!(compared > 0);
    }
}

#[test]
fn test_identity_is_exact_for_every_order() {
    let volume = texture([4, 6, 8]);
    for order in [
        InterpolationOrder::Nearest,
        InterpolationOrder::Linear,
        InterpolationOrder::Cubic,
    ] {
        let out = apply_phi(&volume, &Phi::identity(), order, SamplerBackend::Scalar).unwrap();
        for (a, b) in out.data().iter().zip(volume.data()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn test_nearest_integer_shift_matches_on_both_backends() {
    let volume = texture([1, 10, 12]);
    let phi = Phi::from_translation([0.0, 2.0, -3.0]);
    for backend in [SamplerBackend::Scalar, SamplerBackend::Tensor] {
        let out = apply_phi(&volume, &phi, InterpolationOrder::Nearest, backend).unwrap();
        assert!((out.get(0, 5, 4) - volume.get(0, 3, 7)).abs() < 1e-6);
        assert!(out.get(0, 1, 4).is_nan());
        assert!(out.get(0, 5, 10).is_nan());
    }
}

#[test]
fn test_planar_volume_stays_planar() {
    let volume = texture([1, 16, 16]);
    let phi = Phi::from_components([0.0, 0.4, -0.7], [0.05, 0.0, 0.0], [1.0; 3], [0.0; 3]);
    let out = apply_phi(&volume, &phi, InterpolationOrder::Cubic, SamplerBackend::Scalar).unwrap();
    assert_eq!(out.shape(), [1, 16, 16]);
    assert!(out.get(0, 8, 8).is_finite());
}

#[test]
fn test_apply_phi_then_inverse_restores_interior() {
    let volume = texture([12, 12, 12]);
    let phi = Phi::from_translation([0.5, -0.25, 0.75]);
    let order = InterpolationOrder::Cubic;
    let there = apply_phi(&volume, &phi, order, SamplerBackend::Scalar).unwrap();
    let inverse = phi.try_inverse().unwrap();
    let back = apply_phi(&there, &inverse, order, SamplerBackend::Scalar).unwrap();
    let v = back.get(6, 6, 6);
    assert!((v - volume.get(6, 6, 6)).abs() < 0.05, "{}", v);
}
