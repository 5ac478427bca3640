use proptest::prelude::*;
use voxcorr_core::Phi;

fn close(a: [f64; 3], b: [f64; 3], tol: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

proptest! {
    #[test]
    fn test_decompose_roundtrip(
        tz in -20.0f64..20.0, ty in -20.0f64..20.0, tx in -20.0f64..20.0,
        rz in -0.5f64..0.5, ry in -0.5f64..0.5, rx in -0.5f64..0.5,
        kz in 0.7f64..1.4, ky in 0.7f64..1.4, kx in 0.7f64..1.4,
        szy in -0.1f64..0.1, szx in -0.1f64..0.1, syx in -0.1f64..0.1
    ) {
        let phi = Phi::from_components([tz, ty, tx], [rz, ry, rx], [kz, ky, kx], [szy, szx, syx]);
        let c = phi.decompose();
        prop_assert!(close(c.translation, [tz, ty, tx], 1e-12));
        prop_assert!(close(c.rotation, [rz, ry, rx], 1e-6));
        prop_assert!(close(c.zoom, [kz, ky, kx], 1e-6));
        prop_assert!(close(c.shear, [szy, szx, syx], 1e-6));
        prop_assert!((c.volume_ratio - c.stretch.determinant()).abs() < 1e-12);

        let rebuilt = Phi::from_components(c.translation, c.rotation, c.zoom, c.shear);
        prop_assert!((rebuilt.matrix() - phi.matrix()).norm() < 1e-6);
    }

    #[test]
    fn test_rigid_part_is_rotation(
        rz in -0.5f64..0.5, ry in -0.5f64..0.5, rx in -0.5f64..0.5,
        kz in 0.8f64..1.2, ky in 0.8f64..1.2, kx in 0.8f64..1.2
    ) {
        let phi = Phi::from_components([1.0, 2.0, 3.0], [rz, ry, rx], [kz, ky, kx], [0.0; 3]);
        let rigid = phi.rigid_part().decompose();
        prop_assert!((rigid.volume_ratio - 1.0).abs() < 1e-9);
        prop_assert!(close(rigid.rotation, [rz, ry, rx], 1e-6));
        prop_assert!(close(rigid.zoom, [1.0; 3], 1e-9));
    }

    #[test]
    fn test_transform_point_inverse(
        tz in -5.0f64..5.0, ty in -5.0f64..5.0, tx in -5.0f64..5.0,
        rx in -0.3f64..0.3, k in 0.8f64..1.2,
        pz in 0.0f64..40.0, py in 0.0f64..40.0, px in 0.0f64..40.0
    ) {
        let phi = Phi::from_components([tz, ty, tx], [0.0, 0.0, rx], [k, k, k], [0.0; 3]);
        let centre = [10.0, 12.5, 9.0];
        let mapped = phi.transform_point([pz, py, px], centre);
        let back = phi.try_inverse().unwrap().transform_point(mapped, centre);
        prop_assert!(close(back, [pz, py, px], 1e-9));
    }
}

#[test]
fn test_scale_translation_keeps_linear_part() {
    let phi = Phi::from_components([1.0, -2.0, 0.5], [0.0, 0.1, 0.0], [1.1, 1.0, 0.9], [0.0; 3]);
    let scaled = phi.scale_translation(2.0);
    assert_eq!(scaled.translation(), [2.0, -4.0, 1.0]);
    assert_eq!(scaled.linear(), phi.linear());
}
