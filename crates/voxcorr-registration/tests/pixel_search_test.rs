use voxcorr_core::{Mask, Region, Volume};
use voxcorr_registration::{pixel_search, PixelSearchConfig};

fn noise(shape: [usize; 3], seed: u64) -> Volume {
    Volume::from_fn(shape, |z, y, x| {
        let mut h = (z as u64) << 40 ^ (y as u64) << 20 ^ x as u64 ^ seed;
        h = h.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        h ^= h >> 29;
        h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        h ^= h >> 32;
        1.0 + (h % 10_000) as f32 / 10_000.0
    })
}

#[test]
fn test_exhaustive_search_finds_patch() {
    let candidate = noise([20, 20, 20], 11);
    let reference = candidate
        .crop(&Region::new([5, 3, 7], [8, 8, 8]))
        .unwrap();

    let result =
        pixel_search(&reference, &candidate, &PixelSearchConfig::exhaustive(), None).unwrap();

    assert_eq!(result.displacement, [5.0, 3.0, 7.0]);
    assert!(result.score > 0.99);
}

#[test]
fn test_restricted_range_returns_best_inside_it() {
    let candidate = noise([16, 16, 16], 3);
    let reference = candidate
        .crop(&Region::new([6, 6, 6], [6, 6, 6]))
        .unwrap();
    let config = PixelSearchConfig::new([[0, 4], [0, 4], [0, 4]]);

    let result = pixel_search(&reference, &candidate, &config, None).unwrap();

    assert!(result.is_found());
    assert!(result.displacement.iter().all(|&d| (0.0..=4.0).contains(&d)));
    assert!(result.score < 0.999);
}

#[test]
fn test_nan_and_masked_voxels_are_ignored() {
    let candidate = noise([12, 14, 14], 5);
    let mut reference = candidate
        .crop(&Region::new([2, 4, 1], [6, 6, 6]))
        .unwrap();
    reference.set(0, 0, 0, f32::NAN);
    for y in 0..6 {
        reference.set(3, y, 2, 1000.0);
    }
    let mask = Mask::from_fn([6, 6, 6], |z, _, x| !(z == 3 && x == 2));

    let result = pixel_search(
        &reference,
        &candidate,
        &PixelSearchConfig::exhaustive(),
        Some(&mask),
    )
    .unwrap();

    assert_eq!(result.displacement, [2.0, 4.0, 1.0]);
    assert!((result.score - 1.0).abs() < 1e-9);
}

#[test]
fn test_smaller_candidate_reports_sentinel() {
    let result = pixel_search(
        &noise([8, 8, 8], 1),
        &noise([8, 8, 7], 1),
        &PixelSearchConfig::exhaustive(),
        None,
    )
    .unwrap();
    assert!(result.displacement.iter().all(|d| d.is_nan()));
    assert_eq!(result.score, 0.0);
}
