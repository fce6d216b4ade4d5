//! Integration tests: save and reload sampling files and binary snapshots.

use std::fs;

use sphere_sampling::{
    EulerAngles, ExperimentalOrientation, SamplingConfig, SamplingError, SphereSampling, Stage,
};

fn config(track_psi: bool) -> SamplingConfig {
    SamplingConfig {
        spacing_deg: 10.0,
        symmetry: "c3".into(),
        hemisphere_only: true,
        neighborhood_radius_deg: Some(18.0),
        track_psi,
        ..Default::default()
    }
}

#[test]
fn test_sampling_file_roundtrip() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let dir = tempfile::tempdir().unwrap();

    for track_psi in [false, true] {
        let path = dir.path().join(format!("sampling_{track_psi}.txt"));
        let original = SphereSampling::build(config(track_psi)).unwrap();
        original.save_sampling_file(&path).unwrap();

        let mut loaded = SphereSampling::new(config(track_psi));
        loaded.read_sampling_file(&path).unwrap();
        assert_eq!(loaded.stage(), Stage::Linked);

        let a = original.reduced().unwrap();
        let b = loaded.reduced().unwrap();
        assert_eq!(a.len(), b.len());
        for i in 0..a.len() {
            assert_eq!(a.point(i).vector, b.point(i).vector);
            assert!((a.point(i).angles.direction() - b.point(i).angles.direction()).norm() < 1e-9);
        }

        let na = original.neighbors().unwrap();
        let nb = loaded.neighbors().unwrap();
        assert_eq!(na.len(), nb.len());
        assert_eq!(nb.track_psi, track_psi);
        for (la, lb) in na.lists.iter().zip(&nb.lists) {
            assert_eq!(la.len(), lb.len());
            for (x, y) in la.iter().zip(lb) {
                assert_eq!(x.index, y.index);
                assert_eq!(x.dot, y.dot);
                assert!((x.psi - y.psi).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn test_loaded_file_supports_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sampling.txt");
    let original = SphereSampling::build(config(false)).unwrap();
    original.save_sampling_file(&path).unwrap();

    let mut loaded = SphereSampling::new(config(false));
    assert!(loaded.repository().is_none());
    loaded.read_sampling_file(&path).unwrap();
    assert_eq!(loaded.repository().unwrap().len(), 3);

    let pole = ExperimentalOrientation::new(1, EulerAngles::from_degrees(0.0, 0.0, 0.0));
    let image = ExperimentalOrientation::new(2, EulerAngles::from_degrees(40.0, 55.0, 10.0));
    let expected = original.find_closest_sampling_point(&[pole.clone(), image.clone()]).unwrap();
    let result = loaded.find_closest_sampling_point(&[pole, image]).unwrap();
    assert_eq!(result.assignments[0].grid_index, 0);
    for (a, b) in result.assignments.iter().zip(&expected.assignments) {
        assert_eq!(a.grid_index, b.grid_index);
        assert_eq!(a.operator, b.operator);
    }
}

#[test]
fn test_mismatched_psi_flag_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sampling.txt");
    SphereSampling::build(config(true))
        .unwrap()
        .save_sampling_file(&path)
        .unwrap();

    let mut loaded = SphereSampling::new(config(false));
    let err = loaded.read_sampling_file(&path).unwrap_err();
    let cause = err.downcast_ref::<SamplingError>().unwrap();
    assert!(matches!(cause, SamplingError::Parse { .. }), "{err:#}");
    assert!(format!("{err:#}").contains("sampling.txt"));
}

#[test]
fn test_save_requires_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sampling.txt");
    let sampling = SphereSampling::build(SamplingConfig {
        neighborhood_radius_deg: None,
        ..config(false)
    })
    .unwrap();
    assert_eq!(sampling.stage(), Stage::Reduced);
    let err = sampling.save_sampling_file(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SamplingError>(),
        Some(SamplingError::InconsistentState(_))
    ));
    assert!(!path.exists());
}

#[test]
fn test_asym_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("asym_unit.txt");
    let sampling = SphereSampling::build(config(false)).unwrap();
    sampling.save_asym_unit(&path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), sampling.reduced().unwrap().len());
    for line in text.lines() {
        assert_eq!(line.split_whitespace().count(), 6);
    }
}

#[test]
fn test_snapshot_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sampling.rkyv");
    let original = SphereSampling::build(SamplingConfig {
        symmetry: "d2".into(),
        exhaustive: true,
        ..config(true)
    })
    .unwrap();
    original.save_to_file(&path).unwrap();

    let loaded = SphereSampling::load_from_file(&path).unwrap();
    assert_eq!(loaded.config(), original.config());
    assert_eq!(loaded.stage(), Stage::Linked);
    assert_eq!(loaded.grid(), original.grid());
    assert_eq!(loaded.reduced(), original.reduced());
    assert_eq!(loaded.neighbors(), original.neighbors());
    assert_eq!(loaded.repository().unwrap().len(), 4);
}

#[test]
fn test_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does_not_exist.rkyv");
    let err = SphereSampling::load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.rkyv"));
}
