use nalgebra::{Point3, Vector3};
use rbf_reconstruction::{
    ImplicitField, Isosurface, MarchingCubes, OrientedPointCloud, RbfConfig, RbfSurface, Real,
    WeightCache,
};

const RADIUS: Real = 0.8;

fn sphere_cloud(n: usize) -> OrientedPointCloud {
    let golden_angle = std::f64::consts::PI * (3.0 - Real::sqrt(5.0));
    let normals: Vec<_> = (0..n)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as Real + 0.5) / n as Real;
            let r = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as Real;
            Vector3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect();
    let points: Vec<_> = normals.iter().map(|n| Point3::from(*n * RADIUS)).collect();
    OrientedPointCloud::from_points_and_normals(&points, &normals).unwrap()
}

#[test]
fn sphere_is_reconstructed() {
    let cloud = sphere_cloud(200);
    let surface = RbfSurface::from_cloud(&cloud, &RbfConfig::default()).unwrap();

    assert!(surface.eval(&Point3::origin()) < 0.0);
    assert!(surface.eval(&Point3::new(1.1, 0.0, 0.0)) > 0.0);

    let marching_cubes = MarchingCubes {
        resolution: [24, 24, 24],
        ..Default::default()
    };
    let mesh = match surface.reconstruct_mesh(&marching_cubes).unwrap() {
        Isosurface::Mesh(mesh) => mesh,
        Isosurface::Empty => panic!("the sphere should produce triangles"),
    };

    assert!(mesh.num_triangles() > 100);
    assert_eq!(mesh.vertices().len(), mesh.normals().len());

    for (v, n) in mesh.vertices().iter().zip(mesh.normals().iter()) {
        assert!((v.coords.norm() - RADIUS).abs() < 0.1, "vertex {v} off the sphere");
        assert!(n.coords.dot(&v.coords.normalize()) > 0.5, "normal {n} not outward");
    }

    assert_eq!(mesh.vertex_buffer().len(), mesh.vertices().len() * 3);
}

#[test]
fn fitted_box_contains_the_whole_surface() {
    let cloud = sphere_cloud(100);
    let config = RbfConfig {
        stride: 2,
        ..Default::default()
    };
    let surface = RbfSurface::from_cloud(&cloud, &config).unwrap();
    let marching_cubes = MarchingCubes::fitted(&cloud, config.epsilon, [16, 16, 16]).unwrap();

    let mesh = surface
        .reconstruct_mesh(&marching_cubes)
        .unwrap()
        .into_mesh()
        .unwrap();
    assert!(mesh.num_triangles() > 0);
}

#[test]
fn cached_weights_match_a_direct_solve() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let cache = WeightCache::new(dir.path());
    let cloud = sphere_cloud(60);
    let config = RbfConfig {
        stride: 2,
        ..Default::default()
    };

    let direct = RbfSurface::from_cloud(&cloud, &config).unwrap();
    let first = RbfSurface::from_cloud_cached(&cloud, &config, &cache).unwrap();
    assert!(cache.path_for_stride(2).exists());
    let second = RbfSurface::from_cloud_cached(&cloud, &config, &cache).unwrap();

    assert_eq!(first, direct);
    assert_eq!(second, direct);

    // A cache for another stride does not match this constraint set.
    std::fs::copy(cache.path_for_stride(2), cache.path_for_stride(1)).unwrap();
    let full = RbfSurface::from_cloud_cached(&cloud, &RbfConfig::default(), &cache).unwrap();
    assert_eq!(full.weights().len(), 3 * 60 + 4);
    assert_eq!(full, RbfSurface::from_cloud(&cloud, &RbfConfig::default()).unwrap());
}
