//! Reconstructs a surface from an oriented point cloud and writes it as a Wavefront OBJ file.
//!
//! ```text
//! cargo run --release --example reconstruct -- <input> <output.obj> [stride] [resolution]
//! ```
//!
//! `<input>` is a `.ply` file with vertex normals, or an XYZ file. Solved weights are cached next
//! to the output file, one file per stride.

use nalgebra::{Point3, Vector3};
use ply_rs::{parser, ply};
use rbf_reconstruction::{
    Isosurface, MarchingCubes, OrientedPointCloud, RbfConfig, RbfSurface, Real, SurfaceMesh,
    WeightCache,
};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Default)]
struct VertexWithNormal {
    pos: Point3<Real>,
    normal: Vector3<Real>,
}

impl ply::PropertyAccess for VertexWithNormal {
    fn new() -> Self {
        Self::default()
    }

    fn set_property(&mut self, key: String, property: ply::Property) {
        let value = match property {
            ply::Property::Float(v) => v as Real,
            ply::Property::Double(v) => v,
            _ => return,
        };

        match key.as_ref() {
            "x" => self.pos.x = value,
            "y" => self.pos.y = value,
            "z" => self.pos.z = value,
            "nx" => self.normal.x = value,
            "ny" => self.normal.y = value,
            "nz" => self.normal.z = value,
            _ => {}
        }
    }
}

fn read_ply(path: &Path) -> Result<OrientedPointCloud, Box<dyn Error>> {
    let mut f = BufReader::new(File::open(path)?);
    let vertex_parser = parser::Parser::<VertexWithNormal>::new();
    let header = vertex_parser.read_header(&mut f)?;

    let mut vertices = Vec::new();
    for (_name, element) in &header.elements {
        // Elements are stored in sequence: every payload must be consumed in order.
        let payload = vertex_parser.read_payload_for_element(&mut f, element, &header)?;

        if element.name == "vertex" {
            vertices = payload;
        }
    }

    let points: Vec<_> = vertices.iter().map(|v| v.pos).collect();
    let normals: Vec<_> = vertices.iter().map(|v| v.normal).collect();
    Ok(OrientedPointCloud::from_points_and_normals(&points, &normals)?)
}

fn write_obj(path: &Path, mesh: &SurfaceMesh) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    for v in mesh.vertices().iter() {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }

    for n in mesh.normals().iter() {
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }

    for i in 0..mesh.num_triangles() {
        let [a, b, c] = [3 * i + 1, 3 * i + 2, 3 * i + 3];
        writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}")?;
    }

    out.flush()
}

fn parse_arg<T: std::str::FromStr>(arg: Option<String>, default: T) -> Result<T, Box<dyn Error>> {
    match arg {
        Some(arg) => arg
            .parse()
            .map_err(|_| format!("invalid numeric argument {arg:?}").into()),
        None => Ok(default),
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        return Err(
            "usage: reconstruct <input.ply|input.xyz> <output.obj> [stride] [resolution]".into(),
        );
    };
    let input = PathBuf::from(input);
    let output = PathBuf::from(output);

    let config = RbfConfig {
        stride: parse_arg(args.next(), 1)?,
        ..Default::default()
    };
    let resolution = parse_arg(args.next(), 60)?;

    let mut cloud = match input.extension().and_then(|e| e.to_str()) {
        Some("ply") => read_ply(&input)?,
        _ => rbf_reconstruction::io::read_xyz(&input)?,
    };
    cloud.normalize();

    let cache_dir = output.parent().map(Path::to_path_buf).unwrap_or_default();
    let surface = RbfSurface::from_cloud_cached(&cloud, &config, &WeightCache::new(cache_dir))?;

    let marching_cubes = MarchingCubes {
        resolution: [resolution; 3],
        ..Default::default()
    };

    match surface.reconstruct_mesh(&marching_cubes)? {
        Isosurface::Empty => log::warn!("The reconstructed surface does not cross the grid."),
        Isosurface::Mesh(mesh) => {
            write_obj(&output, &mesh)?;
            log::info!(
                "Wrote {} triangles to {}.",
                mesh.num_triangles(),
                output.display()
            );
        }
    }

    Ok(())
}
