use std::path::Path;
use std::process::ExitCode;

use gltf_scene::resource_manager::device::HeadlessDevice;
use gltf_scene::{FsFetcher, LoaderConfig, Viewer};

/// Loads an asset into a headless viewer and prints what it decoded.
/// Usage: gltf-scene <file.gltf|file.glb> [config.json]
fn main() -> ExitCode {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: gltf-scene <file.gltf|file.glb> [config.json]");
        return ExitCode::FAILURE;
    };

    let config = match args.next() {
        Some(config_path) => match std::fs::read_to_string(&config_path)
            .map_err(|e| e.to_string())
            .and_then(|json| LoaderConfig::from_json_str(&json).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(e) => {
                eprintln!("bad config {}: {}", config_path, e);
                return ExitCode::FAILURE;
            }
        },
        None => LoaderConfig::default(),
    };

    let path = Path::new(&path);
    let root = path.parent().unwrap_or(Path::new(""));
    let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
        eprintln!("not a file: {}", path.display());
        return ExitCode::FAILURE;
    };

    let mut viewer = Viewer::new(HeadlessDevice::new(), config);
    if let Err(e) = viewer.load_blocking(&FsFetcher::new(root), file_name) {
        eprintln!("failed to load {}: {}", path.display(), e);
        return ExitCode::FAILURE;
    }
    let Some(current) = viewer.current() else { return ExitCode::FAILURE };

    let asset = &current.asset;
    println!("scene: {}", current.scene.name.as_deref().unwrap_or("<unnamed>"));
    println!("nodes: {} instantiated of {}", current.scene.nodes.len(), asset.nodes.len());
    for (i, mesh) in asset.meshes.iter().enumerate() {
        let instances = current.scene.mesh_instances.get(&i).map_or(0, |m| m.instances.len());
        println!(
            "mesh {} {:?}: {} primitives, {} instances",
            i,
            mesh.name.as_deref().unwrap_or(""),
            mesh.primitives.len(),
            instances
        );
    }
    println!("materials: {}, images: {}", asset.materials.len(), asset.images.len());
    for clip in &asset.animations {
        println!("clip {:?}: {:.3}s, {} tracks", clip.name.as_deref().unwrap_or(""), clip.duration, clip.tracks.len());
    }
    if let Some(aabb) = viewer.aabb() {
        println!("bounds: {:?} .. {:?}, radius {:.3}", aabb.min, aabb.max, aabb.radius());
    }
    println!("device objects: {:?}", viewer.device.live_counts());
    ExitCode::SUCCESS
}
