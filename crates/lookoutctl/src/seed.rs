//! Feed directory seeding.
//!
//! Feed images are named `lat_lon_type.ext`, e.g.
//! `33.880244_-84.271938_accident.jpg`. The stem doubles as the
//! classification hint.

use anyhow::{Context, Result};
use lookout_shared::GeoPoint;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// One image ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedImage {
    pub path: PathBuf,
    pub location: GeoPoint,
    pub hint: String,
}

/// Location from a `lat_lon[_anything]` stem.
pub fn parse_feed_stem(stem: &str) -> Option<GeoPoint> {
    let mut parts = stem.split('_');
    let lat: f64 = parts.next()?.parse().ok()?;
    let lon: f64 = parts.next()?.parse().ok()?;
    let point = GeoPoint::new(lat, lon);
    point.is_valid().then_some(point)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Images in `dir`, sorted by name, plus the files skipped for an
/// unparseable stem.
pub fn scan_feed_dir(dir: &Path) -> Result<(Vec<FeedImage>, Vec<PathBuf>)> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read feed directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();

    let mut images = Vec::new();
    let mut skipped = Vec::new();
    for path in paths {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        match parse_feed_stem(&stem) {
            Some(location) => images.push(FeedImage {
                path,
                location,
                hint: stem,
            }),
            None => skipped.push(path),
        }
    }
    Ok((images, skipped))
}
