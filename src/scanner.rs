//! Directory ingestion: walks a tree, filters by extension/size/hidden
//! rules, skips already-indexed paths, and drives datetime extraction and
//! template-based auto-tagging.
//!
//! Walkdir traversal with a per-file progress callback and
//! continue-past-errors follows a standard indexer shape; the filter order
//! (hidden/ignore-pattern/size/extension) and skip-by-relpath idempotence
//! rule come from a file-scanner reference implementation. EXIF reading
//! builds a tag-name map the same way a metadata reader would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::config::CatalogConfig;
use crate::dater::{self, GpsCoordinates};
use crate::error::CatalogResult;
use crate::store::models::NewImage;
use crate::store::Store;
use crate::template::{self, LoadedTemplate};

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico",
];

const TEMPLATE_FILE_CANDIDATES: &[&str] = &["tags.template", "tags.yaml", "tags.yml"];

#[derive(Debug, Default, Clone)]
pub struct ScanReport {
    pub total_found: usize,
    pub added: usize,
    pub skipped: usize,
    pub errors: usize,
    pub error_paths: Vec<PathBuf>,
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn is_ignored(path: &Path, patterns: &[String]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| patterns.iter().any(|p| p == name))
        .unwrap_or(false)
}

/// `relpath` with forward-slash separators, relative to the catalog root.
fn relpath_of(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_exif_map(path: &Path) -> Option<HashMap<String, String>> {
    let exif = rexif::parse_file(&path.to_string_lossy()).ok()?;
    let mut map = HashMap::new();
    for entry in &exif.entries {
        map.insert(format!("{:?}", entry.tag), entry.value_more_readable.to_string());
    }
    Some(map)
}

fn gps_component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\d+(?:\.\d+)?)\s*deg\s*(\d+(?:\.\d+)?)'\s*(\d+(?:\.\d+)?)""#).unwrap()
    })
}

/// Best-effort GPS extraction from rexif's human-readable DMS strings. Any
/// parse failure just leaves the image without GPS data.
fn extract_gps(exif: &HashMap<String, String>) -> Option<GpsCoordinates> {
    let lat_raw = exif.get("GPSLatitude")?;
    let lon_raw = exif.get("GPSLongitude")?;
    let lat_ref = exif.get("GPSLatitudeRef").map(|s| s.trim()).unwrap_or("N");
    let lon_ref = exif.get("GPSLongitudeRef").map(|s| s.trim()).unwrap_or("E");

    let lat_caps = gps_component_regex().captures(lat_raw)?;
    let lon_caps = gps_component_regex().captures(lon_raw)?;

    let lat = dater::convert_gps_coordinate(
        lat_caps[1].parse().ok()?,
        lat_caps[2].parse().ok()?,
        lat_caps[3].parse().ok()?,
        lat_ref,
    )?;
    let lon = dater::convert_gps_coordinate(
        lon_caps[1].parse().ok()?,
        lon_caps[2].parse().ok()?,
        lon_caps[3].parse().ok()?,
        lon_ref,
    )?;

    Some(GpsCoordinates {
        latitude: lat,
        longitude: lon,
    })
}

/// Looks beside `directory` for a known template file name, per §4.4's
/// "auto-tag template discovery". Dispatches on the candidate's extension so
/// both the plain-text and YAML forms are reachable; a candidate that fails
/// to parse is skipped in favor of the next one rather than aborting the scan.
fn discover_templates(directory: &Path) -> Vec<LoadedTemplate> {
    for name in TEMPLATE_FILE_CANDIDATES {
        let candidate = directory.join(name);
        if let Ok(contents) = std::fs::read_to_string(&candidate) {
            match template::load_template_path(&candidate, &contents) {
                Ok(loaded) => return loaded,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "failed to parse template file");
                }
            }
        }
    }
    Vec::new()
}

/// Scans `directory`, inserting every new, supported, undersized, unhidden
/// image file it finds. `templates` overrides auto-discovery; pass `None` to
/// look beside `directory` for a known template file.
pub async fn scan(
    store: &Store,
    directory: &Path,
    templates: Option<Vec<LoadedTemplate>>,
    recursive: bool,
    config: &CatalogConfig,
    mut on_progress: impl FnMut(usize, usize, &str),
) -> CatalogResult<ScanReport> {
    let templates = templates.unwrap_or_else(|| discover_templates(directory));

    let mut walker = WalkDir::new(directory);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut candidates: Vec<(PathBuf, u64)> = Vec::new();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if config.skip_hidden && is_hidden(path, directory) {
            continue;
        }
        if is_ignored(path, &config.ignore_patterns) {
            continue;
        }
        if !has_supported_extension(path) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > config.max_file_size_mb * 1024 * 1024 {
            continue;
        }
        candidates.push((path.to_path_buf(), meta.len()));
    }

    let total = candidates.len();
    let mut report = ScanReport {
        total_found: total,
        ..Default::default()
    };

    for (idx, (path, file_size)) in candidates.iter().enumerate() {
        on_progress(idx + 1, total, &path.to_string_lossy());

        let relpath = relpath_of(store.root(), path);
        if store.get_by_path(&relpath).await?.is_some() {
            report.skipped += 1;
            continue;
        }

        let decoded = image::open(path);
        let (width, height) = match &decoded {
            Ok(img) => {
                use image::GenericImageView;
                let (w, h) = img.dimensions();
                (Some(w as i64), Some(h as i64))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "decode error during scan");
                report.errors += 1;
                report.error_paths.push(path.clone());
                // Skeleton record: the row still gets indexed, just with
                // unknown dimensions recorded as zero rather than left unset.
                (Some(0), Some(0))
            }
        };

        let exif = read_exif_map(path);
        let parsed_dt = dater::parse_datetime(path, exif.as_ref());
        let gps = exif.as_ref().and_then(extract_gps);

        let new_image = NewImage {
            filepath: relpath.clone(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size: *file_size as i64,
            width,
            height,
            datetime: parsed_dt.as_ref().and_then(|d| d.to_iso_string()),
            year: parsed_dt.as_ref().and_then(|d| d.year).map(i64::from),
            month: parsed_dt.as_ref().and_then(|d| d.month).map(i64::from),
            day: parsed_dt.as_ref().and_then(|d| d.day).map(i64::from),
            hour: parsed_dt.as_ref().and_then(|d| d.hour).map(i64::from),
            minute: parsed_dt.as_ref().and_then(|d| d.minute).map(i64::from),
            second: parsed_dt.as_ref().and_then(|d| d.second).map(i64::from),
            latitude: gps.as_ref().map(|g| g.latitude.to_string()),
            longitude: gps.as_ref().map(|g| g.longitude.to_string()),
            has_lat_lon: gps.is_some(),
            city: None,
            town: None,
            state: None,
        };

        let outcome = store.add_image(&new_image).await?;
        if !outcome.inserted {
            // Lost a race with a concurrent scan of the same tree.
            report.skipped += 1;
            continue;
        }
        report.added += 1;

        if let Some(exif) = exif.as_ref() {
            let camera = dater::camera_info_from_exif(exif);
            for (leaf, value) in [
                ("make", camera.make),
                ("model", camera.model),
                ("exposure_time", camera.exposure_time),
                ("f_number", camera.f_number),
                ("iso", camera.iso),
                ("focal_length", camera.focal_length),
            ] {
                if let Some(value) = value {
                    store
                        .set_tag_by_path(outcome.id, &format!("camera.{leaf}"), &value, "string")
                        .await?;
                }
            }
        }

        if !templates.is_empty() {
            let captures = template::match_filepath(&relpath, &templates);
            if captures.is_empty() {
                store.mark_auto_tag_error(outcome.id).await?;
            } else {
                for (tag_path, value) in captures {
                    store
                        .set_tag_by_path(outcome.id, &tag_path, &value, "string")
                        .await?;
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relpath_uses_forward_slashes() {
        let root = Path::new("/catalog");
        let path = Path::new("/catalog/2019/a.jpg");
        assert_eq!(relpath_of(root, path), "2019/a.jpg");
    }

    #[test]
    fn hidden_directory_components_are_detected() {
        let root = Path::new("/catalog");
        assert!(is_hidden(Path::new("/catalog/.git/a.jpg"), root));
        assert!(!is_hidden(Path::new("/catalog/2019/a.jpg"), root));
    }

    #[test]
    fn extension_allowlist_is_case_insensitive() {
        assert!(has_supported_extension(Path::new("a.JPG")));
        assert!(has_supported_extension(Path::new("a.webp")));
        assert!(!has_supported_extension(Path::new("a.txt")));
    }

    #[test]
    fn ignore_patterns_match_by_filename() {
        let patterns = vec!["Thumbs.db".to_string()];
        assert!(is_ignored(Path::new("/x/Thumbs.db"), &patterns));
        assert!(!is_ignored(Path::new("/x/a.jpg"), &patterns));
    }

    #[test]
    fn discover_templates_dispatches_yaml_by_extension() {
        let dir = std::env::temp_dir().join(format!("photocat_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let yaml_path = dir.join("tags.yaml");
        std::fs::write(
            &yaml_path,
            "version: 1\npattern: \"{person}.*\"\ntags:\n  person: \"{person}\"\n",
        )
        .unwrap();

        let loaded = discover_templates(&dir);
        assert_eq!(loaded.len(), 1);
        assert!(matches!(loaded[0], LoadedTemplate::Yaml(_)));
        let captures = loaded[0].match_path("Alice.jpg").unwrap();
        assert_eq!(captures.get("person"), Some(&"Alice".to_string()));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn scanning_nonexistent_directory_yields_an_empty_report() {
        let store = Store::create_in_memory_for_test().await;
        let config = CatalogConfig::default();
        let report = scan(
            &store,
            Path::new("/nonexistent/does/not/exist"),
            Some(Vec::new()),
            true,
            &config,
            |_, _, _| {},
        )
        .await
        .unwrap();
        assert_eq!(report.total_found, 0);
        assert_eq!(report.added, 0);
    }
}
