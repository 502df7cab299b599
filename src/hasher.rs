//! Perceptual hashing: pHash and dHash at four rotations plus a mirror
//! channel, computed from one EXIF-oriented decode.
//!
//! The background-worker shape (bounded channel, single writer draining
//! updates) mirrors a producer/consumer indexing pipeline: N blocking
//! workers pull jobs off a shared receiver, a single writer commits results
//! through its own store handle and reports progress via `tracing`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, GenericImageView};
use tokio::sync::mpsc;

use crate::config::CatalogConfig;
use crate::error::CatalogResult;
use crate::store::Store;

/// The ten fingerprints computed for one image, each a 16-character
/// lowercase hex string (§3, §6).
#[derive(Debug, Clone)]
pub struct ComputedHashes {
    pub phash_0: String,
    pub phash_90: String,
    pub phash_180: String,
    pub phash_270: String,
    pub dhash_0: String,
    pub dhash_90: String,
    pub dhash_180: String,
    pub dhash_270: String,
    pub phash_hmirror: String,
    pub dhash_hmirror: String,
}

fn hex16(value: u64) -> String {
    format!("{value:016x}")
}

/// Decodes a hash string back to its 64-bit integer form. Comparison always
/// happens on these integers, never on the string representation (§9).
pub fn decode_hash(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex, 16).ok()
}

/// Hamming distance between two hash strings, computed via popcount of XOR
/// on the decoded 64-bit integers.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    let a = decode_hash(a)?;
    let b = decode_hash(b)?;
    Some((a ^ b).count_ones())
}

/// Normalizes an EXIF orientation tag (1-8) into the upright ("rotation 0")
/// view. Unknown or absent orientation is treated as 1 (no change).
fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn to_gray_matrix(img: &DynamicImage, side: u32) -> Vec<f64> {
    let resized = img.resize_exact(side, side, image::imageops::FilterType::Lanczos3);
    let gray = resized.to_luma8();
    gray.pixels().map(|p| p.0[0] as f64).collect()
}

/// 1-D DCT-II with orthonormal scaling.
fn dct_1d(input: &[f64]) -> Vec<f64> {
    let n = input.len();
    let mut output = vec![0.0; n];
    for (k, slot) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &x) in input.iter().enumerate() {
            sum += x * ((std::f64::consts::PI / n as f64) * (i as f64 + 0.5) * k as f64).cos();
        }
        let scale = if k == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        };
        *slot = sum * scale;
    }
    output
}

/// Separable 2-D DCT-II over a `side * side` row-major matrix.
fn dct_2d(matrix: &[f64], side: usize) -> Vec<f64> {
    let mut rows_transformed = vec![0.0; side * side];
    for r in 0..side {
        let row = &matrix[r * side..(r + 1) * side];
        let transformed = dct_1d(row);
        rows_transformed[r * side..(r + 1) * side].copy_from_slice(&transformed);
    }

    let mut result = vec![0.0; side * side];
    for c in 0..side {
        let column: Vec<f64> = (0..side).map(|r| rows_transformed[r * side + c]).collect();
        let transformed = dct_1d(&column);
        for (r, value) in transformed.into_iter().enumerate() {
            result[r * side + c] = value;
        }
    }
    result
}

/// pHash: 32x32 grayscale, 2-D DCT, top-left 8x8 low-frequency block
/// thresholded against the mean of its 63 non-DC coefficients.
fn phash(img: &DynamicImage) -> u64 {
    const N: usize = 32;
    const BLOCK: usize = 8;
    let matrix = to_gray_matrix(img, N as u32);
    let dct = dct_2d(&matrix, N);

    let mut block = [0.0f64; BLOCK * BLOCK];
    for r in 0..BLOCK {
        for c in 0..BLOCK {
            block[r * BLOCK + c] = dct[r * N + c];
        }
    }

    let sum: f64 = block.iter().sum::<f64>() - block[0]; // exclude DC
    let mean = sum / (BLOCK * BLOCK - 1) as f64;

    let mut hash: u64 = 0;
    for (i, &coeff) in block.iter().enumerate() {
        hash <<= 1;
        if coeff > mean {
            hash |= 1;
        }
    }
    hash
}

/// dHash: 9x8 grayscale, each pixel compared to its right neighbor across
/// each of 8 rows, yielding 64 gradient bits.
fn dhash(img: &DynamicImage) -> u64 {
    let resized = img.resize_exact(9, 8, image::imageops::FilterType::Lanczos3);
    let gray = resized.to_luma8();
    let mut hash: u64 = 0;
    for y in 0..8 {
        for x in 0..8 {
            let left = gray.get_pixel(x, y).0[0];
            let right = gray.get_pixel(x + 1, y).0[0];
            hash <<= 1;
            if left > right {
                hash |= 1;
            }
        }
    }
    hash
}

/// Computes all ten fingerprints for a decoded image, given its EXIF
/// orientation tag (1-8, or 1 if unknown).
pub fn compute_hashes(img: &DynamicImage, orientation: u16) -> ComputedHashes {
    let upright = apply_orientation(img.clone(), orientation);
    let rot90 = upright.rotate90();
    let rot180 = upright.rotate180();
    let rot270 = upright.rotate270();
    let mirrored = upright.fliph();

    ComputedHashes {
        phash_0: hex16(phash(&upright)),
        phash_90: hex16(phash(&rot90)),
        phash_180: hex16(phash(&rot180)),
        phash_270: hex16(phash(&rot270)),
        dhash_0: hex16(dhash(&upright)),
        dhash_90: hex16(dhash(&rot90)),
        dhash_180: hex16(dhash(&rot180)),
        dhash_270: hex16(dhash(&rot270)),
        phash_hmirror: hex16(phash(&mirrored)),
        dhash_hmirror: hex16(dhash(&mirrored)),
    }
}

/// Reads the EXIF orientation tag for a file, defaulting to 1 (no change)
/// when absent or unreadable.
fn read_orientation(path: &Path) -> u16 {
    rexif::parse_file(&path.to_string_lossy())
        .ok()
        .and_then(|exif| {
            exif.entries
                .iter()
                .find(|e| e.tag == rexif::ExifTag::Orientation)
                .and_then(|e| match &e.value {
                    rexif::TagValue::U16(v) => v.first().copied(),
                    _ => None,
                })
        })
        .unwrap_or(1)
}

struct HashJob {
    image_id: i64,
    absolute_path: PathBuf,
}

struct HashResult {
    image_id: i64,
    hashes: Option<ComputedHashes>,
}

#[derive(Debug, Default)]
pub struct HashPassReport {
    pub attempted: usize,
    pub hashed: usize,
    pub decode_errors: usize,
}

/// Runs one pass of the background hashing worker pool: reads every unhashed
/// image, computes fingerprints on a bounded pool of blocking workers, and
/// writes results back through a dedicated store handle that does not share
/// a transaction with the scanner (§4.6).
pub async fn run_hash_pass(
    catalog_db_path: &Path,
    config: &CatalogConfig,
    on_progress: impl Fn(usize, usize) + Send + Sync + 'static,
) -> CatalogResult<HashPassReport> {
    let reader_store = Store::open_with_busy_timeout(catalog_db_path, config.busy_timeout).await?;
    let writer_store = Store::open_with_busy_timeout(catalog_db_path, config.busy_timeout).await?;
    let root = reader_store.root().to_path_buf();

    let unhashed = reader_store.list_unhashed().await?;
    let total = unhashed.len();
    if total == 0 {
        return Ok(HashPassReport::default());
    }

    let worker_count = config.hash_worker_count.max(1);
    let (job_tx, job_rx) = mpsc::channel::<HashJob>(config.hash_channel_capacity.max(1));
    let (result_tx, mut result_rx) = mpsc::channel::<HashResult>(config.hash_channel_capacity.max(1));

    let job_rx = std::sync::Arc::new(tokio::sync::Mutex::new(job_rx));
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };
                let hashes = tokio::task::spawn_blocking(move || {
                    let orientation = read_orientation(&job.absolute_path);
                    match image::open(&job.absolute_path) {
                        Ok(img) => Some((job.image_id, compute_hashes(&img, orientation))),
                        Err(e) => {
                            tracing::warn!(path = %job.absolute_path.display(), error = %e, "decode error during hashing");
                            None
                        }
                    }
                })
                .await
                .unwrap_or(None);

                let (image_id, hashes) = match hashes {
                    Some((id, h)) => (id, Some(h)),
                    None => (job.image_id, None),
                };
                let _ = result_tx.send(HashResult { image_id, hashes }).await;
            }
        }));
    }
    drop(result_tx);

    tokio::spawn(async move {
        for image in unhashed {
            let absolute = root.join(&image.filepath);
            if job_tx.send(HashJob { image_id: image.id, absolute_path: absolute }).await.is_err() {
                break;
            }
        }
    });

    let mut report = HashPassReport::default();
    let mut processed = 0usize;
    while let Some(result) = result_rx.recv().await {
        processed += 1;
        report.attempted += 1;
        match result.hashes {
            Some(h) => {
                writer_store
                    .update_hashes(
                        result.image_id,
                        &h.phash_0,
                        &h.phash_90,
                        &h.phash_180,
                        &h.phash_270,
                        &h.dhash_0,
                        &h.dhash_90,
                        &h.dhash_180,
                        &h.dhash_270,
                        &h.phash_hmirror,
                        &h.dhash_hmirror,
                    )
                    .await?;
                report.hashed += 1;
            }
            None => {
                report.decode_errors += 1;
            }
        }
        on_progress(processed, total);
    }

    for worker in workers {
        let _ = worker.await;
    }

    Ok(report)
}

// A minimal sleep helper kept for callers that want to poll cancellation
// cooperatively between batches (§5).
pub async fn yield_point() {
    tokio::time::sleep(Duration::from_millis(0)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_counts_differing_bits() {
        assert_eq!(hamming_distance("0000000000000000", "0000000000000001"), Some(1));
        assert_eq!(hamming_distance("ffffffffffffffff", "0000000000000000"), Some(64));
    }

    #[test]
    fn identical_solid_images_hash_identically_across_rotations() {
        let img = DynamicImage::new_rgb8(64, 64);
        let hashes = compute_hashes(&img, 1);
        assert_eq!(hashes.phash_0, hashes.phash_90);
        assert_eq!(hashes.dhash_0, hashes.dhash_90);
        assert_eq!(hashes.phash_0.len(), 16);
    }

    #[test]
    fn orientation_6_rotates_90_before_hashing() {
        let mut img = image::RgbImage::new(4, 8);
        for (x, _y, px) in img.enumerate_pixels_mut() {
            *px = if x < 2 { image::Rgb([0, 0, 0]) } else { image::Rgb([255, 255, 255]) };
        }
        let dynamic = DynamicImage::ImageRgb8(img);
        let corrected = apply_orientation(dynamic.clone(), 6);
        assert_eq!(corrected.dimensions(), (8, 4));
        let unchanged = apply_orientation(dynamic, 1);
        assert_eq!(unchanged.dimensions(), (4, 8));
    }
}
