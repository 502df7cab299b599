//! Perceptual-hash duplicate clustering.
//!
//! The correlated-rotation + mirror-channel pair predicate requires the
//! *same* rotation offset to satisfy both pHash and dHash, which rules out
//! false positives from independently-matching rotations. The union-find
//! shell (`find`/`union` over a parent-pointer vector, emit components of
//! size ≥ 2) is the standard disjoint-set clustering approach.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::error::CatalogResult;
use crate::hasher::hamming_distance;
use crate::store::models::Image;
use crate::store::Store;

const ROTATIONS: [fn(&Image) -> Option<&str>; 4] = [
    |i: &Image| i.phash_0.as_deref(),
    |i: &Image| i.phash_90.as_deref(),
    |i: &Image| i.phash_180.as_deref(),
    |i: &Image| i.phash_270.as_deref(),
];
const D_ROTATIONS: [fn(&Image) -> Option<&str>; 4] = [
    |i: &Image| i.dhash_0.as_deref(),
    |i: &Image| i.dhash_90.as_deref(),
    |i: &Image| i.dhash_180.as_deref(),
    |i: &Image| i.dhash_270.as_deref(),
];

/// True iff `a` and `b` satisfy the pair-match predicate at threshold `t`
/// bits: a correlated pHash/dHash match at the *same* rotation pair, or a
/// mirror-channel match in either direction (§4.7).
pub fn is_duplicate_pair(a: &Image, b: &Image, threshold: u32) -> bool {
    for (pa_fn, da_fn) in ROTATIONS.iter().zip(D_ROTATIONS.iter()) {
        let Some(pa) = pa_fn(a) else { continue };
        let Some(da) = da_fn(a) else { continue };
        for (pb_fn, db_fn) in ROTATIONS.iter().zip(D_ROTATIONS.iter()) {
            let Some(pb) = pb_fn(b) else { continue };
            let Some(db) = db_fn(b) else { continue };
            let p_match = hamming_distance(pa, pb).is_some_and(|d| d <= threshold);
            let d_match = hamming_distance(da, db).is_some_and(|d| d <= threshold);
            if p_match && d_match {
                return true;
            }
        }
    }

    mirror_match(a, b, threshold) || mirror_match(b, a, threshold)
}

/// `a`'s mirror channel against `b`'s upright (rotation-0) channel.
fn mirror_match(a: &Image, b: &Image, threshold: u32) -> bool {
    let (Some(pa), Some(da), Some(pb), Some(db)) = (
        a.phash_hmirror.as_deref(),
        a.dhash_hmirror.as_deref(),
        b.phash_0.as_deref(),
        b.dhash_0.as_deref(),
    ) else {
        return false;
    };
    hamming_distance(pa, pb).is_some_and(|d| d <= threshold)
        && hamming_distance(da, db).is_some_and(|d| d <= threshold)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Clusters `images` (every image must already have all ten hash slots
/// populated) into duplicate groups, each sorted by `file_size` descending,
/// largest kept first. `on_progress` is invoked roughly every 1,000
/// pairwise comparisons with `(processed, total_pairs)`.
///
/// The pairwise comparison is embarrassingly parallel across the outer
/// index, so it runs on rayon's global pool; the union-find pass over the
/// resulting match edges stays sequential since it isn't safely shardable.
pub fn find_duplicates(
    images: &[Image],
    threshold: u32,
    on_progress: impl FnMut(usize, usize) + Send,
) -> Vec<Vec<Image>> {
    let n = images.len();
    let total_pairs = n.saturating_mul(n.saturating_sub(1)) / 2;
    let processed = AtomicUsize::new(0);
    let on_progress = Mutex::new(on_progress);

    let edges: Vec<(usize, usize)> = (0..n)
        .into_par_iter()
        .flat_map(|i| {
            let mut matches = Vec::new();
            for j in (i + 1)..n {
                if is_duplicate_pair(&images[i], &images[j], threshold) {
                    matches.push((i, j));
                }
                let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 1000 == 0 || count == total_pairs {
                    if let Ok(mut cb) = on_progress.lock() {
                        cb(count, total_pairs);
                    }
                }
            }
            matches
        })
        .collect();

    let mut uf = UnionFind::new(n);
    for (i, j) in edges {
        uf.union(i, j);
    }

    let mut components: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for idx in 0..n {
        let root = uf.find(idx);
        components.entry(root).or_default().push(idx);
    }

    let mut groups: Vec<Vec<Image>> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let mut group: Vec<Image> = members.into_iter().map(|idx| images[idx].clone()).collect();
            group.sort_by(|a, b| b.file_size.cmp(&a.file_size));
            group
        })
        .collect();
    groups.sort_by(|a, b| b[0].file_size.cmp(&a[0].file_size));
    groups
}

/// Runs duplicate detection against every fully-hashed image and persists
/// the result, replacing whatever groups existed before (§4.7, re-detect
/// semantics).
pub async fn detect_and_store(
    store: &Store,
    threshold: u32,
    on_progress: impl FnMut(usize, usize) + Send,
) -> CatalogResult<usize> {
    let images = store.list_hashed().await?;
    let groups = find_duplicates(&images, threshold, on_progress);

    store.delete_all_groups().await?;
    for group in &groups {
        let ids: Vec<i64> = group.iter().map(|img| img.id).collect();
        store.create_group(&ids).await?;
    }
    Ok(groups.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(id: i64, file_size: i64) -> Image {
        Image {
            id,
            filepath: format!("{id}.jpg"),
            filename: format!("{id}.jpg"),
            file_size,
            width: None,
            height: None,
            datetime: None,
            year: None,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
            latitude: None,
            longitude: None,
            has_lat_lon: false,
            city: None,
            town: None,
            state: None,
            phash_0: None,
            phash_90: None,
            phash_180: None,
            phash_270: None,
            dhash_0: None,
            dhash_90: None,
            dhash_180: None,
            dhash_270: None,
            phash_hmirror: None,
            dhash_hmirror: None,
            favorite: false,
            to_delete: false,
            reviewed: false,
            auto_tag_errors: false,
            date_added: Utc::now(),
            date_modified: Utc::now(),
        }
    }

    /// S5: pHash-0 identical but dHash-0 differs by 40 bits, and no other
    /// rotation pair correlates either — must not be grouped.
    #[test]
    fn uncorrelated_rotation_match_is_not_a_duplicate() {
        let mut a = image(1, 100);
        a.phash_0 = Some("0000000000000000".to_string());
        a.dhash_0 = Some("0000000000000000".to_string());
        let mut b = image(2, 100);
        b.phash_0 = Some("0000000000000000".to_string());
        // 40 bits set -> far beyond threshold 5.
        b.dhash_0 = Some("ffffffffff000000".to_string());

        assert!(!is_duplicate_pair(&a, &b, 5));
        let groups = find_duplicates(&[a, b], 5, |_, _| {});
        assert!(groups.is_empty());
    }

    /// S7/Testable Property 7: A's 270° channel matches B's 0° channel.
    #[test]
    fn correlated_rotation_at_matching_offset_is_a_duplicate() {
        let mut a = image(1, 100);
        a.phash_270 = Some("1234567890abcdef".to_string());
        a.dhash_270 = Some("fedcba0987654321".to_string());
        let mut b = image(2, 100);
        b.phash_0 = Some("1234567890abcdef".to_string());
        b.dhash_0 = Some("fedcba0987654321".to_string());

        assert!(is_duplicate_pair(&a, &b, 5));
        let groups = find_duplicates(&[a, b], 5, |_, _| {});
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    /// S6: mirror-channel match groups two images that are not upright-identical.
    #[test]
    fn mirror_channel_match_is_a_duplicate() {
        let mut a = image(1, 200);
        a.phash_0 = Some("1111111111111111".to_string());
        a.dhash_0 = Some("5555555555555555".to_string());
        a.phash_hmirror = Some("aaaaaaaaaaaaaaaa".to_string());
        a.dhash_hmirror = Some("bbbbbbbbbbbbbbbb".to_string());
        let mut b = image(2, 50);
        b.phash_0 = Some("aaaaaaaaaaaaaaaa".to_string());
        b.dhash_0 = Some("bbbbbbbbbbbbbbbb".to_string());

        assert!(is_duplicate_pair(&a, &b, 0));
        let groups = find_duplicates(&[a.clone(), b.clone()], 0, |_, _| {});
        assert_eq!(groups.len(), 1);
        // Largest file_size sorts first.
        assert_eq!(groups[0][0].id, a.id);
    }

    #[test]
    fn unrelated_images_with_different_hashes_are_not_grouped() {
        let mut a = image(1, 100);
        a.phash_0 = Some("1111111111111111".to_string());
        a.dhash_0 = Some("2222222222222222".to_string());
        a.phash_hmirror = Some("3333333333333333".to_string());
        a.dhash_hmirror = Some("4444444444444444".to_string());
        let mut b = image(2, 100);
        b.phash_0 = Some("9999999999999999".to_string());
        b.dhash_0 = Some("8888888888888888".to_string());
        b.phash_hmirror = Some("7777777777777777".to_string());
        b.dhash_hmirror = Some("6666666666666666".to_string());

        assert!(!is_duplicate_pair(&a, &b, 5));
    }
}
