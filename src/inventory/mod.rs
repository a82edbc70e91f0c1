//! Image inventory
//!
//! Enumerates candidate images from the local store and resolves the
//! dependency item set each one carries. Labels are the fast path; images
//! produced before the label schema fall back to a one-shot `cat` of the
//! legacy in-image metadata file. Candidate reads are independent and run
//! concurrently with a bounded worker count.

use crate::labels;
use crate::runtime::Runtime;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Maximum concurrent candidate inspections
const MAX_WORKERS: usize = 8;

/// An image in the local store together with its dependency item set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    /// `repo:tag` reference
    pub reference: String,
    /// Dependency items the image declares (possibly empty)
    pub items: Vec<String>,
}

/// Filter raw `repo:tag` references: drop dangling tags and apply the
/// optional repository / tag-prefix restriction.
pub fn filter_references(
    references: &[String],
    preferred_repo: Option<&str>,
    tag_prefix: Option<&str>,
) -> Vec<String> {
    references
        .iter()
        .filter(|r| !r.ends_with(":<none>") && !r.starts_with("<none>"))
        .filter(|r| {
            let (repo, tag) = match r.rsplit_once(':') {
                Some(split) => split,
                None => return false,
            };
            if let Some(preferred) = preferred_repo {
                if repo != preferred {
                    return false;
                }
            }
            if let Some(prefix) = tag_prefix {
                if !tag.starts_with(prefix) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Enumerate candidate references from the runtime store
pub async fn enumerate(
    runtime: &dyn Runtime,
    preferred_repo: Option<&str>,
    tag_prefix: Option<&str>,
) -> Vec<String> {
    match runtime.list_images().await {
        Ok(references) => {
            let filtered = filter_references(&references, preferred_repo, tag_prefix);
            debug!(
                "inventory: {} candidates (of {} local images)",
                filtered.len(),
                references.len()
            );
            filtered
        }
        Err(e) => {
            warn!("failed to enumerate images: {e}");
            Vec::new()
        }
    }
}

/// Resolve the dependency item set of one image.
///
/// Label payload first (`items_b64`, then plain `items`), legacy in-image
/// file as a last resort. Any failure yields an empty set: a candidate we
/// cannot read is simply worthless for reuse, never fatal.
pub async fn resolve_items(runtime: &dyn Runtime, reference: &str) -> Vec<String> {
    match runtime.image_labels(reference).await {
        Ok(labels_map) => {
            if let Some(items) = labels::decode(&labels_map) {
                return items;
            }
        }
        Err(e) => {
            warn!("inspect failed for {reference}: {e}; treating as empty");
            return Vec::new();
        }
    }

    // No label metadata: try the legacy in-image file
    match runtime
        .read_image_file(reference, labels::LEGACY_ITEMS_PATH)
        .await
    {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            debug!("no legacy metadata in {reference}: {e}");
            Vec::new()
        }
    }
}

/// Inspect all candidates with bounded concurrency, preserving the
/// enumeration order of the results (scoring is commutative, but a stable
/// order keeps tie-breaking deterministic).
pub async fn inspect_all(runtime: &dyn Runtime, references: Vec<String>) -> Vec<CandidateImage> {
    if references.is_empty() {
        return Vec::new();
    }
    let workers = MAX_WORKERS.min(references.len());

    let mut indexed: Vec<(usize, CandidateImage)> = stream::iter(
        references.into_iter().enumerate().map(|(i, reference)| async move {
            let items = resolve_items(runtime, &reference).await;
            (i, CandidateImage { reference, items })
        }),
    )
    .buffer_unordered(workers)
    .collect()
    .await;

    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, c)| c).collect()
}
