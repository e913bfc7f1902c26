//! # Image Set Reconciler
//!
//! Working state of a variant's images during an edit session.
//!
//! ## Working State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            ImageSet                                     │
//! │                                                                         │
//! │  persisted      [ a★ , b , c ]     stored images, ★ = flagged main     │
//! │  pending_deletes{ b }              ids to delete on commit             │
//! │  pending_adds   [ p0 , p1 ]        uncommitted files + preview handles │
//! │                                                                         │
//! │  display_order  [ p0★, p1, a, c ]  pending adds win the main slot      │
//! │                                                                         │
//! │  commit_diff ──► ImageDiff { delete_ids: [b], new_files: [p0, p1],     │
//! │                              main_new_index: Some(0) }                 │
//! │  acknowledge_commit ──► buffers cleared, previews released             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Capacity is `persisted - pending_deletes + pending_adds ≤ max_images`.
//! Nothing is physically deleted before the persistence collaborator
//! acknowledges the diff.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ConstraintError, CoreResult, ValidationError};
use crate::types::{ImageRef, ImageSource, PersistedImage, Variant};
use crate::validation::ValidationResult;
use crate::MAX_VARIANT_IMAGES;

// =============================================================================
// Incoming Files
// =============================================================================

/// A file offered through the upload control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        IncomingFile {
            name: name.into(),
            content_type: content_type.into(),
            size,
        }
    }

    /// Whether the content type starts with `image/`.
    pub fn is_image(&self) -> bool {
        has_prefix(&self.content_type, "image/")
    }
}

fn has_prefix(content_type: &str, prefix: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with(&prefix.to_ascii_lowercase())
}

/// Which files are accepted and how many a variant may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePolicy {
    pub max_images: usize,
    pub accepted_prefixes: Vec<String>,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        ImagePolicy {
            max_images: MAX_VARIANT_IMAGES,
            accepted_prefixes: vec!["image/".to_string()],
        }
    }
}

impl ImagePolicy {
    pub fn accepts(&self, file: &IncomingFile) -> bool {
        file.is_image()
            && self
                .accepted_prefixes
                .iter()
                .any(|prefix| has_prefix(&file.content_type, prefix))
    }

    fn limit(&self) -> usize {
        self.max_images.min(MAX_VARIANT_IMAGES)
    }
}

// =============================================================================
// Preview Handles
// =============================================================================

/// Counts the preview resources held by pending adds.
///
/// Cloning shares the counter, so one tracker can watch every session.
#[derive(Debug, Clone, Default)]
pub struct PreviewTracker {
    live: Arc<AtomicUsize>,
}

impl PreviewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a preview for a pending file.
    pub fn acquire(&self) -> PreviewHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        PreviewHandle {
            token: format!("preview:{}", Uuid::new_v4()),
            live: Arc::clone(&self.live),
        }
    }

    /// Number of previews not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// An ephemeral preview of a pending file. Released on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    token: String,
    live: Arc<AtomicUsize>,
}

impl PreviewHandle {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A file waiting to be committed.
#[derive(Debug)]
pub struct PendingImage {
    pub file: IncomingFile,
    preview: PreviewHandle,
}

impl PendingImage {
    pub fn token(&self) -> &str {
        self.preview.token()
    }
}

// =============================================================================
// Reports and Diffs
// =============================================================================

/// What `add_files` did with each offered file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesReport {
    /// Pending tokens of accepted files, in order.
    pub accepted: Vec<String>,
    /// Names of files that are not images.
    pub rejected_non_image: Vec<String>,
    /// Names of files dropped because the set was full.
    pub rejected_over_cap: Vec<String>,
}

impl AddFilesReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected_non_image.len() + self.rejected_over_cap.len()
    }
}

/// Image changes to hand to the persistence collaborator in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDiff {
    pub delete_ids: Vec<String>,
    pub new_files: Vec<IncomingFile>,
    /// Index into `new_files` of the new main image.
    pub main_new_index: Option<usize>,
    /// Persisted image to flag as main when no file is added.
    pub main_persisted_id: Option<String>,
}

impl ImageDiff {
    pub fn is_empty(&self) -> bool {
        self.delete_ids.is_empty() && self.new_files.is_empty() && self.main_persisted_id.is_none()
    }
}

// =============================================================================
// Image Set
// =============================================================================

#[derive(Debug)]
pub struct ImageSet {
    persisted: Vec<PersistedImage>,
    pending_adds: Vec<PendingImage>,
    pending_deletes: Vec<String>,
    chosen_main: Option<String>,
    policy: ImagePolicy,
    previews: PreviewTracker,
}

impl ImageSet {
    pub fn new(variant: &Variant, policy: ImagePolicy, previews: PreviewTracker) -> Self {
        ImageSet {
            persisted: variant.images.clone(),
            pending_adds: Vec::new(),
            pending_deletes: Vec::new(),
            chosen_main: None,
            policy,
            previews,
        }
    }

    fn is_deleted(&self, id: &str) -> bool {
        self.pending_deletes.iter().any(|d| d == id)
    }

    fn remaining_persisted(&self) -> impl Iterator<Item = &PersistedImage> {
        self.persisted.iter().filter(move |img| !self.is_deleted(&img.id))
    }

    /// Images the variant would hold after commit.
    pub fn total(&self) -> usize {
        self.remaining_persisted().count() + self.pending_adds.len()
    }

    pub fn capacity_left(&self) -> usize {
        self.policy.limit().saturating_sub(self.total())
    }

    pub fn pending_adds(&self) -> &[PendingImage] {
        &self.pending_adds
    }

    pub fn pending_deletes(&self) -> &[String] {
        &self.pending_deletes
    }

    pub fn persisted(&self) -> &[PersistedImage] {
        &self.persisted
    }

    /// Adds files to the pending list.
    ///
    /// Non-images and files beyond the cap are reported, not fatal.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = IncomingFile>) -> AddFilesReport {
        let mut report = AddFilesReport::default();

        for file in files {
            if !self.policy.accepts(&file) {
                debug!(name = %file.name, content_type = %file.content_type, "Rejected non-image file");
                report.rejected_non_image.push(file.name);
                continue;
            }
            if self.capacity_left() == 0 {
                report.rejected_over_cap.push(file.name);
                continue;
            }

            let pending = PendingImage {
                file,
                preview: self.previews.acquire(),
            };
            report.accepted.push(pending.token().to_string());
            self.pending_adds.push(pending);
        }

        if !report.rejected_over_cap.is_empty() {
            warn!(
                dropped = report.rejected_over_cap.len(),
                max = self.policy.limit(),
                "Image cap reached, files dropped"
            );
        }
        report
    }

    /// Moves the pending add at `index` to the front, making it main.
    pub fn promote_to_main(&mut self, index: usize) -> ValidationResult<()> {
        if index >= self.pending_adds.len() {
            return Err(unknown_pending(index));
        }
        let chosen = self.pending_adds.remove(index);
        self.pending_adds.insert(0, chosen);
        Ok(())
    }

    /// Drops a pending add and releases its preview.
    pub fn remove_pending_add(&mut self, index: usize) -> ValidationResult<()> {
        if index >= self.pending_adds.len() {
            return Err(unknown_pending(index));
        }
        self.pending_adds.remove(index);
        Ok(())
    }

    /// Marks a persisted image for deletion on commit.
    pub fn mark_persisted_for_deletion(&mut self, id: &str) -> ValidationResult<()> {
        if !self.persisted.iter().any(|img| img.id == id) {
            return Err(unknown_persisted(id));
        }
        if !self.is_deleted(id) {
            self.pending_deletes.push(id.to_string());
        }
        if self.chosen_main.as_deref() == Some(id) {
            self.chosen_main = None;
        }
        Ok(())
    }

    /// Takes back a pending deletion, if the cap allows it.
    pub fn unmark_deletion(&mut self, id: &str) -> CoreResult<()> {
        if !self.is_deleted(id) {
            return Err(unknown_persisted(id).into());
        }
        if self.capacity_left() == 0 {
            return Err(ConstraintError::ImageCapExceeded {
                max: self.policy.limit(),
                requested: self.total() + 1,
            }
            .into());
        }
        self.pending_deletes.retain(|d| d != id);
        Ok(())
    }

    /// Chooses the main image among persisted images.
    ///
    /// Only takes effect while there are no pending adds.
    pub fn set_main_persisted(&mut self, id: &str) -> ValidationResult<()> {
        if !self.remaining_persisted().any(|img| img.id == id) {
            return Err(unknown_persisted(id));
        }
        self.chosen_main = Some(id.to_string());
        Ok(())
    }

    fn main_persisted(&self) -> Option<&PersistedImage> {
        let chosen = self
            .chosen_main
            .as_deref()
            .and_then(|id| self.remaining_persisted().find(|img| img.id == id));
        chosen
            .or_else(|| self.remaining_persisted().find(|img| img.is_main))
            .or_else(|| self.remaining_persisted().next())
    }

    /// The effective image list, main first.
    pub fn display_order(&self) -> Vec<ImageRef> {
        let mut keys: Vec<(String, ImageSource)> = Vec::with_capacity(self.total());

        if self.pending_adds.is_empty() {
            let main_id = self.main_persisted().map(|img| img.id.clone());
            if let Some(id) = &main_id {
                keys.push((id.clone(), ImageSource::Persisted));
            }
            keys.extend(
                self.remaining_persisted()
                    .filter(|img| Some(&img.id) != main_id.as_ref())
                    .map(|img| (img.id.clone(), ImageSource::Persisted)),
            );
        } else {
            keys.extend(
                self.pending_adds
                    .iter()
                    .map(|p| (p.token().to_string(), ImageSource::Pending)),
            );
            keys.extend(
                self.remaining_persisted()
                    .map(|img| (img.id.clone(), ImageSource::Persisted)),
            );
        }

        keys.into_iter()
            .enumerate()
            .map(|(i, (key, source))| ImageRef {
                key,
                source,
                is_main: i == 0,
                order: i as u32,
            })
            .collect()
    }

    pub fn effective_main(&self) -> Option<ImageRef> {
        self.display_order().into_iter().next()
    }

    /// The diff to persist. Does not change the working state.
    pub fn commit_diff(&self) -> ImageDiff {
        let main_persisted_id = if self.pending_adds.is_empty() {
            let flagged = self.persisted.iter().find(|img| img.is_main).map(|img| &img.id);
            self.main_persisted()
                .map(|img| &img.id)
                .filter(|id| Some(*id) != flagged)
                .cloned()
        } else {
            None
        };

        ImageDiff {
            delete_ids: self.pending_deletes.clone(),
            new_files: self.pending_adds.iter().map(|p| p.file.clone()).collect(),
            main_new_index: (!self.pending_adds.is_empty()).then_some(0),
            main_persisted_id,
        }
    }

    /// Adopts the images confirmed by the collaborator and clears buffers.
    pub fn acknowledge_commit(&mut self, persisted: &[PersistedImage]) {
        self.persisted = persisted.to_vec();
        self.discard();
    }

    /// Drops every uncommitted change and releases previews.
    pub fn discard(&mut self) {
        self.pending_adds.clear();
        self.pending_deletes.clear();
        self.chosen_main = None;
    }

    /// Previews still held, across every set sharing this tracker.
    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }
}

fn unknown_pending(index: usize) -> ValidationError {
    ValidationError::UnknownImage {
        position: format!("pending index {}", index),
    }
}

fn unknown_persisted(id: &str) -> ValidationError {
    ValidationError::UnknownImage {
        position: format!("image id {}", id),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::tests::test_variant;

    fn persisted(ids: &[&str], main: &str) -> Vec<PersistedImage> {
        ids.iter()
            .map(|id| PersistedImage {
                id: id.to_string(),
                url: format!("/img/{}.png", id),
                is_main: *id == main,
            })
            .collect()
    }

    fn set_with(ids: &[&str], main: &str) -> ImageSet {
        let mut variant = test_variant("1", 5);
        variant.images = persisted(ids, main);
        ImageSet::new(&variant, ImagePolicy::default(), PreviewTracker::new())
    }

    fn png(name: &str) -> IncomingFile {
        IncomingFile::new(name, "image/png", 1024)
    }

    #[test]
    fn test_cap_truncates_and_reports() {
        let mut set = set_with(&["a", "b", "c"], "a");
        let report = set.add_files(vec![png("1"), png("2"), png("3"), png("4")]);

        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected_over_cap, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(report.rejected_count(), 2);
        assert_eq!(set.total(), 5);
    }

    #[test]
    fn test_non_images_are_rejected_not_fatal() {
        let mut set = set_with(&[], "");
        let report = set.add_files(vec![
            IncomingFile::new("notes.pdf", "application/pdf", 10),
            png("ok"),
        ]);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected_non_image, vec!["notes.pdf".to_string()]);
    }

    #[test]
    fn test_policy_prefixes_narrow_accepted_types() {
        let mut variant = test_variant("1", 5);
        variant.images = Vec::new();
        let policy = ImagePolicy {
            max_images: 5,
            accepted_prefixes: vec!["image/png".to_string(), "image/jpeg".to_string()],
        };
        let mut set = ImageSet::new(&variant, policy, PreviewTracker::new());
        let report = set.add_files(vec![png("a"), IncomingFile::new("b.gif", "image/gif", 1)]);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejected_non_image.len(), 1);
    }

    #[test]
    fn test_deletions_free_capacity() {
        let mut set = set_with(&["a", "b", "c", "d", "e"], "a");
        assert_eq!(set.capacity_left(), 0);

        set.mark_persisted_for_deletion("b").unwrap();
        let report = set.add_files(vec![png("1"), png("2")]);
        assert_eq!(report.accepted.len(), 1);

        assert!(matches!(
            set.unmark_deletion("b"),
            Err(CoreError::Constraint(ConstraintError::ImageCapExceeded { .. }))
        ));
    }

    #[test]
    fn test_promote_to_main() {
        let mut set = set_with(&["a"], "a");
        let report = set.add_files(vec![png("1"), png("2"), png("3")]);
        let chosen = report.accepted[2].clone();

        set.promote_to_main(2).unwrap();

        assert_eq!(set.pending_adds()[0].token(), chosen);
        let main = set.effective_main().unwrap();
        assert_eq!(main.key, chosen);
        assert_eq!(main.source, ImageSource::Pending);
        assert_eq!(main.order, 0);

        assert!(set.promote_to_main(3).is_err());
    }

    #[test]
    fn test_effective_main_without_pending_adds() {
        let mut set = set_with(&["a", "b", "c"], "b");
        assert_eq!(set.effective_main().unwrap().key, "b");

        set.mark_persisted_for_deletion("b").unwrap();
        assert_eq!(set.effective_main().unwrap().key, "a");

        set.set_main_persisted("c").unwrap();
        let order: Vec<String> = set.display_order().into_iter().map(|r| r.key).collect();
        assert_eq!(order, vec!["c", "a"]);
        assert_eq!(set.display_order().iter().filter(|r| r.is_main).count(), 1);

        assert!(set.set_main_persisted("b").is_err());
    }

    #[test]
    fn test_commit_diff_and_acknowledge() {
        let mut set = set_with(&["a", "b"], "a");
        assert!(set.commit_diff().is_empty());

        set.mark_persisted_for_deletion("a").unwrap();
        set.add_files(vec![png("1"), png("2")]);
        set.promote_to_main(1).unwrap();

        let diff = set.commit_diff();
        assert_eq!(diff.delete_ids, vec!["a".to_string()]);
        let names: Vec<&str> = diff.new_files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["2", "1"]);
        assert_eq!(diff.main_new_index, Some(0));
        assert_eq!(set.live_previews(), 2);

        // Unchanged until acknowledged.
        assert_eq!(set.pending_adds().len(), 2);

        set.acknowledge_commit(&persisted(&["x", "y", "b"], "x"));
        assert_eq!(set.live_previews(), 0);
        assert!(set.commit_diff().is_empty());
        assert_eq!(set.effective_main().unwrap().key, "x");
    }

    #[test]
    fn test_main_persisted_change_is_a_diff() {
        let mut set = set_with(&["a", "b"], "a");
        set.set_main_persisted("b").unwrap();
        let diff = set.commit_diff();
        assert_eq!(diff.main_persisted_id.as_deref(), Some("b"));
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_previews_released_on_remove_and_discard() {
        let tracker = PreviewTracker::new();
        let variant = test_variant("1", 5);
        let mut set = ImageSet::new(&variant, ImagePolicy::default(), tracker.clone());

        set.add_files(vec![png("1"), png("2"), png("3")]);
        assert_eq!(tracker.live(), 3);

        set.remove_pending_add(1).unwrap();
        assert_eq!(tracker.live(), 2);

        set.discard();
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_previews_released_on_drop() {
        let tracker = PreviewTracker::new();
        {
            let variant = test_variant("1", 5);
            let mut set = ImageSet::new(&variant, ImagePolicy::default(), tracker.clone());
            set.add_files(vec![png("1")]);
            assert_eq!(tracker.live(), 1);
        }
        assert_eq!(tracker.live(), 0);
    }
}
