//! Overlap and lock constraints between segmentation masks of one sample.
//!
//! A freshly drawn mask must not take pixels from locked annotations, and in
//! semantic mode it pushes those pixels out of every other unlocked semantic
//! mask. Instance masks may overlap freely.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BoxError, MaskError, Result};
use crate::geometry::compute_bounding_box_from_mask;
use crate::mask::{subtract_in_place, PixelMask};
use crate::params::EditorParams;
use crate::rle;
use crate::types::{Annotation, AnnotationUpdate, Rle, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Masks of different annotations may overlap.
    Instance,
    /// Each pixel belongs to at most one annotation.
    #[default]
    Semantic,
}

/// Persists a batch of mask updates. Supplied by the caller; the engine never
/// talks to the network itself.
#[async_trait]
pub trait AnnotationUpdater: Send + Sync {
    async fn update_annotations(
        &self,
        updates: Vec<AnnotationUpdate>,
    ) -> std::result::Result<(), BoxError>;
}

/// Everything one mask edit is checked against.
#[derive(Debug, Clone, Copy)]
pub struct EditScene<'a> {
    pub sample: Sample,
    pub collection_id: Uuid,
    pub annotations: &'a [Annotation],
    pub segmentation_mode: SegmentationMode,
    pub locked_annotation_ids: Option<&'a HashSet<Uuid>>,
}

impl<'a> EditScene<'a> {
    pub fn new(
        sample: Sample,
        collection_id: Uuid,
        annotations: &'a [Annotation],
        segmentation_mode: SegmentationMode,
    ) -> Self {
        EditScene {
            sample,
            collection_id,
            annotations,
            segmentation_mode,
            locked_annotation_ids: None,
        }
    }

    pub fn with_locked(mut self, locked: &'a HashSet<Uuid>) -> Self {
        self.locked_annotation_ids = Some(locked);
        self
    }

    pub fn is_locked(&self, id: Uuid) -> bool {
        self.locked_annotation_ids
            .is_some_and(|locked| locked.contains(&id))
    }
}

/// Mask updates produced by trimming overlaps, plus the payloads they replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapPlan {
    pub updates: Vec<AnnotationUpdate>,
    /// Stored mask and box of each updated annotation before trimming, in the
    /// same order as `updates`.
    pub previous: Vec<AnnotationUpdate>,
}

impl OverlapPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Result of applying both constraint stages to one edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintOutcome {
    /// Pixels removed from the working mask because a locked mask covers them.
    pub locked_pixels_removed: usize,
    pub updates: Vec<AnnotationUpdate>,
    pub previous: Vec<AnnotationUpdate>,
}

/// A serialized mask edit: the sample, its annotations and the mask as drawn.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaskEdit {
    pub sample: Sample,
    pub collection_id: Uuid,
    /// Mode recorded with the edit. When absent the editor's configured mode
    /// applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_mode: Option<SegmentationMode>,
    #[serde(default)]
    pub locked_annotation_ids: HashSet<Uuid>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Annotation the mask belongs to, excluded from overlap trimming.
    #[serde(default)]
    pub edited_annotation_id: Option<Uuid>,
    pub mask: Rle,
}

impl MaskEdit {
    /// Load an edit from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Recorded mode, falling back to `params.segmentation_mode`.
    pub fn mode(&self, params: &EditorParams) -> SegmentationMode {
        self.segmentation_mode.unwrap_or(params.segmentation_mode)
    }

    pub fn scene(&self, params: &EditorParams) -> EditScene<'_> {
        EditScene::new(
            self.sample,
            self.collection_id,
            &self.annotations,
            self.mode(params),
        )
        .with_locked(&self.locked_annotation_ids)
    }

    /// Decode the drawn mask against the sample size.
    pub fn working_mask(&self) -> Result<PixelMask> {
        PixelMask::from_rle(&self.mask, self.sample.width, self.sample.height)
    }
}

fn check_mask_size(mask: &PixelMask, sample: &Sample) -> Result<()> {
    if !mask.matches_sample(sample) {
        return Err(MaskError::MaskSizeMismatch {
            expected: sample.pixel_count(),
            got: mask.as_slice().len(),
        });
    }
    Ok(())
}

/// Decode an annotation's stored mask, or `None` if it has none or it does
/// not fit the sample.
fn decode_annotation_mask(ann: &Annotation, sample: &Sample) -> Option<Vec<u8>> {
    let stored = ann.segmentation_mask()?;
    match rle::decode(stored, sample.width, sample.height) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(
                annotation_id = %ann.sample_id,
                kind = ann.kind.as_str(),
                error = %e,
                "Skipping undecodable mask"
            );
            None
        }
    }
}

/// Clear every pixel of `working` that is foreground in a locked annotation's
/// mask. Returns the number of pixels cleared.
///
/// A missing or empty lock set, or no annotations, leaves `working` untouched.
pub fn strip_locked_pixels(
    working: &mut PixelMask,
    locked_annotation_ids: Option<&HashSet<Uuid>>,
    annotations: &[Annotation],
    sample: &Sample,
) -> Result<usize> {
    let Some(locked) = locked_annotation_ids.filter(|l| !l.is_empty()) else {
        return Ok(0);
    };
    if annotations.is_empty() {
        return Ok(0);
    }
    check_mask_size(working, sample)?;

    let mut cleared = 0;
    for ann in annotations.iter().filter(|a| locked.contains(&a.sample_id)) {
        if let Some(locked_mask) = decode_annotation_mask(ann, sample) {
            cleared += subtract_in_place(working.data_mut(), &locked_mask);
        }
    }

    if cleared > 0 {
        debug!(cleared, "Removed locked pixels from working mask");
    }
    Ok(cleared)
}

/// Compute, without persisting, how other semantic masks must shrink so they
/// no longer overlap `new_mask`.
///
/// Only runs in semantic mode. The annotation `skip_id` (usually the one being
/// edited), locked annotations, non-semantic annotations and annotations
/// without a decodable mask are left alone.
pub fn plan_overlap_updates(
    new_mask: &PixelMask,
    scene: &EditScene<'_>,
    skip_id: Option<Uuid>,
) -> Result<OverlapPlan> {
    if scene.segmentation_mode != SegmentationMode::Semantic {
        return Ok(OverlapPlan::default());
    }
    check_mask_size(new_mask, &scene.sample)?;

    let sample = scene.sample;
    let (updates, previous): (Vec<_>, Vec<_>) = scene
        .annotations
        .par_iter()
        .filter(|a| Some(a.sample_id) != skip_id)
        .filter(|a| a.is_semantic_segmentation())
        .filter(|a| !scene.is_locked(a.sample_id))
        .filter_map(|ann| {
            let mut data = decode_annotation_mask(ann, &sample)?;
            if subtract_in_place(&mut data, new_mask.as_slice()) == 0 {
                return None;
            }
            let update = AnnotationUpdate {
                annotation_id: ann.sample_id,
                collection_id: scene.collection_id,
                segmentation_mask: rle::encode(&data),
                bounding_box: compute_bounding_box_from_mask(&data, sample.width, sample.height),
            };
            let previous = AnnotationUpdate {
                annotation_id: ann.sample_id,
                collection_id: scene.collection_id,
                segmentation_mask: ann.segmentation_mask()?.clone(),
                bounding_box: ann.bounding_box(),
            };
            Some((update, previous))
        })
        .unzip();

    Ok(OverlapPlan { updates, previous })
}

/// Trim `new_mask` out of every other unlocked semantic mask and persist the
/// changed masks with a single batched call.
///
/// Nothing is sent when no mask changed, and never in instance mode. A
/// rejected batch is returned as [`MaskError::UpdateRejected`] without retry.
pub async fn remove_overlap_from_other_semantic_annotations(
    new_mask: &PixelMask,
    scene: &EditScene<'_>,
    skip_id: Option<Uuid>,
    updater: &dyn AnnotationUpdater,
) -> Result<OverlapPlan> {
    let plan = plan_overlap_updates(new_mask, scene, skip_id)?;
    if plan.is_empty() {
        return Ok(plan);
    }

    debug!(count = plan.updates.len(), "Sending overlap updates");
    updater
        .update_annotations(plan.updates.clone())
        .await
        .map_err(MaskError::UpdateRejected)?;
    Ok(plan)
}

/// Apply both constraints to one edit.
///
/// Locked pixels are stripped from `working` in place, while overlap trimming
/// of other annotations uses the pixels as drawn, before stripping.
pub async fn apply_segmentation_mask_constraints(
    working: &mut PixelMask,
    scene: &EditScene<'_>,
    skip_id: Option<Uuid>,
    updater: &dyn AnnotationUpdater,
) -> Result<ConstraintOutcome> {
    let drawn = working.clone();
    let locked_pixels_removed = strip_locked_pixels(
        working,
        scene.locked_annotation_ids,
        scene.annotations,
        &scene.sample,
    )?;
    let plan =
        remove_overlap_from_other_semantic_annotations(&drawn, scene, skip_id, updater).await?;

    Ok(ConstraintOutcome {
        locked_pixels_removed,
        updates: plan.updates,
        previous: plan.previous,
    })
}
