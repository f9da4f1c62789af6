pub mod brush;
pub mod constraints;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod params;
pub mod rle;
pub mod types;
pub mod undo;

pub use brush::{paint_stroke, stamp_disk, BrushMode, BrushStroke};
pub use constraints::{
    apply_segmentation_mask_constraints, plan_overlap_updates,
    remove_overlap_from_other_semantic_annotations, strip_locked_pixels, AnnotationUpdater,
    ConstraintOutcome, EditScene, MaskEdit, OverlapPlan, SegmentationMode,
};
pub use error::{BoxError, MaskError, Result};
pub use geometry::{
    clip_segment, compute_bounding_box_from_mask, interpolate_line_between_points, line_points,
    mask_to_data_url, MaskColor, Point,
};
pub use mask::PixelMask;
pub use params::EditorParams;
pub use types::{
    Annotation, AnnotationKind, AnnotationLabel, AnnotationUpdate, BoundingBox, Rle, Sample,
    SegmentationDetails,
};
pub use undo::{AnnotationBackend, LabelAssignment, ReversibleAction, UndoLedger};
