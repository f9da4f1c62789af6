use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimensions of the image an edit session works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sample {
    pub width: u32,
    pub height: u32,
}

impl Sample {
    pub fn new(width: u32, height: u32) -> Self {
        Sample { width, height }
    }

    /// Number of pixels in a full-frame mask for this sample.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// Axis-aligned pixel rectangle. `width` and `height` are inclusive spans,
/// so a single pixel has a 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        BoundingBox::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Run-length encoding for row-major binary masks.
///
/// Runs alternate background and foreground and always start with a
/// background run, which is `0` when the first pixel is foreground.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Rle(pub Vec<u32>);

impl Rle {
    pub fn counts(&self) -> &[u32] {
        &self.0
    }

    /// Sum of all runs, i.e. the pixel count the encoding covers.
    pub fn total_len(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).sum()
    }

    /// True when the runs cover exactly `width * height` pixels.
    pub fn is_well_formed(&self, width: u32, height: u32) -> bool {
        !self.0.is_empty() && self.total_len() == (width as u64) * (height as u64)
    }
}

impl From<Vec<u32>> for Rle {
    fn from(counts: Vec<u32>) -> Self {
        Rle(counts)
    }
}

/// Mask payload shared by instance and semantic segmentation annotations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SegmentationDetails {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub segmentation_mask: Option<Rle>,
}

impl SegmentationDetails {
    pub fn new(segmentation_mask: Rle, bounding_box: Option<BoundingBox>) -> Self {
        let bb = bounding_box.unwrap_or(BoundingBox::new(0, 0, 0, 0));
        SegmentationDetails {
            x: bb.x,
            y: bb.y,
            width: bb.width,
            height: bb.height,
            segmentation_mask: Some(segmentation_mask),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }
}

/// Annotation payload, discriminated by `annotation_type` on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "annotation_type", rename_all = "snake_case")]
pub enum AnnotationKind {
    ObjectDetection {
        object_detection_details: BoundingBox,
    },
    InstanceSegmentation {
        segmentation_details: SegmentationDetails,
    },
    SemanticSegmentation {
        segmentation_details: SegmentationDetails,
    },
    Classification,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectDetection { .. } => "object_detection",
            Self::InstanceSegmentation { .. } => "instance_segmentation",
            Self::SemanticSegmentation { .. } => "semantic_segmentation",
            Self::Classification => "classification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnnotationLabel {
    pub annotation_label_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Annotation {
    /// The annotation's own id. Annotations are stored as samples, hence the name.
    pub sample_id: Uuid,
    pub parent_sample_id: Uuid,
    pub annotation_label: AnnotationLabel,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn segmentation_details(&self) -> Option<&SegmentationDetails> {
        match &self.kind {
            AnnotationKind::InstanceSegmentation {
                segmentation_details,
            }
            | AnnotationKind::SemanticSegmentation {
                segmentation_details,
            } => Some(segmentation_details),
            _ => None,
        }
    }

    /// The stored mask, if this is a segmentation annotation that has one.
    pub fn segmentation_mask(&self) -> Option<&Rle> {
        self.segmentation_details()?.segmentation_mask.as_ref()
    }

    pub fn is_semantic_segmentation(&self) -> bool {
        matches!(self.kind, AnnotationKind::SemanticSegmentation { .. })
    }

    /// Spatial extent for detection and segmentation annotations.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match &self.kind {
            AnnotationKind::ObjectDetection {
                object_detection_details,
            } => Some(*object_detection_details),
            AnnotationKind::InstanceSegmentation {
                segmentation_details,
            }
            | AnnotationKind::SemanticSegmentation {
                segmentation_details,
            } => Some(segmentation_details.bounding_box()),
            AnnotationKind::Classification => None,
        }
    }

    pub fn label_name(&self) -> &str {
        &self.annotation_label.annotation_label_name
    }
}

/// Mask and box update for one annotation, as handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnnotationUpdate {
    pub annotation_id: Uuid,
    pub collection_id: Uuid,
    pub segmentation_mask: Rle,
    pub bounding_box: Option<BoundingBox>,
}
