//! Undo ledger for annotation edits.
//!
//! Every committed mutation registers a [`ReversibleAction`] holding the
//! inverse backend call. Undo pops the most recent action and runs it; there
//! is no redo.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::constraints::AnnotationUpdater;
use crate::error::{BoxError, MaskError, Result};
use crate::params::EditorParams;
use crate::types::{Annotation, AnnotationUpdate, BoundingBox};

/// Default number of actions kept before the oldest is evicted.
pub const DEFAULT_UNDO_DEPTH: usize = 100;

pub const GROUP_ANNOTATION_CREATE: &str = "annotation-create";
pub const GROUP_ANNOTATION_DELETE: &str = "annotation-delete";
pub const GROUP_ANNOTATION_LABEL_CHANGE: &str = "annotation-label-change";
pub const GROUP_ANNOTATION_BOUNDING_BOX_CHANGE: &str = "annotation-bounding-box-change";
pub const GROUP_ANNOTATION_SEGMENTATION_CHANGE: &str = "annotation-segmentation-change";

/// New label for one annotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LabelAssignment {
    pub annotation_id: Uuid,
    pub label_name: String,
}

/// Backend calls needed to invert annotation edits.
#[async_trait]
pub trait AnnotationBackend: AnnotationUpdater {
    async fn create_annotation(&self, annotation: Annotation) -> std::result::Result<(), BoxError>;

    async fn delete_annotation(&self, annotation_id: Uuid) -> std::result::Result<(), BoxError>;

    async fn update_annotation_labels(
        &self,
        labels: Vec<LabelAssignment>,
    ) -> std::result::Result<(), BoxError>;

    async fn update_bounding_box(
        &self,
        annotation_id: Uuid,
        bounding_box: BoundingBox,
    ) -> std::result::Result<(), BoxError>;

    /// Refetch annotations after an inverse call so views pick up the change.
    async fn refresh(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
pub trait InverseOperation: Send + Sync {
    async fn execute(&self) -> std::result::Result<(), BoxError>;
}

pub type InverseFuture = Pin<Box<dyn Future<Output = std::result::Result<(), BoxError>> + Send>>;

struct FnInverse<F>(F);

#[async_trait]
impl<F> InverseOperation for FnInverse<F>
where
    F: Fn() -> InverseFuture + Send + Sync,
{
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        (self.0)().await
    }
}

struct DeleteCreated {
    backend: Arc<dyn AnnotationBackend>,
    annotation_id: Uuid,
}

#[async_trait]
impl InverseOperation for DeleteCreated {
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.backend.delete_annotation(self.annotation_id).await?;
        self.backend.refresh().await
    }
}

struct Recreate {
    backend: Arc<dyn AnnotationBackend>,
    annotation: Annotation,
}

#[async_trait]
impl InverseOperation for Recreate {
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.backend.create_annotation(self.annotation.clone()).await?;
        self.backend.refresh().await
    }
}

struct RestoreLabels {
    backend: Arc<dyn AnnotationBackend>,
    labels: Vec<LabelAssignment>,
}

#[async_trait]
impl InverseOperation for RestoreLabels {
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.backend.update_annotation_labels(self.labels.clone()).await?;
        self.backend.refresh().await
    }
}

struct RestoreBoundingBox {
    backend: Arc<dyn AnnotationBackend>,
    annotation_id: Uuid,
    bounding_box: BoundingBox,
}

#[async_trait]
impl InverseOperation for RestoreBoundingBox {
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.backend
            .update_bounding_box(self.annotation_id, self.bounding_box)
            .await?;
        self.backend.refresh().await
    }
}

struct RestoreSegmentation {
    backend: Arc<dyn AnnotationBackend>,
    previous: Vec<AnnotationUpdate>,
}

#[async_trait]
impl InverseOperation for RestoreSegmentation {
    async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.backend.update_annotations(self.previous.clone()).await?;
        self.backend.refresh().await
    }
}

/// One undoable step.
pub struct ReversibleAction {
    pub id: Uuid,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub group_id: String,
    inverse: Arc<dyn InverseOperation>,
}

impl fmt::Debug for ReversibleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversibleAction")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("timestamp", &self.timestamp)
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

impl ReversibleAction {
    pub fn new(
        description: impl Into<String>,
        group_id: impl Into<String>,
        inverse: Arc<dyn InverseOperation>,
    ) -> Self {
        ReversibleAction {
            id: Uuid::new_v4(),
            description: description.into(),
            timestamp: Utc::now(),
            group_id: group_id.into(),
            inverse,
        }
    }

    /// Wrap a closure producing the inverse call.
    pub fn from_fn<F>(description: impl Into<String>, group_id: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> InverseFuture + Send + Sync + 'static,
    {
        Self::new(description, group_id, Arc::new(FnInverse(f)))
    }

    /// Undo for a newly created annotation: delete it.
    pub fn undo_create(backend: Arc<dyn AnnotationBackend>, created: &Annotation) -> Self {
        Self::new(
            format!("Create {} annotation", created.label_name()),
            GROUP_ANNOTATION_CREATE,
            Arc::new(DeleteCreated {
                backend,
                annotation_id: created.sample_id,
            }),
        )
    }

    /// Undo for a deleted annotation: create it again from its last state.
    pub fn undo_delete(backend: Arc<dyn AnnotationBackend>, deleted: Annotation) -> Self {
        Self::new(
            format!("Delete {} annotation", deleted.label_name()),
            GROUP_ANNOTATION_DELETE,
            Arc::new(Recreate {
                backend,
                annotation: deleted,
            }),
        )
    }

    /// Undo for a label change over one or more annotations, restoring all
    /// previous labels in one call.
    pub fn undo_label_change(
        backend: Arc<dyn AnnotationBackend>,
        previous_labels: Vec<LabelAssignment>,
    ) -> Self {
        let description = match previous_labels.len() {
            1 => "Change annotation label".to_string(),
            n => format!("Change label of {n} annotations"),
        };
        Self::new(
            description,
            GROUP_ANNOTATION_LABEL_CHANGE,
            Arc::new(RestoreLabels {
                backend,
                labels: previous_labels,
            }),
        )
    }

    pub fn undo_bounding_box_change(
        backend: Arc<dyn AnnotationBackend>,
        annotation_id: Uuid,
        previous_box: BoundingBox,
    ) -> Self {
        Self::new(
            "Move bounding box",
            GROUP_ANNOTATION_BOUNDING_BOX_CHANGE,
            Arc::new(RestoreBoundingBox {
                backend,
                annotation_id,
                bounding_box: previous_box,
            }),
        )
    }

    /// Undo for mask edits, including masks trimmed by overlap removal.
    pub fn undo_segmentation_change(
        backend: Arc<dyn AnnotationBackend>,
        previous: Vec<AnnotationUpdate>,
    ) -> Self {
        Self::new(
            format!("Edit {} segmentation mask(s)", previous.len()),
            GROUP_ANNOTATION_SEGMENTATION_CHANGE,
            Arc::new(RestoreSegmentation { backend, previous }),
        )
    }

    /// Run the inverse operation.
    pub async fn execute(&self) -> std::result::Result<(), BoxError> {
        self.inverse.execute().await
    }
}

/// Append-only history of reversible actions, newest last.
///
/// Holds at most `max_depth` actions; pushing beyond that evicts the oldest.
/// A depth of 0 keeps everything.
#[derive(Debug)]
pub struct UndoLedger {
    actions: VecDeque<ReversibleAction>,
    max_depth: usize,
}

impl UndoLedger {
    pub fn new(max_depth: usize) -> Self {
        UndoLedger {
            actions: VecDeque::new(),
            max_depth,
        }
    }

    pub fn from_params(params: &EditorParams) -> Self {
        Self::new(params.undo_depth)
    }

    pub fn push(&mut self, action: ReversibleAction) {
        self.actions.push_back(action);
        if self.max_depth > 0 && self.actions.len() > self.max_depth {
            self.actions.pop_front();
        }
    }

    /// Most recently added action, i.e. what undo would run next.
    pub fn latest(&self) -> Option<&ReversibleAction> {
        self.actions.back()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// All actions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ReversibleAction> {
        self.actions.iter()
    }

    pub fn iter_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> impl Iterator<Item = &'a ReversibleAction> + 'a {
        self.actions.iter().filter(move |a| a.group_id == group_id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<ReversibleAction> {
        let idx = self.actions.iter().position(|a| a.id == id)?;
        self.actions.remove(idx)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Pop and run the most recent action.
    ///
    /// Returns the consumed action, or `None` when the ledger is empty. If the
    /// inverse call fails the action is put back so the user can retry.
    pub async fn undo_latest(&mut self) -> Result<Option<ReversibleAction>> {
        let Some(action) = self.actions.pop_back() else {
            return Ok(None);
        };

        match action.execute().await {
            Ok(()) => {
                info!(description = %action.description, group = %action.group_id, "Undo applied");
                Ok(Some(action))
            }
            Err(source) => {
                warn!(description = %action.description, error = %source, "Undo failed");
                let description = action.description.clone();
                self.actions.push_back(action);
                Err(MaskError::UndoFailed {
                    description,
                    source,
                })
            }
        }
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnnotationKind, AnnotationLabel, Rle};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingBackend {
        fn record(&self, call: String) -> std::result::Result<(), BoxError> {
            if self.fail {
                return Err("backend unavailable".into());
            }
            self.calls.lock().push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AnnotationUpdater for RecordingBackend {
        async fn update_annotations(
            &self,
            updates: Vec<AnnotationUpdate>,
        ) -> std::result::Result<(), BoxError> {
            self.record(format!("update_annotations {}", updates.len()))
        }
    }

    #[async_trait]
    impl AnnotationBackend for RecordingBackend {
        async fn create_annotation(
            &self,
            annotation: Annotation,
        ) -> std::result::Result<(), BoxError> {
            self.record(format!("create {}", annotation.sample_id))
        }

        async fn delete_annotation(&self, annotation_id: Uuid) -> std::result::Result<(), BoxError> {
            self.record(format!("delete {annotation_id}"))
        }

        async fn update_annotation_labels(
            &self,
            labels: Vec<LabelAssignment>,
        ) -> std::result::Result<(), BoxError> {
            let names: Vec<&str> = labels.iter().map(|l| l.label_name.as_str()).collect();
            self.record(format!("labels {}", names.join(",")))
        }

        async fn update_bounding_box(
            &self,
            annotation_id: Uuid,
            bounding_box: BoundingBox,
        ) -> std::result::Result<(), BoxError> {
            self.record(format!("bbox {annotation_id} {}", bounding_box.x))
        }

        async fn refresh(&self) -> std::result::Result<(), BoxError> {
            self.record("refresh".to_string())
        }
    }

    fn detection(n: u128) -> Annotation {
        Annotation {
            sample_id: Uuid::from_u128(n),
            parent_sample_id: Uuid::from_u128(1000),
            annotation_label: AnnotationLabel {
                annotation_label_name: "car".into(),
            },
            kind: AnnotationKind::ObjectDetection {
                object_detection_details: BoundingBox::new(1, 2, 3, 4),
            },
        }
    }

    fn counting_action(counter: &Arc<AtomicUsize>, group: &str) -> ReversibleAction {
        let counter = Arc::clone(counter);
        ReversibleAction::from_fn("count", group, move || {
            let counter = Arc::clone(&counter);
            let fut: InverseFuture = Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            fut
        })
    }

    #[tokio::test]
    async fn test_undo_create_deletes_then_refreshes() {
        let backend = Arc::new(RecordingBackend::default());
        let ann = detection(1);
        let mut ledger = UndoLedger::default();
        ledger.push(ReversibleAction::undo_create(backend.clone(), &ann));

        assert_eq!(ledger.latest().unwrap().description, "Create car annotation");
        let undone = ledger.undo_latest().await.unwrap().unwrap();
        assert_eq!(undone.group_id, GROUP_ANNOTATION_CREATE);
        assert_eq!(
            backend.calls(),
            vec![format!("delete {}", ann.sample_id), "refresh".to_string()]
        );
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_undo_delete_recreates() {
        let backend = Arc::new(RecordingBackend::default());
        let ann = detection(2);
        let mut ledger = UndoLedger::default();
        ledger.push(ReversibleAction::undo_delete(backend.clone(), ann.clone()));
        ledger.undo_latest().await.unwrap();
        assert_eq!(backend.calls()[0], format!("create {}", ann.sample_id));
    }

    #[tokio::test]
    async fn test_undo_label_change_is_one_batched_call() {
        let backend = Arc::new(RecordingBackend::default());
        let previous = vec![
            LabelAssignment {
                annotation_id: Uuid::from_u128(1),
                label_name: "car".into(),
            },
            LabelAssignment {
                annotation_id: Uuid::from_u128(2),
                label_name: "bus".into(),
            },
        ];
        let action = ReversibleAction::undo_label_change(backend.clone(), previous);
        assert_eq!(action.description, "Change label of 2 annotations");
        action.execute().await.unwrap();
        assert_eq!(backend.calls(), vec!["labels car,bus", "refresh"]);
    }

    #[tokio::test]
    async fn test_undo_bounding_box_and_segmentation() {
        let backend = Arc::new(RecordingBackend::default());
        let id = Uuid::from_u128(7);
        let mut ledger = UndoLedger::default();
        ledger.push(ReversibleAction::undo_bounding_box_change(
            backend.clone(),
            id,
            BoundingBox::new(9, 0, 1, 1),
        ));
        ledger.push(ReversibleAction::undo_segmentation_change(
            backend.clone(),
            vec![AnnotationUpdate {
                annotation_id: id,
                collection_id: Uuid::from_u128(99),
                segmentation_mask: Rle(vec![0, 4]),
                bounding_box: Some(BoundingBox::new(0, 0, 4, 1)),
            }],
        ));

        ledger.undo_latest().await.unwrap();
        ledger.undo_latest().await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "update_annotations 1".to_string(),
                "refresh".to_string(),
                format!("bbox {id} 9"),
                "refresh".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_undo_runs_most_recent_first() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut ledger = UndoLedger::default();
        ledger.push(counting_action(&first, GROUP_ANNOTATION_CREATE));
        ledger.push(counting_action(&second, GROUP_ANNOTATION_DELETE));

        ledger.undo_latest().await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_undo_empty_ledger() {
        let mut ledger = UndoLedger::default();
        assert!(ledger.undo_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_action() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let mut ledger = UndoLedger::default();
        ledger.push(ReversibleAction::undo_create(backend, &detection(3)));

        let err = ledger.undo_latest().await.unwrap_err();
        assert!(matches!(err, MaskError::UndoFailed { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_depth_cap_evicts_oldest() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ledger = UndoLedger::new(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let action = counting_action(&counter, GROUP_ANNOTATION_CREATE);
            ids.push(action.id);
            ledger.push(action);
        }
        assert_eq!(ledger.len(), 3);
        let kept: Vec<Uuid> = ledger.iter().map(|a| a.id).collect();
        assert_eq!(kept, ids[2..].to_vec());
    }

    #[test]
    fn test_zero_depth_is_unbounded() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ledger = UndoLedger::new(0);
        for _ in 0..250 {
            ledger.push(counting_action(&counter, GROUP_ANNOTATION_CREATE));
        }
        assert_eq!(ledger.len(), 250);
    }

    #[test]
    fn test_group_filter_and_remove() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ledger = UndoLedger::default();
        ledger.push(counting_action(&counter, GROUP_ANNOTATION_CREATE));
        let delete = counting_action(&counter, GROUP_ANNOTATION_DELETE);
        let delete_id = delete.id;
        ledger.push(delete);
        ledger.push(counting_action(&counter, GROUP_ANNOTATION_CREATE));

        assert_eq!(ledger.iter_group(GROUP_ANNOTATION_CREATE).count(), 2);
        assert!(ledger.remove(delete_id).is_some());
        assert_eq!(ledger.iter_group(GROUP_ANNOTATION_DELETE).count(), 0);
        assert!(ledger.remove(delete_id).is_none());
        ledger.clear();
        assert!(ledger.is_empty());
    }
}
