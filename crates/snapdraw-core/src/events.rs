//! Notifications emitted by the drawing core.

use crate::actionable::ActionableState;
use crate::geo::{Feature, Geometry};
use crate::host::FeatureRef;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Kind of change reported by `FeaturesUpdated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Move,
    ChangeCoordinates,
}

/// A host line whose shared vertex moved together with a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoincidentLine {
    /// Authoritative id of the line.
    pub feature_id: String,
    pub layer_id: String,
    pub geometry: Geometry,
}

/// Notification emitted to the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawEvent {
    ModeChanged {
        mode: String,
    },
    ActionableChanged {
        actions: ActionableState,
    },
    FeaturesCreated {
        features: Vec<Feature>,
    },
    FeaturesUpdated {
        action: UpdateAction,
        features: Vec<Feature>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        coincident: Vec<CoincidentLine>,
    },
    FeaturesDeleted {
        features: Vec<Feature>,
    },
    FeaturesCombined {
        created: Vec<Feature>,
        deleted: Vec<Feature>,
    },
    FeaturesUncombined {
        created: Vec<Feature>,
        deleted: Vec<Feature>,
    },
    SnapChanged {
        snapped: bool,
        feature: Option<FeatureRef>,
    },
    SplitPointsChanged {
        geometry: Option<Geometry>,
    },
    LineExtended {
        feature: Feature,
    },
}

impl DrawEvent {
    /// Events after which cached snap state must be dropped.
    pub fn resets_snapping(&self) -> bool {
        matches!(
            self,
            DrawEvent::ModeChanged { .. }
                | DrawEvent::FeaturesCreated { .. }
                | DrawEvent::FeaturesUpdated { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Queue {
    next_seq: u64,
    events: Vec<(u64, DrawEvent)>,
}

/// Shared, ordered queue of pending notifications.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    inner: Rc<RefCell<Queue>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: DrawEvent) {
        log::debug!("emit {:?}", event);
        let mut queue = self.inner.borrow_mut();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.events.push((seq, event));
    }

    /// Take every queued notification in emission order.
    pub fn drain(&self) -> Vec<DrawEvent> {
        self.inner
            .borrow_mut()
            .events
            .drain(..)
            .map(|(_, e)| e)
            .collect()
    }

    /// Sequence number of the next notification.
    pub fn mark(&self) -> u64 {
        self.inner.borrow().next_seq
    }

    /// Whether a still-queued notification emitted at or after `mark`
    /// matches `pred`.
    pub fn emitted_since(&self, mark: u64, pred: impl Fn(&DrawEvent) -> bool) -> bool {
        self.inner
            .borrow()
            .events
            .iter()
            .any(|(seq, e)| *seq >= mark && pred(e))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().events.is_empty()
    }
}
