//! Which toolbar actions currently apply.

use crate::error::{DrawError, DrawResult};
use serde::{Deserialize, Serialize};

/// Availability of the trash, combine and uncombine actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableState {
    pub trash: bool,
    pub combine_features: bool,
    pub uncombine_features: bool,
}

/// A partial update; `None` leaves the flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableDelta {
    pub trash: Option<bool>,
    pub combine_features: Option<bool>,
    pub uncombine_features: Option<bool>,
}

impl ActionableDelta {
    /// Build a delta from string keys. Unknown keys are an error.
    pub fn from_pairs<'a, I>(pairs: I) -> DrawResult<Self>
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut delta = Self::default();
        for (key, value) in pairs {
            match key {
                "trash" => delta.trash = Some(value),
                "combine_features" | "combineFeatures" => delta.combine_features = Some(value),
                "uncombine_features" | "uncombineFeatures" => {
                    delta.uncombine_features = Some(value)
                }
                other => return Err(DrawError::UnknownAction(other.to_string())),
            }
        }
        Ok(delta)
    }

    pub fn trash(value: bool) -> Self {
        Self {
            trash: Some(value),
            ..Default::default()
        }
    }

    /// Set all three flags at once.
    pub fn all(trash: bool, combine: bool, uncombine: bool) -> Self {
        Self {
            trash: Some(trash),
            combine_features: Some(combine),
            uncombine_features: Some(uncombine),
        }
    }
}

impl ActionableState {
    /// Apply a delta, returning whether any value changed.
    pub fn apply(&mut self, delta: &ActionableDelta) -> bool {
        let before = *self;
        if let Some(v) = delta.trash {
            self.trash = v;
        }
        if let Some(v) = delta.combine_features {
            self.combine_features = v;
        }
        if let Some(v) = delta.uncombine_features {
            self.uncombine_features = v;
        }
        before != *self
    }
}
