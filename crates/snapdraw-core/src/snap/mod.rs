//! Snapping onto rendered map geometry.
//!
//! The engine keeps a set of invisible buffer layers in sync with the
//! snappable layers, picks a candidate under the pointer, resolves its
//! authoritative geometry asynchronously and corrects coordinates onto it.
//! Every async resumption is checked against a generation counter so late
//! results for an abandoned candidate are dropped.

pub mod buffer;
pub mod geometry;

pub use buffer::{BUFFER_PREFIX, buffer_layer, buffer_layer_id, strip_negated_clauses};
pub use geometry::{SnapTarget, VertexPull, resolve_snap_point};

use crate::config::SnapOptions;
use crate::events::{DrawEvent, Notifier};
use crate::geo::{Feature, FeatureId, Geometry, LngLat, haversine_m};
use crate::host::{
    FeatureRef, GeometryService, LayerKind, LayerSpec, MapHost, QueryArea, RenderedFeature,
    ServiceResult,
};
use crate::input::PointerEvent;
use crate::modes::{CommitPhase, EditTarget, ModeClass, ModeDescriptor};
use crate::store::FeatureStore;
use kurbo::Vec2;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Source and layer of the snap indicator.
pub const SNAP_VERTEX: &str = "_snap_vertex";

/// Feature-state key set on the hovered snap target.
pub const SNAP_HOVER: &str = "snap-hover";

/// Upper bound on line/area candidates fetched in one lookup.
pub const MAX_BATCH_CANDIDATES: usize = 50;

/// Decides whether a style layer is snappable.
pub type SnapLayerPredicate = Rc<dyn Fn(&LayerSpec) -> bool>;

/// Narrows the rendered candidates under the pointer.
pub type CandidateFilter = Rc<dyn Fn(&RenderedFeature) -> bool>;

/// Which layers can be snapped to.
#[derive(Clone)]
pub enum SnapLayers {
    List(Vec<String>),
    Predicate(SnapLayerPredicate),
}

impl fmt::Debug for SnapLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapLayers::List(ids) => f.debug_tuple("List").field(ids).finish(),
            SnapLayers::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Default for SnapLayers {
    fn default() -> Self {
        SnapLayers::List(Vec::new())
    }
}

/// Result of `snap_coord`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnappedCoord {
    pub lng_lat: LngLat,
    pub snapped: bool,
    pub feature: Option<FeatureRef>,
}

impl SnappedCoord {
    pub fn raw(lng_lat: LngLat) -> Self {
        Self {
            lng_lat,
            snapped: false,
            feature: None,
        }
    }
}

/// Pending geometry lookup for a new candidate.
#[derive(Debug, Clone)]
pub struct SnapLookup {
    pub generation: u64,
    /// Primary candidate first; several only for competing line/area candidates.
    pub candidates: Vec<RenderedFeature>,
    /// Pointer position and capture radius (meters) used to rank a batch.
    pub capture: Option<(LngLat, f64)>,
    id_property: String,
}

impl SnapLookup {
    /// Fetch the candidate geometry. A batch prefers the first candidate with
    /// a vertex inside the capture circle, else the first candidate.
    pub async fn resolve(
        &self,
        services: &dyn GeometryService,
    ) -> ServiceResult<Option<(FeatureRef, Geometry)>> {
        match (self.capture, self.candidates.as_slice()) {
            (Some((center, radius)), candidates) if candidates.len() > 1 => {
                let geometries = services.fetch_snap_geometries(candidates).await?;
                let mut fetched: Vec<(&RenderedFeature, Option<Geometry>)> =
                    candidates.iter().zip(geometries).collect();
                let chosen = fetched
                    .iter()
                    .position(|(_, g)| {
                        g.as_ref().is_some_and(|g| {
                            g.vertices().iter().any(|v| haversine_m(center, *v) <= radius)
                        })
                    })
                    .unwrap_or(0);
                if chosen >= fetched.len() {
                    return Ok(None);
                }
                let (candidate, geometry) = fetched.swap_remove(chosen);
                Ok(geometry.map(|g| (candidate.to_ref(&self.id_property), g)))
            }
            (_, [first, ..]) => {
                let geometry = services.fetch_snap_geometry(first).await?;
                Ok(geometry.map(|g| (first.to_ref(&self.id_property), g)))
            }
            (_, []) => Ok(None),
        }
    }
}

/// Pending replacement of an approximate snapped vertex with the
/// authoritative closest point.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// Draw feature holding the approximation.
    pub feature_id: FeatureId,
    /// Authoritative id of the snap target.
    pub target_id: String,
    pub approx: LngLat,
}

impl Refinement {
    /// Replace the approximation in the store. Returns false when the feature
    /// is gone or no longer holds the approximation.
    pub fn apply(&self, store: &mut FeatureStore, point: LngLat) -> bool {
        let holds = store
            .get(&self.feature_id)
            .is_some_and(|f| f.geometry.vertices().contains(&self.approx));
        if !holds {
            log::trace!("Discarding refinement for {}", self.feature_id);
            return false;
        }
        store
            .get_mut(&self.feature_id)
            .is_some_and(|f| f.geometry.replace_coordinate(self.approx, point) > 0)
    }
}

#[derive(Debug, Clone)]
struct LastSnap {
    approx: LngLat,
    feature: FeatureRef,
}

/// Real-time snapping state machine.
pub struct SnapEngine {
    host: Rc<dyn MapHost>,
    notifier: Notifier,
    options: SnapOptions,
    layers: SnapLayers,
    /// Root layer id to buffer layer id.
    buffers: BTreeMap<String, String>,
    enabled: bool,
    snap_to_selected: bool,
    candidate_filter: Option<CandidateFilter>,
    /// Primary candidate under the pointer.
    candidate: Option<FeatureRef>,
    /// Feature the resolved geometry belongs to.
    target: Option<FeatureRef>,
    geometry: Option<SnapTarget>,
    generation: u64,
    /// A lookup for the current generation is in flight.
    resolving: bool,
    last_sample_ms: Option<u64>,
    /// Newest sample dropped by the throttle.
    deferred: Option<PointerEvent>,
    last_snap: Option<LastSnap>,
    snapped: bool,
}

impl fmt::Debug for SnapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapEngine")
            .field("enabled", &self.enabled)
            .field("buffers", &self.buffers)
            .field("candidate", &self.candidate)
            .field("geometry", &self.geometry)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl SnapEngine {
    pub fn new(host: Rc<dyn MapHost>, notifier: Notifier, options: SnapOptions) -> Self {
        let layers = SnapLayers::List(options.layers.clone());
        Self {
            host,
            notifier,
            options,
            layers,
            buffers: BTreeMap::new(),
            enabled: false,
            snap_to_selected: false,
            candidate_filter: None,
            candidate: None,
            target: None,
            geometry: None,
            generation: 0,
            resolving: false,
            last_sample_ms: None,
            deferred: None,
            last_snap: None,
            snapped: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn candidate(&self) -> Option<&FeatureRef> {
        self.candidate.as_ref()
    }

    pub fn target_geometry(&self) -> Option<&SnapTarget> {
        self.geometry.as_ref()
    }

    /// Root layer id to buffer layer id.
    pub fn buffer_layers(&self) -> &BTreeMap<String, String> {
        &self.buffers
    }

    pub fn cursor_is_snapped(&self) -> bool {
        self.snapped
    }

    pub fn snap_to_selected(&self) -> bool {
        self.snap_to_selected
    }

    pub fn set_snap_to_selected(&mut self, value: bool) {
        self.snap_to_selected = value;
    }

    pub fn set_candidate_filter(&mut self, filter: Option<CandidateFilter>) {
        self.candidate_filter = filter;
    }

    /// Replace the snappable layer selection and resync buffers.
    pub fn set_snap_layers(&mut self, layers: SnapLayers) {
        self.layers = layers;
        self.sync_buffer_layers();
    }

    pub fn refresh_snap_layers(&mut self) {
        self.sync_buffer_layers();
    }

    /// Add the indicator and buffer layers and start snapping.
    pub fn enable_snapping(&mut self) {
        self.enabled = true;
        if !self.host.has_source(SNAP_VERTEX) {
            self.host.add_source(SNAP_VERTEX);
        }
        if self.host.layer(SNAP_VERTEX).is_none() {
            let mut paint = Map::new();
            paint.insert("circle-color".to_string(), Value::from("#f23c3c"));
            paint.insert("circle-radius".to_string(), Value::from(4.0));
            self.host.add_layer(LayerSpec {
                id: SNAP_VERTEX.to_string(),
                kind: LayerKind::Circle,
                source: SNAP_VERTEX.to_string(),
                source_layer: None,
                filter: None,
                paint,
            });
        }
        self.sync_buffer_layers();
        log::debug!("Snapping enabled with {} buffer layers", self.buffers.len());
    }

    /// Remove the indicator and buffer layers and stop snapping.
    pub fn disable_snapping(&mut self) {
        self.reset();
        for buffer in self.buffers.values() {
            self.host.remove_layer(buffer);
        }
        self.buffers.clear();
        self.host.remove_layer(SNAP_VERTEX);
        if self.host.has_source(SNAP_VERTEX) {
            self.host.remove_source(SNAP_VERTEX);
        }
        self.enabled = false;
        log::debug!("Snapping disabled");
    }

    fn snappable_layers(&self) -> Vec<LayerSpec> {
        let style = self.host.style_layers();
        match &self.layers {
            SnapLayers::List(ids) => ids
                .iter()
                .filter_map(|id| {
                    let layer = style.iter().find(|l| &l.id == id).cloned();
                    if layer.is_none() {
                        log::error!("Snap layer not found in style: {}", id);
                    }
                    layer
                })
                .collect(),
            SnapLayers::Predicate(predicate) => style
                .into_iter()
                .filter(|l| !l.id.starts_with("_snap_") && predicate(l))
                .collect(),
        }
    }

    /// Add, remove and re-filter buffer layers to match the snappable layers.
    pub fn sync_buffer_layers(&mut self) {
        if !self.enabled {
            return;
        }
        let roots = self.snappable_layers();
        let mut wanted = BTreeSet::new();
        for root in &roots {
            let Some(buffer) = buffer_layer(root, self.options.snap_distance_px) else {
                continue;
            };
            wanted.insert(root.id.clone());
            if self.host.layer(&buffer.id).is_some() {
                self.host.set_filter(&buffer.id, buffer.filter.clone());
            } else {
                self.host.add_layer(buffer.clone());
            }
            self.buffers.insert(root.id.clone(), buffer.id);
        }

        let stale: Vec<String> = self
            .buffers
            .keys()
            .filter(|root| !wanted.contains(*root))
            .cloned()
            .collect();
        for root in stale {
            if let Some(buffer) = self.buffers.remove(&root) {
                self.host.remove_layer(&buffer);
            }
        }
    }

    fn set_hover(&self, feature: &FeatureRef, on: bool) {
        if let Some(target) = feature.state_target() {
            self.host.set_feature_state(&target, SNAP_HOVER, on);
        }
    }

    fn clear_candidate(&mut self) {
        if let Some(previous) = self.target.take() {
            self.set_hover(&previous, false);
        }
        if self.candidate.is_some() || self.geometry.is_some() {
            self.generation += 1;
        }
        self.candidate = None;
        self.geometry = None;
        self.resolving = false;
    }

    /// Ground distance covered by the snap distance at the pointer.
    fn capture_radius_m(&self, event: &PointerEvent) -> f64 {
        let edge = self
            .host
            .unproject(event.point + Vec2::new(self.options.snap_distance_px, 0.0));
        haversine_m(self.host.unproject(event.point), edge)
    }

    fn throttled(&self, time_ms: u64) -> bool {
        self.last_sample_ms
            .is_some_and(|last| time_ms.saturating_sub(last) < self.options.throttle_ms)
    }

    /// Look for a snap candidate under the pointer.
    ///
    /// Returns a lookup when the candidate changed, or is still unresolved
    /// with no lookup in flight, and its geometry must be resolved. A sample
    /// inside the throttle window is kept and taken later by
    /// [`flush_deferred`](Self::flush_deferred).
    pub fn on_pointer_move(
        &mut self,
        event: &PointerEvent,
        descriptor: &ModeDescriptor,
        drag_panning: bool,
        selected: &[FeatureId],
    ) -> Option<SnapLookup> {
        if !self.enabled {
            return None;
        }
        if self.throttled(event.time_ms) {
            self.deferred = Some(event.clone());
            return None;
        }
        self.deferred = None;
        self.last_sample_ms = Some(event.time_ms);
        self.sample(event, descriptor, drag_panning, selected, false)
    }

    /// Sample the position of a press, ignoring the throttle. An unresolved
    /// candidate gets a fresh lookup even if one is already in flight.
    pub fn sample_press(
        &mut self,
        event: &PointerEvent,
        descriptor: &ModeDescriptor,
        drag_panning: bool,
        selected: &[FeatureId],
    ) -> Option<SnapLookup> {
        if !self.enabled {
            return None;
        }
        self.deferred = None;
        self.last_sample_ms = Some(event.time_ms);
        self.sample(event, descriptor, drag_panning, selected, true)
    }

    /// Whether a throttled sample is waiting for its window to close.
    pub fn has_deferred_sample(&self) -> bool {
        self.deferred.is_some()
    }

    /// Take the throttled sample once its window has closed at `now_ms`.
    pub fn flush_deferred(
        &mut self,
        now_ms: u64,
        descriptor: &ModeDescriptor,
        drag_panning: bool,
        selected: &[FeatureId],
    ) -> Option<SnapLookup> {
        if !self.enabled || self.throttled(now_ms) {
            return None;
        }
        let event = self.deferred.take()?;
        log::trace!("Sampling throttled pointer position from {} ms", event.time_ms);
        self.last_sample_ms = Some(now_ms);
        self.sample(&event, descriptor, drag_panning, selected, false)
    }

    fn sample(
        &mut self,
        event: &PointerEvent,
        descriptor: &ModeDescriptor,
        drag_panning: bool,
        selected: &[FeatureId],
        force: bool,
    ) -> Option<SnapLookup> {
        match descriptor.class {
            ModeClass::Static | ModeClass::GroupSelect | ModeClass::FreeDraw => return None,
            ModeClass::Select if drag_panning => return None,
            _ => {}
        }

        let layer_ids: Vec<String> = self.buffers.values().cloned().collect();
        let mut hits: Vec<RenderedFeature> = Vec::new();
        if !layer_ids.is_empty() {
            let id_property = &self.options.id_property;
            for hit in self
                .host
                .query_rendered_features(QueryArea::Point(event.point), Some(&layer_ids))
            {
                let excluded_selected = !self.snap_to_selected
                    && hit.id.as_ref().is_some_and(|id| selected.contains(id));
                let excluded_point =
                    descriptor.edits != EditTarget::Line && hit.kind().is_point_like();
                let filtered = self.candidate_filter.as_ref().is_some_and(|f| !f(&hit));
                let duplicate = hits
                    .iter()
                    .any(|h| h.to_ref(id_property).same_feature(&hit.to_ref(id_property)));
                if !(excluded_selected || excluded_point || filtered || duplicate) {
                    hits.push(hit);
                }
            }
        }

        let (points, others): (Vec<RenderedFeature>, Vec<RenderedFeature>) =
            hits.into_iter().partition(|h| h.kind().is_point_like());
        let Some(primary) = points.first().or(others.first()).cloned() else {
            self.clear_candidate();
            return None;
        };

        let primary_ref = primary.to_ref(&self.options.id_property);
        let unchanged = self
            .candidate
            .as_ref()
            .is_some_and(|c| c.same_feature(&primary_ref));
        if unchanged && (self.geometry.is_some() || (self.resolving && !force)) {
            return None;
        }

        if let Some(previous) = self.target.take() {
            self.set_hover(&previous, false);
        }
        self.geometry = None;
        self.generation += 1;
        self.resolving = true;
        self.candidate = Some(primary_ref);
        log::debug!(
            "Snap candidate {:?} in {} (generation {})",
            primary.id,
            primary.layer_id,
            self.generation
        );

        let (candidates, capture) = if primary.kind().is_point_like() || others.len() <= 1 {
            (vec![primary], None)
        } else {
            let capture = (event.lng_lat, self.capture_radius_m(event));
            (
                others.into_iter().take(MAX_BATCH_CANDIDATES).collect(),
                Some(capture),
            )
        };
        Some(SnapLookup {
            generation: self.generation,
            candidates,
            capture,
            id_property: self.options.id_property.clone(),
        })
    }

    /// Store the geometry resolved by a lookup. Stale results are dropped.
    pub fn apply_lookup(&mut self, generation: u64, resolved: Option<(FeatureRef, Geometry)>) {
        if generation != self.generation {
            log::trace!(
                "Discarding stale snap lookup (generation {} != {})",
                generation,
                self.generation
            );
            return;
        }
        self.resolving = false;
        let Some((feature, geometry)) = resolved else {
            log::debug!("Snap candidate left unresolved");
            return;
        };
        let Some(target) = SnapTarget::from_geometry(&geometry) else {
            return;
        };
        self.geometry = Some(target);
        self.set_hover(&feature, true);
        self.target = Some(feature);
    }

    /// Correct a pointer coordinate onto the resolved target.
    pub fn snap_coord(
        &mut self,
        event: &PointerEvent,
        exclude: Option<&dyn Fn(&FeatureRef) -> bool>,
    ) -> SnappedCoord {
        let resolved = match (&self.target, &self.geometry) {
            (Some(feature), Some(geometry)) if self.enabled => {
                Some((feature.clone(), geometry.clone()))
            }
            _ => None,
        }
        .filter(|(feature, _)| !exclude.is_some_and(|ex| ex(feature)));

        let Some((feature, target)) = resolved else {
            self.clear_snap_coord();
            self.snapped = false;
            self.last_snap = None;
            self.notifier.emit(DrawEvent::SnapChanged {
                snapped: false,
                feature: None,
            });
            return SnappedCoord::raw(event.lng_lat);
        };

        let pull = VertexPull {
            factor: self.options.vertex_pull_factor,
            capture_radius_m: self.capture_radius_m(event),
        };
        let at = resolve_snap_point(&target, event.lng_lat, &pull);
        if self.host.has_source(SNAP_VERTEX) {
            self.host
                .set_source_data(SNAP_VERTEX, vec![Feature::new(SNAP_VERTEX, Geometry::Point(at))]);
        }
        self.snapped = true;
        self.last_snap = Some(LastSnap {
            approx: at,
            feature: feature.clone(),
        });
        self.notifier.emit(DrawEvent::SnapChanged {
            snapped: true,
            feature: Some(feature.clone()),
        });
        SnappedCoord {
            lng_lat: at,
            snapped: true,
            feature: Some(feature),
        }
    }

    /// Prepare an authoritative closest-point correction of the last snapped
    /// coordinate, if the gesture just committed one.
    pub fn begin_refinement(
        &self,
        phase: CommitPhase,
        descriptor: &ModeDescriptor,
        edited: Option<&FeatureId>,
    ) -> Option<Refinement> {
        if !self.snapped || descriptor.commit != Some(phase) {
            return None;
        }
        let last = self.last_snap.as_ref()?;
        if last.feature.kind.is_point_like() || self.geometry.as_ref()?.is_point() {
            return None;
        }
        Some(Refinement {
            feature_id: edited?.clone(),
            target_id: last.feature.feature_id.clone()?,
            approx: last.approx,
        })
    }

    /// Empty the indicator source, if present.
    pub fn clear_snap_coord(&self) {
        if self.host.has_source(SNAP_VERTEX) {
            self.host.set_source_data(SNAP_VERTEX, Vec::new());
        }
    }

    /// Drop every piece of cached snap state.
    pub fn reset(&mut self) {
        if let Some(previous) = self.target.take() {
            self.set_hover(&previous, false);
        }
        self.candidate = None;
        self.geometry = None;
        self.generation += 1;
        self.resolving = false;
        self.last_sample_ms = None;
        self.deferred = None;
        self.last_snap = None;
        self.snapped = false;
        self.clear_snap_coord();
    }
}
