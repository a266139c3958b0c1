//! Draw feature storage and coordinate editing.

use crate::config::DRAW_SOURCE;
use crate::geo::{Feature, FeatureId, Geometry, LngLat};
use crate::host::MapHost;
use crate::modes::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Dotted index path to a vertex: `""` for a point, `"3"` for a line
/// vertex, `"0.3"` for a ring vertex, `"1.0.2"` for a multipolygon vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CoordPath(pub Vec<usize>);

impl CoordPath {
    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Index of the vertex within its line or ring.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Path to the enclosing line or ring.
    pub fn parent(&self) -> &[usize] {
        match self.0.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// Same line or ring, different vertex index.
    pub fn with_last(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        match indices.last_mut() {
            Some(last) => *last = index,
            None => indices.push(index),
        }
        Self(indices)
    }
}

impl fmt::Display for CoordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

impl From<CoordPath> for String {
    fn from(path: CoordPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for CoordPath {
    type Error = std::num::ParseIntError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for CoordPath {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split('.').map(str::parse).collect::<Result<Vec<_>, _>>().map(Self)
    }
}

impl Geometry {
    fn container(&self, path: &[usize]) -> Option<(&Vec<LngLat>, usize)> {
        match (self, path) {
            (Geometry::MultiPoint(v) | Geometry::LineString(v), [i]) => Some((v, *i)),
            (Geometry::MultiLineString(parts) | Geometry::Polygon(parts), [p, i]) => {
                parts.get(*p).map(|v| (v, *i))
            }
            (Geometry::MultiPolygon(polygons), [p, r, i]) => {
                polygons.get(*p)?.get(*r).map(|v| (v, *i))
            }
            _ => None,
        }
    }

    fn container_mut(&mut self, path: &[usize]) -> Option<(&mut Vec<LngLat>, usize)> {
        match (self, path) {
            (Geometry::MultiPoint(v) | Geometry::LineString(v), [i]) => Some((v, *i)),
            (Geometry::MultiLineString(parts) | Geometry::Polygon(parts), [p, i]) => {
                parts.get_mut(*p).map(|v| (v, *i))
            }
            (Geometry::MultiPolygon(polygons), [p, r, i]) => {
                polygons.get_mut(*p)?.get_mut(*r).map(|v| (v, *i))
            }
            _ => None,
        }
    }

    /// Vertex at `path`.
    pub fn coordinate(&self, path: &CoordPath) -> Option<LngLat> {
        if let Geometry::Point(p) = self {
            return path.0.is_empty().then_some(*p);
        }
        let (v, i) = self.container(&path.0)?;
        v.get(i).copied()
    }

    /// Move the vertex at `path`. Returns false if the path is invalid.
    pub fn update_coordinate(&mut self, path: &CoordPath, c: LngLat) -> bool {
        if let Geometry::Point(p) = self {
            if path.0.is_empty() {
                *p = c;
                return true;
            }
            return false;
        }
        match self.container_mut(&path.0) {
            Some((v, i)) if i < v.len() => {
                v[i] = c;
                true
            }
            _ => false,
        }
    }

    /// Insert a vertex before `path` (or append at its end).
    pub fn add_coordinate(&mut self, path: &CoordPath, c: LngLat) -> bool {
        match self.container_mut(&path.0) {
            Some((v, i)) if i <= v.len() => {
                v.insert(i, c);
                true
            }
            _ => false,
        }
    }

    pub fn remove_coordinate(&mut self, path: &CoordPath) -> bool {
        match self.container_mut(&path.0) {
            Some((v, i)) if i < v.len() => {
                v.remove(i);
                true
            }
            _ => false,
        }
    }

    /// Every vertex with its path, in document order.
    pub fn coord_paths(&self) -> Vec<(CoordPath, LngLat)> {
        let line = |prefix: &[usize], v: &[LngLat]| -> Vec<(CoordPath, LngLat)> {
            v.iter()
                .enumerate()
                .map(|(i, c)| {
                    let mut indices = prefix.to_vec();
                    indices.push(i);
                    (CoordPath(indices), *c)
                })
                .collect()
        };
        match self {
            Geometry::Point(p) => vec![(CoordPath::default(), *p)],
            Geometry::MultiPoint(v) | Geometry::LineString(v) => line(&[], v),
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => parts
                .iter()
                .enumerate()
                .flat_map(|(p, v)| line(&[p], v))
                .collect(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .enumerate()
                .flat_map(|(p, rings)| {
                    rings
                        .iter()
                        .enumerate()
                        .flat_map(|(r, v)| line(&[p, r], v))
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    /// Replace every vertex equal to `from` with `to`; returns the count.
    pub fn replace_coordinate(&mut self, from: LngLat, to: LngLat) -> usize {
        let mut count = 0;
        for (path, c) in self.coord_paths() {
            if c == from && self.update_coordinate(&path, to) {
                count += 1;
            }
        }
        count
    }

    /// Minimal shape sanity: lines need two vertices, open rings three.
    pub fn is_valid(&self) -> bool {
        let ring_ok = |r: &Vec<LngLat>| r.len() >= 3;
        match self {
            Geometry::Point(_) => true,
            Geometry::MultiPoint(v) => !v.is_empty(),
            Geometry::LineString(v) => v.len() >= 2,
            Geometry::MultiLineString(parts) => {
                !parts.is_empty() && parts.iter().all(|v| v.len() >= 2)
            }
            Geometry::Polygon(rings) => !rings.is_empty() && rings.iter().all(ring_ok),
            Geometry::MultiPolygon(polygons) => {
                !polygons.is_empty()
                    && polygons
                        .iter()
                        .all(|rings| !rings.is_empty() && rings.iter().all(ring_ok))
            }
        }
    }

    /// Strip closing vertices from polygon rings.
    pub fn open_rings(mut self) -> Self {
        let open = |ring: &mut Vec<LngLat>| {
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
        };
        match &mut self {
            Geometry::Polygon(rings) => rings.iter_mut().for_each(open),
            Geometry::MultiPolygon(polygons) => polygons.iter_mut().flatten().for_each(open),
            _ => {}
        }
        self
    }

    /// Append closing vertices to polygon rings.
    pub fn close_rings(mut self) -> Self {
        let close = |ring: &mut Vec<LngLat>| {
            if let Some(first) = ring.first().copied() {
                if ring.last() != Some(&first) {
                    ring.push(first);
                }
            }
        };
        match &mut self {
            Geometry::Polygon(rings) => rings.iter_mut().for_each(close),
            Geometry::MultiPolygon(polygons) => polygons.iter_mut().flatten().for_each(close),
            _ => {}
        }
        self
    }
}

/// The features being drawn, plus selection state.
#[derive(Debug, Default)]
pub struct FeatureStore {
    order: Vec<FeatureId>,
    features: HashMap<FeatureId, Feature>,
    selected: Vec<FeatureId>,
    selected_coords: Vec<(FeatureId, CoordPath)>,
    dirty: bool,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a feature. Polygon rings are stored open.
    pub fn add(&mut self, mut feature: Feature) -> FeatureId {
        feature.geometry = feature.geometry.open_rings();
        let id = feature.id.clone();
        if !self.features.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.features.insert(id.clone(), feature);
        self.dirty = true;
        id
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Mutable access; marks the store dirty.
    pub fn get_mut(&mut self, id: &FeatureId) -> Option<&mut Feature> {
        let feature = self.features.get_mut(id)?;
        self.dirty = true;
        Some(feature)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    pub fn ids(&self) -> Vec<FeatureId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Feature with closed polygon rings, as handed to the host application.
    pub fn export(&self, id: &FeatureId) -> Option<Feature> {
        self.features.get(id).map(|f| Feature {
            geometry: f.geometry.clone().close_rings(),
            ..f.clone()
        })
    }

    /// All features in insertion order, exported.
    pub fn get_all(&self) -> Vec<Feature> {
        self.order.iter().filter_map(|id| self.export(id)).collect()
    }

    /// Remove features, returning the exported copies of those that existed.
    pub fn delete(&mut self, ids: &[FeatureId]) -> Vec<Feature> {
        let removed: Vec<Feature> = ids.iter().filter_map(|id| self.export(id)).collect();
        for feature in &removed {
            self.features.remove(&feature.id);
            self.order.retain(|id| id != &feature.id);
            self.selected.retain(|id| id != &feature.id);
            self.selected_coords.retain(|(id, _)| id != &feature.id);
        }
        if !removed.is_empty() {
            self.dirty = true;
        }
        removed
    }

    pub fn select(&mut self, id: &FeatureId) {
        if self.contains(id) && !self.selected.contains(id) {
            self.selected.push(id.clone());
            self.dirty = true;
        }
    }

    pub fn deselect(&mut self, id: &FeatureId) {
        let before = self.selected.len();
        self.selected.retain(|s| s != id);
        if self.selected.len() != before {
            self.dirty = true;
        }
    }

    pub fn clear_selection(&mut self) {
        if !self.selected.is_empty() {
            self.selected.clear();
            self.dirty = true;
        }
    }

    pub fn is_selected(&self, id: &FeatureId) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_ids(&self) -> Vec<FeatureId> {
        self.selected.clone()
    }

    pub fn selected_features(&self) -> Vec<Feature> {
        self.selected.iter().filter_map(|id| self.export(id)).collect()
    }

    pub fn set_selected_coordinates(&mut self, coords: Vec<(FeatureId, CoordPath)>) {
        self.selected_coords = coords;
        self.dirty = true;
    }

    pub fn selected_coordinates(&self) -> &[(FeatureId, CoordPath)] {
        &self.selected_coords
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Push the display features of every draw feature to the draw source.
    pub fn render(&mut self, host: &dyn MapHost, mode: Option<&dyn Mode>) {
        let mut display = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let Some(mut feature) = self.export(id) else {
                continue;
            };
            let active = if self.is_selected(id) { "true" } else { "false" };
            feature.properties.insert("meta".to_string(), Value::from("feature"));
            feature.properties.insert("active".to_string(), Value::from(active));
            match mode {
                Some(mode) => mode.to_display_features(feature, &mut |f: Feature| display.push(f)),
                None => display.push(feature),
            }
        }
        if host.has_source(DRAW_SOURCE) {
            host.set_source_data(DRAW_SOURCE, display);
        }
        self.dirty = false;
    }
}
