use kurbo::Point;
use serde_json::json;
use snapdraw_core::modes::{
    COINCIDENT_SELECT, DIRECT_SELECT, DRAW_LINE_STRING, DRAW_POINT, DRAW_POLYGON, MARQUEE,
    SIMPLE_SELECT, SPLIT, SPLIT_VERTICES, STATIC,
};
use snapdraw_core::{
    CoordPath, DrawEvent, DrawOptions, DrawSession, Feature, FeatureId, Geometry, InputEvent, Key,
    KeyEvent, LngLat, MapHost, MemoryGeometryService, MemoryHost, ModeOptions, PointerEvent,
    SnapOptions, TaskKind, UpdateAction, run_tasks,
};
use std::rc::Rc;

fn line(coords: &[(f64, f64)]) -> Geometry {
    Geometry::LineString(coords.iter().map(|&(lng, lat)| LngLat::new(lng, lat)).collect())
}

/// What the tiles render for the road.
fn road_snap() -> Geometry {
    line(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)])
}

/// Full-precision road geometry held by the backend.
fn road_source() -> Geometry {
    line(&[(0.0, 0.0), (5.0, 0.01), (10.0, 0.0)])
}

fn assert_close(a: LngLat, b: LngLat) {
    assert!(
        (a.lng - b.lng).abs() < 1e-9 && (a.lat - b.lat).abs() < 1e-9,
        "{a:?} != {b:?}"
    );
}

struct Fixture {
    host: Rc<MemoryHost>,
    service: Rc<MemoryGeometryService>,
    session: DrawSession,
}

fn fixture(snap_layers: &[&str]) -> Fixture {
    let host = Rc::new(MemoryHost::new());
    let mut road = Feature::new("r1", road_snap());
    road.properties.insert("id".to_string(), json!("road-1"));
    host.set_source_layer_data("roads", None, vec![road]);
    host.add_layer(
        serde_json::from_value(json!({"id": "roads", "type": "line", "source": "roads"})).unwrap(),
    );

    let service = Rc::new(MemoryGeometryService::default());
    service.insert_snap_geometry("road-1", road_snap());
    service.insert_source_geometry("road-1", road_source());

    let options = DrawOptions {
        snapping: SnapOptions {
            layers: snap_layers.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        },
        ..Default::default()
    };
    let session = DrawSession::new(host.clone(), service.clone(), options).unwrap();
    pollster::block_on(run_tasks(session.start().unwrap())).unwrap();
    Fixture {
        host,
        service,
        session,
    }
}

impl Fixture {
    fn pointer(&self, lng: f64, lat: f64, time_ms: u64) -> PointerEvent {
        let at = LngLat::new(lng, lat);
        PointerEvent::new(self.host.project(at), at, time_ms)
    }

    fn pointer_at_pixel(&self, x: f64, y: f64, time_ms: u64) -> PointerEvent {
        let point = Point::new(x, y);
        PointerEvent::new(point, self.host.unproject(point), time_ms)
    }

    fn send(&self, event: InputEvent) {
        let handled = self.session.handle(&event).unwrap();
        pollster::block_on(run_tasks(handled.tasks)).unwrap();
    }

    fn hover(&self, lng: f64, lat: f64, time_ms: u64) {
        self.send(InputEvent::MouseMove(self.pointer(lng, lat, time_ms)));
    }

    fn click(&self, lng: f64, lat: f64, time_ms: u64) {
        self.send(InputEvent::MouseDown(self.pointer(lng, lat, time_ms)));
        self.send(InputEvent::MouseUp(self.pointer(lng, lat, time_ms + 10)));
    }

    fn key_up(&self, key: Key) {
        self.send(InputEvent::KeyUp(KeyEvent::new(key)));
    }

    fn change_mode(&self, name: &str, options: ModeOptions) {
        let tasks = self.session.change_mode(name, options).unwrap();
        pollster::block_on(run_tasks(tasks)).unwrap();
    }
}

#[test]
fn test_polygon_vertices_refined_onto_source_geometry() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POLYGON, ModeOptions::default());
    f.session.drain_events();

    let approximations = [
        LngLat::new(0.0, 0.0),
        LngLat::new(5.0, 0.0),
        LngLat::new(8.0, 0.0),
    ];
    for (i, approx) in approximations.iter().enumerate() {
        let t = i as u64 * 100;
        f.hover(approx.lng, 0.02, t);
        f.click(approx.lng, 0.02, t + 10);
    }
    f.key_up(Key::Enter);

    let events = f.session.drain_events();
    let created: Vec<&Feature> = events
        .iter()
        .filter_map(|e| match e {
            DrawEvent::FeaturesCreated { features } => features.first(),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(f.session.current_mode().as_deref(), Some(SIMPLE_SELECT));

    let polygon = f.session.get(&created[0].id).unwrap();
    let Geometry::Polygon(rings) = polygon.geometry else {
        panic!("expected a polygon, got {:?}", polygon.geometry);
    };
    let ring = &rings[0];
    assert_eq!(ring.len(), 4, "three vertices plus closing vertex");
    assert_eq!(ring[0], ring[3]);

    let source = road_source();
    for (vertex, approx) in ring.iter().zip(approximations) {
        let expected = MemoryGeometryService::closest_point(&source, approx).unwrap();
        assert_close(*vertex, expected);
    }
    assert!(ring[1].lat > 0.005, "middle vertex follows the source geometry");
}

#[test]
fn test_point_refined_after_release() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POINT, ModeOptions::default());
    f.hover(3.0, 0.02, 0);
    f.click(3.0, 0.02, 10);

    let all = f.session.get_all();
    assert_eq!(all.len(), 1);
    let Geometry::Point(at) = all[0].geometry else {
        panic!("expected a point");
    };
    let expected = MemoryGeometryService::closest_point(&road_source(), LngLat::new(3.0, 0.0)).unwrap();
    assert_close(at, expected);
    assert_eq!(f.session.selected_ids(), vec![all[0].id.clone()]);
    assert!(!f.session.cursor_is_snapped());
}

fn only_point(f: &Fixture) -> LngLat {
    let all = f.session.get_all();
    assert_eq!(all.len(), 1);
    match all[0].geometry {
        Geometry::Point(at) => at,
        ref other => panic!("expected a point, got {other:?}"),
    }
}

#[test]
fn test_failed_lookup_retried_on_same_feature() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POINT, ModeOptions::default());

    f.service.set_unavailable(true);
    f.hover(3.0, 0.02, 0);
    f.service.set_unavailable(false);

    let before = f.service.request_count();
    f.hover(3.5, 0.02, 100);
    assert!(f.service.request_count() > before);

    f.click(3.5, 0.02, 110);
    let expected =
        MemoryGeometryService::closest_point(&road_source(), LngLat::new(3.5, 0.0)).unwrap();
    assert_close(only_point(&f), expected);
}

#[test]
fn test_press_inside_throttle_window_snaps() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POINT, ModeOptions::default());
    f.hover(3.0, 2.0, 1000);
    // Dropped by the throttle.
    f.hover(3.0, 0.02, 1008);
    f.click(3.0, 0.02, 2000);

    let expected =
        MemoryGeometryService::closest_point(&road_source(), LngLat::new(3.0, 0.0)).unwrap();
    assert_close(only_point(&f), expected);
}

#[test]
fn test_press_held_until_lookup_runs() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POINT, ModeOptions::default());

    let down = f
        .session
        .handle(&InputEvent::MouseDown(f.pointer(3.0, 0.02, 0)))
        .unwrap();
    assert_eq!(down.tasks.len(), 1);
    assert_eq!(down.tasks[0].kind, TaskKind::SnapLookup);
    let up = f
        .session
        .handle(&InputEvent::MouseUp(f.pointer(3.0, 0.02, 10)))
        .unwrap();
    assert!(up.tasks.is_empty());
    assert!(f.session.get_all().is_empty());

    pollster::block_on(run_tasks(down.tasks)).unwrap();
    let expected =
        MemoryGeometryService::closest_point(&road_source(), LngLat::new(3.0, 0.0)).unwrap();
    assert_close(only_point(&f), expected);
}

#[test]
fn test_resting_pointer_sampled_by_flush() {
    let f = fixture(&["roads"]);
    f.change_mode(DRAW_POINT, ModeOptions::default());
    f.hover(3.0, 2.0, 1000);
    f.hover(3.0, 0.02, 1008);
    assert!(f.session.flush_snap_sample(1010).is_empty());

    let tasks = f.session.flush_snap_sample(1016);
    assert_eq!(tasks.len(), 1);
    pollster::block_on(run_tasks(tasks)).unwrap();
    assert!(f.session.flush_snap_sample(1100).is_empty());
}

#[test]
fn test_events_queued_during_async_setup_are_replayed() {
    let host = Rc::new(MemoryHost::new());
    let service = Rc::new(MemoryGeometryService::default());
    service.insert_source_geometry("line-1", line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]));
    let session = DrawSession::new(host, service, DrawOptions::default()).unwrap();
    pollster::block_on(run_tasks(session.start().unwrap())).unwrap();

    let mut feature = Feature::new("a", line(&[(0.0, 0.0), (2.0, 0.0)]));
    feature.properties.insert("id".to_string(), json!("line-1"));
    let id = session.add(feature);

    let tasks = session
        .change_mode(
            DIRECT_SELECT,
            ModeOptions {
                coord_path: Some(CoordPath::new(vec![2])),
                ..ModeOptions::feature(id.clone())
            },
        )
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::ModeSetup);
    assert!(session.is_pending());

    let handled = session
        .handle(&InputEvent::KeyDown(KeyEvent::new(Key::Backspace)))
        .unwrap();
    assert!(handled.tasks.is_empty());
    assert_eq!(session.get(&id).unwrap().geometry, line(&[(0.0, 0.0), (2.0, 0.0)]));

    pollster::block_on(run_tasks(tasks)).unwrap();
    assert!(!session.is_pending());
    assert_eq!(session.get(&id).unwrap().geometry, line(&[(0.0, 0.0), (1.0, 0.0)]));
    assert!(session.drain_events().iter().any(|e| matches!(
        e,
        DrawEvent::FeaturesUpdated {
            action: UpdateAction::ChangeCoordinates,
            ..
        }
    )));
}

#[test]
fn test_failed_async_setup_falls_back_to_static() {
    let host = Rc::new(MemoryHost::new());
    let service = Rc::new(MemoryGeometryService::default());
    let session = DrawSession::new(host, service.clone(), DrawOptions::default()).unwrap();
    pollster::block_on(run_tasks(session.start().unwrap())).unwrap();

    let mut feature = Feature::new("a", line(&[(0.0, 0.0), (2.0, 0.0)]));
    feature.properties.insert("id".to_string(), json!("line-1"));
    let id = session.add(feature);

    service.set_unavailable(true);
    let tasks = session
        .change_mode(DIRECT_SELECT, ModeOptions::feature(id.clone()))
        .unwrap();
    pollster::block_on(run_tasks(tasks)).unwrap();

    // An unavailable backend keeps the rendered copy.
    assert_eq!(session.current_mode().as_deref(), Some(DIRECT_SELECT));
    assert_eq!(session.get(&id).unwrap().geometry, line(&[(0.0, 0.0), (2.0, 0.0)]));
}

#[test]
fn test_combine_and_uncombine_points() {
    let f = fixture(&[]);
    let a = f.session.add(Feature::new("a", Geometry::Point(LngLat::new(1.0, 1.0))));
    let b = f.session.add(Feature::new("b", Geometry::Point(LngLat::new(2.0, 2.0))));
    f.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![a, b]));
    assert!(f.session.actionable_state().combine_features);

    pollster::block_on(run_tasks(f.session.combine_features().unwrap())).unwrap();
    let all = f.session.get_all();
    assert_eq!(all.len(), 1);
    assert!(matches!(&all[0].geometry, Geometry::MultiPoint(points) if points.len() == 2));
    assert!(f.session.actionable_state().uncombine_features);

    pollster::block_on(run_tasks(f.session.uncombine_features().unwrap())).unwrap();
    assert_eq!(f.session.get_all().len(), 2);
    assert_eq!(f.session.selected_ids().len(), 2);

    let events = f.session.drain_events();
    assert!(events.iter().any(|e| matches!(e, DrawEvent::FeaturesCombined { deleted, .. } if deleted.len() == 2)));
    assert!(events.iter().any(|e| matches!(e, DrawEvent::FeaturesUncombined { created, .. } if created.len() == 2)));
}

#[test]
fn test_split_markers() {
    let f = fixture(&["roads"]);
    f.change_mode(SPLIT, ModeOptions::default());
    assert!(f.host.layer(SPLIT_VERTICES).is_some());

    f.hover(3.0, 0.02, 0);
    f.click(3.0, 0.02, 10);
    f.hover(7.0, 0.02, 100);
    f.click(7.0, 0.02, 110);
    assert_eq!(f.host.source_data(SPLIT_VERTICES).len(), 1);

    f.key_up(Key::Escape);
    assert!(f.host.layer(SPLIT_VERTICES).is_none());

    let markers: Vec<Option<Geometry>> = f
        .session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            DrawEvent::SplitPointsChanged { geometry } => Some(geometry),
            _ => None,
        })
        .collect();
    assert_eq!(markers.len(), 4);
    assert_eq!(markers[0], None);
    assert!(matches!(&markers[1], Some(Geometry::Point(p)) if (p.lng - 3.0).abs() < 1e-9));
    assert!(matches!(&markers[2], Some(Geometry::MultiPoint(points)) if points.len() == 2));
    assert_eq!(markers[3], None);
}

#[test]
fn test_split_ignores_unsnapped_click() {
    let f = fixture(&["roads"]);
    f.change_mode(SPLIT, ModeOptions::default());
    f.session.drain_events();
    f.click(3.0, 2.0, 0);
    assert!(!f
        .session
        .drain_events()
        .iter()
        .any(|e| matches!(e, DrawEvent::SplitPointsChanged { .. })));
}

#[test]
fn test_marquee_selects_features_in_box() {
    let f = fixture(&[]);
    let inside = f.session.add(Feature::new("in", Geometry::Point(LngLat::new(1.0, -1.0))));
    f.session.add(Feature::new("out", Geometry::Point(LngLat::new(3.0, -3.0))));
    f.change_mode(MARQUEE, ModeOptions::default());
    assert!(!f.host.drag_pan_enabled());

    f.send(InputEvent::MouseDown(f.pointer_at_pixel(50.0, 50.0, 0)));
    f.send(InputEvent::MouseMove(
        f.pointer_at_pixel(150.0, 150.0, 100).with_primary_held(true),
    ));
    assert_eq!(f.host.source_data("_marquee").len(), 1);
    f.send(InputEvent::MouseUp(f.pointer_at_pixel(150.0, 150.0, 200)));

    assert_eq!(f.session.current_mode().as_deref(), Some(SIMPLE_SELECT));
    assert_eq!(f.session.selected_ids(), vec![inside]);
    assert!(f.host.drag_pan_enabled());
    assert!(f.host.layer("_marquee").is_none());
}

#[test]
fn test_continue_line_from_end() {
    let f = fixture(&[]);
    let id = f.session.add(Feature::new("a", line(&[(0.0, 0.0), (1.0, 0.0)])));
    f.change_mode(
        DRAW_LINE_STRING,
        ModeOptions {
            from: Some(LngLat::new(1.0, 0.0)),
            ..ModeOptions::feature(id.clone())
        },
    );
    assert!(!f.host.double_click_zoom_enabled());
    f.session.drain_events();

    f.hover(2.0, 0.0, 0);
    f.click(2.0, 0.0, 10);
    f.key_up(Key::Enter);

    assert_eq!(
        f.session.get(&id).unwrap().geometry,
        line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])
    );
    assert!(f.host.double_click_zoom_enabled());
    let events = f.session.drain_events();
    assert!(events.iter().any(|e| matches!(e, DrawEvent::LineExtended { feature } if feature.id == id)));
    assert!(!events.iter().any(|e| matches!(e, DrawEvent::FeaturesCreated { .. })));
}

#[test]
fn test_continue_line_rejects_interior_vertex() {
    let f = fixture(&[]);
    let id = f.session.add(Feature::new("a", line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])));
    let result = f.session.change_mode(
        DRAW_LINE_STRING,
        ModeOptions {
            from: Some(LngLat::new(1.0, 0.0)),
            ..ModeOptions::feature(id)
        },
    );
    assert!(result.is_err());
    assert_eq!(f.session.current_mode().as_deref(), Some(STATIC));
}

#[test]
fn test_escape_abandons_new_line() {
    let f = fixture(&[]);
    f.change_mode(DRAW_LINE_STRING, ModeOptions::default());
    f.hover(0.0, 0.0, 0);
    f.click(0.0, 0.0, 10);
    f.hover(1.0, 0.0, 100);
    f.click(1.0, 0.0, 110);
    f.key_up(Key::Escape);

    assert!(f.session.get_all().is_empty());
    assert!(!f
        .session
        .drain_events()
        .iter()
        .any(|e| matches!(e, DrawEvent::FeaturesCreated { .. })));
}

#[test]
fn test_unknown_mode_and_action() {
    let f = fixture(&[]);
    assert!(f.session.change_mode("lasso", ModeOptions::default()).is_err());
    assert_eq!(f.session.current_mode().as_deref(), Some(SIMPLE_SELECT));
    assert!(f.session.actionable([("explode", true)]).is_err());
    assert!(f.session.actionable([("trash", true)]).is_ok());
    assert!(f.session.actionable_state().trash);
}

#[test]
fn test_delete_by_id() {
    let f = fixture(&[]);
    let id = f.session.add(Feature::new(FeatureId::new_v4(), Geometry::Point(LngLat::new(1.0, 1.0))));
    assert_eq!(f.session.delete(&[id.clone()]).len(), 1);
    assert!(f.session.get(&id).is_none());
}

impl Fixture {
    /// Press on `from`, drag to `to` and release.
    fn drag(&self, from: (f64, f64), to: (f64, f64), time_ms: u64) {
        self.send(InputEvent::MouseDown(self.pointer(from.0, from.1, time_ms)));
        let mid = ((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
        for (i, (lng, lat)) in [mid, to].into_iter().enumerate() {
            let t = time_ms + 20 * (i as u64 + 1);
            self.send(InputEvent::MouseMove(self.pointer(lng, lat, t).with_primary_held(true)));
        }
        self.send(InputEvent::MouseUp(self.pointer(to.0, to.1, time_ms + 60)));
    }
}

fn moved_lines(events: &[DrawEvent]) -> Vec<snapdraw_core::CoincidentLine> {
    events
        .iter()
        .find_map(|e| match e {
            DrawEvent::FeaturesUpdated {
                action: UpdateAction::Move,
                coincident,
                ..
            } => Some(coincident.clone()),
            _ => None,
        })
        .expect("a move update")
}

#[test]
fn test_coincident_line_vertex_follows_point() {
    let f = fixture(&[]);
    let id = f.session.add(Feature::new("pole", Geometry::Point(LngLat::new(10.0, 0.0))));
    f.change_mode(COINCIDENT_SELECT, ModeOptions::select(vec![id.clone()]));
    assert_eq!(f.session.current_mode().as_deref(), Some(COINCIDENT_SELECT));
    assert_eq!(f.session.selected_ids(), vec![id]);
    f.session.drain_events();

    f.drag((10.0, 0.0), (10.0, 1.0), 0);
    assert_eq!(only_point(&f), LngLat::new(10.0, 1.0));

    let lines = moved_lines(&f.session.drain_events());
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].feature_id, "road-1");
    assert_eq!(lines[0].layer_id, "roads");
    // The backend geometry is edited, not the rendered copy.
    assert_eq!(lines[0].geometry, line(&[(0.0, 0.0), (5.0, 0.01), (10.0, 1.0)]));
}

#[test]
fn test_coincident_select_ignores_lines_without_shared_vertex() {
    let f = fixture(&[]);
    let id = f.session.add(Feature::new("pole", Geometry::Point(LngLat::new(3.0, 0.0))));
    f.change_mode(COINCIDENT_SELECT, ModeOptions::select(vec![id]));
    f.session.drain_events();

    f.drag((3.0, 0.0), (3.0, 1.0), 0);
    assert_eq!(only_point(&f), LngLat::new(3.0, 1.0));
    assert!(moved_lines(&f.session.drain_events()).is_empty());
}
