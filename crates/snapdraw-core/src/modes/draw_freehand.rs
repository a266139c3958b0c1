use super::{EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup, SIMPLE_SELECT};
use crate::cursor::{Cursor, HoverFacts};
use crate::error::DrawResult;
use crate::events::DrawEvent;
use crate::geo::{Feature, FeatureId, Geometry};
use crate::input::PointerEvent;
use kurbo::Point;
use std::rc::Rc;

/// Simplification tolerance in pixels.
const TOLERANCE_PX: f64 = 2.0;

/// Traces a polygon while the pointer is held.
#[derive(Debug, Default)]
pub struct DrawFreehand {
    /// Pixel trace of the current stroke.
    trace: Option<Vec<Point>>,
}

impl DrawFreehand {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::FreeDraw, EditTarget::None, None);

    pub fn setup(ctx: &mut ModeContext<'_>, _options: &ModeOptions) -> DrawResult<ModeSetup> {
        ctx.store().clear_selection();
        ctx.host().set_drag_pan(false);
        ctx.host().set_double_click_zoom(false);
        ctx.set_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        Ok(ModeSetup::Ready(Box::new(DrawFreehand::default())))
    }

    fn begin(&mut self, e: &PointerEvent) {
        self.trace = Some(vec![e.point]);
    }

    fn extend(&mut self, e: &PointerEvent) {
        if let Some(trace) = self.trace.as_mut() {
            if trace.last() != Some(&e.point) {
                trace.push(e.point);
            }
        }
    }

    fn end(&mut self, ctx: &mut ModeContext<'_>) {
        let Some(trace) = self.trace.take() else {
            return;
        };
        let simplified = rdp_simplify(&trace, TOLERANCE_PX);
        if simplified.len() < 3 {
            log::debug!("Freehand stroke too short, discarding");
            return;
        }
        let ring = simplified.into_iter().map(|p| ctx.host().unproject(p)).collect();
        let geometry = Geometry::Polygon(vec![ring]).open_rings();
        if !geometry.is_valid() {
            return;
        }
        let id = ctx.store().add(Feature::new(FeatureId::new_v4(), geometry));
        let features: Vec<Feature> = ctx.store().export(&id).into_iter().collect();
        ctx.emit(DrawEvent::FeaturesCreated { features });
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![id]));
    }
}

/// Douglas-Peucker simplification of a pixel path.
fn rdp_simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];

    let (max_index, max_dist) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, p)| (i + 1, perpendicular_distance(*p, first, last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_dist > tolerance {
        let mut left = rdp_simplify(&points[..=max_index], tolerance);
        let right = rdp_simplify(&points[max_index..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

fn perpendicular_distance(point: Point, start: Point, end: Point) -> f64 {
    let base = end - start;
    let length = base.hypot();
    if length < f64::EPSILON {
        return (point - start).hypot();
    }
    (point - start).cross(base).abs() / length
}

impl Mode for DrawFreehand {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        self.trace = None;
        ctx.host().set_drag_pan(true);
        ctx.host().set_double_click_zoom(true);
        Ok(())
    }

    fn on_mouse_down(&mut self, _ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.begin(e);
        Ok(())
    }

    fn on_touch_start(&mut self, _ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.begin(e);
        Ok(())
    }

    fn on_drag(&mut self, _ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.extend(e);
        Ok(())
    }

    fn on_mouse_up(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.extend(e);
        self.end(ctx);
        Ok(())
    }

    fn on_touch_end(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.extend(e);
        self.end(ctx);
        Ok(())
    }

    fn on_click(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.trace = None;
        Ok(())
    }

    fn on_tap(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.trace = None;
        Ok(())
    }
}
