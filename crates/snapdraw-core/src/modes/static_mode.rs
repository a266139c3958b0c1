use super::{EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup};
use crate::actionable::ActionableDelta;
use crate::error::DrawResult;

/// Ignores all input; the map behaves as if no drawing were attached.
#[derive(Debug, Default)]
pub struct StaticMode;

impl StaticMode {
    pub const DESCRIPTOR: ModeDescriptor = ModeDescriptor::new(ModeClass::Static, EditTarget::None, None);

    pub fn setup(ctx: &mut ModeContext<'_>, _options: &ModeOptions) -> DrawResult<ModeSetup> {
        ctx.store().clear_selection();
        ctx.set_actionable(ActionableDelta::all(false, false, false));
        Ok(ModeSetup::Ready(Box::new(StaticMode)))
    }
}

impl Mode for StaticMode {}
