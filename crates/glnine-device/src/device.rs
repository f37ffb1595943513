//! The device facade: shadow state plus translation onto the queue.
//!
//! Every setter follows the same discipline: take the queue lock, write the
//! shadow field, then submit the matching driver command with
//! `send_and_unlock`, so no other producer's submission can land between
//! the shadow write and the command that realizes it. Getters are answered
//! from shadow state without a driver round trip.

use crate::error::DeviceError;
use crate::gl::{
    ClearParams, GlApi, GlContext, MaterialParams, ShaderStage, StateToken, SurfaceHandle,
};
use crate::shader::ShaderProgram;
use glnine_queue::{Command, CommandQueue, DEFAULT_CAPACITY};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shadowed legacy render states. Values keep their raw legacy `DWORD`
/// semantics (booleans are 0/1, enumerants keep their legacy numbering).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderState {
    ZEnable,
    FillMode,
    ShadeMode,
    ZWriteEnable,
    AlphaTestEnable,
    SrcBlend,
    DestBlend,
    CullMode,
    ZFunc,
    DitherEnable,
    AlphaBlendEnable,
    FogEnable,
    SpecularEnable,
    StencilEnable,
    ScissorTestEnable,
}

pub const RENDER_STATE_COUNT: usize = 15;

const ALL_RENDER_STATES: [RenderState; RENDER_STATE_COUNT] = [
    RenderState::ZEnable,
    RenderState::FillMode,
    RenderState::ShadeMode,
    RenderState::ZWriteEnable,
    RenderState::AlphaTestEnable,
    RenderState::SrcBlend,
    RenderState::DestBlend,
    RenderState::CullMode,
    RenderState::ZFunc,
    RenderState::DitherEnable,
    RenderState::AlphaBlendEnable,
    RenderState::FogEnable,
    RenderState::SpecularEnable,
    RenderState::StencilEnable,
    RenderState::ScissorTestEnable,
];

impl RenderState {
    fn index(self) -> usize {
        self as usize
    }

    /// Legacy device defaults.
    fn default_value(self) -> u32 {
        match self {
            RenderState::ZEnable => 1,
            RenderState::FillMode => 3,  // solid
            RenderState::ShadeMode => 2, // gouraud
            RenderState::ZWriteEnable => 1,
            RenderState::AlphaTestEnable => 0,
            RenderState::SrcBlend => 2,  // one
            RenderState::DestBlend => 1, // zero
            RenderState::CullMode => 3,  // counter-clockwise
            RenderState::ZFunc => 4,     // less-equal
            RenderState::DitherEnable => 0,
            RenderState::AlphaBlendEnable => 0,
            RenderState::FogEnable => 0,
            RenderState::SpecularEnable => 0,
            RenderState::StencilEnable => 0,
            RenderState::ScissorTestEnable => 0,
        }
    }

    /// The driver toggle this state maps to, for states translated as
    /// plain enables.
    fn toggle_token(self) -> Option<StateToken> {
        match self {
            RenderState::ZEnable => Some(StateToken::DepthTest),
            RenderState::DitherEnable => Some(StateToken::Dither),
            RenderState::AlphaBlendEnable => Some(StateToken::Blend),
            RenderState::StencilEnable => Some(StateToken::StencilTest),
            RenderState::ScissorTestEnable => Some(StateToken::ScissorTest),
            _ => None,
        }
    }
}

struct StateEnable {
    token: StateToken,
    enable: bool,
}

impl<A: GlApi> Command<GlContext<A>> for StateEnable {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        if self.enable {
            ctx.api.enable(self.token);
        } else {
            ctx.api.disable(self.token);
        }
    }
}

struct MaterialSet {
    material: MaterialParams,
}

impl<A: GlApi> Command<GlContext<A>> for MaterialSet {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        ctx.api.material(&self.material);
    }
}

struct ClearCmd {
    params: ClearParams,
}

impl<A: GlApi> Command<GlContext<A>> for ClearCmd {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        ctx.api.clear(&self.params);
    }
}

struct PresentCmd;

impl<A: GlApi> Command<GlContext<A>> for PresentCmd {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        ctx.api.present();
    }
}

/// One legacy device: a command queue bound to one driver context, plus the
/// producer-visible shadow of device state.
pub struct Device<A: GlApi> {
    queue: Arc<CommandQueue<GlContext<A>>>,
    render_state: [AtomicU32; RENDER_STATE_COUNT],
    material: Mutex<MaterialParams>,
    in_scene: AtomicBool,
}

impl<A: GlApi> std::fmt::Debug for Device<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("render_state", &self.render_state)
            .field("in_scene", &self.in_scene)
            .finish_non_exhaustive()
    }
}

impl<A: GlApi> Device<A> {
    /// Create the device and bring up its context thread.
    ///
    /// A spawn or bind failure is fatal: no device exists in a degraded
    /// mode.
    pub fn new(api: A, surface: SurfaceHandle) -> Result<Self, DeviceError> {
        let queue = Arc::new(CommandQueue::new(DEFAULT_CAPACITY));
        queue.init(GlContext::new(api, surface))?;
        Ok(Self {
            queue,
            render_state: std::array::from_fn(|i| {
                AtomicU32::new(ALL_RENDER_STATES[i].default_value())
            }),
            material: Mutex::new(MaterialParams::default()),
            in_scene: AtomicBool::new(false),
        })
    }

    fn lock_material(&self) -> MutexGuard<'_, MaterialParams> {
        match self.material.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Update a render state: shadow write and driver submission as one
    /// step.
    ///
    /// States without a translation are rejected (and the shadow left
    /// untouched), matching the legacy API's not-implemented reporting.
    pub fn set_render_state(&self, state: RenderState, value: u32) -> Result<(), DeviceError> {
        let Some(token) = state.toggle_token() else {
            return Err(DeviceError::UnsupportedRenderState(state));
        };
        let guard = self.queue.lock();
        self.render_state[state.index()].store(value, Ordering::Relaxed);
        guard.send_and_unlock(StateEnable {
            token,
            enable: value != 0,
        });
        Ok(())
    }

    /// Read a render state from shadow; never queues driver work.
    pub fn render_state(&self, state: RenderState) -> u32 {
        self.render_state[state.index()].load(Ordering::Relaxed)
    }

    pub fn set_material(&self, material: MaterialParams) {
        let guard = self.queue.lock();
        *self.lock_material() = material;
        guard.send_and_unlock(MaterialSet { material });
    }

    pub fn material(&self) -> MaterialParams {
        let guard = self.queue.lock();
        let material = *self.lock_material();
        guard.unlock();
        material
    }

    pub fn begin_scene(&self) -> Result<(), DeviceError> {
        if self.in_scene.swap(true, Ordering::AcqRel) {
            return Err(DeviceError::AlreadyInScene);
        }
        Ok(())
    }

    pub fn end_scene(&self) -> Result<(), DeviceError> {
        if !self.in_scene.swap(false, Ordering::AcqRel) {
            return Err(DeviceError::NotInScene);
        }
        Ok(())
    }

    pub fn clear(&self, params: ClearParams) {
        self.queue.send(ClearCmd { params });
    }

    /// Queue a buffer swap on the device's surface.
    pub fn present(&self) {
        self.queue.send(PresentCmd);
    }

    pub fn create_vertex_shader(&self, source: &str) -> Result<ShaderProgram<A>, DeviceError> {
        ShaderProgram::new(Arc::clone(&self.queue), ShaderStage::Vertex, source)
    }

    pub fn create_pixel_shader(&self, source: &str) -> Result<ShaderProgram<A>, DeviceError> {
        ShaderProgram::new(Arc::clone(&self.queue), ShaderStage::Pixel, source)
    }

    /// The device's queue, for resources that submit their own commands.
    pub fn queue(&self) -> &Arc<CommandQueue<GlContext<A>>> {
        &self.queue
    }
}

impl<A: GlApi> Drop for Device<A> {
    fn drop(&mut self) {
        // Full drain: teardown commands submitted by resources are executed
        // before the context is released.
        self.queue.deinit();
    }
}
