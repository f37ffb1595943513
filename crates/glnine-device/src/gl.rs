//! The driver-facing surface of the shim.
//!
//! [`GlApi`] is the function table every translated operation ultimately
//! calls. It is only ever invoked from the context thread; the queue core
//! guarantees that by moving the whole [`GlContext`] onto that thread.

use bitflags::bitflags;
use glnine_queue::BindContext;
use thiserror::Error;

bitflags! {
    /// Buffer selection for [`GlApi::clear`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Driver-side program object handle.
///
/// Zero is the null handle; a compilation that fails to link reports it by
/// producing `NULL`, which is also what a `send_sync` caller inspects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

impl ProgramHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Driver state that is toggled on or off as a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateToken {
    DepthTest,
    Dither,
    Blend,
    ScissorTest,
    StencilTest,
}

/// Fixed-function material parameters, captured by value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub shininess: f32,
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub specular: [f32; 4],
    pub emissive: [f32; 4],
}

impl Default for MaterialParams {
    /// The legacy default material: opaque white diffuse, everything else
    /// black.
    fn default() -> Self {
        Self {
            shininess: 0.0,
            diffuse: [1.0, 1.0, 1.0, 1.0],
            ambient: [0.0, 0.0, 0.0, 0.0],
            specular: [0.0, 0.0, 0.0, 0.0],
            emissive: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearParams {
    pub mask: ClearMask,
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

/// Opaque window/surface handle supplied by the embedder at device
/// creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// The minimal driver function table the shim issues calls against.
///
/// Implementations wrap a real loader out of tree; [`TraceGl`]
/// (`crate::TraceGl`) records calls for tests and diagnostics.
pub trait GlApi: Send + 'static {
    /// Bind the driver context to `surface` on the calling thread. Returns
    /// false if the driver refuses.
    fn make_current(&mut self, surface: SurfaceHandle) -> bool;

    /// Release the binding established by `make_current`.
    fn release_current(&mut self);

    fn enable(&mut self, state: StateToken);
    fn disable(&mut self, state: StateToken);

    fn material(&mut self, params: &MaterialParams);

    /// Compile and link a program for `stage`. Link failures are logged by
    /// the driver and reported as [`ProgramHandle::NULL`].
    fn compile_program(&mut self, stage: ShaderStage, source: &str) -> ProgramHandle;

    fn delete_program(&mut self, program: ProgramHandle);

    fn clear(&mut self, params: &ClearParams);
    fn present(&mut self);
}

#[derive(Debug, Error)]
#[error("driver refused to make the context current on {surface:?}")]
pub struct BindError {
    pub surface: SurfaceHandle,
}

/// A driver function table paired with its target surface: the value the
/// command queue moves onto the context thread at `init`.
pub struct GlContext<A: GlApi> {
    pub api: A,
    surface: SurfaceHandle,
}

impl<A: GlApi> GlContext<A> {
    pub fn new(api: A, surface: SurfaceHandle) -> Self {
        Self { api, surface }
    }
}

impl<A: GlApi> BindContext for GlContext<A> {
    type BindError = BindError;

    fn bind(&mut self) -> Result<(), BindError> {
        if self.api.make_current(self.surface) {
            Ok(())
        } else {
            Err(BindError {
                surface: self.surface,
            })
        }
    }

    fn release(&mut self) {
        self.api.release_current();
    }
}
