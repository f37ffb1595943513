//! Legacy-API device surface over the `glnine-queue` cross-thread command
//! queue.
//!
//! This crate supplies the collaborators the queue core is generic over: a
//! driver function table ([`GlApi`]) with its context/surface binding
//! ([`GlContext`]), a [`Device`] that keeps producer-visible shadow state
//! consistent with the commands it submits, and shader program objects
//! whose compilation and teardown both travel through the queue.
//!
//! None of the translation here touches the driver directly; every driver
//! call is a [`glnine_queue::Command`] executed on the context thread.

mod device;
mod error;
mod gl;
mod shader;
mod trace;

pub use device::{Device, RenderState, RENDER_STATE_COUNT};
pub use error::DeviceError;
pub use gl::{
    BindError, ClearMask, ClearParams, GlApi, GlContext, MaterialParams, ProgramHandle,
    ShaderStage, StateToken, SurfaceHandle,
};
pub use shader::ShaderProgram;
pub use trace::{GlOp, OpLog, TraceGl};
