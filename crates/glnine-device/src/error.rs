use crate::device::RenderState;
use crate::gl::ShaderStage;
use glnine_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The shim has no driver translation for this render state.
    #[error("render state {0:?} is not translated")]
    UnsupportedRenderState(RenderState),
    /// The driver reported a null program handle; the link error was logged
    /// on the context thread.
    #[error("{stage:?} shader failed to compile")]
    ShaderCompile { stage: ShaderStage },
    #[error("begin_scene called while already in a scene")]
    AlreadyInScene,
    #[error("end_scene called outside a scene")]
    NotInScene,
}
