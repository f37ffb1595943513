//! Shader program objects.
//!
//! Compilation must produce a driver-side handle before the caller can
//! report success, so it goes through `send_sync` with a shared output
//! slot. Teardown is the opposite: the driver object may only be deleted on
//! the context thread, so dropping a program *submits* the delete rather
//! than performing it.

use crate::error::DeviceError;
use crate::gl::{GlApi, GlContext, ProgramHandle, ShaderStage};
use glnine_queue::{Command, CommandQueue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Output slot a compile command fills in on the context thread.
///
/// Stays [`ProgramHandle::NULL`] until the command has run (and forever, if
/// the program fails to link or the command never executes).
#[derive(Default)]
pub(crate) struct ProgramSlot {
    program: AtomicU32,
}

impl ProgramSlot {
    pub(crate) fn set(&self, program: ProgramHandle) {
        self.program.store(program.0, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> ProgramHandle {
        ProgramHandle(self.program.load(Ordering::SeqCst))
    }
}

pub(crate) struct CompileProgram {
    pub(crate) stage: ShaderStage,
    pub(crate) source: String,
    pub(crate) slot: Arc<ProgramSlot>,
}

impl<A: GlApi> Command<GlContext<A>> for CompileProgram {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        let program = ctx.api.compile_program(self.stage, &self.source);
        if program.is_null() {
            tracing::warn!(stage = ?self.stage, "program compilation failed");
        } else {
            tracing::debug!(stage = ?self.stage, program = program.0, "program compiled");
        }
        self.slot.set(program);
    }
}

pub(crate) struct DeleteProgram {
    pub(crate) program: ProgramHandle,
}

impl<A: GlApi> Command<GlContext<A>> for DeleteProgram {
    fn execute(&mut self, ctx: &mut GlContext<A>) {
        ctx.api.delete_program(self.program);
    }
}

/// A compiled driver program owned by the application.
pub struct ShaderProgram<A: GlApi> {
    queue: Arc<CommandQueue<GlContext<A>>>,
    stage: ShaderStage,
    program: ProgramHandle,
}

impl<A: GlApi> std::fmt::Debug for ShaderProgram<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("stage", &self.stage)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl<A: GlApi> ShaderProgram<A> {
    pub(crate) fn new(
        queue: Arc<CommandQueue<GlContext<A>>>,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self, DeviceError> {
        let slot = Arc::new(ProgramSlot::default());
        queue.send_sync(CompileProgram {
            stage,
            source: source.to_owned(),
            slot: Arc::clone(&slot),
        });

        let program = slot.get();
        if program.is_null() {
            // The driver logged the link error; the queue stays usable.
            return Err(DeviceError::ShaderCompile { stage });
        }
        Ok(Self {
            queue,
            stage,
            program,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn handle(&self) -> ProgramHandle {
        self.program
    }
}

impl<A: GlApi> Drop for ShaderProgram<A> {
    fn drop(&mut self) {
        // Resource release is a submitted operation: the driver object is
        // freed when this command executes, never from this thread.
        let accepted = self.queue.try_send(DeleteProgram {
            program: self.program,
        });
        if !accepted {
            tracing::warn!(
                program = self.program.0,
                stage = ?self.stage,
                "program dropped after queue shutdown; driver object leaked"
            );
        }
    }
}
