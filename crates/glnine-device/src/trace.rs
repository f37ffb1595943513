//! A recording [`GlApi`] implementation.
//!
//! `TraceGl` performs no real driver work; it appends every call to a shared
//! log and hands out sequential program handles. Tests use it to assert
//! what reached the "driver" and in what order; it also doubles as a
//! diagnostics backend when no real context is available.

use crate::gl::{
    ClearMask, ClearParams, GlApi, MaterialParams, ProgramHandle, ShaderStage, StateToken,
    SurfaceHandle,
};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub enum GlOp {
    MakeCurrent(SurfaceHandle),
    ReleaseCurrent,
    Enable(StateToken),
    Disable(StateToken),
    Material(MaterialParams),
    CompileProgram {
        stage: ShaderStage,
        program: ProgramHandle,
    },
    DeleteProgram(ProgramHandle),
    Clear(ClearMask),
    Present,
}

/// Shared handle onto a [`TraceGl`]'s call log. Stays valid after the
/// driver itself has been moved onto the context thread.
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<GlOp>>>);

impl OpLog {
    pub fn snapshot(&self) -> Vec<GlOp> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn record(&self, op: GlOp) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(op);
    }
}

pub struct TraceGl {
    log: OpLog,
    next_program: u32,
    refuse_bind: bool,
}

impl Default for TraceGl {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceGl {
    pub fn new() -> Self {
        Self {
            log: OpLog::default(),
            next_program: 0,
            refuse_bind: false,
        }
    }

    /// A driver that rejects `make_current`, for exercising init failure.
    pub fn refusing_bind() -> Self {
        Self {
            refuse_bind: true,
            ..Self::new()
        }
    }

    /// Clone the call log before the driver moves onto the context thread.
    pub fn log(&self) -> OpLog {
        self.log.clone()
    }
}

impl GlApi for TraceGl {
    fn make_current(&mut self, surface: SurfaceHandle) -> bool {
        if self.refuse_bind {
            return false;
        }
        self.log.record(GlOp::MakeCurrent(surface));
        true
    }

    fn release_current(&mut self) {
        self.log.record(GlOp::ReleaseCurrent);
    }

    fn enable(&mut self, state: StateToken) {
        self.log.record(GlOp::Enable(state));
    }

    fn disable(&mut self, state: StateToken) {
        self.log.record(GlOp::Disable(state));
    }

    fn material(&mut self, params: &MaterialParams) {
        self.log.record(GlOp::Material(*params));
    }

    fn compile_program(&mut self, stage: ShaderStage, source: &str) -> ProgramHandle {
        // Source containing `#error` (or nothing at all) models a program
        // that fails to link.
        let program = if source.trim().is_empty() || source.contains("#error") {
            tracing::warn!(?stage, "program failed to link");
            ProgramHandle::NULL
        } else {
            self.next_program += 1;
            ProgramHandle(self.next_program)
        };
        self.log.record(GlOp::CompileProgram { stage, program });
        program
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.log.record(GlOp::DeleteProgram(program));
    }

    fn clear(&mut self, params: &ClearParams) {
        self.log.record(GlOp::Clear(params.mask));
    }

    fn present(&mut self) {
        self.log.record(GlOp::Present);
    }
}
