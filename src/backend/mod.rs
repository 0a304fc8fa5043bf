//! Execution-space abstraction: a fixed capability set —
//! `launch_parallel_for`, `atomic_add`, `team_scratch`, `fence`,
//! `mirror_to_host` — selected at compile time rather than dispatched per
//! kernel launch. The CPU space runs on `rayon`; the GPU space is backed
//! by `cubecl`, using `#[cube(launch_unchecked)]` device kernels.

pub mod cpu;
pub mod gpu;

/// Tags the execution space a kernel call targets. A closed enumeration,
/// chosen once per call rather than dispatched per nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionSpace {
    Cpu,
    Gpu,
}

impl ExecutionSpace {
    pub fn is_gpu(self) -> bool {
        matches!(self, ExecutionSpace::Gpu)
    }
}
