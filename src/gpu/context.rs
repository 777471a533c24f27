//! Caller-owned GPU runtime context.
//!
//! There is deliberately no process-wide singleton here: the context object
//! owns the compiled-program cache and the recorded command stream, and is
//! passed by reference to every GPU kernel. Shader compilation itself is an
//! external service behind [`ProgramCompiler`].
//!
//! Ordering between dependent dispatches (one kernel reading another's
//! output) is caller-enforced: insert [`GpuRuntimeContext::memory_barrier`]
//! between them, nothing is automatic.

use std::collections::{BTreeSet, HashMap};

use super::args::KernelArgumentPack;

/// Ordered set of `#define`-style build options; iteration order is
/// deterministic so program-cache keys are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildOptions {
    options: BTreeSet<String>,
}

impl BuildOptions {
    pub fn new() -> Self {
        BuildOptions::default()
    }

    pub fn add(&mut self, option: impl Into<String>) {
        self.options.insert(option.into());
    }

    pub fn contains(&self, option: &str) -> bool {
        self.options.contains(option)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Opaque handle to a compiled program, owned by the compile service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// The external shader-compilation service.
pub trait ProgramCompiler {
    fn compile(&mut self, kernel_name: &str, build_options: &BuildOptions) -> ProgramHandle;
}

/// A [`ProgramCompiler`] handing out sequential handles; stands in for the
/// real compile service in tests and demos.
#[derive(Debug, Default)]
pub struct SequentialCompiler {
    next: u64,
}

impl ProgramCompiler for SequentialCompiler {
    fn compile(&mut self, _kernel_name: &str, _build_options: &BuildOptions) -> ProgramHandle {
        let handle = ProgramHandle(self.next);
        self.next += 1;
        handle
    }
}

/// Compute-shader dispatch extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub global: [usize; 3],
    pub local: [usize; 3],
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCommand {
    Dispatch {
        program: ProgramHandle,
        ndrange: NdRange,
        arguments: KernelArgumentPack,
    },
    MemoryBarrier,
}

/// Program cache plus recorded command stream.
pub struct GpuRuntimeContext {
    compiler: Box<dyn ProgramCompiler>,
    cache: HashMap<(String, BuildOptions), ProgramHandle>,
    commands: Vec<GpuCommand>,
}

impl GpuRuntimeContext {
    pub fn new(compiler: Box<dyn ProgramCompiler>) -> Self {
        GpuRuntimeContext {
            compiler,
            cache: HashMap::new(),
            commands: Vec::new(),
        }
    }

    /// Returns the compiled program for `(kernel_name, build_options)`,
    /// compiling on the first request and caching thereafter.
    pub fn load_program(&mut self, kernel_name: &str, build_options: &BuildOptions) -> ProgramHandle {
        let key = (kernel_name.to_string(), build_options.clone());
        if let Some(&program) = self.cache.get(&key) {
            return program;
        }
        let program = self.compiler.compile(kernel_name, build_options);
        self.cache.insert(key, program);
        program
    }

    pub fn num_cached_programs(&self) -> usize {
        self.cache.len()
    }

    /// Records one compute dispatch.
    pub fn dispatch(&mut self, program: ProgramHandle, ndrange: NdRange, arguments: KernelArgumentPack) {
        self.commands.push(GpuCommand::Dispatch {
            program,
            ndrange,
            arguments,
        });
    }

    /// Records a shader-storage barrier; required between dependent
    /// dispatches.
    pub fn memory_barrier(&mut self) {
        self.commands.push(GpuCommand::MemoryBarrier);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_cache_compiles_once_per_key() {
        let mut ctx = GpuRuntimeContext::new(Box::<SequentialCompiler>::default());

        let mut opts = BuildOptions::new();
        opts.add("#define POOL_MAX");

        let a = ctx.load_program("pooling_layer_3", &opts);
        let b = ctx.load_program("pooling_layer_3", &opts);
        assert_eq!(a, b);
        assert_eq!(ctx.num_cached_programs(), 1);

        // Different options are a different program
        let mut opts2 = opts.clone();
        opts2.add("#define EXCLUDE_PADDING");
        let c = ctx.load_program("pooling_layer_3", &opts2);
        assert_ne!(a, c);
        assert_eq!(ctx.num_cached_programs(), 2);
    }

    #[test]
    fn test_command_stream_preserves_barrier_order() {
        let mut ctx = GpuRuntimeContext::new(Box::<SequentialCompiler>::default());
        let program = ctx.load_program("gemm_interleave", &BuildOptions::new());

        let range = NdRange {
            global: [4, 4, 1],
            local: [1, 1, 1],
        };
        ctx.dispatch(program, range, KernelArgumentPack::new());
        ctx.memory_barrier();
        ctx.dispatch(program, range, KernelArgumentPack::new());

        let commands = ctx.commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[1], GpuCommand::MemoryBarrier));
    }

    #[test]
    fn test_build_options_iterate_deterministically() {
        let mut opts = BuildOptions::new();
        opts.add("#define B");
        opts.add("#define A");
        opts.add("#define B");

        let collected: Vec<&str> = opts.iter().collect();
        assert_eq!(collected, vec!["#define A", "#define B"]);
    }
}
