//! The kernel-argument binding protocol for compute-shader dispatch.
//!
//! Shaders receive tensor metadata through a flat, vec4-aligned uniform
//! block: per declared dimension a `(stride_in_bytes, stride * step)` pair,
//! then the byte offset of the first element the window touches, then zero
//! padding up to the next multiple of four slots. The tensor's storage
//! buffer is bound separately to its binding point.
//!
//! Slot accounting is load-bearing: callers must advance by exactly
//! [`num_arguments_per_1d_tensor`] (etc.) per tensor when computing where a
//! subsequent tensor or trailing scalar argument lands — an off-by-one here
//! silently corrupts unrelated shader uniforms. This layout is paced in
//! lock-step with the compiled shader source, which is an external contract.

use crate::alloc::ceil_to_multiple;
use crate::tensor::TensorDescriptor;
use crate::window::Window;

/// Uniform slots are padded to vec4 granularity.
pub const UNIFORM_SLOT_ALIGNMENT: usize = 4;

/// Slots one tensor of `dims` declared dimensions consumes:
/// `1 + 2 * dims`, rounded up to the vec4 alignment.
pub fn num_arguments_per_tensor(dims: usize) -> usize {
    ceil_to_multiple(1 + 2 * dims, UNIFORM_SLOT_ALIGNMENT)
}

pub fn num_arguments_per_1d_tensor() -> usize {
    num_arguments_per_tensor(1)
}

pub fn num_arguments_per_2d_tensor() -> usize {
    num_arguments_per_tensor(2)
}

pub fn num_arguments_per_3d_tensor() -> usize {
    num_arguments_per_tensor(3)
}

/// Opaque handle to a device storage buffer, owned by the GPU runtime
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// One dispatch's argument block: packed uniform words plus the buffer
/// bindings that accompany them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelArgumentPack {
    words: Vec<u32>,
    bindings: Vec<(u32, BufferHandle)>,
}

impl KernelArgumentPack {
    pub fn new() -> Self {
        KernelArgumentPack::default()
    }

    /// The next free uniform slot; after N tensor arguments this equals the
    /// sum of their `num_arguments_per_*_tensor()` counts exactly.
    pub fn current_index(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn bindings(&self) -> &[(u32, BufferHandle)] {
        &self.bindings
    }

    pub fn add_1d_tensor_argument(
        &mut self,
        tensor: &TensorDescriptor,
        buffer: BufferHandle,
        binding_point: u32,
        window: &Window,
    ) {
        self.add_tensor_argument(1, tensor, buffer, binding_point, window);
    }

    pub fn add_2d_tensor_argument(
        &mut self,
        tensor: &TensorDescriptor,
        buffer: BufferHandle,
        binding_point: u32,
        window: &Window,
    ) {
        self.add_tensor_argument(2, tensor, buffer, binding_point, window);
    }

    pub fn add_3d_tensor_argument(
        &mut self,
        tensor: &TensorDescriptor,
        buffer: BufferHandle,
        binding_point: u32,
        window: &Window,
    ) {
        self.add_tensor_argument(3, tensor, buffer, binding_point, window);
    }

    /// Appends one trailing scalar argument, unpadded.
    pub fn add_scalar_argument(&mut self, value: u32) {
        self.words.push(value);
    }

    fn add_tensor_argument(
        &mut self,
        dims: usize,
        tensor: &TensorDescriptor,
        buffer: BufferHandle,
        binding_point: u32,
        window: &Window,
    ) {
        debug_assert_eq!(
            self.words.len() % UNIFORM_SLOT_ALIGNMENT,
            0,
            "tensor arguments must start vec4-aligned"
        );

        let strides = tensor.strides_in_bytes();
        for d in 0..dims {
            let stride = strides.get(d) as u32;
            self.words.push(stride);
            self.words.push(stride * window.dimension(d).step() as u32);
        }

        // First element the window touches, not the tensor origin
        let mut offset = tensor.offset_first_element_in_bytes() as isize;
        for d in 0..dims {
            offset += window.dimension(d).start() * strides.get(d) as isize;
        }
        self.words.push(offset as u32);

        while self.words.len() % UNIFORM_SLOT_ALIGNMENT != 0 {
            self.words.push(0);
        }

        self.bindings.push((binding_point, buffer));
    }
}
