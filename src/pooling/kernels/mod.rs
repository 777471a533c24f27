//! Numeric kernel payloads and their fixed calling contracts.
//!
//! Kernels are plain `unsafe fn`s behind function pointers; the adapters in
//! [`super::generic`] and [`super::direct`] prepare every pointer they
//! dereference. Two contracts exist:
//!
//! * **Generic**: `(window_cells, n_valid_cells, n_channels, inptrs,
//!   outptr)` — `inptrs` holds exactly `n_valid_cells` pointers, each valid
//!   for `n_channels` reads; one output pixel of `n_channels` elements is
//!   written; `window_cells` is the average divisor.
//! * **Direct**: `(n_channels, inptrs, outptrs)` — the full native input
//!   patch and output tile as pointer arrays, every pointer
//!   unconditionally dereferenceable (padded cells point at prepared
//!   buffers).
//!
//! All pointers are valid only for the duration of a single call and point
//! either into caller-owned tensors or into the calling thread's
//! working-space slice.

use super::Requantize32;

/// Generic pooling kernel entry point.
pub type GenericKernelFn<T> =
    unsafe fn(window_cells: u64, n_valid_cells: u64, n_channels: u64, *const *const T, *mut T);

/// Generic pooling kernel with a requantization output stage.
pub type GenericQuantKernelFn<T> = unsafe fn(
    window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    *const *const T,
    *mut T,
    &Requantize32,
);

/// Direct (native-tile) pooling kernel entry point.
pub type DirectKernelFn<T> = unsafe fn(n_channels: u64, *const *const T, *const *mut T);

pub mod scalar;

#[cfg(all(avx2, target_arch = "x86_64"))]
pub mod avx2;

#[cfg(all(neon, target_arch = "aarch64"))]
pub mod neon;
