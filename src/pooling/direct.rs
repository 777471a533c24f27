//! Tile adapter for direct kernels with a native output tile.
//!
//! Direct kernels consume the *whole* input patch behind their output tile
//! as one pointer array and write a full tile of output pointers, with no
//! branch anywhere: this adapter redirects out-of-bounds input cells to the
//! pre-filled pad buffer and out-of-bounds output cells to a scratch buffer
//! that is simply never read back, so the kernel can compute a full tile
//! unconditionally even at tensor edges.

use super::depthfirst::{DepthfirstDriver, TileCompute};
use super::kernels::DirectKernelFn;
use super::strategy::{PoolElement, PoolingCommon, TensorSpec, ThreadWorkspace, WorkspaceLayout};
use super::{PoolType, PoolingArgs};

/// Geometry and entry point of one direct kernel.
#[derive(Clone, Copy)]
pub struct DirectStrategy<T: PoolElement> {
    /// Pooling window the kernel is specialized for.
    pub window_rows: usize,
    pub window_cols: usize,
    /// Stride the kernel is specialized for.
    pub stride_rows: usize,
    pub stride_cols: usize,
    /// Native output tile.
    pub out_rows: usize,
    pub out_cols: usize,
    pub kernel: DirectKernelFn<T>,
}

impl<T: PoolElement> DirectStrategy<T> {
    /// Input patch height one tile consumes.
    pub fn input_rows(&self) -> usize {
        self.window_rows + (self.out_rows - 1) * self.stride_rows
    }

    /// Input patch width one tile consumes.
    pub fn input_cols(&self) -> usize {
        self.window_cols + (self.out_cols - 1) * self.stride_cols
    }
}

/// Depthfirst operator built around a direct kernel.
pub struct PoolingDepthfirst<T: PoolElement> {
    args: PoolingArgs,
    strategy: DirectStrategy<T>,
}

impl<T: PoolElement> PoolingDepthfirst<T> {
    pub fn new(args: &PoolingArgs, strategy: DirectStrategy<T>) -> Self {
        debug_assert_eq!(args.pool_window.rows, strategy.window_rows);
        debug_assert_eq!(args.pool_window.cols, strategy.window_cols);
        debug_assert_eq!(args.pool_stride.rows, strategy.stride_rows);
        debug_assert_eq!(args.pool_stride.cols, strategy.stride_cols);
        PoolingDepthfirst {
            args: args.clone(),
            strategy,
        }
    }
}

impl<T: PoolElement> TileCompute<T> for PoolingDepthfirst<T> {
    fn tile_rows(&self) -> usize {
        self.strategy.out_rows
    }

    fn tile_cols(&self) -> usize {
        self.strategy.out_cols
    }

    fn workspace_layout(&self) -> WorkspaceLayout {
        WorkspaceLayout {
            in_ptr_slots: self.strategy.input_rows() * self.strategy.input_cols(),
            out_ptr_slots: self.strategy.out_rows * self.strategy.out_cols,
            n_channels: self.args.n_channels,
        }
    }

    fn fill_value(&self) -> T {
        match self.args.pool_type {
            PoolType::Max => T::MAX_IDENTITY,
            PoolType::Average => T::ZERO,
        }
    }

    unsafe fn compute_tile_padded(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        let strat = &self.strategy;
        let (patch_rows, patch_cols) = (strat.input_rows(), strat.input_cols());

        let start_in_i = (out_i * strat.stride_rows) as isize - args.padding.top as isize;
        let start_in_j = (out_j * strat.stride_cols) as isize - args.padding.left as isize;

        let mut slot = 0;
        for r in 0..patch_rows {
            let in_i = start_in_i + r as isize;
            for c in 0..patch_cols {
                let in_j = start_in_j + c as isize;
                let in_bounds = in_i >= 0
                    && (in_i as usize) < args.input_rows
                    && in_j >= 0
                    && (in_j as usize) < args.input_cols;
                *ws.inptrs.add(slot) = if in_bounds {
                    input.base.add(input.offset(
                        batch,
                        in_i as usize,
                        in_j as usize,
                        channel_start,
                    ))
                } else {
                    ws.fill as *const T
                };
                slot += 1;
            }
        }

        let mut slot = 0;
        for r in 0..strat.out_rows {
            let oi = out_i + r;
            for c in 0..strat.out_cols {
                let oj = out_j + c;
                *ws.outptrs.add(slot) = if oi < args.output_rows && oj < args.output_cols {
                    output.base.add(output.offset(batch, oi, oj, channel_start))
                } else {
                    ws.scratch
                };
                slot += 1;
            }
        }

        (strat.kernel)(
            (channel_end - channel_start) as u64,
            ws.inptrs,
            ws.outptrs as *const *mut T,
        );
    }

    unsafe fn compute_row_padded_tile_row(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        n_tiles: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        let strat = &self.strategy;
        let (patch_rows, patch_cols) = (strat.input_rows(), strat.input_cols());
        let start_in_i = (out_i * strat.stride_rows) as isize - args.padding.top as isize;
        let n_channels = (channel_end - channel_start) as u64;

        for t in 0..n_tiles {
            let tile_out_j = out_j + t * strat.out_cols;
            let start_in_j = tile_out_j * strat.stride_cols - args.padding.left;

            // Rows may fall into padding; columns are interior by contract
            let mut slot = 0;
            for r in 0..patch_rows {
                let in_i = start_in_i + r as isize;
                let row_in_bounds = in_i >= 0 && (in_i as usize) < args.input_rows;
                for c in 0..patch_cols {
                    *ws.inptrs.add(slot) = if row_in_bounds {
                        input.base.add(input.offset(
                            batch,
                            in_i as usize,
                            start_in_j + c,
                            channel_start,
                        ))
                    } else {
                        ws.fill as *const T
                    };
                    slot += 1;
                }
            }

            // The bottom tile row may still clip the output
            let mut slot = 0;
            for r in 0..strat.out_rows {
                let oi = out_i + r;
                for c in 0..strat.out_cols {
                    let oj = tile_out_j + c;
                    *ws.outptrs.add(slot) = if oi < args.output_rows && oj < args.output_cols {
                        output.base.add(output.offset(batch, oi, oj, channel_start))
                    } else {
                        ws.scratch
                    };
                    slot += 1;
                }
            }

            (strat.kernel)(n_channels, ws.inptrs, ws.outptrs as *const *mut T);
        }
    }

    unsafe fn compute_tiles_unpadded(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        n_tile_rows: usize,
        n_tile_cols: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        let strat = &self.strategy;
        let (patch_rows, patch_cols) = (strat.input_rows(), strat.input_cols());
        let n_channels = (channel_end - channel_start) as u64;

        for tr in 0..n_tile_rows {
            let tile_out_i = out_i + tr * strat.out_rows;
            let start_in_i = tile_out_i * strat.stride_rows - args.padding.top;

            for tc in 0..n_tile_cols {
                let tile_out_j = out_j + tc * strat.out_cols;
                let start_in_j = tile_out_j * strat.stride_cols - args.padding.left;

                // Whole interior tiles: every pointer is real
                let mut slot = 0;
                for r in 0..patch_rows {
                    for c in 0..patch_cols {
                        *ws.inptrs.add(slot) = input.base.add(input.offset(
                            batch,
                            start_in_i + r,
                            start_in_j + c,
                            channel_start,
                        ));
                        slot += 1;
                    }
                }

                let mut slot = 0;
                for r in 0..strat.out_rows {
                    for c in 0..strat.out_cols {
                        *ws.outptrs.add(slot) = output.base.add(output.offset(
                            batch,
                            tile_out_i + r,
                            tile_out_j + c,
                            channel_start,
                        ));
                        slot += 1;
                    }
                }

                (strat.kernel)(n_channels, ws.inptrs, ws.outptrs as *const *mut T);
            }
        }
    }
}

impl<T: PoolElement> PoolingCommon<T> for PoolingDepthfirst<T> {
    fn get_working_size(&self, n_threads: usize) -> usize {
        DepthfirstDriver::new(&self.args, self).working_size(n_threads)
    }

    unsafe fn execute(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        working_space: *mut u8,
        thread_id: usize,
        n_threads: usize,
    ) {
        DepthfirstDriver::new(&self.args, self).execute_internal(
            input,
            output,
            working_space,
            thread_id,
            n_threads,
        );
    }
}
