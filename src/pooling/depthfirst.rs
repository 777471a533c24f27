//! The depthfirst tiling/threading engine.
//!
//! One [`DepthfirstDriver`] call computes one thread's share of the output.
//! All boundary-condition arithmetic lives here so tile adapters and numeric
//! kernels can assume either "fully interior, no padding" or "the pointer
//! arrays are already prepared": the driver classifies every row-band as
//! interior or padded, batches runs of column-clean tiles into wide unpadded
//! calls, and falls back to single padded-tile calls only at the edges.
//!
//! The batching is purely an optimization: every output cell is covered by
//! exactly one tile dispatch, exactly as if all tiles had gone through
//! `compute_tile_padded`.

use crate::alloc::ceil_to_multiple;
use crate::CHANNEL_BLOCK;

use super::strategy::{PoolElement, TensorSpec, ThreadWorkspace, WorkspaceLayout};
use super::PoolingArgs;

/// The driver's abstract "compute one tile" interface, bound to a concrete
/// kernel calling convention by the adapters in [`super::generic`] and
/// [`super::direct`].
pub trait TileCompute<T: PoolElement>: Send + Sync {
    /// Native output-tile height of the underlying kernel.
    fn tile_rows(&self) -> usize;

    /// Native output-tile width of the underlying kernel.
    fn tile_cols(&self) -> usize;

    /// Working-space sections one thread of this strategy needs.
    fn workspace_layout(&self) -> WorkspaceLayout;

    /// Value padded input cells must read as.
    fn fill_value(&self) -> T {
        T::ZERO
    }

    /// Prepares one thread's workspace slice; by default writes the fill
    /// value over the pad-fill buffer.
    ///
    /// # Safety
    ///
    /// `ws` must be a slice carved from a live working-space allocation.
    unsafe fn initialise_workspace(&self, ws: &ThreadWorkspace<T>) {
        let fill = self.fill_value();
        for c in 0..ws.n_channels {
            *ws.fill.add(c) = fill;
        }
    }

    /// Computes the (possibly edge-clipped, possibly padded) tile whose
    /// top-left output cell is `(out_i, out_j)`, over channels
    /// `[channel_start, channel_end)`.
    ///
    /// # Safety
    ///
    /// Tensor specs must be valid for the configured geometry; `ws` must be
    /// this thread's initialised workspace slice.
    #[allow(clippy::too_many_arguments)]
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
    );

    /// Computes `n_tiles` consecutive tiles of a row-band whose rows need
    /// padding but whose columns are all interior. The default repeats
    /// single-tile calls; adapters override to skip the per-tile column
    /// bookkeeping.
    ///
    /// # Safety
    ///
    /// As for [`Self::compute_tile_padded`].
    #[allow(clippy::too_many_arguments)]
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
        for t in 0..n_tiles {
            self.compute_tile_padded(
                input,
                output,
                batch,
                out_i,
                out_j + t * self.tile_cols(),
                channel_start,
                channel_end,
                ws,
            );
        }
    }

    /// Computes an `n_tile_rows x n_tile_cols` block of completely interior
    /// whole tiles: no input padding, no output clipping. The default
    /// repeats single-tile calls; adapters override with a branch-free path.
    ///
    /// # Safety
    ///
    /// As for [`Self::compute_tile_padded`].
    #[allow(clippy::too_many_arguments)]
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
        for r in 0..n_tile_rows {
            for c in 0..n_tile_cols {
                self.compute_tile_padded(
                    input,
                    output,
                    batch,
                    out_i + r * self.tile_rows(),
                    out_j + c * self.tile_cols(),
                    channel_start,
                    channel_end,
                    ws,
                );
            }
        }
    }
}

/// Drives a [`TileCompute`] strategy over one operator's geometry.
pub struct DepthfirstDriver<'a, T: PoolElement, S: TileCompute<T>> {
    args: &'a PoolingArgs,
    strategy: &'a S,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: PoolElement, S: TileCompute<T>> DepthfirstDriver<'a, T, S> {
    pub fn new(args: &'a PoolingArgs, strategy: &'a S) -> Self {
        debug_assert!(strategy.tile_rows() > 0 && strategy.tile_cols() > 0);
        DepthfirstDriver {
            args,
            strategy,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn working_size(&self, n_threads: usize) -> usize {
        n_threads * self.strategy.workspace_layout().size_per_thread::<T>()
    }

    /// Computes thread `thread_id`'s share of the output.
    ///
    /// # Safety
    ///
    /// See [`super::strategy::PoolingCommon::execute`]; this is its
    /// implementation body.
    pub unsafe fn execute_internal(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        working_space: *mut u8,
        thread_id: usize,
        n_threads: usize,
    ) {
        debug_assert!(thread_id < n_threads);

        let args = self.args;
        let layout = self.strategy.workspace_layout();
        let ws = layout.carve::<T>(working_space, thread_id);
        self.strategy.initialise_workspace(&ws);

        // Global pooling collapses all spatial work into a single tile, so
        // channels are the only axis left to parallelize over.
        if args.output_rows == 1 && args.output_cols == 1 && n_threads > 1 {
            let chunk = ceil_to_multiple(args.n_channels.div_ceil(n_threads), CHANNEL_BLOCK);
            let channel_start = thread_id * chunk;
            let channel_end = (channel_start + chunk).min(args.n_channels);
            if channel_start >= channel_end {
                return;
            }
            for batch in 0..args.n_batches {
                self.strategy.compute_tile_padded(
                    input,
                    output,
                    batch,
                    0,
                    0,
                    channel_start,
                    channel_end,
                    &ws,
                );
            }
            return;
        }

        let tile_rows = self.strategy.tile_rows();
        let tile_cols = self.strategy.tile_cols();
        let stride_rows = args.pool_stride.rows;
        let stride_cols = args.pool_stride.cols;

        // Input rows one whole tile row consumes
        let tile_input_rows = (tile_rows - 1) * stride_rows + args.pool_window.rows;

        for batch in 0..args.n_batches {
            // Threads interleave over tile rows, so no two threads ever own
            // the same output row-band.
            let mut out_i = thread_id * tile_rows;
            while out_i < args.output_rows {
                let start_in_i = (out_i * stride_rows) as isize - args.padding.top as isize;
                let row_padded = start_in_i < 0
                    || start_in_i + tile_input_rows as isize > args.input_rows as isize
                    || out_i + tile_rows > args.output_rows;

                let mut out_j = 0;
                while out_j < args.output_cols {
                    let n_unpadded =
                        self.unpadded_run_length(out_j, (args.output_cols - out_j) / tile_cols);

                    if n_unpadded > 0 && !row_padded {
                        self.strategy.compute_tiles_unpadded(
                            input,
                            output,
                            batch,
                            out_i,
                            out_j,
                            1,
                            n_unpadded,
                            0,
                            args.n_channels,
                            &ws,
                        );
                        out_j += n_unpadded * tile_cols;
                    } else if n_unpadded > 0 {
                        self.strategy.compute_row_padded_tile_row(
                            input,
                            output,
                            batch,
                            out_i,
                            out_j,
                            n_unpadded,
                            0,
                            args.n_channels,
                            &ws,
                        );
                        out_j += n_unpadded * tile_cols;
                    } else {
                        self.strategy.compute_tile_padded(
                            input,
                            output,
                            batch,
                            out_i,
                            out_j,
                            0,
                            args.n_channels,
                            &ws,
                        );
                        out_j += tile_cols;
                    }
                }

                out_i += n_threads * tile_rows;
            }
        }
    }

    /// Longest run of whole tiles starting at output column `out_j` whose
    /// input columns are all interior, shrinking the candidate until the
    /// leftmost read is non-negative and the rightmost read stays in bounds.
    fn unpadded_run_length(&self, out_j: usize, n_whole_tiles: usize) -> usize {
        let args = self.args;
        let tile_cols = self.strategy.tile_cols();
        let stride_cols = args.pool_stride.cols;

        let start_in_j = (out_j * stride_cols) as isize - args.padding.left as isize;
        if start_in_j < 0 {
            return 0;
        }

        let mut n = n_whole_tiles;
        while n > 0 {
            let last_out_col = out_j + n * tile_cols - 1;
            let run_end = (last_out_col * stride_cols) as isize - args.padding.left as isize
                + args.pool_window.cols as isize;
            if run_end <= args.input_cols as isize {
                break;
            }
            n -= 1;
        }
        n
    }
}
