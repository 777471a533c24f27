//! The N-dimensional iteration-space model shared by every kernel.
//!
//! A [`Window`] describes *what* to compute: per axis, a half-open
//! `[start, end)` interval walked with a positive `step`. Kernels choose
//! their own per-iteration granularity through [`Steps`]; threads and GPU
//! dispatches carve disjoint sub-windows out of one window. The window never
//! says *how* an element is computed.

use crate::tensor::{Coordinates, TensorShape, MAX_DIMS};

use super::access::BorderSize;

/// One axis of a window: `[start, end)` walked in increments of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    start: isize,
    end: isize,
    step: usize,
}

impl Dimension {
    pub fn new(start: isize, end: isize, step: usize) -> Self {
        debug_assert!(end >= start, "window dimension must have end >= start");
        debug_assert!(step > 0, "window dimension must have a positive step");
        Dimension { start, end, step }
    }

    #[inline(always)]
    pub fn start(&self) -> isize {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> isize {
        self.end
    }

    #[inline(always)]
    pub fn step(&self) -> usize {
        self.step
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Dimension {
            start: 0,
            end: 1,
            step: 1,
        }
    }
}

/// Per-axis element-processing granularity of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps {
    steps: [usize; MAX_DIMS],
}

impl Steps {
    pub fn new(steps: &[usize]) -> Self {
        debug_assert!(steps.len() <= MAX_DIMS);
        let mut s = Steps {
            steps: [1; MAX_DIMS],
        };
        s.steps[..steps.len()].copy_from_slice(steps);
        s
    }

    #[inline(always)]
    pub fn get(&self, dim: usize) -> usize {
        self.steps[dim]
    }
}

impl Default for Steps {
    fn default() -> Self {
        Steps {
            steps: [1; MAX_DIMS],
        }
    }
}

/// An iteration space of up to [`MAX_DIMS`] dimensions.
///
/// Dimensions beyond a tensor's rank are implicitly `{0, 1, 1}` so that loop
/// nests can always be written over all six axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    dims: [Dimension; MAX_DIMS],
}

impl Window {
    pub fn new() -> Self {
        Window::default()
    }

    #[inline(always)]
    pub fn dimension(&self, dim: usize) -> Dimension {
        self.dims[dim]
    }

    /// Dimension 0 (innermost).
    #[inline(always)]
    pub fn x(&self) -> Dimension {
        self.dims[0]
    }

    #[inline(always)]
    pub fn y(&self) -> Dimension {
        self.dims[1]
    }

    #[inline(always)]
    pub fn z(&self) -> Dimension {
        self.dims[2]
    }

    pub fn set(&mut self, dim: usize, dimension: Dimension) {
        self.dims[dim] = dimension;
    }

    /// Translates one axis by `delta` elements.
    pub fn shift(&mut self, dim: usize, delta: isize) {
        let d = &mut self.dims[dim];
        d.start += delta;
        d.end += delta;
    }

    /// Rescales one axis: start is floored, end is ceiled, the step is
    /// rescaled and clamped to at least one.
    pub fn scale(&mut self, dim: usize, factor: f32) {
        debug_assert!(factor > 0.0);
        let d = &mut self.dims[dim];
        d.start = (d.start as f32 * factor).floor() as isize;
        d.end = (d.end as f32 * factor).ceil() as isize;
        d.step = ((d.step as f32 * factor).round() as usize).max(1);
    }

    /// Number of iterations along one axis.
    #[inline(always)]
    pub fn num_iterations(&self, dim: usize) -> usize {
        let d = &self.dims[dim];
        let span = (d.end - d.start).max(0) as usize;
        span.div_ceil(d.step)
    }

    /// Number of iterations over all axes.
    pub fn num_iterations_total(&self) -> usize {
        (0..MAX_DIMS).map(|d| self.num_iterations(d)).product()
    }

    /// Merges every axis from `first` upward into axis `first` when this
    /// window spans those axes of `full` entirely (all starting at zero with
    /// unit step). Returns the possibly-collapsed window and whether the
    /// merge happened. Collapsing turns a deep loop nest into a single flat
    /// iteration count.
    pub fn collapse_if_possible(&self, full: &Window, first: usize) -> (Window, bool) {
        let mut collapsible = true;
        for d in first..MAX_DIMS {
            let (w, f) = (self.dims[d], full.dims[d]);
            collapsible &= w == f && w.start == 0 && w.step == 1;
        }

        if !collapsible {
            return (*self, false);
        }

        let mut collapsed = *self;
        let total: usize = (first..MAX_DIMS).map(|d| self.num_iterations(d)).product();
        collapsed.set(first, Dimension::new(0, total as isize, 1));
        for d in first + 1..MAX_DIMS {
            collapsed.set(d, Dimension::default());
        }
        (collapsed, true)
    }

    /// Carves contiguous part `id` of `total` out of one axis, preserving the
    /// step. The union of all parts is exactly this window; parts past the
    /// iteration count come out empty.
    pub fn split_window(&self, dim: usize, id: usize, total: usize) -> Window {
        debug_assert!(id < total);
        let d = self.dims[dim];
        let n = self.num_iterations(dim);
        let chunk = n.div_ceil(total);
        let first = (id * chunk).min(n);
        let last = (first + chunk).min(n);

        let mut split = *self;
        let start = d.start + (first * d.step) as isize;
        let end = d.start + (last * d.step) as isize;
        split.set(dim, Dimension::new(start, end.max(start), d.step));
        split
    }

    /// Iterator over slice windows: the first `kept_dims` axes are preserved
    /// per slice, every higher axis is pinned to a single iteration, and
    /// slices advance odometer-style through the higher axes.
    ///
    /// This is the single-threaded sequencing mechanism used by kernel
    /// `run()` implementations.
    pub fn slices(&self, kept_dims: usize) -> WindowSlices {
        WindowSlices::new(*self, kept_dims)
    }
}

/// See [`Window::slices`].
pub struct WindowSlices {
    template: Window,
    kept_dims: usize,
    cursor: [isize; MAX_DIMS],
    done: bool,
}

impl WindowSlices {
    fn new(template: Window, kept_dims: usize) -> Self {
        debug_assert!(kept_dims <= MAX_DIMS);
        let mut cursor = [0isize; MAX_DIMS];
        let mut done = false;
        for d in kept_dims..MAX_DIMS {
            cursor[d] = template.dimension(d).start();
            done |= template.num_iterations(d) == 0;
        }
        WindowSlices {
            template,
            kept_dims,
            cursor,
            done,
        }
    }
}

impl Iterator for WindowSlices {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.done {
            return None;
        }

        let mut slice = self.template;
        for d in self.kept_dims..MAX_DIMS {
            let step = self.template.dimension(d).step();
            slice.set(
                d,
                Dimension::new(self.cursor[d], self.cursor[d] + step as isize, step),
            );
        }

        // Advance the odometer through the higher axes
        let mut d = self.kept_dims;
        loop {
            if d >= MAX_DIMS {
                self.done = true;
                break;
            }
            let dim = self.template.dimension(d);
            self.cursor[d] += dim.step() as isize;
            if self.cursor[d] < dim.end() {
                break;
            }
            self.cursor[d] = dim.start();
            d += 1;
        }

        Some(slice)
    }
}

/// Calculates the maximum window for a tensor shape: per axis `[0, extent)`
/// rounded up to the processing granularity, or the border-excluding band
/// when `skip_border` is set.
pub fn calculate_max_window(
    shape: &TensorShape,
    steps: &Steps,
    skip_border: bool,
    border: BorderSize,
) -> Window {
    let mut window = Window::new();

    for d in 0..MAX_DIMS {
        let step = steps.get(d);
        let extent = shape.dim(d) as isize;

        let (skip_before, skip_after) = if skip_border {
            match d {
                0 => (border.left as isize, border.right as isize),
                1 => (border.top as isize, border.bottom as isize),
                _ => (0, 0),
            }
        } else {
            (0, 0)
        };

        let start = skip_before.min(extent);
        let stop = (extent - skip_after).max(start);
        let span = (stop - start) as usize;
        let end = start + (span.div_ceil(step) * step) as isize;
        window.set(d, Dimension::new(start, end, step));
    }

    window
}

/// Iterates every coordinate of `window`, stepping each axis by its step,
/// and calls `lambda` with the absolute coordinates of each item.
pub fn execute_window_loop(window: &Window, mut lambda: impl FnMut(&Coordinates)) {
    let mut coords = Coordinates::default();
    for d in 0..MAX_DIMS {
        if window.num_iterations(d) == 0 {
            return;
        }
        coords.set(d, window.dimension(d).start());
    }

    loop {
        lambda(&coords);

        let mut d = 0;
        loop {
            if d >= MAX_DIMS {
                return;
            }
            let dim = window.dimension(d);
            let next = coords.get(d) + dim.step() as isize;
            if next < dim.end() {
                coords.set(d, next);
                break;
            }
            coords.set(d, dim.start());
            d += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_iterations_rounds_up() {
        let mut w = Window::new();
        w.set(0, Dimension::new(0, 10, 4));
        assert_eq!(w.num_iterations(0), 3);
        w.set(1, Dimension::new(2, 2, 1));
        assert_eq!(w.num_iterations(1), 0);
        assert_eq!(w.num_iterations_total(), 0);
    }

    #[test]
    fn test_shift_and_scale() {
        let mut w = Window::new();
        w.set(0, Dimension::new(0, 8, 2));
        w.shift(0, 3);
        assert_eq!(w.x().start(), 3);
        assert_eq!(w.x().end(), 11);

        let mut w = Window::new();
        w.set(0, Dimension::new(0, 9, 2));
        w.scale(0, 0.5);
        assert_eq!(w.x().start(), 0);
        assert_eq!(w.x().end(), 5); // ceil(9 * 0.5)
        assert_eq!(w.x().step(), 1);
    }

    #[test]
    fn test_calculate_max_window() {
        let shape = TensorShape::new(&[10, 3, 2]);
        let w = calculate_max_window(&shape, &Steps::new(&[4]), false, BorderSize::default());
        assert_eq!(w.x().end(), 12); // rounded up to the step
        assert_eq!(w.num_iterations(0), 3);
        assert_eq!(w.num_iterations(1), 3);
        assert_eq!(w.num_iterations(2), 2);
        assert_eq!(w.num_iterations(5), 1);
    }

    #[test]
    fn test_calculate_max_window_skips_border() {
        let shape = TensorShape::new(&[10, 8]);
        let border = BorderSize::new(1, 2, 1, 2);
        let w = calculate_max_window(&shape, &Steps::default(), true, border);
        assert_eq!(w.x().start(), 1);
        assert_eq!(w.x().end(), 9);
        assert_eq!(w.y().start(), 2);
        assert_eq!(w.y().end(), 6);
    }

    #[test]
    fn test_split_window_partitions_exactly() {
        let mut w = Window::new();
        w.set(1, Dimension::new(0, 10, 1));

        let mut covered = Vec::new();
        for id in 0..3 {
            let part = w.split_window(1, id, 3);
            for i in part.y().start()..part.y().end() {
                covered.push(i);
            }
        }
        covered.sort();
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_collapse_if_possible() {
        let mut full = Window::new();
        full.set(0, Dimension::new(0, 16, 4));
        full.set(1, Dimension::new(0, 5, 1));
        full.set(2, Dimension::new(0, 3, 1));

        let (collapsed, happened) = full.collapse_if_possible(&full, 1);
        assert!(happened);
        assert_eq!(collapsed.num_iterations(1), 15);
        assert_eq!(collapsed.num_iterations(2), 1);
        // Dimension 0 untouched
        assert_eq!(collapsed.x().step(), 4);

        // A window that does not span the full extent must not collapse
        let mut partial = full;
        partial.set(2, Dimension::new(1, 3, 1));
        let (_, happened) = partial.collapse_if_possible(&full, 1);
        assert!(!happened);
    }

    #[test]
    fn test_slices_cover_higher_axes_once() {
        let mut w = Window::new();
        w.set(0, Dimension::new(0, 8, 4));
        w.set(1, Dimension::new(0, 3, 1));
        w.set(2, Dimension::new(0, 2, 1));

        let slices: Vec<Window> = w.slices(1).collect();
        assert_eq!(slices.len(), 6); // 3 * 2 higher-axis iterations

        // Each slice keeps dimension 0 and pins the rest to one iteration
        for slice in &slices {
            assert_eq!(slice.x(), w.x());
            assert_eq!(slice.num_iterations(1), 1);
            assert_eq!(slice.num_iterations(2), 1);
        }

        // All (y, z) positions appear exactly once
        let mut seen: Vec<(isize, isize)> = slices
            .iter()
            .map(|s| (s.y().start(), s.z().start()))
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_execute_window_loop_visits_every_coordinate() {
        let mut w = Window::new();
        w.set(0, Dimension::new(0, 4, 2));
        w.set(1, Dimension::new(1, 3, 1));

        let mut visited = Vec::new();
        execute_window_loop(&w, |coords| visited.push((coords.get(0), coords.get(1))));

        assert_eq!(visited, vec![(0, 1), (2, 1), (0, 2), (2, 2)]);
    }
}
