//! Access windows: the declared read/write footprint of a kernel argument.
//!
//! Every kernel declares, once, the rectangular region it touches on each
//! tensor argument relative to the iteration window. Folding all arguments'
//! declarations over the shared window (see [`update_window_and_padding`])
//! is what makes heterogeneous multi-input kernels safe at tensor borders
//! without any per-kernel boundary checks: the window is shrunk so no
//! footprint ever leaves the allocated (padding-inclusive) extent, then the
//! remaining tensors' padding is grown to match.
//!
//! Access windows only exist while a kernel is being configured; they are
//! never persisted.

use crate::tensor::{PaddingSize, TensorDescriptor, ValidRegion};

use super::window::{Dimension, Window};

/// Border size in elements, reusing the padding representation.
pub type BorderSize = PaddingSize;

/// Accessed band `[x0, x1) x [y0, y1)` in tensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Footprint {
    x0: isize,
    x1: isize,
    y0: isize,
    y1: isize,
}

/// A footprint given in absolute tensor coordinates, independent of the
/// iteration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindowStatic {
    pub start_x: isize,
    pub start_y: isize,
    pub end_x: isize,
    pub end_y: isize,
}

impl AccessWindowStatic {
    pub fn new(start_x: isize, start_y: isize, end_x: isize, end_y: isize) -> Self {
        debug_assert!(end_x >= start_x && end_y >= start_y);
        AccessWindowStatic {
            start_x,
            start_y,
            end_x,
            end_y,
        }
    }
}

/// A rectangular footprint anchored at the current iteration element:
/// the element at window position `(px, py)` touches
/// `[px*scale_x + x, px*scale_x + x + width) x [py*scale_y + y, ... + height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessWindowRectangle {
    pub x: isize,
    pub y: isize,
    pub width: usize,
    pub height: usize,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl AccessWindowRectangle {
    pub fn new(x: isize, y: isize, width: usize, height: usize) -> Self {
        AccessWindowRectangle {
            x,
            y,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        debug_assert!(scale_x > 0.0 && scale_y > 0.0);
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    /// A one-row horizontal access, the common case for 1D kernels.
    pub fn horizontal(x: isize, width: usize) -> Self {
        AccessWindowRectangle::new(x, 0, width, 1)
    }
}

/// Like [`AccessWindowRectangle`] but with the roles of the window's X and Y
/// axes swapped, for kernels writing a transposed tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessWindowTranspose {
    pub x: isize,
    pub y: isize,
    pub width: usize,
    pub height: usize,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl AccessWindowTranspose {
    pub fn new(x: isize, y: isize, width: usize, height: usize) -> Self {
        AccessWindowTranspose {
            x,
            y,
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

/// One kernel argument's access declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccessPattern {
    Static(AccessWindowStatic),
    Rectangle(AccessWindowRectangle),
    Transpose(AccessWindowTranspose),
}

#[inline]
fn scaled(pos: isize, scale: f32) -> isize {
    (pos as f32 * scale).floor() as isize
}

impl AccessPattern {
    /// The band accessed when iterating `window`, or `None` for a zero-size
    /// access (an absent optional argument).
    fn footprint(&self, window: &Window) -> Option<Footprint> {
        match *self {
            AccessPattern::Static(a) => {
                if a.end_x == a.start_x || a.end_y == a.start_y {
                    return None;
                }
                Some(Footprint {
                    x0: a.start_x,
                    x1: a.end_x,
                    y0: a.start_y,
                    y1: a.end_y,
                })
            }
            AccessPattern::Rectangle(a) => {
                if a.width == 0 || a.height == 0 {
                    return None;
                }
                Some(Self::iteration_band(
                    window.x(),
                    window.y(),
                    a.x,
                    a.y,
                    a.width,
                    a.height,
                    a.scale_x,
                    a.scale_y,
                ))
            }
            AccessPattern::Transpose(a) => {
                if a.width == 0 || a.height == 0 {
                    return None;
                }
                // The tensor's X band follows the window's Y axis and vice
                // versa
                Some(Self::iteration_band(
                    window.y(),
                    window.x(),
                    a.x,
                    a.y,
                    a.width,
                    a.height,
                    a.scale_x,
                    a.scale_y,
                ))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn iteration_band(
        dim_x: Dimension,
        dim_y: Dimension,
        x: isize,
        y: isize,
        width: usize,
        height: usize,
        scale_x: f32,
        scale_y: f32,
    ) -> Footprint {
        let last_x = last_iteration(dim_x);
        let last_y = last_iteration(dim_y);
        Footprint {
            x0: scaled(dim_x.start(), scale_x) + x,
            x1: scaled(last_x, scale_x) + x + width as isize,
            y0: scaled(dim_y.start(), scale_y) + y,
            y1: scaled(last_y, scale_y) + y + height as isize,
        }
    }

    /// Shrinks `window` so this footprint stays inside the tensor's
    /// allocated (padding-inclusive) extent. Returns whether the window was
    /// modified — the caller's signal that the configured padding was
    /// insufficient for the full window.
    ///
    /// Tensors that can still grow padding never constrain the window (the
    /// padding pass will satisfy the footprint instead), and neither do
    /// static accesses: their footprint does not move with the window.
    pub fn update_window_if_needed(&self, info: &TensorDescriptor, window: &mut Window) -> bool {
        if info.is_resizable() {
            return false;
        }
        let (x, y, width, height, scale_x, scale_y, transposed) = match *self {
            AccessPattern::Static(_) => return false,
            AccessPattern::Rectangle(a) => {
                (a.x, a.y, a.width, a.height, a.scale_x, a.scale_y, false)
            }
            AccessPattern::Transpose(a) => (a.x, a.y, a.width, a.height, a.scale_x, a.scale_y, true),
        };
        if width == 0 || height == 0 {
            return false;
        }

        // Window axis feeding the tensor's X band, and the one feeding Y
        let (wx, wy) = if transposed { (1, 0) } else { (0, 1) };

        let mut changed = false;
        changed |= clamp_axis(
            window,
            wx,
            x,
            width,
            scale_x,
            info.padded_start(0),
            info.padded_end(0),
        );
        changed |= clamp_axis(
            window,
            wy,
            y,
            height,
            scale_y,
            info.padded_start(1),
            info.padded_end(1),
        );
        changed
    }

    /// Grows the tensor's padding so this footprint, evaluated over the
    /// final `window`, fits. Returns whether any padding grew.
    pub fn update_padding_if_needed(
        &self,
        info: &mut TensorDescriptor,
        window: &Window,
    ) -> bool {
        let footprint = match self.footprint(window) {
            Some(f) => f,
            None => return false,
        };

        let shape_x = info.shape().dim(0) as isize;
        let shape_y = info.shape().dim(1) as isize;
        let required = PaddingSize::new(
            (-footprint.x0).max(0) as usize,
            (-footprint.y0).max(0) as usize,
            (footprint.x1 - shape_x).max(0) as usize,
            (footprint.y1 - shape_y).max(0) as usize,
        );
        info.extend_padding(required)
    }

    /// Computes the output tensor's valid region: the input valid region
    /// restricted to the accessed band, shrunk by the declared border when
    /// the border content is undefined, and intersected with the tensor's
    /// own shape. Higher dimensions are carried over from the input region.
    pub fn compute_valid_region(
        &self,
        info: &TensorDescriptor,
        window: &Window,
        input_valid_region: ValidRegion,
        border_undefined: bool,
        border: BorderSize,
    ) -> ValidRegion {
        let footprint = match self.footprint(window) {
            Some(f) => f,
            None => return input_valid_region,
        };

        let (mut x0, mut x1) = (
            input_valid_region.start(0).max(footprint.x0),
            input_valid_region.end(0).min(footprint.x1),
        );
        let (mut y0, mut y1) = (
            input_valid_region.start(1).max(footprint.y0),
            input_valid_region.end(1).min(footprint.y1),
        );

        if border_undefined {
            x0 += border.left as isize;
            x1 -= border.right as isize;
            y0 += border.top as isize;
            y1 -= border.bottom as isize;
        }

        // Intersect with the tensor's own shape
        x0 = x0.max(0);
        y0 = y0.max(0);
        x1 = x1.min(info.shape().dim(0) as isize).max(x0);
        y1 = y1.min(info.shape().dim(1) as isize).max(y0);

        let mut anchor = input_valid_region.anchor;
        anchor.set(0, x0);
        anchor.set(1, y0);
        let mut shape = input_valid_region.shape;
        shape.set_dim(0, (x1 - x0) as usize);
        shape.set_dim(1, (y1 - y0) as usize);

        ValidRegion::new(anchor, shape)
    }

    /// [`Self::compute_valid_region`] followed by storing the result on the
    /// tensor.
    pub fn set_valid_region(
        &self,
        info: &mut TensorDescriptor,
        window: &Window,
        input_valid_region: ValidRegion,
        border_undefined: bool,
        border: BorderSize,
    ) {
        let region =
            self.compute_valid_region(info, window, input_valid_region, border_undefined, border);
        info.set_valid_region(region);
    }
}

fn last_iteration(dim: Dimension) -> isize {
    let span = (dim.end() - dim.start()).max(0) as usize;
    let iterations = span.div_ceil(dim.step());
    if iterations == 0 {
        dim.start()
    } else {
        dim.start() + ((iterations - 1) * dim.step()) as isize
    }
}

/// Shrinks one window axis until `[pos*scale + offset, .. + extent)` fits in
/// `[lo, hi)` for every iteration position, moving start/end in whole steps.
fn clamp_axis(
    window: &mut Window,
    axis: usize,
    offset: isize,
    extent: usize,
    scale: f32,
    lo: isize,
    hi: isize,
) -> bool {
    let dim = window.dimension(axis);
    let step = dim.step();
    let mut start = dim.start();
    let mut last = last_iteration(dim);
    let mut changed = false;

    while start <= last && scaled(start, scale) + offset < lo {
        start += step as isize;
        changed = true;
    }
    while last >= start && scaled(last, scale) + offset + extent as isize > hi {
        last -= step as isize;
        changed = true;
    }

    if changed {
        let end = if last < start {
            start
        } else {
            last + step as isize
        };
        window.set(axis, Dimension::new(start, end, step));
    }
    changed
}

/// One tensor argument bound to its access declaration. An absent optional
/// argument is represented with [`TensorAccessBinding::none`] and is a no-op
/// in every computation.
pub struct TensorAccessBinding<'a> {
    pattern: Option<AccessPattern>,
    info: Option<&'a mut TensorDescriptor>,
}

impl<'a> TensorAccessBinding<'a> {
    pub fn new(pattern: AccessPattern, info: &'a mut TensorDescriptor) -> Self {
        TensorAccessBinding {
            pattern: Some(pattern),
            info: Some(info),
        }
    }

    /// Zero-footprint binding for an absent optional tensor.
    pub fn none() -> Self {
        TensorAccessBinding {
            pattern: None,
            info: None,
        }
    }
}

/// Updates window and padding for each of the access declarations.
///
/// First the window is shrunk by every declaration that cannot be satisfied
/// from the tensors' allocated extents, then the tensors' padding is grown to
/// match the final window. Returns true if the window was changed; padding
/// changes do not influence the returned value.
pub fn update_window_and_padding(
    window: &mut Window,
    accesses: &mut [TensorAccessBinding<'_>],
) -> bool {
    let mut window_changed = false;

    for access in accesses.iter() {
        if let (Some(pattern), Some(info)) = (&access.pattern, &access.info) {
            window_changed |= pattern.update_window_if_needed(info, window);
        }
    }

    for access in accesses.iter_mut() {
        if let (Some(pattern), Some(info)) = (&access.pattern, &mut access.info) {
            pattern.update_padding_if_needed(info, window);
        }
    }

    window_changed
}
