//! Tensor metadata consumed by the windowing and argument-binding protocols.
//!
//! Tensor *storage* is owned by the caller; this module only models the
//! metadata a kernel needs to reason about a tensor: its shape, element type,
//! byte strides, border padding, and the region holding defined values.
//!
//! Dimension 0 is always the innermost (contiguous) axis. For NHWC image
//! tensors the convention throughout the crate is `0 = channels`,
//! `1 = columns`, `2 = rows`, `3 = batches`.

/// Maximum number of tensor/window dimensions supported.
pub const MAX_DIMS: usize = 6;

/// Element types the kernel catalog is specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit IEEE floating point.
    F32,
    /// Asymmetric-quantized unsigned 8-bit.
    Q8,
}

impl DataType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::Q8 => 1,
        }
    }
}

/// An N-dimensional coordinate, possibly negative (pointing into padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coordinates {
    coords: [isize; MAX_DIMS],
}

impl Coordinates {
    pub fn new(coords: &[isize]) -> Self {
        debug_assert!(coords.len() <= MAX_DIMS);
        let mut c = Coordinates::default();
        c.coords[..coords.len()].copy_from_slice(coords);
        c
    }

    #[inline(always)]
    pub fn get(&self, dim: usize) -> isize {
        self.coords[dim]
    }

    #[inline(always)]
    pub fn set(&mut self, dim: usize, value: isize) {
        self.coords[dim] = value;
    }
}

/// Tensor shape: up to [`MAX_DIMS`] extents, trailing dimensions implicitly 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    dims: [usize; MAX_DIMS],
    num_dims: usize,
}

impl TensorShape {
    pub fn new(dims: &[usize]) -> Self {
        debug_assert!(dims.len() <= MAX_DIMS);
        let mut shape = TensorShape {
            dims: [1; MAX_DIMS],
            num_dims: dims.len(),
        };
        shape.dims[..dims.len()].copy_from_slice(dims);
        shape
    }

    #[inline(always)]
    pub fn dim(&self, d: usize) -> usize {
        self.dims[d]
    }

    pub fn set_dim(&mut self, d: usize, extent: usize) {
        self.dims[d] = extent;
        if extent != 1 && d >= self.num_dims {
            self.num_dims = d + 1;
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dims
    }

    /// Number of elements in the (unpadded) tensor.
    pub fn total_size(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Border padding in elements around the X (dim 0) / Y (dim 1) plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingSize {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl PaddingSize {
    pub fn new(left: usize, top: usize, right: usize, bottom: usize) -> Self {
        PaddingSize {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Uniform padding on all four sides.
    pub fn uniform(size: usize) -> Self {
        PaddingSize::new(size, size, size, size)
    }
}

/// Byte strides per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strides {
    strides: [usize; MAX_DIMS],
}

impl Strides {
    pub fn new(strides: &[usize]) -> Self {
        debug_assert!(strides.len() <= MAX_DIMS);
        let mut s = Strides::default();
        s.strides[..strides.len()].copy_from_slice(strides);
        s
    }

    #[inline(always)]
    pub fn get(&self, dim: usize) -> usize {
        self.strides[dim]
    }
}

/// The rectangular subset of a tensor guaranteed to hold defined
/// (non-border-fill) data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRegion {
    pub anchor: Coordinates,
    pub shape: TensorShape,
}

impl ValidRegion {
    pub fn new(anchor: Coordinates, shape: TensorShape) -> Self {
        ValidRegion { anchor, shape }
    }

    /// Valid region covering an entire shape.
    pub fn full(shape: TensorShape) -> Self {
        ValidRegion {
            anchor: Coordinates::default(),
            shape,
        }
    }

    #[inline(always)]
    pub fn start(&self, dim: usize) -> isize {
        self.anchor.get(dim)
    }

    #[inline(always)]
    pub fn end(&self, dim: usize) -> isize {
        self.anchor.get(dim) + self.shape.dim(dim) as isize
    }
}

/// Shape, element type, strides, padding and valid region of one tensor.
///
/// Strides are derived from shape and padding: rows are padded on the X axis,
/// planes on the Y axis, higher dimensions are dense. Padding can only grow
/// (lazily, during kernel configuration, before the caller allocates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    shape: TensorShape,
    dtype: DataType,
    padding: PaddingSize,
    strides: Strides,
    offset_first_element: usize,
    valid_region: ValidRegion,
    resizable: bool,
}

impl TensorDescriptor {
    pub fn new(shape: TensorShape, dtype: DataType) -> Self {
        let mut desc = TensorDescriptor {
            shape,
            dtype,
            padding: PaddingSize::default(),
            strides: Strides::default(),
            offset_first_element: 0,
            valid_region: ValidRegion::full(shape),
            resizable: true,
        };
        desc.recompute_layout();
        desc
    }

    /// Whether padding may still grow (storage not yet allocated).
    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    /// Freezes the layout; called when the caller allocates storage. From
    /// here on kernels must shrink their window instead of growing padding.
    pub fn lock(&mut self) {
        self.resizable = false;
    }

    fn recompute_layout(&mut self) {
        let elem = self.dtype.size_in_bytes();
        let row_elems = self.padding.left + self.shape.dim(0) + self.padding.right;
        let plane_rows = self.padding.top + self.shape.dim(1) + self.padding.bottom;

        let mut strides = [0usize; MAX_DIMS];
        strides[0] = elem;
        strides[1] = row_elems * elem;
        strides[2] = strides[1] * plane_rows;
        for d in 3..MAX_DIMS {
            strides[d] = strides[d - 1] * self.shape.dim(d - 1);
        }
        self.strides = Strides::new(&strides);
        self.offset_first_element = self.padding.top * strides[1] + self.padding.left * strides[0];
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.dtype
    }

    pub fn padding(&self) -> PaddingSize {
        self.padding
    }

    pub fn strides_in_bytes(&self) -> Strides {
        self.strides
    }

    /// Byte offset of element (0, 0, ...) from the start of the allocation.
    pub fn offset_first_element_in_bytes(&self) -> usize {
        self.offset_first_element
    }

    pub fn valid_region(&self) -> ValidRegion {
        self.valid_region
    }

    pub fn set_valid_region(&mut self, region: ValidRegion) {
        self.valid_region = region;
    }

    /// First addressable coordinate along `dim` (negative into padding).
    pub fn padded_start(&self, dim: usize) -> isize {
        match dim {
            0 => -(self.padding.left as isize),
            1 => -(self.padding.top as isize),
            _ => 0,
        }
    }

    /// One past the last addressable coordinate along `dim`.
    pub fn padded_end(&self, dim: usize) -> isize {
        let extent = self.shape.dim(dim) as isize;
        match dim {
            0 => extent + self.padding.right as isize,
            1 => extent + self.padding.bottom as isize,
            _ => extent,
        }
    }

    /// Grows padding to at least `required` on every side. Returns true if
    /// any side grew; locked descriptors never grow. Strides and the
    /// first-element offset are recomputed.
    pub fn extend_padding(&mut self, required: PaddingSize) -> bool {
        if !self.resizable {
            return false;
        }
        let grown = required.left > self.padding.left
            || required.top > self.padding.top
            || required.right > self.padding.right
            || required.bottom > self.padding.bottom;

        if grown {
            self.padding.left = self.padding.left.max(required.left);
            self.padding.top = self.padding.top.max(required.top);
            self.padding.right = self.padding.right.max(required.right);
            self.padding.bottom = self.padding.bottom.max(required.bottom);
            self.recompute_layout();
        }

        grown
    }

    /// Byte offset of `coords` (which may point into padding) from the start
    /// of the allocation.
    pub fn element_offset_in_bytes(&self, coords: &Coordinates) -> isize {
        let mut offset = self.offset_first_element as isize;
        for d in 0..MAX_DIMS {
            offset += coords.get(d) * self.strides.get(d) as isize;
        }
        offset
    }

    /// Total allocation size covering shape plus padding.
    pub fn allocation_size_in_bytes(&self) -> usize {
        let mut size = self.strides.get(2);
        for d in 2..MAX_DIMS {
            size *= self.shape.dim(d);
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_layout() {
        // 8 channels x 5 cols x 4 rows of f32, no padding
        let desc = TensorDescriptor::new(TensorShape::new(&[8, 5, 4]), DataType::F32);

        assert_eq!(desc.strides_in_bytes().get(0), 4);
        assert_eq!(desc.strides_in_bytes().get(1), 8 * 4);
        assert_eq!(desc.strides_in_bytes().get(2), 8 * 5 * 4);
        assert_eq!(desc.offset_first_element_in_bytes(), 0);
        assert_eq!(desc.allocation_size_in_bytes(), 8 * 5 * 4 * 4);
    }

    #[test]
    fn test_padded_layout() {
        let mut desc = TensorDescriptor::new(TensorShape::new(&[4, 4]), DataType::F32);
        let grew = desc.extend_padding(PaddingSize::uniform(1));
        assert!(grew);

        // Row holds 1 + 4 + 1 elements
        assert_eq!(desc.strides_in_bytes().get(1), 6 * 4);
        // First element sits one row down, one element in
        assert_eq!(desc.offset_first_element_in_bytes(), 6 * 4 + 4);
        assert_eq!(desc.padded_start(0), -1);
        assert_eq!(desc.padded_end(0), 5);

        // Growing to a smaller padding is a no-op
        assert!(!desc.extend_padding(PaddingSize::uniform(1)));
        // Growing one side only affects that side
        assert!(desc.extend_padding(PaddingSize::new(3, 0, 0, 0)));
        assert_eq!(desc.padding().left, 3);
        assert_eq!(desc.padding().right, 1);
    }

    #[test]
    fn test_element_offset_reaches_into_padding() {
        let mut desc = TensorDescriptor::new(TensorShape::new(&[4, 4]), DataType::F32);
        desc.extend_padding(PaddingSize::uniform(2));

        // Top-left padded corner is the very first allocated element
        let corner = Coordinates::new(&[-2, -2]);
        assert_eq!(desc.element_offset_in_bytes(&corner), 0);

        let origin = Coordinates::new(&[0, 0]);
        assert_eq!(
            desc.element_offset_in_bytes(&origin),
            desc.offset_first_element_in_bytes() as isize
        );
    }

    #[test]
    fn test_valid_region_accessors() {
        let shape = TensorShape::new(&[6, 3]);
        let region = ValidRegion::new(Coordinates::new(&[1, 0]), TensorShape::new(&[4, 3]));
        let mut desc = TensorDescriptor::new(shape, DataType::Q8);
        desc.set_valid_region(region);

        assert_eq!(desc.valid_region().start(0), 1);
        assert_eq!(desc.valid_region().end(0), 5);
        assert_eq!(desc.valid_region().end(1), 3);
    }
}
