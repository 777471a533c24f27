pub mod access;
#[allow(clippy::module_inception)]
pub mod window;

pub use access::{
    update_window_and_padding, AccessPattern, AccessWindowRectangle, AccessWindowStatic,
    AccessWindowTranspose, BorderSize, TensorAccessBinding,
};
pub use window::{calculate_max_window, execute_window_loop, Dimension, Steps, Window};
