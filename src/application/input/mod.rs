mod touch;

pub use touch::{GestureScope, TouchScreen};
