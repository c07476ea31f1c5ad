mod keyboard;

pub use keyboard::*;
