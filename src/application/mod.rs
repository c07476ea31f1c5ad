pub mod eventbus;
pub mod input;
pub mod navigation;
pub mod resolver;
