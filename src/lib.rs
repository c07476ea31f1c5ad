//! Screen automation building blocks: location routing with landmark
//! presence checks, homography-based map node resolution and a virtual
//! multi-touch input device.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod runtime;

#[cfg(test)]
mod testing;
