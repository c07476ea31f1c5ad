//! Screen capture and template matching collaborators.

mod frame;
mod template;

pub use frame::{CommandFrameSource, Frame, FrameSource};
pub use template::{NccMatcher, TemplateHit, TemplateMatcher, TemplateStore};
