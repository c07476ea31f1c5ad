mod features;
mod homography;
mod node_resolver;

pub use features::{detect_blobs, extract_mask, BlobMatcher, FeatureMatcher, Keypoint, ReferenceMap};
pub use homography::{ransac, Homography};
pub use node_resolver::{load_reference, HomographyEstimate, MapNodeResolver};
