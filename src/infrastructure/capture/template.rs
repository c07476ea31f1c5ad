use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use image::GrayImage;

use super::frame::Frame;
use crate::domain::error::DomainError;
use crate::domain::model::Rect;

/// Where a template was found
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateHit {
    pub rect: Rect,
    pub score: f64,
}

/// Template search inside a region of a frame
pub trait TemplateMatcher: Send + Sync {
    /// Best hit with similarity >= `threshold` inside `region`, if any
    fn find(
        &self,
        frame: &Frame,
        template: &GrayImage,
        region: Rect,
        threshold: f64,
    ) -> Option<TemplateHit>;
}

/// Zero-mean normalized cross-correlation on grayscale pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NccMatcher;

impl TemplateMatcher for NccMatcher {
    fn find(
        &self,
        frame: &Frame,
        template: &GrayImage,
        region: Rect,
        threshold: f64,
    ) -> Option<TemplateHit> {
        let region = region.clip(frame.width(), frame.height())?;
        let (tw, th) = (template.width() as i32, template.height() as i32);
        if tw == 0 || th == 0 || tw > region.width || th > region.height {
            return None;
        }

        let n = (tw * th) as f64;
        let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let t_dev: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
        let t_norm = t_dev.iter().map(|d| d * d).sum::<f64>().sqrt();

        let mut best: Option<TemplateHit> = None;
        for oy in region.y..=(region.bottom() - th) {
            for ox in region.x..=(region.right() - tw) {
                let mut sum = 0.0;
                for ty in 0..th {
                    for tx in 0..tw {
                        sum += frame.gray.get_pixel((ox + tx) as u32, (oy + ty) as u32)[0] as f64;
                    }
                }
                let mean = sum / n;

                let mut cross = 0.0;
                let mut norm = 0.0;
                for ty in 0..th {
                    for tx in 0..tw {
                        let pixel = frame.gray.get_pixel((ox + tx) as u32, (oy + ty) as u32)[0];
                        let d = pixel as f64 - mean;
                        cross += d * t_dev[(ty * tw + tx) as usize];
                        norm += d * d;
                    }
                }

                let denom = norm.sqrt() * t_norm;
                let score = if denom == 0.0 {
                    // Flat patch against flat template: identical iff same level
                    if norm == 0.0 && t_norm == 0.0 && (mean - t_mean).abs() < 1.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    cross / denom
                };

                if best.map_or(true, |b| score > b.score) {
                    best = Some(TemplateHit {
                        rect: Rect::new(ox, oy, tw, th),
                        score,
                    });
                }
            }
        }

        best.filter(|hit| hit.score >= threshold)
    }
}

/// Lazily loaded, cached template images keyed by their relative path.
pub struct TemplateStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<GrayImage>>>,
}

impl TemplateStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Register an in-memory template under `name`
    pub fn insert(&self, name: impl Into<String>, image: GrayImage) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.into(), Arc::new(image));
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<GrayImage>, DomainError> {
        if let Some(image) = self.cache.read().ok().and_then(|c| c.get(name).cloned()) {
            return Ok(image);
        }

        let path = self.base_dir.join(name);
        let image = image::open(&path)
            .map_err(|e| DomainError::Config(format!("template {:?}: {}", path, e)))?
            .to_luma8();
        let image = Arc::new(image);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.to_string(), image.clone());
        }
        tracing::debug!("Loaded template {:?}", path);
        Ok(image)
    }
}
