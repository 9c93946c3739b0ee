use std::fs;

use anyhow::{Context, Result};

use crate::error::CountError;
use crate::types::{in_catalog, Config};

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CountError> {
        if self.model.path.is_empty() {
            return Err(CountError::configuration("model.path must be set"));
        }
        if self.model.input_size == 0 {
            return Err(CountError::configuration("model.input_size must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(CountError::configuration(
                "detection.confidence_threshold must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.nms_iou_threshold) {
            return Err(CountError::configuration(
                "detection.nms_iou_threshold must be in [0, 1]",
            ));
        }
        if !self.counting.region.is_empty() && self.counting.region.len() < 3 {
            return Err(CountError::configuration(
                "counting.region needs at least 3 points",
            ));
        }
        if self.counting.classes.is_empty() {
            return Err(CountError::configuration(
                "counting.classes must name at least one class id",
            ));
        }
        if let Some(id) = self.counting.classes.iter().find(|id| !in_catalog(**id)) {
            return Err(CountError::configuration(format!(
                "counting.classes contains unknown class id {}",
                id
            )));
        }
        if self.counting.history_len == 0 {
            return Err(CountError::configuration("counting.history_len must be > 0"));
        }
        if self.counting.progress_every == 0 {
            return Err(CountError::configuration(
                "counting.progress_every must be > 0",
            ));
        }
        if self.counting.default_gate_half_width <= 0.0 {
            return Err(CountError::configuration(
                "counting.default_gate_half_width must be > 0",
            ));
        }
        if !(self.video.resize_factor > 0.0 && self.video.resize_factor <= 1.0) {
            return Err(CountError::configuration(
                "video.resize_factor must be in (0, 1]",
            ));
        }
        Ok(())
    }
}
