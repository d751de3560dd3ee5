use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest accepted seed value. Matches the 32-bit signed range the pipeline
/// samplers are seeded with.
pub const MAX_SEED: u64 = i32::MAX as u64;

/// Output formats a client may request. `gaussian` is the point-cloud
/// representation (Gaussian splat), `mesh` the textured GLB export, `video`
/// the turntable preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[serde(alias = "point_cloud", alias = "point-cloud")]
    Gaussian,
    Mesh,
    Video,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::Mesh => "mesh",
            Self::Video => "video",
        }
    }
}

/// Sampling controls for one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub steps: u32,
    pub cfg_strength: f32,
}

/// A text-to-3D generation request. Field names and defaults follow the wire
/// format: two sampler stages (sparse structure, structured latent), video
/// options, and GLB export options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,

    /// Seed for reproducible generation. Drawn at random when absent and
    /// recorded on the job either way.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,

    #[serde(default = "default_steps")]
    pub ss_steps: u32,
    #[serde(default = "default_cfg_strength")]
    pub ss_cfg_strength: f32,

    #[serde(default = "default_steps")]
    pub slat_steps: u32,
    #[serde(default = "default_cfg_strength")]
    pub slat_cfg_strength: f32,

    #[serde(default = "default_video_frames")]
    pub video_frames: u32,
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,

    #[serde(default = "default_simplify_ratio")]
    pub simplify_ratio: f32,
    #[serde(default = "default_texture_size")]
    pub texture_size: u32,
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Mesh, OutputFormat::Gaussian]
}

fn default_steps() -> u32 {
    12
}

fn default_cfg_strength() -> f32 {
    7.5
}

fn default_video_frames() -> u32 {
    120
}

fn default_video_fps() -> u32 {
    15
}

fn default_simplify_ratio() -> f32 {
    0.95
}

fn default_texture_size() -> u32 {
    1024
}

impl GenerationRequest {
    /// Bounds-check every field. Out-of-range values are rejected, never
    /// clamped, and no job record exists yet when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::validation("prompt must not be empty"));
        }
        if self.formats.is_empty() {
            return Err(Error::validation("at least one output format is required"));
        }
        if let Some(seed) = self.seed
            && seed > MAX_SEED
        {
            return Err(Error::validation(format!("seed must be <= {MAX_SEED}")));
        }
        check_range_u32("ss_steps", self.ss_steps, 1, 50)?;
        check_range_f32("ss_cfg_strength", self.ss_cfg_strength, 0.0, 20.0)?;
        check_range_u32("slat_steps", self.slat_steps, 1, 50)?;
        check_range_f32("slat_cfg_strength", self.slat_cfg_strength, 0.0, 20.0)?;
        check_range_u32("video_frames", self.video_frames, 30, 240)?;
        check_range_u32("video_fps", self.video_fps, 10, 60)?;
        check_range_f32("simplify_ratio", self.simplify_ratio, 0.5, 1.0)?;
        check_range_u32("texture_size", self.texture_size, 512, 2048)?;
        Ok(())
    }

    pub fn wants(&self, format: OutputFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn sparse_structure_params(&self) -> StageParams {
        StageParams {
            steps: self.ss_steps,
            cfg_strength: self.ss_cfg_strength,
        }
    }

    pub fn structured_latent_params(&self) -> StageParams {
        StageParams {
            steps: self.slat_steps,
            cfg_strength: self.slat_cfg_strength,
        }
    }
}

fn check_range_u32(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(Error::validation(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

fn check_range_f32(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(Error::validation(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        serde_json::from_value(serde_json::json!({ "prompt": prompt })).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let req = request("a ceramic teapot");
        assert!(req.validate().is_ok());
        assert_eq!(req.ss_steps, 12);
        assert_eq!(req.slat_cfg_strength, 7.5);
        assert_eq!(
            req.formats,
            vec![OutputFormat::Mesh, OutputFormat::Gaussian]
        );
    }

    #[test]
    fn empty_prompt_rejected() {
        assert!(matches!(
            request("   ").validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn empty_format_set_rejected() {
        let mut req = request("a chair");
        req.formats.clear();
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn unknown_format_rejected_at_deserialization() {
        let result: std::result::Result<GenerationRequest, _> = serde_json::from_value(
            serde_json::json!({ "prompt": "a chair", "formats": ["hologram"] }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn point_cloud_aliases_gaussian() {
        let req: GenerationRequest = serde_json::from_value(
            serde_json::json!({ "prompt": "a chair", "formats": ["point_cloud"] }),
        )
        .unwrap();
        assert_eq!(req.formats, vec![OutputFormat::Gaussian]);
    }

    #[test]
    fn out_of_range_steps_rejected_not_clamped() {
        let mut req = request("a chair");
        req.ss_steps = 51;
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
        req.ss_steps = 0;
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn out_of_range_cfg_rejected() {
        let mut req = request("a chair");
        req.slat_cfg_strength = 20.5;
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn oversized_seed_rejected() {
        let mut req = request("a chair");
        req.seed = Some(MAX_SEED + 1);
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
        req.seed = Some(MAX_SEED);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn video_bounds_enforced() {
        let mut req = request("a chair");
        req.video_frames = 29;
        assert!(req.validate().is_err());
        req.video_frames = 240;
        req.video_fps = 61;
        assert!(req.validate().is_err());
    }
}
