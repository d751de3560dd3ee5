//! Boundary to the generative pipeline. The pipeline itself (models,
//! rendering, encoding) lives behind these traits; the core only needs
//! "given a prompt and sampling parameters, produce exportable assets or
//! fail".

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::Result;
use crate::request::StageParams;

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone)]
pub struct EngineInput {
    pub prompt: String,
    pub seed: u64,
    pub sparse_structure: StageParams,
    pub structured_latent: StageParams,
}

/// One rendered turntable frame: color pass and normal pass. Gaussian
/// previews use the color channel, mesh previews the normal channel.
pub struct FramePair {
    pub color: RgbaImage,
    pub normal: RgbaImage,
}

/// A generated Gaussian splat, exportable as a PLY point cloud.
pub trait GaussianAsset: Send + Sync {
    fn export_ply(&self) -> Result<Vec<u8>>;
    fn render_frames(&self, count: u32) -> Result<Vec<FramePair>>;
}

#[derive(Debug, Clone, Copy)]
pub struct MeshExportOptions {
    pub simplify_ratio: f32,
    pub texture_size: u32,
}

/// A generated mesh. GLB export bakes texture from the paired Gaussian, so
/// it cannot happen without one.
pub trait MeshAsset: Send + Sync {
    fn export_glb(&self, gaussian: &dyn GaussianAsset, opts: MeshExportOptions) -> Result<Vec<u8>>;
    fn render_frames(&self, count: u32) -> Result<Vec<FramePair>>;
}

/// Raw pipeline output for one run. The radiance field representation is
/// internal-only and never materialized to a file; only its count survives
/// into job metadata.
#[derive(Default)]
pub struct OutputSet {
    pub gaussians: Vec<Box<dyn GaussianAsset>>,
    pub meshes: Vec<Box<dyn MeshAsset>>,
    pub num_radiance_fields: usize,
}

impl OutputSet {
    pub fn formats_generated(&self) -> Vec<String> {
        let mut formats = Vec::new();
        if !self.gaussians.is_empty() {
            formats.push("gaussian".to_string());
        }
        if !self.meshes.is_empty() {
            formats.push("mesh".to_string());
        }
        if self.num_radiance_fields > 0 {
            formats.push("radiance_field".to_string());
        }
        formats
    }
}

/// The shared generation pipeline. Long-running (minutes-scale) and bound to
/// a single accelerator; the orchestrator serializes every `run` call behind
/// its engine gate. Failures come back as `Error::Engine`, never a panic.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    async fn run(&self, input: &EngineInput) -> Result<OutputSet>;
}

/// Encodes composed preview frames into a video container. Encoding
/// internals belong to the pipeline integration, not the core.
pub trait VideoEncoder: Send + Sync {
    fn encode(&self, frames: &[RgbaImage], fps: u32) -> Result<Vec<u8>>;
}
