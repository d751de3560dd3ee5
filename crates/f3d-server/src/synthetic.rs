//! Development stand-in for the real generation pipeline. Produces
//! deterministic procedural assets from the seed so the service runs
//! end-to-end without model weights or an accelerator. Wiring up a real
//! pipeline means replacing this module's `GenerationEngine` and
//! `VideoEncoder` implementations.

use async_trait::async_trait;
use f3d_core::engine::{
    EngineInput, FramePair, GaussianAsset, GenerationEngine, MeshAsset, MeshExportOptions,
    OutputSet, VideoEncoder,
};
use f3d_core::{Error, Result};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

const POINT_COUNT: usize = 512;
const FRAME_SIZE: u32 = 64;

pub struct SyntheticEngine {
    device: String,
}

impl SyntheticEngine {
    pub fn initialize(device: &str) -> Result<Self> {
        info!(device, "initializing synthetic engine (procedural stand-in)");
        Ok(Self {
            device: device.to_string(),
        })
    }

    /// The synthetic engine computes on the CPU regardless of the hint.
    pub fn accelerator_available(&self) -> bool {
        false
    }
}

#[async_trait]
impl GenerationEngine for SyntheticEngine {
    async fn run(&self, input: &EngineInput) -> Result<OutputSet> {
        info!(
            prompt = %input.prompt,
            seed = input.seed,
            device = %self.device,
            ss_steps = input.sparse_structure.steps,
            slat_steps = input.structured_latent.steps,
            "running synthetic generation"
        );
        let mut rng = StdRng::seed_from_u64(input.seed);
        let points: Vec<[f32; 6]> = (0..POINT_COUNT)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                ]
            })
            .collect();
        let tint = [rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()];

        let mut outputs = OutputSet::default();
        outputs
            .gaussians
            .push(Box::new(SyntheticGaussian { points, tint }));
        outputs.meshes.push(Box::new(SyntheticMesh {
            seed: input.seed,
            tint,
        }));
        outputs.num_radiance_fields = 1;
        Ok(outputs)
    }
}

struct SyntheticGaussian {
    points: Vec<[f32; 6]>,
    tint: [u8; 3],
}

impl GaussianAsset for SyntheticGaussian {
    fn export_ply(&self) -> Result<Vec<u8>> {
        use std::fmt::Write;
        let mut out = String::new();
        out.push_str("ply\nformat ascii 1.0\ncomment forge3d synthetic gaussian\n");
        let _ = writeln!(out, "element vertex {}", self.points.len());
        out.push_str(
            "property float x\nproperty float y\nproperty float z\n\
             property float red\nproperty float green\nproperty float blue\n\
             end_header\n",
        );
        for p in &self.points {
            let _ = writeln!(out, "{} {} {} {} {} {}", p[0], p[1], p[2], p[3], p[4], p[5]);
        }
        Ok(out.into_bytes())
    }

    fn render_frames(&self, count: u32) -> Result<Vec<FramePair>> {
        Ok(turntable_frames(count, self.tint))
    }
}

struct SyntheticMesh {
    seed: u64,
    tint: [u8; 3],
}

impl MeshAsset for SyntheticMesh {
    fn export_glb(&self, gaussian: &dyn GaussianAsset, opts: MeshExportOptions) -> Result<Vec<u8>> {
        // Texture baking normally needs the paired gaussian; here it only
        // contributes its size to the extras block.
        let baked_points = gaussian.export_ply()?.len();
        let json = serde_json::json!({
            "asset": { "version": "2.0", "generator": "forge3d-synthetic" },
            "extras": {
                "seed": self.seed,
                "simplify_ratio": opts.simplify_ratio,
                "texture_size": opts.texture_size,
                "baked_from_bytes": baked_points,
            }
        });
        Ok(glb_container(json.to_string().into_bytes()))
    }

    fn render_frames(&self, count: u32) -> Result<Vec<FramePair>> {
        Ok(turntable_frames(count, self.tint))
    }
}

/// Solid-color frames whose brightness sweeps over the turntable rotation.
fn turntable_frames(count: u32, tint: [u8; 3]) -> Vec<FramePair> {
    (0..count)
        .map(|i| {
            let phase = (i as f32 / count.max(1) as f32 * std::f32::consts::TAU).sin();
            let shade = |c: u8| ((c as f32) * (0.6 + 0.4 * phase.abs())) as u8;
            let color = RgbaImage::from_pixel(
                FRAME_SIZE,
                FRAME_SIZE,
                Rgba([shade(tint[0]), shade(tint[1]), shade(tint[2]), 255]),
            );
            let normal = RgbaImage::from_pixel(
                FRAME_SIZE,
                FRAME_SIZE,
                Rgba([128, 128, shade(255), 255]),
            );
            FramePair { color, normal }
        })
        .collect()
}

/// Wrap a JSON chunk in a binary glTF container (magic, version 2, one
/// 4-byte-aligned JSON chunk).
fn glb_container(mut json: Vec<u8>) -> Vec<u8> {
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut out = Vec::with_capacity(20 + json.len());
    out.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&((20 + json.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
    out.extend_from_slice(&json);
    out
}

/// Placeholder container: a tagged header followed by raw RGBA frames. Not a
/// playable mp4; a real deployment plugs an actual encoder in here.
pub struct SyntheticVideoEncoder;

impl VideoEncoder for SyntheticVideoEncoder {
    fn encode(&self, frames: &[RgbaImage], fps: u32) -> Result<Vec<u8>> {
        let first = frames
            .first()
            .ok_or_else(|| Error::artifact("no frames to encode"))?;
        let mut out = Vec::new();
        out.extend_from_slice(b"F3DVID\0\0");
        out.extend_from_slice(&first.width().to_le_bytes());
        out.extend_from_slice(&first.height().to_le_bytes());
        out.extend_from_slice(&fps.to_le_bytes());
        out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        for frame in frames {
            out.extend_from_slice(frame.as_raw());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(seed: u64) -> EngineInput {
        EngineInput {
            prompt: "a test object".into(),
            seed,
            sparse_structure: f3d_core::request::StageParams {
                steps: 12,
                cfg_strength: 7.5,
            },
            structured_latent: f3d_core::request::StageParams {
                steps: 12,
                cfg_strength: 7.5,
            },
        }
    }

    #[tokio::test]
    async fn same_seed_same_ply() {
        let engine = SyntheticEngine::initialize("cpu").unwrap();
        let a = engine.run(&input(42)).await.unwrap();
        let b = engine.run(&input(42)).await.unwrap();
        assert_eq!(
            a.gaussians[0].export_ply().unwrap(),
            b.gaussians[0].export_ply().unwrap()
        );

        let c = engine.run(&input(43)).await.unwrap();
        assert_ne!(
            a.gaussians[0].export_ply().unwrap(),
            c.gaussians[0].export_ply().unwrap()
        );
    }

    #[tokio::test]
    async fn glb_export_has_gltf_magic() {
        let engine = SyntheticEngine::initialize("cpu").unwrap();
        let outputs = engine.run(&input(1)).await.unwrap();
        let glb = outputs.meshes[0]
            .export_glb(
                outputs.gaussians[0].as_ref(),
                MeshExportOptions {
                    simplify_ratio: 0.95,
                    texture_size: 1024,
                },
            )
            .unwrap();
        assert_eq!(&glb[..4], b"glTF");
        assert_eq!(glb.len() % 4, 0);
    }

    #[test]
    fn encoder_rejects_empty_frame_list() {
        assert!(SyntheticVideoEncoder.encode(&[], 15).is_err());
    }
}
