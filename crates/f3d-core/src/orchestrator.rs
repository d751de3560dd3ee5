use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use image::{GenericImage, RgbaImage};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{EngineInput, GenerationEngine, MeshExportOptions, OutputSet, VideoEncoder};
use crate::error::{Error, Result};
use crate::job::{ArtifactKind, Job, JobResult, JobStatus, ModelInfo};
use crate::registry::JobRegistry;
use crate::request::{GenerationRequest, MAX_SEED, OutputFormat};
use crate::store::ArtifactStore;
use crate::sweeper::SweepHandle;

/// Drives a generation request through its whole lifecycle: validate, create
/// the job record, run the pipeline under the engine gate, materialize
/// artifacts, finalize the record, and kick the retention sweeper.
///
/// The engine gate serializes access to the single shared accelerator.
/// Concurrent submissions queue on it rather than overlapping or being
/// rejected, and the guard is dropped on every exit path so an engine
/// failure can never starve later jobs.
pub struct JobOrchestrator {
    registry: JobRegistry,
    store: ArtifactStore,
    engine: Arc<dyn GenerationEngine>,
    encoder: Arc<dyn VideoEncoder>,
    engine_gate: Mutex<()>,
    sweep: SweepHandle,
}

/// Artifact payloads produced by one run, before anything touches disk.
/// `None` marks a requested format the pipeline yielded no data for.
struct Materialized {
    artifacts: Vec<(ArtifactKind, Option<Vec<u8>>)>,
    warnings: Vec<String>,
    model_info: ModelInfo,
}

impl JobOrchestrator {
    pub fn new(
        registry: JobRegistry,
        store: ArtifactStore,
        engine: Arc<dyn GenerationEngine>,
        encoder: Arc<dyn VideoEncoder>,
        sweep: SweepHandle,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            encoder,
            engine_gate: Mutex::new(()),
            sweep,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run one generation request to completion. Validation failures return
    /// an error without creating a job; every other failure mode ends as a
    /// job record in `failed` state, reflected in the returned result rather
    /// than an `Err`.
    ///
    /// The lifecycle runs on a detached task: a caller that stops waiting
    /// (a dropped connection, a transport timeout) does not cancel the job
    /// mid-run, it still reaches a terminal state and stays reclaimable.
    pub async fn submit(self: &Arc<Self>, request: GenerationRequest) -> Result<JobResult> {
        request.validate()?;

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_job(request).await });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::engine(format!("generation task failed: {e}"))),
        }
    }

    async fn run_job(&self, request: GenerationRequest) -> Result<JobResult> {
        let seed = match request.seed {
            Some(seed) => seed,
            None => rand::rng().random_range(0..=MAX_SEED),
        };
        let job = Job::new(request, seed, Utc::now());
        let job_id = job.id;
        self.registry.create(job.clone()).await?;
        info!(job_id = %job_id, prompt = %job.request.prompt, seed, "job submitted");

        let started = Instant::now();
        let outcome = self.generate(&job).await;
        let elapsed = started.elapsed().as_secs_f64();

        let finished = match outcome {
            Ok((artifacts, warnings)) => {
                let produced = artifacts.values().filter(|f| f.is_some()).count();
                if produced == 0 {
                    self.registry
                        .update(&job_id, |j| {
                            j.status = JobStatus::Failed;
                            j.completed_at = Some(Utc::now());
                            j.error =
                                Some("no artifacts produced for any requested format".to_string());
                            j.artifacts = artifacts;
                            j.warnings = warnings;
                        })
                        .await?
                } else {
                    self.registry
                        .update(&job_id, |j| {
                            j.status = JobStatus::Succeeded;
                            j.completed_at = Some(Utc::now());
                            j.artifacts = artifacts;
                            j.warnings = warnings;
                        })
                        .await?
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "generation failed");
                self.registry
                    .update(&job_id, |j| {
                        j.status = JobStatus::Failed;
                        j.completed_at = Some(Utc::now());
                        j.error = Some(e.to_string());
                    })
                    .await?
            }
        };

        info!(
            job_id = %job_id,
            status = ?finished.status,
            elapsed_seconds = elapsed,
            "job finished"
        );
        // Completion is the cue for the sweeper to look for expired jobs.
        self.sweep.trigger();

        Ok(JobResult::from_job(&finished, elapsed))
    }

    /// Engine run plus artifact materialization. Holds the engine gate for
    /// the full span: GLB baking and frame rendering use the same
    /// accelerator as the samplers.
    async fn generate(
        &self,
        job: &Job,
    ) -> Result<(BTreeMap<ArtifactKind, Option<String>>, Vec<String>)> {
        self.registry
            .update(&job.id, |j| j.status = JobStatus::Running)
            .await?;

        let input = EngineInput {
            prompt: job.request.prompt.clone(),
            seed: job.seed,
            sparse_structure: job.request.sparse_structure_params(),
            structured_latent: job.request.structured_latent_params(),
        };

        let gate = self.engine_gate.lock().await;
        debug!(job_id = %job.id, "engine gate acquired");
        let outputs = self.engine.run(&input).await?;

        let request = job.request.clone();
        let encoder = Arc::clone(&self.encoder);
        let materialized =
            tokio::task::spawn_blocking(move || materialize(outputs, &request, encoder.as_ref()))
                .await
                .map_err(|e| Error::engine(format!("artifact materialization panicked: {e}")))?;
        drop(gate);

        self.registry
            .update(&job.id, |j| j.model_info = materialized.model_info.clone())
            .await?;

        let mut artifacts = BTreeMap::new();
        let mut warnings = materialized.warnings;
        for (kind, payload) in materialized.artifacts {
            match payload {
                None => {
                    artifacts.insert(kind, None);
                }
                Some(bytes) => {
                    let filename = kind.filename(&job.id);
                    match self.store.write_artifact(&job.id, &filename, &bytes).await {
                        Ok(_) => {
                            artifacts.insert(kind, Some(filename));
                        }
                        Err(e) => {
                            warn!(job_id = %job.id, ?kind, error = %e, "failed to save artifact");
                            warnings.push(format!("failed to save {}: {e}", kind.filename(&job.id)));
                        }
                    }
                }
            }
        }
        for warning in &warnings {
            warn!(job_id = %job.id, warning = %warning, "generation warning");
        }

        Ok((artifacts, warnings))
    }
}

/// Turn the raw pipeline output into concrete artifact payloads for the
/// requested formats. Each sub-step is independently fault-tolerant: one
/// failed export becomes a warning, not a failed job. Whether zero artifacts
/// overall fails the job is the orchestrator's call, not this function's.
fn materialize(
    outputs: OutputSet,
    request: &GenerationRequest,
    encoder: &dyn VideoEncoder,
) -> Materialized {
    let model_info = ModelInfo {
        formats_generated: outputs.formats_generated(),
        num_gaussians: outputs.gaussians.len(),
        num_meshes: outputs.meshes.len(),
        num_radiance_fields: outputs.num_radiance_fields,
    };
    let mut artifacts = Vec::new();
    let mut warnings = Vec::new();

    if request.wants(OutputFormat::Gaussian) {
        if outputs.gaussians.is_empty() {
            artifacts.push((ArtifactKind::GaussianPly, None));
        } else {
            match outputs.gaussians[0].export_ply() {
                Ok(bytes) => artifacts.push((ArtifactKind::GaussianPly, Some(bytes))),
                Err(e) => warnings.push(format!("gaussian PLY export failed: {e}")),
            }
        }
    }

    if request.wants(OutputFormat::Mesh) {
        if outputs.meshes.is_empty() {
            artifacts.push((ArtifactKind::MeshGlb, None));
        } else if outputs.gaussians.is_empty() {
            // GLB export bakes texture from the paired gaussian.
            warnings.push("mesh GLB export skipped: no gaussian output available".to_string());
        } else {
            let opts = MeshExportOptions {
                simplify_ratio: request.simplify_ratio,
                texture_size: request.texture_size,
            };
            match outputs.meshes[0].export_glb(outputs.gaussians[0].as_ref(), opts) {
                Ok(bytes) => artifacts.push((ArtifactKind::MeshGlb, Some(bytes))),
                Err(e) => warnings.push(format!("mesh GLB export failed: {e}")),
            }
        }
    }

    if request.wants(OutputFormat::Video) {
        match compose_video(&outputs, request, encoder) {
            Ok(Some(bytes)) => artifacts.push((ArtifactKind::PreviewVideo, Some(bytes))),
            Ok(None) => artifacts.push((ArtifactKind::PreviewVideo, None)),
            Err(e) => warnings.push(format!("preview video generation failed: {e}")),
        }
    }

    Materialized {
        artifacts,
        warnings,
        model_info,
    }
}

/// Render a turntable from whichever representations exist: color pass of
/// the gaussian, normal pass of the mesh, concatenated side-by-side per
/// frame when both are present. `Ok(None)` means there was nothing to
/// render, which is degraded rather than failed.
fn compose_video(
    outputs: &OutputSet,
    request: &GenerationRequest,
    encoder: &dyn VideoEncoder,
) -> Result<Option<Vec<u8>>> {
    let mut components: Vec<Vec<RgbaImage>> = Vec::new();
    if let Some(gaussian) = outputs.gaussians.first() {
        let frames = gaussian.render_frames(request.video_frames)?;
        components.push(frames.into_iter().map(|f| f.color).collect());
    }
    if let Some(mesh) = outputs.meshes.first() {
        let frames = mesh.render_frames(request.video_frames)?;
        components.push(frames.into_iter().map(|f| f.normal).collect());
    }

    let frames = match components.len() {
        0 => return Ok(None),
        1 => components.pop().unwrap_or_default(),
        _ => {
            if components[0].len() != components[1].len() {
                return Err(Error::artifact(format!(
                    "frame count mismatch between renders: {} vs {}",
                    components[0].len(),
                    components[1].len()
                )));
            }
            let (left, right) = (components.remove(0), components.remove(0));
            left.into_iter()
                .zip(right)
                .map(|(a, b)| hconcat(&a, &b))
                .collect::<Result<Vec<_>>>()?
        }
    };

    if frames.is_empty() {
        return Ok(None);
    }
    encoder.encode(&frames, request.video_fps).map(Some)
}

fn hconcat(left: &RgbaImage, right: &RgbaImage) -> Result<RgbaImage> {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbaImage::new(width, height);
    canvas
        .copy_from(left, 0, 0)
        .map_err(|e| Error::artifact(format!("frame composition failed: {e}")))?;
    canvas
        .copy_from(right, left.width(), 0)
        .map_err(|e| Error::artifact(format!("frame composition failed: {e}")))?;
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FramePair, GaussianAsset, MeshAsset};
    use crate::sweeper::RetentionSweeper;
    use async_trait::async_trait;
    use image::Rgba;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const PLY_BYTES: &[u8] = b"ply stub gaussian";
    const GLB_BYTES: &[u8] = b"glTF stub mesh";

    fn solid_frame(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 8, Rgba([value, value, value, 255]))
    }

    struct StubGaussian {
        extra_frames: u32,
    }

    impl GaussianAsset for StubGaussian {
        fn export_ply(&self) -> Result<Vec<u8>> {
            Ok(PLY_BYTES.to_vec())
        }

        fn render_frames(&self, count: u32) -> Result<Vec<FramePair>> {
            Ok((0..count + self.extra_frames)
                .map(|_| FramePair {
                    color: solid_frame(10),
                    normal: solid_frame(20),
                })
                .collect())
        }
    }

    struct StubMesh {
        extra_frames: u32,
    }

    impl MeshAsset for StubMesh {
        fn export_glb(
            &self,
            _gaussian: &dyn GaussianAsset,
            _opts: MeshExportOptions,
        ) -> Result<Vec<u8>> {
            Ok(GLB_BYTES.to_vec())
        }

        fn render_frames(&self, count: u32) -> Result<Vec<FramePair>> {
            Ok((0..count + self.extra_frames)
                .map(|_| FramePair {
                    color: solid_frame(30),
                    normal: solid_frame(40),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct MockEngine {
        gaussians: usize,
        meshes: usize,
        mesh_extra_frames: u32,
        fail: Option<String>,
        delay: Option<Duration>,
        active: AtomicUsize,
        overlapped: AtomicBool,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl GenerationEngine for MockEngine {
        async fn run(&self, _input: &EngineInput) -> Result<OutputSet> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if let Some(msg) = &self.fail {
                return Err(Error::engine(msg.clone()));
            }
            let mut outputs = OutputSet::default();
            for _ in 0..self.gaussians {
                outputs.gaussians.push(Box::new(StubGaussian { extra_frames: 0 }));
            }
            for _ in 0..self.meshes {
                outputs.meshes.push(Box::new(StubMesh {
                    extra_frames: self.mesh_extra_frames,
                }));
            }
            outputs.num_radiance_fields = 1;
            Ok(outputs)
        }
    }

    struct StubEncoder;

    impl VideoEncoder for StubEncoder {
        fn encode(&self, frames: &[RgbaImage], fps: u32) -> Result<Vec<u8>> {
            let (w, h) = frames
                .first()
                .map(|f| (f.width(), f.height()))
                .unwrap_or((0, 0));
            Ok(format!("video {w}x{h} {} frames @{fps}fps", frames.len()).into_bytes())
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        orchestrator: Arc<JobOrchestrator>,
    }

    fn fixture(engine: Arc<MockEngine>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let store = ArtifactStore::new(tmp.path().join("artifacts")).unwrap();
        let sweep = RetentionSweeper::new(
            registry.clone(),
            store.clone(),
            chrono::Duration::hours(1),
        )
        .spawn(None);
        Fixture {
            _tmp: tmp,
            orchestrator: Arc::new(JobOrchestrator::new(
                registry,
                store,
                engine,
                Arc::new(StubEncoder),
                sweep,
            )),
        }
    }

    fn request(formats: &[&str]) -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "prompt": "A simple red cube",
            "formats": formats,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn submit_yields_unique_job_ids() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            ..Default::default()
        }));
        let a = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        let b = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert_ne!(a.job_id, b.job_id);
    }

    #[tokio::test]
    async fn validation_failure_creates_no_job() {
        let fx = fixture(Arc::new(MockEngine::default()));
        let mut req = request(&["gaussian"]);
        req.prompt = "  ".into();
        assert!(matches!(
            fx.orchestrator.submit(req).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut req = request(&["gaussian"]);
        req.ss_cfg_strength = 99.0;
        assert!(matches!(
            fx.orchestrator.submit(req).await.unwrap_err(),
            Error::Validation(_)
        ));

        assert!(fx.orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn omitted_seed_resolved_within_bounds() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            ..Default::default()
        }));
        let result = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert!(result.seed <= MAX_SEED);
        let job = fx.orchestrator.registry().get(&result.job_id).await.unwrap();
        assert_eq!(job.seed, result.seed);
    }

    #[tokio::test]
    async fn gaussian_request_produces_one_retrievable_artifact() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            ..Default::default()
        }));
        let result = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.files.len(), 1);

        let filename = format!("{}_gaussian.ply", result.job_id);
        assert_eq!(
            result.files[&ArtifactKind::GaussianPly],
            Some(format!("/files/{}/{filename}", result.job_id))
        );
        let path = fx
            .orchestrator
            .store()
            .resolve(&result.job_id, &filename)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), PLY_BYTES);
    }

    #[tokio::test]
    async fn red_cube_scenario_mesh_only() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            meshes: 1,
            ..Default::default()
        }));
        let mut req = request(&["mesh"]);
        req.seed = Some(42);
        let result = fx.orchestrator.submit(req).await.unwrap();

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.seed, 42);
        // Only the requested format is materialized; the gaussian was still
        // available internally to bake the GLB.
        assert!(result.files.contains_key(&ArtifactKind::MeshGlb));
        assert!(!result.files.contains_key(&ArtifactKind::GaussianPly));

        let filename = format!("{}_mesh.glb", result.job_id);
        let path = fx
            .orchestrator
            .store()
            .resolve(&result.job_id, &filename)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), GLB_BYTES);
    }

    #[tokio::test]
    async fn mesh_without_gaussian_fails_the_job() {
        let fx = fixture(Arc::new(MockEngine {
            meshes: 1,
            ..Default::default()
        }));
        let result = fx.orchestrator.submit(request(&["mesh"])).await.unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.files.values().all(|f| f.is_none()));
        let job = fx.orchestrator.registry().get(&result.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert!(!job.warnings.is_empty());
    }

    #[tokio::test]
    async fn empty_output_for_one_format_is_degraded_not_failed() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            meshes: 0,
            ..Default::default()
        }));
        let result = fx
            .orchestrator
            .submit(request(&["gaussian", "mesh"]))
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Succeeded);
        assert!(result.files[&ArtifactKind::GaussianPly].is_some());
        assert_eq!(result.files[&ArtifactKind::MeshGlb], None);
    }

    #[tokio::test]
    async fn engine_failure_marks_job_failed_and_releases_gate() {
        let engine = Arc::new(MockEngine {
            fail: Some("CUDA out of memory".into()),
            ..Default::default()
        });
        let fx = fixture(engine.clone());

        let result = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.message.contains("CUDA out of memory"));

        // The gate must be free for the next submission.
        let result = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(engine.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_submissions_never_overlap_engine_runs() {
        let engine = Arc::new(MockEngine {
            gaussians: 1,
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let fx = fixture(engine.clone());

        let (a, b) = tokio::join!(
            fx.orchestrator.submit(request(&["gaussian"])),
            fx.orchestrator.submit(request(&["gaussian"]))
        );
        assert_eq!(a.unwrap().status, JobStatus::Succeeded);
        assert_eq!(b.unwrap().status, JobStatus::Succeeded);
        assert_eq!(engine.runs.load(Ordering::SeqCst), 2);
        assert!(!engine.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn abandoned_submission_still_reaches_a_terminal_state() {
        let engine = Arc::new(MockEngine {
            gaussians: 1,
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let fx = fixture(engine.clone());

        // A caller that walks away mid-run: drop the waiting future while
        // the engine is still inside its delay.
        let orchestrator = Arc::clone(&fx.orchestrator);
        let waiter = tokio::spawn(async move {
            orchestrator.submit(request(&["gaussian"])).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        // The job record must not stay non-terminal forever; poll until the
        // detached lifecycle finishes it.
        let registry = fx.orchestrator.registry();
        let mut finished = Vec::new();
        for _ in 0..100 {
            finished = registry
                .list_expired(chrono::Duration::zero(), Utc::now() + chrono::Duration::hours(1))
                .await;
            if !finished.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Succeeded);
        assert!(finished[0].completed_at.is_some());
        assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn video_composes_both_renders_side_by_side() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            meshes: 1,
            ..Default::default()
        }));
        let result = fx.orchestrator.submit(request(&["video"])).await.unwrap();

        assert_eq!(result.status, JobStatus::Succeeded);
        let filename = format!("{}_preview.mp4", result.job_id);
        let path = fx
            .orchestrator
            .store()
            .resolve(&result.job_id, &filename)
            .await
            .unwrap();
        let bytes = tokio::fs::read(path).await.unwrap();
        // Two 8px-wide renders concatenated per frame, default frame count.
        assert_eq!(bytes, b"video 16x8 120 frames @15fps");
    }

    #[tokio::test]
    async fn frame_count_mismatch_only_loses_the_video() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            meshes: 1,
            mesh_extra_frames: 1,
            ..Default::default()
        }));
        let result = fx
            .orchestrator
            .submit(request(&["gaussian", "video"]))
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Succeeded);
        assert!(result.files[&ArtifactKind::GaussianPly].is_some());
        assert!(!result.files.contains_key(&ArtifactKind::PreviewVideo));
        let job = fx.orchestrator.registry().get(&result.job_id).await.unwrap();
        assert!(job.warnings.iter().any(|w| w.contains("frame count")));
    }

    #[tokio::test]
    async fn model_info_reports_pipeline_counts() {
        let fx = fixture(Arc::new(MockEngine {
            gaussians: 1,
            meshes: 1,
            ..Default::default()
        }));
        let result = fx.orchestrator.submit(request(&["gaussian"])).await.unwrap();
        assert_eq!(result.model_info.num_gaussians, 1);
        assert_eq!(result.model_info.num_meshes, 1);
        assert_eq!(result.model_info.num_radiance_fields, 1);
        assert!(
            result
                .model_info
                .formats_generated
                .contains(&"radiance_field".to_string())
        );
    }
}
