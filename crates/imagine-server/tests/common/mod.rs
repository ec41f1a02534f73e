// Shared by multiple test binaries; not every helper is used by each.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use image::RgbImage;
use imagine_core::pipeline::{
    GenerationSpec, Pipeline, PipelineError, PipelineFactory, PipelineMode, ProgressFn,
};
use imagine_server::config::{Device, ServerConfig};
use imagine_server::state::AppState;
use tower::ServiceExt;

/// Observations shared between a test and its stub pipeline.
#[derive(Default)]
pub struct TestProbe {
    pub loads: AtomicU32,
    pub saw_cancel: AtomicBool,
}

impl TestProbe {
    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }
}

/// Stub backend: runs the requested number of steps with a small
/// per-step delay, honoring the callback contract exactly.
pub struct TestFactory {
    pub probe: Arc<TestProbe>,
    pub step_delay: Duration,
    pub fail: bool,
}

impl TestFactory {
    pub fn new(probe: Arc<TestProbe>) -> Self {
        Self {
            probe,
            step_delay: Duration::from_millis(1),
            fail: false,
        }
    }
}

impl PipelineFactory for TestFactory {
    fn load(&self, _model: &Path, _mode: PipelineMode) -> Result<Box<dyn Pipeline>, PipelineError> {
        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestPipeline {
            probe: self.probe.clone(),
            step_delay: self.step_delay,
            fail: self.fail,
        }))
    }
}

struct TestPipeline {
    probe: Arc<TestProbe>,
    step_delay: Duration,
    fail: bool,
}

impl Pipeline for TestPipeline {
    fn run(
        &mut self,
        spec: &GenerationSpec,
        mut on_step: Option<&mut ProgressFn>,
    ) -> Result<RgbImage, PipelineError> {
        if self.fail {
            return Err(PipelineError::Execution("stub backend failure".into()));
        }
        for step in 1..=spec.steps {
            std::thread::sleep(self.step_delay);
            if spec.emits_progress_at(step) {
                if let Some(cb) = on_step.as_deref_mut() {
                    if cb(step, RgbImage::new(spec.width, spec.height)).is_err() {
                        self.probe.saw_cancel.store(true, Ordering::SeqCst);
                        return Err(PipelineError::Aborted);
                    }
                }
            }
        }
        Ok(RgbImage::new(spec.width, spec.height))
    }
}

pub fn test_config(models_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        models_dir,
        device: Device::Cpu,
        full_precision: false,
    }
}

/// Full router over an arbitrary factory, mirroring `main.rs`.
pub fn build_test_app(models_dir: PathBuf, factory: Arc<dyn PipelineFactory>) -> Router {
    let state = Arc::new(AppState::new(test_config(models_dir), factory));
    imagine_server::build_app(state)
}

/// Models dir containing one fake model file, `test_model.safetensors`.
pub fn models_dir_with_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("test_model.safetensors"), b"weights").unwrap();
    dir
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Split an NDJSON body into parsed lines.
pub async fn body_lines(response: Response<Body>) -> Vec<serde_json::Value> {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
