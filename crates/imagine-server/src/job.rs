use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{ImageFormat, RgbImage};
use imagine_core::pipeline::{Aborted, GenerationSpec, PipelineError, PipelineFactory, ProgressFn};
use imagine_core::record::ImageRecord;
use tokio::sync::{mpsc, oneshot};

/// Bounded wait for one progress poll, so a closed sink is noticed
/// between events.
pub const PROGRESS_POLL: Duration = Duration::from_millis(100);

/// Hard bound on waiting for the generation thread during teardown.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// Terminal failure of a job, reported through the result channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The cancellation flag was observed before completion.
    Cancelled,
    Failed(String),
}

/// Outcome of one bounded progress poll.
#[derive(Debug)]
pub enum ProgressTick {
    Record(ImageRecord),
    /// The runner closed the progress channel; no more records will come.
    Closed,
    /// Poll window elapsed with nothing to report.
    Idle,
}

/// One in-flight generation: a dedicated thread owning the loaded
/// pipeline, reporting through a progress channel and a result channel,
/// cancellable via a set-once atomic flag.
pub struct JobHandle {
    seed: u64,
    cancel: Arc<AtomicBool>,
    progress_rx: mpsc::UnboundedReceiver<ImageRecord>,
    result_rx: Option<oneshot::Receiver<Result<ImageRecord, JobError>>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Spawn the generation thread for a validated request.
pub fn start(factory: Arc<dyn PipelineFactory>, model: PathBuf, spec: GenerationSpec) -> JobHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = oneshot::channel();

    let seed = spec.seed;
    let flag = cancel.clone();
    let thread = thread::spawn(move || {
        let outcome = run_job(factory, &model, &spec, &flag, &progress_tx);
        if result_tx.send(outcome).is_err() {
            log::debug!("result receiver dropped for seed {seed}");
        }
        // progress_tx drops here: the stream-end marker for the drainer.
        log::info!("pipeline released for seed {seed}");
    });

    JobHandle {
        seed,
        cancel,
        progress_rx,
        result_rx: Some(result_rx),
        thread: Some(thread),
    }
}

fn run_job(
    factory: Arc<dyn PipelineFactory>,
    model: &PathBuf,
    spec: &GenerationSpec,
    cancel: &AtomicBool,
    progress_tx: &mpsc::UnboundedSender<ImageRecord>,
) -> Result<ImageRecord, JobError> {
    let mut pipeline = factory
        .load(model, spec.mode())
        .map_err(|e| JobError::Failed(e.to_string()))?;

    let seed = spec.seed;
    let mut on_step = |step: u32, preview: RgbImage| -> Result<(), Aborted> {
        if cancel.load(Ordering::SeqCst) {
            log::info!("generation (seed {seed}) cancelled at step {step} by disconnect signal");
            return Err(Aborted);
        }
        match encode_png_base64(&preview) {
            Ok(img) => {
                let _ = progress_tx.send(ImageRecord::intermediate(img, seed));
            }
            Err(e) => log::warn!("failed to encode preview at step {step}: {e}"),
        }
        Ok(())
    };

    // The callback is only wired up when a streaming interval was
    // requested; without it the run is not observable mid-flight.
    let callback: Option<&mut ProgressFn> = if spec.stream.is_some() {
        Some(&mut on_step)
    } else {
        None
    };

    match pipeline.run(spec, callback) {
        Ok(image) => {
            if cancel.load(Ordering::SeqCst) {
                Err(JobError::Cancelled)
            } else {
                let img = encode_png_base64(&image).map_err(|e| JobError::Failed(e.to_string()))?;
                Ok(ImageRecord::finished(img, seed))
            }
        }
        Err(PipelineError::Aborted) => Err(JobError::Cancelled),
        Err(e) => Err(JobError::Failed(e.to_string())),
    }
}

fn encode_png_base64(image: &RgbImage) -> Result<String, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(BASE64.encode(buffer.into_inner()))
}

impl JobHandle {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Request cancellation. Idempotent; observed by the runner at its
    /// next progress checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// One bounded poll of the progress channel.
    pub async fn progress_tick(&mut self) -> ProgressTick {
        match tokio::time::timeout(PROGRESS_POLL, self.progress_rx.recv()).await {
            Ok(Some(record)) => ProgressTick::Record(record),
            Ok(None) => ProgressTick::Closed,
            Err(_) => ProgressTick::Idle,
        }
    }

    /// Wait for the terminal outcome. A runner that died without
    /// reporting counts as a failure, not a hang.
    pub async fn result(&mut self) -> Result<ImageRecord, JobError> {
        match self.result_rx.take() {
            Some(rx) => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(JobError::Failed(
                    "generation thread ended without a result".into(),
                )),
            },
            None => Err(JobError::Failed("job result already consumed".into())),
        }
    }

    /// Cancel and wait (bounded) for the generation thread, so the
    /// loaded model is released before the handle is considered gone.
    pub async fn shutdown(mut self) {
        self.cancel();
        let Some(handle) = self.thread.take() else {
            return;
        };
        let seed = self.seed;
        let join = tokio::task::spawn_blocking(move || {
            let _ = handle.join();
        });
        match tokio::time::timeout(SHUTDOWN_WAIT, join).await {
            Ok(_) => log::debug!("generation thread for seed {seed} shut down"),
            Err(_) => log::warn!(
                "generation thread (seed {seed}) did not stop within {SHUTDOWN_WAIT:?}; it may still be running"
            ),
        }
    }
}

impl Drop for JobHandle {
    /// A handle dropped mid-run (e.g. the handler future was aborted on
    /// a buffered-path disconnect) still signals the runner to stop; the
    /// thread detaches and exits at its next checkpoint.
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.cancel.store(true, Ordering::SeqCst);
            if !handle.is_finished() {
                log::debug!("job handle for seed {} dropped mid-run", self.seed);
            }
        }
    }
}
