use std::convert::Infallible;

use axum::body::{Body, Bytes};
use futures::StreamExt;
use imagine_core::record::ErrorRecord;
use imagine_core::record::ImageRecord;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::job::{JobError, JobHandle, ProgressTick};

/// Chunked NDJSON response body for a streaming job.
///
/// A drainer task bridges the job's channels onto the body channel; the
/// transport signals a gone peer purely by closing that channel, so the
/// runner's cancellation contract never sees a network error type.
pub fn ndjson_body(handle: JobHandle) -> Body {
    let (line_tx, line_rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(drive(handle, line_tx));
    Body::from_stream(UnboundedReceiverStream::new(line_rx).map(Ok::<_, Infallible>))
}

/// Non-streaming delivery: single blocking read of the result channel.
pub async fn drain_buffered(mut handle: JobHandle) -> Result<ImageRecord, JobError> {
    let outcome = handle.result().await;
    handle.shutdown().await;
    outcome
}

/// Pump progress records, then exactly one terminal line. A failed or
/// closed sink means the peer disconnected: cancel the job and wait for
/// the runner to release its resources instead of reporting anything.
async fn drive(mut handle: JobHandle, line_tx: mpsc::UnboundedSender<Bytes>) {
    let seed = handle.seed();

    loop {
        if line_tx.is_closed() {
            log::info!("client disconnected mid-stream; cancelling generation for seed {seed}");
            handle.shutdown().await;
            return;
        }
        match handle.progress_tick().await {
            ProgressTick::Record(record) => {
                let Some(line) = to_line(&record) else { continue };
                if line_tx.send(line).is_err() {
                    log::info!(
                        "client disconnected mid-stream; cancelling generation for seed {seed}"
                    );
                    handle.shutdown().await;
                    return;
                }
            }
            ProgressTick::Closed => break,
            ProgressTick::Idle => continue,
        }
    }

    let terminal = match handle.result().await {
        Ok(record) => to_line(&record),
        Err(JobError::Cancelled) => {
            log::info!("generation for seed {seed} cancelled; stream closed without a final record");
            None
        }
        // Headers are already on the wire, so mid-stream failures go
        // in-band rather than as a status code.
        Err(JobError::Failed(detail)) => to_line(&ErrorRecord {
            error: "Internal server error during image generation".into(),
            details: Some(detail),
        }),
    };

    if let Some(line) = terminal {
        let _ = line_tx.send(line);
    }
    handle.shutdown().await;
}

fn to_line<T: Serialize>(value: &T) -> Option<Bytes> {
    match serde_json::to_vec(value) {
        Ok(mut line) => {
            line.push(b'\n');
            Some(Bytes::from(line))
        }
        Err(e) => {
            log::warn!("failed to serialize stream record: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use image::RgbImage;
    use imagine_core::Sampler;
    use imagine_core::pipeline::{
        GenerationSpec, Pipeline, PipelineError, PipelineFactory, PipelineMode, ProgressFn,
    };
    use imagine_core::record::{RecordStatus, StreamRecord};

    use super::*;
    use crate::job;

    struct InlinePipeline {
        fail: bool,
    }

    impl Pipeline for InlinePipeline {
        fn run(
            &mut self,
            spec: &GenerationSpec,
            mut on_step: Option<&mut ProgressFn>,
        ) -> Result<RgbImage, PipelineError> {
            if self.fail {
                return Err(PipelineError::Execution("exploded".into()));
            }
            for step in 1..=spec.steps {
                if spec.emits_progress_at(step) {
                    if let Some(cb) = on_step.as_deref_mut() {
                        cb(step, RgbImage::new(4, 4)).map_err(|_| PipelineError::Aborted)?;
                    }
                }
            }
            Ok(RgbImage::new(4, 4))
        }
    }

    struct InlineFactory {
        fail: bool,
    }

    impl PipelineFactory for InlineFactory {
        fn load(
            &self,
            _model: &Path,
            _mode: PipelineMode,
        ) -> Result<Box<dyn Pipeline>, PipelineError> {
            Ok(Box::new(InlinePipeline { fail: self.fail }))
        }
    }

    fn spec(stream: Option<u32>) -> GenerationSpec {
        GenerationSpec {
            prompt: "x".into(),
            neg_prompt: String::new(),
            width: 4,
            height: 4,
            steps: 6,
            guidance: 7.0,
            sampler: Sampler::default(),
            seed: 5,
            source: None,
            strength: 0.8,
            clip_skip: 1,
            stream,
        }
    }

    async fn collect_lines(body: Body) -> Vec<StreamRecord> {
        use http_body_util::BodyExt;
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_stream_orders_progress_before_final() {
        let handle = job::start(
            Arc::new(InlineFactory { fail: false }),
            PathBuf::from("m.safetensors"),
            spec(Some(2)),
        );

        let records = collect_lines(ndjson_body(handle)).await;
        assert_eq!(records.len(), 3); // steps 2 and 4, then final
        match &records[2] {
            StreamRecord::Image(rec) => assert_eq!(rec.status, RecordStatus::Final),
            other => panic!("expected final image record, got {other:?}"),
        }
        for rec in &records[..2] {
            match rec {
                StreamRecord::Image(r) => assert_eq!(r.status, RecordStatus::Intermediate),
                other => panic!("expected intermediate record, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_stream_failure_goes_in_band() {
        let handle = job::start(
            Arc::new(InlineFactory { fail: true }),
            PathBuf::from("m.safetensors"),
            spec(Some(2)),
        );

        let records = collect_lines(ndjson_body(handle)).await;
        assert_eq!(records.len(), 1);
        match &records[0] {
            StreamRecord::Error(e) => {
                assert_eq!(e.error, "Internal server error during image generation");
                assert!(e.details.as_deref().unwrap().contains("exploded"));
            }
            other => panic!("expected error record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffered_drain_returns_single_final() {
        let handle = job::start(
            Arc::new(InlineFactory { fail: false }),
            PathBuf::from("m.safetensors"),
            spec(None),
        );

        let record = drain_buffered(handle).await.unwrap();
        assert_eq!(record.status, RecordStatus::Final);
    }
}
