//! Asynchronous front door: job submission, polling, confirmation and the
//! single background worker that drains the job queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::audio::Transcoder;
use crate::config::ServiceConfig;
use crate::error::{Result, TtsError};
use crate::pipeline::{PipelineOutput, SynthesisPipeline};
use crate::records::{AudioRecord, RecordStore};
use crate::registry::{JobSnapshot, JobStatus, SynthesisJob, SynthesisOutput, TaskRegistry};
use crate::voices::VoiceSelection;
use crate::SynthesisEngine;

/// Returned by [`SynthesisService::submit`] before any synthesis happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub status: JobStatus,
    pub status_url: String,
}

/// A synchronous synthesize-and-keep request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub text: String,
    pub gender: String,
    pub voice_label: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// What a caller is told about a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReceipt {
    pub audio_id: String,
    pub wav_url: String,
    pub mp3_url: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&AudioRecord> for ConfirmReceipt {
    fn from(record: &AudioRecord) -> Self {
        Self {
            audio_id: record.id.clone(),
            wav_url: record.wav_url.clone(),
            mp3_url: record.mp3_url.clone(),
            text: record.text.clone(),
            timestamp: record.timestamp,
        }
    }
}

struct QueuedJob {
    id: String,
    text: String,
    voice: VoiceSelection,
}

/// Owns the engine, the job registry and the record store.
///
/// Submitted jobs go through a bounded queue to one worker task, so jobs run
/// strictly one after another. [`confirm`](Self::confirm) bypasses the queue
/// but still waits for the same engine lock.
pub struct SynthesisService {
    registry: Arc<TaskRegistry>,
    pipeline: Arc<SynthesisPipeline>,
    records: Arc<RecordStore>,
    queue: mpsc::Sender<QueuedJob>,
    worker: JoinHandle<()>,
}

impl SynthesisService {
    /// Validate `config` and spawn the worker on the current Tokio runtime.
    pub fn start(
        config: ServiceConfig,
        engine: Box<dyn SynthesisEngine>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TtsError::Config(format!("no Tokio runtime to run the worker on: {e}")))?;

        let registry = Arc::new(TaskRegistry::new());
        let records = Arc::new(RecordStore::new(config.records_path.clone()));
        let (queue, rx) = mpsc::channel(config.queue_capacity);

        log::info!(
            "Starting synthesis service: voices in {}, output to {}, queue capacity {}",
            config.voice_library_dir.display(),
            config.output_dir.display(),
            config.queue_capacity
        );
        let pipeline = Arc::new(SynthesisPipeline::new(config, engine, transcoder));
        let worker = runtime.spawn(run_worker(rx, registry.clone(), pipeline.clone()));

        Ok(Self {
            registry,
            pipeline,
            records,
            queue,
            worker,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        self.pipeline.config()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Queue `text` for synthesis and return immediately.
    ///
    /// The job is `pending` when this returns. Voice lookup happens on the
    /// worker, so an unknown voice shows up as a failed job, not an error here.
    pub fn submit(&self, text: &str, voice: VoiceSelection) -> Result<SubmitReceipt> {
        validate_request(text, &voice)?;

        let permit = match self.queue.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                log::warn!("Rejecting submission: queue is full");
                return Err(TtsError::QueueFull(self.queued()));
            }
            Err(TrySendError::Closed(())) => return Err(TtsError::WorkerStopped),
        };

        let id = self.registry.create(text.to_string(), voice.clone());
        permit.send(QueuedJob {
            id: id.clone(),
            text: text.to_string(),
            voice,
        });

        Ok(SubmitReceipt {
            status_url: self.config().status_url(&id),
            task_id: id,
            status: JobStatus::Pending,
        })
    }

    pub fn status(&self, task_id: &str) -> Result<JobSnapshot> {
        self.registry.status(task_id)
    }

    pub fn job(&self, task_id: &str) -> Result<SynthesisJob> {
        self.registry.job(task_id)
    }

    /// Jobs accepted but not yet picked up by the worker.
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Synthesize `request` now and append the result to the record store.
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<AudioRecord> {
        let voice = VoiceSelection::new(request.gender, request.voice_label);
        validate_request(&request.text, &voice)?;

        let pipeline = self.pipeline.clone();
        let text = request.text.clone();
        let output: PipelineOutput =
            tokio::task::spawn_blocking(move || pipeline.run(&text, &voice, |_, _| {}))
                .await
                .map_err(aborted)??;

        let record = AudioRecord {
            id: uuid::Uuid::new_v4().to_string(),
            text: request.text,
            timestamp: Utc::now(),
            wav_path: output.wav_path,
            mp3_path: output.mp3_path,
            wav_url: output.wav_url,
            mp3_url: output.mp3_url,
            user_id: request.user_id,
            session_id: request.session_id,
        };

        let records = self.records.clone();
        let stored = record.clone();
        tokio::task::spawn_blocking(move || records.append(stored))
            .await
            .map_err(aborted)??;

        Ok(record)
    }

    /// Every confirmed record, oldest first.
    pub fn list_records(&self) -> Vec<AudioRecord> {
        self.records.load_all()
    }

    /// Genders in the voice library and the labels usable under each.
    pub fn voice_types(&self) -> Result<BTreeMap<String, BTreeSet<String>>> {
        self.pipeline.voices().list_available()
    }

    /// Stop accepting work, let the worker finish every queued job, then return.
    pub async fn shutdown(self) {
        let Self { queue, worker, .. } = self;
        drop(queue);
        if let Err(e) = worker.await {
            log::error!("Synthesis worker ended abnormally: {e}");
        }
    }
}

fn validate_request(text: &str, voice: &VoiceSelection) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TtsError::Input("text is empty".into()));
    }
    if voice.gender.trim().is_empty() || voice.label.trim().is_empty() {
        return Err(TtsError::Input("gender and voice label are required".into()));
    }
    Ok(())
}

fn aborted(e: tokio::task::JoinError) -> TtsError {
    TtsError::Engine(format!("synthesis task aborted: {e}"))
}

async fn run_worker(
    mut rx: mpsc::Receiver<QueuedJob>,
    registry: Arc<TaskRegistry>,
    pipeline: Arc<SynthesisPipeline>,
) {
    log::debug!("Synthesis worker started");
    while let Some(job) = rx.recv().await {
        process(job, &registry, &pipeline).await;
    }
    log::info!("Synthesis worker stopped");
}

async fn process(
    job: QueuedJob,
    registry: &Arc<TaskRegistry>,
    pipeline: &Arc<SynthesisPipeline>,
) {
    if let Err(e) = registry.start(&job.id) {
        log::error!("Skipping task {}: {e}", job.id);
        return;
    }

    let outcome = {
        let registry = registry.clone();
        let pipeline = pipeline.clone();
        let id = job.id.clone();
        let text = job.text.clone();
        let voice = job.voice.clone();
        tokio::task::spawn_blocking(move || {
            pipeline.run(&text, &voice, |done, total| {
                if let Err(e) = registry.progress(&id, done, total) {
                    log::warn!("Could not record progress of task {id}: {e}");
                }
            })
        })
        .await
        .map_err(aborted)
        .and_then(|result| result)
    };

    let recorded = match outcome {
        Ok(output) => {
            log::info!(
                "Task {} produced {:.2}s of audio from {} segment(s)",
                job.id,
                output.duration_secs,
                output.segments
            );
            registry.complete(
                &job.id,
                SynthesisOutput {
                    wav_url: output.wav_url,
                    mp3_url: output.mp3_url,
                    text: job.text,
                },
            )
        }
        Err(e) => {
            log::error!("Task {} failed: {e}", job.id);
            registry.fail(&job.id, &e)
        }
    };

    if let Err(e) = recorded {
        log::error!("Could not record outcome of task {}: {e}", job.id);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::config::ServiceConfigBuilder;
    use crate::registry::JobProgress;
    use crate::testing::{
        add_voice, init_logging, test_config, CopyTranscoder, EngineProbe, FakeEngine,
    };
    use crate::ErrorKind;

    fn start(dir: &Path, engine: FakeEngine) -> SynthesisService {
        init_logging();
        add_voice(dir, "女声", "促销");
        SynthesisService::start(test_config(dir), Box::new(engine), Arc::new(CopyTranscoder))
            .unwrap()
    }

    fn voice() -> VoiceSelection {
        VoiceSelection::new("女声", "促销")
    }

    async fn wait_for_terminal(service: &SynthesisService, id: &str) -> JobSnapshot {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let snapshot = service.status(id).unwrap();
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    fn statuses(job: &SynthesisJob) -> Vec<JobStatus> {
        job.history.iter().map(|(s, _)| *s).collect()
    }

    #[tokio::test]
    async fn submitted_job_completes_with_urls() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));

        let text = "全友家居年货节，家具买一万送8999元，还有更多惊喜等着你。";
        let receipt = service.submit(text, voice()).unwrap();
        assert_eq!(receipt.status, JobStatus::Pending);
        assert_eq!(receipt.status_url, format!("/task_status/{}", receipt.task_id));

        let snapshot = wait_for_terminal(&service, &receipt.task_id).await;
        assert_eq!(snapshot.status, JobStatus::Completed);
        let result = snapshot.result.unwrap();
        assert_eq!(result.text, text);
        assert!(result.wav_url.ends_with(".wav"));
        assert!(result.mp3_url.ends_with(".mp3"));

        let progress = snapshot.progress.unwrap();
        assert_eq!(progress.completed_segments, progress.total_segments);

        let job = service.job(&receipt.task_id).unwrap();
        assert_eq!(
            statuses(&job),
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
        assert!(job.history.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[tokio::test]
    async fn unknown_voice_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let probe = EngineProbe::default();
        let service = start(dir.path(), FakeEngine::new(probe.clone()));

        let receipt = service
            .submit("你好世界。", VoiceSelection::new("男声", "新闻"))
            .unwrap();
        let snapshot = wait_for_terminal(&service, &receipt.task_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.error.unwrap().kind, ErrorKind::NotFound);
        assert!(probe.calls().is_empty());

        let job = service.job(&receipt.task_id).unwrap();
        assert_eq!(
            statuses(&job),
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Failed]
        );
    }

    #[tokio::test]
    async fn engine_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new(EngineProbe::default()).failing_on("Four");
        let service = start(dir.path(), engine);

        let receipt = service
            .submit("One two three. Four five six.", voice())
            .unwrap();
        let snapshot = wait_for_terminal(&service, &receipt.task_id).await;

        assert_eq!(snapshot.status, JobStatus::Failed);
        let failure = snapshot.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::Engine);
        assert!(failure.message.contains("refused segment"));
    }

    #[tokio::test]
    async fn jobs_never_share_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let probe = EngineProbe::default();
        let engine = FakeEngine::new(probe.clone()).with_delay(Duration::from_millis(20));
        let service = start(dir.path(), engine);

        let first = service.submit("One two three. Four five six.", voice()).unwrap();
        let second = service.submit("Seven eight nine. Ten eleven.", voice()).unwrap();
        // the worker has not been polled yet
        assert_eq!(service.status(&first.task_id).unwrap().status, JobStatus::Pending);
        assert_eq!(service.status(&second.task_id).unwrap().status, JobStatus::Pending);

        assert_eq!(
            wait_for_terminal(&service, &first.task_id).await.status,
            JobStatus::Completed
        );
        assert_eq!(
            wait_for_terminal(&service, &second.task_id).await.status,
            JobStatus::Completed
        );

        assert_eq!(probe.max_in_flight(), 1);
        let windows = probe.windows();
        assert_eq!(windows.len(), probe.calls().len());
        assert!(windows.windows(2).all(|w| w[0].1 <= w[1].0));
    }

    #[tokio::test]
    async fn invalid_input_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));

        let err = service.submit("  \n ", voice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        let err = service
            .submit("你好。", VoiceSelection::new("", "促销"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);

        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn full_queue_rejects_without_creating_a_job() {
        let dir = tempfile::tempdir().unwrap();
        add_voice(dir.path(), "女声", "促销");
        let config = ServiceConfigBuilder::default()
            .output_dir(dir.path().join("output"))
            .voice_library_dir(dir.path().join("voices"))
            .queue_capacity(1usize)
            .build()
            .unwrap();
        let service = SynthesisService::start(
            config,
            Box::new(FakeEngine::new(EngineProbe::default())),
            Arc::new(CopyTranscoder),
        )
        .unwrap();

        service.submit("第一条。", voice()).unwrap();
        assert_eq!(service.queued(), 1);

        let err = service.submit("第二条。", voice()).unwrap_err();
        assert!(matches!(err, TtsError::QueueFull(1)));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(service.registry().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));
        let err = service.status("does-not-exist").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn confirm_stores_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));

        let record = service
            .confirm(ConfirmRequest {
                text: "欢迎光临。".into(),
                gender: "女声".into(),
                voice_label: "促销".into(),
                user_id: Some("u-7".into()),
                session_id: None,
            })
            .await
            .unwrap();
        assert!(record.wav_path.exists());
        assert!(record.mp3_path.exists());

        let stored = service.list_records();
        assert_eq!(stored, vec![record.clone()]);

        let receipt = ConfirmReceipt::from(&record);
        assert_eq!(receipt.audio_id, record.id);
        assert_eq!(receipt.text, "欢迎光临。");
        // confirmation never touches the job registry
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn confirm_with_unknown_voice_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));

        let err = service
            .confirm(ConfirmRequest {
                text: "欢迎光临。".into(),
                gender: "男声".into(),
                voice_label: "新闻".into(),
                user_id: None,
                session_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(service.list_records().is_empty());
    }

    #[tokio::test]
    async fn confirm_waits_for_a_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let probe = EngineProbe::default();
        let engine = FakeEngine::new(probe.clone()).with_delay(Duration::from_millis(15));
        let service = start(dir.path(), engine);

        let receipt = service
            .submit("One two three. Four five six. Seven eight.", voice())
            .unwrap();
        let request = ConfirmRequest {
            text: "Alpha beta. Gamma delta.".into(),
            gender: "女声".into(),
            voice_label: "促销".into(),
            user_id: None,
            session_id: Some("s-1".into()),
        };

        let (snapshot, record) = tokio::join!(
            wait_for_terminal(&service, &receipt.task_id),
            service.confirm(request)
        );
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(record.unwrap().session_id.as_deref(), Some("s-1"));
        assert_eq!(probe.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn lists_voice_types() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));
        add_voice(dir.path(), "男声", "新闻");

        let voices = service.voice_types().unwrap();
        assert!(voices["女声"].contains("促销"));
        assert!(voices["男声"].contains("新闻"));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(dir.path(), FakeEngine::new(EngineProbe::default()));

        let a = service.submit("第一条消息。", voice()).unwrap();
        let b = service.submit("第二条消息。", voice()).unwrap();
        let registry = service.registry().clone();
        service.shutdown().await;

        for id in [a.task_id, b.task_id] {
            let snapshot = registry.status(&id).unwrap();
            assert_eq!(snapshot.status, JobStatus::Completed);
            assert!(matches!(
                snapshot.progress,
                Some(JobProgress { completed_segments: 1, total_segments: 1 })
            ));
        }
    }

    #[test]
    fn start_outside_a_runtime_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let result = SynthesisService::start(
            test_config(dir.path()),
            Box::new(FakeEngine::new(EngineProbe::default())),
            Arc::new(CopyTranscoder),
        );
        assert!(matches!(result, Err(TtsError::Config(_))));
    }
}
