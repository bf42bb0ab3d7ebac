use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::audio::AudioExtractor;
use crate::config::Config;
use crate::error::{Result, SubburnError};
use crate::media::MediaEncoder;
use crate::segment::{Chunk, Segmenter, Workspace};
use crate::source::SourceVideo;
use crate::subtitle::SubtitleRenderer;
use crate::transcribe::SpeechTranslator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Segmenting,
    PerChunkProcessing,
    Concatenating,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Called on every state transition of a run
pub type StateListener = Arc<dyn Fn(Uuid, PipelineState) + Send + Sync>;

/// A chunk after overlay, still carrying its sequence index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitledChunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub path: PathBuf,
    pub transcript: String,
    pub overlay: bool,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub output_path: PathBuf,
    pub chunks: Vec<SubtitledChunk>,
    pub states: Vec<PipelineState>,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn overlay_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.overlay).count()
    }
}

struct RunContext {
    run_id: Uuid,
    state: PipelineState,
    history: Vec<PipelineState>,
    listener: Option<StateListener>,
}

impl RunContext {
    fn new(run_id: Uuid, listener: Option<StateListener>) -> Self {
        Self {
            run_id,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            listener,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state {}", self.state);
        info!("{} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        if let Some(listener) = &self.listener {
            listener(self.run_id, next);
        }
    }
}

/// Per-chunk stages, shared with worker tasks
struct ChunkProcessor {
    extractor: AudioExtractor,
    translator: Arc<dyn SpeechTranslator>,
    renderer: SubtitleRenderer,
    translate_lock: Mutex<()>,
    concurrent_translation: bool,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ChunkProcessor {
    async fn process(&self, chunk: &Chunk) -> Result<SubtitledChunk> {
        let audio_path = self
            .with_retry("audio extraction", chunk.index, || self.extractor.extract_audio(&chunk.path))
            .await?;

        let translator = &self.translator;
        let lock = &self.translate_lock;
        let audio = &audio_path;
        let concurrent = self.concurrent_translation;
        let transcript = self
            .with_retry("translation", chunk.index, || async move {
                // Serialize model access unless the model says it is safe
                let _guard = if concurrent {
                    None
                } else {
                    Some(lock.lock().await)
                };
                translator.translate(audio).await
            })
            .await?;

        if let Err(e) = tokio::fs::remove_file(&audio_path).await {
            debug!("Could not remove audio track {}: {}", audio_path.display(), e);
        }

        let overlay = self.renderer.needs_overlay(&transcript);
        let path = self.renderer.render_subtitles(&chunk.path, &transcript).await?;

        debug!("Chunk {} transcript: {:?}", chunk.index, transcript);

        Ok(SubtitledChunk {
            index: chunk.index,
            start: chunk.start,
            end: chunk.end,
            path,
            transcript,
            overlay,
        })
    }

    async fn with_retry<T, F, Fut>(&self, stage: &str, index: usize, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Chunk {} {} failed ({}), retry {}/{}",
                        index, stage, e, attempt, self.max_retries
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Drives one source video through segmenting, per-chunk extract, translate
/// and render, concatenation and cleanup
pub struct Pipeline {
    segmenter: Segmenter,
    processor: Arc<ChunkProcessor>,
    encoder: Arc<dyn MediaEncoder>,
    chunk_duration: f64,
    output_path: PathBuf,
    unique_output: bool,
    workers: usize,
    output_lock: Mutex<()>,
    listener: Option<StateListener>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        encoder: Arc<dyn MediaEncoder>,
        translator: Arc<dyn SpeechTranslator>,
    ) -> Result<Self> {
        config.validate()?;

        let concurrent_translation = config.pipeline.workers > 1 && translator.supports_concurrency();
        let processor = ChunkProcessor {
            extractor: AudioExtractor::new(Arc::clone(&encoder)),
            translator,
            renderer: SubtitleRenderer::new(Arc::clone(&encoder), config.subtitle.clone()),
            translate_lock: Mutex::new(()),
            concurrent_translation,
            max_retries: config.pipeline.max_retries,
            retry_backoff: Duration::from_millis(config.pipeline.retry_backoff_ms),
        };

        Ok(Self {
            segmenter: Segmenter::new(Arc::clone(&encoder), config.segment.workspace_root.clone()),
            processor: Arc::new(processor),
            encoder,
            chunk_duration: config.segment.chunk_duration,
            output_path: config.pipeline.output_path.clone(),
            unique_output: config.pipeline.unique_output,
            workers: config.pipeline.workers,
            output_lock: Mutex::new(()),
            listener: None,
        })
    }

    /// Observe state transitions of every run
    pub fn with_state_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Where a run writes its artifact
    pub fn output_path_for(&self, run_id: Uuid) -> PathBuf {
        if !self.unique_output {
            return self.output_path.clone();
        }

        let stem = self
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let name = match self.output_path.extension() {
            Some(ext) => format!("{}-{}.{}", stem, run_id, ext.to_string_lossy()),
            None => format!("{}-{}", stem, run_id),
        };
        self.output_path.with_file_name(name)
    }

    /// Run the pipeline on `source`. The workspace and any staging directory
    /// are gone when this returns, whatever the outcome.
    pub async fn run(&self, source: SourceVideo) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_inner(run_id, source).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, source: SourceVideo) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut run = RunContext::new(run_id, self.listener.clone());
        let source_path = source.path().to_path_buf();
        let output_path = self.output_path_for(run_id);

        info!("Processing {} -> {}", source_path.display(), output_path.display());

        run.transition(PipelineState::Segmenting);
        let (chunks, workspace) = match self.segmenter.segment(&source_path, self.chunk_duration).await {
            Ok(segmented) => segmented,
            Err(e) => {
                source.release();
                run.transition(PipelineState::Failed);
                return Err(e);
            }
        };

        let outcome = self.process_and_join(&mut run, chunks, &workspace, &output_path).await;

        run.transition(PipelineState::CleaningUp);
        workspace.release();
        source.release();

        match outcome {
            Ok(subtitled) => {
                run.transition(PipelineState::Done);
                let elapsed_secs = clock.elapsed().as_secs_f64();
                info!(
                    "Wrote {} from {} chunks in {:.1}s",
                    output_path.display(),
                    subtitled.len(),
                    elapsed_secs
                );
                Ok(RunReport {
                    run_id,
                    source: source_path,
                    output_path,
                    chunks: subtitled,
                    states: run.history,
                    started_at,
                    elapsed_secs,
                })
            }
            Err(e) => {
                warn!("Run failed: {}", e);
                run.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn process_and_join(
        &self,
        run: &mut RunContext,
        chunks: Vec<Chunk>,
        workspace: &Workspace,
        output_path: &Path,
    ) -> Result<Vec<SubtitledChunk>> {
        run.transition(PipelineState::PerChunkProcessing);
        let subtitled = if self.workers > 1 && chunks.len() > 1 {
            self.process_concurrently(chunks).await?
        } else {
            self.process_sequentially(&chunks).await?
        };

        run.transition(PipelineState::Concatenating);
        let inputs: Vec<PathBuf> = subtitled.iter().map(|c| c.path.clone()).collect();
        self.write_output(&inputs, workspace, output_path).await?;

        Ok(subtitled)
    }

    async fn process_sequentially(&self, chunks: &[Chunk]) -> Result<Vec<SubtitledChunk>> {
        let total = chunks.len();
        let mut subtitled = Vec::with_capacity(total);
        for chunk in chunks {
            subtitled.push(self.processor.process(chunk).await?);
            info!("Chunk {}/{} done", chunk.index + 1, total);
        }
        Ok(subtitled)
    }

    /// Bounded worker pool; results are tagged with their index and put back
    /// in sequence order. The first failure aborts every other task.
    async fn process_concurrently(&self, chunks: Vec<Chunk>) -> Result<Vec<SubtitledChunk>> {
        let total = chunks.len();
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let permits = Arc::clone(&permits);
            let processor = Arc::clone(&self.processor);
            tasks.spawn(
                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| SubburnError::Config(format!("worker pool closed: {}", e)))?;
                    let result = processor.process(&chunk).await;
                    result.map(|subtitled| (chunk.index, subtitled))
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<SubtitledChunk>> = vec![None; total];
        let mut failure = None;
        let mut done = 0;

        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(SubburnError::Config(format!("chunk worker panicked: {}", e)))
            });
            match result {
                Ok((index, subtitled)) => {
                    done += 1;
                    info!("Chunk {} done ({}/{})", index + 1, done, total);
                    slots[index] = Some(subtitled);
                }
                Err(e) => {
                    failure = Some(e);
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Let aborted tasks unwind so their child processes are gone before cleanup
        while tasks.join_next().await.is_some() {}

        if let Some(e) = failure {
            return Err(e);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| SubburnError::Config(format!("chunk {} produced no result", index)))
            })
            .collect()
    }

    /// Concatenate into a temporary file beside the output and move it over
    /// the slot, holding the slot lock for the duration.
    async fn write_output(&self, inputs: &[PathBuf], workspace: &Workspace, output_path: &Path) -> Result<()> {
        let _slot = self.output_lock.lock().await;

        let output_dir = match output_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| SubburnError::Concatenation(format!("cannot create {}: {}", output_dir.display(), e)))?;

        let extension = output_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".mp4".to_string());
        let staged = tempfile::Builder::new()
            .prefix(".subburn-")
            .suffix(&extension)
            .tempfile_in(&output_dir)
            .map_err(|e| SubburnError::Concatenation(format!("cannot stage output: {}", e)))?;

        debug!("Staging output at {} (workspace {})", staged.path().display(), workspace.path().display());

        self.encoder
            .concatenate(inputs, staged.path())
            .await
            .map_err(|e| e.into_stage(SubburnError::Concatenation))?;

        staged
            .persist(output_path)
            .map_err(|e| SubburnError::Concatenation(format!("cannot write {}: {}", output_path.display(), e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::MockSpeechTranslator;
    use async_trait::async_trait;
    use crate::media::MediaInfo;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encoder double that writes placeholder files
    #[derive(Default)]
    struct FakeEncoder {
        duration: f64,
        fail_at: Option<&'static str>,
        jitter: bool,
        concatenated: StdMutex<Vec<Vec<PathBuf>>>,
    }

    impl FakeEncoder {
        fn failing(duration: f64, stage: &'static str) -> Self {
            Self { duration, fail_at: Some(stage), ..Default::default() }
        }

        fn check(&self, stage: &str) -> Result<()> {
            match self.fail_at {
                Some("missing") if stage == "extract" => Err(SubburnError::tool_unavailable("ffmpeg", "No such file or directory")),
                Some(s) if s == stage => Err(SubburnError::tool_failed("ffmpeg", format!("{} exploded", stage))),
                _ => Ok(()),
            }
        }

        async fn jitter(&self, path: &Path) {
            if self.jitter {
                // Later chunks finish first
                let index: u64 = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.trim_start_matches("chunk_").get(..4))
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(index * 10))).await;
            }
        }
    }

    #[async_trait]
    impl MediaEncoder for FakeEncoder {
        async fn probe(&self, _path: &Path) -> Result<MediaInfo> {
            Ok(MediaInfo {
                duration: self.duration,
                frame_rate: Some(25.0),
                frame_rate_ratio: Some("25/1".to_string()),
                width: Some(640),
                height: Some(360),
                has_audio: true,
            })
        }

        async fn cut(&self, _source: &Path, _info: &MediaInfo, start: f64, _duration: f64, output_path: &Path) -> Result<()> {
            self.check("cut")?;
            std::fs::write(output_path, format!("chunk@{}", start))?;
            Ok(())
        }

        async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
            self.check("extract")?;
            self.jitter(video_path).await;
            std::fs::write(audio_path, b"wav")?;
            Ok(())
        }

        async fn filter_video(&self, _input_path: &Path, _filter: &str, output_path: &Path) -> Result<()> {
            self.check("render")?;
            std::fs::write(output_path, b"overlay")?;
            Ok(())
        }

        async fn concatenate(&self, inputs: &[PathBuf], output_path: &Path) -> Result<()> {
            self.check("concat")?;
            self.concatenated.lock().unwrap().push(inputs.to_vec());
            std::fs::write(output_path, format!("{} chunks", inputs.len()))?;
            Ok(())
        }

        async fn check_availability(&self) -> Result<()> {
            Ok(())
        }

        async fn get_version_info(&self) -> Result<String> {
            Ok("fake".to_string())
        }
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.segment.workspace_root = Some(root.join("work"));
        config.pipeline.output_path = root.join("static").join("output.mp4");
        config
    }

    fn source(root: &Path) -> SourceVideo {
        let path = root.join("input.mp4");
        std::fs::write(&path, b"source").unwrap();
        SourceVideo::open(path).unwrap()
    }

    fn workspace_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root.join("work")).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn test_run_visits_every_state_in_order() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 12.0, ..Default::default() });

        let mut translator = MockSpeechTranslator::new();
        translator
            .expect_translate()
            .times(3)
            .returning(|_| Ok("Hello there".to_string()));

        let pipeline = Pipeline::new(&config(root.path()), encoder.clone(), Arc::new(translator)).unwrap();
        let report = pipeline.run(source(root.path())).await.unwrap();

        assert_eq!(
            report.states,
            vec![
                PipelineState::Idle,
                PipelineState::Segmenting,
                PipelineState::PerChunkProcessing,
                PipelineState::Concatenating,
                PipelineState::CleaningUp,
                PipelineState::Done,
            ]
        );
        assert_eq!(report.chunk_count(), 3);
        assert_eq!(report.overlay_count(), 3);
        assert!(report.output_path.is_file());
        assert!(workspace_is_empty(root.path()));

        let concatenated = encoder.concatenated.lock().unwrap();
        assert_eq!(concatenated.len(), 1);
        let names: Vec<String> = concatenated[0]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["chunk_0000_subtitled.mp4", "chunk_0001_subtitled.mp4", "chunk_0002_subtitled.mp4"]
        );
    }

    #[tokio::test]
    async fn test_silent_chunks_skip_overlay() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 15.0, ..Default::default() });

        let mut translator = MockSpeechTranslator::new();
        translator.expect_translate().returning(|audio| {
            if audio.to_string_lossy().contains("chunk_0001") {
                Ok("Only this one speaks".to_string())
            } else {
                Ok(String::new())
            }
        });

        let pipeline = Pipeline::new(&config(root.path()), encoder.clone(), Arc::new(translator)).unwrap();
        let report = pipeline.run(source(root.path())).await.unwrap();

        let overlays: Vec<bool> = report.chunks.iter().map(|c| c.overlay).collect();
        assert_eq!(overlays, vec![false, true, false]);
        assert!(report.chunks[0].path.ends_with("chunk_0000.mp4"));
        assert!(report.chunks[2].path.ends_with("chunk_0002.mp4"));
        assert_eq!(report.chunks[0].transcript, "");
    }

    #[tokio::test]
    async fn test_translation_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 12.0, ..Default::default() });

        let mut translator = MockSpeechTranslator::new();
        translator
            .expect_translate()
            .times(1)
            .returning(|_| Err(SubburnError::Translation("model crashed".to_string())));

        let states = Arc::new(StdMutex::new(Vec::new()));
        let seen = Arc::clone(&states);
        let pipeline = Pipeline::new(&config(root.path()), encoder.clone(), Arc::new(translator))
            .unwrap()
            .with_state_listener(Arc::new(move |_, state| seen.lock().unwrap().push(state)));

        let err = pipeline.run(source(root.path())).await.unwrap_err();
        assert!(matches!(err, SubburnError::Translation(_)));
        assert!(workspace_is_empty(root.path()));
        assert!(encoder.concatenated.lock().unwrap().is_empty());
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                PipelineState::Segmenting,
                PipelineState::PerChunkProcessing,
                PipelineState::CleaningUp,
                PipelineState::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_translation_retries_are_bounded() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 4.0, ..Default::default() });

        let mut translator = MockSpeechTranslator::new();
        let mut seq = mockall::Sequence::new();
        translator
            .expect_translate()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(SubburnError::Translation("busy".to_string())));
        translator
            .expect_translate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("third time lucky".to_string()));

        let mut config = config(root.path());
        config.pipeline.max_retries = 2;
        config.pipeline.retry_backoff_ms = 1;

        let pipeline = Pipeline::new(&config, encoder, Arc::new(translator)).unwrap();
        let report = pipeline.run(source(root.path())).await.unwrap();
        assert_eq!(report.chunks[0].transcript, "third time lucky");
    }

    #[tokio::test]
    async fn test_segmentation_failure_goes_straight_to_failed() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 0.0, ..Default::default() });
        let translator = MockSpeechTranslator::new();

        let pipeline = Pipeline::new(&config(root.path()), encoder, Arc::new(translator)).unwrap();
        let source = SourceVideo::receive(&b"upload"[..], "clip.mp4", Some(root.path())).await.unwrap();
        let staging = source.path().parent().unwrap().to_path_buf();

        let err = pipeline.run(source).await.unwrap_err();
        assert!(matches!(err, SubburnError::Segmentation(_)));
        assert!(!staging.exists());
        assert!(workspace_is_empty(root.path()));
    }

    #[test]
    fn test_unique_output_names() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        let translator: Arc<dyn SpeechTranslator> = Arc::new(MockSpeechTranslator::new());
        let encoder: Arc<dyn MediaEncoder> = Arc::new(FakeEncoder::default());

        let pipeline = Pipeline::new(&config, Arc::clone(&encoder), Arc::clone(&translator)).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(pipeline.output_path_for(id), root.path().join("static").join("output.mp4"));

        config.pipeline.unique_output = true;
        let pipeline = Pipeline::new(&config, encoder, translator).unwrap();
        assert_eq!(
            pipeline.output_path_for(id),
            root.path().join("static").join(format!("output-{}.mp4", id))
        );
    }

    fn speaking_translator() -> MockSpeechTranslator {
        let mut translator = MockSpeechTranslator::new();
        translator.expect_translate().returning(|_| Ok("Speech".to_string()));
        translator.expect_supports_concurrency().return_const(false);
        translator
    }

    #[tokio::test]
    async fn test_missing_encoder_is_reported_as_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::failing(12.0, "missing"));

        let pipeline = Pipeline::new(&config(root.path()), encoder, Arc::new(speaking_translator())).unwrap();
        let err = pipeline.run(source(root.path())).await.unwrap_err();

        assert!(err.is_tool_unavailable(), "unexpected error: {err}");
        assert!(workspace_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_every_stage_failure_removes_workspace() {
        let cases: [(&str, fn(&SubburnError) -> bool); 4] = [
            ("cut", |e| matches!(e, SubburnError::Segmentation(_))),
            ("extract", |e| matches!(e, SubburnError::ExternalTool { .. })),
            ("render", |e| matches!(e, SubburnError::Render(_))),
            ("concat", |e| matches!(e, SubburnError::Concatenation(_))),
        ];

        for (stage, expected) in cases {
            let root = tempfile::tempdir().unwrap();
            let encoder = Arc::new(FakeEncoder::failing(12.0, stage));
            let pipeline = Pipeline::new(&config(root.path()), encoder, Arc::new(speaking_translator())).unwrap();

            let err = pipeline.run(source(root.path())).await.unwrap_err();
            assert!(expected(&err), "{stage}: unexpected error {err}");
            assert!(workspace_is_empty(root.path()), "{stage}: workspace left behind");
            assert!(!root.path().join("static").join("output.mp4").exists());
        }
    }

    #[tokio::test]
    async fn test_concurrent_workers_keep_chunk_order() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 20.0, jitter: true, ..Default::default() });

        let mut translator = MockSpeechTranslator::new();
        translator.expect_supports_concurrency().return_const(true);
        translator.expect_translate().times(4).returning(|audio| {
            Ok(audio.file_stem().unwrap().to_string_lossy().to_string())
        });

        let mut config = config(root.path());
        config.pipeline.workers = 4;

        let pipeline = Pipeline::new(&config, encoder.clone(), Arc::new(translator)).unwrap();
        let report = tokio_test::assert_ok!(pipeline.run(source(root.path())).await);

        let indices: Vec<usize> = report.chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        let transcripts: Vec<&str> = report.chunks.iter().map(|c| c.transcript.as_str()).collect();
        assert_eq!(transcripts, vec!["chunk_0000", "chunk_0001", "chunk_0002", "chunk_0003"]);

        let concatenated = encoder.concatenated.lock().unwrap();
        assert!(concatenated[0].windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_single_artifact() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 8.0, ..Default::default() });
        let pipeline = Pipeline::new(&config(root.path()), encoder, Arc::new(speaking_translator())).unwrap();

        let first = tokio_test::assert_ok!(pipeline.run(source(root.path())).await);
        let second = tokio_test::assert_ok!(pipeline.run(source(root.path())).await);

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.output_path, second.output_path);
        let artifacts: Vec<_> = std::fs::read_dir(root.path().join("static")).unwrap().collect();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(std::fs::read_to_string(&second.output_path).unwrap(), "2 chunks");
    }

    /// Translator that tracks how many calls overlap
    struct OverlapTranslator {
        concurrent: bool,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl OverlapTranslator {
        fn new(concurrent: bool) -> Self {
            Self { concurrent, in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl SpeechTranslator for OverlapTranslator {
        async fn translate(&self, _audio_path: &Path) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("Speech".to_string())
        }

        fn supports_concurrency(&self) -> bool {
            self.concurrent
        }
    }

    async fn peak_translations(concurrent: bool) -> usize {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { duration: 20.0, jitter: true, ..Default::default() });
        let translator = Arc::new(OverlapTranslator::new(concurrent));

        let mut config = config(root.path());
        config.pipeline.workers = 4;

        let pipeline = Pipeline::new(&config, encoder, translator.clone()).unwrap();
        let report = tokio_test::assert_ok!(pipeline.run(source(root.path())).await);
        assert_eq!(report.chunk_count(), 4);
        translator.peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_worker_pool_serializes_translation() {
        assert_eq!(peak_translations(false).await, 1);
        assert!(peak_translations(true).await > 1);
    }

    #[tokio::test]
    async fn test_worker_pool_failure_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder { jitter: true, ..FakeEncoder::failing(20.0, "render") });

        let mut config = config(root.path());
        config.pipeline.workers = 4;

        let pipeline = Pipeline::new(&config, encoder.clone(), Arc::new(speaking_translator())).unwrap();
        let err = tokio_test::assert_err!(pipeline.run(source(root.path())).await);

        assert!(matches!(err, SubburnError::Render(_)), "unexpected error: {err}");
        assert!(workspace_is_empty(root.path()));
        assert!(!root.path().join("static").join("output.mp4").exists());
        assert!(encoder.concatenated.lock().unwrap().is_empty());
    }
}
