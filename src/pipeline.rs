//! Transcode benchmark pipeline
//!
//! Runs decode → resize → encode strictly in sequence on one worker, timing
//! each stage with a monotonic clock. Any stage failure aborts the run; the
//! report is produced only when all three stages succeed.

use crate::buffer::FrameBuffer;
use crate::codec::{
    BufferFlags, BufferInfo, CodecPort, CodecProvider, Direction, MediaFormat, OutputEvent,
    SoftwareProvider,
};
use crate::config::{BenchmarkConfig, EncoderSettings, PortConfig, Preset};
use crate::container::{Demuxer, Muxer};
use crate::error::{Error, Result};
use crate::processing::{CpuScaler, ScalerStage};
use crate::report::{BenchmarkReport, Stage, StageTiming};
use crate::status::{CancelToken, StatusEvent, StatusListener};
use crate::types::Resolution;

use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One access unit waiting to go into a port
struct Unit {
    buffer: FrameBuffer,
    pts: i64,
    flags: BufferFlags,
}

/// Decode/resize/encode benchmark
pub struct Pipeline {
    config: BenchmarkConfig,
    provider: Arc<dyn CodecProvider>,
    scaler: Box<dyn ScalerStage>,
}

impl Pipeline {
    /// Pipeline with the software codec provider and the CPU scaler
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        PipelineBuilder::new().config(config).build()
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run all three stages on the calling thread.
    ///
    /// `cancel` is checked before each stage. Exactly one terminal event
    /// (`Completed` or `Failed`) reaches `listener`.
    pub fn run(
        &mut self,
        cancel: &CancelToken,
        listener: &dyn StatusListener,
    ) -> Result<BenchmarkReport> {
        tracing::info!(
            "Pipeline starting: {} -> {} at {} ({})",
            self.config.input.display(),
            self.config.output.display(),
            self.config.target,
            self.provider.name()
        );

        match self.execute(cancel, listener) {
            Ok(report) => {
                tracing::info!(
                    "Pipeline finished: {} frames in {:.2} ms",
                    report.frame_count(),
                    report.total_duration().as_secs_f64() * 1000.0
                );
                listener.notify(StatusEvent::Completed(report.clone()));
                Ok(report)
            }
            Err(err) => {
                match &err {
                    Error::Cancelled(_) => tracing::info!("Pipeline {}", err),
                    _ => tracing::error!("Pipeline failed: {}", err),
                }
                listener.notify(StatusEvent::failed(&err));
                Err(err)
            }
        }
    }

    /// Run on a dedicated worker thread
    pub fn spawn(mut self) -> Result<PipelineHandle> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let worker = std::thread::Builder::new()
            .name("codecbench-pipeline".into())
            .spawn(move || self.run(&token, &events_tx))?;

        Ok(PipelineHandle {
            cancel,
            events: events_rx,
            worker,
        })
    }

    fn execute(
        &mut self,
        cancel: &CancelToken,
        listener: &dyn StatusListener,
    ) -> Result<BenchmarkReport> {
        cancel.check(Stage::Decode)?;
        listener.notify(StatusEvent::StageStarted(Stage::Decode));
        let t0 = Instant::now();
        let (frames, source) = self.decode().map_err(|e| e.in_stage(Stage::Decode))?;
        let decode = StageTiming::new(Stage::Decode, t0, Instant::now());
        finished(listener, &decode);

        cancel.check(Stage::Resize)?;
        listener.notify(StatusEvent::StageStarted(Stage::Resize));
        let t1 = Instant::now();
        let frame_count = frames.len();
        let resized = self
            .resize(frames, source.resolution)
            .map_err(|e| e.in_stage(Stage::Resize))?;
        let resize = StageTiming::new(Stage::Resize, t1, Instant::now());
        finished(listener, &resize);

        cancel.check(Stage::Encode)?;
        listener.notify(StatusEvent::StageStarted(Stage::Encode));
        let t2 = Instant::now();
        let output_bytes = self
            .encode(resized, &source)
            .map_err(|e| e.in_stage(Stage::Encode))?;
        let encode = StageTiming::new(Stage::Encode, t2, Instant::now());
        finished(listener, &encode);

        Ok(BenchmarkReport::new(
            decode,
            resize,
            encode,
            self.config.output.clone(),
            output_bytes,
            frame_count,
        ))
    }

    /// Decode every source sample, returning frames in arrival order and the
    /// source track format
    fn decode(&mut self) -> Result<(Vec<FrameBuffer>, MediaFormat)> {
        let mut demuxer = Demuxer::open(&self.config.input)?;
        let format = demuxer.track_format().clone();

        let mut port = CodecPort::new(self.provider.clone(), self.config.port.clone());
        port.configure(&format, Direction::Decoder)?;
        port.start()?;

        let samples = std::iter::from_fn(|| demuxer.read_sample().transpose()).map(|sample| {
            sample.map(|s| Unit {
                buffer: s.buffer,
                pts: s.pts,
                flags: s.flags,
            })
        });

        let mut frames = Vec::new();
        drive_port(&mut port, samples, &self.config.port, |buffer, info| {
            tracing::debug!("Decoded frame {} (pts {}, {} bytes)", frames.len(), info.pts, info.size);
            frames.push(buffer);
            Ok(())
        })?;

        Ok((frames, format))
    }

    fn resize(&mut self, frames: Vec<FrameBuffer>, source: Resolution) -> Result<Vec<FrameBuffer>> {
        let target = self.config.target;
        frames
            .into_iter()
            .map(|frame| {
                self.scaler.resize(
                    frame,
                    source.width,
                    source.height,
                    target.width,
                    target.height,
                )
            })
            .collect()
    }

    /// Encode `frames` into the output artifact, returning its size
    fn encode(&mut self, frames: Vec<FrameBuffer>, source: &MediaFormat) -> Result<u64> {
        let settings = &self.config.encoder;
        let target = self.config.target;
        let format = MediaFormat::video(settings.codec, target.width, target.height)
            .with_framerate(settings.framerate)
            .with_pixel_format(source.pixel_format)
            .with_bitrate(settings.bitrate)
            .with_i_frame_interval(settings.i_frame_interval);

        let mut port = CodecPort::new(self.provider.clone(), self.config.port.clone());
        port.configure(&format, Direction::Encoder)?;
        port.start()?;

        let path = self.config.output.clone();
        let mut muxer = Muxer::create(&path, &format)?;

        let inputs = frames.into_iter().map(|frame| {
            let pts = frame.pts().unwrap_or_default();
            Ok(Unit {
                buffer: frame,
                pts,
                flags: BufferFlags::NONE,
            })
        });

        let written = drive_port(&mut port, inputs, &self.config.port, |packet, info| {
            muxer.write_sample(packet.as_slice(), info.pts, info.flags)
        })
        .and_then(|packets| {
            let bytes = muxer.finish()?;
            tracing::debug!("Encoded {} packets into {} bytes", packets, bytes);
            Ok(bytes)
        });

        discard_on_error(written, &path)
    }
}

fn finished(listener: &dyn StatusListener, timing: &StageTiming) {
    tracing::info!(
        "{} stage finished in {:.2} ms",
        timing.stage(),
        timing.duration_millis()
    );
    listener.notify(StatusEvent::StageFinished {
        stage: timing.stage(),
        elapsed: timing.duration(),
    });
}

/// Delete the artifact at `path` when writing it failed. The muxer must
/// already be closed.
fn discard_on_error<T>(result: Result<T>, path: &Path) -> Result<T> {
    if result.is_err() {
        remove_partial(path);
    }
    result
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed partial artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial artifact {}: {}", path.display(), e),
    }
}

/// Feed `inputs` through a started port until its end-of-stream output,
/// handing every other output buffer to `on_output` in arrival order.
///
/// Returns the number of buffers delivered. The port is stopped on return,
/// and released on error.
fn drive_port<I, F>(
    port: &mut CodecPort,
    inputs: I,
    config: &PortConfig,
    on_output: F,
) -> Result<usize>
where
    I: Iterator<Item = Result<Unit>>,
    F: FnMut(FrameBuffer, BufferInfo) -> Result<()>,
{
    let result = pump(port, inputs, config, on_output).and_then(|delivered| {
        port.drain_and_stop()?;
        Ok(delivered)
    });
    if result.is_err() {
        port.release();
    }
    result
}

fn pump<I, F>(port: &mut CodecPort, mut inputs: I, config: &PortConfig, mut on_output: F) -> Result<usize>
where
    I: Iterator<Item = Result<Unit>>,
    F: FnMut(FrameBuffer, BufferInfo) -> Result<()>,
{
    let timeout = config.poll_timeout();
    let mut pending: Option<Unit> = None;
    let mut input_done = false;
    let mut last_pts = 0;
    let mut delivered = 0;
    let mut idle = 0;

    loop {
        let mut progressed = false;

        if !input_done {
            if pending.is_none() {
                pending = inputs.next().transpose()?;
            }
            if let Some(slot) = port.dequeue_input_slot(Duration::ZERO)? {
                match pending.take() {
                    Some(unit) => {
                        input_done = unit.flags.is_end_of_stream();
                        last_pts = unit.pts;
                        port.submit_input(slot, unit.buffer, unit.pts, unit.flags)?;
                    }
                    None => {
                        port.submit_input(slot, FrameBuffer::empty(), last_pts, BufferFlags::END_OF_STREAM)?;
                        input_done = true;
                    }
                }
                progressed = true;
            }
        }

        // Only wait on outputs when there was nothing to submit
        let wait = if progressed { Duration::ZERO } else { timeout };
        match port.dequeue_output_slot(wait)? {
            Some(OutputEvent::FormatChanged(format)) => {
                tracing::debug!(
                    "Port output format: {} {} {}",
                    format.mime,
                    format.resolution,
                    format.pixel_format
                );
                progressed = true;
            }
            Some(OutputEvent::Buffer { index, info }) => {
                if info.flags.is_end_of_stream() {
                    port.release_output_slot(index, false)?;
                    return Ok(delivered);
                }
                let buffer = port.take_output(index)?;
                on_output(buffer, info)?;
                delivered += 1;
                progressed = true;
            }
            None => {}
        }

        if progressed {
            idle = 0;
        } else {
            idle += 1;
            if idle >= config.max_idle_polls {
                return Err(Error::StallTimeout(format!(
                    "no progress after {} polls ({} buffers delivered)",
                    idle, delivered
                )));
            }
        }
    }
}

/// Handle to a pipeline running on its own thread
pub struct PipelineHandle {
    cancel: CancelToken,
    events: Receiver<StatusEvent>,
    worker: JoinHandle<Result<BenchmarkReport>>,
}

impl PipelineHandle {
    /// Request cancellation at the next stage boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Status notifications, ending with a terminal event
    pub fn events(&self) -> &Receiver<StatusEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run to end
    pub fn join(self) -> Result<BenchmarkReport> {
        self.worker.join().map_err(|_| Error::WorkerPanicked)?
    }
}

/// Pipeline builder
pub struct PipelineBuilder {
    config: BenchmarkConfig,
    provider: Arc<dyn CodecProvider>,
    scaler: Box<dyn ScalerStage>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: BenchmarkConfig::default(),
            provider: Arc::new(SoftwareProvider),
            scaler: Box::new(CpuScaler::new()),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BenchmarkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = path.into();
        self
    }

    pub fn target(mut self, width: u32, height: u32) -> Self {
        self.config.target = Resolution::new(width, height);
        self
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.config = self.config.with_preset(preset);
        self
    }

    pub fn encoder(mut self, settings: EncoderSettings) -> Self {
        self.config.encoder = settings;
        self
    }

    pub fn port(mut self, config: PortConfig) -> Self {
        self.config.port = config;
        self
    }

    /// Codec capability provider for both ports
    pub fn provider(mut self, provider: Arc<dyn CodecProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn scaler(mut self, scaler: impl ScalerStage + 'static) -> Self {
        self.scaler = Box::new(scaler);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        Ok(Pipeline {
            config: self.config,
            provider: self.provider,
            scaler: self.scaler,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{rle, Codec, StallingProvider};
    use crate::error::ErrorKind;
    use crate::synth::SyntheticClip;
    use crate::types::PixelFormat;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn fast_port() -> PortConfig {
        PortConfig::default()
            .with_poll_timeout(Duration::from_millis(5))
            .with_max_idle_polls(400)
    }

    fn clip(dir: &TempDir, resolution: Resolution, frames: usize) -> PathBuf {
        let path = dir.path().join("input.cbv");
        SyntheticClip::new(resolution, frames).write(&path).unwrap();
        path
    }

    /// Scaler that counts calls and delegates to the CPU scaler
    struct CountingScaler {
        calls: Arc<AtomicUsize>,
        inner: CpuScaler,
    }

    impl ScalerStage for CountingScaler {
        fn resize(
            &mut self,
            input: FrameBuffer,
            src_width: u32,
            src_height: u32,
            dst_width: u32,
            dst_height: u32,
        ) -> Result<FrameBuffer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .resize(input, src_width, src_height, dst_width, dst_height)
        }
    }

    /// Scaler that drops the second half of every frame
    struct TruncatingScaler;

    impl ScalerStage for TruncatingScaler {
        fn resize(&mut self, input: FrameBuffer, _: u32, _: u32, _: u32, _: u32) -> Result<FrameBuffer> {
            let format = input.format();
            let mut bytes = input.into_vec();
            bytes.truncate(bytes.len() / 2);
            Ok(FrameBuffer::from_vec(bytes).with_format(format))
        }
    }

    /// Records events and cancels once decode is done
    struct CancelAfterDecode {
        token: CancelToken,
        events: Mutex<Vec<StatusEvent>>,
    }

    impl StatusListener for CancelAfterDecode {
        fn notify(&self, event: StatusEvent) {
            if let StatusEvent::StageFinished {
                stage: Stage::Decode,
                ..
            } = event
            {
                self.token.cancel();
            }
            self.events.lock().push(event);
        }
    }

    #[test]
    fn test_end_to_end_4k_to_1080p() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::UHD_4K, 10);
        let output = dir.path().join("out/output_1080p.cbv");

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(&output)
            .target(1920, 1080)
            .build()
            .unwrap();
        let report = pipeline.run(&CancelToken::new(), &()).unwrap();

        assert_eq!(report.frame_count(), 10);
        assert_eq!(report.timings().len(), 3);
        assert_eq!(report.output_path(), output.as_path());
        let on_disk = std::fs::metadata(&output).unwrap().len();
        assert!(on_disk > 0);
        assert_eq!(report.output_bytes(), on_disk);

        // every packet decodes to its source letter, in source order
        let mut demuxer = Demuxer::open(&output).unwrap();
        let track = demuxer.track_format().clone();
        assert_eq!(track.resolution, Resolution::FHD_1080P);
        assert_eq!(track.codec(), Some(Codec::Rle));
        let frame_size = PixelFormat::Nv12.frame_size(Resolution::FHD_1080P).unwrap();

        let mut index = 0;
        let mut last_pts = -1;
        while let Some(sample) = demuxer.read_sample().unwrap() {
            assert!(sample.pts > last_pts);
            last_pts = sample.pts;
            let pixels = rle::decode(sample.buffer.as_slice(), frame_size).unwrap();
            assert!(pixels.iter().all(|&b| b == SyntheticClip::letter(index)));
            index += 1;
        }
        assert_eq!(index, 10);
    }

    #[test]
    fn test_events_follow_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 3);
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("out.cbv"))
            .target(32, 16)
            .port(fast_port())
            .build()
            .unwrap();
        pipeline.run(&CancelToken::new(), &tx).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 7);
        let mut started = Vec::new();
        for event in &events[..6] {
            match event {
                StatusEvent::StageStarted(stage) => started.push(*stage),
                StatusEvent::StageFinished { stage, .. } => assert_eq!(started.last(), Some(stage)),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(started, Stage::ALL);
        match &events[6] {
            StatusEvent::Completed(report) => assert_eq!(report.frame_count(), 3),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_between_decode_and_resize() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 4);
        let output = dir.path().join("never.cbv");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(&output)
            .target(32, 16)
            .port(fast_port())
            .scaler(CountingScaler {
                calls: calls.clone(),
                inner: CpuScaler::new(),
            })
            .build()
            .unwrap();

        let token = CancelToken::new();
        let listener = CancelAfterDecode {
            token: token.clone(),
            events: Mutex::new(Vec::new()),
        };
        let err = pipeline.run(&token, &listener).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.stage(), Some(Stage::Resize));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!output.exists());

        let events = listener.events.lock();
        assert!(events.iter().all(|e| !matches!(e, StatusEvent::Completed(_))));
        assert!(matches!(
            events.last(),
            Some(StatusEvent::Failed {
                kind: ErrorKind::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_source_fails_in_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("weird.cbv");
        let format = MediaFormat::with_mime("video/x-nonsense", 64, 32);
        let mut muxer = Muxer::create(&input, &format).unwrap();
        muxer.write_sample(&[1, 2, 3], 0, BufferFlags::KEY_FRAME).unwrap();
        muxer.finish().unwrap();
        let output = dir.path().join("out.cbv");

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(&output)
            .port(fast_port())
            .build()
            .unwrap();
        let err = pipeline.run(&CancelToken::new(), &()).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Decode));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::builder()
            .input(dir.path().join("missing.cbv"))
            .output(dir.path().join("out.cbv"))
            .build()
            .unwrap();
        let err = pipeline.run(&CancelToken::new(), &()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(err.stage(), Some(Stage::Decode));
    }

    #[test]
    fn test_encode_failure_removes_partial_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 3);
        let output = dir.path().join("partial.cbv");

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(&output)
            .target(32, 16)
            .port(fast_port())
            .scaler(TruncatingScaler)
            .build()
            .unwrap();
        let err = pipeline.run(&CancelToken::new(), &()).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Encode));
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(!output.exists());
    }

    #[test]
    fn test_failed_write_discards_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.cbv");

        std::fs::write(&path, b"CBV1").unwrap();
        let err = discard_on_error::<u64>(Err(Error::Io(std::io::Error::other("disk full"))), &path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(!path.exists());

        std::fs::write(&path, b"CBV1").unwrap();
        assert_eq!(discard_on_error(Ok(4u64), &path).unwrap(), 4);
        assert!(path.exists());
    }

    #[test]
    fn test_oversized_source_header_fails_in_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("huge.cbv");
        let format = MediaFormat::video(Codec::Rle, u32::MAX, u32::MAX)
            .with_pixel_format(PixelFormat::Rgba);
        Muxer::create(&input, &format).unwrap().finish().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("out.cbv"))
            .port(fast_port())
            .build()
            .unwrap();
        let err = pipeline.run(&CancelToken::new(), &tx).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Decode));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(rx.try_iter().last().unwrap().is_terminal());
    }

    #[test]
    fn test_stalled_decoder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 3);
        let port = PortConfig::default()
            .with_poll_timeout(Duration::from_millis(5))
            .with_max_idle_polls(20)
            .with_slots(1, 1);

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("out.cbv"))
            .target(32, 16)
            .port(port)
            .provider(Arc::new(StallingProvider(Duration::from_millis(300))))
            .build()
            .unwrap();

        let started = Instant::now();
        let err = pipeline.run(&CancelToken::new(), &()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Decode));
        assert_eq!(err.kind(), ErrorKind::StallTimeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unsupported_encoder_codec() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 2);

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("out.cbv"))
            .target(32, 16)
            .encoder(EncoderSettings::default().with_codec(Codec::Av1))
            .port(fast_port())
            .build()
            .unwrap();
        let err = pipeline.run(&CancelToken::new(), &()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Encode));
        assert!(err.is_capability_issue());
    }

    #[test]
    fn test_empty_source_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 0);
        let output = dir.path().join("empty.cbv");

        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(&output)
            .target(32, 16)
            .port(fast_port())
            .build()
            .unwrap();
        let report = pipeline.run(&CancelToken::new(), &()).unwrap();

        assert_eq!(report.frame_count(), 0);
        let mut demuxer = Demuxer::open(&output).unwrap();
        assert_eq!(demuxer.track_format().resolution, Resolution::new(32, 16));
        assert!(demuxer.read_sample().unwrap().is_none());
    }

    #[test]
    fn test_spawned_pipeline_reports_completion() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 5);

        let pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("spawned.cbv"))
            .target(16, 16)
            .port(fast_port())
            .build()
            .unwrap();
        let handle = pipeline.spawn().unwrap();
        let events = handle.events().clone();
        let report = handle.join().unwrap();

        assert_eq!(report.frame_count(), 5);
        let last = events.try_iter().last().unwrap();
        assert!(last.is_terminal());
        assert!(matches!(last, StatusEvent::Completed(_)));
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let input = clip(&dir, Resolution::new(64, 32), 1);
        let mut pipeline = Pipeline::builder()
            .input(&input)
            .output(dir.path().join("out.cbv"))
            .build()
            .unwrap();

        let token = CancelToken::new();
        token.cancel();
        let err = pipeline.run(&token, &()).unwrap_err();
        assert!(matches!(err, Error::Cancelled(Stage::Decode)));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_build() {
        let result = Pipeline::builder()
            .port(PortConfig::default().with_slots(0, 0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
