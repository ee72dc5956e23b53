//! Codec port: state machine plus slot bookkeeping around an engine thread
//!
//! Lifecycle: `Unconfigured -> Configured -> Running -> Draining -> Stopped`.
//! Input and output slots are credits. The caller holds an input slot
//! between `dequeue_input_slot` and `submit_input`. The engine holds an
//! output slot from delivery until the caller takes or releases it, so a
//! caller that never releases outputs stalls the engine.

use crate::buffer::FrameBuffer;
use crate::config::PortConfig;
use crate::error::{Error, Result};

use super::{
    BufferFlags, BufferInfo, CodecOutput, CodecProvider, Direction, FrameTransform, MediaFormat,
    OutputEvent,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Port lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    Unconfigured,
    Configured,
    Running,
    /// End of stream submitted, waiting for the terminal output
    Draining,
    Stopped,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortState::Unconfigured => "unconfigured",
            PortState::Configured => "configured",
            PortState::Running => "running",
            PortState::Draining => "draining",
            PortState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters for one port
#[derive(Debug, Clone, Default)]
pub struct PortStats {
    /// Buffers accepted by `submit_input`
    pub inputs_submitted: u64,
    /// Input bytes handed to the engine
    pub bytes_in: u64,
    /// Input buffers the engine has consumed
    pub inputs_processed: u64,
    /// Output buffers returned by `dequeue_output_slot`
    pub outputs_delivered: u64,
    /// Output bytes delivered
    pub bytes_out: u64,
    /// Outputs released with `render = true`
    pub outputs_rendered: u64,
}

struct Job {
    slot: usize,
    buffer: FrameBuffer,
    pts: i64,
    flags: BufferFlags,
}

enum EngineMsg {
    FormatChanged(MediaFormat),
    Buffer { slot: usize, output: CodecOutput },
    Failed(Error),
}

struct EngineLink {
    jobs: Sender<Job>,
    credits: Sender<usize>,
    returned_inputs: Receiver<usize>,
    outputs: Receiver<EngineMsg>,
    worker: JoinHandle<()>,
}

/// Asynchronous coder driven through input/output slot queues
pub struct CodecPort {
    provider: Arc<dyn CodecProvider>,
    config: PortConfig,
    state: PortState,
    direction: Option<Direction>,
    format: Option<MediaFormat>,
    output_format: Option<MediaFormat>,
    transform: Option<Box<dyn FrameTransform>>,
    input_capacity: usize,
    free_inputs: VecDeque<usize>,
    checked_out: Vec<bool>,
    outputs: Vec<Option<FrameBuffer>>,
    last_pts: i64,
    eos_submitted: bool,
    eos_observed: bool,
    engine: Option<EngineLink>,
    stats: Arc<Mutex<PortStats>>,
}

impl CodecPort {
    /// Create an unconfigured port backed by `provider`
    pub fn new(provider: Arc<dyn CodecProvider>, config: PortConfig) -> Self {
        Self {
            provider,
            config,
            state: PortState::Unconfigured,
            direction: None,
            format: None,
            output_format: None,
            transform: None,
            input_capacity: 0,
            free_inputs: VecDeque::new(),
            checked_out: Vec::new(),
            outputs: Vec::new(),
            last_pts: 0,
            eos_submitted: false,
            eos_observed: false,
            engine: None,
            stats: Arc::new(Mutex::new(PortStats::default())),
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    /// Set by `configure`
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Format passed to `configure`
    pub fn format(&self) -> Option<&MediaFormat> {
        self.format.as_ref()
    }

    /// Most recent format announced by the engine
    pub fn output_format(&self) -> Option<&MediaFormat> {
        self.output_format.as_ref()
    }

    /// Largest buffer `submit_input` accepts
    pub fn input_slot_capacity(&self) -> usize {
        self.input_capacity
    }

    pub fn stats(&self) -> PortStats {
        self.stats.lock().clone()
    }

    /// Bind the port to a format and direction.
    ///
    /// On failure the port stays `Unconfigured`.
    pub fn configure(&mut self, format: &MediaFormat, mode: Direction) -> Result<()> {
        if self.state != PortState::Unconfigured {
            return Err(self.state_error("configure"));
        }

        let transform = self
            .provider
            .create_transform(format, mode)
            .inspect_err(|e| {
                tracing::warn!("{} rejected {} format: {}", self.provider.name(), mode, e)
            })?;

        self.input_capacity = transform.max_input_size();
        self.transform = Some(transform);
        self.direction = Some(mode);
        self.format = Some(format.clone());
        self.state = PortState::Configured;

        tracing::debug!(
            "Configured {} {} {} (input slots: {} x {} bytes)",
            self.provider.name(),
            mode,
            format.mime,
            self.config.input_slots,
            self.input_capacity
        );
        Ok(())
    }

    /// Spawn the engine thread and open the slot queues
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            PortState::Configured => {}
            PortState::Stopped => return Err(Error::PortClosed),
            _ => return Err(Error::NotConfigured),
        }

        let transform = self.transform.take().ok_or(Error::NotConfigured)?;
        let input_slots = self.config.input_slots.max(1);
        let output_slots = self.config.output_slots.max(1);

        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded::<Job>(input_slots);
        let (returned_tx, returned_rx) = crossbeam_channel::unbounded::<usize>();
        let (credits_tx, credits_rx) = crossbeam_channel::unbounded::<usize>();
        let (outputs_tx, outputs_rx) = crossbeam_channel::unbounded::<EngineMsg>();

        for slot in 0..output_slots {
            // Receiver is alive, cannot fail
            let _ = credits_tx.send(slot);
        }

        let direction = self.direction.ok_or(Error::NotConfigured)?;
        let stats = self.stats.clone();
        let worker = std::thread::Builder::new()
            .name(format!("{}-engine", direction))
            .spawn(move || run_engine(transform, jobs_rx, returned_tx, credits_rx, outputs_tx, stats))?;

        self.engine = Some(EngineLink {
            jobs: jobs_tx,
            credits: credits_tx,
            returned_inputs: returned_rx,
            outputs: outputs_rx,
            worker,
        });
        self.free_inputs = (0..input_slots).collect();
        self.checked_out = vec![false; input_slots];
        self.outputs = (0..output_slots).map(|_| None).collect();
        self.state = PortState::Running;

        tracing::info!("{} {} started", self.provider.name(), direction);
        Ok(())
    }

    /// Wait up to `timeout` for a free input slot.
    ///
    /// `Ok(None)` means no slot freed up in time; poll again.
    pub fn dequeue_input_slot(&mut self, timeout: Duration) -> Result<Option<usize>> {
        self.ensure_active("dequeue input")?;
        if self.eos_submitted {
            return Err(self.state_error("dequeue input after end of stream"));
        }

        if let Some(engine) = &self.engine {
            self.free_inputs.extend(engine.returned_inputs.try_iter());
        }

        let slot = match self.free_inputs.pop_front() {
            Some(slot) => slot,
            None => {
                let engine = self.engine.as_ref().ok_or(Error::PortClosed)?;
                match engine.returned_inputs.recv_timeout(timeout) {
                    Ok(slot) => slot,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => return Err(self.engine_failure()),
                }
            }
        };

        self.checked_out[slot] = true;
        tracing::trace!("Input slot {} dequeued", slot);
        Ok(Some(slot))
    }

    /// Hand `buffer` to the engine through a dequeued input slot
    pub fn submit_input(
        &mut self,
        slot: usize,
        buffer: FrameBuffer,
        pts: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.ensure_active("submit input")?;
        if self.eos_submitted {
            return Err(self.state_error("submit input after end of stream"));
        }
        if !self.checked_out.get(slot).copied().unwrap_or(false) {
            return Err(Error::InvalidSlot(slot));
        }
        if buffer.remaining() > self.input_capacity {
            return Err(Error::CapacityExceeded {
                required: buffer.remaining(),
                capacity: self.input_capacity,
            });
        }

        let bytes = buffer.remaining() as u64;
        let engine = self.engine.as_ref().ok_or(Error::PortClosed)?;
        let job = Job {
            slot,
            buffer,
            pts,
            flags,
        };
        if engine.jobs.send(job).is_err() {
            return Err(self.engine_failure());
        }

        self.checked_out[slot] = false;
        self.last_pts = pts;
        {
            let mut stats = self.stats.lock();
            stats.inputs_submitted += 1;
            stats.bytes_in += bytes;
        }

        if flags.is_end_of_stream() {
            tracing::debug!("End of stream submitted at pts {}", pts);
            self.eos_submitted = true;
            self.state = PortState::Draining;
        }
        Ok(())
    }

    /// Wait up to `timeout` for an output buffer or format change.
    ///
    /// `Ok(None)` on timeout, and always after the end-of-stream output has
    /// been seen.
    pub fn dequeue_output_slot(&mut self, timeout: Duration) -> Result<Option<OutputEvent>> {
        self.ensure_active("dequeue output")?;
        if self.eos_observed {
            return Ok(None);
        }

        let engine = self.engine.as_ref().ok_or(Error::PortClosed)?;
        let msg = match engine.outputs.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => return Err(self.engine_failure()),
        };

        match msg {
            EngineMsg::FormatChanged(format) => {
                tracing::debug!(
                    "Output format changed: {} {} {}",
                    format.mime,
                    format.resolution,
                    format.pixel_format
                );
                self.output_format = Some(format.clone());
                Ok(Some(OutputEvent::FormatChanged(format)))
            }
            EngineMsg::Buffer { slot, output } => {
                let info = BufferInfo {
                    pts: output.pts,
                    size: output.buffer.remaining(),
                    flags: output.flags,
                };
                if info.flags.is_end_of_stream() {
                    tracing::debug!("End of stream observed on output");
                    self.eos_observed = true;
                }
                {
                    let mut stats = self.stats.lock();
                    stats.outputs_delivered += 1;
                    stats.bytes_out += info.size as u64;
                }
                self.outputs[slot] = Some(output.buffer);
                Ok(Some(OutputEvent::Buffer { index: slot, info }))
            }
            EngineMsg::Failed(err) => Err(err),
        }
    }

    /// Borrow the buffer in a dequeued output slot
    pub fn output_buffer(&self, index: usize) -> Result<&FrameBuffer> {
        self.ensure_active("read output")?;
        self.outputs
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidSlot(index))
    }

    /// Move the buffer out of an output slot and return the slot to the
    /// engine
    pub fn take_output(&mut self, index: usize) -> Result<FrameBuffer> {
        self.ensure_active("take output")?;
        let buffer = self
            .outputs
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(Error::InvalidSlot(index))?;
        self.return_credit(index);
        Ok(buffer)
    }

    /// Give a consumed output slot back to the engine
    pub fn release_output_slot(&mut self, index: usize, render: bool) -> Result<()> {
        let buffer = self.take_output(index)?;
        if render {
            self.stats.lock().outputs_rendered += 1;
        }
        tracing::trace!(
            "Output slot {} released ({} bytes, render: {})",
            index,
            buffer.len(),
            render
        );
        Ok(())
    }

    /// Signal end of stream, wait for the terminal output, then stop.
    ///
    /// Outputs still pending are discarded. Calling this on a stopped port
    /// is a no-op.
    pub fn drain_and_stop(&mut self) -> Result<()> {
        match self.state {
            PortState::Stopped => return Ok(()),
            PortState::Unconfigured => return Err(Error::NotConfigured),
            PortState::Configured => {
                self.release();
                return Ok(());
            }
            PortState::Running | PortState::Draining => {}
        }

        // Slots still held by the caller would block the engine
        for index in 0..self.outputs.len() {
            if self.outputs[index].is_some() {
                self.release_output_slot(index, false)?;
            }
        }

        let timeout = self.config.poll_timeout();
        let max_idle = self.config.max_idle_polls;
        let mut idle = 0;
        let mut discarded = 0u64;

        // A slot the caller dequeued but never submitted carries the marker
        if !self.eos_submitted {
            if let Some(slot) = self.checked_out.iter().position(|&held| held) {
                self.submit_input(slot, FrameBuffer::empty(), self.last_pts, BufferFlags::END_OF_STREAM)?;
            }
        }

        while !self.eos_submitted {
            if let Some(slot) = self.dequeue_input_slot(timeout)? {
                self.submit_input(slot, FrameBuffer::empty(), self.last_pts, BufferFlags::END_OF_STREAM)?;
                break;
            }
            if self.discard_output(Duration::ZERO)? {
                discarded += 1;
                idle = 0;
                continue;
            }
            idle += 1;
            if idle >= max_idle {
                self.release();
                return Err(Error::StallTimeout(format!(
                    "no input slot for end of stream after {} polls",
                    idle
                )));
            }
        }

        idle = 0;
        while !self.eos_observed {
            match self.dequeue_output_slot(timeout)? {
                Some(OutputEvent::Buffer { index, info }) => {
                    self.release_output_slot(index, false)?;
                    if !info.flags.is_end_of_stream() {
                        discarded += 1;
                    }
                    idle = 0;
                }
                Some(OutputEvent::FormatChanged(_)) => idle = 0,
                None => {
                    idle += 1;
                    if idle >= max_idle {
                        self.release();
                        return Err(Error::StallTimeout(format!(
                            "no end-of-stream output after {} polls",
                            idle
                        )));
                    }
                }
            }
        }

        if discarded > 0 {
            tracing::debug!("Discarded {} outputs while draining", discarded);
        }
        self.release();
        Ok(())
    }

    /// Stop the engine and free every slot. Safe to call in any state, any
    /// number of times.
    pub fn release(&mut self) {
        if let Some(engine) = self.engine.take() {
            let EngineLink {
                jobs,
                credits,
                worker,
                ..
            } = engine;
            drop(jobs);
            drop(credits);
            if worker.join().is_err() {
                tracing::warn!("Codec engine thread panicked");
            }

            let stats = self.stats.lock();
            tracing::info!(
                "{} {} stopped ({} in, {} out)",
                self.provider.name(),
                self.direction.map(|d| d.to_string()).unwrap_or_default(),
                stats.inputs_submitted,
                stats.outputs_delivered
            );
        }

        self.transform = None;
        self.free_inputs.clear();
        self.checked_out.clear();
        self.outputs.clear();
        self.state = PortState::Stopped;
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        match self.state {
            PortState::Running | PortState::Draining => Ok(()),
            PortState::Stopped => Err(Error::PortClosed),
            PortState::Unconfigured => Err(Error::NotConfigured),
            PortState::Configured => Err(self.state_error(operation)),
        }
    }

    fn state_error(&self, operation: &'static str) -> Error {
        match self.state {
            PortState::Stopped => Error::PortClosed,
            state => Error::InvalidState { operation, state },
        }
    }

    fn return_credit(&self, index: usize) {
        if let Some(engine) = &self.engine {
            // Engine may already have exited after end of stream
            let _ = engine.credits.send(index);
        }
    }

    /// Release one pending output without waiting longer than `timeout`
    fn discard_output(&mut self, timeout: Duration) -> Result<bool> {
        match self.dequeue_output_slot(timeout)? {
            Some(OutputEvent::Buffer { index, .. }) => {
                self.release_output_slot(index, false)?;
                Ok(true)
            }
            Some(OutputEvent::FormatChanged(_)) => Ok(true),
            None => Ok(false),
        }
    }

    /// Error explaining why the engine disappeared
    fn engine_failure(&self) -> Error {
        if let Some(engine) = &self.engine {
            for msg in engine.outputs.try_iter() {
                if let EngineMsg::Failed(err) = msg {
                    return err;
                }
            }
        }
        Error::Codec("codec engine exited unexpectedly".into())
    }
}

impl Drop for CodecPort {
    fn drop(&mut self) {
        self.release();
    }
}

/// Engine thread body: consume jobs in order, deliver outputs as output
/// credits allow
fn run_engine(
    mut transform: Box<dyn FrameTransform>,
    jobs: Receiver<Job>,
    returned_inputs: Sender<usize>,
    credits: Receiver<usize>,
    outputs: Sender<EngineMsg>,
    stats: Arc<Mutex<PortStats>>,
) {
    let mut announced = false;
    let mut produced = Vec::new();

    while let Ok(job) = jobs.recv() {
        let eos = job.flags.is_end_of_stream();
        let consumed = job.buffer.has_remaining() || !eos;

        let mut result = if consumed {
            transform.process(job.buffer, job.pts, job.flags, &mut produced)
        } else {
            Ok(())
        };
        if eos && result.is_ok() {
            result = transform.flush(&mut produced);
        }

        let _ = returned_inputs.send(job.slot);
        if consumed {
            stats.lock().inputs_processed += 1;
        }

        if let Err(err) = result {
            tracing::error!("Codec engine failed at pts {}: {}", job.pts, err);
            let _ = outputs.send(EngineMsg::Failed(err));
            return;
        }

        if eos {
            produced.push(CodecOutput {
                buffer: FrameBuffer::empty().with_pts(job.pts),
                pts: job.pts,
                flags: BufferFlags::END_OF_STREAM,
            });
        }

        for output in produced.drain(..) {
            if !announced {
                announced = true;
                if outputs
                    .send(EngineMsg::FormatChanged(transform.output_format()))
                    .is_err()
                {
                    return;
                }
            }
            let Ok(slot) = credits.recv() else {
                return;
            };
            if outputs.send(EngineMsg::Buffer { slot, output }).is_err() {
                return;
            }
        }

        if eos {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{rle, Codec, SoftwareProvider, StallingProvider};
    use crate::error::ErrorKind;
    use crate::types::PixelFormat;

    const POLL: Duration = Duration::from_millis(20);

    fn port_config() -> PortConfig {
        PortConfig::default()
            .with_poll_timeout(POLL)
            .with_max_idle_polls(50)
    }

    fn rgba_format() -> MediaFormat {
        MediaFormat::video(Codec::Rle, 4, 4).with_pixel_format(PixelFormat::Rgba)
    }

    fn running_encoder(config: PortConfig) -> CodecPort {
        let mut port = CodecPort::new(Arc::new(SoftwareProvider), config);
        port.configure(&rgba_format(), Direction::Encoder).unwrap();
        port.start().unwrap();
        port
    }

    fn frame(value: u8) -> FrameBuffer {
        FrameBuffer::from_vec(vec![value; 64]).with_format(PixelFormat::Rgba)
    }

    /// Poll until a buffer event arrives, skipping format changes
    fn next_buffer(port: &mut CodecPort) -> (usize, BufferInfo) {
        for _ in 0..100 {
            if let Some(OutputEvent::Buffer { index, info }) = port.dequeue_output_slot(POLL).unwrap() {
                return (index, info);
            }
        }
        panic!("no output buffer");
    }

    #[test]
    fn test_unrecognized_format_stays_unconfigured() {
        let mut port = CodecPort::new(Arc::new(SoftwareProvider), port_config());
        let format = MediaFormat::with_mime("video/x-nonsense", 64, 64);
        let err = port.configure(&format, Direction::Decoder).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(port.state(), PortState::Unconfigured);
        assert!(port.direction().is_none());
    }

    #[test]
    fn test_operations_require_configuration() {
        let mut port = CodecPort::new(Arc::new(SoftwareProvider), port_config());
        assert!(matches!(port.start(), Err(Error::NotConfigured)));
        assert!(matches!(
            port.dequeue_input_slot(POLL),
            Err(Error::NotConfigured)
        ));
        assert!(matches!(port.drain_and_stop(), Err(Error::NotConfigured)));

        port.configure(&rgba_format(), Direction::Encoder).unwrap();
        assert!(matches!(
            port.dequeue_output_slot(POLL),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            port.configure(&rgba_format(), Direction::Encoder),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_drain_and_stop_is_idempotent() {
        let mut port = running_encoder(port_config());
        port.drain_and_stop().unwrap();
        assert_eq!(port.state(), PortState::Stopped);
        port.drain_and_stop().unwrap();
        assert_eq!(port.state(), PortState::Stopped);
    }

    #[test]
    fn test_stopped_port_rejects_operations() {
        let mut port = running_encoder(port_config());
        port.release();
        assert!(matches!(port.dequeue_input_slot(POLL), Err(Error::PortClosed)));
        assert!(matches!(port.dequeue_output_slot(POLL), Err(Error::PortClosed)));
        assert!(matches!(port.start(), Err(Error::PortClosed)));
        assert!(matches!(
            port.configure(&rgba_format(), Direction::Encoder),
            Err(Error::PortClosed)
        ));
        port.release();
    }

    #[test]
    fn test_input_slot_times_out_with_none() {
        let mut port = running_encoder(port_config().with_slots(1, 1));
        let slot = port.dequeue_input_slot(POLL).unwrap();
        assert_eq!(slot, Some(0));
        // the only slot is checked out and never submitted
        assert_eq!(port.dequeue_input_slot(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_drain_reuses_held_input_slot() {
        let mut port = running_encoder(port_config().with_slots(1, 1));
        assert_eq!(port.dequeue_input_slot(POLL).unwrap(), Some(0));
        port.drain_and_stop().unwrap();
        assert_eq!(port.state(), PortState::Stopped);
        assert_eq!(port.stats().inputs_submitted, 1);
    }

    #[test]
    fn test_drain_stalls_when_engine_never_answers() {
        let config = port_config().with_max_idle_polls(5);
        let provider = Arc::new(StallingProvider(Duration::from_millis(300)));
        let mut port = CodecPort::new(provider, config);
        port.configure(&rgba_format(), Direction::Encoder).unwrap();
        port.start().unwrap();

        let started = std::time::Instant::now();
        let err = port.drain_and_stop().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StallTimeout);
        assert_eq!(port.state(), PortState::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stale_slot_is_rejected() {
        let mut port = running_encoder(port_config());
        assert!(matches!(
            port.submit_input(0, frame(1), 0, BufferFlags::NONE),
            Err(Error::InvalidSlot(0))
        ));
        let slot = port.dequeue_input_slot(POLL).unwrap().unwrap();
        port.submit_input(slot, frame(1), 0, BufferFlags::NONE).unwrap();
        assert!(matches!(
            port.submit_input(slot, frame(2), 1, BufferFlags::NONE),
            Err(Error::InvalidSlot(_))
        ));
        assert!(matches!(port.release_output_slot(99, false), Err(Error::InvalidSlot(99))));
    }

    #[test]
    fn test_oversized_input_is_rejected() {
        let mut port = running_encoder(port_config());
        assert_eq!(port.input_slot_capacity(), 64);
        let slot = port.dequeue_input_slot(POLL).unwrap().unwrap();
        let big = FrameBuffer::from_vec(vec![0; 65]);
        assert!(matches!(
            port.submit_input(slot, big, 0, BufferFlags::NONE),
            Err(Error::CapacityExceeded {
                required: 65,
                capacity: 64
            })
        ));
        // slot is still ours
        port.submit_input(slot, frame(0), 0, BufferFlags::NONE).unwrap();
    }

    #[test]
    fn test_encoder_outputs_in_submission_order() {
        let mut port = running_encoder(port_config());
        let mut seen = Vec::new();
        let mut format_changed = false;

        for i in 0..5u8 {
            let slot = loop {
                if let Some(slot) = port.dequeue_input_slot(POLL).unwrap() {
                    break slot;
                }
            };
            let flags = if i == 4 {
                BufferFlags::END_OF_STREAM
            } else {
                BufferFlags::NONE
            };
            port.submit_input(slot, frame(b'A' + i), i as i64 * 100, flags)
                .unwrap();
        }
        assert_eq!(port.state(), PortState::Draining);

        loop {
            match port.dequeue_output_slot(POLL).unwrap() {
                Some(OutputEvent::FormatChanged(fmt)) => {
                    assert!(seen.is_empty());
                    assert_eq!(fmt.resolution, rgba_format().resolution);
                    format_changed = true;
                }
                Some(OutputEvent::Buffer { index, info }) => {
                    if info.flags.is_end_of_stream() {
                        port.release_output_slot(index, false).unwrap();
                        break;
                    }
                    let packet = port.take_output(index).unwrap();
                    let pixels = rle::decode(packet.as_slice(), 64).unwrap();
                    seen.push((info.pts, pixels[0]));
                }
                None => {}
            }
        }

        assert!(format_changed);
        assert_eq!(
            seen,
            vec![(0, b'A'), (100, b'B'), (200, b'C'), (300, b'D'), (400, b'E')]
        );
        port.drain_and_stop().unwrap();
        assert_eq!(port.stats().outputs_delivered, 6);
    }

    #[test]
    fn test_unreleased_outputs_block_engine() {
        let mut port = running_encoder(port_config().with_slots(4, 1));
        for i in 0..3u8 {
            let slot = port.dequeue_input_slot(POLL).unwrap().unwrap();
            port.submit_input(slot, frame(i), i as i64, BufferFlags::NONE).unwrap();
        }

        let (index, info) = next_buffer(&mut port);
        assert_eq!(info.pts, 0);
        // the single output slot is held, so nothing else can arrive
        assert!(port.dequeue_output_slot(Duration::from_millis(30)).unwrap().is_none());
        assert_eq!(port.output_buffer(index).unwrap().len(), info.size);

        port.release_output_slot(index, true).unwrap();
        let (_, info) = next_buffer(&mut port);
        assert_eq!(info.pts, 1);
        assert_eq!(port.stats().outputs_rendered, 1);

        // drain discards the held output and the flushed tail
        port.drain_and_stop().unwrap();
        assert_eq!(port.state(), PortState::Stopped);
    }

    #[test]
    fn test_engine_failure_surfaces_on_dequeue() {
        let mut port = running_encoder(port_config());
        let slot = port.dequeue_input_slot(POLL).unwrap().unwrap();
        let short = FrameBuffer::from_vec(vec![0; 10]).with_format(PixelFormat::Rgba);
        port.submit_input(slot, short, 0, BufferFlags::NONE).unwrap();

        let err = loop {
            match port.dequeue_output_slot(POLL) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_drop_releases_running_port() {
        let mut port = running_encoder(port_config());
        let slot = port.dequeue_input_slot(POLL).unwrap().unwrap();
        port.submit_input(slot, frame(7), 0, BufferFlags::NONE).unwrap();
        drop(port);
    }
}
