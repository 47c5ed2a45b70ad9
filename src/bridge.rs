//! Transfer bridge: per-stream worker threads that hand bytes between the
//! ring buffer and the application callbacks.
//!
//! The driver side never calls into application code; it only bumps an
//! atomic pending counter and unparks the worker. The worker drains or
//! fills the ring on its own thread, where the application callback is free
//! to block, allocate, or do I/O. A park timeout serves as a wake-up safety
//! net in case a notification races the park.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crate::error::AudioIoError;
use crate::event::Direction;
use crate::ring::{RingReader, RingWriter};

/// Receives captured audio on the bridge thread.
///
/// Arguments are the interleaved bytes and their frame count. Called from
/// the bridge worker, so it may block, but while it does no further blocks
/// are delivered and the ring keeps filling.
pub type ReadCallback = Box<dyn FnMut(&[u8], usize) + Send>;

/// Produces audio for playback on the bridge thread.
///
/// The buffer arrives zeroed and sized to one block of the given frame
/// count; the callback returns how many bytes it wrote. Any shortfall is
/// played as silence.
pub type WriteCallback = Box<dyn FnMut(&mut [u8], usize) -> usize + Send>;

const IDLE_PARK: Duration = Duration::from_millis(100);

enum Command {
    Stop,
}

/// Driver-facing half of the bridge: a pending counter plus the worker's
/// thread handle for unparking.
///
/// [`notify`](Self::notify) is the only realtime-safe entry point.
pub(crate) struct BridgeShared {
    pending: AtomicUsize,
    worker: OnceLock<Thread>,
}

impl BridgeShared {
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            worker: OnceLock::new(),
        }
    }

    /// Records one driver period and wakes the worker. Wait-free.
    ///
    /// Unpark leaves a token when the worker is not parked yet, so a
    /// notification arriving between the worker's pending check and its
    /// park is never lost.
    pub(crate) fn notify(&self) {
        self.pending.fetch_add(1, Ordering::Release);
        if let Some(worker) = self.worker.get() {
            worker.unpark();
        }
    }

    fn register(&self, worker: Thread) {
        let _ = self.worker.set(worker);
    }

    fn take_pending(&self) -> usize {
        self.pending.swap(0, Ordering::Acquire)
    }
}

/// Owns a bridge worker thread; stopping joins it.
pub(crate) struct BridgeHandle {
    direction: Direction,
    commands: Sender<Command>,
    shared: Arc<BridgeShared>,
    worker: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Stops the worker and joins it. Idempotent.
    ///
    /// For an input bridge this delivers whatever whole frames are still
    /// buffered before the thread exits.
    pub(crate) fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Stop);
            self.shared.notify();
            if worker.join().is_err() {
                tracing::error!(direction = %self.direction, "bridge worker panicked");
            }
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the capture-side worker.
///
/// With `block_frames` set the callback sees exactly that many frames per
/// invocation while a full block is buffered; without it every buffered
/// whole frame is delivered at once. The final delivery at stop may be
/// shorter than a block.
pub(crate) fn spawn_input(
    shared: Arc<BridgeShared>,
    reader: RingReader,
    callback: ReadCallback,
    block_frames: Option<usize>,
    bytes_per_frame: usize,
) -> Result<BridgeHandle, AudioIoError> {
    let (commands, receiver) = mpsc::channel();
    let worker_shared = shared.clone();
    let worker = thread::Builder::new()
        .name("audio-bridge-in".to_string())
        .spawn(move || {
            input_worker(worker_shared, receiver, reader, callback, block_frames, bytes_per_frame);
        })
        .map_err(|err| AudioIoError::StreamCreationFailed {
            direction: Direction::Input,
            reason: format!("failed to spawn bridge worker: {err}"),
        })?;
    Ok(BridgeHandle {
        direction: Direction::Input,
        commands,
        shared,
        worker: Some(worker),
    })
}

/// Spawns the playback-side worker.
///
/// The worker keeps the ring topped up one block at a time whenever at
/// least one block of space is free.
pub(crate) fn spawn_output(
    shared: Arc<BridgeShared>,
    writer: RingWriter,
    callback: WriteCallback,
    block_frames: usize,
    bytes_per_frame: usize,
) -> Result<BridgeHandle, AudioIoError> {
    let (commands, receiver) = mpsc::channel();
    let worker_shared = shared.clone();
    let worker = thread::Builder::new()
        .name("audio-bridge-out".to_string())
        .spawn(move || {
            output_worker(worker_shared, receiver, writer, callback, block_frames, bytes_per_frame);
        })
        .map_err(|err| AudioIoError::StreamCreationFailed {
            direction: Direction::Output,
            reason: format!("failed to spawn bridge worker: {err}"),
        })?;
    Ok(BridgeHandle {
        direction: Direction::Output,
        commands,
        shared,
        worker: Some(worker),
    })
}

fn should_stop(receiver: &Receiver<Command>) -> bool {
    match receiver.try_recv() {
        Ok(Command::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn input_worker(
    shared: Arc<BridgeShared>,
    receiver: Receiver<Command>,
    mut reader: RingReader,
    mut callback: ReadCallback,
    block_frames: Option<usize>,
    bytes_per_frame: usize,
) {
    shared.register(thread::current());
    let mut scratch = Vec::new();
    loop {
        if should_stop(&receiver) {
            break;
        }
        if shared.take_pending() == 0 {
            thread::park_timeout(IDLE_PARK);
            continue;
        }
        deliver_input(&mut reader, &mut callback, block_frames, bytes_per_frame, &mut scratch);
    }
    // Final drain, ignoring the block size so a short tail is not lost.
    deliver_input(&mut reader, &mut callback, None, bytes_per_frame, &mut scratch);
    tracing::debug!("input bridge stopped");
}

fn deliver_input(
    reader: &mut RingReader,
    callback: &mut ReadCallback,
    block_frames: Option<usize>,
    bytes_per_frame: usize,
    scratch: &mut Vec<u8>,
) {
    match block_frames {
        Some(block) => {
            let block_bytes = block * bytes_per_frame;
            while reader.fill_count() >= block_bytes {
                gather(reader, scratch, block_bytes);
                reader.advance_read(block_bytes);
                callback(scratch, block);
            }
        }
        None => {
            let bytes = reader.fill_count() / bytes_per_frame * bytes_per_frame;
            if bytes > 0 {
                gather(reader, scratch, bytes);
                reader.advance_read(bytes);
                tracing::trace!(bytes, "input bridge drained");
                callback(scratch, bytes / bytes_per_frame);
            }
        }
    }
}

/// Copies `bytes` from the ring's filled spans into `scratch`.
fn gather(reader: &mut RingReader, scratch: &mut Vec<u8>, bytes: usize) {
    scratch.clear();
    let (first, second) = reader.read_regions();
    let take = bytes.min(first.len());
    scratch.extend_from_slice(&first[..take]);
    scratch.extend_from_slice(&second[..bytes - take]);
}

fn output_worker(
    shared: Arc<BridgeShared>,
    receiver: Receiver<Command>,
    mut writer: RingWriter,
    mut callback: WriteCallback,
    block_frames: usize,
    bytes_per_frame: usize,
) {
    shared.register(thread::current());
    // A block larger than the ring would never fit; cap it so the stream
    // still plays.
    let max_frames = writer.capacity() / bytes_per_frame;
    let block_frames = block_frames.min(max_frames).max(1);
    let block_bytes = block_frames * bytes_per_frame;
    let mut scratch = vec![0u8; block_bytes];
    loop {
        if should_stop(&receiver) {
            break;
        }
        if shared.take_pending() == 0 {
            thread::park_timeout(IDLE_PARK);
            continue;
        }
        while writer.free_count() >= block_bytes {
            scratch.fill(0);
            let produced = callback(&mut scratch, block_frames).min(block_bytes);
            scratch[produced..].fill(0);
            scatter(&mut writer, &scratch);
            writer.advance_write(block_bytes);
        }
    }
    tracing::debug!("output bridge stopped");
}

/// Copies `bytes` into the ring's free spans.
fn scatter(writer: &mut RingWriter, bytes: &[u8]) {
    let (first, second) = writer.write_regions();
    let take = bytes.len().min(first.len());
    first[..take].copy_from_slice(&bytes[..take]);
    second[..bytes.len() - take].copy_from_slice(&bytes[take..]);
}
