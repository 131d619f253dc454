//! Local voice transport.
//!
//! Streams are paced at real time in 20 ms chunks and written to a file (or
//! discarded), with the session gain applied to every sample. This stands in
//! for a network voice connection when running Cadence from a terminal.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{Error, Result};
use cadence_player::{
    AudioStream, Connection, Destination, DestinationId, PipelineHandle, PipelineSignal,
    VoiceTransport,
};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const CHUNK: Duration = Duration::from_millis(20);
const CHANNELS: u64 = 2;
const BYTES_PER_FRAME: u64 = CHANNELS * 4;

/// Transport handing out one [`LocalConnection`] per destination.
pub struct LocalTransport {
    sample_rate: u32,
    output: Option<PathBuf>,
    connections: Mutex<HashMap<DestinationId, Arc<LocalConnection>>>,
}

impl LocalTransport {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            output: None,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Append PCM to `path` instead of discarding it.
    #[must_use]
    pub fn with_output(mut self, path: Option<PathBuf>) -> Self {
        self.output = path;
        self
    }
}

#[async_trait]
impl VoiceTransport for LocalTransport {
    async fn join(&self, destination: &Destination) -> Result<Arc<dyn Connection>> {
        let connection = Arc::clone(
            self.connections
                .lock()
                .entry(destination.id.clone())
                .or_insert_with(|| {
                    info!("Joining {}", destination.name);
                    Arc::new(LocalConnection::new(self.sample_rate, self.output.clone()))
                }),
        );
        Ok(connection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Playing,
    Paused,
    Ended,
}

/// Paced PCM sink for raw f32le stereo.
pub struct LocalConnection {
    sample_rate: u32,
    output: Option<PathBuf>,
    gain: Arc<Mutex<f32>>,
    frames: Arc<AtomicU64>,
    control: Mutex<Option<watch::Sender<SinkState>>>,
}

impl LocalConnection {
    fn new(sample_rate: u32, output: Option<PathBuf>) -> Self {
        Self {
            sample_rate,
            output,
            gain: Arc::new(Mutex::new(0.5)),
            frames: Arc::new(AtomicU64::new(0)),
            control: Mutex::new(None),
        }
    }

    fn set_state(&self, state: SinkState) {
        if let Some(control) = self.control.lock().as_ref() {
            control.send_replace(state);
        }
    }

    async fn open_output(&self) -> io::Result<Box<dyn AsyncWrite + Send + Unpin>> {
        match &self.output {
            Some(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(tokio::io::sink())),
        }
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn ready(&self) -> Result<()> {
        self.open_output()
            .await
            .map(drop)
            .map_err(|e| Error::Transport(format!("Output not writable: {e}")))
    }

    async fn play(&self, stream: AudioStream) -> Result<PipelineHandle> {
        let output = self
            .open_output()
            .await
            .map_err(|e| Error::Transport(format!("Failed to open output: {e}")))?;

        let (control, state) = watch::channel(SinkState::Playing);
        if let Some(previous) = self.control.lock().replace(control) {
            previous.send_replace(SinkState::Ended);
        }
        self.frames.store(0, Ordering::Relaxed);

        let (signals, handle) = PipelineHandle::channel();
        let pump = Pump {
            stream,
            output,
            state,
            signals,
            gain: Arc::clone(&self.gain),
            frames: Arc::clone(&self.frames),
            chunk_bytes: chunk_bytes(self.sample_rate),
        };
        tokio::spawn(pump.run());

        Ok(handle)
    }

    fn pause(&self) {
        self.set_state(SinkState::Paused);
    }

    fn resume(&self) {
        self.set_state(SinkState::Playing);
    }

    fn end(&self) {
        if let Some(control) = self.control.lock().take() {
            control.send_replace(SinkState::Ended);
        }
    }

    fn set_gain(&self, gain: f32) {
        *self.gain.lock() = gain;
    }

    fn elapsed(&self) -> Duration {
        let frames = u128::from(self.frames.load(Ordering::Relaxed));
        let nanos = frames * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    async fn leave(&self) {
        self.end();
        info!("Left local output");
    }
}

/// Moves PCM from a decoder stream to the output at real-time pace.
struct Pump {
    stream: AudioStream,
    output: Box<dyn AsyncWrite + Send + Unpin>,
    state: watch::Receiver<SinkState>,
    signals: mpsc::UnboundedSender<PipelineSignal>,
    gain: Arc<Mutex<f32>>,
    frames: Arc<AtomicU64>,
    chunk_bytes: usize,
}

impl Pump {
    async fn run(mut self) {
        let _ = self.signals.send(PipelineSignal::Start);
        let signal = match self.pump().await {
            Ok(()) => PipelineSignal::Finish,
            Err(e) => {
                warn!("Local sink failed: {e}");
                PipelineSignal::Error(e.to_string())
            }
        };
        let _ = self.output.flush().await;
        let _ = self.signals.send(signal);
    }

    async fn pump(&mut self) -> io::Result<()> {
        let mut buf = vec![0u8; self.chunk_bytes];
        let mut clock = tokio::time::interval(CHUNK);

        loop {
            let state = *self.state.borrow_and_update();
            match state {
                SinkState::Ended => {
                    debug!("Local sink ended early");
                    return Ok(());
                }
                SinkState::Paused => {
                    if self.state.changed().await.is_err() {
                        return Ok(());
                    }
                    clock.reset();
                    continue;
                }
                SinkState::Playing => {}
            }

            tokio::select! {
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                _ = clock.tick() => {}
            }

            let n = fill(&mut self.stream, &mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            let whole = n - n % 4;
            apply_gain(&mut buf[..whole], *self.gain.lock());
            self.output.write_all(&buf[..n]).await?;
            self.frames
                .fetch_add(n as u64 / BYTES_PER_FRAME, Ordering::Relaxed);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn chunk_bytes(sample_rate: u32) -> usize {
    let frames = u64::from(sample_rate) * CHUNK.as_millis() as u64 / 1000;
    (frames.max(1) * BYTES_PER_FRAME) as usize
}

/// Read until `buf` is full or the stream ends.
async fn fill<R: AsyncRead + Unpin + ?Sized>(stream: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Scale little-endian f32 samples in place.
fn apply_gain(bytes: &mut [u8], gain: f32) {
    for sample in bytes.chunks_exact_mut(4) {
        let value = f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]) * gain;
        sample.copy_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_player::SessionKey;

    fn pcm(frames: usize) -> AudioStream {
        Box::new(io::Cursor::new(vec![0u8; frames * 8]))
    }

    async fn connection() -> Arc<dyn Connection> {
        let transport = LocalTransport::new(1000);
        let destination = Destination::new(
            SessionKey::new("local"),
            DestinationId::new("out"),
            "Local output",
        );
        let connection = transport.join(&destination).await.unwrap();
        connection.ready().await.unwrap();
        connection
    }

    #[test]
    fn test_apply_gain() {
        let mut bytes: Vec<u8> = [1.0f32, -0.5].iter().flat_map(|s| s.to_le_bytes()).collect();
        apply_gain(&mut bytes, 0.25);
        assert_eq!(f32::from_le_bytes(bytes[..4].try_into().unwrap()), 0.25);
        assert_eq!(f32::from_le_bytes(bytes[4..].try_into().unwrap()), -0.125);
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_bytes(48_000), 960 * 8);
        assert_eq!(chunk_bytes(1000), 20 * 8);
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let transport = LocalTransport::new(48_000);
        let destination = Destination::new(
            SessionKey::new("local"),
            DestinationId::new("out"),
            "Local output",
        );
        let first = transport.join(&destination).await.unwrap();
        let second = transport.join(&destination).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_stream_runs_to_finish() {
        let connection = connection().await;
        let mut handle = connection.play(pcm(100)).await.unwrap();

        assert_eq!(handle.next().await, PipelineSignal::Start);
        assert_eq!(handle.next().await, PipelineSignal::Finish);
        assert_eq!(connection.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_end_stops_early() {
        let connection = connection().await;
        let mut handle = connection.play(pcm(60_000)).await.unwrap();
        assert_eq!(handle.next().await, PipelineSignal::Start);

        connection.end();

        assert_eq!(handle.next().await, PipelineSignal::Finish);
        assert!(connection.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_pause_holds_position() {
        let connection = connection().await;
        let mut handle = connection.play(pcm(60_000)).await.unwrap();
        assert_eq!(handle.next().await, PipelineSignal::Start);

        connection.pause();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let held = connection.elapsed();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connection.elapsed(), held);

        connection.resume();
        connection.end();
        assert_eq!(handle.next().await, PipelineSignal::Finish);
    }
}
