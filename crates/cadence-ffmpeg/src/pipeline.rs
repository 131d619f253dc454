//! ffmpeg subprocess pipeline.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::io;
use std::path::{Path, PathBuf};
use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{Error, FilterParams, Result, Track};
use cadence_player::{AudioStream, SourceResolver, StreamOptions, StreamPipeline};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::filters::render_chain;

/// Decodes tracks to raw PCM (f32le, interleaved stereo) with ffmpeg.
pub struct FfmpegPipeline {
    ffmpeg_path: PathBuf,
    params: FilterParams,
    resolver: Option<Arc<dyn SourceResolver>>,
}

impl FfmpegPipeline {
    /// Create a pipeline using the bundled ffmpeg if present, otherwise the
    /// one on `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: Self::default_path(),
            params: FilterParams::default(),
            resolver: None,
        }
    }

    fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "cadence")
            .map(|d| d.cache_dir().join("ffmpeg"))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    #[must_use]
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Set the parameters filters and output format are rendered with.
    #[must_use]
    pub fn with_params(mut self, params: FilterParams) -> Self {
        self.params = params;
        self
    }

    /// Resolve each track to a direct media URL before decoding.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub const fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Arguments for decoding `input` with `options` applied.
    ///
    /// The seek goes before `-i` so ffmpeg skips on the input side instead of
    /// decoding up to the offset.
    pub fn build_args(&self, input: &str, options: &StreamOptions) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if is_remote(input) {
            args.extend(
                [
                    "-reconnect",
                    "1",
                    "-reconnect_streamed",
                    "1",
                    "-reconnect_delay_max",
                    "5",
                ]
                .map(String::from),
            );
        }

        if options.seek > Duration::ZERO {
            args.push("-ss".to_string());
            args.push(format!("{:.3}", options.seek.as_secs_f64()));
        }

        args.push("-i".to_string());
        args.push(input.to_string());

        if let Some(chain) = render_chain(&options.filters, &self.params) {
            args.push("-af".to_string());
            args.push(chain);
        }

        // f32le, fixed rate, stereo, errors only, to stdout
        args.extend(
            [
                "-f".to_string(),
                "f32le".to_string(),
                "-acodec".to_string(),
                "pcm_f32le".to_string(),
                "-ar".to_string(),
                self.params.sample_rate.to_string(),
                "-ac".to_string(),
                "2".to_string(),
                "-v".to_string(),
                "error".to_string(),
                "pipe:1".to_string(),
            ],
        );
        args
    }
}

impl Default for FfmpegPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamPipeline for FfmpegPipeline {
    async fn open(&self, track: &Track, options: &StreamOptions) -> Result<AudioStream> {
        let input = match &self.resolver {
            Some(resolver) => resolver.resolve(track).await?,
            None => track.url.clone(),
        };
        let args = self.build_args(&input, options);

        info!(
            "Spawning ffmpeg for {} at {:.1}s",
            track.display_name(),
            options.seek.as_secs_f64()
        );
        debug!("ffmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Pipeline(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Pipeline("Failed to capture ffmpeg stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Pipeline("Failed to capture ffmpeg stderr".to_string()))?;

        Ok(Box::new(FfmpegStream {
            pid: child.id(),
            stdout,
            exit: Some(tokio::spawn(supervise(child, stderr))),
        }))
    }
}

/// PCM output of a running ffmpeg process. Dropping it kills the process.
///
/// End of output is only reported once ffmpeg has exited cleanly; a non-zero
/// exit turns into a read error carrying ffmpeg's first error line.
pub struct FfmpegStream {
    pid: Option<u32>,
    stdout: ChildStdout,
    exit: Option<JoinHandle<io::Result<()>>>,
}

impl FfmpegStream {
    /// OS pid of the decoder, if it was known at spawn.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl AsyncRead for FfmpegStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;
        if buf.filled().len() > before || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        // stdout is done; the exit status decides between EOF and failure
        let Some(exit) = this.exit.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let outcome = ready!(Pin::new(exit).poll(cx));
        this.exit = None;
        Poll::Ready(outcome.unwrap_or_else(|e| Err(io::Error::other(e))))
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        // Aborting drops the child, which kills it.
        if let Some(exit) = self.exit.take() {
            exit.abort();
        }
    }
}

/// Drain ffmpeg's stderr and wait for it to exit.
async fn supervise(mut child: Child, stderr: ChildStderr) -> io::Result<()> {
    let mut lines = BufReader::new(stderr).lines();
    let mut first_error: Option<String> = None;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("ffmpeg: {line}");
        if first_error.is_none() {
            first_error = Some(line.to_string());
        }
    }

    let status = child.wait().await?;
    if status.success() {
        return Ok(());
    }
    let message = exit_message(status, first_error.as_deref());
    warn!("{message}");
    Err(io::Error::other(message))
}

fn exit_message(status: ExitStatus, first_error: Option<&str>) -> String {
    let code = status
        .code()
        .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
    match first_error {
        Some(line) => format!("ffmpeg exited with {code}: {line}"),
        None => format!("ffmpeg exited with {code}"),
    }
}

fn is_remote(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}
