//! # cadence-extractor
//!
//! Track search and source resolution for Cadence using yt-dlp.
//!
//! Features:
//! - Free-text search returning ordered candidates
//! - Direct URLs resolve to the track (or playlist entries) they point at
//! - Resolves a track to a direct audio URL for the decoder

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use cadence_core::{Error, Result, Track, TrackDuration};
use cadence_player::{SourceResolver, TrackProvider};

const DEFAULT_RESULT_LIMIT: usize = 5;
const DEFAULT_FORMAT: &str = "bestaudio[ext=webm]/bestaudio[ext=m4a]/bestaudio/best";

/// Track provider and source resolver backed by the yt-dlp binary.
pub struct YtDlp {
    yt_dlp_path: PathBuf,
    result_limit: usize,
    format: String,
}

impl YtDlp {
    /// Create an extractor using the bundled yt-dlp if present, otherwise the
    /// one on `PATH`.
    pub fn new() -> Self {
        let yt_dlp_path = directories::ProjectDirs::from("", "", "cadence")
            .map(|d| d.cache_dir().join("yt-dlp"))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        Self {
            yt_dlp_path,
            result_limit: DEFAULT_RESULT_LIMIT,
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    #[must_use]
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.yt_dlp_path = path.into();
        self
    }

    /// Maximum number of candidates a text search returns.
    #[must_use]
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    /// yt-dlp format selector used when resolving audio URLs.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.yt_dlp_path
    }

    pub const fn result_limit(&self) -> usize {
        self.result_limit
    }

    fn search_args(&self, query: &str) -> Vec<String> {
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch{}:{query}", self.result_limit)
        };
        vec![
            "--no-warnings".to_string(),
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            target,
        ]
    }

    fn resolve_args(&self, url: &str) -> Vec<String> {
        vec![
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-g".to_string(),
            url.to_string(),
        ]
    }

    /// Run yt-dlp and return its stdout.
    async fn run(&self, args: &[String]) -> Result<String> {
        debug!("Running yt-dlp {:?}", args);

        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Provider(format!("Failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp stderr: {}", stderr);
            return Err(Error::Provider(format!(
                "yt-dlp failed: {}",
                stderr.lines().next().unwrap_or("Unknown error")
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackProvider for YtDlp {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let output = self.run(&self.search_args(query)).await?;
        let tracks = parse_entries(&output);
        info!("Search for {:?} returned {} result(s)", query, tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl SourceResolver for YtDlp {
    async fn resolve(&self, track: &Track) -> Result<String> {
        let output = self.run(&self.resolve_args(&track.url)).await?;
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Provider(format!("yt-dlp returned no audio URL for {}", track.id))
            })
    }
}

/// One line of `--dump-json` output.
#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Entry {
    fn into_track(self) -> Track {
        let url = self
            .webpage_url
            .or(self.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));
        let title = self.title.unwrap_or_else(|| self.id.clone());

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let duration = self
            .duration
            .map(|secs| TrackDuration::from_millis((secs.max(0.0) * 1000.0) as u64))
            .unwrap_or_default();

        let mut track = Track::new(self.id, url, title)
            .with_author(self.uploader.or(self.channel).unwrap_or_default())
            .with_duration(duration);
        track.views = self.view_count.unwrap_or(0);
        // Flat search results carry no `thumbnail`, only the list.
        track.thumbnail = self
            .thumbnail
            .or_else(|| self.thumbnails.into_iter().last().map(|t| t.url));
        track
    }
}

/// Parse newline-delimited yt-dlp JSON into tracks, in order. Lines that do
/// not describe a track are skipped.
fn parse_entries(output: &str) -> Vec<Track> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Entry>(line) {
            Ok(entry) => Some(entry.into_track()),
            Err(e) => {
                warn!("Skipping unparseable yt-dlp entry: {e}");
                None
            }
        })
        .collect()
}

fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}
