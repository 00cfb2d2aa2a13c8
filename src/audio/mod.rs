use crate::model::Track;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MAX_VOLUME: f32 = 2.5;

/// Observations a backend reports about its own progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSignal {
    /// The current item played through to its end.
    ItemEnded,
    /// The backend moved on to the following item (or ran out of items).
    CurrentItemChanged,
}

/// A forward-only playback queue.
///
/// Items can be appended and the current item skipped, but there is no way
/// to step backward or jump: going anywhere else means clearing and
/// enqueueing again from the desired item.
pub trait QueueBackend {
    type Item;

    /// Builds a playable handle for a track's source locator.
    fn prepare(&mut self, track: &Track) -> Result<Self::Item>;
    fn enqueue(&mut self, item: &Self::Item) -> Result<()>;
    /// Drops the current item. Produces no signal.
    fn skip_current(&mut self);
    fn clear(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn is_empty(&self) -> bool;
    /// Seeks the current item back to its start.
    fn rewind(&mut self) -> Result<()>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    /// Drains signals gathered since the last call, in the order they happened.
    fn poll_signals(&mut self) -> Vec<QueueSignal>;
}

/// A decodable file plus the duration reported when it was probed.
#[derive(Debug, Clone)]
pub struct PreparedItem {
    pub path: PathBuf,
    pub duration: Option<Duration>,
}

pub fn probe_item(path: &Path) -> Result<PreparedItem> {
    let source = open_decoder(path)?;
    Ok(PreparedItem {
        path: path.to_path_buf(),
        duration: source.total_duration().filter(|duration| !duration.is_zero()),
    })
}

fn open_decoder(path: &Path) -> Result<impl Source + Send + 'static> {
    let file =
        File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
    Decoder::try_from(file).with_context(|| format!("failed to decode {}", path.display()))
}

pub struct RodioQueueBackend {
    stream: OutputStream,
    sink: Sink,
    expected_len: usize,
    durations: VecDeque<Option<Duration>>,
    volume: f32,
}

impl RodioQueueBackend {
    pub fn new() -> Result<Self> {
        let stream = Self::open_output_stream()?;
        let sink = Sink::connect_new(stream.mixer());
        sink.pause();

        Ok(Self {
            stream,
            sink,
            expected_len: 0,
            durations: VecDeque::new(),
            volume: 1.0,
        })
    }

    pub fn output_channels(&self) -> u16 {
        self.stream.config().channel_count()
    }

    fn open_output_stream() -> Result<OutputStream> {
        let mut stream = with_silenced_stderr(|| {
            match OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                }) {
                Ok(stream) => Ok(stream),
                Err(default_err) => {
                    log::warn!("default output unavailable, trying other devices: {default_err:#}");
                    let host = rodio::cpal::default_host();
                    let mut candidates: Vec<String> = host
                        .output_devices()
                        .ok()
                        .into_iter()
                        .flatten()
                        .filter_map(|device| device.name().ok())
                        .collect();
                    candidates.sort_by_cached_key(|name| {
                        let lower = name.to_ascii_lowercase();
                        let rank = if lower.contains("pulse") {
                            0_u8
                        } else if lower.contains("pipewire") {
                            1_u8
                        } else {
                            2_u8
                        };
                        (rank, lower)
                    });
                    candidates.dedup();

                    for candidate in candidates {
                        let Some(device) = host.output_devices().ok().into_iter().flatten().find(
                            |entry| entry.name().ok().as_deref() == Some(candidate.as_str()),
                        ) else {
                            continue;
                        };
                        let opened = OutputStreamBuilder::from_device(device)
                            .context("failed to open fallback output device")
                            .and_then(|builder| {
                                builder
                                    .with_error_callback(|_| {})
                                    .open_stream_or_fallback()
                                    .context("failed to start fallback output stream")
                            });
                        if let Ok(stream) = opened {
                            log::info!("using output device {candidate}");
                            return Ok(stream);
                        }
                    }

                    Err(anyhow::anyhow!(
                        "unable to start any audio output stream after default failed: {default_err:#}"
                    ))
                }
            }
        })?;
        stream.log_on_drop(false);
        Ok(stream)
    }
}

impl QueueBackend for RodioQueueBackend {
    type Item = PreparedItem;

    fn prepare(&mut self, track: &Track) -> Result<PreparedItem> {
        probe_item(track.source())
    }

    fn enqueue(&mut self, item: &PreparedItem) -> Result<()> {
        let source = open_decoder(&item.path)?;
        self.sink.append(source);
        self.expected_len += 1;
        self.durations.push_back(item.duration);
        Ok(())
    }

    fn skip_current(&mut self) {
        if self.expected_len == 0 {
            return;
        }
        self.sink.skip_one();
        self.expected_len -= 1;
        self.durations.pop_front();
    }

    fn clear(&mut self) {
        self.sink.clear();
        self.expected_len = 0;
        self.durations.clear();
    }

    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_empty(&self) -> bool {
        self.expected_len == 0
    }

    fn rewind(&mut self) -> Result<()> {
        self.sink
            .try_seek(Duration::ZERO)
            .map_err(|err| anyhow::anyhow!("failed to rewind current track: {err:?}"))
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
        self.sink.set_volume(self.volume);
    }

    fn position(&self) -> Option<Duration> {
        (self.expected_len > 0).then(|| self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.durations.front().copied().flatten()
    }

    fn poll_signals(&mut self) -> Vec<QueueSignal> {
        // The sink drops skipped sources lazily, so a count above the expected
        // length is a pending skip, never an ended item.
        let ended = self.expected_len.saturating_sub(self.sink.len());
        let mut signals = Vec::with_capacity(ended * 2);
        for _ in 0..ended {
            self.expected_len -= 1;
            self.durations.pop_front();
            signals.push(QueueSignal::ItemEnded);
            signals.push(QueueSignal::CurrentItemChanged);
        }
        signals
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullItem {
    pub path: PathBuf,
}

/// In-memory queue with no output. Items end only when told to.
#[derive(Debug)]
pub struct NullQueueBackend {
    items: VecDeque<NullItem>,
    paused: bool,
    volume: f32,
    position: Duration,
    item_duration: Option<Duration>,
    rejected: HashSet<PathBuf>,
    pending: Vec<QueueSignal>,
}

impl NullQueueBackend {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            paused: true,
            volume: 1.0,
            position: Duration::ZERO,
            item_duration: None,
            rejected: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Every item reports this duration.
    pub fn with_item_duration(mut self, duration: Duration) -> Self {
        self.item_duration = Some(duration);
        self
    }

    /// Makes `prepare` fail for this source.
    pub fn reject(&mut self, path: impl Into<PathBuf>) {
        self.rejected.insert(path.into());
    }

    /// Plays the current item through to its end.
    pub fn finish_current(&mut self) {
        if self.items.pop_front().is_none() {
            return;
        }
        self.position = Duration::ZERO;
        self.pending.push(QueueSignal::ItemEnded);
        self.pending.push(QueueSignal::CurrentItemChanged);
    }

    pub fn elapse(&mut self, delta: Duration) {
        if self.items.is_empty() || self.paused {
            return;
        }
        let advanced = self.position.saturating_add(delta);
        self.position = self
            .item_duration
            .map_or(advanced, |duration| advanced.min(duration));
    }

    /// Sources still queued, current item first.
    pub fn queued_paths(&self) -> Vec<PathBuf> {
        self.items.iter().map(|item| item.path.clone()).collect()
    }
}

impl Default for NullQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueBackend for NullQueueBackend {
    type Item = NullItem;

    fn prepare(&mut self, track: &Track) -> Result<NullItem> {
        if self.rejected.contains(track.source()) {
            anyhow::bail!("unplayable source {}", track.source().display());
        }
        Ok(NullItem {
            path: track.source().to_path_buf(),
        })
    }

    fn enqueue(&mut self, item: &NullItem) -> Result<()> {
        self.items.push_back(item.clone());
        Ok(())
    }

    fn skip_current(&mut self) {
        if self.items.pop_front().is_some() {
            self.position = Duration::ZERO;
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.position = Duration::ZERO;
        self.paused = true;
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn rewind(&mut self) -> Result<()> {
        if self.items.is_empty() {
            anyhow::bail!("no active track");
        }
        self.position = Duration::ZERO;
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
    }

    fn position(&self) -> Option<Duration> {
        (!self.items.is_empty()).then_some(self.position)
    }

    fn duration(&self) -> Option<Duration> {
        if self.items.is_empty() {
            return None;
        }
        self.item_duration
    }

    fn poll_signals(&mut self) -> Vec<QueueSignal> {
        std::mem::take(&mut self.pending)
    }
}
