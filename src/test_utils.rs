//! Test utilities: console frame builders and in-memory collaborators
//!
//! Used by unit tests and the frame decoding benchmark.

#![cfg(any(test, feature = "benchmark"))]

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};

use crate::protocol::{FRAME_PREFIX_LEN, FRAME_SUFFIX_LEN};
use crate::sink::{LiveUpdate, PersistenceSink};
use crate::source::{
    CaptureField, CaptureSample, CaptureSource, FieldImage, MatchCodeLocator, Recognizer,
};
use crate::types::MatchCode;
use crate::{Result, SyncError};

const SOH: u8 = 0x01;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Body of a clock message.
///
/// `minutes` and `seconds` are the raw two-byte fields, so blanks and
/// garbage can be injected.
pub fn clock_body(status: u8, minutes: &[u8], seconds: &[u8], period: u8) -> Vec<u8> {
    let mut body = b"01".to_vec();
    body.push(status);
    body.push(b'4');
    body.extend_from_slice(minutes);
    body.extend_from_slice(seconds);
    body.extend_from_slice(b"  ");
    body.push(period);
    body
}

/// Body of a score message from two raw three-byte fields.
pub fn score_body(home: &[u8], away: &[u8]) -> Vec<u8> {
    let mut body = b"024".to_vec();
    body.extend_from_slice(home);
    body.extend_from_slice(away);
    body
}

/// Wrap a body in the console's link-layer framing.
pub fn console_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + body.len() + FRAME_SUFFIX_LEN);
    frame.extend_from_slice(&[SOH, b'1', STX, b'0']);
    frame.extend_from_slice(body);
    let lrc = body.iter().fold(ETX, |acc, b| acc ^ b);
    frame.extend_from_slice(&[ETX, lrc]);
    frame
}

/// Locator whose match code is set by the test.
#[derive(Debug)]
pub struct StaticLocator {
    tx: watch::Sender<Option<MatchCode>>,
}

impl StaticLocator {
    /// # Panics
    /// When `code` is not a valid match code.
    pub fn new(code: Option<&str>) -> Self {
        let (tx, _) = watch::channel(code.map(parse_code));
        Self { tx }
    }

    /// Change the active match code, notifying watchers.
    pub fn set(&self, code: Option<&str>) {
        self.tx.send_replace(code.map(parse_code));
    }
}

fn parse_code(code: &str) -> MatchCode {
    MatchCode::parse(code).expect("valid test match code")
}

#[async_trait::async_trait]
impl MatchCodeLocator for StaticLocator {
    async fn watch(&self) -> Result<BoxStream<'static, Result<()>>> {
        Ok(WatchStream::new(self.tx.subscribe()).map(|_| Ok(())).boxed())
    }

    async fn locate(&self) -> Result<Option<MatchCode>> {
        Ok(self.tx.borrow().clone())
    }
}

/// Sample feed of one opened capture.
#[derive(Debug)]
pub struct CaptureFeed {
    pub match_code: MatchCode,
    samples: mpsc::UnboundedSender<Result<CaptureSample>>,
}

impl CaptureFeed {
    /// Push a sample; ignored once the capture is closed.
    pub fn send(&self, sample: CaptureSample) {
        let _ = self.samples.send(Ok(sample));
    }

    /// Break the capture with a transport error.
    pub fn fail(&self, error: std::io::Error) {
        let _ = self.samples.send(Err(SyncError::transport("test capture", error)));
    }

    /// The source dropped this capture.
    pub fn is_closed(&self) -> bool {
        self.samples.is_closed()
    }
}

/// Capture source handing every opened capture to the test.
#[derive(Debug)]
pub struct ChannelCapture {
    feeds: mpsc::UnboundedSender<CaptureFeed>,
    opens: AtomicUsize,
}

impl ChannelCapture {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CaptureFeed>) {
        let (feeds, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { feeds, opens: AtomicUsize::new(0) }), rx)
    }

    /// Number of captures opened so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureSource for ChannelCapture {
    async fn open(
        &self,
        match_code: &MatchCode,
    ) -> Result<BoxStream<'static, Result<CaptureSample>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (samples, rx) = mpsc::unbounded_channel();
        self.feeds
            .send(CaptureFeed { match_code: match_code.clone(), samples })
            .map_err(|_| SyncError::discovery("test capture", "no test is listening"))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Capture whose field images are plain UTF-8 text.
pub fn capture_sample(chrono: &str, home: &str, away: &str, started: bool) -> CaptureSample {
    let image = |text: &str| Some(FieldImage::copy_from_slice(text.as_bytes()));
    CaptureSample {
        chrono: image(chrono),
        home_score: image(home),
        away_score: image(away),
        chrono_started: Some(started),
    }
}

/// Recognizer reading images as UTF-8 text.
#[derive(Debug, Default)]
pub struct TextRecognizer {
    panic_on: Option<String>,
    delay: Option<Duration>,
}

impl TextRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panic whenever a field reads exactly `text`.
    pub fn panicking_on(mut self, text: &str) -> Self {
        self.panic_on = Some(text.to_string());
        self
    }

    /// Take `delay` for every field.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl Recognizer for TextRecognizer {
    async fn recognize(&self, field: CaptureField, image: &FieldImage) -> Result<Option<String>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let text = String::from_utf8_lossy(image).into_owned();
        if self.panic_on.as_deref() == Some(text.as_str()) {
            panic!("recognizer crashed on {field}");
        }
        Ok(Some(text))
    }
}

/// Sink keeping every write in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<(MatchCode, LiveUpdate)>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent writes fail (and not be recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(MatchCode, LiveUpdate)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PersistenceSink for MemorySink {
    async fn write(&self, match_code: &MatchCode, update: &LiveUpdate) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::persistence(match_code.as_str(), "sink unavailable", None));
        }
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((match_code.clone(), update.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DecodedMessage, decode_frame};

    #[test]
    fn built_frames_decode() {
        let frame = console_frame(&score_body(b" 12", b"  9"));
        assert_eq!(frame.len(), FRAME_PREFIX_LEN + 9 + FRAME_SUFFIX_LEN);
        assert_eq!(decode_frame(&frame), DecodedMessage::Score { home_score: 12, away_score: 9 });

        let frame = console_frame(&clock_body(0x00, b"29", b"59", b'2'));
        assert_eq!(
            decode_frame(&frame),
            DecodedMessage::Clock { chrono_seconds: 1799, chrono_started: true, period: Some(2) }
        );
    }

    #[tokio::test]
    async fn memory_sink_records_and_fails_on_demand() {
        let sink = MemorySink::new();
        let code = MatchCode::parse("FABCDEG").unwrap();
        let update = LiveUpdate { score: Some([1, 2]), chrono: Some(3), timestamp: 4 };
        sink.write(&code, &update).await.unwrap();
        sink.set_failing(true);
        assert!(sink.write(&code, &update).await.is_err());
        assert_eq!(sink.writes(), vec![(code, update)]);
    }
}
