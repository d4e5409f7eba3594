//! Result delivery.
//!
//! A `FrameSink` receives one `FrameReport` per processed frame, in acquisition
//! order. How reports reach viewers (sockets, files, UI) is the sink's business.

use std::io::Write;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detect::DetectionResult;
use crate::frame::{annotation_label, encode_jpeg, Frame};
use crate::stats::StatsSnapshot;

/// Everything observers get for one processed frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    /// JPEG of the annotated frame. Empty if encoding failed.
    pub annotated_image: Vec<u8>,
    /// Marker text matching the annotation.
    pub label: String,
    pub result: DetectionResult,
    /// The detector failed on this frame; `result` is the negative stand-in.
    pub faulted: bool,
    /// Statistics including this frame.
    pub stats: StatsSnapshot,
    pub captured_at: DateTime<Utc>,
}

impl FrameReport {
    pub fn build(
        frame: &Frame,
        result: DetectionResult,
        stats: StatsSnapshot,
        jpeg_quality: u8,
    ) -> Self {
        let annotated = frame.annotate(&result);
        let annotated_image = encode_jpeg(&annotated, jpeg_quality).unwrap_or_else(|err| {
            log::warn!("FrameReport: annotated frame not encoded: {:#}", err);
            Vec::new()
        });
        Self {
            annotated_image,
            label: annotation_label(&result),
            result,
            faulted: false,
            stats,
            captured_at: frame.captured_at,
        }
    }

    /// Mark the report as coming from a faulted detection.
    pub fn with_fault(mut self) -> Self {
        self.faulted = true;
        self
    }

    pub fn detected(&self) -> bool {
        self.result.detected
    }

    pub fn confidence(&self) -> f64 {
        self.result.confidence
    }
}

/// Delivery channel for processed frames.
pub trait FrameSink: Send + Sync {
    fn publish(&self, report: &FrameReport) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out to in-process observers.
///
/// Each subscriber gets its own channel; subscribers that hang up are pruned on the
/// next publish.
#[derive(Default)]
pub struct BroadcastSink {
    subscribers: Mutex<Vec<Sender<Arc<FrameReport>>>>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Arc<FrameReport>> {
        let (tx, rx) = channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl FrameSink for BroadcastSink {
    fn publish(&self, report: &FrameReport) -> Result<()> {
        let shared = Arc::new(report.clone());
        lock(&self.subscribers).retain(|tx| tx.send(shared.clone()).is_ok());
        Ok(())
    }
}

/// Keeps only the most recent report, for viewers that poll.
#[derive(Default)]
pub struct LatestFrameSink {
    latest: Mutex<Option<Arc<FrameReport>>>,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<FrameReport>> {
        lock(&self.latest).clone()
    }
}

impl FrameSink for LatestFrameSink {
    fn publish(&self, report: &FrameReport) -> Result<()> {
        *lock(&self.latest) = Some(Arc::new(report.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    captured_at: DateTime<Utc>,
    detected: bool,
    confidence: f64,
    faulted: bool,
    label: &'a str,
    image_bytes: usize,
    stats: &'a StatsSnapshot,
}

/// Writes one JSON object per frame, newline-delimited.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> FrameSink for JsonLinesSink<W> {
    fn publish(&self, report: &FrameReport) -> Result<()> {
        let record = FrameRecord {
            captured_at: report.captured_at,
            detected: report.result.detected,
            confidence: report.result.confidence,
            faulted: report.faulted,
            label: &report.label,
            image_bytes: report.annotated_image.len(),
            stats: &report.stats,
        };
        let mut writer = lock(&self.writer);
        serde_json::to_writer(&mut *writer, &record).context("serialize frame record")?;
        writer.write_all(b"\n").context("write frame record")?;
        writer.flush().context("flush frame record")?;
        Ok(())
    }
}

/// Publishes to several sinks in order. A failing sink does not starve the rest.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn FrameSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn FrameSink>>) -> Self {
        Self { sinks }
    }
}

impl FrameSink for FanoutSink {
    fn publish(&self, report: &FrameReport) -> Result<()> {
        for sink in &self.sinks {
            if let Err(err) = sink.publish(report) {
                log::warn!("FanoutSink: delivery failed: {:#}", err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::{Rgb, RgbImage};

    fn report(detected: bool) -> FrameReport {
        let frame = Frame::new(RgbImage::from_pixel(16, 16, Rgb([0, 0, 0])));
        let result = DetectionResult {
            detected,
            confidence: if detected { 60.0 } else { 0.0 },
        };
        let stats = StatsSnapshot {
            total_frames: 1,
            fire_detected_frames: detected as u64,
            alerts_sent: detected as u64,
            last_detection: None,
        };
        FrameReport::build(&frame, result, stats, 80)
    }

    #[test]
    fn report_carries_encoded_annotation() {
        let report = report(true);
        assert_eq!(&report.annotated_image[..2], &[0xFF, 0xD8]);
        assert_eq!(report.label, "FIRE DETECTED! Confidence: 60.0%");
        assert!(report.detected());
        assert_eq!(report.confidence(), 60.0);
    }

    #[test]
    fn broadcast_reaches_every_live_subscriber() -> Result<()> {
        let sink = BroadcastSink::new();
        let a = sink.subscribe();
        let b = sink.subscribe();
        let dropped = sink.subscribe();
        drop(dropped);

        sink.publish(&report(true))?;
        sink.publish(&report(false))?;

        assert_eq!(sink.subscriber_count(), 2);
        for rx in [a, b] {
            assert!(rx.recv()?.detected());
            assert!(!rx.recv()?.detected());
        }
        Ok(())
    }

    #[test]
    fn latest_sink_keeps_last_report() -> Result<()> {
        let sink = LatestFrameSink::new();
        assert!(sink.latest().is_none());
        sink.publish(&report(true))?;
        sink.publish(&report(false))?;
        assert!(!sink.latest().expect("latest").detected());
        Ok(())
    }

    #[test]
    fn json_lines_sink_writes_one_record_per_frame() -> Result<()> {
        let sink = JsonLinesSink::new(Vec::new());
        sink.publish(&report(true))?;
        sink.publish(&report(false))?;
        sink.publish(&report(false).with_fault())?;

        let out = String::from_utf8(sink.into_inner())?;
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["detected"], true);
        assert_eq!(lines[0]["faulted"], false);
        assert_eq!(lines[1]["faulted"], false);
        assert_eq!(lines[2]["faulted"], true);
        assert_eq!(lines[2]["detected"], false);
        assert_eq!(lines[0]["stats"]["alerts_sent"], 1);
        assert_eq!(lines[1]["label"], "No Fire Detected");
        assert!(lines[1]["image_bytes"].as_u64().unwrap_or(0) > 0);
        Ok(())
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn publish(&self, _report: &FrameReport) -> Result<()> {
            Err(anyhow!("viewer gone"))
        }
    }

    #[test]
    fn fanout_continues_past_failing_sink() -> Result<()> {
        let latest = Arc::new(LatestFrameSink::new());
        let failing: Arc<dyn FrameSink> = Arc::new(FailingSink);
        let fanout = FanoutSink::new(vec![failing, latest.clone() as Arc<dyn FrameSink>]);

        fanout.publish(&report(true))?;

        assert!(latest.latest().is_some());
        Ok(())
    }
}
