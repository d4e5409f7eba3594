//! Firewatch
//!
//! This crate implements a real-time fire detection pipeline over camera frames.
//!
//! # Architecture
//!
//! Frames flow through a single pipeline:
//!
//! 1. **Acquisition**: a `FrameSource` yields decoded RGB frames (live camera or an
//!    in-memory batch of uploaded images).
//! 2. **Detection**: `FireDetector` segments fire-colored pixels in HSV space, cleans
//!    the mask morphologically, and scores the area covered by large regions.
//! 3. **Accounting**: `StatsAggregate` counts processed frames, positives and alerts.
//! 4. **Delivery**: each annotated frame is published to a `FrameSink`.
//!
//! `DetectionSession` owns the loop and its lifecycle (idle, running, stopping).
//! `analyze_batch` is the one-shot path for uploaded images.
//!
//! # Module Structure
//!
//! - `frame`: Frame container, annotation and JPEG encoding
//! - `ingest`: Frame sources (camera, batch)
//! - `detect`: HSV fire heuristic and detector backend trait
//! - `stats`: Running statistics
//! - `session`: Detection loop and lifecycle
//! - `sink`: Result delivery to observers
//! - `batch`: Uploaded-image analysis
//! - `api`: Loopback control API
//! - `config`: Daemon configuration

pub mod api;
pub mod batch;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod sink;
pub mod stats;

pub use batch::{analyze_batch, BatchImage, BatchResult};
pub use detect::{DetectionResult, DetectorBackend, FireDetector};
pub use frame::Frame;
pub use ingest::{BatchSource, CameraConfig, CameraSource, FrameSource};
pub use session::{DetectionSession, SessionConfig, SessionError, SessionState, StepOutcome};
pub use sink::{BroadcastSink, FanoutSink, FrameReport, FrameSink, JsonLinesSink, LatestFrameSink};
pub use stats::{StatsAggregate, StatsSnapshot};
