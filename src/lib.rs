//! A Rust library for driving SCTE-35 ad-splice signaling in live MPEG transport streams.
//! It models splice events (splice_insert, time_signal and crash-out cues) with their 90 kHz
//! PTS timing arithmetic, renders them as XML marker descriptors that a stream-processing
//! engine can inject, assembles the ordered command vector for that engine from a pipeline
//! configuration, and supervises the engine as a subprocess whose output lines are streamed,
//! classified and fanned out to alert sinks.

//! [SCTE-35](https://en.wikipedia.org/wiki/SCTE-35) is the Society of Cable
//! Telecommunications Engineers standard for "Digital Program Insertion Cueing Messages":
//! the in-band signals that mark points in a broadcast stream where alternate content
//! (typically advertising) may be spliced in. This library does not implement transport
//! stream demultiplexing or the bit-packed SCTE-35 table syntax; multiplexing and packet
//! work are delegated to an external line-oriented engine which is treated as a black box.
//! What this library owns is everything around that engine:
//!
//! - the splice-event data model and ad-break sequence generation ([`scte35`]);
//! - deterministic encoding of events into XML marker descriptors with JSON sidecars,
//!   suitable for the engine's file-based injection stage ([`marker`]);
//! - synthesis of the engine's argument vector from a pipeline configuration, respecting
//!   the fixed stage order input → PMT registration → PID remap → splice injection →
//!   output ([`pipeline`]);
//! - a supervised subprocess wrapper with per-stream line channels, graceful stop and a
//!   cached exit status ([`supervise`]);
//! - an alert monitor that classifies output lines against a fixed splice keyword set and
//!   delivers records to subscribed sinks in arrival order ([`monitor`]);
//! - flat key-path JSON configuration persistence with documented defaults ([`config`]).

pub mod config;
pub mod marker;
pub mod monitor;
pub mod pipeline;
pub mod scte35;
pub mod supervise;

pub use config::ConsoleSettings;
pub use marker::{encode, from_xml, to_xml, MarkerDescriptor};
pub use monitor::{classify, AlertMonitor, AlertRecord};
pub use pipeline::{
    build_command, Endpoint, PipelineConfig, ScheduleSource, ServiceConfig, SrtMode, TransportKind,
};
pub use scte35::{compute_pts, generate_ad_break_sequence, SpliceEvent, SpliceKind};
pub use supervise::{spawn_supervised, ProcessState, SupervisedProcess};


/// Default service id for single-program transport streams.
pub const DEFAULT_SERVICE_ID: u16 = 1;
/// Default PID carrying the video elementary stream.
pub const DEFAULT_VIDEO_PID: u16 = 256;
/// Default PID carrying the audio elementary stream.
pub const DEFAULT_AUDIO_PID: u16 = 257;
/// Default PID on which SCTE-35 splice information sections are injected.
pub const DEFAULT_SPLICE_PID: u16 = 500;
/// The MPEG-TS null packet PID (0x1FFF), whose bandwidth the injector steals.
pub const DEFAULT_NULL_PID: u16 = 8191;


#[derive(thiserror::Error, Debug)]
pub enum SpliceError {
    #[error("invalid {field}: {detail}")]
    InvalidArgument { field: &'static str, detail: String },
    #[error("unsupported splice kind: {0}")]
    UnsupportedKind(String),
    #[error("pipeline input missing: {0}")]
    MissingInput(String),
    #[error("pipeline output missing: {0}")]
    MissingOutput(String),
    #[error("spawning stream engine: {0}")]
    Spawn(String),
    #[error("stream engine exited with code {0}")]
    ChildExitedNonZero(i32),
    #[error("parsing configuration: {0}")]
    ConfigParse(String),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("I/O error {1}")]
    Io(#[source] std::io::Error, String),
}

impl SpliceError {
    pub(crate) fn invalid(field: &'static str, detail: impl Into<String>) -> SpliceError {
        SpliceError::InvalidArgument { field, detail: detail.into() }
    }
}
