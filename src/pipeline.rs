//! Synthesis of the external engine's command vector from a pipeline configuration.
//
// The stream-processing engine is a chain processor: one input plugin, zero or more packet
// processing plugins, one output plugin, all selected and parameterized on the command line.
// We always hand it an ordered argument vector (argv), never a single shell string, which
// avoids shell-injection and quoting ambiguity.
//
// Stage ordering is fixed and non-negotiable:
//
//   input → PMT registration of the splice PID → PID remap → splice injection → output
//
// The PMT stage only appears when a splice PID is configured, and the remap stage only when
// the incoming content PIDs differ from the service's target PIDs. The splice injection
// stage is bound to the splice data PID and uses the service's video PID as its PTS
// reference. Nothing here spawns a subprocess; building the command is a pure function of
// the configuration, checked for completeness before any process exists.

use std::path::PathBuf;
use tracing::trace;
use url::Url;

use crate::scte35::SpliceEvent;
use crate::SpliceError;
use crate::{DEFAULT_AUDIO_PID, DEFAULT_NULL_PID, DEFAULT_SERVICE_ID, DEFAULT_SPLICE_PID, DEFAULT_VIDEO_PID};


/// Transports the engine can read from or write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    File,
    Udp,
    Tcp,
    Http,
    Hls,
    Srt,
    Hardware,
}

impl TransportKind {
    /// The engine plugin selected for this transport.
    pub fn plugin(&self) -> &'static str {
        match self {
            TransportKind::File => "file",
            TransportKind::Udp => "ip",
            TransportKind::Tcp => "tcp",
            TransportKind::Http => "http",
            TransportKind::Hls => "hls",
            TransportKind::Srt => "srt",
            TransportKind::Hardware => "dektec",
        }
    }
}

/// SRT connection mode. A caller connects out to `host:port`; a listener binds and waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtMode {
    Caller,
    Listener,
}

/// One end of the pipeline: a transport, its address, and any extra plugin arguments passed
/// through verbatim after the generated ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub address: String,
    pub extra_args: Vec<String>,
    /// SRT only; ignored for other transports.
    pub srt_mode: Option<SrtMode>,
}

impl Endpoint {
    pub fn new(kind: TransportKind, address: &str) -> Endpoint {
        Endpoint {
            kind,
            address: address.to_string(),
            extra_args: Vec::new(),
            srt_mode: None,
        }
    }

    pub fn with_extra_args(mut self, args: &[&str]) -> Endpoint {
        self.extra_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_srt_mode(mut self, mode: SrtMode) -> Endpoint {
        self.srt_mode = Some(mode);
        self
    }
}

/// The single service carried by the stream: identifiers and its PID layout. All PIDs must
/// be distinct; the PCR PID conventionally equals the video PID.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub id: u16,
    pub name: String,
    pub provider: String,
    pub video_pid: u16,
    pub audio_pid: u16,
    /// PID on which SCTE-35 sections are injected; no injection stages when absent.
    pub splice_pid: Option<u16>,
    pub pcr_pid: u16,
    pub null_pid: u16,
    /// PID the incoming video actually arrives on, when it differs from `video_pid`.
    pub incoming_video_pid: Option<u16>,
    /// PID the incoming audio actually arrives on, when it differs from `audio_pid`.
    pub incoming_audio_pid: Option<u16>,
}

impl Default for ServiceConfig {
    fn default() -> ServiceConfig {
        ServiceConfig {
            id: DEFAULT_SERVICE_ID,
            name: String::from("Service01"),
            provider: String::from("splice-console"),
            video_pid: DEFAULT_VIDEO_PID,
            audio_pid: DEFAULT_AUDIO_PID,
            splice_pid: Some(DEFAULT_SPLICE_PID),
            pcr_pid: DEFAULT_VIDEO_PID,
            null_pid: DEFAULT_NULL_PID,
            incoming_video_pid: None,
            incoming_audio_pid: None,
        }
    }
}

impl ServiceConfig {
    fn validate(&self) -> Result<(), SpliceError> {
        let mut pids = vec![self.video_pid, self.audio_pid, self.null_pid];
        if let Some(splice) = self.splice_pid {
            pids.push(splice);
        }
        let mut seen = std::collections::HashSet::new();
        for pid in &pids {
            if !seen.insert(*pid) {
                return Err(SpliceError::invalid("service PIDs", format!("PID {pid} assigned twice")));
            }
        }
        Ok(())
    }
}

/// Where injectable splice descriptors come from: an explicit in-memory schedule whose
/// events are rendered to marker files by the caller, or a directory the engine polls for
/// descriptors dropped in while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleSource {
    Events(Vec<SpliceEvent>),
    WatchDirectory {
        dir: PathBuf,
        /// How many times each descriptor is injected.
        inject_count: u32,
        /// Interval between repeated injections, in milliseconds.
        inject_interval_ms: u64,
        /// Aggregate pre-roll carried as the engine's start delay.
        start_delay_ms: u64,
    },
}

/// Configuration for one engine run: input, service/PID layout, splice schedule, output.
/// Owned by the caller for the lifetime of the run; [`build_command`] only reads it.
///
/// Follows the builder pattern for the optional pieces:
///
/// ```rust
/// use splice_console::{build_command, Endpoint, PipelineConfig, TransportKind};
///
/// let cfg = PipelineConfig::new()
///     .input(Endpoint::new(TransportKind::Udp, "239.0.0.1:5000"))
///     .output(Endpoint::new(TransportKind::File, "/tmp/out.ts"))
///     .marker_dir("/tmp/markers".into());
/// let argv = build_command(&cfg).unwrap();
/// assert_eq!(argv[1], "-I");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub engine_location: String,
    pub input: Option<Endpoint>,
    pub output: Option<Endpoint>,
    pub service: ServiceConfig,
    pub schedule: ScheduleSource,
    /// Directory holding the rendered marker files for an explicit event schedule.
    pub marker_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig::new()
    }
}

impl PipelineConfig {
    pub fn new() -> PipelineConfig {
        PipelineConfig {
            engine_location: if cfg!(target_os = "windows") {
                String::from("tsp.exe")
            } else {
                String::from("tsp")
            },
            input: None,
            output: None,
            service: ServiceConfig::default(),
            schedule: ScheduleSource::Events(Vec::new()),
            marker_dir: None,
        }
    }

    /// Specify the location of the stream engine binary, if not located in PATH.
    pub fn engine_location(mut self, path: &str) -> PipelineConfig {
        self.engine_location = path.to_string();
        self
    }

    pub fn input(mut self, endpoint: Endpoint) -> PipelineConfig {
        self.input = Some(endpoint);
        self
    }

    pub fn output(mut self, endpoint: Endpoint) -> PipelineConfig {
        self.output = Some(endpoint);
        self
    }

    pub fn service(mut self, service: ServiceConfig) -> PipelineConfig {
        self.service = service;
        self
    }

    pub fn schedule(mut self, schedule: ScheduleSource) -> PipelineConfig {
        self.schedule = schedule;
        self
    }

    pub fn marker_dir(mut self, dir: PathBuf) -> PipelineConfig {
        self.marker_dir = Some(dir);
        self
    }
}


// SRT caller addresses must be bare host:port; a ?streamid= query component is extracted
// into a separate --streamid argument because the engine rejects it embedded in the URL.
#[tracing::instrument(level="trace")]
fn srt_caller_args(address: &str) -> Result<Vec<String>, SpliceError> {
    let (hostport, query) = match address.split_once('?') {
        Some((hp, q)) => (hp, Some(q)),
        None => (address, None),
    };
    let valid = match hostport.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    };
    if !valid {
        return Err(SpliceError::invalid("srt caller address", format!("{address} is not host:port")));
    }
    let mut args = vec![String::from("--caller"), hostport.to_string()];
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(sid) = pair.strip_prefix("streamid=") {
                args.push(String::from("--streamid"));
                args.push(sid.to_string());
            }
        }
    }
    Ok(args)
}

#[tracing::instrument(level="trace")]
fn endpoint_args(ep: &Endpoint, selector: &str) -> Result<Vec<String>, SpliceError> {
    let mut args = vec![selector.to_string(), ep.kind.plugin().to_string()];
    match ep.kind {
        TransportKind::Http | TransportKind::Hls => {
            Url::parse(&ep.address)
                .map_err(|e| SpliceError::invalid("endpoint address", format!("{}: {e}", ep.address)))?;
            args.push(ep.address.clone());
        }
        TransportKind::Srt => match ep.srt_mode.unwrap_or(SrtMode::Listener) {
            SrtMode::Caller => args.extend(srt_caller_args(&ep.address)?),
            SrtMode::Listener => {
                args.push(String::from("--listener"));
                args.push(ep.address.clone());
            }
        },
        _ => args.push(ep.address.clone()),
    }
    args.extend(ep.extra_args.iter().cloned());
    Ok(args)
}

// Stream type 0x86 identifies SCTE-35 splice information sections in the PMT.
const SCTE35_STREAM_TYPE: &str = "0x86";

/// Build the complete, ordered argument vector for one engine run; element 0 is the engine
/// binary itself. Pure and idempotent: the same configuration value always yields a
/// byte-identical vector, and no subprocess is spawned here.
pub fn build_command(cfg: &PipelineConfig) -> Result<Vec<String>, SpliceError> {
    let input = cfg
        .input
        .as_ref()
        .filter(|ep| !ep.address.is_empty())
        .ok_or_else(|| SpliceError::MissingInput(String::from("no input address configured")))?;
    let output = cfg
        .output
        .as_ref()
        .filter(|ep| !ep.address.is_empty())
        .ok_or_else(|| SpliceError::MissingOutput(String::from("no output address configured")))?;
    cfg.service.validate()?;

    let mut argv = vec![cfg.engine_location.clone()];
    argv.extend(endpoint_args(input, "-I")?);

    if let Some(splice_pid) = cfg.service.splice_pid {
        // Register the splice PID against the PMT of the target service before any
        // injection happens downstream.
        argv.extend([
            String::from("-P"),
            String::from("pmt"),
            String::from("--service"),
            cfg.service.id.to_string(),
            String::from("--add-pid"),
            format!("{splice_pid}/{SCTE35_STREAM_TYPE}"),
        ]);
    }

    // Remapping depends only on the incoming PID layout, not on whether injection is
    // configured; a passthrough pipeline still has to land content on the service PIDs.
    let mut remaps: Vec<String> = Vec::new();
    if let Some(incoming) = cfg.service.incoming_video_pid {
        if incoming != cfg.service.video_pid {
            remaps.push(format!("{incoming}={}", cfg.service.video_pid));
        }
    }
    if let Some(incoming) = cfg.service.incoming_audio_pid {
        if incoming != cfg.service.audio_pid {
            remaps.push(format!("{incoming}={}", cfg.service.audio_pid));
        }
    }
    if !remaps.is_empty() {
        argv.push(String::from("-P"));
        argv.push(String::from("remap"));
        argv.extend(remaps);
    }

    if let Some(splice_pid) = cfg.service.splice_pid {
        argv.extend([
            String::from("-P"),
            String::from("spliceinject"),
            String::from("--pid"),
            splice_pid.to_string(),
            String::from("--pts-pid"),
            cfg.service.video_pid.to_string(),
        ]);
        match &cfg.schedule {
            ScheduleSource::Events(events) => {
                let dir = cfg.marker_dir.as_ref().ok_or_else(|| {
                    SpliceError::invalid("marker_dir", String::from("required for an explicit event schedule"))
                })?;
                if events.is_empty() {
                    trace!("Explicit schedule is empty; injection stage will idle");
                }
                argv.push(String::from("--files"));
                argv.push(dir.join("splice-*.xml").to_string_lossy().into_owned());
            }
            ScheduleSource::WatchDirectory { dir, inject_count, inject_interval_ms, start_delay_ms } => {
                argv.push(String::from("--files"));
                argv.push(dir.join("splice-*.xml").to_string_lossy().into_owned());
                argv.push(String::from("--inject-count"));
                argv.push(inject_count.to_string());
                argv.push(String::from("--inject-interval"));
                argv.push(inject_interval_ms.to_string());
                argv.push(String::from("--start-delay"));
                argv.push(start_delay_ms.to_string());
            }
        }
    }

    argv.extend(endpoint_args(output, "-O")?);
    trace!("Built engine command: {}", argv.join(" "));
    Ok(argv)
}
