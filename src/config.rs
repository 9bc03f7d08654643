//! Persistence of console settings as a flat key-path JSON map.
//
// Settings are stored as one flat JSON object whose keys are dotted paths ("input.type",
// "service.video_pid", "scte35.event_id", ...). Loading tolerates a missing file and missing
// keys by falling back to the documented defaults (service id 1, video PID 256, audio PID
// 257, splice PID 500, null PID 8191, PCR = video); only a malformed document or a
// wrongly-typed value is an error, and the error names the offending key. Numeric values are
// accepted both as JSON numbers and as strings, since hand-edited files mix the two.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pipeline::{Endpoint, PipelineConfig, ScheduleSource, ServiceConfig, SrtMode, TransportKind};
use crate::SpliceError;
use crate::{DEFAULT_AUDIO_PID, DEFAULT_NULL_PID, DEFAULT_SERVICE_ID, DEFAULT_SPLICE_PID, DEFAULT_VIDEO_PID};


/// Operator console settings, bridging the persisted flat map and a [`PipelineConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub input_type: String,
    pub input_source: String,
    pub output_type: String,
    pub output_destination: String,
    /// SRT mode: "caller" or "listener".
    pub output_mode: String,
    pub output_streamid: String,
    pub service_id: u16,
    pub service_name: String,
    pub service_provider: String,
    pub video_pid: u16,
    pub audio_pid: u16,
    pub splice_pid: u16,
    pub pcr_pid: u16,
    pub null_pid: u16,
    pub base_event_id: u32,
    pub ad_duration_seconds: f64,
    pub preroll_seconds: f64,
    pub marker_dir: String,
    pub engine_location: String,
}

impl Default for ConsoleSettings {
    fn default() -> ConsoleSettings {
        ConsoleSettings {
            input_type: String::from("udp"),
            input_source: String::new(),
            output_type: String::from("udp"),
            output_destination: String::new(),
            output_mode: String::from("listener"),
            output_streamid: String::new(),
            service_id: DEFAULT_SERVICE_ID,
            service_name: String::from("Service01"),
            service_provider: String::from("splice-console"),
            video_pid: DEFAULT_VIDEO_PID,
            audio_pid: DEFAULT_AUDIO_PID,
            splice_pid: DEFAULT_SPLICE_PID,
            pcr_pid: DEFAULT_VIDEO_PID,
            null_pid: DEFAULT_NULL_PID,
            base_event_id: 1000,
            ad_duration_seconds: 30.0,
            preroll_seconds: 2.0,
            marker_dir: String::new(),
            engine_location: PipelineConfig::new().engine_location,
        }
    }
}

fn get_string(map: &Map<String, Value>, key: &str, default: &str) -> Result<String, SpliceError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(SpliceError::ConfigParse(format!("{key} should be a string, got {other}"))),
    }
}

fn get_u64(map: &Map<String, Value>, key: &str, default: u64) -> Result<u64, SpliceError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| SpliceError::ConfigParse(format!("{key} should be a non-negative integer, got {n}"))),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| SpliceError::ConfigParse(format!("{key} should be an integer, got \"{s}\""))),
        Some(other) => Err(SpliceError::ConfigParse(format!("{key} should be an integer, got {other}"))),
    }
}

fn get_u16(map: &Map<String, Value>, key: &str, default: u16) -> Result<u16, SpliceError> {
    let v = get_u64(map, key, u64::from(default))?;
    u16::try_from(v).map_err(|_| SpliceError::ConfigParse(format!("{key} value {v} out of range")))
}

fn get_u32(map: &Map<String, Value>, key: &str, default: u32) -> Result<u32, SpliceError> {
    let v = get_u64(map, key, u64::from(default))?;
    u32::try_from(v).map_err(|_| SpliceError::ConfigParse(format!("{key} value {v} out of range")))
}

fn get_f64(map: &Map<String, Value>, key: &str, default: f64) -> Result<f64, SpliceError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| SpliceError::ConfigParse(format!("{key} should be a number, got {n}"))),
        Some(Value::String(s)) => s
            .parse::<f64>()
            .map_err(|_| SpliceError::ConfigParse(format!("{key} should be a number, got \"{s}\""))),
        Some(other) => Err(SpliceError::ConfigParse(format!("{key} should be a number, got {other}"))),
    }
}

fn parse_transport(name: &str) -> Result<TransportKind, SpliceError> {
    match name {
        "file" => Ok(TransportKind::File),
        "udp" => Ok(TransportKind::Udp),
        "tcp" => Ok(TransportKind::Tcp),
        "http" => Ok(TransportKind::Http),
        "hls" => Ok(TransportKind::Hls),
        "srt" => Ok(TransportKind::Srt),
        "hardware" => Ok(TransportKind::Hardware),
        other => Err(SpliceError::ConfigParse(format!("unknown transport type \"{other}\""))),
    }
}

impl ConsoleSettings {
    /// Load settings from `path`. A missing file yields the defaults; malformed JSON or a
    /// wrongly-typed value is a `ConfigParse` error naming the key.
    pub fn load(path: &Path) -> Result<ConsoleSettings, SpliceError> {
        if !path.exists() {
            info!("No settings file at {}; using defaults", path.display());
            return Ok(ConsoleSettings::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SpliceError::ConfigParse(format!("reading {}: {e}", path.display())))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| SpliceError::ConfigParse(format!("{}: {e}", path.display())))?;
        let map = value
            .as_object()
            .ok_or_else(|| SpliceError::ConfigParse(format!("{}: top level is not an object", path.display())))?;
        let d = ConsoleSettings::default();
        Ok(ConsoleSettings {
            input_type: get_string(map, "input.type", &d.input_type)?,
            input_source: get_string(map, "input.source", &d.input_source)?,
            output_type: get_string(map, "output.type", &d.output_type)?,
            output_destination: get_string(map, "output.destination", &d.output_destination)?,
            output_mode: get_string(map, "output.mode", &d.output_mode)?,
            output_streamid: get_string(map, "output.streamid", &d.output_streamid)?,
            service_id: get_u16(map, "service.id", d.service_id)?,
            service_name: get_string(map, "service.name", &d.service_name)?,
            service_provider: get_string(map, "service.provider", &d.service_provider)?,
            video_pid: get_u16(map, "service.video_pid", d.video_pid)?,
            audio_pid: get_u16(map, "service.audio_pid", d.audio_pid)?,
            splice_pid: get_u16(map, "service.splice_pid", d.splice_pid)?,
            pcr_pid: get_u16(map, "service.pcr_pid", d.pcr_pid)?,
            null_pid: get_u16(map, "service.null_pid", d.null_pid)?,
            base_event_id: get_u32(map, "scte35.event_id", d.base_event_id)?,
            ad_duration_seconds: get_f64(map, "scte35.ad_duration", d.ad_duration_seconds)?,
            preroll_seconds: get_f64(map, "scte35.preroll", d.preroll_seconds)?,
            marker_dir: get_string(map, "scte35.marker_dir", &d.marker_dir)?,
            engine_location: get_string(map, "engine.location", &d.engine_location)?,
        })
    }

    /// Serialize to the flat key-path map. Keys are emitted in sorted order, so repeated
    /// saves of the same settings are byte-identical.
    pub fn to_flat_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("input.type".into(), Value::from(self.input_type.clone()));
        map.insert("input.source".into(), Value::from(self.input_source.clone()));
        map.insert("output.type".into(), Value::from(self.output_type.clone()));
        map.insert("output.destination".into(), Value::from(self.output_destination.clone()));
        map.insert("output.mode".into(), Value::from(self.output_mode.clone()));
        map.insert("output.streamid".into(), Value::from(self.output_streamid.clone()));
        map.insert("service.id".into(), Value::from(self.service_id));
        map.insert("service.name".into(), Value::from(self.service_name.clone()));
        map.insert("service.provider".into(), Value::from(self.service_provider.clone()));
        map.insert("service.video_pid".into(), Value::from(self.video_pid));
        map.insert("service.audio_pid".into(), Value::from(self.audio_pid));
        map.insert("service.splice_pid".into(), Value::from(self.splice_pid));
        map.insert("service.pcr_pid".into(), Value::from(self.pcr_pid));
        map.insert("service.null_pid".into(), Value::from(self.null_pid));
        map.insert("scte35.event_id".into(), Value::from(self.base_event_id));
        map.insert("scte35.ad_duration".into(), Value::from(self.ad_duration_seconds));
        map.insert("scte35.preroll".into(), Value::from(self.preroll_seconds));
        map.insert("scte35.marker_dir".into(), Value::from(self.marker_dir.clone()));
        map.insert("engine.location".into(), Value::from(self.engine_location.clone()));
        map
    }

    /// Write the settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), SpliceError> {
        let rendered = serde_json::to_string_pretty(&Value::Object(self.to_flat_map()))
            .map_err(|e| SpliceError::ConfigParse(format!("serializing settings: {e}")))?;
        std::fs::write(path, rendered)
            .map_err(|e| SpliceError::Io(e, format!("writing settings to {}", path.display())))
    }

    /// Bridge these settings into a pipeline configuration. Endpoint addresses may still be
    /// empty here; [`crate::build_command`] reports those as missing input/output before any
    /// process is spawned.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, SpliceError> {
        let input = Endpoint::new(parse_transport(&self.input_type)?, &self.input_source);
        let mut output = Endpoint::new(parse_transport(&self.output_type)?, &self.output_destination);
        if output.kind == TransportKind::Srt {
            output = output.with_srt_mode(match self.output_mode.as_str() {
                "caller" => SrtMode::Caller,
                "listener" => SrtMode::Listener,
                other => {
                    return Err(SpliceError::ConfigParse(format!(
                        "output.mode should be \"caller\" or \"listener\", got \"{other}\""
                    )))
                }
            });
            if output.srt_mode == Some(SrtMode::Caller) && !self.output_streamid.is_empty() {
                output.address = format!("{}?streamid={}", output.address, self.output_streamid);
            }
        }

        let service = ServiceConfig {
            id: self.service_id,
            name: self.service_name.clone(),
            provider: self.service_provider.clone(),
            video_pid: self.video_pid,
            audio_pid: self.audio_pid,
            splice_pid: Some(self.splice_pid),
            pcr_pid: self.pcr_pid,
            null_pid: self.null_pid,
            incoming_video_pid: None,
            incoming_audio_pid: None,
        };

        let mut cfg = PipelineConfig::new()
            .engine_location(&self.engine_location)
            .input(input)
            .output(output)
            .service(service)
            .schedule(ScheduleSource::Events(Vec::new()));
        if !self.marker_dir.is_empty() {
            cfg = cfg.marker_dir(PathBuf::from(&self.marker_dir));
        }
        Ok(cfg)
    }
}
