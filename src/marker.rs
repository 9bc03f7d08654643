//! Encoding of splice events into wire-ready marker descriptors.
//
// The external engine's injection stage polls a directory for marker descriptor files: one XML
// document per splice event, a SpliceInfoSection root wrapping exactly one splice command
// element. This module turns a SpliceEvent value into such a descriptor, renders it to XML and
// parses it back, and writes the per-event files (plus a flat JSON sidecar for tooling; the
// engine itself only reads the XML). Encoding is deterministic and idempotent: the same event
// value always produces the same descriptor, byte for byte, apart from the embedded
// generation timestamp which is metadata rather than protocol content.
//
// The encoder itself performs no file I/O; persistence is an explicit caller decision through
// write_marker_files, with the target directory always passed in rather than defaulted.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::scte35::{
    Binary, BreakDuration, SpliceEvent, SpliceInfoSection, SpliceInsert, SpliceKind, SpliceTime,
    TimeSignal, SCTE35_XML_NS,
};
use crate::SpliceError;


/// A structured, template-ready rendering of one splice event: the command tag name and its
/// attributes in a fixed order. Sufficient for an external templating step to render XML,
/// JSON or a base64 pipeline without re-deriving field semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDescriptor {
    /// Command element tag: "SpliceInsert" or "TimeSignal".
    pub tag: String,
    /// Attribute name/value pairs, order fixed by construction.
    pub attributes: Vec<(String, String)>,
    /// Generation timestamp; metadata, excluded from descriptor equality checks by callers.
    pub generated_at: chrono::DateTime<Utc>,
}

impl MarkerDescriptor {
    /// Look up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}


/// Encode a splice event as a [`MarkerDescriptor`]. The splice kind set is closed, so there
/// is no unsupported-kind failure path here; an unknown command can only appear when parsing
/// foreign XML back in [`from_xml`].
pub fn encode(event: &SpliceEvent) -> MarkerDescriptor {
    let mut attributes: Vec<(String, String)> = Vec::new();
    let mut push = |k: &str, v: String| attributes.push((k.to_string(), v));

    push("spliceEventId", event.event_id.to_string());
    match event.kind {
        SpliceKind::TimeSignal => {}
        _ => {
            push("spliceEventCancelIndicator", "false".to_string());
            push("outOfNetworkIndicator", event.out_of_network().to_string());
            push("spliceImmediateFlag", event.immediate.to_string());
            push("uniqueProgramId", event.program_id.to_string());
            push("availNum", event.avail_num.to_string());
            push("availsExpected", event.avails_expected.to_string());
        }
    }
    if let Some(pts) = event.pts_time {
        push("ptsTime", pts.to_string());
    }
    if event.kind == SpliceKind::InsertOut {
        if let Some(duration) = event.duration {
            push("breakDuration", duration.to_string());
            push("autoReturn", event.auto_return.to_string());
        }
    }

    MarkerDescriptor {
        tag: event.kind.tag().to_string(),
        attributes,
        generated_at: Utc::now(),
    }
}

fn section_for(event: &SpliceEvent) -> SpliceInfoSection {
    let mut section = SpliceInfoSection {
        xmlns: Some(SCTE35_XML_NS.to_string()),
        generated_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        ..Default::default()
    };
    let splice_time = event.pts_time.map(|pts| SpliceTime { pts_time: Some(pts) });
    match event.kind {
        SpliceKind::TimeSignal => {
            section.time_signal = Some(TimeSignal {
                splice_event_id: Some(event.event_id),
                splice_time,
            });
        }
        _ => {
            section.splice_insert = Some(SpliceInsert {
                splice_event_id: event.event_id,
                splice_event_cancel_indicator: false,
                out_of_network_indicator: event.out_of_network(),
                splice_immediate_flag: event.immediate,
                unique_program_id: event.program_id,
                avail_num: event.avail_num,
                avails_expected: event.avails_expected,
                splice_time,
                break_duration: event.duration.map(|duration| BreakDuration {
                    auto_return: event.auto_return,
                    duration,
                }),
            });
        }
    }
    section
}

/// Serialize a splice information section to an XML document string.
pub fn section_to_xml(section: &SpliceInfoSection) -> Result<String, SpliceError> {
    let body = quick_xml::se::to_string(section)
        .map_err(|e| SpliceError::Xml(format!("serializing splice section: {e}")))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

/// Render a splice event as a single-root XML marker document, ready for the engine's
/// injection stage.
pub fn to_xml(event: &SpliceEvent) -> Result<String, SpliceError> {
    section_to_xml(&section_for(event))
}

/// Parse a marker document back into a splice event. The symmetric inverse of [`to_xml`]
/// modulo the generation timestamp.
///
/// An immediate out-of-network SpliceInsert with no BreakDuration is indistinguishable on the
/// wire from a crash-out, and is decoded as [`SpliceKind::CrashOut`].
pub fn from_xml(xml: &str) -> Result<SpliceEvent, SpliceError> {
    let section: SpliceInfoSection = quick_xml::de::from_str(xml)
        .map_err(|e| SpliceError::Xml(format!("parsing splice section: {e}")))?;

    if let Some(si) = section.splice_insert {
        let kind = if si.out_of_network_indicator {
            if si.splice_immediate_flag && si.break_duration.is_none() {
                SpliceKind::CrashOut
            } else {
                SpliceKind::InsertOut
            }
        } else {
            SpliceKind::InsertIn
        };
        let mut ev = match kind {
            SpliceKind::InsertIn => SpliceEvent::insert_in(si.splice_event_id, si.splice_immediate_flag),
            SpliceKind::CrashOut => SpliceEvent::crash_out(si.splice_event_id),
            _ => {
                let mut out = SpliceEvent::insert_out(si.splice_event_id, 0.0, si.splice_immediate_flag)?;
                if let Some(bd) = &si.break_duration {
                    out.duration = Some(bd.duration);
                    out = out.with_auto_return(bd.auto_return);
                }
                out
            }
        };
        ev = ev
            .with_program_id(si.unique_program_id)
            .with_avail(si.avail_num, si.avails_expected);
        if let Some(pts) = si.splice_time.and_then(|st| st.pts_time) {
            ev = ev.with_pts(pts);
        }
        return Ok(ev);
    }

    if let Some(ts) = section.time_signal {
        let mut ev = SpliceEvent::time_signal(ts.splice_event_id.unwrap_or(0));
        if let Some(pts) = ts.splice_time.and_then(|st| st.pts_time) {
            ev = ev.with_pts(pts);
        }
        return Ok(ev);
    }

    Err(SpliceError::UnsupportedKind(String::from(
        "splice section carries no SpliceInsert or TimeSignal command",
    )))
}

/// Flat JSON sidecar carrying the same fields as the XML descriptor, for tooling. The engine
/// never reads these.
pub fn to_json_sidecar(event: &SpliceEvent) -> serde_json::Value {
    serde_json::json!({
        "event_id": event.event_id,
        "kind": event.kind.to_string(),
        "out_of_network": event.out_of_network(),
        "immediate": event.immediate,
        "pts_time": event.pts_time,
        "duration": event.duration,
        "program_id": event.program_id,
        "avail_num": event.avail_num,
        "avails_expected": event.avails_expected,
        "auto_return": event.auto_return,
    })
}

/// Wrap an opaque base64-encoded SCTE-35 section for binary passthrough, validating that the
/// payload really is decodable base64 before handing it to the engine.
pub fn binary_descriptor(payload_b64: &str) -> Result<SpliceInfoSection, SpliceError> {
    let trimmed = payload_b64.trim();
    BASE64_STANDARD
        .decode(trimmed)
        .map_err(|e| SpliceError::invalid("base64_payload", format!("{e}")))?;
    Ok(SpliceInfoSection {
        xmlns: Some(SCTE35_XML_NS.to_string()),
        binary: Some(Binary {
            signal_type: None,
            content: trimmed.to_string(),
        }),
        ..Default::default()
    })
}

/// Write one XML marker file (plus JSON sidecar) per event into `dir`, which must already
/// exist. Returns the XML paths, in event order; these are what the engine's injection stage
/// globs for. The directory is an explicit argument of every call; there is no process-wide
/// default marker folder.
pub fn write_marker_files(
    dir: &Path,
    events: &[SpliceEvent],
) -> Result<Vec<PathBuf>, SpliceError> {
    let mut written = Vec::with_capacity(events.len());
    for event in events {
        let xml = to_xml(event)?;
        let xml_path = dir.join(format!("splice-{}.xml", event.event_id));
        std::fs::write(&xml_path, xml)
            .map_err(|e| SpliceError::Io(e, format!("writing marker descriptor {}", xml_path.display())))?;
        let sidecar = serde_json::to_string_pretty(&to_json_sidecar(event))
            .map_err(|e| SpliceError::ConfigParse(format!("serializing marker sidecar: {e}")))?;
        let json_path = dir.join(format!("splice-{}.json", event.event_id));
        std::fs::write(&json_path, sidecar)
            .map_err(|e| SpliceError::Io(e, format!("writing marker sidecar {}", json_path.display())))?;
        debug!("Wrote marker descriptor for event {} to {}", event.event_id, xml_path.display());
        written.push(xml_path);
    }
    Ok(written)
}
