//! The SCTE-35 splice event model and its 90 kHz timing arithmetic.
//
// Society of Cable Telecommunications Engineers (SCTE) standard 35 "Digital Program Insertion
// Cueing Message" defines the signals that mark points in a content stream where alternate
// content (typically advertising or local programming) can be inserted. A splice_insert command
// marks a program/ad boundary directly; industry shorthand calls the out-of-network direction
// CUE-OUT ("leave the program for an ad") and the return CUE-IN. A time_signal command marks a
// time reference that downstream logic keys off of.
//
//      https://en.wikipedia.org/wiki/SCTE-35
//
// Splice points are expressed as Presentation Time Stamps on a 90 kHz clock that wraps modulo
// 2^33, the same clock the transport stream's PCR/PTS fields use. We model the event fields
// needed to drive the external injection engine and to schedule injections in time; the
// bit-packed binary table syntax (CRC and all) is out of scope and delegated to that engine.
//
// An XML Schema for the textual embedding of SCTE-35 messages is available at
// https://github.com/Comcast/scte35-go/blob/main/docs/scte_35_20220816.xsd

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::{SystemTime, UNIX_EPOCH};
use crate::SpliceError;


/// Tick rate of the MPEG PTS clock.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// The PTS field is 33 bits wide and wraps at this modulus (8 589 934 592).
pub const PTS_MODULUS: u64 = 1 << 33;


/// The closed set of splice command kinds this console can emit.
///
/// `InsertOut` and `CrashOut` are out-of-network cues (CUE-OUT); `InsertIn` returns to the
/// network programme (CUE-IN); `TimeSignal` is a pure time reference. A crash-out is an
/// immediate, unplanned CUE-OUT with no bounded duration, used to leave the programme in a
/// hurry (typically for emergency insertion or blackout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpliceKind {
    InsertOut,
    InsertIn,
    CrashOut,
    TimeSignal,
}

impl SpliceKind {
    /// The XML tag this kind renders as. SpliceInsert covers all three insert variants; the
    /// direction is carried by the outOfNetworkIndicator attribute.
    pub fn tag(&self) -> &'static str {
        match self {
            SpliceKind::InsertOut | SpliceKind::InsertIn | SpliceKind::CrashOut => "SpliceInsert",
            SpliceKind::TimeSignal => "TimeSignal",
        }
    }
}

impl std::fmt::Display for SpliceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SpliceKind::InsertOut => "insert_out",
            SpliceKind::InsertIn => "insert_in",
            SpliceKind::CrashOut => "crash_out",
            SpliceKind::TimeSignal => "time_signal",
        };
        f.write_str(name)
    }
}


/// One splice event, immutable once encoded. A correction is a new event with a new
/// `event_id`, never a mutation in place.
///
/// Exactly one of `immediate = true` / `pts_time = Some(..)` holds: an immediate event
/// carries no presentation timestamp and the engine acts on it without delay. A `duration`
/// is only meaningful on [`SpliceKind::InsertOut`] events bounding an ad break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpliceEvent {
    pub event_id: u32,
    pub kind: SpliceKind,
    pub immediate: bool,
    /// 33-bit 90 kHz timestamp, present only when `immediate` is false.
    pub pts_time: Option<u64>,
    /// Ad break length in 90 kHz ticks, only on InsertOut-kind events.
    pub duration: Option<u64>,
    /// uniqueProgramId; 1 for single-program streams.
    pub program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
    /// When true the engine auto-resumes at `duration` expiry instead of waiting for an
    /// explicit CUE-IN.
    pub auto_return: bool,
}

impl SpliceEvent {
    fn base(event_id: u32, kind: SpliceKind) -> SpliceEvent {
        SpliceEvent {
            event_id,
            kind,
            immediate: true,
            pts_time: None,
            duration: None,
            program_id: 1,
            avail_num: 0,
            avails_expected: 0,
            auto_return: false,
        }
    }

    /// A CUE-OUT splice_insert bounding an ad break of `duration_seconds`.
    pub fn insert_out(
        event_id: u32,
        duration_seconds: f64,
        immediate: bool,
    ) -> Result<SpliceEvent, SpliceError> {
        let ticks = seconds_to_ticks(duration_seconds)?;
        let mut ev = SpliceEvent::base(event_id, SpliceKind::InsertOut);
        ev.immediate = immediate;
        ev.duration = if ticks > 0 { Some(ticks) } else { None };
        Ok(ev)
    }

    /// A CUE-IN splice_insert returning to the network programme. Never carries a duration.
    pub fn insert_in(event_id: u32, immediate: bool) -> SpliceEvent {
        let mut ev = SpliceEvent::base(event_id, SpliceKind::InsertIn);
        ev.immediate = immediate;
        ev
    }

    /// An immediate, unbounded CUE-OUT.
    pub fn crash_out(event_id: u32) -> SpliceEvent {
        SpliceEvent::base(event_id, SpliceKind::CrashOut)
    }

    /// A time_signal reference marker, immediate until a PTS is attached.
    pub fn time_signal(event_id: u32) -> SpliceEvent {
        SpliceEvent::base(event_id, SpliceKind::TimeSignal)
    }

    /// Attach a presentation timestamp; clears the immediate flag. The value is wrapped onto
    /// the 33-bit clock.
    pub fn with_pts(mut self, pts: u64) -> SpliceEvent {
        self.pts_time = Some(pts % PTS_MODULUS);
        self.immediate = false;
        self
    }

    /// Mark the event immediate, discarding any presentation timestamp.
    pub fn with_immediate(mut self) -> SpliceEvent {
        self.pts_time = None;
        self.immediate = true;
        self
    }

    pub fn with_program_id(mut self, program_id: u16) -> SpliceEvent {
        self.program_id = program_id;
        self
    }

    pub fn with_avail(mut self, avail_num: u8, avails_expected: u8) -> SpliceEvent {
        self.avail_num = avail_num;
        self.avails_expected = avails_expected;
        self
    }

    pub fn with_auto_return(mut self, auto_return: bool) -> SpliceEvent {
        self.auto_return = auto_return;
        self
    }

    /// CUE-OUT direction of this event (the outOfNetworkIndicator attribute).
    pub fn out_of_network(&self) -> bool {
        matches!(self.kind, SpliceKind::InsertOut | SpliceKind::CrashOut)
    }
}


/// Convert a duration in seconds to 90 kHz ticks, rejecting negative or non-finite values.
pub fn seconds_to_ticks(seconds: f64) -> Result<u64, SpliceError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SpliceError::invalid("duration_seconds", format!("{seconds}")));
    }
    Ok((seconds * PTS_CLOCK_HZ as f64).round() as u64)
}

/// Add a (possibly negative, for pre-roll) tick offset to a PTS value on the wrapping 33-bit
/// clock. Uses floored modulo so a negative intermediate sum still lands in `[0, 2^33)`.
pub fn compute_pts(now_ticks: u64, offset_ticks: i64) -> u64 {
    let sum = now_ticks as i128 + offset_ticks as i128;
    sum.rem_euclid(PTS_MODULUS as i128) as u64
}

/// The current wall clock mapped onto the 90 kHz PTS clock, wrapped mod 2^33.
pub fn current_pts_ticks() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ticks = now.as_nanos() * PTS_CLOCK_HZ as u128 / 1_000_000_000;
    (ticks % PTS_MODULUS as u128) as u64
}

/// Generate the canonical three-event ad break: a pre-roll time_signal at
/// `-preroll_seconds` (id = `base_event_id`), the CUE-OUT at the splice point with the ad
/// duration (id+1), and the CUE-IN at `+ad_duration_seconds` (id+2).
///
/// The wall clock is read exactly once; everything else is a pure function of the inputs.
/// Event ids strictly increase by one in generation order and are never reused within one
/// call, so a schedule built from successive calls with spaced base ids stays unambiguous.
pub fn generate_ad_break_sequence(
    base_event_id: u32,
    ad_duration_seconds: f64,
    preroll_seconds: f64,
) -> Result<Vec<SpliceEvent>, SpliceError> {
    let preroll_ticks = i64::try_from(seconds_to_ticks(preroll_seconds)?).map_err(|_| {
        SpliceError::invalid(
            "preroll_seconds",
            format!("{preroll_seconds} exceeds the schedulable PTS offset range"),
        )
    })?;
    let ad_ticks = i64::try_from(seconds_to_ticks(ad_duration_seconds)?).map_err(|_| {
        SpliceError::invalid(
            "ad_duration_seconds",
            format!("{ad_duration_seconds} exceeds the schedulable PTS offset range"),
        )
    })?;
    if base_event_id.checked_add(2).is_none() {
        return Err(SpliceError::invalid(
            "base_event_id",
            format!("{base_event_id} leaves no room for the follow-on event ids"),
        ));
    }
    let now = current_pts_ticks();

    let preroll = SpliceEvent::time_signal(base_event_id)
        .with_pts(compute_pts(now, -preroll_ticks));
    let cue_out = SpliceEvent::insert_out(base_event_id + 1, ad_duration_seconds, false)?
        .with_pts(compute_pts(now, 0));
    let cue_in = SpliceEvent::insert_in(base_event_id + 2, false)
        .with_pts(compute_pts(now, ad_ticks));
    Ok(vec![preroll, cue_out, cue_in])
}


// XML element definitions for the marker descriptor files consumed by the external engine's
// injection stage: one document per event, a SpliceInfoSection root wrapping exactly one
// splice command element. Attribute names follow the Comcast scte35-go XML schema.

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BreakDuration {
    #[serde(rename = "@autoReturn")]
    pub auto_return: bool,
    #[serde(rename = "@duration")]
    pub duration: u64,
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpliceTime {
    #[serde(rename = "@ptsTime")]
    pub pts_time: Option<u64>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpliceInsert {
    #[serde(rename = "@spliceEventId")]
    pub splice_event_id: u32,
    #[serde(rename = "@spliceEventCancelIndicator")]
    pub splice_event_cancel_indicator: bool,
    #[serde(rename = "@outOfNetworkIndicator")]
    pub out_of_network_indicator: bool,
    #[serde(rename = "@spliceImmediateFlag")]
    pub splice_immediate_flag: bool,
    #[serde(rename = "@uniqueProgramId")]
    pub unique_program_id: u16,
    #[serde(rename = "@availNum")]
    pub avail_num: u8,
    #[serde(rename = "@availsExpected")]
    pub avails_expected: u8,
    #[serde(rename = "SpliceTime")]
    pub splice_time: Option<SpliceTime>,
    #[serde(rename = "BreakDuration")]
    pub break_duration: Option<BreakDuration>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeSignal {
    #[serde(rename = "@spliceEventId")]
    pub splice_event_id: Option<u32>,
    #[serde(rename = "SpliceTime")]
    pub splice_time: Option<SpliceTime>,
}

/// An opaque base64-encoded SCTE-35 section, passed through to the engine unparsed. We don't
/// attempt to decode these; the `scte35-reader` crate can parse a subset of the standard and
/// the `threefive` Python library provides a full parser.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Binary {
    #[serde(rename = "@signalType")]
    pub signal_type: Option<String>,
    #[serde(rename = "$value")]
    pub content: String,
}

/// Root element of one marker descriptor file.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpliceInfoSection {
    #[serde(rename = "@xmlns")]
    pub xmlns: Option<String>,
    /// Generation timestamp; metadata only, never protocol content.
    #[serde(rename = "@generatedAt")]
    pub generated_at: Option<String>,
    #[serde(rename = "SpliceInsert")]
    pub splice_insert: Option<SpliceInsert>,
    #[serde(rename = "TimeSignal")]
    pub time_signal: Option<TimeSignal>,
    #[serde(rename = "Binary")]
    pub binary: Option<Binary>,
}

/// Namespace used on generated marker descriptor roots.
pub const SCTE35_XML_NS: &str = "http://www.scte.org/schemas/35/2016";
