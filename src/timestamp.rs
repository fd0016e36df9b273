//! Local time handling for approval and deadline dates
//!
//! Stored documents carry their dates as `DD-MM-YYYY HH:mm:ss` (instants) and
//! `DD-MM-YYYY` (days) strings in Asia/Bangkok local time. Both wrappers keep a
//! real chrono value in memory and only speak the string format at the CBOR
//! boundary, so comparisons never depend on string order.
use super::error::ValidationError;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Utc};
use chrono_tz::Tz;

pub const LOCAL_TZ: Tz = chrono_tz::Asia::Bangkok;
pub const INSTANT_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
pub const DAY_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    /// Current instant at whole second precision, the finest the stored
    /// format keeps.
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(0))
    }
    /// Build from local (Bangkok) wall clock values.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        LOCAL_TZ
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(|local| Self(local.with_timezone(&Utc)))
            .unwrap_or_else(|| panic!("invalid local time {day}-{month}-{year} {hour}:{min}:{sec}"))
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn format_local(&self) -> String {
        self.0.with_timezone(&LOCAL_TZ).format(INSTANT_FORMAT).to_string()
    }
    pub fn parse_local(value: &str) -> Result<Self, ValidationError> {
        let naive = NaiveDateTime::parse_from_str(value.trim(), INSTANT_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(value.to_string()))?;
        // Bangkok has no DST, so every wall clock time maps to one instant
        LOCAL_TZ
            .from_local_datetime(&naive)
            .single()
            .map(|local| Self(local.with_timezone(&Utc)))
            .ok_or_else(|| ValidationError::InvalidDate(value.to_string()))
    }
    /// The local calendar day this instant falls on.
    pub fn local_day(&self) -> DayStamp {
        DayStamp(self.0.with_timezone(&LOCAL_TZ).date_naive())
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct DayStamp(NaiveDate);

impl DayStamp {
    pub fn today() -> Self {
        TimeStamp::now().local_day()
    }
    pub fn new_with(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        NaiveDate::parse_from_str(value.trim(), DAY_FORMAT)
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate(value.to_string()))
    }
    pub fn format(&self) -> String {
        self.0.format(DAY_FORMAT).to_string()
    }
    pub fn add_days(&self, days: u64) -> Self {
        // saturate at chrono's maximum date rather than wrapping
        Self(self.0.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX))
    }
    pub fn to_naive(&self) -> NaiveDate {
        self.0
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.format_local())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw = d.str()?;
        TimeStamp::parse_local(raw).map_err(|_| {
            minicbor::decode::Error::message("timestamp is not DD-MM-YYYY HH:mm:ss")
        })
    }
}

impl<C> minicbor::Encode<C> for DayStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.format())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for DayStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw = d.str()?;
        DayStamp::parse(raw)
            .map_err(|_| minicbor::decode::Error::message("date is not DD-MM-YYYY"))
    }
}
