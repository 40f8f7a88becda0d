//! Option enumerations of the public compatibility surface.
//!
//! These replace the original accepted-literal option strings; each keeps a
//! `FromStr` so string-driven callers still get a typed boundary error.

use std::str::FromStr;

use crate::error::Error;

/// A calendar-ish time unit, as a fixed millisecond multiplier.
///
/// The multipliers are deliberately the coarse constants of the remote
/// convention (365-day year, 30-day month), not calendar arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Year => 1000 * 60 * 60 * 24 * 365,
            TimeUnit::Month => 1000 * 60 * 60 * 24 * 30,
            TimeUnit::Week => 1000 * 60 * 60 * 24 * 7,
            TimeUnit::Day => 1000 * 60 * 60 * 24,
            TimeUnit::Hour => 1000 * 60 * 60,
            TimeUnit::Minute => 1000 * 60,
            TimeUnit::Second => 1000,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "year" => Ok(TimeUnit::Year),
            "month" => Ok(TimeUnit::Month),
            "week" => Ok(TimeUnit::Week),
            "day" => Ok(TimeUnit::Day),
            "hour" => Ok(TimeUnit::Hour),
            "minute" => Ok(TimeUnit::Minute),
            "second" => Ok(TimeUnit::Second),
            other => Err(Error::UnknownTimeUnit(other.to_string())),
        }
    }
}

/// Band-containment filter mode: keep images with all, or at least one,
/// of the requested bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandFilter {
    All,
    Any,
}

impl FromStr for BandFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(BandFilter::All),
            "ANY" => Ok(BandFilter::Any),
            _ => Err(Error::UnknownBandFilter(s.to_string())),
        }
    }
}

/// Declared type of the identifier property in keyed region reductions.
///
/// The identifier ends up embedded in a band name, so numbers and dates
/// must be formatted to strings before stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    Str,
    Number,
    Date,
}

impl FromStr for IdType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "string" => Ok(IdType::Str),
            "number" => Ok(IdType::Number),
            "date" => Ok(IdType::Date),
            other => Err(Error::UnknownIdType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_multipliers() {
        assert_eq!(TimeUnit::Second.millis(), 1000);
        assert_eq!(TimeUnit::Day.millis(), 86_400_000);
        assert_eq!(TimeUnit::Year.millis(), 365 * TimeUnit::Day.millis());
    }

    #[test]
    fn band_filter_parsing() {
        assert_eq!("ALL".parse::<BandFilter>().unwrap(), BandFilter::All);
        assert_eq!("any".parse::<BandFilter>().unwrap(), BandFilter::Any);
        assert!("SOME".parse::<BandFilter>().is_err());
    }

    #[test]
    fn id_type_parsing() {
        assert_eq!("date".parse::<IdType>().unwrap(), IdType::Date);
        assert!("uuid".parse::<IdType>().is_err());
    }
}
