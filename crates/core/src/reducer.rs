//! The closed set of aggregation reducers.

use std::str::FromStr;

use crate::error::Error;

/// A named aggregation applied across pixels, bands or a stack of images.
///
/// `StdDev` is the population standard deviation (divide by N), matching
/// the remote service. `MinMax` is the only multi-output reducer: it yields
/// a `_min` and a `_max` output per input band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Median,
    Min,
    Max,
    MinMax,
    Sum,
    StdDev,
    First,
    Count,
}

impl Reducer {
    /// Wire name, also used as the output band suffix.
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::MinMax => "minMax",
            Reducer::Sum => "sum",
            Reducer::StdDev => "stdDev",
            Reducer::First => "first",
            Reducer::Count => "count",
        }
    }
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "mean" => Ok(Reducer::Mean),
            "median" => Ok(Reducer::Median),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            "minMax" => Ok(Reducer::MinMax),
            "sum" => Ok(Reducer::Sum),
            "stdDev" => Ok(Reducer::StdDev),
            "first" => Ok(Reducer::First),
            "count" => Ok(Reducer::Count),
            other => Err(Error::UnknownReducer(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() {
        assert_eq!("mean".parse::<Reducer>().unwrap(), Reducer::Mean);
        assert_eq!("stdDev".parse::<Reducer>().unwrap(), Reducer::StdDev);
        assert_eq!("minMax".parse::<Reducer>().unwrap(), Reducer::MinMax);
    }

    #[test]
    fn parse_unknown_name_is_typed_error() {
        let err = "stddev".parse::<Reducer>().unwrap_err();
        assert!(matches!(err, Error::UnknownReducer(s) if s == "stddev"));
    }
}
