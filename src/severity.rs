//! Severity lattice: green < orange < red, each with a fixed health-score weight.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Green,
    Orange,
    Red,
}

impl Severity {
    /// Health-score malus a firing symptom of this severity applies.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Green => 0,
            Severity::Orange => 50,
            Severity::Red => 100,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Green
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "green" => Ok(Severity::Green),
            "orange" => Ok(Severity::Orange),
            "red" => Ok(Severity::Red),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Green => "green",
            Severity::Orange => "orange",
            Severity::Red => "red",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_green_lt_orange_lt_red() {
        assert!(Severity::Green < Severity::Orange);
        assert!(Severity::Orange < Severity::Red);
    }

    #[test]
    fn weights_match_suggested_scale() {
        assert_eq!(Severity::Green.weight(), 0);
        assert_eq!(Severity::Orange.weight(), 50);
        assert_eq!(Severity::Red.weight(), 100);
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!("ORANGE".parse::<Severity>().unwrap(), Severity::Orange);
        assert_eq!("Red".parse::<Severity>().unwrap(), Severity::Red);
    }

    #[test]
    fn from_str_rejects_unknown_names() {
        assert!("purple".parse::<Severity>().is_err());
    }
}
