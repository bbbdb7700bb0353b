//! Shared domain enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical variant of a printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    Normal,
    Foil,
    Etched,
}

impl Finish {
    pub fn as_str(self) -> &'static str {
        match self {
            Finish::Normal => "normal",
            Finish::Foil => "foil",
            Finish::Etched => "etched",
        }
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finish {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" | "nonfoil" => Ok(Finish::Normal),
            "foil" => Ok(Finish::Foil),
            "etched" => Ok(Finish::Etched),
            other => Err(format!("unknown finish: {other}")),
        }
    }
}

/// Where a printing exists: physical paper or Magic Online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Paper,
    Mtgo,
}

impl PriceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceSource::Paper => "paper",
            PriceSource::Mtgo => "mtgo",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer buy price vs store buy-from-consumer price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Retail,
    Buylist,
}

impl PriceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceType::Retail => "retail",
            PriceType::Buylist => "buylist",
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn finish_round_trips() {
        assert_eq!("etched".parse::<Finish>().unwrap(), Finish::Etched);
        assert_eq!("nonfoil".parse::<Finish>().unwrap(), Finish::Normal);
        assert_eq!(Finish::Foil.to_string(), "foil");
    }
}
