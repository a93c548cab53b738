use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trending window granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Unknown period: {0}")]
    Unknown(String),
}

impl Period {
    /// All periods, in the order a refresh fetches them
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Prefix shared by every entry key of this period inside a snapshot.
    pub fn key_prefix(&self) -> String {
        format!("{}-", self.as_str())
    }

    /// Entry key for the item at `rank` (0-based). Ranks are zero-padded to
    /// at least two digits; readers order by the parsed rank, not the key.
    pub fn entry_key(&self, rank: usize) -> String {
        format!("{}-{:02}", self.as_str(), rank)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            _ => Err(PeriodError::Unknown(s.to_string())),
        }
    }
}

/// One repository entry on a trending page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub repo_owner: String,
    pub repo_name: String,
    pub description: String,
    /// Source language label as reported by the page, "Unknown" if absent
    pub language: String,
    pub forks: u64,
    pub stars: u64,
    /// Stars gained during the period, zero when the page doesn't say
    pub stars_increase: u64,
}

impl RankedItem {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}
