//! News source catalogue and search URLs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported news sources. Unknown names fall back to Bloomberg.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsSource {
    /// bloomberg.com
    #[default]
    Bloomberg,
    /// reuters.com
    Reuters,
    /// cnbc.com
    Cnbc,
    /// wsj.com
    WallStreetJournal,
    /// ft.com
    FinancialTimes,
    /// dowjones.com
    DowJones,
}

impl NewsSource {
    /// Every source, in catalogue order.
    pub const ALL: [Self; 6] = [
        Self::Bloomberg,
        Self::Reuters,
        Self::Cnbc,
        Self::WallStreetJournal,
        Self::FinancialTimes,
        Self::DowJones,
    ];

    /// Map a free-text source name; unknown names give [`NewsSource::Bloomberg`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "reuters" => Self::Reuters,
            "cnbc" => Self::Cnbc,
            "wall street journal" | "wsj" => Self::WallStreetJournal,
            "financial times" | "ft" => Self::FinancialTimes,
            "dow jones" => Self::DowJones,
            _ => Self::Bloomberg,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bloomberg => "bloomberg",
            Self::Reuters => "reuters",
            Self::Cnbc => "cnbc",
            Self::WallStreetJournal => "wall street journal",
            Self::FinancialTimes => "financial times",
            Self::DowJones => "dow jones",
        }
    }

    /// Search page URL for a query.
    #[must_use]
    pub fn search_url(self, query: &str) -> String {
        let query = urlencoding::encode(query.trim());
        match self {
            Self::Bloomberg => format!("https://www.bloomberg.com/search?query={query}"),
            Self::Reuters => format!("https://www.reuters.com/search/news?blob={query}"),
            Self::Cnbc => format!("https://www.cnbc.com/search/?query={query}"),
            Self::WallStreetJournal => format!("https://www.wsj.com/search?query={query}"),
            Self::FinancialTimes => format!("https://www.ft.com/search?q={query}"),
            Self::DowJones => format!("https://www.dowjones.com/search/?q={query}"),
        }
    }
}

impl fmt::Display for NewsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_sources() {
        assert_eq!(NewsSource::from_name("WSJ"), NewsSource::WallStreetJournal);
        assert_eq!(
            NewsSource::from_name("Wall Street Journal"),
            NewsSource::WallStreetJournal
        );
        assert_eq!(NewsSource::from_name("ft"), NewsSource::FinancialTimes);
        assert_eq!(NewsSource::from_name(" Reuters "), NewsSource::Reuters);
        assert_eq!(NewsSource::from_name("dow jones"), NewsSource::DowJones);
    }

    #[test]
    fn unknown_source_falls_back_to_bloomberg() {
        assert_eq!(NewsSource::from_name("marketwatch"), NewsSource::Bloomberg);
        assert_eq!(NewsSource::from_name(""), NewsSource::Bloomberg);
    }

    #[test]
    fn queries_are_encoded() {
        assert_eq!(
            NewsSource::Reuters.search_url("fed rate cut"),
            "https://www.reuters.com/search/news?blob=fed%20rate%20cut"
        );
        assert_eq!(
            NewsSource::FinancialTimes.search_url("S&P 500"),
            "https://www.ft.com/search?q=S%26P%20500"
        );
    }

    #[test]
    fn every_search_url_parses() {
        for source in NewsSource::ALL {
            url::Url::parse(&source.search_url("earnings")).unwrap();
        }
    }
}
