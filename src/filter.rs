//! Range filters over normalized vault rows, plus presentation helpers.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedVaultRow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VaultFilters {
    pub min_apr: f64,
    pub max_apr: f64,
    pub min_tvl: f64,
    pub max_tvl: f64,
    pub min_age: f64,
    pub max_age: f64,
    pub include_closed: bool,
}

impl Default for VaultFilters {
    fn default() -> Self {
        Self {
            min_apr: 0.0,
            max_apr: 100.0,
            min_tvl: 0.0,
            max_tvl: 1e9,
            min_age: 0.0,
            max_age: 10_000.0,
            include_closed: false,
        }
    }
}

impl VaultFilters {
    /// Bounds are inclusive. Rows without a known age always pass the age bounds.
    pub fn matches(&self, row: &NormalizedVaultRow) -> bool {
        if row.is_closed && !self.include_closed {
            return false;
        }
        if row.apr_percent < self.min_apr || row.apr_percent > self.max_apr {
            return false;
        }
        if row.tvl_usd < self.min_tvl || row.tvl_usd > self.max_tvl {
            return false;
        }
        match row.age_days {
            Some(age) => age >= self.min_age && age <= self.max_age,
            None => true,
        }
    }
}

pub fn apply_filters(
    rows: impl IntoIterator<Item = NormalizedVaultRow>,
    filters: &VaultFilters,
) -> Vec<NormalizedVaultRow> {
    rows.into_iter().filter(|row| filters.matches(row)).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Input,
    AprDesc,
    TvlDesc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "input" | "none" => Some(Self::Input),
            "apr" | "apr_desc" => Some(Self::AprDesc),
            "tvl" | "tvl_desc" => Some(Self::TvlDesc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::AprDesc => "apr_desc",
            Self::TvlDesc => "tvl_desc",
        }
    }
}

pub fn sort_rows<R: AsRef<NormalizedVaultRow>>(rows: &mut [R], order: SortOrder) {
    match order {
        SortOrder::Input => {}
        SortOrder::AprDesc => {
            rows.sort_by(|a, b| descending(a.as_ref().apr_percent, b.as_ref().apr_percent))
        }
        SortOrder::TvlDesc => {
            rows.sort_by(|a, b| descending(a.as_ref().tvl_usd, b.as_ref().tvl_usd))
        }
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

impl AsRef<NormalizedVaultRow> for NormalizedVaultRow {
    fn as_ref(&self) -> &NormalizedVaultRow {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultSummaryMetrics {
    pub count: usize,
    pub mean_apr_percent: Option<f64>,
    pub total_tvl_usd: f64,
}

pub fn summarize<'a>(rows: impl IntoIterator<Item = &'a NormalizedVaultRow>) -> VaultSummaryMetrics {
    let mut count = 0usize;
    let mut apr_sum = 0.0;
    let mut total_tvl_usd = 0.0;

    for row in rows {
        count += 1;
        apr_sum += row.apr_percent;
        total_tvl_usd += row.tvl_usd;
    }

    VaultSummaryMetrics {
        count,
        mean_apr_percent: (count > 0).then(|| apr_sum / count as f64),
        total_tvl_usd,
    }
}
