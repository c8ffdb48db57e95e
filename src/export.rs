//! CSV export of normalized vault rows.

use std::io::Write;

use serde::Serialize;

use crate::normalize::NormalizedVaultRow;

pub const EXPORT_HEADERS: [&str; 7] = [
    "name",
    "leader",
    "vault_address",
    "apr_percent",
    "tvl_usd",
    "age_days",
    "is_closed",
];

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    name: &'a str,
    leader: Option<&'a str>,
    vault_address: Option<&'a str>,
    apr_percent: f64,
    tvl_usd: f64,
    age_days: Option<f64>,
    is_closed: bool,
}

impl<'a> From<&'a NormalizedVaultRow> for ExportRecord<'a> {
    fn from(row: &'a NormalizedVaultRow) -> Self {
        Self {
            name: &row.name,
            leader: row.leader.as_deref(),
            vault_address: row.vault_address.as_deref(),
            apr_percent: row.apr_percent,
            tvl_usd: row.tvl_usd,
            age_days: row.age_days,
            is_closed: row.is_closed,
        }
    }
}

pub fn write_rows_csv<'a, W: Write>(
    rows: impl IntoIterator<Item = &'a NormalizedVaultRow>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    out.write_record(EXPORT_HEADERS)?;
    for row in rows {
        out.serialize(ExportRecord::from(row))?;
    }
    out.flush()?;
    Ok(())
}
