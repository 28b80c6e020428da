//! CSV export of maintenance records.

use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::record::RecordSummary;
use crate::services::record::{self, RecordFilters};

const HEADER: [&str; 9] = [
    "id",
    "category",
    "template_name",
    "employee",
    "status",
    "photo_count",
    "created_at",
    "reviewed_at",
    "pdf_path",
];

/// Write record rows as CSV.
pub fn write_csv(rows: &[(RecordSummary, Option<String>)]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;

    for (summary, pdf_path) in rows {
        writer
            .write_record([
                summary.id.to_string(),
                summary.category.as_str().to_string(),
                spreadsheet_safe(&summary.template_name),
                spreadsheet_safe(&summary.employee_name),
                summary.status.as_str().to_string(),
                summary.photo_count.to_string(),
                summary.created_at.to_rfc3339(),
                summary
                    .reviewed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                pdf_path.clone().unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {e}")))
}

/// Prefix free-text cells that a spreadsheet would evaluate as a formula.
fn spreadsheet_safe(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{value}"),
        _ => value.to_string(),
    }
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("CSV write failed: {e}"))
}

/// Export every record matching the filters.
pub async fn export_csv(pool: &PgPool, filters: &RecordFilters) -> Result<Vec<u8>, AppError> {
    let rows = record::list_all(pool, filters).await?;
    let csv = write_csv(&rows)?;
    tracing::debug!(rows = rows.len(), bytes = csv.len(), "Record export generated");
    Ok(csv)
}
