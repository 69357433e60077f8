//! Document number generation backed by per-day database counters

use chrono::NaiveDate;
use shared::{format_document_number, DocumentKind};
use sqlx::PgConnection;

use crate::error::AppResult;

/// Next `PREFIX-YYYYMMDD-NNNN` number for `kind` on `date`.
///
/// Runs on the caller's connection so the number is only consumed when the
/// surrounding transaction commits.
pub async fn next_document_number(
    conn: &mut PgConnection,
    kind: DocumentKind,
    date: NaiveDate,
) -> AppResult<String> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (prefix, seq_date, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, seq_date)
        DO UPDATE SET last_value = document_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(kind.prefix())
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_document_number(kind, date, sequence))
}
