//! Record-to-HTML rendering and HTML-to-PDF conversion.
//!
//! The HTML is built in-process from the record and its template snapshot,
//! with stable ordering everywhere, so the same inputs always yield the same
//! document. Conversion to PDF is delegated to a [`PdfEngine`].

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::record::{Record, RecordStatus};
use crate::models::template::TemplateField;
use crate::services::photo;
use crate::services::storage::FileStorage;

/// Converts a complete HTML document into PDF bytes.
#[async_trait]
pub trait PdfEngine: Send + Sync + std::fmt::Debug {
    async fn html_to_pdf(&self, html: &str) -> Result<Vec<u8>, AppError>;
}

/// Runs a `wkhtmltopdf`-compatible binary, HTML on stdin and PDF on stdout.
#[derive(Debug, Clone)]
pub struct CommandPdfEngine {
    program: String,
    timeout: Duration,
}

impl CommandPdfEngine {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PdfEngine for CommandPdfEngine {
    async fn html_to_pdf(&self, html: &str) -> Result<Vec<u8>, AppError> {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--quiet",
            "--encoding",
            "utf-8",
            "--page-size",
            "A4",
            "--enable-local-file-access",
            "-",
            "-",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::Internal(format!("Failed to start PDF engine: {e}")))?;

        // Feed stdin from a separate task so a full stdout pipe cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = html.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&bytes).await;
            })
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AppError::Internal("PDF engine timed out".to_string()))?
            .map_err(|e| AppError::Internal(format!("PDF engine failed: {e}")))?;

        if let Some(handle) = writer {
            let _ = handle.await;
        }

        if !output.status.success() || !output.stdout.starts_with(b"%PDF") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Internal(format!(
                "PDF engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// A person whose signature block appears on the document.
#[derive(Debug, Clone)]
pub struct Signatory {
    pub role_label: &'static str,
    pub name: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PhotoRef {
    pub file: PathBuf,
    pub caption: Option<String>,
}

/// Everything needed to render one record.
#[derive(Debug, Clone)]
pub struct RecordDocument {
    pub organization: String,
    pub record: Record,
    pub photos: Vec<PhotoRef>,
    pub employee: Signatory,
    pub reviewer: Option<Signatory>,
    pub review_notes: Option<String>,
    /// Diagonal banner for drafts, e.g. "PENDING" on previews.
    pub watermark: Option<String>,
}

/// Escape text for inclusion in HTML content or a quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn file_src(path: &std::path::Path) -> String {
    escape_html(&format!("file://{}", path.display()))
}

fn render_field_rows(
    out: &mut String,
    fields: &std::collections::BTreeMap<String, TemplateField>,
    values: &std::collections::BTreeMap<String, String>,
) {
    for (key, field) in fields {
        let value = values.get(key).map(String::as_str).unwrap_or("-");
        let _ = write!(
            out,
            "<tr><th>{}</th><td>{}</td></tr>",
            escape_html(&field.label),
            escape_html(value)
        );
    }
}

fn render_signatory(out: &mut String, s: &Signatory) {
    out.push_str("<div class=\"signature\">");
    let _ = write!(out, "<div class=\"sig-role\">{}</div>", s.role_label);
    match &s.signature_file {
        Some(file) => {
            let _ = write!(out, "<img src=\"{}\" alt=\"signature\">", file_src(file));
        }
        None => out.push_str("<div class=\"sig-blank\"></div>"),
    }
    let _ = write!(out, "<div class=\"sig-name\">{}</div>", escape_html(&s.name));
    if let Some(at) = s.signed_at {
        let _ = write!(out, "<div class=\"sig-date\">{}</div>", format_timestamp(at));
    }
    out.push_str("</div>");
}

/// Render the full HTML document for a record.
pub fn render_html(doc: &RecordDocument) -> String {
    let record = &doc.record;
    let snapshot = &record.template_snapshot.0;
    let device = &record.device_data.0;
    let responses = &record.checklist_responses.0;

    let mut out = String::with_capacity(16 * 1024);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    let _ = writeln!(
        out,
        "<title>{} - {}</title>",
        escape_html(&snapshot.name),
        record.id
    );
    out.push_str(
        r#"<style>
        body {
            font-family: 'DejaVu Sans', Arial, sans-serif;
            font-size: 11px; color: #000; margin: 12mm;
        }
        h1 { font-size: 18px; margin: 0; }
        h2 {
            font-size: 13px; border-bottom: 1px solid #000;
            padding-bottom: 2px; margin-top: 16px;
        }
        table { width: 100%; border-collapse: collapse; margin-top: 6px; }
        th, td {
            border: 1px solid #444; padding: 3px 5px;
            text-align: left; vertical-align: top;
        }
        th { background: #eee; }
        .meta td, .meta th { border: none; padding: 1px 4px; }
        .photos img { width: 45%; margin: 4px; }
        .caption { font-size: 9px; }
        .signatures { display: flex; justify-content: space-between; margin-top: 24px; }
        .signature { width: 45%; text-align: center; }
        .signature img { max-height: 60px; }
        .sig-blank { height: 60px; }
        .sig-name { border-top: 1px solid #000; margin-top: 4px; padding-top: 2px; }
        .watermark {
            position: fixed; top: 40%; left: 10%; font-size: 96px;
            color: rgba(200, 0, 0, 0.15); transform: rotate(-30deg);
        }
    </style>
"#,
    );
    out.push_str("</head>\n<body>\n");

    if let Some(mark) = &doc.watermark {
        let _ = writeln!(out, "<div class=\"watermark\">{}</div>", escape_html(mark));
    }

    let _ = writeln!(
        out,
        "<h1>{}</h1>\n<div>{} &middot; {}</div>",
        escape_html(&doc.organization),
        escape_html(&snapshot.name),
        snapshot.category.label()
    );

    out.push_str("<table class=\"meta\">");
    let _ = write!(out, "<tr><th>Record</th><td>{}</td></tr>", record.id);
    let _ = write!(
        out,
        "<tr><th>Submitted</th><td>{}</td></tr>",
        format_timestamp(record.created_at)
    );
    let _ = write!(
        out,
        "<tr><th>Status</th><td>{}</td></tr>",
        record.status.as_str().to_uppercase()
    );
    out.push_str("</table>\n");

    if !snapshot.device_fields.is_empty() {
        out.push_str("<h2>Device Information</h2>\n<table>");
        render_field_rows(&mut out, &snapshot.device_fields, &device.fields);
        out.push_str("</table>\n");
    }

    if !snapshot.configuration_items.is_empty() {
        out.push_str("<h2>Configuration</h2>\n<table>");
        for item in &snapshot.configuration_items {
            let value = device
                .configuration
                .get(item)
                .map(String::as_str)
                .unwrap_or("-");
            let _ = write!(
                out,
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(item),
                escape_html(value)
            );
        }
        out.push_str("</table>\n");
    }

    if !snapshot.special_fields.is_empty() {
        out.push_str("<h2>Additional Details</h2>\n<table>");
        render_field_rows(&mut out, &snapshot.special_fields, &device.special);
        out.push_str("</table>\n");
    }

    for section in &snapshot.items {
        let _ = writeln!(out, "<h2>{}</h2>", escape_html(&section.title));
        out.push_str("<table><tr><th>Item</th>");
        for column in &section.columns {
            let _ = write!(out, "<th>{}</th>", escape_html(column));
        }
        out.push_str("</tr>");
        let answers = responses.get(&section.title);
        for item in &section.items {
            let row = answers.and_then(|a| a.get(item));
            let _ = write!(out, "<tr><td>{}</td>", escape_html(item));
            for column in &section.columns {
                let value = row
                    .and_then(|r| r.get(column))
                    .map(String::as_str)
                    .unwrap_or("");
                let _ = write!(out, "<td>{}</td>", escape_html(value));
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>\n");
    }

    if let Some(notes) = record.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(out, "<h2>Notes</h2>\n<p>{}</p>", escape_html(notes));
    }

    if !doc.photos.is_empty() {
        out.push_str("<h2>Photos</h2>\n<div class=\"photos\">");
        for photo in &doc.photos {
            let _ = write!(out, "<figure><img src=\"{}\" alt=\"photo\">", file_src(&photo.file));
            if let Some(caption) = &photo.caption {
                let _ = write!(
                    out,
                    "<figcaption class=\"caption\">{}</figcaption>",
                    escape_html(caption)
                );
            }
            out.push_str("</figure>");
        }
        out.push_str("</div>\n");
    }

    if let Some(notes) = &doc.review_notes {
        let _ = writeln!(out, "<h2>Review Notes</h2>\n<p>{}</p>", escape_html(notes));
    }

    out.push_str("<div class=\"signatures\">");
    render_signatory(&mut out, &doc.employee);
    if let Some(reviewer) = &doc.reviewer {
        render_signatory(&mut out, reviewer);
    }
    out.push_str("</div>\n</body>\n</html>\n");
    out
}

/// SHA-256 of the generated document, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A signatory's display name and stored signature, looked up by user id.
async fn load_signatory(
    conn: &mut PgConnection,
    storage: &FileStorage,
    user_id: Uuid,
    role_label: &'static str,
    signed_at: Option<DateTime<Utc>>,
) -> Result<Signatory, AppError> {
    let (name, signature_path) = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT display_name, signature_path FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let signature_file = match signature_path {
        Some(rel) => Some(storage.resolve(&rel)?),
        None => None,
    };

    Ok(Signatory {
        role_label,
        name,
        signed_at,
        signature_file,
    })
}

/// Reviewer shown on the document.
#[derive(Debug, Clone, Copy)]
pub struct ReviewerInfo {
    pub admin_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

/// Gather photos and signatures for a record into a renderable document.
///
/// Every lookup runs on `conn`, so a caller holding a transaction needs no
/// second pool connection.
pub async fn build_document(
    conn: &mut PgConnection,
    storage: &FileStorage,
    organization: &str,
    record: &Record,
    reviewer: Option<ReviewerInfo>,
    review_notes: Option<String>,
) -> Result<RecordDocument, AppError> {
    let photos = photo::list_for_record(&mut *conn, record.id)
        .await?
        .into_iter()
        .map(|p| {
            Ok(PhotoRef {
                file: storage.resolve(&p.file_path)?,
                caption: p.caption,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let employee = load_signatory(
        &mut *conn,
        storage,
        record.employee_id,
        "Performed by",
        Some(record.created_at),
    )
    .await?;

    let reviewer = match reviewer {
        Some(info) => Some(
            load_signatory(conn, storage, info.admin_id, "Approved by", Some(info.signed_at))
                .await?,
        ),
        None => None,
    };

    let watermark = match record.status {
        RecordStatus::Pending => Some("PENDING".to_string()),
        RecordStatus::Rejected => Some("REJECTED".to_string()),
        RecordStatus::Accepted => None,
    };

    Ok(RecordDocument {
        organization: organization.to_string(),
        record: record.clone(),
        photos,
        employee,
        reviewer,
        review_notes,
        watermark,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use sqlx::types::Json;

    use crate::models::record::DeviceData;
    use crate::models::template::{
        ChecklistSection, DeviceCategory, FieldMap, FieldType, TemplateSnapshot,
    };

    fn document() -> RecordDocument {
        let mut device_fields = FieldMap::new();
        device_fields.insert(
            "serial_number".to_string(),
            TemplateField {
                label: "Serial Number".to_string(),
                required: true,
                field_type: FieldType::Text,
            },
        );
        let snapshot = TemplateSnapshot {
            template_id: Uuid::nil(),
            name: "UPS <Quarterly>".to_string(),
            category: DeviceCategory::Ups,
            device_fields,
            configuration_items: vec!["Firmware".to_string()],
            special_fields: FieldMap::new(),
            items: vec![ChecklistSection {
                title: "Battery".to_string(),
                columns: vec!["Result".to_string(), "Remark".to_string()],
                items: vec!["Voltage".to_string(), "Terminals".to_string()],
                order: 1,
            }],
            captured_at: Utc::now(),
        };

        let mut device = DeviceData::default();
        device
            .fields
            .insert("serial_number".to_string(), "SN-42".to_string());
        device
            .configuration
            .insert("Firmware".to_string(), "v2.1".to_string());

        let mut responses = BTreeMap::new();
        let mut battery = BTreeMap::new();
        let mut voltage = BTreeMap::new();
        voltage.insert("Result".to_string(), "OK".to_string());
        voltage.insert("Remark".to_string(), "13.2V & stable".to_string());
        battery.insert("Voltage".to_string(), voltage);
        responses.insert("Battery".to_string(), battery);

        let created = DateTime::parse_from_rfc3339("2026-03-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        RecordDocument {
            organization: "Plant A".to_string(),
            record: Record {
                id: Uuid::nil(),
                template_id: None,
                category: DeviceCategory::Ups,
                template_snapshot: Json(snapshot),
                employee_id: Uuid::nil(),
                device_data: Json(device),
                checklist_responses: Json(responses),
                notes: Some("Replaced fan".to_string()),
                status: RecordStatus::Accepted,
                pdf_path: None,
                pdf_sha256: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: created,
                updated_at: created,
            },
            photos: vec![PhotoRef {
                file: PathBuf::from("/srv/storage/photos/a.png"),
                caption: Some("Front".to_string()),
            }],
            employee: Signatory {
                role_label: "Performed by",
                name: "Tech One".to_string(),
                signed_at: Some(created),
                signature_file: None,
            },
            reviewer: Some(Signatory {
                role_label: "Approved by",
                name: "Admin".to_string(),
                signed_at: Some(created),
                signature_file: Some(PathBuf::from("/srv/storage/signatures/admin.png")),
            }),
            review_notes: None,
            watermark: None,
        }
    }

    #[test]
    fn escape_html_covers_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn render_includes_answers_and_escapes() {
        let html = render_html(&document());
        assert!(html.contains("UPS &lt;Quarterly&gt;"));
        assert!(html.contains("<th>Serial Number</th><td>SN-42</td>"));
        assert!(html.contains("<th>Firmware</th><td>v2.1</td>"));
        assert!(html.contains("13.2V &amp; stable"));
        assert!(html.contains("<tr><td>Terminals</td><td></td><td></td></tr>"));
        assert!(html.contains("file:///srv/storage/photos/a.png"));
        assert!(html.contains("file:///srv/storage/signatures/admin.png"));
        assert!(html.contains("2026-03-01 08:30 UTC"));
        assert!(!html.contains("watermark\">"));
    }

    #[test]
    fn render_is_deterministic() {
        let doc = document();
        assert_eq!(render_html(&doc), render_html(&doc));
    }

    #[test]
    fn watermark_rendered_when_set() {
        let mut doc = document();
        doc.watermark = Some("PENDING".to_string());
        doc.reviewer = None;
        let html = render_html(&doc);
        assert!(html.contains("<div class=\"watermark\">PENDING</div>"));
        assert!(!html.contains("Approved by"));
    }

    #[test]
    fn sha256_is_stable_hex() {
        let digest = sha256_hex(b"%PDF-1.4");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, sha256_hex(b"%PDF-1.4"));
        assert_ne!(digest, sha256_hex(b"%PDF-1.5"));
    }

    #[tokio::test]
    async fn missing_engine_binary_is_internal_error() {
        let engine = CommandPdfEngine::new(
            "/nonexistent/pmtrack-pdf-engine",
            Duration::from_secs(1),
        );
        let err = engine.html_to_pdf("<html></html>").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
