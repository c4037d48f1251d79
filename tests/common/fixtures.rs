//! Invoice fixtures and canned API responses

use invoice_workflow::LocalFile;
use serde_json::{Value, json};
use std::path::Path;

/// A JSON invoice export
pub const ACME_JANUARY: &str = r#"{
  "vendor": "Acme Corp",
  "invoice_number": "INV-2024-0107",
  "date": "2024-01-31",
  "total": 1250.00,
  "currency": "EUR"
}"#;

/// A second JSON invoice export
pub const ACME_FEBRUARY: &str = r#"{
  "vendor": "Acme Corp",
  "invoice_number": "INV-2024-0212",
  "date": "2024-02-29",
  "total": 980.50,
  "currency": "EUR"
}"#;

/// Bytes that look enough like a PDF for upload purposes
pub const SCANNED_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n";

/// Write two JSON exports and one PDF scan into `dir`
pub async fn write_sample_batch(dir: &Path) -> Vec<LocalFile> {
    let files: [(&str, &[u8]); 3] = [
        ("acme-2024-01.json", ACME_JANUARY.as_bytes()),
        ("acme-2024-02.json", ACME_FEBRUARY.as_bytes()),
        ("globex-scan.pdf", SCANNED_PDF),
    ];

    let mut selection = Vec::new();
    for (name, content) in files {
        let path = dir.join(name);
        tokio::fs::write(&path, content)
            .await
            .expect("Failed to write fixture");
        selection.push(
            LocalFile::from_path(&path)
                .await
                .expect("Failed to stat fixture"),
        );
    }
    selection
}

/// Upload response for the sample batch
pub fn upload_response(upload_id: &str) -> Value {
    json!({
        "upload_id": upload_id,
        "file_count": 3,
        "json_count": 2,
        "pdf_count": 1,
        "files": [
            {"filename": "acme-2024-01.json", "type": "json", "path": format!("/staging/{upload_id}/acme-2024-01.json")},
            {"filename": "acme-2024-02.json", "type": "json", "path": format!("/staging/{upload_id}/acme-2024-02.json")},
            {"filename": "globex-scan.pdf", "type": "pdf", "path": format!("/staging/{upload_id}/globex-scan.pdf")}
        ]
    })
}

/// Non-terminal status response
pub fn running_status(job_id: &str, progress: f64, current_step: &str) -> Value {
    json!({
        "job_id": job_id,
        "status": "processing",
        "progress": progress,
        "current_step": current_step
    })
}

/// Completed status response with a result
pub fn completed_status(job_id: &str, output_path: &str, errors: Value) -> Value {
    let error_count = errors.as_array().map(|e| e.len()).unwrap_or(0);
    json!({
        "job_id": job_id,
        "status": "completed",
        "progress": 100,
        "current_step": "Done",
        "result": {
            "invoice_count": 3 - error_count,
            "error_count": error_count,
            "errors": errors,
            "output_path": output_path
        }
    })
}
