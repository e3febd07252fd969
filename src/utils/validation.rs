use crate::services::spreadsheet::SpreadsheetFormat;
use std::path::Path;

/// Content types browsers and HTTP clients send for spreadsheets. The format
/// itself is decided by the extension and the leading bytes.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "text/csv",
    "application/csv",
    "text/x-csv",
    "text/plain",
    "application/zip",
    "application/x-zip-compressed",
    "application/octet-stream",
];

const ZIP_SIGNATURE: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// True when the rejection is about the kind of file rather than its name.
    pub fn is_media_type(&self) -> bool {
        matches!(
            self.code,
            "UNSUPPORTED_FORMAT" | "INVALID_MIME_TYPE" | "CONTENT_MISMATCH" | "EXECUTABLE_CONTENT"
        )
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Sanitizes filename to prevent path traversal and header injection
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Only the last path component survives, whichever separator was used
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "Filename cannot be empty",
        ));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > 255 {
        // Keep the extension when trimming
        let extension = sanitized.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        let mut end = 255usize.saturating_sub(extension.len() + 1);
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}.{}", &sanitized[..end], extension)
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(ValidationError::new(
            "HIDDEN_FILE",
            "Hidden files (starting with '.') are not allowed",
        ));
    }

    Ok(sanitized)
}

pub fn validate_content_type(content_type: &str) -> Result<(), ValidationError> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if normalized.is_empty() || ACCEPTED_CONTENT_TYPES.contains(&normalized.as_str()) {
        return Ok(());
    }

    Err(ValidationError::new(
        "INVALID_MIME_TYPE",
        format!(
            "MIME type '{}' is not allowed. Only Excel and CSV files are accepted.",
            content_type
        ),
    ))
}

/// Checks the leading bytes against what the extension promises
pub fn verify_magic_bytes(header: &[u8], format: SpreadsheetFormat) -> Result<(), ValidationError> {
    if header.is_empty() {
        return Err(ValidationError::new("EMPTY_FILE", "File appears to be empty"));
    }

    if is_executable_content(header) {
        return Err(ValidationError::new(
            "EXECUTABLE_CONTENT",
            "File contains executable content which is not allowed",
        ));
    }

    let matches = match format {
        SpreadsheetFormat::Xlsx => header.starts_with(ZIP_SIGNATURE),
        SpreadsheetFormat::Xls => header.starts_with(OLE_SIGNATURE),
        SpreadsheetFormat::Csv => !header.iter().take(512).any(|&b| b == 0),
    };

    if !matches {
        return Err(ValidationError::new(
            "CONTENT_MISMATCH",
            format!("File content does not look like a .{} file", extension_of(format)),
        ));
    }

    Ok(())
}

fn extension_of(format: SpreadsheetFormat) -> &'static str {
    match format {
        SpreadsheetFormat::Xlsx => "xlsx",
        SpreadsheetFormat::Xls => "xls",
        SpreadsheetFormat::Csv => "csv",
    }
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.starts_with(b"#!") {
        return true;
    }

    infer::get(header).is_some_and(|kind| kind.matcher_type() == infer::MatcherType::App)
}

/// Full validation pipeline for an uploaded spreadsheet. Returns the cleaned
/// filename and the detected format.
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    header: &[u8],
) -> Result<(String, SpreadsheetFormat), ValidationError> {
    let sanitized = sanitize_filename(filename)?;

    let format = SpreadsheetFormat::from_filename(&sanitized).ok_or_else(|| {
        ValidationError::new(
            "UNSUPPORTED_FORMAT",
            "Only .xlsx, .xls and .csv files are accepted",
        )
    })?;

    validate_content_type(content_type.unwrap_or(""))?;
    verify_magic_bytes(header, format)?;

    Ok((sanitized, format))
}
