use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Reduce a client-supplied name to something safe to join onto the
/// working directory: NFKD-folded to ASCII (other non-ASCII dropped), no
/// path separators, whitespace runs collapsed to `_`, and only
/// `[A-Za-z0-9._-]` kept. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

pub fn is_pdf_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// `report.pdf` -> `report_compressed.pdf`
pub fn compressed_file_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    format!("{stem}_compressed.pdf")
}
