//! Logging helpers: single-line escaping for free text (message bodies, handset
//! names) and numbered multi-line dumps for whole protocol documents.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - NUL and other control characters => `\\xNN`
///
/// Strings longer than 300 characters are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Number the lines of a document: `01 <?xml ...`, `02 <request ...`.
///
/// The trailing NUL delimiter, if present, is dropped.
pub fn numbered_lines(doc: &str) -> impl Iterator<Item = String> + '_ {
    doc.trim_end_matches('\0')
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:02} {}", i + 1, line))
}

/// Write a document to the log, one numbered line per record.
pub fn dump_document(level: log::Level, doc: &str) {
    if !log::log_enabled!(level) {
        return;
    }
    for line in numbered_lines(doc) {
        log::log!(level, "{}", line);
    }
}
