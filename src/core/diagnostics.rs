//! Compiler diagnostics
//!
//! Turns GCC's plain-text error stream into structured diagnostics so that
//! a failed discovery can be reported as data (e.g. `--json`) and not only
//! as raw text.

use serde::Serialize;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// `warning:`
    Warning,
    /// `error:`
    Error,
    /// `fatal error:`
    Fatal,
}

/// A location a diagnostic refers to, with a short message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    /// Message, e.g. "included from here"
    pub message: String,
    /// File path
    pub file: String,
    /// 1-based line, 0 if unknown
    pub line: u32,
    /// 1-based column, 0 if unknown
    pub column: u32,
}

/// A compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Message, including any indented continuation lines
    pub message: String,
    /// File path
    pub file: String,
    /// 1-based line, 0 if unknown
    pub line: u32,
    /// 1-based column, 0 if unknown
    pub column: u32,
    /// Include trace and enclosing-function context
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Context>,
    /// `note:` lines attached to this diagnostic
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Context>,
}

const INCLUDED_FROM: &str = "In file included from ";
const INCLUDED_FROM_CONT: &str = "                 from ";

/// Which message continuation lines are appended to
enum Current {
    None,
    Trace(usize),
    InFile,
    Diagnostic,
    Note,
}

/// Parse GCC output into diagnostics
pub fn parse_gcc_output(output: &str) -> Vec<Diagnostic> {
    let mut result: Vec<Diagnostic> = Vec::new();
    let mut full_context: Vec<Context> = Vec::new();
    let mut full_context_refers_to: Option<String> = None;
    let mut in_file_context: Option<Context> = None;
    let mut current = Current::None;

    for raw in output.lines() {
        let line = raw.trim_end_matches('\r');

        let trace = if let Some(rest) = line.strip_prefix(INCLUDED_FROM) {
            in_file_context = None;
            full_context.clear();
            full_context_refers_to = None;
            Some(rest)
        } else {
            line.strip_prefix(INCLUDED_FROM_CONT)
        };
        if let Some(rest) = trace {
            let (file, line_no, column) = extract_file_line_and_column(rest.trim_end_matches(','));
            full_context.push(Context {
                message: "included from here".to_string(),
                file,
                line: line_no,
                column,
            });
            current = Current::Trace(full_context.len() - 1);
            continue;
        }

        if let Some((location, msg)) = line.split_once(": ") {
            let (file, line_no, column) = extract_file_line_and_column(location);

            if line_no == 0 && column == 0 {
                in_file_context = Some(Context {
                    message: msg.to_string(),
                    file,
                    line: 0,
                    column: 0,
                });
                current = Current::InFile;
                continue;
            }

            if let Some(note) = msg.strip_prefix("note: ") {
                if let Some(diag) = result.last_mut() {
                    diag.notes.push(Context {
                        message: note.to_string(),
                        file,
                        line: line_no,
                        column,
                    });
                    current = Current::Note;
                }
                continue;
            }

            let classified = [
                ("error: ", Severity::Error),
                ("warning: ", Severity::Warning),
                ("fatal error: ", Severity::Fatal),
            ]
            .into_iter()
            .find_map(|(prefix, sev)| msg.strip_prefix(prefix).map(|m| (sev, m)));

            if let Some((severity, message)) = classified {
                let mut context = Vec::new();
                if !full_context.is_empty() {
                    let refers = full_context_refers_to.get_or_insert_with(|| file.clone());
                    if *refers == file {
                        context.extend(full_context.iter().cloned());
                    }
                }
                if let Some(in_file) = in_file_context.as_ref().filter(|c| c.file == file) {
                    context.push(in_file.clone());
                }
                result.push(Diagnostic {
                    severity,
                    message: message.to_string(),
                    file,
                    line: line_no,
                    column,
                    context,
                    notes: Vec::new(),
                });
                current = Current::Diagnostic;
                continue;
            }
        }

        if line.starts_with(' ') {
            let extra = format!("\n{line}");
            match current {
                Current::None => {}
                Current::Trace(i) => full_context[i].message.push_str(&extra),
                Current::InFile => {
                    if let Some(c) = in_file_context.as_mut() {
                        c.message.push_str(&extra);
                    }
                }
                Current::Diagnostic => {
                    if let Some(d) = result.last_mut() {
                        d.message.push_str(&extra);
                    }
                }
                Current::Note => {
                    if let Some(n) = result.last_mut().and_then(|d| d.notes.last_mut()) {
                        n.message.push_str(&extra);
                    }
                }
            }
        }
    }

    result
}

/// Split `file:line:column` (Windows drive letters are kept with the file)
fn extract_file_line_and_column(location: &str) -> (String, u32, u32) {
    let mut parts: Vec<&str> = location.split(':').collect();
    let mut file = parts[0].to_string();

    if parts.len() > 1 && file.len() == 1 && parts[1].starts_with('\\') {
        file = format!("{}:{}", parts[0], parts[1]);
        parts.remove(1);
    }
    if parts.len() == 1 {
        return (file, 0, 0);
    }

    let line = parts[1].trim().parse().unwrap_or(0);
    let column = parts
        .get(2)
        .and_then(|c| c.trim().parse().ok())
        .unwrap_or(0);
    (file, line, column)
}
