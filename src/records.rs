use crate::ast::{Mode, Record, Schema};
use crate::coerce::Coercer;
use crate::error::{record_warning, ErrorCode, MaxiError, SourceRef, Warning};
use crate::scanner::{find_record_end, is_identifier_continue, is_identifier_start};
use crate::utils::line_at;
use log::{debug, trace};
use std::ops::Range;

/// Scans the records section for `Alias(...)` runs and coerces each one.
///
/// The scan is a single forward pass; the line counter advances as newlines are
/// crossed, including those inside multi-line records. Lines starting with `#` are
/// comments. Text that does not start a record is skipped.
pub(crate) fn parse_records(
    schema: &Schema,
    src: SourceRef<'_>,
    range: Range<usize>,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Record>, MaxiError> {
    let text = src.text;
    let bytes = text.as_bytes();
    let end = range.end.min(bytes.len());
    let mut records = Vec::new();
    let mut line = line_at(text, range.start);
    let mut at_line_start = true;
    let mut i = range.start;

    while i < end {
        let b = bytes[i];
        if b == b'\n' {
            line += 1;
            at_line_start = true;
            i += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if at_line_start && b == b'#' {
            i = text[i..end].find('\n').map_or(end, |n| i + n);
            continue;
        }
        at_line_start = false;

        let boundary = i == range.start || !is_identifier_continue(bytes[i - 1]);
        if !(boundary && is_identifier_start(b)) {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i + 1;
        while j < end && is_identifier_continue(bytes[j]) {
            j += 1;
        }
        if j >= end || bytes[j] != b'(' {
            i = j;
            continue;
        }

        let alias = &text[start..j];
        let Some((close, newlines)) = find_record_end(&text[..end], j) else {
            return Err(src.syntax(
                start,
                j + 1 - start,
                format!("unterminated record `{alias}(` starting at line {line}"),
            ));
        };
        let content = &text[j + 1..close];
        trace!("record {alias} at line {line}: {content}");
        records.push(build_record(
            schema,
            src,
            alias,
            content,
            start..close + 1,
            line,
            warnings,
        )?);
        line += newlines;
        i = close + 1;
    }

    debug!("parsed {} records", records.len());
    Ok(records)
}

fn build_record(
    schema: &Schema,
    src: SourceRef<'_>,
    alias: &str,
    content: &str,
    span: Range<usize>,
    line: usize,
    warnings: &mut Vec<Warning>,
) -> Result<Record, MaxiError> {
    let type_def = schema.get(alias);
    if type_def.is_none() {
        match schema.mode {
            Mode::Strict => {
                let at = src.at(span.start, alias.len());
                return Err(MaxiError::UnknownType {
                    alias: alias.to_string(),
                    src: at.src,
                    span: at.span,
                    line: at.line,
                    column: at.column,
                });
            }
            Mode::Lax => record_warning(
                warnings,
                Warning {
                    code: ErrorCode::UnknownType,
                    message: format!("Unknown type alias `{alias}`, values kept untyped"),
                    line: Some(line),
                    filename: Some(src.name.to_string()),
                },
            ),
        }
    }

    let mut coercer = Coercer::new(schema, src, span.start, span.len(), line, warnings);
    let values = match type_def {
        Some(type_def) => coercer.coerce_positional(type_def, content)?,
        None => coercer.coerce_untyped(content)?,
    };
    Ok(Record {
        alias: alias.to_string(),
        values,
        line,
    })
}
