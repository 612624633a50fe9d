use crate::api::ParseResult;
use crate::ast::*;
use crate::error::{record_warning, ErrorCode, MaxiError, SourceRef, Warning};
use crate::loader::SchemaLoader;
use crate::records::parse_records;
use crate::resolver::Resolver;
use crate::scanner::{
    extract_trailing_group, first_top_level_char, is_identifier, match_paren, offset_in,
    split_top_level, unquote, unquote_pattern,
};
use log::debug;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, OnceLock};

fn semver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("static regex"))
}

fn decimal_precision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+:)?\d*\.\d*(:\d+)?$").expect("static regex"))
}

// === Sections ===

/// Byte ranges of the schema and records sections of a document, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub schema: Range<usize>,
    pub records: Range<usize>,
    /// Whether a `###` line was found.
    pub separated: bool,
}

fn trimmed_range(source: &str, range: Range<usize>) -> Range<usize> {
    let slice = &source[range.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return range.start..range.start;
    }
    let start = range.start + offset_in(slice, trimmed);
    start..start + trimmed.len()
}

/// Splits a document at its first `###` line.
///
/// Without a separator the whole text is schema when it contains a directive or an
/// explicit `Alias:Type(` / `Alias<Parents>(` header, and records otherwise.
pub fn split_sections(source: &str) -> Sections {
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        if line.trim() == "###" {
            return Sections {
                schema: trimmed_range(source, 0..offset),
                records: trimmed_range(source, offset + line.len()..source.len()),
                separated: true,
            };
        }
        offset += line.len();
    }
    let all = trimmed_range(source, 0..source.len());
    let schema_like = source.lines().any(|line| {
        let line = line.trim();
        line.starts_with('@') || has_explicit_header(line)
    });
    if schema_like {
        Sections {
            records: all.end..all.end,
            schema: all,
            separated: false,
        }
    } else {
        Sections {
            schema: all.start..all.start,
            records: all,
            separated: false,
        }
    }
}

fn has_explicit_header(line: &str) -> bool {
    line.find('(')
        .and_then(|open| Header::parse(line[..open].trim()).ok())
        .is_some_and(|h| h.name.is_some() || !h.parents.is_empty())
}

/// Decides whether a schema-section line starts a type definition rather than a
/// data record.
///
/// `Alias:Type(...)` and `Alias<Parents>(...)` always are. For the bare `Alias(...)`
/// form the first non-blank character inside the parens decides: a digit, `-`
/// followed by a digit, or `~` marks positional data.
pub fn is_type_definition(line: &str) -> bool {
    let line = line.trim_start();
    let Some(open) = line.find('(') else {
        return false;
    };
    let header = line[..open].trim_end();
    if header.contains(':') || header.contains('<') {
        return true;
    }
    if !is_identifier(header) {
        return false;
    }
    let mut rest = line[open + 1..].trim_start().chars();
    match rest.next() {
        Some(c) if c.is_ascii_digit() || c == '~' => false,
        Some('-') => !rest.next().is_some_and(|c| c.is_ascii_digit()),
        _ => true,
    }
}

// === Headers, fields, constraints, directives ===

#[derive(Debug, PartialEq)]
struct Header<'s> {
    alias: &'s str,
    name: Option<&'s str>,
    parents: Vec<&'s str>,
}

impl<'s> Header<'s> {
    /// `Alias[:TypeName][<Parent[,Parent...]>]`
    fn parse(text: &'s str) -> Result<Self, String> {
        let (head, parents) = match text.find('<') {
            Some(i) => {
                let inner = text[i + 1..]
                    .trim_end()
                    .strip_suffix('>')
                    .ok_or("unclosed `<` in parent list")?;
                let parents: Vec<&str> = split_top_level(inner, ',')
                    .into_iter()
                    .map(str::trim)
                    .collect();
                if let Some(bad) = parents.iter().find(|p| !is_identifier(p)) {
                    return Err(format!("invalid parent alias `{bad}`"));
                }
                (&text[..i], parents)
            }
            None => (text, Vec::new()),
        };
        let (alias, name) = match head.split_once(':') {
            Some((alias, name)) => (alias.trim(), Some(name.trim())),
            None => (head.trim(), None),
        };
        if !is_identifier(alias) {
            return Err(format!("invalid type alias `{alias}`"));
        }
        if let Some(name) = name.filter(|n| !is_identifier(n)) {
            return Err(format!("invalid type name `{name}`"));
        }
        Ok(Header {
            alias,
            name,
            parents,
        })
    }
}

/// The closed set of directives. Names this parser does not know are kept as
/// `Unknown` and only produce a warning.
#[derive(Debug, PartialEq)]
enum Directive<'s> {
    Version(&'s str),
    Mode(&'s str),
    Schema(&'s str),
    Unknown(&'s str),
}

impl<'s> Directive<'s> {
    /// `@name:value`
    fn parse(line: &'s str) -> Option<Self> {
        let (name, value) = line.strip_prefix('@')?.split_once(':')?;
        let (name, value) = (name.trim(), value.trim());
        if !is_identifier(name) {
            return None;
        }
        Some(match name {
            "version" => Directive::Version(value),
            "mode" => Directive::Mode(value),
            "schema" => Directive::Schema(value),
            _ => Directive::Unknown(name),
        })
    }
}

// === Parser ===

/// Import state shared by every nested `@schema` load of a single parse call.
///
/// A path stays in `loading` once its load starts, so an import that re-enters a
/// path still being loaded, or one already loaded through another branch, is
/// treated as satisfied.
pub(crate) struct ImportChain<'l> {
    loader: Option<&'l dyn SchemaLoader>,
    loading: HashSet<String>,
}

impl<'l> ImportChain<'l> {
    pub(crate) fn new(loader: Option<&'l dyn SchemaLoader>) -> Self {
        ImportChain {
            loader,
            loading: HashSet::new(),
        }
    }
}

/// Output accumulated while parsing a schema section and its imports.
#[derive(Default)]
struct SchemaPhase {
    schema: Schema,
    warnings: Vec<Warning>,
    /// Texts of imported schemas by path, kept for resolver diagnostics.
    imported: HashMap<String, String>,
}

/// Parses a MAXI document: schema phase, inheritance resolution, then records.
pub struct Parser<'a> {
    source_text: &'a str,
    name: String,
    mode: Option<Mode>,
    loader: Option<&'a dyn SchemaLoader>,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Self {
        Self::new_with_name(source_text, "source.maxi".to_string())
    }

    pub fn new_with_name(source_text: &'a str, name: String) -> Self {
        Parser {
            source_text,
            name,
            mode: None,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: &'a dyn SchemaLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Mode in effect until a `@mode` directive says otherwise.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn parse_document(&self) -> Result<ParseResult, MaxiError> {
        let src = SourceRef::new(&self.name, self.source_text);
        let sections = split_sections(self.source_text);
        debug!(
            "{}: schema {:?}, records {:?}, separated: {}",
            self.name, sections.schema, sections.records, sections.separated
        );

        let mut phase = SchemaPhase::default();
        if let Some(mode) = self.mode {
            phase.schema.mode = mode;
        }
        let mut chain = ImportChain::new(self.loader);
        let tail = phase.parse_section(
            src,
            sections.schema.clone(),
            None,
            &mut chain,
            !sections.separated,
        )?;
        let records_range = match tail {
            Some(start) => start..sections.schema.end,
            None => sections.records,
        };

        Resolver::with_sources(src, &phase.imported).resolve(&mut phase.schema)?;
        phase.schema.finalize();

        let records = parse_records(&phase.schema, src, records_range, &mut phase.warnings)?;
        Ok(ParseResult {
            schema: phase.schema,
            records,
            warnings: phase.warnings,
        })
    }

    /// Parses and resolves only the schema section, ignoring any records.
    pub fn parse_schema(&self) -> Result<(Schema, Vec<Warning>), MaxiError> {
        let src = SourceRef::new(&self.name, self.source_text);
        let sections = split_sections(self.source_text);
        let range = if sections.separated || !sections.schema.is_empty() {
            sections.schema
        } else {
            sections.records
        };
        let mut phase = SchemaPhase::default();
        if let Some(mode) = self.mode {
            phase.schema.mode = mode;
        }
        let mut chain = ImportChain::new(self.loader);
        phase.parse_section(src, range, None, &mut chain, false)?;
        Resolver::with_sources(src, &phase.imported).resolve(&mut phase.schema)?;
        phase.schema.finalize();
        Ok((phase.schema, phase.warnings))
    }
}

impl SchemaPhase {
    /// Parses the schema lines of `range`.
    ///
    /// With `records_tail` set, the first line that is neither a directive nor a type
    /// definition ends the schema and its offset is returned as the start of the
    /// records; otherwise such a line is a syntax error.
    fn parse_section(
        &mut self,
        src: SourceRef<'_>,
        range: Range<usize>,
        origin: Option<&str>,
        chain: &mut ImportChain<'_>,
        records_tail: bool,
    ) -> Result<Option<usize>, MaxiError> {
        let end = range.end;
        let mut pos = range.start;
        while pos < end {
            let line_end = src.text[pos..end].find('\n').map_or(end, |n| pos + n);
            let raw = &src.text[pos..line_end];
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                pos = line_end + 1;
                continue;
            }
            let start = pos + offset_in(raw, line);

            if line.starts_with('@') {
                self.directive(src, start, line, origin, chain)?;
                pos = line_end + 1;
                continue;
            }

            if !is_type_definition(line) {
                if records_tail {
                    return Ok(Some(start));
                }
                return Err(src.syntax(start, line.len(), "expected a type definition"));
            }

            let def_end = self.type_definition(src, start, end, origin)?;
            let after = src.text[def_end..end].find('\n').map_or(end, |n| def_end + n);
            let trailing = src.text[def_end..after].trim();
            if !trailing.is_empty() && !trailing.starts_with('#') {
                return Err(src.syntax(
                    def_end + offset_in(&src.text[def_end..after], trailing),
                    trailing.len(),
                    "unexpected text after type definition",
                ));
            }
            pos = after + 1;
        }
        Ok(None)
    }

    fn directive(
        &mut self,
        src: SourceRef<'_>,
        start: usize,
        line: &str,
        origin: Option<&str>,
        chain: &mut ImportChain<'_>,
    ) -> Result<(), MaxiError> {
        let directive = Directive::parse(line).ok_or_else(|| {
            src.syntax(start, line.len(), "malformed directive, expected `@name:value`")
        })?;
        let value_at = |value: &str| start + offset_in(line, value);

        match directive {
            Directive::Version(version) => {
                if !semver_re().is_match(version) {
                    return Err(src.syntax(
                        value_at(version),
                        version.len(),
                        format!("invalid version `{version}`, expected MAJOR.MINOR.PATCH"),
                    ));
                }
                if version != SUPPORTED_VERSION {
                    let at = src.at(value_at(version), version.len());
                    return Err(MaxiError::UnsupportedVersion {
                        version: version.to_string(),
                        src: at.src,
                        span: at.span,
                        line: at.line,
                        column: at.column,
                    });
                }
                self.schema.version = version.to_string();
            }
            Directive::Mode(value) => {
                let mode = Mode::parse(value).ok_or_else(|| {
                    src.syntax(
                        value_at(value),
                        value.len(),
                        format!("invalid mode `{value}`, expected `strict` or `lax`"),
                    )
                })?;
                match origin {
                    None => self.schema.mode = mode,
                    Some(path) => debug!("{path}: @mode:{mode} ignored in imported schema"),
                }
            }
            Directive::Schema(raw) => {
                let path = unquote(raw).unwrap_or_else(|| raw.to_string());
                self.import(src, value_at(raw), raw.len(), path, origin, chain)?;
            }
            Directive::Unknown(name) => record_warning(
                &mut self.warnings,
                src.warning(
                    ErrorCode::UnknownDirective,
                    start,
                    format!("Unknown directive `@{name}` ignored"),
                ),
            ),
        }
        Ok(())
    }

    fn import(
        &mut self,
        src: SourceRef<'_>,
        offset: usize,
        len: usize,
        path: String,
        origin: Option<&str>,
        chain: &mut ImportChain<'_>,
    ) -> Result<(), MaxiError> {
        if !self.schema.imports.contains(&path) {
            self.schema.imports.push(path.clone());
        }
        if chain.loading.contains(&path) {
            debug!("schema {path} already loading or loaded, skipped");
            return Ok(());
        }
        let Some(loader) = chain.loader else {
            let at = src.at(offset, len);
            return Err(MaxiError::MissingLoader {
                path,
                src: at.src,
                span: at.span,
                line: at.line,
                column: at.column,
            });
        };
        chain.loading.insert(path.clone());

        debug!("importing schema {path}");
        let text = loader.load(&path).map_err(|cause| match cause.downcast::<MaxiError>() {
            Ok(err) => *err,
            Err(cause) => {
                let at = src.at(offset, len);
                MaxiError::SchemaLoad {
                    path: path.clone(),
                    cause: Arc::from(cause),
                    src: at.src,
                    span: at.span,
                    line: at.line,
                    column: at.column,
                }
            }
        })?;

        let imported = SourceRef::new(&path, &text);
        let sections = split_sections(&text);
        let range = if sections.separated {
            if !sections.records.is_empty() {
                debug!("{path}: records in imported schema ignored");
            }
            sections.schema
        } else {
            trimmed_range(&text, 0..text.len())
        };
        self.parse_section(imported, range, Some(&path), chain, false)?;
        self.imported.insert(path.clone(), text.clone());
        Ok(())
    }

    /// Parses one type definition starting at `start`. Returns the offset just past
    /// its closing paren.
    fn type_definition(
        &mut self,
        src: SourceRef<'_>,
        start: usize,
        end: usize,
        origin: Option<&str>,
    ) -> Result<usize, MaxiError> {
        let text = &src.text[start..end];
        let open = text
            .find('(')
            .ok_or_else(|| src.syntax(start, 1, "expected `(` after type header"))?;
        let header_text = text[..open].trim();
        if let Some(i) = header_text.find(')') {
            return Err(src.syntax(start + i, 1, "unmatched `)` in type header"));
        }
        let close = match_paren(text, open)
            .ok_or_else(|| src.syntax(start + open, 1, "unclosed `(` in type definition"))?;
        let header = Header::parse(header_text)
            .map_err(|message| src.syntax(start, header_text.len(), message))?;

        let body_offset = start + open + 1;
        let fields = self.fields(src, body_offset, &text[open + 1..close])?;

        let type_def = TypeDef {
            alias: header.alias.to_string(),
            name: header.name.map(str::to_string),
            parents: header.parents.iter().map(|p| p.to_string()).collect(),
            fields: fields.clone(),
            declared_fields: fields,
            state: ResolutionState::Unresolved,
            origin: origin.map(str::to_string),
            offset: start,
            line: crate::utils::line_at(src.text, start),
        };
        if let Err(duplicate) = self.schema.insert(type_def) {
            let at = src.at(start, header.alias.len());
            return Err(MaxiError::DuplicateType {
                alias: duplicate.alias,
                src: at.src,
                span: at.span,
                line: at.line,
                column: at.column,
            });
        }
        Ok(start + close + 1)
    }

    fn fields(
        &self,
        src: SourceRef<'_>,
        offset: usize,
        body: &str,
    ) -> Result<Vec<FieldDef>, MaxiError> {
        split_top_level(body, '|')
            .into_iter()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| parse_field(src, offset + offset_in(body, f), f))
            .collect()
    }
}

/// `name[:type[@annotation]][(constraints)][=default]`, with the constraint group
/// and default accepted on either side of the typed segment.
fn parse_field(src: SourceRef<'_>, offset: usize, text: &str) -> Result<FieldDef, MaxiError> {
    let (mut name_seg, mut rest) = match first_top_level_char(text, ':') {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };

    let mut constraints = take_constraint_group(&mut name_seg, &mut rest);

    let mut default: Option<&str> = None;
    if let Some(r) = rest {
        if let Some(i) = first_top_level_char(r, '=') {
            default = Some(&r[i + 1..]);
            rest = Some(&r[..i]);
        }
    }
    if default.is_none() {
        if let Some(i) = first_top_level_char(name_seg, '=') {
            default = Some(&name_seg[i + 1..]);
            name_seg = &name_seg[..i];
        }
    }
    if constraints.is_none() {
        constraints = take_constraint_group(&mut name_seg, &mut rest);
    }

    let name = name_seg.trim();
    if !is_identifier(name) {
        return Err(src.syntax(
            offset,
            text.len(),
            format!("invalid field name `{name}`"),
        ));
    }

    let (type_expr, annotation) = match rest.map(str::trim) {
        Some("") => {
            return Err(src.syntax(offset, text.len(), format!("empty type for field `{name}`")))
        }
        Some(r) => match first_top_level_char(r, '@') {
            Some(i) => (
                Some(r[..i].trim().to_string()),
                Some(r[i + 1..].trim().to_string()).filter(|a| !a.is_empty()),
            ),
            None => (Some(r.to_string()), None),
        },
        None => (None, None),
    };
    if type_expr.as_deref() == Some("") {
        return Err(src.syntax(offset, text.len(), format!("empty type for field `{name}`")));
    }

    let constraints = match constraints {
        Some(inner) => parse_constraints(src, offset + offset_in(text, inner), inner)?,
        None => Vec::new(),
    };
    let default = default.map(str::trim).map(|d| match unquote(d) {
        Some(unescaped) if d.starts_with('"') => FieldDefault::Quoted(unescaped),
        _ => FieldDefault::Raw(d.to_string()),
    });

    Ok(FieldDef {
        name: name.to_string(),
        type_expr,
        annotation,
        constraints,
        default,
    })
}

/// Splits a trailing `(...)` group off the typed segment, or else off the name.
fn take_constraint_group<'t>(name_seg: &mut &'t str, rest: &mut Option<&'t str>) -> Option<&'t str> {
    if let Some((before, inner)) = rest.and_then(|r| extract_trailing_group(r, '(', ')')) {
        *rest = Some(before);
        return Some(inner);
    }
    let (before, inner) = extract_trailing_group(name_seg, '(', ')')?;
    *name_seg = before;
    Some(inner)
}

fn parse_constraints(
    src: SourceRef<'_>,
    offset: usize,
    inner: &str,
) -> Result<Vec<Constraint>, MaxiError> {
    split_top_level(inner, ',')
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| parse_constraint(src, offset + offset_in(inner, c), c))
        .collect()
}

fn parse_constraint(src: SourceRef<'_>, offset: usize, text: &str) -> Result<Constraint, MaxiError> {
    let invalid = |reason: String| {
        let at = src.at(offset, text.len());
        MaxiError::InvalidConstraint {
            constraint: text.to_string(),
            reason,
            src: at.src,
            span: at.span,
            line: at.line,
            column: at.column,
        }
    };

    if text == "!" {
        return Ok(Constraint::Required);
    }
    if text == "id" {
        return Ok(Constraint::Id);
    }
    if let Some(rest) = text.strip_prefix("pattern:") {
        let pattern = unquote_pattern(rest).unwrap_or_else(|| rest.trim().to_string());
        Regex::new(&pattern).map_err(|e| invalid(format!("invalid pattern: {e}")))?;
        return Ok(Constraint::Pattern { pattern });
    }
    if let Some(rest) = text.strip_prefix("mime:") {
        return parse_mime(rest.trim()).map_err(invalid);
    }
    if let Some(digits) = text.strip_prefix('=') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let length = digits
                .parse()
                .map_err(|_| invalid(format!("length `{digits}` out of range")))?;
            return Ok(Constraint::ExactLength { length });
        }
    }
    if let Some((operator, value)) = Comparator::split_prefix(text) {
        let value = value.trim();
        if value.is_empty() {
            return Err(invalid(format!("missing value after `{}`", operator.as_str())));
        }
        let value = match crate::coerce::parse_number(value) {
            Some(_) => value
                .parse::<f64>()
                .map(ConstraintValue::Number)
                .unwrap_or_else(|_| ConstraintValue::Literal(value.to_string())),
            None => ConstraintValue::Literal(value.to_string()),
        };
        return Ok(Constraint::Comparison { operator, value });
    }
    if decimal_precision_re().is_match(text) {
        return Ok(Constraint::DecimalPrecision {
            precision: text.to_string(),
        });
    }

    let at = src.at(offset, text.len());
    Err(MaxiError::UnknownConstraint {
        constraint: text.to_string(),
        src: at.src,
        span: at.span,
        line: at.line,
        column: at.column,
    })
}

/// `mime:TYPE` or `mime:[TYPE,TYPE,...]`, each type optionally quoted.
fn parse_mime(list_text: &str) -> Result<Constraint, String> {
    let items: Vec<&str> = if let Some(list) = list_text.strip_prefix('[') {
        let inner = list
            .strip_suffix(']')
            .ok_or_else(|| "unclosed `[` in mime list".to_string())?;
        split_top_level(inner, ',')
    } else {
        vec![list_text]
    };
    let types = items
        .into_iter()
        .map(|t| unquote(t).unwrap_or_else(|| t.trim().to_string()))
        .collect::<Vec<_>>();
    if types.iter().any(String::is_empty) {
        return Err("empty mime type".to_string());
    }
    Ok(Constraint::Mime { types })
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    fn parse_ok(source: &str) -> ParseResult {
        match Parser::new_with_name(source, "test.maxi".to_string()).parse_document() {
            Ok(result) => result,
            Err(err) => {
                let report = Report::from(err);
                panic!("{:?}", report);
            }
        }
    }

    fn parse_err(source: &str) -> MaxiError {
        match Parser::new_with_name(source, "test.maxi".to_string()).parse_document() {
            Ok(_) => panic!("Expected a MaxiError, but got Ok"),
            Err(err) => err,
        }
    }

    fn field(source: &str) -> FieldDef {
        parse_field(SourceRef::new("t", source), 0, source).unwrap()
    }

    #[test]
    fn test_split_sections_with_separator() {
        let src = "U:User(id)\n  ###  \nU(1)\n";
        let s = split_sections(src);
        assert!(s.separated);
        assert_eq!(&src[s.schema], "U:User(id)");
        assert_eq!(&src[s.records], "U(1)");
    }

    #[test]
    fn test_split_sections_without_separator() {
        let schema_only = split_sections("@mode:strict\nU(id|name)");
        assert!(!schema_only.separated);
        assert!(schema_only.records.is_empty());

        let header_only = split_sections("A<B>(x)");
        assert!(!header_only.schema.is_empty());

        let records_only = split_sections("U(1|a)\nU(2|b)");
        assert!(records_only.schema.is_empty());
        assert_eq!(records_only.records, 0..13);
    }

    #[test]
    fn test_type_definition_predicate() {
        assert!(is_type_definition("U:User(1|2)"));
        assert!(is_type_definition("A<B>(1)"));
        assert!(is_type_definition("U(id|name)"));
        assert!(is_type_definition("U()"));
        assert!(is_type_definition("U(-x)"));
        assert!(!is_type_definition("U(1|Julie)"));
        assert!(!is_type_definition("U( -3|x)"));
        assert!(!is_type_definition("U(~|x)"));
        assert!(!is_type_definition("no parens"));
    }

    #[test]
    fn test_header_grammar() {
        assert_eq!(
            Header::parse("A:Admin<U, Base>").unwrap(),
            Header {
                alias: "A",
                name: Some("Admin"),
                parents: vec!["U", "Base"],
            }
        );
        assert!(Header::parse("1A").is_err());
        assert!(Header::parse("A:<U>").is_err());
        assert!(Header::parse("A<U").is_err());
    }

    #[test]
    fn test_directive_grammar() {
        assert_eq!(Directive::parse("@version:1.0.0"), Some(Directive::Version("1.0.0")));
        assert_eq!(Directive::parse("@ schema : a.maxi"), Some(Directive::Schema("a.maxi")));
        assert_eq!(Directive::parse("@foo:bar"), Some(Directive::Unknown("foo")));
        assert_eq!(Directive::parse("@version"), None);
        assert_eq!(Directive::parse("@:x"), None);
    }

    #[test]
    fn test_field_grammar() {
        let f = field("age:int(>=0,<=120)=18");
        assert_eq!(f.name, "age");
        assert_eq!(f.type_expr.as_deref(), Some("int"));
        assert_eq!(f.constraints.len(), 2);
        assert_eq!(f.default, Some(FieldDefault::Raw("18".into())));

        let f = field("role(!)=guest");
        assert_eq!(f.type_expr, None);
        assert!(f.is_required());
        assert_eq!(f.default, Some(FieldDefault::Raw("guest".into())));

        let f = field("avatar:bytes@base64(mime:[image/png,\"image/jpeg\"])");
        assert_eq!(f.type_expr.as_deref(), Some("bytes"));
        assert_eq!(f.annotation.as_deref(), Some("base64"));
        assert_eq!(
            f.constraints,
            vec![Constraint::Mime {
                types: vec!["image/png".into(), "image/jpeg".into()]
            }]
        );

        let f = field(r#"title:str="a \"b\"""#);
        assert_eq!(f.default, Some(FieldDefault::Quoted("a \"b\"".into())));

        let f = field("email:str(pattern:^[^@]+@[a-z.]{2,}$)");
        assert_eq!(f.type_expr.as_deref(), Some("str"));
        assert!(matches!(&f.constraints[0], Constraint::Pattern { pattern } if pattern == "^[^@]+@[a-z.]{2,}$"));

        let f = field("tags:map<str,int>");
        assert_eq!(f.type_expr.as_deref(), Some("map<str,int>"));
    }

    #[test]
    fn test_constraint_kinds() {
        let f = field("x:str(id,=8,=abc,<10.5,5.2,10:2.,pattern:\"a,b\")");
        assert_eq!(
            f.constraints,
            vec![
                Constraint::Id,
                Constraint::ExactLength { length: 8 },
                Constraint::Comparison {
                    operator: Comparator::Eq,
                    value: ConstraintValue::Literal("abc".into())
                },
                Constraint::Comparison {
                    operator: Comparator::Lt,
                    value: ConstraintValue::Number(10.5)
                },
                Constraint::DecimalPrecision { precision: "5.2".into() },
                Constraint::DecimalPrecision { precision: "10:2.".into() },
                Constraint::Pattern {
                    pattern: "a,b".into()
                },
            ]
        );
    }

    #[test]
    fn test_bad_constraints() {
        let err = parse_err("U:User(x(frobnicate))");
        assert_eq!(err.code(), ErrorCode::UnknownConstraint);
        let err = parse_err("U:User(x(pattern:[a-))");
        assert_eq!(err.code(), ErrorCode::InvalidConstraint);
        let err = parse_err("U:User(x(mime:[a/b))");
        assert_eq!(err.code(), ErrorCode::InvalidConstraint);
    }

    #[test]
    fn test_quoted_pattern_keeps_regex_escapes() {
        let f = field(r#"code:str(pattern:"^\d{2},\d$")"#);
        assert_eq!(
            f.constraints,
            vec![Constraint::Pattern {
                pattern: r"^\d{2},\d$".into()
            }]
        );
        let rendered = f.constraints[0].to_string();
        assert_eq!(rendered, r#"pattern:"^\d{2},\d$""#);
        let again = field(&format!("code:str({rendered})"));
        assert_eq!(again.constraints, f.constraints);
    }

    #[test]
    fn test_lookaround_is_outside_the_pattern_dialect() {
        let err = parse_err(r"U:User(pw(pattern:^(?=.*\d).{8,}$))");
        assert_eq!(err.code(), ErrorCode::InvalidConstraint);
    }

    #[test]
    fn test_multiline_type_definition() {
        let result = parse_ok("U:User(\n  id:int |\n  name(!)\n)\n###\nU(1|a)");
        let user = result.schema.get("U").unwrap();
        assert_eq!(user.fields.len(), 2);
        assert_eq!(user.line, 1);
        assert_eq!(result.records[0].line, 6);
    }

    #[test]
    fn test_unclosed_definition_reports_line() {
        let err = parse_err("A:A(a)\nU:User(\n  id:int\n###\nU(1)");
        assert_eq!(err.code(), ErrorCode::SyntaxError);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_unmatched_paren_in_header() {
        let err = parse_err("U:Us)er(id)\n###\n");
        assert_eq!(err.code(), ErrorCode::SyntaxError);
    }

    #[test]
    fn test_trailing_text_after_definition() {
        let err = parse_err("U:User(id) junk\n###\n");
        assert_eq!(err.code(), ErrorCode::SyntaxError);
        let ok = parse_ok("U:User(id) # trailing comment\n###\n");
        assert_eq!(ok.schema.len(), 1);
    }

    #[test]
    fn test_records_after_unseparated_schema() {
        let result = parse_ok("@mode:lax\nU:User(id:int|name)\nU(1|Julie)\nU(2|Ann)");
        assert_eq!(result.schema.len(), 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[1].values[0], Value::Int(2));
    }

    #[test]
    fn test_schema_line_that_is_not_a_definition() {
        let err = parse_err("U:User(id)\nU(1)\n###\nU(2)");
        assert_eq!(err.code(), ErrorCode::SyntaxError);
        assert_eq!(err.line(), 2);
    }
}
