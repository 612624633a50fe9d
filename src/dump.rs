//! Rendering of parsed documents and plain object data back into MAXI text.

use crate::api::ParseResult;
use crate::ast::*;
use crate::coerce::Coercer;
use crate::error::{MaxiError, SourceRef};
use crate::loader::SchemaLoader;
use crate::parser::Parser;
use crate::scanner::escape;
use indexmap::IndexMap;
use log::debug;
use serde_json::{Map, Value as Json};
use std::collections::{HashSet, VecDeque};

/// Settings for [`dump_objects`].
#[derive(Clone)]
pub struct DumpOptions<'a> {
    /// Alias of the top-level objects. Without it the input must be a map of
    /// alias to objects.
    pub alias: Option<String>,
    /// Inline schema text, one type definition per line.
    pub schema: Option<String>,
    /// Schema paths emitted as `@schema` directives and loaded through `loader`.
    pub imports: Vec<String>,
    pub loader: Option<&'a dyn SchemaLoader>,
    /// Emit type headers for the inline schema.
    pub include_types: bool,
    /// Pull nested identified objects out into their own records.
    pub promote_references: bool,
    pub mode: Mode,
    pub version: String,
}

impl Default for DumpOptions<'_> {
    fn default() -> Self {
        DumpOptions {
            alias: None,
            schema: None,
            imports: Vec::new(),
            loader: None,
            include_types: true,
            promote_references: true,
            mode: Mode::default(),
            version: SUPPORTED_VERSION.to_string(),
        }
    }
}

impl<'a> DumpOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_import(mut self, path: impl Into<String>) -> Self {
        self.imports.push(path.into());
        self
    }

    pub fn with_loader(mut self, loader: &'a dyn SchemaLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn include_types(mut self, include: bool) -> Self {
        self.include_types = include;
        self
    }

    pub fn promote_references(mut self, promote: bool) -> Self {
        self.promote_references = promote;
        self
    }
}

/// Renders a parse result: directives, the document's own type headers, `###`,
/// then one line per record.
pub fn dump(result: &ParseResult) -> String {
    let schema = &result.schema;
    let mut out = preamble(&schema.version, schema.mode, &schema.imports);
    out.extend(
        schema
            .types()
            .filter(|t| t.origin.is_none())
            .map(render_header),
    );

    let mut renderer = Renderer::new(schema, false);
    let records: Vec<String> = result
        .records
        .iter()
        .map(|record| renderer.record(record))
        .collect();
    finish(out, records)
}

/// Renders plain object data against a schema.
///
/// Accepted shapes: a single object or an array of objects together with
/// [`DumpOptions::alias`], or an object mapping each alias to an object or an
/// array of objects.
pub fn dump_objects(data: &Json, options: &DumpOptions<'_>) -> Result<String, MaxiError> {
    let schema = build_schema(options)?;
    // Records grouped by alias in first-seen order.
    let mut buckets: IndexMap<String, Vec<&Map<String, Json>>> = IndexMap::new();
    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();

    for (alias, object) in top_level(data, options.alias.as_deref())? {
        if schema.get(alias).is_none() {
            return Err(input_error(format!("unknown type alias `{alias}`")));
        }
        seen.insert(object as *const Map<String, Json>);
        buckets.entry(alias.to_string()).or_default().push(object);
        queue.push_back((alias.to_string(), object));
    }

    if options.promote_references {
        while let Some((alias, object)) = queue.pop_front() {
            let Some(type_def) = schema.get(&alias) else {
                continue;
            };
            for field in &type_def.fields {
                let Some(target) = field.base_type().and_then(|t| schema.type_for(t)) else {
                    continue;
                };
                let Some(id) = target.id_field() else {
                    continue;
                };
                let mut nested = Vec::new();
                if let Some(value) = object.get(&field.name) {
                    nested_objects(value, field, &mut nested);
                }
                for map in nested {
                    let has_id = map.get(&id.name).is_some_and(|v| !v.is_null());
                    if has_id && seen.insert(map as *const Map<String, Json>) {
                        buckets.entry(target.alias.clone()).or_default().push(map);
                        queue.push_back((target.alias.clone(), map));
                    }
                }
            }
        }
    }

    let mut out = preamble(&options.version, options.mode, &options.imports);
    if options.include_types {
        out.extend(
            schema
                .types()
                .filter(|t| t.origin.is_none())
                .map(render_header),
        );
    }

    let mut renderer = Renderer::new(&schema, options.promote_references);
    let mut records = Vec::new();
    for (alias, objects) in &buckets {
        let Some(type_def) = schema.get(alias) else {
            continue;
        };
        for object in objects {
            records.push(format!("{alias}({})", renderer.object_fields(type_def, object)));
        }
    }
    debug!("dumped {} records of {} types", records.len(), buckets.len());
    Ok(finish(out, records))
}

/// Objects reachable from a field value by following the field's type expression:
/// map values for `map<...>`, elements for arrays, the value itself otherwise.
fn nested_objects<'d>(value: &'d Json, field: &FieldDef, out: &mut Vec<&'d Map<String, Json>>) {
    match value {
        Json::Object(map) => match field.map_value_type() {
            Some(ty) => {
                let value_field = field.derived(ty);
                for v in map.values() {
                    nested_objects(v, &value_field, out);
                }
            }
            None => out.push(map),
        },
        Json::Array(items) => {
            let element = field.element_type().map(|ty| field.derived(ty));
            for item in items {
                nested_objects(item, element.as_ref().unwrap_or(field), out);
            }
        }
        _ => {}
    }
}

fn build_schema(options: &DumpOptions<'_>) -> Result<Schema, MaxiError> {
    let mut text = String::new();
    for path in &options.imports {
        text.push_str("@schema:");
        text.push_str(&quote_if_needed(path));
        text.push('\n');
    }
    if let Some(schema) = &options.schema {
        text.push_str(schema);
        text.push('\n');
    }
    text.push_str("###\n");

    let mut parser = Parser::new_with_name(&text, "dump schema".to_string()).with_mode(options.mode);
    if let Some(loader) = options.loader {
        parser = parser.with_loader(loader);
    }
    let (schema, _) = parser.parse_schema()?;
    Ok(schema)
}

fn top_level<'d>(
    data: &'d Json,
    alias: Option<&'d str>,
) -> Result<Vec<(&'d str, &'d Map<String, Json>)>, MaxiError> {
    match (alias, data) {
        (Some(alias), data) => objects_of(alias, data),
        (None, Json::Object(groups)) => {
            let mut all = Vec::new();
            for (alias, value) in groups {
                all.extend(objects_of(alias, value)?);
            }
            Ok(all)
        }
        (None, _) => Err(input_error(
            "an alias is required unless the input maps aliases to objects",
        )),
    }
}

fn objects_of<'d>(
    alias: &'d str,
    value: &'d Json,
) -> Result<Vec<(&'d str, &'d Map<String, Json>)>, MaxiError> {
    let not_objects = || input_error(format!("records of `{alias}` must be objects"));
    match value {
        Json::Object(map) => Ok(vec![(alias, map)]),
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_object().map(|map| (alias, map)).ok_or_else(not_objects))
            .collect(),
        _ => Err(not_objects()),
    }
}

fn input_error(message: impl Into<String>) -> MaxiError {
    let at = SourceRef::new("dump input", "").at(0, 0);
    MaxiError::InvalidInput {
        message: message.into(),
        src: at.src,
        span: at.span,
        line: at.line,
        column: at.column,
    }
}

fn preamble(version: &str, mode: Mode, imports: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    if version != SUPPORTED_VERSION {
        lines.push(format!("@version:{version}"));
    }
    if mode == Mode::Strict {
        lines.push("@mode:strict".to_string());
    }
    lines.extend(imports.iter().map(|p| format!("@schema:{}", quote_if_needed(p))));
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn finish(mut out: Vec<String>, records: Vec<String>) -> String {
    if !out.is_empty() {
        out.push("###".to_string());
    }
    out.extend(records);
    out.join("\n")
}

fn render_header(type_def: &TypeDef) -> String {
    let mut header = type_def.alias.clone();
    if let Some(name) = &type_def.name {
        header.push(':');
        header.push_str(name);
    }
    if !type_def.parents.is_empty() {
        header.push('<');
        header.push_str(&type_def.parents.join(","));
        header.push('>');
    }
    let fields: Vec<String> = type_def.declared_fields.iter().map(render_field).collect();
    format!("{header}({})", fields.join("|"))
}

fn render_field(field: &FieldDef) -> String {
    let mut out = field.name.clone();
    if let Some(ty) = &field.type_expr {
        out.push(':');
        out.push_str(ty);
        if let Some(annotation) = &field.annotation {
            out.push('@');
            out.push_str(annotation);
        }
    }
    if !field.constraints.is_empty() {
        let constraints: Vec<String> = field.constraints.iter().map(|c| c.to_string()).collect();
        out.push('(');
        out.push_str(&constraints.join(","));
        out.push(')');
    }
    match &field.default {
        Some(FieldDefault::Quoted(s)) => out.push_str(&format!("=\"{}\"", escape(s))),
        Some(FieldDefault::Raw(s)) => {
            out.push('=');
            out.push_str(s);
        }
        None => {}
    }
    out
}

fn has_special(s: &str) -> bool {
    s.starts_with('"')
        || s.chars().any(|c| {
            c.is_whitespace() || matches!(c, '|' | '(' | ')' | '[' | ']' | '{' | '}' | '~' | ',' | ':' | '\\')
        })
}

fn quote_if_needed(s: &str) -> String {
    if s.is_empty() || has_special(s) {
        format!("\"{}\"", escape(s))
    } else {
        s.to_string()
    }
}

struct Renderer<'s> {
    schema: &'s Schema,
    promote: bool,
    scratch: Vec<crate::error::Warning>,
}

impl<'s> Renderer<'s> {
    fn new(schema: &'s Schema, promote: bool) -> Self {
        Renderer {
            schema,
            promote,
            scratch: Vec::new(),
        }
    }

    /// A string is written bare only when reading it back yields the same string.
    fn string(&mut self, s: &str, field: Option<&FieldDef>) -> String {
        if s.is_empty() || has_special(s) {
            return format!("\"{}\"", escape(s));
        }
        let reread = Coercer::standalone(self.schema, &mut self.scratch).coerce(s, field);
        self.scratch.clear();
        match reread {
            Ok(Value::String(back)) if back == s => s.to_string(),
            _ => format!("\"{}\"", escape(s)),
        }
    }

    fn target(&self, field: Option<&FieldDef>) -> Option<&'s TypeDef> {
        let schema = self.schema;
        field
            .and_then(FieldDef::base_type)
            .and_then(|t| schema.type_for(t))
    }

    fn element(field: Option<&FieldDef>) -> Option<FieldDef> {
        field.and_then(|f| f.element_type().map(|ty| f.derived(ty)))
    }

    // --- parsed values ---

    fn record(&mut self, record: &Record) -> String {
        let schema = self.schema;
        let fields = schema.get(&record.alias).map(|t| t.fields.as_slice());
        let parts = record
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| self.value(v, fields.and_then(|f| f.get(i))))
            .collect();
        format!("{}({})", record.alias, join_trimmed(parts))
    }

    fn value(&mut self, value: &Value, field: Option<&FieldDef>) -> String {
        match value {
            Value::Null => "~".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Decimal(n) => render_decimal(*n),
            Value::String(s) => self.string(s, field),
            Value::Array(items) => {
                let element = Self::element(field);
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.value(item, element.as_ref()))
                    .collect();
                format!("[{}]", parts.join(","))
            }
            Value::Map(entries) => {
                let value_field = field.and_then(|f| f.map_value_type().map(|ty| f.derived(ty)));
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}:{}", quote_if_needed(k), self.value(v, value_field.as_ref())))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
            Value::Object(entries) => match self.target(field) {
                Some(type_def) => {
                    let parts = type_def
                        .fields
                        .iter()
                        .map(|f| match entries.get(&f.name) {
                            Some(v) => self.value(v, Some(f)),
                            None => String::new(),
                        })
                        .collect();
                    format!("({})", join_trimmed(parts))
                }
                None => {
                    let parts = entries.iter().map(|(_, v)| self.value(v, None)).collect();
                    format!("({})", join_trimmed(parts))
                }
            },
            Value::Tuple(items) => {
                let parts = items.iter().map(|v| self.value(v, None)).collect();
                format!("({})", join_trimmed(parts))
            }
        }
    }

    // --- plain object data ---

    fn object_fields(&mut self, type_def: &TypeDef, object: &Map<String, Json>) -> String {
        let parts = type_def
            .fields
            .iter()
            .map(|f| match object.get(&f.name) {
                Some(v) => self.json(v, Some(f)),
                None => String::new(),
            })
            .collect();
        join_trimmed(parts)
    }

    fn json(&mut self, value: &Json, field: Option<&FieldDef>) -> String {
        match value {
            Json::Null => "~".to_string(),
            Json::Bool(b) => b.to_string(),
            Json::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => render_decimal(f),
                _ => n.to_string(),
            },
            Json::String(s) => self.string(s, field),
            Json::Array(items) => {
                let element = Self::element(field);
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.json(item, element.as_ref()))
                    .collect();
                format!("[{}]", parts.join(","))
            }
            Json::Object(map) => {
                let map_value = field.and_then(|f| f.map_value_type().map(|ty| f.derived(ty)));
                match (map_value, self.target(field)) {
                    (None, Some(type_def)) => {
                        if self.promote {
                            let id = type_def
                                .id_field()
                                .and_then(|id| map.get(&id.name).map(|v| (id, v)))
                                .filter(|(_, v)| !v.is_null());
                            if let Some((id, value)) = id {
                                return self.json(value, Some(id));
                            }
                        }
                        format!("({})", self.object_fields(type_def, map))
                    }
                    (value_field, _) => {
                        let parts: Vec<String> = map
                            .iter()
                            .map(|(k, v)| {
                                format!("{}:{}", quote_if_needed(k), self.json(v, value_field.as_ref()))
                            })
                            .collect();
                        format!("{{{}}}", parts.join(","))
                    }
                }
            }
        }
    }
}

/// Joins values with `|` after dropping the trailing run of empty ones.
fn join_trimmed(mut parts: Vec<String>) -> String {
    while parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    parts.join("|")
}

/// Decimals always keep a fractional part so they read back as decimals.
fn render_decimal(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}
