//! Type-directed conversion of raw record tokens into [`Value`]s.

use crate::ast::{FieldDef, FieldDefault, Mode, Schema, TypeDef, Value};
use crate::error::{record_warning, ErrorCode, MaxiError, SourceRef, Warning};
use crate::scanner::{first_top_level_char, split_top_level, unescape, unquote};
use indexmap::IndexMap;

/// Splits positional record content on `|`.
///
/// Content without quotes, brackets or escapes takes a plain split.
pub fn split_values(content: &str) -> Vec<&str> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    if content.contains(|c: char| "\"()[]{}\\".contains(c)) {
        split_top_level(content, '|')
    } else {
        content.split('|').collect()
    }
}

/// `-?\d+`
pub fn is_int_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Number for `-?\d+`, `-?\d+\.\d+` and `-?\d+\.`. The last form yields an integer.
pub fn parse_number(text: &str) -> Option<Value> {
    if is_int_literal(text) {
        return Some(parse_int(text));
    }
    let (whole, frac) = text.split_once('.')?;
    if !is_int_literal(whole) {
        return None;
    }
    if frac.is_empty() {
        return Some(parse_int(whole));
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok().map(Value::Decimal)
}

fn parse_int(text: &str) -> Value {
    match text.parse::<i64>() {
        Ok(n) => Value::Int(n),
        Err(_) => text
            .parse::<f64>()
            .map(Value::Decimal)
            .unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

fn is_base64_alphabet(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

enum Slot<'t> {
    Token(&'t str),
    Value(Value),
}

/// Coerces the values of one record, including everything nested inside it.
pub struct Coercer<'a, 'w> {
    schema: &'a Schema,
    mode: Mode,
    src: SourceRef<'a>,
    offset: usize,
    len: usize,
    line: usize,
    warnings: &'w mut Vec<Warning>,
}

impl<'a, 'w> Coercer<'a, 'w> {
    pub(crate) fn new(
        schema: &'a Schema,
        src: SourceRef<'a>,
        offset: usize,
        len: usize,
        line: usize,
        warnings: &'w mut Vec<Warning>,
    ) -> Self {
        Coercer {
            schema,
            mode: schema.mode,
            src,
            offset,
            len,
            line,
            warnings,
        }
    }

    /// Coercer detached from any source text, for coercing standalone tokens.
    pub fn standalone(schema: &'a Schema, warnings: &'w mut Vec<Warning>) -> Self {
        Self::new(schema, SourceRef::new("value", ""), 0, 0, 0, warnings)
    }

    /// Coerces one token against an optional field definition.
    pub fn coerce(&mut self, token: &str, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        let token = token.trim();
        if token.is_empty() {
            return self.default_for(field);
        }
        self.coerce_present(token, field)
    }

    fn coerce_present(&mut self, t: &str, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        if t == "~" {
            return Ok(Value::Null);
        }
        let wrapped = |open: char, close: char| t.len() >= 2 && t.starts_with(open) && t.ends_with(close);
        if wrapped('[', ']') {
            return self.array(&t[1..t.len() - 1], field);
        }
        if wrapped('{', '}') {
            return self.map(&t[1..t.len() - 1], field);
        }
        if wrapped('(', ')') {
            return self.inline_object(&t[1..t.len() - 1], field);
        }
        if wrapped('"', '"') {
            return Ok(Value::String(unescape(&t[1..t.len() - 1])));
        }
        Ok(self.scalar(t, field))
    }

    fn default_for(&mut self, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        let Some(field) = field else {
            return Ok(Value::Null);
        };
        match &field.default {
            None => Ok(Value::Null),
            Some(FieldDefault::Quoted(s)) => Ok(Value::String(s.clone())),
            Some(FieldDefault::Raw(raw)) => {
                let raw = raw.trim();
                if raw == "~" {
                    Ok(Value::Null)
                } else if field.type_expr.is_none() || raw.is_empty() {
                    Ok(Value::String(raw.to_string()))
                } else {
                    self.coerce_present(raw, Some(field))
                }
            }
        }
    }

    fn array(&mut self, inner: &str, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        if inner.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let element = field.and_then(|f| f.element_type().map(|ty| f.derived(ty)));
        split_top_level(inner, ',')
            .into_iter()
            .map(|item| self.coerce(item, element.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn map(&mut self, inner: &str, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        let value_field = field.and_then(|f| f.map_value_type().map(|ty| f.derived(ty)));
        let mut entries = IndexMap::new();
        for entry in split_top_level(inner, ',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (key, raw) = match first_top_level_char(entry, ':') {
                Some(i) => (&entry[..i], &entry[i + 1..]),
                None => (entry, ""),
            };
            let key = unquote(key).unwrap_or_else(|| key.trim().to_string());
            let value = self.coerce(raw, value_field.as_ref())?;
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    }

    fn inline_object(&mut self, inner: &str, field: Option<&FieldDef>) -> Result<Value, MaxiError> {
        let schema = self.schema;
        let target = field
            .and_then(FieldDef::base_type)
            .and_then(|name| schema.type_for(name));
        match target {
            Some(type_def) => {
                let values = self.coerce_positional(type_def, inner)?;
                Ok(Value::Object(
                    type_def
                        .fields
                        .iter()
                        .map(|f| f.name.clone())
                        .zip(values)
                        .collect(),
                ))
            }
            None => self.coerce_untyped(inner).map(Value::Tuple),
        }
    }

    fn scalar(&self, t: &str, field: Option<&FieldDef>) -> Value {
        let Some(field) = field else {
            return self.guess(t);
        };
        let Some(base) = field.base_type() else {
            return self.guess(t);
        };
        if let Some(target) = self.schema.type_for(base) {
            // A bare token in a field typed as another type is a reference by id.
            return match target.id_field() {
                Some(id) => match id.base_type() {
                    Some(id_ty) if self.schema.type_for(id_ty).is_none() => {
                        self.builtin(t, id_ty, id.annotation.as_deref())
                    }
                    Some(_) => Value::String(t.to_string()),
                    None => self.guess(t),
                },
                None => Value::String(t.to_string()),
            };
        }
        self.builtin(t, base, field.annotation.as_deref())
    }

    fn builtin(&self, t: &str, base: &str, annotation: Option<&str>) -> Value {
        match base {
            "bool" | "boolean" => match t {
                "1" | "true" => Value::Bool(true),
                "0" | "false" => Value::Bool(false),
                _ => Value::String(t.to_string()),
            },
            "int" | "integer" if is_int_literal(t) => parse_int(t),
            "decimal" | "float" | "number" => {
                parse_number(t).unwrap_or_else(|| Value::String(t.to_string()))
            }
            "bytes"
                if self.mode == Mode::Lax
                    && annotation == Some("base64")
                    && is_base64_alphabet(t)
                    && t.len() % 4 != 0 =>
            {
                let mut padded = t.to_string();
                while padded.len() % 4 != 0 {
                    padded.push('=');
                }
                Value::String(padded)
            }
            _ => Value::String(t.to_string()),
        }
    }

    /// Untyped tokens are only read as numbers in lax mode.
    fn guess(&self, t: &str) -> Value {
        match self.mode {
            Mode::Lax => parse_number(t).unwrap_or_else(|| Value::String(t.to_string())),
            Mode::Strict => Value::String(t.to_string()),
        }
    }

    /// Coerces `|`-separated content against a type's fields by position, applying
    /// discriminator inference, count checks and default back-fill.
    pub fn coerce_positional(
        &mut self,
        type_def: &TypeDef,
        content: &str,
    ) -> Result<Vec<Value>, MaxiError> {
        let fields = &type_def.fields;
        let mut slots: Vec<Slot<'_>> = split_values(content).into_iter().map(Slot::Token).collect();

        if self.mode == Mode::Lax && slots.len() + 1 == fields.len() {
            if let Some(pos) = fields.iter().position(|f| f.name == "type") {
                let value = match &fields[pos].default {
                    Some(_) => self.default_for(Some(&fields[pos]))?,
                    None => Value::String(
                        type_def
                            .name
                            .as_deref()
                            .unwrap_or(&type_def.alias)
                            .to_lowercase(),
                    ),
                };
                slots.insert(pos, Slot::Value(value));
            }
        }

        if self.mode == Mode::Strict {
            if slots.len() > fields.len() {
                let at = self.src.at(self.offset, self.len);
                return Err(MaxiError::SchemaMismatch {
                    alias: type_def.alias.clone(),
                    expected: fields.len(),
                    found: slots.len(),
                    src: at.src,
                    span: at.span,
                    line: at.line,
                    column: at.column,
                });
            }
            if let Some(missing) = fields
                .iter()
                .skip(slots.len())
                .find(|f| f.default.is_none() && f.is_required())
            {
                return Err(self.missing_required(type_def, missing));
            }
        }

        let mut slots = slots.into_iter();
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let value = match slots.next() {
                Some(Slot::Value(value)) => value,
                Some(Slot::Token(token)) => self.coerce(token, Some(field))?,
                None => self.default_for(Some(field))?,
            };
            if value.is_null() && field.is_required() {
                match self.mode {
                    Mode::Strict => return Err(self.missing_required(type_def, field)),
                    Mode::Lax => record_warning(
                        self.warnings,
                        Warning {
                            code: ErrorCode::MissingRequiredField,
                            message: format!(
                                "Required field `{}` of `{}` is null",
                                field.name, type_def.alias
                            ),
                            line: Some(self.line),
                            filename: Some(self.src.name.to_string()),
                        },
                    ),
                }
            }
            values.push(value);
        }
        Ok(values)
    }

    /// Coerces content without any field schema.
    pub fn coerce_untyped(&mut self, content: &str) -> Result<Vec<Value>, MaxiError> {
        split_values(content)
            .into_iter()
            .map(|token| self.coerce(token, None))
            .collect()
    }

    fn missing_required(&self, type_def: &TypeDef, field: &FieldDef) -> MaxiError {
        let at = self.src.at(self.offset, self.len);
        MaxiError::MissingRequiredField {
            alias: type_def.alias.clone(),
            field: field.name.clone(),
            src: at.src,
            span: at.span,
            line: at.line,
            column: at.column,
        }
    }
}
