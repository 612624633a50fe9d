use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::{self, Display};

/// The only `@version` value this implementation accepts.
pub const SUPPORTED_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Strict,
    #[default]
    Lax,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Lax => "lax",
        }
    }

    pub fn parse(text: &str) -> Option<Mode> {
        match text {
            "strict" => Some(Mode::Strict),
            "lax" => Some(Mode::Lax),
            _ => None,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Schema ---

/// All type definitions of a document, its own plus everything pulled in by `@schema`.
///
/// Types are keyed by alias in declaration order. The display-name index is built
/// by [`Schema::finalize`] once inheritance has been resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub version: String,
    pub mode: Mode,
    pub imports: Vec<String>,
    pub(crate) types: IndexMap<String, TypeDef>,
    #[serde(skip)]
    names: HashMap<String, String>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema {
            version: SUPPORTED_VERSION.to_string(),
            mode: Mode::default(),
            imports: Vec::new(),
            types: IndexMap::new(),
            names: HashMap::new(),
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.types.contains_key(alias)
    }

    pub fn get(&self, alias: &str) -> Option<&TypeDef> {
        self.types.get(alias)
    }

    pub(crate) fn position(&self, alias: &str) -> Option<usize> {
        self.types.get_index_of(alias)
    }

    /// Adds a type. Hands the definition back if its alias is already taken.
    pub fn insert(&mut self, type_def: TypeDef) -> Result<(), Box<TypeDef>> {
        match self.types.entry(type_def.alias.clone()) {
            Entry::Occupied(_) => Err(Box::new(type_def)),
            Entry::Vacant(slot) => {
                slot.insert(type_def);
                Ok(())
            }
        }
    }

    /// Builds the display-name -> alias index. Called once types are resolved.
    pub fn finalize(&mut self) {
        self.names = self
            .types
            .values()
            .filter_map(|t| t.name.as_ref().map(|n| (n.clone(), t.alias.clone())))
            .collect();
    }

    /// Maps an alias or a display name onto the alias of a known type.
    pub fn resolve_alias<'a>(&'a self, name_or_alias: &'a str) -> Option<&'a str> {
        if self.types.contains_key(name_or_alias) {
            return Some(name_or_alias);
        }
        self.names.get(name_or_alias).map(String::as_str)
    }

    pub fn type_for(&self, name_or_alias: &str) -> Option<&TypeDef> {
        self.resolve_alias(name_or_alias).and_then(|a| self.get(a))
    }

    /// Display name of a type's alias, when it has one.
    pub fn name_of(&self, alias: &str) -> Option<&str> {
        self.get(alias).and_then(|t| t.name.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionState {
    #[default]
    Unresolved,
    Resolving,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDef {
    pub alias: String,
    pub name: Option<String>,
    pub parents: Vec<String>,
    /// Fields as written in this type's own header.
    pub declared_fields: Vec<FieldDef>,
    /// Final field list with inherited fields merged in. Equal to
    /// `declared_fields` until the type is resolved.
    pub fields: Vec<FieldDef>,
    #[serde(skip)]
    pub state: ResolutionState,
    /// Import path the type was loaded from, `None` for the parsed document itself.
    pub origin: Option<String>,
    #[serde(skip)]
    pub(crate) offset: usize,
    pub line: usize,
}

impl TypeDef {
    pub fn new(alias: impl Into<String>) -> Self {
        TypeDef {
            alias: alias.into(),
            name: None,
            parents: Vec::new(),
            declared_fields: Vec::new(),
            fields: Vec::new(),
            state: ResolutionState::Unresolved,
            origin: None,
            offset: 0,
            line: 0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The first identifier field, if the type has one.
    pub fn id_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_identifier())
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ResolutionState::Resolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldDefault {
    /// Written as a double-quoted literal; holds the unescaped text.
    Quoted(String),
    Raw(String),
}

impl FieldDefault {
    pub fn as_str(&self) -> &str {
        match self {
            FieldDefault::Quoted(s) | FieldDefault::Raw(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub type_expr: Option<String>,
    pub annotation: Option<String>,
    pub constraints: Vec<Constraint>,
    pub default: Option<FieldDefault>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_required(&self) -> bool {
        self.constraints.contains(&Constraint::Required)
    }

    pub fn is_identifier(&self) -> bool {
        self.name == "id" || self.constraints.contains(&Constraint::Id)
    }

    /// Type expression with every array suffix and any `map<...>` wrapper removed.
    /// For a map this is the value type.
    pub fn base_type(&self) -> Option<&str> {
        let mut ty = self.type_expr.as_deref()?.trim();
        loop {
            if let Some(stripped) = ty.strip_suffix("[]") {
                ty = stripped.trim_end();
            } else if let Some(value) = map_value_type(ty) {
                ty = value;
            } else {
                return Some(ty);
            }
        }
    }

    /// Type expression with one trailing `[]` removed, when the field is an array.
    pub fn element_type(&self) -> Option<&str> {
        self.type_expr
            .as_deref()
            .and_then(|t| t.trim().strip_suffix("[]"))
            .map(str::trim_end)
    }

    pub fn is_array(&self) -> bool {
        self.element_type().is_some()
    }

    /// Value type of a `map<...>` type expression.
    pub fn map_value_type(&self) -> Option<&str> {
        self.type_expr.as_deref().and_then(|t| map_value_type(t.trim()))
    }

    /// A field carrying only a type expression and the annotation, used to coerce
    /// array elements and map values.
    pub(crate) fn derived(&self, type_expr: &str) -> FieldDef {
        FieldDef {
            name: self.name.clone(),
            type_expr: Some(type_expr.to_string()),
            annotation: self.annotation.clone(),
            constraints: Vec::new(),
            default: None,
        }
    }
}

/// `map<V>` yields `V`, `map<K,V>` yields `V`.
pub fn map_value_type(type_expr: &str) -> Option<&str> {
    let inner = type_expr.strip_prefix("map<")?.strip_suffix('>')?;
    crate::scanner::split_top_level(inner, ',')
        .last()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

// --- Constraints ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparator {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "=")]
    Eq,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Ge => ">=",
            Comparator::Gt => ">",
            Comparator::Le => "<=",
            Comparator::Lt => "<",
            Comparator::Eq => "=",
        }
    }

    /// Strips a leading comparison operator, longest operator first.
    pub fn split_prefix(text: &str) -> Option<(Comparator, &str)> {
        [
            (">=", Comparator::Ge),
            ("<=", Comparator::Le),
            (">", Comparator::Gt),
            ("<", Comparator::Lt),
            ("=", Comparator::Eq),
        ]
        .into_iter()
        .find_map(|(op, cmp)| text.strip_prefix(op).map(|rest| (cmp, rest)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Number(f64),
    Literal(String),
}

impl Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintValue::Number(n) => write!(f, "{n}"),
            ConstraintValue::Literal(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Required,
    Id,
    Comparison {
        operator: Comparator,
        value: ConstraintValue,
    },
    Pattern {
        pattern: String,
    },
    Mime {
        types: Vec<String>,
    },
    ExactLength {
        length: usize,
    },
    DecimalPrecision {
        precision: String,
    },
}

impl Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Required => f.write_str("!"),
            Constraint::Id => f.write_str("id"),
            Constraint::Comparison { operator, value } => {
                write!(f, "{}{value}", operator.as_str())
            }
            Constraint::Pattern { pattern }
                if pattern.contains(|c: char| matches!(c, ',' | '"' | '(' | ')')) =>
            {
                write!(f, "pattern:{}", crate::scanner::quote_pattern(pattern))
            }
            Constraint::Pattern { pattern } => write!(f, "pattern:{pattern}"),
            Constraint::Mime { types } if types.len() == 1 => write!(f, "mime:{}", types[0]),
            Constraint::Mime { types } => write!(f, "mime:[{}]", types.join(",")),
            Constraint::ExactLength { length } => write!(f, "={length}"),
            Constraint::DecimalPrecision { precision } => f.write_str(precision),
        }
    }
}

// --- Records ---

/// A coerced record value.
///
/// `Map` comes from `{k:v}` syntax (a repeated key keeps its first position and
/// its last value), `Object` from an inline `(...)` value matched to
/// a known type (keyed by field name) and `Tuple` from an inline value whose type
/// could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(IndexMap<String, Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a key of a `Map` or a field of an `Object`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) | Value::Object(entries) => entries.get(key),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Decimal(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) | Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub alias: String,
    pub values: Vec<Value>,
    pub line: usize,
}

impl Record {
    /// Value of a named field, looked up through the record's type.
    pub fn get<'a>(&'a self, schema: &Schema, field: &str) -> Option<&'a Value> {
        let type_def = schema.get(&self.alias)?;
        let index = type_def.fields.iter().position(|f| f.name == field)?;
        self.values.get(index)
    }
}
