use crate::ast::{Mode, Record, Schema};
use crate::dump::{self, DumpOptions};
use crate::error::{MaxiError, Warning};
use crate::loader::SchemaLoader;
use crate::parser::Parser;
use crate::serialization::to_value;
use serde::{Serialize, Serializer};

/// The result of a successful parse of a MAXI document.
///
/// Holds the resolved schema, the records in document order and every non-fatal
/// warning. Serializes as the hydrated record data, see [`ParseResult::to_value`].
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub schema: Schema,
    pub records: Vec<Record>,
    pub warnings: Vec<Warning>,
}

impl Serialize for ParseResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.to_value();
        value.serialize(serializer)
    }
}

impl ParseResult {
    /// Hydrates the records into a JSON value: an object mapping each alias to an
    /// array of records keyed by field name.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        to_value(&self.schema, &self.records)
    }

    /// Serializes the hydrated records into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the hydrated records into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }

    /// Records of one alias, in document order.
    pub fn records_of<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| r.alias == alias)
    }

    /// Renders the result back into MAXI text.
    #[must_use]
    pub fn dump(&self) -> String {
        dump::dump(self)
    }
}

/// Settings for [`parse_with`].
#[derive(Clone)]
pub struct ParseOptions<'a> {
    /// Name used in diagnostics.
    pub filename: String,
    /// Mode in effect until a `@mode` directive overrides it.
    pub mode: Option<Mode>,
    /// Resolves `@schema` imports. Required as soon as a document imports anything.
    pub loader: Option<&'a dyn SchemaLoader>,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        ParseOptions {
            filename: "source.maxi".to_string(),
            mode: None,
            loader: None,
        }
    }
}

impl<'a> ParseOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_loader(mut self, loader: &'a dyn SchemaLoader) -> Self {
        self.loader = Some(loader);
        self
    }
}

/// Parses a MAXI source string: schema, inheritance resolution, then records.
///
/// This is the primary entry point. Documents that import schemas need a loader,
/// use [`parse_with`] for those.
///
/// # Arguments
///
/// * `source` - The MAXI text.
/// * `file_name` - The name of the file being parsed (used for error reporting).
///
/// # Errors
///
/// Returns a `MaxiError` on the first fatal problem.
pub fn parse(source: &str, file_name: &str) -> Result<ParseResult, MaxiError> {
    parse_with(source, &ParseOptions::new().with_filename(file_name))
}

/// Parses a MAXI source string with explicit options.
///
/// # Errors
///
/// Returns a `MaxiError` on the first fatal problem.
pub fn parse_with(source: &str, options: &ParseOptions<'_>) -> Result<ParseResult, MaxiError> {
    let mut parser = Parser::new_with_name(source, options.filename.clone());
    if let Some(mode) = options.mode {
        parser = parser.with_mode(mode);
    }
    if let Some(loader) = options.loader {
        parser = parser.with_loader(loader);
    }
    parser.parse_document()
}

/// Renders a parse result back into MAXI text.
#[must_use]
pub fn dump(result: &ParseResult) -> String {
    dump::dump(result)
}

/// Renders plain object data (as `serde_json::Value`) into MAXI text.
///
/// # Errors
///
/// Returns a `MaxiError` if the schema does not parse or the data has an
/// unsupported shape.
pub fn dump_objects(data: &serde_json::Value, options: &DumpOptions<'_>) -> Result<String, MaxiError> {
    dump::dump_objects(data, options)
}

#[cfg(test)]
mod tests {
    use crate::parse;

    #[test]
    fn test_simple_parse_to_json() {
        let source = r#"
        U:User(id:int|name|tags:str[]|score:decimal)
        ###
        U(1|"Julie"|[a,b]|9.5)
    "#;

        let expected_json = serde_json::json!({
            "U": [{"id": 1, "name": "Julie", "tags": ["a", "b"], "score": 9.5}]
        });

        let result = parse(source, "test.maxi").unwrap();
        let json = result.to_json().unwrap();
        let result_json: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(result_json, expected_json);
    }

    #[test]
    fn test_simple_parse_to_yaml() {
        let source = "U:User(id:int|active:bool)\n###\nU(1|true)";

        let expected_yaml = "U:\n- active: true\n  id: 1\n";

        let result = parse(source, "test.maxi").unwrap();
        assert_eq!(result.to_yaml().unwrap(), expected_yaml);
    }

    #[test]
    fn test_records_of() {
        let result = parse("U(id)\nP(id)\n###\nU(1)\nP(2)\nU(3)", "test.maxi").unwrap();
        let ids: Vec<_> = result.records_of("U").map(|r| r.values[0].clone()).collect();
        assert_eq!(ids, vec![1.into(), 3.into()]);
    }
}
