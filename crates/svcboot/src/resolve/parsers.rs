//! Config-file parsers.
//!
//! A parser reads a whole document and reports every `(key, value)` pair it
//! finds through the setter. Keys are flag long names. Any function with the
//! right shape is a parser, so applications can plug in their own formats.

use std::io::{BufRead, BufReader, Read};

use super::errors::ConfigFileError;

/// Callback receiving one discovered key/value pair.
pub type Setter<'a> = dyn FnMut(&str, &str) -> Result<(), ConfigFileError> + 'a;

/// Pluggable config-file format.
pub trait ConfigFileParser: Send + Sync {
    /// Reads `reader` to the end, calling `set` once per pair.
    ///
    /// # Errors
    ///
    /// Returns the first I/O, syntax or setter error.
    fn parse(&self, reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError>;
}

impl<F> ConfigFileParser for F
where
    F: Fn(&mut dyn Read, &mut Setter<'_>) -> Result<(), ConfigFileError> + Send + Sync,
{
    fn parse(&self, reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
        self(reader, set)
    }
}

/// `name value` per line; a bare name means `true`.
///
/// # Errors
///
/// Returns I/O failures and setter errors.
pub fn plain(reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    line_pairs(reader, ' ', set, |name| name.trim_start_matches('-').to_owned())
}

/// `KEY=value` per line; keys are lower-cased with `_` mapped to `-`.
///
/// # Errors
///
/// Returns I/O failures and setter errors.
pub fn dotenv(reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    line_pairs(reader, '=', set, |name| {
        name.trim().replace('_', "-").to_lowercase()
    })
}

fn line_pairs(
    reader: &mut dyn Read,
    separator: char,
    set: &mut Setter<'_>,
    normalise: impl Fn(&str) -> String,
) -> Result<(), ConfigFileError> {
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = match line.split_once(separator) {
            Some((name, value)) => (name, value.trim()),
            None => (line, "true"),
        };
        let value = value
            .find(" #")
            .map_or(value, |index| value.get(..index).unwrap_or(value).trim());
        set(&normalise(name), value)?;
    }
    Ok(())
}

/// YAML mapping; nested mappings are flattened with `.`.
///
/// # Errors
///
/// Returns I/O failures, YAML syntax errors, a non-mapping document, and
/// setter errors.
pub fn yaml(reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let document: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|error| ConfigFileError::Syntax {
            format: "YAML",
            message: error.to_string(),
        })?;
    match document {
        serde_yaml::Value::Null => Ok(()),
        serde_yaml::Value::Mapping(mapping) => walk_yaml_mapping("", &mapping, set),
        _ => Err(ConfigFileError::Syntax {
            format: "YAML",
            message: "top-level document must be a mapping".to_owned(),
        }),
    }
}

fn walk_yaml_mapping(
    prefix: &str,
    mapping: &serde_yaml::Mapping,
    set: &mut Setter<'_>,
) -> Result<(), ConfigFileError> {
    for (key, value) in mapping {
        let Some(key) = yaml_scalar(key) else {
            return Err(ConfigFileError::Syntax {
                format: "YAML",
                message: "mapping keys must be scalars".to_owned(),
            });
        };
        walk_yaml(&join_key(prefix, &key), value, set)?;
    }
    Ok(())
}

fn walk_yaml(key: &str, value: &serde_yaml::Value, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    match value {
        serde_yaml::Value::Null => Ok(()),
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                walk_yaml(key, item, set)?;
            }
            Ok(())
        }
        serde_yaml::Value::Mapping(mapping) => walk_yaml_mapping(key, mapping, set),
        serde_yaml::Value::Tagged(tagged) => walk_yaml(key, &tagged.value, set),
        scalar => match yaml_scalar(scalar) {
            Some(text) => set(key, &text),
            None => Ok(()),
        },
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

/// TOML document; tables are flattened with `.`.
///
/// # Errors
///
/// Returns I/O failures, TOML syntax errors, and setter errors.
pub fn toml(reader: &mut dyn Read, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let table: ::toml::Table = text.parse().map_err(|error: ::toml::de::Error| {
        ConfigFileError::Syntax {
            format: "TOML",
            message: error.message().to_owned(),
        }
    })?;
    walk_toml_table("", &table, set)
}

fn walk_toml_table(prefix: &str, table: &::toml::Table, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    for (key, value) in table {
        walk_toml(&join_key(prefix, key), value, set)?;
    }
    Ok(())
}

fn walk_toml(key: &str, value: &::toml::Value, set: &mut Setter<'_>) -> Result<(), ConfigFileError> {
    match value {
        ::toml::Value::String(text) => set(key, text),
        ::toml::Value::Integer(number) => set(key, &number.to_string()),
        ::toml::Value::Float(number) => set(key, &number.to_string()),
        ::toml::Value::Boolean(flag) => set(key, &flag.to_string()),
        ::toml::Value::Datetime(moment) => set(key, &moment.to_string()),
        ::toml::Value::Array(items) => {
            for item in items {
                walk_toml(key, item, set)?;
            }
            Ok(())
        }
        ::toml::Value::Table(table) => walk_toml_table(key, table, set),
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn collect(parser: &dyn ConfigFileParser, input: &str) -> Result<Vec<(String, String)>, ConfigFileError> {
        let mut pairs = Vec::new();
        let mut reader = input.as_bytes();
        parser.parse(&mut reader, &mut |key, value| {
            pairs.push((key.to_owned(), value.to_owned()));
            Ok(())
        })?;
        Ok(pairs)
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn plain_reads_names_values_and_bare_switches() {
        let input = "# comment\n\n--port 9090\nverbose\nname  a b # trailing\n";
        let found = collect(&plain, input).expect("parse plain");
        assert_eq!(
            found,
            pairs(&[("port", "9090"), ("verbose", "true"), ("name", "a b")])
        );
    }

    #[test]
    fn dotenv_normalises_keys() {
        let input = "LOG_LEVEL=debug\nDAEMON\n# skipped\nPORT = 80 # note\n";
        let found = collect(&dotenv, input).expect("parse dotenv");
        assert_eq!(
            found,
            pairs(&[("log-level", "debug"), ("daemon", "true"), ("port", "80")])
        );
    }

    #[test]
    fn yaml_flattens_nested_mappings_and_sequences() {
        let input = "port: 9090\ndb:\n  host: local\n  pool: 4\ntags: [a, b]\nunset: null\ndebug: true\n";
        let found = collect(&yaml, input).expect("parse yaml");
        assert_eq!(
            found,
            pairs(&[
                ("port", "9090"),
                ("db.host", "local"),
                ("db.pool", "4"),
                ("tags", "a"),
                ("tags", "b"),
                ("debug", "true"),
            ])
        );
    }

    #[test]
    fn toml_flattens_tables_and_arrays() {
        let input = "port = 9090\ntags = [\"a\", \"b\"]\n[db]\nhost = \"local\"\n";
        let mut found = collect(&toml, input).expect("parse toml");
        found.sort();
        assert_eq!(
            found,
            pairs(&[("db.host", "local"), ("port", "9090"), ("tags", "a"), ("tags", "b")])
        );
    }

    #[rstest]
    #[case::yaml_scalar_document(&yaml as &dyn ConfigFileParser, "just text")]
    #[case::yaml_broken(&yaml as &dyn ConfigFileParser, "port: [unclosed")]
    #[case::toml_broken(&toml as &dyn ConfigFileParser, "port = ")]
    fn structured_parsers_reject_invalid_documents(
        #[case] parser: &dyn ConfigFileParser,
        #[case] input: &str,
    ) {
        let error = collect(parser, input).expect_err("document should be rejected");
        assert!(matches!(error, ConfigFileError::Syntax { .. }), "{error:?}");
    }

    #[test]
    fn setter_errors_stop_parsing() {
        let mut seen = 0;
        let mut reader = "a 1\nb 2\n".as_bytes();
        let error = plain(&mut reader, &mut |key, _| {
            seen += 1;
            Err(ConfigFileError::UndefinedKey { key: key.to_owned() })
        })
        .expect_err("setter failure should propagate");
        assert!(matches!(error, ConfigFileError::UndefinedKey { ref key } if key == "a"));
        assert_eq!(seen, 1);
    }

    #[test]
    fn empty_yaml_document_sets_nothing() {
        assert!(collect(&yaml, "").expect("parse empty").is_empty());
    }
}
