/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Tech configuration and its option types.
 */

//! Configuration of the stylesheet tech.
//!
//! [`TechConfig`] deserializes from the `config` table of a build unit. Every
//! key is optional; the defaults reproduce a plain `?.css` build with URL
//! rebasing and boundary comments.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ConfigError;

/// Placeholder in `target` replaced by the build unit name.
pub const UNIT_PLACEHOLDER: char = '?';

/// Source map output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBoolOr<String>")]
pub enum SourcemapMode {
    #[default]
    Off,
    /// Written next to the target as `<target>.map`
    File,
    /// Embedded in the output as a data URL
    Inline,
}

impl SourcemapMode {
    pub fn is_enabled(self) -> bool {
        self != SourcemapMode::Off
    }
}

/// Either a boolean or a richer value, as accepted by several keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBoolOr<T> {
    Bool(bool),
    Value(T),
}

impl TryFrom<RawBoolOr<String>> for SourcemapMode {
    type Error = String;

    fn try_from(raw: RawBoolOr<String>) -> Result<Self, Self::Error> {
        match raw {
            RawBoolOr::Bool(false) => Ok(SourcemapMode::Off),
            RawBoolOr::Bool(true) => Ok(SourcemapMode::File),
            RawBoolOr::Value(s) if s == "inline" => Ok(SourcemapMode::Inline),
            RawBoolOr::Value(s) if s == "file" => Ok(SourcemapMode::File),
            RawBoolOr::Value(other) => Err(format!(
                "sourcemap must be a boolean or \"inline\", got {other:?}"
            )),
        }
    }
}

/// Browser target configuration given as a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BrowsersConfig {
    #[serde(default)]
    pub browsers: Vec<String>,
}

/// Vendor prefixing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBoolOr<AutoprefixerValue>")]
pub enum Autoprefixer {
    #[default]
    Off,
    /// The `defaults` browserslist query
    Default,
    /// An explicit browserslist query list
    Browsers(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AutoprefixerValue {
    List(Vec<String>),
    Table(BrowsersConfig),
}

impl TryFrom<RawBoolOr<AutoprefixerValue>> for Autoprefixer {
    type Error = String;

    fn try_from(raw: RawBoolOr<AutoprefixerValue>) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawBoolOr::Bool(false) => Autoprefixer::Off,
            RawBoolOr::Bool(true) => Autoprefixer::Default,
            RawBoolOr::Value(
                AutoprefixerValue::List(browsers)
                | AutoprefixerValue::Table(BrowsersConfig { browsers }),
            ) => {
                if browsers.is_empty() {
                    Autoprefixer::Default
                } else {
                    Autoprefixer::Browsers(browsers)
                }
            }
        })
    }
}

impl Autoprefixer {
    pub fn is_enabled(&self) -> bool {
        *self != Autoprefixer::Off
    }
}

/// What happens to plain `@import` rules left after the dialect phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportsMode {
    /// Inline the imported files
    #[default]
    Include,
    /// Leave the rules in the output
    Keep,
}

/// Handling of relative `url(...)` references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMode {
    None,
    /// Rewrite so the reference resolves from the output file
    #[default]
    Rebase,
    /// Embed the referenced asset as a data URI
    Inline,
}

impl UrlMode {
    pub fn rewrites(self) -> bool {
        self != UrlMode::None
    }
}

/// What to do with a file whose name matches no configured dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownSuffixPolicy {
    /// Import it as plain CSS
    #[default]
    PassThrough,
    Fail,
}

/// A value bound to a global dialect variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Emitted verbatim, so it may be any expression (`#fff`, `"Helvetica"`, `10px`)
    Text(String),
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Bool(b) => write!(f, "{b}"),
            VariableValue::Integer(i) => write!(f, "{i}"),
            VariableValue::Float(x) => write!(f, "{x}"),
            VariableValue::Text(s) => f.write_str(s),
        }
    }
}

/// Options of the stylesheet tech.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TechConfig {
    /// Output file, relative to the unit root; `?` is the unit name
    pub target: String,
    pub compress: bool,
    /// Prefix added to every class selector
    pub prefix: String,
    /// Bound in declaration order, so later values may refer to earlier ones
    pub variables: IndexMap<String, VariableValue>,
    pub sourcemap: SourcemapMode,
    pub autoprefixer: Autoprefixer,
    pub imports: ImportsMode,
    pub url: UrlMode,
    /// Extra directories searched by `@import` and `url(...)`
    pub includes: Vec<PathBuf>,
    /// Boundary comments around every imported file
    pub comments: bool,
    /// Move `@charset` and `@import` rules to the top of the output
    pub hoist: bool,
    /// Make the bundled mixin kit available
    pub use_kit: bool,
    /// Files imported ahead of all sources
    pub globals: Vec<String>,
    pub suffixes: Vec<String>,
    pub unknown_suffix: UnknownSuffixPolicy,
}

impl Default for TechConfig {
    fn default() -> Self {
        Self {
            target: format!("{UNIT_PLACEHOLDER}.css"),
            compress: false,
            prefix: String::new(),
            variables: IndexMap::new(),
            sourcemap: SourcemapMode::Off,
            autoprefixer: Autoprefixer::Off,
            imports: ImportsMode::Include,
            url: UrlMode::Rebase,
            includes: Vec::new(),
            comments: true,
            hoist: false,
            use_kit: false,
            globals: Vec::new(),
            suffixes: vec!["scss".to_string(), "css".to_string()],
            unknown_suffix: UnknownSuffixPolicy::PassThrough,
        }
    }
}

impl TechConfig {
    /// Check the options that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suffixes.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptySuffixes);
        }
        let target = self.target.trim();
        if target.is_empty() || target.ends_with('/') || target.ends_with('\\') {
            return Err(ConfigError::InvalidTarget(self.target.clone()));
        }
        if let Autoprefixer::Browsers(list) = &self.autoprefixer {
            if list.iter().all(|b| b.trim().is_empty()) {
                return Err(ConfigError::EmptyBrowsers);
            }
        }
        for name in self.variables.keys() {
            if name.is_empty() || name.starts_with('$') || name.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key: "variables",
                    message: format!("{name:?} is not a valid variable name"),
                });
            }
        }
        Ok(())
    }

    /// The target with the unit placeholder substituted.
    pub fn target_for(&self, unit: &str) -> String {
        self.target.replace(UNIT_PLACEHOLDER, unit)
    }

    /// Variables as `(name, value)` pairs in declaration order.
    pub fn variable_bindings(&self) -> Vec<(String, String)> {
        self.variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TechConfig::default();
        assert_eq!(config.target_for("bundle"), "bundle.css");
        assert_eq!(config.url, UrlMode::Rebase);
        assert_eq!(config.imports, ImportsMode::Include);
        assert!(config.comments);
        assert!(!config.sourcemap.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_table_gives_defaults() {
        let config: TechConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TechConfig::default());
    }

    #[test]
    fn test_sourcemap_values() {
        let parse = |v: &str| serde_json::from_str::<SourcemapMode>(v);
        assert_eq!(parse("false").unwrap(), SourcemapMode::Off);
        assert_eq!(parse("true").unwrap(), SourcemapMode::File);
        assert_eq!(parse("\"inline\"").unwrap(), SourcemapMode::Inline);
        assert!(parse("\"sideways\"").is_err());
    }

    #[test]
    fn test_autoprefixer_values() {
        let parse = |v: &str| serde_json::from_str::<Autoprefixer>(v).unwrap();
        assert_eq!(parse("false"), Autoprefixer::Off);
        assert_eq!(parse("true"), Autoprefixer::Default);
        assert_eq!(
            parse(r#"{"browsers": ["ie 10"]}"#),
            Autoprefixer::Browsers(vec!["ie 10".to_string()])
        );
        assert_eq!(
            parse(r#"["last 2 versions"]"#),
            Autoprefixer::Browsers(vec!["last 2 versions".to_string()])
        );
    }

    #[test]
    fn test_variables_render_verbatim() {
        let config: TechConfig = serde_json::from_str(
            r##"{"variables": {"brand": "#fff", "columns": 12, "dark": true}}"##,
        )
        .unwrap();
        assert_eq!(
            config.variable_bindings(),
            vec![
                ("brand".to_string(), "#fff".to_string()),
                ("columns".to_string(), "12".to_string()),
                ("dark".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_variables_keep_declaration_order() {
        let config: TechConfig = toml::from_str(
            r#"
            [variables]
            gutter = "8px"
            spacing = "$gutter * 2"
            accent = "darken(red, 10%)"
            "#,
        )
        .unwrap();
        let names: Vec<String> = config
            .variable_bindings()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["gutter", "spacing", "accent"]);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let config = TechConfig {
            suffixes: vec![],
            ..TechConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptySuffixes)));

        let config = TechConfig {
            target: "out/".to_string(),
            ..TechConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTarget(_))));

        let mut variables = IndexMap::new();
        variables.insert("$bad".to_string(), VariableValue::Integer(1));
        let config = TechConfig {
            variables,
            ..TechConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "variables", .. })
        ));
    }

    #[test]
    fn test_toml_table() {
        let config: TechConfig = toml::from_str(
            r##"
            target = "bundle/?.css"
            compress = true
            sourcemap = "inline"
            url = "inline"
            includes = ["lib"]
            globals = ["globals/vars.scss"]

            [autoprefixer]
            browsers = ["last 2 versions"]

            [variables]
            brand = "#c00"
            "##,
        )
        .unwrap();
        assert_eq!(config.target_for("index"), "bundle/index.css");
        assert!(config.compress);
        assert_eq!(config.sourcemap, SourcemapMode::Inline);
        assert_eq!(config.url, UrlMode::Inline);
        assert_eq!(config.includes, vec![PathBuf::from("lib")]);
        assert_eq!(
            config.autoprefixer,
            Autoprefixer::Browsers(vec!["last 2 versions".to_string()])
        );
        assert_eq!(config.variable_bindings(), vec![("brand".to_string(), "#c00".to_string())]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_suffix_policy_names() {
        let policy: UnknownSuffixPolicy = serde_json::from_str("\"pass-through\"").unwrap();
        assert_eq!(policy, UnknownSuffixPolicy::PassThrough);
        let policy: UnknownSuffixPolicy = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(policy, UnknownSuffixPolicy::Fail);
    }
}
