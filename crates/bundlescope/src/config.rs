//! User configuration normalization
//!
//! The raw configuration accepts several legal shapes for the same option (most
//! notably `features`, which is either a list of tags or an object of booleans).
//! [`normalize_user_config`] collapses every shape into one canonical, fully
//! populated [`NormalizedConfig`]; nothing downstream ever sees the raw union.
//!
//! Every default lives in [`DEFAULTS`]. No other module applies defaults.

use std::{ffi::OsStr, fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::fidelity::{Fidelity, Mode, ReportCodeType, resolve_fidelity};

/// Errors raised while normalizing a raw configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds the wrong kind of value (e.g. an array where an object is required)
    #[error("configuration field `{field}` must be {expected}, found {found}")]
    InvalidShape {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// A field has the right kind but its contents do not fit the schema
    #[error("configuration field `{field}` is malformed: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Name of the offending configuration field
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidShape { field, .. } | Self::Malformed { field, .. } => field,
        }
    }
}

/// One analysis capability that can be switched on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Loader,
    Plugins,
    Resolver,
    Bundle,
    TreeShaking,
    Lite,
}

impl Feature {
    pub const ALL: [Self; 6] = [
        Self::Loader,
        Self::Plugins,
        Self::Resolver,
        Self::Bundle,
        Self::TreeShaking,
        Self::Lite,
    ];

    /// Tag used for this feature in user configuration
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Loader => "loader",
            Self::Plugins => "plugins",
            Self::Resolver => "resolver",
            Self::Bundle => "bundle",
            Self::TreeShaking => "treeShaking",
            Self::Lite => "lite",
        }
    }

    /// Look up a feature by its configuration tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.tag() == tag)
    }
}

/// Canonical feature switches: exactly one boolean per known feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub loader: bool,
    pub plugins: bool,
    pub resolver: bool,
    pub bundle: bool,
    pub tree_shaking: bool,
    pub lite: bool,
}

impl FeatureSet {
    pub const fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Loader => self.loader,
            Feature::Plugins => self.plugins,
            Feature::Resolver => self.resolver,
            Feature::Bundle => self.bundle,
            Feature::TreeShaking => self.tree_shaking,
            Feature::Lite => self.lite,
        }
    }

    fn set(&mut self, feature: Feature, enabled: bool) {
        let slot = match feature {
            Feature::Loader => &mut self.loader,
            Feature::Plugins => &mut self.plugins,
            Feature::Resolver => &mut self.resolver,
            Feature::Bundle => &mut self.bundle,
            Feature::TreeShaking => &mut self.tree_shaking,
            Feature::Lite => &mut self.lite,
        };
        *slot = enabled;
    }

    const fn all_disabled() -> Self {
        Self {
            loader: false,
            plugins: false,
            resolver: false,
            bundle: false,
            tree_shaking: false,
            lite: false,
        }
    }

    /// Feature switches used when `features` is omitted entirely
    pub fn from_defaults(mode: Mode) -> Self {
        let mut features = DEFAULTS.features;
        features.lite |= mode == Mode::Lite;
        features
    }
}

/// Severity applied to linter rules without an explicit level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Ignore,
    Warn,
    Error,
}

fn default_severity() -> Severity {
    DEFAULTS.linter_level
}

/// Linter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinterOptions {
    /// Rule id to rule configuration, in declaration order
    #[serde(default)]
    pub rules: IndexMap<String, Value>,
    /// Referenced rule sets, in declaration order
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default = "default_severity")]
    pub level: Severity,
}

impl Default for LinterOptions {
    fn default() -> Self {
        Self {
            rules: IndexMap::new(),
            extends: Vec::new(),
            level: DEFAULTS.linter_level,
        }
    }
}

/// Loader interception settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderInterceptorOptions {
    /// Loaders excluded from interception, in declaration order
    pub skip_loaders: Vec<String>,
}

/// Optional analysis capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supports {
    #[serde(default)]
    pub banner: bool,
    #[serde(default)]
    pub parse_bundle: bool,
    #[serde(default)]
    pub generate_tile_graph: bool,
}

/// Log printing switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintLog {
    #[serde(default)]
    pub server_urls: bool,
}

/// The default table consulted by [`normalize_user_config`]
#[derive(Debug, Clone, Copy)]
pub struct ConfigDefaults {
    pub features: FeatureSet,
    pub linter_level: Severity,
    pub report_code_type: ReportCodeType,
    pub disable_client_server: bool,
    pub disable_tos_upload: bool,
    pub inner_client_path: &'static str,
    pub supports: Supports,
    pub print_log: PrintLog,
    pub mode: Mode,
}

pub const DEFAULTS: ConfigDefaults = ConfigDefaults {
    features: FeatureSet {
        loader: true,
        plugins: true,
        resolver: false,
        bundle: true,
        tree_shaking: false,
        lite: false,
    },
    linter_level: Severity::Error,
    report_code_type: ReportCodeType {
        no_module_source: false,
        no_assets_and_module_source: false,
        no_code: false,
        source_code: true,
        assets_code: true,
    },
    disable_client_server: false,
    disable_tos_upload: false,
    inner_client_path: "",
    supports: Supports {
        banner: false,
        parse_bundle: true,
        generate_tile_graph: true,
    },
    print_log: PrintLog { server_urls: true },
    mode: Mode::Normal,
};

/// Partially specified user configuration, exactly as written by the user.
///
/// Fields whose shape is validated by the normalizer are kept as raw JSON values
/// so a shape violation can be reported against the field name. For those
/// fields an explicit `null` is `Some(Value::Null)`, not an omission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUserConfig {
    #[serde(default, deserialize_with = "present")]
    pub linter: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub features: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub loader_interceptor_options: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub disable_client_server: Option<Value>,
    pub report_code_type: Option<ReportCodeType>,
    #[serde(rename = "disableTOSUpload")]
    pub disable_tos_upload: Option<bool>,
    pub inner_client_path: Option<String>,
    pub supports: Option<Supports>,
    pub port: Option<u16>,
    pub print_log: Option<PrintLog>,
    pub mode: Option<Mode>,
    /// Builder name, used to label compilers in multi-compiler sessions
    pub name: Option<String>,
}

/// Keep whatever value the key holds, `null` included
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RawUserConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse JSON configuration")
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Load a raw configuration from disk. `.toml` files are read as TOML, anything
    /// else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let parsed = if path.extension().and_then(OsStr::to_str) == Some("toml") {
            Self::from_toml_str(&text)
        } else {
            Self::from_json_str(&text)
        };
        parsed.with_context(|| format!("Invalid configuration in {}", path.display()))
    }
}

/// Fully populated configuration. Built once per session and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedConfig {
    pub linter: LinterOptions,
    pub features: FeatureSet,
    pub loader_interceptor: LoaderInterceptorOptions,
    pub disable_client_server: bool,
    pub fidelity: Fidelity,
    #[serde(rename = "disableTOSUpload")]
    pub disable_tos_upload: bool,
    pub inner_client_path: String,
    pub supports: Supports,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub print_log: PrintLog,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for NormalizedConfig {
    fn default() -> Self {
        Self {
            linter: LinterOptions::default(),
            features: FeatureSet::from_defaults(DEFAULTS.mode),
            loader_interceptor: LoaderInterceptorOptions::default(),
            disable_client_server: DEFAULTS.disable_client_server,
            fidelity: resolve_fidelity(&DEFAULTS.report_code_type, DEFAULTS.mode),
            disable_tos_upload: DEFAULTS.disable_tos_upload,
            inner_client_path: DEFAULTS.inner_client_path.to_owned(),
            supports: DEFAULTS.supports,
            port: None,
            print_log: DEFAULTS.print_log,
            mode: DEFAULTS.mode,
            name: None,
        }
    }
}

/// The two legal shapes of the `features` option
#[derive(Debug)]
enum FeaturesInput<'a> {
    /// `["loader", "bundle"]`: listed tags are on, everything else is off
    Tags(Vec<&'a str>),
    /// `{ "loader": false }`: each flag falls back to its own default
    Flags(&'a Map<String, Value>),
}

impl<'a> FeaturesInput<'a> {
    fn from_value(value: &'a Value) -> Result<Self, ConfigError> {
        match value {
            // Non-string entries can never name a feature
            Value::Array(items) => Ok(Self::Tags(items.iter().filter_map(Value::as_str).collect())),
            Value::Object(flags) => Ok(Self::Flags(flags)),
            other => Err(ConfigError::InvalidShape {
                field: "features",
                expected: "an object or an array of feature names",
                found: kind_of(other),
            }),
        }
    }

    fn resolve(&self, mode: Mode) -> FeatureSet {
        let mut features = FeatureSet::all_disabled();
        match self {
            Self::Tags(tags) => {
                for feature in tags.iter().filter_map(|tag| Feature::from_tag(tag)) {
                    features.set(feature, true);
                }
            }
            Self::Flags(flags) => {
                for feature in Feature::ALL {
                    let enabled = flags
                        .get(feature.tag())
                        .and_then(Value::as_bool)
                        .unwrap_or_else(|| DEFAULTS.features.is_enabled(feature));
                    features.set(feature, enabled);
                }
            }
        }

        // lite mode always implies the lite feature
        features.lite |= mode == Mode::Lite;
        features
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn expect_object<'a>(
    field: &'static str,
    value: &'a Value,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value.as_object().ok_or(ConfigError::InvalidShape {
        field,
        expected: "an object",
        found: kind_of(value),
    })
}

fn normalize_linter(value: Option<&Value>) -> Result<LinterOptions, ConfigError> {
    let Some(value) = value else {
        return Ok(LinterOptions::default());
    };

    expect_object("linter", value)?;
    LinterOptions::deserialize(value).map_err(|source| ConfigError::Malformed {
        field: "linter",
        source,
    })
}

fn normalize_loader_interceptor(
    value: Option<&Value>,
) -> Result<LoaderInterceptorOptions, ConfigError> {
    let Some(value) = value else {
        return Ok(LoaderInterceptorOptions::default());
    };

    let options = expect_object("loaderInterceptorOptions", value)?;
    // Anything other than an array means "skip nothing"
    let skip_loaders = options
        .get("skipLoaders")
        .and_then(Value::as_array)
        .map(|loaders| {
            loaders
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Ok(LoaderInterceptorOptions { skip_loaders })
}

fn normalize_disable_client_server(value: Option<&Value>) -> Result<bool, ConfigError> {
    match value {
        None => Ok(DEFAULTS.disable_client_server),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(ConfigError::InvalidShape {
            field: "disableClientServer",
            expected: "a boolean",
            found: kind_of(other),
        }),
    }
}

/// Turn a raw user configuration into a fully populated [`NormalizedConfig`].
///
/// Pure and deterministic. The only failure mode is a field of the wrong shape.
pub fn normalize_user_config(raw: &RawUserConfig) -> Result<NormalizedConfig, ConfigError> {
    let mode = raw.mode.unwrap_or(DEFAULTS.mode);

    let linter = normalize_linter(raw.linter.as_ref())?;
    let features = match raw.features.as_ref() {
        Some(value) => FeaturesInput::from_value(value)?.resolve(mode),
        None => FeatureSet::from_defaults(mode),
    };
    let loader_interceptor = normalize_loader_interceptor(raw.loader_interceptor_options.as_ref())?;
    let disable_client_server =
        normalize_disable_client_server(raw.disable_client_server.as_ref())?;

    let report_code_type = raw
        .report_code_type
        .unwrap_or(DEFAULTS.report_code_type);
    let fidelity = resolve_fidelity(&report_code_type, mode);

    debug!("Normalized configuration: mode={mode}, fidelity={fidelity}, features={features:?}");

    Ok(NormalizedConfig {
        linter,
        features,
        loader_interceptor,
        disable_client_server,
        fidelity,
        disable_tos_upload: raw.disable_tos_upload.unwrap_or(DEFAULTS.disable_tos_upload),
        inner_client_path: raw
            .inner_client_path
            .clone()
            .unwrap_or_else(|| DEFAULTS.inner_client_path.to_owned()),
        supports: raw.supports.unwrap_or(DEFAULTS.supports),
        port: raw.port,
        print_log: raw.print_log.unwrap_or(DEFAULTS.print_log),
        mode,
        name: raw.name.clone(),
    })
}
