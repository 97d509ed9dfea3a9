//! Data fidelity policy
//!
//! The fidelity level decides how much source and asset payload survives into the
//! shared graph. It is derived once, from the analysis mode and the
//! `reportCodeType` flags, and never re-derived downstream.

use serde::{Deserialize, Serialize};

/// Analysis mode selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Full report, code included
    #[default]
    Normal,
    /// Only duration and artifact analysis, no code at all
    Brief,
    /// Normal report with module sources removed
    Lite,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Brief => write!(f, "brief"),
            Self::Lite => write!(f, "lite"),
        }
    }
}

/// Flags controlling which code payloads the report keeps.
///
/// When the whole field is omitted from the user configuration the normalizer
/// substitutes the default table; when it is given, omitted flags read as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCodeType {
    #[serde(default)]
    pub no_module_source: bool,
    #[serde(default)]
    pub no_assets_and_module_source: bool,
    #[serde(default)]
    pub no_code: bool,
    #[serde(default)]
    pub source_code: bool,
    #[serde(default)]
    pub assets_code: bool,
}

/// Ordered data fidelity level.
///
/// Variants are declared from the most to the least data retained, so
/// `Normal < NoCode < NoSource < NoSourceAndAssets` in terms of payload dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Fidelity {
    #[default]
    Normal,
    NoCode,
    NoSource,
    NoSourceAndAssets,
}

impl Fidelity {
    /// Module source text is only retained at full fidelity
    #[inline]
    pub const fn keeps_module_source(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Emitted asset payloads survive every level except `NoSourceAndAssets`
    #[inline]
    pub const fn keeps_asset_payload(self) -> bool {
        !matches!(self, Self::NoSourceAndAssets)
    }
}

impl std::fmt::Display for Fidelity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::NoCode => write!(f, "NoCode"),
            Self::NoSource => write!(f, "NoSource"),
            Self::NoSourceAndAssets => write!(f, "NoSourceAndAssets"),
        }
    }
}

/// Resolve the fidelity level for a mode and its report flags.
///
/// The mode branch is selected first; flags only refine inside the selected
/// branch, so `lite` combined with `noCode` still yields `NoSource`.
pub fn resolve_fidelity(report_code_type: &ReportCodeType, mode: Mode) -> Fidelity {
    match mode {
        Mode::Brief => Fidelity::NoCode,
        Mode::Lite => {
            if report_code_type.no_assets_and_module_source {
                Fidelity::NoSourceAndAssets
            } else {
                Fidelity::NoSource
            }
        }
        Mode::Normal => {
            if report_code_type.no_code {
                Fidelity::NoCode
            } else {
                Fidelity::Normal
            }
        }
    }
}
