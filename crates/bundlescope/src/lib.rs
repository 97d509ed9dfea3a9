//! Build analysis for JavaScript bundlers.
//!
//! A session starts from a user configuration, normalized once by
//! [`normalize_user_config`]. Its report-code flags and mode collapse into a single
//! [`Fidelity`] level, which decides how much code the session retains. Compilers
//! then feed [`CompilationSnapshot`]s into an [`AnalysisSession`], possibly from
//! several threads at once, and the session is finalized into a [`BuildReport`].
//!
//! Module rules supplied by the host can be made serializable with
//! [`make_rules_serializable`] so their conditions survive the trip to the report.

pub mod chunk_graph;
pub mod config;
pub mod fidelity;
pub mod ingest;
pub mod module_graph;
pub mod report;
pub mod rule_conditions;
pub mod session;
pub mod snapshot;
pub mod timings;

pub use chunk_graph::{ChunkGraph, ChunkNode};
pub use config::{ConfigError, FeatureSet, NormalizedConfig, RawUserConfig, normalize_user_config};
pub use fidelity::{Fidelity, Mode, ReportCodeType, resolve_fidelity};
pub use ingest::{GraphIngestor, IngestError, IngestState, IngestSummary};
pub use module_graph::{ModuleGraph, ModuleKey, ModuleNode};
pub use report::BuildReport;
pub use rule_conditions::{
    Condition, ConditionRef, RuleSetRule, make_condition_serializable, make_rules_serializable,
};
pub use session::{AnalysisSession, RulesError};
pub use snapshot::CompilationSnapshot;
