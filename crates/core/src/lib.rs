// Domain logic for the Bitrix24 CRM tools: record helpers, the condition
// language, export analysis, stage history and deal risk rules.

pub mod analysis;
pub mod condition;
pub mod datetime;
pub mod fields;
pub mod record;
pub mod risk;
pub mod stage_history;
pub mod stages;

pub use analysis::{analyze, load_export, AnalysisError, AnalysisReport, AnalysisRequest, Operation};
pub use condition::{Condition, ConditionError};
pub use record::Record;
