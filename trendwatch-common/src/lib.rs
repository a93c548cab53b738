//! Shared data model for trendwatch: the language catalog, trending periods
//! and the ranked item records extracted from trending pages.

pub mod language;
pub mod types;

pub use language::{Language, LanguageError, LANGUAGES, lookup};
pub use types::{Period, PeriodError, RankedItem};
