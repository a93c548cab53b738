use serde::Serialize;
use thiserror::Error;

/// A language that can be followed.
///
/// `store_key` is embedded in persisted keys and must never change once used.
/// `query_key` is what the upstream trending page expects in its path; it is
/// empty for the `any` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Language {
    pub store_key: &'static str,
    pub query_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    #[error("Unknown language: {0}")]
    Unknown(String),
}

impl Language {
    pub const ANY: Language = Language::new("any", "");
    pub const JAVA: Language = Language::new("java", "java");
    pub const KOTLIN: Language = Language::new("kotlin", "kotlin");
    pub const GO: Language = Language::new("go", "go");
    pub const C: Language = Language::new("c", "c");
    pub const CPP: Language = Language::new("cpp", "c++");
    pub const RUST: Language = Language::new("rust", "rust");
    pub const HASKELL: Language = Language::new("haskell", "haskell");
    pub const TYPESCRIPT: Language = Language::new("typescript", "typescript");
    pub const PHP: Language = Language::new("php", "php");
    pub const JAVASCRIPT: Language = Language::new("javascript", "javascript");
    pub const ASSEMBLY: Language = Language::new("assembly", "assembly");
    pub const RUBY: Language = Language::new("ruby", "ruby");
    pub const HTML: Language = Language::new("html", "html");
    pub const UNKNOWN: Language = Language::new("unknown", "unknown");

    const fn new(store_key: &'static str, query_key: &'static str) -> Self {
        Self { store_key, query_key }
    }

    pub fn is_any(&self) -> bool {
        self.query_key.is_empty()
    }
}

/// Every language the service knows how to follow.
pub static LANGUAGES: &[Language] = &[
    Language::ANY,
    Language::JAVA,
    Language::KOTLIN,
    Language::GO,
    Language::C,
    Language::CPP,
    Language::RUST,
    Language::HASKELL,
    Language::TYPESCRIPT,
    Language::PHP,
    Language::JAVASCRIPT,
    Language::ASSEMBLY,
    Language::RUBY,
    Language::HTML,
    Language::UNKNOWN,
];

/// Look up a catalog entry by its store key.
pub fn lookup(store_key: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|lang| lang.store_key == store_key)
}

impl Language {
    /// Like [`lookup`], but returns a validation error for unknown keys.
    pub fn parse(store_key: &str) -> Result<&'static Language, LanguageError> {
        lookup(store_key).ok_or_else(|| LanguageError::Unknown(store_key.to_string()))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.store_key)
    }
}
