use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum KotobaError {
    #[error("item has no foreign text")]
    MissingForeign,
    #[error("item has no native text")]
    MissingNative,
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),
}

/// Languages a workspace can be created for. One workspace per language per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Japanese,
    Chinese,
    English,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Japanese, Language::Chinese, Language::English];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Japanese => "japanese",
            Language::Chinese => "chinese",
            Language::English => "english",
        }
    }

    /// Display name, written in the language itself.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Japanese => "日本語",
            Language::Chinese => "中文",
            Language::English => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = KotobaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| KotobaError::UnknownLanguage(s.to_string()))
    }
}

/// One word pair. `foreign_alt` is an accepted alternate spelling of the foreign side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabItem {
    pub foreign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_alt: Option<String>,
    pub native: String,
}

impl VocabItem {
    /// Builds a trimmed item. A blank alternate is dropped; blank required text is an error.
    pub fn new(foreign: &str, foreign_alt: Option<&str>, native: &str) -> Result<Self, KotobaError> {
        let foreign = foreign.trim();
        let native = native.trim();
        if foreign.is_empty() {
            return Err(KotobaError::MissingForeign);
        }
        if native.is_empty() {
            return Err(KotobaError::MissingNative);
        }
        let foreign_alt = foreign_alt
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .map(String::from);

        Ok(VocabItem {
            foreign: foreign.to_string(),
            foreign_alt,
            native: native.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabUnit {
    pub name: String,
    pub file_name: String,
    pub language: Language,
    pub items: Vec<VocabItem>,
}

impl VocabUnit {
    pub fn new(file_name: &str, language: Language, items: Vec<VocabItem>) -> Self {
        VocabUnit {
            name: unit_name(file_name),
            file_name: file_name.to_string(),
            language,
            items,
        }
    }
}

const NAME_EXTENSIONS: [&str; 7] = [".xlsx", ".xlsm", ".xlsb", ".xls", ".ods", ".csv", ".json"];

/// Unit name shown to the user: the file name minus its spreadsheet extension.
pub fn unit_name(file_name: &str) -> String {
    for ext in NAME_EXTENSIONS {
        if file_name.len() <= ext.len() {
            continue;
        }
        let stem_len = file_name.len() - ext.len();
        if let (Some(stem), Some(tail)) = (file_name.get(..stem_len), file_name.get(stem_len..)) {
            if tail.eq_ignore_ascii_case(ext) {
                return stem.to_string();
            }
        }
    }
    file_name.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum QuizMode {
    ForeignToNative,
    NativeToForeign,
}

impl QuizMode {
    pub fn prompt<'a>(&self, item: &'a VocabItem) -> &'a str {
        match self {
            QuizMode::ForeignToNative => &item.foreign,
            QuizMode::NativeToForeign => &item.native,
        }
    }

    pub fn expected<'a>(&self, item: &'a VocabItem) -> &'a str {
        match self {
            QuizMode::ForeignToNative => &item.native,
            QuizMode::NativeToForeign => &item.foreign,
        }
    }

    /// The alternate is a foreign-side variant, so it only counts when answering in the foreign language.
    pub fn alternate<'a>(&self, item: &'a VocabItem) -> Option<&'a str> {
        match self {
            QuizMode::ForeignToNative => None,
            QuizMode::NativeToForeign => item.foreign_alt.as_deref(),
        }
    }

    pub fn describe(&self, language: Language) -> String {
        match self {
            QuizMode::ForeignToNative => format!("{} → Tiếng Việt", language.name()),
            QuizMode::NativeToForeign => format!("Tiếng Việt → {}", language.name()),
        }
    }
}
