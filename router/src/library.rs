//! Prompt library files.
//!
//! A library maps prompt names to a description (used for matching) and a
//! system prompt (the payload). Files may be JSON or TOML:
//!
//! ```toml
//! [code_writer]
//! description = "Write, debug, and explain code"
//! system_prompt = "You are an expert software engineer..."
//! ```
//!
//! Entries with a missing or blank field are rejected one by one; the rest
//! of the file still loads. A name that appears twice makes the whole file
//! invalid, in either format.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, RouterError};
use crate::registry::BatchFailure;

/// One library entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Text used for similarity matching.
    pub description: String,

    /// System prompt handed to the completion provider.
    pub system_prompt: String,
}

impl PromptSpec {
    /// Create a new prompt spec.
    pub fn new(description: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Entry as it appears on disk, before validation.
#[derive(Debug, Deserialize)]
struct RawPromptSpec {
    description: Option<String>,
    system_prompt: Option<String>,
}

/// Library entries in file order, before validation.
struct RawLibrary(IndexMap<String, RawPromptSpec>);

impl<'de> Deserialize<'de> for RawLibrary {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawLibraryVisitor;

        impl<'de> Visitor<'de> for RawLibraryVisitor {
            type Value = RawLibrary;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of prompt names to prompt entries")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RawLibrary, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut prompts = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(name) = map.next_key::<String>()? {
                    if prompts.contains_key(&name) {
                        return Err(de::Error::custom(format!("duplicate prompt name {name:?}")));
                    }
                    let spec: RawPromptSpec = map.next_value()?;
                    prompts.insert(name, spec);
                }
                Ok(RawLibrary(prompts))
            }
        }

        deserializer.deserialize_map(RawLibraryVisitor)
    }
}

/// Result of parsing a library file.
#[derive(Debug, Clone, Default)]
pub struct LibraryLoad {
    /// Entries that passed validation.
    pub library: PromptLibrary,

    /// Entries that did not, with reasons.
    pub rejected: Vec<BatchFailure>,
}

/// An ordered collection of named prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptLibrary {
    prompts: IndexMap<String, PromptSpec>,
}

impl PromptLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// The general-purpose prompts shipped with the router.
    pub fn builtin() -> Self {
        let prompts = BUILTIN_PROMPTS
            .iter()
            .map(|(name, description, system_prompt)| {
                (name.to_string(), PromptSpec::new(*description, *system_prompt))
            })
            .collect();
        Self { prompts }
    }

    /// Parse a JSON library.
    pub fn from_json_str(content: &str) -> Result<LibraryLoad> {
        let raw: RawLibrary = serde_json::from_str(content)?;
        Ok(Self::validate(raw))
    }

    /// Parse a TOML library.
    pub fn from_toml_str(content: &str) -> Result<LibraryLoad> {
        let raw: RawLibrary =
            toml::from_str(content).map_err(|e| RouterError::Config(e.to_string()))?;
        Ok(Self::validate(raw))
    }

    /// Load a library file; `.toml` files are read as TOML, anything else
    /// as JSON.
    pub async fn load(path: impl AsRef<Path>) -> Result<LibraryLoad> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        let load = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content)?,
            _ => Self::from_json_str(&content)?,
        };

        info!(
            "Loaded {} prompts from {} ({} rejected)",
            load.library.len(),
            path.display(),
            load.rejected.len()
        );
        Ok(load)
    }

    fn validate(RawLibrary(raw): RawLibrary) -> LibraryLoad {
        let mut load = LibraryLoad::default();

        for (name, spec) in raw {
            let description = spec.description.filter(|d| !d.trim().is_empty());
            let system_prompt = spec.system_prompt.filter(|p| !p.trim().is_empty());

            match (description, system_prompt) {
                (Some(description), Some(system_prompt)) => {
                    load.library.insert(name, PromptSpec::new(description, system_prompt));
                }
                (description, _) => {
                    let reason = if description.is_none() {
                        "missing or empty description"
                    } else {
                        "missing or empty system_prompt"
                    };
                    warn!("Rejected prompt {name:?}: {reason}");
                    load.rejected.push(BatchFailure {
                        name,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        load
    }

    /// Add or replace a prompt.
    pub fn insert(&mut self, name: impl Into<String>, spec: PromptSpec) {
        self.prompts.insert(name.into(), spec);
    }

    /// Get a prompt by name.
    pub fn get(&self, name: &str) -> Option<&PromptSpec> {
        self.prompts.get(name)
    }

    /// Prompt names in library order.
    pub fn names(&self) -> Vec<&str> {
        self.prompts.keys().map(String::as_str).collect()
    }

    /// Number of prompts.
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Iterate over `(name, spec)` pairs in library order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PromptSpec)> {
        self.prompts.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Prompts whose name or description contains `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<(&str, &PromptSpec)> {
        let keyword = keyword.to_lowercase();
        self.iter()
            .filter(|(name, spec)| {
                name.to_lowercase().contains(&keyword)
                    || spec.description.to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// `(name, description, system_prompt)` triples, ready for a bulk load.
    pub fn into_entries(self) -> impl Iterator<Item = (String, String, String)> {
        self.prompts
            .into_iter()
            .map(|(name, spec)| (name, spec.description, spec.system_prompt))
    }
}

const BUILTIN_PROMPTS: &[(&str, &str, &str)] = &[
    (
        "code_writer",
        "Write, debug, and explain code in various programming languages",
        "You are an expert software engineer. Write clean, efficient and documented code, \
         find and fix bugs, explain programming concepts and suggest sound design patterns. \
         Always give working examples, reason about edge cases and handle errors.",
    ),
    (
        "video_summarizer",
        "Summarize videos, extract key points, and create video content summaries",
        "You summarize video content. Produce concise, structured summaries with headings \
         and bullet points, pull out the key insights and actionable takeaways, and note \
         timestamps for important sections when they are available.",
    ),
    (
        "legal_assistant",
        "Answer legal questions, explain legal concepts, and provide legal guidance",
        "You are a knowledgeable legal assistant. Explain legal concepts in plain language, \
         describe rights and obligations, and reference relevant laws where appropriate. \
         Make clear that you give general information only and recommend a qualified \
         attorney for specific matters.",
    ),
    (
        "data_analyst",
        "Analyze data, create visualizations, and provide statistical insights",
        "You are a data analyst and statistician. Identify patterns and trends, choose \
         suitable statistical methods and visualizations, help clean and prepare data, \
         and explain the reasoning behind every recommendation.",
    ),
    (
        "creative_writer",
        "Write creative content, stories, marketing copy, and creative text",
        "You are a creative writer. Draft engaging stories, articles and marketing copy, \
         develop characters and plots, and adapt tone and style to the intended audience.",
    ),
    (
        "technical_documentation",
        "Create technical documentation, API docs, and user guides",
        "You are a technical writer. Produce clear documentation, API references, \
         tutorials, setup instructions and troubleshooting guides, structured with \
         headings, code examples and step-by-step instructions.",
    ),
    (
        "language_tutor",
        "Teach languages, explain grammar, and provide language learning assistance",
        "You are a patient language tutor. Explain grammar and vocabulary clearly, give \
         examples and practice exercises, and adapt explanations to the learner's level.",
    ),
    (
        "business_consultant",
        "Provide business advice, strategy recommendations, and business analysis",
        "You are a business strategy consultant. Analyze business problems, offer market \
         and competitive insight, suggest operational improvements and focus on practical, \
         actionable advice.",
    ),
    (
        "scientific_researcher",
        "Explain scientific concepts, research methods, and scientific writing",
        "You are a scientific research assistant. Explain scientific ideas accessibly, help \
         design experiments and structure papers, interpret findings, and ground every \
         answer in established science.",
    ),
    (
        "personal_assistant",
        "Help with productivity, organization, and general life management tasks",
        "You are an encouraging personal assistant. Help organize tasks and time, plan and \
         set goals, and offer practical productivity strategies.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::assert_ok;

    #[test]
    fn test_builtin_library() {
        let library = PromptLibrary::builtin();
        assert_eq!(library.len(), 10);
        assert!(library.get("code_writer").is_some());
        assert!(library.get("nonexistent").is_none());
        for (_, spec) in library.iter() {
            assert!(!spec.description.is_empty());
            assert!(!spec.system_prompt.is_empty());
        }
    }

    #[test]
    fn test_builtin_search() {
        let library = PromptLibrary::builtin();
        let names: Vec<&str> = library.search("code").iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"code_writer"));
        assert!(library.search("nonexistent").is_empty());
    }

    #[test]
    fn test_json_rejects_incomplete_entries() {
        let load = PromptLibrary::from_json_str(
            r#"{
                "good": { "description": "fine", "system_prompt": "You are fine." },
                "no_prompt": { "description": "half" },
                "blank": { "description": "  ", "system_prompt": "x" }
            }"#,
        )
        .unwrap();

        assert_eq!(load.library.names(), vec!["good"]);
        let rejected: Vec<&str> = load.rejected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(rejected, vec!["no_prompt", "blank"]);
        assert_eq!(load.rejected[0].reason, "missing or empty system_prompt");
        assert_eq!(load.rejected[1].reason, "missing or empty description");
    }

    #[test]
    fn test_toml_library() {
        let load = assert_ok!(PromptLibrary::from_toml_str(
            r#"
            [chef]
            description = "Cook recipes"
            system_prompt = "You are a chef."
            "#,
        ));

        assert!(load.rejected.is_empty());
        assert_eq!(
            load.library.get("chef"),
            Some(&PromptSpec::new("Cook recipes", "You are a chef."))
        );
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = PromptLibrary::from_json_str(
            r#"{
                "chef": { "description": "Cook recipes", "system_prompt": "first" },
                "chef": { "description": "Bake bread", "system_prompt": "second" }
            }"#,
        )
        .unwrap_err();
        match err {
            RouterError::Serialization(e) => {
                assert!(e.to_string().contains("duplicate prompt name \"chef\""));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = PromptLibrary::from_toml_str(
            "[chef]\ndescription = \"a\"\nsystem_prompt = \"b\"\n\
             [chef]\ndescription = \"c\"\nsystem_prompt = \"d\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            PromptLibrary::from_json_str("[1, 2"),
            Err(RouterError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        tokio::fs::write(&path, "[a]\ndescription = \"d\"\nsystem_prompt = \"p\"\n")
            .await
            .unwrap();

        let load = PromptLibrary::load(&path).await.unwrap();
        let entries: Vec<_> = load.library.into_entries().collect();
        assert_eq!(
            entries,
            vec![("a".to_string(), "d".to_string(), "p".to_string())]
        );
    }
}
