//! Candidate registry.
//!
//! The `Registry` is the catalog of named candidates the router matches
//! against. It stores names, descriptions and opaque payloads only; vectors
//! are derived elsewhere and tied to an entry through its `revision`.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, RouterError};

/// What `unregister` does with a name that is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterPolicy {
    /// Fail with [`RouterError::NotFound`].
    #[default]
    Strict,
    /// Do nothing and report that nothing was removed.
    Lenient,
}

/// A registered candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry<P> {
    /// Unique name.
    pub name: String,

    /// Text the embedding is derived from.
    pub description: String,

    /// Content handed back to the caller when this candidate wins.
    pub payload: P,

    /// Changes whenever `description` changes.
    pub revision: u64,
}

/// Result of a single registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The name was new.
    Inserted,
    /// An existing entry was replaced.
    Updated {
        /// Whether the replacement invalidated the entry's embedding.
        description_changed: bool,
    },
}

/// A rejected entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Name of the entry.
    pub name: String,

    /// Why it was rejected.
    pub reason: String,
}

/// Per-entry outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// The entry is registered.
    Registered(RegisterOutcome),
    /// The entry could not be registered or embedded.
    Failed(String),
}

/// Per-entry outcomes of a bulk load, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// `(name, outcome)` for every entry of the batch.
    pub outcomes: Vec<(String, EntryOutcome)>,
}

impl BatchReport {
    /// Names that were registered successfully.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, EntryOutcome::Registered(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Entries that failed, with reasons.
    pub fn failures(&self) -> Vec<BatchFailure> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                EntryOutcome::Failed(reason) => Some(BatchFailure {
                    name: name.clone(),
                    reason: reason.clone(),
                }),
                EntryOutcome::Registered(_) => None,
            })
            .collect()
    }

    /// Whether every entry succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, EntryOutcome::Registered(_)))
    }

    /// Mark a previously successful entry as failed.
    pub(crate) fn mark_failed(&mut self, name: &str, reason: String) {
        for (entry, outcome) in self.outcomes.iter_mut() {
            if entry == name && matches!(outcome, EntryOutcome::Registered(_)) {
                *outcome = EntryOutcome::Failed(reason.clone());
            }
        }
    }

    /// Turn a report with failures into [`RouterError::PartialBatchFailure`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(RouterError::PartialBatchFailure(self.failures()))
        }
    }
}

/// A consistent copy of the registry at one point in time.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot<P> {
    /// Generation the snapshot was taken at.
    pub generation: u64,

    /// Entries in insertion order.
    pub entries: Vec<CandidateEntry<P>>,
}

struct Catalog<P> {
    entries: IndexMap<String, CandidateEntry<P>>,
    /// Bumped on every mutation.
    generation: u64,
    next_revision: u64,
}

impl<P> Catalog<P> {
    fn apply(&mut self, name: String, description: String, payload: P) -> RegisterOutcome {
        self.generation += 1;

        if let Some(existing) = self.entries.get_mut(&name) {
            let description_changed = existing.description != description;
            if description_changed {
                self.next_revision += 1;
                existing.revision = self.next_revision;
                existing.description = description;
            }
            existing.payload = payload;
            return RegisterOutcome::Updated {
                description_changed,
            };
        }

        self.next_revision += 1;
        self.entries.insert(
            name.clone(),
            CandidateEntry {
                name,
                description,
                payload,
                revision: self.next_revision,
            },
        );
        RegisterOutcome::Inserted
    }
}

/// Mutable catalog of named candidates.
///
/// Every method takes the internal lock exactly once, so each call is atomic
/// with respect to concurrent readers. Cloning a `Registry` yields another
/// handle to the same catalog.
pub struct Registry<P> {
    catalog: Arc<RwLock<Catalog<P>>>,
    policy: UnregisterPolicy,
}

impl<P> Clone for Registry<P> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            policy: self.policy,
        }
    }
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Registry<P> {
    /// Create an empty registry with the strict unregister policy.
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog {
                entries: IndexMap::new(),
                generation: 0,
                next_revision: 0,
            })),
            policy: UnregisterPolicy::default(),
        }
    }

    /// Set the unregister policy.
    pub fn with_policy(mut self, policy: UnregisterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured unregister policy.
    pub fn policy(&self) -> UnregisterPolicy {
        self.policy
    }

    fn validate(name: &str, description: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RouterError::InvalidEntry {
                name: name.to_string(),
                reason: "name is empty".to_string(),
            });
        }
        if description.trim().is_empty() {
            return Err(RouterError::InvalidEntry {
                name: name.to_string(),
                reason: "description is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Insert or replace the entry under `name`.
    ///
    /// Replacing with an identical description keeps the entry's revision,
    /// so its embedding stays valid; any other description gets a new
    /// revision.
    pub async fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        payload: P,
    ) -> Result<RegisterOutcome> {
        let name = name.into();
        let description = description.into();
        Self::validate(&name, &description)?;

        let outcome = self
            .catalog
            .write()
            .await
            .apply(name.clone(), description, payload);
        debug!("Registered candidate {name}: {outcome:?}");
        Ok(outcome)
    }

    /// Remove the entry under `name`.
    ///
    /// Returns whether an entry was removed. An unknown name is an error
    /// under [`UnregisterPolicy::Strict`] and a no-op under
    /// [`UnregisterPolicy::Lenient`].
    pub async fn unregister(&self, name: &str) -> Result<bool> {
        let mut catalog = self.catalog.write().await;

        if catalog.entries.shift_remove(name).is_some() {
            catalog.generation += 1;
            debug!("Unregistered candidate: {name}");
            return Ok(true);
        }

        match self.policy {
            UnregisterPolicy::Strict => Err(RouterError::NotFound(name.to_string())),
            UnregisterPolicy::Lenient => {
                debug!("Ignoring unregister of unknown candidate: {name}");
                Ok(false)
            }
        }
    }

    /// Check whether `name` is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.catalog.read().await.entries.contains_key(name)
    }

    /// Number of registered candidates.
    pub async fn len(&self) -> usize {
        self.catalog.read().await.entries.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.catalog.read().await.entries.is_empty()
    }

    /// Change counter, bumped on every mutation.
    pub async fn generation(&self) -> u64 {
        self.catalog.read().await.generation
    }

    /// `(name, description)` pairs in insertion order.
    ///
    /// This is a copy; later mutations do not show up in it.
    pub async fn list(&self) -> Vec<(String, String)> {
        self.catalog
            .read()
            .await
            .entries
            .values()
            .map(|e| (e.name.clone(), e.description.clone()))
            .collect()
    }
}

impl<P: Clone> Registry<P> {
    /// Get the entry under `name`.
    pub async fn get(&self, name: &str) -> Option<CandidateEntry<P>> {
        self.catalog.read().await.entries.get(name).cloned()
    }

    /// Copy every entry together with the current generation.
    pub async fn snapshot(&self) -> RegistrySnapshot<P> {
        let catalog = self.catalog.read().await;
        RegistrySnapshot {
            generation: catalog.generation,
            entries: catalog.entries.values().cloned().collect(),
        }
    }

    /// Entries whose name or description contains `keyword`, ignoring case.
    pub async fn search(&self, keyword: &str) -> Vec<CandidateEntry<P>> {
        let keyword = keyword.to_lowercase();
        self.catalog
            .read()
            .await
            .entries
            .values()
            .filter(|e| {
                e.name.to_lowercase().contains(&keyword)
                    || e.description.to_lowercase().contains(&keyword)
            })
            .cloned()
            .collect()
    }

    /// Register many entries as one batch.
    ///
    /// Each entry is validated and applied on its own: a bad entry never
    /// undoes the ones before it. A name appearing twice in the batch is
    /// rejected on its second appearance.
    pub async fn bulk_load<I>(&self, entries: I) -> BatchReport
    where
        I: IntoIterator<Item = (String, String, P)>,
    {
        let mut report = BatchReport::default();
        let mut seen = HashSet::new();
        let mut catalog = self.catalog.write().await;

        for (name, description, payload) in entries {
            if !seen.insert(name.clone()) {
                warn!("Rejected duplicate candidate in batch: {name}");
                report.outcomes.push((
                    name,
                    EntryOutcome::Failed("duplicate name in batch".to_string()),
                ));
                continue;
            }

            let outcome = match Self::validate(&name, &description) {
                Ok(()) => EntryOutcome::Registered(catalog.apply(
                    name.clone(),
                    description,
                    payload,
                )),
                Err(e) => {
                    warn!("Rejected candidate {name:?}: {e}");
                    EntryOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push((name, outcome));
        }

        info!(
            "Bulk loaded {} of {} candidates",
            report.succeeded().len(),
            report.outcomes.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        let outcome = registry
            .register("code", "write and debug code", "You are a coder.")
            .await
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Inserted);

        let entry = registry.get("code").await.unwrap();
        assert_eq!(entry.description, "write and debug code");
        assert_eq!(entry.payload, "You are a coder.");
        assert!(registry.get("legal").await.is_none());
    }

    #[tokio::test]
    async fn test_same_description_keeps_revision() {
        let registry = Registry::new();
        registry.register("code", "write code", "v1").await.unwrap();
        let before = registry.get("code").await.unwrap().revision;

        let outcome = registry.register("code", "write code", "v2").await.unwrap();
        assert_eq!(
            outcome,
            RegisterOutcome::Updated {
                description_changed: false
            }
        );

        let after = registry.get("code").await.unwrap();
        assert_eq!(after.revision, before);
        assert_eq!(after.payload, "v2");
    }

    #[tokio::test]
    async fn test_changed_description_bumps_revision() {
        let registry = Registry::new();
        registry.register("code", "write code", "p").await.unwrap();
        let before = registry.get("code").await.unwrap().revision;

        let outcome = registry.register("code", "review code", "p").await.unwrap();
        assert_eq!(
            outcome,
            RegisterOutcome::Updated {
                description_changed: true
            }
        );
        assert_ne!(registry.get("code").await.unwrap().revision, before);
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let registry: Registry<&str> = Registry::new();
        assert!(matches!(
            registry.register("", "desc", "p").await,
            Err(RouterError::InvalidEntry { .. })
        ));
        assert!(matches!(
            registry.register("name", "  ", "p").await,
            Err(RouterError::InvalidEntry { .. })
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unregister_strict() {
        let registry = Registry::new();
        registry.register("a", "alpha", ()).await.unwrap();

        assert!(registry.unregister("a").await.unwrap());
        assert!(matches!(
            registry.unregister("a").await,
            Err(RouterError::NotFound(name)) if name == "a"
        ));
    }

    #[tokio::test]
    async fn test_unregister_lenient() {
        let registry = Registry::new().with_policy(UnregisterPolicy::Lenient);
        registry.register("a", "alpha", ()).await.unwrap();
        let generation = registry.generation().await;

        assert!(registry.unregister("a").await.unwrap());
        assert!(!registry.unregister("a").await.unwrap());
        assert_eq!(registry.generation().await, generation + 1);
    }

    #[tokio::test]
    async fn test_list_is_insertion_ordered_snapshot() {
        let registry = Registry::new();
        registry.register("zeta", "last letter", ()).await.unwrap();
        registry.register("alpha", "first letter", ()).await.unwrap();
        registry.register("mid", "middle", ()).await.unwrap();

        let listed = registry.list().await;
        registry.unregister("alpha").await.unwrap();

        let names: Vec<&str> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_bulk_load_reports_per_entry() {
        let registry = Registry::new();
        let report = registry
            .bulk_load(vec![
                ("one".to_string(), "first".to_string(), 1),
                ("two".to_string(), "second".to_string(), 2),
                ("three".to_string(), "".to_string(), 3),
                ("four".to_string(), "fourth".to_string(), 4),
                ("two".to_string(), "again".to_string(), 5),
            ])
            .await;

        assert_eq!(report.succeeded(), vec!["one", "two", "four"]);
        let failed: Vec<String> = report.failures().into_iter().map(|f| f.name).collect();
        assert_eq!(failed, vec!["three".to_string(), "two".to_string()]);
        assert_eq!(registry.get("two").await.unwrap().payload, 2);
        assert!(!report.is_complete());
        assert!(matches!(
            report.into_result(),
            Err(RouterError::PartialBatchFailure(failures)) if failures.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_search_matches_name_and_description() {
        let registry = Registry::new();
        registry.register("code_writer", "Write and debug programs", ()).await.unwrap();
        registry.register("legal_assistant", "Answer legal questions", ()).await.unwrap();

        let hits: Vec<String> = registry.search("CODE").await.into_iter().map(|e| e.name).collect();
        assert_eq!(hits, vec!["code_writer".to_string()]);

        let hits = registry.search("questions").await;
        assert_eq!(hits.len(), 1);
        assert!(registry.search("cooking").await.is_empty());
    }
}
