use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::merge::{merge_profiles, MergeWarning};
use crate::models::{CanonicalProfile, PartialProfile, ProfileSource};

pub const SCALAR_FIELDS: [&str; 6] = ["name", "email", "headline", "phone", "location", "summary"];

/// Everything persisted in `profile.json`: the latest partial profile per
/// source and the canonical profile merged from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub sources: BTreeMap<ProfileSource, PartialProfile>,
    #[serde(default)]
    pub canonical: CanonicalProfile,
    #[serde(default)]
    pub warnings: Vec<MergeWarning>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    /// Replaces what `source` previously contributed and re-merges.
    pub fn apply_import(&mut self, source: ProfileSource, partial: PartialProfile) {
        self.sources.insert(source, partial);
        self.remerge();
    }

    /// Recomputes the canonical profile. Map order is priority order.
    pub fn remerge(&mut self) {
        let ordered: Vec<(ProfileSource, PartialProfile)> = self
            .sources
            .iter()
            .map(|(source, partial)| (*source, partial.clone()))
            .collect();
        let outcome = merge_profiles(&ordered);
        self.canonical = outcome.profile;
        self.warnings = outcome.warnings;
        self.updated_at = Some(Utc::now());
    }

    pub fn manual_mut(&mut self) -> &mut PartialProfile {
        self.sources.entry(ProfileSource::Manual).or_default()
    }

    pub fn set_manual_field(&mut self, field: &str, value: &str) -> Result<()> {
        *scalar_slot(self.manual_mut(), field)? = Some(value.to_string());
        self.remerge();
        Ok(())
    }

    pub fn unset_manual_field(&mut self, field: &str) -> Result<()> {
        *scalar_slot(self.manual_mut(), field)? = None;
        self.remerge();
        Ok(())
    }

    pub fn add_manual_skill(&mut self, skill: &str) {
        self.manual_mut()
            .skills
            .get_or_insert_with(Vec::new)
            .push(skill.to_string());
        self.remerge();
    }
}

fn scalar_slot<'a>(profile: &'a mut PartialProfile, field: &str) -> Result<&'a mut Option<String>> {
    match field {
        "name" => Ok(&mut profile.name),
        "email" => Ok(&mut profile.email),
        "headline" => Ok(&mut profile.headline),
        "phone" => Ok(&mut profile.phone),
        "location" => Ok(&mut profile.location),
        "summary" => Ok(&mut profile.summary),
        _ => Err(anyhow!(
            "Unknown profile field '{}'. Available: {}",
            field,
            SCALAR_FIELDS.join(", ")
        )),
    }
}

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ProfileDocument> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no profile yet");
            return Ok(ProfileDocument::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read profile: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse profile: {}", self.path.display()))
    }

    pub fn save(&self, doc: &ProfileDocument) -> Result<()> {
        let Some(dir) = self.path.parent() else {
            bail!("Profile path has no parent directory: {}", self.path.display());
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write profile: {}", self.path.display()))?;

        info!(path = %self.path.display(), "saved profile");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn named(name: &str) -> PartialProfile {
        PartialProfile {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_manual_edit_beats_later_import() {
        let mut doc = ProfileDocument::default();
        doc.set_manual_field("name", "Jane Doe").unwrap();
        doc.apply_import(ProfileSource::GitHub, named("jdoe"));
        doc.apply_import(ProfileSource::Resume, named("JANE DOE"));

        assert_eq!(doc.canonical.name.as_deref(), Some("Jane Doe"));

        doc.unset_manual_field("name").unwrap();
        assert_eq!(doc.canonical.name.as_deref(), Some("JANE DOE"));
    }

    #[test]
    fn test_reimport_replaces_previous_source_data() {
        let mut doc = ProfileDocument::default();
        doc.apply_import(
            ProfileSource::GitHub,
            PartialProfile {
                skills: Some(vec!["Perl".to_string()]),
                ..Default::default()
            },
        );
        doc.apply_import(
            ProfileSource::GitHub,
            PartialProfile {
                skills: Some(vec!["Rust".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(doc.canonical.skills, vec!["Rust".to_string()]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut doc = ProfileDocument::default();
        let err = doc.set_manual_field("shoe_size", "44").unwrap_err();
        assert!(err.to_string().contains("shoe_size"));
    }

    #[test]
    fn test_store_persists_sources_and_canonical() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("profile.json"));

        assert!(store.load().unwrap().canonical.is_empty());

        let mut doc = ProfileDocument::default();
        doc.apply_import(ProfileSource::LinkedIn, named("Jane Doe"));
        doc.add_manual_skill("Rust");
        store.save(&doc).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.canonical, doc.canonical);
        assert_eq!(
            loaded.sources.keys().copied().collect::<Vec<_>>(),
            vec![ProfileSource::Manual, ProfileSource::LinkedIn]
        );
    }
}
