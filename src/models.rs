use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::dates::format_month;

// --- Jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotApplied,
    Generated,
    Applied,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotApplied => "not_applied",
            JobStatus::Generated => "generated",
            JobStatus::Applied => "applied",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "not_applied" | "new" => Ok(JobStatus::NotApplied),
            "generated" => Ok(JobStatus::Generated),
            "applied" => Ok(JobStatus::Applied),
            _ => Err(ParseEnumError {
                kind: "status",
                value: s.to_string(),
                expected: "not_applied, generated, applied",
            }),
        }
    }
}

/// A posting as it comes off a job source, before it has a store id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedJob {
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub salary: Option<String>,
    pub posted_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub salary: Option<String>,
    pub posted_date: Option<String>,
    pub status: JobStatus,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Applications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Resume, DocumentKind::CoverLetter];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover letter",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "resume" => Ok(DocumentKind::Resume),
            "cover_letter" | "cover" => Ok(DocumentKind::CoverLetter),
            _ => Err(ParseEnumError {
                kind: "document kind",
                value: s.to_string(),
                expected: "resume, cover_letter",
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub kind: DocumentKind,
    pub markdown_path: String,
    pub pdf_path: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub kind: DocumentKind,
    pub markdown_path: String,
    pub pdf_path: Option<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// --- Profiles ---

/// Where a partial profile came from. Variant order is merge priority,
/// highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProfileSource {
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "resume")]
    Resume,
    #[serde(rename = "linkedin")]
    LinkedIn,
    #[serde(rename = "github")]
    GitHub,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Manual => "manual",
            ProfileSource::Resume => "resume",
            ProfileSource::LinkedIn => "linkedin",
            ProfileSource::GitHub => "github",
        }
    }
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Experience as an importer saw it. Dates are raw text; the merger parses them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialExperience {
    pub employer: String,
    pub title: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialEducation {
    pub school: String,
    pub degree: Option<String>,
    pub field: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub language: Option<String>,
    pub stars: Option<u32>,
}

/// Output of one importer. `None` means the source said nothing about the
/// field, which is different from an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Vec<PartialExperience>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<PartialEducation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub employer: String,
    pub title: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub school: String,
    pub degree: Option<String>,
    pub field: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub headline: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl CanonicalProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.headline.is_none()
            && self.phone.is_none()
            && self.location.is_none()
            && self.summary.is_none()
            && self.experience.is_empty()
            && self.education.is_empty()
            && self.skills.is_empty()
            && self.projects.is_empty()
            && self.links.is_empty()
    }

    /// Re-expresses the merged profile as a partial one so it can be fed
    /// back into the merger. Empty lists become `None`.
    pub fn to_partial(&self) -> PartialProfile {
        fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
            if items.is_empty() { None } else { Some(items.to_vec()) }
        }

        PartialProfile {
            name: self.name.clone(),
            email: self.email.clone(),
            headline: self.headline.clone(),
            phone: self.phone.clone(),
            location: self.location.clone(),
            summary: self.summary.clone(),
            experience: non_empty(
                &self
                    .experience
                    .iter()
                    .map(|e| PartialExperience {
                        employer: e.employer.clone(),
                        title: e.title.clone(),
                        start: Some(format_month(e.start)),
                        end: e.end.map(format_month),
                        description: e.description.clone(),
                    })
                    .collect::<Vec<_>>(),
            ),
            education: non_empty(
                &self
                    .education
                    .iter()
                    .map(|e| PartialEducation {
                        school: e.school.clone(),
                        degree: e.degree.clone(),
                        field: e.field.clone(),
                        start: e.start.map(format_month),
                        end: e.end.map(format_month),
                    })
                    .collect::<Vec<_>>(),
            ),
            skills: non_empty(&self.skills),
            projects: non_empty(&self.projects),
            links: non_empty(&self.links),
        }
    }
}
