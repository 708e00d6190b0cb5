//! Multi-source profile merge. Malformed input never fails the merge; the
//! offending field or entry is dropped with a warning.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates::{parse_month, ranges_overlap, DateBound};
use crate::models::{
    CanonicalProfile, Education, Experience, PartialEducation, PartialExperience, PartialProfile,
    ProfileSource, Project,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeWarning {
    pub source: ProfileSource,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub profile: CanonicalProfile,
    pub warnings: Vec<MergeWarning>,
}

const COMPANY_SUFFIXES: [&str; 10] = [
    "inc", "llc", "ltd", "limited", "corp", "corporation", "co", "company", "gmbh", "plc",
];

pub fn merge_profiles(sources: &[(ProfileSource, PartialProfile)]) -> MergeOutcome {
    let mut merger = Merger::default();
    for (source, partial) in sources {
        merger.absorb(*source, partial);
    }
    debug!(
        sources = sources.len(),
        warnings = merger.warnings.len(),
        "merged profile sources"
    );
    MergeOutcome {
        profile: merger.profile,
        warnings: merger.warnings,
    }
}

#[derive(Default)]
struct Merger {
    profile: CanonicalProfile,
    warnings: Vec<MergeWarning>,
}

impl Merger {
    fn warn(&mut self, source: ProfileSource, field: &str, message: impl Into<String>) {
        self.warnings.push(MergeWarning {
            source,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn absorb(&mut self, source: ProfileSource, partial: &PartialProfile) {
        let name = self.scalar(source, "name", partial.name.as_deref(), validate_text);
        let email = self.scalar(source, "email", partial.email.as_deref(), validate_email);
        let headline = self.scalar(source, "headline", partial.headline.as_deref(), validate_text);
        let phone = self.scalar(source, "phone", partial.phone.as_deref(), validate_text);
        let location = self.scalar(source, "location", partial.location.as_deref(), validate_text);
        let summary = self.scalar(source, "summary", partial.summary.as_deref(), validate_text);

        let profile = &mut self.profile;
        for (slot, value) in [
            (&mut profile.name, name),
            (&mut profile.email, email),
            (&mut profile.headline, headline),
            (&mut profile.phone, phone),
            (&mut profile.location, location),
            (&mut profile.summary, summary),
        ] {
            if slot.is_none() {
                *slot = value;
            }
        }

        if let Some(entries) = &partial.experience {
            for raw in entries {
                self.add_experience(source, raw);
            }
        }
        if let Some(entries) = &partial.education {
            for raw in entries {
                self.add_education(source, raw);
            }
        }
        if let Some(skills) = &partial.skills {
            for skill in skills {
                self.add_keyed_text(source, "skills", skill);
            }
        }
        if let Some(projects) = &partial.projects {
            for project in projects {
                self.add_project(source, project);
            }
        }
        if let Some(links) = &partial.links {
            for link in links {
                self.add_keyed_text(source, "links", link);
            }
        }
    }

    fn scalar(
        &mut self,
        source: ProfileSource,
        field: &str,
        value: Option<&str>,
        validate: fn(&str) -> Result<(), String>,
    ) -> Option<String> {
        let value = value?;
        match validate(value) {
            Ok(()) => Some(value.trim().to_string()),
            Err(message) => {
                self.warn(source, field, message);
                None
            }
        }
    }

    fn add_experience(&mut self, source: ProfileSource, raw: &PartialExperience) {
        let Some(entry) = self.parse_experience(source, raw) else {
            return;
        };
        match self.profile.experience.iter_mut().find(|e| same_role(e, &entry)) {
            Some(existing) => absorb_experience(existing, entry),
            None => self.profile.experience.push(entry),
        }
    }

    fn parse_experience(
        &mut self,
        source: ProfileSource,
        raw: &PartialExperience,
    ) -> Option<Experience> {
        let employer = raw.employer.trim();
        let title = raw.title.trim();
        let label = format!("{} at {}", title, employer);

        if employer.is_empty() || title.is_empty() {
            self.warn(source, "experience", format!("entry '{}' is missing an employer or title", label.trim()));
            return None;
        }

        let start = match raw.start.as_deref().map(parse_month) {
            Some(Ok(bound)) => match bound.first_month() {
                Some(date) => date,
                None => {
                    self.warn(source, "experience", format!("'{}' has no usable start date", label));
                    return None;
                }
            },
            Some(Err(e)) => {
                self.warn(source, "experience", format!("'{}': {}", label, e));
                return None;
            }
            None => {
                self.warn(source, "experience", format!("'{}' has no start date", label));
                return None;
            }
        };

        let end = match raw.end.as_deref().map(parse_month) {
            None => None,
            Some(Ok(bound)) => bound.last_month(),
            Some(Err(e)) => {
                self.warn(source, "experience", format!("'{}': {}", label, e));
                return None;
            }
        };

        if let Some(end) = end {
            if end < start {
                self.warn(source, "experience", format!("'{}' ends before it starts", label));
                return None;
            }
        }

        Some(Experience {
            employer: employer.to_string(),
            title: title.to_string(),
            start,
            end,
            description: non_blank(raw.description.as_deref()),
        })
    }

    fn add_education(&mut self, source: ProfileSource, raw: &PartialEducation) {
        let school = raw.school.trim();
        if school.is_empty() {
            self.warn(source, "education", "entry is missing a school");
            return;
        }

        let start = self
            .optional_month(source, "education", school, raw.start.as_deref())
            .and_then(DateBound::first_month);
        let end = self
            .optional_month(source, "education", school, raw.end.as_deref())
            .and_then(DateBound::last_month);
        let entry = Education {
            school: school.to_string(),
            degree: non_blank(raw.degree.as_deref()),
            field: non_blank(raw.field.as_deref()),
            start,
            end,
        };

        match self.profile.education.iter_mut().find(|e| same_school(e, &entry)) {
            Some(existing) => absorb_education(existing, entry),
            None => self.profile.education.push(entry),
        }
    }

    // A bad education date only drops that date.
    fn optional_month(
        &mut self,
        source: ProfileSource,
        field: &str,
        label: &str,
        value: Option<&str>,
    ) -> Option<DateBound> {
        match value.map(parse_month)? {
            Ok(bound) => Some(bound),
            Err(e) => {
                self.warn(source, field, format!("'{}': {}", label, e));
                None
            }
        }
    }

    fn add_project(&mut self, source: ProfileSource, raw: &Project) {
        let name = raw.name.trim();
        if name.is_empty() {
            self.warn(source, "projects", "project is missing a name");
            return;
        }
        let entry = Project {
            name: name.to_string(),
            description: non_blank(raw.description.as_deref()),
            url: non_blank(raw.url.as_deref()),
            language: non_blank(raw.language.as_deref()),
            stars: raw.stars,
        };

        let key = normalize(name);
        match self.profile.projects.iter_mut().find(|p| normalize(&p.name) == key) {
            Some(existing) => {
                merge_description(&mut existing.description, entry.description);
                fill(&mut existing.url, entry.url);
                fill(&mut existing.language, entry.language);
                fill(&mut existing.stars, entry.stars);
            }
            None => self.profile.projects.push(entry),
        }
    }

    fn add_keyed_text(&mut self, source: ProfileSource, field: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.warn(source, field, "blank entry");
            return;
        }
        let list = match field {
            "skills" => &mut self.profile.skills,
            _ => &mut self.profile.links,
        };
        let key = value.to_lowercase();
        if !list.iter().any(|existing| existing.to_lowercase() == key) {
            list.push(value.to_string());
        }
    }
}

fn validate_text(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("value is blank".to_string())
    } else {
        Ok(())
    }
}

fn validate_email(value: &str) -> Result<(), String> {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(format!("'{}' is not an email address", value)),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

// Longer wins; ties keep the higher-priority text.
fn merge_description(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        let longer = slot.as_ref().is_none_or(|current| value.len() > current.len());
        if longer {
            *slot = Some(value);
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_employer(text: &str) -> String {
    let normalized = normalize(text);
    let mut words: Vec<&str> = normalized.split(' ').collect();
    while words.len() > 1 && words.last().is_some_and(|w| COMPANY_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

fn same_role(a: &Experience, b: &Experience) -> bool {
    normalize_employer(&a.employer) == normalize_employer(&b.employer)
        && normalize(&a.title) == normalize(&b.title)
        && ranges_overlap(a.start, a.end, b.start, b.end)
}

fn absorb_experience(existing: &mut Experience, other: Experience) {
    // An absent end date means "current", so it is never filled in.
    merge_description(&mut existing.description, other.description);
}

fn same_school(a: &Education, b: &Education) -> bool {
    if normalize(&a.school) != normalize(&b.school) {
        return false;
    }
    match (&a.degree, &b.degree) {
        (Some(x), Some(y)) => normalize(x) == normalize(y),
        _ => true,
    }
}

fn absorb_education(existing: &mut Education, other: Education) {
    fill(&mut existing.degree, other.degree);
    fill(&mut existing.field, other.field);
    fill(&mut existing.start, other.start);
    fill(&mut existing.end, other.end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ym(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    fn experience(employer: &str, title: &str, start: &str, end: Option<&str>) -> PartialExperience {
        PartialExperience {
            employer: employer.to_string(),
            title: title.to_string(),
            start: Some(start.to_string()),
            end: end.map(str::to_string),
            description: None,
        }
    }

    fn skills(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    fn full_profile() -> PartialProfile {
        PartialProfile {
            name: Some("Jane Doe".to_string()),
            email: Some("jane@example.com".to_string()),
            headline: Some("Staff Engineer".to_string()),
            phone: Some("555-123-4567".to_string()),
            location: Some("Berlin".to_string()),
            summary: Some("Builds distributed systems.".to_string()),
            experience: Some(vec![
                PartialExperience {
                    description: Some("Led the storage team.".to_string()),
                    ..experience("Acme", "Staff Engineer", "2021-02", None)
                },
                experience("Initech", "Engineer", "2016-05", Some("2021-01")),
            ]),
            education: Some(vec![PartialEducation {
                school: "MIT".to_string(),
                degree: Some("B.S.".to_string()),
                field: Some("Computer Science".to_string()),
                start: Some("2012-09".to_string()),
                end: Some("2016-05".to_string()),
            }]),
            skills: skills(&["Rust", "Go", "PostgreSQL"]),
            projects: Some(vec![Project {
                name: "jobkit".to_string(),
                description: Some("Job search helper".to_string()),
                url: Some("https://github.com/jane/jobkit".to_string()),
                language: Some("Rust".to_string()),
                stars: Some(12),
            }]),
            links: skills(&["https://github.com/jane"]),
        }
    }

    #[test]
    fn test_single_profile_is_identity() {
        let profile = full_profile();
        for source in [
            ProfileSource::Manual,
            ProfileSource::Resume,
            ProfileSource::LinkedIn,
            ProfileSource::GitHub,
        ] {
            let outcome = merge_profiles(&[(source, profile.clone())]);
            assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
            assert_eq!(outcome.profile.to_partial(), profile);
        }
    }

    #[test]
    fn test_higher_priority_scalar_wins() {
        let high = PartialProfile {
            name: Some("Jane Q. Doe".to_string()),
            ..Default::default()
        };
        let low = PartialProfile {
            name: Some("J. Doe".to_string()),
            email: Some("jd@example.org".to_string()),
            ..Default::default()
        };

        let outcome = merge_profiles(&[
            (ProfileSource::Manual, high.clone()),
            (ProfileSource::GitHub, low.clone()),
        ]);
        assert_eq!(outcome.profile.name.as_deref(), Some("Jane Q. Doe"));
        // Fields the higher source is silent on come from lower ones.
        assert_eq!(outcome.profile.email.as_deref(), Some("jd@example.org"));

        let reversed = merge_profiles(&[(ProfileSource::Manual, low), (ProfileSource::GitHub, high)]);
        assert_eq!(reversed.profile.name.as_deref(), Some("J. Doe"));
    }

    #[test]
    fn test_absent_scalar_stays_absent() {
        let outcome = merge_profiles(&[
            (ProfileSource::Resume, PartialProfile::default()),
            (ProfileSource::GitHub, PartialProfile::default()),
        ]);
        assert_eq!(outcome.profile, CanonicalProfile::default());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let first = merge_profiles(&[
            (ProfileSource::Resume, full_profile()),
            (
                ProfileSource::LinkedIn,
                PartialProfile {
                    skills: skills(&["rust", "Kubernetes"]),
                    experience: Some(vec![experience("Globex", "Intern", "Jun 2015", Some("Aug 2015"))]),
                    ..Default::default()
                },
            ),
        ]);
        let partial = first.profile.to_partial();

        let again = merge_profiles(&[
            (ProfileSource::Manual, partial.clone()),
            (ProfileSource::Manual, partial),
        ]);
        assert_eq!(again.profile, first.profile);
        assert!(again.warnings.is_empty());
    }

    #[test]
    fn test_skills_merge_case_insensitively() {
        let outcome = merge_profiles(&[
            (ProfileSource::Resume, PartialProfile { skills: skills(&["Python"]), ..Default::default() }),
            (ProfileSource::GitHub, PartialProfile { skills: skills(&["python", "Go"]), ..Default::default() }),
        ]);
        assert_eq!(outcome.profile.skills, vec!["Python".to_string(), "Go".to_string()]);
    }

    #[test]
    fn test_skills_trimmed_before_comparison() {
        let outcome = merge_profiles(&[(
            ProfileSource::Resume,
            PartialProfile {
                skills: skills(&["  Rust ", "rust", "", "SQL"]),
                ..Default::default()
            },
        )]);
        assert_eq!(outcome.profile.skills, vec!["Rust".to_string(), "SQL".to_string()]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].field, "skills");
    }

    #[test]
    fn test_overlapping_experience_collapses_and_keeps_longer_description() {
        let resume = PartialProfile {
            experience: Some(vec![PartialExperience {
                description: Some("Storage.".to_string()),
                ..experience("Acme Inc.", "Senior Engineer", "2020-01", Some("2022-06"))
            }]),
            ..Default::default()
        };
        let linkedin = PartialProfile {
            experience: Some(vec![PartialExperience {
                description: Some("Owned the storage engine and its on-call rotation.".to_string()),
                ..experience("ACME", "senior engineer", "Mar 2020", Some("Jun 2022"))
            }]),
            ..Default::default()
        };

        let outcome = merge_profiles(&[
            (ProfileSource::Resume, resume),
            (ProfileSource::LinkedIn, linkedin),
        ]);
        assert_eq!(outcome.profile.experience.len(), 1);
        let entry = &outcome.profile.experience[0];
        assert_eq!(entry.employer, "Acme Inc.");
        assert_eq!(entry.title, "Senior Engineer");
        assert_eq!(entry.start, ym(2020, 1));
        assert_eq!(
            entry.description.as_deref(),
            Some("Owned the storage engine and its on-call rotation.")
        );
    }

    #[test]
    fn test_same_role_without_overlap_is_kept_twice() {
        let outcome = merge_profiles(&[(
            ProfileSource::Resume,
            PartialProfile {
                experience: Some(vec![
                    experience("Acme", "Engineer", "2015-01", Some("2016-12")),
                    experience("Acme", "Engineer", "2019-01", None),
                ]),
                ..Default::default()
            },
        )]);
        assert_eq!(outcome.profile.experience.len(), 2);
    }

    #[test]
    fn test_year_only_end_covers_whole_year() {
        let outcome = merge_profiles(&[(
            ProfileSource::Resume,
            PartialProfile {
                experience: Some(vec![experience("Acme", "Engineer", "Jun 2019", Some("2019"))]),
                ..Default::default()
            },
        )]);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.profile.experience.len(), 1);
        assert_eq!(outcome.profile.experience[0].start, ym(2019, 6));
        assert_eq!(outcome.profile.experience[0].end, Some(ym(2019, 12)));

        // Feeding the result back in changes nothing.
        let again = merge_profiles(&[(ProfileSource::Resume, outcome.profile.to_partial())]);
        assert_eq!(again.profile, outcome.profile);
    }

    #[test]
    fn test_year_precision_range_dedupes_with_month_range() {
        let outcome = merge_profiles(&[
            (
                ProfileSource::Resume,
                PartialProfile {
                    experience: Some(vec![experience("Acme", "Engineer", "2019", Some("2019"))]),
                    ..Default::default()
                },
            ),
            (
                ProfileSource::LinkedIn,
                PartialProfile {
                    experience: Some(vec![experience("Acme", "Engineer", "Mar 2019", Some("Oct 2019"))]),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(outcome.profile.experience.len(), 1);
        assert_eq!(outcome.profile.experience[0].start, ym(2019, 1));
        assert_eq!(outcome.profile.experience[0].end, Some(ym(2019, 12)));
    }

    #[test]
    fn test_open_ended_role_is_not_given_an_end_date() {
        let outcome = merge_profiles(&[
            (
                ProfileSource::Manual,
                PartialProfile {
                    experience: Some(vec![experience("Acme", "Engineer", "2020-01", Some("Present"))]),
                    ..Default::default()
                },
            ),
            (
                ProfileSource::LinkedIn,
                PartialProfile {
                    experience: Some(vec![experience("Acme", "Engineer", "2020-01", Some("2023-01"))]),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(outcome.profile.experience.len(), 1);
        assert_eq!(outcome.profile.experience[0].end, None);
    }

    #[test]
    fn test_malformed_entries_dropped_with_warning() {
        let outcome = merge_profiles(&[(
            ProfileSource::Resume,
            PartialProfile {
                name: Some("   ".to_string()),
                email: Some("not-an-email".to_string()),
                experience: Some(vec![
                    experience("Acme", "Engineer", "the before times", None),
                    experience("Initech", "Engineer", "2019-01", Some("2018-01")),
                    experience("Globex", "Engineer", "2017-01", Some("2018-01")),
                ]),
                education: Some(vec![PartialEducation {
                    school: "State University".to_string(),
                    end: Some("someday".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        )]);

        assert_eq!(outcome.profile.name, None);
        assert_eq!(outcome.profile.email, None);
        assert_eq!(outcome.profile.experience.len(), 1);
        assert_eq!(outcome.profile.experience[0].employer, "Globex");
        assert_eq!(outcome.profile.education.len(), 1);
        assert_eq!(outcome.profile.education[0].end, None);

        let fields: Vec<&str> = outcome.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "email", "experience", "experience", "education"]);
        assert!(outcome.warnings.iter().all(|w| w.source == ProfileSource::Resume));
    }

    #[test]
    fn test_lower_priority_fills_education_and_project_details() {
        let outcome = merge_profiles(&[
            (
                ProfileSource::Resume,
                PartialProfile {
                    education: Some(vec![PartialEducation {
                        school: "MIT".to_string(),
                        degree: Some("B.S.".to_string()),
                        ..Default::default()
                    }]),
                    projects: Some(vec![Project {
                        name: "jobkit".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
            ),
            (
                ProfileSource::GitHub,
                PartialProfile {
                    education: Some(vec![PartialEducation {
                        school: "mit".to_string(),
                        field: Some("Computer Science".to_string()),
                        end: Some("2016".to_string()),
                        ..Default::default()
                    }]),
                    projects: Some(vec![Project {
                        name: "JobKit".to_string(),
                        description: Some("Job search helper".to_string()),
                        stars: Some(3),
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
            ),
        ]);

        let edu = &outcome.profile.education;
        assert_eq!(edu.len(), 1);
        assert_eq!(edu[0].school, "MIT");
        assert_eq!(edu[0].field.as_deref(), Some("Computer Science"));
        assert_eq!(edu[0].end, Some(ym(2016, 12)));

        let projects = &outcome.profile.projects;
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "jobkit");
        assert_eq!(projects[0].description.as_deref(), Some("Job search helper"));
        assert_eq!(projects[0].stars, Some(3));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inputs = vec![
            (ProfileSource::Resume, full_profile()),
            (
                ProfileSource::GitHub,
                PartialProfile {
                    skills: skills(&["TypeScript", "go", "Nix"]),
                    links: skills(&["https://jane.dev", "HTTPS://GITHUB.COM/JANE"]),
                    ..Default::default()
                },
            ),
        ];
        let a = merge_profiles(&inputs);
        let b = merge_profiles(&inputs);
        assert_eq!(a.profile, b.profile);
        assert_eq!(
            a.profile.skills,
            vec!["Rust", "Go", "PostgreSQL", "TypeScript", "Nix"]
        );
        assert_eq!(a.profile.links, vec!["https://github.com/jane", "https://jane.dev"]);
    }

    #[test]
    fn test_normalize_employer_strips_suffixes() {
        assert_eq!(normalize_employer("Acme, Inc."), "acme");
        assert_eq!(normalize_employer("Initech LLC"), "initech");
        assert_eq!(normalize_employer("Co"), "co");
        assert_eq!(normalize_employer("Big  Data   Corp"), "big data");
    }
}
