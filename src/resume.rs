//! Resume file import: text extraction, then line-oriented heuristics.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{PartialEducation, PartialExperience, PartialProfile, Project};

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("unsupported resume format '{0}' (expected .txt, .md, .pdf or .docx)")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF: {0}")]
    Pdf(String),

    #[error("failed to extract text from DOCX: {0}")]
    Docx(String),

    #[error("no text found in {0}")]
    Empty(PathBuf),

    #[error("no profile details recognised in {0}")]
    NothingFound(PathBuf),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub fn import_resume(path: &Path) -> Result<PartialProfile, ResumeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let bytes = std::fs::read(path).map_err(|source| ResumeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let text = match ext.as_str() {
        "txt" | "md" | "markdown" => String::from_utf8_lossy(&bytes).into_owned(),
        "pdf" => pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| ResumeError::Pdf(e.to_string()))?,
        "docx" => docx_text(&bytes)?,
        other => return Err(ResumeError::UnsupportedFormat(format!(".{}", other))),
    };

    if text.trim().is_empty() {
        return Err(ResumeError::Empty(path.to_path_buf()));
    }
    debug!(path = %path.display(), chars = text.len(), "extracted resume text");

    let profile = parse_resume_text(&text)?;
    if profile == PartialProfile::default() {
        return Err(ResumeError::NothingFound(path.to_path_buf()));
    }
    info!(
        name = profile.name.as_deref().unwrap_or("Unknown"),
        experience = profile.experience.as_ref().map_or(0, Vec::len),
        "parsed resume"
    );
    Ok(profile)
}

fn docx_text(bytes: &[u8]) -> Result<String, ResumeError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(docx_error)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(docx_error)?
        .read_to_string(&mut xml)
        .map_err(docx_error)?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;
    loop {
        match reader.read_event().map_err(docx_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&t.unescape().map_err(docx_error)?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

fn docx_error(e: impl std::fmt::Display) -> ResumeError {
    ResumeError::Docx(e.to_string())
}

struct Patterns {
    email: Regex,
    phone: Regex,
    url: Regex,
    range: Regex,
    year: Regex,
    degree: Regex,
    name: Regex,
    credentials: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        let month = r"(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?";
        let date = format!(r"(?:{month}\s+\d{{4}}|\d{{1,2}}/\d{{4}}|\d{{4}}(?:[-/]\d{{1,2}})?)");
        Ok(Self {
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            phone: Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")?,
            url: Regex::new(
                r"(?i)\b(?:https?://|www\.)[^\s|<>()]+|\b(?:linkedin\.com|github\.com)/[^\s|<>()]+",
            )?,
            range: Regex::new(&format!(
                r"(?i)(?P<start>{date})\s*(?:-|–|—|\bto\b|\buntil\b)\s*(?P<end>{date}|present|current|now)"
            ))?,
            year: Regex::new(r"\b(?:19|20)\d{2}\b")?,
            degree: Regex::new(
                r"(?i)\b(?:b\.?sc?\.?|b\.?a\.?|b\.?eng|m\.?sc?\.?|m\.?a\.?|m\.?eng|mba|ph\.?d\.?|bachelor|master|doctor|doctorate|associate|diploma)\b",
            )?,
            name: Regex::new(r"^[A-Za-z][A-Za-z\s\-'\.]+[A-Za-z]$")?,
            credentials: Regex::new(
                r"(?i),?\s*\b(?:CPA|MBA|PhD|MD|JD|PE|PMP|CFA|CISSP|Ph\.?D|M\.?S|B\.?S|B\.?A)\b\.?",
            )?,
        })
    }

    fn is_contact_line(&self, line: &str) -> bool {
        line.contains('@') || self.phone.is_match(line) || self.url.is_match(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Summary,
    Experience,
    Education,
    Skills,
    Projects,
    Other,
}

fn section_for(line: &str) -> Option<Section> {
    let key = line.trim().trim_end_matches(':').trim().to_uppercase();
    let section = match key.as_str() {
        "SUMMARY" | "PROFESSIONAL SUMMARY" | "CAREER SUMMARY" | "OBJECTIVE" | "PROFILE"
        | "ABOUT" | "ABOUT ME" => Section::Summary,
        "EXPERIENCE" | "WORK EXPERIENCE" | "PROFESSIONAL EXPERIENCE" | "RELEVANT EXPERIENCE"
        | "EMPLOYMENT" | "EMPLOYMENT HISTORY" | "WORK HISTORY" => Section::Experience,
        "EDUCATION" | "EDUCATION & TRAINING" | "ACADEMIC BACKGROUND" => Section::Education,
        "SKILLS" | "TECHNICAL SKILLS" | "CORE COMPETENCIES" | "KEY SKILLS" | "SKILLS & TOOLS" => {
            Section::Skills
        }
        "PROJECTS" | "PERSONAL PROJECTS" | "SELECTED PROJECTS" | "SIDE PROJECTS" | "OPEN SOURCE" => {
            Section::Projects
        }
        "CERTIFICATIONS" | "AWARDS" | "PUBLICATIONS" | "CONTACT" | "QUALIFICATIONS"
        | "LANGUAGES" | "INTERESTS" | "VOLUNTEERING" | "REFERENCES" => Section::Other,
        _ => return None,
    };
    Some(section)
}

fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches('#')
        .replace("**", "")
        .trim()
        .to_string()
}

fn strip_bullet(line: &str) -> Option<&str> {
    const BULLETS: [char; 9] = ['•', '-', '*', '–', '►', '○', '■', '●', '▪'];
    let mut chars = line.chars();
    let first = chars.next()?;
    if BULLETS.contains(&first) {
        Some(chars.as_str().trim())
    } else {
        None
    }
}

fn trim_separators(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || "|,-–—()·:".contains(c))
        .to_string()
}

#[derive(Default)]
struct Sections {
    header: Vec<String>,
    summary: Vec<String>,
    experience: Vec<String>,
    education: Vec<String>,
    skills: Vec<String>,
    projects: Vec<String>,
}

impl Sections {
    fn split(text: &str) -> Self {
        let mut sections = Sections::default();
        let mut current = Section::Header;
        for raw in text.lines() {
            let line = clean_line(raw);
            if line.is_empty() {
                continue;
            }
            if let Some(section) = section_for(&line) {
                current = section;
                continue;
            }
            let bucket = match current {
                Section::Header => &mut sections.header,
                Section::Summary => &mut sections.summary,
                Section::Experience => &mut sections.experience,
                Section::Education => &mut sections.education,
                Section::Skills => &mut sections.skills,
                Section::Projects => &mut sections.projects,
                Section::Other => continue,
            };
            bucket.push(line);
        }
        sections
    }
}

pub fn parse_resume_text(text: &str) -> Result<PartialProfile, ResumeError> {
    let patterns = Patterns::new()?;
    let sections = Sections::split(text);

    let mut profile = PartialProfile {
        email: patterns.email.find(text).map(|m| m.as_str().to_string()),
        phone: patterns.phone.find(text).map(|m| m.as_str().trim().to_string()),
        ..Default::default()
    };

    let candidates: Vec<String> = if sections.header.is_empty() {
        text.lines().map(clean_line).filter(|l| !l.is_empty()).collect()
    } else {
        sections.header.clone()
    };
    if let Some((idx, name)) = find_name(&candidates, &patterns) {
        profile.name = Some(name);
        profile.headline = candidates
            .iter()
            .skip(idx + 1)
            .take(3)
            .find(|line| {
                !patterns.is_contact_line(line)
                    && section_for(line).is_none()
                    && line.split_whitespace().count() <= 12
            })
            .cloned();
    }

    if !sections.summary.is_empty() {
        let summary = sections
            .summary
            .iter()
            .map(|l| strip_bullet(l).unwrap_or(l))
            .collect::<Vec<_>>()
            .join(" ");
        profile.summary = Some(summary);
    }

    let experience = parse_experience(&sections.experience, &patterns);
    let education = parse_education(&sections.education, &patterns);
    let skills = parse_skills(&sections.skills);
    let projects = parse_projects(&sections.projects, &patterns);
    let links = find_links(text, &patterns);

    profile.experience = (!experience.is_empty()).then_some(experience);
    profile.education = (!education.is_empty()).then_some(education);
    profile.skills = (!skills.is_empty()).then_some(skills);
    profile.projects = (!projects.is_empty()).then_some(projects);
    profile.links = (!links.is_empty()).then_some(links);
    Ok(profile)
}

const NOT_A_NAME: [&str; 31] = [
    "summary", "experience", "education", "skills", "objective", "resume", "cv", "profile",
    "contact", "about", "professional", "career", "work", "phone", "email", "address",
    "linkedin", "github", "portfolio", "senior", "junior", "lead", "manager", "director",
    "engineer", "developer", "analyst", "consultant", "specialist", "coordinator", "associate",
];

fn find_name(lines: &[String], patterns: &Patterns) -> Option<(usize, String)> {
    lines.iter().take(15).enumerate().find_map(|(idx, line)| {
        if line.len() < 3 || patterns.is_contact_line(line) {
            return None;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() > 5 {
            return None;
        }
        let has_blocked_word = words.iter().any(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            NOT_A_NAME.contains(&w.as_str())
        });
        if has_blocked_word || line.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }

        let cleaned = patterns.credentials.replace_all(line, "");
        let cleaned = cleaned.trim_matches(|c: char| c == ' ' || c == ',' || c == '.');
        let word_count = cleaned.split_whitespace().count();
        if patterns.name.is_match(cleaned) && (1..=4).contains(&word_count) {
            Some((idx, cleaned.to_string()))
        } else {
            None
        }
    })
}

const TITLE_WORDS: [&str; 24] = [
    "engineer", "developer", "manager", "director", "lead", "analyst", "designer", "consultant",
    "architect", "scientist", "intern", "head", "officer", "specialist", "administrator",
    "coordinator", "associate", "vp", "president", "founder", "cto", "ceo", "programmer",
    "researcher",
];

fn looks_like_title(text: &str) -> bool {
    text.split_whitespace().any(|w| {
        let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        TITLE_WORDS.contains(&w.as_str())
    })
}

// (title, employer); the employer is empty without a separator.
fn split_role(text: &str) -> (String, String) {
    for sep in [" at ", " @ "] {
        if let Some((title, employer)) = text.split_once(sep) {
            return (trim_separators(title), first_part(employer));
        }
    }
    for sep in [" | ", " — ", " – ", " - ", ", "] {
        if let Some((a, b)) = text.split_once(sep) {
            let b = b.split(sep).next().unwrap_or(b);
            return if looks_like_title(b) && !looks_like_title(a) {
                (trim_separators(b), trim_separators(a))
            } else {
                (trim_separators(a), trim_separators(b))
            };
        }
    }
    (trim_separators(text), String::new())
}

fn first_part(text: &str) -> String {
    let end = [" | ", " — ", " – ", " - "]
        .iter()
        .filter_map(|sep| text.find(sep))
        .min()
        .unwrap_or(text.len());
    trim_separators(&text[..end])
}

fn role_from_lines(lines: &[String]) -> (String, String) {
    match lines {
        [] => (String::new(), String::new()),
        [only] => split_role(only),
        [.., above, last] => {
            let (title, employer) = split_role(last);
            if !employer.is_empty() {
                return (title, employer);
            }
            let (title_above, employer_above) = split_role(above);
            if !employer_above.is_empty() {
                return (title_above, employer_above);
            }
            if looks_like_title(last) && !looks_like_title(above) {
                (trim_separators(last), trim_separators(above))
            } else {
                (trim_separators(above), trim_separators(last))
            }
        }
    }
}

fn push_description(entry: Option<&mut PartialExperience>, lines: &[String]) {
    let Some(entry) = entry else {
        return;
    };
    for line in lines {
        match entry.description.as_mut() {
            Some(desc) => {
                desc.push('\n');
                desc.push_str(line);
            }
            None => entry.description = Some(line.clone()),
        }
    }
}

// Entries start at a line holding a date range; the role sits on that line
// or up to two lines above it.
fn parse_experience(lines: &[String], patterns: &Patterns) -> Vec<PartialExperience> {
    let mut entries: Vec<PartialExperience> = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for line in lines {
        if let Some(caps) = patterns.range.captures(line) {
            let Some(whole) = caps.get(0) else { continue };
            let start = caps.name("start").map(|m| m.as_str().to_string());
            let end = caps.name("end").map(|m| m.as_str().to_string());
            let rest = trim_separators(&format!("{} {}", &line[..whole.start()], &line[whole.end()..]));

            let needed = if rest.is_empty() {
                2
            } else if split_role(&rest).1.is_empty() {
                1
            } else {
                0
            };
            let take = needed.min(pending.len());
            let mut header = pending.split_off(pending.len() - take);
            if !rest.is_empty() {
                header.push(rest);
            }
            push_description(entries.last_mut(), &pending);
            pending.clear();

            let (title, employer) = role_from_lines(&header);
            entries.push(PartialExperience {
                employer,
                title,
                start,
                end,
                description: None,
            });
        } else if let Some(bullet) = strip_bullet(line) {
            push_description(entries.last_mut(), &pending);
            pending.clear();
            push_description(entries.last_mut(), &[bullet.to_string()]);
        } else {
            // A company line right under a date line that only named the title.
            match entries.last_mut() {
                Some(entry)
                    if entry.employer.is_empty() && entry.description.is_none() && pending.is_empty() =>
                {
                    entry.employer = first_part(line);
                }
                _ => pending.push(line.clone()),
            }
        }
    }
    push_description(entries.last_mut(), &pending);
    entries
}

const SCHOOL_WORDS: [&str; 7] = [
    "university", "college", "institute", "school", "academy", "polytechnic", "universität",
];

fn is_school(text: &str) -> bool {
    let lower = text.to_lowercase();
    SCHOOL_WORDS.iter().any(|w| lower.contains(w))
}

// A single year is read as the graduation date.
fn take_dates(line: &str, patterns: &Patterns) -> (Option<String>, Option<String>, String) {
    if let Some(caps) = patterns.range.captures(line) {
        if let Some(whole) = caps.get(0) {
            let rest = format!("{} {}", &line[..whole.start()], &line[whole.end()..]);
            return (
                caps.name("start").map(|m| m.as_str().to_string()),
                caps.name("end").map(|m| m.as_str().to_string()),
                rest,
            );
        }
    }
    let years: Vec<String> = patterns
        .year
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect();
    let rest = patterns.year.replace_all(line, "").into_owned();
    match years.as_slice() {
        [] => (None, None, rest),
        [only] => (None, Some(only.clone()), rest),
        [first, .., last] => (Some(first.clone()), Some(last.clone()), rest),
    }
}

fn split_parts(text: &str) -> Vec<String> {
    text.split(['|', ',', '–', '—', '·'])
        .flat_map(|part| part.split(" - "))
        .map(trim_separators)
        .filter(|p| !p.is_empty())
        .collect()
}

fn split_degree(text: &str) -> (String, Option<String>) {
    match text.split_once(" in ") {
        Some((degree, field)) => (trim_separators(degree), Some(trim_separators(field))),
        None => (trim_separators(text), None),
    }
}

fn parse_education(lines: &[String], patterns: &Patterns) -> Vec<PartialEducation> {
    let mut entries = Vec::new();
    let mut current: Option<PartialEducation> = None;

    for raw in lines {
        let line = strip_bullet(raw).unwrap_or(raw);
        let (start, end, text) = take_dates(line, patterns);
        let parts = split_parts(&text);

        if let Some(school) = parts.iter().find(|p| is_school(p)) {
            let fills_current = matches!(&current, Some(c) if c.school.is_empty());
            if !fills_current {
                entries.extend(current.take());
            }
            current.get_or_insert_with(PartialEducation::default).school = school.clone();
        }

        let degree_at = parts
            .iter()
            .position(|p| !is_school(p) && patterns.degree.is_match(p));
        if let Some(idx) = degree_at {
            let entry = current.get_or_insert_with(PartialEducation::default);
            if entry.degree.is_none() {
                let (degree, field) = split_degree(&parts[idx]);
                entry.degree = Some(degree);
                entry.field = field.or_else(|| {
                    parts
                        .get(idx + 1)
                        .filter(|p| !is_school(p) && !patterns.degree.is_match(p))
                        .cloned()
                });
            }
        }

        if let Some(entry) = current.as_mut() {
            if entry.start.is_none() {
                entry.start = start;
            }
            if entry.end.is_none() {
                entry.end = end;
            }
        }
    }
    entries.extend(current);
    entries
}

fn parse_skills(lines: &[String]) -> Vec<String> {
    let mut skills = Vec::new();
    for raw in lines {
        let line = strip_bullet(raw).unwrap_or(raw);
        let list = line.split_once(':').map_or(line, |(_, rest)| rest);
        skills.extend(
            list.split([',', '|', ';', '•', '·'])
                .map(str::trim)
                .filter(|s| !s.is_empty() && s.chars().count() <= 40)
                .map(str::to_string),
        );
    }
    skills
}

fn split_project(text: &str) -> Option<(String, Option<String>)> {
    for sep in [" — ", " – ", " - ", ": "] {
        if let Some((name, desc)) = text.split_once(sep) {
            let desc = trim_separators(desc);
            return Some((trim_separators(name), (!desc.is_empty()).then_some(desc)));
        }
    }
    None
}

fn parse_projects(lines: &[String], patterns: &Patterns) -> Vec<Project> {
    let mut projects: Vec<Project> = Vec::new();

    for raw in lines {
        let bullet = strip_bullet(raw);
        let line = bullet.unwrap_or(raw);
        let url = patterns.url.find(line).map(|m| normalize_link(m.as_str()));
        let text = patterns.url.replace_all(line, "");
        let text = trim_separators(&text);

        let starts_project = bullet.is_none() || projects.is_empty() || split_project(&text).is_some();
        if starts_project {
            let (name, description) = split_project(&text).unwrap_or((text.clone(), None));
            if name.is_empty() {
                continue;
            }
            projects.push(Project {
                name,
                description,
                url,
                ..Default::default()
            });
        } else if let Some(project) = projects.last_mut() {
            project.description = Some(match project.description.take() {
                Some(desc) => format!("{}\n{}", desc, text),
                None => text,
            });
            if project.url.is_none() {
                project.url = url;
            }
        }
    }
    projects
}

fn normalize_link(raw: &str) -> String {
    let link = raw.trim_end_matches(['.', ',', ';', ')']);
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{}", link)
    }
}

fn find_links(text: &str, patterns: &Patterns) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for m in patterns.url.find_iter(text) {
        let link = normalize_link(m.as_str());
        if !links.iter().any(|l| l.eq_ignore_ascii_case(&link)) {
            links.push(link);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
Jane Doe
Senior Software Engineer
jane.doe@example.com | (555) 123-4567 | github.com/janedoe

SUMMARY
Backend engineer with ten years of experience
building distributed systems.

EXPERIENCE
Senior Engineer at Acme Inc | Jan 2020 - Present
- Led the storage team
- Cut p99 latency by 40%

Globex Corporation
Software Engineer
Mar 2016 - Dec 2019
• Built billing pipelines

EDUCATION
University of Somewhere
BSc in Computer Science, 2012 - 2016

SKILLS
Languages: Rust, Python, Go
Tools: Docker | Kubernetes

PROJECTS
jobkit - Job search assistant in Rust https://github.com/janedoe/jobkit
- Scrapes postings
";

    #[test]
    fn test_parse_contact_and_header() {
        let profile = parse_resume_text(SAMPLE).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.headline.as_deref(), Some("Senior Software Engineer"));
        assert_eq!(profile.email.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(profile.phone.as_deref(), Some("(555) 123-4567"));
        assert_eq!(
            profile.summary.as_deref(),
            Some("Backend engineer with ten years of experience building distributed systems.")
        );
        assert_eq!(
            profile.links.unwrap(),
            vec!["https://github.com/janedoe", "https://github.com/janedoe/jobkit"]
        );
    }

    #[test]
    fn test_parse_experience_layouts() {
        let profile = parse_resume_text(SAMPLE).unwrap();
        let experience = profile.experience.unwrap();
        assert_eq!(experience.len(), 2);

        assert_eq!(experience[0].title, "Senior Engineer");
        assert_eq!(experience[0].employer, "Acme Inc");
        assert_eq!(experience[0].start.as_deref(), Some("Jan 2020"));
        assert_eq!(experience[0].end.as_deref(), Some("Present"));
        assert_eq!(
            experience[0].description.as_deref(),
            Some("Led the storage team\nCut p99 latency by 40%")
        );

        assert_eq!(experience[1].title, "Software Engineer");
        assert_eq!(experience[1].employer, "Globex Corporation");
        assert_eq!(experience[1].start.as_deref(), Some("Mar 2016"));
        assert_eq!(experience[1].end.as_deref(), Some("Dec 2019"));
        assert_eq!(experience[1].description.as_deref(), Some("Built billing pipelines"));
    }

    #[test]
    fn test_parse_education_skills_projects() {
        let profile = parse_resume_text(SAMPLE).unwrap();

        let education = profile.education.unwrap();
        assert_eq!(education.len(), 1);
        assert_eq!(education[0].school, "University of Somewhere");
        assert_eq!(education[0].degree.as_deref(), Some("BSc"));
        assert_eq!(education[0].field.as_deref(), Some("Computer Science"));
        assert_eq!(education[0].start.as_deref(), Some("2012"));
        assert_eq!(education[0].end.as_deref(), Some("2016"));

        assert_eq!(
            profile.skills.unwrap(),
            vec!["Rust", "Python", "Go", "Docker", "Kubernetes"]
        );

        let projects = profile.projects.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "jobkit");
        assert_eq!(
            projects[0].description.as_deref(),
            Some("Job search assistant in Rust\nScrapes postings")
        );
        assert_eq!(projects[0].url.as_deref(), Some("https://github.com/janedoe/jobkit"));
    }

    #[test]
    fn test_markdown_headings() {
        let text = "# Jane Doe\n\n## Experience\n**Engineer** at Initech, 2019 - 2021\n";
        let profile = parse_resume_text(text).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        let experience = profile.experience.unwrap();
        assert_eq!(experience[0].title, "Engineer");
        assert_eq!(experience[0].employer, "Initech");
        assert_eq!(experience[0].start.as_deref(), Some("2019"));
    }

    #[test]
    fn test_split_role_orders_title_first() {
        assert_eq!(
            split_role("Acme Corp | Staff Engineer"),
            ("Staff Engineer".to_string(), "Acme Corp".to_string())
        );
        assert_eq!(
            split_role("Product Manager, Globex, Berlin"),
            ("Product Manager".to_string(), "Globex".to_string())
        );
        assert_eq!(split_role("Freelance"), ("Freelance".to_string(), String::new()));
    }

    #[test]
    fn test_import_resume_file_types() {
        let dir = tempfile::TempDir::new().unwrap();

        let txt = dir.path().join("resume.txt");
        std::fs::File::create(&txt)
            .unwrap()
            .write_all(SAMPLE.as_bytes())
            .unwrap();
        assert_eq!(import_resume(&txt).unwrap().name.as_deref(), Some("Jane Doe"));

        let odt = dir.path().join("resume.odt");
        std::fs::write(&odt, b"PK").unwrap();
        assert!(matches!(import_resume(&odt), Err(ResumeError::UnsupportedFormat(_))));

        let broken = dir.path().join("broken.docx");
        std::fs::write(&broken, b"PK").unwrap();
        assert!(matches!(import_resume(&broken), Err(ResumeError::Docx(_))));

        let empty = dir.path().join("empty.md");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(matches!(import_resume(&empty), Err(ResumeError::Empty(_))));

        let missing = dir.path().join("missing.txt");
        assert!(matches!(import_resume(&missing), Err(ResumeError::Io { .. })));
    }

    fn write_docx(path: &Path, paragraphs: &[&str]) {
        let body: String = paragraphs
            .iter()
            .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_import_docx_resume() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Resume.DOCX");
        write_docx(
            &path,
            &[
                "Jane Doe",
                "Backend Engineer",
                "jane@example.com | 555-123-4567",
                "EXPERIENCE",
                "Senior Engineer at Acme Corp",
                "Jan 2020 - Present",
                "SKILLS",
                "Rust, PostgreSQL &amp; Redis",
            ],
        );

        let profile = import_resume(&path).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.email.as_deref(), Some("jane@example.com"));
        let experience = profile.experience.unwrap();
        assert_eq!(experience[0].employer, "Acme Corp");
        assert_eq!(experience[0].start.as_deref(), Some("Jan 2020"));
        assert!(profile.skills.unwrap().iter().any(|s| s.contains("Redis")));
    }

    #[test]
    fn test_unreadable_resume_is_a_failed_import() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.txt");
        std::fs::write(&path, "EXPERIENCE\n%%%%\n....\n").unwrap();
        assert!(matches!(import_resume(&path), Err(ResumeError::NothingFound(_))));
    }
}
