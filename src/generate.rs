use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::ai::AIProvider;
use crate::dates::format_month;
use crate::db::Database;
use crate::models::{CanonicalProfile, DocumentKind, Job, NewApplication};
use crate::pdf::PdfRenderer;

pub const RESUME_SYSTEM_PROMPT: &str = "\
You are an expert resume writer. You write professional, ATS-friendly resumes
that put the candidate's key achievements first and match the job's requirements.

Guidelines:
- Professional, confident tone
- Quantify achievements where the background supports it
- Highlight only the most relevant areas so the resume stays readable
- Tailor skills and experience to the specific role
- One to two pages at most
- Action verbs and results-oriented language
- Clean markdown formatting
- Never invent employers, titles, dates or degrees that are not in the background
";

pub const COVER_LETTER_SYSTEM_PROMPT: &str = "\
You are an expert cover letter writer. You write compelling, professional cover
letters that connect a candidate's experience to a specific job's requirements.

Guidelines:
- Confident but not arrogant
- Address concrete requirements from the job description
- Connect the background directly to what the company needs
- Three to four paragraphs at most
- Specific, never generic
- End with a clear call to action
";

const RESUME_INSTRUCTIONS: &str = "\
Create a professional resume tailored for this specific role.
- Emphasize experience and skills that match the job requirements
- Highlight relevant achievements with metrics where possible
- Keep it concise and scannable
- Format as clean markdown

Output ONLY the resume content in markdown format, no additional commentary.";

const COVER_LETTER_INSTRUCTIONS: &str = "\
Write a cover letter that:
1. Opens with a strong hook connecting to the role or company
2. Highlights 2-3 key qualifications that match the job requirements
3. Shows understanding of the company and what they need
4. Closes with confidence and a call to action

Output ONLY the cover letter content in markdown format, no additional commentary.";

/// What to generate for one job.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub job_id: i64,
    pub kinds: Vec<DocumentKind>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub kind: DocumentKind,
    pub markdown_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
}

fn system_prompt(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Resume => RESUME_SYSTEM_PROMPT,
        DocumentKind::CoverLetter => COVER_LETTER_SYSTEM_PROMPT,
    }
}

pub fn build_prompt(
    kind: DocumentKind,
    job: &Job,
    background: &str,
    instructions: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Create a tailored {} for the following job:\n\n\
         ## Target Role\n**Title:** {}\n**Company:** {}\n\n\
         ## Job Description\n{}\n\n\
         ## Candidate Background\n{}\n\n\
         ## Instructions\n",
        kind.label(),
        job.title,
        job.company,
        job.description.trim(),
        background.trim(),
    );
    match kind {
        DocumentKind::Resume => prompt.push_str(RESUME_INSTRUCTIONS),
        DocumentKind::CoverLetter => {
            prompt.push_str(COVER_LETTER_INSTRUCTIONS);
            prompt.push_str(&format!(
                "\nStart with \"Dear Hiring Team at {},\" or an appropriate greeting.",
                job.company
            ));
        }
    }

    if let Some(extra) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\n## Additional Instructions\n");
        prompt.push_str(extra);
    }
    prompt
}

fn date_span(start: Option<String>, end: Option<String>, open_label: &str) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!(" ({} - {})", s, e),
        (Some(s), None) => format!(" ({} - {})", s, open_label),
        (None, Some(e)) => format!(" ({})", e),
        (None, None) => String::new(),
    }
}

/// Renders the merged profile as the plain-text background block that goes
/// into every prompt. Empty fields are left out.
pub fn render_background(profile: &CanonicalProfile) -> String {
    let mut out = String::new();
    let scalars = [
        ("Name", &profile.name),
        ("Headline", &profile.headline),
        ("Location", &profile.location),
        ("Email", &profile.email),
        ("Phone", &profile.phone),
    ];
    for (label, value) in scalars {
        if let Some(value) = value {
            out.push_str(&format!("{}: {}\n", label, value));
        }
    }
    if !profile.links.is_empty() {
        out.push_str(&format!("Links: {}\n", profile.links.join(", ")));
    }

    if let Some(summary) = &profile.summary {
        out.push_str(&format!("\nSummary:\n{}\n", summary.trim()));
    }

    if !profile.experience.is_empty() {
        out.push_str("\nExperience:\n");
        for exp in &profile.experience {
            let span = date_span(
                Some(format_month(exp.start)),
                exp.end.map(format_month),
                "Present",
            );
            out.push_str(&format!("- {} at {}{}\n", exp.title, exp.employer, span));
            if let Some(desc) = &exp.description {
                for line in desc.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    out.push_str(&format!("  {}\n", line));
                }
            }
        }
    }

    if !profile.education.is_empty() {
        out.push_str("\nEducation:\n");
        for edu in &profile.education {
            let degree = match (&edu.degree, &edu.field) {
                (Some(d), Some(f)) => format!("{} in {}, ", d, f),
                (Some(d), None) => format!("{}, ", d),
                (None, Some(f)) => format!("{}, ", f),
                (None, None) => String::new(),
            };
            let span = date_span(edu.start.map(format_month), edu.end.map(format_month), "Present");
            out.push_str(&format!("- {}{}{}\n", degree, edu.school, span));
        }
    }

    if !profile.skills.is_empty() {
        out.push_str(&format!("\nSkills: {}\n", profile.skills.join(", ")));
    }

    if !profile.projects.is_empty() {
        out.push_str("\nProjects:\n");
        for project in &profile.projects {
            out.push_str(&format!("- {}", project.name));
            if let Some(lang) = &project.language {
                out.push_str(&format!(" ({})", lang));
            }
            if let Some(desc) = &project.description {
                out.push_str(&format!(": {}", desc.replace('\n', " ")));
            }
            if let Some(url) = &project.url {
                out.push_str(&format!(" <{}>", url));
            }
            out.push('\n');
        }
    }

    out
}

/// Lowercase ASCII words joined by hyphens, at most 60 characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if slug.len() + word.len() + 1 > 60 {
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_lowercase());
    }
    if slug.is_empty() {
        slug.push_str("job");
    }
    slug
}

pub fn output_dir(applications_dir: &Path, job: &Job) -> PathBuf {
    applications_dir.join(format!(
        "{}-{}",
        job.id,
        slugify(&format!("{} {}", job.company, job.title))
    ))
}

fn file_stem(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Resume => "resume",
        DocumentKind::CoverLetter => "cover-letter",
    }
}

struct Draft {
    kind: DocumentKind,
    markdown: String,
    pdf: Option<Vec<u8>>,
}

// Files are staged under temporary names and renamed once all writes succeed.
fn write_drafts(dir: &Path, drafts: &[Draft]) -> Result<Vec<GeneratedDocument>> {
    let created_dir = !dir.exists();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let staged = stage_files(dir, drafts);
    let staged = match staged {
        Ok(staged) => staged,
        Err(e) => {
            if created_dir {
                if let Err(cleanup) = fs::remove_dir_all(dir) {
                    debug!(error = %cleanup, "failed to remove partial output directory");
                }
            }
            return Err(e);
        }
    };

    let mut documents = Vec::with_capacity(drafts.len());
    for (draft, files) in drafts.iter().zip(staged) {
        let mut pdf_path = None;
        for (tmp, path) in files {
            tmp.persist(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if path.extension().is_some_and(|ext| ext == "pdf") {
                pdf_path = Some(path);
            }
        }
        documents.push(GeneratedDocument {
            kind: draft.kind,
            markdown_path: dir.join(format!("{}.md", file_stem(draft.kind))),
            pdf_path,
        });
    }
    Ok(documents)
}

fn stage_files(dir: &Path, drafts: &[Draft]) -> Result<Vec<Vec<(NamedTempFile, PathBuf)>>> {
    use std::io::Write;

    let mut staged = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let stem = file_stem(draft.kind);
        let mut files = Vec::new();

        let mut outputs: Vec<(PathBuf, &[u8])> =
            vec![(dir.join(format!("{}.md", stem)), draft.markdown.as_bytes())];
        if let Some(pdf) = &draft.pdf {
            outputs.push((dir.join(format!("{}.pdf", stem)), pdf.as_slice()));
        }

        for (path, bytes) in outputs {
            let mut tmp = NamedTempFile::new_in(dir)
                .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
            tmp.write_all(bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            files.push((tmp, path));
        }
        staged.push(files);
    }
    Ok(staged)
}

/// Generates the requested documents for one job. A failure at any step
/// leaves no files, no application rows and the job status unchanged.
pub fn generate_application(
    db: &Database,
    profile: &CanonicalProfile,
    provider: &dyn AIProvider,
    request: &GenerateRequest,
    pdf: Option<&dyn PdfRenderer>,
    applications_dir: &Path,
) -> Result<Vec<GeneratedDocument>> {
    let Some(job) = db.get_job(request.job_id)? else {
        bail!("Job {} not found", request.job_id);
    };
    if profile.is_empty() {
        bail!("Your profile is empty. Import a resume or set profile fields first (jobkit import / jobkit profile set).");
    }
    if request.kinds.is_empty() {
        bail!("Nothing to generate");
    }

    let background = render_background(profile);
    let mut drafts = Vec::with_capacity(request.kinds.len());
    for &kind in &request.kinds {
        info!(job_id = job.id, kind = %kind, model = provider.model_name(), "generating");
        let prompt = build_prompt(kind, &job, &background, request.instructions.as_deref());
        let markdown = provider
            .complete(system_prompt(kind), &prompt)
            .with_context(|| format!("Failed to generate {}", kind.label()))?;
        drafts.push(Draft {
            kind,
            markdown,
            pdf: None,
        });
    }

    if let Some(renderer) = pdf {
        for draft in &mut drafts {
            let bytes = renderer
                .render(&draft.markdown)
                .with_context(|| format!("Failed to render {} PDF", draft.kind.label()))?;
            draft.pdf = Some(bytes);
        }
    }

    let dir = output_dir(applications_dir, &job);
    let documents = write_drafts(&dir, &drafts)?;

    let records: Vec<NewApplication> = documents
        .iter()
        .map(|doc| NewApplication {
            kind: doc.kind,
            markdown_path: doc.markdown_path.display().to_string(),
            pdf_path: doc.pdf_path.as_ref().map(|p| p.display().to_string()),
            model: provider.model_name().to_string(),
        })
        .collect();
    db.record_applications(job.id, &records)?;

    info!(job_id = job.id, dir = %dir.display(), documents = documents.len(), "saved application");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::models::{Experience, JobStatus, Project, ScrapedJob};
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FakeProvider {
        fail_on: Option<DocumentKind>,
        prompts: RefCell<Vec<String>>,
    }

    impl FakeProvider {
        fn new(fail_on: Option<DocumentKind>) -> Self {
            Self {
                fail_on,
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AIProvider for FakeProvider {
        fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let kind = if system == RESUME_SYSTEM_PROMPT {
                DocumentKind::Resume
            } else {
                DocumentKind::CoverLetter
            };
            if self.fail_on == Some(kind) {
                return Err(AiError::Api {
                    provider: "fake",
                    status: 400,
                    message: "bad request".to_string(),
                });
            }
            Ok(format!("# {}\n\n- generated", kind.label()))
        }

        fn model_name(&self) -> &str {
            "fake-model"
        }
    }

    struct FakePdf;

    impl PdfRenderer for FakePdf {
        fn render(&self, _markdown: &str) -> Result<Vec<u8>> {
            Ok(b"%PDF-1.4 fake".to_vec())
        }
    }

    fn setup() -> (TempDir, Database, i64) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("jobkit.db")).unwrap();
        db.init().unwrap();
        let id = db
            .insert_job(&ScrapedJob {
                source: "linkedin".to_string(),
                external_id: "4001".to_string(),
                title: "Staff Engineer".to_string(),
                company: "Acme Corp".to_string(),
                location: "Remote".to_string(),
                description: "Own the storage layer.".to_string(),
                url: "https://www.linkedin.com/jobs/view/4001/".to_string(),
                salary: None,
                posted_date: None,
            })
            .unwrap()
            .id();
        (dir, db, id)
    }

    fn profile() -> CanonicalProfile {
        CanonicalProfile {
            name: Some("Jane Doe".to_string()),
            headline: Some("Backend engineer".to_string()),
            experience: vec![Experience {
                employer: "Globex".to_string(),
                title: "Senior Engineer".to_string(),
                start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end: None,
                description: Some("Led storage.\nCut latency.".to_string()),
            }],
            skills: vec!["Rust".to_string(), "SQL".to_string()],
            projects: vec![Project {
                name: "jobkit".to_string(),
                language: Some("Rust".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn request(job_id: i64, kinds: &[DocumentKind]) -> GenerateRequest {
        GenerateRequest {
            job_id,
            kinds: kinds.to_vec(),
            instructions: Some("Mention open source work.".to_string()),
        }
    }

    #[test]
    fn test_generate_writes_files_and_records() {
        let (dir, db, id) = setup();
        let apps_dir = dir.path().join("applications");
        let provider = FakeProvider::new(None);

        let docs = generate_application(
            &db,
            &profile(),
            &provider,
            &request(id, &DocumentKind::ALL),
            Some(&FakePdf),
            &apps_dir,
        )
        .unwrap();

        assert_eq!(docs.len(), 2);
        let out = apps_dir.join(format!("{}-acme-corp-staff-engineer", id));
        assert_eq!(docs[0].markdown_path, out.join("resume.md"));
        assert_eq!(docs[1].pdf_path.as_deref(), Some(out.join("cover-letter.pdf").as_path()));
        assert!(std::fs::read_to_string(out.join("resume.md")).unwrap().contains("generated"));
        assert!(out.join("cover-letter.md").exists());

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Generated);
        let apps = db.list_applications(id).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].model, "fake-model");

        let prompts = provider.prompts.borrow();
        assert!(prompts[0].contains("Jane Doe"));
        assert!(prompts[0].contains("**Title:** Staff Engineer"));
        assert!(prompts[0].contains("**Company:** Acme Corp"));
        assert!(prompts[0].ends_with("## Additional Instructions\nMention open source work."));
        assert!(prompts[1].contains("Dear Hiring Team at Acme Corp,"));
    }

    #[test]
    fn test_failure_leaves_no_trace() {
        let (dir, db, id) = setup();
        let apps_dir = dir.path().join("applications");
        let provider = FakeProvider::new(Some(DocumentKind::CoverLetter));

        let err = generate_application(
            &db,
            &profile(),
            &provider,
            &request(id, &DocumentKind::ALL),
            None,
            &apps_dir,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cover letter"));

        assert!(!apps_dir.exists());
        assert!(db.list_applications(id).unwrap().is_empty());
        assert_eq!(db.get_job(id).unwrap().unwrap().status, JobStatus::NotApplied);
    }

    #[test]
    fn test_missing_job_and_empty_profile() {
        let (dir, db, id) = setup();
        let provider = FakeProvider::new(None);
        let apps_dir = dir.path().join("applications");

        let err = generate_application(&db, &profile(), &provider, &request(999, &[DocumentKind::Resume]), None, &apps_dir)
            .unwrap_err();
        assert!(err.to_string().contains("999"));

        let err = generate_application(
            &db,
            &CanonicalProfile::default(),
            &provider,
            &request(id, &[DocumentKind::Resume]),
            None,
            &apps_dir,
        )
        .unwrap_err();
        assert!(err.to_string().contains("profile is empty"));
        assert!(provider.prompts.borrow().is_empty());
    }

    #[test]
    fn test_projects_only_profile_is_usable() {
        let (dir, db, id) = setup();
        let provider = FakeProvider::new(None);
        let github_only = CanonicalProfile {
            projects: profile().projects,
            links: vec!["https://github.com/jane".to_string()],
            ..Default::default()
        };
        assert!(!github_only.is_empty());

        let docs = generate_application(
            &db,
            &github_only,
            &provider,
            &request(id, &[DocumentKind::Resume]),
            None,
            &dir.path().join("applications"),
        )
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(provider.prompts.borrow()[0].contains("jobkit"));
    }

    #[test]
    fn test_applied_job_keeps_status() {
        let (dir, db, id) = setup();
        db.set_status(id, JobStatus::Applied).unwrap();
        let provider = FakeProvider::new(None);

        generate_application(
            &db,
            &profile(),
            &provider,
            &request(id, &[DocumentKind::Resume]),
            None,
            &dir.path().join("applications"),
        )
        .unwrap();
        assert_eq!(db.get_job(id).unwrap().unwrap().status, JobStatus::Applied);
    }

    #[test]
    fn test_render_background() {
        let text = render_background(&profile());
        assert!(text.starts_with("Name: Jane Doe\nHeadline: Backend engineer\n"));
        assert!(text.contains("- Senior Engineer at Globex (2020-01 - Present)\n  Led storage.\n  Cut latency.\n"));
        assert!(text.contains("Skills: Rust, SQL"));
        assert!(text.contains("- jobkit (Rust)\n"));
        assert!(!text.contains("Education"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme, Inc. Senior Engineer (Remote)"), "acme-inc-senior-engineer-remote");
        assert_eq!(slugify("!!!"), "job");
        assert!(slugify(&"word ".repeat(40)).len() <= 60);
    }
}
