mod ai;
mod browser;
mod config;
mod dates;
mod db;
mod generate;
mod github;
mod linkedin;
mod merge;
mod models;
mod pdf;
mod profile;
mod resume;
mod scrapers;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use db::{Database, InsertOutcome, JobFilter};
use generate::{generate_application, GenerateRequest};
use models::{CanonicalProfile, DocumentKind, JobStatus, ProfileSource};
use pdf::{ChromePdfRenderer, PdfRenderer};
use profile::{ProfileDocument, ProfileStore};
use scrapers::{open_source, SearchQuery};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobkit")]
#[command(version, about = "Job search assistant - find postings, build your profile, generate tailored applications")]
struct Cli {
    /// Data directory for config, profile, database and generated files
    #[arg(long, global = true, env = "JOBKIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and default config
    Init,

    /// Search a job site and save new postings
    Search {
        /// Search keywords (defaults to search.keywords)
        keywords: Option<String>,

        /// Location (defaults to search.location)
        #[arg(short, long)]
        location: Option<String>,

        /// Maximum number of postings to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Job source
        #[arg(long, default_value = "linkedin")]
        source: String,
    },

    /// Fetch a single posting by id or URL and save it
    Fetch {
        /// Job id or posting URL
        id: String,

        /// Job source
        #[arg(long, default_value = "linkedin")]
        source: String,
    },

    /// List saved jobs
    List {
        /// Only jobs without generated documents
        #[arg(short, long)]
        pending: bool,

        /// Filter by status (not_applied, generated, applied)
        #[arg(short, long)]
        status: Option<JobStatus>,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Set a job's status
    Status {
        /// Job ID
        id: i64,

        /// not_applied, generated or applied
        status: JobStatus,
    },

    /// Import profile data from a resume, LinkedIn or GitHub
    Import {
        /// Resume file (.txt, .md, .pdf or .docx)
        #[arg(long)]
        resume: Option<PathBuf>,

        /// LinkedIn profile URL
        #[arg(long)]
        linkedin: Option<String>,

        /// GitHub username or profile URL
        #[arg(long)]
        github: Option<String>,
    },

    /// View or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Generate a tailored resume and/or cover letter for a job
    Generate {
        /// Job ID
        id: i64,

        /// Which documents to generate
        #[arg(short, long, value_enum, default_value = "both")]
        doc: DocChoice,

        /// Also export PDFs
        #[arg(long)]
        pdf: bool,

        /// Extra instructions appended to the prompt
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// List documents generated for a job
    Applications {
        /// Job ID
        id: i64,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the merged profile
    Show,

    /// Set a field by hand (overrides every imported source)
    Set {
        /// name, email, headline, phone, location or summary
        field: String,
        value: String,
    },

    /// Clear a hand-set field
    Unset {
        field: String,
    },

    /// Add a skill by hand
    AddSkill {
        skill: String,
    },

    /// Re-merge the stored sources
    Remerge,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current configuration
    Show,

    /// Set a value by dotted key, e.g. llm.provider anthropic
    Set {
        key: String,
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DocChoice {
    Resume,
    CoverLetter,
    Both,
}

impl DocChoice {
    fn kinds(self) -> Vec<DocumentKind> {
        match self {
            DocChoice::Resume => vec![DocumentKind::Resume],
            DocChoice::CoverLetter => vec![DocumentKind::CoverLetter],
            DocChoice::Both => DocumentKind::ALL.to_vec(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "jobkit=debug,info" } else { "jobkit=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_db(config: &Config) -> Result<Database> {
    let path = config.db_path();
    if !path.exists() {
        bail!("No database at {}. Run 'jobkit init' first.", path.display());
    }
    let db = Database::open(&path)?;
    db.ensure_initialized()?;
    Ok(db)
}

fn import_sources(
    config: &Config,
    resume_path: Option<PathBuf>,
    linkedin_url: Option<String>,
    github_user: Option<String>,
) -> Result<()> {
    if resume_path.is_none() && linkedin_url.is_none() && github_user.is_none() {
        bail!("Nothing to import. Use --resume, --linkedin and/or --github.");
    }

    let store = ProfileStore::new(config.profile_path());
    let mut doc = store.load()?;
    let mut imported = Vec::new();
    let mut failed = 0;

    let mut record = |source: ProfileSource, result: Result<models::PartialProfile>, doc: &mut ProfileDocument| {
        match result {
            Ok(partial) => {
                doc.apply_import(source, partial);
                println!("  Imported {}", source);
                imported.push(source);
            }
            Err(e) => {
                warn!(source = %source, error = %e, "import failed");
                println!("  Warning: {} import failed: {:#}", source, e);
                failed += 1;
            }
        }
    };

    if let Some(path) = resume_path {
        println!("Reading resume {}...", path.display());
        record(
            ProfileSource::Resume,
            resume::import_resume(&path).map_err(anyhow::Error::from),
            &mut doc,
        );
    }
    if let Some(url) = linkedin_url {
        println!("Opening LinkedIn profile {}...", url);
        record(ProfileSource::LinkedIn, linkedin::import_profile(config, &url), &mut doc);
    }
    if let Some(user) = github_user {
        println!("Fetching GitHub profile {}...", user);
        let result = github::GitHubImporter::new().and_then(|importer| importer.import(&user));
        record(ProfileSource::GitHub, result, &mut doc);
    }

    if imported.is_empty() {
        bail!("No source could be imported ({} failed)", failed);
    }
    store.save(&doc)?;
    println!("Saved profile to {}", store.path().display());

    println!();
    print_profile(&doc.canonical);
    print_warnings(&doc);
    Ok(())
}

fn print_profile(profile: &CanonicalProfile) {
    if profile.is_empty() {
        println!("Profile is empty. Use 'jobkit import' or 'jobkit profile set'.");
        return;
    }
    let scalars = [
        ("Name", &profile.name),
        ("Headline", &profile.headline),
        ("Email", &profile.email),
        ("Phone", &profile.phone),
        ("Location", &profile.location),
    ];
    for (label, value) in scalars {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }
    if let Some(summary) = &profile.summary {
        println!("\nSummary:\n{}", textwrap::indent(&textwrap::fill(summary, 78), "  "));
    }
    if !profile.experience.is_empty() {
        println!("\nExperience ({}):", profile.experience.len());
        for exp in &profile.experience {
            let end = exp.end.map(dates::format_month).unwrap_or_else(|| "present".to_string());
            println!(
                "  {} - {}  {} at {}",
                dates::format_month(exp.start),
                end,
                exp.title,
                exp.employer
            );
        }
    }
    if !profile.education.is_empty() {
        println!("\nEducation ({}):", profile.education.len());
        for edu in &profile.education {
            match &edu.degree {
                Some(degree) => println!("  {}, {}", degree, edu.school),
                None => println!("  {}", edu.school),
            }
        }
    }
    if !profile.skills.is_empty() {
        println!("\nSkills:\n{}", textwrap::indent(&textwrap::fill(&profile.skills.join(", "), 78), "  "));
    }
    if !profile.projects.is_empty() {
        println!("\nProjects ({}):", profile.projects.len());
        for project in &profile.projects {
            println!("  {}", project.name);
        }
    }
    if !profile.links.is_empty() {
        println!("\nLinks:");
        for link in &profile.links {
            println!("  {}", link);
        }
    }
}

fn print_warnings(doc: &ProfileDocument) {
    if doc.warnings.is_empty() {
        return;
    }
    println!("\nMerge warnings ({}):", doc.warnings.len());
    for w in &doc.warnings {
        println!("  [{}] {}: {}", w.source, w.field, w.message);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(Config::default_data_dir);
    let mut config = Config::load(&data_dir)?;

    match cli.command {
        Commands::Init => {
            config.ensure_dirs()?;
            if !config.config_path().exists() {
                config.save()?;
            }
            let db = Database::open(&config.db_path())?;
            db.init()?;
            println!("Initialized jobkit in {}", data_dir.display());
            println!("  Config:   {}", config.config_path().display());
            println!("  Database: {}", db.path().display());
        }

        Commands::Search {
            keywords,
            location,
            limit,
            source,
        } => {
            let db = open_db(&config)?;
            let query = SearchQuery::from_config(&config.search, keywords, location, limit);
            let mut source = open_source(&source, &config)?;

            println!(
                "Searching {} for '{}' in {} (max {})...",
                source.name(),
                query.keywords,
                query.location,
                query.max_jobs
            );
            let jobs = source.search(&query)?;

            let mut added = 0;
            for job in &jobs {
                match db.insert_job(job)? {
                    InsertOutcome::Inserted(id) => {
                        added += 1;
                        println!("  + #{:<5} {} at {}", id, truncate(&job.title, 40), job.company);
                    }
                    InsertOutcome::Duplicate(id) => {
                        println!("    #{:<5} {} (already saved)", id, truncate(&job.title, 40));
                    }
                }
            }
            println!("\nFound {} jobs, {} new.", jobs.len(), added);
        }

        Commands::Fetch { id, source } => {
            let db = open_db(&config)?;
            let known = linkedin::extract_job_id(&id)
                .filter(|_| source.eq_ignore_ascii_case(linkedin::SOURCE_NAME))
                .map(|external_id| db.find_job(linkedin::SOURCE_NAME, &external_id))
                .transpose()?
                .flatten();
            if let Some(job) = known {
                println!("Job already saved as #{}: {} at {}", job.id, job.title, job.company);
                return Ok(());
            }

            let mut source = open_source(&source, &config)?;
            let job = source
                .get_job(&id)?
                .ok_or_else(|| anyhow!("No job details found for '{}'", id))?;
            match db.insert_job(&job)? {
                InsertOutcome::Inserted(job_id) => {
                    println!("Added job #{}: {} at {}", job_id, job.title, job.company)
                }
                InsertOutcome::Duplicate(job_id) => println!("Job already saved as #{}.", job_id),
            }
        }

        Commands::List { pending, status } => {
            let db = open_db(&config)?;
            let jobs = db.list_jobs(&JobFilter { status, pending })?;
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!("{:<6} {:<12} {:<32} {:<22} {:<16}", "ID", "STATUS", "TITLE", "COMPANY", "LOCATION");
                println!("{}", "-".repeat(90));
                for job in jobs {
                    println!(
                        "{:<6} {:<12} {:<32} {:<22} {:<16}",
                        job.id,
                        job.status,
                        truncate(&job.title, 30),
                        truncate(&job.company, 20),
                        truncate(&job.location, 16)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let db = open_db(&config)?;
            match db.get_job(id)? {
                Some(job) => {
                    println!("Job #{}", job.id);
                    println!("Title: {}", job.title);
                    println!("Company: {}", job.company);
                    println!("Location: {}", job.location);
                    println!("Status: {}", job.status);
                    if let Some(salary) = &job.salary {
                        println!("Salary: {}", salary);
                    }
                    if let Some(posted) = &job.posted_date {
                        println!("Posted: {}", posted);
                    }
                    println!("Source: {} ({})", job.source, job.external_id);
                    println!("URL: {}", job.url);
                    println!("Discovered: {}", job.discovered_at.format("%Y-%m-%d %H:%M"));

                    let apps = db.list_applications(job.id)?;
                    if !apps.is_empty() {
                        println!("Generated documents: {}", apps.len());
                    }
                    println!("\n--- Description ---\n{}", textwrap::fill(&job.description, 80));
                }
                None => {
                    println!("Job #{} not found.", id);
                }
            }
        }

        Commands::Status { id, status } => {
            let db = open_db(&config)?;
            db.set_status(id, status)?;
            println!("Job #{} marked as {}.", id, status);
        }

        Commands::Import {
            resume,
            linkedin,
            github,
        } => {
            config.ensure_dirs()?;
            import_sources(&config, resume, linkedin, github)?;
        }

        Commands::Profile { command } => {
            let store = ProfileStore::new(config.profile_path());
            let mut doc = store.load()?;
            match command {
                ProfileCommands::Show => {
                    print_profile(&doc.canonical);
                    if !doc.sources.is_empty() {
                        let sources: Vec<&str> = doc.sources.keys().map(|s| s.as_str()).collect();
                        println!("\nSources: {}", sources.join(", "));
                    }
                    if let Some(updated) = doc.updated_at {
                        println!("Updated: {}", updated.format("%Y-%m-%d %H:%M"));
                    }
                    print_warnings(&doc);
                }

                ProfileCommands::Set { field, value } => {
                    doc.set_manual_field(&field, &value)?;
                    store.save(&doc)?;
                    println!("Set {} = {}", field, value);
                }

                ProfileCommands::Unset { field } => {
                    doc.unset_manual_field(&field)?;
                    store.save(&doc)?;
                    println!("Cleared manual {}.", field);
                }

                ProfileCommands::AddSkill { skill } => {
                    doc.add_manual_skill(&skill);
                    store.save(&doc)?;
                    println!("Added skill '{}'. {} skills total.", skill, doc.canonical.skills.len());
                }

                ProfileCommands::Remerge => {
                    doc.remerge();
                    store.save(&doc)?;
                    println!("Re-merged {} source(s).", doc.sources.len());
                    print_warnings(&doc);
                }
            }
        }

        Commands::Generate {
            id,
            doc,
            pdf,
            instructions,
        } => {
            let db = open_db(&config)?;
            let profile = ProfileStore::new(config.profile_path()).load()?.canonical;
            let provider = ai::create_provider(&config.llm)?;
            let renderer = ChromePdfRenderer::new(&config.browser);
            let request = GenerateRequest {
                job_id: id,
                kinds: doc.kinds(),
                instructions,
            };

            println!("Generating with {} ({})...", config.llm.provider, provider.model_name());
            let docs = generate_application(
                &db,
                &profile,
                provider.as_ref(),
                &request,
                pdf.then_some(&renderer as &dyn PdfRenderer),
                &config.applications_dir(),
            )?;

            for doc in docs {
                println!("  {}: {}", doc.kind.label(), doc.markdown_path.display());
                if let Some(pdf_path) = &doc.pdf_path {
                    println!("  {} PDF: {}", doc.kind.label(), pdf_path.display());
                }
            }
        }

        Commands::Applications { id } => {
            let db = open_db(&config)?;
            let apps = db.list_applications(id)?;
            if apps.is_empty() {
                println!("No documents generated for job #{}.", id);
            } else {
                println!("{:<6} {:<14} {:<18} {:<18} {}", "ID", "KIND", "MODEL", "CREATED", "FILE");
                println!("{}", "-".repeat(90));
                for app in apps {
                    println!(
                        "{:<6} {:<14} {:<18} {:<18} {}",
                        app.id,
                        app.kind,
                        truncate(&app.model, 16),
                        app.created_at.format("%Y-%m-%d %H:%M"),
                        app.pdf_path.as_deref().unwrap_or(&app.markdown_path)
                    );
                }
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let mut shown = config.clone();
                if shown.llm.api_key.is_some() {
                    shown.llm.api_key = Some("********".to_string());
                }
                println!("# {}", config.config_path().display());
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }

            ConfigCommands::Set { key, value } => {
                config.set_value(&key, &value)?;
                config.save()?;
                println!("Set {} = {}", key, value);
            }
        },
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
