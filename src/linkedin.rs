use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{BrowserConfig, Config};
use crate::dates::split_range;
use crate::models::{PartialEducation, PartialExperience, PartialProfile, ScrapedJob};
use crate::scrapers::{JobSource, SearchQuery};

pub const SOURCE_NAME: &str = "linkedin";

const JOBS_SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";
const MAX_DESCRIPTION_CHARS: usize = 5000;

const TITLE_SELECTORS: [&str; 8] = [
    ".jobs-unified-top-card__job-title",
    ".job-details-jobs-unified-top-card__job-title",
    ".jobs-unified-top-card h1",
    ".jobs-unified-top-card h2",
    "h1.t-24",
    ".job-details h1",
    ".jobs-details-top-card__job-title",
    "h1.top-card-layout__title",
];

const COMPANY_SELECTORS: [&str; 6] = [
    ".jobs-unified-top-card__company-name",
    ".job-details-jobs-unified-top-card__company-name",
    ".jobs-unified-top-card__primary-description a",
    ".topcard__org-name-link",
    ".jobs-details-top-card__company-url",
    ".top-card-layout__second-subline a",
];

const LOCATION_SELECTORS: [&str; 5] = [
    ".jobs-unified-top-card__bullet",
    ".job-details-jobs-unified-top-card__bullet",
    ".jobs-unified-top-card__workplace-type",
    ".topcard__flavor--bullet",
    ".jobs-details-top-card__bullet",
];

const DESCRIPTION_SELECTORS: [&str; 5] = [
    ".jobs-description__content",
    ".jobs-description-content__text",
    ".jobs-box__html-content",
    ".jobs-description",
    ".show-more-less-html__markup",
];

const SALARY_SELECTORS: [&str; 3] = [
    ".compensation__salary",
    ".salary",
    ".job-details-jobs-unified-top-card__job-insight span[dir='ltr']",
];

const POSTED_SELECTORS: [&str; 2] = [".posted-time-ago__text", ".jobs-unified-top-card__posted-date"];

// --- Search URL ---

fn remote_code(option: &str) -> Option<&'static str> {
    match option {
        "on-site" | "onsite" => Some("1"),
        "remote" => Some("2"),
        "hybrid" => Some("3"),
        _ => None,
    }
}

fn experience_code(level: &str) -> Option<&'static str> {
    match level {
        "internship" => Some("1"),
        "entry" => Some("2"),
        "associate" => Some("3"),
        "mid-senior" => Some("4"),
        "director" => Some("5"),
        "executive" => Some("6"),
        _ => None,
    }
}

fn date_posted_code(window: &str) -> Option<&'static str> {
    match window {
        "day" => Some("r86400"),
        "week" => Some("r604800"),
        "month" => Some("r2592000"),
        _ => None,
    }
}

fn joined_codes(values: &[String], lookup: fn(&str) -> Option<&'static str>) -> Option<String> {
    let codes: Vec<&str> = values
        .iter()
        .filter_map(|v| lookup(v.trim().to_lowercase().as_str()))
        .collect();
    if codes.is_empty() { None } else { Some(codes.join(",")) }
}

/// Unknown filter values are skipped rather than rejected.
pub fn build_search_url(query: &SearchQuery) -> Result<Url> {
    let mut params: Vec<(&str, String)> = vec![("keywords", query.keywords.clone())];
    if !query.location.trim().is_empty() {
        params.push(("location", query.location.clone()));
    }
    if let Some(codes) = joined_codes(&query.remote_options, remote_code) {
        params.push(("f_WT", codes));
    }
    if let Some(codes) = joined_codes(&query.experience_level, experience_code) {
        params.push(("f_E", codes));
    }
    if let Some(code) = query.date_posted.as_deref().and_then(date_posted_code) {
        params.push(("f_TPR", code.to_string()));
    }
    Url::parse_with_params(JOBS_SEARCH_URL, &params).context("Failed to build search URL")
}

pub fn job_url(job_id: &str) -> String {
    format!("https://www.linkedin.com/jobs/view/{}/", job_id)
}

/// Accepts a bare numeric id or any LinkedIn URL that carries one.
pub fn extract_job_id(input: &str) -> Option<String> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return Some(input.to_string());
    }

    let patterns = [
        r"/jobs/view/(?:[^/?#]*-)?(\d+)",
        r"currentJobId=(\d+)",
        r"jobPosting:(\d+)",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).ok()?;
        if let Some(caps) = re.captures(input) {
            return Some(caps[1].to_string());
        }
    }
    None
}

// --- HTML helpers ---

fn clean_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn block_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_match<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        scope
            .select(&selector)
            .find(|el| !clean_text(*el).is_empty())
    })
}

fn first_text(scope: ElementRef, selectors: &[&str]) -> Option<String> {
    first_match(scope, selectors).map(clean_text)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// --- Search results and job pages ---

/// Job ids on a search results page, in page order, without repeats.
pub fn parse_search_results(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    let attr_sources = [
        ("[data-occludable-job-id]", "data-occludable-job-id"),
        ("[data-job-id]", "data-job-id"),
        ("[data-entity-urn*='jobPosting']", "data-entity-urn"),
        ("a[href*='/jobs/view/']", "href"),
    ];
    for (css, attr) in attr_sources {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(id) = element.value().attr(attr).and_then(extract_job_id) else {
                continue;
            };
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Parses a job posting page. Returns `None` when no title can be found,
/// which usually means the page did not load or the posting is gone.
pub fn parse_job_page(html: &str, job_id: &str, url: &str) -> Option<ScrapedJob> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = first_text(root, &TITLE_SELECTORS)?;
    let company = first_text(root, &COMPANY_SELECTORS).unwrap_or_else(|| "Unknown".to_string());
    let location = first_text(root, &LOCATION_SELECTORS).unwrap_or_else(|| "Unknown".to_string());
    let description = first_match(root, &DESCRIPTION_SELECTORS)
        .map(block_text)
        .unwrap_or_default();

    Some(ScrapedJob {
        source: SOURCE_NAME.to_string(),
        external_id: job_id.to_string(),
        title,
        company,
        location,
        description: truncate_chars(&description, MAX_DESCRIPTION_CHARS),
        url: url.to_string(),
        salary: first_text(root, &SALARY_SELECTORS),
        posted_date: first_text(root, &POSTED_SELECTORS),
    })
}

// --- Job source ---

pub struct LinkedInScraper {
    browser: BrowserConfig,
    profile_dir: std::path::PathBuf,
    session: Option<BrowserSession>,
}

impl LinkedInScraper {
    pub fn new(config: &Config) -> Self {
        Self {
            browser: config.browser.clone(),
            profile_dir: config.browser_profile_dir(),
            session: None,
        }
    }

    fn session(&mut self) -> Result<&BrowserSession> {
        if self.session.is_none() {
            let session =
                BrowserSession::launch(&self.browser, Some(&self.profile_dir), self.browser.headless)?;
            self.session = Some(session);
        }
        self.session
            .as_ref()
            .context("Browser session unavailable")
    }

    fn fetch_posting(&mut self, job_id: &str) -> Result<Option<ScrapedJob>> {
        let url = job_url(job_id);
        let session = self.session()?;
        session.open_authenticated(&url)?;
        let html = session.html()?;
        let job = parse_job_page(&html, job_id, &url);
        if job.is_none() {
            warn!(job_id, "no job details found on page");
        }
        Ok(job)
    }
}

impl JobSource for LinkedInScraper {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn search(&mut self, query: &SearchQuery) -> Result<Vec<ScrapedJob>> {
        let url = build_search_url(query)?;
        info!(url = %url, "searching LinkedIn");

        let session = self.session()?;
        session.open_authenticated(url.as_str())?;
        session.scroll()?;
        let mut ids = parse_search_results(&session.html()?);
        ids.truncate(query.max_jobs);
        info!(found = ids.len(), "collected job ids");

        let mut jobs = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            match self.fetch_posting(id) {
                Ok(Some(job)) => {
                    debug!(index = i + 1, id = %id, title = %job.title, company = %job.company, "extracted");
                    jobs.push(job);
                }
                Ok(None) => {}
                Err(e) => warn!(id = %id, error = %e, "failed to fetch job, skipping"),
            }
        }
        Ok(jobs)
    }

    fn get_job(&mut self, id: &str) -> Result<Option<ScrapedJob>> {
        let Some(job_id) = extract_job_id(id) else {
            bail!("'{}' is not a LinkedIn job id or job URL", id);
        };
        self.fetch_posting(&job_id)
    }
}

// --- Profile import ---

pub fn import_profile(config: &Config, profile_url: &str) -> Result<PartialProfile> {
    if !profile_url.contains("linkedin.com/in/") {
        bail!("'{}' does not look like a LinkedIn profile URL (expected linkedin.com/in/...)", profile_url);
    }

    let session = BrowserSession::launch(
        &config.browser,
        Some(&config.browser_profile_dir()),
        config.browser.headless,
    )?;
    session.open_authenticated(profile_url)?;
    let profile = profile_from_page(&session.html()?, profile_url)?;
    info!(
        name = profile.name.as_deref().unwrap_or("Unknown"),
        experience = profile.experience.as_ref().map_or(0, Vec::len),
        "extracted LinkedIn profile"
    );
    Ok(profile)
}

// A page that yields nothing (login wall, layout change) is a failed import,
// not an empty profile.
fn profile_from_page(html: &str, profile_url: &str) -> Result<PartialProfile> {
    let profile = parse_profile_page(html);
    if profile == PartialProfile::default() {
        bail!("No profile details found on {}; the page may not have loaded or its layout changed", profile_url);
    }
    Ok(profile)
}

fn profile_section<'a>(document: &'a Html, anchor: &str) -> Option<ElementRef<'a>> {
    let sections = Selector::parse("section").ok()?;
    let marker = Selector::parse(&format!("#{}", anchor)).ok()?;
    document
        .select(&sections)
        .find(|section| section.select(&marker).next().is_some())
}

fn section_items<'a>(section: ElementRef<'a>, limit: usize) -> Vec<ElementRef<'a>> {
    match Selector::parse("li.artdeco-list__item") {
        Ok(items) => section.select(&items).take(limit).collect(),
        Err(_) => Vec::new(),
    }
}

const BOLD: [&str; 1] = [".t-bold span[aria-hidden='true']"];
const NORMAL: [&str; 1] = [".t-normal span[aria-hidden='true']"];
const LIGHT: [&str; 1] = [".t-black--light span[aria-hidden='true']"];

pub fn parse_profile_page(html: &str) -> PartialProfile {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let mut profile = PartialProfile {
        name: first_text(root, &["h1"]),
        headline: first_text(root, &[".text-body-medium"]),
        location: first_text(root, &[".text-body-small.inline.t-black--light"]),
        ..Default::default()
    };

    if let Some(about) = profile_section(&document, "about") {
        profile.summary = first_match(
            about,
            &[".inline-show-more-text span[aria-hidden='true']", ".display-flex span[aria-hidden='true']"],
        )
        .map(block_text);
    }

    if let Some(section) = profile_section(&document, "experience") {
        let entries: Vec<PartialExperience> = section_items(section, 10)
            .into_iter()
            .filter_map(|item| {
                let title = first_text(item, &BOLD)?;
                let company = first_text(item, &NORMAL).unwrap_or_default();
                let employer = company.split(" · ").next().unwrap_or_default().trim().to_string();
                let (start, end) = first_text(item, &LIGHT)
                    .and_then(|d| split_range(&d))
                    .map_or((None, None), |(s, e)| (Some(s), e));
                Some(PartialExperience {
                    employer,
                    title,
                    start,
                    end,
                    description: None,
                })
            })
            .collect();
        if !entries.is_empty() {
            profile.experience = Some(entries);
        }
    }

    if let Some(section) = profile_section(&document, "education") {
        let entries: Vec<PartialEducation> = section_items(section, 5)
            .into_iter()
            .filter_map(|item| {
                let school = first_text(item, &BOLD)?;
                let (degree, field) = match first_text(item, &NORMAL) {
                    Some(text) => match text.split_once(", ") {
                        Some((d, f)) => (Some(d.to_string()), Some(f.to_string())),
                        None => (Some(text), None),
                    },
                    None => (None, None),
                };
                let (start, end) = first_text(item, &LIGHT)
                    .and_then(|d| split_range(&d))
                    .map_or((None, None), |(s, e)| (Some(s), e));
                Some(PartialEducation {
                    school,
                    degree,
                    field,
                    start,
                    end,
                })
            })
            .collect();
        if !entries.is_empty() {
            profile.education = Some(entries);
        }
    }

    if let Some(section) = profile_section(&document, "skills") {
        let skills: Vec<String> = section_items(section, 50)
            .into_iter()
            .filter_map(|item| first_text(item, &BOLD))
            .collect();
        if !skills.is_empty() {
            profile.skills = Some(skills);
        }
    }

    profile
}
