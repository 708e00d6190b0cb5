use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::{PartialProfile, Project};

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub fork: bool,
    pub html_url: Option<String>,
}

/// Accepts `octocat`, `@octocat` or any github.com URL for the user.
pub fn username_from_input(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    let candidate = match trimmed.split_once("github.com/") {
        Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
        None => trimmed,
    };
    let username = candidate.trim_start_matches('@');

    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        bail!("'{}' is not a GitHub username or profile URL", input);
    }
    Ok(username.to_string())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Maps the public API payloads onto a partial profile. Forks are skipped;
/// repository languages become skills in first-seen order.
pub fn to_partial(user: &GitHubUser, repos: &[GitHubRepo]) -> PartialProfile {
    let mut links = Vec::new();
    if let Some(url) = non_blank(user.html_url.as_deref()) {
        links.push(url);
    }
    if let Some(blog) = non_blank(user.blog.as_deref()) {
        if blog.starts_with("http://") || blog.starts_with("https://") {
            links.push(blog);
        } else {
            links.push(format!("https://{}", blog));
        }
    }

    let own_repos: Vec<&GitHubRepo> = repos.iter().filter(|r| !r.fork).collect();

    let mut skills: Vec<String> = Vec::new();
    for language in own_repos.iter().filter_map(|r| non_blank(r.language.as_deref())) {
        if !skills.contains(&language) {
            skills.push(language);
        }
    }

    let projects: Vec<Project> = own_repos
        .iter()
        .map(|repo| Project {
            name: repo.name.clone(),
            description: non_blank(repo.description.as_deref()),
            url: non_blank(repo.html_url.as_deref()),
            language: non_blank(repo.language.as_deref()),
            stars: Some(repo.stargazers_count),
        })
        .collect();

    PartialProfile {
        name: non_blank(user.name.as_deref()),
        email: non_blank(user.email.as_deref()),
        headline: non_blank(user.bio.as_deref()),
        location: non_blank(user.location.as_deref()),
        skills: (!skills.is_empty()).then_some(skills),
        projects: (!projects.is_empty()).then_some(projects),
        links: (!links.is_empty()).then_some(links),
        ..Default::default()
    }
}

pub struct GitHubImporter {
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GitHubImporter {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("jobkit/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
        })
    }

    pub fn import(&self, input: &str) -> Result<PartialProfile> {
        let username = username_from_input(input)?;
        info!(username = %username, "fetching GitHub profile");

        let user: GitHubUser = self.get_json(&format!("{}/users/{}", self.api_base, username))?;
        let repos: Vec<GitHubRepo> = self.get_json(&format!(
            "{}/users/{}/repos?sort=updated&per_page=30",
            self.api_base, username
        ))?;
        debug!(login = %user.login, repos = repos.len(), "GitHub API responded");

        Ok(to_partial(&user, &repos))
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .with_context(|| format!("Failed to reach {}", url))?;

        match response.status() {
            StatusCode::NOT_FOUND => bail!("GitHub user not found ({})", url),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                bail!("GitHub API rate limit reached; try again later")
            }
            status if !status.is_success() => bail!("GitHub API returned {} for {}", status, url),
            _ => {}
        }

        response
            .json()
            .with_context(|| format!("Failed to parse GitHub response from {}", url))
    }
}
