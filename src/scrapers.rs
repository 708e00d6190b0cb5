use anyhow::{bail, Result};

use crate::config::{Config, SearchConfig};
use crate::linkedin::{self, LinkedInScraper};
use crate::models::ScrapedJob;

/// Names accepted by `open_source`.
pub const AVAILABLE: [&str; 1] = [linkedin::SOURCE_NAME];

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
    pub remote_options: Vec<String>,
    pub experience_level: Vec<String>,
    pub date_posted: Option<String>,
    pub max_jobs: usize,
}

impl SearchQuery {
    /// Saved search settings with optional command-line overrides.
    pub fn from_config(
        search: &SearchConfig,
        keywords: Option<String>,
        location: Option<String>,
        max_jobs: Option<usize>,
    ) -> Self {
        let date_posted = match search.date_posted.trim() {
            "" | "any" => None,
            window => Some(window.to_string()),
        };
        Self {
            keywords: keywords.unwrap_or_else(|| search.keywords.clone()),
            location: location.unwrap_or_else(|| search.location.clone()),
            remote_options: search.remote_options.clone(),
            experience_level: search.experience_level.clone(),
            date_posted,
            max_jobs: max_jobs.unwrap_or(search.max_jobs),
        }
    }
}

/// A site jobs can be scraped from.
pub trait JobSource {
    fn name(&self) -> &str;

    fn search(&mut self, query: &SearchQuery) -> Result<Vec<ScrapedJob>>;

    /// `id` may be the site's job id or a full posting URL.
    fn get_job(&mut self, id: &str) -> Result<Option<ScrapedJob>>;
}

pub fn open_source(name: &str, config: &Config) -> Result<Box<dyn JobSource>> {
    match name.trim().to_lowercase().as_str() {
        linkedin::SOURCE_NAME => Ok(Box::new(LinkedInScraper::new(config))),
        _ => bail!(
            "Unknown job source '{}'. Available: {}",
            name,
            AVAILABLE.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_uses_config_defaults() {
        let search = SearchConfig::default();
        let query = SearchQuery::from_config(&search, None, None, None);
        assert_eq!(query.keywords, "software engineer");
        assert_eq!(query.location, "Remote");
        assert_eq!(query.date_posted.as_deref(), Some("week"));
        assert_eq!(query.max_jobs, 50);
    }

    #[test]
    fn test_query_overrides() {
        let search = SearchConfig {
            date_posted: "any".to_string(),
            ..SearchConfig::default()
        };
        let query = SearchQuery::from_config(
            &search,
            Some("rust developer".to_string()),
            Some("Berlin".to_string()),
            Some(5),
        );
        assert_eq!(query.keywords, "rust developer");
        assert_eq!(query.location, "Berlin");
        assert_eq!(query.date_posted, None);
        assert_eq!(query.max_jobs, 5);
    }

    #[test]
    fn test_open_source_registry() {
        let config = Config::default();
        let source = open_source("LinkedIn", &config).unwrap();
        assert_eq!(source.name(), "linkedin");

        let err = open_source("monster", &config).err().unwrap();
        assert!(err.to_string().contains("Available: linkedin"));
    }
}
