use anyhow::{bail, Context, Result};
use headless_chrome::browser::default_executable;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

const LOGIN_MARKERS: [&str; 5] = ["login", "authwall", "checkpoint", "uas/login", "signin"];
const LOGIN_POLL: Duration = Duration::from_secs(3);

/// True when `url` is one of LinkedIn's sign-in or verification pages.
pub fn is_login_wall(url: &str) -> bool {
    LOGIN_MARKERS.iter().any(|marker| url.contains(marker))
}

/// One Chrome process with a single working tab. The process is shut down
/// when the session is dropped.
pub struct BrowserSession {
    // Field order matters: the tab must go before the browser.
    tab: Arc<Tab>,
    _browser: Browser,
    settle: Duration,
    login_timeout: Duration,
}

impl BrowserSession {
    /// `profile_dir` is the Chrome user data directory; reusing it keeps the
    /// LinkedIn login between runs.
    pub fn launch(config: &BrowserConfig, profile_dir: Option<&Path>, headless: bool) -> Result<Self> {
        if let Some(dir) = profile_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create browser profile: {}", dir.display()))?;
        }

        let login_timeout = Duration::from_secs(config.login_timeout_secs);
        let launch_options = LaunchOptions {
            headless,
            sandbox: true,
            window_size: Some((1280, 800)),
            user_data_dir: profile_dir.map(Path::to_path_buf),
            path: config.chrome_path.clone().or_else(|| default_executable().ok()),
            // Chrome is killed after this much idle time; waiting for a manual
            // login counts as idle.
            idle_browser_timeout: login_timeout + Duration::from_secs(60),
            ..Default::default()
        };

        debug!(headless, profile = ?profile_dir, "launching chrome");
        let browser = Browser::new(launch_options)
            .context("Failed to launch Chrome. Make sure Chrome is installed and not already running with the same profile.")?;
        let tab = browser
            .new_tab()
            .context("Failed to create new browser tab")?;

        Ok(Self {
            tab,
            _browser: browser,
            settle: Duration::from_secs(config.page_settle_secs),
            login_timeout,
        })
    }

    pub fn open(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("Failed to navigate to {}", url))?;
        thread::sleep(self.settle);
        Ok(())
    }

    /// Opens `url`, and if the site bounces to a login page, waits for the
    /// user to sign in in the browser window before reopening `url`.
    pub fn open_authenticated(&self, url: &str) -> Result<()> {
        self.open(url)?;
        if !is_login_wall(&self.current_url()) {
            return Ok(());
        }

        println!();
        println!("LOGIN REQUIRED");
        println!("Please log in to LinkedIn in the browser window.");
        println!("Waiting up to {} seconds...", self.login_timeout.as_secs());
        println!();
        warn!(url = %self.current_url(), "redirected to login page");

        let started = Instant::now();
        loop {
            thread::sleep(LOGIN_POLL);
            if !is_login_wall(&self.current_url()) {
                break;
            }
            if started.elapsed() >= self.login_timeout {
                bail!("Login timeout - please try again and complete the full login process");
            }
        }

        info!("login detected");
        self.open(url)
    }

    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    pub fn html(&self) -> Result<String> {
        self.tab
            .get_content()
            .context("Failed to read page content")
    }

    /// Scrolls half way down to trigger lazy-loaded result lists.
    pub fn scroll(&self) -> Result<()> {
        self.tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight / 2)", false)
            .context("Failed to scroll page")?;
        thread::sleep(self.settle);
        Ok(())
    }

    /// Prints a local HTML file to PDF bytes (US Letter).
    pub fn print_pdf(&self, html_file: &Path) -> Result<Vec<u8>> {
        let url = format!("file://{}", html_file.display());
        self.tab
            .navigate_to(&url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("Failed to load {}", html_file.display()))?;

        let options = PrintToPdfOptions {
            print_background: Some(true),
            paper_width: Some(8.5),
            paper_height: Some(11.0),
            margin_top: Some(0.6),
            margin_bottom: Some(0.6),
            margin_left: Some(0.7),
            margin_right: Some(0.7),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .context("Failed to print page to PDF")
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!(error = %e, "tab already gone");
        }
        debug!("closing browser");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_wall_detection() {
        assert!(is_login_wall("https://www.linkedin.com/login?session_redirect=x"));
        assert!(is_login_wall("https://www.linkedin.com/authwall?trk=foo"));
        assert!(is_login_wall("https://www.linkedin.com/checkpoint/challenge/123"));
        assert!(!is_login_wall("https://www.linkedin.com/jobs/search/?keywords=rust"));
        assert!(!is_login_wall("https://www.linkedin.com/in/jane-doe/"));
    }

    #[test]
    #[ignore] // Requires a local Chrome install
    fn test_launch_and_read_page() {
        let config = BrowserConfig {
            headless: true,
            page_settle_secs: 0,
            ..BrowserConfig::default()
        };
        let session = BrowserSession::launch(&config, None, true).unwrap();
        session.open("data:text/html,<h1>hello</h1>").unwrap();
        assert!(session.html().unwrap().contains("hello"));
    }
}
