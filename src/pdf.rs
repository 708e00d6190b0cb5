use anyhow::{Context, Result};
use regex::Regex;
use std::io::Write;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::BrowserConfig;

/// Turns a markdown document into PDF bytes.
pub trait PdfRenderer {
    fn render(&self, markdown: &str) -> Result<Vec<u8>>;
}

const STYLE: &str = r#"
body { font-family: "Helvetica Neue", Helvetica, Arial, sans-serif; font-size: 10.5pt; line-height: 1.4; color: #111; }
h1 { font-size: 18pt; color: #193c78; border-bottom: 2px solid #2563b4; padding-bottom: 3px; margin: 0 0 8px; }
h2 { font-size: 13pt; color: #28508c; margin: 14px 0 4px; }
h3 { font-size: 11pt; color: #3c3c3c; margin: 10px 0 2px; }
p { margin: 4px 0; }
ul, ol { margin: 2px 0 6px; padding-left: 20px; }
li { margin: 1px 0; }
li::marker { color: #2563b4; }
"#;

#[derive(PartialEq)]
enum List {
    None,
    Bullets,
    Numbered,
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn inline(text: &str) -> String {
    let text = match Regex::new(r"\[([^\]]+)\]\([^)]*\)") {
        Ok(re) => re.replace_all(text, "$1").into_owned(),
        Err(_) => text.to_string(),
    };
    let escaped = escape_html(&text.replace('`', ""));

    let parts: Vec<&str> = escaped.split("**").collect();
    if parts.len() % 2 == 0 {
        // Unbalanced markers are left as typed.
        return escaped;
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                format!("<strong>{}</strong>", part)
            } else {
                part.to_string()
            }
        })
        .collect()
}

fn numbered_item(line: &str) -> Option<&str> {
    let digits = line.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    rest.starts_with(' ').then(|| rest.trim())
}

fn is_caps_heading(line: &str) -> bool {
    line.chars().any(|c| c.is_alphabetic())
        && !line.chars().any(|c| c.is_lowercase())
        && line.len() < 50
        && line.split_whitespace().count() <= 5
}

fn close_list(html: &mut String, list: &mut List) {
    match list {
        List::Bullets => html.push_str("</ul>\n"),
        List::Numbered => html.push_str("</ol>\n"),
        List::None => {}
    }
    *list = List::None;
}

fn open_list(html: &mut String, list: &mut List, wanted: List) {
    if *list == wanted {
        return;
    }
    close_list(html, list);
    html.push_str(match wanted {
        List::Bullets => "<ul>\n",
        List::Numbered => "<ol>\n",
        List::None => "",
    });
    *list = wanted;
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut body = String::new();
    let mut list = List::None;

    for raw in markdown.lines() {
        let line = raw.trim();
        if line.is_empty() || matches!(line, "```" | "```markdown" | "---" | "***" | "===") {
            close_list(&mut body, &mut list);
            continue;
        }

        if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            open_list(&mut body, &mut list, List::Bullets);
            body.push_str(&format!("<li>{}</li>\n", inline(text.trim())));
            continue;
        }
        if let Some(text) = numbered_item(line) {
            open_list(&mut body, &mut list, List::Numbered);
            body.push_str(&format!("<li>{}</li>\n", inline(text)));
            continue;
        }
        close_list(&mut body, &mut list);

        let hashes = line.chars().take_while(|&c| c == '#').count();
        let text = line[hashes..].trim();
        match hashes {
            0 if is_caps_heading(line) => body.push_str(&format!("<h2>{}</h2>\n", inline(line))),
            0 => body.push_str(&format!("<p>{}</p>\n", inline(line))),
            _ if text.is_empty() => {}
            1 => body.push_str(&format!("<h1>{}</h1>\n", inline(text))),
            2 => body.push_str(&format!("<h2>{}</h2>\n", inline(text))),
            _ => body.push_str(&format!("<h3>{}</h3>\n", inline(text))),
        }
    }
    close_list(&mut body, &mut list);

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        STYLE, body
    )
}

pub struct ChromePdfRenderer {
    config: BrowserConfig,
}

impl ChromePdfRenderer {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: BrowserConfig {
                page_settle_secs: 0,
                ..config.clone()
            },
        }
    }
}

impl PdfRenderer for ChromePdfRenderer {
    fn render(&self, markdown: &str) -> Result<Vec<u8>> {
        let mut page = tempfile::Builder::new()
            .prefix("jobkit-")
            .suffix(".html")
            .tempfile()
            .context("Failed to create temporary HTML file")?;
        page.write_all(markdown_to_html(markdown).as_bytes())
            .context("Failed to write temporary HTML file")?;

        let session = BrowserSession::launch(&self.config, None, true)?;
        let bytes = session.print_pdf(page.path())?;
        debug!(bytes = bytes.len(), "rendered PDF");
        Ok(bytes)
    }
}
