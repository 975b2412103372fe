// src/services/bulletins.rs

//! Bulletin crawler service.
//!
//! Reads one weekly listing page, keeps the anchors carrying the configured
//! marker, then visits each bulletin's detail page for its labeled fields.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, Entry, Period, SourceConfig};
use crate::services::BulletinSource;
use crate::utils::http::{self, RetryPolicy};
use crate::utils::{normalize_whitespace, resolve_url};

/// Elements whose text never belongs to a field value.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "section", "table", "td", "th", "tr", "ul",
];

/// A matching anchor on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub source_link: String,
    pub document_link: String,
}

/// Labeled fields found on a detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub subject: Option<String>,
    pub summary: Option<String>,
}

/// Result of fetching one period.
#[derive(Debug, Clone)]
pub struct PeriodFetch {
    pub period: Period,
    pub entries: Vec<Entry>,
    /// Set when the listing itself could not be fetched
    pub listing_error: Option<String>,
    /// Entries that kept at least one sentinel field
    pub degraded: usize,
}

impl PeriodFetch {
    /// A period whose listing fetch failed.
    pub fn failed(period: Period, error: &AppError) -> Self {
        Self {
            period,
            entries: Vec::new(),
            listing_error: Some(error.to_string()),
            degraded: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.listing_error.is_some()
    }
}

/// Service fetching bulletins from the weekly archive.
pub struct BulletinCrawler {
    config: Arc<Config>,
    client: Client,
    retry: RetryPolicy,
    extractor: DetailExtractor,
}

impl BulletinCrawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = http::create_async_client(&config.crawler)?;
        let retry = RetryPolicy::from_config(&config.crawler);
        let extractor = DetailExtractor::new(&config.source)?;

        Ok(Self {
            config,
            client,
            retry,
            extractor,
        })
    }

    /// Fetch and parse the listing page for one period.
    async fn fetch_listing(&self, period: Period) -> Result<Vec<ListingEntry>> {
        let url = self.config.source.listing_url(period);
        let html = http::fetch_text_with_retry(&self.client, &url, self.retry).await?;
        parse_listing(&html, &Url::parse(&url)?, &self.config.source)
    }

    /// Resolve a listing entry into a full entry, degrading to sentinels.
    ///
    /// Returns the entry and whether any field is a sentinel.
    async fn fetch_entry(&self, period: Period, listing: ListingEntry) -> (Entry, bool) {
        let fields =
            match http::fetch_text_with_retry(&self.client, &listing.source_link, self.retry).await
            {
                Ok(html) => self.extractor.extract(&html),
                Err(error) => {
                    log::warn!(
                        "Detail fetch failed for '{}' ({}): {}",
                        listing.title,
                        listing.source_link,
                        error
                    );
                    DetailFields::default()
                }
            };

        if fields.subject.is_none() || fields.summary.is_none() {
            log::debug!(
                "{}",
                AppError::parse(&listing.source_link, "subject or summary label not found")
            );
        }

        let degraded = fields.subject.is_none() || fields.summary.is_none();
        let sentinel = &self.config.source.sentinel;
        let entry = Entry {
            period,
            title: listing.title,
            source_link: listing.source_link,
            document_link: listing.document_link,
            subject: fields.subject.unwrap_or_else(|| sentinel.clone()),
            summary: fields.summary.unwrap_or_else(|| sentinel.clone()),
        };
        (entry, degraded)
    }
}

#[async_trait]
impl BulletinSource for BulletinCrawler {
    async fn fetch_period(&self, period: Period) -> PeriodFetch {
        let listing = self.fetch_listing(period).await;

        // Listings of empty or failed weeks are paced like detail pages.
        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let listings = match listing {
            Ok(listings) => listings,
            Err(error) => {
                log::warn!(
                    "Listing fetch failed for {} (retryable): {}",
                    period,
                    error
                );
                return PeriodFetch::failed(period, &error);
            }
        };

        log::debug!("{}: {} matching bulletins", period, listings.len());

        let concurrency = self.config.crawler.max_concurrent.max(1);

        let mut outcome = PeriodFetch {
            period,
            entries: Vec::with_capacity(listings.len()),
            listing_error: None,
            degraded: 0,
        };

        let mut detail_stream = stream::iter(listings)
            .map(|listing| self.fetch_entry(period, listing))
            .buffered(concurrency);

        while let Some((entry, degraded)) = detail_stream.next().await {
            if degraded {
                outcome.degraded += 1;
            }
            outcome.entries.push(entry);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        outcome
    }
}

/// Extract the matching anchors from a listing page.
///
/// Titles are whitespace-normalized; repeated titles keep their first link.
pub fn parse_listing(html: &str, base: &Url, source: &SourceConfig) -> Result<Vec<ListingEntry>> {
    let document = Html::parse_document(html);
    let anchors = parse_selector("a[href]")?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for anchor in document.select(&anchors) {
        let title = normalize_whitespace(&anchor.text().collect::<String>());
        if !title.contains(&source.marker) || !seen.insert(title.clone()) {
            continue;
        }

        let href = anchor.value().attr("href").unwrap_or("").trim();
        let source_link = resolve_url(base, href);
        let document_link = source.document_link(&source_link);

        entries.push(ListingEntry {
            title,
            source_link,
            document_link,
        });
    }

    Ok(entries)
}

/// Extract the subject and summary fields from a detail page.
pub fn parse_detail(html: &str, source: &SourceConfig) -> Result<DetailFields> {
    Ok(DetailExtractor::new(source)?.extract(html))
}

/// Compiled label patterns for detail pages.
struct DetailExtractor {
    subject: Regex,
    summary: Regex,
}

impl DetailExtractor {
    fn new(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            subject: label_regex(&source.subject_label)?,
            summary: label_regex(&source.summary_label)?,
        })
    }

    fn extract(&self, html: &str) -> DetailFields {
        let text = page_text(html);
        DetailFields {
            subject: value_after(&text, &self.subject, &[&self.summary]),
            summary: value_after(&text, &self.summary, &[&self.subject]),
        }
    }
}

/// Case-insensitive label pattern, lenient on accents.
///
/// The label must start a word and be followed by a colon, or else fill a
/// line on its own.
fn label_regex(label: &str) -> Result<Regex> {
    let mut word = String::new();
    for c in label.trim().chars() {
        match c {
            'e' | 'é' | 'è' | 'ê' | 'ë' | 'E' | 'É' | 'È' | 'Ê' | 'Ë' => {
                word.push_str("[eéèêë]")
            }
            'a' | 'à' | 'â' | 'A' | 'À' | 'Â' => word.push_str("[aàâ]"),
            c if c.is_whitespace() => word.push_str(r"\s+"),
            c => word.push_str(&regex::escape(&c.to_string())),
        }
    }
    let pattern = format!(r"(?im)(?:\b{word}[ \t]*:|^[ \t]*{word}[ \t]*$)");
    Regex::new(&pattern).map_err(|e| AppError::config(format!("bad label '{label}': {e}")))
}

/// Text of the first non-empty line after `label`, cut at any other label.
fn value_after(text: &str, label: &Regex, others: &[&Regex]) -> Option<String> {
    let found = label.find(text)?;
    let rest = &text[found.end()..];

    let mut lines = rest.lines();
    let first = lines.next().unwrap_or("").trim_start_matches([':', ' ']).trim();
    let line = if first.is_empty() {
        lines.map(str::trim).find(|l| !l.is_empty())?
    } else {
        first
    };

    let end = others
        .iter()
        .filter_map(|other| other.find(line).map(|m| m.start()))
        .min()
        .unwrap_or(line.len());
    let value = line[..end].trim();

    (!value.is_empty()).then(|| value.to_string())
}

/// Visible page text, one normalized line per block.
fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    flatten(document.root_element(), &mut raw);

    raw.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn flatten(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            flatten(child, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
    if block {
        out.push('\n');
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::parse(s, format!("{e:?}")))
}
