//! Static HTML loader for hh.ru search results

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Html};
use std::time::Duration;
use url::Url;

use super::selectors::{self, select_all, select_first};
use super::{LoadError, Loader};
use crate::models::{Record, RecordSet};
use crate::utils::{normalize_whitespace, resolve_link};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Placeholder used when a card has no metro station or salary
pub const NOT_SPECIFIED: &str = "Not specified";

pub struct HtmlLoader {
    client: Client,
}

impl HtmlLoader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, LoadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ru-RU,ru;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Loader for HtmlLoader {
    async fn fetch(&self, url: &str) -> Result<RecordSet, LoadError> {
        let base = Url::parse(url).map_err(|e| LoadError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(LoadError::InvalidUrl(url.to_string()));
        }

        let response = self.client.get(base.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let records = parse_listing(&body, &base, Utc::now());

        tracing::debug!(url, records = records.len(), "Listing parsed");
        Ok(records)
    }
}

/// Extract every vacancy card from a listing page
///
/// Cards without a title are skipped. All records share `observed_at`.
pub fn parse_listing(html: &str, base: &Url, observed_at: DateTime<Utc>) -> RecordSet {
    let document = Html::parse_document(html);
    let cards = select_all(document.root_element(), &selectors::VACANCY_CARD);
    tracing::debug!(cards = cards.len(), "Found vacancy cards");

    cards
        .into_iter()
        .filter_map(|card| parse_card(card, base, observed_at))
        .collect()
}

fn parse_card(card: ElementRef<'_>, base: &Url, observed_at: DateTime<Utc>) -> Option<Record> {
    let title_el = select_first(card, &selectors::TITLE)?;
    let title = element_text(title_el);
    if title.is_empty() {
        return None;
    }

    let link = title_el
        .value()
        .attr("href")
        .or_else(|| select_first(title_el, &selectors::LINK).and_then(|a| a.value().attr("href")))
        .and_then(|href| resolve_link(base, href))
        .unwrap_or_default();

    let address = field(card, &selectors::ADDRESS).unwrap_or_default();
    let metro = field(card, &selectors::METRO).unwrap_or_else(|| NOT_SPECIFIED.to_string());

    let responsibility = field(card, &selectors::RESPONSIBILITY).unwrap_or_default();
    let requirement = field(card, &selectors::REQUIREMENT).unwrap_or_default();

    Some(Record {
        title,
        organization: field(card, &selectors::EMPLOYER).unwrap_or_default(),
        compensation: field(card, &selectors::COMPENSATION)
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        experience_level: field(card, &selectors::EXPERIENCE).unwrap_or_default(),
        description: format!("{responsibility}\n\n{requirement}").trim().to_string(),
        link,
        location: format!("{address} (Metro: {metro})"),
        observed_at,
    })
}

fn field(card: ElementRef<'_>, candidates: &[scraper::Selector]) -> Option<String> {
    select_first(card, candidates)
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}
