//! Web intel fetcher - company site scrape and news search.
//!
//! Both sources are free: the landing page comes straight off the
//! company's domain, the news come from the keyless GDELT document API.

use crate::services::{NewsItem, WebFetcher};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;

const MAX_NEWS_RESULTS: usize = 5;
const SITE_TEXT_LIMIT: usize = 2000;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; pilotd/0.4)";

pub struct HttpWebFetcher {
    client: reqwest::Client,
}

impl HttpWebFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

/// Pull the parts of a landing page that describe the company: title, meta
/// description, headings and paragraphs. Falls back to a full-page text
/// rendering when the page has none of those.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(element) = document.select(&selector).next() {
            parts.push(element.text().collect::<String>());
        }
    }
    if let Ok(selector) = Selector::parse("meta[name=\"description\"]") {
        if let Some(content) = document.select(&selector).next().and_then(|e| e.value().attr("content")) {
            parts.push(content.to_string());
        }
    }
    if let Ok(selector) = Selector::parse("h1, h2, p") {
        for element in document.select(&selector).take(20) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = text.trim().to_string();
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    let text = if parts.is_empty() {
        html2text::from_read(html.as_bytes(), 120)
    } else {
        parts.join("\n")
    };

    let compact: Vec<&str> = text.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    let mut out = compact.join("\n");
    if out.chars().count() > SITE_TEXT_LIMIT {
        out = out.chars().take(SITE_TEXT_LIMIT).collect();
    }
    out
}

#[async_trait]
impl WebFetcher for HttpWebFetcher {
    async fn fetch_site(&self, domain: &str) -> anyhow::Result<String> {
        let url = format!("https://{}", domain);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("site {}: HTTP {}", domain, response.status());
        }
        let html = response.text().await?;
        let text = html_to_text(&html);
        if text.is_empty() {
            anyhow::bail!("site {}: aucune donnee exploitable", domain);
        }
        Ok(text)
    }

    async fn search_news(&self, company: &str) -> anyhow::Result<Vec<NewsItem>> {
        let url = format!(
            "https://api.gdeltproject.org/api/v2/doc/doc?query=\"{}\"&mode=artlist&format=json&maxrecords={}",
            company, MAX_NEWS_RESULTS
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("news search: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let articles = json.get("articles").and_then(|a| a.as_array()).cloned().unwrap_or_default();
        Ok(articles
            .iter()
            .take(MAX_NEWS_RESULTS)
            .filter_map(|article| {
                Some(NewsItem {
                    title: article.get("title")?.as_str()?.to_string(),
                    date: article
                        .get("seendate")
                        .and_then(|d| d.as_str())
                        .map(|d| d.chars().take(8).collect()),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_markup() {
        let html = "<html><body><h1>Acme</h1><p>Solutions RH pour PME</p><script>var x=1;</script></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Acme"));
        assert!(text.contains("Solutions RH"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_html_to_text_is_bounded() {
        let html = format!("<p>{}</p>", "mot ".repeat(5000));
        assert!(html_to_text(&html).chars().count() <= SITE_TEXT_LIMIT);
    }
}
