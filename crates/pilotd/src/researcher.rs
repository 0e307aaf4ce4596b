//! Prospect researcher - free pre-send intel about a company.
//!
//! Gathers lightweight signals from sources that cost nothing (site scrape,
//! news search, data already sitting in sibling stores) and compiles them
//! into a bounded text brief for email generation. Sources run concurrently
//! and fail independently; a dead website never blocks the news lookup, and
//! the result is cached for a week however many sources succeeded.

use crate::services::{Article, NewsItem, Services};
use pilot_common::actions::ContactRef;
use pilot_common::state::CachedResearch;
use pilot_common::store::PilotStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Target size of the compiled brief.
const BRIEF_MAX_CHARS: usize = 600;
const MAX_NEWS: usize = 3;
const MAX_MONITORED: usize = 2;

/// Consumer email providers - their domains say nothing about the company.
const GENERIC_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "yahoo.fr",
    "hotmail.com",
    "hotmail.fr",
    "outlook.com",
    "outlook.fr",
    "icloud.com",
    "orange.fr",
    "free.fr",
    "wanadoo.fr",
    "sfr.fr",
    "laposte.net",
    "proton.me",
    "protonmail.com",
];

/// Everything the researcher could find about one prospect.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProspectIntel {
    pub entreprise: String,
    pub site_excerpt: Option<String>,
    pub news: Vec<NewsItem>,
    pub org_description: Option<String>,
    pub org_size: Option<String>,
    pub org_industry: Option<String>,
    pub org_founded: Option<String>,
    pub org_location: Option<String>,
    pub technologies: Vec<String>,
    pub monitored_articles: Vec<Article>,
    pub enrichment_summary: Option<String>,
    pub contact_line: Option<String>,
    /// True when the result came straight from the cache
    pub from_cache: bool,
}

pub fn is_generic_domain(domain: &str) -> bool {
    GENERIC_DOMAINS.iter().any(|d| domain.eq_ignore_ascii_case(d))
}

fn email_domain(email: &str) -> Option<&str> {
    email.split('@').nth(1).filter(|d| !d.is_empty())
}

pub struct ProspectResearcher {
    store: Arc<Mutex<PilotStore>>,
    leads: Arc<Mutex<pilot_common::LeadStore>>,
    services: Services,
}

impl ProspectResearcher {
    pub fn new(
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<pilot_common::LeadStore>>,
        services: Services,
    ) -> Self {
        Self { store, leads, services }
    }

    /// Research one contact. Needs at least a company name.
    pub async fn research(&self, contact: &ContactRef) -> anyhow::Result<ProspectIntel> {
        let entreprise = contact
            .entreprise
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("nom d'entreprise manquant"))?
            .trim()
            .to_string();

        // Cache first
        if let Some(email) = &contact.email {
            let store = self.store.lock().unwrap();
            if let Some(cached) = store.get_prospect_research(email) {
                debug!("Research cache hit for {}", email);
                let mut intel: ProspectIntel =
                    serde_json::from_value(cached.intel.clone()).unwrap_or_default();
                intel.from_cache = true;
                return Ok(intel);
            }
        }

        let mut intel = ProspectIntel { entreprise: entreprise.clone(), ..Default::default() };

        // Sources that need no network call: the search collaborator's
        // organization payload and prior enrichment.
        let organization = self.stored_organization(contact);
        if let Some(org) = &organization {
            self.extract_organization(org, &mut intel);
        }
        if let Some(email) = &contact.email {
            if let Some(enriched) = self.services.enrichment.cached(email) {
                intel.enrichment_summary = summarize_enrichment(&enriched.person);
            }
        }

        // Network sources, concurrently, each failure isolated.
        let site_domain = self.site_domain(contact, organization.as_ref());
        let (site, news) = tokio::join!(
            async {
                match &site_domain {
                    Some(domain) => self.services.web.fetch_site(domain).await.ok(),
                    None => None,
                }
            },
            async { self.services.web.search_news(&entreprise).await.unwrap_or_default() },
        );
        intel.site_excerpt = site.map(|text| truncate(&text, 300));
        intel.news = news.into_iter().take(5).collect();

        intel.monitored_articles = self.services.monitor.articles_about(&entreprise, MAX_MONITORED);

        if let Some(nom) = &contact.nom {
            let titre = contact.titre.as_deref().unwrap_or("");
            intel.contact_line = Some(if titre.is_empty() {
                nom.clone()
            } else {
                format!("{} ({})", nom, titre)
            });
        }

        // Cache whatever we got, even a thin result - retrying every send
        // would burn the same dead sources again.
        if let Some(email) = &contact.email {
            let brief = compile_brief(&intel);
            let mut store = self.store.lock().unwrap();
            store.save_prospect_research(
                email,
                CachedResearch {
                    intel: serde_json::to_value(&intel).unwrap_or(Value::Null),
                    brief,
                    cached_at: chrono::Utc::now(),
                },
            );
        }

        Ok(intel)
    }

    /// Research and return the compiled brief, the form email generation
    /// actually consumes.
    pub async fn research_brief(&self, contact: &ContactRef) -> anyhow::Result<String> {
        let intel = self.research(contact).await?;
        Ok(compile_brief(&intel))
    }

    fn stored_organization(&self, contact: &ContactRef) -> Option<Value> {
        let leads = self.leads.lock().unwrap();
        let lead = match &contact.email {
            Some(email) => leads.find_by_email(email),
            None => None,
        };
        lead.and_then(|l| l.organization.clone())
    }

    fn extract_organization(&self, org: &Value, intel: &mut ProspectIntel) {
        let get = |key: &str| org.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());
        intel.org_description = get("short_description").or_else(|| get("description"));
        intel.org_industry = get("industry");
        intel.org_founded = org
            .get("founded_year")
            .and_then(|v| v.as_u64())
            .map(|y| y.to_string())
            .or_else(|| get("founded_year"));
        intel.org_location = get("city").or_else(|| get("country"));
        intel.org_size = org
            .get("estimated_num_employees")
            .and_then(|v| v.as_u64())
            .map(|n| format!("{} employes", n));
        if let Some(techs) = org.get("technologies").and_then(|v| v.as_array()) {
            intel.technologies = techs
                .iter()
                .filter_map(|t| t.as_str().map(|s| s.to_string()))
                .take(5)
                .collect();
        }
    }

    /// Company site to scrape: the organization's website when known,
    /// otherwise the email domain unless it is a consumer provider.
    fn site_domain(&self, contact: &ContactRef, organization: Option<&Value>) -> Option<String> {
        if let Some(org) = organization {
            if let Some(url) = org.get("website_url").and_then(|v| v.as_str()) {
                let domain = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_start_matches("www.")
                    .split('/')
                    .next()
                    .unwrap_or_default();
                if !domain.is_empty() {
                    return Some(domain.to_string());
                }
            }
        }
        let email = contact.email.as_deref()?;
        let domain = email_domain(email)?;
        if is_generic_domain(domain) {
            None
        } else {
            Some(domain.to_string())
        }
    }
}

fn summarize_enrichment(person: &Option<Value>) -> Option<String> {
    let person = person.as_ref()?;
    let get = |key: &str| person.get(key).and_then(|v| v.as_str());
    let parts: Vec<&str> =
        [get("headline"), get("seniority"), get("linkedin_url")].into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" - "))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.trim().to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Compile the bounded brief. Section order is fixed: meta line,
/// description, technologies, news, monitored articles, enrichment, contact.
pub fn compile_brief(intel: &ProspectIntel) -> String {
    let mut lines: Vec<String> = Vec::new();

    let mut meta = intel.entreprise.clone();
    let details: Vec<&String> = [
        intel.org_size.as_ref(),
        intel.org_industry.as_ref(),
        intel.org_founded.as_ref(),
        intel.org_location.as_ref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !details.is_empty() {
        meta.push_str(" | ");
        meta.push_str(&details.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
    }
    lines.push(meta);

    if let Some(desc) = &intel.org_description {
        lines.push(truncate(desc, 160));
    } else if let Some(site) = &intel.site_excerpt {
        lines.push(truncate(site, 160));
    }

    if !intel.technologies.is_empty() {
        lines.push(format!("Stack: {}", intel.technologies.join(", ")));
    }

    for item in intel.news.iter().take(MAX_NEWS) {
        match &item.date {
            Some(date) => lines.push(format!("Actu ({}): {}", date, truncate(&item.title, 90))),
            None => lines.push(format!("Actu: {}", truncate(&item.title, 90))),
        }
    }

    for article in intel.monitored_articles.iter().take(MAX_MONITORED) {
        lines.push(format!(
            "Veille ({:.0}%): {}",
            article.relevance * 100.0,
            truncate(&article.title, 90)
        ));
    }

    if let Some(enrichment) = &intel.enrichment_summary {
        lines.push(format!("Profil: {}", truncate(enrichment, 120)));
    }

    if let Some(contact) = &intel.contact_line {
        lines.push(format!("Contact: {}", contact));
    }

    truncate(&lines.join("\n"), BRIEF_MAX_CHARS)
}
