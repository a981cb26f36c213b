//! Bot / scraper detection
//!
//! A caller counts as a bot when its `User-Agent` contains one of a list of
//! crawler signatures (case-insensitive), or when the request carries
//! `bot=true` in its query string. The signature list is data: the built-in set
//! can be replaced with a file of one signature per line.

use regex::{Regex, RegexBuilder};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Query parameter that forces bot treatment.
pub const OVERRIDE_PARAM: &str = "bot";

/// Built-in crawler signatures, matched as case-insensitive substrings.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    "Bot",
    "AI2Bot",
    "Ai2Bot-Dolma",
    "aiHitBot",
    "Amazonbot",
    "anthropic-ai",
    "Applebot",
    "Applebot-Extended",
    "Brightbot 1.0",
    "Bytespider",
    "CCBot",
    "ChatGPT-User",
    "Claude-Web",
    "ClaudeBot",
    "cohere-ai",
    "cohere-training-data-crawler",
    "Cotoyogi",
    "Crawlspace",
    "Diffbot",
    "DuckAssistBot",
    "FacebookBot",
    "Factset_spyderbot",
    "FirecrawlAgent",
    "FriendlyCrawler",
    "Google-Extended",
    "GoogleOther",
    "GoogleOther-Image",
    "GoogleOther-Video",
    "GPTBot",
    "iaskspider/2.0",
    "ICC-Crawler",
    "ImagesiftBot",
    "img2dataset",
    "ISSCyberRiskCrawler",
    "Kangaroo Bot",
    "meta-externalagent",
    "Meta-ExternalAgent",
    "meta-externalfetcher",
    "Meta-ExternalFetcher",
    "NovaAct",
    "OAI-SearchBot",
    "omgili",
    "omgilibot",
    "Operator",
    "PanguBot",
    "Perplexity-User",
    "PerplexityBot",
    "PetalBot",
    "Scrapy",
    "SemrushBot-OCOB",
    "SemrushBot-SWA",
    "Sidetrade indexer bot",
    "TikTokSpider",
    "Timpibot",
    "VelenPublicWebCrawler",
    "Webzio-Extended",
    "YouBot",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerClass {
    Human,
    Bot,
}

#[derive(Debug, Clone)]
pub struct BotClassifier {
    pattern: Option<Arc<Regex>>,
    signature_count: usize,
}

impl BotClassifier {
    /// Build a classifier from literal signatures. Blank entries are ignored.
    pub fn new<I, S>(signatures: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let escaped: Vec<String> = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| regex::escape(&s))
            .collect();

        if escaped.is_empty() {
            return Ok(Self { pattern: None, signature_count: 0 });
        }

        let pattern = RegexBuilder::new(&escaped.join("|"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: Some(Arc::new(pattern)),
            signature_count: escaped.len(),
        })
    }

    pub fn builtin() -> Self {
        Self::new(DEFAULT_SIGNATURES).expect("built-in signatures are escaped literals")
    }

    /// Load signatures from a file: one per line, `#` starts a comment line.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let classifier = Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )?;
        info!(
            path = %path.display(),
            signatures = classifier.signature_count,
            "Loaded bot signatures"
        );
        Ok(classifier)
    }

    pub fn signature_count(&self) -> usize {
        self.signature_count
    }

    pub fn is_scraper(&self, user_agent: Option<&str>, explicit_override: bool) -> bool {
        if explicit_override {
            return true;
        }
        match (&self.pattern, user_agent) {
            (Some(pattern), Some(ua)) if !ua.is_empty() => pattern.is_match(ua),
            _ => false,
        }
    }

    pub fn classify(&self, user_agent: Option<&str>, query: Option<&str>) -> CallerClass {
        if self.is_scraper(user_agent, override_flag(query)) {
            CallerClass::Bot
        } else {
            CallerClass::Human
        }
    }
}

impl Default for BotClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

/// True when the first `bot` query parameter is exactly `"true"`.
pub fn override_flag(query: Option<&str>) -> bool {
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == OVERRIDE_PARAM)
                .map(|(_, value)| value == "true")
        })
        .unwrap_or(false)
}
