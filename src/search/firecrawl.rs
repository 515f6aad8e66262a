//! Firecrawl v2 search client
//!
//! One POST to `/v2/search` returns web pages (scraped to markdown), news and
//! images. Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{hostname, SearchProvider};
use crate::error::OrchestrationError;
use crate::models::{ImageItem, NewsItem, SearchResults, Source};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

/// Cached scrapes younger than this are reused (24 hours)
const SCRAPE_MAX_AGE_MS: u64 = 86_400_000;

pub struct FirecrawlClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResults> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::Config(
                "FIRECRAWL_API_KEY not configured".to_string(),
            ));
        }

        let request = SearchRequest {
            query,
            sources: ["web", "news", "images"],
            limit,
            scrape_options: ScrapeOptions {
                formats: ["markdown"],
                only_main_content: true,
                max_age: SCRAPE_MAX_AGE_MS,
            },
        };

        info!(limit, "Calling Firecrawl search");

        let response = self
            .client
            .post(format!("{}/v2/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Firecrawl request failed: {}", e);
                OrchestrationError::Search {
                    status: e.status().map(|s| s.as_u16()),
                    message: format!("Firecrawl API error: {}", e),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            error!(status = status.as_u16(), "Firecrawl error response: {}", detail);
            return Err(OrchestrationError::Search {
                status: Some(status.as_u16()),
                message: format!("Firecrawl API error: {}", detail),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Firecrawl response: {}", e);
            OrchestrationError::Search {
                status: None,
                message: format!("Firecrawl parse error: {}", e),
            }
        })?;

        let results = parsed.data.unwrap_or_default().into_results();
        debug!(
            web = results.sources.len(),
            news = results.news_results.len(),
            images = results.image_results.len(),
            "Firecrawl results mapped"
        );

        Ok(results)
    }
}

// ===== Wire Types =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    sources: [&'static str; 3],
    limit: usize,
    scrape_options: ScrapeOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeOptions {
    formats: [&'static str; 1],
    only_main_content: bool,
    max_age: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Option<SearchData>,
}

#[derive(Deserialize, Default)]
struct SearchData {
    #[serde(default)]
    web: Vec<WebResult>,
    #[serde(default)]
    news: Vec<NewsResult>,
    #[serde(default)]
    images: Vec<ImageResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebResult {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    snippet: Option<String>,
    content: Option<String>,
    markdown: Option<String>,
    favicon: Option<String>,
    og_image: Option<String>,
    image: Option<String>,
    metadata: Option<WebMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebMetadata {
    og_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsResult {
    url: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
    description: Option<String>,
    date: Option<String>,
    source: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResult {
    url: Option<String>,
    title: Option<String>,
    image_url: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    position: Option<u32>,
}

impl SearchData {
    fn into_results(self) -> SearchResults {
        let sources = self
            .web
            .into_iter()
            .filter_map(|item| {
                let url = item.url.filter(|u| !u.is_empty())?;
                Some(Source {
                    title: item.title.unwrap_or_else(|| url.clone()),
                    description: item.description.or(item.snippet),
                    content: item.content,
                    markdown: item.markdown,
                    favicon: item.favicon,
                    image: item
                        .og_image
                        .or(item.image)
                        .or(item.metadata.and_then(|m| m.og_image)),
                    site_name: hostname(&url),
                    url,
                    ..Default::default()
                })
            })
            .collect();

        let news_results = self
            .news
            .into_iter()
            .filter_map(|item| {
                let url = item.url.filter(|u| !u.is_empty())?;
                Some(NewsItem {
                    title: item.title.unwrap_or_else(|| url.clone()),
                    description: item.snippet.or(item.description),
                    published_date: item.date,
                    source: item.source.or_else(|| hostname(&url)),
                    image: item.image_url,
                    url,
                })
            })
            .collect();

        let image_results = self
            .images
            .into_iter()
            .filter_map(|item| {
                let url = item.url.filter(|u| !u.is_empty())?;
                let thumbnail = item.image_url.filter(|u| !u.is_empty())?;
                Some(ImageItem {
                    title: item.title.unwrap_or_else(|| "Untitled".to_string()),
                    thumbnail: Some(thumbnail),
                    source: hostname(&url),
                    width: item.image_width,
                    height: item.image_height,
                    position: item.position,
                    url,
                })
            })
            .collect();

        SearchResults {
            sources,
            news_results,
            image_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = SearchRequest {
            query: "capital of France",
            sources: ["web", "news", "images"],
            limit: 6,
            scrape_options: ScrapeOptions {
                formats: ["markdown"],
                only_main_content: true,
                max_age: SCRAPE_MAX_AGE_MS,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["limit"], 6);
        assert_eq!(value["sources"], serde_json::json!(["web", "news", "images"]));
        assert_eq!(value["scrapeOptions"]["onlyMainContent"], true);
        assert_eq!(value["scrapeOptions"]["maxAge"], 86_400_000u64);
    }

    #[test]
    fn test_response_mapping() {
        let body = serde_json::json!({
            "success": true,
            "data": {
                "web": [
                    {
                        "url": "https://en.wikipedia.org/wiki/Paris",
                        "title": "Paris - Wikipedia",
                        "snippet": "Paris is the capital of France.",
                        "markdown": "# Paris\n\nParis is the capital.",
                        "metadata": { "ogImage": "https://upload.wikimedia.org/paris.jpg" }
                    },
                    { "title": "no url" },
                    { "url": "https://example.com/untitled" }
                ],
                "news": [
                    { "url": "https://news.example.org/a", "title": "Headline", "date": "2 hours ago", "imageUrl": "https://news.example.org/a.jpg" }
                ],
                "images": [
                    { "url": "https://photos.example.com/p", "imageUrl": "https://photos.example.com/p.jpg", "imageWidth": 800, "imageHeight": 600, "position": 1 },
                    { "url": "https://photos.example.com/missing-thumb" }
                ]
            }
        });

        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let results = parsed.data.unwrap().into_results();

        assert_eq!(results.sources.len(), 2);
        let paris = &results.sources[0];
        assert_eq!(paris.description.as_deref(), Some("Paris is the capital of France."));
        assert_eq!(paris.image.as_deref(), Some("https://upload.wikimedia.org/paris.jpg"));
        assert_eq!(paris.site_name.as_deref(), Some("en.wikipedia.org"));
        assert_eq!(results.sources[1].title, "https://example.com/untitled");

        assert_eq!(results.news_results[0].published_date.as_deref(), Some("2 hours ago"));
        assert_eq!(results.news_results[0].source.as_deref(), Some("news.example.org"));

        assert_eq!(results.image_results.len(), 1);
        assert_eq!(results.image_results[0].title, "Untitled");
        assert_eq!(results.image_results[0].width, Some(800));
    }

    #[test]
    fn test_missing_data_is_empty() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        let results = parsed.data.unwrap_or_default().into_results();
        assert_eq!(results, SearchResults::default());
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = FirecrawlClient::new(String::new(), None).unwrap();
        let err = client.search("anything", 6).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Config(_)));
    }
}
