//! arXiv Atom feed client.
//!
//! Queries `{endpoint}?search_query=cat:{category}&start=0&max_results=N`
//! and parses the returned feed into [`PaperMetadata`] records.

use std::time::Duration;

use chrono::Utc;
use paperflow_shared::{IngestConfig, PaperMetadata, PaperflowError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Hard upper bound on papers requested per query.
pub const MAX_PAPERS_PER_REQUEST: usize = 20;

/// User-Agent string for arXiv requests.
const USER_AGENT: &str = concat!("Paperflow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the arXiv query API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    endpoint: Url,
}

impl ArxivClient {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PaperflowError::config(format!("invalid arXiv endpoint {}: {e}", config.endpoint))
        })?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// Fetch up to `max_results` papers in `category`. Requests above
    /// [`MAX_PAPERS_PER_REQUEST`] are clamped.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn search(&self, category: &str, max_results: usize) -> Result<Vec<PaperMetadata>> {
        let xml = self.fetch_feed(category, max_results).await?;
        let papers = parse_feed(&xml)?;
        info!(count = papers.len(), "parsed arXiv feed");
        Ok(papers)
    }

    async fn fetch_feed(&self, category: &str, max_results: usize) -> Result<String> {
        let max_results = if max_results > MAX_PAPERS_PER_REQUEST {
            warn!(
                requested = max_results,
                max = MAX_PAPERS_PER_REQUEST,
                "clamping max_results"
            );
            MAX_PAPERS_PER_REQUEST
        } else {
            max_results
        };

        let query = format!("cat:{category}");
        let max = max_results.to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("search_query", query.as_str()),
                ("start", "0"),
                ("max_results", max.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PaperflowError::Network(format!("arXiv query failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperflowError::Network(format!("arXiv query: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| PaperflowError::Network(format!("arXiv query: failed to read body: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Feed parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_link: Option<String>,
    links: Vec<String>,
}

impl EntryBuilder {
    fn push_text(&mut self, field: Field, text: &str, author: &mut String) {
        match field {
            Field::Id => self.id.push_str(text),
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => author.push_str(text),
        }
    }

    fn read_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut is_pdf = false;
        for attr in e.attributes().flatten() {
            let Ok(value) = attr.unescape_value() else {
                continue;
            };
            match attr.key.as_ref() {
                b"href" => href = Some(value.into_owned()),
                b"title" => is_pdf = value == "pdf",
                _ => {}
            }
        }
        if let Some(href) = href {
            if is_pdf && self.pdf_link.is_none() {
                self.pdf_link = Some(href.clone());
            }
            self.links.push(href);
        }
    }

    fn read_category(&mut self, e: &BytesStart<'_>) {
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() == b"term" {
                if let Ok(value) = attr.unescape_value() {
                    self.categories.push(value.into_owned());
                }
            }
        }
    }

    fn finish(self) -> Option<PaperMetadata> {
        let id = self.id.trim();
        let paper_id = id.rsplit('/').next().unwrap_or(id).to_string();
        if paper_id.is_empty() {
            return None;
        }

        // Fall back to the second link, which arXiv uses for the PDF.
        let pdf_url = self
            .pdf_link
            .or_else(|| self.links.get(1).cloned())
            .unwrap_or_default();

        let abstract_text = single_line(&self.summary);
        let published = self.published.trim().to_string();

        Some(PaperMetadata {
            paper_id,
            title: single_line(&self.title),
            authors: self.authors,
            abstract_text: (!abstract_text.is_empty()).then_some(abstract_text),
            categories: self.categories,
            pdf_url,
            published: (!published.is_empty()).then_some(published),
            source: "arxiv".into(),
            document_file: None,
            ingested_at: Utc::now(),
        })
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed. Entries without an id are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperMetadata>> {
    let mut papers = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;
    let mut in_author = false;
    let mut author = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if current.is_none() => {
                if e.local_name().as_ref() == b"entry" {
                    current = Some(EntryBuilder::default());
                }
            }
            Ok(Event::Start(ref e)) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                match e.local_name().as_ref() {
                    b"id" => field = Some(Field::Id),
                    b"title" => field = Some(Field::Title),
                    b"summary" => field = Some(Field::Summary),
                    b"published" => field = Some(Field::Published),
                    b"author" => {
                        in_author = true;
                        author.clear();
                    }
                    b"name" if in_author => field = Some(Field::AuthorName),
                    b"link" => entry.read_link(e),
                    b"category" => entry.read_category(e),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    match e.local_name().as_ref() {
                        b"link" => entry.read_link(e),
                        b"category" => entry.read_category(e),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    let text = e
                        .unescape()
                        .map_err(|err| PaperflowError::parse(format!("arXiv feed text: {err}")))?;
                    entry.push_text(field, &text, &mut author);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"id" | b"title" | b"summary" | b"published" | b"name" => field = None,
                b"author" => {
                    if in_author {
                        if let Some(entry) = current.as_mut() {
                            let name = single_line(&author);
                            if !name.is_empty() {
                                entry.authors.push(name);
                            }
                        }
                        in_author = false;
                    }
                }
                b"entry" => {
                    if let Some(entry) = current.take() {
                        match entry.finish() {
                            Some(paper) => papers.push(paper),
                            None => warn!("skipping arXiv entry without id"),
                        }
                    }
                    field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PaperflowError::parse(format!(
                    "arXiv feed at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!(count = papers.len(), "arXiv entries parsed");
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=cat:cs.AI</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <published>2024-01-01T00:00:00Z</published>
    <title>Attention Is
      All You Need</title>
    <summary>  We propose a
      new architecture &amp; more.
    </summary>
    <author><name>Ashish Vaswani</name></author>
    <author>
      <name>Noam Shazeer</name>
      <arxiv:affiliation>Google</arxiv:affiliation>
    </author>
    <link href="http://arxiv.org/abs/2401.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v1" rel="related" type="application/pdf"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v2</id>
    <title>Second Paper</title>
    <link href="http://arxiv.org/abs/2401.00002v2" rel="alternate"/>
    <link href="http://arxiv.org/pdf/2401.00002v2" rel="related"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.paper_id, "2401.00001v1");
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(
            first.abstract_text.as_deref(),
            Some("We propose a new architecture & more.")
        );
        assert_eq!(first.categories, vec!["cs.AI", "cs.LG"]);
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2401.00001v1");
        assert_eq!(first.published.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(first.source, "arxiv");
    }

    #[test]
    fn falls_back_to_second_link() {
        let papers = parse_feed(FEED).unwrap();
        let second = &papers[1];
        assert_eq!(second.pdf_url, "http://arxiv.org/pdf/2401.00002v2");
        assert!(second.authors.is_empty());
        assert!(second.abstract_text.is_none());
    }

    #[test]
    fn empty_feed_has_no_entries() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn malformed_feed_is_parse_error() {
        let err = parse_feed("<feed><entry><id>x</entry>").unwrap_err();
        assert!(matches!(err, PaperflowError::Parse { .. }));
    }

    #[tokio::test]
    async fn search_clamps_max_results() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/query"))
            .and(wiremock::matchers::query_param("search_query", "cat:cs.AI"))
            .and(wiremock::matchers::query_param("start", "0"))
            .and(wiremock::matchers::query_param("max_results", "20"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let config = IngestConfig {
            endpoint: format!("{}/api/query", server.uri()),
            ..IngestConfig::default()
        };
        let client = ArxivClient::new(&config).unwrap();
        let papers = client.search("cs.AI", 500).await.unwrap();
        assert_eq!(papers.len(), 2);
    }

    #[tokio::test]
    async fn search_surfaces_http_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = IngestConfig {
            endpoint: server.uri(),
            ..IngestConfig::default()
        };
        let client = ArxivClient::new(&config).unwrap();
        let err = client.search("cs.AI", 5).await.unwrap_err();
        assert!(matches!(err, PaperflowError::Network(_)));
        assert!(err.to_string().contains("503"));
    }
}
