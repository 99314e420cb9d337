//! Document text extraction collaborators.
//!
//! Extractors turn document bytes into text. The [`ExtractionChain`] runs a
//! native extractor first and retries with OCR when the native text looks
//! like garbage (low alphabetic ratio).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use paperflow_quality::alphabetic_ratio;
use paperflow_shared::{ExtractionConfig, ExtractionMethod, PaperflowError, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Page separator emitted by text extractors.
const FORM_FEED: char = '\u{000C}';

/// Text pulled from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub text: String,
    pub page_count: usize,
}

impl RawExtraction {
    pub fn from_text(text: String) -> Self {
        let page_count = count_pages(&text);
        Self { text, page_count }
    }
}

/// Count form-feed separated pages. Non-empty text has at least one page.
pub fn count_pages(text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    text.split(FORM_FEED)
        .filter(|page| !page.trim().is_empty())
        .count()
        .max(1)
}

/// Turns document bytes into text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, bytes: &[u8]) -> Result<RawExtraction>;
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Runs an external program with the document on stdin and reads text from stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExtractor {
    /// Build from an argv list such as `["pdftotext", "-layout", "-", "-"]`.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PaperflowError::config("extractor command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PaperflowError::Extraction(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = bytes.to_vec();
            // Feed stdin concurrently so a full stdout pipe cannot deadlock us.
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PaperflowError::Extraction(format!("{} failed: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PaperflowError::Extraction(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DocumentExtractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    async fn extract(&self, bytes: &[u8]) -> Result<RawExtraction> {
        let stdout = tokio::time::timeout(self.timeout, self.run(bytes))
            .await
            .map_err(|_| {
                PaperflowError::Extraction(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })??;
        Ok(RawExtraction::from_text(
            String::from_utf8_lossy(&stdout).into_owned(),
        ))
    }
}

/// Treats the document as UTF-8 text. Used for `.txt` inputs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain-text"
    }

    async fn extract(&self, bytes: &[u8]) -> Result<RawExtraction> {
        Ok(RawExtraction::from_text(
            String::from_utf8_lossy(bytes).into_owned(),
        ))
    }
}

// ---------------------------------------------------------------------------
// ExtractionChain
// ---------------------------------------------------------------------------

/// Output of the chain, tagged with the extractor that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub page_count: usize,
    pub method: ExtractionMethod,
    pub alphabetic_ratio: f64,
}

/// Native extraction with an optional OCR fallback, configured once.
#[derive(Clone)]
pub struct ExtractionChain {
    native: Arc<dyn DocumentExtractor>,
    ocr: Option<Arc<dyn DocumentExtractor>>,
    threshold: f64,
}

impl std::fmt::Debug for ExtractionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionChain")
            .field("native", &self.native.name())
            .field("ocr", &self.ocr.as_ref().map(|o| o.name().to_string()))
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl ExtractionChain {
    pub fn new(
        native: Arc<dyn DocumentExtractor>,
        ocr: Option<Arc<dyn DocumentExtractor>>,
        threshold: f64,
    ) -> Self {
        Self {
            native,
            ocr,
            threshold,
        }
    }

    /// Build the chain from the `[extraction]` config section.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let native = Arc::new(CommandExtractor::from_argv(&config.native_command, timeout)?);
        let ocr: Option<Arc<dyn DocumentExtractor>> = if config.ocr_command.is_empty() {
            None
        } else {
            Some(Arc::new(CommandExtractor::from_argv(&config.ocr_command, timeout)?))
        };
        Ok(Self::new(native, ocr, config.ocr_fallback_threshold))
    }

    /// Extract text, falling back to OCR below the alphabetic-ratio threshold.
    ///
    /// A failing OCR pass keeps the native result.
    pub async fn extract(&self, bytes: &[u8]) -> Result<Extraction> {
        let native = self.native.extract(bytes).await?;
        let native_ratio = alphabetic_ratio(&native.text);
        debug!(
            extractor = self.native.name(),
            ratio = native_ratio,
            pages = native.page_count,
            "native extraction finished"
        );

        let native_result = Extraction {
            text: native.text,
            page_count: native.page_count,
            method: ExtractionMethod::Native,
            alphabetic_ratio: native_ratio,
        };

        if native_ratio >= self.threshold {
            return Ok(native_result);
        }
        let Some(ocr) = &self.ocr else {
            return Ok(native_result);
        };

        info!(
            ratio = native_ratio,
            threshold = self.threshold,
            "native text below threshold, trying OCR"
        );
        match ocr.extract(bytes).await {
            Ok(scanned) => {
                let ratio = alphabetic_ratio(&scanned.text);
                Ok(Extraction {
                    text: scanned.text,
                    page_count: scanned.page_count.max(native_result.page_count),
                    method: ExtractionMethod::Ocr,
                    alphabetic_ratio: ratio,
                })
            }
            Err(e) => {
                warn!(error = %e, "OCR failed, keeping native text");
                Ok(native_result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl DocumentExtractor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn extract(&self, _bytes: &[u8]) -> Result<RawExtraction> {
            Ok(RawExtraction::from_text(self.0.to_string()))
        }
    }

    struct Broken;

    #[async_trait]
    impl DocumentExtractor for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn extract(&self, _bytes: &[u8]) -> Result<RawExtraction> {
            Err(PaperflowError::Extraction("scanner offline".into()))
        }
    }

    #[test]
    fn page_counting() {
        assert_eq!(count_pages(""), 0);
        assert_eq!(count_pages("one page"), 1);
        assert_eq!(count_pages("p1\u{000C}p2\u{000C}p3\u{000C}"), 3);
        assert_eq!(count_pages("p1\u{000C}\u{000C}  \u{000C}p2"), 2);
    }

    #[tokio::test]
    async fn keeps_good_native_text() {
        let chain = ExtractionChain::new(
            Arc::new(Fixed("plenty of real words here")),
            Some(Arc::new(Fixed("ocr words"))),
            0.3,
        );
        let out = chain.extract(b"doc").await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Native);
        assert_eq!(out.text, "plenty of real words here");
    }

    #[tokio::test]
    async fn falls_back_to_ocr_on_garbage() {
        let chain = ExtractionChain::new(
            Arc::new(Fixed("@@## 1234 %%%% ^^&&")),
            Some(Arc::new(Fixed("recovered text from scan"))),
            0.3,
        );
        let out = chain.extract(b"doc").await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Ocr);
        assert_eq!(out.text, "recovered text from scan");
        assert!(out.alphabetic_ratio > 0.8);
    }

    #[tokio::test]
    async fn ocr_failure_keeps_native() {
        let chain = ExtractionChain::new(Arc::new(Fixed("1234")), Some(Arc::new(Broken)), 0.3);
        let out = chain.extract(b"doc").await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Native);
        assert_eq!(out.text, "1234");
    }

    #[tokio::test]
    async fn no_ocr_configured_keeps_native() {
        let chain = ExtractionChain::new(Arc::new(Fixed("")), None, 0.3);
        let out = chain.extract(b"doc").await.unwrap();
        assert_eq!(out.method, ExtractionMethod::Native);
        assert_eq!(out.page_count, 0);
    }

    #[tokio::test]
    async fn plain_text_extractor_reads_utf8() {
        let out = PlainTextExtractor
            .extract("page one\u{000C}page two".as_bytes())
            .await
            .unwrap();
        assert_eq!(out.page_count, 2);
    }

    #[test]
    fn empty_command_is_config_error() {
        let err = CommandExtractor::from_argv(&[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PaperflowError::Config { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_extractor_pipes_stdin_to_stdout() {
        let extractor =
            CommandExtractor::from_argv(&["cat".to_string()], Duration::from_secs(5)).unwrap();
        let out = extractor.extract(b"hello\x0cworld").await.unwrap();
        assert_eq!(out.text, "hello\u{000C}world");
        assert_eq!(out.page_count, 2);
    }
}
