//! Document sources for the offline indexing phase.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::document::Document;
use crate::error::{RagError, Result};

/// Somewhere documents come from.
///
/// A source either yields all of its documents or fails as a whole with
/// [`RagError::LoadError`].
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<Document>>;
}

/// Documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<Document>,
}

impl StaticSource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Reads UTF-8 text files from disk.
///
/// Each path may be a file or a directory; directories contribute their
/// immediate children whose extension is in the allowed list (`txt` and `md`
/// by default), in file name order. The document ID is the file stem and the
/// source URI is the path.
#[derive(Debug, Clone)]
pub struct TextFileSource {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl TextFileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            extensions: vec!["txt".to_string(), "md".to_string()],
        }
    }

    /// Replace the extensions picked up from directories.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    async fn expand(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| load_error(path, e))?;
        if !metadata.is_dir() {
            return Ok(vec![path.to_path_buf()]);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| load_error(path, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| load_error(path, e))? {
            let file = entry.path();
            let wanted = file
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext));
            if !wanted {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| load_error(&file, e))?;
            if file_type.is_file() {
                files.push(file);
            }
        }
        files.sort();
        debug!(dir = %path.display(), files = files.len(), "expanded directory");
        Ok(files)
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> RagError {
    error!(path = %path.display(), error = %e, "failed to load document");
    RagError::LoadError { origin: path.display().to_string(), message: e.to_string() }
}

#[async_trait]
impl DocumentSource for TextFileSource {
    fn name(&self) -> &str {
        "files"
    }

    async fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for path in &self.paths {
            for file in self.expand(path).await? {
                let text =
                    tokio::fs::read_to_string(&file).await.map_err(|e| load_error(&file, e))?;
                let id = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string());
                documents.push(Document::new(id, text).with_source_uri(file.display().to_string()));
            }
        }
        info!(documents = documents.len(), "loaded text files");
        Ok(documents)
    }
}

/// Fetches pages over HTTP and returns each response body as one document.
///
/// No markup is stripped; pair it with a chunker that tolerates raw HTML or
/// pre-process the text.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { client: reqwest::Client::new(), urls: urls.into_iter().map(Into::into).collect() }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let fail = |message: String| {
            error!(url, %message, "failed to fetch document");
            RagError::LoadError { origin: url.to_string(), message }
        };
        let response = self.client.get(url).send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| fail(e.to_string()))
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl DocumentSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.urls.len());
        for (i, url) in self.urls.iter().enumerate() {
            let text = self.fetch(url).await?;
            debug!(url, bytes = text.len(), "fetched document");
            documents.push(Document::new(format!("web_{i}"), text).with_source_uri(url.clone()));
        }
        info!(documents = documents.len(), "loaded web documents");
        Ok(documents)
    }
}
