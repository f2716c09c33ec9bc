use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use connector_types::{ConfigField, Configuration, DocStream, DownloadFn, Filter, Result, Source, SourceDoc};
use serde_json::{Map, Value};

/// Not a production connector: walks a local directory tree and yields
/// one doc per file, with a lazily-invoked base64-encoding download
/// closure. Exists so `connectors-cli` is runnable end to end against a
/// real filesystem instead of only against mocks. Grounded on
/// `original_source/connectors/sources/gcs.py` (typed configuration,
/// `ping`, lazy `get_content` download shape) and
/// `original_source/connectors/sources/tests/test_directory.py`
/// (`get_docs` walks the connector package's own directory, one doc per
/// file, `dl(doit=True, timestamp=...)` returns `_attachment`).
pub struct DirectoryDataSource {
    directory: PathBuf,
}

impl DirectoryDataSource {
    pub const SERVICE_TYPE: &'static str = "directory";
}

#[async_trait]
impl Source for DirectoryDataSource {
    fn default_configuration() -> Configuration {
        let mut configuration = Configuration::new();
        configuration.insert(
            "directory".to_string(),
            ConfigField { value: Value::Null, label: Some("Directory to crawl".to_string()), field_type: Some("str".to_string()) },
        );
        configuration
    }

    fn new(configuration: Configuration) -> Result<Self> {
        let directory = configuration
            .get("directory")
            .and_then(|field| field.value.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| connector_types::Error::Internal("directory source requires a `directory` configuration value".to_string()))?;
        Ok(DirectoryDataSource { directory })
    }

    async fn ping(&self) -> Result<()> {
        if self.directory.is_dir() {
            Ok(())
        } else {
            Err(connector_types::Error::SourceFatal(format!("{} is not a directory", self.directory.display())))
        }
    }

    fn get_docs(&self, _filtering: Filter) -> DocStream {
        let files = walk(&self.directory);
        let stream = futures::stream::iter(files.into_iter().map(|path| {
            let id = path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "_");
            let timestamp = modified_rfc3339(&path);
            let mut doc = SourceDoc::new(id, timestamp);
            doc.fields.insert("path".to_string(), Value::String(path.to_string_lossy().into_owned()));

            let download = DownloadFn::new(move |doit, _timestamp| {
                let path = path.clone();
                Box::pin(async move {
                    if !doit {
                        return Ok(None);
                    }
                    let bytes = tokio::fs::read(&path)
                        .await
                        .map_err(|err| connector_types::Error::Internal(err.to_string()))?;
                    let mut extra = Map::new();
                    extra.insert("_attachment".to_string(), Value::String(BASE64.encode(bytes)));
                    Ok(Some(extra))
                })
            });

            (doc, download)
        }));
        Box::pin(stream)
    }
}

fn walk(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

fn modified_rfc3339(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(time::OffsetDateTime::from)
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_default()
}

pub struct DirectoryDataSourceFactory;

impl connector_types::SourceFactory for DirectoryDataSourceFactory {
    fn service_type(&self) -> &str {
        DirectoryDataSource::SERVICE_TYPE
    }

    fn default_configuration(&self) -> Configuration {
        DirectoryDataSource::default_configuration()
    }

    fn build(&self, configuration: Configuration) -> Result<std::sync::Arc<dyn Source>> {
        Ok(std::sync::Arc::new(DirectoryDataSource::new(configuration)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_one_doc_per_file_with_a_lazy_attachment() {
        let dir = std::env::temp_dir().join(format!("connectors-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.join("b.txt"), b"world").unwrap();

        let mut configuration = Configuration::new();
        configuration.insert("directory".to_string(), ConfigField::with_value(Value::String(dir.to_string_lossy().into_owned())));
        let source = DirectoryDataSource::new(configuration).unwrap();
        source.ping().await.unwrap();

        use futures::StreamExt;
        let mut stream = source.get_docs(Filter::empty());
        let mut count = 0;
        while let Some((_doc, download)) = stream.next().await {
            let extra = download.call(true, None).await.unwrap().unwrap();
            assert!(extra.get("_attachment").unwrap().as_str().unwrap().len() > 0);
            count += 1;
        }
        assert_eq!(count, 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn ping_fails_when_directory_is_missing() {
        let mut configuration = Configuration::new();
        configuration.insert("directory".to_string(), ConfigField::with_value(Value::String("/no/such/path".to_string())));
        let source = DirectoryDataSource::new(configuration).unwrap();
        assert!(source.ping().await.is_err());
    }
}
