//! One-shot copy of index mappings and settings.

use serde_json::{Map, Value};
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cluster::{ClientOptions, ClusterClient, ClusterVersion};
use crate::config::TransferOptions;
use crate::endpoint::{Endpoint, Role};
use crate::error::{Error, Result};

/// Settings that are generated by the cluster or can only be set at index
/// creation.
const NON_UPDATABLE_SETTINGS: &[&str] = &[
    "creation_date",
    "uuid",
    "version",
    "provided_name",
    "number_of_shards",
    "routing_partition_size",
    "resize",
    "sort",
    "codec",
    "soft_deletes",
    "analysis",
];

/// Which index metadata to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// `_mapping`.
    Mapping,
    /// `_settings`.
    Setting,
}

impl MetadataKind {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Setting => "setting",
        }
    }
}

/// Metadata keyed by index name, as returned by `GET /{index}/_mapping`
/// or `GET /{index}/_settings`.
pub type IndexMetadata = Map<String, Value>;

/// Reads metadata from a cluster or a JSON file.
///
/// # Errors
///
/// Returns a source error if the cluster call fails or the file does not
/// hold a JSON object.
pub async fn read_metadata(
    endpoint: &Endpoint,
    kind: MetadataKind,
    options: &TransferOptions,
) -> Result<IndexMetadata> {
    let value = match endpoint {
        Endpoint::Cluster(cluster) => {
            let client = ClusterClient::connect(
                cluster,
                Role::Input,
                &ClientOptions::for_role(options, Role::Input),
            )
            .await?;
            match kind {
                MetadataKind::Mapping => client.get_mapping().await?,
                MetadataKind::Setting => client.get_settings().await?,
            }
        }
        Endpoint::File(path) => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                Error::Source(format!("Failed to read '{}': {}", path.display(), e))
            })?;
            serde_json::from_str(&text).map_err(|e| {
                Error::Source(format!(
                    "{} in '{}' is not valid JSON: {}",
                    kind.as_str(),
                    path.display(),
                    e
                ))
            })?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Source(format!(
            "{} must be a JSON object, got {}",
            kind.as_str(),
            json_type(&other)
        ))),
    }
}

/// Writes metadata to a cluster index or a new JSON file.
///
/// For a cluster, each mapping entry creates the target index and each
/// settings entry is applied with only its updatable settings.
///
/// # Errors
///
/// Returns a config error if the output file already exists, or a sink
/// error if a cluster call fails.
pub async fn write_metadata(
    endpoint: &Endpoint,
    kind: MetadataKind,
    options: &TransferOptions,
    metadata: &IndexMetadata,
) -> Result<()> {
    match endpoint {
        Endpoint::Cluster(cluster) => {
            let client = ClusterClient::connect(
                cluster,
                Role::Output,
                &ClientOptions::for_role(options, Role::Output),
            )
            .await?;

            for (source_index, entry) in metadata {
                debug!("applying {} of {} to {}", kind.as_str(), source_index, client.index());
                match kind {
                    MetadataKind::Mapping => {
                        client
                            .create_index(&mapping_body(entry, client.version()))
                            .await?;
                    }
                    MetadataKind::Setting => client.put_settings(&settings_body(entry)).await?,
                }
            }
            Ok(())
        }
        Endpoint::File(path) => write_json_file(path, metadata).await,
    }
}

/// Copies metadata from `input` to `output`, returning the number of index
/// entries copied.
///
/// # Errors
///
/// Returns the read or write error.
pub async fn copy_metadata(
    input: &Endpoint,
    output: &Endpoint,
    kind: MetadataKind,
    options: &TransferOptions,
) -> Result<usize> {
    let metadata = read_metadata(input, kind, options).await?;
    write_metadata(output, kind, options, &metadata).await?;

    info!(
        "Dump: write {} success ({} index entries) {} => {}",
        kind.as_str(),
        metadata.len(),
        input.describe(),
        output.describe()
    );
    Ok(metadata.len())
}

/// Create-index body for one mapping entry.
///
/// Typed 6.x mappings (`{"_doc": {"properties": ...}}`) are unwrapped for
/// 7.x and later targets.
#[must_use]
pub fn mapping_body(entry: &Value, target: ClusterVersion) -> Value {
    let Some(mappings) = entry.get("mappings").and_then(Value::as_object) else {
        return entry.clone();
    };

    let typed = (mappings.len() == 1)
        .then(|| mappings.values().next())
        .flatten()
        .filter(|inner| !mappings.contains_key("properties") && inner.get("properties").is_some());

    let mut body = entry.as_object().cloned().unwrap_or_default();
    if let (Some(inner), false) = (typed, target.requires_doc_type()) {
        body.insert("mappings".to_string(), inner.clone());
    }
    Value::Object(body)
}

/// Settings-update body for one settings entry, without the settings an
/// open index rejects.
#[must_use]
pub fn settings_body(entry: &Value) -> Value {
    let settings = entry.get("settings").unwrap_or(entry);
    let mut index = settings
        .get("index")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for key in NON_UPDATABLE_SETTINGS {
        index.remove(*key);
    }

    let mut body = Map::new();
    body.insert("index".to_string(), Value::Object(index));
    Value::Object(body)
}

async fn write_json_file(path: &Path, metadata: &IndexMetadata) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| match e.kind() {
            IoErrorKind::AlreadyExists => {
                Error::Config(format!("output file already exists: {}", path.display()))
            }
            _ => Error::Config(format!(
                "Failed to create output '{}': {}",
                path.display(),
                e
            )),
        })?;

    let bytes = serde_json::to_vec(metadata)
        .map_err(|e| Error::Sink(format!("Failed to encode metadata: {}", e)))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| Error::Sink(format!("Failed to write '{}': {}", path.display(), e)))?;
    file.flush()
        .await
        .map_err(|e| Error::Sink(format!("Failed to write '{}': {}", path.display(), e)))?;
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VersionSelector;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pinned() -> TransferOptions {
        TransferOptions {
            input_version: VersionSelector::V7,
            output_version: VersionSelector::V7,
            ..TransferOptions::default()
        }
    }

    #[test]
    fn test_mapping_body_unwraps_type_for_v7() {
        let entry = json!({"mappings": {"_doc": {"properties": {"a": {"type": "keyword"}}}}});
        assert_eq!(
            mapping_body(&entry, ClusterVersion::V7),
            json!({"mappings": {"properties": {"a": {"type": "keyword"}}}})
        );
        assert_eq!(mapping_body(&entry, ClusterVersion::V6), entry);

        let typeless = json!({"mappings": {"properties": {"a": {"type": "text"}}}});
        assert_eq!(mapping_body(&typeless, ClusterVersion::V8), typeless);
    }

    #[test]
    fn test_settings_body_drops_static_keys() {
        let entry = json!({"settings": {"index": {
            "number_of_shards": "1",
            "number_of_replicas": "2",
            "uuid": "abc",
            "creation_date": "1700000000",
            "provided_name": "logs",
            "version": {"created": "7170399"},
            "refresh_interval": "5s"
        }}});
        assert_eq!(
            settings_body(&entry),
            json!({"index": {"number_of_replicas": "2", "refresh_interval": "5s"}})
        );
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("mapping.json");
        let metadata: IndexMetadata =
            serde_json::from_value(json!({"logs": {"mappings": {"properties": {}}}})).unwrap();

        let endpoint = Endpoint::File(out.clone());
        write_metadata(&endpoint, MetadataKind::Mapping, &pinned(), &metadata)
            .await
            .unwrap();
        let back = read_metadata(&endpoint, MetadataKind::Mapping, &pinned())
            .await
            .unwrap();
        assert_eq!(back, metadata);

        let err = write_metadata(&endpoint, MetadataKind::Mapping, &pinned(), &metadata)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_read_metadata_rejects_non_object_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("settings.json");
        std::fs::write(&input, "[1, 2]").unwrap();

        let err = read_metadata(&Endpoint::File(input), MetadataKind::Setting, &pinned())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[tokio::test]
    async fn test_copy_mapping_between_clusters() {
        let source = MockServer::start().await;
        let target = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/logs/_mapping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logs": {"mappings": {"properties": {"msg": {"type": "text"}}}}
            })))
            .expect(1)
            .mount(&source)
            .await;

        Mock::given(method("PUT"))
            .and(path("/logs_copy"))
            .and(body_json(json!({"mappings": {"properties": {"msg": {"type": "text"}}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&target)
            .await;

        let input = Endpoint::parse(&format!("{}/logs", source.uri())).unwrap();
        let output = Endpoint::parse(&format!("{}/logs_copy", target.uri())).unwrap();
        let copied = copy_metadata(&input, &output, MetadataKind::Mapping, &pinned())
            .await
            .unwrap();
        assert_eq!(copied, 1);
    }

    #[tokio::test]
    async fn test_put_settings_failure_is_sink_error() {
        let target = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/logs/_settings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("illegal_argument_exception"))
            .mount(&target)
            .await;

        let metadata: IndexMetadata = serde_json::from_value(json!({
            "logs": {"settings": {"index": {"number_of_replicas": "0"}}}
        }))
        .unwrap();
        let output = Endpoint::parse(&format!("{}/logs", target.uri())).unwrap();
        let err = write_metadata(&output, MetadataKind::Setting, &pinned(), &metadata)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }
}
