//! Catalog ingestion: turn source listing entries into `pending` items.
//!
//! Entries use the JSON shape of `rclone lsjson`. Listing the source bucket is left to the
//! caller; this module only converts entries and registers them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::Result;
use crate::store::ItemStore;
use crate::types::{ItemId, NewItem};

/// One object from a source listing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Path relative to the listed root
    #[serde(rename = "Path", default)]
    pub path: String,
    /// Object size in bytes (-1 when unknown)
    #[serde(rename = "Size", default)]
    pub size: Option<i64>,
    /// MIME type
    #[serde(rename = "MimeType", default)]
    pub mime_type: Option<String>,
    /// Modification time as reported by the source
    #[serde(rename = "ModTime", default)]
    pub mod_time: Option<String>,
    /// Whether the entry is a directory
    #[serde(rename = "IsDir", default)]
    pub is_dir: bool,
    /// Storage tier
    #[serde(rename = "Tier", default)]
    pub tier: Option<String>,
}

/// Why an entry did not become an item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Directories carry no bytes
    Directory,
    /// The entry has no path to key it by
    EmptyPath,
    /// No source locator could be derived from the path
    MissingLocator,
    /// The entry is not in the configured selection
    NotSelected,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Directory => "directory",
            SkipReason::EmptyPath => "empty path",
            SkipReason::MissingLocator => "missing source locator",
            SkipReason::NotSelected => "not selected",
        })
    }
}

/// Parse the output of `rclone lsjson`
pub fn parse_listing(json: &[u8]) -> Result<Vec<CatalogEntry>> {
    Ok(serde_json::from_slice(json)?)
}

/// Rules for turning entries into items
#[derive(Clone, Debug, Default)]
pub struct CatalogMapper {
    source_prefix: Option<String>,
    selection: Option<HashSet<String>>,
}

impl CatalogMapper {
    /// Map entries with their path as the source locator
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to the path to form the source locator (e.g. a download base URL)
    pub fn with_source_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.source_prefix = Some(prefix.into());
        self
    }

    /// Only accept entries whose path is in `ids`
    pub fn with_selection<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Convert one entry, or say why it is skipped
    pub fn to_new_item(&self, entry: &CatalogEntry) -> std::result::Result<NewItem, SkipReason> {
        if entry.is_dir {
            return Err(SkipReason::Directory);
        }

        let path = entry.path.trim_start_matches('/');
        if path.trim().is_empty() {
            return Err(SkipReason::EmptyPath);
        }

        if let Some(selection) = &self.selection
            && !selection.contains(path)
        {
            return Err(SkipReason::NotSelected);
        }

        let source_locator = match &self.source_prefix {
            Some(prefix) if prefix.is_empty() => return Err(SkipReason::MissingLocator),
            Some(prefix) => join_locator(prefix, path),
            None => path.to_string(),
        };

        Ok(NewItem {
            id: ItemId::new(path),
            source_locator,
            destination_key: path.to_string(),
            size_bytes: entry.size.filter(|s| *s >= 0),
            mime_type: entry.mime_type.clone(),
            modified_at: entry.mod_time.clone(),
            storage_tier: entry.tier.clone(),
        })
    }
}

/// Append `path` to `prefix`
///
/// HTTP(S) prefixes get each path segment percent-encoded, so names containing `#`, `?`,
/// `%` or spaces still address the right object. Other prefixes (rclone remotes, local
/// paths) are joined verbatim.
fn join_locator(prefix: &str, path: &str) -> String {
    if let Ok(mut url) = url::Url::parse(prefix)
        && matches!(url.scheme(), "http" | "https")
    {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.split('/'));
        }
        return url.into();
    }

    if prefix.ends_with('/') {
        format!("{}{}", prefix, path)
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Outcome of [`ingest`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    /// Items registered as pending
    pub registered: Vec<ItemId>,
    /// Entries left out, by path
    pub skipped: Vec<(String, SkipReason)>,
}

/// Register every convertible entry as `pending`
///
/// Registering an id that already exists resets it to `pending`. Skipped entries are
/// reported, not errors; a store failure aborts the ingest.
pub async fn ingest(
    store: &dyn ItemStore,
    mapper: &CatalogMapper,
    entries: &[CatalogEntry],
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for entry in entries {
        match mapper.to_new_item(entry) {
            Ok(item) => {
                store.put_initial(&item).await?;
                report.registered.push(item.id);
            }
            Err(reason) => {
                tracing::debug!(path = %entry.path, reason = %reason, "catalog entry skipped");
                report.skipped.push((entry.path.clone(), reason));
            }
        }
    }

    tracing::info!(
        registered = report.registered.len(),
        skipped = report.skipped.len(),
        "catalog ingested"
    );
    Ok(report)
}

// unwrap/expect are acceptable in tests
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::types::ItemStatus;
    use tempfile::NamedTempFile;

    const LISTING: &str = r#"[
        {"Path":"course","Name":"course","Size":-1,"MimeType":"inode/directory","ModTime":"2021-06-01T10:00:00Z","IsDir":true},
        {"Path":"course/intro.mp4","Name":"intro.mp4","Size":1048576,"MimeType":"video/mp4","ModTime":"2021-06-01T10:00:00Z","IsDir":false,"Tier":"STANDARD"},
        {"Path":"course/lesson-1.mp4","Name":"lesson-1.mp4","Size":2097152,"MimeType":"video/mp4","ModTime":"2021-06-02T10:00:00Z","IsDir":false,"Tier":"STANDARD"}
    ]"#;

    #[test]
    fn parses_lsjson_shape() {
        let entries = parse_listing(LISTING.as_bytes()).unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].path, "course/intro.mp4");
        assert_eq!(entries[1].size, Some(1048576));
        assert_eq!(entries[1].tier.as_deref(), Some("STANDARD"));
    }

    #[test]
    fn directories_and_empty_paths_are_skipped() {
        let mapper = CatalogMapper::new();

        let dir = CatalogEntry {
            path: "course".into(),
            is_dir: true,
            ..Default::default()
        };
        let blank = CatalogEntry {
            path: "  ".into(),
            ..Default::default()
        };

        assert_eq!(mapper.to_new_item(&dir), Err(SkipReason::Directory));
        assert_eq!(mapper.to_new_item(&blank), Err(SkipReason::EmptyPath));
    }

    #[test]
    fn source_prefix_forms_locator() {
        let mapper = CatalogMapper::new().with_source_prefix("https://cdn.example.com/videos");
        let item = mapper
            .to_new_item(&CatalogEntry {
                path: "course/intro.mp4".into(),
                size: Some(-1),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            item.source_locator,
            "https://cdn.example.com/videos/course/intro.mp4"
        );
        assert_eq!(item.destination_key, "course/intro.mp4");
        assert_eq!(item.size_bytes, None);
    }

    #[test]
    fn url_prefix_percent_encodes_each_segment() {
        let mapper = CatalogMapper::new().with_source_prefix("https://cdn.example.com/videos/");
        let locator = |path: &str| {
            mapper
                .to_new_item(&CatalogEntry {
                    path: path.into(),
                    ..Default::default()
                })
                .unwrap()
                .source_locator
        };

        assert_eq!(
            locator("course/ep #1?.mp4"),
            "https://cdn.example.com/videos/course/ep%20%231%3F.mp4"
        );
        assert_eq!(
            locator("100%.mp4"),
            "https://cdn.example.com/videos/100%25.mp4"
        );

        // The id and destination key keep the raw catalog path
        let item = mapper
            .to_new_item(&CatalogEntry {
                path: "course/ep #1?.mp4".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(item.id, "course/ep #1?.mp4");
        assert_eq!(item.destination_key, "course/ep #1?.mp4");
    }

    #[test]
    fn remote_prefix_is_joined_verbatim() {
        let mapper = CatalogMapper::new().with_source_prefix("aliyun:test-ali-video");
        let item = mapper
            .to_new_item(&CatalogEntry {
                path: "course/ep #1.mp4".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(item.source_locator, "aliyun:test-ali-video/course/ep #1.mp4");
    }

    #[test]
    fn empty_source_prefix_is_missing_locator() {
        let mapper = CatalogMapper::new().with_source_prefix("");
        let entry = CatalogEntry {
            path: "a.mp4".into(),
            ..Default::default()
        };

        assert_eq!(mapper.to_new_item(&entry), Err(SkipReason::MissingLocator));
    }

    #[test]
    fn selection_filters_unlisted_paths() {
        let mapper = CatalogMapper::new().with_selection(["course/intro.mp4"]);

        let selected = CatalogEntry {
            path: "course/intro.mp4".into(),
            ..Default::default()
        };
        let other = CatalogEntry {
            path: "course/lesson-1.mp4".into(),
            ..Default::default()
        };

        assert!(mapper.to_new_item(&selected).is_ok());
        assert_eq!(mapper.to_new_item(&other), Err(SkipReason::NotSelected));
    }

    #[tokio::test]
    async fn ingest_registers_files_as_pending() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).await.unwrap();
        let entries = parse_listing(LISTING.as_bytes()).unwrap();

        let report = ingest(&db, &CatalogMapper::new(), &entries).await.unwrap();

        assert_eq!(
            report.registered,
            vec![
                ItemId::new("course/intro.mp4"),
                ItemId::new("course/lesson-1.mp4")
            ]
        );
        assert_eq!(
            report.skipped,
            vec![("course".to_string(), SkipReason::Directory)]
        );

        let pending = db.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|i| i.status == ItemStatus::Pending));
        assert_eq!(pending[0].mime_type.as_deref(), Some("video/mp4"));
        db.close().await;
    }
}
