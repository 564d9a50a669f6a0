use crate::error::CorpusError;
use crate::fetch::normalize_url;
use serde::{Deserialize, Serialize};
use simsearch_core::CorpusEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Supplies the reference entries searched by the coordinator
pub trait CorpusProvider {
    fn entries(&self) -> Result<Vec<CorpusEntry>, CorpusError>;
}

impl CorpusProvider for Vec<CorpusEntry> {
    fn entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        Ok(self.clone())
    }
}

impl CorpusProvider for [CorpusEntry] {
    fn entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        Ok(self.to_vec())
    }
}

/// On-disk list of entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: Vec<CorpusEntry>,
}

impl Manifest {
    /// Parse JSON (`.json`) or TOML (anything else)
    pub fn parse(text: &str, path: &Path) -> Result<Self, CorpusError> {
        let parse_err = |message: String| CorpusError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let manifest: Manifest = if is_json(path) {
            serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?
        } else {
            toml::from_str(text).map_err(|e| parse_err(e.to_string()))?
        };

        let mut ids = HashSet::new();
        for entry in &manifest.entries {
            if !ids.insert(entry.id) {
                return Err(CorpusError::DuplicateId(entry.id));
            }
        }
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load, or start empty when the file does not exist yet
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CorpusError> {
        let path = path.as_ref();
        let parse_err = |message: String| CorpusError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let text = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| parse_err(e.to_string()))?
        } else {
            toml::to_string_pretty(self).map_err(|e| parse_err(e.to_string()))?
        };
        std::fs::write(path, text).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn find(&self, id: u64) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Append `discovered` entries whose URL is not present yet, with fresh ids
    pub fn merge(&mut self, discovered: Vec<CorpusEntry>) -> MergeReport {
        let mut known: HashSet<String> = self.entries.iter().map(|e| url_key(&e.image_url)).collect();
        let mut next_id = self.entries.iter().map(|e| e.id).max().map_or(1, |m| m + 1);
        let mut report = MergeReport::default();

        for mut entry in discovered {
            if !known.insert(url_key(&entry.image_url)) {
                tracing::info!(url = %entry.image_url, "duplicate URL, skipping");
                report.skipped += 1;
                continue;
            }
            entry.id = next_id;
            next_id += 1;
            report.added += 1;
            self.entries.push(entry);
        }
        report
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub skipped: usize,
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn url_key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}

/// Corpus stored in a manifest file
#[derive(Debug, Clone)]
pub struct ManifestCorpus {
    path: PathBuf,
}

impl ManifestCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusProvider for ManifestCorpus {
    fn entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        Ok(Manifest::load(&self.path)?.entries)
    }
}

/// Every decodable image file directly inside a directory, named by file name
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    dir: PathBuf,
    base_url: Option<String>,
    path_root: Option<PathBuf>,
}

impl DirectoryCorpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_url: None,
            path_root: None,
        }
    }

    /// Record local paths relative to `root` when they lie under it
    pub fn relative_to(mut self, root: impl Into<PathBuf>) -> Self {
        self.path_root = Some(root.into());
        self
    }

    /// Publish entries as `{base_url}/{file name}` instead of local paths
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl CorpusProvider for DirectoryCorpus {
    fn entries(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        let io_err = |source| CorpusError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(io_err)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && image::ImageFormat::from_path(p).is_ok())
            .collect();
        files.sort();

        let entries = files
            .into_iter()
            .zip(1u64..)
            .filter_map(|(path, id)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let image_url = match &self.base_url {
                    Some(base) => format!("{}/{}", base.trim_end_matches('/'), name),
                    None => match &self.path_root {
                        Some(root) => path.strip_prefix(root).unwrap_or(&path).display().to_string(),
                        None => path.display().to_string(),
                    },
                };
                Some(CorpusEntry::new(id, name, image_url))
            })
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{ImageFetcher, UrlFetcher};

    #[test]
    fn test_parse_toml_and_json() {
        let toml_text = r#"
[[entries]]
id = 1
name = "Sunflowers"
attribution = "Vincent van Gogh"
image_url = "https://example.com/sunflowers.jpg"

[[entries]]
id = 2
name = "Untitled"
image_url = "https://example.com/untitled.jpg"
"#;
        let m = Manifest::parse(toml_text, Path::new("corpus.toml")).unwrap();
        assert_eq!(m.entries.len(), 2);
        assert_eq!(m.entries[0].attribution.as_deref(), Some("Vincent van Gogh"));
        assert_eq!(m.entries[1].attribution_or_empty(), "");

        let json_text = r#"{"entries": [{"id": 7, "name": "a", "image_url": "a.png"}]}"#;
        let m = Manifest::parse(json_text, Path::new("corpus.json")).unwrap();
        assert_eq!(m.find(7).map(|e| e.name.as_str()), Some("a"));
        assert!(m.find(8).is_none());
    }

    #[test]
    fn test_rejects_duplicate_ids_and_bad_syntax() {
        let text = r#"{"entries": [{"id": 1, "name": "a", "image_url": "a"}, {"id": 1, "name": "b", "image_url": "b"}]}"#;
        assert!(matches!(
            Manifest::parse(text, Path::new("c.json")),
            Err(CorpusError::DuplicateId(1))
        ));
        assert!(matches!(
            Manifest::parse("entries = 3", Path::new("c.toml")),
            Err(CorpusError::Parse { .. })
        ));
    }

    #[test]
    fn test_merge_skips_known_urls() {
        let mut m = Manifest {
            entries: vec![CorpusEntry::new(4, "a.png", "https://x.org/a b.png")],
        };
        let report = m.merge(vec![
            CorpusEntry::new(0, "a.png", "https://x.org/a%20b.png"),
            CorpusEntry::new(0, "c.png", "https://x.org/c.png"),
            CorpusEntry::new(0, "c.png", "https://x.org/c.png"),
        ]);
        assert_eq!(report, MergeReport { added: 1, skipped: 2 });
        assert_eq!(m.entries.len(), 2);
        assert_eq!(m.entries[1].id, 5);
    }

    #[test]
    fn test_relative_paths_resolve_from_manifest_dir() {
        let root = tempfile::tempdir().unwrap();
        let art = root.path().join("art");
        std::fs::create_dir(&art).unwrap();
        std::fs::write(art.join("a.png"), b"png bytes").unwrap();

        let entries = DirectoryCorpus::new(&art).relative_to(root.path()).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(Path::new(&entries[0].image_url), Path::new("art").join("a.png"));

        let fetcher = UrlFetcher::new(std::time::Duration::from_secs(1))
            .unwrap()
            .with_file_root(root.path());
        assert_eq!(fetcher.fetch(&entries[0].image_url).unwrap(), b"png bytes");
        assert!(matches!(
            UrlFetcher::new(std::time::Duration::from_secs(1))
                .unwrap()
                .fetch(&entries[0].image_url),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_corpus_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let entries = DirectoryCorpus::new(dir.path())
            .with_base_url("https://cdn.example.com/art/")
            .entries()
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
        assert_eq!(entries[1].image_url, "https://cdn.example.com/art/b.png");

        let path = dir.path().join("corpus.toml");
        let mut manifest = Manifest::load_or_default(&path).unwrap();
        manifest.merge(entries);
        manifest.save(&path).unwrap();
        let loaded = ManifestCorpus::new(&path).entries().unwrap();
        assert_eq!(loaded, manifest.entries);
    }
}
