//! Area → locality reference data.
//!
//! The document is the upstream `lamas.json` shape:
//! `{"areas": {"<area>": {"<locality>": {...}, ...}, ...}}`.
//! Only the locality keys matter; their values are ignored. Area order is the
//! order of the document and is what categorization scans in.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

pub const DEFAULT_PATH: &str = "lamas.json";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_URL: &str =
    "https://raw.githubusercontent.com/idodov/RedAlert/main/apps/red_alerts_israel/lamas.json";

/// Characters folded into the canonical apostrophe: ASCII quotes, curly
/// quotes, backtick, acute accent, Hebrew geresh and gershayim.
const QUOTE_VARIANTS: &[char] = &[
    '\'', '"', '`', '´', '\u{2018}', '\u{2019}', '\u{201B}', '\u{201C}', '\u{201D}', '\u{05F3}',
    '\u{05F4}',
];

pub const CANONICAL_APOSTROPHE: char = '\'';

/// Fold every quote/apostrophe variant (and runs of them) into a single `'`
/// and trim surrounding whitespace. Idempotent.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_quote = false;
    for ch in name.trim().chars() {
        if QUOTE_VARIANTS.contains(&ch) {
            if !prev_quote {
                out.push(CANONICAL_APOSTROPHE);
            }
            prev_quote = true;
        } else {
            out.push(ch);
            prev_quote = false;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Area {
    pub name: String,
    localities: HashSet<String>,
}

impl Area {
    pub fn contains(&self, normalized: &str) -> bool {
        self.localities.contains(normalized)
    }

    pub fn len(&self) -> usize {
        self.localities.len()
    }
}

/// Read-only after load; shared freely.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    areas: Vec<Area>,
}

impl Taxonomy {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    #[cfg(test)]
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn locality_count(&self) -> usize {
        self.areas.iter().map(Area::len).sum()
    }

    /// First area (in document order) that lists `normalized`.
    pub fn area_of(&self, normalized: &str) -> Option<&str> {
        self.areas
            .iter()
            .find(|a| a.contains(normalized))
            .map(|a| a.name.as_str())
    }

    /// Build from raw JSON text. A document without an `areas` object is
    /// rejected; an area whose value is not an object is kept but empty.
    pub fn parse(raw: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(raw.trim_start_matches('\u{feff}'))
            .context("taxonomy is not valid JSON")?;
        let areas = doc
            .get("areas")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("taxonomy has no `areas` object"))?;

        let areas = areas
            .iter()
            .map(|(name, cities)| {
                let localities = match cities.as_object() {
                    Some(cities) => cities.keys().map(|c| normalize(c)).collect(),
                    None => {
                        warn!("Unexpected localities structure in area {name}: {cities}");
                        HashSet::new()
                    }
                };
                Area {
                    name: name.clone(),
                    localities,
                }
            })
            .collect();

        Ok(Self { areas })
    }
}

/// Load the taxonomy from `path`, falling back to `url` when the local copy is
/// missing or unusable. A successful download is written to `path` verbatim.
/// When both fail (a stalled download counts once `timeout` elapses) the result
/// is empty and every locality will go unmatched.
pub async fn load(http: &Client, path: &Path, url: &str, timeout: Duration) -> Taxonomy {
    match load_local(path).await {
        Ok(taxonomy) => {
            info!(
                "Taxonomy loaded from {} ({} areas, {} localities)",
                path.display(),
                taxonomy.areas.len(),
                taxonomy.locality_count()
            );
            return taxonomy;
        }
        Err(e) => warn!("Local taxonomy unusable ({e:#}); downloading from {url}"),
    }

    match download(http, path, url, timeout).await {
        Ok(taxonomy) => {
            info!(
                "Taxonomy downloaded and saved to {} ({} areas)",
                path.display(),
                taxonomy.areas.len()
            );
            taxonomy
        }
        Err(e) => {
            error!("Taxonomy unavailable, localities will not be grouped: {e:#}");
            Taxonomy::empty()
        }
    }
}

async fn load_local(path: &Path) -> Result<Taxonomy> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Taxonomy::parse(&raw)
}

async fn download(http: &Client, path: &Path, url: &str, timeout: Duration) -> Result<Taxonomy> {
    let resp = http
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .context("taxonomy request failed")?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("taxonomy download returned {status}"));
    }
    let raw = resp.text().await.context("failed to read taxonomy body")?;
    let taxonomy = Taxonomy::parse(&raw)?;

    if let Err(e) = tokio::fs::write(path, raw.as_bytes()).await {
        warn!("Could not cache taxonomy at {}: {e}", path.display());
    }
    Ok(taxonomy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC: &str = r#"{
        "areas": {
            "North": {"Town A": {}, "Ma’alot": {}},
            "Center": {"Tel Aviv": {}, "Town A": {}},
            "Broken": ["not", "an", "object"]
        }
    }"#;

    #[test]
    fn normalize_folds_apostrophe_variants() {
        let variants = ["Ma'alot", "Ma’alot", "Ma`alot", "Ma׳alot", "Ma‘alot"];
        for v in variants {
            assert_eq!(normalize(v), "Ma'alot", "variant {v:?}");
        }
    }

    #[test]
    fn normalize_trims_and_collapses_runs() {
        assert_eq!(normalize("  Kfar \"\"X\"  "), "Kfar 'X'");
        assert_eq!(normalize("מ״א"), "מ'א");
        assert_eq!(normalize("מ''א"), "מ'א");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "   ",
            " Town A ",
            "ג'סר א-זרקא",
            "ג׳סר א-זרקא",
            "'`’׳",
            "Ma' ’alot",
            "\"quoted\"",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn parse_keeps_document_order_and_normalizes() {
        let tax = Taxonomy::parse(DOC).unwrap();
        let names: Vec<&str> = tax.areas().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["North", "Center", "Broken"]);
        assert!(tax.areas()[0].contains("Ma'alot"));
        assert_eq!(tax.areas()[2].len(), 0);
    }

    #[test]
    fn first_area_wins_on_overlap() {
        let tax = Taxonomy::parse(DOC).unwrap();
        assert_eq!(tax.area_of("Town A"), Some("North"));
        assert_eq!(tax.area_of("Tel Aviv"), Some("Center"));
        assert_eq!(tax.area_of("Nowhere"), None);
    }

    #[test]
    fn parse_rejects_missing_areas() {
        assert!(Taxonomy::parse(r#"{"cities": {}}"#).is_err());
        assert!(Taxonomy::parse("not json").is_err());
    }

    #[tokio::test]
    async fn load_prefers_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lamas.json");
        std::fs::write(&file, DOC).unwrap();

        // Unroutable URL: must not be touched.
        let url = "http://127.0.0.1:9/lamas.json";
        let tax = load(&Client::new(), &file, url, DEFAULT_TIMEOUT).await;
        assert_eq!(tax.areas().len(), 3);
    }

    #[tokio::test]
    async fn load_downloads_and_persists_when_local_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/lamas.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lamas.json");
        let url = format!("{}/lamas.json", server.uri());

        let tax = load(&Client::new(), &file, &url, DEFAULT_TIMEOUT).await;
        assert_eq!(tax.area_of("Town A"), Some("North"));

        let saved = std::fs::read_to_string(&file).unwrap();
        assert_eq!(saved, DOC, "persisted verbatim, before normalization");
    }

    #[tokio::test]
    async fn load_replaces_corrupt_local_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lamas.json");
        std::fs::write(&file, "{ truncated").unwrap();

        let tax = load(&Client::new(), &file, &server.uri(), DEFAULT_TIMEOUT).await;
        assert!(!tax.is_empty());
        assert!(Taxonomy::parse(&std::fs::read_to_string(&file).unwrap()).is_ok());
    }

    #[tokio::test]
    async fn load_degrades_to_empty_when_everything_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.json");

        let tax = load(&Client::new(), &file, &server.uri(), DEFAULT_TIMEOUT).await;
        assert!(tax.is_empty());
        assert_eq!(tax.area_of("Town A"), None);
        assert!(!file.exists(), "a failed download must not be cached");
    }

    #[tokio::test]
    async fn load_gives_up_on_stalled_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(DOC)
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lamas.json");

        let tax = tokio::time::timeout(
            Duration::from_secs(5),
            load(&Client::new(), &file, &server.uri(), Duration::from_millis(200)),
        )
        .await
        .expect("load must not block on a stalled server");
        assert!(tax.is_empty());
        assert!(!file.exists());
    }
}
