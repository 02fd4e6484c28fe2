//! Testing utilities and mock implementations.
//!
//! Mocks stand in for every collaborator of the search engine so searches
//! can be exercised end to end without real sites.
//!
//! # Example
//!
//! ```rust,ignore
//! use trawl_core::testing::{fixtures, MockClientFactory, MockFilter};
//!
//! let clients = MockClientFactory::new();
//! clients
//!     .respond("https://t.example/search?q=Dune", FetchResponse::new(200, page))
//!     .await;
//!
//! // Hand `clients` and `MockFilter::new()` to a SearchCoordinator...
//! ```

mod mock_client;
mod mock_filter;
mod mock_progress;

pub use mock_client::{MockClient, MockClientFactory};
pub use mock_filter::MockFilter;
pub use mock_progress::RecordingProgress;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::catalog::{
        ApiFormat, CatalogEntry, FieldSelector, LoginForm, QueryTemplates, SourceDefinition,
        SourceFormat, TableFormat,
    };
    use crate::searcher::{ContentKind, NormalizedRecord};

    fn base_source(id: &str, name: String, search: &str, format: SourceFormat) -> SourceDefinition {
        SourceDefinition {
            id: id.to_string(),
            name,
            color: "FFFFFFFF".to_string(),
            language: "en".to_string(),
            root_url: format!("https://{}.example", id),
            search: search.to_string(),
            separator: "%20".to_string(),
            private: false,
            login: None,
            token: None,
            post_data: BTreeMap::new(),
            get_data: BTreeMap::new(),
            filter_title: false,
            subpage: false,
            download_path: None,
            kinds: vec![
                ContentKind::General,
                ContentKind::Movie,
                ContentKind::Show,
                ContentKind::Season,
                ContentKind::Episode,
                ContentKind::Anime,
            ],
            queries: QueryTemplates::default(),
            enabled_by_default: None,
            format,
        }
    }

    fn selector(css: &str) -> FieldSelector {
        FieldSelector {
            selector: Some(css.to_string()),
            ..Default::default()
        }
    }

    /// A JSON API source reading `data.results`.
    pub fn api_source(id: &str) -> SourceDefinition {
        base_source(
            id,
            format!("Api {}", id),
            "/api/search?q=QUERY",
            SourceFormat::Api(ApiFormat {
                results: "data.results".to_string(),
                name: "title".to_string(),
                torrent: "link".to_string(),
                info_hash: Some("hash".to_string()),
                size: Some("size".to_string()),
                seeds: Some("seeds".to_string()),
                peers: Some("peers".to_string()),
                quality: None,
                subresults: None,
            }),
        )
    }

    /// An HTML table source matching [`table_page`].
    pub fn table_source(id: &str) -> SourceDefinition {
        base_source(
            id,
            format!("Table {}", id),
            "/search?q=QUERY",
            SourceFormat::Table(TableFormat {
                row: "tr.row".to_string(),
                name: selector("a.name"),
                torrent: FieldSelector {
                    selector: Some("a.dl".to_string()),
                    attr: Some("href".to_string()),
                    pattern: None,
                },
                info_hash: None,
                size: Some(selector("td.size")),
                seeds: Some(selector("td.seeds")),
                peers: Some(selector("td.peers")),
            }),
        )
    }

    /// A table source whose links point to detail pages.
    pub fn subpage_source(id: &str) -> SourceDefinition {
        let mut source = table_source(id);
        source.subpage = true;
        source
    }

    /// A private table source logging in at `/login`.
    pub fn private_source(id: &str) -> SourceDefinition {
        let mut source = table_source(id);
        source.name = format!("Private {}", id);
        source.private = true;
        source.login = Some(LoginForm {
            path: "/login".to_string(),
            fields: BTreeMap::from([
                ("username".to_string(), "USERNAME".to_string()),
                ("password".to_string(), "PASSWORD".to_string()),
            ]),
            failure_marker: Some("Invalid".to_string()),
        });
        source
    }

    /// An enabled catalog entry without credentials.
    pub fn entry(definition: SourceDefinition) -> CatalogEntry {
        CatalogEntry {
            definition: Arc::new(definition),
            enabled: true,
            credentials: None,
        }
    }

    /// Results page for [`table_source`]: `(name, link, size, seeds)` rows.
    pub fn table_page(rows: &[(&str, &str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(name, link, size, seeds)| {
                format!(
                    "<tr class=\"row\"><td><a class=\"name\" href=\"/details\">{}</a></td>\
                     <td><a class=\"dl\" href=\"{}\">get</a></td>\
                     <td class=\"size\">{}</td><td class=\"seeds\">{}</td>\
                     <td class=\"peers\">0</td></tr>\n",
                    name, link, size, seeds
                )
            })
            .collect();
        format!(
            "<html><body><table>\n<tr><th>Name</th></tr>\n{}</table></body></html>",
            body
        )
    }

    /// A normalized record with a magnet locator derived from `name`.
    pub fn record(source: &str, name: &str, seeds: u32) -> NormalizedRecord {
        let hash = name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>();
        NormalizedRecord {
            name: name.to_string(),
            uri: format!("magnet:?xt=urn:btih:{}{}", source, hash),
            info_hash: String::new(),
            size: 1024 * 1024 * 700,
            seeds,
            peers: 1,
            language: "en".to_string(),
            source: source.to_string(),
            provider: format!("Source {}", source),
            icon: format!("icons/{}.png", source),
            resolution: None,
        }
    }
}
