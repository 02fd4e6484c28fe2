//! Scraping of HTML result tables.

use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::catalog::{FieldSelector, SourceDefinition, TableFormat};
use crate::searcher::RawCandidate;

use super::locator::{absolute_url, append_headers, is_magnet};
use super::{ExtractError, ExtractedRow, SessionHeaders};

/// [`FieldSelector`] with its selector and pattern compiled.
struct CompiledField {
    selector: Option<Selector>,
    attr: Option<String>,
    pattern: Option<Regex>,
}

impl CompiledField {
    fn compile(field: &FieldSelector) -> Result<Self, ExtractError> {
        let selector = field.selector.as_deref().map(parse_selector).transpose()?;
        let pattern = field
            .pattern
            .as_deref()
            .map(|p| Regex::new(p).map_err(|e| ExtractError::Pattern(p.to_string(), e.to_string())))
            .transpose()?;
        Ok(Self {
            selector,
            attr: field.attr.clone(),
            pattern,
        })
    }

    fn compile_opt(field: Option<&FieldSelector>) -> Result<Option<Self>, ExtractError> {
        field.map(Self::compile).transpose()
    }

    fn value(&self, row: ElementRef<'_>) -> String {
        let element = match &self.selector {
            Some(selector) => match row.select(selector).next() {
                Some(el) => el,
                None => return String::new(),
            },
            None => row,
        };

        let raw = match &self.attr {
            Some(attr) => element.value().attr(attr).unwrap_or_default().to_string(),
            None => element.text().collect::<Vec<_>>().join(" "),
        };

        let value = match &self.pattern {
            Some(pattern) => pattern
                .captures(&raw)
                .and_then(|c| c.get(1).or_else(|| c.get(0)))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            None => raw,
        };

        value.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn optional_value(field: &Option<CompiledField>, row: ElementRef<'_>) -> String {
    field.as_ref().map(|f| f.value(row)).unwrap_or_default()
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(css.to_string(), e.to_string()))
}

/// Extracts candidates from the rows of an HTML document.
#[derive(Debug)]
pub struct TableExtractor<'a> {
    source: &'a SourceDefinition,
    format: &'a TableFormat,
    debug: bool,
}

impl<'a> TableExtractor<'a> {
    pub fn new(source: &'a SourceDefinition, format: &'a TableFormat, debug: bool) -> Self {
        Self {
            source,
            format,
            debug,
        }
    }

    /// Extract every row of `body`.
    ///
    /// Rows without a name or locator are skipped. Private sources get their
    /// session cookies embedded into non-magnet locators; rows of subpage
    /// sources are returned as [`ExtractedRow::Subpage`].
    pub fn extract(
        &self,
        body: &str,
        page_url: &str,
        session: &SessionHeaders,
    ) -> Result<Vec<ExtractedRow>, ExtractError> {
        let row_selector = parse_selector(&self.format.row)?;
        let name = CompiledField::compile(&self.format.name)?;
        let torrent = CompiledField::compile(&self.format.torrent)?;
        let info_hash = CompiledField::compile_opt(self.format.info_hash.as_ref())?;
        let size = CompiledField::compile_opt(self.format.size.as_ref())?;
        let seeds = CompiledField::compile_opt(self.format.seeds.as_ref())?;
        let peers = CompiledField::compile_opt(self.format.peers.as_ref())?;

        let embedded = if self.source.private {
            session.cookie_headers()
        } else {
            Vec::new()
        };

        let document = Html::parse_document(body);
        let mut rows = Vec::new();

        for (index, row) in document.select(&row_selector).enumerate() {
            let candidate_name = name.value(row);
            let link = torrent.value(row);

            if self.debug {
                debug!(
                    source = %self.source.id,
                    index,
                    name = %candidate_name,
                    link = %link,
                    "Matched row"
                );
            }

            if candidate_name.is_empty() || link.is_empty() {
                debug!(source = %self.source.id, index, "Skipping row without name or link");
                continue;
            }

            let link = absolute_url(page_url, &link);
            let uri = if is_magnet(&link) {
                link
            } else {
                append_headers(&link, &embedded)
            };

            let candidate = RawCandidate {
                name: candidate_name,
                info_hash: optional_value(&info_hash, row),
                uri,
                size: optional_value(&size, row),
                seeds: optional_value(&seeds, row),
                peers: optional_value(&peers, row),
            };

            if self.debug {
                debug!(source = %self.source.id, index, ?candidate, "Extracted fields");
            }

            if self.source.subpage && !is_magnet(&candidate.uri) {
                rows.push(ExtractedRow::Subpage(candidate));
            } else {
                rows.push(ExtractedRow::Ready(candidate));
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceFormat;
    use crate::testing::fixtures;

    const PAGE: &str = r#"
<html><body>
<table class="results">
  <tr class="header"><th>Name</th></tr>
  <tr class="row">
    <td><a class="name" href="/details/1">Dune   2021
        1080p</a></td>
    <td><a class="dl" href="magnet:?xt=urn:btih:abc">get</a></td>
    <td class="size">1.46 GB</td><td class="seeds">50</td><td class="peers">3</td>
  </tr>
  <tr class="row">
    <td><a class="name" href="/details/2">Dune 2021 720p</a></td>
    <td><a class="dl" href="/download/2.torrent">get</a></td>
    <td class="size">700 MB</td><td class="seeds">N/A</td><td class="peers"></td>
  </tr>
  <tr class="row">
    <td><a class="name" href="/details/3"></a></td>
    <td><a class="dl" href="/download/3.torrent">get</a></td>
  </tr>
  <tr class="row">
    <td><a class="name" href="/details/4">No link</a></td>
  </tr>
</table>
</body></html>
"#;

    fn session() -> SessionHeaders {
        SessionHeaders {
            cookie: Some("uid=1".to_string()),
            token: None,
            user_agent: "ua".to_string(),
        }
    }

    fn extract(source: &SourceDefinition) -> Vec<ExtractedRow> {
        let SourceFormat::Table(format) = &source.format else {
            panic!("table source expected");
        };
        TableExtractor::new(source, format, true)
            .extract(PAGE, "https://t.example/search?q=dune", &session())
            .unwrap()
    }

    #[test]
    fn test_extracts_rows_and_skips_incomplete() {
        let source = fixtures::table_source("t");
        let rows = extract(&source);
        assert_eq!(rows.len(), 2);

        let first = rows[0].candidate();
        assert_eq!(first.name, "Dune 2021 1080p");
        assert_eq!(first.uri, "magnet:?xt=urn:btih:abc");
        assert_eq!(first.size, "1.46 GB");
        assert_eq!(first.seeds, "50");

        let second = rows[1].candidate();
        assert_eq!(second.uri, "https://t.example/download/2.torrent");
        assert_eq!(second.seeds, "N/A");
        assert_eq!(second.peers, "");
    }

    #[test]
    fn test_private_source_embeds_cookies_except_magnets() {
        let mut source = fixtures::table_source("t");
        source.private = true;
        let rows = extract(&source);

        assert_eq!(rows[0].candidate().uri, "magnet:?xt=urn:btih:abc");
        assert_eq!(
            rows[1].candidate().uri,
            "https://t.example/download/2.torrent|Cookie=uid%3D1&User-Agent=ua"
        );
    }

    #[test]
    fn test_subpage_rows() {
        let mut source = fixtures::table_source("t");
        source.subpage = true;
        let rows = extract(&source);
        assert!(matches!(rows[0], ExtractedRow::Ready(_)));
        assert!(matches!(rows[1], ExtractedRow::Subpage(_)));
    }

    #[test]
    fn test_pattern_capture() {
        let mut source = fixtures::table_source("t");
        if let SourceFormat::Table(format) = &mut source.format {
            format.info_hash = Some(FieldSelector {
                selector: Some("a.dl".to_string()),
                attr: Some("href".to_string()),
                pattern: Some(r"btih:([a-z0-9]+)".to_string()),
            });
        }
        let rows = extract(&source);
        assert_eq!(rows[0].candidate().info_hash, "abc");
        assert_eq!(rows[1].candidate().info_hash, "");
    }

    #[test]
    fn test_invalid_selector_is_error() {
        let mut source = fixtures::table_source("t");
        if let SourceFormat::Table(format) = &mut source.format {
            format.row = "tr[".to_string();
        }
        let SourceFormat::Table(format) = &source.format else {
            unreachable!()
        };
        let result = TableExtractor::new(&source, format, false).extract(
            PAGE,
            "https://t.example/",
            &SessionHeaders::default(),
        );
        assert!(matches!(result, Err(ExtractError::Selector(_, _))));
    }
}
