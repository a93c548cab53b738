//! Trending page extractor
//!
//! Turns the markup of one trending page into an ordered list of
//! [`RankedItem`]s. Extraction is all-or-nothing: the first malformed item
//! aborts the whole page with an error naming the item index and the field
//! that could not be recovered.

use scraper::{ElementRef, Html, Selector};
use std::num::ParseIntError;
use thiserror::Error;
use tracing::{debug, warn};
use trendwatch_common::RankedItem;

const ITEM_BLOCK: &str = "article.Box-row";
const TITLE_LINK: &str = "h1.h3.lh-condensed > a, h2.h3.lh-condensed > a";
const DESCRIPTION: &str = "p";
const LANGUAGE_LABEL: &str = r#"span[itemprop="programmingLanguage"]"#;
const STAR_DELTA: &str = "span.float-sm-right";

/// Label used when an item carries no language
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// The part of an item block an extraction error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ItemBlock,
    TitleLink,
    Description,
    Language,
    Stars,
    Forks,
    StarDelta,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::ItemBlock => "item block",
            Field::TitleLink => "title link",
            Field::Description => "description",
            Field::Language => "language",
            Field::Stars => "stars",
            Field::Forks => "forks",
            Field::StarDelta => "star delta",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reason {
    #[error("element is missing")]
    Missing,

    #[error("expected at most one element, found {0}")]
    TooMany(usize),

    #[error("link path {path:?} has {segments} segments, expected 3")]
    MalformedPath { path: String, segments: usize },

    #[error("could not split {0:?} into a count and a label")]
    MalformedDelta(String),

    #[error("could not parse {text:?} as a count: {error}")]
    InvalidNumber { text: String, error: ParseIntError },

    #[error("invalid selector {0:?}")]
    Selector(String),
}

/// Extraction failure for a whole page, tagged with the offending item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("item {index}: {field}: {reason}")]
pub struct ExtractError {
    pub index: usize,
    pub field: Field,
    pub reason: Reason,
}

/// Knobs for how strict extraction is
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Treat a missing star link as a failure instead of zero stars
    pub require_stars: bool,
}

/// Extract every item block of a trending page, in page order.
pub fn extract_page(html: &str, options: ExtractOptions) -> Result<Vec<RankedItem>, ExtractError> {
    let document = Html::parse_document(html);
    let blocks = selector(ITEM_BLOCK, 0, Field::ItemBlock)?;

    document
        .select(&blocks)
        .enumerate()
        .map(|(index, block)| extract_item(index, block, options))
        .collect()
}

fn extract_item(index: usize, block: ElementRef<'_>, options: ExtractOptions) -> Result<RankedItem, ExtractError> {
    let fail = |field: Field, reason: Reason| ExtractError { index, field, reason };

    // Title link: "/owner/name"
    let title_sel = selector(TITLE_LINK, index, Field::TitleLink)?;
    let link = block
        .select(&title_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .ok_or_else(|| fail(Field::TitleLink, Reason::Missing))?;

    let parts: Vec<&str> = link.split('/').collect();
    if parts.len() != 3 {
        return Err(fail(
            Field::TitleLink,
            Reason::MalformedPath { path: link.to_string(), segments: parts.len() },
        ));
    }
    let (repo_owner, repo_name) = (parts[1], parts[2]);

    // Description, at most one paragraph
    let description = match at_most_one(block, DESCRIPTION, index, Field::Description)? {
        Some(p) => element_text(p),
        None => String::new(),
    };

    let language = match at_most_one(block, LANGUAGE_LABEL, index, Field::Language)? {
        Some(span) => element_text(span),
        None => UNKNOWN_LANGUAGE.to_string(),
    };

    // Counters are looked up by the item's own link target so that a
    // neighbouring item can never be picked up.
    let stars_css = href_selector(&[
        format!("{link}/stargazers"),
        format!("{link}/stargazers.{repo_name}"),
    ]);
    let stars = match at_most_one(block, &stars_css, index, Field::Stars)? {
        Some(a) => parse_count(&element_text(a)).map_err(|reason| fail(Field::Stars, reason))?,
        None if options.require_stars => return Err(fail(Field::Stars, Reason::Missing)),
        None => {
            warn!("Item {} ({}) has no stargazers link, assuming 0 stars", index, link);
            0
        }
    };

    let forks_css = href_selector(&[
        format!("{link}/forks"),
        format!("{link}/network/members"),
        format!("{link}/network/members.{repo_name}"),
    ]);
    let forks = match at_most_one(block, &forks_css, index, Field::Forks)? {
        Some(a) => parse_count(&element_text(a)).map_err(|reason| fail(Field::Forks, reason))?,
        None => 0,
    };

    // "1,234 stars today"
    let stars_increase = match at_most_one(block, STAR_DELTA, index, Field::StarDelta)? {
        Some(span) => {
            let text = strip_commas(&element_text(span));
            let tokens: Vec<&str> = text.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(fail(Field::StarDelta, Reason::MalformedDelta(text)));
            }
            parse_count(tokens[0]).map_err(|reason| fail(Field::StarDelta, reason))?
        }
        None => {
            debug!("Item {} ({}) has no star delta", index, link);
            0
        }
    };

    Ok(RankedItem {
        repo_owner: repo_owner.to_string(),
        repo_name: repo_name.to_string(),
        description,
        language,
        forks,
        stars,
        stars_increase,
    })
}

fn selector(css: &str, index: usize, field: Field) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError {
        index,
        field,
        reason: Reason::Selector(css.to_string()),
    })
}

/// Select within `block`, allowing zero or one match.
fn at_most_one<'a>(
    block: ElementRef<'a>,
    css: &str,
    index: usize,
    field: Field,
) -> Result<Option<ElementRef<'a>>, ExtractError> {
    let sel = selector(css, index, field)?;
    let mut found: Vec<ElementRef<'a>> = block.select(&sel).collect();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => Err(ExtractError { index, field, reason: Reason::TooMany(n) }),
    }
}

/// Build `a[href="..."], a[href="..."]` for a set of exact link targets.
fn href_selector(targets: &[String]) -> String {
    targets
        .iter()
        .map(|t| format!(r#"a[href="{}"]"#, t.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Remove thousands-separator commas so numbers can be parsed.
fn strip_commas(s: &str) -> String {
    s.replace(',', "")
}

fn parse_count(text: &str) -> Result<u64, Reason> {
    let cleaned = strip_commas(text.trim());
    cleaned.parse::<u64>().map_err(|error| Reason::InvalidNumber { text: cleaned, error })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Block<'a> {
        link: &'a str,
        description: Option<&'a str>,
        language: Option<&'a str>,
        stars: Option<&'a str>,
        forks: Option<&'a str>,
        delta: Option<&'a str>,
    }

    impl<'a> Block<'a> {
        fn new(link: &'a str) -> Self {
            Self {
                link,
                description: Some("A description"),
                language: Some("Rust"),
                stars: Some("1,234"),
                forks: Some("56"),
                delta: Some("78 stars today"),
            }
        }

        fn html(&self) -> String {
            let name = self.link.rsplit('/').next().unwrap();
            let mut out = format!(
                r#"<article class="Box-row"><h1 class="h3 lh-condensed"><a href="{}">{}</a></h1>"#,
                self.link, self.link
            );
            if let Some(d) = self.description {
                out.push_str(&format!(r#"<p class="col-9 text-gray my-1 pr-4">  {d}  </p>"#));
            }
            out.push_str(r#"<div class="f6 text-gray mt-2">"#);
            if let Some(l) = self.language {
                out.push_str(&format!(r#"<span itemprop="programmingLanguage">{l}</span>"#));
            }
            if let Some(s) = self.stars {
                out.push_str(&format!(
                    r#"<a class="muted-link" href="{}/stargazers.{}"><svg></svg> {s} </a>"#,
                    self.link, name
                ));
            }
            if let Some(f) = self.forks {
                out.push_str(&format!(
                    r#"<a class="muted-link" href="{}/network/members.{}"><svg></svg> {f} </a>"#,
                    self.link, name
                ));
            }
            if let Some(d) = self.delta {
                out.push_str(&format!(r#"<span class="d-inline-block float-sm-right"><svg></svg> {d} </span>"#));
            }
            out.push_str("</div></article>");
            out
        }
    }

    fn page(blocks: &[Block<'_>]) -> String {
        let body: String = blocks.iter().map(Block::html).collect();
        format!("<html><head><title>Trending</title></head><body><div class=\"Box\">{body}</div></body></html>")
    }

    fn extract(html: &str) -> Result<Vec<RankedItem>, ExtractError> {
        extract_page(html, ExtractOptions::default())
    }

    #[test]
    fn test_extract_full_items_in_order() {
        let html = page(&[Block::new("/rust-lang/rust"), Block::new("/tokio-rs/tokio")]);
        let items = extract(&html).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].repo_owner, "rust-lang");
        assert_eq!(items[0].repo_name, "rust");
        assert_eq!(items[0].description, "A description");
        assert_eq!(items[0].language, "Rust");
        assert_eq!(items[0].stars, 1234);
        assert_eq!(items[0].forks, 56);
        assert_eq!(items[0].stars_increase, 78);
        assert_eq!(items[1].full_name(), "tokio-rs/tokio");
    }

    #[test]
    fn test_extract_is_deterministic() {
        let html = page(&[Block::new("/a/b"), Block::new("/c/d"), Block::new("/e/f")]);
        assert_eq!(extract(&html).unwrap(), extract(&html).unwrap());
    }

    #[test]
    fn test_empty_page_yields_no_items() {
        let items = extract("<html><body><p>Nothing trending</p></body></html>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_two_segment_link_fails_at_index_zero() {
        let html = page(&[Block::new("/justowner"), Block::new("/a/b")]);
        let err = extract(&html).unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.field, Field::TitleLink);
        assert_eq!(
            err.reason,
            Reason::MalformedPath { path: "/justowner".to_string(), segments: 2 }
        );
    }

    #[test]
    fn test_failure_names_later_index() {
        let html = page(&[Block::new("/a/b"), Block::new("/c/d/e")]);
        let err = extract(&html).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.to_string().starts_with("item 1: title link"));
    }

    #[test]
    fn test_missing_title_link() {
        let html = r#"<html><body><article class="Box-row"><p>orphan</p></article></body></html>"#;
        let err = extract(html).unwrap_err();
        assert_eq!((err.index, err.field, err.reason), (0, Field::TitleLink, Reason::Missing));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let mut block = Block::new("/a/b");
        block.description = None;
        block.language = None;
        block.stars = None;
        block.forks = None;
        block.delta = None;
        let items = extract(&page(&[block])).unwrap();

        assert_eq!(items[0].description, "");
        assert_eq!(items[0].language, UNKNOWN_LANGUAGE);
        assert_eq!(items[0].stars, 0);
        assert_eq!(items[0].forks, 0);
        assert_eq!(items[0].stars_increase, 0);
    }

    #[test]
    fn test_require_stars_rejects_missing_star_link() {
        let mut block = Block::new("/a/b");
        block.stars = None;
        let err = extract_page(&page(&[block]), ExtractOptions { require_stars: true }).unwrap_err();
        assert_eq!((err.field, err.reason), (Field::Stars, Reason::Missing));
    }

    #[test]
    fn test_two_descriptions_fail() {
        let mut block = Block::new("/a/b");
        block.description = Some("one</p><p>two");
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.field, err.reason), (Field::Description, Reason::TooMany(2)));
    }

    #[test]
    fn test_two_language_labels_fail() {
        let mut block = Block::new("/a/b");
        block.language = Some(r#"Rust</span><span itemprop="programmingLanguage">C"#);
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.field, err.reason), (Field::Language, Reason::TooMany(2)));
    }

    #[test]
    fn test_unparsable_star_count() {
        let mut block = Block::new("/a/b");
        block.stars = Some("1.2k");
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!(err.field, Field::Stars);
        assert!(matches!(err.reason, Reason::InvalidNumber { ref text, .. } if text == "1.2k"));
    }

    #[test]
    fn test_two_star_links_fail() {
        let mut block = Block::new("/a/b");
        block.stars = Some(r#"1 </a><a href="/a/b/stargazers"> 2"#);
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.index, err.field, err.reason), (0, Field::Stars, Reason::TooMany(2)));
    }

    #[test]
    fn test_two_fork_links_fail() {
        let mut block = Block::new("/a/b");
        block.forks = Some(r#"1 </a><a href="/a/b/forks"> 2"#);
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.index, err.field, err.reason), (0, Field::Forks, Reason::TooMany(2)));
    }

    #[test]
    fn test_two_star_deltas_fail() {
        let mut block = Block::new("/a/b");
        block.delta = Some(r#"1 star today </span><span class="float-sm-right"> 2 stars today"#);
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.index, err.field, err.reason), (0, Field::StarDelta, Reason::TooMany(2)));
    }

    #[test]
    fn test_unparsable_fork_count() {
        let mut block = Block::new("/a/b");
        block.forks = Some("n/a");
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!(err.field, Field::Forks);
        assert!(matches!(err.reason, Reason::InvalidNumber { ref text, .. } if text == "n/a"));
    }

    #[test]
    fn test_unparsable_star_delta() {
        let mut block = Block::new("/a/b");
        block.delta = Some("many stars today");
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!(err.field, Field::StarDelta);
        assert!(matches!(err.reason, Reason::InvalidNumber { ref text, .. } if text == "many"));
    }

    #[test]
    fn test_star_delta_needs_two_tokens() {
        let mut block = Block::new("/a/b");
        block.delta = Some("78");
        let err = extract(&page(&[block])).unwrap_err();
        assert_eq!((err.field, err.reason), (Field::StarDelta, Reason::MalformedDelta("78".to_string())));
    }

    #[test]
    fn test_star_delta_strips_separators() {
        let mut block = Block::new("/a/b");
        block.delta = Some("12,345 stars this week");
        let items = extract(&page(&[block])).unwrap();
        assert_eq!(items[0].stars_increase, 12345);
    }

    #[test]
    fn test_fork_count_is_scoped_to_own_link() {
        // The second item links to the first item's forks; it must not count.
        let first = Block::new("/a/b");
        let mut second = Block::new("/c/d");
        second.forks = None;
        second.delta = Some(r#"3 stars today</span><a href="/a/b/network/members.b">999</a><span>"#);
        let items = extract(&page(&[first, second])).unwrap();
        assert_eq!(items[0].forks, 56);
        assert_eq!(items[1].forks, 0);
    }

    #[test]
    fn test_current_link_layout_is_accepted() {
        let html = r#"<html><body><article class="Box-row">
            <h2 class="h3 lh-condensed"><a href="/owner/repo"> owner / repo </a></h2>
            <a href="/owner/repo/stargazers"> 2,000 </a>
            <a href="/owner/repo/forks"> 30 </a>
            <span class="d-inline-block float-sm-right"> 40 stars today </span>
        </article></body></html>"#;
        let items = extract(html).unwrap();
        assert_eq!(items[0].stars, 2000);
        assert_eq!(items[0].forks, 30);
        assert_eq!(items[0].stars_increase, 40);
        assert_eq!(items[0].language, UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_href_selector_escapes_quotes() {
        let css = href_selector(&[r#"/a/"b"#.to_string()]);
        assert_eq!(css, r#"a[href="/a/\"b"]"#);
        assert!(Selector::parse(&css).is_ok());
    }
}
