//! RDFa region lookup over rendered markup.
//!
//! Rendered previews annotate editable regions with RDFa-style attributes:
//! elements carry a `property` attribute naming the field they render;
//! repeated blocks live inside a container marked `typeof="collection"`
//! whose items carry a `rel` attribute repeating the container's name.
//! Given a rendered HTML block and a property path such as `title` or
//! `block[1].title[0]`, the extractor returns the matching elements'
//! attributes and inner HTML, letting a caller correlate a clicked region
//! back to a semantic field name.
//!
//! This is a read-only query facility; nothing is mutated or cached. The
//! markup pass injects positional comment markers with `lol_html` and then
//! slices the annotated regions out of the rewritten string.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;

const MARKER_PREFIX: &str = "<!--scorcio-rdfa:";
const MARKER_SUFFIX: &str = "-->";
const COLLECTION_TYPE: &str = "collection";

#[derive(Debug, Error)]
pub enum RdfaError {
    #[error("invalid property path `{path}`: {message}")]
    InvalidPath { path: String, message: String },
    #[error("markup could not be scanned: {0}")]
    Markup(String),
}

impl RdfaError {
    fn invalid_path(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// One annotated element matched by a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdfaMatch {
    /// All attributes of the matched element, in name order.
    pub attributes: BTreeMap<String, String>,
    /// Inner HTML of the matched element. Empty for void elements.
    pub html: String,
}

struct RdfaNode {
    property: Option<String>,
    rel: Option<String>,
    is_collection: bool,
    attributes: BTreeMap<String, String>,
    inner_html: String,
    parent: Option<usize>,
}

impl RdfaNode {
    /// Collections and their items bound a scope: properties inside them
    /// belong to the repeated block, not to the surrounding document.
    fn is_scope_boundary(&self) -> bool {
        self.is_collection || self.rel.is_some()
    }
}

struct PathSegment {
    name: String,
    index: Option<usize>,
}

/// Indexed view over the annotated regions of one rendered HTML block.
pub struct RdfaExtractor {
    nodes: Vec<RdfaNode>,
}

impl RdfaExtractor {
    /// Scan `html` and index every element carrying a `property`, `rel` or
    /// `typeof="collection"` annotation.
    pub fn new(html: &str) -> Result<Self, RdfaError> {
        let nodes = scan_annotated_nodes(html)?;
        Ok(Self { nodes })
    }

    /// Resolve one property path. `None` means no annotated region matched.
    ///
    /// Path grammar: dot-separated segments, each `name` or `name[index]`.
    /// Every non-final segment addresses a collection by property name and
    /// one of its repeated items by index (default 0); the final segment
    /// matches property elements directly inside the addressed scope. A
    /// top-level lookup excludes elements nested inside any collection or
    /// collection item, so asking for an outer list's own properties never
    /// matches its repeated sub-item templates.
    pub fn find(&self, path: &str) -> Result<Option<Vec<RdfaMatch>>, RdfaError> {
        let segments = parse_path(path)?;
        let (containers, last) = segments.split_at(segments.len() - 1);

        let mut scope: Option<usize> = None;
        for segment in containers {
            scope = match self.descend(scope, segment) {
                Some(scope) => Some(scope),
                None => return Ok(None),
            };
        }

        let segment = &last[0];
        let mut matched = self.select(scope, |node| {
            !node.is_collection && node.property.as_deref() == Some(segment.name.as_str())
        });
        if let Some(index) = segment.index {
            matched = match matched.get(index) {
                Some(&node) => vec![node],
                None => Vec::new(),
            };
        }

        if matched.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            matched
                .into_iter()
                .map(|node| RdfaMatch {
                    attributes: self.nodes[node].attributes.clone(),
                    html: self.nodes[node].inner_html.clone(),
                })
                .collect(),
        ))
    }

    /// Resolve several property paths at once, keyed by the requested path.
    pub fn extract(
        &self,
        paths: &[&str],
    ) -> Result<BTreeMap<String, Option<Vec<RdfaMatch>>>, RdfaError> {
        let mut results = BTreeMap::new();
        for &path in paths {
            results.insert(path.to_string(), self.find(path)?);
        }
        Ok(results)
    }

    /// Resolve a container segment to the scope node the next segment
    /// operates in: the collection's indexed `rel` item when the markup has
    /// item wrappers, otherwise the collection element itself.
    fn descend(&self, scope: Option<usize>, segment: &PathSegment) -> Option<usize> {
        let containers = self.select(scope, |node| {
            node.is_collection && node.property.as_deref() == Some(segment.name.as_str())
        });
        let container = *containers.first()?;

        let items = self.select(Some(container), |node| {
            node.rel.as_deref() == Some(segment.name.as_str())
        });
        if items.is_empty() {
            // No item wrappers; the index can only address the first block.
            return match segment.index.unwrap_or(0) {
                0 => Some(container),
                _ => None,
            };
        }
        items.get(segment.index.unwrap_or(0)).copied()
    }

    /// Nodes satisfying `matches` whose nearest scope boundary is `scope`,
    /// in document order. Collection containers never cross their own
    /// boundary when queried against the surrounding scope.
    fn select(&self, scope: Option<usize>, matches: impl Fn(&RdfaNode) -> bool) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(index, node)| matches(node) && self.scope_of(*index) == scope)
            .map(|(index, _)| index)
            .collect()
    }

    /// Nearest ancestor that bounds a scope (collection or item), if any.
    fn scope_of(&self, index: usize) -> Option<usize> {
        let mut current = self.nodes[index].parent;
        while let Some(ancestor) = current {
            if self.nodes[ancestor].is_scope_boundary() {
                return Some(ancestor);
            }
            current = self.nodes[ancestor].parent;
        }
        None
    }
}

fn parse_path(path: &str) -> Result<Vec<PathSegment>, RdfaError> {
    if path.is_empty() {
        return Err(RdfaError::invalid_path(path, "path is empty"));
    }

    path.split('.')
        .map(|segment| parse_segment(path, segment))
        .collect()
}

fn parse_segment(path: &str, segment: &str) -> Result<PathSegment, RdfaError> {
    let (name, index) = match segment.find('[') {
        Some(open) => {
            let close = segment
                .rfind(']')
                .filter(|&close| close == segment.len() - 1 && close > open)
                .ok_or_else(|| {
                    RdfaError::invalid_path(path, format!("malformed index in `{segment}`"))
                })?;
            let index = segment[open + 1..close].parse::<usize>().map_err(|_| {
                RdfaError::invalid_path(path, format!("non-numeric index in `{segment}`"))
            })?;
            (&segment[..open], Some(index))
        }
        None => (segment, None),
    };

    if name.is_empty() {
        return Err(RdfaError::invalid_path(
            path,
            format!("empty segment name in `{segment}`"),
        ));
    }

    Ok(PathSegment {
        name: name.to_string(),
        index,
    })
}

struct ScannedElement {
    property: Option<String>,
    rel: Option<String>,
    is_collection: bool,
    attributes: BTreeMap<String, String>,
}

/// Inject positional markers around every annotated element, then slice the
/// rewritten string back apart to recover nesting and inner HTML.
fn scan_annotated_nodes(html: &str) -> Result<Vec<RdfaNode>, RdfaError> {
    let scanned: Rc<RefCell<Vec<ScannedElement>>> = Rc::new(RefCell::new(Vec::new()));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", {
                let scanned = Rc::clone(&scanned);
                move |el| {
                    let property = el.get_attribute("property");
                    let rel = el.get_attribute("rel");
                    let is_collection = el
                        .get_attribute("typeof")
                        .is_some_and(|kind| kind == COLLECTION_TYPE);
                    if property.is_none() && rel.is_none() && !is_collection {
                        return Ok(());
                    }

                    let mut attributes = BTreeMap::new();
                    for attribute in el.attributes() {
                        attributes.insert(attribute.name(), attribute.value());
                    }

                    let index = {
                        let mut scanned = scanned.borrow_mut();
                        scanned.push(ScannedElement {
                            property,
                            rel,
                            is_collection,
                            attributes,
                        });
                        scanned.len() - 1
                    };

                    // Markers flank the whole element so void elements are
                    // covered too; the start tag is trimmed off afterwards.
                    el.before(&open_marker(index), ContentType::Html);
                    el.after(&close_marker(index), ContentType::Html);
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RdfaError::Markup(err.to_string()))?;

    let scanned = Rc::try_unwrap(scanned)
        .map(|cell| cell.into_inner())
        .unwrap_or_else(|rc| std::mem::take(&mut rc.borrow_mut()));

    assemble_nodes(&rewritten, scanned)
}

fn open_marker(index: usize) -> String {
    format!("{MARKER_PREFIX}o:{index}{MARKER_SUFFIX}")
}

fn close_marker(index: usize) -> String {
    format!("{MARKER_PREFIX}c:{index}{MARKER_SUFFIX}")
}

fn assemble_nodes(
    rewritten: &str,
    scanned: Vec<ScannedElement>,
) -> Result<Vec<RdfaNode>, RdfaError> {
    let spans = collect_spans(rewritten, scanned.len())?;

    let mut nodes = Vec::with_capacity(scanned.len());
    for (index, element) in scanned.into_iter().enumerate() {
        let (start, end) = spans[index];
        let outer = strip_markers(&rewritten[start..end]);
        nodes.push(RdfaNode {
            property: element.property,
            rel: element.rel,
            is_collection: element.is_collection,
            attributes: element.attributes,
            inner_html: inner_of(&outer).to_string(),
            parent: enclosing_span(&spans, index),
        });
    }
    Ok(nodes)
}

/// Locate every injected marker and return per-node `(start, end)` byte
/// spans of the flanked element in the rewritten string.
fn collect_spans(rewritten: &str, count: usize) -> Result<Vec<(usize, usize)>, RdfaError> {
    let mut opens = vec![None; count];
    let mut closes = vec![None; count];

    let mut cursor = 0;
    while let Some(found) = rewritten[cursor..].find(MARKER_PREFIX) {
        let start = cursor + found;
        let body_start = start + MARKER_PREFIX.len();
        let body_end = rewritten[body_start..]
            .find(MARKER_SUFFIX)
            .map(|offset| body_start + offset)
            .ok_or_else(|| RdfaError::Markup("unterminated scan marker".to_string()))?;

        let body = &rewritten[body_start..body_end];
        let (kind, index) = body
            .split_once(':')
            .and_then(|(kind, index)| Some((kind, index.parse::<usize>().ok()?)))
            .ok_or_else(|| RdfaError::Markup(format!("malformed scan marker `{body}`")))?;

        let marker_end = body_end + MARKER_SUFFIX.len();
        // The input may legitimately contain marker-shaped comments of its
        // own; they surface here as out-of-range or duplicate indices.
        let (slot, position) = match kind {
            "o" => (opens.get_mut(index), marker_end),
            "c" => (closes.get_mut(index), start),
            _ => return Err(RdfaError::Markup(format!("unknown scan marker `{body}`"))),
        };
        let slot = slot.ok_or_else(|| {
            RdfaError::Markup(format!("stray scan marker `{body}` in markup"))
        })?;
        if slot.replace(position).is_some() {
            return Err(RdfaError::Markup(format!(
                "duplicate scan marker `{body}` in markup"
            )));
        }
        cursor = marker_end;
    }

    opens
        .into_iter()
        .zip(closes)
        .map(|(open, close)| match (open, close) {
            (Some(open), Some(close)) if open <= close => Ok((open, close)),
            _ => Err(RdfaError::Markup(
                "scan marker pair missing from rewritten markup".to_string(),
            )),
        })
        .collect()
}

/// Index of the tightest span strictly containing span `index`, if any.
fn enclosing_span(spans: &[(usize, usize)], index: usize) -> Option<usize> {
    let (start, end) = spans[index];
    spans
        .iter()
        .enumerate()
        .filter(|&(other, &(other_start, other_end))| {
            other != index && other_start < start && end <= other_end
        })
        .min_by_key(|&(_, &(other_start, other_end))| other_end - other_start)
        .map(|(other, _)| other)
}

/// Remove every injected marker comment from a slice.
fn strip_markers(slice: &str) -> String {
    let mut cleaned = String::with_capacity(slice.len());
    let mut cursor = 0;
    while let Some(found) = slice[cursor..].find(MARKER_PREFIX) {
        let start = cursor + found;
        cleaned.push_str(&slice[cursor..start]);
        match slice[start..].find(MARKER_SUFFIX) {
            Some(offset) => cursor = start + offset + MARKER_SUFFIX.len(),
            None => {
                cursor = start;
                break;
            }
        }
    }
    cleaned.push_str(&slice[cursor..]);
    cleaned
}

/// Inner HTML of an outer-element slice: everything between the end of the
/// start tag and the start of the closing tag. Void elements yield "".
fn inner_of(outer: &str) -> &str {
    let Some(tag_end) = start_tag_end(outer) else {
        return "";
    };
    let rest = &outer[tag_end..];
    match rest.rfind("</") {
        Some(close) => &rest[..close],
        None => "",
    }
}

/// Byte offset just past the start tag's `>`, skipping quoted attribute
/// values.
fn start_tag_end(outer: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, ch) in outer.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '>') => return Some(offset + 1),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_PAGE: &str = concat!(
        r#"<div id="content" property="article">"#,
        r#"<h1 property="title">Page <em>Title</em></h1>"#,
        r#"<div property="block" typeof="collection">"#,
        r#"<div rel="block"><h2 property="title">First block</h2></div>"#,
        r#"<div rel="block"><h2 property="title">Second block</h2></div>"#,
        "</div>",
        "</div>",
    );

    #[test]
    fn top_level_property_returns_attributes_and_inner_html() {
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");
        let matches = extractor.find("title").expect("find").expect("matched");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].html, "Page <em>Title</em>");
        assert_eq!(matches[0].attributes.get("property").unwrap(), "title");
    }

    #[test]
    fn top_level_lookup_excludes_collection_nested_elements() {
        // The block titles inside the collection items must not leak into
        // the outer `title` lookup.
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");
        let matches = extractor.find("title").expect("find").expect("matched");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].html.contains("Page"));
    }

    #[test]
    fn dotted_path_addresses_collection_items_by_index() {
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");

        let first = extractor.find("block.title").expect("find").expect("matched");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].html, "First block");

        let second = extractor
            .find("block[1].title[0]")
            .expect("find")
            .expect("matched");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].html, "Second block");
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");
        assert!(extractor.find("block[3].title").expect("find").is_none());
        assert!(extractor.find("block.title[9]").expect("find").is_none());
    }

    #[test]
    fn unknown_property_is_not_found() {
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");
        assert!(extractor.find("missing").expect("find").is_none());
    }

    #[test]
    fn void_elements_match_with_empty_inner_html() {
        let html = r#"<div><img property="image" src="/a.png" alt="A"></div>"#;
        let extractor = RdfaExtractor::new(html).expect("scan");
        let matches = extractor.find("image").expect("find").expect("matched");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].html, "");
        assert_eq!(matches[0].attributes.get("src").unwrap(), "/a.png");
        assert_eq!(matches[0].attributes.get("alt").unwrap(), "A");
    }

    #[test]
    fn collections_without_item_wrappers_scope_to_the_container() {
        let html = concat!(
            r#"<div property="outer" typeof="collection">"#,
            r#"<div property="inner" typeof="collection">"#,
            r#"<span property="label">deep</span>"#,
            "</div>",
            r#"<span property="label">shallow</span>"#,
            "</div>",
        );
        let extractor = RdfaExtractor::new(html).expect("scan");

        let shallow = extractor
            .find("outer.label")
            .expect("find")
            .expect("matched");
        assert_eq!(shallow.len(), 1);
        assert_eq!(shallow[0].html, "shallow");

        let deep = extractor
            .find("outer.inner.label")
            .expect("find")
            .expect("matched");
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].html, "deep");
    }

    #[test]
    fn extract_keys_results_by_path() {
        let extractor = RdfaExtractor::new(BLOCK_PAGE).expect("scan");
        let results = extractor
            .extract(&["title", "missing", "block[1].title"])
            .expect("extract");

        assert!(results["title"].is_some());
        assert!(results["missing"].is_none());
        assert_eq!(
            results["block[1].title"].as_ref().unwrap()[0].html,
            "Second block"
        );
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let extractor = RdfaExtractor::new("<div></div>").expect("scan");
        assert!(extractor.find("").is_err());
        assert!(extractor.find("block[").is_err());
        assert!(extractor.find("block[x]").is_err());
        assert!(extractor.find("block..title").is_err());
    }

    #[test]
    fn marker_shaped_comments_in_the_input_are_rejected() {
        // Out-of-range index: nothing in the scan injected slot 9.
        let stray = r#"<div property="title"><!--scorcio-rdfa:o:9-->Hello</div>"#;
        assert!(matches!(
            RdfaExtractor::new(stray),
            Err(RdfaError::Markup(_))
        ));

        // In-range index: collides with the marker injected for slot 0.
        let colliding = r#"<!--scorcio-rdfa:o:0--><div property="title">Hello</div>"#;
        assert!(matches!(
            RdfaExtractor::new(colliding),
            Err(RdfaError::Markup(_))
        ));
    }

    #[test]
    fn quoted_angle_brackets_do_not_break_slicing() {
        let html = r#"<h1 property="title" data-note="a > b">Heading</h1>"#;
        let extractor = RdfaExtractor::new(html).expect("scan");
        let matches = extractor.find("title").expect("find").expect("matched");
        assert_eq!(matches[0].html, "Heading");
        assert_eq!(matches[0].attributes.get("data-note").unwrap(), "a > b");
    }
}
