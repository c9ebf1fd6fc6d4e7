//! Backend-agnostic DOM used by the scraping engine.
//!
//! Every document is a parsed `scraper::Html` tree plus the address it was
//! loaded from. Static pages are parsed straight from the HTTP body; pages
//! rendered by an automated browser are materialized from the HTML the
//! session serialized, so their lifetime never depends on the live browser.

pub mod xpath;

use reqwest::Url;
use scraper::{ElementRef, Html};

use crate::error::{Result, ScrapeError};
use xpath::XPath;

/// Selector strings carrying this prefix are XPath expressions.
pub const XPATH_PREFIX: &str = "xpath:";

/// A selector string tagged as CSS or XPath.
#[derive(Debug, Clone)]
pub enum Selector {
    Css(scraper::Selector),
    XPath(XPath),
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self> {
        match xpath_expression(raw) {
            Some(expr) => XPath::parse(expr)
                .map(Selector::XPath)
                .map_err(|reason| ScrapeError::Selector {
                    selector: raw.to_string(),
                    reason,
                }),
            None => scraper::Selector::parse(raw.trim())
                .map(Selector::Css)
                .map_err(|err| ScrapeError::Selector {
                    selector: raw.to_string(),
                    reason: err.to_string(),
                }),
        }
    }

    pub fn is_xpath(&self) -> bool {
        matches!(self, Selector::XPath(_))
    }
}

/// Returns the XPath expression when `raw` is tagged as XPath: an explicit
/// `xpath:` prefix, or a leading `/`, `.`, `(` which no CSS selector can start with.
pub fn xpath_expression(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix(XPATH_PREFIX) {
        return Some(rest.trim());
    }
    let looks_like_path = trimmed.starts_with('/')
        || trimmed.starts_with("./")
        || trimmed.starts_with("..")
        || trimmed == "."
        || trimmed.starts_with('(');
    looks_like_path.then_some(trimmed)
}

pub struct Document {
    html: Html,
    url: Option<Url>,
    base: Option<Url>,
}

impl Document {
    pub fn parse(html: &str, url: Option<&str>) -> Self {
        let html = Html::parse_document(html);
        let url = url.and_then(|u| Url::parse(u).ok());
        let base = declared_base(&html, url.as_ref()).or_else(|| url.clone());
        Self { html, url, base }
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Address relative links resolve against (`<base href>` wins over the URL).
    pub fn base_url(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    pub fn root(&self) -> Element<'_> {
        Element {
            inner: self.html.root_element(),
            document: self,
        }
    }

    pub fn query_selector_all(&self, selector: &Selector) -> Vec<Element<'_>> {
        match selector {
            Selector::Css(css) => self
                .html
                .select(css)
                .map(|inner| Element {
                    inner,
                    document: self,
                })
                .collect(),
            Selector::XPath(_) => self.root().select_xpath_or_css(selector, true),
        }
    }

    pub fn query_selector(&self, selector: &Selector) -> Option<Element<'_>> {
        self.query_selector_all(selector).into_iter().next()
    }

    pub fn resolve_url(&self, href: &str) -> Option<String> {
        resolve_against(self.base.as_ref(), href)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

fn declared_base(html: &Html, url: Option<&Url>) -> Option<Url> {
    let selector = scraper::Selector::parse("base[href]").ok()?;
    let href = html.select(&selector).next()?.value().attr("href")?;
    match url {
        Some(url) => url.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

fn resolve_against(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}

/// A child of an element: either a nested element or a text run.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Element(Element<'a>),
    Text(&'a str),
}

#[derive(Clone, Copy)]
pub struct Element<'a> {
    inner: ElementRef<'a>,
    document: &'a Document,
}

impl<'a> Element<'a> {
    pub fn name(&self) -> &'a str {
        self.inner.value().name()
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.inner.value().attr(name)
    }

    /// Concatenation of every descendant text node.
    pub fn text_content(&self) -> String {
        self.inner.text().collect()
    }

    /// Text of the direct text children only.
    pub fn own_text(&self) -> String {
        self.children()
            .filter_map(|child| match child {
                Node::Text(text) => Some(text),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let document = self.document;
        self.inner.children().filter_map(move |child| {
            if let Some(inner) = ElementRef::wrap(child) {
                return Some(Node::Element(Element { inner, document }));
            }
            child.value().as_text().map(|text| Node::Text(&**text))
        })
    }

    pub fn query_selector_all(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.select_xpath_or_css(selector, false)
    }

    pub fn query_selector(&self, selector: &Selector) -> Option<Element<'a>> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn select_xpath_or_css(&self, selector: &Selector, include_self: bool) -> Vec<Element<'a>> {
        let document = self.document;
        let wrap = move |inner| Element { inner, document };
        match selector {
            Selector::Css(css) if include_self && css.matches(&self.inner) => {
                std::iter::once(self.inner)
                    .chain(self.inner.select(css))
                    .map(wrap)
                    .collect()
            }
            Selector::Css(css) => self.inner.select(css).map(wrap).collect(),
            Selector::XPath(expr) => expr.select(self.inner).into_iter().map(wrap).collect(),
        }
    }

    /// Nearest ancestor-or-self matching `selector`.
    pub fn closest(&self, selector: &Selector) -> Option<Element<'a>> {
        let document = self.document;
        let mut candidates = std::iter::once(self.inner)
            .chain(self.inner.ancestors().filter_map(ElementRef::wrap));
        match selector {
            Selector::Css(css) => candidates
                .find(|candidate| css.matches(candidate))
                .map(|inner| Element { inner, document }),
            Selector::XPath(expr) => {
                let matches = expr.select(document.html.root_element());
                candidates
                    .find(|candidate| matches.iter().any(|m| m.id() == candidate.id()))
                    .map(|inner| Element { inner, document })
            }
        }
    }

    /// Resolves a possibly relative link against the owning document.
    pub fn resolve_url(&self, href: &str) -> Option<String> {
        self.document.resolve_url(href)
    }

    pub fn outer_html(&self) -> String {
        self.inner.html()
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
