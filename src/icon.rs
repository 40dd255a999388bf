//! Vector icons rendered into an element.

use crate::document::Element;

/// A named vector glyph.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Glyph {
    /// A magnifying glass, shown while no search is running.
    StartSearch,
    /// A cross, shown while a search can be cancelled.
    CancelSearch,
}

impl Glyph {
    /// Returns the SVG path data of this glyph, drawn in a 32x32 box.
    #[must_use]
    pub fn path_data(self) -> &'static str {
        match self {
            Glyph::StartSearch => include_str!("../assets/start-search.path").trim(),
            Glyph::CancelSearch => include_str!("../assets/cancel-search.path").trim(),
        }
    }

    /// Returns the glyph shown for the given search state.
    #[must_use]
    pub const fn for_search(in_progress: bool) -> Self {
        if in_progress {
            Glyph::CancelSearch
        } else {
            Glyph::StartSearch
        }
    }
}

/// An SVG path drawn inside of a container element.
///
/// The renderer appends an `svg` element with a single `path` child to the
/// container and rewrites the path's data when [`SvgPath::set_path`] is
/// called.
#[derive(Debug, Clone)]
pub struct SvgPath {
    svg: Element,
    path: Element,
}

impl SvgPath {
    /// Appends an icon of `width` by `height` units drawing `path_data` to
    /// `container`.
    pub fn new(container: &Element, width: u32, height: u32, path_data: &str) -> crate::Result<Self> {
        let document = container.document();
        let svg = document.create_element("svg");
        svg.set_attribute("width", width.to_string());
        svg.set_attribute("height", height.to_string());
        svg.set_attribute("viewBox", format!("0 0 {width} {height}"));

        let path = document.create_element("path");
        path.set_attribute("d", path_data);
        svg.append_child(&path)?;
        container.append_child(&svg)?;

        Ok(Self { svg, path })
    }

    /// Returns the path data currently drawn.
    #[must_use]
    pub fn path(&self) -> String {
        self.path.attribute("d").unwrap_or_default()
    }

    /// Replaces the path data drawn.
    pub fn set_path(&self, path_data: &str) {
        self.path.set_attribute("d", path_data);
    }

    /// Returns the glyph currently drawn, if the path is one of the known
    /// glyphs.
    #[must_use]
    pub fn glyph(&self) -> Option<Glyph> {
        let path = self.path();
        [Glyph::StartSearch, Glyph::CancelSearch]
            .into_iter()
            .find(|glyph| glyph.path_data() == path)
    }

    /// Returns the `svg` element this icon is rendered into.
    #[must_use]
    pub const fn element(&self) -> &Element {
        &self.svg
    }
}

#[test]
fn renders_into_container() {
    let document = crate::document::Document::new();
    let button = document.create_element("span");
    let icon = SvgPath::new(&button, 32, 32, Glyph::StartSearch.path_data()).unwrap();

    assert_eq!(button.children(), [icon.element().clone()]);
    assert_eq!(icon.element().attribute("viewBox").as_deref(), Some("0 0 32 32"));
    assert_eq!(icon.glyph(), Some(Glyph::StartSearch));

    icon.set_path(Glyph::CancelSearch.path_data());
    assert_eq!(icon.glyph(), Some(Glyph::CancelSearch));
    icon.set_path("M0,0z");
    assert_eq!(icon.glyph(), None);
}

#[test]
fn glyph_assets_are_distinct() {
    assert!(Glyph::StartSearch.path_data().starts_with('M'));
    assert!(Glyph::CancelSearch.path_data().ends_with('z'));
    assert_ne!(Glyph::StartSearch.path_data(), Glyph::CancelSearch.path_data());
    assert_eq!(Glyph::for_search(true), Glyph::CancelSearch);
}
