//! A search box that flies the camera to the places it finds.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use crate::binding::Bindings;
use crate::document::{Document, Element, Event, EventKind, ListenerHandle, Phase};
use crate::icon::{Glyph, SvgPath};
use crate::scene::{Ellipsoid, Scene};
use crate::service::GeocodingService;
use crate::value::CallbackHandle;
use crate::viewmodel::GeocoderViewModel;
use crate::Error;

/// The placeholder shown in an empty search box.
pub const PLACEHOLDER: &str = "Enter an address or landmark...";
/// The class of the search box.
pub const INPUT_CLASS: &str = "cesium-geocoder-input";
/// The class added to the search box while it contains text.
pub const INPUT_WIDE_CLASS: &str = "cesium-geocoder-input-wide";
/// The class of the search/cancel button.
pub const GO_BUTTON_CLASS: &str = "cesium-geocoder-goButton";

const ICON_SIZE: u32 = 32;

/// An element, or the id of an element, to mount a widget in.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ContainerRef {
    /// An element.
    Element(Element),
    /// The id of an element attached to the document.
    Id(String),
}

impl ContainerRef {
    /// Resolves this reference to an element of `document`.
    pub fn resolve(&self, document: &Document) -> crate::Result<Element> {
        match self {
            ContainerRef::Element(element) if element.document().ptr_eq(document) => {
                Ok(element.clone())
            }
            ContainerRef::Element(_) => Err(Error::ForeignElement),
            ContainerRef::Id(id) => document
                .element_by_id(id)
                .ok_or_else(|| Error::ElementNotFound(id.clone())),
        }
    }
}

impl From<Element> for ContainerRef {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&Element> for ContainerRef {
    fn from(element: &Element) -> Self {
        Self::Element(element.clone())
    }
}

impl From<&str> for ContainerRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for ContainerRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

/// The options a [`Geocoder`] is created with.
///
/// `container` and `scene` are required. Every other option is forwarded to
/// the [`GeocoderViewModel`].
#[derive(Debug, Default, Clone)]
#[must_use]
pub struct GeocoderOptions {
    /// The element that will contain the widget.
    pub container: Option<ContainerRef>,
    /// The scene whose camera is flown to results.
    pub scene: Option<Arc<dyn Scene>>,
    /// The base url of the Bing Maps API.
    pub url: Option<String>,
    /// The Bing Maps key of the application.
    pub key: Option<String>,
    /// The scene's primary ellipsoid.
    pub ellipsoid: Option<Ellipsoid>,
    /// How long the camera flight to a result takes.
    pub flight_duration: Option<Duration>,
    /// The service used instead of Bing Maps.
    pub service: Option<Arc<dyn GeocodingService>>,
}

impl GeocoderOptions {
    /// Returns options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element that will contain the widget.
    pub fn container(mut self, container: impl Into<ContainerRef>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Sets the scene whose camera is flown to results.
    pub fn scene(mut self, scene: Arc<dyn Scene>) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Sets the base url of the Bing Maps API.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the Bing Maps key of the application.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the scene's primary ellipsoid.
    pub fn ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = Some(ellipsoid);
        self
    }

    /// Sets how long the camera flight to a result takes.
    pub fn flight_duration(mut self, duration: Duration) -> Self {
        self.flight_duration = Some(duration);
        self
    }

    /// Resolves queries with `service` instead of Bing Maps.
    pub fn service(mut self, service: Arc<dyn GeocodingService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Applies every setting present in `settings`.
    #[cfg(feature = "serde")]
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        if let Some(url) = settings.url {
            self.url = Some(url);
        }
        if let Some(key) = settings.key {
            self.key = Some(key);
        }
        if let Some(duration) = settings.flight_duration_ms {
            self.flight_duration = Some(Duration::from_millis(duration));
        }
        self
    }
}

/// Geocoding settings that can be loaded from a configuration file.
#[cfg(feature = "serde")]
#[derive(Debug, Default, Clone, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// The base url of the Bing Maps API.
    pub url: Option<String>,
    /// The Bing Maps key of the application.
    pub key: Option<String>,
    /// The duration of camera flights, in milliseconds.
    pub flight_duration_ms: Option<u64>,
}

/// A widget for finding addresses and landmarks, and flying the camera to
/// them.
///
/// The widget appends a `form` holding a text input and a search button to
/// its container. Submitting the form, or clicking the button, searches for
/// the input's text. While a search is running the button shows a cancel
/// glyph and clicking it cancels the search.
pub struct Geocoder {
    container: Element,
    form: Element,
    icon: SvgPath,
    view_model: GeocoderViewModel,
    mounted: Option<Mounted>,
}

struct Mounted {
    bindings: Bindings,
    search_in_progress: CallbackHandle,
    pointer_listeners: [ListenerHandle; 2],
}

impl Geocoder {
    /// Creates a geocoder inside of `options.container`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingArgument`] if `container` or `scene` is not set.
    /// - [`Error::ElementNotFound`] if `container` is an id that no element of
    ///   `document` has.
    /// - [`Error::ForeignElement`] if `container` belongs to another document.
    pub fn new(document: &Document, options: GeocoderOptions) -> crate::Result<Self> {
        let Some(container) = &options.container else {
            return Err(Error::MissingArgument("container"));
        };
        if options.scene.is_none() {
            return Err(Error::MissingArgument("scene"));
        }
        let container = container.resolve(document)?;
        let view_model = GeocoderViewModel::new(&options)?;

        let form = document.create_element("form");
        let text_box = document.create_element("input");
        text_box.set_attribute("type", "text");
        text_box.set_attribute("placeholder", PLACEHOLDER);
        text_box.add_class(INPUT_CLASS);
        form.append_child(&text_box)?;

        let go_button = document.create_element("span");
        go_button.add_class(GO_BUTTON_CLASS);
        form.append_child(&go_button)?;

        let icon = SvgPath::new(
            &go_button,
            ICON_SIZE,
            ICON_SIZE,
            Glyph::for_search(view_model.is_search_in_progress().get()).path_data(),
        )?;

        container.append_child(&form)?;

        let mut bindings = Bindings::new();
        bindings
            .submit(&form, search_with(&view_model))
            .click(&go_button, search_with(&view_model))
            // Pressing the button must not take focus away from the input.
            .on(&go_button, EventKind::MouseDown, Event::prevent_default)
            .on(&go_button, EventKind::TouchStart, Event::prevent_default)
            .value(&text_box, view_model.search_text())
            .has_focus(&text_box, view_model.is_focused())
            .class_when(
                &text_box,
                INPUT_WIDE_CLASS,
                view_model.search_text(),
                |text: &String| !text.is_empty(),
            );

        let search_in_progress = view_model.is_search_in_progress().for_each({
            let icon = icon.clone();
            move |in_progress| icon.set_path(Glyph::for_search(*in_progress).path_data())
        });

        let on_pointer_down = {
            let form = form.clone();
            let is_focused = view_model.is_focused().clone();
            move |event: &mut Event| {
                if !form.contains(event.target()) {
                    is_focused.set(false);
                }
            }
        };
        let pointer_listeners = [
            document.add_event_listener(EventKind::MouseDown, Phase::Capture, on_pointer_down.clone()),
            document.add_event_listener(EventKind::TouchStart, Phase::Capture, on_pointer_down),
        ];

        tracing::debug!(container = ?container, "geocoder created");

        Ok(Self {
            container,
            form,
            icon,
            view_model,
            mounted: Some(Mounted {
                bindings,
                search_in_progress,
                pointer_listeners,
            }),
        })
    }

    /// Returns the element containing this widget.
    #[must_use]
    pub const fn container(&self) -> &Element {
        &self.container
    }

    /// Returns the view model driving this widget.
    #[must_use]
    pub const fn view_model(&self) -> &GeocoderViewModel {
        &self.view_model
    }

    /// Returns the form this widget appended to its container.
    #[must_use]
    pub const fn form(&self) -> &Element {
        &self.form
    }

    /// Returns the icon drawn in the search button.
    #[must_use]
    pub const fn icon(&self) -> &SvgPath {
        &self.icon
    }

    /// Returns true once [`Self::destroy`] has been called.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.mounted.is_none()
    }

    /// Removes this widget from its container and disconnects it from the
    /// document and the view model.
    ///
    /// Destroying a widget does not cancel a search that is already running.
    /// Calling this function more than once has no effect. The widget is
    /// destroyed automatically when dropped.
    pub fn destroy(&mut self) {
        let Some(mut mounted) = self.mounted.take() else {
            return;
        };

        drop(mounted.pointer_listeners);
        drop(mounted.search_in_progress);
        mounted.bindings.clean();
        if let Err(err) = self.container.remove_child(&self.form) {
            tracing::warn!("geocoder form was already detached: {err}");
        }

        tracing::debug!(container = ?self.container, "geocoder destroyed");
    }
}

impl Drop for Geocoder {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Debug for Geocoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geocoder")
            .field("container", &self.container)
            .field("view_model", &self.view_model)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

fn search_with(view_model: &GeocoderViewModel) -> impl FnMut() + Send + 'static {
    let view_model = view_model.clone();
    move || {
        // The search reports its own completion through the view model.
        let _pending = view_model.search();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::{ContainerRef, Geocoder, GeocoderOptions, INPUT_WIDE_CLASS, PLACEHOLDER};
    use crate::document::{Document, EventKind};
    use crate::icon::Glyph;
    use crate::viewmodel::tests::{Gazetteer, RecordingScene};
    use crate::Error;

    fn options(container: impl Into<ContainerRef>) -> GeocoderOptions {
        GeocoderOptions::new()
            .container(container)
            .scene(Arc::new(RecordingScene::default()))
            .service(Arc::new(Gazetteer::default()))
    }

    fn mounted(document: &Document) -> (Geocoder, crate::document::Element) {
        let container = document.create_element("div");
        document.body().append_child(&container).unwrap();
        let geocoder = Geocoder::new(document, options(&container)).unwrap();
        (geocoder, container)
    }

    #[test]
    fn required_arguments() {
        let document = Document::new();
        let container = document.create_element("div");

        let missing_container = GeocoderOptions::new().scene(Arc::new(RecordingScene::default()));
        assert!(matches!(
            Geocoder::new(&document, missing_container),
            Err(Error::MissingArgument("container"))
        ));

        let missing_scene = GeocoderOptions::new().container(&container);
        assert!(matches!(
            Geocoder::new(&document, missing_scene),
            Err(Error::MissingArgument("scene"))
        ));
        assert!(container.children().is_empty());

        let geocoder = Geocoder::new(&document, options(&container)).unwrap();
        assert_eq!(container.children(), [geocoder.form().clone()]);
    }

    #[test]
    fn container_by_id() {
        let document = Document::new();
        let container = document.create_element("div");
        container.set_id("geocoder");
        document.body().append_child(&container).unwrap();

        let geocoder = Geocoder::new(&document, options("geocoder")).unwrap();
        assert_eq!(geocoder.container(), &container);
        assert!(!geocoder.view_model().is_focused().get());

        assert!(matches!(
            Geocoder::new(&document, options("missing")),
            Err(Error::ElementNotFound(id)) if id == "missing"
        ));

        let other = Document::new();
        assert!(matches!(
            Geocoder::new(&other, options(&container)),
            Err(Error::ForeignElement)
        ));
    }

    #[test]
    fn form_structure() {
        let document = Document::new();
        let (geocoder, _container) = mounted(&document);
        let children = geocoder.form().children();
        assert_eq!(children.len(), 2);

        let text_box = &children[0];
        assert_eq!(text_box.tag(), "input");
        assert_eq!(text_box.attribute("placeholder").as_deref(), Some(PLACEHOLDER));
        assert!(text_box.has_class("cesium-geocoder-input"));

        let go_button = &children[1];
        assert!(go_button.has_class("cesium-geocoder-goButton"));
        assert!(go_button.contains(geocoder.icon().element()));
        assert_eq!(geocoder.icon().glyph(), Some(Glyph::StartSearch));

        assert!(!text_box.has_class(INPUT_WIDE_CLASS));
        document.input_text(text_box, "Kyoto");
        assert_eq!(geocoder.view_model().search_text().get(), "Kyoto");
        assert!(text_box.has_class(INPUT_WIDE_CLASS));
    }

    #[test]
    fn icon_follows_search_state() {
        let document = Document::new();
        let (geocoder, _container) = mounted(&document);
        let in_progress = geocoder.view_model().is_search_in_progress();

        for state in [true, false, true, true, false] {
            in_progress.set(state);
            assert_eq!(geocoder.icon().glyph(), Some(Glyph::for_search(state)));
        }
    }

    #[test]
    fn pointer_outside_clears_focus() {
        let document = Document::new();
        let (geocoder, _container) = mounted(&document);
        let canvas = document.create_element("canvas");
        document.body().append_child(&canvas).unwrap();
        // The globe consumes pointer input, so the document never moves
        // focus on its own.
        let _swallow = canvas.add_event_listener(EventKind::MouseDown, |event| {
            event.prevent_default();
        });
        let children = geocoder.form().children();
        let (text_box, go_button) = (&children[0], &children[1]);
        let is_focused = geocoder.view_model().is_focused();

        document.pointer_down(text_box);
        assert!(is_focused.get());

        document.pointer_down(go_button);
        assert!(is_focused.get());
        document.dispatch(EventKind::TouchStart, text_box);
        assert!(is_focused.get());

        document.pointer_down(&canvas);
        assert!(!is_focused.get());
        assert_eq!(document.active_element(), None);

        is_focused.set(true);
        document.dispatch(EventKind::TouchStart, &document.body());
        assert!(!is_focused.get());
    }

    #[test]
    fn submit_searches_and_button_cancels() {
        let gate = Arc::new(Barrier::new(2));
        let document = Document::new();
        let container = document.create_element("div");
        document.body().append_child(&container).unwrap();
        let scene = Arc::new(RecordingScene::default());
        let geocoder = Geocoder::new(
            &document,
            GeocoderOptions::new()
                .container(&container)
                .scene(scene.clone())
                .service(Arc::new(Gazetteer {
                    gate: Some(gate.clone()),
                })),
        )
        .unwrap();
        let children = geocoder.form().children();
        let (text_box, go_button) = (&children[0], &children[1]);

        document.input_text(text_box, "Kyoto");
        document.submit(geocoder.form());
        assert!(geocoder.view_model().is_search_in_progress().get());
        assert_eq!(geocoder.icon().glyph(), Some(Glyph::CancelSearch));

        document.click(go_button);
        assert!(!geocoder.view_model().is_search_in_progress().get());
        assert_eq!(geocoder.icon().glyph(), Some(Glyph::StartSearch));

        gate.wait();
        assert_eq!(geocoder.view_model().search_text().get(), "Kyoto");
    }

    #[test]
    fn destroy_releases_everything() {
        let document = Document::new();
        let listeners_before = document.listener_count();
        let (mut geocoder, container) = mounted(&document);
        let form = geocoder.form().clone();
        let text_box = form.children()[0].clone();
        let view_model = geocoder.view_model().clone();
        assert!(!geocoder.is_destroyed());

        geocoder.destroy();
        assert!(geocoder.is_destroyed());
        assert!(container.children().is_empty());
        assert!(!container.contains(&form));
        assert_eq!(document.listener_count(), listeners_before);

        view_model.is_focused().set(true);
        document.dispatch(EventKind::MouseDown, &document.body());
        assert!(view_model.is_focused().get());

        view_model.is_search_in_progress().set(true);
        assert_eq!(geocoder.icon().glyph(), Some(Glyph::StartSearch));

        view_model.search_text().set(String::from("Lima"));
        assert_eq!(text_box.value(), "");

        geocoder.destroy();
        assert!(geocoder.is_destroyed());
    }

    #[test]
    fn instances_are_isolated() {
        let document = Document::new();
        let (first, first_container) = mounted(&document);
        let (mut second, second_container) = mounted(&document);

        first.view_model().is_focused().set(true);
        second.destroy();
        assert!(second_container.children().is_empty());
        assert_eq!(first_container.children(), [first.form().clone()]);

        let first_text_box = first.form().children()[0].clone();
        document.dispatch(EventKind::MouseDown, &first_text_box);
        assert!(first.view_model().is_focused().get());
        document.dispatch(EventKind::MouseDown, &document.body());
        assert!(!first.view_model().is_focused().get());

        first.view_model().is_search_in_progress().set(true);
        assert_eq!(first.icon().glyph(), Some(Glyph::CancelSearch));
        assert_eq!(second.icon().glyph(), Some(Glyph::StartSearch));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn settings_apply_to_options() {
        use std::time::Duration;

        use super::ServiceSettings;

        let settings: ServiceSettings =
            serde_json::from_str(r#"{"key": "abc", "flight_duration_ms": 800}"#).unwrap();
        let document = Document::new();
        let container = document.create_element("div");
        let geocoder =
            Geocoder::new(&document, options(&container).with_settings(settings)).unwrap();
        let view_model = geocoder.view_model();
        assert_eq!(view_model.key(), Some("abc"));
        assert_eq!(view_model.url(), crate::viewmodel::DEFAULT_URL);
        assert_eq!(view_model.flight_duration(), Duration::from_millis(800));
    }

    #[test]
    fn dropping_destroys() {
        let document = Document::new();
        let (geocoder, container) = mounted(&document);
        drop(geocoder);
        assert!(container.children().is_empty());
        assert_eq!(document.listener_count(), 0);
    }

    #[test]
    fn repeated_mounting_frees_elements() {
        let document = Document::new();
        let container = document.create_element("div");
        document.body().append_child(&container).unwrap();
        let baseline = document.element_count();

        for _ in 0..100 {
            let mut geocoder = Geocoder::new(&document, options(&container)).unwrap();
            assert_eq!(document.element_count(), baseline + 5);
            geocoder.destroy();
            drop(geocoder);
            assert_eq!(document.element_count(), baseline);
        }
        assert_eq!(document.listener_count(), 0);
    }
}
