//! The state and behavior behind the geocoder widget.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::geocoder::GeocoderOptions;
use crate::scene::{CameraFlight, Ellipsoid, Scene};
use crate::service::{GeocodeResult, GeocodingService, ServiceError};
use crate::value::Dynamic;
use crate::Error;

/// The Bing Maps API host used when no url is configured.
pub const DEFAULT_URL: &str = "http://dev.virtualearth.net/";

/// The camera flight duration used when none is configured.
pub const DEFAULT_FLIGHT_DURATION: Duration = Duration::from_millis(1500);

/// The view model for the geocoder widget.
///
/// Cloning a view model produces another handle to the same state.
#[derive(Clone)]
pub struct GeocoderViewModel {
    search_text: Dynamic<String>,
    is_focused: Dynamic<bool>,
    is_search_in_progress: Dynamic<bool>,
    settings: Arc<Settings>,
    latest_search: Arc<Mutex<u64>>,
}

struct Settings {
    url: String,
    key: Option<String>,
    ellipsoid: Ellipsoid,
    flight_duration: Duration,
    scene: Arc<dyn Scene>,
    service: Arc<dyn GeocodingService>,
}

impl GeocoderViewModel {
    /// Returns a new view model configured by `options`.
    ///
    /// The `container` option is ignored. `scene` is required. When no
    /// service is provided, a Bing Maps service is created from `url` and
    /// `key` if the `bing` feature is enabled.
    pub fn new(options: &GeocoderOptions) -> crate::Result<Self> {
        let scene = options
            .scene
            .clone()
            .ok_or(Error::MissingArgument("scene"))?;
        let url = options
            .url
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_URL));
        let key = options.key.clone();
        let service = match &options.service {
            Some(service) => service.clone(),
            None => default_service(&url, key.clone())?,
        };

        Ok(Self {
            search_text: Dynamic::default(),
            is_focused: Dynamic::new(false),
            is_search_in_progress: Dynamic::new(false),
            settings: Arc::new(Settings {
                url,
                key,
                ellipsoid: options.ellipsoid.unwrap_or_default(),
                flight_duration: options.flight_duration.unwrap_or(DEFAULT_FLIGHT_DURATION),
                scene,
                service,
            }),
            latest_search: Arc::default(),
        })
    }

    /// The text of the search box.
    #[must_use]
    pub const fn search_text(&self) -> &Dynamic<String> {
        &self.search_text
    }

    /// Whether the search box has input focus.
    #[must_use]
    pub const fn is_focused(&self) -> &Dynamic<bool> {
        &self.is_focused
    }

    /// Whether a search is currently running.
    #[must_use]
    pub const fn is_search_in_progress(&self) -> &Dynamic<bool> {
        &self.is_search_in_progress
    }

    /// Returns the base url of the geocoding service.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.settings.url
    }

    /// Returns the key used to authenticate with the geocoding service.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.settings.key.as_deref()
    }

    /// Returns the ellipsoid of the scene.
    #[must_use]
    pub fn ellipsoid(&self) -> Ellipsoid {
        self.settings.ellipsoid
    }

    /// Returns how long camera flights to a result take.
    #[must_use]
    pub fn flight_duration(&self) -> Duration {
        self.settings.flight_duration
    }

    /// Returns the scene whose camera is flown to results.
    #[must_use]
    pub fn scene(&self) -> &Arc<dyn Scene> {
        &self.settings.scene
    }

    /// Starts searching for the current search text, or cancels the running
    /// search.
    ///
    /// Returns a handle to the started search. `None` is returned when a
    /// search was cancelled or when the search text is blank.
    pub fn search(&self) -> Option<PendingSearch> {
        if self.is_search_in_progress.get() {
            self.cancel();
            return None;
        }

        let query = self.search_text.get();
        if query.trim().is_empty() {
            return None;
        }

        let search = {
            let mut latest = self.latest_search.lock();
            *latest += 1;
            self.is_search_in_progress.set(true);
            *latest
        };
        tracing::debug!(search, query = %query, "starting geocode");

        let view_model = self.clone();
        let spawned = thread::Builder::new()
            .name(String::from("geocoder"))
            .spawn({
                let query = query.clone();
                move || {
                    let result = view_model.settings.service.geocode(&query);
                    view_model.complete(search, &query, result)
                }
            });
        match spawned {
            Ok(handle) => Some(PendingSearch { handle }),
            Err(err) => {
                tracing::error!("error spawning geocoder thread: {err}");
                self.complete(search, &query, Err(ServiceError::Http(err.to_string())));
                None
            }
        }
    }

    /// Cancels the running search, if any. The result of a cancelled search
    /// is ignored.
    pub fn cancel(&self) {
        let mut latest = self.latest_search.lock();
        *latest += 1;
        self.is_search_in_progress.set(false);
        drop(latest);
        tracing::debug!("geocode cancelled");
    }

    fn complete(
        &self,
        search: u64,
        query: &str,
        result: Result<Option<GeocodeResult>, ServiceError>,
    ) -> bool {
        // The result is applied while holding the search id, so a search
        // started or cancelled meanwhile takes effect after it.
        let mut latest = self.latest_search.lock();
        if *latest != search {
            tracing::debug!(search, "ignoring result of cancelled geocode");
            return false;
        }
        *latest += 1;

        self.is_search_in_progress.set(false);
        match result {
            Ok(Some(result)) => {
                tracing::debug!(search, name = %result.name, "geocode succeeded");
                self.search_text.set(result.name);
                self.settings.scene.fly_to(CameraFlight {
                    destination: result.bounds,
                    ellipsoid: self.settings.ellipsoid,
                    duration: self.settings.flight_duration,
                });
            }
            Ok(None) => {
                tracing::debug!(search, "geocode found no results");
                self.search_text.set(format!("{query} (not found)"));
            }
            Err(err) => {
                tracing::warn!(search, "geocode failed: {err}");
                self.search_text.set(format!("{query} (error)"));
            }
        }
        drop(latest);
        true
    }
}

impl Debug for GeocoderViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocoderViewModel")
            .field("search_text", &self.search_text)
            .field("is_focused", &self.is_focused)
            .field("is_search_in_progress", &self.is_search_in_progress)
            .field("url", &self.settings.url)
            .field("ellipsoid", &self.settings.ellipsoid)
            .field("flight_duration", &self.settings.flight_duration)
            .field("scene", &self.settings.scene)
            .field("service", &self.settings.service)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "bing")]
fn default_service(url: &str, key: Option<String>) -> crate::Result<Arc<dyn GeocodingService>> {
    Ok(Arc::new(crate::service::bing::BingMapsService::new(url, key)))
}

#[cfg(not(feature = "bing"))]
fn default_service(_url: &str, _key: Option<String>) -> crate::Result<Arc<dyn GeocodingService>> {
    Err(Error::MissingArgument("service"))
}

/// A search running in the background.
#[derive(Debug)]
#[must_use = "dropping a PendingSearch does not cancel it"]
pub struct PendingSearch {
    handle: JoinHandle<bool>,
}

impl PendingSearch {
    /// Blocks until the search finishes. Returns true if its result was
    /// applied, or false if the search was cancelled first.
    pub fn wait(self) -> bool {
        self.handle.join().unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::{GeocoderViewModel, DEFAULT_FLIGHT_DURATION, DEFAULT_URL};
    use crate::geocoder::GeocoderOptions;
    use crate::scene::{CameraFlight, Ellipsoid, Rectangle, Scene};
    use crate::service::{GeocodeResult, GeocodingService, ServiceError};
    use crate::Error;

    /// A scene that records each flight requested.
    #[derive(Debug, Default)]
    pub struct RecordingScene {
        pub flights: Mutex<Vec<CameraFlight>>,
    }

    impl Scene for RecordingScene {
        fn fly_to(&self, flight: CameraFlight) {
            self.flights.lock().push(flight);
        }
    }

    /// A service that answers from a fixed table of places.
    #[derive(Debug, Default)]
    pub struct Gazetteer {
        pub gate: Option<Arc<Barrier>>,
    }

    impl GeocodingService for Gazetteer {
        fn geocode(&self, query: &str) -> Result<Option<GeocodeResult>, ServiceError> {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            match query {
                "Kyoto" => Ok(Some(GeocodeResult {
                    name: String::from("Kyoto, Japan"),
                    bounds: Rectangle::from_degrees(135.6, 34.9, 135.9, 35.1),
                })),
                "offline" => Err(ServiceError::Http(String::from("connection refused"))),
                _ => Ok(None),
            }
        }
    }

    fn view_model(service: Gazetteer) -> (GeocoderViewModel, Arc<RecordingScene>) {
        let scene = Arc::new(RecordingScene::default());
        let view_model = GeocoderViewModel::new(
            &GeocoderOptions::new()
                .scene(scene.clone())
                .service(Arc::new(service))
                .flight_duration(Duration::from_millis(250)),
        )
        .unwrap();
        (view_model, scene)
    }

    #[test]
    fn defaults() {
        let view_model = GeocoderViewModel::new(
            &GeocoderOptions::new()
                .scene(Arc::new(RecordingScene::default()))
                .service(Arc::new(Gazetteer::default())),
        )
        .unwrap();
        assert_eq!(view_model.url(), DEFAULT_URL);
        assert_eq!(view_model.key(), None);
        assert_eq!(view_model.ellipsoid(), Ellipsoid::WGS84);
        assert_eq!(view_model.flight_duration(), DEFAULT_FLIGHT_DURATION);
        assert!(!view_model.is_focused().get());
        assert!(!view_model.is_search_in_progress().get());
    }

    #[test]
    fn scene_is_required() {
        assert!(matches!(
            GeocoderViewModel::new(&GeocoderOptions::new()),
            Err(Error::MissingArgument("scene"))
        ));
    }

    #[test]
    fn successful_search_flies_camera() {
        let (view_model, scene) = view_model(Gazetteer::default());
        view_model.search_text().set(String::from("Kyoto"));

        let pending = view_model.search().unwrap();
        assert!(pending.wait());
        assert!(!view_model.is_search_in_progress().get());
        assert_eq!(view_model.search_text().get(), "Kyoto, Japan");
        assert_eq!(
            *scene.flights.lock(),
            [CameraFlight {
                destination: Rectangle::from_degrees(135.6, 34.9, 135.9, 35.1),
                ellipsoid: Ellipsoid::WGS84,
                duration: Duration::from_millis(250),
            }]
        );
    }

    #[test]
    fn unknown_and_failed_searches() {
        let (view_model, scene) = view_model(Gazetteer::default());
        view_model.search_text().set(String::from("Atlantis"));
        assert!(view_model.search().unwrap().wait());
        assert_eq!(view_model.search_text().get(), "Atlantis (not found)");

        view_model.search_text().set(String::from("offline"));
        assert!(view_model.search().unwrap().wait());
        assert_eq!(view_model.search_text().get(), "offline (error)");
        assert!(scene.flights.lock().is_empty());
    }

    #[test]
    fn blank_query_is_ignored() {
        let (view_model, _scene) = view_model(Gazetteer::default());
        view_model.search_text().set(String::from("   "));
        assert!(view_model.search().is_none());
        assert!(!view_model.is_search_in_progress().get());
    }

    #[test]
    fn second_search_cancels_the_first() {
        let gate = Arc::new(Barrier::new(2));
        let (view_model, scene) = view_model(Gazetteer {
            gate: Some(gate.clone()),
        });
        view_model.search_text().set(String::from("Kyoto"));

        let pending = view_model.search().unwrap();
        assert!(view_model.is_search_in_progress().get());
        assert!(view_model.search().is_none());
        assert!(!view_model.is_search_in_progress().get());

        gate.wait();
        assert!(!pending.wait());
        assert_eq!(view_model.search_text().get(), "Kyoto");
        assert!(scene.flights.lock().is_empty());
    }

    /// A scene that holds each flight until released.
    #[derive(Debug)]
    struct SlowScene {
        entered: Barrier,
        release: Barrier,
    }

    impl Scene for SlowScene {
        fn fly_to(&self, _flight: CameraFlight) {
            self.entered.wait();
            self.release.wait();
        }
    }

    #[test]
    fn new_search_waits_for_result_being_applied() {
        let scene = Arc::new(SlowScene {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        let view_model = GeocoderViewModel::new(
            &GeocoderOptions::new()
                .scene(scene.clone())
                .service(Arc::new(Gazetteer::default())),
        )
        .unwrap();
        view_model.search_text().set(String::from("Kyoto"));
        let first = view_model.search().unwrap();

        // The first result is applied up to the camera flight.
        scene.entered.wait();
        assert_eq!(view_model.search_text().get(), "Kyoto, Japan");

        let second = thread::spawn({
            let view_model = view_model.clone();
            move || {
                view_model.search_text().set(String::from("Atlantis"));
                view_model.search()
            }
        });
        thread::sleep(Duration::from_millis(100));
        assert!(!second.is_finished());

        scene.release.wait();
        assert!(first.wait());
        let second = second.join().unwrap().unwrap();
        assert!(second.wait());
        assert_eq!(view_model.search_text().get(), "Atlantis (not found)");
        assert!(!view_model.is_search_in_progress().get());
    }
}
