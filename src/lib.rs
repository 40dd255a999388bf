//! A place-search widget for 3D globe viewers.
//!
//! A [`Geocoder`](geocoder::Geocoder) mounts a small form into a container
//! element. Queries typed into it are resolved by a
//! [`GeocodingService`](service::GeocodingService), and the camera of a
//! [`Scene`](scene::Scene) is flown to the place that was found.
//!
//! The widget is built on a headless element tree ([`document`]) and
//! observable values ([`value`]), connected by [`binding`]s.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use globe_geocoder::document::Document;
//! use globe_geocoder::geocoder::{Geocoder, GeocoderOptions};
//! use globe_geocoder::scene::{CameraFlight, Scene};
//! use globe_geocoder::service::{GeocodeResult, GeocodingService, ServiceError};
//!
//! #[derive(Debug)]
//! struct Globe;
//!
//! impl Scene for Globe {
//!     fn fly_to(&self, flight: CameraFlight) {
//!         println!("flying to {:?}", flight.destination.center());
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Nowhere;
//!
//! impl GeocodingService for Nowhere {
//!     fn geocode(&self, _query: &str) -> Result<Option<GeocodeResult>, ServiceError> {
//!         Ok(None)
//!     }
//! }
//!
//! let document = Document::new();
//! let container = document.create_element("div");
//! container.set_id("geocoder");
//! document.body().append_child(&container)?;
//!
//! let geocoder = Geocoder::new(
//!     &document,
//!     GeocoderOptions::new()
//!         .container("geocoder")
//!         .scene(Arc::new(Globe))
//!         .service(Arc::new(Nowhere)),
//! )?;
//! assert_eq!(container.children(), [geocoder.form().clone()]);
//! # Ok::<(), globe_geocoder::Error>(())
//! ```
#![warn(clippy::pedantic, missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::fmt::{self, Display};

pub mod binding;
pub mod document;
pub mod geocoder;
pub mod icon;
pub mod scene;
pub mod service;
pub mod value;
pub mod viewmodel;

pub use self::geocoder::{Geocoder, GeocoderOptions};
pub use self::value::{CallbackHandle, Dynamic};
pub use self::viewmodel::GeocoderViewModel;

/// A result alias that defaults to the result type commonly used throughout
/// this crate.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// An error raised while building or manipulating widgets.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A required option was not provided.
    MissingArgument(&'static str),
    /// No element attached to the document has the given id.
    ElementNotFound(String),
    /// An element belongs to a different document.
    ForeignElement,
    /// An element is not a child of the element it was removed from.
    NotAChild,
    /// An element cannot be appended inside of itself.
    HierarchyRequest,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingArgument(name) => write!(f, "{name} is required"),
            Error::ElementNotFound(id) => {
                write!(f, "no element with id \"{id}\" exists in the document")
            }
            Error::ForeignElement => f.write_str("the element belongs to another document"),
            Error::NotAChild => f.write_str("the element is not a child of this element"),
            Error::HierarchyRequest => {
                f.write_str("an element cannot be appended to one of its descendants")
            }
        }
    }
}

/// Installs a `tracing` subscriber that prints to stdout.
///
/// `RUST_LOG` is honored when set. Otherwise, events at `INFO` and above are
/// printed in debug builds, and errors only in release builds. Nothing happens
/// if a global subscriber is already installed or the `tracing-output`
/// feature is disabled.
pub fn initialize_tracing() {
    #[cfg(feature = "tracing-output")]
    {
        use tracing::Level;
        use tracing_subscriber::filter::LevelFilter;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::EnvFilter;

        #[cfg(debug_assertions)]
        const MAX_LEVEL: Level = Level::INFO;
        #[cfg(not(debug_assertions))]
        const MAX_LEVEL: Level = Level::ERROR;

        let _result = tracing_subscriber::fmt::fmt()
            .with_max_level(MAX_LEVEL)
            .finish()
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::from_level(MAX_LEVEL).into())
                    .from_env_lossy(),
            )
            .try_init();
    }
}

#[test]
fn error_messages() {
    assert_eq!(
        Error::MissingArgument("container").to_string(),
        "container is required"
    );
    assert_eq!(
        Error::ElementNotFound(String::from("map")).to_string(),
        "no element with id \"map\" exists in the document"
    );
}
