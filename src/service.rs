//! Services that resolve free-form queries into locations.

use std::fmt::{self, Debug, Display};

use crate::scene::Rectangle;

#[cfg(feature = "bing")]
pub mod bing;

/// A service that resolves a free-form place name or address into a location.
///
/// Implementations are invoked from a background thread and may block.
pub trait GeocodingService: Debug + Send + Sync + 'static {
    /// Resolves `query`, returning `None` when nothing matched.
    fn geocode(&self, query: &str) -> Result<Option<GeocodeResult>, ServiceError>;
}

/// A location a query resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    /// The display name of the location.
    pub name: String,
    /// The region that frames the location.
    pub bounds: Rectangle,
}

/// An error returned from a [`GeocodingService`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ServiceError {
    /// The request could not be completed.
    Http(String),
    /// The service responded with data that could not be understood.
    InvalidResponse(String),
}

impl std::error::Error for ServiceError {}

impl Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Http(err) => write!(f, "geocoding request failed: {err}"),
            ServiceError::InvalidResponse(err) => {
                write!(f, "invalid geocoding response: {err}")
            }
        }
    }
}
