//! The camera target the geocoder flies to its results.

use std::fmt::Debug;
use std::time::Duration;

/// A 3D scene whose camera can be flown to a location.
pub trait Scene: Debug + Send + Sync + 'static {
    /// Starts animating the camera toward `flight.destination`.
    fn fly_to(&self, flight: CameraFlight);
}

/// A request to animate the camera of a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFlight {
    /// The region the camera should frame once the flight completes.
    pub destination: Rectangle,
    /// The ellipsoid the destination's coordinates are relative to.
    pub ellipsoid: Ellipsoid,
    /// How long the flight should take.
    pub duration: Duration,
}

/// A geographic rectangle, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    /// The westernmost longitude.
    pub west: f64,
    /// The southernmost latitude.
    pub south: f64,
    /// The easternmost longitude.
    pub east: f64,
    /// The northernmost latitude.
    pub north: f64,
}

impl Rectangle {
    /// Returns a rectangle from its bounds in degrees.
    #[must_use]
    pub const fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns the `(longitude, latitude)` of this rectangle's center.
    ///
    /// Rectangles crossing the antimeridian (`east < west`) are handled.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        let east = if self.east < self.west {
            self.east + 360.
        } else {
            self.east
        };
        let mut longitude = (self.west + east) / 2.;
        if longitude > 180. {
            longitude -= 360.;
        }
        (longitude, (self.south + self.north) / 2.)
    }
}

/// A triaxial ellipsoid, described by its radii in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// The radius along the x axis.
    pub x: f64,
    /// The radius along the y axis.
    pub y: f64,
    /// The radius along the z axis.
    pub z: f64,
}

impl Ellipsoid {
    /// The WGS84 ellipsoid.
    pub const WGS84: Self = Self::new(6_378_137.0, 6_378_137.0, 6_356_752.314_245_179_3);

    /// Returns an ellipsoid with the given radii.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the largest radius.
    #[must_use]
    pub fn maximum_radius(&self) -> f64 {
        self.x.max(self.y).max(self.z)
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

#[test]
fn rectangle_center() {
    let paris = Rectangle::from_degrees(2.2, 48.8, 2.4, 49.0);
    let (longitude, latitude) = paris.center();
    assert!((longitude - 2.3).abs() < 1e-9);
    assert!((latitude - 48.9).abs() < 1e-9);

    let fiji = Rectangle::from_degrees(177., -19., -179., -16.);
    let (longitude, _) = fiji.center();
    assert!((longitude - 179.).abs() < 1e-9);
}

#[test]
fn ellipsoid_defaults_to_wgs84() {
    assert_eq!(Ellipsoid::default(), Ellipsoid::WGS84);
    assert!((Ellipsoid::WGS84.maximum_radius() - 6_378_137.0).abs() < f64::EPSILON);
}
