//! This example drives a geocoder without a browser: the user's typing,
//! clicks and form submissions are simulated through the document.

use std::sync::Arc;
use std::time::Duration;

use globe_geocoder::document::Document;
use globe_geocoder::geocoder::{Geocoder, GeocoderOptions};
use globe_geocoder::scene::{CameraFlight, Rectangle, Scene};
use globe_geocoder::service::{GeocodeResult, GeocodingService, ServiceError};

#[derive(Debug)]
struct Globe;

impl Scene for Globe {
    fn fly_to(&self, flight: CameraFlight) {
        let (longitude, latitude) = flight.destination.center();
        tracing::info!(
            longitude,
            latitude,
            duration = ?flight.duration,
            "flying camera"
        );
    }
}

/// Knows a handful of places and takes a while to answer.
#[derive(Debug)]
struct Atlas;

impl GeocodingService for Atlas {
    fn geocode(&self, query: &str) -> Result<Option<GeocodeResult>, ServiceError> {
        std::thread::sleep(Duration::from_millis(200));
        let place = match query.to_lowercase().as_str() {
            "reykjavik" => GeocodeResult {
                name: String::from("Reykjavík, Iceland"),
                bounds: Rectangle::from_degrees(-22.0, 64.07, -21.7, 64.18),
            },
            "wellington" => GeocodeResult {
                name: String::from("Wellington, New Zealand"),
                bounds: Rectangle::from_degrees(174.6, -41.4, 174.9, -41.1),
            },
            _ => return Ok(None),
        };
        Ok(Some(place))
    }
}

fn main() -> globe_geocoder::Result {
    globe_geocoder::initialize_tracing();

    let document = Document::new();
    let container = document.create_element("div");
    container.set_id("toolbar");
    document.body().append_child(&container)?;
    let globe = document.create_element("canvas");
    document.body().append_child(&globe)?;

    let geocoder = Geocoder::new(
        &document,
        GeocoderOptions::new()
            .container("toolbar")
            .scene(Arc::new(Globe))
            .service(Arc::new(Atlas))
            .flight_duration(Duration::from_secs(2)),
    )?;
    let view_model = geocoder.view_model().clone();
    let children = geocoder.form().children();
    let (text_box, go_button) = (&children[0], &children[1]);

    for query in ["Reykjavik", "Wellington", "Atlantis"] {
        document.click(text_box);
        document.input_text(text_box, query);
        document.submit(geocoder.form());
        tracing::info!(glyph = ?geocoder.icon().glyph(), "searching for {query}");

        while view_model.is_search_in_progress().get() {
            std::thread::sleep(Duration::from_millis(20));
        }
        tracing::info!(text = %text_box.value(), "search finished");
    }

    // Start a search and change our minds.
    document.input_text(text_box, "Wellington");
    document.submit(geocoder.form());
    document.click(go_button);
    tracing::info!(
        in_progress = view_model.is_search_in_progress().get(),
        "search cancelled"
    );

    document.click(&globe);
    tracing::info!(focused = view_model.is_focused().get(), "clicked the globe");

    drop(geocoder);
    tracing::info!(children = container.children().len(), "geocoder destroyed");
    Ok(())
}
