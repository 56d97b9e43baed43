use crate::{config::Config, probe::ProbeResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Digital,
    Scanned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub route: Route,
    pub forced: bool,
    /// Whether a failed digital extraction may fall through to OCR.
    pub fallback_to_ocr: bool,
}

pub fn decide(cfg: &Config, probe: &ProbeResult) -> RouteDecision {
    let forced = match cfg.classification.forced_route.trim().to_ascii_uppercase().as_str() {
        "DIGITAL" => Some(Route::Digital),
        "SCANNED" | "SCAN" => Some(Route::Scanned),
        _ => None,
    };

    let route = forced.unwrap_or(if probe.has_text {
        Route::Digital
    } else {
        Route::Scanned
    });

    RouteDecision {
        route,
        forced: forced.is_some(),
        fallback_to_ocr: route == Route::Digital && cfg.digital.fallback_to_ocr,
    }
}
