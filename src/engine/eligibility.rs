use crate::models::driver::{Driver, Role};
use crate::models::trip::{Trip, VehicleType};

#[derive(Debug, Clone)]
pub struct Eligibility {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

/// Maps a driver's free-text vehicle description onto the closed vehicle
/// set by keyword matching. `None` means the type is unset or unrecognized.
pub fn normalize_vehicle_type(raw: &str) -> Option<VehicleType> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    const KEYWORDS: [(&[&str], VehicleType); 4] = [
        (&["boda", "motor", "bike"], VehicleType::Boda),
        (&["bajaji", "tuktuk", "auto"], VehicleType::Bajaji),
        (&["car", "sedan", "suv"], VehicleType::Car),
        (&["xl", "van", "minibus", "coaster"], VehicleType::Xl),
    ];

    for (keywords, vehicle_type) in KEYWORDS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return Some(vehicle_type);
        }
    }

    None
}

pub fn normalize_region(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    (!lowered.is_empty()).then_some(lowered)
}

/// The driver's normalized service areas: home region plus every token of
/// the delimited operation-area list.
pub fn service_areas(driver: &Driver) -> Vec<String> {
    let mut areas = Vec::new();

    if let Some(region) = driver.region.as_deref().and_then(normalize_region) {
        areas.push(region);
    }

    if let Some(raw) = driver.operation_area.as_deref() {
        for token in raw.split([',', ';', '|']) {
            if let Some(area) = normalize_region(token) {
                if !areas.contains(&area) {
                    areas.push(area);
                }
            }
        }
    }

    areas
}

/// The trip's normalized candidate regions: origin, destination, property.
pub fn candidate_regions(trip: &Trip) -> Vec<String> {
    [
        trip.pickup_region.as_deref(),
        trip.dropoff_region.as_deref(),
        trip.property_region.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(normalize_region)
    .collect()
}

pub fn area_match(driver: &Driver, trip: &Trip) -> bool {
    let candidates = candidate_regions(trip);
    if candidates.is_empty() {
        return false;
    }
    let areas = service_areas(driver);
    candidates.iter().any(|region| areas.contains(region))
}

/// Checks a driver against a trip. Every failing rule contributes its own
/// reason; a missing driver record short-circuits the rest.
pub fn evaluate(driver: Option<&Driver>, trip: &Trip) -> Eligibility {
    let Some(driver) = driver else {
        return Eligibility {
            eligible: false,
            reasons: vec!["Driver not found".to_string()],
        };
    };

    let mut reasons = Vec::new();

    if driver.role != Role::Driver {
        reasons.push("Not a driver".to_string());
    }
    if driver.is_disabled {
        reasons.push("Driver disabled".to_string());
    }
    if driver.suspended_at.is_some() {
        reasons.push("Driver suspended".to_string());
    }
    if !driver.available {
        reasons.push("Driver unavailable".to_string());
    }

    match trip.vehicle_type {
        VehicleType::Premium => {
            if !driver.is_vip_driver {
                reasons.push("VIP required".to_string());
            }
        }
        required => match driver
            .vehicle_type
            .as_deref()
            .and_then(normalize_vehicle_type)
        {
            None => reasons.push("Vehicle type not set".to_string()),
            Some(normalized) if normalized != required => {
                reasons.push("Vehicle mismatch".to_string());
            }
            Some(_) => {}
        },
    }

    // A trip with no region data cannot enforce the area rule.
    let candidates = candidate_regions(trip);
    if !candidates.is_empty() {
        let areas = service_areas(driver);
        if areas.is_empty() || !candidates.iter().any(|region| areas.contains(region)) {
            reasons.push("Outside service area".to_string());
        }
    }

    Eligibility {
        eligible: reasons.is_empty(),
        reasons,
    }
}
