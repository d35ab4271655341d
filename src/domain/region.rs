//! Region roster: the states and districts the service forecasts for.
//!
//! Base consumption and industrial factors are hand-tuned planning values,
//! not measured loads. Coordinates are used only for the live weather lookup.

use serde::Serialize;
use std::collections::BTreeMap;

/// Industrial base factor applied to states missing from the roster.
pub const DEFAULT_INDUSTRIAL_BASE: f64 = 0.70;

/// A district and the point used to query weather for it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistrictProfile {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// A state with its demand characteristics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateProfile {
    pub name: &'static str,
    /// Typical state-wide demand in MW before any multipliers
    pub base_consumption_mw: f64,
    /// Share of demand driven by industry (weekday daytime)
    pub industrial_base: f64,
    pub districts: [DistrictProfile; 5],
}

const fn district(name: &'static str, latitude: f64, longitude: f64) -> DistrictProfile {
    DistrictProfile {
        name,
        latitude,
        longitude,
    }
}

pub const STATES: [StateProfile; 10] = [
    StateProfile {
        name: "Maharashtra",
        base_consumption_mw: 18000.0,
        industrial_base: 0.85,
        districts: [
            district("Mumbai", 19.0760, 72.8777),
            district("Pune", 18.5204, 73.8567),
            district("Nagpur", 21.1458, 79.0882),
            district("Nashik", 19.9975, 73.7898),
            district("Aurangabad", 19.8762, 75.3433),
        ],
    },
    StateProfile {
        name: "Karnataka",
        base_consumption_mw: 12000.0,
        industrial_base: 0.75,
        districts: [
            district("Bangalore", 12.9716, 77.5946),
            district("Mysore", 12.2958, 76.6394),
            district("Hubli", 15.3647, 75.1240),
            district("Mangalore", 12.9141, 74.8560),
            district("Belgaum", 15.8497, 74.4977),
        ],
    },
    StateProfile {
        name: "Tamil Nadu",
        base_consumption_mw: 14000.0,
        industrial_base: 0.80,
        districts: [
            district("Chennai", 13.0827, 80.2707),
            district("Coimbatore", 11.0168, 76.9558),
            district("Madurai", 9.9252, 78.1198),
            district("Salem", 11.6643, 78.1460),
            district("Tiruchirappalli", 10.7905, 78.7047),
        ],
    },
    StateProfile {
        name: "Gujarat",
        base_consumption_mw: 13000.0,
        industrial_base: 0.90,
        districts: [
            district("Ahmedabad", 23.0225, 72.5714),
            district("Surat", 21.1702, 72.8311),
            district("Vadodara", 22.3072, 73.1812),
            district("Rajkot", 22.3039, 70.8022),
            district("Gandhinagar", 23.2156, 72.6369),
        ],
    },
    StateProfile {
        name: "Rajasthan",
        base_consumption_mw: 8000.0,
        industrial_base: 0.60,
        districts: [
            district("Jaipur", 26.9124, 75.7873),
            district("Jodhpur", 26.2389, 73.0243),
            district("Kota", 25.2138, 75.8648),
            district("Bikaner", 28.0229, 73.3119),
            district("Udaipur", 24.5854, 73.7125),
        ],
    },
    StateProfile {
        name: "West Bengal",
        base_consumption_mw: 9000.0,
        industrial_base: 0.70,
        districts: [
            district("Kolkata", 22.5726, 88.3639),
            district("Howrah", 22.5958, 88.2636),
            district("Durgapur", 23.5204, 87.3119),
            district("Asansol", 23.6739, 86.9524),
            district("Siliguri", 26.7271, 88.3953),
        ],
    },
    StateProfile {
        name: "Uttar Pradesh",
        base_consumption_mw: 16000.0,
        industrial_base: 0.65,
        districts: [
            district("Lucknow", 26.8467, 80.9462),
            district("Kanpur", 26.4499, 80.3319),
            district("Agra", 27.1767, 78.0081),
            district("Varanasi", 25.3176, 82.9739),
            district("Meerut", 28.9845, 77.7064),
        ],
    },
    StateProfile {
        name: "Haryana",
        base_consumption_mw: 6000.0,
        industrial_base: 0.75,
        districts: [
            district("Gurgaon", 28.4595, 77.0266),
            district("Faridabad", 28.4089, 77.3178),
            district("Panipat", 29.3909, 76.9635),
            district("Ambala", 30.3782, 76.7767),
            district("Hisar", 29.1492, 75.7217),
        ],
    },
    StateProfile {
        name: "Punjab",
        base_consumption_mw: 7000.0,
        industrial_base: 0.70,
        districts: [
            district("Ludhiana", 30.9010, 75.8573),
            district("Amritsar", 31.6340, 74.8723),
            district("Jalandhar", 31.3260, 75.5762),
            district("Patiala", 30.3398, 76.3869),
            district("Bathinda", 30.2110, 74.9455),
        ],
    },
    StateProfile {
        name: "Delhi",
        base_consumption_mw: 5000.0,
        industrial_base: 0.55,
        districts: [
            district("New Delhi", 28.6139, 77.2090),
            district("Central Delhi", 28.6542, 77.2373),
            district("South Delhi", 28.5355, 77.2683),
            district("North Delhi", 28.7041, 77.1025),
            district("East Delhi", 28.6508, 77.3152),
        ],
    },
];

/// All states in roster order
pub fn states() -> &'static [StateProfile] {
    &STATES
}

pub fn find_state(name: &str) -> Option<&'static StateProfile> {
    STATES.iter().find(|s| s.name == name)
}

pub fn find_district(state: &str, district: &str) -> Option<&'static DistrictProfile> {
    find_state(state)?.districts.iter().find(|d| d.name == district)
}

/// Weather lookup point for a location.
///
/// Unknown districts resolve to the state's first district; unknown states
/// have no coordinates.
pub fn coordinates(state: &str, district: &str) -> Option<(f64, f64)> {
    let profile = find_state(state)?;
    let point = profile
        .districts
        .iter()
        .find(|d| d.name == district)
        .unwrap_or(&profile.districts[0]);
    Some((point.latitude, point.longitude))
}

pub fn industrial_base(state: &str) -> f64 {
    find_state(state)
        .map(|s| s.industrial_base)
        .unwrap_or(DEFAULT_INDUSTRIAL_BASE)
}

/// State name to district names, as served to clients
pub fn district_map() -> BTreeMap<&'static str, Vec<&'static str>> {
    STATES
        .iter()
        .map(|s| (s.name, s.districts.iter().map(|d| d.name).collect()))
        .collect()
}
