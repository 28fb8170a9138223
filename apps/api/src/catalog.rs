//! Service category catalog: the closed set of 311 categories a request may carry.
//!
//! The set is fixed at compile time. Serde uses the human-readable name, so a
//! payload naming a category outside the catalog fails to deserialize.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "Outdoor Dining")]
    OutdoorDining,
    #[serde(rename = "Streetlights")]
    Streetlights,
    #[serde(rename = "Litter")]
    Litter,
    #[serde(rename = "Broken Park Equipment")]
    BrokenParkEquipment,
    #[serde(rename = "Damaged Sign")]
    DamagedSign,
    #[serde(rename = "New Tree Requests")]
    NewTreeRequests,
    #[serde(rename = "Abandoned Bicycle")]
    AbandonedBicycle,
    #[serde(rename = "Other")]
    Other,
    #[serde(rename = "Needle Cleanup")]
    NeedleCleanup,
    #[serde(rename = "Park Lights")]
    ParkLights,
    #[serde(rename = "Residential Trash out Illegally")]
    ResidentialTrashOutIllegally,
    #[serde(rename = "Abandoned Vehicle")]
    AbandonedVehicle,
    #[serde(rename = "Pothole")]
    Pothole,
    #[serde(rename = "Dead Animal Pickup")]
    DeadAnimalPickup,
    #[serde(rename = "Short Term Rental")]
    ShortTermRental,
    #[serde(rename = "Broken Sidewalk")]
    BrokenSidewalk,
    #[serde(rename = "Illegal Parking")]
    IllegalParking,
    #[serde(rename = "Traffic Signal")]
    TrafficSignal,
    #[serde(rename = "Dead Tree Removal")]
    DeadTreeRemoval,
    #[serde(rename = "Tree Pruning")]
    TreePruning,
    #[serde(rename = "Overflowing Trash Can")]
    OverflowingTrashCan,
    #[serde(rename = "Rodent Sighting")]
    RodentSighting,
    #[serde(rename = "Illegal Graffiti")]
    IllegalGraffiti,
    #[serde(rename = "Requests for Street Cleaning")]
    RequestsForStreetCleaning,
}

/// Catalog order. Prompts list categories in this order.
const CATALOG: &[(ServiceCategory, &str, &str)] = &[
    (
        ServiceCategory::OutdoorDining,
        "Outdoor Dining",
        "Issues related to outdoor dining areas and equipment",
    ),
    (
        ServiceCategory::Streetlights,
        "Streetlights",
        "Problems with street lighting, outages, or damaged lights",
    ),
    (
        ServiceCategory::Litter,
        "Litter",
        "General litter and debris on streets or public areas",
    ),
    (
        ServiceCategory::BrokenParkEquipment,
        "Broken Park Equipment",
        "Damaged or malfunctioning park equipment",
    ),
    (
        ServiceCategory::DamagedSign,
        "Damaged Sign",
        "Street signs that are damaged, missing, or need repair",
    ),
    (
        ServiceCategory::NewTreeRequests,
        "New Tree Requests",
        "Requests for new tree plantings",
    ),
    (
        ServiceCategory::AbandonedBicycle,
        "Abandoned Bicycle",
        "Bicycles left unattended for extended periods",
    ),
    (
        ServiceCategory::Other,
        "Other",
        "General requests not fitting other categories",
    ),
    (
        ServiceCategory::NeedleCleanup,
        "Needle Cleanup",
        "Requests for removal of needles from public spaces",
    ),
    (
        ServiceCategory::ParkLights,
        "Park Lights",
        "Issues with lighting in parks",
    ),
    (
        ServiceCategory::ResidentialTrashOutIllegally,
        "Residential Trash out Illegally",
        "Improper disposal of residential trash",
    ),
    (
        ServiceCategory::AbandonedVehicle,
        "Abandoned Vehicle",
        "Vehicles left unmoved/unclaimed for extended periods (typically 48+ hours)",
    ),
    (
        ServiceCategory::Pothole,
        "Pothole",
        "Road surface damage creating holes or depressions",
    ),
    (
        ServiceCategory::DeadAnimalPickup,
        "Dead Animal Pickup",
        "Removal of deceased animals from public spaces",
    ),
    (
        ServiceCategory::ShortTermRental,
        "Short Term Rental",
        "Issues related to short-term rental properties",
    ),
    (
        ServiceCategory::BrokenSidewalk,
        "Broken Sidewalk",
        "Damaged or hazardous sidewalk conditions",
    ),
    (
        ServiceCategory::IllegalParking,
        "Illegal Parking",
        "Vehicles parked in violation of regulations (blocking access, bus lanes, fire hydrants, etc.)",
    ),
    (
        ServiceCategory::TrafficSignal,
        "Traffic Signal",
        "Malfunctioning or damaged traffic signals",
    ),
    (
        ServiceCategory::DeadTreeRemoval,
        "Dead Tree Removal",
        "Removal of dead or hazardous trees",
    ),
    (
        ServiceCategory::TreePruning,
        "Tree Pruning",
        "Requests for tree maintenance and pruning",
    ),
    (
        ServiceCategory::OverflowingTrashCan,
        "Overflowing Trash Can",
        "Public trash receptacles that need emptying",
    ),
    (
        ServiceCategory::RodentSighting,
        "Rodent Sighting",
        "Reports of rodent activity",
    ),
    (
        ServiceCategory::IllegalGraffiti,
        "Illegal Graffiti",
        "Unauthorized markings on public or private property",
    ),
    (
        ServiceCategory::RequestsForStreetCleaning,
        "Requests for Street Cleaning",
        "Public trash on street or sidewalk that needs to be cleaned",
    ),
];

/// Category names in catalog order. Used as the allowed values of enumerated schema fields.
pub const CATEGORY_NAMES: &[&str] = &[
    "Outdoor Dining",
    "Streetlights",
    "Litter",
    "Broken Park Equipment",
    "Damaged Sign",
    "New Tree Requests",
    "Abandoned Bicycle",
    "Other",
    "Needle Cleanup",
    "Park Lights",
    "Residential Trash out Illegally",
    "Abandoned Vehicle",
    "Pothole",
    "Dead Animal Pickup",
    "Short Term Rental",
    "Broken Sidewalk",
    "Illegal Parking",
    "Traffic Signal",
    "Dead Tree Removal",
    "Tree Pruning",
    "Overflowing Trash Can",
    "Rodent Sighting",
    "Illegal Graffiti",
    "Requests for Street Cleaning",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a known service category")]
pub struct UnknownCategory(pub String);

impl ServiceCategory {
    pub fn all() -> impl Iterator<Item = ServiceCategory> {
        CATALOG.iter().map(|(category, _, _)| *category)
    }

    pub fn name(self) -> &'static str {
        self.entry().1
    }

    /// Human-readable definition used to disambiguate similar categories.
    pub fn definition(self) -> &'static str {
        self.entry().2
    }

    // CATALOG is indexed by discriminant: variants are declared in catalog order.
    fn entry(self) -> &'static (ServiceCategory, &'static str, &'static str) {
        &CATALOG[self as usize]
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(category, _, _)| *category)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Renders the catalog as `- name: definition` lines for prompt embedding.
pub fn catalog_definitions() -> String {
    CATALOG
        .iter()
        .map(|(_, name, definition)| format!("- {name}: {definition}"))
        .collect::<Vec<_>>()
        .join("\n")
}
