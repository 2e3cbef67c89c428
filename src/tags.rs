//! Tag vocabulary and the ordered, duplicate-free tag set.
//!
//! Tags are opaque strings; the prefix names the namespace. Parameterised tags
//! (`INFO_ROAD_FRONTAGE_FT:120`) carry their value after a colon.
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RISK_DATA_INCOMPLETE: &str = "RISK_DATA_INCOMPLETE";
pub const RISK_NOT_SUBDIVIDABLE: &str = "RISK_NOT_SUBDIVIDABLE";

pub const RISK_STREAM_BUFFER_IMPACT: &str = "RISK_STREAM_BUFFER_IMPACT";
pub const RISK_WETLAND_PRESENT: &str = "RISK_WETLAND_PRESENT";
pub const RISK_WETLAND_BUFFER_IMPACT: &str = "RISK_WETLAND_BUFFER_IMPACT";
pub const RISK_FEMA_100YR_FLOOD: &str = "RISK_FEMA_100YR_FLOOD";
pub const INFO_FEMA_500YR_FLOOD: &str = "INFO_FEMA_500YR_FLOOD";
pub const RISK_ENTIRE_PARCEL_FLOODPLAIN: &str = "RISK_ENTIRE_PARCEL_FLOODPLAIN";
pub const RISK_STEEP_SLOPE_33PCT: &str = "RISK_STEEP_SLOPE_33PCT";
pub const RISK_EROSION_HAZARD_15PCT: &str = "RISK_EROSION_HAZARD_15PCT";
pub const INFO_SLOPE_CONSTRAINT: &str = "INFO_SLOPE_CONSTRAINT";
pub const RISK_LANDSLIDE_HAZARD: &str = "RISK_LANDSLIDE_HAZARD";
pub const RISK_LIQUEFACTION: &str = "RISK_LIQUEFACTION";
pub const RISK_LAHAR_ZONE: &str = "RISK_LAHAR_ZONE";
pub const RISK_GEOLOGIC_HAZARD: &str = "RISK_GEOLOGIC_HAZARD";
pub const INFO_SOIL_TYPE: &str = "INFO_SOIL_TYPE";
pub const RISK_POOR_SOIL_DRAINAGE: &str = "RISK_POOR_SOIL_DRAINAGE";
pub const RISK_SEPTIC_LIMITATION: &str = "RISK_SEPTIC_LIMITATION";
pub const INFO_PUBLIC_WATER_AVAILABLE: &str = "INFO_PUBLIC_WATER_AVAILABLE";
pub const RISK_WELL_REQUIRED: &str = "RISK_WELL_REQUIRED";
pub const INFO_PUBLIC_SEWER_AVAILABLE: &str = "INFO_PUBLIC_SEWER_AVAILABLE";
pub const RISK_SEPTIC_REQUIRED: &str = "RISK_SEPTIC_REQUIRED";
pub const RISK_INSUFFICIENT_FRONTAGE: &str = "RISK_INSUFFICIENT_FRONTAGE";
pub const INFO_FLAG_LOT_CANDIDATE: &str = "INFO_FLAG_LOT_CANDIDATE";
pub const INFO_ROAD_FRONTAGE_FT: &str = "INFO_ROAD_FRONTAGE_FT";
pub const INFO_FLU_DESIGNATION: &str = "INFO_FLU_DESIGNATION";
pub const INFO_FLU_ZONING_MISMATCH: &str = "INFO_FLU_ZONING_MISMATCH";
pub const RISK_SHORELINE_JURISDICTION: &str = "RISK_SHORELINE_JURISDICTION";

pub const INFO_SHORT_PLAT: &str = "INFO_SHORT_PLAT";
pub const INFO_FORMAL_SUBDIVISION: &str = "INFO_FORMAL_SUBDIVISION";
pub const RISK_STORMWATER_CONSTRAINED: &str = "RISK_STORMWATER_CONSTRAINED";
pub const RISK_DRIVEWAY_STEEP: &str = "RISK_DRIVEWAY_STEEP";
pub const RISK_DRIVEWAY_INFEASIBLE: &str = "RISK_DRIVEWAY_INFEASIBLE";
pub const INFO_DRIVEWAY_LENGTH: &str = "INFO_DRIVEWAY_LENGTH";
pub const RISK_TIGHT_BUILDING_ENVELOPE: &str = "RISK_TIGHT_BUILDING_ENVELOPE";

pub const SCORE_SUBDIVISION_FEASIBILITY: &str = "SCORE_SUBDIVISION_FEASIBILITY";
pub const SCORE_BEST_LAYOUT: &str = "SCORE_BEST_LAYOUT";

/// Build a parameterised tag such as `INFO_ROAD_FRONTAGE_FT:120`.
pub fn with_value(tag: &str, value: impl fmt::Display) -> String {
    format!("{tag}:{value}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagNamespace {
    Risk,
    Info,
    Edge,
    Score,
}

impl TagNamespace {
    pub fn of(tag: &str) -> Option<Self> {
        if tag.starts_with("RISK_") {
            Some(TagNamespace::Risk)
        } else if tag.starts_with("INFO_") {
            Some(TagNamespace::Info)
        } else if tag.starts_with("EDGE_") {
            Some(TagNamespace::Edge)
        } else if tag.starts_with("SCORE_") {
            Some(TagNamespace::Score)
        } else {
            None
        }
    }
}

/// Insertion-ordered tag list that suppresses duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag; returns false when it was already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn extend<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|existing| existing == tag)
    }

    pub fn any_with_prefix(&self, prefix: &str) -> bool {
        self.0.iter().any(|tag| tag.starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
