//! Feasibility configuration.
//!
//! This module loads, validates, and normalizes the run configuration so every
//! phase sees typed, already-checked values. Each section carries explicit
//! defaults; an absent file means "all defaults".
use crate::staging::write_atomic_text;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Minimum lot area used when no zoning rule applies; large enough that the
/// 2x check always fails.
pub const UNBOUNDED_MIN_LOT_SQFT: f64 = 999_999_999.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FeasibilityConfig {
    pub schema_version: u32,
    /// County whose zoning records apply to looked-up zone codes.
    pub county: String,
    pub services: ServiceEndpoints,
    pub zoning_rules: Vec<ZoningRuleRecord>,
    pub buffers: BufferRules,
    pub scoring: ScoringWeights,
    pub costs: CostRates,
    pub client: ClientSettings,
}

impl Default for FeasibilityConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            county: "snohomish".to_string(),
            services: ServiceEndpoints::default(),
            zoning_rules: default_zoning_rules(),
            buffers: BufferRules::default(),
            scoring: ScoringWeights::default(),
            costs: CostRates::default(),
            client: ClientSettings::default(),
        }
    }
}

impl FeasibilityConfig {
    /// Zoning rule for a zone code within the configured county.
    pub fn zoning_rule(&self, zone_code: &str) -> Option<ZoningRule> {
        self.zoning_rules
            .iter()
            .find(|record| {
                record.county.eq_ignore_ascii_case(&self.county)
                    && record.zone_code.eq_ignore_ascii_case(zone_code)
            })
            .map(|record| record.rule.clone())
    }
}

/// Dimensional standards for one zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoningRule {
    pub min_lot_sqft: f64,
    pub min_lot_width_ft: f64,
    pub setback_front_ft: f64,
    pub setback_side_ft: f64,
    pub setback_rear_ft: f64,
    /// Maximum building coverage as a fraction of lot area (0.35 = 35%).
    pub max_lot_coverage_pct: f64,
}

impl Default for ZoningRule {
    fn default() -> Self {
        Self {
            min_lot_sqft: UNBOUNDED_MIN_LOT_SQFT,
            min_lot_width_ft: 40.0,
            setback_front_ft: 25.0,
            setback_side_ft: 10.0,
            setback_rear_ft: 20.0,
            max_lot_coverage_pct: 0.35,
        }
    }
}

impl ZoningRule {
    pub fn max_setback(&self) -> f64 {
        self.setback_front_ft
            .max(self.setback_side_ft)
            .max(self.setback_rear_ft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoningRuleRecord {
    pub county: String,
    pub zone_code: String,
    #[serde(flatten)]
    pub rule: ZoningRule,
}

fn zoning_record(zone_code: &str, min_lot_sqft: f64, min_lot_width_ft: f64) -> ZoningRuleRecord {
    ZoningRuleRecord {
        county: "snohomish".to_string(),
        zone_code: zone_code.to_string(),
        rule: ZoningRule {
            min_lot_sqft,
            min_lot_width_ft,
            ..ZoningRule::default()
        },
    }
}

fn default_zoning_rules() -> Vec<ZoningRuleRecord> {
    vec![
        zoning_record("R-7200", 7_200.0, 60.0),
        zoning_record("R-8400", 8_400.0, 65.0),
        zoning_record("R-9600", 9_600.0, 70.0),
        zoning_record("R-20000", 20_000.0, 100.0),
        zoning_record("R-5", 217_800.0, 150.0),
    ]
}

/// A single layer of an ArcGIS-style map/feature service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerRef {
    pub url: String,
    pub layer: u32,
}

impl LayerRef {
    fn new(url: &str, layer: u32) -> Self {
        Self {
            url: url.to_string(),
            layer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParcelSource {
    pub url: String,
    pub layer: u32,
    pub parcel_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceEndpoints {
    /// Tried in order; the first non-empty match wins.
    pub parcel_sources: Vec<ParcelSource>,
    pub zoning: LayerRef,
    pub streams: LayerRef,
    pub streams_fallback: LayerRef,
    pub wetlands: LayerRef,
    pub flood: LayerRef,
    pub slope_image: String,
    pub landslide: LayerRef,
    pub ground_response: LayerRef,
    pub volcanic: LayerRef,
    pub soils_tabular: String,
    pub septic: LayerRef,
    pub water_districts: LayerRef,
    pub sewer_districts: LayerRef,
    pub roads: LayerRef,
    pub future_land_use: LayerRef,
    pub shoreline: LayerRef,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        let parcel = |url: &str| ParcelSource {
            url: url.to_string(),
            layer: 0,
            parcel_field: "Parcel_ID".to_string(),
        };
        let utility_districts =
            "https://gis.snoco.org/scd/rest/services/MapService/pds_utility_districts/MapServer";
        Self {
            parcel_sources: vec![
                parcel("https://gismaps.snoco.org/snocogis2/rest/services/cadastral/tax_parcels/MapServer"),
                parcel("https://gismaps.snoco.org/snocogis2/rest/services/planning/mp_ParcelLabels/MapServer"),
                parcel("https://gis.snoco.org/sas/rest/services/SCOPI/SCOPI_Labels_House_Number/MapServer"),
            ],
            zoning: LayerRef::new(
                "https://gismaps.snoco.org/snocogis2/rest/services/planning/mp_Zoning_OZ/MapServer",
                0,
            ),
            streams: LayerRef::new(
                "https://gismaps.snoco.org/snocogis/rest/services/hydrography/Watercourse/MapServer",
                0,
            ),
            streams_fallback: LayerRef::new(
                "https://hydro.nationalmap.gov/arcgis/rest/services/nhd/MapServer",
                6,
            ),
            wetlands: LayerRef::new(
                "https://fwspublicservices.wim.usgs.gov/wetlandsmapservice/rest/services/Wetlands/MapServer",
                0,
            ),
            flood: LayerRef::new(
                "https://hazards.fema.gov/gis/nfhl/rest/services/public/NFHL/MapServer",
                28,
            ),
            slope_image:
                "https://elevation.nationalmap.gov/arcgis/rest/services/3DEPElevation/ImageServer"
                    .to_string(),
            landslide: LayerRef::new(
                "https://gis.dnr.wa.gov/site1/rest/services/Public_Geology/Landslide_Inventory_Database/MapServer",
                0,
            ),
            ground_response: LayerRef::new(
                "https://gis.dnr.wa.gov/site1/rest/services/Public_Geology/Ground_Response/MapServer",
                0,
            ),
            volcanic: LayerRef::new(
                "https://gis.dnr.wa.gov/site1/rest/services/Public_Geology/Volcanic_Hazards/MapServer",
                0,
            ),
            soils_tabular: "https://SDMDataAccess.sc.egov.usda.gov/Tabular/post.rest".to_string(),
            septic: LayerRef::new(
                "https://gis.snoco.org/host/rest/services/Hosted/Septic_Parcels/FeatureServer",
                0,
            ),
            water_districts: LayerRef::new(utility_districts, 0),
            sewer_districts: LayerRef::new(utility_districts, 1),
            roads: LayerRef::new(
                "https://gismaps.snoco.org/snocogis2/rest/services/planning/mp_Transportation/MapServer",
                0,
            ),
            future_land_use: LayerRef::new(
                "https://gismaps.snoco.org/snocogis/rest/services/planning/mp_Future_Land_Use/MapServer",
                0,
            ),
            shoreline: LayerRef::new(
                "https://gismaps.snoco.org/snocogis/rest/services/planning/mp_ShorelineManagementProgram/MapServer",
                0,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StreamBuffers {
    /// Buffer per stream type code (e.g. `S`, `F`, `Np`).
    pub by_type: BTreeMap<String, f64>,
    pub default_ft: f64,
}

impl Default for StreamBuffers {
    fn default() -> Self {
        let by_type = [("S", 150.0), ("F", 100.0), ("Np", 50.0), ("Ns", 50.0)]
            .into_iter()
            .map(|(code, ft)| (code.to_string(), ft))
            .collect();
        Self {
            by_type,
            default_ft: 75.0,
        }
    }
}

impl StreamBuffers {
    pub fn for_type(&self, stream_type: &str) -> f64 {
        self.by_type
            .get(stream_type)
            .copied()
            .unwrap_or(self.default_ft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WetlandBuffers {
    pub category_i_ft: f64,
    pub category_ii_ft: f64,
    pub category_iii_ft: f64,
    pub category_iv_ft: f64,
}

impl Default for WetlandBuffers {
    fn default() -> Self {
        Self {
            category_i_ft: 150.0,
            category_ii_ft: 100.0,
            category_iii_ft: 75.0,
            category_iv_ft: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BufferRules {
    pub streams: StreamBuffers,
    pub wetlands: WetlandBuffers,
    pub flood_ft: f64,
    pub geology_ft: f64,
    pub shoreline_ft: f64,
}

impl Default for BufferRules {
    fn default() -> Self {
        Self {
            streams: StreamBuffers::default(),
            wetlands: WetlandBuffers::default(),
            flood_ft: 0.0,
            geology_ft: 0.0,
            shoreline_ft: 0.0,
        }
    }
}

/// Layout scoring weights. Penalties are negative and added as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringWeights {
    pub lot_count: f64,
    pub constraint_penalty: f64,
    pub driveway_penalty: f64,
    pub envelope_penalty: f64,
    pub short_plat_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            lot_count: 30.0,
            constraint_penalty: -30.0,
            driveway_penalty: -20.0,
            envelope_penalty: -20.0,
            short_plat_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CostRates {
    pub survey_engineering: f64,
    pub plat_application: f64,
    pub road_per_ft: f64,
    pub utility_per_lot: f64,
    pub stormwater_base: f64,
    pub clearing_per_acre: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            survey_engineering: 25_000.0,
            plat_application: 18_000.0,
            road_per_ft: 220.0,
            utility_per_lot: 18_000.0,
            stormwater_base: 60_000.0,
            clearing_per_acre: 22_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Serve every request from fixtures; never touch the network.
    pub offline: bool,
    pub fixtures_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Courtesy pause before every live request.
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            offline: false,
            fixtures_dir: None,
            cache_dir: None,
            request_delay_ms: 500,
            timeout_secs: 45,
            max_attempts: 3,
        }
    }
}

impl ClientSettings {
    pub fn resolved_fixtures_dir(&self) -> PathBuf {
        self.fixtures_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"))
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("pfeas")
                .join("feature_cache")
        })
    }
}

/// Build the default config used when no file is given.
pub fn default_config() -> FeasibilityConfig {
    FeasibilityConfig::default()
}

/// Load, apply environment overrides, and validate.
pub fn load_config(path: Option<&Path>) -> Result<FeasibilityConfig> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => default_config(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<FeasibilityConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: FeasibilityConfig =
        serde_json::from_slice(&bytes).context("parse feasibility config JSON")?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &FeasibilityConfig) -> Result<()> {
    let text = serde_json::to_string_pretty(config).context("serialize feasibility config")?;
    write_atomic_text(path, &text)
}

const WEIGHT_OVERRIDES: &[&str] = &[
    "lot_count",
    "constraint_penalty",
    "driveway_penalty",
    "envelope_penalty",
    "short_plat_bonus",
];

const COST_OVERRIDES: &[&str] = &[
    "survey_engineering",
    "plat_application",
    "road_per_ft",
    "utility_per_lot",
    "stormwater_base",
    "clearing_per_acre",
];

/// Apply `PFEAS_*` client overrides and `FEAS_*` weight/rate overrides.
pub fn apply_env_overrides<F>(config: &mut FeasibilityConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup("PFEAS_OFFLINE") {
        config.client.offline = parse_flag(&raw)
            .ok_or_else(|| anyhow!("PFEAS_OFFLINE must be true or false (got {raw:?})"))?;
    }
    if let Some(dir) = lookup("PFEAS_FIXTURES_DIR") {
        config.client.fixtures_dir = Some(PathBuf::from(dir));
    }
    if let Some(dir) = lookup("PFEAS_CACHE_DIR") {
        config.client.cache_dir = Some(PathBuf::from(dir));
    }
    for name in WEIGHT_OVERRIDES {
        let key = format!("FEAS_{}", name.to_ascii_uppercase());
        if let Some(raw) = lookup(&key) {
            let slot = weight_slot(&mut config.scoring, name)
                .ok_or_else(|| anyhow!("no scoring weight named {name}"))?;
            *slot = parse_number(&key, &raw)?;
        }
    }
    for name in COST_OVERRIDES {
        let key = format!("FEAS_COST_{}", name.to_ascii_uppercase());
        if let Some(raw) = lookup(&key) {
            let slot = cost_slot(&mut config.costs, name)
                .ok_or_else(|| anyhow!("no cost rate named {name}"))?;
            *slot = parse_number(&key, &raw)?;
        }
    }
    Ok(())
}

fn weight_slot<'a>(weights: &'a mut ScoringWeights, name: &str) -> Option<&'a mut f64> {
    match name {
        "lot_count" => Some(&mut weights.lot_count),
        "constraint_penalty" => Some(&mut weights.constraint_penalty),
        "driveway_penalty" => Some(&mut weights.driveway_penalty),
        "envelope_penalty" => Some(&mut weights.envelope_penalty),
        "short_plat_bonus" => Some(&mut weights.short_plat_bonus),
        _ => None,
    }
}

fn cost_slot<'a>(costs: &'a mut CostRates, name: &str) -> Option<&'a mut f64> {
    match name {
        "survey_engineering" => Some(&mut costs.survey_engineering),
        "plat_application" => Some(&mut costs.plat_application),
        "road_per_ft" => Some(&mut costs.road_per_ft),
        "utility_per_lot" => Some(&mut costs.utility_per_lot),
        "stormwater_base" => Some(&mut costs.stormwater_base),
        "clearing_per_acre" => Some(&mut costs.clearing_per_acre),
        _ => None,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

fn parse_number(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| anyhow!("{key} must be a finite number (got {raw:?})"))
}

/// Validate schema version and value ranges.
pub fn validate_config(config: &FeasibilityConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported feasibility config schema_version {}",
            config.schema_version
        ));
    }
    if config.county.trim().is_empty() {
        return Err(anyhow!("county must be non-empty"));
    }
    if config.services.parcel_sources.is_empty() {
        return Err(anyhow!("services.parcel_sources must list at least one source"));
    }
    let mut seen = BTreeSet::new();
    for record in &config.zoning_rules {
        let key = (
            record.county.to_ascii_lowercase(),
            record.zone_code.to_ascii_lowercase(),
        );
        if !seen.insert(key) {
            return Err(anyhow!(
                "duplicate zoning rule for {}/{}",
                record.county,
                record.zone_code
            ));
        }
        validate_rule(record)?;
    }
    let buffers = &config.buffers;
    let mut buffer_values = vec![
        ("buffers.streams.default_ft", buffers.streams.default_ft),
        ("buffers.wetlands.category_i_ft", buffers.wetlands.category_i_ft),
        ("buffers.wetlands.category_ii_ft", buffers.wetlands.category_ii_ft),
        ("buffers.wetlands.category_iii_ft", buffers.wetlands.category_iii_ft),
        ("buffers.wetlands.category_iv_ft", buffers.wetlands.category_iv_ft),
        ("buffers.flood_ft", buffers.flood_ft),
        ("buffers.geology_ft", buffers.geology_ft),
        ("buffers.shoreline_ft", buffers.shoreline_ft),
    ];
    buffer_values.extend(
        buffers
            .streams
            .by_type
            .values()
            .map(|ft| ("buffers.streams.by_type", *ft)),
    );
    for (label, value) in buffer_values {
        require_non_negative(label, value)?;
    }
    let costs = &config.costs;
    for (label, value) in [
        ("costs.survey_engineering", costs.survey_engineering),
        ("costs.plat_application", costs.plat_application),
        ("costs.road_per_ft", costs.road_per_ft),
        ("costs.utility_per_lot", costs.utility_per_lot),
        ("costs.stormwater_base", costs.stormwater_base),
        ("costs.clearing_per_acre", costs.clearing_per_acre),
    ] {
        require_non_negative(label, value)?;
    }
    let scoring = &config.scoring;
    for (label, value) in [
        ("scoring.lot_count", scoring.lot_count),
        ("scoring.constraint_penalty", scoring.constraint_penalty),
        ("scoring.driveway_penalty", scoring.driveway_penalty),
        ("scoring.envelope_penalty", scoring.envelope_penalty),
        ("scoring.short_plat_bonus", scoring.short_plat_bonus),
    ] {
        if !value.is_finite() {
            return Err(anyhow!("{label} must be finite"));
        }
    }
    if config.client.max_attempts == 0 {
        return Err(anyhow!("client.max_attempts must be at least 1"));
    }
    if config.client.timeout_secs == 0 {
        return Err(anyhow!("client.timeout_secs must be at least 1"));
    }
    Ok(())
}

fn validate_rule(record: &ZoningRuleRecord) -> Result<()> {
    let rule = &record.rule;
    let label = format!("zoning rule {}/{}", record.county, record.zone_code);
    if record.zone_code.trim().is_empty() {
        return Err(anyhow!("zoning rule zone_code must be non-empty"));
    }
    if !(rule.min_lot_sqft.is_finite() && rule.min_lot_sqft > 0.0) {
        return Err(anyhow!("{label}: min_lot_sqft must be positive"));
    }
    for (field, value) in [
        ("min_lot_width_ft", rule.min_lot_width_ft),
        ("setback_front_ft", rule.setback_front_ft),
        ("setback_side_ft", rule.setback_side_ft),
        ("setback_rear_ft", rule.setback_rear_ft),
    ] {
        require_non_negative(&format!("{label}: {field}"), value)?;
    }
    if !(rule.max_lot_coverage_pct > 0.0 && rule.max_lot_coverage_pct <= 1.0) {
        return Err(anyhow!(
            "{label}: max_lot_coverage_pct must be a fraction in (0, 1] (got {})",
            rule.max_lot_coverage_pct
        ));
    }
    Ok(())
}

fn require_non_negative(label: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        return Ok(());
    }
    Err(anyhow!("{label} must be a non-negative number (got {value})"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
