use super::{
    apply_env_overrides, cost_slot, load_config, read_config, validate_config, weight_slot,
    write_config, CostRates, FeasibilityConfig, ScoringWeights, ZoningRule, ZoningRuleRecord,
    COST_OVERRIDES, UNBOUNDED_MIN_LOT_SQFT, WEIGHT_OVERRIDES,
};
use std::collections::BTreeMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config: FeasibilityConfig =
        serde_json::from_str(r#"{"schema_version": 1, "county": "snohomish"}"#)
            .expect("parse partial config");
    assert_eq!(config, FeasibilityConfig::default());
    validate_config(&config).expect("defaults validate");
}

#[test]
fn stub_round_trips_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("pfeas.json");
    write_config(&path, &FeasibilityConfig::default()).expect("write config");
    let loaded = read_config(&path).expect("read config");
    assert_eq!(loaded, FeasibilityConfig::default());

    let stub = std::fs::read_to_string(&path).expect("read stub");
    assert!(stub.contains("\"zoning_rules\""));
    assert!(stub.contains("\"short_plat_bonus\""));
}

#[test]
fn unknown_zone_code_has_no_rule_and_default_rule_is_unsubdividable() {
    let config = FeasibilityConfig::default();
    assert!(config.zoning_rule("R-7200").is_some());
    assert!(config.zoning_rule("r-7200").is_some());
    assert!(config.zoning_rule("MUGA-9").is_none());

    let fallback = ZoningRule::default();
    assert_eq!(fallback.min_lot_sqft, UNBOUNDED_MIN_LOT_SQFT);
    assert_eq!(fallback.max_setback(), 25.0);
    assert_eq!(fallback.max_lot_coverage_pct, 0.35);
}

#[test]
fn rules_for_other_counties_are_ignored() {
    let mut config = FeasibilityConfig::default();
    config.zoning_rules.push(ZoningRuleRecord {
        county: "king".to_string(),
        zone_code: "RA-5".to_string(),
        rule: ZoningRule {
            min_lot_sqft: 217_800.0,
            ..ZoningRule::default()
        },
    });
    assert!(config.zoning_rule("RA-5").is_none());
    config.county = "King".to_string();
    assert!(config.zoning_rule("RA-5").is_some());
}

#[test]
fn rejects_wrong_schema_and_bad_ranges() {
    let mut config = FeasibilityConfig::default();
    config.schema_version = 2;
    assert!(validate_config(&config).is_err());

    let mut config = FeasibilityConfig::default();
    config.zoning_rules[0].rule.max_lot_coverage_pct = 35.0;
    let err = validate_config(&config).expect_err("percent coverage rejected");
    assert!(err.to_string().contains("max_lot_coverage_pct"));

    let mut config = FeasibilityConfig::default();
    config.buffers.flood_ft = -5.0;
    assert!(validate_config(&config).is_err());

    let mut config = FeasibilityConfig::default();
    let duplicate = config.zoning_rules[0].clone();
    config.zoning_rules.push(duplicate);
    let err = validate_config(&config).expect_err("duplicate rejected");
    assert!(err.to_string().contains("duplicate zoning rule"));

    let mut config = FeasibilityConfig::default();
    config.client.max_attempts = 0;
    assert!(validate_config(&config).is_err());
}

#[test]
fn env_overrides_apply_weights_costs_and_offline() {
    let mut config = FeasibilityConfig::default();
    apply_env_overrides(
        &mut config,
        env_from(&[
            ("PFEAS_OFFLINE", "true"),
            ("FEAS_LOT_COUNT", "40"),
            ("FEAS_SHORT_PLAT_BONUS", "0"),
            ("FEAS_COST_ROAD_PER_FT", "300.5"),
        ]),
    )
    .expect("apply overrides");
    assert!(config.client.offline);
    assert_eq!(config.scoring.lot_count, 40.0);
    assert_eq!(config.scoring.short_plat_bonus, 0.0);
    assert_eq!(config.scoring.driveway_penalty, -20.0);
    assert_eq!(config.costs.road_per_ft, 300.5);
    assert_eq!(config.costs.utility_per_lot, 18_000.0);
}

#[test]
fn every_override_name_targets_its_own_field() {
    let mut weights = ScoringWeights::default();
    for (i, name) in WEIGHT_OVERRIDES.iter().enumerate() {
        *weight_slot(&mut weights, name).expect("known weight") = i as f64;
    }
    assert_eq!(
        [
            weights.lot_count,
            weights.constraint_penalty,
            weights.driveway_penalty,
            weights.envelope_penalty,
            weights.short_plat_bonus,
        ],
        [0.0, 1.0, 2.0, 3.0, 4.0]
    );
    assert!(weight_slot(&mut weights, "lot_size").is_none());

    let mut costs = CostRates::default();
    for (i, name) in COST_OVERRIDES.iter().enumerate() {
        *cost_slot(&mut costs, name).expect("known rate") = i as f64;
    }
    assert_eq!(
        [
            costs.survey_engineering,
            costs.plat_application,
            costs.road_per_ft,
            costs.utility_per_lot,
            costs.stormwater_base,
            costs.clearing_per_acre,
        ],
        [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
    );
    assert!(cost_slot(&mut costs, "permit").is_none());
}

#[test]
fn unparseable_env_override_is_a_load_error() {
    let mut config = FeasibilityConfig::default();
    let err = apply_env_overrides(&mut config, env_from(&[("FEAS_COST_STORMWATER_BASE", "lots")]))
        .expect_err("bad number");
    assert!(err.to_string().contains("FEAS_COST_STORMWATER_BASE"));

    let err = apply_env_overrides(&mut config, env_from(&[("PFEAS_OFFLINE", "maybe")]))
        .expect_err("bad flag");
    assert!(err.to_string().contains("PFEAS_OFFLINE"));
}

#[test]
fn load_config_reports_parse_errors_with_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write broken config");
    let err = load_config(Some(&path)).expect_err("broken config");
    assert!(format!("{err:#}").contains("parse feasibility config JSON"));
}
