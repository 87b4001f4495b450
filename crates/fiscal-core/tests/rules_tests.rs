use chrono::NaiveDate;
use fiscal_core::rules::migration::{
    detect_version, migrate_catalog, migrate_catalog_with_warnings, PRECIOUS_METALS_ID,
};
use fiscal_core::rules::catalog::Holders;
use fiscal_core::rules::resolver::{PRODUCT_ASSURANCE_VIE, PRODUCT_CTO};
use fiscal_core::rules::{
    extract_params, load_catalog, migrate_to_latest, FieldDef, FiscalParams, Phase, RuleRef,
    LATEST_SCHEMA_VERSION,
};
use fiscal_core::settings::{PsSettings, TaxSettings};
use fiscal_core::FiscalError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn v2_catalog() -> Value {
    json!({
        "schema_version": 2,
        "products": [
            {
                "id": "assuranceVie",
                "label": "Assurance-vie",
                "rulesets": [
                    {
                        "effective_date": "2017-09-27",
                        "blocks": [
                            {"id": "rachat", "phase": "sortie", "fields": {
                                "taux_reduit": {"type": "number", "value": "7.5"},
                                "abattement_single": {"type": "number", "value": "4600"}
                            }},
                            {"id": "deces", "phase": "deces", "fields": {
                                "taux_990i_1": {"type": "ref", "value": "$ref:tax_settings.assurance_vie_death.taux_990i_1"}
                            }}
                        ]
                    },
                    {
                        "effective_date": "1998-01-01",
                        "blocks": [
                            {"id": "rachat", "phase": "sortie", "fields": {
                                "taux_reduit": {"type": "number", "value": "7.5"},
                                "abattement_single": {"type": "number", "value": "3000"}
                            }}
                        ]
                    }
                ]
            },
            {
                "id": "cto",
                "label": "Compte-titres",
                "rulesets": [
                    {"effective_date": "2018-01-01", "blocks": [
                        {"id": "pfu", "phase": "sortie", "fields": {
                            "taux_pfu_ir": {"type": "ref", "value": "$ref:tax_settings.pfu.current.rate_ir"},
                            "option": {"type": "enum", "value": "pfu", "options": ["pfu", "bareme"]}
                        }}
                    ]}
                ]
            }
        ]
    })
}

// ===========================================================================
// Migration into the current schema
// ===========================================================================

#[test]
fn test_v2_catalog_migrates_with_phases() {
    assert_eq!(detect_version(&v2_catalog()), Some(2));
    let catalog = migrate_catalog(v2_catalog()).unwrap();
    assert_eq!(catalog.schema_version, LATEST_SCHEMA_VERSION);

    let av = catalog.active_product(PRODUCT_ASSURANCE_VIE).unwrap();
    assert_eq!(av.rulesets.len(), 2);
    assert_eq!(av.rulesets[0].effective_date, date(2017, 9, 27));
    assert_eq!(
        av.rulesets[0].field(Phase::Sortie, "abattement_single"),
        Some(&FieldDef::Number { value: dec!(4600) })
    );
    assert!(av.rulesets[0].field(Phase::Deces, "taux_990i_1").is_some());
    assert!(av.rulesets[0].field(Phase::Constitution, "taux_reduit").is_none());
}

#[test]
fn test_migrated_catalog_is_fixed_point() {
    let once = migrate_to_latest(v2_catalog());
    assert_eq!(once["schema_version"], json!(LATEST_SCHEMA_VERSION));
    assert_eq!(migrate_to_latest(once.clone()), once);
}

#[test]
fn test_bad_reference_rejected_at_load() {
    let mut value = v2_catalog();
    value["products"][1]["rulesets"][0]["blocks"][0]["fields"]["taux_pfu_ir"]["value"] =
        json!("$ref:other_table.pfu");
    let err = load_catalog(value).unwrap_err();
    assert!(matches!(
        err,
        FiscalError::Migration { from_version: 2, .. }
    ));
}

#[test]
fn test_metal_merge_keeps_fields_of_every_metal() {
    let value = json!({
        "schema_version": 3,
        "products": [
            {"id": "or", "label": "Or", "rulesets": [{
                "effective_date": "2020-01-01",
                "phases": {"sortie": [{"id": "fisc", "fields": {
                    "taux_forfait": {"type": "number", "value": "11.5"}
                }}]}
            }]},
            {"id": "argent", "label": "Argent", "rulesets": [{
                "effective_date": "2020-01-01",
                "phases": {"sortie": [{"id": "fisc", "fields": {
                    "taux_forfait": {"type": "number", "value": "11.5"},
                    "taux_plus_value": {"type": "number", "value": "36.2"}
                }}]}
            }]}
        ]
    });
    let (catalog, warnings) = migrate_catalog_with_warnings(value).unwrap();
    assert!(warnings.is_empty());
    let metals = catalog.active_product(PRECIOUS_METALS_ID).unwrap();
    let fields: Vec<_> = metals.rulesets[0].phases.sortie[0].fields.keys().cloned().collect();
    assert_eq!(fields, vec!["taux_forfait", "taux_plus_value"]);
    assert_eq!(
        metals.rulesets[0].field(Phase::Sortie, "taux_plus_value"),
        Some(&FieldDef::Number { value: dec!(36.2) })
    );
}

#[test]
fn test_metal_merge_conflict_reported() {
    let value = json!({
        "schema_version": 3,
        "products": [
            {"id": "argent", "rulesets": [{
                "effective_date": "2020-01-01",
                "phases": {"sortie": [{"id": "fisc", "fields": {
                    "taux_forfait": {"type": "number", "value": "11.5"}
                }}]}
            }]},
            {"id": "metaux_autres", "rulesets": [{
                "effective_date": "2020-01-01",
                "phases": {"sortie": [{"id": "fisc", "fields": {
                    "taux_forfait": {"type": "number", "value": "10"},
                    "frais": {"type": "number", "value": "1"}
                }}]}
            }]}
        ]
    });
    let (catalog, warnings) = migrate_catalog_with_warnings(value).unwrap();
    let metals = catalog.active_product(PRECIOUS_METALS_ID).unwrap();
    let rs = &metals.rulesets[0];
    assert_eq!(
        rs.field(Phase::Sortie, "taux_forfait"),
        Some(&FieldDef::Number { value: dec!(11.5) })
    );
    assert_eq!(rs.field(Phase::Sortie, "frais"), Some(&FieldDef::Number { value: dec!(1) }));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("fisc.taux_forfait"));
    assert!(warnings[0].contains("metaux_autres"));
}

#[test]
fn test_dual_holder_product_split_keeps_rules() {
    let value = json!({
        "schema_version": 4,
        "products": [{
            "id": "scpi", "label": "SCPI", "holders": "pp_pm",
            "rulesets": [{
                "effective_date": "2021-01-01",
                "phases": {"sortie": [{"id": "pv", "fields": {
                    "taux_pv_ir": {"type": "number", "value": "19"}
                }}]}
            }]
        }]
    });
    let catalog = migrate_catalog(value).unwrap();
    let split: Vec<_> = catalog
        .products
        .iter()
        .map(|p| (p.id.as_str(), p.holders))
        .collect();
    assert_eq!(split, vec![("scpi_pp", Holders::Pp), ("scpi_pm", Holders::Pm)]);
    for product in &catalog.products {
        assert_eq!(
            product.rulesets[0].field(Phase::Sortie, "taux_pv_ir"),
            Some(&FieldDef::Number { value: dec!(19) })
        );
    }
}

#[test]
fn test_unsorted_latest_catalog_uses_newest_ruleset() {
    let value = json!({
        "schema_version": 5,
        "products": [{"id": "cto", "rulesets": [
            {"effective_date": "2013-01-01", "phases": {"sortie": [{"id": "pfu", "fields": {
                "taux_pfu_ir": {"type": "number", "value": "24"}
            }}]}},
            {"effective_date": "2018-01-01", "phases": {"sortie": [{"id": "pfu", "fields": {
                "taux_pfu_ir": {"type": "number", "value": "12.8"}
            }}]}}
        ]}]
    });
    let catalog = load_catalog(value).unwrap();
    assert_eq!(catalog.products[0].rulesets[0].effective_date, date(2018, 1, 1));

    let tax = TaxSettings::default();
    let ps = PsSettings::default();
    let now = extract_params(&catalog, &tax, &ps, None).unwrap();
    assert_eq!(now.result.pfu_rate_ir, dec!(0.128));
    let then = extract_params(&catalog, &tax, &ps, Some(date(2015, 1, 1))).unwrap();
    assert_eq!(then.result.pfu_rate_ir, dec!(0.24));
}

#[test]
fn test_rule_ref_round_trip_text() {
    let r: RuleRef = "$ref:ps_settings.patrimony.current.total_rate".parse().unwrap();
    assert_eq!(r.path_segments(), vec!["patrimony", "current", "total_rate"]);
    assert_eq!(r.to_string(), "$ref:ps_settings.patrimony.current.total_rate");
    assert!("ps_settings.patrimony".parse::<RuleRef>().is_err());
    assert!("$ref:tax_settings".parse::<RuleRef>().is_err());
}

// ===========================================================================
// Parameter extraction
// ===========================================================================

#[test]
fn test_extract_params_from_migrated_catalog() {
    let catalog = load_catalog(v2_catalog()).unwrap();
    let tax = TaxSettings::default();
    let ps = PsSettings::default();

    let now = extract_params(&catalog, &tax, &ps, None).unwrap();
    assert_eq!(now.result.av_abattement_single, dec!(4600));
    assert_eq!(now.result.av_taux_reduit, dec!(0.075));
    assert_eq!(now.result.pfu_rate_ir, dec!(0.128));
    // per, pea and scpi are absent from the catalog
    assert_eq!(now.warnings.len(), 3);

    let then = extract_params(&catalog, &tax, &ps, Some(date(2005, 1, 1))).unwrap();
    assert_eq!(then.result.av_abattement_single, dec!(3000));
    assert!(then
        .warnings
        .iter()
        .any(|w| w.contains(PRODUCT_CTO) && w.contains("no ruleset")));
}

#[test]
fn test_settings_change_flows_through_references() {
    let catalog = load_catalog(v2_catalog()).unwrap();
    let mut tax = TaxSettings::default();
    tax.pfu.current.rate_ir = dec!(15);
    let out = extract_params(&catalog, &tax, &PsSettings::default(), None).unwrap();
    assert_eq!(out.result.pfu_rate_ir, dec!(0.15));
    assert_ne!(out.result, FiscalParams::default());
}

#[test]
fn test_new_version_must_be_newer() {
    let mut catalog = load_catalog(v2_catalog()).unwrap();
    let av = catalog.product_mut(PRODUCT_ASSURANCE_VIE).unwrap();
    assert!(av.create_version(date(2010, 1, 1)).is_err());
    let created = av.create_version(date(2025, 1, 1)).unwrap();
    assert_eq!(created.effective_date, date(2025, 1, 1));
    assert_eq!(
        created.field(Phase::Sortie, "abattement_single"),
        Some(&FieldDef::Number { value: dec!(4600) })
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn migration_is_idempotent_for_any_rate(rate in 0u32..10_000, single in 0u32..100_000) {
        let mut value = v2_catalog();
        value["products"][0]["rulesets"][0]["blocks"][0]["fields"]["taux_reduit"]["value"] =
            json!(format!("{}", rate as f64 / 100.0));
        value["products"][0]["rulesets"][0]["blocks"][0]["fields"]["abattement_single"]["value"] =
            json!(single.to_string());
        let once = migrate_to_latest(value);
        let twice = migrate_to_latest(once.clone());
        prop_assert_eq!(&once, &twice);
        prop_assert!(load_catalog(once).is_ok());
    }
}
