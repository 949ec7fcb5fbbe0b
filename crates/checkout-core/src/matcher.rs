//! # Rule Matcher
//!
//! Selects the applicable tax rate(s) and the single shipping module for a
//! delivery context.
//!
//! ## Tie-Break Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Candidate Ranking (first rule wins)                  │
//! │                                                                         │
//! │  0. Eligibility: active, same country (case-insensitive)                │
//! │                                                                         │
//! │  1. Specificity: exact zone/province match  >  country-wide (zone=None) │
//! │                                                                         │
//! │  2. Priority:    lowest `priority` value wins                           │
//! │                                                                         │
//! │  3. Position:    first in candidate order wins                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Priority Tiers
//! Stacked taxes (federal + provincial) are modelled as one rate per
//! priority tier. [`select_tax_rates`] picks the best candidate of each tier
//! by specificity then position:
//!
//! ```text
//! Delivery: CA / QC                    Delivery: CA / ON
//!   tier 1: GST (CA, *)   → GST          tier 1: GST (CA, *), HST (CA, ON) → HST
//!   tier 2: QST (CA, QC)  → QST          tier 2: QST (CA, QC)              → (none)
//! ```
//!
//! Matching never fails for tax: no candidate means zero tax.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::types::{Delivery, ShippingModule, ShippingRegion, TaxRate};

/// How closely a candidate's scope fits a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    /// Scope covers the whole country.
    Country,
    /// Scope names the delivery's zone or province.
    Zone,
}

fn scope_specificity(country: &str, zone: Option<&str>, delivery: &Delivery) -> Option<Specificity> {
    if !delivery.in_country(country) {
        return None;
    }

    match zone {
        None => Some(Specificity::Country),
        Some(z) if delivery.in_region(z) => Some(Specificity::Zone),
        Some(_) => None,
    }
}

// =============================================================================
// Tax Rates
// =============================================================================

/// Returns how a tax rate applies to a delivery, or `None` when it does not.
pub fn tax_rate_specificity(rate: &TaxRate, delivery: &Delivery) -> Option<Specificity> {
    if !rate.active {
        return None;
    }
    scope_specificity(&rate.country, rate.zone.as_deref(), delivery)
}

/// True when the rate's language scope admits `language`.
///
/// A rate without a language applies to every language. A language-scoped
/// rate needs a requested language that matches.
pub fn tax_rate_in_language(rate: &TaxRate, language: Option<&str>) -> bool {
    match (rate.language.as_deref(), language) {
        (None, _) => true,
        (Some(scoped), Some(requested)) => scoped.eq_ignore_ascii_case(requested),
        (Some(_), None) => false,
    }
}

/// Full scope check used by the rate table: active, country, zone, language.
pub fn tax_rate_in_scope(rate: &TaxRate, delivery: &Delivery, language: Option<&str>) -> bool {
    tax_rate_specificity(rate, delivery).is_some() && tax_rate_in_language(rate, language)
}

/// Selects the single best tax rate for a delivery.
///
/// Returns `None` when nothing applies; callers treat that as zero tax.
pub fn select_tax_rate<'a>(delivery: &Delivery, candidates: &'a [TaxRate]) -> Option<&'a TaxRate> {
    let selected = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, rate)| {
            tax_rate_specificity(rate, delivery).map(|spec| ((Reverse(spec), rate.priority, idx), rate))
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, rate)| rate);

    debug!(
        country = %delivery.country,
        zone = ?delivery.region(),
        candidates = candidates.len(),
        selected = ?selected.map(|r| r.code.as_str()),
        "Selected tax rate"
    );

    selected
}

/// Selects one tax rate per priority tier, lowest tier first.
///
/// Within a tier the best candidate wins by specificity then position. A rate
/// with a `parent` is only eligible once its parent was selected in an
/// earlier tier.
pub fn select_tax_rates<'a>(delivery: &Delivery, candidates: &'a [TaxRate]) -> Vec<&'a TaxRate> {
    let mut tiers: BTreeMap<i32, Vec<(usize, Specificity, &'a TaxRate)>> = BTreeMap::new();
    for (idx, rate) in candidates.iter().enumerate() {
        if let Some(spec) = tax_rate_specificity(rate, delivery) {
            tiers.entry(rate.priority).or_default().push((idx, spec, rate));
        }
    }

    let mut selected: Vec<&'a TaxRate> = Vec::with_capacity(tiers.len());
    for (priority, tier) in tiers {
        let winner = tier
            .into_iter()
            .filter(|(_, _, rate)| match rate.parent.as_deref() {
                None => true,
                Some(parent) => selected.iter().any(|s| s.code == parent),
            })
            .min_by_key(|(idx, spec, _)| (Reverse(*spec), *idx))
            .map(|(_, _, rate)| rate);

        if let Some(rate) = winner {
            debug!(priority, code = %rate.code, rate = %rate.rate, "Tax tier resolved");
            selected.push(rate);
        }
    }

    selected
}

// =============================================================================
// Shipping Modules
// =============================================================================

fn region_specificity(region: &ShippingRegion, delivery: &Delivery) -> Option<Specificity> {
    scope_specificity(&region.country, region.zone.as_deref(), delivery)
}

/// Returns how well a module serves a delivery (best of its regions).
pub fn module_specificity(module: &ShippingModule, delivery: &Delivery) -> Option<Specificity> {
    if !module.active {
        return None;
    }
    module
        .regions
        .iter()
        .filter_map(|region| region_specificity(region, delivery))
        .max()
}

/// Selects the shipping module for a delivery.
///
/// ## Behavior
/// - No candidates at all: `Ok(None)` (store does not charge shipping)
/// - `current` names a candidate that still serves the delivery: that module
/// - Otherwise the best candidate per the tie-break policy
/// - Candidates exist but none serves the delivery:
///   `Err(NoApplicableShippingMethod)`
pub fn select_shipping_module<'a>(
    delivery: &Delivery,
    candidates: &'a [ShippingModule],
    current: Option<&str>,
) -> CoreResult<Option<&'a ShippingModule>> {
    if candidates.is_empty() {
        return Ok(None);
    }

    if let Some(code) = current {
        let sticky = candidates
            .iter()
            .find(|m| m.code == code && module_specificity(m, delivery).is_some());
        if let Some(module) = sticky {
            debug!(code = %module.code, "Keeping current shipping module");
            return Ok(Some(module));
        }
        debug!(code = %code, "Current shipping module no longer applies");
    }

    let best = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, module)| {
            module_specificity(module, delivery)
                .map(|spec| ((Reverse(spec), module.priority, idx), module))
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, module)| module);

    match best {
        Some(module) => {
            debug!(code = %module.code, country = %delivery.country, "Selected shipping module");
            Ok(Some(module))
        }
        None => Err(CoreError::NoApplicableShippingMethod {
            country: delivery.country.clone(),
            zone: delivery.region().map(str::to_string),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RatePercent;
    use rust_decimal_macros::dec;

    fn rate(code: &str, zone: Option<&str>, priority: i32) -> TaxRate {
        let r = TaxRate::new("DEFAULT", code, "CA", RatePercent::new(dec!(5)).unwrap(), priority);
        match zone {
            Some(z) => r.in_zone(z),
            None => r,
        }
    }

    fn qc() -> Delivery {
        Delivery::new("CA").with_zone("QC")
    }

    #[test]
    fn test_exact_zone_beats_wildcard() {
        // Wildcard has the better priority but the zone match is more specific
        let candidates = vec![rate("CA-ALL", None, 1), rate("CA-QC", Some("QC"), 5)];
        let selected = select_tax_rate(&qc(), &candidates).unwrap();
        assert_eq!(selected.code, "CA-QC");
    }

    #[test]
    fn test_lowest_priority_among_exact_matches() {
        let candidates = vec![
            rate("QC-B", Some("QC"), 3),
            rate("QC-A", Some("QC"), 2),
            rate("CA-ALL", None, 1),
        ];
        assert_eq!(select_tax_rate(&qc(), &candidates).unwrap().code, "QC-A");
    }

    #[test]
    fn test_wildcard_when_no_zone_match() {
        let candidates = vec![
            rate("ON", Some("ON"), 1),
            rate("CA-2", None, 2),
            rate("CA-1", None, 1),
        ];
        assert_eq!(select_tax_rate(&qc(), &candidates).unwrap().code, "CA-1");
    }

    #[test]
    fn test_first_inserted_wins_full_tie() {
        let candidates = vec![rate("FIRST", Some("QC"), 1), rate("SECOND", Some("QC"), 1)];
        assert_eq!(select_tax_rate(&qc(), &candidates).unwrap().code, "FIRST");
    }

    #[test]
    fn test_no_rate_is_none() {
        let candidates = vec![rate("ON", Some("ON"), 1)];
        assert!(select_tax_rate(&qc(), &candidates).is_none());

        let us = Delivery::new("US").with_zone("NY");
        assert!(select_tax_rate(&us, &[rate("CA", None, 1)]).is_none());
        assert!(select_tax_rate(&qc(), &[]).is_none());
    }

    #[test]
    fn test_inactive_rate_is_skipped() {
        let candidates = vec![rate("OLD", Some("QC"), 1).inactive(), rate("CA", None, 1)];
        assert_eq!(select_tax_rate(&qc(), &candidates).unwrap().code, "CA");
    }

    #[test]
    fn test_province_name_matches_zone_scope() {
        let delivery = Delivery::new("ca").with_province("qc");
        let candidates = vec![rate("CA-QC", Some("QC"), 1)];
        assert!(select_tax_rate(&delivery, &candidates).is_some());
    }

    #[test]
    fn test_one_rate_per_tier() {
        let candidates = vec![
            rate("GST", None, 1),
            rate("HST", Some("ON"), 1),
            rate("QST", Some("QC"), 2),
        ];

        let codes: Vec<_> = select_tax_rates(&qc(), &candidates)
            .iter()
            .map(|r| r.code.as_str())
            .collect();
        assert_eq!(codes, vec!["GST", "QST"]);

        let on = Delivery::new("CA").with_zone("ON");
        let codes: Vec<_> = select_tax_rates(&on, &candidates)
            .iter()
            .map(|r| r.code.as_str())
            .collect();
        assert_eq!(codes, vec!["HST"]);
    }

    #[test]
    fn test_child_rate_requires_parent() {
        let candidates = vec![
            rate("GST", None, 1).inactive(),
            rate("SURTAX", Some("QC"), 2).with_parent("GST"),
        ];
        assert!(select_tax_rates(&qc(), &candidates).is_empty());

        let candidates = vec![
            rate("GST", None, 1),
            rate("SURTAX", Some("QC"), 2).with_parent("GST"),
        ];
        assert_eq!(select_tax_rates(&qc(), &candidates).len(), 2);
    }

    #[test]
    fn test_language_scope() {
        let fr_only = rate("QC-FR", Some("QC"), 1).for_language("fr");
        assert!(tax_rate_in_scope(&fr_only, &qc(), Some("FR")));
        assert!(!tax_rate_in_scope(&fr_only, &qc(), Some("en")));
        assert!(!tax_rate_in_scope(&fr_only, &qc(), None));
        assert!(tax_rate_in_scope(&rate("ANY", None, 1), &qc(), None));
    }

    fn module(code: &str, priority: i32, regions: Vec<ShippingRegion>) -> ShippingModule {
        ShippingModule::new(code, priority, regions)
    }

    fn modules() -> Vec<ShippingModule> {
        vec![
            module("CANADAPOST", 2, vec![ShippingRegion::country("CA")]),
            module("USPS", 1, vec![ShippingRegion::country("US")]),
            module("QC-COURIER", 5, vec![ShippingRegion::zone("CA", "QC")]),
            module("PUROLATOR", 1, vec![ShippingRegion::country("CA")]),
        ]
    }

    #[test]
    fn test_module_zone_specific_wins() {
        let mods = modules();
        let selected = select_shipping_module(&qc(), &mods, None).unwrap().unwrap();
        assert_eq!(selected.code, "QC-COURIER");
    }

    #[test]
    fn test_module_priority_then_position() {
        let on = Delivery::new("CA").with_zone("ON");
        let mods = modules();
        let selected = select_shipping_module(&on, &mods, None).unwrap().unwrap();
        assert_eq!(selected.code, "PUROLATOR");

        let us = Delivery::new("US");
        let mods = modules();
        let selected = select_shipping_module(&us, &mods, None).unwrap().unwrap();
        assert_eq!(selected.code, "USPS");
    }

    #[test]
    fn test_current_module_is_sticky() {
        let mods = modules();
        let selected = select_shipping_module(&qc(), &mods, Some("CANADAPOST"))
            .unwrap()
            .unwrap();
        assert_eq!(selected.code, "CANADAPOST");
    }

    #[test]
    fn test_invalid_current_module_falls_back() {
        let mods = modules();
        let selected = select_shipping_module(&qc(), &mods, Some("USPS"))
            .unwrap()
            .unwrap();
        assert_eq!(selected.code, "QC-COURIER");

        let mods = modules();
        let selected = select_shipping_module(&qc(), &mods, Some("GONE"))
            .unwrap()
            .unwrap();
        assert_eq!(selected.code, "QC-COURIER");
    }

    #[test]
    fn test_no_modules_is_none() {
        assert!(select_shipping_module(&qc(), &[], None).unwrap().is_none());
    }

    #[test]
    fn test_no_applicable_module_is_error() {
        let fr = Delivery::new("FR");
        let mods = modules();
        let result = select_shipping_module(&fr, &mods, None);
        assert!(matches!(
            result,
            Err(CoreError::NoApplicableShippingMethod { ref country, .. }) if country == "FR"
        ));
    }

    #[test]
    fn test_inactive_module_does_not_apply() {
        let only = vec![module("CANADAPOST", 1, vec![ShippingRegion::country("CA")]).inactive()];
        assert!(select_shipping_module(&qc(), &only, None).is_err());
    }
}
