//! Mass isotopomer assignment from isotopologue m/z values.

use crate::errors::InputValidationError;
use regex::Regex;
use std::collections::{
    BTreeMap,
    HashMap,
};
use std::sync::OnceLock;
use tracing::debug;

/// Mass difference between 13C and 12C.
pub const C13_MASS_SHIFT: f64 = 1.003355;

fn element_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([A-Z][a-z]?)(\d*)").expect("static element pattern"))
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)m\+(\d+)").expect("static isotopomer pattern"))
}

/// Parses a channel label like `M+2` or `m+2` into its index.
///
/// ```
/// use isonet::isotopologue::parse_isotopomer_label;
///
/// assert_eq!(parse_isotopomer_label("m+3").unwrap(), 3);
/// assert!(parse_isotopomer_label("M3").is_err());
/// ```
pub fn parse_isotopomer_label(label: &str) -> Result<usize, InputValidationError> {
    label_pattern()
        .captures(label)
        .and_then(|cap| cap[1].parse::<usize>().ok())
        .ok_or_else(|| InputValidationError::MalformedIsotopomerLabel {
            label: label.to_string(),
        })
}

pub fn isotopomer_label(index: usize) -> String {
    format!("M+{}", index)
}

/// Counts the atoms of each element in a sum formula, e.g. `C6H12O6`.
///
/// Repeated elements are summed, a missing count means one atom.
///
/// ```
/// use isonet::isotopologue::parse_formula;
///
/// let counts = parse_formula("C6H12O6");
/// assert_eq!(counts["C"], 6);
/// assert_eq!(counts["H"], 12);
/// ```
pub fn parse_formula(formula: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for cap in element_pattern().captures_iter(formula) {
        let count = match &cap[2] {
            "" => 1,
            digits => digits.parse::<u32>().unwrap_or(0),
        };
        *counts.entry(cap[1].to_string()).or_insert(0) += count;
    }
    counts
}

pub fn carbon_count(formula: &str) -> Option<u32> {
    parse_formula(formula).get("C").copied()
}

/// One measured isotopologue peak of a compound.
#[derive(Debug, Clone, PartialEq)]
pub struct IsotopologuePeak<'a> {
    pub compound: &'a str,
    pub mz: f64,
    pub formula: Option<&'a str>,
}

/// Assigns an M+i index to every peak from its m/z offset to the lightest
/// peak of the same compound.
///
/// With `carbon_limit`, compounds that carry a formula drop every peak whose
/// index exceeds the number of carbons. A formula without carbon drops all
/// peaks of the compound. Dropped peaks come back as `None`.
pub fn assign_mass_isotopomers(
    peaks: &[IsotopologuePeak],
    carbon_limit: bool,
) -> Vec<Option<usize>> {
    let mut lightest: HashMap<&str, f64> = HashMap::new();
    let mut formulas: HashMap<&str, &str> = HashMap::new();
    for peak in peaks {
        if !peak.mz.is_finite() {
            continue;
        }
        lightest
            .entry(peak.compound)
            .and_modify(|m| *m = m.min(peak.mz))
            .or_insert(peak.mz);
        if let Some(f) = peak.formula {
            formulas.entry(peak.compound).or_insert(f);
        }
    }

    let carbons: HashMap<&str, Option<u32>> = if carbon_limit {
        formulas
            .iter()
            .map(|(compound, formula)| (*compound, carbon_count(formula)))
            .collect()
    } else {
        HashMap::new()
    };

    let mut dropped = 0;
    let out = peaks
        .iter()
        .map(|peak| {
            let m0 = *lightest.get(peak.compound)?;
            if !peak.mz.is_finite() {
                return None;
            }
            let index = ((peak.mz - m0) / C13_MASS_SHIFT).round() as usize;
            match carbons.get(peak.compound) {
                Some(Some(c)) if index > *c as usize => {
                    dropped += 1;
                    None
                }
                Some(None) => {
                    dropped += 1;
                    None
                }
                _ => Some(index),
            }
        })
        .collect();
    if dropped > 0 {
        debug!("Dropped {} isotopologue peaks beyond the carbon count", dropped);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak<'a>(compound: &'a str, mz: f64, formula: Option<&'a str>) -> IsotopologuePeak<'a> {
        IsotopologuePeak {
            compound,
            mz,
            formula,
        }
    }

    #[test]
    fn test_isotopomer_labels() {
        assert_eq!(parse_isotopomer_label("M+0").unwrap(), 0);
        assert_eq!(parse_isotopomer_label("m+12").unwrap(), 12);
        assert_eq!(isotopomer_label(4), "M+4");
        assert_eq!(
            parse_isotopomer_label("M-1").unwrap_err(),
            InputValidationError::MalformedIsotopomerLabel {
                label: "M-1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_formula_repeats_and_implicit_counts() {
        let counts = parse_formula("CH3COOH");
        assert_eq!(counts["C"], 2);
        assert_eq!(counts["H"], 4);
        assert_eq!(counts["O"], 2);

        let counts = parse_formula("NaCl");
        assert_eq!(counts["Na"], 1);
        assert_eq!(counts["Cl"], 1);
        assert_eq!(carbon_count("NaCl"), None);
    }

    #[test]
    fn test_assignment_from_mz_offsets() {
        let peaks = vec![
            peak("lactate", 90.0339, None),
            peak("lactate", 89.0244, None),
            peak("lactate", 92.0411, None),
            peak("pyruvate", 87.0088, None),
            peak("pyruvate", 88.0121, None),
        ];
        let out = assign_mass_isotopomers(&peaks, false);
        assert_eq!(out, vec![Some(1), Some(0), Some(3), Some(0), Some(1)]);
    }

    #[test]
    fn test_carbon_limit_drops_heavy_peaks() {
        let peaks: Vec<_> = (0..6)
            .map(|i| peak("lactate", 89.0244 + i as f64 * C13_MASS_SHIFT, Some("C3H6O3")))
            .collect();
        let out = assign_mass_isotopomers(&peaks, true);
        assert_eq!(out, vec![Some(0), Some(1), Some(2), Some(3), None, None]);

        // Without the limit every peak is kept.
        let out = assign_mass_isotopomers(&peaks, false);
        assert!(out.iter().all(|x| x.is_some()));
    }

    #[test]
    fn test_carbon_free_formula_drops_compound() {
        let peaks = vec![
            peak("phosphate", 96.9696, Some("H3PO4")),
            peak("phosphate", 97.9729, None),
        ];
        let out = assign_mass_isotopomers(&peaks, true);
        assert_eq!(out, vec![None, None]);
    }
}
