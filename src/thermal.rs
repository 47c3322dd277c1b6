//! Raw count to temperature conversion.
//!
//! The microbolometer reports 16-bit counts proportional to received
//! radiance; the simplified Planck inversion below maps them to absolute
//! temperature using per-camera calibration constants.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::Deserialize;

const EMISSIVITY_MIN: f64 = 0.1;
const EMISSIVITY_MAX: f64 = 1.0;

/// Calibration constants for the simplified Planck inversion.
///
/// Defaults describe a Lepton-3.5-class core and apply when no per-unit
/// record is supplied. The JSON form is a flat object using the vendor key
/// names (`PlanckR1`, `PlanckB`, `PlanckF`, `PlanckO`, `Emissivity`,
/// `ReflectedApparentTemperature`); absent keys keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThermalCalibration {
    #[serde(rename = "PlanckR1")]
    pub planck_r1: f64,
    #[serde(rename = "PlanckB")]
    pub planck_b: f64,
    #[serde(rename = "PlanckF")]
    pub planck_f: f64,
    #[serde(rename = "PlanckO")]
    pub planck_o: f64,
    /// Kept in `[0.1, 1.0]`; use [`set_emissivity`](Self::set_emissivity).
    #[serde(rename = "Emissivity")]
    emissivity: f64,
    /// Ambient temperature reflected by the target, in degrees Celsius.
    #[serde(rename = "ReflectedApparentTemperature")]
    pub reflected_apparent_temperature: f64,
}

impl Default for ThermalCalibration {
    fn default() -> Self {
        Self {
            planck_r1: 21106.77,
            planck_b: 1506.8,
            planck_f: 1.0,
            planck_o: -7340.0,
            emissivity: 0.95,
            reflected_apparent_temperature: 20.0,
        }
    }
}

impl ThermalCalibration {
    /// Load a calibration record from a JSON file.
    ///
    /// The path is caller-provided; this crate does not search for
    /// configuration files on its own.
    pub fn from_json_path(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut cal: Self =
            serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        cal.emissivity = cal.emissivity.clamp(EMISSIVITY_MIN, EMISSIVITY_MAX);
        info!(
            "Loaded calibration from {} (PlanckO={})",
            path.display(),
            cal.planck_o
        );
        Ok(cal)
    }

    pub fn emissivity(&self) -> f64 {
        self.emissivity
    }

    pub fn set_emissivity(&mut self, emissivity: f64) {
        self.emissivity = emissivity.clamp(EMISSIVITY_MIN, EMISSIVITY_MAX);
    }

    /// Convert one raw 16-bit count to degrees Celsius.
    ///
    /// Total over the whole input range: degenerate counts are clamped
    /// rather than rejected, so a pixel can come out spuriously hot or cold
    /// but never poisons the frame with a NaN.
    pub fn raw_to_celsius(&self, raw: u16) -> f32 {
        // Extension point for full radiometric correction: remove the
        // reflected component first,
        //   raw_obj = (raw - (1 - E) * raw_refl) / E
        // where raw_refl is the inverse-Planck image of
        // `reflected_apparent_temperature`. Validating that path needs
        // vendor calibration data, so the inversion below operates on the
        // raw counts directly.
        let mut raw = f64::from(raw);
        if raw <= self.planck_o {
            raw = self.planck_o + 1.0;
        }

        let mut denom = raw - self.planck_o;
        if denom == 0.0 {
            denom = 1.0;
        }

        let mut val = self.planck_r1 / denom + self.planck_f;
        if val <= 0.0 {
            val = 1.0;
        }

        let kelvin = self.planck_b / val.ln();
        (kelvin - 273.15) as f32
    }

    /// Convert a whole raw matrix; element-wise identical to the scalar
    /// path by construction.
    pub fn raw_to_celsius_image(&self, raw: &[u16]) -> Vec<f32> {
        raw.iter().map(|&r| self.raw_to_celsius(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn uniform_matrix_matches_hand_computed_value() {
        // denom = 4096 - (-7340) = 11436
        // v = 21106.77 / 11436 + 1 = 2.845643
        // T = 1506.8 / ln(v) - 273.15 = 1167.68 C
        let cal = ThermalCalibration::default();
        let celsius = cal.raw_to_celsius(4096);
        assert!((celsius - 1167.68).abs() < 0.05, "got {celsius}");
    }

    #[test]
    fn conversion_is_finite_over_the_full_raw_range() {
        let cal = ThermalCalibration::default();
        for raw in 0..=u16::MAX {
            let celsius = cal.raw_to_celsius(raw);
            assert!(celsius.is_finite(), "raw {raw} produced {celsius}");
        }
    }

    #[test]
    fn counts_at_or_below_planck_o_are_clamped() {
        let mut cal = ThermalCalibration::default();
        cal.planck_o = 100.0;

        // Both sit at or below O and must hit the raw clamp, landing on the
        // same (finite) temperature as O + 1.
        let at = cal.raw_to_celsius(100);
        let below = cal.raw_to_celsius(0);
        assert!(at.is_finite() && below.is_finite());
        assert_eq!(at, below);
    }

    #[test]
    fn conversion_is_monotonic_in_raw() {
        let cal = ThermalCalibration::default();
        let mut last = cal.raw_to_celsius(0);
        for raw in [1u16, 100, 4096, 10000, 30000, u16::MAX] {
            let next = cal.raw_to_celsius(raw);
            assert!(next > last, "raw {raw}: {next} <= {last}");
            last = next;
        }
    }

    #[test]
    fn matrix_path_equals_scalar_path() {
        let cal = ThermalCalibration::default();
        let raw: Vec<u16> = vec![0, 1, 4096, 0x1000, 30000, u16::MAX];
        let image = cal.raw_to_celsius_image(&raw);
        for (&r, &c) in raw.iter().zip(image.iter()) {
            assert_eq!(c, cal.raw_to_celsius(r));
        }
    }

    #[test]
    fn emissivity_is_clamped() {
        let mut cal = ThermalCalibration::default();
        cal.set_emissivity(1.5);
        assert_eq!(cal.emissivity(), 1.0);
        cal.set_emissivity(0.0);
        assert_eq!(cal.emissivity(), 0.1);
        cal.set_emissivity(0.8);
        assert_eq!(cal.emissivity(), 0.8);
    }

    #[test]
    fn json_record_overrides_defaults() {
        let mut file = tempfile_path("full.json");
        write!(
            file.1,
            r#"{{"PlanckR1": 17000.0, "PlanckB": 1435.0, "PlanckF": 1.0,
                "PlanckO": -6000, "Emissivity": 0.9,
                "ReflectedApparentTemperature": 22.5}}"#
        )
        .unwrap();

        let cal = ThermalCalibration::from_json_path(&file.0).unwrap();
        assert_eq!(cal.planck_r1, 17000.0);
        assert_eq!(cal.planck_b, 1435.0);
        assert_eq!(cal.planck_o, -6000.0);
        assert_eq!(cal.emissivity(), 0.9);
        assert_eq!(cal.reflected_apparent_temperature, 22.5);
    }

    #[test]
    fn partial_json_record_keeps_defaults() {
        let mut file = tempfile_path("partial.json");
        write!(file.1, r#"{{"PlanckO": -5000}}"#).unwrap();

        let cal = ThermalCalibration::from_json_path(&file.0).unwrap();
        assert_eq!(cal.planck_o, -5000.0);
        assert_eq!(cal.planck_r1, ThermalCalibration::default().planck_r1);
        assert_eq!(cal.emissivity(), 0.95);
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let mut file = tempfile_path("broken.json");
        write!(file.1, "not json").unwrap();

        let err = ThermalCalibration::from_json_path(&file.0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err =
            ThermalCalibration::from_json_path(Path::new("/nonexistent/cal.json")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    fn tempfile_path(name: &str) -> (std::path::PathBuf, fs::File) {
        let path = std::env::temp_dir().join(format!("flirone-test-{}-{name}", std::process::id()));
        let file = fs::File::create(&path).unwrap();
        (path, file)
    }
}
