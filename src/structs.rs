use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One row of the input distribution table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Particle diameter in nm.
    pub diameter: f64,
    /// Volume fraction in percent. Need not sum to 100 across the table.
    pub volume_fraction: f64,
    /// Per-sample polydispersity indicator in (0, 1].
    pub pdi: f64,
}

impl Sample {
    pub fn new(diameter: f64, volume_fraction: f64, pdi: f64) -> Self {
        Self {
            diameter,
            volume_fraction,
            pdi,
        }
    }
}

/// A sample as reported back, with its weight rescaled so the table sums to 100.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub diameter: f64,
    pub volume_fraction: f64,
    pub normalized_weight: f64,
    pub pdi: f64,
    pub cumulative_weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionResult {
    pub samples: Vec<NormalizedSample>,
    pub weighted_diameter_mean: f64,
    pub weighted_pdi_mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub computed_pdi: f64,
    pub coefficient_of_variation: f64,
    pub mode_diameter: f64,
    pub mode_percentage: f64,
    pub classification: Classification,
    pub grade: Grade,
    pub sample_count: usize,
    pub created_at: DateTime<Utc>,
}

impl DistributionResult {
    /// Normalized weights in input order; they sum to 100.
    pub fn normalized_weights(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.normalized_weight).collect()
    }

    /// Size uniformity in percent, `100 - CV`.
    pub fn uniformity(&self) -> f64 {
        100.0 - self.coefficient_of_variation
    }

    pub fn diameter_range(&self) -> (f64, f64) {
        let min = self
            .samples
            .iter()
            .map(|s| s.diameter)
            .fold(f64::INFINITY, f64::min);
        let max = self
            .samples
            .iter()
            .map(|s| s.diameter)
            .fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }
}

/// Quality bands over the computed PDI, best first.
///
/// Bands are half-open `[lower, upper)`; a value sitting exactly on a boundary
/// belongs to the worse band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Classification {
    VeryMonodisperse,
    Monodisperse,
    NearlyMonodisperse,
    ModeratePolydispersity,
    HighPolydispersity,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::VeryMonodisperse,
        Classification::Monodisperse,
        Classification::NearlyMonodisperse,
        Classification::ModeratePolydispersity,
        Classification::HighPolydispersity,
    ];

    pub fn from_pdi(pdi: f64) -> Self {
        if pdi < 0.05 {
            Classification::VeryMonodisperse
        } else if pdi < 0.1 {
            Classification::Monodisperse
        } else if pdi < 0.2 {
            Classification::NearlyMonodisperse
        } else if pdi < 0.3 {
            Classification::ModeratePolydispersity
        } else {
            Classification::HighPolydispersity
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::VeryMonodisperse => "Very monodisperse (excellent)",
            Classification::Monodisperse => "Monodisperse (very good)",
            Classification::NearlyMonodisperse => "Nearly monodisperse (good)",
            Classification::ModeratePolydispersity => "Moderate polydispersity",
            Classification::HighPolydispersity => "High polydispersity",
        }
    }

    /// Label without the parenthesised qualifier, for compact tables.
    pub fn short_label(self) -> &'static str {
        match self {
            Classification::VeryMonodisperse => "Very monodisperse",
            Classification::Monodisperse => "Monodisperse",
            Classification::NearlyMonodisperse => "Nearly monodisperse",
            Classification::ModeratePolydispersity => "Moderate polydispersity",
            Classification::HighPolydispersity => "High polydispersity",
        }
    }

    /// Human-readable PDI interval of the band.
    pub fn range_text(self) -> &'static str {
        match self {
            Classification::VeryMonodisperse => "PDI < 0.05",
            Classification::Monodisperse => "0.05 ≤ PDI < 0.1",
            Classification::NearlyMonodisperse => "0.1 ≤ PDI < 0.2",
            Classification::ModeratePolydispersity => "0.2 ≤ PDI < 0.3",
            Classification::HighPolydispersity => "PDI ≥ 0.3",
        }
    }

    pub fn grade(self) -> Grade {
        match self {
            Classification::VeryMonodisperse => Grade::APlus,
            Classification::Monodisperse => Grade::A,
            Classification::NearlyMonodisperse => Grade::B,
            Classification::ModeratePolydispersity => Grade::C,
            Classification::HighPolydispersity => Grade::D,
        }
    }

    /// One-line advice shown next to the result.
    pub fn advice(self) -> &'static str {
        match self {
            Classification::VeryMonodisperse | Classification::Monodisperse => {
                "Excellent nanomaterial quality. Keep this synthesis method."
            }
            Classification::NearlyMonodisperse => {
                "Good quality. Consider minor optimisation to improve monodispersity."
            }
            Classification::ModeratePolydispersity => {
                "Optimise the synthesis process to reduce polydispersity."
            }
            Classification::HighPolydispersity => {
                "Re-evaluate the synthesis method. Consider changing parameters or method."
            }
        }
    }

    /// Suggested applications and next step for the band.
    pub fn recommendation(self) -> &'static [&'static str] {
        match self {
            Classification::VeryMonodisperse | Classification::Monodisperse => &[
                "Suitable for biomedical applications (drug delivery, imaging)",
                "Ideal for precision electronics",
                "Usable for selective catalysis",
                "Recommendation: continue with this synthesis method",
            ],
            Classification::NearlyMonodisperse => &[
                "Suitable for coatings and thin films",
                "Usable for general catalysis",
                "Good for sensor applications",
                "Recommendation: minor optimisation to improve uniformity",
            ],
            Classification::ModeratePolydispersity => &[
                "Suitable for construction applications",
                "Usable as bulk material",
                "Needs purification for precision applications",
                "Recommendation: evaluate synthesis parameters",
            ],
            Classification::HighPolydispersity => &[
                "Suitable only where high uniformity is not required",
                "Needs significant optimisation",
                "Consider a purification method",
                "Recommendation: re-evaluate the synthesis method",
            ],
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    APlus,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    pub fn quality_text(self) -> &'static str {
        match self {
            Grade::APlus | Grade::A => "Very good quality",
            Grade::B => "Good quality",
            Grade::C => "Fair quality",
            Grade::D => "Needs optimisation",
        }
    }

    /// Indicator colour shared by the GUI and the PDF report.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Grade::APlus | Grade::A => (46, 204, 113),
            Grade::B => (241, 196, 15),
            Grade::C => (230, 126, 34),
            Grade::D => (231, 76, 60),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive statistics of one table column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1); NaN for a single value.
    pub std_dev: f64,
    pub variance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabNote {
    pub title: String,
    pub practitioner: String,
    pub date: NaiveDate,
    pub nanomaterial: String,
    pub synthesis_method: String,
    pub temperature_c: f64,
    pub duration_h: f64,
    pub procedure: String,
    pub observations: String,
    pub ph: f64,
    pub concentration_mg_ml: f64,
    pub solvent: String,
    pub extra_notes: String,
    #[serde(default)]
    pub image_paths: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

pub const NANOMATERIALS: [&str; 7] = ["TiO₂", "SiO₂", "ZnO", "Ag", "Au", "Fe₃O₄", "Other"];
pub const SYNTHESIS_METHODS: [&str; 5] = [
    "Sol-Gel",
    "Hydrothermal",
    "Sonochemical",
    "Mechanochemical",
    "Other",
];

/// Editable form state for a new lab note.
#[derive(Clone, Debug)]
pub struct NoteDraft {
    pub title: String,
    pub practitioner: String,
    pub date: String,
    pub nanomaterial: String,
    pub custom_nanomaterial: String,
    pub synthesis_method: String,
    pub custom_method: String,
    pub temperature_c: f64,
    pub duration_h: f64,
    pub procedure: String,
    pub observations: String,
    pub ph: f64,
    pub concentration_mg_ml: f64,
    pub solvent: String,
    pub extra_notes: String,
    pub image_paths: Vec<PathBuf>,
}

impl Default for NoteDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            practitioner: String::new(),
            date: Utc::now().format("%Y-%m-%d").to_string(),
            nanomaterial: NANOMATERIALS[0].to_string(),
            custom_nanomaterial: String::new(),
            synthesis_method: SYNTHESIS_METHODS[0].to_string(),
            custom_method: String::new(),
            temperature_c: 25.0,
            duration_h: 1.0,
            procedure: String::new(),
            observations: String::new(),
            ph: 7.0,
            concentration_mg_ml: 1.0,
            solvent: "Water".to_string(),
            extra_notes: String::new(),
            image_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NoteError {
    #[error("required field is empty: {0}")]
    MissingField(&'static str),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl NoteDraft {
    /// Turns the form into a note. Title, practitioner, procedure and
    /// observations are required.
    pub fn validate(&self) -> Result<LabNote, NoteError> {
        let required = [
            ("title", &self.title),
            ("practitioner", &self.practitioner),
            ("procedure", &self.procedure),
            ("observations", &self.observations),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(NoteError::MissingField(name));
            }
        }

        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| NoteError::InvalidDate(self.date.clone()))?;

        let nanomaterial = pick_choice(&self.nanomaterial, &self.custom_nanomaterial);
        let synthesis_method = pick_choice(&self.synthesis_method, &self.custom_method);

        Ok(LabNote {
            title: self.title.trim().to_string(),
            practitioner: self.practitioner.trim().to_string(),
            date,
            nanomaterial,
            synthesis_method,
            temperature_c: self.temperature_c,
            duration_h: self.duration_h,
            procedure: self.procedure.clone(),
            observations: self.observations.clone(),
            ph: self.ph,
            concentration_mg_ml: self.concentration_mg_ml,
            solvent: self.solvent.trim().to_string(),
            extra_notes: self.extra_notes.clone(),
            image_paths: self.image_paths.clone(),
            created_at: Utc::now(),
        })
    }
}

fn pick_choice(selected: &str, custom: &str) -> String {
    if selected == "Other" && !custom.trim().is_empty() {
        custom.trim().to_string()
    } else {
        selected.to_string()
    }
}
