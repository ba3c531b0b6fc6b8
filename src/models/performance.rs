use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAssessmentRecord {
    pub id: String,
    pub employee_id: String,
    pub period: String,
    pub final_score: Option<f64>,
    pub evaluated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentCreateInput {
    pub employee_id: String,
    pub period: String,
    pub final_score: f64,
    #[serde(default)]
    pub evaluated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentUpdateInput {
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub evaluated_at: Option<Option<String>>,
}

/// Where a performance coefficient came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientSource {
    /// Assessment for the requested period.
    Exact,
    /// Most recent assessment of another period, discounted.
    Fallback,
    /// No usable assessment; neutral coefficient.
    Neutral,
}

impl CoefficientSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoefficientSource::Exact => "exact",
            CoefficientSource::Fallback => "fallback",
            CoefficientSource::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "exact" => Ok(CoefficientSource::Exact),
            "fallback" => Ok(CoefficientSource::Fallback),
            "neutral" => Ok(CoefficientSource::Neutral),
            _ => Err(format!("Invalid coefficient source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoefficientResolution {
    pub coefficient: f64,
    pub source: CoefficientSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl CoefficientResolution {
    pub fn neutral() -> Self {
        Self {
            coefficient: 1.0,
            source: CoefficientSource::Neutral,
            period: None,
            score: None,
        }
    }
}
