use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anatomical cross-section through a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    Axial,
    Coronal,
    Sagittal,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Axial, Plane::Coronal, Plane::Sagittal];

    pub fn as_str(self) -> &'static str {
        match self {
            Plane::Axial => "axial",
            Plane::Coronal => "coronal",
            Plane::Sagittal => "sagittal",
        }
    }

    /// Panel title shown above the viewport
    pub fn label(self) -> &'static str {
        match self {
            Plane::Axial => "Axial",
            Plane::Coronal => "Coronal",
            Plane::Sagittal => "Sagittal",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side spatial filter applied before windowing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    Original,
    Sharpen,
    Smooth,
    NoiseReduction,
}

impl FilterType {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterType::Original => "original",
            FilterType::Sharpen => "sharpen",
            FilterType::Smooth => "smooth",
            FilterType::NoiseReduction => "noise_reduction",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(FilterType::Original),
            "sharpen" => Ok(FilterType::Sharpen),
            "smooth" => Ok(FilterType::Smooth),
            "noise_reduction" => Ok(FilterType::NoiseReduction),
            other => Err(format!("unknown filter type `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_match_backend_values() {
        for filter in [
            FilterType::Original,
            FilterType::Sharpen,
            FilterType::Smooth,
            FilterType::NoiseReduction,
        ] {
            assert_eq!(filter.as_str().parse::<FilterType>(), Ok(filter));
            let json = serde_json::to_string(&filter).unwrap();
            assert_eq!(json, format!("\"{}\"", filter.as_str()));
        }
        assert!("blur".parse::<FilterType>().is_err());
    }

    #[test]
    fn plane_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Plane::Coronal).unwrap(), "\"coronal\"");
    }
}
