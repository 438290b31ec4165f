//! Static sugarcane disease reference table.

use serde::Serialize;

use super::enums::{DiseaseLabel, Severity};

#[derive(Debug, Clone, Serialize)]
pub struct DiseaseInfo {
    pub label: DiseaseLabel,
    pub name: &'static str,
    pub treatment: &'static str,
    pub severity: Severity,
}

pub static DISEASES: [DiseaseInfo; 5] = [
    DiseaseInfo {
        label: DiseaseLabel::RedRot,
        name: "Red Rot",
        treatment: "Apply Bordeaux mixture (1%) or Copper oxychloride (0.3%). Remove infected stalks and burn them. Improve drainage and avoid waterlogging.",
        severity: Severity::High,
    },
    DiseaseInfo {
        label: DiseaseLabel::Smut,
        name: "Smut Disease",
        treatment: "Use resistant varieties. Apply systemic fungicides like Propiconazole. Remove and destroy infected plants immediately.",
        severity: Severity::High,
    },
    DiseaseInfo {
        label: DiseaseLabel::Rust,
        name: "Rust Disease",
        treatment: "Spray Mancozeb (0.25%) or Propiconazole (0.1%). Ensure proper spacing between plants for air circulation.",
        severity: Severity::Medium,
    },
    DiseaseInfo {
        label: DiseaseLabel::Mosaic,
        name: "Mosaic Virus",
        treatment: "No chemical cure available. Remove infected plants immediately. Control aphid vectors with insecticides. Use virus-free planting material.",
        severity: Severity::High,
    },
    DiseaseInfo {
        label: DiseaseLabel::Healthy,
        name: "Healthy Leaf",
        treatment: "Continue regular monitoring and maintain good agricultural practices. Ensure proper nutrition and irrigation.",
        severity: Severity::Low,
    },
];

/// Reference entry for a label. `None` for the pending sentinel.
pub fn disease_info(label: DiseaseLabel) -> Option<&'static DiseaseInfo> {
    DISEASES.iter().find(|d| d.label == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_detectable_label_has_info() {
        for label in DiseaseLabel::DETECTABLE {
            let info = disease_info(label).expect("missing reference entry");
            assert!(!info.name.is_empty());
            assert!(!info.treatment.is_empty());
        }
    }

    #[test]
    fn pending_has_no_info() {
        assert!(disease_info(DiseaseLabel::PendingAnalysis).is_none());
    }

    #[test]
    fn severities_match_reference() {
        assert_eq!(disease_info(DiseaseLabel::Rust).unwrap().severity, Severity::Medium);
        assert_eq!(disease_info(DiseaseLabel::Healthy).unwrap().severity, Severity::Low);
        assert_eq!(disease_info(DiseaseLabel::RedRot).unwrap().severity, Severity::High);
    }

    #[test]
    fn table_serializes_with_labels() {
        let json = serde_json::to_value(&DISEASES[0]).unwrap();
        assert_eq!(json["label"], "red_rot");
        assert_eq!(json["severity"], "high");
    }
}
