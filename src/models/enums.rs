use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DiseaseLabel {
    RedRot => "red_rot",
    Smut => "smut",
    Rust => "rust",
    Mosaic => "mosaic",
    Healthy => "healthy",
    PendingAnalysis => "pending_analysis",
});

str_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl DiseaseLabel {
    /// Labels a detector may assign. Excludes the pending sentinel.
    pub const DETECTABLE: [DiseaseLabel; 5] = [
        DiseaseLabel::Healthy,
        DiseaseLabel::RedRot,
        DiseaseLabel::Smut,
        DiseaseLabel::Rust,
        DiseaseLabel::Mosaic,
    ];

    pub fn is_pending(&self) -> bool {
        matches!(self, DiseaseLabel::PendingAnalysis)
    }
}
