use serde::{Deserialize, Serialize};

use super::DocumentError;

/// Macro to generate a closed tag enum with as_str, list key and FromStr
macro_rules! category_enum {
    ($name:ident { $($variant:ident => $s:literal / $key:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// JSON key of this category's pointer list in the record document.
            pub fn list_key(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DocumentError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s | $key => Ok(Self::$variant)),+,
                    _ => Err(DocumentError::InvalidCategory(s.into())),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

category_enum!(Category {
    Vaccination => "vaccination" / "vaccinationHash",
    Accident => "accident" / "accidentHash",
    Chronic => "chronic" / "chronicHash",
    Acute => "acute" / "acuteHash",
});
