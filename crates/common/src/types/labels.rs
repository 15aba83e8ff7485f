use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Minimum Jaro-Winkler similarity for a misspelt label to count as a match.
const FUZZY_LABEL_THRESHOLD: f64 = 0.88;

/// Categorical labels the model writes as free text.
///
/// Each label serializes as its display string and parses leniently:
/// case and separators are ignored, known aliases are accepted, near-misses
/// are matched by string similarity, and anything else becomes `Unknown`
/// instead of failing the whole report.
macro_rules! define_label {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $display:expr, [$($alias:expr),*]);+ $(;)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            #[default]
            Unknown,
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $display,)+
                    Self::Unknown => "Unknown",
                }
            }

            pub fn from_label(raw: &str) -> Self {
                let key = normalize_label(raw);
                if key.is_empty() {
                    return Self::Unknown;
                }

                let candidates: &[(Self, &[&str])] = &[
                    $((Self::$variant, &[$display, $($alias),*]),)+
                ];

                for (variant, names) in candidates {
                    if names.iter().any(|n| normalize_label(n) == key) {
                        return *variant;
                    }
                }

                let mut best = (Self::Unknown, 0.0_f64);
                for (variant, names) in candidates {
                    for n in names.iter() {
                        let score = strsim::jaro_winkler(&key, &normalize_label(n));
                        if score > best.1 {
                            best = (*variant, score);
                        }
                    }
                }

                if best.1 >= FUZZY_LABEL_THRESHOLD {
                    best.0
                } else {
                    Self::Unknown
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?;
                Ok(raw.map(|s| Self::from_label(&s)).unwrap_or_default())
            }
        }
    };
}

fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

define_label!(
    /// How factual a source's reporting is considered to be.
    FactualRating {
        High => "High", ["very high", "reliable"];
        MostlyFactual => "Mostly Factual", ["mostly", "medium high"];
        Mixed => "Mixed", ["medium", "moderate"];
        Low => "Low", ["very low", "unreliable"];
    }
);

define_label!(
    /// Overall tone of social media activity around a hashtag.
    Sentiment {
        Positive => "Positive", [];
        Negative => "Negative", [];
        Neutral => "Neutral", [];
        Mixed => "Mixed", ["polarized", "divided"];
    }
);
