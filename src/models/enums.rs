use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

// Forward-only pipeline states, plus the orthogonal terminal `Deleted`.
// The driver advances status only after the stage's artifact write succeeds.
str_enum!(JobStatus {
    Created => "created",
    PdfSaved => "pdf_saved",
    ImagesExtracted => "images_extracted",
    LlmRun => "llm_run",
    CsvsCombined => "csvs_combined",
    JsonNormalized => "json_normalized",
    ContactMapSet => "contact_map_set",
    Deleted => "DELETED",
});

str_enum!(DraftStatus {
    Draft => "draft",
    Ready => "ready",
    MockSent => "mock_sent",
    Failed => "failed",
});

str_enum!(BatchStatus {
    Generated => "generated",
    Queued => "queued",
    Sending => "sending",
    Completed => "completed",
    Superseded => "superseded",
});
