//! Pet profile collected during onboarding.

use serde::{Deserialize, Serialize};

/// Keys of the onboarding schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    PetKind,
    PetDetails,
    HelpArea,
}

impl ProfileField {
    pub const ALL: [ProfileField; 3] = [Self::PetKind, Self::PetDetails, Self::HelpArea];

    fn label(&self) -> &'static str {
        match self {
            Self::PetKind => "Animal",
            Self::PetDetails => "Details",
            Self::HelpArea => "Needs help with",
        }
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PetKind => "pet_kind",
            Self::PetDetails => "pet_details",
            Self::HelpArea => "help_area",
        };
        write!(f, "{s}")
    }
}

/// What the owner told us about their pet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pet_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pet_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_area: Option<String>,
}

impl PetProfile {
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::PetKind => self.pet_kind.as_deref(),
            ProfileField::PetDetails => self.pet_details.as_deref(),
            ProfileField::HelpArea => self.help_area.as_deref(),
        }
    }

    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            ProfileField::PetKind => self.pet_kind = value,
            ProfileField::PetDetails => self.pet_details = value,
            ProfileField::HelpArea => self.help_area = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        ProfileField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Plain-text summary for the model, one line per known field.
    pub fn summary(&self) -> String {
        let mut lines = vec!["Pet owner profile:".to_string()];
        for field in ProfileField::ALL {
            if let Some(value) = self.get(field) {
                lines.push(format!("- {}: {}", field.label(), value));
            }
        }
        if lines.len() == 1 {
            lines.push("- (nothing shared yet)".to_string());
        }
        lines.join("\n")
    }
}
