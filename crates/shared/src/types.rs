//! Common types used across AdForge

use serde::{Deserialize, Serialize};

/// Ad platform a creative variant is targeted at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Instagram,
    Tiktok,
    Linkedin,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Meta => write!(f, "meta"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Tiktok => write!(f, "tiktok"),
            Platform::Linkedin => write!(f, "linkedin"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meta" | "facebook" => Ok(Platform::Meta),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            "linkedin" => Ok(Platform::Linkedin),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}
