use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Geographic matching rule deciding delivery method and pricing for a
/// destination. Province is required; district, subdistrict and postal
/// code narrow the match.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoverageArea {
    pub id: Uuid,
    pub province: String,
    pub district: Option<String>,
    pub subdistrict: Option<String>,
    pub postal_code: Option<String>,
    pub is_self_delivery_area: bool,
    pub delivery_route: Option<String>,
    pub delivery_zone: Option<String>,
    pub base_delivery_fee: Decimal,
    pub per_km_rate: Decimal,
    /// Order value at or above which delivery is free; zero disables
    pub free_delivery_threshold: Decimal,
    pub standard_hours: i32,
    pub express_hours: Option<i32>,
    pub same_day_available: bool,
    pub max_daily_capacity: i32,
    /// Lower value wins ties between equally specific areas
    pub priority_order: i32,
    pub auto_assign: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Destination lookup key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageQuery {
    pub province: String,
    pub district: Option<String>,
    pub subdistrict: Option<String>,
    pub postal_code: Option<String>,
}

impl CoverageQuery {
    pub fn province(province: impl Into<String>) -> Self {
        Self { province: province.into(), ..Self::default() }
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    pub fn with_subdistrict(mut self, subdistrict: impl Into<String>) -> Self {
        self.subdistrict = Some(subdistrict.into());
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }
}

/// Admin request to register a coverage area
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCoverageAreaRequest {
    #[validate(length(min = 1, message = "province is required"))]
    pub province: String,

    pub district: Option<String>,
    pub subdistrict: Option<String>,
    pub postal_code: Option<String>,

    #[serde(default)]
    pub is_self_delivery_area: bool,

    pub delivery_route: Option<String>,
    pub delivery_zone: Option<String>,

    #[serde(default)]
    pub base_delivery_fee: Decimal,

    #[serde(default)]
    pub per_km_rate: Decimal,

    #[serde(default)]
    pub free_delivery_threshold: Decimal,

    #[serde(default = "default_standard_hours")]
    pub standard_hours: i32,

    pub express_hours: Option<i32>,

    #[serde(default)]
    pub same_day_available: bool,

    #[serde(default = "default_capacity")]
    pub max_daily_capacity: i32,

    #[serde(default = "default_priority")]
    pub priority_order: i32,

    #[serde(default = "default_true")]
    pub auto_assign: bool,
}

fn default_standard_hours() -> i32 {
    48
}

fn default_capacity() -> i32 {
    100
}

fn default_priority() -> i32 {
    100
}

fn default_true() -> bool {
    true
}
