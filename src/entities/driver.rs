use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "driver_status")]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "busy")]
    Busy,
    #[sea_orm(string_value = "away")]
    Away,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 4] = [
        DriverStatus::Online,
        DriverStatus::Offline,
        DriverStatus::Busy,
        DriverStatus::Away,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Online => "online",
            DriverStatus::Offline => "offline",
            DriverStatus::Busy => "busy",
            DriverStatus::Away => "away",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("Status must be one of: {}", allowed.join(", "))
            })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "driver")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    pub license_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub driver_status: DriverStatus,
    /// Last reported position as `"lat,lng"`
    pub current_location: Option<String>,
    pub last_location_update: Option<DateTimeWithTimeZone>,
    pub rating: Option<f64>,
    pub points_balance: i32,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_one = "super::vehicle::Entity")]
    Vehicle,
    #[sea_orm(has_many = "super::trip::Entity")]
    Trips,
    #[sea_orm(has_many = "super::points_transaction::Entity")]
    PointsTransactions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::vehicle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vehicle.def()
    }
}

impl Related<super::trip::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trips.def()
    }
}

impl Related<super::points_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PointsTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
