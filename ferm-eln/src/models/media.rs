use crate::identity::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaComponent {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMediaPreparation {
    pub batch_id: Uuid,
    pub recipe_name: String,
    pub volume_l: f64,
    pub components: Vec<MediaComponent>,
    pub prepared_by: Actor,
    pub prepared_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Recipe snapshot for a batch; frozen once sterility is verified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPreparation {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub recipe_name: String,
    pub volume_l: f64,
    pub components: Vec<MediaComponent>,
    pub prepared_by: Actor,
    pub prepared_at: DateTime<Utc>,
    pub sterility_verified: bool,
    pub sterility_verified_by: Option<String>,
    pub sterility_verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
