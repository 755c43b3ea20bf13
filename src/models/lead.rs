use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Read,
}

/// Buyer inquiry addressed to the broker who owns a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyLead {
    pub id: String,
    pub property_id: String,
    pub broker_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Inquiry form submitted by an anonymous visitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadInquiry {
    pub property_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub message: Option<String>,
}
