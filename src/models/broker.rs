use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Free trial granted on registration
pub const TRIAL_DAYS: i64 = 45;

/// Subscription extension a referrer earns per referred broker
pub const REFERRAL_REWARD_DAYS: i64 = 30;

/// Approval state of a broker account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Pending,
    Approved,
    Rejected,
}

/// A registered broker and their referral bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
    pub rera_number: String,
    #[serde(default)]
    pub service_districts: Vec<String>,
    pub city: String,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    pub status: BrokerStatus,
    pub registered_at: DateTime<Utc>,
    pub subscription_expiry: DateTime<Utc>,
    pub referral_code: String,
    /// Id of the broker whose code was used at registration
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub referrals_count: u32,
}

impl BrokerProfile {
    pub fn is_approved(&self) -> bool {
        self.status == BrokerStatus::Approved
    }

    pub fn subscription_active(&self, now: DateTime<Utc>) -> bool {
        self.subscription_expiry > now
    }

    /// Pushes the expiry forward. Non-positive extensions are ignored so the
    /// expiry never moves backward.
    pub fn extend_subscription(&mut self, days: i64) {
        if days > 0 {
            self.subscription_expiry += Duration::days(days);
        }
    }
}

/// Registration form submitted by a prospective broker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerRegistration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub whatsapp: Option<String>,
    pub rera_number: String,
    pub service_districts: Vec<String>,
    pub city: String,
    pub village: Option<String>,
    pub company_name: Option<String>,
    /// Another broker's referral code, if the applicant was referred
    pub referral_code: Option<String>,
}

impl BrokerRegistration {
    pub fn into_profile(self, id: String, referral_code: String, now: DateTime<Utc>) -> BrokerProfile {
        BrokerProfile {
            id,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
            whatsapp: self.whatsapp,
            rera_number: self.rera_number.trim().to_string(),
            service_districts: self.service_districts,
            city: self.city.trim().to_string(),
            village: self.village,
            company_name: self.company_name,
            profile_image: None,
            status: BrokerStatus::Pending,
            registered_at: now,
            subscription_expiry: now + Duration::days(TRIAL_DAYS),
            referral_code,
            referred_by: None,
            referrals_count: 0,
        }
    }
}

/// Self-service profile edit; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rera_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_districts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl BrokerUpdate {
    pub fn apply(&self, broker: &mut BrokerProfile) {
        if let Some(name) = &self.name {
            broker.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            broker.phone = phone.clone();
        }
        if let Some(whatsapp) = &self.whatsapp {
            broker.whatsapp = Some(whatsapp.clone());
        }
        if let Some(rera) = &self.rera_number {
            broker.rera_number = rera.clone();
        }
        if let Some(districts) = &self.service_districts {
            broker.service_districts = districts.clone();
        }
        if let Some(city) = &self.city {
            broker.city = city.clone();
        }
        if let Some(village) = &self.village {
            broker.village = Some(village.clone());
        }
        if let Some(company) = &self.company_name {
            broker.company_name = Some(company.clone());
        }
        if let Some(image) = &self.profile_image {
            broker.profile_image = Some(image.clone());
        }
    }
}
