use serde::{Deserialize, Serialize};

use super::BrokerProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The one signed-in identity of this client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Session {
    Broker(BrokerProfile),
    Admin(AdminProfile),
}

impl Session {
    pub fn user_id(&self) -> &str {
        match self {
            Session::Broker(broker) => &broker.id,
            Session::Admin(admin) => &admin.id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Session::Admin(_))
    }

    pub fn broker(&self) -> Option<&BrokerProfile> {
        match self {
            Session::Broker(broker) => Some(broker),
            Session::Admin(_) => None,
        }
    }
}
