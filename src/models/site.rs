use serde::{Deserialize, Serialize};

/// Key of the site configuration row in the settings table
pub const SITE_CONFIG_KEY: &str = "site_config";

/// Key of the banner carousel row in the settings table
pub const BANNER_SLIDES_KEY: &str = "banner_slides";

/// Global branding and contact details edited from the admin console
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    pub site_name: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub office_address: String,
    pub whatsapp_number: Option<String>,
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub youtube_url: Option<String>,
    pub logo_url: Option<String>,
    pub icon_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_name: "Broker Market".to_string(),
            hero_title: "Find your next property".to_string(),
            hero_subtitle: "Verified brokers across coastal Karnataka".to_string(),
            contact_phone: String::new(),
            contact_email: String::new(),
            office_address: String::new(),
            whatsapp_number: None,
            facebook_url: None,
            instagram_url: None,
            youtube_url: None,
            logo_url: None,
            icon_url: None,
        }
    }
}

/// One slide of the home page promotional carousel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BannerSlide {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub cta_label: Option<String>,
    #[serde(default)]
    pub cta_link: Option<String>,
}

pub fn default_banner_slides() -> Vec<BannerSlide> {
    vec![
        BannerSlide {
            id: "welcome".to_string(),
            title: "List with verified brokers".to_string(),
            subtitle: Some("45 days free for new brokers".to_string()),
            image_url: "/banners/welcome.jpg".to_string(),
            cta_label: Some("Register".to_string()),
            cta_link: Some("/broker/register".to_string()),
        },
        BannerSlide {
            id: "referral".to_string(),
            title: "Refer a broker, earn 30 days".to_string(),
            subtitle: None,
            image_url: "/banners/referral.jpg".to_string(),
            cta_label: None,
            cta_link: None,
        },
    ]
}
