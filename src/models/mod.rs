mod broker;
mod chat;
mod lead;
mod property;
mod session;
mod site;

pub use broker::{
    BrokerProfile, BrokerRegistration, BrokerStatus, BrokerUpdate, REFERRAL_REWARD_DAYS,
    TRIAL_DAYS,
};
pub use chat::{ChatMessage, BOT_ID};
pub use lead::{LeadInquiry, LeadStatus, PropertyLead};
pub use property::{
    Amenity, ImageUpload, ListingType, NewProperty, PropertyCategory, PropertyListing,
    PropertyUpdate, LISTING_VALIDITY_DAYS, MAX_IMAGES,
};
pub use session::{AdminProfile, Session};
pub use site::{default_banner_slides, BannerSlide, SiteConfig, BANNER_SLIDES_KEY, SITE_CONFIG_KEY};
