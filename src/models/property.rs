use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days a listing stays valid after creation
pub const LISTING_VALIDITY_DAYS: i64 = 45;

/// Upper bound on photos attached to one listing
pub const MAX_IMAGES: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PropertyCategory {
    Residential,
    Commercial,
    Agricultural,
    Plot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rent,
}

/// Core property listing, owned by one broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyListing {
    pub id: String,
    pub broker_id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub category: PropertyCategory,
    pub listing_type: ListingType,
    pub city: String,
    pub district: String,
    #[serde(default)]
    pub village: Option<String>,
    pub address: String,
    #[serde(default)]
    pub area_sqft: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<u8>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub leads_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PropertyListing {
    /// Active and not past its validity window
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Listing form as filled in by a broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub description: String,
    pub price: i64,
    pub category: PropertyCategory,
    pub listing_type: ListingType,
    pub city: String,
    pub district: String,
    pub village: Option<String>,
    pub address: String,
    pub area_sqft: Option<f64>,
    pub bedrooms: Option<u8>,
    pub amenities: Vec<String>,
}

impl NewProperty {
    pub fn into_listing(
        self,
        id: String,
        broker_id: String,
        images: Vec<String>,
        now: DateTime<Utc>,
    ) -> PropertyListing {
        PropertyListing {
            id,
            broker_id,
            title: self.title.trim().to_string(),
            description: self.description,
            price: self.price,
            category: self.category,
            listing_type: self.listing_type,
            city: self.city.trim().to_string(),
            district: self.district.trim().to_string(),
            village: self.village,
            address: self.address,
            area_sqft: self.area_sqft,
            bedrooms: self.bedrooms,
            amenities: self.amenities,
            images,
            likes_count: 0,
            leads_count: 0,
            is_active: true,
            created_at: now,
            expires_at: now + Duration::days(LISTING_VALIDITY_DAYS),
        }
    }
}

/// Partial edit of a listing by its owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PropertyCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<ListingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amenities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl PropertyUpdate {
    pub fn apply(&self, listing: &mut PropertyListing) {
        if let Some(title) = &self.title {
            listing.title = title.clone();
        }
        if let Some(description) = &self.description {
            listing.description = description.clone();
        }
        if let Some(price) = self.price {
            listing.price = price;
        }
        if let Some(category) = self.category {
            listing.category = category;
        }
        if let Some(listing_type) = self.listing_type {
            listing.listing_type = listing_type;
        }
        if let Some(city) = &self.city {
            listing.city = city.clone();
        }
        if let Some(district) = &self.district {
            listing.district = district.clone();
        }
        if let Some(address) = &self.address {
            listing.address = address.clone();
        }
        if let Some(amenities) = &self.amenities {
            listing.amenities = amenities.clone();
        }
        if let Some(images) = &self.images {
            listing.images = images.clone();
        }
        if let Some(active) = self.is_active {
            listing.is_active = active;
        }
    }
}

/// A photo picked for upload with a listing
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

const MAX_EXTENSION_LEN: usize = 5;

impl ImageUpload {
    /// File extension safe to embed in a storage path; `jpg` when absent or odd
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LEN
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or("jpg")
    }
}

/// Amenity definition shown as a checkbox on the listing form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Amenity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(file_name: &str) -> ImageUpload {
        ImageUpload {
            file_name: file_name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0u8; 4],
        }
    }

    #[test]
    fn extension_is_taken_from_the_file_name() {
        assert_eq!(upload("front.PNG").extension(), "PNG");
        assert_eq!(upload("plot.photo.webp").extension(), "webp");
    }

    #[test]
    fn unsafe_or_missing_extension_falls_back_to_jpg() {
        assert_eq!(upload("a.png/../x").extension(), "jpg");
        assert_eq!(upload("noext").extension(), "jpg");
        assert_eq!(upload("trailing.").extension(), "jpg");
        assert_eq!(upload("long.extension").extension(), "jpg");
    }
}
