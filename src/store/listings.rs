use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreState};
use crate::error::{Error, Result};
use crate::filters::{search_properties, PropertySearch};
use crate::gateway::{from_rows, to_row, Filter, Query, Row, Table, INCREMENT_LEADS_FN, INCREMENT_LIKES_FN};
use crate::models::{
    Amenity, ImageUpload, LeadInquiry, LeadStatus, NewProperty, PropertyLead, PropertyListing,
    PropertyUpdate, Session,
};
use crate::validation;

/// Storage bucket holding listing photos
pub const PROPERTY_IMAGES_BUCKET: &str = "property-images";

fn by_id(id: &str) -> Filter {
    Filter::eq("id", id)
}

/// Owner of the listing or an admin may edit it
fn can_manage(state: &StoreState, listing: &PropertyListing) -> bool {
    match &state.session {
        Some(Session::Admin(_)) => true,
        Some(Session::Broker(broker)) => broker.id == listing.broker_id,
        None => false,
    }
}

impl Store {
    pub async fn fetch_properties(&self) -> Result<()> {
        let rows = self
            .gateway
            .select(Table::Properties, &Query::all().order_by("created_at", false))
            .await?;
        let properties: Vec<PropertyListing> = from_rows(rows)?;
        info!("Fetched {} properties", properties.len());
        self.set_properties(properties);
        Ok(())
    }

    pub async fn fetch_amenities(&self) -> Result<()> {
        let rows = self
            .gateway
            .select(Table::Amenities, &Query::all().order_by("name", true))
            .await?;
        let amenities: Vec<Amenity> = from_rows(rows)?;
        self.mutate(|s| s.amenities = amenities);
        Ok(())
    }

    /// Leads addressed to one broker, newest first
    pub async fn fetch_leads(&self, broker_id: &str) -> Result<()> {
        let query = Query::all()
            .filter(Filter::eq("broker_id", broker_id))
            .order_by("created_at", false);
        let leads: Vec<PropertyLead> = from_rows(self.gateway.select(Table::Leads, &query).await?)?;
        debug!("Fetched {} leads for {}", leads.len(), broker_id);
        self.mutate(|s| s.leads = leads);
        Ok(())
    }

    /// Listings matching `search` right now, in stored order
    pub fn search(&self, search: &PropertySearch) -> Vec<PropertyListing> {
        self.read(|s| {
            search_properties(&s.properties, &s.brokers, search, Utc::now())
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Count a like locally, then through the atomic counter procedure
    pub async fn like_property(&self, property_id: &str) -> Result<()> {
        self.mutate_if(|s| {
            let listing = s.property_mut(property_id)?;
            listing.likes_count += 1;
            Some(())
        })
        .ok_or_else(|| Error::not_found("property", property_id))?;

        let outcome = self
            .gateway
            .rpc(INCREMENT_LIKES_FN, json!({ "property_id": property_id }))
            .await
            .map(|_| ());
        self.reconcile("like_property", outcome, |s| {
            if let Some(listing) = s.property_mut(property_id) {
                listing.likes_count = listing.likes_count.saturating_sub(1);
            }
        })
    }

    /// Record a visitor inquiry against a listing and bump its lead counter
    pub async fn add_property_lead(&self, inquiry: LeadInquiry) -> Result<PropertyLead> {
        validation::validate_lead(&inquiry)?;

        let lead = self
            .mutate_if(|s| {
                let listing = s.property_mut(&inquiry.property_id)?;
                listing.leads_count += 1;
                let lead = PropertyLead {
                    id: Uuid::new_v4().to_string(),
                    property_id: listing.id.clone(),
                    broker_id: listing.broker_id.clone(),
                    name: inquiry.name.trim().to_string(),
                    phone: inquiry.phone.trim().to_string(),
                    email: inquiry.email.clone().filter(|e| !e.trim().is_empty()),
                    message: inquiry.message.clone(),
                    status: LeadStatus::New,
                    created_at: Utc::now(),
                };
                s.leads.push(lead.clone());
                Some(lead)
            })
            .ok_or_else(|| Error::not_found("property", inquiry.property_id.clone()))?;
        info!("New lead {} for property {}", lead.id, lead.property_id);

        let mut outcome = match to_row(&lead) {
            Ok(row) => self.gateway.insert(Table::Leads, row).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if outcome.is_ok() {
            outcome = self
                .gateway
                .rpc(INCREMENT_LEADS_FN, json!({ "property_id": lead.property_id }))
                .await
                .map(|_| ());
        }

        self.reconcile("add_property_lead", outcome, |s| {
            s.leads.retain(|l| l.id != lead.id);
            if let Some(listing) = s.property_mut(&lead.property_id) {
                listing.leads_count = listing.leads_count.saturating_sub(1);
            }
        })?;
        Ok(lead)
    }

    pub async fn mark_lead_read(&self, lead_id: &str) -> Result<()> {
        let previous = self
            .mutate_if(|s| {
                let lead = s.leads.iter_mut().find(|l| l.id == lead_id)?;
                Some(std::mem::replace(&mut lead.status, LeadStatus::Read))
            })
            .ok_or_else(|| Error::not_found("lead", lead_id))?;
        if previous == LeadStatus::Read {
            return Ok(());
        }

        let mut patch = Row::new();
        patch.insert("status".into(), serde_json::to_value(LeadStatus::Read)?);
        let outcome = self.gateway.update(Table::Leads, &by_id(lead_id), patch).await;
        self.reconcile("mark_lead_read", outcome, |s| {
            if let Some(lead) = s.leads.iter_mut().find(|l| l.id == lead_id) {
                lead.status = previous;
            }
        })
    }

    /// Upload the photos, then publish the listing for the signed-in broker
    pub async fn add_property(&self, form: NewProperty, images: Vec<ImageUpload>) -> Result<PropertyListing> {
        let broker_id = match self.session() {
            Some(Session::Broker(broker)) => broker.id,
            _ => return Err(Error::NotAuthenticated),
        };
        validation::validate_property(&form, images.len())?;

        let property_id = Uuid::new_v4().to_string();
        let urls = self.upload_images(&broker_id, images).await?;
        let listing = form.into_listing(property_id, broker_id, urls, Utc::now());

        self.mutate(|s| s.properties.insert(0, listing.clone()));
        info!("Listed property {} ({})", listing.title, listing.id);

        let outcome = match to_row(&listing) {
            Ok(row) => self.gateway.insert(Table::Properties, row).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let id = listing.id.clone();
        self.reconcile("add_property", outcome, |s| s.properties.retain(|p| p.id != id))?;
        Ok(listing)
    }

    pub async fn upload_images(&self, broker_id: &str, images: Vec<ImageUpload>) -> Result<Vec<String>> {
        validation::validate_image_count(images.len())?;
        let mut urls = Vec::with_capacity(images.len());
        for image in images {
            let path = format!("{}/{}.{}", broker_id, Uuid::new_v4(), image.extension());
            let url = self
                .gateway
                .upload(PROPERTY_IMAGES_BUCKET, &path, image.bytes, &image.content_type)
                .await?;
            urls.push(url);
        }
        Ok(urls)
    }

    pub async fn update_property(&self, property_id: &str, update: PropertyUpdate) -> Result<()> {
        if let Some(images) = &update.images {
            validation::validate_image_count(images.len())?;
        }
        if update.price.map_or(false, |p| p <= 0) {
            return Err(Error::validation("price", "must be greater than zero"));
        }
        let previous = self.edit_owned_listing(property_id, |listing| update.apply(listing))?;

        let outcome = match to_row(&update) {
            Ok(patch) => self.gateway.update(Table::Properties, &by_id(property_id), patch).await,
            Err(e) => Err(e),
        };
        self.reconcile("update_property", outcome, |s| {
            if let Some(listing) = s.property_mut(property_id) {
                *listing = previous;
            }
        })
    }

    pub async fn delete_property(&self, property_id: &str) -> Result<()> {
        let removed = self.read(|s| {
            s.properties
                .iter()
                .position(|p| p.id == property_id)
                .map(|i| (i, can_manage(s, &s.properties[i])))
        });
        match removed {
            None => return Err(Error::not_found("property", property_id)),
            Some((_, false)) => return Err(Error::NotAuthenticated),
            Some(_) => {}
        }

        let Some((index, listing)) = self.mutate_if(|s| {
            let index = s.properties.iter().position(|p| p.id == property_id)?;
            Some((index, s.properties.remove(index)))
        }) else {
            return Err(Error::not_found("property", property_id));
        };
        info!("Deleting property {}", property_id);

        let outcome = self.gateway.delete(Table::Properties, &by_id(property_id)).await;
        self.reconcile("delete_property", outcome, move |s| {
            let index = index.min(s.properties.len());
            s.properties.insert(index, listing);
        })
    }

    /// Apply `edit` to a listing the session may manage; returns the prior copy
    fn edit_owned_listing(
        &self,
        property_id: &str,
        edit: impl FnOnce(&mut PropertyListing),
    ) -> Result<PropertyListing> {
        let allowed = self.read(|s| s.property(property_id).map(|p| can_manage(s, p)));
        match allowed {
            None => Err(Error::not_found("property", property_id)),
            Some(false) => Err(Error::NotAuthenticated),
            Some(true) => self
                .mutate_if(|s| {
                    let listing = s.property_mut(property_id)?;
                    let previous = listing.clone();
                    edit(listing);
                    Some(previous)
                })
                .ok_or_else(|| Error::not_found("property", property_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::SyncPolicy;
    use super::*;
    use crate::models::{ListingType, PropertyCategory, MAX_IMAGES};

    fn inquiry(property_id: &str) -> LeadInquiry {
        LeadInquiry {
            property_id: property_id.to_string(),
            name: "Meera".to_string(),
            phone: "9876543210".to_string(),
            email: None,
            message: Some("Is the price negotiable?".to_string()),
        }
    }

    fn form() -> NewProperty {
        NewProperty {
            title: "2BHK near Kadri Park".to_string(),
            description: "Sea-facing".to_string(),
            price: 6_500_000,
            category: PropertyCategory::Residential,
            listing_type: ListingType::Sale,
            city: "Mangaluru".to_string(),
            district: "Dakshina Kannada".to_string(),
            village: None,
            address: "Kadri".to_string(),
            area_sqft: Some(1150.0),
            bedrooms: Some(2),
            amenities: vec!["parking".to_string()],
        }
    }

    fn photo(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    #[tokio::test]
    async fn likes_touch_only_the_target_listing() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        let listings = vec![listing("p1", "b1", "Udupi"), listing("p2", "b1", "Udupi")];
        gateway.seed(Table::Properties, listings.iter().map(|l| to_row(l).unwrap()).collect());
        store.set_properties(listings);

        for _ in 0..3 {
            store.like_property("p1").await.unwrap();
        }

        let state = store.state();
        assert_eq!(state.property("p1").unwrap().likes_count, 3);
        assert_eq!(state.property("p2").unwrap().likes_count, 0);
        assert_eq!(gateway.rows(Table::Properties)[0]["likes_count"], json!(3));
    }

    #[tokio::test]
    async fn failed_like_keeps_or_reverts_by_policy() {
        for (policy, expected) in [(SyncPolicy::KeepOptimistic, 1), (SyncPolicy::Rollback, 0)] {
            let (store, gateway) = store_with(policy);
            store.set_properties(vec![listing("p1", "b1", "Udupi")]);
            gateway.set_fail_writes(true);

            assert!(store.like_property("p1").await.is_err());
            assert_eq!(store.state().property("p1").unwrap().likes_count, expected);
        }
    }

    #[tokio::test]
    async fn liking_unknown_listing_is_not_found() {
        let (store, _) = store_with(SyncPolicy::KeepOptimistic);
        assert!(matches!(
            store.like_property("nope").await,
            Err(Error::NotFound { entity: "property", .. })
        ));
    }

    #[tokio::test]
    async fn invalid_lead_never_reaches_backend() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        store.set_properties(vec![listing("p1", "b1", "Udupi")]);
        let mut bad = inquiry("p1");
        bad.phone = "123".to_string();

        assert!(store.add_property_lead(bad).await.unwrap_err().is_validation());
        assert!(gateway.rows(Table::Leads).is_empty());
        assert_eq!(store.state().property("p1").unwrap().leads_count, 0);
    }

    #[tokio::test]
    async fn mark_lead_read_updates_backend() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        let listings = vec![listing("p1", "b1", "Udupi")];
        gateway.seed(Table::Properties, listings.iter().map(|l| to_row(l).unwrap()).collect());
        store.set_properties(listings);
        let lead = store.add_property_lead(inquiry("p1")).await.unwrap();

        store.mark_lead_read(&lead.id).await.unwrap();

        assert_eq!(store.state().leads[0].status, LeadStatus::Read);
        assert_eq!(gateway.rows(Table::Leads)[0]["status"], json!("read"));
    }

    #[tokio::test]
    async fn add_property_uploads_images_and_sets_expiry() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        store.login(Session::Broker(broker("b1", "AAA111")));

        let listing = store
            .add_property(form(), vec![photo("front.jpg"), photo("hall.png")])
            .await
            .unwrap();

        assert_eq!(listing.images.len(), 2);
        assert!(listing.images[1].ends_with(".png"));
        assert_eq!(gateway.blob_count(), 2);
        assert_eq!(
            listing.expires_at - listing.created_at,
            chrono::Duration::days(crate::models::LISTING_VALIDITY_DAYS)
        );
        assert_eq!(store.state().properties[0].id, listing.id);
    }

    #[tokio::test]
    async fn add_property_rejects_too_many_images() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        store.login(Session::Broker(broker("b1", "AAA111")));
        let images = (0..=MAX_IMAGES).map(|i| photo(&format!("{}.jpg", i))).collect();

        assert!(store.add_property(form(), images).await.unwrap_err().is_validation());
        assert_eq!(gateway.blob_count(), 0);
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_edit() {
        let (store, _) = store_with(SyncPolicy::KeepOptimistic);
        store.set_properties(vec![listing("p1", "b1", "Udupi")]);
        store.login(Session::Broker(broker("b2", "BBB222")));

        let update = PropertyUpdate {
            price: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            store.update_property("p1", update.clone()).await,
            Err(Error::NotAuthenticated)
        ));

        store.login(admin_session());
        store.update_property("p1", update).await.unwrap();
        assert_eq!(store.state().property("p1").unwrap().price, 100);
    }

    #[tokio::test]
    async fn delete_property_restores_position_on_rollback() {
        let (store, gateway) = store_with(SyncPolicy::Rollback);
        store.login(Session::Broker(broker("b1", "AAA111")));
        store.set_properties(vec![
            listing("p1", "b1", "Udupi"),
            listing("p2", "b1", "Udupi"),
            listing("p3", "b1", "Udupi"),
        ]);
        gateway.set_fail_writes(true);

        assert!(store.delete_property("p2").await.is_err());
        let ids: Vec<String> = store.state().properties.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }
}
