use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::Store;
use crate::error::Result;
use crate::gateway::{Filter, Query, Row, Table};
use crate::models::{BannerSlide, ImageUpload, SiteConfig, BANNER_SLIDES_KEY, SITE_CONFIG_KEY};

/// Storage bucket holding logos and icons
pub const BRANDING_BUCKET: &str = "branding";

impl Store {
    /// Replace the carousel locally, then upsert it. Provisional until the
    /// next fetch.
    pub async fn update_banner_slides(&self, slides: Vec<BannerSlide>) -> Result<()> {
        self.require_admin()?;
        let previous = self.mutate(|s| std::mem::replace(&mut s.banner_slides, slides.clone()));
        let outcome = self.put_setting(BANNER_SLIDES_KEY, &slides).await;
        self.reconcile("update_banner_slides", outcome, |s| s.banner_slides = previous)
    }

    pub async fn update_site_config(&self, config: SiteConfig) -> Result<()> {
        self.require_admin()?;
        let previous = self.mutate(|s| std::mem::replace(&mut s.site_config, config.clone()));
        let outcome = self.put_setting(SITE_CONFIG_KEY, &config).await;
        self.reconcile("update_site_config", outcome, |s| s.site_config = previous)
    }

    /// Returns whether a stored value replaced the local one
    pub async fn fetch_banner_slides(&self) -> Result<bool> {
        match self.get_setting::<Vec<BannerSlide>>(BANNER_SLIDES_KEY).await? {
            Some(slides) => {
                self.mutate(|s| s.banner_slides = slides);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn fetch_site_config(&self) -> Result<bool> {
        match self.get_setting::<SiteConfig>(SITE_CONFIG_KEY).await? {
            Some(config) => {
                self.mutate(|s| s.site_config = config);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Upload a logo or icon and return its public URL
    pub async fn upload_branding_image(&self, image: ImageUpload) -> Result<String> {
        self.require_admin()?;
        let path = format!("{}.{}", Uuid::new_v4(), image.extension());
        let url = self
            .gateway
            .upload(BRANDING_BUCKET, &path, image.bytes, &image.content_type)
            .await?;
        info!("Uploaded branding image to {}", url);
        Ok(url)
    }

    async fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut row = Row::new();
        row.insert("key".into(), json!(key));
        row.insert("value".into(), serde_json::to_value(value)?);
        self.gateway.upsert(Table::SiteSettings, "key", row).await
    }

    /// A missing row or a null value yields `None`
    async fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let query = Query::all().filter(Filter::eq("key", key)).limit(1);
        let row = self.gateway.select(Table::SiteSettings, &query).await?.pop();
        match row.and_then(|mut r| r.remove("value")) {
            Some(Value::Null) | None => {
                debug!("No stored value for {}, keeping default", key);
                Ok(None)
            }
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::SyncPolicy;
    use super::*;
    use crate::gateway::to_row;
    use crate::models::default_banner_slides;

    #[tokio::test]
    async fn fetch_keeps_defaults_when_row_missing_or_null() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        assert!(!store.fetch_site_config().await.unwrap());

        gateway.seed(
            Table::SiteSettings,
            vec![to_row(&json!({"key": SITE_CONFIG_KEY, "value": null})).unwrap()],
        );
        assert!(!store.fetch_site_config().await.unwrap());
        assert_eq!(store.state().site_config, SiteConfig::default());
    }

    #[tokio::test]
    async fn update_then_fetch_round_trips_through_settings() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        store.login(admin_session());
        let config = SiteConfig {
            hero_title: "Homes in Udupi".to_string(),
            ..SiteConfig::default()
        };

        store.update_site_config(config.clone()).await.unwrap();
        assert_eq!(gateway.rows(Table::SiteSettings).len(), 1);

        let other = Store::new(gateway.clone(), Default::default());
        assert!(other.fetch_site_config().await.unwrap());
        assert_eq!(other.state().site_config, config);
    }

    #[tokio::test]
    async fn later_fetch_overwrites_provisional_slides() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        store.login(admin_session());
        gateway.set_fail_writes(true);

        assert!(store.update_banner_slides(Vec::new()).await.is_err());
        assert!(store.state().banner_slides.is_empty());

        gateway.set_fail_writes(false);
        gateway.seed(
            Table::SiteSettings,
            vec![to_row(&json!({"key": BANNER_SLIDES_KEY, "value": default_banner_slides()})).unwrap()],
        );
        assert!(store.fetch_banner_slides().await.unwrap());
        assert_eq!(store.state().banner_slides, default_banner_slides());
    }

    #[tokio::test]
    async fn branding_upload_requires_admin() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        let logo = ImageUpload {
            file_name: "logo.svg".to_string(),
            content_type: "image/svg+xml".to_string(),
            bytes: b"<svg/>".to_vec(),
        };

        assert!(store.upload_branding_image(logo.clone()).await.is_err());
        store.login(admin_session());
        let url = store.upload_branding_image(logo).await.unwrap();
        assert!(url.ends_with(".svg"));
        assert_eq!(gateway.blob_count(), 1);
    }
}
