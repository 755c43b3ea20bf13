use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Store, SyncPolicy};
use crate::error::{Error, Result};
use crate::gateway::{from_rows, to_row, Filter, Query, Row, Table};
use crate::models::{
    BrokerProfile, BrokerRegistration, BrokerStatus, BrokerUpdate, PropertyListing,
    REFERRAL_REWARD_DAYS,
};
use crate::validation;

const REFERRAL_CODE_LEN: usize = 6;
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Result of a successful referral lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ReferralReward {
    pub referrer_id: String,
    pub referrals_count: u32,
    pub subscription_expiry: DateTime<Utc>,
}

fn generate_referral_code(taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..REFERRAL_CODE_LEN)
            .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
            .collect();
        if !taken(&code) {
            return code;
        }
    }
}

fn by_id(id: &str) -> Filter {
    Filter::eq("id", id)
}

impl Store {
    pub async fn fetch_brokers(&self) -> Result<()> {
        let rows = self
            .gateway
            .select(Table::Brokers, &Query::all().order_by("registered_at", false))
            .await?;
        let brokers: Vec<BrokerProfile> = from_rows(rows)?;
        info!("Fetched {} brokers", brokers.len());
        self.set_brokers(brokers);
        Ok(())
    }

    /// Create a pending broker with a 45-day trial, crediting the referrer
    /// when a known referral code was supplied
    pub async fn register_broker(&self, registration: BrokerRegistration) -> Result<BrokerProfile> {
        validation::validate_registration(&registration)?;

        let referral = registration
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let code = self.read(|s| {
            generate_referral_code(|candidate| s.brokers.iter().any(|b| b.referral_code == candidate))
        });
        let profile = registration.into_profile(Uuid::new_v4().to_string(), code, Utc::now());
        let id = profile.id.clone();

        self.mutate(|s| s.brokers.push(profile.clone()));
        info!("Registered broker {} ({})", profile.name, id);

        let outcome = match to_row(&profile) {
            Ok(row) => self.gateway.insert(Table::Brokers, row).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let inserted = self.reconcile("register_broker", outcome, |s| s.brokers.retain(|b| b.id != id));

        // A broker kept locally after a failed insert still earns its referrer the reward
        let registered_locally =
            inserted.is_ok() || self.options.sync_policy == SyncPolicy::KeepOptimistic;
        if let (Some(code), true) = (referral, registered_locally) {
            if let Err(e) = self.apply_referral(&code, &id).await {
                warn!("Referral {} for {} was not saved: {}", code, id, e);
            }
        }
        inserted?;

        Ok(self.read(|s| s.broker(&id).cloned()).unwrap_or(profile))
    }

    /// Credit the owner of `code` with one referral and 30 more days, and
    /// record them as the new broker's referrer. Unknown codes are a no-op.
    pub async fn apply_referral(&self, code: &str, new_broker_id: &str) -> Result<Option<ReferralReward>> {
        let code = code.trim().to_uppercase();

        let reward = self.mutate_if(|s| {
            let referrer = s
                .brokers
                .iter_mut()
                .find(|b| b.referral_code == code && b.id != new_broker_id)?;
            referrer.referrals_count += 1;
            referrer.extend_subscription(REFERRAL_REWARD_DAYS);
            let reward = ReferralReward {
                referrer_id: referrer.id.clone(),
                referrals_count: referrer.referrals_count,
                subscription_expiry: referrer.subscription_expiry,
            };
            if let Some(new_broker) = s.broker_mut(new_broker_id) {
                new_broker.referred_by = Some(reward.referrer_id.clone());
            }
            s.sync_session_broker(&reward.referrer_id);
            Some(reward)
        });

        let Some(reward) = reward else {
            info!("Referral code {} matched no broker", code);
            return Ok(None);
        };
        info!(
            "Referral by {} credited: {} referrals, expiry {}",
            reward.referrer_id, reward.referrals_count, reward.subscription_expiry
        );

        let mut referrer_patch = Row::new();
        referrer_patch.insert("referrals_count".into(), json!(reward.referrals_count));
        referrer_patch.insert("subscription_expiry".into(), json!(reward.subscription_expiry));
        let mut referred_patch = Row::new();
        referred_patch.insert("referred_by".into(), json!(reward.referrer_id));

        let mut outcome = self
            .gateway
            .update(Table::Brokers, &by_id(&reward.referrer_id), referrer_patch)
            .await;
        if outcome.is_ok() {
            outcome = self
                .gateway
                .update(Table::Brokers, &by_id(new_broker_id), referred_patch)
                .await;
        }

        let referrer_id = reward.referrer_id.clone();
        self.reconcile("apply_referral", outcome, |s| {
            if let Some(referrer) = s.broker_mut(&referrer_id) {
                referrer.referrals_count = referrer.referrals_count.saturating_sub(1);
                referrer.subscription_expiry -= Duration::days(REFERRAL_REWARD_DAYS);
            }
            if let Some(new_broker) = s.broker_mut(new_broker_id) {
                new_broker.referred_by = None;
            }
            s.sync_session_broker(&referrer_id);
        })?;

        Ok(Some(reward))
    }

    pub async fn approve_broker(&self, broker_id: &str) -> Result<()> {
        self.set_broker_status(broker_id, BrokerStatus::Approved).await
    }

    pub async fn reject_broker(&self, broker_id: &str) -> Result<()> {
        self.set_broker_status(broker_id, BrokerStatus::Rejected).await
    }

    async fn set_broker_status(&self, broker_id: &str, status: BrokerStatus) -> Result<()> {
        self.require_admin()?;
        let previous = self
            .mutate_if(|s| {
                let broker = s.broker_mut(broker_id)?;
                Some(std::mem::replace(&mut broker.status, status))
            })
            .ok_or_else(|| Error::not_found("broker", broker_id))?;
        info!("Broker {} status {:?} -> {:?}", broker_id, previous, status);

        let mut patch = Row::new();
        patch.insert("status".into(), serde_json::to_value(status)?);
        let outcome = self.gateway.update(Table::Brokers, &by_id(broker_id), patch).await;
        self.reconcile("set_broker_status", outcome, |s| {
            if let Some(broker) = s.broker_mut(broker_id) {
                broker.status = previous;
            }
        })
    }

    /// Profile edit by the broker themselves (or an admin)
    pub async fn update_broker(&self, broker_id: &str, update: BrokerUpdate) -> Result<()> {
        if let Some(phone) = update.phone.as_deref() {
            validation::validate_phone("phone", phone)?;
        }
        let previous = self
            .mutate_if(|s| {
                let broker = s.broker_mut(broker_id)?;
                let previous = broker.clone();
                update.apply(broker);
                s.sync_session_broker(broker_id);
                Some(previous)
            })
            .ok_or_else(|| Error::not_found("broker", broker_id))?;

        let outcome = match to_row(&update) {
            Ok(patch) => self.gateway.update(Table::Brokers, &by_id(broker_id), patch).await,
            Err(e) => Err(e),
        };
        self.reconcile("update_broker", outcome, |s| {
            if let Some(broker) = s.broker_mut(broker_id) {
                *broker = previous;
            }
            s.sync_session_broker(broker_id);
        })
    }

    /// Hard delete, admin only. Listings of the broker go with them.
    pub async fn delete_broker(&self, broker_id: &str) -> Result<()> {
        self.require_admin()?;
        let removed = self
            .mutate_if(|s| {
                let index = s.brokers.iter().position(|b| b.id == broker_id)?;
                let broker = s.brokers.remove(index);
                let (listings, kept): (Vec<PropertyListing>, Vec<PropertyListing>) = std::mem::take(&mut s.properties)
                    .into_iter()
                    .partition(|p| p.broker_id == broker_id);
                s.properties = kept;
                Some((index, broker, listings))
            })
            .ok_or_else(|| Error::not_found("broker", broker_id))?;
        warn!("Deleting broker {} and {} listings", broker_id, removed.2.len());

        let mut outcome = self
            .gateway
            .delete(Table::Properties, &Filter::eq("broker_id", broker_id))
            .await;
        if outcome.is_ok() {
            outcome = self.gateway.delete(Table::Brokers, &by_id(broker_id)).await;
        }

        let (index, broker, listings) = removed;
        self.reconcile("delete_broker", outcome, move |s| {
            let index = index.min(s.brokers.len());
            s.brokers.insert(index, broker);
            s.properties.extend(listings);
        })
    }

    /// Broker owning `code`, if any
    pub fn broker_by_referral_code(&self, code: &str) -> Option<BrokerProfile> {
        let code = code.trim().to_uppercase();
        self.read(|s| s.brokers.iter().find(|b| b.referral_code == code).cloned())
    }
}
