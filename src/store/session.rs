use tracing::{info, warn};

use super::{Store, StoreState};
use crate::error::{Error, Result};
use crate::gateway::{from_row, Filter, Query, Table};
use crate::models::{AdminProfile, BrokerProfile, PropertyListing, Session};

impl Store {
    /// Install a session the caller already authenticated
    pub fn login(&self, session: Session) {
        info!("Session started for {} (admin: {})", session.user_id(), session.is_admin());
        self.mutate(|s| s.session = Some(session));
    }

    /// Drop the session and everything scoped to it
    pub fn logout(&self) {
        self.mutate(|s| {
            s.session = None;
            s.leads.clear();
            s.chat_messages.clear();
        });
    }

    pub fn set_properties(&self, properties: Vec<PropertyListing>) {
        self.mutate(|s| s.properties = properties);
    }

    pub fn set_brokers(&self, brokers: Vec<BrokerProfile>) {
        self.mutate(|s| s.brokers = brokers);
    }

    pub fn session(&self) -> Option<Session> {
        self.read(|s| s.session.clone())
    }

    pub fn is_admin_session(&self) -> bool {
        self.read(StoreState::is_admin_session)
    }

    /// Authenticate and resolve the account to an admin or broker profile
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let auth = self.gateway.sign_in(email, password).await?;
        let by_email = Query::all().filter(Filter::eq("email", auth.email.clone())).limit(1);

        let session = if let Some(row) = self.gateway.select(Table::Admins, &by_email).await?.pop() {
            Session::Admin(from_row::<AdminProfile>(row)?)
        } else if let Some(row) = self.gateway.select(Table::Brokers, &by_email).await?.pop() {
            Session::Broker(from_row::<BrokerProfile>(row)?)
        } else {
            warn!("Signed in as {} but no profile exists", auth.email);
            self.gateway.sign_out().await?;
            return Err(Error::not_found("profile", auth.email));
        };

        self.login(session.clone());
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.logout();
        self.gateway.sign_out().await
    }

    pub async fn update_password(&self, new_password: &str) -> Result<()> {
        self.require_user()?;
        crate::validation::validate_password(new_password)?;
        self.gateway.update_password(new_password).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::SyncPolicy;
    use crate::gateway::{to_row, Gateway, Table};
    use crate::models::Session;

    #[tokio::test]
    async fn sign_in_resolves_admin_before_broker() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        gateway.add_user("admin@example.com", "secret-pass");
        gateway.seed(
            Table::Admins,
            vec![to_row(&serde_json::json!({"id": "admin-1", "email": "admin@example.com"})).unwrap()],
        );

        let session = store.sign_in("admin@example.com", "secret-pass").await.unwrap();
        assert!(session.is_admin());
        assert!(store.is_admin_session());
    }

    #[tokio::test]
    async fn sign_in_as_broker_and_out_again() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        let profile = broker("b1", "AAA111");
        gateway.add_user(&profile.email, "secret-pass");
        gateway.seed(Table::Brokers, vec![to_row(&profile).unwrap()]);

        let session = store.sign_in(&profile.email, "secret-pass").await.unwrap();
        assert_eq!(session, Session::Broker(profile));

        store.sign_out().await.unwrap();
        assert!(store.session().is_none());
        assert!(gateway.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_in_without_profile_fails_and_signs_out() {
        let (store, gateway) = store_with(SyncPolicy::KeepOptimistic);
        gateway.add_user("ghost@example.com", "secret-pass");

        assert!(store.sign_in("ghost@example.com", "secret-pass").await.is_err());
        assert!(store.session().is_none());
        assert!(gateway.current_session().await.unwrap().is_none());
    }
}
