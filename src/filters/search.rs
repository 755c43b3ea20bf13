use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::location_matches;
use crate::models::{BrokerProfile, BrokerStatus, ListingType, PropertyCategory, PropertyListing};

/// Which listing attribute the free-text query is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBy {
    #[default]
    City,
    District,
    Village,
    Agent,
}

/// Search form state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySearch {
    pub by: SearchBy,
    pub query: String,
    pub category: Option<PropertyCategory>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Show listings that are inactive or past their validity window
    pub include_expired: bool,
}

impl PropertySearch {
    pub fn by(by: SearchBy, query: impl Into<String>) -> Self {
        Self {
            by,
            query: query.into(),
            ..Default::default()
        }
    }
}

fn agent_matches(listing: &PropertyListing, brokers: &[BrokerProfile], query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    brokers
        .iter()
        .find(|b| b.id == listing.broker_id)
        .map_or(false, |broker| {
            broker.name.to_lowercase().contains(&query)
                || broker
                    .company_name
                    .as_deref()
                    .map_or(false, |c| c.to_lowercase().contains(&query))
        })
}

fn text_matches(listing: &PropertyListing, brokers: &[BrokerProfile], search: &PropertySearch) -> bool {
    match search.by {
        SearchBy::City => location_matches(&listing.city, &search.query),
        SearchBy::District => location_matches(&listing.district, &search.query),
        SearchBy::Village => {
            let village = listing.village.as_deref().unwrap_or(&listing.address);
            location_matches(village, &search.query)
        }
        SearchBy::Agent => agent_matches(listing, brokers, &search.query),
    }
}

/// Listings satisfying `search`, in their stored order
pub fn search_properties<'a>(
    properties: &'a [PropertyListing],
    brokers: &[BrokerProfile],
    search: &PropertySearch,
    now: DateTime<Utc>,
) -> Vec<&'a PropertyListing> {
    properties
        .iter()
        .filter(|p| search.include_expired || p.is_live(now))
        .filter(|p| search.category.map_or(true, |c| p.category == c))
        .filter(|p| search.listing_type.map_or(true, |t| p.listing_type == t))
        .filter(|p| search.min_price.map_or(true, |min| p.price >= min))
        .filter(|p| search.max_price.map_or(true, |max| p.price <= max))
        .filter(|p| text_matches(p, brokers, search))
        .collect()
}

/// Brokers in one approval state, for the admin console tabs
pub fn brokers_by_status(brokers: &[BrokerProfile], status: BrokerStatus) -> Vec<&BrokerProfile> {
    brokers.iter().filter(|b| b.status == status).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{broker, listing};
    use chrono::Duration;

    #[test]
    fn city_search_honours_aliases() {
        let properties = vec![
            listing("p1", "b1", "Mangalore"),
            listing("p2", "b1", "MANGALURU"),
            listing("p3", "b1", "Udupi"),
        ];
        let found = search_properties(&properties, &[], &PropertySearch::by(SearchBy::City, "mangaluru"), Utc::now());
        let ids: Vec<&str> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn expired_listings_hidden_unless_requested() {
        let mut old = listing("p1", "b1", "Udupi");
        old.expires_at = Utc::now() - Duration::days(1);
        let mut paused = listing("p2", "b1", "Udupi");
        paused.is_active = false;
        let properties = vec![old, paused, listing("p3", "b1", "Udupi")];

        let mut search = PropertySearch::default();
        assert_eq!(search_properties(&properties, &[], &search, Utc::now()).len(), 1);

        search.include_expired = true;
        assert_eq!(search_properties(&properties, &[], &search, Utc::now()).len(), 3);
    }

    #[test]
    fn agent_search_uses_owner_name() {
        let mut asha = broker("b1", "AAA111");
        asha.name = "Asha Rao".to_string();
        let ravi = broker("b2", "BBB222");
        let properties = vec![listing("p1", "b1", "Udupi"), listing("p2", "b2", "Udupi")];

        let found = search_properties(
            &properties,
            &[asha, ravi],
            &PropertySearch::by(SearchBy::Agent, "asha"),
            Utc::now(),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
    }

    #[test]
    fn price_and_type_filters_combine() {
        let mut rent = listing("p1", "b1", "Udupi");
        rent.listing_type = ListingType::Rent;
        rent.price = 15_000;
        let sale = listing("p2", "b1", "Udupi");
        let properties = vec![rent, sale];

        let search = PropertySearch {
            listing_type: Some(ListingType::Rent),
            max_price: Some(20_000),
            ..Default::default()
        };
        let found = search_properties(&properties, &[], &search, Utc::now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
    }

    #[test]
    fn status_tabs() {
        let mut approved = broker("b1", "AAA111");
        approved.status = BrokerStatus::Approved;
        let brokers = vec![approved, broker("b2", "BBB222")];
        assert_eq!(brokers_by_status(&brokers, BrokerStatus::Pending).len(), 1);
        assert_eq!(brokers_by_status(&brokers, BrokerStatus::Rejected).len(), 0);
    }
}
