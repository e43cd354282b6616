//! Change feed for push-based cache invalidation.
//!
//! Every committed write publishes a [`ChangeEvent`] on the channel of the table it touched.
//! Subscribers receive events for one table only.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Backend tables that publish change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Brands,
    BrandPocs,
    Campaigns,
    Influencers,
    CampaignInfluencers,
    UserRoles,
    CampaignVideos,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Brands,
        Table::BrandPocs,
        Table::Campaigns,
        Table::Influencers,
        Table::CampaignInfluencers,
        Table::UserRoles,
        Table::CampaignVideos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Brands => "brands",
            Table::BrandPocs => "brand_pocs",
            Table::Campaigns => "campaigns",
            Table::Influencers => "influencers",
            Table::CampaignInfluencers => "campaign_influencers",
            Table::UserRoles => "user_roles",
            Table::CampaignVideos => "campaign_videos",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change on one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: String,
    pub revision_id: i64,
}

/// One broadcast channel per table.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    channels: HashMap<Table, broadcast::Sender<ChangeEvent>>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = Table::ALL
            .iter()
            .map(|table| (*table, broadcast::channel(capacity).0))
            .collect();
        Self { channels }
    }

    /// Open a receiver for a single table.
    pub fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let table = event.table;
        match self.sender(table).send(event) {
            Ok(receivers) => tracing::trace!(%table, receivers, "Change event published"),
            Err(_) => tracing::trace!(%table, "Change event dropped, no subscribers"),
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, table: Table) -> usize {
        self.sender(table).receiver_count()
    }

    fn sender(&self, table: Table) -> &broadcast::Sender<ChangeEvent> {
        // Every table gets a channel in `new`.
        &self.channels[&table]
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(table: Table, id: &str) -> ChangeEvent {
        ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            id: id.to_string(),
            revision_id: 1,
        }
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_their_table() {
        let feed = ChangeFeed::new(8);
        let mut brands = feed.subscribe(Table::Brands);
        let mut campaigns = feed.subscribe(Table::Campaigns);

        feed.publish(event(Table::Brands, "b1"));

        assert_eq!(brands.recv().await.unwrap().id, "b1");
        assert!(matches!(
            campaigns.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::new(8);
        feed.publish(event(Table::UserRoles, "r1"));
        assert_eq!(feed.subscriber_count(Table::UserRoles), 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(event(Table::BrandPocs, "p1")).unwrap();
        assert_eq!(json["table"], "brand_pocs");
        assert_eq!(json["kind"], "INSERT");
        assert_eq!(json["revisionId"], 1);
    }
}
