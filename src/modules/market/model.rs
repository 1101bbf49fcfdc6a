use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// EXTERNAL API PAYLOAD
// =============================================================================

/// One listing as returned by the market API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub kind: i32,
    pub quantity: i64,
    pub quality: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub fees: i64,
    pub posted: DateTime<Utc>,
    pub seller: Seller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: i64,
    pub company: String,
    #[serde(rename = "realmId")]
    pub realm_id: i32,
    #[serde(default)]
    pub certificates: i32,
    #[serde(default)]
    pub contest_wins: i32,
    #[serde(default)]
    pub npc: bool,
}

// =============================================================================
// STORED ROWS
// =============================================================================

pub const DATA_SOURCE_API: &str = "api";

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MarketRecord {
    pub market_id: i64,
    pub kind: i32,
    pub quantity: i64,
    pub quality: i32,
    pub price: Decimal,
    pub seller_id: i64,
    pub seller_name: String,
    pub seller_realm_id: i32,
    pub seller_certificates: i32,
    pub seller_contest_wins: i32,
    pub seller_is_npc: bool,
    pub fees: i64,
    pub posted_time: DateTime<Utc>,
    pub batch_id: i64,
    pub data_version: i32,
    pub is_valid: bool,
    pub data_source: String,
}

impl MarketRecord {
    /// Row for a sighting of `listing`. A first sighting carries version 1.
    pub fn from_listing(listing: &Listing, batch_id: i64, data_version: i32) -> Self {
        Self {
            market_id: listing.id,
            kind: listing.kind,
            quantity: listing.quantity,
            quality: listing.quality,
            price: listing.price,
            seller_id: listing.seller.id,
            seller_name: listing.seller.company.clone(),
            seller_realm_id: listing.seller.realm_id,
            seller_certificates: listing.seller.certificates,
            seller_contest_wins: listing.seller.contest_wins,
            seller_is_npc: listing.seller.npc,
            fees: listing.fees,
            posted_time: listing.posted,
            batch_id,
            data_version,
            is_valid: true,
            data_source: DATA_SOURCE_API.to_string(),
        }
    }

    /// Overwrites the mutable fields from a later sighting. Identity fields
    /// (kind, seller id/name/realm, npc flag, validity, source) stay as first seen.
    pub fn apply_update(&mut self, update: &MarketRecord) {
        self.quantity = update.quantity;
        self.quality = update.quality;
        self.price = update.price;
        self.seller_certificates = update.seller_certificates;
        self.seller_contest_wins = update.seller_contest_wins;
        self.fees = update.fees;
        self.posted_time = update.posted_time;
        self.batch_id = update.batch_id;
        self.data_version = update.data_version;
    }
}

/// Writes for one merge, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct MergeBatch {
    /// Known ids, `data_version` already bumped.
    pub updates: Vec<MarketRecord>,
    pub inserts: Vec<MarketRecord>,
}

impl MergeBatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub total_count: i64,
    pub batch_count: i64,
    pub last_batch_count: i64,
    pub last_update_time: Option<DateTime<Utc>>,
}
