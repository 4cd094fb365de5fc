//! Domain model returned by the product clients

use chrono::{DateTime, Utc};
use product_proto as pb;
use serde::{Deserialize, Serialize};

/// A product as seen by consumers of the product service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub stock: i64,
    pub description: String,
    pub image_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn timestamp(ts: Option<prost_types::Timestamp>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).ok()?))
}

impl From<pb::Product> for Product {
    fn from(p: pb::Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            stock: p.stock,
            description: p.description,
            image_url: p.image_url,
            created_at: timestamp(p.created_at),
            updated_at: timestamp(p.updated_at),
            deleted_at: timestamp(p.deleted_at),
        }
    }
}

/// Ids matching a search, plus the total match count
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub ids: Vec<i64>,
    pub count: i64,
}

impl From<pb::SearchResponse> for SearchResult {
    fn from(r: pb::SearchResponse) -> Self {
        Self {
            ids: r.ids,
            count: r.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_proto_converts_timestamps() {
        let product = Product::from(pb::Product {
            id: 42,
            name: "Lamp".into(),
            created_at: Some(prost_types::Timestamp {
                seconds: 1_700_000_000,
                nanos: 500,
            }),
            ..Default::default()
        });

        assert_eq!(product.id, 42);
        let created = product.created_at.unwrap();
        assert_eq!(created.timestamp(), 1_700_000_000);
        assert_eq!(created.timestamp_subsec_nanos(), 500);
        assert!(product.deleted_at.is_none());
    }

    #[test]
    fn test_json_tolerates_missing_fields() {
        let product: Product =
            serde_json::from_str(r#"{"id":7,"name":"Mug","created_at":"2024-03-01T10:00:00Z"}"#)
                .unwrap();
        assert_eq!(product.id, 7);
        assert_eq!(product.stock, 0);
        assert!(product.created_at.is_some());
    }
}
