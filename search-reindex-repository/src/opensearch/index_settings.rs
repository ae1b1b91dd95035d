//! Settings applied to freshly created reindex indices.

use serde_json::{json, Value};

/// Settings and base mappings of a reindex index.
///
/// Documents are indexed with dynamic mappings; only the fields every
/// resource carries are mapped explicitly.
pub fn index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "refresh_interval": "1s"
        },
        "mappings": {
            "properties": {
                "id": {
                    "type": "keyword"
                },
                "tenantId": {
                    "type": "keyword"
                },
                "shared": {
                    "type": "boolean"
                }
            }
        }
    })
}
