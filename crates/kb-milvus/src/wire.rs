//! Request bodies and response decoding for the Milvus v2 REST API

use serde::Deserialize;
use serde_json::{Value, json};

use kb_core::vector_store::{CONTENT_FIELD, ID_FIELD, METADATA_FIELD, VECTOR_FIELD};
use kb_core::{CollectionConfig, Error, IndexRecord, Result, SearchRequest, SearchResult};

/// Returned by `collections/load` when the collection is already loaded
const CODE_ALREADY_LOADED: i64 = 65535;

/// Envelope wrapping every Milvus REST response
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Unwrap the payload, turning a non-zero code into a store error
    pub fn into_data(self, operation: &str) -> Result<Value> {
        if self.code == 0 {
            Ok(self.data)
        } else {
            Err(self.into_error(operation))
        }
    }

    pub fn into_error(self, operation: &str) -> Error {
        Error::VectorStore(format!(
            "milvus {} failed with code {}: {}",
            operation,
            self.code,
            self.message.unwrap_or_default()
        ))
    }

    pub fn is_loaded(&self) -> bool {
        self.code == 0 || self.code == CODE_ALREADY_LOADED
    }
}

pub(crate) fn create_collection_body(database: &str, config: &CollectionConfig) -> Value {
    json!({
        "dbName": database,
        "collectionName": config.name,
        "schema": {
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": ID_FIELD,
                    "dataType": "VarChar",
                    "isPrimary": true,
                    "elementTypeParams": { "max_length": config.id_max_length.to_string() }
                },
                {
                    "fieldName": VECTOR_FIELD,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": config.dimension.to_string() }
                },
                {
                    "fieldName": CONTENT_FIELD,
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": config.content_max_length.to_string() }
                },
                {
                    "fieldName": METADATA_FIELD,
                    "dataType": "JSON"
                }
            ]
        },
        "indexParams": [
            {
                "fieldName": VECTOR_FIELD,
                "indexName": format!("{}_idx", VECTOR_FIELD),
                "metricType": config.metric.as_str(),
                "params": { "index_type": "IVF_FLAT", "nlist": config.nlist }
            }
        ],
        "params": { "shardsNum": config.shards }
    })
}

pub(crate) fn insert_body(database: &str, collection: &str, records: &[IndexRecord]) -> Value {
    let rows: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                ID_FIELD: record.id,
                VECTOR_FIELD: record.vector,
                CONTENT_FIELD: record.content,
                METADATA_FIELD: record.metadata,
            })
        })
        .collect();

    json!({
        "dbName": database,
        "collectionName": collection,
        "data": rows,
    })
}

pub(crate) fn search_body(database: &str, collection: &str, request: &SearchRequest) -> Value {
    json!({
        "dbName": database,
        "collectionName": collection,
        "data": [request.vector],
        "annsField": VECTOR_FIELD,
        "limit": request.top_k,
        "outputFields": [ID_FIELD, CONTENT_FIELD, METADATA_FIELD],
        "searchParams": {
            "metricType": request.metric.as_str(),
            "params": { "nprobe": request.nprobe }
        }
    })
}

/// Read a count such as `insertCount` from a response payload
pub(crate) fn read_count(data: &Value, field: &str) -> Option<u64> {
    data.get(field).and_then(Value::as_u64)
}

/// Decode the `collections/list` payload, an array of names
pub(crate) fn parse_collection_names(data: Value) -> Result<Vec<String>> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(data).map_err(|e| {
        Error::VectorStore(format!("unexpected milvus collection list payload: {}", e))
    })
}

/// Decode search hits in the order Milvus ranked them
pub(crate) fn parse_hits(data: Value) -> Result<Vec<SearchResult>> {
    let rows = match data {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(Error::VectorStore(format!(
                "unexpected milvus search payload: {}",
                other
            )));
        }
    };

    rows.into_iter().map(parse_hit).collect()
}

fn parse_hit(row: Value) -> Result<SearchResult> {
    let id = match row.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(Error::VectorStore(format!(
                "milvus search hit without id: {}",
                row
            )));
        }
    };

    let score = row
        .get("distance")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::VectorStore(format!("milvus search hit without distance: {}", row)))?
        as f32;

    let content = row
        .get(CONTENT_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // Older servers return JSON fields as encoded strings
    let metadata = match row.get(METADATA_FIELD) {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(value) => value.clone(),
        None => Value::Null,
    };

    Ok(SearchResult {
        id,
        content,
        score,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hits_keeps_rank_order() {
        let data = json!([
            {"id": "b", "distance": 0.12, "content": "second", "metadata": {"_source": "/b.md"}},
            {"id": "a", "distance": 0.48, "content": "first", "metadata": {"_source": "/a.md"}}
        ]);

        let hits = parse_hits(data).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[1].id, "a");
        assert!((hits[0].score - 0.12).abs() < 1e-6);
        assert_eq!(hits[0].metadata["_source"], "/b.md");
    }

    #[test]
    fn test_parse_hits_decodes_string_metadata() {
        let data = json!([
            {"id": 7, "distance": 1.0, "content": "x", "metadata": "{\"_source\":\"/c.md\"}"}
        ]);

        let hits = parse_hits(data).unwrap();
        assert_eq!(hits[0].id, "7");
        assert_eq!(hits[0].metadata["_source"], "/c.md");
    }

    #[test]
    fn test_parse_hits_empty() {
        assert!(parse_hits(Value::Null).unwrap().is_empty());
        assert!(parse_hits(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_hit_without_distance_is_error() {
        let data = json!([{"id": "a", "content": "x"}]);
        assert!(matches!(parse_hits(data), Err(Error::VectorStore(_))));
    }

    #[test]
    fn test_parse_collection_names() {
        assert_eq!(
            parse_collection_names(json!(["biz", "faq"])).unwrap(),
            vec!["biz".to_string(), "faq".to_string()]
        );
        assert!(parse_collection_names(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_collection_list_is_error() {
        assert!(matches!(
            parse_collection_names(json!({"collections": "biz"})),
            Err(Error::VectorStore(_))
        ));
        assert!(matches!(
            parse_collection_names(json!([1, 2])),
            Err(Error::VectorStore(_))
        ));
    }

    #[test]
    fn test_envelope_codes() {
        let ok: Envelope = serde_json::from_value(json!({"code": 0, "data": {"insertCount": 2}})).unwrap();
        assert!(ok.is_loaded());
        let data = ok.into_data("insert").unwrap();
        assert_eq!(read_count(&data, "insertCount"), Some(2));

        let loaded: Envelope =
            serde_json::from_value(json!({"code": 65535, "message": "already loaded"})).unwrap();
        assert!(loaded.is_loaded());

        let failed: Envelope =
            serde_json::from_value(json!({"code": 1100, "message": "collection not found"})).unwrap();
        assert!(!failed.is_loaded());
        let err = failed.into_data("search").unwrap_err();
        assert!(err.to_string().contains("collection not found"));
    }
}
