use super::{auto_id, DocumentStore};
use crate::config::AppConfig;
use crate::document::{DocPath, Document, Fields};
use crate::error::StoreError;
use crate::live::LiveStream;
use crate::models::TIMESTAMP_FIELDS;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
const PAGE_SIZE: &str = "300";

/// Firestore over its REST API. There is no push channel over REST, so live
/// streams poll and publish only when the fetched snapshot differs.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    /// `{endpoint}/v1/projects/{project}/databases/{db}/documents`
    base_url: String,
    /// Resource name prefix: `projects/{project}/databases/{db}/documents`
    name_prefix: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<RawDocument>,
}

impl FirestoreStore {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        database: &str,
        api_key: Option<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let client = Client::builder()
            .user_agent(concat!("apk-store/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        let name_prefix = format!("projects/{}/databases/{}/documents", project_id, database);
        Self {
            client,
            base_url: format!("{}/v1/{}", endpoint.trim_end_matches('/'), name_prefix),
            name_prefix,
            api_key,
            poll_interval,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let project_id = config.project_id.as_deref().ok_or_else(|| {
            StoreError::Config("no Firestore project configured (project_id)".to_string())
        })?;
        Ok(Self::new(
            config
                .firestore_endpoint
                .as_deref()
                .unwrap_or(DEFAULT_ENDPOINT),
            project_id,
            &config.database,
            config.api_key.clone(),
            Duration::from_secs(config.http_timeout_secs),
            Duration::from_secs(config.poll_interval_secs.max(1)),
        ))
    }

    fn url(&self, path: &DocPath) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.query(&[("key", key)]),
            None => req,
        }
    }

    async fn check(resp: Response, resource: &str) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        log::debug!("Firestore {} -> {}: {}", resource, status, body);
        Err(StoreError::from_status(status, resource, body))
    }

    fn to_document(&self, raw: RawDocument) -> Result<Document, StoreError> {
        let relative = raw
            .name
            .strip_prefix(&self.name_prefix)
            .map(|s| s.trim_start_matches('/'))
            .ok_or_else(|| StoreError::InvalidPath(raw.name.clone()))?;
        let path = DocPath::document(relative)?;
        let fields = decode_fields(&raw.fields)
            .map_err(|e| crate::error::DecodeError::new(path.to_string(), e))?;
        Ok(Document::new(path, fields))
    }

    async fn fetch_document(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let resp = self
            .with_key(self.client.get(self.url(path)))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawDocument = Self::check(resp, &path.to_string()).await?.json().await?;
        self.to_document(raw).map(Some)
    }

    async fn fetch_collection(&self, collection: &DocPath) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .with_key(self.client.get(self.url(collection)))
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let resp = Self::check(req.send().await?, &collection.to_string()).await?;
            let page: ListResponse = resp.json().await?;
            for raw in page.documents {
                documents.push(self.to_document(raw)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        if !path.is_document() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.fetch_document(path).await
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        if !path.is_document() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        // PATCH without an update mask replaces the whole document, creating it if needed.
        let body = json!({ "fields": encode_fields(&fields) });
        let resp = self
            .with_key(self.client.patch(self.url(path)))
            .json(&body)
            .send()
            .await?;
        Self::check(resp, &path.to_string()).await?;
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        if !path.is_document() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut query: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", quote_field_path(k)))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));

        let body = json!({ "fields": encode_fields(&fields) });
        let resp = self
            .with_key(self.client.patch(self.url(path)))
            .query(&query)
            .json(&body)
            .send()
            .await?;
        Self::check(resp, &path.to_string()).await?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        if !path.is_document() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let resp = self
            .with_key(self.client.delete(self.url(path)))
            .send()
            .await?;
        // Firestore answers 200 for missing documents as well; tolerate 404 from emulators.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp, &path.to_string()).await?;
        Ok(())
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<Document>, StoreError> {
        if !collection.is_collection() {
            return Err(StoreError::InvalidPath(collection.to_string()));
        }
        self.fetch_collection(collection).await
    }

    async fn query_eq(
        &self,
        collection: &DocPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        if !collection.is_collection() {
            return Err(StoreError::InvalidPath(collection.to_string()));
        }
        let parent_url = match collection.parent() {
            Some(parent) => self.url(&parent),
            None => self.base_url.clone(),
        };
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection.id() }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": quote_field_path(field) },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });
        let resp = self
            .with_key(self.client.post(format!("{}:runQuery", parent_url)))
            .json(&body)
            .send()
            .await?;
        let items: Vec<RunQueryItem> = Self::check(resp, &collection.to_string())
            .await?
            .json()
            .await?;

        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|raw| self.to_document(raw))
            .collect()
    }

    fn new_document_id(&self, _collection: &DocPath) -> String {
        auto_id()
    }

    async fn watch_document(
        &self,
        path: &DocPath,
    ) -> Result<LiveStream<Option<Document>>, StoreError> {
        let initial = self.get(path).await?;
        let (tx, rx) = watch::channel(initial.clone());
        let store = self.clone();
        let path = path.clone();

        let producer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut last = initial;
            loop {
                ticker.tick().await;
                match store.fetch_document(&path).await {
                    Ok(next) if next != last => {
                        last = next.clone();
                        if tx.send(next).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Polling {} failed: {}", path, e),
                }
            }
        });
        Ok(LiveStream::new(rx, producer))
    }

    async fn watch_collection(
        &self,
        collection: &DocPath,
    ) -> Result<LiveStream<Vec<Document>>, StoreError> {
        let initial = self.list(collection).await?;
        let (tx, rx) = watch::channel(initial.clone());
        let store = self.clone();
        let collection = collection.clone();

        let producer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut last = initial;
            loop {
                ticker.tick().await;
                match store.fetch_collection(&collection).await {
                    Ok(next) if next != last => {
                        last = next.clone();
                        if tx.send(next).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Polling {} failed: {}", collection, e),
                }
            }
        });
        Ok(LiveStream::new(rx, producer))
    }
}

/// Backtick-quotes field names that are not plain identifiers.
fn quote_field_path(field: &str) -> String {
    let simple = field
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

pub(crate) fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_field(k, v)))
            .collect(),
    )
}

/// Timestamp fields holding an RFC 3339 string go out as `timestampValue`.
fn encode_field(name: &str, value: &Value) -> Value {
    if TIMESTAMP_FIELDS.contains(&name) {
        if let Some(ts) = value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            let utc = ts.with_timezone(&Utc);
            return json!({ "timestampValue": utc.to_rfc3339_opts(SecondsFormat::AutoSi, true) });
        }
    }
    encode_value(value)
}

/// JSON value to Firestore's typed value representation.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Result<Fields, String> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|d| (k.clone(), d)))
        .collect()
}

/// Firestore typed value back to plain JSON. Timestamps, references and
/// bytes come back as strings.
pub(crate) fn decode_value(value: &Value) -> Result<Value, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected a typed value, got {}", value))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| "empty typed value".to_string())?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| format!("bad booleanValue: {}", inner)),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| format!("bad integerValue: {}", inner))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            // NaN/Infinity have no JSON form
            Ok(parsed
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| format!("bad {}: {}", kind, inner)),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            decode_fields(&fields).map(Value::Object)
        }
        other => Err(format!("unsupported value type '{}'", other)),
    }
}
