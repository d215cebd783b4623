//! I3X client implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::connection::{encode_path_segment, Connection};
use crate::error::{I3xError, Result};
use crate::handlers::EventHandlers;
use crate::streaming::{ErrorSink, EventSink, SubscriptionRegistry};
use crate::types::*;

/// I3X server client
///
/// Wraps a [`Connection`] for request/response calls and a
/// [`SubscriptionRegistry`] for live value streams, and routes stream events
/// to the registered [`EventHandlers`].
///
/// # Example
///
/// ```rust,no_run
/// use i3x_client::{EventHandlers, I3xClient};
///
/// # async fn example() -> i3x_client::Result<()> {
/// let client = I3xClient::new("https://i3x.example.com")?.with_handlers(
///     EventHandlers::new().on_value_change(|change| {
///         println!("{} = {:?}", change.element_id, change.latest());
///     }),
/// );
///
/// client.connect().await?;
/// let sub = client.subscribe(&["obj-1"], 0).await?;
/// // ...
/// client.unsubscribe(&sub.subscription_id).await?;
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct I3xClient {
    connection: Arc<Connection>,
    registry: RwLock<Option<Arc<SubscriptionRegistry>>>,
    handlers: Arc<EventHandlers>,
    grace_period: Duration,
}

impl I3xClient {
    /// Create a new client with default configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the I3X server (e.g., "http://localhost:8080/api")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let connection = Arc::new(Connection::new(&config)?);

        Ok(Self {
            connection,
            registry: RwLock::new(None),
            handlers: Arc::new(EventHandlers::default()),
            grace_period: config.timeouts.stop_grace(),
        })
    }

    /// Install callbacks. Streams started afterwards use them.
    pub fn with_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.connection.base_url()
    }

    /// Shared connection, for issuing custom requests
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    /// Open the connection (probing the server) and prepare streaming
    #[instrument(skip(self), fields(base_url = %self.base_url()))]
    pub async fn connect(&self) -> Result<()> {
        self.connection.open().await?;

        {
            let mut registry = self.registry.write();
            if registry.is_none() {
                *registry = Some(Arc::new(self.build_registry()));
            }
        }

        info!("Connected");
        self.handlers.emit_connect();
        Ok(())
    }

    /// Stop every stream, then close the connection
    #[instrument(skip(self), fields(base_url = %self.base_url()))]
    pub async fn disconnect(&self) {
        let registry = self.registry.write().take();
        if let Some(registry) = registry {
            registry.stop_all().await;
        }

        self.connection.close();
        info!("Disconnected");
        self.handlers.emit_disconnect();
    }

    fn build_registry(&self) -> SubscriptionRegistry {
        let handlers = self.handlers.clone();
        let on_event: EventSink = Arc::new(move |changes| handlers.emit_value_changes(&changes));

        let handlers = self.handlers.clone();
        let on_error: ErrorSink = Arc::new(move |err| handlers.emit_error(&err));

        SubscriptionRegistry::new(self.connection.clone(), on_event, on_error)
            .with_grace_period(self.grace_period)
    }

    fn registry(&self) -> Option<Arc<SubscriptionRegistry>> {
        self.registry.read().clone()
    }

    // =========================================================================
    // Exploratory Operations
    // =========================================================================

    /// List all namespaces
    #[instrument(skip(self))]
    pub async fn get_namespaces(&self) -> Result<Vec<Namespace>> {
        self.connection
            .request_json(Method::GET, "/namespaces", None, None)
            .await
    }

    /// List object types, optionally filtered by namespace
    #[instrument(skip(self))]
    pub async fn get_object_types(&self, namespace_uri: Option<&str>) -> Result<Vec<ObjectType>> {
        let query = namespace_query(namespace_uri);
        self.connection
            .request_json(Method::GET, "/objecttypes", query.as_deref(), None)
            .await
    }

    /// Look up object types by element ID
    #[instrument(skip(self))]
    pub async fn query_object_types(&self, element_ids: &[&str]) -> Result<Vec<ObjectType>> {
        let body = json!({ "elementIds": element_ids });
        self.connection
            .request_json(Method::POST, "/objecttypes/query", None, Some(&body))
            .await
    }

    /// List relationship types, optionally filtered by namespace
    #[instrument(skip(self))]
    pub async fn get_relationship_types(
        &self,
        namespace_uri: Option<&str>,
    ) -> Result<Vec<RelationshipType>> {
        let query = namespace_query(namespace_uri);
        self.connection
            .request_json(Method::GET, "/relationshiptypes", query.as_deref(), None)
            .await
    }

    /// Look up relationship types by element ID
    #[instrument(skip(self))]
    pub async fn query_relationship_types(
        &self,
        element_ids: &[&str],
    ) -> Result<Vec<RelationshipType>> {
        let body = json!({ "elementIds": element_ids });
        self.connection
            .request_json(Method::POST, "/relationshiptypes/query", None, Some(&body))
            .await
    }

    /// List object instances, optionally filtered by type
    #[instrument(skip(self))]
    pub async fn get_objects(
        &self,
        type_id: Option<&str>,
        include_metadata: bool,
    ) -> Result<Vec<ObjectInstance>> {
        let mut query = Vec::new();
        if let Some(type_id) = type_id {
            query.push(("typeId", type_id.to_string()));
        }
        if include_metadata {
            query.push(("includeMetadata", "true".to_string()));
        }
        let query = (!query.is_empty()).then_some(query);

        self.connection
            .request_json(Method::GET, "/objects", query.as_deref(), None)
            .await
    }

    /// Get a single object by element ID
    #[instrument(skip(self))]
    pub async fn get_object(&self, element_id: &str) -> Result<ObjectInstance> {
        self.list_objects(&[element_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| I3xError::not_found(format!("Object not found: {}", element_id)))
    }

    /// Get several objects by element ID
    #[instrument(skip(self))]
    pub async fn list_objects(&self, element_ids: &[&str]) -> Result<Vec<ObjectInstance>> {
        let body = json!({ "elementIds": element_ids });
        self.connection
            .request_json(Method::POST, "/objects/list", None, Some(&body))
            .await
    }

    /// Get objects related to the given elements through a relationship type
    #[instrument(skip(self))]
    pub async fn get_related_objects(
        &self,
        element_ids: &[&str],
        relationship_type: &str,
    ) -> Result<Vec<ObjectInstance>> {
        let body = json!({
            "elementIds": element_ids,
            "relationshipType": relationship_type,
        });
        self.connection
            .request_json(Method::POST, "/objects/related", None, Some(&body))
            .await
    }

    // =========================================================================
    // Value Operations
    // =========================================================================

    /// Last known value of one element
    #[instrument(skip(self))]
    pub async fn get_value(&self, element_id: &str, max_depth: u32) -> Result<LastKnownValue> {
        let body = json!({ "elementIds": [element_id], "maxDepth": max_depth });
        let values = self.value_map("/objects/value", &body).await?;

        let payload = values
            .get(element_id)
            .ok_or_else(|| I3xError::not_found(format!("No value for: {}", element_id)))?;
        parse_snapshot(element_id, payload)
    }

    /// Last known values of several elements, keyed by element ID
    #[instrument(skip(self))]
    pub async fn get_values(
        &self,
        element_ids: &[&str],
        max_depth: u32,
    ) -> Result<BTreeMap<String, LastKnownValue>> {
        let body = json!({ "elementIds": element_ids, "maxDepth": max_depth });
        let values = self.value_map("/objects/value", &body).await?;

        values
            .iter()
            .map(|(id, payload)| Ok((id.clone(), parse_snapshot(id, payload)?)))
            .collect()
    }

    /// Historical values of one element, optionally bounded in time
    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        element_id: &str,
        start_time: Option<&str>,
        end_time: Option<&str>,
        max_depth: u32,
    ) -> Result<LastKnownValue> {
        let mut body = json!({ "elementIds": [element_id], "maxDepth": max_depth });
        if let Some(start) = start_time {
            body["startTime"] = json!(start);
        }
        if let Some(end) = end_time {
            body["endTime"] = json!(end);
        }

        let values = self.value_map("/objects/history", &body).await?;
        let payload = values
            .get(element_id)
            .ok_or_else(|| I3xError::not_found(format!("No history for: {}", element_id)))?;
        parse_snapshot(element_id, payload)
    }

    /// Write the current value of an element
    #[instrument(skip(self, value))]
    pub async fn update_value(&self, element_id: &str, value: &Value) -> Result<Option<Value>> {
        let path = format!("/objects/{}/value", encode_path_segment(element_id));
        self.connection.put(&path, Some(value)).await
    }

    /// Write historical values of an element
    #[instrument(skip(self, value))]
    pub async fn update_history(&self, element_id: &str, value: &Value) -> Result<Option<Value>> {
        let path = format!("/objects/{}/history", encode_path_segment(element_id));
        self.connection.put(&path, Some(value)).await
    }

    async fn value_map(&self, path: &str, body: &Value) -> Result<Map<String, Value>> {
        self.connection
            .request_json(Method::POST, path, None, Some(body))
            .await
    }

    // =========================================================================
    // Subscriptions (high level)
    // =========================================================================

    /// Create a subscription, register elements and start streaming it.
    ///
    /// Value changes are delivered to `on_value_change`.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, element_ids: &[&str], max_depth: u32) -> Result<Subscription> {
        let subscription_id = self.create_subscription().await?;
        self.register_items(&subscription_id, element_ids, max_depth)
            .await?;
        self.start_stream(&subscription_id)?;

        let subscription = self.get_subscription(&subscription_id).await?;
        debug!(subscription_id = %subscription.subscription_id, "Subscribed");
        self.handlers.emit_subscribe(&subscription);

        Ok(subscription)
    }

    /// Stop streaming and delete the subscription on the server
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.stop_stream(subscription_id).await;
        self.connection
            .delete(&subscription_path(subscription_id))
            .await?;
        Ok(())
    }

    /// Poll queued updates of a subscription
    #[instrument(skip(self))]
    pub async fn sync_subscription(&self, subscription_id: &str) -> Result<Vec<Value>> {
        let path = format!("{}/sync", subscription_path(subscription_id));
        match self.connection.post(&path, None).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(I3xError::Decode(format!(
                "expected an array of updates, got {}",
                other
            ))),
        }
    }

    // =========================================================================
    // Subscriptions (low level)
    // =========================================================================

    /// Create an empty subscription and return its ID
    #[instrument(skip(self))]
    pub async fn create_subscription(&self) -> Result<String> {
        let response: CreateSubscriptionResponse = self
            .connection
            .request_json(Method::POST, "/subscriptions", None, Some(&json!({})))
            .await?;
        Ok(response.subscription_id)
    }

    /// Add elements to a subscription
    #[instrument(skip(self))]
    pub async fn register_items(
        &self,
        subscription_id: &str,
        element_ids: &[&str],
        max_depth: u32,
    ) -> Result<Option<Value>> {
        let path = format!("{}/register", subscription_path(subscription_id));
        let body = json!({ "elementIds": element_ids, "maxDepth": max_depth });
        self.connection.post(&path, Some(&body)).await
    }

    /// Remove elements from a subscription
    #[instrument(skip(self))]
    pub async fn unregister_items(
        &self,
        subscription_id: &str,
        element_ids: &[&str],
    ) -> Result<Option<Value>> {
        let path = format!("{}/unregister", subscription_path(subscription_id));
        let body = json!({ "elementIds": element_ids });
        self.connection.post(&path, Some(&body)).await
    }

    /// List subscriptions known to the server
    #[instrument(skip(self))]
    pub async fn get_subscriptions(&self) -> Result<Vec<Value>> {
        let response: SubscriptionListResponse = self
            .connection
            .request_json(Method::GET, "/subscriptions", None, None)
            .await?;
        Ok(response.subscription_ids)
    }

    /// Get details for one subscription
    #[instrument(skip(self))]
    pub async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        self.connection
            .request_json(Method::GET, &subscription_path(subscription_id), None, None)
            .await
    }

    /// Start streaming an existing subscription.
    ///
    /// No-op while it is streaming; restarts a stream that has failed.
    /// Callable from synchronous code: readers run on the runtime that
    /// `connect()` was awaited on.
    pub fn start_stream(&self, subscription_id: &str) -> Result<()> {
        let registry = self.registry().ok_or(I3xError::NotConnected)?;
        registry.add(subscription_id)
    }

    /// Stop streaming without deleting the subscription
    pub async fn stop_stream(&self, subscription_id: &str) {
        if let Some(registry) = self.registry() {
            registry.remove(subscription_id).await;
        }
    }

    pub fn is_streaming(&self, subscription_id: &str) -> bool {
        self.registry()
            .is_some_and(|registry| registry.is_streaming(subscription_id))
    }
}

impl std::fmt::Debug for I3xClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I3xClient")
            .field("base_url", &self.base_url())
            .field("connected", &self.is_connected())
            .field("handlers", &self.handlers)
            .finish()
    }
}

fn subscription_path(subscription_id: &str) -> String {
    format!("/subscriptions/{}", encode_path_segment(subscription_id))
}

fn namespace_query(namespace_uri: Option<&str>) -> Option<Vec<(&'static str, String)>> {
    namespace_uri.map(|ns| vec![("namespaceUri", ns.to_string())])
}

fn parse_snapshot(element_id: &str, payload: &Value) -> Result<LastKnownValue> {
    ValueSnapshot::from_payload(element_id, payload).map_err(|e| I3xError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = I3xClient::new("http://localhost:8080");
        assert!(client.is_ok());
        assert!(!client.unwrap().is_connected());
    }

    #[test]
    fn test_invalid_url() {
        let client = I3xClient::new("not a url");
        assert!(client.is_err());
    }

    #[test]
    fn test_subscription_path_is_encoded() {
        assert_eq!(subscription_path("sub 1/a"), "/subscriptions/sub%201%2Fa");
    }

    #[test]
    fn test_start_stream_requires_connection() {
        let client = I3xClient::new("http://localhost:8080").unwrap();
        assert!(matches!(
            client.start_stream("sub-1"),
            Err(I3xError::NotConnected)
        ));
        assert!(!client.is_streaming("sub-1"));
    }

    #[tokio::test]
    async fn test_requests_before_connect_fail() {
        let client = I3xClient::new("http://localhost:8080").unwrap();
        let err = client.get_namespaces().await.unwrap_err();
        assert!(matches!(err, I3xError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let client = I3xClient::new("http://localhost:8080").unwrap();
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
    }
}
