//! External data client.
//!
//! Fetches feature layers, raster exports, and tabular soil queries from
//! ArcGIS-style services. Every live request gets a courtesy delay and bounded
//! retry; layer results are cached on disk by request hash. In offline mode
//! all answers come from a fixture directory and the transport is never used.
pub mod cache;
pub mod fixtures;
pub mod payload;
pub mod raster;
pub mod transport;

use crate::config::{ClientSettings, LayerRef, ParcelSource};
use crate::crs::CANONICAL_EPSG;
use crate::geometry::Feature;
use anyhow::{anyhow, Context, Result};
use cache::QueryCache;
use fixtures::FixtureSet;
use geo::Rect;
use raster::RasterGrid;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use transport::{HttpRequest, Transport, UreqTransport};

/// Blocking pause hook; tests swap in a recorder.
pub type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Filter for a feature-layer query.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerQuery {
    /// Esri polygon (rings + spatialReference) to intersect with.
    pub geometry: Option<Value>,
    pub where_clause: String,
    pub out_sr: u32,
}

impl LayerQuery {
    pub fn all() -> Self {
        Self {
            geometry: None,
            where_clause: "1=1".to_string(),
            out_sr: CANONICAL_EPSG,
        }
    }

    pub fn intersecting(geometry: Value) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::all()
        }
    }

    pub fn filtered(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            ..Self::all()
        }
    }

    fn params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("f".to_string(), "json".to_string());
        params.insert("where".to_string(), self.where_clause.clone());
        params.insert("outFields".to_string(), "*".to_string());
        params.insert("returnGeometry".to_string(), "true".to_string());
        params.insert("outSR".to_string(), self.out_sr.to_string());
        if let Some(geometry) = &self.geometry {
            params.insert("geometry".to_string(), geometry.to_string());
            params.insert(
                "geometryType".to_string(),
                "esriGeometryPolygon".to_string(),
            );
            params.insert(
                "spatialRel".to_string(),
                "esriSpatialRelIntersects".to_string(),
            );
        }
        params
    }
}

/// Image-service export over a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub bbox: Rect<f64>,
    pub bbox_sr: u32,
    pub size: (u32, u32),
    pub rendering_rule: Option<Value>,
}

impl RasterRequest {
    fn params(&self) -> Vec<(String, String)> {
        let min = self.bbox.min();
        let max = self.bbox.max();
        let mut params = vec![
            ("f".to_string(), "json".to_string()),
            (
                "bbox".to_string(),
                format!("{},{},{},{}", min.x, min.y, max.x, max.y),
            ),
            ("bboxSR".to_string(), self.bbox_sr.to_string()),
            ("imageSR".to_string(), self.bbox_sr.to_string()),
            ("size".to_string(), format!("{},{}", self.size.0, self.size.1)),
            ("format".to_string(), "tiff".to_string()),
            ("pixelType".to_string(), "F32".to_string()),
        ];
        if let Some(rule) = &self.rendering_rule {
            params.push(("renderingRule".to_string(), rule.to_string()));
        }
        params
    }
}

pub struct FeatureClient {
    transport: Box<dyn Transport>,
    sleeper: Sleeper,
    cache: Option<QueryCache>,
    fixtures: Option<FixtureSet>,
    request_delay: Duration,
    max_attempts: u32,
}

impl FeatureClient {
    /// Live client over ureq, honouring the offline switch.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let transport = UreqTransport::new(Duration::from_secs(settings.timeout_secs));
        Self::with_transport(Box::new(transport), settings)
    }

    pub fn with_transport(transport: Box<dyn Transport>, settings: &ClientSettings) -> Self {
        Self {
            transport,
            sleeper: Box::new(std::thread::sleep),
            cache: Some(QueryCache::new(settings.resolved_cache_dir())),
            fixtures: settings
                .offline
                .then(|| FixtureSet::new(settings.resolved_fixtures_dir())),
            request_delay: Duration::from_millis(settings.request_delay_ms),
            max_attempts: settings.max_attempts.max(1),
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[cfg(test)]
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.fixtures.is_some()
    }

    /// Features of `layer` matching `query`, in the canonical CRS.
    pub fn query_feature_layer(&self, layer: &LayerRef, query: &LayerQuery) -> Result<Vec<Feature>> {
        if let Some(fixtures) = &self.fixtures {
            let payload = fixtures.layer_payload(&layer.url, layer.layer)?;
            return payload::features_from_payload(&payload)
                .with_context(|| format!("decode fixture for {}", layer.url));
        }

        let endpoint = format!("{}/{}/query", layer.url.trim_end_matches('/'), layer.layer);
        let params = query.params();
        let key = QueryCache::key(&endpoint, &params);
        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.load(&key)) {
            return Ok(hit);
        }

        let request = HttpRequest::Get {
            url: endpoint.clone(),
            query: params.into_iter().collect(),
        };
        let body = self.fetch(&request)?;
        let payload: Value = serde_json::from_slice(&body)
            .with_context(|| format!("parse JSON from {endpoint}"))?;
        let features = payload::features_from_payload(&payload)
            .with_context(|| format!("decode features from {endpoint}"))?;
        debug!(url = %endpoint, count = features.len(), cache_key = %key, "layer query");
        if let Some(cache) = &self.cache {
            cache.store(&key, &features);
        }
        Ok(features)
    }

    /// Parcel lookup by identifier field.
    pub fn query_by_parcel_id(&self, source: &ParcelSource, parcel_id: &str) -> Result<Vec<Feature>> {
        let where_clause = format!(
            "{}='{}'",
            source.parcel_field,
            parcel_id.replace('\'', "''")
        );
        let layer = LayerRef {
            url: source.url.clone(),
            layer: source.layer,
        };
        let features = self.query_feature_layer(&layer, &LayerQuery::filtered(where_clause))?;
        if !self.is_offline() {
            return Ok(features);
        }
        // Fixtures ignore the where clause, so apply it here.
        Ok(features
            .into_iter()
            .filter(|feature| {
                feature
                    .text(&[source.parcel_field.as_str()])
                    .is_none_or(|id| id == parcel_id)
            })
            .collect())
    }

    /// First band of an image-service export; empty when nothing decodes.
    pub fn export_image_raster(&self, url: &str, request: &RasterRequest) -> Result<RasterGrid> {
        if let Some(fixtures) = &self.fixtures {
            return fixtures.slope_raster();
        }
        let endpoint = format!("{}/exportImage", url.trim_end_matches('/'));
        let body = self.fetch(&HttpRequest::Get {
            url: endpoint.clone(),
            query: request.params(),
        })?;
        let payload: Value = serde_json::from_slice(&body)
            .with_context(|| format!("parse JSON from {endpoint}"))?;
        let Some(href) = payload.get("href").and_then(Value::as_str) else {
            debug!(url = %endpoint, "image export returned no href");
            return Ok(RasterGrid::empty());
        };
        let image = self.fetch(&HttpRequest::Get {
            url: href.to_string(),
            query: Vec::new(),
        })?;
        match raster::decode_tiff(&image) {
            Ok(grid) => Ok(grid),
            Err(err) => {
                warn!(url = %href, error = %format!("{err:#}"), "raster decode failed");
                Ok(RasterGrid::empty())
            }
        }
    }

    /// Rows of a soil-survey style tabular SQL query.
    pub fn tabular_query(&self, url: &str, sql: &str) -> Result<Vec<Value>> {
        let payload = match &self.fixtures {
            Some(fixtures) => fixtures.soils_payload()?,
            None => {
                let body = self.fetch(&HttpRequest::PostJson {
                    url: url.to_string(),
                    body: json!({ "format": "JSON", "query": sql }),
                })?;
                serde_json::from_slice(&body).with_context(|| format!("parse JSON from {url}"))?
            }
        };
        Ok(payload
            .get("Table")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            (self.sleeper)(duration);
        }
    }

    /// Send with courtesy delay and retry. 5xx and transport failures retry
    /// after `2^(attempt-1)` seconds; 4xx fails immediately.
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>> {
        let url = request.url();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.pause(self.request_delay);
            let failure = match self.transport.send(request) {
                Ok(reply) if reply.status < 400 => {
                    debug!(url, attempt, status = reply.status, "request ok");
                    return Ok(reply.body);
                }
                Ok(reply) if reply.status < 500 => {
                    return Err(anyhow!("{url} returned HTTP {}", reply.status));
                }
                Ok(reply) => anyhow!("{url} returned HTTP {}", reply.status),
                Err(err) => err,
            };
            if attempt >= self.max_attempts {
                return Err(failure.context(format!("{url} failed after {attempt} attempts")));
            }
            let backoff = Duration::from_secs(1u64 << (attempt - 1));
            warn!(
                url,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %format!("{failure:#}"),
                "retrying request"
            );
            self.pause(backoff);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::transport::HttpReply;
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays scripted replies and records every request it sees.
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply>>>,
        pub(crate) requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(replies: Vec<Result<HttpReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpReply> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }

    /// Counts calls and always fails; offline code must never reach it.
    #[derive(Clone, Default)]
    pub(crate) struct CountingTransport {
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl Transport for CountingTransport {
        fn send(&self, _request: &HttpRequest) -> Result<HttpReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("network disabled in tests"))
        }
    }

    pub(crate) fn reply(status: u16, body: &str) -> Result<HttpReply> {
        Ok(HttpReply {
            status,
            body: body.as_bytes().to_vec(),
        })
    }

    fn settings(cache_dir: &std::path::Path) -> ClientSettings {
        ClientSettings {
            request_delay_ms: 0,
            cache_dir: Some(cache_dir.to_path_buf()),
            ..ClientSettings::default()
        }
    }

    fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sleeps);
        let sleeper: Sleeper = Box::new(move |d: Duration| sink.lock().unwrap().push(d));
        (sleeper, sleeps)
    }

    fn streams_layer() -> LayerRef {
        LayerRef {
            url: "https://gis.example/hydrography/Watercourse/MapServer".to_string(),
            layer: 0,
        }
    }

    const ONE_STREAM: &str = r#"{
        "spatialReference": {"wkid": 2285},
        "features": [{"attributes": {"StreamType": "F"},
                      "geometry": {"paths": [[[0.0, 0.0], [100.0, 0.0]]]}}]
    }"#;

    #[test]
    fn retries_server_errors_with_exponential_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(503, "busy"),
            reply(503, "busy"),
            reply(200, ONE_STREAM),
        ]);
        let requests = Arc::clone(&transport.requests);
        let (sleeper, sleeps) = recording_sleeper();
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()))
            .with_sleeper(sleeper);

        let features = client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .expect("third attempt succeeds");

        assert_eq!(features.len(), 1);
        assert_eq!(requests.lock().unwrap().len(), 3);
        let sleeps = sleeps.lock().unwrap().clone();
        assert_eq!(sleeps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn exhausting_retries_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(502, ""),
            Err(anyhow!("connection reset")),
            reply(500, ""),
        ]);
        let requests = Arc::clone(&transport.requests);
        let (sleeper, sleeps) = recording_sleeper();
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()))
            .with_sleeper(sleeper);

        let err = client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .expect_err("all attempts fail");
        assert!(format!("{err:#}").contains("after 3 attempts"));
        assert_eq!(requests.lock().unwrap().len(), 3);
        assert_eq!(sleeps.lock().unwrap().len(), 2);
    }

    #[test]
    fn client_errors_and_bad_json_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![reply(404, "missing"), reply(200, "<html>")]);
        let requests = Arc::clone(&transport.requests);
        let (sleeper, sleeps) = recording_sleeper();
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()))
            .with_sleeper(sleeper);

        let err = client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .expect_err("404");
        assert!(err.to_string().contains("HTTP 404"));
        let err = client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .expect_err("bad json");
        assert!(format!("{err:#}").contains("parse JSON"));
        assert_eq!(requests.lock().unwrap().len(), 2);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn courtesy_delay_precedes_each_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, ONE_STREAM)]);
        let (sleeper, sleeps) = recording_sleeper();
        let client = FeatureClient::with_transport(
            Box::new(transport),
            &ClientSettings {
                request_delay_ms: 500,
                ..settings(dir.path())
            },
        )
        .with_sleeper(sleeper);
        client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .unwrap();
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn repeated_queries_are_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, ONE_STREAM)]);
        let requests = Arc::clone(&transport.requests);
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()));
        let query = LayerQuery::intersecting(json!({"rings": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}));

        let first = client.query_feature_layer(&streams_layer(), &query).unwrap();
        let second = client.query_feature_layer(&streams_layer(), &query).unwrap();
        assert_eq!(first, second);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn parcel_lookup_quotes_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, r#"{"features": []}"#)]);
        let requests = Arc::clone(&transport.requests);
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()));
        let source = ParcelSource {
            url: "https://gis.example/cadastral/tax_parcels/MapServer".to_string(),
            layer: 0,
            parcel_field: "Parcel_ID".to_string(),
        };
        let found = client.query_by_parcel_id(&source, "O'Brien-1").unwrap();
        assert!(found.is_empty());

        let requests = requests.lock().unwrap();
        let HttpRequest::Get { url, query } = &requests[0] else {
            panic!("expected GET");
        };
        assert!(url.ends_with("/tax_parcels/MapServer/0/query"));
        assert!(query
            .iter()
            .any(|(k, v)| k == "where" && v == "Parcel_ID='O''Brien-1'"));
    }

    #[test]
    fn offline_mode_never_touches_the_transport() {
        let fixtures = tempfile::tempdir().unwrap();
        std::fs::write(
            fixtures.path().join("parcel_feature.json"),
            r#"{"crs_epsg": 2285, "features": [
                {"attributes": {"Parcel_ID": "A"}, "geometry": {"x": 1.0, "y": 1.0}},
                {"attributes": {"Parcel_ID": "B"}, "geometry": {"x": 2.0, "y": 2.0}}
            ]}"#,
        )
        .unwrap();
        let transport = CountingTransport::default();
        let calls = Arc::clone(&transport.calls);
        let client = FeatureClient::with_transport(
            Box::new(transport),
            &ClientSettings {
                offline: true,
                fixtures_dir: Some(fixtures.path().to_path_buf()),
                ..settings(fixtures.path())
            },
        );
        assert!(client.is_offline());

        let source = &crate::config::ServiceEndpoints::default().parcel_sources[0];
        let parcels = client.query_by_parcel_id(source, "B").unwrap();
        assert_eq!(parcels.len(), 1);
        assert!(client
            .query_feature_layer(&streams_layer(), &LayerQuery::all())
            .unwrap()
            .is_empty());
        let bbox = Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 1.0, y: 1.0 });
        let grid = client
            .export_image_raster(
                "https://elevation.example/ImageServer",
                &RasterRequest {
                    bbox,
                    bbox_sr: 2285,
                    size: (300, 300),
                    rendering_rule: None,
                },
            )
            .unwrap();
        assert!(grid.is_empty());
        assert!(client.tabular_query("https://sda.example", "SELECT 1").unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn raster_export_without_href_or_with_bad_image_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(200, r#"{"error": "nothing"}"#),
            reply(200, r#"{"href": "https://img.example/out.tif"}"#),
            reply(200, "not a tiff"),
        ]);
        let requests = Arc::clone(&transport.requests);
        let client = FeatureClient::with_transport(Box::new(transport), &settings(dir.path()));
        let request = RasterRequest {
            bbox: Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 10.0, y: 10.0 }),
            bbox_sr: 2285,
            size: (300, 300),
            rendering_rule: Some(json!({"rasterFunction": "Slope Degrees"})),
        };
        assert!(client
            .export_image_raster("https://elev.example/ImageServer", &request)
            .unwrap()
            .is_empty());
        assert!(client
            .export_image_raster("https://elev.example/ImageServer", &request)
            .unwrap()
            .is_empty());
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].url(), "https://img.example/out.tif");
    }
}
