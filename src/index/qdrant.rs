//! Qdrant-backed vector index.
//!
//! One gRPC client handle serves the whole process; it is constructed at
//! startup and shared by reference through the application state.

use async_trait::async_trait;
use qdrant_client::config::QdrantConfig;
use qdrant_client::qdrant::{
    CountPoints, CreateCollection, DeleteCollection, Distance, PointStruct, SearchPoints,
    UpsertPoints, VectorParams, VectorsConfig, point_id::PointIdOptions, value::Kind,
    vectors_config::Config as VectorsConfigKind,
};
use qdrant_client::{Payload, Qdrant};
use tracing::instrument;

use super::{ChunkPayload, IndexedPoint, Metric, ScoredHit, VectorIndex};
use crate::types::RagError;

/// Thin wrapper over the Qdrant client implementing [`VectorIndex`].
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connects to a Qdrant instance. The API key is optional for local,
    /// unauthenticated deployments.
    pub fn connect(url: &str, api_key: Option<String>) -> Result<Self, RagError> {
        let mut config = QdrantConfig::from_url(url);
        if let Some(key) = api_key {
            config.api_key = Some(key);
        }
        let client = Qdrant::new(config)
            .map_err(|err| RagError::Index(format!("failed to create Qdrant client: {err}")))?;
        Ok(Self { client })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, RagError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|err| RagError::Index(format!("list collections failed: {err}")))?;
        Ok(response
            .collections
            .iter()
            .any(|collection| collection.name == name))
    }

    async fn create(&self, name: &str, dimension: usize, metric: Metric) -> Result<(), RagError> {
        let request = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(VectorsConfig {
                config: Some(VectorsConfigKind::Params(VectorParams {
                    size: dimension as u64,
                    distance: to_distance(metric).into(),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        };
        self.client
            .create_collection(request)
            .await
            .map_err(|err| RagError::Index(format!("create collection '{name}' failed: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[instrument(skip(self), err)]
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<bool, RagError> {
        if self.collection_exists(name).await? {
            return Ok(false);
        }
        self.create(name, dimension, metric).await?;
        tracing::info!(collection = name, dimension, "created collection");
        Ok(true)
    }

    #[instrument(skip(self), err)]
    async fn recreate_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<(), RagError> {
        if self.collection_exists(name).await? {
            let request = DeleteCollection {
                collection_name: name.to_string(),
                ..Default::default()
            };
            self.client
                .delete_collection(request)
                .await
                .map_err(|err| RagError::Index(format!("delete collection '{name}' failed: {err}")))?;
        }
        self.create(name, dimension, metric).await
    }

    #[instrument(skip(self, points), fields(points = points.len()), err)]
    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<(), RagError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut converted = Vec::with_capacity(points.len());
        for point in points {
            let payload_json = serde_json::to_value(&point.payload)
                .map_err(|err| RagError::Index(format!("payload serialization failed: {err}")))?;
            let payload = Payload::try_from(payload_json)
                .map_err(|err| RagError::Index(format!("payload conversion failed: {err}")))?;
            converted.push(PointStruct::new(point.id, point.vector, payload));
        }
        let request = UpsertPoints {
            collection_name: name.to_string(),
            points: converted,
            wait: Some(true),
            ..Default::default()
        };
        self.client
            .upsert_points(request)
            .await
            .map_err(|err| RagError::Index(format!("upsert into '{name}' failed: {err}")))?;
        Ok(())
    }

    #[instrument(skip(self, vector), err)]
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>, RagError> {
        let request = SearchPoints {
            collection_name: name.to_string(),
            vector: vector.to_vec(),
            limit: top_k as u64,
            score_threshold: Some(score_threshold),
            with_payload: Some(true.into()),
            ..Default::default()
        };
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|err| RagError::Index(format!("search in '{name}' failed: {err}")))?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let id = point
                .id
                .and_then(|pid| pid.point_id_options)
                .map(|options| match options {
                    PointIdOptions::Num(num) => num.to_string(),
                    PointIdOptions::Uuid(uuid) => uuid,
                })
                .unwrap_or_default();
            let fields: serde_json::Map<String, serde_json::Value> = point
                .payload
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect();
            let payload: ChunkPayload = serde_json::from_value(serde_json::Value::Object(fields))
                .map_err(|err| RagError::Index(format!("malformed point payload: {err}")))?;
            hits.push(ScoredHit {
                id,
                score: point.score,
                payload,
            });
        }
        Ok(hits)
    }

    #[instrument(skip(self), err)]
    async fn count(&self, name: &str) -> Result<usize, RagError> {
        let request = CountPoints {
            collection_name: name.to_string(),
            exact: Some(true),
            ..Default::default()
        };
        let response = self
            .client
            .count(request)
            .await
            .map_err(|err| RagError::Index(format!("count in '{name}' failed: {err}")))?;
        Ok(response
            .result
            .map(|result| result.count as usize)
            .unwrap_or(0))
    }
}

fn to_distance(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::Dot => Distance::Dot,
        Metric::Euclid => Distance::Euclid,
    }
}

/// Converts a Qdrant payload value into plain JSON.
fn value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(flag),
        Some(Kind::IntegerValue(int)) => serde_json::Value::Number(int.into()),
        Some(Kind::DoubleValue(double)) => serde_json::Number::from_f64(double)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(string)) => serde_json::Value::String(string),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(nested)) => serde_json::Value::Object(
            nested
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}
