use anyhow::{anyhow, bail, Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::OptimizeAction;
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CollectionInfo, IndexPoint, Payload, ScoredPoint, VectorStore};
use crate::metrics::UPSERT_LATENCY;

const ID_COLUMN: &str = "id";
const DOCUMENT_COLUMN: &str = "document";
const METADATA_COLUMN: &str = "metadata";

/// Embedded LanceDB backend; one table per collection
pub struct LanceStore {
    db: Connection,
    /// Concurrent merge-inserts on one table conflict, so writes go one at a time
    write_lock: Mutex<()>,
}

impl LanceStore {
    /// Create or open a LanceDB database at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy();

        info!("Opening LanceDB at: {}", path_str);

        let db = connect(&path_str)
            .execute()
            .await
            .with_context(|| format!("Failed to connect to LanceDB at {}", path_str))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.table_names().await?.iter().any(|n| n == name))
    }

    async fn open_table(&self, name: &str) -> Result<Table> {
        self.db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", name))
    }

    /// Arrow schema for a collection table
    fn table_schema(vector_field: &str, dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new(ID_COLUMN, DataType::Utf8, false),
            Field::new(DOCUMENT_COLUMN, DataType::Utf8, false),
            Field::new(METADATA_COLUMN, DataType::Utf8, false),
            Field::new(
                vector_field,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// Find the vector column: the first fixed-size list of floats
    fn vector_column(schema: &Schema) -> Option<(String, usize)> {
        schema.fields().iter().find_map(|field| match field.data_type() {
            DataType::FixedSizeList(item, size) if item.data_type() == &DataType::Float32 => {
                Some((field.name().clone(), *size as usize))
            }
            _ => None,
        })
    }

    fn point_to_record_batch(point: &IndexPoint, schema: SchemaRef, dimension: i32) -> Result<RecordBatch> {
        let metadata = serde_json::to_string(&point.payload.metadata)
            .context("Failed to serialize point metadata")?;

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            std::iter::once(Some(point.vector.iter().map(|&v| Some(v)))),
            dimension,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![point.id.to_hex()])),
                Arc::new(StringArray::from(vec![point.payload.document.as_str()])),
                Arc::new(StringArray::from(vec![metadata])),
                Arc::new(vector_array),
            ],
        )
        .context("Failed to create RecordBatch")
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn ping(&self) -> Result<()> {
        self.table_names().await.map(|_| ())
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        if !self.table_exists(name).await? {
            return Ok(None);
        }

        let table = self.open_table(name).await?;
        let schema = table
            .schema()
            .await
            .with_context(|| format!("Failed to read schema of table {}", name))?;

        let (vector_field, dimension) = Self::vector_column(&schema)
            .ok_or_else(|| anyhow!("Table {} has no vector column", name))?;

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            vector_field,
            dimension,
        }))
    }

    async fn ensure_collection(&self, name: &str, vector_field: &str, dimension: usize) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.table_exists(name).await? {
            debug!("Table {} already exists", name);
            return Ok(());
        }

        info!(collection = name, vector_field, dimension, "Creating LanceDB table");

        let schema = Arc::new(Self::table_schema(vector_field, dimension));
        // Empty batch iterator carries the schema
        let batches = RecordBatchIterator::new(vec![], schema);

        self.db
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .with_context(|| format!("Failed to create table {}", name))?;

        Ok(())
    }

    async fn upsert(&self, collection: &str, point: IndexPoint) -> Result<()> {
        let start = Instant::now();
        let _guard = self.write_lock.lock().await;

        let table = self.open_table(collection).await?;
        let schema = table.schema().await.context("Failed to read table schema")?;

        let (vector_field, dimension) = Self::vector_column(&schema)
            .ok_or_else(|| anyhow!("Table {} has no vector column", collection))?;
        if vector_field != point.vector_field {
            bail!("Table {} has no vector field '{}'", collection, point.vector_field);
        }
        if point.vector.len() != dimension {
            bail!(
                "Vector dimension {} does not match table dimension {}",
                point.vector.len(),
                dimension
            );
        }

        let batch = Self::point_to_record_batch(&point, schema.clone(), dimension as i32)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = table.merge_insert(&[ID_COLUMN]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .with_context(|| format!("Failed to upsert point {}", point.id))?;

        UPSERT_LATENCY.observe(start.elapsed().as_secs_f64());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector_field: &str,
        query: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let table = self.open_table(collection).await?;

        let results = table
            .vector_search(query)
            .context("Failed to create vector search query")?
            .column(vector_field)
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .context("Failed to collect search results")?;

        let mut hits = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, ID_COLUMN)?;
            let documents = string_column(&batch, DOCUMENT_COLUMN)?;
            let metadata = string_column(&batch, METADATA_COLUMN)?;

            // LanceDB returns _distance column for similarity score
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                let score = distances.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
                let metadata = serde_json::from_str(metadata.value(i))
                    .unwrap_or(serde_json::Value::Null);

                hits.push(ScoredPoint {
                    id: ids.value(i).to_string(),
                    score,
                    payload: Payload {
                        document: documents.value(i).to_string(),
                        metadata,
                    },
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        if !self.table_exists(collection).await? {
            return Ok(0);
        }
        let table = self.open_table(collection).await?;
        table
            .count_rows(None)
            .await
            .with_context(|| format!("Failed to count rows in {}", collection))
    }

    /// Each upsert is its own merge-insert and leaves a small fragment
    /// behind; fold them together once the run is over.
    async fn optimize(&self, collection: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let table = self.open_table(collection).await?;
        let start = Instant::now();

        table
            .optimize(OptimizeAction::All)
            .await
            .with_context(|| format!("Failed to optimize table {}", collection))?;

        debug!(
            collection,
            "Optimized table in {:.1}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "lancedb"
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("Missing {} column", name))
}
