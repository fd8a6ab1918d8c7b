//! MongoDB storage backend
//!
//! Conditions are documents `{_id, key, op, val, create_lock_time,
//! create_lock_count}` in one collection with a unique index over
//! `(key, op, val)`. Ids come from a per-collection counter document so they
//! stay ascending 64-bit integers like on every other backend.

use crate::config::StorageConfig;
use crate::memory::to_chrono;
use crate::traits::ConditionStorage;
use async_trait::async_trait;
use chrono::Utc;
use condnum_core::condition::expiry_cutoff;
use condnum_core::{
    check_threshold, Comparison, ConditionError, ConditionId, ConditionResult, Op, Probe,
};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions,
    ReturnDocument, Tls, TlsOptions,
};
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;

const FIELD_ID: &str = "_id";
const FIELD_KEY: &str = "key";
const FIELD_OP: &str = "op";
const FIELD_VAL: &str = "val";
const FIELD_LOCK_TIME: &str = "create_lock_time";
const FIELD_LOCK_COUNT: &str = "create_lock_count";

/// Collection holding one id counter per condition collection
const SEQUENCES: &str = "condnum_sequences";

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB condition store
pub struct MongoStorage {
    client: Client,
    collection: Collection<Document>,
    sequences: Collection<Document>,
    create_lock_ttl: chrono::Duration,
}

impl MongoStorage {
    /// Connect using `config`, then ensure the unique index (and sharding when requested)
    pub async fn connect(config: &StorageConfig) -> ConditionResult<Self> {
        if config.table.name.is_empty() {
            return Err(ConditionError::internal("collection name must not be empty"));
        }

        let mut options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(decode_error)?;
        if !config.username.is_empty() || !config.password.is_empty() {
            let mut credential = options.credential.take().unwrap_or_default();
            if !config.username.is_empty() {
                credential.username = Some(config.username.clone());
            }
            if !config.password.is_empty() {
                credential.password = Some(config.password.clone());
            }
            options.credential = Some(credential);
        }
        if config.tls.enabled {
            let tls = TlsOptions::builder()
                .allow_invalid_certificates(config.tls.insecure)
                .build();
            options.tls = Some(Tls::Enabled(tls));
        }
        options.max_pool_size = Some(config.connection.max);
        options.app_name = Some("condnum".to_string());

        let client = Client::with_options(options).map_err(decode_error)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(&config.name));

        let storage = Self::with_database(
            client.clone(),
            &database,
            &config.table.name,
            config.create_lock_ttl(),
        );
        storage.ensure_indexes().await?;
        if config.table.shard {
            shard_collection(&client, &database, &config.table.name).await?;
        }
        tracing::info!(
            "MongoDB condition storage ready, collection '{}.{}'",
            database.name(),
            config.table.name
        );
        Ok(storage)
    }

    /// Wrap an existing database handle; indexes are not touched
    pub fn with_database(
        client: Client,
        database: &Database,
        collection: &str,
        create_lock_ttl: Duration,
    ) -> Self {
        Self {
            client,
            collection: database.collection(collection),
            sequences: database.collection(SEQUENCES),
            create_lock_ttl: to_chrono(create_lock_ttl),
        }
    }

    /// Create the unique `(key, op, val)` index if missing
    pub async fn ensure_indexes(&self) -> ConditionResult<()> {
        let model = IndexModel::builder()
            .keys(doc! { FIELD_KEY: 1, FIELD_OP: 1, FIELD_VAL: 1 })
            .options(
                IndexOptions::builder()
                    .name("key_op_val".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.collection
            .create_index(model, None)
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    /// Drop the collection and its counter (test cleanup)
    pub async fn drop_collection(&self) -> ConditionResult<()> {
        self.collection.drop(None).await.map_err(decode_error)?;
        self.sequences
            .delete_one(doc! { FIELD_ID: self.collection.name() }, None)
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    /// Reuse an existing, unlocked document for the triple
    async fn reuse(&self, filter: Document) -> ConditionResult<Option<ConditionId>> {
        let options = FindOneOptions::builder()
            .projection(doc! { FIELD_ID: 1 })
            .build();
        let found = self
            .collection
            .find_one(filter, options)
            .await
            .map_err(decode_error)?;
        found.map(|doc| document_id(&doc)).transpose()
    }

    async fn next_seq(&self) -> ConditionResult<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let filter = doc! { FIELD_ID: self.collection.name() };
        let update = doc! { "$inc": { "seq": 1_i64 } };

        let counter = match self
            .sequences
            .find_one_and_update(filter.clone(), update.clone(), options.clone())
            .await
        {
            // Two first-time upserts of the counter race on `_id`
            Err(e) if is_duplicate_key(&e) => self
                .sequences
                .find_one_and_update(filter, update, options)
                .await
                .map_err(decode_error)?,
            other => other.map_err(decode_error)?,
        };
        counter
            .ok_or_else(|| ConditionError::internal("id counter upsert returned nothing"))?
            .get_i64("seq")
            .map_err(|e| ConditionError::internal(format!("malformed id counter: {}", e)))
    }
}

#[async_trait]
impl ConditionStorage for MongoStorage {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        check_threshold(value)?;
        let cutoff = expiry_cutoff(Utc::now(), self.create_lock_ttl);
        let filter = unlocked_filter(key, op, value, cutoff.timestamp_millis());

        if let Some(id) = self.reuse(filter.clone()).await? {
            return Ok(id);
        }

        let seq = self.next_seq().await?;
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .projection(doc! { FIELD_ID: 1 })
            .build();
        let update = doc! {
            "$set": { FIELD_KEY: key, FIELD_OP: i32::from(op.code()), FIELD_VAL: value },
            "$setOnInsert": { FIELD_ID: seq, FIELD_LOCK_COUNT: 0_i32 },
        };

        match self
            .collection
            .find_one_and_update(filter.clone(), update, options)
            .await
        {
            Ok(Some(doc)) => document_id(&doc),
            Ok(None) => Err(ConditionError::internal("upsert returned no document")),
            // Either the triple is locked or a concurrent create inserted it first
            Err(e) if is_duplicate_key(&e) => match self.reuse(filter).await? {
                Some(id) => Ok(id),
                None => Err(ConditionError::conflict(format!(
                    "key={}, op={}, val={}: create is locked",
                    key, op, value
                ))),
            },
            Err(e) => Err(decode_error(e)),
        }
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let seq = id
            .as_i64()
            .ok_or_else(|| ConditionError::not_found(format!("id={}", id)))?;
        let update = doc! {
            "$set": { FIELD_LOCK_TIME: BsonDateTime::from_millis(Utc::now().timestamp_millis()) },
            "$inc": { FIELD_LOCK_COUNT: 1_i32 },
        };
        let result = self
            .collection
            .update_one(doc! { FIELD_ID: seq }, update, None)
            .await
            .map_err(decode_error)?;
        if result.matched_count < 1 {
            return Err(ConditionError::not_found(format!("id={}", id)));
        }
        Ok(())
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let Some(seq) = id.as_i64() else {
            return Ok(());
        };
        self.collection
            .update_one(
                doc! { FIELD_ID: seq, FIELD_LOCK_COUNT: { "$gt": 0 } },
                doc! { "$inc": { FIELD_LOCK_COUNT: -1_i32 } },
                None,
            )
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        let Some(seq) = id.as_i64() else {
            return Ok(());
        };
        self.collection
            .delete_one(doc! { FIELD_ID: seq }, None)
            .await
            .map_err(decode_error)?;
        Ok(())
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        let probe = Probe::new(key, value);
        if !probe.is_satisfiable() {
            return Ok(Vec::new());
        }
        let after = match cursor {
            None => 0,
            Some(c) => match c.as_i64() {
                Some(seq) => seq,
                None => return Ok(Vec::new()),
            },
        };

        let options = FindOptions::builder()
            .sort(doc! { FIELD_ID: 1 })
            .limit(i64::from(limit))
            .projection(doc! { FIELD_ID: 1 })
            .build();
        let mut found = self
            .collection
            .find(search_filter(&probe, after), options)
            .await
            .map_err(decode_error)?;

        let mut ids = Vec::with_capacity(limit as usize);
        while found.advance().await.map_err(decode_error)? {
            let doc = found.deserialize_current().map_err(decode_error)?;
            ids.push(document_id(&doc)?);
        }
        Ok(ids)
    }

    async fn close(&self) -> ConditionResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Triple selector that only matches documents whose create-lock no longer blocks
fn unlocked_filter(key: &str, op: Op, value: f64, cutoff_ms: i64) -> Document {
    doc! {
        FIELD_KEY: key,
        FIELD_OP: i32::from(op.code()),
        FIELD_VAL: value,
        "$or": [
            { FIELD_LOCK_COUNT: { "$lt": 1 } },
            { FIELD_LOCK_TIME: { "$exists": false } },
            { FIELD_LOCK_TIME: { "$lt": BsonDateTime::from_millis(cutoff_ms) } },
        ],
    }
}

fn search_filter(probe: &Probe<'_>, after: i64) -> Document {
    let clauses: Vec<Bson> = probe
        .clauses()
        .iter()
        .map(|clause| {
            Bson::Document(doc! {
                FIELD_OP: i32::from(clause.op.code()),
                FIELD_VAL: { query_operator(clause.comparison): probe.value },
            })
        })
        .collect();
    doc! {
        FIELD_ID: { "$gt": after },
        FIELD_KEY: { "$in": ["", probe.key] },
        "$or": clauses,
    }
}

fn query_operator(comparison: Comparison) -> &'static str {
    match comparison {
        Comparison::Less => "$lt",
        Comparison::LessOrEqual => "$lte",
        Comparison::Equal => "$eq",
        Comparison::GreaterOrEqual => "$gte",
        Comparison::Greater => "$gt",
    }
}

async fn shard_collection(
    client: &Client,
    database: &Database,
    collection: &str,
) -> ConditionResult<()> {
    let command = doc! {
        "shardCollection": format!("{}.{}", database.name(), collection),
        "key": { FIELD_KEY: 1, FIELD_OP: 1, FIELD_VAL: "hashed" },
    };
    client
        .database("admin")
        .run_command(command, None)
        .await
        .map_err(decode_error)?;
    tracing::info!("Sharded collection '{}.{}'", database.name(), collection);
    Ok(())
}

fn document_id(doc: &Document) -> ConditionResult<ConditionId> {
    let seq = doc
        .get_i64(FIELD_ID)
        .map_err(|e| ConditionError::internal(format!("malformed document id: {}", e)))?;
    ConditionId::from_i64(seq)
        .ok_or_else(|| ConditionError::internal(format!("negative id {}", seq)))
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn decode_error(err: mongodb::error::Error) -> ConditionError {
    ConditionError::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_filter_shape() {
        let probe = Probe::new("salary", 3.0);
        let filter = search_filter(&probe, 7);

        assert_eq!(filter.get_document(FIELD_ID).unwrap(), &doc! { "$gt": 7_i64 });
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 5);
        assert_eq!(
            clauses[0].as_document().unwrap(),
            &doc! { FIELD_OP: 1, FIELD_VAL: { "$lt": 3.0 } }
        );
        assert_eq!(
            clauses[4].as_document().unwrap(),
            &doc! { FIELD_OP: 5, FIELD_VAL: { "$gt": 3.0 } }
        );
    }

    #[test]
    fn test_unlocked_filter_checks_every_lock_state() {
        let filter = unlocked_filter("k", Op::Eq, 1.5, 1_000);
        assert_eq!(filter.get_str(FIELD_KEY).unwrap(), "k");
        assert_eq!(filter.get_i32(FIELD_OP).unwrap(), 3);
        assert_eq!(filter.get_array("$or").unwrap().len(), 3);
    }
}
