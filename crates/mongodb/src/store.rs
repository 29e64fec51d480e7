//! [`DocumentStore`] implementation for MongoDB.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client as MongoClient, Collection, Database};
use mongodb_types::{document_to_record, record_to_document, BsonValue};
use sync_core::{
    DocumentStore, Origin, Record, RecordStore, StoreError, SyncValue, NATIVE_ID_FIELD,
};
use tracing::debug;

use crate::config::{MongoConfig, DEFAULT_DATABASE};

fn classify(err: mongodb::error::Error) -> StoreError {
    match *err.kind {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::Connection(err.to_string()),
        ErrorKind::InvalidArgument { .. } => StoreError::Conversion(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

/// MongoDB-backed document store.
pub struct MongoStore {
    client: MongoClient,
    database: Database,
}

impl MongoStore {
    /// Connect using `config` and verify the deployment answers a `ping`.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let uri = config.connection_uri();
        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| StoreError::Connection(format!("invalid MongoDB URI: {e}")))?;
        options.connect_timeout = Some(config.options.connect_timeout());
        options.server_selection_timeout = Some(config.options.server_selection_timeout());
        if let Some(credential) = config.credential() {
            options.credential = Some(credential);
        }

        let database_name = config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = MongoClient::with_options(options).map_err(classify)?;
        let database = client.database(&database_name);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;
        debug!(
            "Connected to MongoDB at {}, using database '{database_name}'",
            config.describe()
        );

        Ok(Self { client, database })
    }

    /// Name of the database this store reads and writes.
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    /// Release the client's connections. Other handles to the same client
    /// stop working once this returns.
    pub async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    fn origin(&self) -> Origin {
        Origin::Document
    }

    async fn list_entities(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self
            .database
            .list_collection_names()
            .await
            .map_err(classify)?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();
        Ok(names)
    }

    async fn count(&self, entity: &str) -> Result<u64, StoreError> {
        self.collection(entity)
            .count_documents(doc! {})
            .await
            .map_err(classify)
    }

    async fn fetch_page(
        &self,
        entity: &str,
        order_key: &str,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Record>, StoreError> {
        let cursor = self
            .collection(entity)
            .find(doc! {})
            .sort(doc! { order_key: 1 })
            .skip(offset)
            .limit(limit as i64)
            .await
            .map_err(classify)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(classify)?;
        Ok(documents.iter().map(document_to_record).collect())
    }

    async fn get_one(
        &self,
        entity: &str,
        key_field: &str,
        key: &SyncValue,
    ) -> Result<Option<Record>, StoreError> {
        let filter = doc! { key_field: BsonValue::from(key).into_inner() };
        let found = self
            .collection(entity)
            .find_one(filter)
            .await
            .map_err(classify)?;
        Ok(found.as_ref().map(document_to_record))
    }

    async fn upsert(
        &self,
        entity: &str,
        key_field: &str,
        record: &Record,
    ) -> Result<bool, StoreError> {
        let key = match record.get(key_field) {
            Some(value) if !value.is_null() => BsonValue::from(value).into_inner(),
            _ => {
                return Err(StoreError::Conversion(format!(
                    "document has no value for key field '{key_field}'"
                )))
            }
        };

        let mut fields = record_to_document(record);
        // The native identifier is immutable and owned by the store.
        fields.remove(NATIVE_ID_FIELD);

        let result = self
            .collection(entity)
            .update_one(doc! { key_field: key }, doc! { "$set": Bson::Document(fields) })
            .upsert(true)
            .await
            .map_err(classify)?;
        Ok(result.upserted_id.is_some())
    }
}

impl DocumentStore for MongoStore {}
