use futures::stream::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document as BsonDocument},
    options::{FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

use crate::dtos::{UserLookup, UserSummary};
use crate::models::{AuditLog, Document, Driver, User};

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    /// The driver connects lazily, so this succeeds even when the server is
    /// down. Use [`MongoDb::health_check`] to confirm reachability.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for portal-service");

        create_index(
            &self.users(),
            "users",
            doc! { "email": 1 },
            "email_unique",
            true,
        )
        .await?;

        let drivers = self.drivers();
        create_index(
            &drivers,
            "drivers",
            doc! { "status": 1, "created_at": -1 },
            "status_created",
            false,
        )
        .await?;
        create_index(
            &drivers,
            "drivers",
            doc! { "registered_by": 1, "created_at": -1 },
            "registrar_created",
            false,
        )
        .await?;
        create_index(
            &drivers,
            "drivers",
            doc! { "driver_info.phone": 1 },
            "phone_lookup",
            false,
        )
        .await?;
        create_index(
            &drivers,
            "drivers",
            doc! { "driver_info.plate_number": 1 },
            "plate_lookup",
            false,
        )
        .await?;

        let documents = self.documents();
        create_index(
            &documents,
            "documents",
            doc! { "driver": 1, "doc_type": 1 },
            "driver_type",
            false,
        )
        .await?;
        create_index(
            &documents,
            "documents",
            doc! { "status": 1, "created_at": -1 },
            "queue_lookup",
            false,
        )
        .await?;
        create_index(
            &documents,
            "documents",
            doc! { "uploaded_by": 1 },
            "uploader_lookup",
            false,
        )
        .await?;

        let audit_logs = self.audit_logs();
        create_index(
            &audit_logs,
            "audit_logs",
            doc! { "created_at": -1 },
            "created_desc",
            false,
        )
        .await?;
        create_index(
            &audit_logs,
            "audit_logs",
            doc! { "performed_by": 1, "created_at": -1 },
            "actor_created",
            false,
        )
        .await?;
        create_index(
            &audit_logs,
            "audit_logs",
            doc! { "entity_type": 1, "entity_id": 1 },
            "entity_lookup",
            false,
        )
        .await?;
        create_index(
            &audit_logs,
            "audit_logs",
            doc! { "action": 1 },
            "action_lookup",
            false,
        )
        .await?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn drivers(&self) -> Collection<Driver> {
        self.db.collection("drivers")
    }

    pub fn documents(&self) -> Collection<Document> {
        self.db.collection("documents")
    }

    pub fn audit_logs(&self) -> Collection<AuditLog> {
        self.db.collection("audit_logs")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Resolve user references to `{id, name, email}` in one query.
    pub async fn user_summaries<I>(&self, ids: I) -> Result<UserLookup, AppError>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let mut ids: Vec<ObjectId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(UserLookup::new());
        }

        let users: Vec<User> = self
            .users()
            .find(doc! { "_id": { "$in": ids } }, None)
            .await?
            .try_collect()
            .await?;

        Ok(users
            .iter()
            .map(|user| (user.id, UserSummary::from(user)))
            .collect())
    }

    pub async fn find_user(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        Ok(self.users().find_one(doc! { "_id": *id }, None).await?)
    }

    pub async fn find_driver(&self, id: &ObjectId) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers().find_one(doc! { "_id": *id }, None).await?)
    }

    pub async fn driver_documents(&self, driver: &ObjectId) -> Result<Vec<Document>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        Ok(self
            .documents()
            .find(doc! { "driver": *driver }, options)
            .await?
            .try_collect()
            .await?)
    }

    /// Run an aggregation and collect the raw result documents.
    pub async fn aggregate<T>(
        &self,
        collection: &Collection<T>,
        pipeline: Vec<BsonDocument>,
    ) -> Result<Vec<BsonDocument>, AppError>
    where
        T: Send + Sync,
    {
        Ok(collection
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?)
    }
}

async fn create_index<T>(
    collection: &Collection<T>,
    collection_name: &str,
    keys: BsonDocument,
    name: &str,
    unique: bool,
) -> Result<(), AppError>
where
    T: Send + Sync,
{
    let index = IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build();

    collection.create_index(index, None).await.map_err(|e| {
        tracing::error!(
            "Failed to create index {} on {} collection: {}",
            name,
            collection_name,
            e
        );
        AppError::from(e)
    })?;
    tracing::info!(collection = %collection_name, index = %name, "Index ready");
    Ok(())
}
