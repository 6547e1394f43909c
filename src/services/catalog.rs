use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// Persistence of report records.
#[async_trait]
pub trait ReportCatalog: Send + Sync {
    /// Stores a new record and returns its id.
    async fn insert(&self, record: reports::Model) -> Result<String, AppError>;

    /// All records of an owner, most recent first. No records is an empty list.
    async fn list_by_owner(&self, owner_identity: &str) -> Result<Vec<reports::Model>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<reports::Model, AppError>;

    /// Removes a record; `AppError::NotFound` if there was nothing to remove.
    async fn delete_by_id(&self, id: &str) -> Result<(), AppError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> bool;
}

pub struct SeaOrmCatalog {
    db: DatabaseConnection,
}

impl SeaOrmCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportCatalog for SeaOrmCatalog {
    async fn insert(&self, record: reports::Model) -> Result<String, AppError> {
        let new_report = reports::ActiveModel {
            id: Set(record.id),
            owner_identity: Set(record.owner_identity),
            owner_partition: Set(record.owner_partition),
            partition_scheme: Set(record.partition_scheme),
            display_name: Set(record.display_name),
            storage_key: Set(record.storage_key),
            category: Set(record.category),
            notes: Set(record.notes),
            created_at: Set(record.created_at),
        };
        let inserted = new_report.insert(&self.db).await?;
        Ok(inserted.id)
    }

    async fn list_by_owner(&self, owner_identity: &str) -> Result<Vec<reports::Model>, AppError> {
        let records = Reports::find()
            .filter(reports::Column::OwnerIdentity.eq(owner_identity))
            .order_by_desc(reports::Column::CreatedAt)
            .order_by_desc(reports::Column::Id)
            .all(&self.db)
            .await?;
        Ok(records)
    }

    async fn find_by_id(&self, id: &str) -> Result<reports::Model, AppError> {
        Reports::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found.".to_string()))
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        let res = Reports::delete_by_id(id.to_string()).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(AppError::NotFound("Report not found.".to_string()));
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}
