use async_trait::async_trait;
use sea_orm::{
    DatabaseConnection, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
    sea_query::{Expr, Func, OnConflict},
};
use uuid::Uuid;

use super::AccountStore;
use crate::{AccountSnapshot, Ledger, ResultEngine, account};

/// Store backed by the `accounts` table of a sea-orm connection.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.database
    }
}

fn upsert() -> OnConflict {
    OnConflict::column(account::Column::Id)
        .update_columns([
            account::Column::Name,
            account::Column::Liquid,
            account::Column::Vault,
            account::Column::LastActivity,
        ])
        .to_owned()
}

fn metric_column(metric: Ledger) -> account::Column {
    match metric {
        Ledger::Liquid => account::Column::Liquid,
        Ledger::Vault => account::Column::Vault,
    }
}

fn into_snapshots(models: Vec<account::Model>) -> ResultEngine<Vec<AccountSnapshot>> {
    models.into_iter().map(AccountSnapshot::try_from).collect()
}

#[async_trait]
impl AccountStore for SqlStore {
    async fn load_by_id(&self, id: Uuid) -> ResultEngine<Option<AccountSnapshot>> {
        account::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .map(AccountSnapshot::try_from)
            .transpose()
    }

    async fn find_by_name(&self, name: &str) -> ResultEngine<Option<AccountSnapshot>> {
        account::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(account::Column::Name)))
                    .eq(name.to_lowercase()),
            )
            .order_by_desc(account::Column::LastActivity)
            .one(&self.database)
            .await?
            .map(AccountSnapshot::try_from)
            .transpose()
    }

    async fn save(&self, snapshot: &AccountSnapshot) -> ResultEngine<()> {
        account::Entity::insert(account::ActiveModel::from(snapshot))
            .on_conflict(upsert())
            .exec_without_returning(&self.database)
            .await?;
        Ok(())
    }

    async fn list_top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>> {
        let models = account::Entity::find()
            .order_by_desc(metric_column(metric))
            .order_by_asc(account::Column::Name)
            .limit(limit as u64)
            .all(&self.database)
            .await?;
        into_snapshots(models)
    }

    async fn count(&self) -> ResultEngine<u64> {
        Ok(account::Entity::find().count(&self.database).await?)
    }

    async fn list_all(&self) -> ResultEngine<Vec<AccountSnapshot>> {
        let models = account::Entity::find()
            .order_by_asc(account::Column::Id)
            .all(&self.database)
            .await?;
        into_snapshots(models)
    }

    async fn save_batch(&self, snapshots: &[AccountSnapshot]) -> ResultEngine<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let db_tx = self.database.begin().await?;
        account::Entity::insert_many(snapshots.iter().map(account::ActiveModel::from))
            .on_conflict(upsert())
            .exec_without_returning(&db_tx)
            .await?;
        db_tx.commit().await?;
        Ok(())
    }
}
