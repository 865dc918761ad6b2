//! Строки списка обзвона: членство студентов в списке.
//! Ровно по этой таблице импорт понимает, был ли attach no-op'ом.

use chrono::Utc;
use contracts::domain::a002_call_list::aggregate::CallListEntry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::shared::data::db::get_connection;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a002_call_list_entry")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub call_list_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: String,
    pub added_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CallListEntry {
    fn from(m: Model) -> Self {
        CallListEntry {
            call_list_id: m.call_list_id,
            student_id: m.student_id,
            added_at: m.added_at.unwrap_or_else(Utc::now),
        }
    }
}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

/// Включить студента в список. `Ok(true)` — добавлен новой строкой,
/// `Ok(false)` — уже состоял (идемпотентный no-op).
pub async fn attach(call_list_id: Uuid, student_id: Uuid) -> anyhow::Result<bool> {
    let existing = Entity::find()
        .filter(Column::CallListId.eq(call_list_id.to_string()))
        .filter(Column::StudentId.eq(student_id.to_string()))
        .one(conn())
        .await?;
    if existing.is_some() {
        return Ok(false);
    }

    let active = ActiveModel {
        call_list_id: Set(call_list_id.to_string()),
        student_id: Set(student_id.to_string()),
        added_at: Set(Some(Utc::now())),
    };
    active.insert(conn()).await?;
    Ok(true)
}

pub async fn list_by_call_list(call_list_id: Uuid) -> anyhow::Result<Vec<CallListEntry>> {
    let items = Entity::find()
        .filter(Column::CallListId.eq(call_list_id.to_string()))
        .order_by_asc(Column::AddedAt)
        .all(conn())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(items)
}

pub async fn detach(call_list_id: Uuid, student_id: Uuid) -> anyhow::Result<bool> {
    let result = Entity::delete_many()
        .filter(Column::CallListId.eq(call_list_id.to_string()))
        .filter(Column::StudentId.eq(student_id.to_string()))
        .exec(conn())
        .await?;
    Ok(result.rows_affected > 0)
}
