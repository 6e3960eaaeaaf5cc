use sea_orm::entity::prelude::*;

/// Append-only. The repository exposes no update or delete path for this
/// table and none should be added.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub ts: String,

    /// None for system-initiated actions.
    pub actor_id: Option<i32>,

    pub action: String,

    pub entity: String,

    pub entity_id: i32,

    #[sea_orm(column_type = "Text")]
    pub details: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
