use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

// ===== Products Entity =====

pub mod products {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "products")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(column_type = "String(StringLen::N(100))")]
        pub name: String,
        #[sea_orm(column_type = "String(StringLen::N(500))", nullable)]
        pub description: Option<String>,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub price: Decimal,
        #[sea_orm(column_type = "String(StringLen::N(50))")]
        pub category: String,
        pub stock_quantity: i32,
        #[sea_orm(column_type = "String(StringLen::N(50))", unique)]
        pub sku: String,
        pub is_active: bool,
        pub version: i32,
        pub created_at: DateTimeWithTimeZone,
        pub updated_at: DateTimeWithTimeZone,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::price_history::Entity")]
        PriceHistory,
    }

    impl Related<super::price_history::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::PriceHistory.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl From<Model> for crate::models::Product {
        fn from(model: Model) -> Self {
            Self {
                id: model.id,
                name: model.name,
                description: model.description,
                price: model.price,
                category: model.category,
                stock_quantity: model.stock_quantity,
                sku: model.sku,
                is_active: model.is_active,
                version: model.version,
                created_at: model.created_at.into(),
                updated_at: model.updated_at.into(),
            }
        }
    }

    impl From<crate::models::NewProduct> for ActiveModel {
        fn from(input: crate::models::NewProduct) -> Self {
            let now = chrono::Utc::now();
            ActiveModel {
                id: NotSet,
                name: Set(input.name),
                description: Set(input.description),
                price: Set(input.price),
                category: Set(input.category),
                stock_quantity: Set(input.stock_quantity),
                sku: Set(input.sku.unwrap_or_else(crate::models::generate_sku)),
                is_active: Set(input.is_active),
                version: Set(1),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
        }
    }

    /// Column values for a versioned update, `id` and `created_at` left untouched
    impl From<&crate::models::Product> for ActiveModel {
        fn from(product: &crate::models::Product) -> Self {
            ActiveModel {
                id: NotSet,
                name: Set(product.name.clone()),
                description: Set(product.description.clone()),
                price: Set(product.price),
                category: Set(product.category.clone()),
                stock_quantity: Set(product.stock_quantity),
                sku: Set(product.sku.clone()),
                is_active: Set(product.is_active),
                version: Set(product.version + 1),
                created_at: NotSet,
                updated_at: Set(product.updated_at.into()),
            }
        }
    }
}

// ===== Price History Entity =====

pub mod price_history {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "price_history")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub product_id: i64,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub old_price: Decimal,
        #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
        pub new_price: Decimal,
        #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
        pub change_reason: Option<String>,
        pub changed_at: DateTimeWithTimeZone,
        #[sea_orm(column_type = "String(StringLen::N(100))", nullable)]
        pub changed_by: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::products::Entity",
            from = "Column::ProductId",
            to = "super::products::Column::Id",
            on_delete = "Cascade"
        )]
        Product,
    }

    impl Related<super::products::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Product.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl From<Model> for crate::models::PriceHistory {
        fn from(model: Model) -> Self {
            Self {
                id: model.id,
                product_id: model.product_id,
                old_price: model.old_price,
                new_price: model.new_price,
                change_reason: model.change_reason,
                changed_at: model.changed_at.into(),
                changed_by: model.changed_by,
            }
        }
    }

    impl From<crate::models::NewPriceHistory> for ActiveModel {
        fn from(input: crate::models::NewPriceHistory) -> Self {
            ActiveModel {
                id: NotSet,
                product_id: Set(input.product_id),
                old_price: Set(input.old_price),
                new_price: Set(input.new_price),
                change_reason: Set(input.change_reason),
                changed_at: Set(chrono::Utc::now().into()),
                changed_by: Set(input.changed_by),
            }
        }
    }
}
