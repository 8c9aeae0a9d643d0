//! Target schema catalogue and per-field coercion classes

use serde::{Deserialize, Serialize};

use super::resource_kind::ResourceKind;

/// Maximum title length accepted by the target store
pub const TITLE_MAX_LEN: usize = 255;

/// Maximum SKU length accepted by the target store
pub const SKU_MAX_LEN: usize = 100;

const PRODUCT_FIELDS: &[&str] = &[
    "title",
    "description",
    "price",
    "compare_at_price",
    "cost",
    "sku",
    "barcode",
    "inventory_quantity",
    "vendor",
    "product_type",
    "tags",
    "weight",
    "status",
];

const CUSTOMER_FIELDS: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "phone",
    "address",
    "city",
    "country",
    "zip",
    "accepts_marketing",
    "tags",
];

const ORDER_FIELDS: &[&str] = &[
    "order_number",
    "email",
    "total_price",
    "subtotal_price",
    "total_tax",
    "currency",
    "line_items",
    "quantity",
    "created_at",
];

const INVENTORY_FIELDS: &[&str] = &["sku", "inventory_quantity", "location"];

/// Fields of the fixed target schema for a resource kind
pub fn target_fields(resource: ResourceKind) -> &'static [&'static str] {
    match resource {
        ResourceKind::Product => PRODUCT_FIELDS,
        ResourceKind::Customer => CUSTOMER_FIELDS,
        ResourceKind::Order => ORDER_FIELDS,
        ResourceKind::Inventory => INVENTORY_FIELDS,
    }
}

/// How a value is coerced when copied into a target field
///
/// A bad price blocks the import; a messy stock count falls back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCoercion {
    /// Float, formatted with two decimals; non-numeric input is an error
    Price,
    /// Integer, zero when unparseable
    Quantity,
    /// Lists are joined with commas
    Tags,
    PassThrough,
}

/// Coercion class for a target field name
pub fn coercion_for(target_field: &str) -> FieldCoercion {
    match target_field {
        "price" | "compare_at_price" | "cost" | "total_price" | "subtotal_price" | "total_tax" => {
            FieldCoercion::Price
        }
        "inventory_quantity" | "quantity" => FieldCoercion::Quantity,
        "tags" => FieldCoercion::Tags,
        _ => FieldCoercion::PassThrough,
    }
}
