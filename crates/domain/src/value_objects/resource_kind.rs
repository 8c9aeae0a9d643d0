//! ResourceKind / OperationKind - what is written to the target store and how

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;

/// Resource families of the target commerce schema
///
/// Every source record carries one of these explicitly; the engine never
/// guesses the kind from which fields happen to be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Product,
    Customer,
    Order,
    Inventory,
}

impl ResourceKind {
    /// All kinds in stage execution order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Product,
        ResourceKind::Customer,
        ResourceKind::Order,
        ResourceKind::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Product => "product",
            ResourceKind::Customer => "customer",
            ResourceKind::Order => "order",
            ResourceKind::Inventory => "inventory",
        }
    }

    /// Collection name used by REST endpoints and stage names
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Product => "products",
            ResourceKind::Customer => "customers",
            ResourceKind::Order => "orders",
            ResourceKind::Inventory => "inventory_levels",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" | "products" => Ok(ResourceKind::Product),
            "customer" | "customers" => Ok(ResourceKind::Customer),
            "order" | "orders" => Ok(ResourceKind::Order),
            "inventory" | "inventory_levels" => Ok(ResourceKind::Inventory),
            other => Err(DomainError::InvalidResourceKind(other.to_string())),
        }
    }
}

/// Kind of write performed against the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}
