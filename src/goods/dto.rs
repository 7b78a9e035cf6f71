use serde::{Deserialize, Serialize};

use super::repo::{Good, GoodWithOwner};

/// Public JSON projection of a good. The photo name stays private.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GoodView {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub user_id: i64,
}

impl From<Good> for GoodView {
    fn from(g: Good) -> Self {
        Self {
            id: g.id,
            name: g.name,
            price: g.price,
            user_id: g.user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GoodDetails {
    #[serde(flatten)]
    pub good: GoodView,
    pub owner_username: String,
}

impl From<GoodWithOwner> for GoodDetails {
    fn from(g: GoodWithOwner) -> Self {
        Self {
            good: g.good.into(),
            owner_username: g.owner_username,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoodRequest {
    pub name: String,
    pub price: f64,
}
