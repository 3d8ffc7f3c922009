//! Initial state for the in-memory backends, loadable from a JSON file.

use crate::domain::balance::{Balance, GrowId};
use crate::domain::interaction::UserId;
use crate::domain::product::{Product, ProductCode, WorldInfo, WorldStatus};
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryShop;
use chrono::Utc;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    pub code: String,
    pub name: String,
    pub price: Balance,
    #[serde(default)]
    pub description: String,
    /// Deliverable payloads, one per unit of stock.
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub user: UserId,
    pub growid: String,
    #[serde(default)]
    pub balance: Balance,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    pub world: Option<WorldInfo>,
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
    #[serde(default)]
    pub blacklist: Vec<UserId>,
    pub daily_limit: Option<Balance>,
}

impl Seed {
    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// A small catalog used when no file is given.
    pub fn demo() -> Self {
        let items = |prefix: &str, count: usize| -> Vec<String> {
            (1..=count).map(|i| format!("{prefix}-{i:04}")).collect()
        };
        Self {
            products: vec![
                SeedProduct {
                    code: "DL".to_string(),
                    name: "Diamond Lock".to_string(),
                    price: Balance::from_wl(100),
                    description: "100 World Locks in one lock".to_string(),
                    items: items("DL", 40),
                },
                SeedProduct {
                    code: "BGL".to_string(),
                    name: "Blue Gem Lock".to_string(),
                    price: Balance::from_wl(10_000),
                    description: String::new(),
                    items: items("BGL", 3),
                },
                SeedProduct {
                    code: "SEED".to_string(),
                    name: "Mystery Seed".to_string(),
                    price: Balance::from_wl(5),
                    description: String::new(),
                    items: Vec::new(),
                },
            ],
            world: Some(WorldInfo {
                world: "BUYHERE".to_string(),
                owner: "ShopOwner".to_string(),
                bot: "StockBot".to_string(),
                status: WorldStatus::Online,
                features: vec!["Auto delivery".to_string(), "24/7 stock".to_string()],
                updated_at: Some(Utc::now()),
            }),
            accounts: Vec::new(),
            blacklist: Vec::new(),
            daily_limit: Some(Balance::from_wl(1_000_000)),
        }
    }

    /// Loads this seed into `shop`. Codes and aliases are validated.
    pub async fn apply(self, shop: &InMemoryShop) -> Result<()> {
        for seeded in self.products {
            let product = Product {
                code: ProductCode::parse(&seeded.code)?,
                name: seeded.name,
                price: seeded.price,
                description: seeded.description,
                stock: 0,
            };
            shop.products.add_product(product, seeded.items).await;
        }
        if let Some(world) = self.world {
            shop.products.set_world_info(world).await;
        }
        for account in self.accounts {
            let growid = GrowId::parse(&account.growid)?;
            shop.balance
                .seed_account(account.user, growid, account.balance)
                .await;
        }
        for user in self.blacklist {
            shop.admin.blacklist(user);
        }
        shop.balance.set_daily_limit(self.daily_limit).await;
        Ok(())
    }
}
