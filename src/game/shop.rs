//! Shop module
//!
//! Shops are fixed vendors with a stock plan. Live stock drifts as players
//! trade; the new-day timer calls [`ShopRegistry::resupply_all`] to pull
//! every shop back to its plan.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One line of a shop's stock plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    /// Item definition id
    pub item: u32,

    /// Quantity the shop restocks to
    pub qty: u32,
}

/// Static shop definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopDef {
    pub id: String,
    pub name: String,

    /// Map the shopfront stands on
    pub map: String,
    pub x: i32,
    pub y: i32,

    #[serde(default)]
    pub stock: Vec<StockLine>,
}

impl ShopDef {
    /// Shops of the built-in world
    pub fn builtin() -> Vec<ShopDef> {
        vec![
            ShopDef {
                id: "rusty-anvil".to_string(),
                name: "The Rusty Anvil".to_string(),
                map: "city".to_string(),
                x: 4,
                y: 3,
                stock: vec![
                    StockLine { item: 1, qty: 3 },
                    StockLine { item: 3, qty: 2 },
                    StockLine { item: 5, qty: 2 },
                ],
            },
            ShopDef {
                id: "last-candle".to_string(),
                name: "The Last Candle".to_string(),
                map: "city".to_string(),
                x: 7,
                y: 5,
                stock: vec![
                    StockLine { item: 11, qty: 8 },
                    StockLine { item: 12, qty: 4 },
                    StockLine { item: 13, qty: 10 },
                    StockLine { item: 16, qty: 12 },
                ],
            },
        ]
    }
}

/// A shop's live stock
#[derive(Debug, Clone)]
struct ShopState {
    def: ShopDef,
    stock: Vec<StockLine>,
}

/// All shops, keyed by id
pub struct ShopRegistry {
    shops: RwLock<HashMap<String, ShopState>>,
}

impl ShopRegistry {
    pub fn new(defs: Vec<ShopDef>) -> Self {
        let shops = defs
            .into_iter()
            .map(|def| {
                let stock = def.stock.clone();
                (def.id.clone(), ShopState { def, stock })
            })
            .collect();
        Self {
            shops: RwLock::new(shops),
        }
    }

    pub fn shop_count(&self) -> usize {
        self.shops.read().len()
    }

    /// Current stock of a shop
    pub fn stock_of(&self, shop_id: &str) -> Option<Vec<StockLine>> {
        self.shops.read().get(shop_id).map(|s| s.stock.clone())
    }

    /// Take quantity off a stock line, saturating at zero
    pub fn take_stock(&self, shop_id: &str, item: u32, qty: u32) {
        let mut shops = self.shops.write();
        if let Some(shop) = shops.get_mut(shop_id) {
            if let Some(line) = shop.stock.iter_mut().find(|l| l.item == item) {
                line.qty = line.qty.saturating_sub(qty);
            }
        }
    }

    /// Restock every shop toward its plan. Each line lands at the planned
    /// quantity or one unit short of it.
    pub fn resupply_all(&self) {
        let mut rng = rand::thread_rng();
        let mut shops = self.shops.write();
        for shop in shops.values_mut() {
            let planned = &shop.def.stock;
            shop.stock = planned
                .iter()
                .map(|line| {
                    let slack = rng.gen_range(0..=1u32.min(line.qty));
                    StockLine {
                        item: line.item,
                        qty: line.qty - slack,
                    }
                })
                .collect();
            debug!(shop = %shop.def.id, lines = shop.stock.len(), "Shop resupplied");
        }
        info!(shops = shops.len(), "All shops resupplied");
    }
}
