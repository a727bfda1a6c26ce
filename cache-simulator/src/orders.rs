// Synthetic order documents
//
// Orders mirror the JSON documents an order-storage service ingests: a
// unique id, delivery and payment details and a couple of line items. The
// cache only ever sees the serialized bytes.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const CITIES: &[&str] = &["Kazan", "Tver", "Omsk", "Perm", "Samara", "Tula", "Ufa"];
const BRANDS: &[&str] = &["Vivienne Sabo", "Acme", "Northwind", "Globex", "Initech"];
const PRODUCTS: &[&str] = &["Mascaras", "Notebook", "Kettle", "Backpack", "Scarf"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: u32,
    pub payment_dt: u64,
    pub bank: String,
    pub delivery_cost: u32,
    pub goods_total: u32,
    pub custom_fee: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: u32,
    pub track_number: String,
    pub price: u32,
    pub rid: String,
    pub name: String,
    pub sale: u32,
    pub size: String,
    pub total_price: u32,
    pub nm_id: u32,
    pub brand: String,
    pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: u32,
    pub date_created: String,
    pub oof_shard: String,
}

/// A serialized order with its storage rank
#[derive(Debug, Clone)]
pub struct OrderBox {
    /// Order uid, the cache key
    pub uid: String,
    /// Insertion rank; larger is newer
    pub rank: u64,
    /// JSON document
    pub data: Vec<u8>,
}

/// Deterministic order generator
pub struct OrderGenerator {
    rng: StdRng,
    items_per_order: usize,
}

impl OrderGenerator {
    /// Create a generator from a seed
    pub fn new(seed: u64, items_per_order: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            items_per_order: items_per_order.max(1),
        }
    }

    fn nonce(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect()
    }

    fn pick(&mut self, choices: &[&str]) -> String {
        choices[self.rng.gen_range(0..choices.len())].to_string()
    }

    /// Generate one order document
    pub fn order(&mut self) -> Order {
        let entry = "WBIL".to_string();
        let track_number = format!("{entry}{}", self.nonce(16).to_ascii_uppercase());
        let customer_id = self.nonce(16);
        let order_uid = format!("{}{}", self.nonce(16), customer_id);

        let items = (0..self.items_per_order)
            .map(|_| {
                let price = self.rng.gen_range(99..5_000);
                let sale = self.rng.gen_range(0..50);
                Item {
                    chrt_id: self.rng.gen_range(1..9_999_999),
                    track_number: track_number.clone(),
                    price,
                    rid: format!("{}{}", self.nonce(16), customer_id),
                    name: self.pick(PRODUCTS),
                    sale,
                    size: "0".to_string(),
                    total_price: price * (100 - sale) / 100,
                    nm_id: self.rng.gen_range(1..9_999_999),
                    brand: self.pick(BRANDS),
                    status: 202,
                }
            })
            .collect::<Vec<_>>();
        let goods_total: u32 = items.iter().map(|i| i.total_price).sum();
        let delivery_cost: u32 = self.rng.gen_range(0..2_000);

        Order {
            order_uid: order_uid.clone(),
            track_number,
            entry,
            delivery: Delivery {
                name: format!("Customer {}", self.nonce(6)),
                phone: format!("+7{:010}", self.rng.gen_range(0..10_000_000_000u64)),
                zip: format!("{:06}", self.rng.gen_range(0..1_000_000)),
                city: self.pick(CITIES),
                address: format!("Street {}", self.rng.gen_range(1..200)),
                region: self.pick(CITIES),
                email: format!("{}@example.com", self.nonce(8)),
            },
            payment: Payment {
                transaction: order_uid,
                request_id: String::new(),
                currency: "RUB".to_string(),
                provider: "wbpay".to_string(),
                amount: goods_total + delivery_cost,
                payment_dt: 1_637_907_727 + self.rng.gen_range(0..10_000_000),
                bank: "alpha".to_string(),
                delivery_cost,
                goods_total,
                custom_fee: 0,
            },
            items,
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id,
            delivery_service: "meest".to_string(),
            shardkey: self.rng.gen_range(0..10).to_string(),
            sm_id: self.rng.gen_range(1..100),
            date_created: "2021-11-26T06:22:19Z".to_string(),
            oof_shard: "1".to_string(),
        }
    }

    /// Generate and serialize one order
    pub fn order_box(&mut self, rank: u64) -> serde_json::Result<OrderBox> {
        let order = self.order();
        let data = serde_json::to_vec(&order)?;
        Ok(OrderBox {
            uid: order.order_uid,
            rank,
            data,
        })
    }
}
