//! Off-ledger relational mirror of order state.
//!
//! Three tables: users (bech32 address), assets (policy id + asset name,
//! deduplicated, with the native currency stored as `("", "")`) and orders
//! keyed by outpoint with foreign keys into the other two. Rows are never
//! deleted; a closed order is only flagged `consumed`.
//!
//! Writes to one order key go through the map entry for that key, which
//! holds the shard lock for the duration of the closure. Different orders
//! proceed in parallel.
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::cache::{load_from_file, save_to_file};
use crate::models::{Order, OutRef, Token};

pub type UserId = u64;
pub type AssetId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRow {
    pub id: AssetId,
    pub policy_id: String,
    pub name_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub tx_hash: String,
    pub output_index: u32,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub sent_asset_id: AssetId,
    pub sent_amount: u64,
    pub requested_asset_id: AssetId,
    pub requested_amount: u64,
    pub consumed: bool,
}

/// An order as first observed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub out_ref: OutRef,
    pub sender: String,
    pub sent_asset: Token,
    pub sent_amount: u64,
    pub requested_asset: Token,
    pub requested_amount: u64,
}

/// How a close applies to a row created by an open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub receiver: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Inserted,
    /// Inserted and immediately closed by a close seen earlier.
    InsertedClosed,
    /// The row already existed; nothing changed.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
    /// No row yet; `on_missing` was run while the key was held.
    Missing,
}

/// Serialized form of the whole mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    pub users: Vec<UserRow>,
    pub assets: Vec<AssetRow>,
    pub orders: Vec<OrderRow>,
}

#[derive(Debug, Default)]
pub struct OrderMirror {
    users: DashMap<String, UserId>,
    user_addresses: DashMap<UserId, String>,
    assets: DashMap<(String, String), AssetId>,
    asset_keys: DashMap<AssetId, (String, String)>,
    orders: DashMap<OutRef, OrderRow>,
    next_id: AtomicU64,
}

impl OrderMirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn user_id(&self, address: &str) -> UserId {
        *self.users.entry(address.to_string()).or_insert_with(|| {
            let id = self.fresh_id();
            self.user_addresses.insert(id, address.to_string());
            id
        })
    }

    fn asset_id(&self, token: &Token) -> AssetId {
        let key = token.to_pair();
        *self.assets.entry(key.clone()).or_insert_with(|| {
            let id = self.fresh_id();
            self.asset_keys.insert(id, key);
            id
        })
    }

    /// Insert an open order unless a row for the outpoint exists.
    ///
    /// `on_insert` runs only for a new row, under the row's lock; returning a
    /// closure there inserts the row already consumed.
    pub fn open_with<F>(&self, order: NewOrder, on_insert: F) -> OpenOutcome
    where
        F: FnOnce(&OutRef) -> Option<Closure>,
    {
        let sender_id = self.user_id(&order.sender);
        let sent_asset_id = self.asset_id(&order.sent_asset);
        let requested_asset_id = self.asset_id(&order.requested_asset);

        match self.orders.entry(order.out_ref.clone()) {
            Entry::Occupied(_) => OpenOutcome::Unchanged,
            Entry::Vacant(slot) => {
                let closure = on_insert(&order.out_ref);
                let receiver_id = closure
                    .as_ref()
                    .and_then(|c| c.receiver.as_deref())
                    .map(|r| self.user_id(r));
                slot.insert(OrderRow {
                    tx_hash: order.out_ref.tx_hash.clone(),
                    output_index: order.out_ref.output_index,
                    sender_id,
                    receiver_id,
                    sent_asset_id,
                    sent_amount: order.sent_amount,
                    requested_asset_id,
                    requested_amount: order.requested_amount,
                    consumed: closure.is_some(),
                });
                if closure.is_some() {
                    OpenOutcome::InsertedClosed
                } else {
                    OpenOutcome::Inserted
                }
            }
        }
    }

    pub fn upsert_open(&self, order: NewOrder) -> OpenOutcome {
        self.open_with(order, |_| None)
    }

    /// Mark the order at `out_ref` consumed.
    ///
    /// `receiver_for` gets the order's sender address and picks the receiver,
    /// if any. When no row exists, `on_missing` runs while the key is still
    /// held, so a concurrent open for the same outpoint cannot slip in between.
    pub fn close_or_else<R, F>(&self, out_ref: &OutRef, receiver_for: R, on_missing: F) -> CloseOutcome
    where
        R: FnOnce(&str) -> Option<String>,
        F: FnOnce(),
    {
        match self.orders.entry(out_ref.clone()) {
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                if row.consumed {
                    return CloseOutcome::AlreadyClosed;
                }
                let sender = self
                    .user_addresses
                    .get(&row.sender_id)
                    .map(|a| a.value().clone())
                    .unwrap_or_default();
                row.consumed = true;
                row.receiver_id = receiver_for(&sender).map(|r| self.user_id(&r));
                CloseOutcome::Closed
            }
            Entry::Vacant(_slot) => {
                on_missing();
                CloseOutcome::Missing
            }
        }
    }

    pub fn close(&self, out_ref: &OutRef, receiver: Option<String>) -> CloseOutcome {
        self.close_or_else(out_ref, |_| receiver, || {})
    }

    /// Un-consume a row that was retired without a receiver.
    ///
    /// Rows closed by a resolve or cancel keep their state. Returns whether
    /// the row was reopened.
    pub fn reopen(&self, out_ref: &OutRef) -> bool {
        match self.orders.get_mut(out_ref) {
            Some(mut row) if row.consumed && row.receiver_id.is_none() => {
                row.consumed = false;
                true
            }
            _ => false,
        }
    }

    fn materialize(&self, row: &OrderRow) -> Order {
        let address = |id: UserId| {
            self.user_addresses
                .get(&id)
                .map(|a| a.value().clone())
                .unwrap_or_default()
        };
        let token = |id: AssetId| {
            self.asset_keys
                .get(&id)
                .map(|k| Token::from_pair(&k.0, &k.1))
                .unwrap_or(Token::Lovelace)
        };
        Order {
            tx_hash: row.tx_hash.clone(),
            output_index: row.output_index,
            sender: address(row.sender_id),
            sent_asset: token(row.sent_asset_id),
            sent_amount: row.sent_amount,
            requested_asset: token(row.requested_asset_id),
            requested_amount: row.requested_amount,
            receiver: row.receiver_id.map(address),
            consumed: row.consumed,
        }
    }

    fn collect(&self, keep: impl Fn(&OrderRow) -> bool) -> Vec<Order> {
        let rows: Vec<OrderRow> = self
            .orders
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.value().clone())
            .collect();
        let mut orders: Vec<Order> = rows.iter().map(|r| self.materialize(r)).collect();
        orders.sort_by(|a, b| a.out_ref().cmp(&b.out_ref()));
        orders
    }

    pub fn get(&self, out_ref: &OutRef) -> Option<Order> {
        let row = self.orders.get(out_ref).map(|r| r.value().clone())?;
        Some(self.materialize(&row))
    }

    pub fn list_open_orders(&self) -> Vec<Order> {
        self.collect(|r| !r.consumed)
    }

    /// Closed orders where `address` was the sender or the receiver.
    pub fn list_order_history(&self, address: &str) -> Vec<Order> {
        let Some(user) = self.users.get(address).map(|u| *u.value()) else {
            return Vec::new();
        };
        self.collect(|r| r.consumed && (r.sender_id == user || r.receiver_id == Some(user)))
    }

    pub fn list_all(&self) -> Vec<Order> {
        self.collect(|_| true)
    }

    pub fn open_refs(&self) -> Vec<OutRef> {
        self.orders
            .iter()
            .filter(|r| !r.value().consumed)
            .map(|r| r.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        let mut users: Vec<UserRow> = self
            .user_addresses
            .iter()
            .map(|u| UserRow {
                id: *u.key(),
                address: u.value().clone(),
            })
            .collect();
        users.sort_by_key(|u| u.id);
        let mut assets: Vec<AssetRow> = self
            .asset_keys
            .iter()
            .map(|a| AssetRow {
                id: *a.key(),
                policy_id: a.value().0.clone(),
                name_hex: a.value().1.clone(),
            })
            .collect();
        assets.sort_by_key(|a| a.id);
        let mut orders: Vec<OrderRow> = self.orders.iter().map(|o| o.value().clone()).collect();
        orders.sort_by(|a, b| (&a.tx_hash, a.output_index).cmp(&(&b.tx_hash, b.output_index)));
        MirrorSnapshot {
            users,
            assets,
            orders,
        }
    }

    pub fn from_snapshot(snapshot: MirrorSnapshot) -> Self {
        let mirror = Self::new();
        let mut max_id = 0;
        for user in snapshot.users {
            max_id = max_id.max(user.id);
            mirror.users.insert(user.address.clone(), user.id);
            mirror.user_addresses.insert(user.id, user.address);
        }
        for asset in snapshot.assets {
            max_id = max_id.max(asset.id);
            let key = (asset.policy_id, asset.name_hex);
            mirror.assets.insert(key.clone(), asset.id);
            mirror.asset_keys.insert(asset.id, key);
        }
        for order in snapshot.orders {
            mirror
                .orders
                .insert(OutRef::new(&order.tx_hash, order.output_index), order);
        }
        mirror.next_id.store(max_id, Ordering::Relaxed);
        mirror
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        save_to_file(&self.snapshot(), path)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let snapshot: MirrorSnapshot = load_from_file(path)?;
        tracing::info!(orders = snapshot.orders.len(), "mirror snapshot loaded");
        Ok(Self::from_snapshot(snapshot))
    }
}
