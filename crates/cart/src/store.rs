//! In-process cart store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use common::{CartCode, CartItemId, ProductId, UserId};
use inventory::InventoryLedger;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard, RwLock};

use crate::error::{CartError, Result};
use crate::model::{Cart, CartItem, CartOwner};

/// A cart behind its own lock. Holds `None` once the cart has been deleted, so
/// a caller that looked the slot up just before the deletion sees it as gone.
type CartSlot = Arc<Mutex<Option<Cart>>>;

/// An exclusive lock on a live cart.
type CartGuard = OwnedMappedMutexGuard<Option<Cart>, Cart>;

#[derive(Default)]
struct Registry {
    carts: HashMap<CartCode, CartSlot>,
    by_user: HashMap<UserId, CartCode>,
    items: HashMap<CartItemId, CartCode>,
}

/// Holds every cart of the process.
///
/// The registry lock only guards lookups and is never held while waiting on a
/// cart lock. A cart lock may be held while taking the registry lock or reading
/// a product from the ledger; nothing takes a cart lock while holding either.
#[derive(Clone)]
pub struct CartStore<L> {
    ledger: L,
    registry: Arc<RwLock<Registry>>,
    next_item_id: Arc<AtomicI64>,
}

async fn lock_live(slot: CartSlot) -> Option<CartGuard> {
    OwnedMutexGuard::try_map(slot.lock_owned().await, |cart| cart.as_mut()).ok()
}

impl<L: InventoryLedger> CartStore<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            registry: Arc::default(),
            next_item_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Number of live carts.
    pub async fn cart_count(&self) -> usize {
        self.registry.read().await.carts.len()
    }

    /// Creates an anonymous cart with a fresh code.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self) -> Cart {
        let mut registry = self.registry.write().await;
        let code = loop {
            let code = CartCode::generate();
            if !registry.carts.contains_key(&code) {
                break code;
            }
        };
        let cart = Cart::new(code.clone(), CartOwner::Anonymous);
        registry
            .carts
            .insert(code, Arc::new(Mutex::new(Some(cart.clone()))));
        tracing::debug!(cart_code = %cart.code, "cart created");
        cart
    }

    pub async fn get(&self, code: &CartCode) -> Result<Cart> {
        let slot = self
            .slot(code)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;
        let cart = lock_live(slot)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;
        Ok(cart.clone())
    }

    /// Returns the cart with `code`, creating an anonymous one under that code
    /// if none exists.
    pub async fn get_or_create(&self, code: &CartCode) -> Cart {
        self.lock_or_create(code).await.clone()
    }

    pub async fn get_for_user(&self, user: UserId) -> Result<Cart> {
        let slot = {
            let registry = self.registry.read().await;
            registry
                .by_user
                .get(&user)
                .and_then(|code| registry.carts.get(code))
                .cloned()
        };
        let slot = slot.ok_or(CartError::UserCartNotFound(user))?;
        let cart = lock_live(slot)
            .await
            .ok_or(CartError::UserCartNotFound(user))?;
        Ok(cart.clone())
    }

    /// Returns the user's cart, creating it on first use.
    pub async fn get_or_create_for_user(&self, user: UserId) -> Cart {
        self.lock_user_cart(user).await.clone()
    }

    /// Adds `quantity` units of a product to a cart.
    ///
    /// The cart is created if the code is unknown. Stock is only checked, not
    /// reserved.
    #[tracing::instrument(skip(self), fields(cart_code = %code, product_id = %product_id))]
    pub async fn add_item(
        &self,
        code: &CartCode,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let product = self
            .ledger
            .product(product_id)
            .await?
            .filter(|product| product.in_stock)
            .ok_or(CartError::ProductUnavailable(product_id))?;

        let mut cart = self.lock_or_create(code).await;

        let existing = cart.item_for(product_id).map_or(0, |item| item.quantity);
        let wanted = existing
            .checked_add(quantity)
            .ok_or(CartError::InvalidQuantity { quantity })?;
        if wanted > product.stock_quantity {
            return Err(CartError::InsufficientStock {
                product_id,
                available: product.stock_quantity,
            });
        }

        match cart.item_for_mut(product_id) {
            Some(item) => item.quantity = wanted,
            None => {
                let id = self.next_item_id();
                cart.items.push(CartItem {
                    id,
                    product_id,
                    quantity: wanted,
                });
                self.registry
                    .write()
                    .await
                    .items
                    .insert(id, cart.code.clone());
            }
        }
        cart.touch();

        metrics::counter!("cart_items_added_total").increment(1);
        tracing::debug!(quantity = wanted, "cart item updated");
        Ok(cart.clone())
    }

    /// Sets the quantity of an existing cart item.
    #[tracing::instrument(skip(self), fields(item_id = %item_id))]
    pub async fn update_item_quantity(
        &self,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let mut cart = self.lock_item_cart(item_id).await?;
        let product_id = cart
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.product_id)
            .ok_or(CartError::ItemNotFound(item_id))?;

        let product = self
            .ledger
            .product(product_id)
            .await?
            .ok_or(CartError::ProductUnavailable(product_id))?;
        if !product.can_supply(quantity) {
            return Err(CartError::InsufficientStock {
                product_id,
                available: product.stock_quantity,
            });
        }

        let item = cart
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        item.quantity = quantity;
        let updated = item.clone();
        cart.touch();
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(item_id = %item_id))]
    pub async fn delete_item(&self, item_id: CartItemId) -> Result<()> {
        let mut cart = self.lock_item_cart(item_id).await?;
        let position = cart
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        cart.items.remove(position);
        cart.touch();
        self.registry.write().await.items.remove(&item_id);
        Ok(())
    }

    /// Removes every item from a cart and returns them.
    #[tracing::instrument(skip(self), fields(cart_code = %code))]
    pub async fn clear(&self, code: &CartCode) -> Result<Vec<CartItem>> {
        let slot = self
            .slot(code)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;
        let mut cart = lock_live(slot)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;

        let removed = std::mem::take(&mut cart.items);
        cart.touch();

        let mut registry = self.registry.write().await;
        for item in &removed {
            registry.items.remove(&item.id);
        }
        Ok(removed)
    }

    /// Takes the given lines out of a cart, as they were when read.
    ///
    /// Each line loses the quantity recorded in `ordered` and is removed once
    /// nothing is left. Lines added or raised after `ordered` was read keep
    /// the difference.
    #[tracing::instrument(skip(self, ordered), fields(cart_code = %code))]
    pub async fn remove_ordered(&self, code: &CartCode, ordered: &[CartItem]) -> Result<()> {
        let slot = self
            .slot(code)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;
        let mut cart = lock_live(slot)
            .await
            .ok_or_else(|| CartError::CartNotFound(code.clone()))?;

        let mut emptied = Vec::new();
        for line in ordered {
            let Some(item) = cart.items.iter_mut().find(|item| item.id == line.id) else {
                continue;
            };
            item.quantity = item.quantity.saturating_sub(line.quantity);
            if item.quantity == 0 {
                emptied.push(item.id);
            }
        }
        cart.items.retain(|item| item.quantity > 0);
        cart.touch();

        if !emptied.is_empty() {
            let mut registry = self.registry.write().await;
            for id in &emptied {
                registry.items.remove(id);
            }
        }
        Ok(())
    }

    /// Folds an anonymous cart into the user's cart and deletes it.
    ///
    /// Items whose product is gone or out of stock are dropped. Every other
    /// item is summed with the user's line for the same product and capped at
    /// the current stock. The result is staged and applied in one step: an
    /// inventory failure part way through leaves both carts as they were.
    #[tracing::instrument(skip(self), fields(temp_cart = %temp_code, user_id = %user))]
    pub async fn merge(&self, temp_code: &CartCode, user: UserId) -> Result<Cart> {
        let (user_code, user_slot) = self.user_slot(user).await;

        let Some(temp_slot) = self.slot(temp_code).await else {
            tracing::debug!("no cart to merge");
            return self.get_for_user(user).await;
        };
        if Arc::ptr_eq(&user_slot, &temp_slot) {
            return self.get_for_user(user).await;
        }

        // Two cart locks at once: take them in code order.
        let (mut user_guard, mut temp_guard) = if user_code < *temp_code {
            let user_guard = user_slot.lock_owned().await;
            let temp_guard = temp_slot.lock_owned().await;
            (user_guard, temp_guard)
        } else {
            let temp_guard = temp_slot.lock_owned().await;
            let user_guard = user_slot.lock_owned().await;
            (user_guard, temp_guard)
        };

        let Some(user_cart) = &mut *user_guard else {
            return Err(CartError::UserCartNotFound(user));
        };
        let Some(temp_cart) = &*temp_guard else {
            return Ok(user_cart.clone());
        };
        if let CartOwner::Owned(owner) = temp_cart.owner
            && owner != user
        {
            return Err(CartError::Forbidden(temp_code.clone()));
        }

        let mut staged = user_cart.items.clone();
        let mut added = Vec::new();
        let mut skipped = 0usize;
        for temp_item in &temp_cart.items {
            let product = match self.ledger.product(temp_item.product_id).await? {
                Some(product) if product.in_stock => product,
                _ => {
                    tracing::debug!(
                        product_id = %temp_item.product_id,
                        "skipping unavailable product"
                    );
                    skipped += 1;
                    continue;
                }
            };

            match staged
                .iter_mut()
                .find(|item| item.product_id == temp_item.product_id)
            {
                Some(item) => {
                    item.quantity = item
                        .quantity
                        .saturating_add(temp_item.quantity)
                        .min(product.stock_quantity);
                }
                None => {
                    let quantity = temp_item.quantity.min(product.stock_quantity);
                    if quantity == 0 {
                        skipped += 1;
                        continue;
                    }
                    let id = self.next_item_id();
                    staged.push(CartItem {
                        id,
                        product_id: temp_item.product_id,
                        quantity,
                    });
                    added.push(id);
                }
            }
        }

        user_cart.items = staged;
        user_cart.touch();
        let merged = user_cart.clone();
        let removed = temp_guard.take();

        {
            let mut registry = self.registry.write().await;
            registry.carts.remove(temp_code);
            if let Some(temp) = &removed {
                for item in &temp.items {
                    registry.items.remove(&item.id);
                }
            }
            for id in added {
                registry.items.insert(id, merged.code.clone());
            }
        }

        metrics::counter!("cart_merges_total").increment(1);
        tracing::info!(
            cart_code = %merged.code,
            skipped,
            items = merged.items.len(),
            "carts merged"
        );
        Ok(merged)
    }

    fn next_item_id(&self) -> CartItemId {
        CartItemId::new(self.next_item_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn slot(&self, code: &CartCode) -> Option<CartSlot> {
        self.registry.read().await.carts.get(code).cloned()
    }

    async fn lock_or_create(&self, code: &CartCode) -> CartGuard {
        loop {
            let slot = {
                let mut registry = self.registry.write().await;
                registry
                    .carts
                    .entry(code.clone())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(Some(Cart::new(
                            code.clone(),
                            CartOwner::Anonymous,
                        ))))
                    })
                    .clone()
            };
            // A merge may delete the cart between the lookup and the lock.
            if let Some(cart) = lock_live(slot).await {
                return cart;
            }
        }
    }

    /// Looks up or creates the user's cart without locking it.
    async fn user_slot(&self, user: UserId) -> (CartCode, CartSlot) {
        let mut registry = self.registry.write().await;
        let existing = registry
            .by_user
            .get(&user)
            .and_then(|code| registry.carts.get(code).map(|slot| (code.clone(), slot.clone())));
        if let Some(found) = existing {
            return found;
        }

        let code = loop {
            let code = CartCode::generate();
            if !registry.carts.contains_key(&code) {
                break code;
            }
        };
        let slot = Arc::new(Mutex::new(Some(Cart::new(
            code.clone(),
            CartOwner::Owned(user),
        ))));
        registry.carts.insert(code.clone(), slot.clone());
        registry.by_user.insert(user, code.clone());
        tracing::debug!(cart_code = %code, user_id = %user, "user cart created");
        (code, slot)
    }

    async fn lock_user_cart(&self, user: UserId) -> CartGuard {
        loop {
            let (_, slot) = self.user_slot(user).await;
            if let Some(cart) = lock_live(slot).await {
                return cart;
            }
        }
    }

    async fn lock_item_cart(&self, item_id: CartItemId) -> Result<CartGuard> {
        let slot = {
            let registry = self.registry.read().await;
            registry
                .items
                .get(&item_id)
                .and_then(|code| registry.carts.get(code))
                .cloned()
        };
        let slot = slot.ok_or(CartError::ItemNotFound(item_id))?;
        lock_live(slot)
            .await
            .ok_or(CartError::ItemNotFound(item_id))
    }
}
