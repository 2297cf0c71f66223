//! Cart commands.

#![allow(clippy::print_stdout)]

use cornermarket_core::{LineItemId, ProductId};
use cornermarket_storefront::cart::CartState;
use cornermarket_storefront::{AppState, ClientError};

pub fn show(state: &AppState) {
    print_cart(&state.cart().state());
}

pub async fn add(state: &AppState, product_id: ProductId, quantity: u32) -> Result<(), ClientError> {
    let cart = state.cart().add_item(product_id, quantity).await?;
    print_cart(&cart);
    Ok(())
}

pub async fn update(state: &AppState, line_id: LineItemId, quantity: i64) -> Result<(), ClientError> {
    let cart = state.cart().update_item(line_id, quantity).await?;
    print_cart(&cart);
    Ok(())
}

pub async fn remove(state: &AppState, line_id: LineItemId) -> Result<(), ClientError> {
    let cart = state.cart().remove_item(line_id).await?;
    print_cart(&cart);
    Ok(())
}

pub(super) fn print_cart(cart: &CartState) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in &cart.items {
        println!(
            "{:>6}  {:<40} x{:<3} {}",
            line.id,
            line.product.name,
            line.quantity,
            line.line_total()
        );
    }
    println!("{} item(s), total {}", cart.count(), cart.total());
}
