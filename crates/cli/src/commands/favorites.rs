//! Favorites commands.

#![allow(clippy::print_stdout)]

use cornermarket_core::ProductId;
use cornermarket_storefront::{AppState, ClientError};

use super::account::require_session;

pub fn list(state: &AppState) -> Result<(), ClientError> {
    require_session(state)?;
    let favorites = state.favorites().state();
    if favorites.is_empty() {
        println!("No favorites yet");
    }
    for favorite in favorites.records() {
        println!(
            "{:>6}  {:<40} {}",
            favorite.product.id, favorite.product.name, favorite.product.price
        );
    }
    Ok(())
}

pub async fn toggle(state: &AppState, product_id: ProductId) -> Result<(), ClientError> {
    if state.favorites().toggle(product_id).await? {
        println!("Added {product_id} to favorites");
    } else {
        println!("Removed {product_id} from favorites");
    }
    Ok(())
}
