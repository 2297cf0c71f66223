//! Catalog browsing commands.

#![allow(clippy::print_stdout)]

use cornermarket_core::ProductId;
use cornermarket_storefront::api::ProductQuery;
use cornermarket_storefront::{AppState, ClientError};

pub async fn list(state: &AppState, query: &ProductQuery) -> Result<(), ClientError> {
    let page = state.api().list_products(query).await?;
    let favorites = state.favorites().state();

    for product in page.items() {
        let marker = if favorites.contains(product.id) { "*" } else { " " };
        println!("{marker} {:>6}  {:<40} {}", product.id, product.name, product.price);
    }
    println!("{} product(s)", page.count());
    if page.has_next() {
        println!("More results: --page {}", query.page.unwrap_or(1) + 1);
    }
    Ok(())
}

pub async fn show(state: &AppState, id: ProductId) -> Result<(), ClientError> {
    let product = state.api().get_product(id).await?;
    println!("{} ({})", product.name, product.price);
    if !product.description.is_empty() {
        println!("{}", product.description);
    }
    if let Some(image) = product.cover_image() {
        println!("image: {image}");
    }
    if let Some(line) = state.cart().state().line_for(id) {
        println!("in cart: {}", line.quantity);
    }
    if state.favorites().is_favorite(id) {
        println!("in favorites");
    }

    let reviews = state.api().list_reviews(id).await?;
    for review in &reviews {
        let author = review
            .user
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), |u| u.display_name());
        println!("  {}/5 {author}: {}", review.rating, review.comment);
    }
    Ok(())
}
