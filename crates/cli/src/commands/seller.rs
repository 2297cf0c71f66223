//! Seller dashboard commands.

#![allow(clippy::print_stdout)]

use cornermarket_storefront::{AppState, ClientError};

use super::account::{print_summary, require_session};

pub async fn products(state: &AppState) -> Result<(), ClientError> {
    require_session(state)?;
    for product in state.api().list_seller_products().await? {
        let status = if product.is_published { "published" } else { "draft" };
        println!(
            "{:>6}  {:<40} {:>10} {status}",
            product.id, product.name, product.price
        );
    }
    Ok(())
}

pub async fn orders(state: &AppState) -> Result<(), ClientError> {
    require_session(state)?;
    for order in state.api().list_seller_orders().await? {
        print_summary(&order);
    }
    Ok(())
}

pub async fn analytics(state: &AppState) -> Result<(), ClientError> {
    require_session(state)?;
    let stats = state.api().seller_analytics().await?;

    println!(
        "Products:  {} ({} published, {} drafts)",
        stats.products_count, stats.published_count, stats.draft_count
    );
    println!(
        "Orders:    {} ({} pending, {}% completed)",
        stats.orders_count,
        stats.pending_orders,
        stats.completion_rate()
    );
    println!("Revenue:   {}", stats.total_revenue);
    println!("Per order: {}", stats.avg_order_value());
    println!("Per day:   {}", stats.avg_daily_revenue());
    println!("Buyers:    {}", stats.unique_buyers);
    if let Some(rating) = stats.avg_rating {
        println!("Rating:    {rating} ({} reviews)", stats.reviews_count);
    }

    if !stats.top_products.is_empty() {
        println!("Top products ({} units):", stats.units_sold());
        for top in &stats.top_products {
            println!("  {:<40} x{:<4} {}", top.name, top.quantity, top.revenue);
        }
    }
    Ok(())
}
