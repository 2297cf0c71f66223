//! Sign-in, account and order history commands.

#![allow(clippy::print_stdout)]

use cornermarket_core::{Email, OrderId, UserRole};
use cornermarket_storefront::api::Order;
use cornermarket_storefront::{AppState, ClientError};

use super::password;

pub async fn login(
    state: &AppState,
    email: &Email,
    given: Option<String>,
) -> Result<(), ClientError> {
    let password = password(given)?;
    match state.session().sign_in(email, &password).await? {
        Some(user) => println!("Signed in as {} ({})", user.display_name(), user.role),
        None => println!("Sign-in was superseded by another session change"),
    }
    Ok(())
}

pub async fn register(
    state: &AppState,
    email: &Email,
    given: Option<String>,
    role: UserRole,
) -> Result<(), ClientError> {
    let password = password(given)?;
    if let Some(user) = state.session().register(email, &password, role).await? {
        println!("Account created, signed in as {}", user.display_name());
    }
    Ok(())
}

pub async fn logout(state: &AppState) {
    state.session().logout().await;
    println!("Signed out");
}

pub async fn whoami(state: &AppState) -> Result<(), ClientError> {
    let snapshot = state.session().snapshot();
    let Some(user) = snapshot.user else {
        println!("Not signed in");
        return Ok(());
    };

    println!("{} <{}>", user.display_name(), user.email);
    println!("  id:   {}", user.id);
    println!("  role: {}", user.role);

    match state.api().get_profile().await {
        Ok(profile) => {
            if !profile.phone.is_empty() {
                println!("  phone:   {}", profile.phone);
            }
            if !profile.address.is_empty() {
                println!("  address: {}", profile.address);
            }
        }
        Err(e) => tracing::debug!(error = %e, "Profile unavailable"),
    }
    Ok(())
}

pub async fn orders(state: &AppState) -> Result<(), ClientError> {
    require_session(state)?;
    let orders = state.api().list_orders().await?;
    if orders.is_empty() {
        println!("No orders yet");
    }
    for order in &orders {
        print_summary(order);
    }
    Ok(())
}

pub async fn order(state: &AppState, id: OrderId) -> Result<(), ClientError> {
    require_session(state)?;
    let order = state.api().get_order(id).await?;
    print_summary(&order);
    println!("  deliver: {} to {}", order.delivery_method, order.delivery_address);
    println!("  contact: {} {}", order.contact_name, order.contact_phone);
    for item in &order.items {
        println!(
            "  {} x{} @ {}",
            item.product.name, item.quantity, item.price
        );
    }
    Ok(())
}

pub(super) fn require_session(state: &AppState) -> Result<(), ClientError> {
    if state.session().is_authenticated() {
        Ok(())
    } else {
        Err(ClientError::NotAuthenticated)
    }
}

pub(super) fn print_summary(order: &Order) {
    let placed = order
        .created_at
        .map_or_else(String::new, |at| at.format("%Y-%m-%d %H:%M").to_string());
    println!(
        "#{} {} {} {}",
        order.id, order.status, order.total_price, placed
    );
}
