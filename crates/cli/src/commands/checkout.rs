//! Checkout commands.
//!
//! Every invocation opens a fresh flow, so the saved draft carries the form
//! between commands: `fill` edits it, `submit` places the order from it.

#![allow(clippy::print_stdout)]

use cornermarket_core::DeliveryMethod;
use cornermarket_storefront::checkout::{CheckoutEntry, CheckoutFlow, RestoreAction};
use cornermarket_storefront::draft::{CheckoutDraft, CheckoutForm};
use cornermarket_storefront::{AppState, ClientError};

use super::cart::print_cart;

/// Field changes given on the command line.
pub struct FormEdit {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub delivery: Option<DeliveryMethod>,
    pub comment: Option<String>,
    pub step: Option<i64>,
}

impl FormEdit {
    fn apply(self, form: &mut CheckoutForm) {
        let fields = [
            (self.full_name, &mut form.full_name),
            (self.phone, &mut form.phone),
            (self.email, &mut form.email),
            (self.address, &mut form.address),
            (self.comment, &mut form.comment),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(delivery) = self.delivery {
            form.delivery_method = delivery;
        }
    }
}

/// Open checkout and take over the saved draft's form, if any.
///
/// Returns `None` when the cart is empty but the draft still holds lines;
/// editing then would overwrite them with the empty cart.
fn open_with_draft(state: &AppState) -> Option<CheckoutFlow> {
    let mut flow = state.checkout();
    let draft = flow.saved_draft();
    let entry = flow.open();
    if entry == CheckoutEntry::Catalog && draft.as_ref().is_some_and(|d| !d.items.is_empty()) {
        println!("Cart is empty but the saved draft has items, run `checkout restore` first");
        return None;
    }
    if let Some(draft) = draft {
        flow.dismiss_prompt();
        flow.set_form(draft.form);
        flow.go_to_step(i64::from(draft.step.get()));
    }
    Some(flow)
}

pub fn show(state: &AppState) {
    let mut flow = state.checkout();
    let entry = flow.open();
    match flow.saved_draft() {
        Some(draft) => print_draft(&draft),
        None => println!("No saved draft"),
    }
    println!();
    match entry {
        CheckoutEntry::Catalog => println!("Cart is empty, browse the catalog first"),
        CheckoutEntry::Form { .. } => print_cart(&state.cart().state()),
    }
}

fn print_draft(draft: &CheckoutDraft) {
    println!(
        "Saved draft from {} at step {} with {} line(s)",
        draft.updated_at.format("%Y-%m-%d %H:%M"),
        draft.step.get(),
        draft.items.len()
    );
    print_form(&draft.form);
    println!("Use `checkout restore` to load it into the cart or `checkout discard`");
}

pub fn fill(state: &AppState, edit: FormEdit) {
    let Some(mut flow) = open_with_draft(state) else {
        return;
    };

    let step = edit.step;
    let mut form = flow.form();
    edit.apply(&mut form);
    flow.set_form(form);
    if let Some(step) = step {
        flow.go_to_step(step);
    }
    flow.close();

    let form = flow.form();
    print_form(&form);
    println!("step {}", flow.step().get());
    let missing = form.missing_fields();
    if !missing.is_empty() {
        println!("Still missing: {}", missing.join(", "));
    }
}

pub async fn restore(state: &AppState) {
    let mut flow = state.checkout();
    if flow.saved_draft().is_none() {
        println!("No saved draft");
        return;
    }

    let report = flow.restore().await;
    for outcome in &report.outcomes {
        let what = match outcome.action {
            RestoreAction::RemoveCurrent { product_id, .. } => format!("remove {product_id}"),
            RestoreAction::AddDrafted {
                product_id,
                quantity,
            } => format!("add {product_id} x{quantity}"),
        };
        match &outcome.result {
            Ok(()) => println!("  ok      {what}"),
            Err(e) => println!("  failed  {what}: {}", e.user_message()),
        }
    }
    flow.close();

    if !report.is_complete() {
        println!("Some lines could not be restored");
    }
    print_cart(&state.cart().state());
}

pub fn discard(state: &AppState) {
    let flow = state.checkout();
    if flow.discard() {
        println!("Draft discarded");
    } else {
        println!("Could not delete the draft");
    }
}

pub async fn submit(state: &AppState) -> Result<(), ClientError> {
    let Some(mut flow) = open_with_draft(state) else {
        return Err(ClientError::EmptyCart);
    };
    let result = flow.submit().await;
    flow.close();

    let order = result?;
    println!("Order #{} placed, total {}", order.id, order.total_price);
    Ok(())
}

fn print_form(form: &CheckoutForm) {
    let rows = [
        ("name", form.full_name.as_str()),
        ("phone", form.phone.as_str()),
        ("email", form.email.as_str()),
        ("address", form.address.as_str()),
        ("delivery", form.delivery_method.as_str()),
        ("comment", form.comment.as_str()),
    ];
    for (label, value) in rows {
        println!("  {label:<9} {value}");
    }
}
