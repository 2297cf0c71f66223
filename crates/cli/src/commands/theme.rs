//! Theme preference commands.

#![allow(clippy::print_stdout)]

use cornermarket_storefront::AppState;
use cornermarket_storefront::theme::Theme;

pub fn show(state: &AppState) {
    println!("{}", state.theme().load());
}

pub fn toggle(state: &AppState) {
    println!("{}", state.theme().toggle());
}

pub fn set(state: &AppState, theme: Theme) {
    println!("{}", state.theme().set(theme));
}
