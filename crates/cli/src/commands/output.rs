//! Plain-text rendering of collection snapshots.

use std::fmt::Write as _;

use basket_core::{CartItem, WishlistItem};
use basket_sync::Snapshot;

/// Render a cart as one line per product plus a summary line.
pub fn cart(snapshot: &Snapshot<CartItem>) -> String {
    let mut out = header("cart", snapshot.identity.as_ref().map(ToString::to_string));
    for line in &snapshot.items {
        let _ = writeln!(
            out,
            "  {:<12} {:<24} x{:<4} @ {:>10} = {:>10}",
            line.product.id.as_str(),
            display_name(&line.product.name),
            line.quantity,
            line.product.unit_price().to_string(),
            line.line_total().to_string(),
        );
    }
    let _ = writeln!(
        out,
        "  {} units, total {}",
        snapshot.count(),
        snapshot.total()
    );
    out
}

/// Render a wishlist as one line per product plus a count.
pub fn wishlist(snapshot: &Snapshot<WishlistItem>) -> String {
    let mut out = header(
        "wishlist",
        snapshot.identity.as_ref().map(ToString::to_string),
    );
    for item in &snapshot.items {
        let _ = writeln!(
            out,
            "  {:<12} {:<24} saved {}",
            item.product.id.as_str(),
            display_name(&item.product.name),
            item.added_at.format("%Y-%m-%d %H:%M"),
        );
    }
    let _ = writeln!(out, "  {} saved", snapshot.count());
    out
}

fn header(name: &str, identity: Option<String>) -> String {
    format!(
        "{name} ({})\n",
        identity.as_deref().unwrap_or("unbound")
    )
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "-" } else { name }
}

/// Write rendered output to stdout.
#[allow(clippy::print_stdout)]
pub fn print(rendered: &str) {
    print!("{rendered}");
}
