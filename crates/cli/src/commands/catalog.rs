//! One-shot catalog commands.
//!
//! These never fail: the catalog views degrade to empty lists, and an
//! unknown product prints a notice instead.

use shopfront_client::{ProductPage, ProductQuery, Storefront};
use shopfront_core::{Cart, Category, Order, Product};

/// `shop products`
pub async fn products(storefront: &Storefront, query: &ProductQuery) {
    print_products(&storefront.catalog().browse(query).await);
}

/// `shop categories`
pub async fn categories(storefront: &Storefront) {
    print_categories(&storefront.catalog().categories().await);
}

/// `shop product <slug>`
pub async fn product(storefront: &Storefront, slug: &str) {
    match storefront.catalog().product_page(slug).await {
        ProductPage::Found(product) => print_product(&product),
        ProductPage::RedirectHome => print_notice(&format!("No product named '{slug}'.")),
    }
}

#[allow(clippy::print_stdout)]
pub fn print_notice(message: &str) {
    println!("{message}");
}

#[allow(clippy::print_stdout)]
pub fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("No products found.");
        return;
    }
    for product in products {
        let stock = if product.in_stock { "" } else { "  (out of stock)" };
        println!(
            "#{:<5} {:<32} {:>10}  /products/{}{stock}",
            product.id, product.name, product.price, product.slug
        );
    }
}

#[allow(clippy::print_stdout)]
pub fn print_categories(categories: &[Category]) {
    if categories.is_empty() {
        println!("No categories found.");
        return;
    }
    for category in categories {
        println!("{:<24} {}", category.slug, category.name);
    }
}

#[allow(clippy::print_stdout)]
pub fn print_product(product: &Product) {
    println!("{} (#{})", product.name, product.id);
    println!("  price: {}", product.price);
    if let Some(category) = &product.category {
        println!("  category: {}", category.name);
    }
    if product.in_stock {
        println!("  in stock: {}", product.stock);
    } else {
        println!("  out of stock");
    }
    if !product.description.is_empty() {
        println!();
        println!("{}", product.description);
    }
}

#[allow(clippy::print_stdout)]
pub fn print_cart(cart: Option<&Cart>) {
    let Some(cart) = cart.filter(|cart| !cart.is_empty()) else {
        println!("Your cart is empty.");
        return;
    };
    for item in &cart.cart_items {
        println!(
            "[{:<4}] {:<32} x{:<3} {:>10}",
            item.id, item.product.name, item.quantity, item.subtotal
        );
    }
    println!("{} item(s), total {}", cart.item_count(), cart.total);
}

#[allow(clippy::print_stdout)]
pub fn print_orders(orders: &[Order]) {
    if orders.is_empty() {
        println!("No orders yet.");
        return;
    }
    for order in orders {
        println!(
            "Order #{:<5} {:<10} {:>10}  {}",
            order.id,
            order.status,
            order.total_price,
            order.created_at.format("%Y-%m-%d")
        );
    }
}
