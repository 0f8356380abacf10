//! Interactive shopping session.
//!
//! The shell keeps one [`Storefront`] alive for the whole session so the
//! session cookie, the cart mirror and a pending resume target carry over
//! from one command to the next.

use std::io::Write;

use shopfront_client::{
    AddToCart, AppError, CheckoutForm, GuardDecision, LoginForm, ProductPage, ProductQuery,
    RegisterForm, ResumeTarget, Route, SessionState, Storefront,
};
use shopfront_core::{CartItemId, ProductId};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::catalog::{
    print_cart, print_categories, print_notice, print_orders, print_product, print_products,
};

const HELP: &str = "\
Commands:
  open <path>                      go to a page, e.g. /cart or /products/green-tea
  products [category]              list products
  search <text>                    search products
  categories                       list categories
  product <slug>                   show a product
  login <email> <password>         sign in
  register <user> <email> <pw> <pw again>
  logout                           sign out
  whoami                           show the signed-in shopper
  cart                             show the cart
  add <product id> [quantity]      add to the cart
  remove <item id>                 remove a cart line
  checkout <shipping address>      place an order
  orders                           order history
  help                             this text
  quit                             leave";

/// A parsed shell line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Open(String),
    Products(Option<String>),
    Search(String),
    Categories,
    Product(String),
    Login {
        email: String,
        password: String,
    },
    Register(RegisterArgs),
    Logout,
    WhoAmI,
    Cart,
    Add {
        product_id: ProductId,
        quantity: u32,
    },
    Remove(CartItemId),
    Checkout(String),
    Orders,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
struct RegisterArgs {
    username: String,
    email: String,
    password: String,
    password_confirmation: String,
}

impl Command {
    /// Parse one input line. `Ok(None)` for a blank line.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("open" | "go", [path]) => Self::Open((*path).to_string()),
            ("products", []) => Self::Products(None),
            ("products", [category]) => Self::Products(Some((*category).to_string())),
            ("search", [_, ..]) => Self::Search(args.join(" ")),
            ("categories", []) => Self::Categories,
            ("product", [slug]) => Self::Product((*slug).to_string()),
            ("login", [email, password]) => Self::Login {
                email: (*email).to_string(),
                password: (*password).to_string(),
            },
            ("register", [username, email, password, confirmation]) => {
                Self::Register(RegisterArgs {
                    username: (*username).to_string(),
                    email: (*email).to_string(),
                    password: (*password).to_string(),
                    password_confirmation: (*confirmation).to_string(),
                })
            }
            ("logout", []) => Self::Logout,
            ("whoami" | "profile", []) => Self::WhoAmI,
            ("cart", []) => Self::Cart,
            ("add", [id]) => Self::Add {
                product_id: parse_id(id)?,
                quantity: 1,
            },
            ("add", [id, quantity]) => Self::Add {
                product_id: parse_id(id)?,
                quantity: quantity
                    .parse()
                    .map_err(|_| format!("'{quantity}' is not a quantity"))?,
            },
            ("remove", [id]) => Self::Remove(parse_id(id)?),
            ("checkout", [_, ..]) => Self::Checkout(args.join(" ")),
            ("orders", []) => Self::Orders,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(format!("Unknown command '{}'. Type 'help'.", line.trim())),
        };
        Ok(Some(command))
    }
}

fn parse_id<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("'{value}' is not a valid id"))
}

struct Shell {
    storefront: Storefront,
    /// Where to go once the shopper signs in.
    resume: Option<ResumeTarget>,
}

/// Run the interactive shell until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if standard input cannot be read.
pub async fn run(storefront: Storefront) -> std::io::Result<()> {
    let mut shell = Shell {
        storefront,
        resume: None,
    };

    match shell.storefront.start().await {
        SessionState::Authenticated(identity) => {
            print_notice(&format!("Welcome back, {}.", identity.username));
        }
        _ => print_notice("Browsing as a guest. Type 'help' for commands."),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&shell.storefront)?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => shell.dispatch(command).await,
            Ok(None) => {}
            Err(message) => print_notice(&message),
        }
    }

    shell.storefront.shutdown();
    Ok(())
}

#[allow(clippy::print_stdout)]
fn prompt(storefront: &Storefront) -> std::io::Result<()> {
    let who = storefront
        .session()
        .identity()
        .map_or_else(|| "guest".to_string(), |identity| identity.username);
    print!("{who} [{}]> ", storefront.cart().item_count());
    std::io::stdout().flush()
}

impl Shell {
    async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Open(path) => match Route::parse(&path) {
                Some(route) => self.open(route).await,
                None => print_notice(&format!("There is no page at {path}.")),
            },
            Command::Products(category) => {
                let query = category.map_or_else(ProductQuery::all, |slug| {
                    ProductQuery::all().in_category(slug)
                });
                print_products(&self.storefront.catalog().browse(&query).await);
            }
            Command::Search(text) => {
                let query = ProductQuery::all().matching(text);
                print_products(&self.storefront.catalog().browse(&query).await);
            }
            Command::Categories => {
                print_categories(&self.storefront.catalog().categories().await);
            }
            Command::Product(slug) => self.open(Route::ProductDetail { slug }).await,
            Command::Login { email, password } => self.login(email, password).await,
            Command::Register(args) => self.register(args).await,
            Command::Logout => {
                self.storefront.sign_out().await;
                self.resume = None;
                print_notice("Signed out.");
            }
            Command::WhoAmI => self.open(Route::Profile).await,
            Command::Cart => self.open(Route::Cart).await,
            Command::Add {
                product_id,
                quantity,
            } => self.add(product_id, quantity).await,
            Command::Remove(item_id) => {
                if self.enter(&Route::Cart).await {
                    match self.storefront.remove_from_cart(item_id).await {
                        Ok(()) => print_cart(self.storefront.cart().cart().as_ref()),
                        Err(e) => fail(&e),
                    }
                }
            }
            Command::Checkout(address) => self.checkout(address).await,
            Command::Orders => {
                if self.enter(&Route::Profile).await {
                    print_orders(&self.storefront.orders().history().await);
                }
            }
            Command::Help => print_notice(HELP),
            Command::Quit => {}
        }
    }

    /// Run the guard for `route`. On denial, remember the route and show
    /// the sign-in page instead.
    async fn enter(&mut self, route: &Route) -> bool {
        let decision = match self.storefront.guard(route) {
            GuardDecision::Defer => self.storefront.guard_settled(route).await,
            decision => decision,
        };

        match decision {
            GuardDecision::Allow => true,
            GuardDecision::Defer => false,
            GuardDecision::Deny {
                redirect_to,
                resume,
            } => {
                print_notice(&format!("Sign in to view {route}."));
                self.resume = Some(resume);
                self.show(&redirect_to).await;
                false
            }
        }
    }

    async fn open(&mut self, route: Route) {
        if self.enter(&route).await {
            self.show(&route).await;
        }
    }

    /// Render a page the guard has already allowed.
    async fn show(&self, route: &Route) {
        match route {
            Route::Home => {
                print_products(&self.storefront.catalog().browse(&ProductQuery::all()).await);
            }
            Route::ProductDetail { slug } => {
                match self.storefront.catalog().product_page(slug).await {
                    ProductPage::Found(product) => print_product(&product),
                    ProductPage::RedirectHome => {
                        print_notice(&format!("No product named '{slug}'. Back to the shop."));
                        print_products(
                            &self.storefront.catalog().browse(&ProductQuery::all()).await,
                        );
                    }
                }
            }
            Route::Cart => print_cart(self.storefront.cart().cart().as_ref()),
            Route::Checkout => {
                print_cart(self.storefront.cart().cart().as_ref());
                print_notice("Enter 'checkout <shipping address>' to place the order.");
            }
            Route::Profile => {
                if let Some(identity) = self.storefront.session().identity() {
                    print_notice(&format!("{} <{}>", identity.username, identity.email));
                }
            }
            Route::Login => print_notice("Enter 'login <email> <password>'."),
            Route::Register => print_notice(
                "Enter 'register <username> <email> <password> <password again>'.",
            ),
        }
    }

    async fn login(&mut self, email: String, password: String) {
        let form = LoginForm { email, password };
        match self.storefront.sign_in(form, self.resume.as_ref()).await {
            Ok(next) => {
                self.resume = None;
                if let Some(identity) = self.storefront.session().identity() {
                    print_notice(&format!("Signed in as {}.", identity.username));
                }
                self.open(next).await;
            }
            Err(e) => fail(&e),
        }
    }

    async fn register(&mut self, args: RegisterArgs) {
        let form = RegisterForm {
            username: args.username,
            email: args.email,
            password: args.password,
            password_confirmation: args.password_confirmation,
        };
        match self.storefront.sign_up(form).await {
            Ok(next) => {
                self.resume = None;
                print_notice("Account created.");
                self.open(next).await;
            }
            Err(e) => fail(&e),
        }
    }

    async fn add(&mut self, product_id: ProductId, quantity: u32) {
        match self.storefront.add_to_cart(product_id, quantity).await {
            Ok(AddToCart::Added) => print_notice(&format!(
                "Added. Your cart has {} item(s).",
                self.storefront.cart().item_count()
            )),
            Ok(AddToCart::SignInRequired { redirect_to }) => {
                print_notice("Sign in to add items to your cart.");
                self.show(&redirect_to).await;
            }
            Err(e) => fail(&e),
        }
    }

    async fn checkout(&mut self, address: String) {
        if !self.enter(&Route::Checkout).await {
            return;
        }
        let form = CheckoutForm {
            shipping_address: address,
        };
        match self.storefront.checkout(&form).await {
            Ok(order) => print_notice(&format!(
                "Order #{} placed. Total {}, status {}.",
                order.id, order.total_price, order.status
            )),
            Err(AppError::EmptyCart) => {
                print_notice("Your cart is empty.");
                self.show(&Route::Cart).await;
            }
            Err(e) => fail(&e),
        }
    }
}

fn fail(error: &AppError) {
    error.report();
    print_notice(&error.user_message());
}
