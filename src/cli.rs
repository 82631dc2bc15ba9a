use crate::api::{ApiError, Client, EmployeeDirectory};
use crate::catalog::{self, Listing, SortDirection, SortField};
use crate::config::{self, Config};
use crate::forms::{self, OrchidForm};
use crate::gate::{AuthState, SessionGate};
use crate::images::ImageHost;
use crate::models::{AccountRequest, AccountUpdate, EmployeeRequest, OrderRequest};
use crate::routes::{
    authorize, normalize, Access, Capability, Navigation, Page, Router, FORBIDDEN_PATH, LOGIN_PATH,
    ROOT_PATH, USER_HOME_PATH,
};
use crate::views;
use anyhow::{anyhow, bail, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use tracing::{debug, info, warn};

const MAX_REDIRECTS: usize = 4;
const MAX_HISTORY: usize = 50;

/// Commands and the capability each one needs
const ACTIONS: &[(&str, Capability)] = &[
    ("help", Capability::Public),
    ("exit", Capability::Public),
    ("quit", Capability::Public),
    ("go", Capability::Public),
    ("back", Capability::Public),
    ("refresh", Capability::Public),
    ("login", Capability::Public),
    ("logout", Capability::Public),
    ("register", Capability::Public),
    ("whoami", Capability::Public),
    ("search", Capability::Public),
    ("sort", Capability::Public),
    ("buy", Capability::AuthenticatedAny),
    ("category", Capability::AuthenticatedAdmin),
    ("orchid", Capability::AuthenticatedAdmin),
    ("order", Capability::AuthenticatedAdmin),
    ("account", Capability::AuthenticatedAdmin),
    ("employee", Capability::AuthenticatedAdmin),
];

pub fn capability_of(command: &str) -> Option<Capability> {
    ACTIONS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, capability)| *capability)
}

pub struct Context {
    pub config: Config,
    pub gate: RefCell<SessionGate>,
    pub api: Client,
    pub employees: Option<EmployeeDirectory>,
    pub images: ImageHost,
    pub router: Router,
    pub listing: RefCell<Listing>,
    pub location: RefCell<String>,
    pub history: RefCell<Vec<String>>,
    /// Account created by `register` in this run, matched up at login
    pub registered: RefCell<Option<(String, i64)>>,
}

impl Context {
    pub fn new(
        config: Config,
        gate: SessionGate,
        api: Client,
        employees: Option<EmployeeDirectory>,
    ) -> Result<Self> {
        let images = ImageHost::new(
            config.public_origin(),
            config.bucket(),
            config.internal_host(),
        )?;
        Ok(Self {
            config,
            gate: RefCell::new(gate),
            api,
            employees,
            images,
            router: Router::new(),
            listing: RefCell::new(Listing::default()),
            location: RefCell::new(ROOT_PATH.to_string()),
            history: RefCell::new(Vec::new()),
            registered: RefCell::new(None),
        })
    }

    fn auth(&self) -> Option<String> {
        self.gate.borrow().bearer()
    }

    pub fn location(&self) -> String {
        self.location.borrow().clone()
    }
}

/// Result of one command
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub exit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit: false,
        }
    }

    fn exit() -> Self {
        Self {
            text: String::new(),
            exit: true,
        }
    }
}

/// Re-derive the stored session before the first command
pub fn startup(ctx: &Context) {
    let valid = ctx.gate.borrow_mut().revalidate();
    info!(valid, "stored session revalidated");
}

pub fn run_once(ctx: &Context, commands: &[String]) -> Result<()> {
    startup(ctx);
    for command in commands {
        let reply = execute(ctx, command)?;
        if !reply.text.is_empty() {
            println!("{}", reply.text);
        }
        if reply.exit {
            break;
        }
    }
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history_file = config::user_dir().join("history");
    if rl.load_history(&history_file).is_err() {
        debug!("no readline history at {}", history_file.display());
    }

    startup(&ctx);
    println!("orchid - type help for commands, exit to quit");
    println!("{}\n", go(&ctx, ROOT_PATH, false));

    loop {
        let prompt = format!("orchid {}> ", ctx.location());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // login and register lines carry passwords
                if !line.starts_with("login") && !line.starts_with("register") {
                    rl.add_history_entry(line)?;
                }

                match execute(&ctx, line) {
                    Ok(reply) => {
                        if !reply.text.is_empty() {
                            println!("{}\n", reply.text);
                        }
                        if reply.exit {
                            break;
                        }
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(dir) = history_file.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    if let Err(e) = rl.save_history(&history_file) {
        debug!("cannot save readline history: {}", e);
    }
    Ok(())
}

/// Run one command line. Usage errors come back as `Err`; API failures are
/// rendered into the reply.
pub fn execute(ctx: &Context, line: &str) -> Result<Reply> {
    let words =
        shell_words::split(line.trim()).map_err(|e| anyhow!("cannot parse command: {}", e))?;
    let Some(first) = words.first() else {
        return Ok(Reply::default());
    };
    if first.starts_with('/') {
        return Ok(Reply::text(go(ctx, first, true)));
    }

    let command = first.as_str();
    let args = &words[1..];
    let Some(capability) = capability_of(command) else {
        bail!("unknown command '{}', type help for commands", command);
    };
    if let Some(refused) = check_action(ctx, command, capability) {
        return Ok(Reply::text(refused));
    }

    match command {
        "help" => Ok(Reply::text(help())),
        "exit" | "quit" => Ok(Reply::exit()),
        "go" => {
            let path = args.first().ok_or_else(|| anyhow!("usage: go <path>"))?;
            Ok(Reply::text(go(ctx, path, true)))
        }
        "back" => {
            let previous = ctx.history.borrow_mut().pop();
            match previous {
                Some(path) => Ok(Reply::text(go(ctx, &path, false))),
                None => Ok(Reply::text("Nowhere to go back to.")),
            }
        }
        "refresh" => Ok(Reply::text(go(ctx, &ctx.location(), false))),
        "login" => login(ctx, args),
        "logout" => {
            ctx.gate.borrow_mut().logout();
            ctx.history.borrow_mut().clear();
            Ok(Reply::text(format!("Logged out.\n\n{}", go(ctx, LOGIN_PATH, false))))
        }
        "register" => register(ctx, args),
        "whoami" => {
            let state = ctx.gate.borrow_mut().auth_state();
            let snapshot = ctx.gate.borrow().snapshot();
            Ok(Reply::text(views::whoami(state, &snapshot)))
        }
        "search" => {
            ctx.listing.borrow_mut().search = args.join(" ");
            Ok(Reply::text(refresh_listing(ctx)))
        }
        "sort" => {
            let field: SortField = args
                .first()
                .ok_or_else(|| anyhow!("usage: sort <id|name|price> [asc|desc]"))?
                .parse()
                .map_err(anyhow::Error::msg)?;
            let direction = match args.get(1) {
                Some(d) => d.parse::<SortDirection>().map_err(anyhow::Error::msg)?,
                None => ctx.listing.borrow().direction,
            };
            {
                let mut listing = ctx.listing.borrow_mut();
                listing.field = field;
                listing.direction = direction;
            }
            Ok(Reply::text(refresh_listing(ctx)))
        }
        "buy" => buy(ctx, args),
        "category" => category(ctx, args),
        "orchid" => orchid(ctx, args),
        "order" => order(ctx, args),
        "account" => account(ctx, args),
        "employee" => employee(ctx, args),
        _ => bail!("unknown command '{}'", command),
    }
}

fn help() -> String {
    [
        "Navigation:",
        "  go <path> | <path>             - open a page (/, /home, /orchids, /categories,",
        "                                   /detail/<id>, /edit/<id>, /user-orders,",
        "                                   /admin-orders, /accounts, /employees)",
        "  back                           - previous page",
        "  refresh                        - reload the current page",
        "Session:",
        "  login <user> <password>        - sign in",
        "  logout                         - sign out and clear the stored session",
        "  register <name> <email> <password> [confirm]",
        "  whoami                         - show the signed-in account",
        "Shopping:",
        "  search [term]                  - filter orchids by name or description",
        "  sort <id|name|price> [asc|desc]",
        "  buy <orchid-id> [quantity]     - place an order",
        "Admin:",
        "  category add <name> | rename <id> <name> | rm <id>",
        "  orchid add key=value... | edit <id> key=value... | rm <id>",
        "                                   keys: name description price natural category image",
        "  order status <order> <status> | rm <order>",
        "  account add-admin <name> <email> <password> | edit <id> key=value... | rm <id>",
        "                                   keys: name email role",
        "  employee add name=... url=... designation=... [gender=...]",
        "Other:",
        "  help, exit",
    ]
    .join("\n")
}

/// Gate an action. Anonymous visitors are sent to the login page; users
/// attempting an admin action get the 403 page.
fn check_action(ctx: &Context, command: &str, capability: Capability) -> Option<String> {
    if capability == Capability::Public {
        return None;
    }
    let state = ctx.gate.borrow_mut().auth_state();
    match authorize(capability, state) {
        Access::Granted => None,
        Access::LoginRequired => Some(format!(
            "Please log in first.\n\n{}",
            go(ctx, LOGIN_PATH, true)
        )),
        Access::AdminRequired => {
            info!(command, "admin action refused");
            Some(go(ctx, FORBIDDEN_PATH, true))
        }
    }
}

/// Navigate to `path`, following redirects, and render the landing page.
fn go(ctx: &Context, path: &str, record: bool) -> String {
    let mut target = normalize(path);
    let mut notice = String::new();

    for _ in 0..MAX_REDIRECTS {
        let state = ctx.gate.borrow_mut().auth_state();
        match ctx.router.navigate(&target, state) {
            Navigation::Redirect(to) => {
                debug!(from = %target, to, "redirect");
                if to == LOGIN_PATH {
                    notice = "Please log in to continue.\n\n".to_string();
                }
                target = to.to_string();
            }
            Navigation::Render { page, id } => {
                let previous = ctx.location.replace(target.clone());
                if record && previous != target {
                    let mut history = ctx.history.borrow_mut();
                    history.push(previous);
                    if history.len() > MAX_HISTORY {
                        history.remove(0);
                    }
                }
                return format!("{}{}", notice, render(ctx, page, id.as_deref(), &target));
            }
        }
    }

    warn!(path, "redirect loop");
    format!("Too many redirects while opening {}", path)
}

fn render(ctx: &Context, page: Page, id: Option<&str>, path: &str) -> String {
    let auth = ctx.auth();
    let auth = auth.as_deref();
    let result = match page {
        Page::Login => Ok(views::login_page()),
        Page::Register => Ok(views::register_page()),
        Page::Forbidden => Ok(views::forbidden()),
        Page::NotFound => Ok(views::not_found(path)),
        Page::AdminOrchids => ctx.api.orchids(auth).and_then(|orchids| {
            let categories = ctx.api.categories(auth)?;
            Ok(views::orchid_table(&orchids, &categories, &ctx.listing.borrow()))
        }),
        Page::UserHome => ctx
            .api
            .orchids(auth)
            .map(|orchids| views::orchid_cards(&orchids, &ctx.listing.borrow(), &ctx.images)),
        Page::AdminCategories => ctx.api.categories(auth).map(|mut categories| {
            catalog::sort_categories(&mut categories);
            views::category_table(&categories)
        }),
        Page::CategoryDisplay => ctx.api.categories(auth).and_then(|categories| {
            let orchids = ctx.api.orchids(auth)?;
            let groups = catalog::group_by_category(&categories, &orchids);
            Ok(views::category_groups(&groups))
        }),
        Page::OrchidDetail => ctx.api.orchid(auth, id.unwrap_or_default()).map(|orchid| {
            let category = orchid
                .category_id
                .and_then(|category_id| ctx.api.category(auth, category_id).ok());
            views::orchid_detail(&orchid, category.as_ref(), &ctx.images)
        }),
        Page::EditOrchid => ctx.api.orchid(auth, id.unwrap_or_default()).and_then(|orchid| {
            let categories = ctx.api.categories(auth)?;
            Ok(views::edit_orchid_page(&orchid, &categories))
        }),
        Page::UserOrders => ctx.api.my_orders(auth).map(|orders| views::order_table(&orders, false)),
        Page::AdminOrders => ctx.api.orders(auth).map(|orders| views::order_table(&orders, true)),
        Page::Accounts => ctx.api.accounts(auth).map(|mut accounts| {
            catalog::sort_accounts(&mut accounts);
            let roles = ctx.api.roles(auth).unwrap_or_else(|e| {
                warn!(error = %e, "cannot load roles");
                Vec::new()
            });
            views::account_table(&accounts, &roles)
        }),
        Page::Employees => match &ctx.employees {
            Some(directory) => directory.list().map(|mut employees| {
                catalog::sort_employees(&mut employees);
                views::employee_table(&employees)
            }),
            None => Ok("Employees\nThe staff directory is not configured ([employees] url).".to_string()),
        },
    };

    result.unwrap_or_else(|e| error_view(ctx, &e))
}

const RELOGIN: &str = "Authentication required. Please log in again: login <user> <password>";

/// Per-page message for a failed request
fn error_view(ctx: &Context, err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized => RELOGIN.to_string(),
        ApiError::Forbidden(_) => "You do not have permission to view this page.".to_string(),
        ApiError::Network(_) => format!(
            "{}\nCheck the server at {} and try again with: refresh",
            err,
            ctx.api.base_url()
        ),
        _ => format!("Error: {}", err),
    }
}

fn action_failed(action: &str, err: ApiError) -> Reply {
    warn!(action, error = %err, "api request failed");
    match err {
        ApiError::Unauthorized => Reply::text(format!("Failed to {}. {}", action, RELOGIN)),
        _ => Reply::text(format!("Failed to {}: {}", action, err)),
    }
}

/// Re-render the current page when it is an orchid listing
fn refresh_listing(ctx: &Context) -> String {
    let here = ctx.location();
    let description = ctx.listing.borrow().describe();
    if [ROOT_PATH, USER_HOME_PATH, "/orchids"].contains(&here.as_str()) {
        go(ctx, &here, false)
    } else {
        format!("Listing {}. It applies on /, /home and /orchids.", description)
    }
}

fn parse_id(value: Option<&String>, usage: &str) -> Result<i64> {
    let value = value.ok_or_else(|| anyhow!("usage: {}", usage))?;
    value
        .parse()
        .map_err(|_| anyhow!("'{}' is not a valid id (usage: {})", value, usage))
}

fn login(ctx: &Context, args: &[String]) -> Result<Reply> {
    let (Some(username), Some(password)) = (args.first(), args.get(1)) else {
        bail!("usage: login <username> <password>");
    };
    if let Err(errors) = forms::validate_login(username, password) {
        return Ok(Reply::text(format!("Cannot log in:\n{}", forms::describe(&errors))));
    }

    let credential = match ctx.api.login(username.trim(), password) {
        Ok(credential) => credential,
        Err(ApiError::Unauthorized) | Err(ApiError::Validation { .. }) => {
            return Ok(Reply::text("Invalid username or password."));
        }
        Err(e) => return Ok(action_failed("log in", e)),
    };

    let state = ctx.gate.borrow_mut().login(&credential, username.trim())?;
    ctx.history.borrow_mut().clear();
    match state {
        AuthState::Anonymous => Ok(Reply::text(
            "Login failed: the server issued a credential that is already expired.",
        )),
        AuthState::AuthenticatedAdmin => {
            remember_account_id(ctx, username.trim(), state);
            Ok(Reply::text(format!("Welcome, {}!\n\n{}", username.trim(), go(ctx, ROOT_PATH, false))))
        }
        AuthState::AuthenticatedUser => {
            remember_account_id(ctx, username.trim(), state);
            Ok(Reply::text(format!(
                "Welcome, {}!\n\n{}",
                username.trim(),
                go(ctx, USER_HOME_PATH, false)
            )))
        }
    }
}

/// Record the account id used for purchases when it is known: from a
/// registration in this run, or from the account list for admins.
fn remember_account_id(ctx: &Context, username: &str, state: AuthState) {
    let registered = ctx
        .registered
        .borrow()
        .as_ref()
        .filter(|(name, _)| name == username)
        .map(|(_, id)| *id);

    let id = match registered {
        Some(id) => Some(id),
        None if state.is_admin() => {
            let auth = ctx.auth();
            ctx.api
                .accounts(auth.as_deref())
                .ok()
                .and_then(|accounts| {
                    accounts
                        .into_iter()
                        .find(|a| a.account_name == username)
                        .map(|a| a.account_id)
                })
        }
        None => None,
    };

    if let Some(id) = id {
        if let Err(e) = ctx.gate.borrow_mut().set_user_id(&id.to_string()) {
            warn!("cannot store account id: {}", e);
        }
    }
}

fn register(ctx: &Context, args: &[String]) -> Result<Reply> {
    let (Some(name), Some(email), Some(password)) = (args.first(), args.get(1), args.get(2)) else {
        bail!("usage: register <name> <email> <password> [confirm]");
    };
    let confirm = args.get(3).unwrap_or(password);
    if let Err(errors) = forms::validate_registration(name, email, password, confirm) {
        return Ok(Reply::text(format!("Cannot register:\n{}", forms::describe(&errors))));
    }

    let request = AccountRequest {
        account_name: name.trim().to_string(),
        email: email.trim().to_string(),
        password: password.clone(),
    };
    match ctx.api.register(&request) {
        Ok(account) => {
            info!(account_id = account.account_id, "account registered");
            *ctx.registered.borrow_mut() = Some((account.account_name.clone(), account.account_id));
            Ok(Reply::text(format!(
                "Account #{} created for {}. Log in with: login {} <password>\n\n{}",
                account.account_id,
                account.account_name,
                account.account_name,
                go(ctx, LOGIN_PATH, true)
            )))
        }
        Err(e) => Ok(action_failed("register", e)),
    }
}

fn buy(ctx: &Context, args: &[String]) -> Result<Reply> {
    const USAGE: &str = "buy <orchid-id> [quantity]";
    let orchid_id = parse_id(args.first(), USAGE)?;
    let quantity = match args.get(1) {
        Some(q) => q
            .parse::<i64>()
            .map_err(|_| anyhow!("'{}' is not a valid quantity", q))?,
        None => 1,
    };
    if let Err(errors) = forms::validate_quantity(quantity) {
        return Ok(Reply::text(format!("Cannot buy:\n{}", forms::describe(&errors))));
    }

    let auth = ctx.auth();
    let orchid = match ctx.api.orchid(auth.as_deref(), &orchid_id.to_string()) {
        Ok(orchid) => orchid,
        Err(e) => return Ok(action_failed("purchase orchid", e)),
    };
    let request = OrderRequest {
        orchid_id: orchid.orchid_id,
        price: orchid.price,
        quantity,
        account_id: ctx.gate.borrow().user_id(),
    };
    match ctx.api.create_order(auth.as_deref(), &request) {
        Ok(_) => {
            info!(orchid_id, quantity, "order placed");
            Ok(Reply::text(format!(
                "Purchase successful! {} x {} ordered. See: go /user-orders",
                quantity, orchid.orchid_name
            )))
        }
        Err(e) => Ok(action_failed("purchase orchid", e)),
    }
}

fn category(ctx: &Context, args: &[String]) -> Result<Reply> {
    let auth = ctx.auth();
    let auth = auth.as_deref();
    let result = match args.first().map(String::as_str) {
        Some("add") => {
            let name = args[1..].join(" ");
            if let Err(errors) = forms::validate_category_name(&name) {
                return Ok(Reply::text(format!("Cannot add category:\n{}", forms::describe(&errors))));
            }
            ctx.api.create_category(auth, name.trim()).map(|_| "Category created.")
        }
        Some("rename") => {
            let id = parse_id(args.get(1), "category rename <id> <name>")?;
            let name = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
            if let Err(errors) = forms::validate_category_name(&name) {
                return Ok(Reply::text(format!("Cannot rename category:\n{}", forms::describe(&errors))));
            }
            ctx.api.update_category(auth, id, name.trim()).map(|_| "Category updated.")
        }
        Some("rm") => {
            let id = parse_id(args.get(1), "category rm <id>")?;
            ctx.api.delete_category(auth, id).map(|_| "Category deleted.")
        }
        _ => bail!("usage: category add|rename|rm ..."),
    };

    match result {
        Ok(message) => Ok(Reply::text(format!("{}\n\n{}", message, go(ctx, "/categories", true)))),
        Err(e) => Ok(action_failed("update categories", e)),
    }
}

fn orchid(ctx: &Context, args: &[String]) -> Result<Reply> {
    let auth = ctx.auth();
    let auth = auth.as_deref();
    match args.first().map(String::as_str) {
        Some("add") => {
            let mut form = OrchidForm::default();
            if let Err(errors) = form.apply(&args[1..]).and_then(|_| form.validate(true)) {
                return Ok(Reply::text(format!("Cannot add orchid:\n{}", forms::describe(&errors))));
            }
            match ctx.api.create_orchid(auth, form.to_multipart()?) {
                Ok(_) => Ok(Reply::text(format!(
                    "Orchid added successfully!\n\n{}",
                    go(ctx, "/orchids", true)
                ))),
                Err(e) => Ok(action_failed("add orchid", e)),
            }
        }
        Some("edit") => {
            const USAGE: &str = "orchid edit <id> key=value...";
            let id = parse_id(args.get(1), USAGE)?;
            let pairs = args.get(2..).unwrap_or_default();
            if pairs.is_empty() {
                bail!("usage: {}", USAGE);
            }
            let current = match ctx.api.orchid(auth, &id.to_string()) {
                Ok(orchid) => orchid,
                Err(e) => return Ok(action_failed("load orchid", e)),
            };
            let mut form = OrchidForm::from_orchid(&current);
            if let Err(errors) = form.apply(pairs).and_then(|_| form.validate(false)) {
                return Ok(Reply::text(format!("Cannot edit orchid:\n{}", forms::describe(&errors))));
            }
            match ctx.api.update_orchid(auth, id, form.to_multipart()?) {
                Ok(_) => Ok(Reply::text(format!(
                    "Orchid edited successfully!\n\n{}",
                    go(ctx, ROOT_PATH, true)
                ))),
                Err(e) => Ok(action_failed("edit orchid", e)),
            }
        }
        Some("rm") => {
            let id = parse_id(args.get(1), "orchid rm <id>")?;
            match ctx.api.delete_orchid(auth, id) {
                Ok(()) => Ok(Reply::text(format!(
                    "Orchid deleted.\n\n{}",
                    go(ctx, "/orchids", true)
                ))),
                Err(e) => Ok(action_failed("delete orchid", e)),
            }
        }
        _ => bail!("usage: orchid add|edit|rm ..."),
    }
}

fn order(ctx: &Context, args: &[String]) -> Result<Reply> {
    let auth = ctx.auth();
    let auth = auth.as_deref();
    let result = match args.first().map(String::as_str) {
        Some("status") => {
            let (Some(key), Some(status)) = (args.get(1), args.get(2)) else {
                bail!("usage: order status <order> <status>");
            };
            let orders = match ctx.api.orders(auth) {
                Ok(orders) => orders,
                Err(e) => return Ok(action_failed("load orders", e)),
            };
            let Some(mut order) = orders.into_iter().find(|o| o.key().as_deref() == Some(key.as_str()))
            else {
                return Ok(Reply::text(format!("No order {}.", key)));
            };
            order.order_status = Some(status.to_uppercase());
            ctx.api.update_order(auth, key, &order).map(|_| "Order updated.")
        }
        Some("rm") => {
            let key = args.get(1).ok_or_else(|| anyhow!("usage: order rm <order>"))?;
            ctx.api.delete_order(auth, key).map(|_| "Order deleted.")
        }
        _ => bail!("usage: order status|rm ..."),
    };

    match result {
        Ok(message) => Ok(Reply::text(format!("{}\n\n{}", message, go(ctx, "/admin-orders", true)))),
        Err(e) => Ok(action_failed("update orders", e)),
    }
}

fn account(ctx: &Context, args: &[String]) -> Result<Reply> {
    let auth = ctx.auth();
    let auth = auth.as_deref();
    let result = match args.first().map(String::as_str) {
        Some("add-admin") => {
            let (Some(name), Some(email), Some(password)) = (args.get(1), args.get(2), args.get(3))
            else {
                bail!("usage: account add-admin <name> <email> <password>");
            };
            if let Err(errors) = forms::validate_registration(name, email, password, password) {
                return Ok(Reply::text(format!("Cannot add admin:\n{}", forms::describe(&errors))));
            }
            let request = AccountRequest {
                account_name: name.trim().to_string(),
                email: email.trim().to_string(),
                password: password.clone(),
            };
            ctx.api.register_admin(auth, &request).map(|_| "Admin account created.")
        }
        Some("edit") => {
            const USAGE: &str = "account edit <id> name=... email=... role=<role-id>";
            let id = parse_id(args.get(1), USAGE)?;
            let update = parse_account_update(args.get(2..).unwrap_or_default())?;
            if let Some(role_id) = update.role_id {
                let roles = match ctx.api.roles(auth) {
                    Ok(roles) => roles,
                    Err(e) => return Ok(action_failed("load roles", e)),
                };
                if !roles.iter().any(|r| r.role_id == role_id) {
                    let known: Vec<String> = roles
                        .iter()
                        .map(|r| format!("{} {}", r.role_id, r.role_name))
                        .collect();
                    return Ok(Reply::text(format!(
                        "Unknown role id {}. Roles: {}",
                        role_id,
                        known.join(", ")
                    )));
                }
            }
            ctx.api.update_account(auth, id, &update).map(|_| "Account updated.")
        }
        Some("rm") => {
            let id = parse_id(args.get(1), "account rm <id>")?;
            ctx.api.delete_account(auth, id).map(|_| "Account deleted.")
        }
        _ => bail!("usage: account add-admin|edit|rm ..."),
    };

    match result {
        Ok(message) => Ok(Reply::text(format!("{}\n\n{}", message, go(ctx, "/accounts", true)))),
        Err(e) => Ok(action_failed("update accounts", e)),
    }
}

fn parse_account_update(pairs: &[String]) -> Result<AccountUpdate> {
    let mut update = AccountUpdate::default();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", pair))?;
        match key {
            "name" => update.account_name = Some(value.to_string()),
            "email" => update.email = Some(value.to_string()),
            "role" => {
                update.role_id = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow!("role must be a role id, got '{}'", value))?,
                )
            }
            other => bail!("unknown account field '{}' (name, email, role)", other),
        }
    }
    if update.account_name.is_none() && update.email.is_none() && update.role_id.is_none() {
        bail!("nothing to change");
    }
    Ok(update)
}

fn employee(ctx: &Context, args: &[String]) -> Result<Reply> {
    if args.first().map(String::as_str) != Some("add") {
        bail!("usage: employee add name=... url=... designation=... [gender=...]");
    }
    let Some(directory) = &ctx.employees else {
        bail!("the staff directory is not configured ([employees] url)");
    };

    let mut request = EmployeeRequest {
        name: String::new(),
        url: String::new(),
        designation: String::new(),
        gender: String::new(),
    };
    for pair in &args[1..] {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{}'", pair))?;
        match key {
            "name" => request.name = value.to_string(),
            "url" | "image" => request.url = value.to_string(),
            "designation" => request.designation = value.to_string(),
            "gender" => request.gender = value.to_string(),
            other => bail!("unknown employee field '{}'", other),
        }
    }
    if let Err(errors) = forms::validate_employee(&request.name, &request.url, &request.designation) {
        return Ok(Reply::text(format!("Cannot add employee:\n{}", forms::describe(&errors))));
    }

    match directory.add(&request) {
        Ok(_) => Ok(Reply::text(format!(
            "Employee added successfully!\n\n{}",
            go(ctx, "/employees", true)
        ))),
        Err(e) => Ok(action_failed("add employee", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockTransport;
    use crate::api::{Body, Method};
    use crate::store::{
        FileStore, MemoryStore, SessionStore, KEY_AUTH_TOKEN, KEY_IS_AUTHENTICATED, KEY_USER_ROLE,
        SESSION_KEYS,
    };
    use crate::token::testing::{now, token};
    use serde_json::{json, Value};

    fn user_token() -> String {
        token(json!({"sub": "bob", "role": "ROLE_USER", "exp": now() + 3600}))
    }

    fn admin_token() -> String {
        token(json!({"sub": "alice", "role": "ROLE_ADMIN", "exp": now() + 3600}))
    }

    fn context_with(gate: SessionGate, mock: &MockTransport) -> Context {
        mock.on(
            Method::Get,
            "/orchids",
            Ok(json!([
                {"orchidId": 1, "orchidName": "Cattleya", "orchidDescription": "Corsage", "price": 30.0, "categoryId": 1,
                 "orchidUrl": "http://minio:9000/orchid-bucket/c.png"},
                {"orchidId": 2, "orchidName": "Vanda", "orchidDescription": "Blue", "price": 12.0, "categoryId": 2}
            ])),
        );
        mock.on(
            Method::Get,
            "/orchids/1",
            Ok(json!({"orchidId": 1, "orchidName": "Cattleya", "orchidDescription": "Corsage", "price": 30.0, "categoryId": 1})),
        );
        mock.on(
            Method::Get,
            "/categories",
            Ok(json!([{"categoryId": 1, "categoryName": "Epiphytes"}, {"categoryId": 2, "categoryName": "Monopodial"}])),
        );
        mock.on(
            Method::Get,
            "/accounts",
            Ok(json!([{"accountId": 5, "accountName": "alice", "role": {"roleId": 1, "roleName": "ADMIN"}}])),
        );
        mock.on(
            Method::Get,
            "/categories/1",
            Ok(json!({"categoryId": 1, "categoryName": "Epiphytes"})),
        );
        mock.on(
            Method::Get,
            "/roles",
            Ok(json!([{"roleId": 1, "roleName": "ADMIN"}, {"roleId": 4, "roleName": "USER"}])),
        );
        let api = Client::new("http://api.test/api", Box::new(mock.clone()));
        let employees = EmployeeDirectory::new("http://staff.test/employees", Box::new(mock.clone()));
        Context::new(Config::default(), gate, api, Some(employees)).unwrap()
    }

    fn context(mock: &MockTransport) -> Context {
        context_with(SessionGate::new(Box::new(MemoryStore::new())), mock)
    }

    fn login_as(ctx: &Context, mock: &MockTransport, credential: String, user: &str) -> Reply {
        mock.on(Method::Post, "/accounts/login", Ok(json!({"token": credential})));
        execute(ctx, &format!("login {} secret", user)).unwrap()
    }

    #[test]
    fn test_user_login_lands_on_home_and_admin_route_redirects() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let reply = login_as(&ctx, &mock, user_token(), "bob");
        assert!(reply.text.contains("Welcome, bob!"));
        assert!(reply.text.contains("Our orchids"));
        assert_eq!(ctx.location(), "/home");
        assert_eq!(ctx.gate.borrow_mut().auth_state(), AuthState::AuthenticatedUser);

        execute(&ctx, "go /orchids").unwrap();
        assert_eq!(ctx.location(), "/home");
        execute(&ctx, "/accounts").unwrap();
        assert_eq!(ctx.location(), "/home");
    }

    #[test]
    fn test_admin_login_lands_on_root_with_account_id() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let reply = login_as(&ctx, &mock, admin_token(), "alice");
        assert!(reply.text.contains("Orchids (2 of 2"));
        assert_eq!(ctx.location(), "/");
        assert_eq!(ctx.gate.borrow().user_id().as_deref(), Some("5"));

        let reply = execute(&ctx, "/categories").unwrap();
        assert!(reply.text.starts_with("Categories"));
    }

    #[test]
    fn test_expired_session_is_wiped_on_next_check() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let expired = token(json!({"sub": "bob", "role": "ROLE_USER", "exp": now() - 10}));
        std::fs::write(
            &path,
            json!({
                "authToken": expired,
                "isAuthenticated": "true",
                "username": "bob",
                "userRole": "4",
                "userRoleName": "ROLE_USER",
                "userId": "3"
            })
            .to_string(),
        )
        .unwrap();

        let mock = MockTransport::new();
        let ctx = context_with(SessionGate::new(Box::new(FileStore::new(&path))), &mock);
        assert!(!ctx.gate.borrow_mut().is_authenticated());

        let store = FileStore::new(&path);
        for key in SESSION_KEYS {
            assert!(store.get(key).is_none(), "{} kept", key);
        }

        let reply = execute(&ctx, "/home").unwrap();
        assert!(reply.text.starts_with("Please log in to continue."));
        assert_eq!(ctx.location(), LOGIN_PATH);
    }

    #[test]
    fn test_startup_keeps_valid_session() {
        let mut gate = SessionGate::new(Box::new(MemoryStore::new()));
        gate.login(&user_token(), "bob").unwrap();
        let mock = MockTransport::new();
        let ctx = context_with(gate, &mock);
        startup(&ctx);
        assert!(ctx.gate.borrow().credential().is_some());
        assert_eq!(execute(&ctx, "whoami").unwrap().text.lines().next(), Some("Signed in as bob (user)"));
    }

    #[test]
    fn test_admin_action_by_user_shows_forbidden() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, user_token(), "bob");
        let before = mock.requests.borrow().len();

        let reply = execute(&ctx, "category add Terrestrial").unwrap();
        assert!(reply.text.starts_with("403 Forbidden"));
        assert_eq!(ctx.location(), FORBIDDEN_PATH);
        assert!(mock.requests.borrow()[before..]
            .iter()
            .all(|r| r.method == Method::Get));
    }

    #[test]
    fn test_anonymous_action_requires_login() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let reply = execute(&ctx, "buy 1").unwrap();
        assert!(reply.text.starts_with("Please log in first."));
        assert_eq!(ctx.location(), LOGIN_PATH);
        assert!(mock.requests.borrow().is_empty());
    }

    #[test]
    fn test_admin_creates_category_with_bearer() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        let credential = admin_token();
        login_as(&ctx, &mock, credential.clone(), "alice");
        mock.on(Method::Post, "/categories", Ok(json!({"categoryId": 3})));

        let reply = execute(&ctx, "category add \"Lady slippers\"").unwrap();
        assert!(reply.text.starts_with("Category created."));
        let post = mock
            .requests
            .borrow()
            .iter()
            .find(|r| r.method == Method::Post && r.url.ends_with("/categories"))
            .cloned()
            .unwrap();
        assert_eq!(post.authorization, Some(format!("Bearer {}", credential)));
        assert_eq!(post.body, Body::Json(json!({"categoryName": "Lady slippers"})));
        assert_eq!(ctx.location(), "/categories");
    }

    #[test]
    fn test_buy_places_order() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, user_token(), "bob");
        mock.on(Method::Post, "/orders", Ok(Value::Null));

        let reply = execute(&ctx, "buy 1 2").unwrap();
        assert!(reply.text.starts_with("Purchase successful!"));
        assert_eq!(
            mock.last().unwrap().body,
            Body::Json(json!({"orchidId": 1, "price": 30.0, "quantity": 2}))
        );

        let reply = execute(&ctx, "buy 1 0").unwrap();
        assert!(reply.text.contains("quantity must be at least 1"));
        assert!(execute(&ctx, "buy one").is_err());
    }

    #[test]
    fn test_failed_login_and_server_rejection() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        mock.on(Method::Post, "/accounts/login", Err(ApiError::Unauthorized));
        let reply = execute(&ctx, "login bob wrong").unwrap();
        assert_eq!(reply.text, "Invalid username or password.");

        let reply = execute(&ctx, "login bob x").unwrap();
        assert!(reply.text.contains("at least 3 characters"));

        login_as(&ctx, &mock, user_token(), "bob");
        mock.on(Method::Get, "/orders/my", Err(ApiError::Unauthorized));
        let reply = execute(&ctx, "/user-orders").unwrap();
        assert!(reply.text.starts_with("Authentication required."));
    }

    #[test]
    fn test_search_sort_and_back() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, admin_token(), "alice");

        let reply = execute(&ctx, "search vanda").unwrap();
        assert!(reply.text.contains("Orchids (1 of 2"));
        let reply = execute(&ctx, "sort price asc").unwrap();
        assert!(reply.text.contains("sorted by price asc"));
        assert!(execute(&ctx, "sort rating").is_err());

        execute(&ctx, "/detail/1").unwrap();
        assert_eq!(ctx.location(), "/detail/1");
        execute(&ctx, "back").unwrap();
        assert_eq!(ctx.location(), "/");
    }

    #[test]
    fn test_logout_and_register() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        mock.on(
            Method::Post,
            "/accounts/register",
            Ok(json!({"accountId": 9, "accountName": "carol", "email": "c@example.com"})),
        );
        let reply = execute(&ctx, "register carol c@example.com pass pass").unwrap();
        assert!(reply.text.starts_with("Account #9 created for carol."));

        let credential = token(json!({"sub": "carol", "role": "ROLE_USER", "exp": now() + 60}));
        login_as(&ctx, &mock, credential, "carol");
        assert_eq!(ctx.gate.borrow().user_id().as_deref(), Some("9"));

        let reply = execute(&ctx, "logout").unwrap();
        assert!(reply.text.starts_with("Logged out."));
        assert_eq!(ctx.location(), LOGIN_PATH);
        assert!(ctx.gate.borrow().credential().is_none());

        let reply = execute(&ctx, "register c bad x").unwrap();
        assert!(reply.text.starts_with("Cannot register:"));
    }

    #[test]
    fn test_unknown_command_and_paths() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        assert!(execute(&ctx, "dance").is_err());
        assert_eq!(execute(&ctx, "  ").unwrap(), Reply::default());
        assert!(execute(&ctx, "exit").unwrap().exit);
        let reply = execute(&ctx, "/login").unwrap();
        assert!(reply.text.starts_with("Sign in"));
        let reply = execute(&ctx, "/nowhere").unwrap();
        assert!(reply.text.starts_with("404 Not Found"));
    }

    #[test]
    fn test_every_action_has_a_capability() {
        for command in [
            "help", "exit", "go", "back", "refresh", "login", "logout", "register", "whoami",
            "search", "sort", "buy", "category", "orchid", "order", "account", "employee",
        ] {
            assert!(capability_of(command).is_some(), "{}", command);
        }
        assert_eq!(capability_of("buy"), Some(Capability::AuthenticatedAny));
        assert_eq!(capability_of("employee"), Some(Capability::AuthenticatedAdmin));
    }

    #[test]
    fn test_account_update_parsing() {
        let update = parse_account_update(&["role=2".to_string(), "email=a@b.co".to_string()]).unwrap();
        assert_eq!(update.role_id, Some(2));
        assert!(parse_account_update(&[]).is_err());
        assert!(parse_account_update(&["role=admin".to_string()]).is_err());
        assert!(parse_account_update(&["password=x".to_string()]).is_err());
    }

    #[test]
    fn test_employee_page_and_add() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, admin_token(), "alice");
        mock.on(
            Method::Get,
            "/employees",
            Ok(json!([{"empId": "1", "name": "Lan"}, {"empId": "3", "name": "Mai"}])),
        );
        let reply = execute(&ctx, "/employees").unwrap();
        let mai = reply.text.find("Mai").unwrap();
        let lan = reply.text.find("Lan").unwrap();
        assert!(mai < lan);

        mock.on(Method::Post, "/employees", Ok(json!({"empId": "4"})));
        let reply = execute(
            &ctx,
            "employee add name=Hoa url=https://img.example.com/h.png designation=Gardener",
        )
        .unwrap();
        assert!(reply.text.starts_with("Employee added successfully!"));
        let post = mock
            .requests
            .borrow()
            .iter()
            .find(|r| r.method == Method::Post && r.url.ends_with("/employees"))
            .cloned()
            .unwrap();
        assert!(post.authorization.is_none());
    }

    #[test]
    fn test_forged_role_flag_does_not_grant_admin() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut forged = FileStore::new(&path);
        forged.set(KEY_AUTH_TOKEN, &user_token()).unwrap();
        forged.set(KEY_IS_AUTHENTICATED, "true").unwrap();
        forged.set(KEY_USER_ROLE, "1").unwrap();

        let mock = MockTransport::new();
        let ctx = context_with(SessionGate::new(Box::new(FileStore::new(&path))), &mock);
        execute(&ctx, "/accounts").unwrap();
        assert_eq!(ctx.location(), "/home");
        assert_eq!(forged.get(KEY_USER_ROLE).as_deref(), Some("4"));
    }

    #[test]
    fn test_history_is_capped() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        for i in 0..(MAX_HISTORY + 10) {
            let path = if i % 2 == 0 { "/register" } else { "/login" };
            execute(&ctx, path).unwrap();
        }
        assert_eq!(ctx.history.borrow().len(), MAX_HISTORY);
        assert!(mock.requests.borrow().is_empty());
    }

    #[test]
    fn test_network_failure_suggests_refresh() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, admin_token(), "alice");
        mock.on(
            Method::Get,
            "/orchids",
            Err(ApiError::Network("connection refused".to_string())),
        );

        let reply = execute(&ctx, "refresh").unwrap();
        assert!(reply.text.starts_with("cannot reach the server: connection refused"));
        assert!(reply
            .text
            .contains("Check the server at http://api.test/api and try again with: refresh"));
    }

    #[test]
    fn test_detail_page_shows_category() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, user_token(), "bob");
        let reply = execute(&ctx, "/detail/1").unwrap();
        assert!(reply.text.contains("Category: Epiphytes"));
        assert!(mock.last().unwrap().url.ends_with("/categories/1"));
    }

    #[test]
    fn test_accounts_page_lists_roles_and_checks_role_ids() {
        let mock = MockTransport::new();
        let ctx = context(&mock);
        login_as(&ctx, &mock, admin_token(), "alice");

        let reply = execute(&ctx, "/accounts").unwrap();
        assert!(reply.text.contains("Roles: #1 ADMIN, #4 USER"));

        let reply = execute(&ctx, "account edit 5 role=9").unwrap();
        assert_eq!(reply.text, "Unknown role id 9. Roles: 1 ADMIN, 4 USER");
        assert!(mock.requests.borrow().iter().all(|r| r.method != Method::Put));

        mock.on(Method::Put, "/accounts/5", Ok(Value::Null));
        let reply = execute(&ctx, "account edit 5 role=4").unwrap();
        assert!(reply.text.starts_with("Account updated."));
        let put = mock
            .requests
            .borrow()
            .iter()
            .find(|r| r.method == Method::Put)
            .cloned()
            .unwrap();
        assert_eq!(put.body, Body::Json(json!({"roleId": 4})));
    }
}
