//! Plain-text rendering of each page.

use crate::catalog::Listing;
use crate::gate::{AuthState, SessionSnapshot};
use crate::images::ImageHost;
use crate::models::{Account, Category, Employee, Order, Orchid, Role};
use chrono::{DateTime, NaiveDateTime};

/// Render rows as an aligned table
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(headers.iter().map(|h| h.to_string()).collect()));
    out.push(line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in rows {
        out.push(line(row.clone()));
    }
    out.join("\n")
}

fn price(value: f64) -> String {
    format!("${:.2}", value)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn category_name(categories: &[Category], id: Option<i64>) -> String {
    id.and_then(|id| categories.iter().find(|c| c.category_id == id))
        .map(|c| c.category_name.clone())
        .unwrap_or_else(|| "-".to_string())
}

/// Order dates arrive as RFC 3339 or as a bare local timestamp
fn order_date(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "-".to_string();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    raw.to_string()
}

fn timestamp(secs: Option<i64>) -> String {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn login_page() -> String {
    [
        "Sign in",
        "  login <username> <password>",
        "  go /register                  create an account",
    ]
    .join("\n")
}

pub fn register_page() -> String {
    [
        "Create an account",
        "  register <name> <email> <password> [confirm]",
        "  go /login                     back to sign in",
    ]
    .join("\n")
}

pub fn forbidden() -> String {
    [
        "403 Forbidden",
        "You do not have permission to do that.",
        "  go /home   back to the shop",
    ]
    .join("\n")
}

pub fn not_found(path: &str) -> String {
    format!("404 Not Found\nNothing lives at {}.\n  go /   back to the start", path)
}

/// Admin orchid table
pub fn orchid_table(orchids: &[Orchid], categories: &[Category], listing: &Listing) -> String {
    let shown = listing.apply(orchids);
    let rows: Vec<Vec<String>> = shown
        .iter()
        .map(|o| {
            vec![
                o.orchid_id.to_string(),
                truncate(&o.orchid_name, 30),
                category_name(categories, o.category_id),
                o.kind().to_string(),
                price(o.price),
            ]
        })
        .collect();

    let mut out = format!(
        "Orchids ({} of {}, {})\n",
        shown.len(),
        orchids.len(),
        listing.describe()
    );
    if shown.is_empty() {
        out.push_str("No orchids match.");
    } else {
        out.push_str(&table(&["ID", "NAME", "CATEGORY", "TYPE", "PRICE"], &rows));
    }
    out
}

/// Orchid cards for shoppers
pub fn orchid_cards(orchids: &[Orchid], listing: &Listing, images: &ImageHost) -> String {
    let shown = listing.apply(orchids);
    let mut out = format!("Our orchids ({})\n", listing.describe());
    if shown.is_empty() {
        out.push_str(if orchids.is_empty() {
            "No orchids available yet."
        } else {
            "No orchids match your search."
        });
        return out;
    }
    for o in &shown {
        out.push_str(&format!(
            "\n#{} {}  {}\n   {}\n",
            o.orchid_id,
            o.orchid_name,
            price(o.price),
            truncate(o.description(), 72)
        ));
        let image = images.public_url(o.orchid_url.as_deref().unwrap_or(""));
        if !image.is_empty() {
            out.push_str(&format!("   image: {}\n", image));
        }
    }
    out.push_str("\n  go /detail/<id>   view an orchid");
    out
}

pub fn category_table(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "Categories\nNo categories yet.".to_string();
    }
    let rows: Vec<Vec<String>> = categories
        .iter()
        .map(|c| {
            vec![
                c.category_id.to_string(),
                c.category_name.clone(),
                c.status.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    format!("Categories\n{}", table(&["ID", "NAME", "STATUS"], &rows))
}

/// Categories with the orchids filed under each
pub fn category_groups(groups: &[(Option<&Category>, Vec<&Orchid>)]) -> String {
    let mut out = String::from("Browse by category\n");
    for (category, orchids) in groups {
        let name = category
            .map(|c| c.category_name.as_str())
            .unwrap_or("Uncategorized");
        out.push_str(&format!("\n{} ({})\n", name, orchids.len()));
        if orchids.is_empty() {
            out.push_str("   (empty)\n");
        }
        for o in orchids {
            out.push_str(&format!("   #{} {}  {}\n", o.orchid_id, o.orchid_name, price(o.price)));
        }
    }
    out.trim_end().to_string()
}

pub fn orchid_detail(orchid: &Orchid, category: Option<&Category>, images: &ImageHost) -> String {
    let image = images.public_url(orchid.orchid_url.as_deref().unwrap_or(""));
    let mut out = format!(
        "{} (#{})\nPrice:    {}\nType:     {}\nCategory: {}\n",
        orchid.orchid_name,
        orchid.orchid_id,
        price(orchid.price),
        orchid.kind(),
        category.map(|c| c.category_name.as_str()).unwrap_or("-"),
    );
    if !image.is_empty() {
        out.push_str(&format!("Image:    {}\n", image));
    }
    out.push_str(&format!("\n{}\n\n  buy {} [quantity]", orchid.description(), orchid.orchid_id));
    out
}

pub fn edit_orchid_page(orchid: &Orchid, categories: &[Category]) -> String {
    let mut out = format!(
        "Edit orchid #{}\n  name        = {}\n  description = {}\n  price       = {}\n  natural     = {}\n  category    = {} ({})\n",
        orchid.orchid_id,
        orchid.orchid_name,
        truncate(orchid.description(), 60),
        orchid.price,
        orchid.is_natural.unwrap_or(false),
        orchid.category_id.map(|id| id.to_string()).unwrap_or_default(),
        category_name(categories, orchid.category_id),
    );
    out.push_str(&format!(
        "\n  orchid edit {} key=value ...   (keys: name description price natural category image)",
        orchid.orchid_id
    ));
    out
}

/// Order table. `all` adds the account column and order keys for admins.
pub fn order_table(orders: &[Order], all: bool) -> String {
    let title = if all { "All orders" } else { "My orders" };
    if orders.is_empty() {
        return format!("{}\nNo orders yet.", title);
    }
    let rows: Vec<Vec<String>> = orders
        .iter()
        .map(|o| {
            let mut row = vec![
                o.key().unwrap_or_else(|| "-".to_string()),
                order_date(o.order_date.as_deref()),
                o.order_status.clone().unwrap_or_else(|| "-".to_string()),
                o.price.map(price).unwrap_or_else(|| "-".to_string()),
                o.order_details.len().to_string(),
            ];
            if all {
                row.push(
                    o.account_username
                        .clone()
                        .or_else(|| o.account_id.map(|id| format!("#{}", id)))
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            row
        })
        .collect();
    let headers: &[&str] = if all {
        &["ORDER", "DATE", "STATUS", "TOTAL", "ITEMS", "ACCOUNT"]
    } else {
        &["ORDER", "DATE", "STATUS", "TOTAL", "ITEMS"]
    };
    format!("{}\n{}", title, table(headers, &rows))
}

/// Account table followed by the role ids accepted by `account edit`
pub fn account_table(accounts: &[Account], roles: &[Role]) -> String {
    let mut out = if accounts.is_empty() {
        "Accounts\nNo accounts.".to_string()
    } else {
        format!("Accounts\n{}", account_rows(accounts))
    };
    if !roles.is_empty() {
        let listed: Vec<String> = roles
            .iter()
            .map(|r| format!("#{} {}", r.role_id, r.role_name))
            .collect();
        out.push_str(&format!(
            "\n\nRoles: {}\n  account edit <id> role=<role-id>",
            listed.join(", ")
        ));
    }
    out
}

fn account_rows(accounts: &[Account]) -> String {
    let rows: Vec<Vec<String>> = accounts
        .iter()
        .map(|a| {
            vec![
                format!("#{}", a.account_id),
                a.account_name.clone(),
                a.email.clone().unwrap_or_else(|| "-".to_string()),
                a.role_name().to_string(),
            ]
        })
        .collect();
    table(&["ID", "NAME", "EMAIL", "ROLE"], &rows)
}

pub fn employee_table(employees: &[Employee]) -> String {
    if employees.is_empty() {
        return "Employees\nNo employees.".to_string();
    }
    let rows: Vec<Vec<String>> = employees
        .iter()
        .map(|e| {
            vec![
                e.emp_id.clone().or_else(|| e.id.clone()).unwrap_or_default(),
                e.name.clone(),
                e.designation.clone().unwrap_or_default(),
                e.gender.clone().unwrap_or_default(),
            ]
        })
        .collect();
    format!("Employees\n{}", table(&["ID", "NAME", "DESIGNATION", "GENDER"], &rows))
}

pub fn whoami(state: AuthState, session: &SessionSnapshot) -> String {
    if !state.is_authenticated() {
        return "Not signed in.".to_string();
    }
    format!(
        "Signed in as {} ({})\nRole:       {} (id {})\nAccount id: {}\nIssued:     {}\nExpires:    {}",
        session.username.as_deref().unwrap_or("?"),
        state.as_str(),
        session.role_name.as_deref().unwrap_or("-"),
        session.role_id.as_deref().unwrap_or("-"),
        session.user_id.as_deref().unwrap_or("-"),
        timestamp(session.issued_at),
        timestamp(session.expiry),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchid(id: i64, name: &str) -> Orchid {
        Orchid {
            orchid_id: id,
            orchid_name: name.to_string(),
            orchid_description: Some("A lovely plant".to_string()),
            orchid_url: Some("http://minio:9000/orchid-bucket/x.png".to_string()),
            price: 9.5,
            is_natural: Some(false),
            category_id: Some(1),
        }
    }

    fn images() -> ImageHost {
        ImageHost::new("http://localhost:9000", "orchid-bucket", "minio:9000").unwrap()
    }

    #[test]
    fn test_table_alignment() {
        let out = table(
            &["ID", "NAME"],
            &[vec!["1".to_string(), "Vanda".to_string()], vec!["10".to_string(), "X".to_string()]],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ID  NAME");
        assert_eq!(lines[1], "--  -----");
        assert_eq!(lines[2], "1   Vanda");
        assert_eq!(lines[3], "10  X");
    }

    #[test]
    fn test_orchid_table_uses_category_names() {
        let categories = vec![Category {
            category_id: 1,
            category_name: "Hybrids".to_string(),
            status: None,
        }];
        let out = orchid_table(&[orchid(1, "Vanda")], &categories, &Listing::default());
        assert!(out.contains("Hybrids"));
        assert!(out.contains("$9.50"));
        assert!(out.contains("hybrid"));
    }

    #[test]
    fn test_cards_rewrite_images() {
        let out = orchid_cards(&[orchid(2, "Vanda")], &Listing::default(), &images());
        assert!(out.contains("http://localhost:9000/orchid-bucket/x.png"));
        assert!(!out.contains("minio"));

        let out = orchid_cards(&[], &Listing::default(), &images());
        assert!(out.contains("No orchids available"));
    }

    #[test]
    fn test_order_table_variants() {
        let order = Order {
            id: Some("o1".to_string()),
            order_date: Some("2025-03-01T10:20:30".to_string()),
            order_status: Some("PENDING".to_string()),
            price: Some(20.0),
            account_username: Some("bob".to_string()),
            ..Default::default()
        };
        let mine = order_table(std::slice::from_ref(&order), false);
        assert!(mine.starts_with("My orders"));
        assert!(mine.contains("2025-03-01 10:20"));
        assert!(!mine.contains("bob"));

        let all = order_table(&[order], true);
        assert!(all.contains("ACCOUNT"));
        assert!(all.contains("bob"));
    }

    #[test]
    fn test_whoami() {
        assert_eq!(whoami(AuthState::Anonymous, &SessionSnapshot::default()), "Not signed in.");
        let snapshot = SessionSnapshot {
            username: Some("alice".to_string()),
            role_id: Some("1".to_string()),
            role_name: Some("ROLE_ADMIN".to_string()),
            user_id: None,
            expiry: Some(0),
            issued_at: None,
        };
        let out = whoami(AuthState::AuthenticatedAdmin, &snapshot);
        assert!(out.contains("Signed in as alice (admin)"));
        assert!(out.contains("1970-01-01 00:00:00 UTC"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long description", 10), "a very ...");
    }

    #[test]
    fn test_account_table_lists_roles() {
        let accounts = vec![Account {
            account_id: 2,
            account_name: "bob".to_string(),
            email: None,
            role: None,
        }];
        let roles = vec![Role {
            role_id: 4,
            role_name: "USER".to_string(),
        }];
        let out = account_table(&accounts, &roles);
        assert!(out.starts_with("Accounts\nID"));
        assert!(out.contains("#2"));
        assert!(out.contains("Roles: #4 USER"));
        assert!(!account_table(&[], &[]).contains("Roles"));
    }
}
