//! Search, sort and grouping of fetched records.

use crate::models::{Account, Category, Employee, Orchid};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Name,
    Price,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(SortField::Id),
            "name" => Ok(SortField::Name),
            "price" => Ok(SortField::Price),
            other => Err(format!("unknown sort field '{}' (id, name, price)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{}' (asc, desc)", other)),
        }
    }
}

/// Search term and ordering applied to orchid listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub search: String,
    pub field: SortField,
    pub direction: SortDirection,
}

impl Listing {
    pub fn matches(&self, orchid: &Orchid) -> bool {
        let term = self.search.trim().to_lowercase();
        term.is_empty()
            || orchid.orchid_name.to_lowercase().contains(&term)
            || orchid.description().to_lowercase().contains(&term)
    }

    /// Filter by the search term, then sort.
    pub fn apply(&self, orchids: &[Orchid]) -> Vec<Orchid> {
        let mut out: Vec<Orchid> = orchids.iter().filter(|o| self.matches(o)).cloned().collect();
        out.sort_by(|a, b| {
            let ord = match self.field {
                SortField::Id => a.orchid_id.cmp(&b.orchid_id),
                SortField::Name => a
                    .orchid_name
                    .to_lowercase()
                    .cmp(&b.orchid_name.to_lowercase()),
                SortField::Price => a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal),
            };
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        out
    }

    pub fn describe(&self) -> String {
        let field = match self.field {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Price => "price",
        };
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        if self.search.is_empty() {
            format!("sorted by {} {}", field, direction)
        } else {
            format!("matching '{}', sorted by {} {}", self.search, field, direction)
        }
    }
}

/// Orchids grouped under their category, in category order. Orchids without
/// a known category land in a trailing `None` group.
pub fn group_by_category<'a>(
    categories: &'a [Category],
    orchids: &'a [Orchid],
) -> Vec<(Option<&'a Category>, Vec<&'a Orchid>)> {
    let mut by_id: BTreeMap<i64, Vec<&Orchid>> = BTreeMap::new();
    let mut loose = Vec::new();
    for orchid in orchids {
        match orchid.category_id {
            Some(id) if categories.iter().any(|c| c.category_id == id) => {
                by_id.entry(id).or_default().push(orchid)
            }
            _ => loose.push(orchid),
        }
    }

    let mut groups: Vec<(Option<&Category>, Vec<&Orchid>)> = categories
        .iter()
        .map(|c| (Some(c), by_id.remove(&c.category_id).unwrap_or_default()))
        .collect();
    if !loose.is_empty() {
        groups.push((None, loose));
    }
    groups
}

pub fn sort_categories(categories: &mut [Category]) {
    categories.sort_by(|a, b| b.category_id.cmp(&a.category_id));
}

pub fn sort_accounts(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| b.account_id.cmp(&a.account_id));
}

/// Newest employee first. Records without a numeric id go last.
pub fn sort_employees(employees: &mut [Employee]) {
    employees.sort_by(|a, b| match (a.numeric_id(), b.numeric_id()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
