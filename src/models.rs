//! Request and response bodies of the catalog API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub account_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub account_id: i64,
    pub account_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub role_id: i64,
    pub role_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: i64,
    pub account_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl Account {
    pub fn role_name(&self) -> &str {
        self.role.as_ref().map(|r| r.role_name.as_str()).unwrap_or("USER")
    }
}

/// Body of an account edit. Fields left as `None` are not sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: i64,
    pub category_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orchid {
    pub orchid_id: i64,
    pub orchid_name: String,
    #[serde(default)]
    pub orchid_description: Option<String>,
    #[serde(default)]
    pub orchid_url: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub is_natural: Option<bool>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl Orchid {
    pub fn description(&self) -> &str {
        self.orchid_description.as_deref().unwrap_or("")
    }

    pub fn kind(&self) -> &'static str {
        match self.is_natural {
            Some(true) => "natural",
            Some(false) => "hybrid",
            None => "-",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub orchid_name: Option<String>,
    #[serde(default)]
    pub orchid_url: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub orchid_id: Option<i64>,
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing)]
    pub account_username: Option<String>,
    #[serde(default)]
    pub order_details: Vec<OrderDetail>,
}

impl Order {
    /// Identifier used for order updates and deletes: the document id when
    /// the API returns one, else the orchid id.
    pub fn key(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.orchid_id.map(|id| id.to_string()))
    }
}

/// Purchase request. `account_id` is the cached `userId` of the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub orchid_id: i64,
    pub price: f64,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Employee record of the external staff directory
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub emp_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl Employee {
    pub fn numeric_id(&self) -> Option<i64> {
        self.emp_id
            .as_deref()
            .or(self.id.as_deref())
            .and_then(|id| id.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeRequest {
    pub name: String,
    pub url: String,
    pub designation: String,
    pub gender: String,
}

/// Accept ids sent either as JSON strings or numbers
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_orchid_from_api() {
        let orchid: Orchid = serde_json::from_value(json!({
            "orchidId": 3,
            "orchidName": "Phalaenopsis",
            "orchidDescription": "Moth orchid",
            "orchidUrl": "http://minio:9000/orchid-bucket/p.png",
            "price": 19.5,
            "isNatural": true,
            "categoryId": 2
        }))
        .unwrap();
        assert_eq!(orchid.orchid_id, 3);
        assert_eq!(orchid.category_id, Some(2));
        assert_eq!(orchid.kind(), "natural");
    }

    #[test]
    fn test_account_role_fallback() {
        let account: Account = serde_json::from_value(json!({
            "accountId": 1,
            "accountName": "root",
            "email": "root@example.com",
            "password": "hashed",
            "role": {"roleId": 1, "roleName": "ADMIN"}
        }))
        .unwrap();
        assert_eq!(account.role_name(), "ADMIN");

        let account: Account =
            serde_json::from_value(json!({"accountId": 2, "accountName": "x"})).unwrap();
        assert_eq!(account.role_name(), "USER");
    }

    #[test]
    fn test_order_key() {
        let order: Order = serde_json::from_value(json!({
            "id": "66aa",
            "orchidId": 4,
            "orderStatus": "PENDING",
            "accountUsername": "bob",
            "orderDetails": [{"productId": 4, "quantity": 2, "price": 10.0}]
        }))
        .unwrap();
        assert_eq!(order.key().as_deref(), Some("66aa"));
        assert_eq!(order.order_details.len(), 1);

        let order: Order = serde_json::from_value(json!({"orchidId": 9})).unwrap();
        assert_eq!(order.key().as_deref(), Some("9"));
        assert!(order.order_details.is_empty());
    }

    #[test]
    fn test_order_serialization_omits_server_fields() {
        let order = Order {
            orchid_id: Some(1),
            order_status: Some("SHIPPED".to_string()),
            account_username: Some("bob".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["orderStatus"], "SHIPPED");
        assert!(value.get("accountUsername").is_none());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_employee_ids_accept_strings_and_numbers() {
        let e: Employee = serde_json::from_value(json!({"empId": "12", "name": "A"})).unwrap();
        assert_eq!(e.numeric_id(), Some(12));
        let e: Employee = serde_json::from_value(json!({"id": 7, "name": "B"})).unwrap();
        assert_eq!(e.numeric_id(), Some(7));
        let e: Employee = serde_json::from_value(json!({"name": "C"})).unwrap();
        assert_eq!(e.numeric_id(), None);
    }
}
