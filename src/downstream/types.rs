// Payload and view types.
// Defines the downstream money payload and the caller-facing user view.

use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, Serializer};

/// Monetary amount returned by the downstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyModel {
    pub money: f64,
}

/// Append-only list shared between a caller and asynchronous observers.
///
/// Clones share the same backing storage.
#[derive(Debug)]
pub struct SharedList<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for SharedList<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for SharedList<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> SharedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

impl<T: Clone + Serialize> Serialize for SharedList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

/// Aggregate returned to the caller of a handler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: Option<i32>,
    pub username: String,
    pub money_model: Option<MoneyModel>,
    /// Filled by fire-and-observe observers, possibly after the view was returned.
    pub money_model_list: SharedList<MoneyModel>,
    pub create_time_str: Option<String>,
}

impl UserView {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            user_id: None,
            username: username.into(),
            money_model: None,
            money_model_list: SharedList::new(),
            create_time_str: None,
        }
    }

    pub fn with_user_id(mut self, user_id: i32) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Stamp the view with the current local time.
    pub fn stamp(&mut self) {
        self.create_time_str = Some(Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_model_deserializes_integer_amount() {
        let money: MoneyModel = serde_json::from_str(r#"{"money": 42}"#).unwrap();
        assert_eq!(money, MoneyModel { money: 42.0 });
    }

    #[test]
    fn test_shared_list_clones_share_storage() {
        let list = SharedList::new();
        let observer_side = list.clone();
        observer_side.push(MoneyModel { money: 1.5 });

        assert_eq!(list.len(), 1);
        assert_eq!(list.snapshot(), vec![MoneyModel { money: 1.5 }]);
    }

    #[test]
    fn test_user_view_serializes_camel_case() {
        let mut view = UserView::new("myname").with_user_id(7);
        view.money_model = Some(MoneyModel { money: 42.0 });
        view.money_model_list.push(MoneyModel { money: 42.0 });

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["username"], "myname");
        assert_eq!(json["moneyModel"]["money"], 42.0);
        assert_eq!(json["moneyModelList"].as_array().unwrap().len(), 1);
        assert!(json["createTimeStr"].is_null());
    }

    #[test]
    fn test_stamp_sets_time() {
        let mut view = UserView::new("myname-mono");
        view.stamp();
        assert!(view.create_time_str.is_some());
    }
}
