use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telegram_handle: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.telegram_handle.as_ref().map(|h| format!("@{}", h)))
            .unwrap_or_else(|| format!("User #{}", self.id))
    }
}

/// Response of `POST /api/auth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(default)]
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        let mut user: User = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(user.display_name(), "User #7");

        user.telegram_handle = Some("ivan".to_string());
        assert_eq!(user.display_name(), "@ivan");

        user.name = Some("Ivan Petrov".to_string());
        assert_eq!(user.display_name(), "Ivan Petrov");
    }
}
