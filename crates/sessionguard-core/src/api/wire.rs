//! JSON bodies exchanged with the authentication endpoints.

use serde::{Deserialize, Serialize};

use crate::session::Identity;

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    pub user: Identity,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{"accessToken": "at-1", "user": {"id": 7, "username": "alice", "email": "alice@example.com"}}"#;
        let resp: LoginResponse =
            serde_json::from_str(json).expect("Failed to parse login test JSON");
        assert_eq!(resp.access_token, "at-1");
        assert_eq!(resp.user.id, "7");
        assert_eq!(resp.user.username, "alice");
    }

    #[test]
    fn test_login_request_body() {
        let body = serde_json::to_value(LoginRequest {
            username: "alice",
            password: "pw",
        })
        .expect("Failed to serialize login request");
        assert_eq!(body, serde_json::json!({"username": "alice", "password": "pw"}));
    }
}
