/// Event channel message schema
///
/// Outbound frames are `{"event": <name>, "data": <payload>}`. Inbound frames
/// are plain text `"<mint>,<action>"` with a case-insensitive action.
use crate::types::PriceSnapshot;
use serde_json::json;

pub const INVALID_TOKEN_MINT_CODE: &str = "INVALID_TOKEN_MINT";

/// Room name for a mint's subscribers.
pub fn room_for(mint: &str) -> String {
    format!("token:{}", mint)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
}

/// Parse an inbound `"<mint>,<action>"` frame.
pub fn parse_client_message(text: &str) -> Result<(String, ClientAction), String> {
    let mut parts = text.splitn(2, ',');
    let mint = parts.next().unwrap_or_default().trim();
    let action = parts.next().unwrap_or_default().trim();

    if mint.is_empty() || action.is_empty() {
        return Err(format!(
            "expected \"<mint>,<action>\", got {:?}",
            text
        ));
    }

    let action = match action.to_ascii_lowercase().as_str() {
        "subscribe" => ClientAction::Subscribe,
        "unsubscribe" => ClientAction::Unsubscribe,
        other => return Err(format!("unknown action {:?}", other)),
    };
    Ok((mint.to_string(), action))
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Connected {
        socket_id: u64,
    },
    PriceUpdate(PriceSnapshot),
    SubscriptionSuccess {
        mint: String,
        total_subscriptions: usize,
    },
    SubscriptionError {
        mint: String,
        message: String,
    },
    SubscriptionStatus {
        mint: String,
        status: &'static str,
    },
    UnsubscriptionSuccess {
        mint: String,
        total_subscriptions: usize,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::PriceUpdate(_) => "price_update",
            ServerEvent::SubscriptionSuccess { .. } => "subscription_success",
            ServerEvent::SubscriptionError { .. } => "subscription_error",
            ServerEvent::SubscriptionStatus { .. } => "subscription_status",
            ServerEvent::UnsubscriptionSuccess { .. } => "unsubscription_success",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Serialise into the wire frame.
    pub fn to_frame(&self) -> String {
        let data = match self {
            ServerEvent::Connected { socket_id } => json!({
                "socketId": socket_id,
                "message": "connected to price stream",
                "usage": "send \"<mint>,subscribe\" or \"<mint>,unsubscribe\"",
            }),
            ServerEvent::PriceUpdate(snapshot) => {
                serde_json::to_value(snapshot).unwrap_or_default()
            }
            ServerEvent::SubscriptionSuccess {
                mint,
                total_subscriptions,
            } => json!({
                "mint": mint,
                "totalSubscriptions": total_subscriptions,
            }),
            ServerEvent::SubscriptionError { mint, message } => json!({
                "mint": mint,
                "message": message,
                "code": INVALID_TOKEN_MINT_CODE,
            }),
            ServerEvent::SubscriptionStatus { mint, status } => json!({
                "mint": mint,
                "status": status,
            }),
            ServerEvent::UnsubscriptionSuccess {
                mint,
                total_subscriptions,
            } => json!({
                "mint": mint,
                "totalSubscriptions": total_subscriptions,
            }),
            ServerEvent::Error { message } => json!({ "message": message }),
        };

        json!({ "event": self.name(), "data": data }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_case_insensitively() {
        let (mint, action) = parse_client_message("MintA,subscribe").unwrap();
        assert_eq!(mint, "MintA");
        assert_eq!(action, ClientAction::Subscribe);

        let (_, action) = parse_client_message("MintA,UNSUBSCRIBE").unwrap();
        assert_eq!(action, ClientAction::Unsubscribe);

        let (_, action) = parse_client_message(" MintA , Subscribe ").unwrap();
        assert_eq!(action, ClientAction::Subscribe);
    }

    #[test]
    fn malformed_frames_are_rejected_with_a_message() {
        assert!(parse_client_message("").is_err());
        assert!(parse_client_message("MintA").is_err());
        assert!(parse_client_message("MintA,").is_err());
        assert!(parse_client_message(",subscribe").is_err());
        assert!(parse_client_message("MintA,dance").is_err());
    }

    #[test]
    fn frames_carry_the_event_envelope() {
        let frame = ServerEvent::SubscriptionError {
            mint: "MintA".into(),
            message: "bad base58".into(),
        }
        .to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "subscription_error");
        assert_eq!(value["data"]["code"], INVALID_TOKEN_MINT_CODE);
        assert_eq!(value["data"]["mint"], "MintA");
    }

    #[test]
    fn rooms_are_scoped_per_mint() {
        assert_eq!(room_for("MintA"), "token:MintA");
    }
}
