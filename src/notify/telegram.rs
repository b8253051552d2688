use async_trait::async_trait;
use std::time::Duration;

use super::{DigestNotifier, ScanDigest};

/// Digest delivery via the Telegram Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            bot_token,
            chat_id,
        }
    }
}

/// Render a digest as a plain-text alert message.
pub fn format_digest(recipient: &str, digest: &ScanDigest) -> String {
    let mut lines = vec![format!(
        "Approval alert for {} — {} on {} (blocks {}..{}): {} risky event(s)",
        recipient,
        digest.wallet_address,
        digest.chain,
        digest.from_block,
        digest.to_block,
        digest.total_events,
    )];

    for event in &digest.events {
        lines.push(format!(
            "[{}] {} token {} spender {} — {}",
            event.risk_level,
            event.kind,
            event.token_address,
            event.spender,
            event.tx_url,
        ));
    }

    if digest.more_count > 0 {
        lines.push(format!("...and {} more", digest.more_count));
    }

    lines.join("\n")
}

#[async_trait]
impl DigestNotifier for TelegramNotifier {
    async fn send_digest(&self, recipient: &str, digest: &ScanDigest) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format_digest(recipient, digest),
            "disable_web_page_preview": true,
        });

        let result = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => tracing::info!(
                recipient,
                chain = %digest.chain,
                wallet = %digest.wallet_address,
                events = digest.events.len(),
                "digest sent"
            ),
            Err(e) => tracing::error!(
                recipient,
                chain = %digest.chain,
                error = %e,
                "digest send failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::DigestEntry;

    #[test]
    fn format_includes_events_and_overflow() {
        let digest = ScanDigest {
            chain: "ethereum".to_string(),
            wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
            from_block: 100,
            to_block: 200,
            events: vec![DigestEntry {
                kind: "ERC20_APPROVAL".to_string(),
                token_address: "0xaaaa".to_string(),
                spender: "0xbbbb".to_string(),
                raw_value: Some("1".to_string()),
                approved: None,
                risk_score: 105,
                risk_level: "CRITICAL".to_string(),
                reasons: vec!["INFINITE_ALLOWANCE".to_string()],
                tx_hash: "0xcc".to_string(),
                block_number: 150,
                tx_url: "https://etherscan.io/tx/0xcc".to_string(),
            }],
            more_count: 3,
            total_events: 4,
        };

        let text = format_digest("user@example.com", &digest);
        assert!(text.contains("user@example.com"));
        assert!(text.contains("blocks 100..200"));
        assert!(text.contains("[CRITICAL] ERC20_APPROVAL"));
        assert!(text.contains("https://etherscan.io/tx/0xcc"));
        assert!(text.contains("...and 3 more"));
    }
}
