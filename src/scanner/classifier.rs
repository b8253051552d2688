use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use uuid::Uuid;

use crate::approvals::types::{ApprovalKind, CandidateEvent};

// Generate the two monitored approval event shapes with alloy's sol! macro.
// This gives us SIGNATURE_HASH topic constants and the decoded layouts.
sol! {
    event Approval(address indexed owner, address indexed spender, uint256 value);
    event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
}

/// Addresses and hashes are stored and compared as 0x-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Attempt to decode a log as an approval event owned by the wallet under scan.
///
/// Returns `None` if:
/// - topic0 is not one of the two monitored event signatures
/// - the decoded owner is not the scanned wallet (the shared topic filter can
///   leak matches for other addresses in the same block range query)
/// - the log is malformed or missing its transaction coordinates
pub fn classify_log(
    log: &Log,
    wallet_id: Uuid,
    chain: &str,
    wallet_address: &Address,
) -> Option<CandidateEvent> {
    let inner = &log.inner;
    let topics = inner.data.topics();

    let kind = if topics.first() == Some(&Approval::SIGNATURE_HASH) {
        ApprovalKind::Erc20Approval
    } else if topics.first() == Some(&ApprovalForAll::SIGNATURE_HASH) {
        ApprovalKind::ApprovalForAll
    } else {
        tracing::warn!(
            chain,
            topic = ?topics.first(),
            "log signature is not monitored, dropping"
        );
        return None;
    };

    // Both shapes carry signature + owner + spender/operator.
    if topics.len() != 3 {
        tracing::warn!(chain, kind = kind.as_str(), topics = topics.len(), "unexpected topic count, dropping log");
        return None;
    }

    let owner = Address::from_word(topics[1]);
    if owner != *wallet_address {
        return None;
    }

    let counterparty = Address::from_word(topics[2]);

    let data = inner.data.data.as_ref();
    if data.len() < 32 {
        tracing::warn!(chain, kind = kind.as_str(), data_len = data.len(), "log data too short, dropping");
        return None;
    }
    let word = U256::from_be_slice(&data[..32]);

    let (raw_value, approved) = match kind {
        ApprovalKind::Erc20Approval => (Some(word.to_string()), None),
        ApprovalKind::ApprovalForAll => (None, Some(!word.is_zero())),
    };

    let Some(tx_hash) = log.transaction_hash else {
        tracing::warn!(chain, kind = kind.as_str(), "log missing transaction hash, dropping");
        return None;
    };
    let Some(block_number) = log.block_number else {
        tracing::warn!(chain, kind = kind.as_str(), "log missing block number, dropping");
        return None;
    };
    let log_index = log.log_index.unwrap_or(0);

    Some(CandidateEvent {
        wallet_id,
        chain: chain.to_string(),
        kind,
        token_address: to_hex(inner.address.as_slice()),
        spender: to_hex(counterparty.as_slice()),
        raw_value,
        approved,
        tx_hash: to_hex(tx_hash.as_slice()),
        block_number: block_number as i64,
        log_index: log_index as i32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, LogData};

    fn wallet() -> Address {
        Address::repeat_byte(0x11)
    }

    fn make_log(topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0xaa),
                data: LogData::new_unchecked(topics, data.into()),
            },
            block_hash: None,
            block_number: Some(1234),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0x42)),
            transaction_index: Some(0),
            log_index: Some(7),
            removed: false,
        }
    }

    fn erc20_log(owner: Address, value: U256) -> Log {
        make_log(
            vec![
                Approval::SIGNATURE_HASH,
                owner.into_word(),
                Address::repeat_byte(0x22).into_word(),
            ],
            value.to_be_bytes::<32>().to_vec(),
        )
    }

    fn operator_log(owner: Address, approved: bool) -> Log {
        make_log(
            vec![
                ApprovalForAll::SIGNATURE_HASH,
                owner.into_word(),
                Address::repeat_byte(0x33).into_word(),
            ],
            U256::from(approved as u8).to_be_bytes::<32>().to_vec(),
        )
    }

    #[test]
    fn decodes_erc20_approval() {
        let log = erc20_log(wallet(), U256::from(5000u64));
        let event = classify_log(&log, Uuid::nil(), "ethereum", &wallet()).unwrap();

        assert_eq!(event.kind, ApprovalKind::Erc20Approval);
        assert_eq!(event.token_address, to_hex(Address::repeat_byte(0xaa).as_slice()));
        assert_eq!(event.spender, to_hex(Address::repeat_byte(0x22).as_slice()));
        assert_eq!(event.raw_value.as_deref(), Some("5000"));
        assert_eq!(event.approved, None);
        assert_eq!(event.block_number, 1234);
        assert_eq!(event.log_index, 7);
        assert_eq!(event.tx_hash, to_hex(B256::repeat_byte(0x42).as_slice()));
    }

    #[test]
    fn decodes_approval_for_all_both_ways() {
        let enabled = classify_log(&operator_log(wallet(), true), Uuid::nil(), "ethereum", &wallet())
            .unwrap();
        assert_eq!(enabled.kind, ApprovalKind::ApprovalForAll);
        assert_eq!(enabled.approved, Some(true));
        assert_eq!(enabled.raw_value, None);

        let disabled =
            classify_log(&operator_log(wallet(), false), Uuid::nil(), "ethereum", &wallet())
                .unwrap();
        assert_eq!(disabled.approved, Some(false));
    }

    #[test]
    fn drops_logs_owned_by_other_addresses() {
        let log = erc20_log(Address::repeat_byte(0x99), U256::from(1u64));
        assert!(classify_log(&log, Uuid::nil(), "ethereum", &wallet()).is_none());
    }

    #[test]
    fn drops_unmonitored_signatures() {
        let log = make_log(
            vec![B256::repeat_byte(0x01), wallet().into_word(), B256::ZERO],
            vec![0u8; 32],
        );
        assert!(classify_log(&log, Uuid::nil(), "ethereum", &wallet()).is_none());
    }

    #[test]
    fn drops_malformed_logs() {
        // Missing the counterparty topic.
        let two_topics = make_log(
            vec![Approval::SIGNATURE_HASH, wallet().into_word()],
            vec![0u8; 32],
        );
        assert!(classify_log(&two_topics, Uuid::nil(), "ethereum", &wallet()).is_none());

        // Truncated data word.
        let short_data = make_log(
            vec![
                Approval::SIGNATURE_HASH,
                wallet().into_word(),
                Address::repeat_byte(0x22).into_word(),
            ],
            vec![0u8; 8],
        );
        assert!(classify_log(&short_data, Uuid::nil(), "ethereum", &wallet()).is_none());
    }

    #[test]
    fn drops_logs_without_tx_coordinates() {
        let mut log = erc20_log(wallet(), U256::from(1u64));
        log.transaction_hash = None;
        assert!(classify_log(&log, Uuid::nil(), "ethereum", &wallet()).is_none());

        let mut log = erc20_log(wallet(), U256::from(1u64));
        log.block_number = None;
        assert!(classify_log(&log, Uuid::nil(), "ethereum", &wallet()).is_none());
    }
}
