//! Transaction receipts and declared event decoding.

use rollout_core::{abi, Address, EventRule, FieldLocation, H256};

use crate::error::ChainError;

/// One log entry emitted during a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    /// `true` when execution succeeded.
    pub status: bool,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
    pub revert_reason: Option<String>,
}

impl Receipt {
    /// Extract the address field described by `rule` from the first log
    /// carrying the rule's signature topic.
    pub fn extract_address(&self, rule: &EventRule) -> Result<Address, ChainError> {
        let log = self
            .logs
            .iter()
            .find(|log| log.topics.first() == Some(&rule.topic))
            .ok_or_else(|| ChainError::EventNotFound {
                event: rule.event.clone(),
            })?;
        let malformed = |reason: String| ChainError::MalformedLog {
            event: rule.event.clone(),
            reason,
        };

        if log.topics.len() != 1 + rule.indexed_count {
            return Err(malformed(format!(
                "expected {} topics, found {}",
                1 + rule.indexed_count,
                log.topics.len()
            )));
        }
        if log.data.len() < 32 * rule.data_words {
            return Err(malformed(format!(
                "expected at least {} data bytes, found {}",
                32 * rule.data_words,
                log.data.len()
            )));
        }

        let word: &[u8] = match rule.location {
            FieldLocation::Topic(index) => log
                .topics
                .get(index)
                .map(|t| &t.0[..])
                .ok_or_else(|| malformed(format!("no topic {index}")))?,
            FieldLocation::Data(index) => log
                .data
                .get(32 * index..32 * (index + 1))
                .ok_or_else(|| malformed(format!("no data word {index}")))?,
        };
        abi::word_to_address(word)
            .ok_or_else(|| malformed("address word has non-zero padding".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_core::interface::keccak256;
    use rstest::rstest;

    fn created_rule() -> EventRule {
        EventRule::indexed(
            "SuperTokenCreated(address)",
            H256(keccak256(b"SuperTokenCreated(address)")),
            1,
            1,
        )
    }

    fn receipt(logs: Vec<Log>) -> Receipt {
        Receipt {
            transaction_hash: H256([1; 32]),
            status: true,
            contract_address: None,
            logs,
            revert_reason: None,
        }
    }

    fn log(topics: Vec<H256>, data: Vec<u8>) -> Log {
        Log {
            address: Address([9; 20]),
            topics,
            data,
        }
    }

    #[test]
    fn indexed_address_is_extracted() {
        let rule = created_rule();
        let token = Address([0x42; 20]);
        let r = receipt(vec![
            log(vec![H256([7; 32])], vec![]),
            log(vec![rule.topic, H256(token.to_word())], vec![]),
        ]);
        assert_eq!(r.extract_address(&rule).unwrap(), token);
    }

    #[test]
    fn data_address_is_extracted() {
        let topic = H256(keccak256(b"Mixed(address,uint256,address)"));
        let rule = EventRule {
            event: "Mixed(address,uint256,address)".into(),
            topic,
            location: FieldLocation::Data(1),
            indexed_count: 1,
            data_words: 2,
        };
        let proxy = Address([0x33; 20]);
        let mut data = vec![0u8; 32];
        data.extend_from_slice(&proxy.to_word());
        let r = receipt(vec![log(vec![topic, H256([0; 32])], data)]);
        assert_eq!(r.extract_address(&rule).unwrap(), proxy);
    }

    #[test]
    fn missing_event_is_not_found() {
        let err = receipt(vec![]).extract_address(&created_rule()).unwrap_err();
        assert!(matches!(err, ChainError::EventNotFound { .. }));
    }

    #[rstest]
    #[case::missing_indexed_topic(1, [0u8; 32])]
    #[case::extra_topic(3, [0u8; 32])]
    #[case::dirty_padding(2, [0xffu8; 32])]
    fn layout_mismatch_is_malformed(#[case] topic_count: usize, #[case] word: [u8; 32]) {
        let rule = created_rule();
        let mut topics = vec![rule.topic];
        topics.extend(std::iter::repeat(H256(word)).take(topic_count - 1));
        let err = receipt(vec![log(topics, vec![])]).extract_address(&rule).unwrap_err();
        assert!(matches!(err, ChainError::MalformedLog { .. }), "got: {err:?}");
    }
}
