//! Utilities for sending and waiting on transactions

use alloy::primitives::TxHash;
use tracing::{debug, warn};

use crate::{
    ledger::{Ledger, LedgerError, LedgerReceipt, TxPayload},
    types::ConfirmationPolicy,
};

/// Submit a transaction and wait until it is confirmed under the given policy
pub async fn send_tx<L: Ledger>(
    ledger: &mut L,
    payload: TxPayload,
    policy: &ConfirmationPolicy,
) -> Result<LedgerReceipt, LedgerError> {
    let tx_hash = ledger.submit(payload).await?;
    debug!("submitted transaction {tx_hash:#x}");

    let receipt = wait_for_confirmation(ledger, tx_hash, policy).await?;
    if !receipt.status {
        return Err(LedgerError::Reverted(tx_hash));
    }

    Ok(receipt)
}

/// Poll the ledger until the transaction's receipt is buried under
/// `policy.confirmations` blocks, or until `policy.timeout_blocks` blocks
/// pass without that happening.
///
/// A receipt with a failure status is returned as soon as it is seen. If the
/// head does not move for `policy.stall_polls` consecutive polls, the chain
/// only mines on demand: a mined receipt is accepted at its current depth,
/// and a missing one times out
pub async fn wait_for_confirmation<L: Ledger>(
    ledger: &L,
    tx_hash: TxHash,
    policy: &ConfirmationPolicy,
) -> Result<LedgerReceipt, LedgerError> {
    let start = ledger.block_number().await?;
    let confirmations = policy.confirmations.max(1);
    let stall_polls = policy.stall_polls.max(1);

    let mut last_head = start;
    let mut stalled_polls = 0;
    loop {
        let head = ledger.block_number().await?;
        if head > last_head {
            last_head = head;
            stalled_polls = 0;
        } else {
            stalled_polls += 1;
        }
        let stalled = stalled_polls >= stall_polls;

        if let Some(receipt) = ledger.receipt(tx_hash).await? {
            if !receipt.status {
                return Ok(receipt);
            }

            let depth = head.saturating_sub(receipt.block_number) + 1;
            if depth >= confirmations {
                return Ok(receipt);
            }
            if stalled {
                warn!(
                    "chain head stalled at block {head}, accepting {tx_hash:#x} at depth {depth}"
                );
                return Ok(receipt);
            }
        }

        let blocks_waited = head.saturating_sub(start);
        if blocks_waited >= policy.timeout_blocks || stalled {
            return Err(LedgerError::Timeout { blocks_waited });
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{Address, Bytes};

    use super::*;
    use crate::mock::MockLedger;

    fn policy(confirmations: u64, timeout_blocks: u64) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations,
            timeout_blocks,
            stall_polls: 3,
            poll_interval: Duration::ZERO,
        }
    }

    fn call() -> TxPayload {
        TxPayload::Call {
            to: Address::repeat_byte(1),
            data: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_waits_for_confirmations() {
        let mut ledger = MockLedger::new();
        let receipt = send_tx(&mut ledger, call(), &policy(3, 100)).await.unwrap();

        assert!(receipt.status);
        assert!(ledger.head() >= receipt.block_number + 2);
    }

    #[tokio::test]
    async fn test_times_out_when_never_mined() {
        let mut ledger = MockLedger::new();
        ledger.never_mine(0);

        let err = send_tx(&mut ledger, call(), &policy(1, 5)).await.unwrap_err();
        assert_eq!(err, LedgerError::Timeout { blocks_waited: 5 });
    }

    #[tokio::test]
    async fn test_revert_is_reported() {
        let mut ledger = MockLedger::new();
        ledger.revert(0);

        let err = send_tx(&mut ledger, call(), &policy(2, 100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let mut ledger = MockLedger::new();
        ledger.reject(0, "insufficient balance");

        let err = send_tx(&mut ledger, call(), &policy(2, 100)).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("insufficient balance".to_string()));
        assert_eq!(ledger.submissions().len(), 0);
    }

    #[tokio::test]
    async fn test_stalled_head_accepts_mined_receipt() {
        let mut ledger = MockLedger::automine();
        let policy = ConfirmationPolicy {
            poll_interval: Duration::ZERO,
            ..ConfirmationPolicy::default()
        };

        let receipt = send_tx(&mut ledger, call(), &policy).await.unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.block_number, ledger.head());
    }

    #[tokio::test]
    async fn test_stalled_head_times_out_when_never_mined() {
        let mut ledger = MockLedger::automine();
        ledger.never_mine(0);

        let err = send_tx(&mut ledger, call(), &policy(2, 100)).await.unwrap_err();
        assert_eq!(err, LedgerError::Timeout { blocks_waited: 0 });
    }
}
