//! Integration tests for concurrent submission and sealing through a shared LedgerService

use medchain::transaction::payload_from;
use medchain::{Ledger, LedgerService};
use std::collections::HashSet;

const WRITERS: usize = 4;
const PER_WRITER: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_and_seals_lose_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let service = LedgerService::new(Ledger::new(1)?);

    let mut writers = Vec::new();
    for w in 0..WRITERS {
        let service = service.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..PER_WRITER {
                service.add_transaction(
                    format!("doc{}", w),
                    "pat1",
                    payload_from([("seq", format!("{}-{}", w, i))]),
                );
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut sealers = Vec::new();
    for _ in 0..3 {
        let service = service.clone();
        sealers.push(tokio::spawn(async move {
            for _ in 0..5 {
                service.seal_pending_block_async().await?;
            }
            Ok::<_, medchain::ChainError>(())
        }));
    }

    for writer in writers {
        writer.await?;
    }
    for sealer in sealers {
        sealer.await??;
    }
    // Sweep up anything queued after the last seal.
    service.seal_pending_block_async().await?;

    assert!(service.validate());
    assert!(service.pending_transactions().is_empty());
    assert_eq!(service.stats().blocks, 1 + 3 * 5 + 1);

    let seqs: Vec<String> = service
        .records_for("pat1")
        .into_iter()
        .map(|r| r.payload["seq"].clone())
        .collect();
    assert_eq!(seqs.len(), WRITERS * PER_WRITER);
    let unique: HashSet<&String> = seqs.iter().collect();
    assert_eq!(unique.len(), seqs.len());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_per_writer_order_is_preserved() -> Result<(), Box<dyn std::error::Error>> {
    let service = LedgerService::new(Ledger::new(1)?);

    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for i in 0..40 {
                service.add_transaction("doc1", "pat1", payload_from([("seq", i.to_string())]));
                if i % 10 == 9 {
                    service.seal_pending_block_async().await?;
                }
            }
            Ok::<_, medchain::ChainError>(())
        })
    };
    let reader = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                assert!(service.validate());
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await??;
    reader.await?;

    let seqs: Vec<u32> = service
        .records_for("pat1")
        .into_iter()
        .map(|r| r.payload["seq"].parse().unwrap())
        .collect();
    assert_eq!(seqs, (0..40).collect::<Vec<u32>>());
    assert_eq!(service.stats().blocks, 5);

    let chain = service.with_ledger(|ledger| ledger.chain().to_vec());
    for pair in chain.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash);
    }
    Ok(())
}
