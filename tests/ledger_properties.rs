//! Integration tests for ledger behaviour: sealing, linkage, queries and tamper detection

use medchain::blockchain::{IssueKind, GENESIS_PREVIOUS_HASH};
use medchain::transaction::payload_from;
use medchain::{ChainError, HealthRecord, Ledger, LedgerService};

/// Helper to build a ledger with a handful of sealed blocks
fn sealed_ledger(blocks: usize) -> Result<Ledger, Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    for i in 0..blocks {
        ledger.add_transaction(
            format!("doc{}", i),
            "pat1",
            payload_from([("diagnosis", format!("visit {}", i))]),
        );
        ledger.seal_pending_block()?;
    }
    Ok(ledger)
}

#[test]
fn test_end_to_end_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    ledger.add_transaction(
        "doc1",
        "pat1",
        payload_from([("diagnosis", "flu"), ("treatment", "rest")]),
    );
    let block = ledger.seal_pending_block()?;

    assert_eq!(block.index, 1);
    assert!(block.hash.starts_with('0'));
    assert_eq!(block.previous_hash, ledger.genesis().hash);
    assert!(ledger.pending_transactions().is_empty());

    let records = ledger.records_for("pat1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "doc1");
    assert_eq!(records[0].payload["diagnosis"], "flu");
    assert_eq!(records[0].payload["treatment"], "rest");
    assert!(ledger.validate());

    Ok(())
}

#[test]
fn test_every_block_links_to_its_predecessor() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = sealed_ledger(5)?;
    let chain = ledger.chain();

    assert_eq!(chain[0].index, 0);
    assert_eq!(chain[0].previous_hash, GENESIS_PREVIOUS_HASH);
    for pair in chain.windows(2) {
        assert_eq!(pair[1].index, pair[0].index + 1);
        assert_eq!(pair[1].previous_hash, pair[0].hash);
        assert_eq!(pair[1].calculate_hash()?, pair[1].hash);
        assert!(pair[1].meets_difficulty(1));
    }

    Ok(())
}

#[test]
fn test_seal_takes_whole_pool_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    for sender in ["a", "b", "c"] {
        ledger.add_transaction(sender, "pat1", payload_from([("notes", sender)]));
    }
    let block = ledger.seal_pending_block()?;

    let senders: Vec<&str> = block.transactions.iter().map(|tx| tx.sender.as_str()).collect();
    assert_eq!(senders, vec!["a", "b", "c"]);
    assert!(ledger.pending_transactions().is_empty());

    Ok(())
}

#[test]
fn test_records_span_blocks_and_skip_other_recipients() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    ledger.add_transaction("doc1", "pat1", payload_from([("diagnosis", "flu")]));
    ledger.add_transaction("doc1", "pat2", payload_from([("diagnosis", "sprain")]));
    ledger.seal_pending_block()?;
    ledger.add_transaction("doc2", "pat1", payload_from([("diagnosis", "cold")]));
    ledger.seal_pending_block()?;
    ledger.add_transaction("doc3", "pat1", payload_from([("diagnosis", "pending")]));

    let diagnoses: Vec<String> = ledger
        .records_for("pat1")
        .into_iter()
        .map(|r| r.payload["diagnosis"].clone())
        .collect();
    assert_eq!(diagnoses, vec!["flu", "cold"]);
    assert!(ledger.records_for("nobody").is_empty());

    Ok(())
}

#[test]
fn test_tampered_payload_is_detected() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = sealed_ledger(3)?;
    let mut state = ledger.state();
    state.chain[2]
        .transactions[0]
        .payload
        .insert("diagnosis".to_string(), "healthy".to_string());

    let tampered = Ledger::from_state(state)?;
    assert!(!tampered.validate());

    let issues = tampered.validation_report();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].index, 2);
    assert_eq!(issues[0].kind, IssueKind::HashMismatch);

    Ok(())
}

#[test]
fn test_resealed_tamper_breaks_the_next_link() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = sealed_ledger(3)?;
    let mut state = ledger.state();
    state.chain[1].transactions[0].sender = "impostor".to_string();
    state.chain[1].seal(1)?;

    let tampered = Ledger::from_state(state)?;
    assert!(!tampered.validate());
    let issues = tampered.validation_report();
    assert_eq!(issues[0].index, 2);
    assert_eq!(issues[0].kind, IssueKind::BrokenLink);

    Ok(())
}

#[test]
fn test_genesis_only_chain_is_valid() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Ledger::new(2)?;
    assert_eq!(ledger.block_count(), 1);
    assert!(ledger.validate());
    assert!(ledger.records_for("pat1").is_empty());
    Ok(())
}

#[test]
fn test_difficulty_above_hash_width_is_rejected() {
    assert_eq!(Ledger::new(65).unwrap_err(), ChainError::InvalidDifficulty(65));
}

#[test]
fn test_service_files_health_records() -> Result<(), Box<dyn std::error::Error>> {
    let service = LedgerService::new(Ledger::new(1)?);
    service.record_and_seal(
        "dr_house",
        "pat1",
        HealthRecord::new("lupus", "steroids").with_date("2024-05-01"),
    )?;
    service.record_and_seal("dr_wilson", "pat1", HealthRecord::new("cold", "rest"))?;

    let records = service.patient_records("pat1");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].doctor, "dr_house");
    assert_eq!(records[0].diagnosis, "lupus");
    assert_eq!(records[0].notes, "");
    assert_eq!(records[1].doctor, "dr_wilson");
    assert!(!records[1].date.is_empty());
    assert_eq!(service.stats().sealed_transactions, 2);

    Ok(())
}
