//! End-to-end ledger scenarios over an on-disk SQLite block store

use ledgerchain::blockchain::{AddBlockOutcome, Block, Blockchain, TransferRequest, NULL_HASH};
use ledgerchain::config::ChainConfig;
use ledgerchain::crypto::KeyPair;
use ledgerchain::error::ChainError;
use ledgerchain::miner::{self, verify_pow};
use ledgerchain::persistence::{BlockStore, Database};
use ledgerchain::transaction::{Transaction, TxInput, TxOutput};
use tempfile::TempDir;

fn test_config() -> ChainConfig {
    ChainConfig {
        difficulty: 4,
        genesis_reward: 10,
        block_reward: 10,
    }
}

fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes(&[seed; 32]).expect("valid test secret")
}

fn open_db(dir: &TempDir) -> Result<Database, ChainError> {
    let path = dir.path().join("ledger.db");
    Database::open(path.to_str().expect("utf-8 temp path"))
}

fn total_minted(chain: &Blockchain) -> Result<u64, ChainError> {
    let mut minted = 0;
    for block in chain.iter() {
        minted += block?
            .transactions
            .iter()
            .filter(|tx| tx.is_coinbase())
            .filter_map(|tx| tx.total_output())
            .sum::<u64>();
    }
    Ok(minted)
}

fn total_unspent(chain: &Blockchain) -> Result<u64, ChainError> {
    Ok(chain
        .all_utxos()?
        .values()
        .flatten()
        .map(|utxo| utxo.output.value)
        .sum())
}

/// Mined block on the current tip paying the reward to `beneficiary`, built
/// without the checks `mine_block` applies to `transfers`.
fn forge_block(
    chain: &Blockchain,
    beneficiary: &KeyPair,
    transfers: Vec<Transaction>,
) -> Result<Block, ChainError> {
    let tip = chain.tip_block()?;
    let height = tip.header.height + 1;
    let mut txs = vec![Transaction::new_coinbase(
        beneficiary.pub_key_hash(),
        chain.config.block_reward,
        height,
        "block reward",
    )];
    txs.extend(transfers);
    miner::mine_block(Block::new(height, tip.hash(), chain.config.difficulty, txs))
}

fn assert_conserved(chain: &Blockchain) -> Result<(), ChainError> {
    assert_eq!(total_unspent(chain)?, total_minted(chain)?);
    Ok(())
}

#[test]
fn test_balances_after_two_transfer_blocks() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, c, d) = (keypair(1), keypair(2), keypair(3), keypair(4));

    let mut chain = Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    let tx = chain.new_transfer(&a, &b.address(), 4, &[])?;
    chain.mine_and_commit(&c.address(), vec![tx])?;

    let tx = chain.new_transfer(&b, &d.address(), 3, &[])?;
    chain.mine_and_commit(&c.address(), vec![tx])?;

    assert_eq!(chain.balance(&a.address())?, 6);
    assert_eq!(chain.balance(&b.address())?, 1);
    assert_eq!(chain.balance(&c.address())?, 20);
    assert_eq!(chain.balance(&d.address())?, 3);
    assert_eq!(total_unspent(&chain)?, 30);
    assert_eq!(total_minted(&chain)?, 30);
    assert_eq!(chain.height()?, 2);

    Ok(())
}

#[test]
fn test_chain_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b) = (keypair(1), keypair(2));

    let tip = {
        let mut chain =
            Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;
        let tx = chain.new_transfer(&a, &b.address(), 7, &[])?;
        chain.mine_and_commit(&a.address(), vec![tx])?;
        chain.tip()
    };

    let chain = Blockchain::open(Box::new(open_db(&dir)?), test_config())?;
    assert_eq!(chain.tip(), tip);
    assert_eq!(chain.balance(&a.address())?, 13);
    assert_eq!(chain.balance(&b.address())?, 7);

    let again = Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &b.address());
    assert!(matches!(again, Err(ChainError::AlreadyInitialized)));

    Ok(())
}

#[test]
fn test_iteration_visits_height_plus_one_blocks() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let miner = keypair(3);
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &miner.address())?;
    for _ in 0..4 {
        chain.mine_and_commit(&miner.address(), vec![])?;
    }

    let blocks = chain.blocks()?;
    assert_eq!(chain.height()?, 4);
    assert_eq!(blocks.len() as u64, chain.height()? + 1);
    assert_eq!(blocks.last().map(|b| b.header.previous_hash), Some(NULL_HASH));
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].header.previous_hash, pair[1].hash());
        assert_eq!(pair[0].header.height, pair[1].header.height + 1);
    }

    Ok(())
}

#[test]
fn test_add_block_fork_choice_by_height() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (miner, rival) = (keypair(3), keypair(5));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &miner.address())?;

    let ours = chain.mine_block(&miner.address(), vec![])?;
    let theirs = chain.mine_block(&rival.address(), vec![])?;

    assert_eq!(chain.add_block(&ours)?, AddBlockOutcome::NewTip);
    assert_eq!(chain.add_block(&theirs)?, AddBlockOutcome::Stored);
    assert_eq!(chain.tip(), ours.hash());

    // Re-adding is a no-op: same tip, same stored block.
    let stored_before = chain.store().get_block(&ours.hash())?;
    assert_eq!(chain.add_block(&ours)?, AddBlockOutcome::AlreadyKnown);
    assert_eq!(chain.tip(), ours.hash());
    assert_eq!(chain.store().get_block(&ours.hash())?, stored_before);
    assert_eq!(chain.store().get_tip()?, Some(ours.hash()));

    // The orphaned reward never counts toward balances.
    assert_eq!(chain.balance(&rival.address())?, 0);

    Ok(())
}

#[test]
fn test_mining_rejects_tampered_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, mallory) = (keypair(1), keypair(2), keypair(6));
    let chain = Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    let mut tx = chain.new_transfer(&a, &b.address(), 4, &[])?;
    tx.outputs[0].pub_key_hash = mallory.pub_key_hash();
    tx.hash = tx.compute_hash();

    let result = chain.mine_block(&a.address(), vec![tx]);
    assert!(matches!(result, Err(ChainError::VerificationFailed(_))));
    assert_eq!(chain.height()?, 0);

    Ok(())
}

#[test]
fn test_mining_rejects_double_spend_batch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, d) = (keypair(1), keypair(2), keypair(4));
    let chain = Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    // Both built against committed state only, so both spend the genesis output.
    let first = chain.new_transfer(&a, &b.address(), 4, &[])?;
    let second = chain.new_transfer(&a, &d.address(), 5, &[])?;

    let result = chain.mine_block(&a.address(), vec![first, second]);
    assert!(matches!(result, Err(ChainError::DoubleSpendDetected(_))));

    Ok(())
}

#[test]
fn test_batched_transfers_in_one_block() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, c, d) = (keypair(1), keypair(2), keypair(3), keypair(4));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    let txs = chain.build_transfers(&[
        TransferRequest { from: a.clone(), to: b.address(), amount: 4 },
        TransferRequest { from: a.clone(), to: d.address(), amount: 5 },
    ])?;
    chain.mine_and_commit(&c.address(), txs)?;

    assert_eq!(chain.balance(&a.address())?, 1);
    assert_eq!(chain.balance(&b.address())?, 4);
    assert_eq!(chain.balance(&d.address())?, 5);
    assert_eq!(total_unspent(&chain)?, total_minted(&chain)?);

    Ok(())
}

#[test]
fn test_spendable_exact_and_one_over() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, c) = (keypair(1), keypair(3));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;
    chain.mine_and_commit(&a.address(), vec![])?;
    chain.mine_and_commit(&c.address(), vec![])?;

    let balance = chain.balance(&a.address())?;
    assert_eq!(balance, 20);

    let (total, selected) = chain.spendable_utxos(&a.address(), balance, &[])?;
    assert_eq!(total, balance);
    let mut selected_sum = 0;
    for (tx_hash, indices) in &selected {
        let tx = chain.find_transaction(tx_hash, &[])?;
        selected_sum += indices.iter().map(|i| tx.outputs[*i].value).sum::<u64>();
    }
    assert_eq!(selected_sum, balance);

    let over = chain.spendable_utxos(&a.address(), balance + 1, &[]);
    assert!(matches!(
        over,
        Err(ChainError::InsufficientFunds { requested: 21, available: 20, .. })
    ));

    Ok(())
}

#[test]
fn test_add_block_rejects_forged_signature() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, mallory) = (keypair(1), keypair(6));
    let store = open_db(&dir)?;
    let mut chain = Blockchain::create_genesis(Box::new(store), test_config(), &a.address())?;
    let genesis_tx = chain.tip_block()?.transactions[0].clone();

    let mut theft = Transaction::new(
        vec![TxInput::new(genesis_tx.hash, 0, a.public_key_bytes().to_vec())],
        vec![TxOutput::new(10, mallory.pub_key_hash())],
    );
    theft.inputs[0].signature = vec![7u8; 64];

    let block = forge_block(&chain, &mallory, vec![theft])?;
    assert!(matches!(chain.add_block(&block), Err(ChainError::VerificationFailed(_))));

    assert!(!chain.store().contains_block(&block.hash())?);
    assert_eq!(chain.height()?, 0);
    assert_eq!(chain.balance(&a.address())?, 10);
    assert_eq!(chain.balance(&mallory.address())?, 0);
    assert_conserved(&chain)?;

    Ok(())
}

#[test]
fn test_add_block_rejects_missing_proof_of_work() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let miner_key = keypair(3);
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &miner_key.address())?;

    let mut unmined = forge_block(&chain, &miner_key, vec![])?;
    while verify_pow(&unmined) {
        unmined.header.nonce += 1;
    }

    assert!(matches!(chain.add_block(&unmined), Err(ChainError::VerificationFailed(_))));
    assert!(!chain.store().contains_block(&unmined.hash())?);
    assert_eq!(chain.store().get_tip()?, Some(chain.tip()));
    assert_eq!(chain.height()?, 0);

    Ok(())
}

#[test]
fn test_committed_transfer_cannot_be_replayed() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, c) = (keypair(1), keypair(2), keypair(3));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    let tx = chain.new_transfer(&a, &b.address(), 4, &[])?;
    chain.mine_and_commit(&c.address(), vec![tx.clone()])?;

    let replay = chain.mine_block(&c.address(), vec![tx.clone()]);
    assert!(matches!(replay, Err(ChainError::DoubleSpendDetected(_))));

    let block = forge_block(&chain, &c, vec![tx])?;
    assert!(matches!(chain.add_block(&block), Err(ChainError::DoubleSpendDetected(_))));

    assert_eq!(chain.height()?, 1);
    assert_eq!(chain.balance(&a.address())?, 6);
    assert_eq!(chain.balance(&b.address())?, 4);
    assert_conserved(&chain)?;

    Ok(())
}

#[test]
fn test_output_spent_in_earlier_block_cannot_be_spent_again() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, c, d) = (keypair(1), keypair(2), keypair(3), keypair(4));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;
    let genesis_tx = chain.tip_block()?.transactions[0].clone();

    let to_b = chain.new_transfer(&a, &b.address(), 10, &[])?;
    chain.mine_and_commit(&c.address(), vec![to_b])?;

    // Correctly signed, but the genesis output is already consumed on chain.
    let mut to_d = Transaction::new(
        vec![TxInput::new(genesis_tx.hash, 0, a.public_key_bytes().to_vec())],
        vec![TxOutput::new(10, d.pub_key_hash())],
    );
    chain.sign_transaction(&mut to_d, &a, &[])?;
    assert!(chain.verify_transaction(&to_d, &[]).is_ok());

    let result = chain.mine_block(&c.address(), vec![to_d.clone()]);
    assert!(matches!(result, Err(ChainError::DoubleSpendDetected(_))));

    let block = forge_block(&chain, &c, vec![to_d])?;
    assert!(matches!(chain.add_block(&block), Err(ChainError::DoubleSpendDetected(_))));

    assert_eq!(chain.height()?, 1);
    assert_eq!(chain.balance(&a.address())?, 0);
    assert_eq!(chain.balance(&b.address())?, 10);
    assert_eq!(chain.balance(&d.address())?, 0);
    assert_conserved(&chain)?;

    Ok(())
}

#[test]
fn test_fork_block_validated_against_its_own_branch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (a, b, c) = (keypair(1), keypair(2), keypair(3));
    let mut chain =
        Blockchain::create_genesis(Box::new(open_db(&dir)?), test_config(), &a.address())?;

    // Two rival height-1 blocks: one spends genesis to B, the other is empty.
    let to_b = chain.new_transfer(&a, &b.address(), 10, &[])?;
    let spending = chain.mine_block(&c.address(), vec![to_b.clone()])?;
    let empty = chain.mine_block(&b.address(), vec![])?;
    assert_eq!(chain.add_block(&spending)?, AddBlockOutcome::NewTip);
    assert_eq!(chain.add_block(&empty)?, AddBlockOutcome::Stored);

    // On the empty branch the genesis output is still unspent, so the same
    // transfer is valid there and the longer branch takes over.
    let mut extension = Block::new(
        2,
        empty.hash(),
        chain.config.difficulty,
        vec![
            Transaction::new_coinbase(c.pub_key_hash(), chain.config.block_reward, 2, "block reward"),
            to_b,
        ],
    );
    extension = miner::mine_block(extension)?;
    assert_eq!(chain.add_block(&extension)?, AddBlockOutcome::NewTip);

    assert_eq!(chain.height()?, 2);
    assert_eq!(chain.balance(&b.address())?, 20);
    assert_eq!(chain.balance(&a.address())?, 0);
    assert_conserved(&chain)?;

    Ok(())
}
