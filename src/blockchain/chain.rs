use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};
use thiserror::Error;

use super::block::{Block, BlockError};
use super::crypto::{self, SignatureError};
use super::payload::{Payload, PayloadError, WalletRegistration};

/// `previous_hash` of the genesis block, and `last_hash` of an empty ledger
pub const GENESIS_SENTINEL: &str = "deadbeef";

/// How many trailing blocks `iterate_from` yields when the start hash is unknown
pub const RECENT_WINDOW: usize = 1024;

/// Reasons a candidate block is rejected by [`Ledger::append`]
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Difficulty not met: hash {hash} does not start with {difficulty:?}")]
    DifficultyNotMet { hash: String, difficulty: String },

    #[error("Previous hash mismatch: expected {expected}, got {got}")]
    PrevHashMismatch { expected: String, got: String },

    #[error("Duplicate wallet registration for {0}")]
    DuplicateWalletRegistration(String),

    #[error("Missing wallet registration for {0}")]
    MissingWalletRegistration(String),

    #[error("Invalid signature from {0}")]
    InvalidSignature(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),
}

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid block: {0}")]
    Validation(#[from] ValidationError),

    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Ledger already has a genesis block")]
    AlreadyInitialized,
}

/// Expected number of mining attempts for a hex prefix of this length
pub fn expected_attempts(difficulty: &str) -> u64 {
    16u64.saturating_pow(difficulty.len() as u32)
}

/// Attempt cap used when none is configured
pub fn default_max_attempts(difficulty: &str) -> u64 {
    expected_attempts(difficulty).saturating_mul(64)
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<Arc<Block>>,

    /// Hash of `blocks[i]`, computed once on acceptance
    hashes: Vec<String>,

    /// Issuer to index of its registration block
    registrations: HashMap<String, usize>,
}

impl ChainState {
    fn tip_hash(&self) -> &str {
        self.hashes.last().map(String::as_str).unwrap_or(GENESIS_SENTINEL)
    }

    fn registration_key(&self, issuer: &str) -> Option<&str> {
        let index = *self.registrations.get(issuer)?;
        match self.blocks[index].payload() {
            Some(Payload::WalletRegistration(data)) => Some(data.public_key.as_str()),
            _ => None,
        }
    }

    /// Checks difficulty, then linkage, then authorization. The candidate's
    /// payload must already be decoded.
    fn validate(&self, candidate: &Block, hash: &str, difficulty: &str) -> Result<(), ValidationError> {
        // Genesis is exempt from the difficulty rule
        if !self.blocks.is_empty() && !hash.starts_with(difficulty) {
            return Err(ValidationError::DifficultyNotMet {
                hash: hash.to_string(),
                difficulty: difficulty.to_string(),
            });
        }

        if candidate.previous_hash != self.tip_hash() {
            return Err(ValidationError::PrevHashMismatch {
                expected: self.tip_hash().to_string(),
                got: candidate.previous_hash.clone(),
            });
        }

        if candidate.is_wallet_registration() {
            if self.registrations.contains_key(&candidate.issuer) {
                return Err(ValidationError::DuplicateWalletRegistration(
                    candidate.issuer.clone(),
                ));
            }
            return Ok(());
        }

        let public_key = self
            .registration_key(&candidate.issuer)
            .ok_or_else(|| ValidationError::MissingWalletRegistration(candidate.issuer.clone()))?;

        if !crypto::verify(candidate.payload_json.as_bytes(), &candidate.signature, public_key) {
            return Err(ValidationError::InvalidSignature(candidate.issuer.clone()));
        }

        Ok(())
    }

    fn push(&mut self, block: Block, hash: String) {
        if block.is_wallet_registration() {
            self.registrations.insert(block.issuer.clone(), self.blocks.len());
        }
        self.blocks.push(Arc::new(block));
        self.hashes.push(hash);
    }
}

/// Represents the ledger: an append-only chain of validated blocks.
///
/// Cloning yields another handle to the same chain. Every mutation runs
/// check-then-push under the write lock; readers work on snapshots.
#[derive(Debug, Clone)]
pub struct Ledger {
    state: Arc<RwLock<ChainState>>,

    /// Serializes local mining so two miners never build on the same tip
    mining: Arc<Mutex<()>>,

    /// Hex prefix every non-genesis block hash must start with
    difficulty: String,

    /// Nonce search cap for local mining
    max_attempts: u64,
}

impl Ledger {
    /// Creates an empty ledger with the given difficulty prefix
    pub fn new(difficulty: &str) -> Self {
        Self::with_max_attempts(difficulty, default_max_attempts(difficulty))
    }

    pub fn with_max_attempts(difficulty: &str, max_attempts: u64) -> Self {
        Ledger {
            state: Arc::new(RwLock::new(ChainState::default())),
            mining: Arc::new(Mutex::new(())),
            difficulty: difficulty.to_string(),
            max_attempts,
        }
    }

    // A poisoned lock still holds a consistent chain: `push` cannot panic
    // between its writes.
    fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn difficulty(&self) -> &str {
        &self.difficulty
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    pub fn len(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().blocks.is_empty()
    }

    /// Mines and installs the administrator's registration as the first block.
    ///
    /// `sign_fn` signs the registration payload JSON with `private_key`.
    pub fn insert_genesis<F>(
        &self,
        admin_identity: &str,
        public_key: &str,
        private_key: &str,
        sign_fn: F,
    ) -> Result<Block, LedgerError>
    where
        F: FnOnce(&[u8], &str) -> Result<String, SignatureError>,
    {
        let _mining = self.mining.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.write();

        if !state.blocks.is_empty() {
            return Err(LedgerError::AlreadyInitialized);
        }

        let payload = Payload::from(WalletRegistration {
            public_key: public_key.to_string(),
        });
        let signature = sign_fn(payload.serialize().as_bytes(), private_key)?;

        let block = Block::mine(
            &self.difficulty,
            admin_identity,
            payload,
            &signature,
            GENESIS_SENTINEL,
            self.max_attempts,
        )?;

        let hash = block.hash();
        state.validate(&block, &hash, &self.difficulty)?;
        state.push(block.clone(), hash.clone());

        info!("Installed genesis block {} for {}", hash, admin_identity);
        Ok(block)
    }

    /// Validates `candidate` against the current tip and appends it.
    ///
    /// Either the block is appended or the ledger is left untouched. The
    /// payload is always re-decoded from `payload_json`; a cached value is
    /// never trusted.
    pub fn append(&self, mut candidate: Block) -> Result<(), ValidationError> {
        candidate.decode_payload()?;

        let hash = candidate.hash();
        let mut state = self.write();

        if let Err(err) = state.validate(&candidate, &hash, &self.difficulty) {
            warn!("Rejected block {} from {}: {}", hash, candidate.issuer, err);
            return Err(err);
        }

        info!(
            "Accepted block #{} {} from {}",
            state.blocks.len(),
            hash,
            candidate.issuer
        );
        state.push(candidate, hash);

        Ok(())
    }

    /// Mines `payload` on top of the current tip and appends the result
    pub fn mine_and_append(
        &self,
        issuer: &str,
        payload: Payload,
        signature: &str,
    ) -> Result<Block, LedgerError> {
        let _mining = self.mining.lock().unwrap_or_else(PoisonError::into_inner);

        let block = Block::mine(
            &self.difficulty,
            issuer,
            payload,
            signature,
            &self.last_hash(),
            self.max_attempts,
        )?;
        self.append(block.clone())?;

        Ok(block)
    }

    /// Hash of the tip block, or [`GENESIS_SENTINEL`] while the ledger is empty
    pub fn last_hash(&self) -> String {
        self.read().tip_hash().to_string()
    }

    /// Snapshot of every accepted block, in chain order
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.read().blocks.clone()
    }

    /// Blocks tagged `type_tag` that satisfy `predicate`, in chain order.
    ///
    /// Each call scans a fresh snapshot.
    pub fn find<P>(&self, type_tag: &str, predicate: P) -> Find<P>
    where
        P: FnMut(&Block) -> bool,
    {
        Find {
            blocks: self.blocks(),
            position: 0,
            type_tag: type_tag.to_string(),
            predicate,
        }
    }

    /// The registration block of `issuer`, if any
    pub fn registration_of(&self, issuer: &str) -> Option<Arc<Block>> {
        self.find(Payload::WALLET_REGISTRATION, |block| block.issuer == issuer)
            .next()
    }

    /// Blocks after the one hashed `hash`, with their chain index.
    ///
    /// An empty or unknown hash starts at the last [`RECENT_WINDOW`] blocks.
    pub fn iterate_from(&self, hash: &str) -> IterFrom {
        let state = self.read();

        let found = if hash.is_empty() {
            None
        } else {
            state.hashes.iter().position(|h| h == hash)
        };
        let position = match found {
            Some(index) => index + 1,
            None => state.blocks.len().saturating_sub(RECENT_WINDOW),
        };

        IterFrom {
            blocks: state.blocks.clone(),
            position,
        }
    }

    /// One line per block: index, hash, issuer and the first 80 characters
    /// of the payload JSON
    pub fn dump(&self) -> String {
        self.blocks()
            .iter()
            .enumerate()
            .map(|(index, block)| format!("{} {}\n", index, block))
            .collect()
    }

    /// Replays the whole chain through a fresh ledger
    pub fn is_valid(&self) -> bool {
        let replay = Ledger::with_max_attempts(&self.difficulty, self.max_attempts);

        self.blocks()
            .iter()
            .all(|block| replay.append(Block::clone(block)).is_ok())
    }
}

/// Cursor returned by [`Ledger::find`]
pub struct Find<P> {
    blocks: Vec<Arc<Block>>,
    position: usize,
    type_tag: String,
    predicate: P,
}

impl<P> Iterator for Find<P>
where
    P: FnMut(&Block) -> bool,
{
    type Item = Arc<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(block) = self.blocks.get(self.position) {
            self.position += 1;
            if block.payload_type_tag == self.type_tag && (self.predicate)(block) {
                return Some(Arc::clone(block));
            }
        }

        None
    }
}

/// Cursor returned by [`Ledger::iterate_from`]
pub struct IterFrom {
    blocks: Vec<Arc<Block>>,
    position: usize,
}

impl Iterator for IterFrom {
    type Item = (usize, Arc<Block>);

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.blocks.get(self.position)?;
        self.position += 1;
        Some((self.position - 1, Arc::clone(block)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.blocks.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{generate_keypair, sign, KeyPair};
    use crate::blockchain::payload::Transfer;

    const DIFFICULTY: &str = "00";

    fn transfer(to: &str, item_id: &str, amount: u64) -> Payload {
        Payload::from(Transfer {
            to: to.to_string(),
            item_id: item_id.to_string(),
            amount,
        })
    }

    fn signed(payload: &Payload, keypair: &KeyPair) -> String {
        sign(payload.serialize().as_bytes(), &keypair.private_key).unwrap()
    }

    fn genesis_ledger() -> (Ledger, KeyPair) {
        let ledger = Ledger::new(DIFFICULTY);
        let admin = generate_keypair().unwrap();
        ledger
            .insert_genesis("admin", &admin.public_key, &admin.private_key, sign)
            .unwrap();
        (ledger, admin)
    }

    fn mine_on_tip(ledger: &Ledger, issuer: &str, payload: Payload, signature: &str) -> Block {
        Block::mine(
            DIFFICULTY,
            issuer,
            payload,
            signature,
            &ledger.last_hash(),
            ledger.max_attempts(),
        )
        .unwrap()
    }

    fn registration(keypair: &KeyPair) -> Payload {
        Payload::from(WalletRegistration {
            public_key: keypair.public_key.clone(),
        })
    }

    #[test]
    fn test_new_ledger_is_empty() {
        let ledger = Ledger::new(DIFFICULTY);

        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
        assert_eq!(ledger.last_hash(), GENESIS_SENTINEL);
        assert_eq!(ledger.difficulty(), DIFFICULTY);
        assert_eq!(ledger.iterate_from("").count(), 0);
        assert_eq!(ledger.dump(), "");
    }

    #[test]
    fn test_insert_genesis() {
        let (ledger, admin) = genesis_ledger();

        assert_eq!(ledger.len(), 1);
        let genesis = ledger.blocks()[0].clone();
        assert_eq!(genesis.issuer, "admin");
        assert_eq!(genesis.previous_hash, GENESIS_SENTINEL);
        assert_eq!(
            genesis.payload(),
            Some(&Payload::from(WalletRegistration {
                public_key: admin.public_key.clone()
            }))
        );
        assert_eq!(ledger.last_hash(), genesis.hash());
        assert!(ledger.registration_of("admin").is_some());
    }

    #[test]
    fn test_insert_genesis_twice() {
        let (ledger, admin) = genesis_ledger();

        let result = ledger.insert_genesis("admin", &admin.public_key, &admin.private_key, sign);
        assert!(matches!(result, Err(LedgerError::AlreadyInitialized)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_transfer_then_stale_previous_hash() {
        let (ledger, admin) = genesis_ledger();
        let genesis_hash = ledger.last_hash();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let block = mine_on_tip(&ledger, "admin", payload.clone(), &signature);
        ledger.append(block).unwrap();
        assert_eq!(ledger.len(), 2);

        // Built on genesis instead of the tip
        let stale = Block::mine(
            DIFFICULTY,
            "admin",
            transfer("carol", "x2", 1),
            &signed(&transfer("carol", "x2", 1), &admin),
            &genesis_hash,
            ledger.max_attempts(),
        )
        .unwrap();

        let result = ledger.append(stale);
        assert!(matches!(result, Err(ValidationError::PrevHashMismatch { .. })));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_mine_and_append() {
        let (ledger, admin) = genesis_ledger();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let block = ledger.mine_and_append("admin", payload, &signature).unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last_hash(), block.hash());
        assert!(block.hash().starts_with(DIFFICULTY));
    }

    #[test]
    fn test_difficulty_not_met() {
        let (ledger, admin) = genesis_ledger();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let tip = ledger.last_hash();

        let weak = (0..)
            .map(|nonce| Block::make("admin", payload.clone(), &signature, nonce, &tip))
            .find(|block| !block.meets_difficulty(DIFFICULTY))
            .unwrap();

        let result = ledger.append(weak);
        assert!(matches!(result, Err(ValidationError::DifficultyNotMet { .. })));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_unregistered_issuer() {
        let (ledger, _admin) = genesis_ledger();
        let mallory = generate_keypair().unwrap();

        let payload = transfer("mallory", "x1", 100);
        let signature = signed(&payload, &mallory);
        let block = mine_on_tip(&ledger, "mallory", payload, &signature);

        let result = ledger.append(block);
        assert!(matches!(
            result,
            Err(ValidationError::MissingWalletRegistration(issuer)) if issuer == "mallory"
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_duplicate_registration() {
        let (ledger, _admin) = genesis_ledger();
        let alice = generate_keypair().unwrap();

        let block = mine_on_tip(&ledger, "alice", registration(&alice), "");
        ledger.append(block).unwrap();

        let other = generate_keypair().unwrap();
        let again = mine_on_tip(&ledger, "alice", registration(&other), "");
        let result = ledger.append(again);

        assert!(matches!(
            result,
            Err(ValidationError::DuplicateWalletRegistration(issuer)) if issuer == "alice"
        ));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_invalid_signature() {
        let (ledger, _admin) = genesis_ledger();
        let impostor = generate_keypair().unwrap();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &impostor);
        let block = mine_on_tip(&ledger, "admin", payload, &signature);

        assert!(matches!(
            ledger.append(block),
            Err(ValidationError::InvalidSignature(_))
        ));

        let garbage = mine_on_tip(&ledger, "admin", transfer("bob", "x1", 5), "not base64!");
        assert!(matches!(
            ledger.append(garbage),
            Err(ValidationError::InvalidSignature(_))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_registered_wallet_can_transfer() {
        let (ledger, _admin) = genesis_ledger();
        let alice = generate_keypair().unwrap();

        ledger
            .mine_and_append("alice", registration(&alice), "")
            .unwrap();

        let payload = transfer("bob", "x9", 3);
        let signature = signed(&payload, &alice);
        ledger.mine_and_append("alice", payload, &signature).unwrap();

        assert_eq!(ledger.len(), 3);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_decodes_wire_block() {
        let (ledger, admin) = genesis_ledger();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let block = mine_on_tip(&ledger, "admin", payload, &signature);

        let wire = Block::parse(&block.serialize().unwrap()).unwrap();
        assert!(wire.payload().is_none());

        ledger.append(wire).unwrap();
        assert!(ledger.blocks()[1].payload().is_some());
    }

    #[test]
    fn test_append_unknown_payload_type() {
        let (ledger, admin) = genesis_ledger();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let mut block = mine_on_tip(&ledger, "admin", payload, &signature);
        block.payload_type_tag = "Mystery".to_string();
        let wire = Block::parse(&block.serialize().unwrap()).unwrap();

        assert!(matches!(
            ledger.append(wire),
            Err(ValidationError::MalformedPayload(PayloadError::UnknownPayloadType(_)))
        ));
    }

    #[test]
    fn test_append_decodes_payload_json_over_cache() {
        let (ledger, _admin) = genesis_ledger();
        let cached = generate_keypair().unwrap();
        let actual = generate_keypair().unwrap();

        // Cache holds `cached`'s key while the JSON carries `actual`'s
        let mut block = Block::make("eve", registration(&cached), "", 0, &ledger.last_hash());
        block.payload_json = registration(&actual).serialize();
        while !block.meets_difficulty(DIFFICULTY) {
            block.nonce += 1;
        }
        ledger.append(block).unwrap();

        let stored = ledger.registration_of("eve").unwrap();
        assert_eq!(stored.payload(), Some(&registration(&actual)));

        let payload = transfer("bob", "x1", 5);
        let stale = mine_on_tip(&ledger, "eve", payload.clone(), &signed(&payload, &cached));
        assert!(matches!(
            ledger.append(stale),
            Err(ValidationError::InvalidSignature(_))
        ));

        let fresh = mine_on_tip(&ledger, "eve", payload.clone(), &signed(&payload, &actual));
        ledger.append(fresh).unwrap();
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_find_is_restartable() {
        let (ledger, _admin) = genesis_ledger();
        for name in ["alice", "bob"] {
            let keypair = generate_keypair().unwrap();
            ledger.mine_and_append(name, registration(&keypair), "").unwrap();
        }

        let all: Vec<String> = ledger
            .find(Payload::WALLET_REGISTRATION, |_| true)
            .map(|block| block.issuer.clone())
            .collect();
        assert_eq!(all, vec!["admin", "alice", "bob"]);

        let mut cursor = ledger.find(Payload::WALLET_REGISTRATION, |block| block.issuer != "admin");
        assert_eq!(cursor.next().unwrap().issuer, "alice");

        // A second call starts over
        let fresh = ledger.find(Payload::WALLET_REGISTRATION, |block| block.issuer != "admin");
        assert_eq!(fresh.count(), 2);
        assert_eq!(cursor.next().unwrap().issuer, "bob");
        assert!(cursor.next().is_none());

        assert_eq!(ledger.find(Payload::TRANSFER, |_| true).count(), 0);
    }

    #[test]
    fn test_iterate_from() {
        let (ledger, admin) = genesis_ledger();
        for amount in 1..=3 {
            let payload = transfer("bob", "x1", amount);
            let signature = signed(&payload, &admin);
            ledger.mine_and_append("admin", payload, &signature).unwrap();
        }
        let blocks = ledger.blocks();

        let indices: Vec<usize> = ledger.iterate_from("").map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let after_second: Vec<usize> = ledger
            .iterate_from(&blocks[1].hash())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(after_second, vec![2, 3]);

        assert_eq!(ledger.iterate_from(&ledger.last_hash()).count(), 0);
        assert_eq!(ledger.iterate_from("unknown").count(), 4);

        let (index, block) = ledger.iterate_from(&blocks[0].hash()).next().unwrap();
        assert_eq!(index, 1);
        assert_eq!(block.hash(), blocks[1].hash());
    }

    #[test]
    fn test_iterate_from_recent_window() {
        let ledger = Ledger::new("");
        let admin = generate_keypair().unwrap();
        ledger
            .insert_genesis("admin", &admin.public_key, &admin.private_key, sign)
            .unwrap();

        let payload = transfer("bob", "x1", 1);
        let signature = signed(&payload, &admin);
        for _ in 0..RECENT_WINDOW + 10 {
            ledger.mine_and_append("admin", payload.clone(), &signature).unwrap();
        }

        let total = ledger.len();
        let mut iter = ledger.iterate_from("");
        assert_eq!(iter.size_hint(), (RECENT_WINDOW, Some(RECENT_WINDOW)));
        assert_eq!(iter.next().unwrap().0, total - RECENT_WINDOW);
    }

    #[test]
    fn test_dump() {
        let (ledger, admin) = genesis_ledger();
        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        let block = ledger.mine_and_append("admin", payload, &signature).unwrap();

        let dump = ledger.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 "));
        assert!(lines[0].contains("[admin]"));
        assert_eq!(
            lines[1],
            format!("1 {} [admin] {}", block.hash(), block.payload_json)
        );

        // Registration payloads carry a PEM key and are cut at 80 characters
        let genesis_json = &ledger.blocks()[0].payload_json;
        let shown: String = genesis_json.chars().take(80).collect();
        assert!(lines[0].ends_with(&shown));
        assert!(!lines[0].contains(genesis_json.as_str()));
    }

    #[test]
    fn test_every_accepted_block_meets_difficulty() {
        let (ledger, admin) = genesis_ledger();
        for amount in 0..5 {
            let payload = transfer("dave", "x3", amount);
            let signature = signed(&payload, &admin);
            ledger.mine_and_append("admin", payload, &signature).unwrap();
        }

        let blocks = ledger.blocks();
        for pair in blocks.windows(2) {
            assert!(pair[1].hash().starts_with(DIFFICULTY));
            assert_eq!(pair[1].previous_hash, pair[0].hash());
        }
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_shared_handle_sees_appends() {
        let (ledger, admin) = genesis_ledger();
        let handle = ledger.clone();

        let payload = transfer("bob", "x1", 5);
        let signature = signed(&payload, &admin);
        handle.mine_and_append("admin", payload, &signature).unwrap();

        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_concurrent_miners() {
        let (ledger, admin) = genesis_ledger();

        let workers: Vec<_> = (0..4)
            .map(|amount| {
                let ledger = ledger.clone();
                let payload = transfer("bob", "x1", amount);
                let signature = signed(&payload, &admin);
                std::thread::spawn(move || ledger.mine_and_append("admin", payload, &signature))
            })
            .collect();

        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        assert_eq!(ledger.len(), 5);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_expected_attempts() {
        assert_eq!(expected_attempts(""), 1);
        assert_eq!(expected_attempts("00"), 256);
        assert_eq!(expected_attempts("0000"), 65536);
        assert_eq!(default_max_attempts("0000"), 65536 * 64);
        assert_eq!(expected_attempts(&"0".repeat(40)), u64::MAX);
    }
}
