// Copyright (c) 2024 Tessera Foundation

//! Network profiles: consensus constants, genesis and checkpoints.

use chrono::{DateTime, TimeZone, Utc};
use hex_literal::hex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tsr_blockchain_types::{
    compute_merkle_root, AdminKeySets, AdminThread, Amount, Block, BlockHash, BlockHeader,
    KeySetType, LockScript, OutPoint, Transaction, TxIn, TxOut, Unlock, COIN, MAX_TX_IN_SEQUENCE,
};
use tsr_consensus_pow::{compact_to_target, RetargetParams, U256};
use tsr_crypto_keys::{PublicKey, SigningKeyPair};

/// Which network a node runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    #[default]
    Testnet,
    /// Local regression-test network with trivial proof of work and
    /// well-known admin keys.
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// A known-good block pinned at a height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Pinned height.
    pub height: u64,
    /// Required block hash at that height.
    pub hash: BlockHash,
}

/// Limits on how much of the recent chain one validating key may sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignerPolicy {
    /// Number of most recent blocks (candidate included) examined.
    pub window: u64,
    /// Maximum percentage of the window one key may have signed.
    pub max_share_percent: u64,
    /// Maximum number of consecutive blocks one key may sign.
    pub max_trailing: u64,
}

/// Consensus constants of a network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// The network these parameters describe.
    pub network: Network,

    /// Timestamp of the genesis block, in Unix seconds.
    pub genesis_timestamp: i64,

    /// Difficulty parameters.
    pub pow: RetargetParams,

    /// Blocks a coinbase output must wait before it can be spent.
    pub coinbase_maturity: u64,

    /// Subsidy of the first block.
    pub base_subsidy: Amount,

    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u64,

    /// Maximum encoded size of a block.
    pub max_block_size: usize,

    /// Maximum number of transactions in a block.
    pub max_block_transactions: usize,

    /// Maximum encoded size of a transaction.
    pub max_tx_size: usize,

    /// Maximum signature operations in a block.
    pub max_block_sig_ops: usize,

    /// Maximum signature operations in a transaction.
    pub max_tx_sig_ops: usize,

    /// Maximum fee of a single transaction.
    pub max_tx_fee: Amount,

    /// Maximum total fees of a block.
    pub max_block_fee: Amount,

    /// Oldest block version still accepted.
    pub min_block_version: u32,

    /// Distinct authorized signatures an admin transaction needs.
    pub admin_signature_threshold: usize,

    /// Per-signer share limits, if enforced on this network.
    pub signer_policy: Option<SignerPolicy>,

    /// Admin key sets in force at genesis.
    pub genesis_admin_keys: AdminKeySets,

    /// Checkpoints, sorted by height.
    pub checkpoints: Vec<Checkpoint>,

    /// How far ahead of the local clock a block timestamp may be.
    pub max_time_offset_secs: i64,

    /// Number of ancestors whose median bounds a block's timestamp.
    pub median_time_blocks: usize,
}

/// Seeds of the regtest admin keys. Regtest is for local testing only; its
/// secrets are public.
const REGTEST_SEEDS: [(KeySetType, [u8; 32]); 4] = [
    (KeySetType::Root, [0x01; 32]),
    (KeySetType::Provisioning, [0x02; 32]),
    (KeySetType::Issuing, [0x03; 32]),
    (KeySetType::Validating, [0x04; 32]),
];

/// The well-known regtest signing key for `role`.
pub fn regtest_signing_key(role: KeySetType) -> SigningKeyPair {
    let seed = REGTEST_SEEDS
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, seed)| *seed)
        .unwrap_or([0u8; 32]);
    SigningKeyPair::from_seed(&seed)
}

fn pow_limit(bits: u32) -> U256 {
    compact_to_target(bits).unwrap_or(U256::zero())
}

impl ChainParams {
    /// Parameters of `network`.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Production network parameters.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            genesis_timestamp: 1_719_792_000, // 2024-07-01T00:00:00Z
            pow: RetargetParams {
                pow_limit: pow_limit(0x1d00_ffff),
                target_timespan_secs: 14 * 24 * 60 * 60,
                target_spacing_secs: 10 * 60,
                no_retargeting: false,
            },
            coinbase_maturity: 100,
            base_subsidy: 50 * COIN,
            subsidy_halving_interval: 210_000,
            max_block_size: 1_000_000,
            max_block_transactions: 1_000_000 / 60,
            max_tx_size: 100_000,
            max_block_sig_ops: 20_000,
            max_tx_sig_ops: 4_000,
            max_tx_fee: COIN,
            max_block_fee: 100 * COIN,
            min_block_version: 1,
            admin_signature_threshold: 1,
            signer_policy: Some(SignerPolicy {
                window: 100,
                max_share_percent: 50,
                max_trailing: 6,
            }),
            genesis_admin_keys: AdminKeySets::new(
                [PublicKey::from_bytes(hex!(
                    "bfd8a06f618e9c8078c549317ab9fc900d25d3835111ddb0656dcaff63024f4c"
                ))],
                [PublicKey::from_bytes(hex!(
                    "781a7cee59d3173c61ef74680975c8a0abfd179b8a2a133ded1b28a397808aed"
                ))],
                [PublicKey::from_bytes(hex!(
                    "b5c8a55f099c9a1e10ef55af615fe26aeb4565d839902d688820a3aaefd485c2"
                ))],
                [PublicKey::from_bytes(hex!(
                    "5d58989613c8e54e965bea02dc19d5bca6775f6d448809a12428030931484d12"
                ))],
            ),
            checkpoints: Vec::new(),
            max_time_offset_secs: 2 * 60 * 60,
            median_time_blocks: 11,
        }
    }

    /// Public test network parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            genesis_timestamp: 1_717_200_000, // 2024-06-01T00:00:00Z
            pow: RetargetParams {
                pow_limit: pow_limit(0x1f00_ffff),
                target_timespan_secs: 24 * 60 * 60,
                target_spacing_secs: 2 * 60,
                no_retargeting: false,
            },
            coinbase_maturity: 100,
            subsidy_halving_interval: 210_000,
            max_tx_fee: 10 * COIN,
            signer_policy: Some(SignerPolicy {
                window: 20,
                max_share_percent: 75,
                max_trailing: 10,
            }),
            genesis_admin_keys: AdminKeySets::new(
                [PublicKey::from_bytes(hex!(
                    "abb368044be817108af102bf2a930d5f01a3171faf708e7b0d9d9cb91ca745ec"
                ))],
                [PublicKey::from_bytes(hex!(
                    "245259ef114923c624c95c9b5c9cab3a5be667b6a9b80966fd61cc30078d59a5"
                ))],
                [PublicKey::from_bytes(hex!(
                    "5afe847793241efb653c132dc2183fcbd430c46e84e6117d528d938a636acecf"
                ))],
                [PublicKey::from_bytes(hex!(
                    "1ace2b7d85b996f0f051445260d8950e153def1b3d519e2264d0f1ef8ca60998"
                ))],
            ),
            ..Self::mainnet()
        }
    }

    /// Local regression-test parameters.
    pub fn regtest() -> Self {
        let key = |role| regtest_signing_key(role).public_key();
        Self {
            network: Network::Regtest,
            genesis_timestamp: 1_704_067_200, // 2024-01-01T00:00:00Z
            pow: RetargetParams {
                pow_limit: pow_limit(0x207f_ffff),
                target_timespan_secs: 14 * 24 * 60 * 60,
                target_spacing_secs: 10 * 60,
                no_retargeting: true,
            },
            coinbase_maturity: 10,
            subsidy_halving_interval: 150,
            max_tx_fee: COIN,
            max_block_fee: 10 * COIN,
            signer_policy: None,
            genesis_admin_keys: AdminKeySets::new(
                [key(KeySetType::Root)],
                [key(KeySetType::Provisioning)],
                [key(KeySetType::Issuing)],
                [key(KeySetType::Validating)],
            ),
            ..Self::mainnet()
        }
    }

    /// Merge extra checkpoints into the network's own, keeping the list
    /// sorted by height. A configured checkpoint replaces a built-in one at
    /// the same height.
    pub fn with_checkpoints(mut self, extra: impl IntoIterator<Item = Checkpoint>) -> Self {
        for checkpoint in extra {
            self.checkpoints.retain(|c| c.height != checkpoint.height);
            self.checkpoints.push(checkpoint);
        }
        self.checkpoints.sort_by_key(|c| c.height);
        self
    }

    /// The checkpoint pinned at `height`, if any.
    pub fn checkpoint_at(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.height == height)
    }

    /// Compact bits of the easiest permitted target.
    pub fn pow_limit_bits(&self) -> u32 {
        self.pow.pow_limit_bits()
    }

    /// New coins a block at `height` may create.
    pub fn block_subsidy(&self, height: u64) -> Amount {
        let halvings = height / self.subsidy_halving_interval.max(1);
        if halvings >= 63 {
            return 0;
        }
        self.base_subsidy >> halvings
    }

    /// Genesis timestamp as a date.
    pub fn genesis_time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.genesis_timestamp, 0)
            .single()
            .unwrap_or_default()
    }

    /// The genesis block.
    ///
    /// Its coinbase creates the three admin thread outputs. Genesis is
    /// trusted and never validated, so it carries no proof of work and no
    /// signature.
    pub fn genesis_block(&self) -> Block {
        let mut coinbase_data = 0u64.to_le_bytes().to_vec();
        coinbase_data.extend_from_slice(b"Tessera genesis");

        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                unlock: Unlock::Coinbase(coinbase_data),
                sequence: MAX_TX_IN_SEQUENCE,
            }],
            outputs: vec![
                TxOut::new(0, LockScript::AdminThread(AdminThread::Root)),
                TxOut::new(0, LockScript::AdminThread(AdminThread::Provision)),
                TxOut::new(0, LockScript::AdminThread(AdminThread::Issue)),
            ],
            lock_time: 0,
        };
        let transactions = vec![coinbase];

        let validating_key = self
            .genesis_admin_keys
            .keys(KeySetType::Validating)
            .iter()
            .next()
            .copied()
            .unwrap_or_default();

        let mut block = Block {
            header: BlockHeader {
                version: 1,
                prev_block: BlockHash::ZERO,
                merkle_root: compute_merkle_root(&transactions),
                timestamp: self.genesis_time(),
                bits: self.pow_limit_bits(),
                nonce: 0,
                size: 0,
                validating_key,
                signature: Vec::new(),
            },
            transactions,
        };
        block.header.size = block.transactions_size() as u32;
        block
    }

    /// Hash of the genesis block.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_block().hash()
    }
}
